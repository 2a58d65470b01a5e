// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use glam::Vec3;
use understory_query_index::{Aabb3D, Backend, Index, IndexGeneric, RayState, Traversal};

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn next_f32(&mut self) -> f32 {
        let v = self.next_u64() >> 40;
        (v as f32) / ((1u32 << 24) as f32)
    }
}

/// `n * n * n` unit boxes on a lattice with spacing `cell`.
fn gen_lattice_boxes(n: usize, cell: f32) -> Vec<Aabb3D> {
    let mut out = Vec::with_capacity(n * n * n);
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let c = Vec3::new(x as f32, y as f32, z as f32) * cell;
                out.push(Aabb3D::from_center_half_extents(c, Vec3::splat(0.5)));
            }
        }
    }
    out
}

fn gen_random_boxes(count: usize, extent: f32, half: f32) -> Vec<Aabb3D> {
    let mut rng = Rng::new(0xCAFE_F00D_DEAD_BEEF);
    (0..count)
        .map(|_| {
            let c = Vec3::new(rng.next_f32(), rng.next_f32(), rng.next_f32()) * extent;
            Aabb3D::from_center_half_extents(c, Vec3::splat(half))
        })
        .collect()
}

fn build<B: Backend>(mut idx: IndexGeneric<u32, B>, boxes: &[Aabb3D]) -> IndexGeneric<u32, B> {
    for (i, b) in boxes.iter().enumerate() {
        let _ = idx.insert(*b, i as u32);
    }
    let _ = idx.commit();
    idx
}

/// Nearest entry hit by the ray, shrinking to each candidate's entry distance.
fn closest<B: Backend>(idx: &IndexGeneric<u32, B>, origin: Vec3, dir: Vec3) -> Option<u32> {
    let mut best = None;
    let _ = idx.traverse_raycast(origin, dir, 1.0e4, &mut |p: &u32, b: &Aabb3D, s: &mut RayState| {
        if let Some(t) = b.ray_entry(s.origin, s.inv_dir, s.length()) {
            s.shrink(t);
            best = Some(*p);
        }
        Traversal::Continue
    });
    best
}

fn count_overlaps<B: Backend>(idx: &IndexGeneric<u32, B>, query: &Aabb3D) -> usize {
    let mut hits = 0;
    let _ = idx.traverse_overlap(query, &mut |_: &u32, _: &Aabb3D| {
        hits += 1;
        Traversal::Continue
    });
    hits
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_commit");
    for &n in &[8usize, 16] {
        let boxes = gen_lattice_boxes(n, 2.0);
        group.throughput(Throughput::Elements(boxes.len() as u64));
        group.bench_function(format!("flatvec_n{}", n), |b| {
            b.iter_batched(
                Index::<u32>::new,
                |idx| black_box(build(idx, &boxes)),
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("bvh_n{}", n), |b| {
            b.iter_batched(
                Index::<u32>::with_bvh,
                |idx| black_box(build(idx, &boxes)),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_raycast_closest(c: &mut Criterion) {
    let mut group = c.benchmark_group("raycast_closest");
    let boxes = gen_random_boxes(4096, 200.0, 1.5);
    let flat = build(Index::<u32>::new(), &boxes);
    let bvh = build(Index::<u32>::with_bvh(), &boxes);
    let mut rng = Rng::new(0x1234_5678_9ABC_DEF0);
    let rays: Vec<(Vec3, Vec3)> = (0..64)
        .map(|_| {
            let o = Vec3::new(rng.next_f32(), rng.next_f32(), rng.next_f32()) * 200.0;
            let d = Vec3::new(rng.next_f32(), rng.next_f32(), rng.next_f32()) - Vec3::splat(0.5);
            let d = d.normalize_or(Vec3::X);
            (o, d)
        })
        .collect();
    group.throughput(Throughput::Elements(rays.len() as u64));
    group.bench_function("flatvec", |b| {
        b.iter(|| {
            for &(o, d) in &rays {
                black_box(closest(&flat, o, d));
            }
        })
    });
    group.bench_function("bvh", |b| {
        b.iter(|| {
            for &(o, d) in &rays {
                black_box(closest(&bvh, o, d));
            }
        })
    });
    group.finish();
}

fn bench_overlap(c: &mut Criterion) {
    let mut group = c.benchmark_group("overlap_count");
    let boxes = gen_lattice_boxes(16, 2.0);
    let flat = build(Index::<u32>::new(), &boxes);
    let bvh = build(Index::<u32>::with_bvh(), &boxes);
    let query = Aabb3D::new(Vec3::splat(4.0), Vec3::splat(12.0));
    group.bench_function("flatvec", |b| b.iter(|| black_box(count_overlaps(&flat, &query))));
    group.bench_function("bvh", |b| b.iter(|| black_box(count_overlaps(&bvh, &query))));
    group.finish();
}

fn bench_update_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_commit");
    let boxes = gen_random_boxes(2048, 200.0, 1.0);
    group.bench_function("bvh_move_10pct", |b| {
        b.iter_batched(
            || {
                let mut idx = Index::<u32>::with_bvh();
                let keys: Vec<_> = boxes
                    .iter()
                    .enumerate()
                    .map(|(i, r)| idx.insert(*r, i as u32))
                    .collect();
                let _ = idx.commit();
                (idx, keys)
            },
            |(mut idx, keys)| {
                for (k, r) in keys.iter().zip(&boxes).step_by(10) {
                    idx.update(*k, Aabb3D::new(r.min + Vec3::X, r.max + Vec3::X));
                }
                black_box(idx.commit())
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_build, bench_raycast_closest, bench_overlap, bench_update_commit);
criterion_main!(benches);
