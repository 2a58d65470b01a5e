// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![cfg(feature = "compare_rstar")]

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use glam::Vec3;
use understory_query_index::{Aabb3D, Index, Traversal};

use rstar::primitives::Rectangle;
use rstar::{AABB, RTree};

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

fn to_rstar_boxes(v: &[Aabb3D]) -> Vec<Rectangle<[f32; 3]>> {
    v.iter()
        .map(|b| Rectangle::from_corners(b.min.to_array(), b.max.to_array()))
        .collect()
}

fn bench_rtree_external_compare(c: &mut Criterion) {
    let mut group = c.benchmark_group("rtree_external_compare_3d");
    for &n in &[12usize, 20] {
        let boxes = gen_lattice_boxes(n, 2.0);
        let query = Aabb3D::new(Vec3::splat(4.0), Vec3::splat(14.0));
        group.throughput(Throughput::Elements(boxes.len() as u64));

        group.bench_function(format!("understory_bvh_build_query_n{}", n), |b| {
            b.iter_batched(
                Index::<u32>::with_bvh,
                |mut idx| {
                    for (i, r) in boxes.iter().copied().enumerate() {
                        let _ = idx.insert(r, i as u32);
                    }
                    let _ = idx.commit();
                    let mut hits = 0_usize;
                    let _ = idx.traverse_overlap(&query, &mut |_: &u32, _: &Aabb3D| {
                        hits += 1;
                        Traversal::Continue
                    });
                    black_box(hits);
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("rstar_build_query_bulk_n{}", n), |b| {
            b.iter_batched(
                || to_rstar_boxes(&boxes),
                |rectangles| {
                    let tree = RTree::bulk_load(rectangles);
                    let aabb = AABB::from_corners(query.min.to_array(), query.max.to_array());
                    let hits: usize = tree.locate_in_envelope_intersecting(&aabb).count();
                    black_box(hits);
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_rtree_external_compare);
criterion_main!(benches);
