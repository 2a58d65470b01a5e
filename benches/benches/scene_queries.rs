// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use glam::Vec3;
use understory_query_index::{Backend, IndexGeneric};
use understory_scene_query::ActorHandle;
use understory_scene_query::{
    Accelerator, BlockAll, BodySet, Geometry, HitBuffer, HitFlags, Index, OverlapHit, Pose,
    QueryFilterData, QueryFlags, RaycastHit, ShapeInstance, SpatialAccelerator, SweepHit, TouchAll,
};

/// A `n * n` floor of boxes with a sphere resting on every other tile.
fn scene<B: Backend>(index: IndexGeneric<ActorHandle, B>, n: usize) -> Accelerator<B, BodySet> {
    let mut acc = Accelerator::new(index, BodySet::new());
    for z in 0..n {
        for x in 0..n {
            let at = Vec3::new(x as f32 * 2.0, 0.0, z as f32 * 2.0);
            let mut shapes = vec![ShapeInstance::new(Geometry::cuboid(Vec3::new(1.0, 0.1, 1.0)))];
            if (x + z) % 2 == 0 {
                shapes.push(
                    ShapeInstance::new(Geometry::sphere(0.4))
                        .with_local_pose(Pose::from_position(Vec3::Y * 0.5)),
                );
            }
            acc.add_body(Pose::from_position(at), shapes);
        }
    }
    acc.commit();
    acc
}

fn bench_raycast(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene_raycast");
    let n = 32;
    let flat = scene(Index::new(), n);
    let bvh = scene(Index::with_bvh(), n);
    let rays: Vec<Vec3> = (0..n).map(|i| Vec3::new(i as f32 * 2.0, 3.0, -5.0)).collect();
    let dir = Vec3::new(0.0, -0.2, 1.0).normalize();
    group.throughput(Throughput::Elements(rays.len() as u64));
    let backends: [(&str, &dyn SpatialAccelerator); 2] = [("flatvec", &flat), ("bvh", &bvh)];
    for (name, acc) in backends {
        group.bench_function(format!("closest_{name}"), |b| {
            b.iter(|| {
                for &o in &rays {
                    let mut buffer = HitBuffer::<RaycastHit>::single();
                    acc.raycast(
                        o,
                        dir,
                        200.0,
                        &mut buffer,
                        HitFlags::default(),
                        &QueryFilterData::blocking(),
                        &mut BlockAll,
                    );
                    black_box(buffer.num_hits());
                }
            })
        });
        group.bench_function(format!("all_touches_{name}"), |b| {
            let filter = QueryFilterData::from_flags(QueryFlags::PRE_FILTER);
            b.iter(|| {
                for &o in &rays {
                    let mut buffer = HitBuffer::<RaycastHit>::new();
                    acc.raycast(
                        o,
                        dir,
                        200.0,
                        &mut buffer,
                        HitFlags::default(),
                        &filter,
                        &mut TouchAll,
                    );
                    black_box(buffer.num_hits());
                }
            })
        });
    }
    group.finish();
}

fn bench_sweep_overlap(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene_sweep_overlap");
    let bvh = scene(Index::with_bvh(), 32);
    let capsule = Geometry::capsule(0.3, 0.5);
    group.bench_function("capsule_sweep_bvh", |b| {
        b.iter(|| {
            let mut buffer = HitBuffer::<SweepHit>::single();
            bvh.sweep(
                &capsule,
                &Pose::from_position(Vec3::new(1.0, 3.0, 1.0)),
                -Vec3::Y,
                10.0,
                &mut buffer,
                HitFlags::default(),
                &QueryFilterData::blocking(),
                &mut BlockAll,
            );
            black_box(buffer.num_hits())
        })
    });
    let region = Geometry::cuboid(Vec3::splat(6.0));
    group.bench_function("box_overlap_bvh", |b| {
        b.iter(|| {
            let mut buffer = HitBuffer::<OverlapHit>::new();
            bvh.overlap(
                &region,
                &Pose::from_position(Vec3::new(20.0, 0.0, 20.0)),
                &mut buffer,
                &QueryFilterData::blocking(),
                &mut TouchAll,
            );
            black_box(buffer.num_hits())
        })
    });
    group.finish();
}

criterion_group!(benches, bench_raycast, bench_sweep_overlap);
criterion_main!(benches);
