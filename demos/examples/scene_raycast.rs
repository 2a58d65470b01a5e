// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scene raycast basics.
//!
//! Builds a small scene (floor, crates, a glass pane) and casts rays with layer
//! filtering: glass touches, everything else blocks. Prints the hit list each
//! query finalizes with, nearest first and the block last.
//!
//! Run:
//! - `cargo run -p understory_examples --example scene_raycast`

use glam::{Quat, Vec3};
use understory_scene_query::{
    Accelerator, BodySet, FilterData, Geometry, HitBuffer, HitFlags, Index, LayerMaskFilter, Pose,
    QueryFilterData, QueryFlags, RaycastHit, ShapeInstance, SpatialAccelerator,
};

const SOLID: u32 = 0b01;
const GLASS: u32 = 0b10;

fn solid(geometry: Geometry) -> ShapeInstance {
    ShapeInstance::new(geometry).with_filter_data(FilterData::new(0, SOLID, 0, 0))
}

fn main() {
    let mut scene = Accelerator::new(Index::with_bvh(), BodySet::new());

    let floor = scene.add_body(
        Pose::from_position(Vec3::new(0.0, -0.5, 0.0)),
        vec![solid(Geometry::cuboid(Vec3::new(20.0, 0.5, 20.0)))],
    );
    let glass = scene.add_body(
        Pose::from_position(Vec3::new(3.0, 1.0, 0.0)),
        vec![
            ShapeInstance::new(Geometry::cuboid(Vec3::new(0.05, 1.0, 2.0)))
                .with_filter_data(FilterData::new(0, 0, GLASS, 0)),
        ],
    );
    let crate_stack = scene.add_body(
        Pose::new(Vec3::new(7.0, 0.5, 0.0), Quat::from_rotation_y(0.3)),
        vec![
            solid(Geometry::cuboid(Vec3::splat(0.5))),
            solid(Geometry::cuboid(Vec3::splat(0.4)))
                .with_local_pose(Pose::from_position(Vec3::new(0.0, 0.9, 0.0))),
        ],
    );
    let pillar = scene.add_body(
        Pose::from_position(Vec3::new(12.0, 1.5, 0.0)),
        vec![solid(Geometry::capsule(0.5, 1.0))],
    );
    println!("committed {} changes", scene.commit());
    println!("floor={floor:?} glass={glass:?} crates={crate_stack:?} pillar={pillar:?}");

    let layers = FilterData::new(SOLID | GLASS, 0, 0, 0);
    let filter = QueryFilterData::new(layers, QueryFlags::PRE_FILTER);
    let rays = [
        ("through glass into crates", Vec3::new(0.0, 0.6, 0.0), Vec3::X),
        ("over the crates into the pillar", Vec3::new(0.0, 2.2, 0.0), Vec3::X),
        ("down onto the floor", Vec3::new(-5.0, 5.0, 3.0), -Vec3::Y),
    ];

    let mut hits = HitBuffer::<RaycastHit>::new();
    for (label, origin, dir) in rays {
        hits.reset();
        let stats = scene.raycast(
            origin,
            dir,
            50.0,
            &mut hits,
            HitFlags::default(),
            &filter,
            &mut LayerMaskFilter,
        );
        println!(
            "== {label} ({} candidates, {} narrow tests) ==",
            stats.candidates, stats.narrow_tests
        );
        for hit in hits.hits() {
            let kind = if hits.block().is_some_and(|b| b == hit) { "block" } else { "touch" };
            println!(
                "  {kind:5} {:?} shape {} at t={:.3} p={:?} n={:?}",
                hit.actor,
                hit.shape.index(),
                hit.distance,
                hit.position,
                hit.normal
            );
        }
    }

    // Moving a body only affects queries after the next commit.
    scene.set_body_pose(pillar, Pose::from_position(Vec3::new(12.0, 1.5, 30.0)));
    scene.commit();
    hits.reset();
    scene.raycast(
        Vec3::new(0.0, 2.2, 0.0),
        Vec3::X,
        50.0,
        &mut hits,
        HitFlags::default(),
        &filter,
        &mut LayerMaskFilter,
    );
    println!("== after moving the pillar: {} hits ==", hits.num_hits());
}
