// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Querying several accelerators as one.
//!
//! Static level geometry lives in a BVH, a handful of movers in a flat vector.
//! An `AcceleratorUnion` fans each query out to both and finalizes the shared
//! buffer once, so a block found in one accelerator trims touches found in the
//! other. Holding an outer flush scope defers that until the scope closes.
//!
//! Run:
//! - `cargo run -p understory_examples --example scene_union`

use std::sync::Arc;

use glam::Vec3;
use understory_scene_query::{
    Accelerator, AcceleratorUnion, BodySet, FilterFn, FilterResult, Geometry, HitBuffer, HitFlags,
    Index, OverlapHit, Pose, QueryFilterData, QueryFlags, QueryHit, ShapeInstance,
    SpatialAccelerator, SweepHit, TouchAll,
};

fn main() {
    let mut level = Accelerator::new(Index::with_bvh(), BodySet::new());
    for i in 0..8 {
        level.add_body(
            Pose::from_position(Vec3::new(i as f32 * 4.0, 0.0, 3.0)),
            vec![ShapeInstance::new(Geometry::cuboid(Vec3::new(1.0, 2.0, 1.0)))],
        );
    }
    level.commit();

    let mut movers = Accelerator::new(Index::new(), BodySet::new());
    for i in 0..3 {
        movers.add_body(
            Pose::from_position(Vec3::new(2.0 + i as f32 * 7.0, 0.0, 3.0)),
            vec![ShapeInstance::new(Geometry::sphere(0.75))],
        );
    }
    movers.commit();

    let mut union = AcceleratorUnion::new();
    union.add_member(Arc::new(level));
    union.add_member(Arc::new(movers));

    // Movers only touch; level geometry beyond x = 20 blocks.
    let filter = QueryFilterData::from_flags(QueryFlags::POST_FILTER);
    let mut classify = FilterFn::new(
        |_, _, _| FilterResult::Block,
        |_, _, hit: &dyn QueryHit| match hit.position() {
            Some(p) if p.x > 20.0 => FilterResult::Block,
            _ => FilterResult::Touch,
        },
    );

    let mut sweep = HitBuffer::<SweepHit>::new();
    let stats = {
        let mut scope = sweep.flush_scope();
        union.sweep(
            &Geometry::sphere(0.5),
            &Pose::from_position(Vec3::new(-3.0, 0.0, 3.0)),
            Vec3::X,
            40.0,
            &mut scope,
            HitFlags::default(),
            &filter,
            &mut classify,
        )
    };
    println!("== sphere sweep ({} narrow tests) ==", stats.narrow_tests);
    for hit in sweep.hits() {
        println!("  {:?} at t={:.3}", hit.actor, hit.distance);
    }
    println!("  blocked: {}", sweep.has_blocking_hit());

    // A direct call finalizes once, after the last member.
    let mut overlap = HitBuffer::<OverlapHit>::new();
    union.overlap(
        &Geometry::sphere(3.0),
        &Pose::from_position(Vec3::new(4.0, 0.0, 3.0)),
        &mut overlap,
        &QueryFilterData::default(),
        &mut TouchAll,
    );
    println!("== overlap: {} shapes ==", overlap.num_hits());
    for hit in overlap.hits() {
        println!("  {:?} shape {}", hit.actor, hit.shape.index());
    }
}
