// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Basic usage of the query index: insert, update, commit, and cast a ray that stops at the first box.

use understory_query_index::{Aabb3D, Index, RayState, Traversal};

use glam::Vec3;

fn main() {
    let mut idx = Index::<u32>::with_bvh();
    let k1 = idx.insert(Aabb3D::from_center_half_extents(Vec3::new(4.0, 0.0, 0.0), Vec3::ONE), 1);
    let _k2 = idx.insert(Aabb3D::from_center_half_extents(Vec3::new(9.0, 0.0, 0.0), Vec3::ONE), 2);
    let applied = idx.commit();
    println!("applied {applied} changes");

    // Move box 1 further along the ray.
    idx.update(k1, Aabb3D::from_center_half_extents(Vec3::new(14.0, 0.0, 0.0), Vec3::ONE));
    let _ = idx.commit();

    let mut first = None;
    let _ = idx.traverse_raycast(
        Vec3::ZERO,
        Vec3::X,
        100.0,
        &mut |payload: &u32, bounds: &Aabb3D, state: &mut RayState| {
            let entry = bounds.ray_entry(state.origin, state.inv_dir, state.length());
            if let Some(t) = entry {
                state.shrink(t);
                first = Some((*payload, t));
            }
            Traversal::Continue
        },
    );
    println!("nearest box along +X: {first:?}");
}
