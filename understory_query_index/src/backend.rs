// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend trait for spatial indexing implementations.

use glam::Vec3;

use crate::types::Aabb3D;
use crate::visit::{RayState, Traversal};

/// Spatial backend abstraction used by `IndexGeneric`.
///
/// Backends store slots with their bounds and deliver candidates through callbacks so a
/// visitor can shrink the ray while the traversal is still running.
pub trait Backend {
    /// Insert a new slot into the spatial structure.
    fn insert(&mut self, slot: usize, aabb: Aabb3D);

    /// Update an existing slot's AABB.
    fn update(&mut self, slot: usize, aabb: Aabb3D);

    /// Remove a slot from the spatial structure.
    fn remove(&mut self, slot: usize);

    /// Clear all spatial structures.
    fn clear(&mut self);

    /// Deliver slots whose AABB, inflated by `inflate`, is reached by the ray in `state`.
    ///
    /// The remaining length is re-read before every bounds test, so a visitor that
    /// shrinks `state` prunes the rest of the traversal.
    fn raycast(
        &self,
        state: &mut RayState,
        inflate: Vec3,
        visit: &mut dyn FnMut(usize, &Aabb3D, &mut RayState) -> Traversal,
    ) -> Traversal;

    /// Deliver slots whose AABB intersects `bounds`.
    fn overlap(
        &self,
        bounds: &Aabb3D,
        visit: &mut dyn FnMut(usize, &Aabb3D) -> Traversal,
    ) -> Traversal;
}
