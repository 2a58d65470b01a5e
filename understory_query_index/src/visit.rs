// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Traversal state and the visitor traits driven by [`IndexGeneric`](crate::IndexGeneric).
//!
//! ## Overview
//!
//! A traversal delivers candidates one at a time. Each callback returns a
//! [`Traversal`] that either continues or stops the whole traversal.
//! Ray and sweep callbacks also receive the live [`RayState`]; a visitor may
//! [`shrink`](RayState::shrink) it, and backends re-check the remaining length
//! before descending into further nodes.

use glam::Vec3;

use crate::types::Aabb3D;

/// Whether a traversal should keep delivering candidates.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Traversal {
    /// Deliver the next candidate.
    Continue,
    /// Abort the traversal; no further candidates are delivered.
    Stop,
}

/// Live state of a ray or sweep traversal.
///
/// `length` only ever decreases during a traversal.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayState {
    /// Ray origin (sweep center at the start pose).
    pub origin: Vec3,
    /// Unit direction.
    pub dir: Vec3,
    /// Componentwise reciprocal of `dir`, cached for slab tests.
    pub inv_dir: Vec3,
    length: f32,
}

impl RayState {
    /// Create a state for a ray of the given length.
    pub fn new(origin: Vec3, dir: Vec3, length: f32) -> Self {
        debug_assert!(length >= 0.0, "query length must be non-negative");
        Self {
            origin,
            dir,
            inv_dir: dir.recip(),
            length: length.max(0.0),
        }
    }

    /// Remaining query length.
    pub fn length(&self) -> f32 {
        self.length
    }

    /// Shrink the remaining length to `max(0, len)`. Longer values are ignored.
    pub fn shrink(&mut self, len: f32) {
        self.length = self.length.min(len.max(0.0));
    }

    /// Point at parameter `t` along the ray.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }
}

/// Receives candidates from [`IndexGeneric::traverse_raycast`](crate::IndexGeneric::traverse_raycast).
pub trait RaycastVisitor<P> {
    /// Visit one candidate whose bounds the ray reaches within the current length.
    fn visit_raycast(&mut self, payload: &P, bounds: &Aabb3D, state: &mut RayState) -> Traversal;
}

/// Receives candidates from [`IndexGeneric::traverse_sweep`](crate::IndexGeneric::traverse_sweep).
pub trait SweepVisitor<P> {
    /// Visit one candidate whose bounds, inflated by the swept half-extents, the
    /// sweep reaches within the current length.
    fn visit_sweep(&mut self, payload: &P, bounds: &Aabb3D, state: &mut RayState) -> Traversal;
}

/// Receives candidates from [`IndexGeneric::traverse_overlap`](crate::IndexGeneric::traverse_overlap).
pub trait OverlapVisitor<P> {
    /// Visit one candidate whose bounds intersect the query bounds.
    fn visit_overlap(&mut self, payload: &P, bounds: &Aabb3D) -> Traversal;
}

impl<P, F> RaycastVisitor<P> for F
where
    F: FnMut(&P, &Aabb3D, &mut RayState) -> Traversal,
{
    fn visit_raycast(&mut self, payload: &P, bounds: &Aabb3D, state: &mut RayState) -> Traversal {
        self(payload, bounds, state)
    }
}

impl<P, F> SweepVisitor<P> for F
where
    F: FnMut(&P, &Aabb3D, &mut RayState) -> Traversal,
{
    fn visit_sweep(&mut self, payload: &P, bounds: &Aabb3D, state: &mut RayState) -> Traversal {
        self(payload, bounds, state)
    }
}
