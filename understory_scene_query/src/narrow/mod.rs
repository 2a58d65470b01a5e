// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Narrow phase: exact shape tests run on the candidates the index delivers.
//!
//! The [`NarrowPhase`] trait is the seam between the query visitor and the
//! intersection math. [`AnalyticNarrowPhase`] is the reference implementation.

mod analytic;
pub(crate) mod gjk;

pub use analytic::{AnalyticNarrowPhase, NarrowPhaseConfig};

use glam::Vec3;

use crate::geometry::{Geometry, QueryShape};
use crate::types::{HitFlags, Pose};

/// Geometric result of a raycast or sweep against one shape, in world space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShapeHit {
    /// Distance along the query direction.
    pub distance: f32,
    /// Contact position.
    pub position: Vec3,
    /// Unit normal of the target surface, facing the query.
    pub normal: Vec3,
    /// Triangle index for meshes and height fields.
    pub face_index: Option<u32>,
}

/// Shape-level intersection tests.
///
/// All inputs are in world space; `target_pose` is the world pose of the tested shape.
/// Directions are unit length.
pub trait NarrowPhase {
    /// Cast the ray `origin + t * dir`, `t` in `[0, max_dist]`, against `target`.
    ///
    /// An origin inside a solid target hits at distance `0` with normal `-dir`.
    fn raycast(
        &self,
        target: &Geometry,
        target_pose: &Pose,
        origin: Vec3,
        dir: Vec3,
        max_dist: f32,
        flags: HitFlags,
    ) -> Option<ShapeHit>;

    /// Sweep `query` from `start` along `dir` for up to `max_dist` against `target`.
    ///
    /// A sweep that starts in overlap hits at distance `0` with normal `-dir`, or the
    /// minimum translation direction when `flags` contains [`HitFlags::MTD`].
    fn sweep<G: QueryShape>(
        &self,
        query: &G,
        start: &Pose,
        dir: Vec3,
        max_dist: f32,
        target: &Geometry,
        target_pose: &Pose,
        flags: HitFlags,
    ) -> Option<ShapeHit>;

    /// Whether `query` at `pose` overlaps `target`. Touching counts as overlap.
    fn overlap<G: QueryShape>(
        &self,
        query: &G,
        pose: &Pose,
        target: &Geometry,
        target_pose: &Pose,
    ) -> bool;
}
