// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shape geometry, world bounds, and support mappings.
//!
//! Convex shapes are described to the narrow phase as a *core* plus a *margin*:
//! a sphere is a point core with its radius as margin, a capsule is a segment core
//! with its radius as margin, and every other shape is its own core with no margin.

use alloc::vec::Vec;

use glam::{Mat3, Vec3};
use understory_query_index::Aabb3D;

use crate::types::Pose;

/// Sphere centered at the local origin.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sphere {
    /// Radius.
    pub radius: f32,
}

/// Box centered at the local origin.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Cuboid {
    /// Half-extents along the local axes.
    pub half_extents: Vec3,
}

/// Capsule whose axis is the local Y axis.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Capsule {
    /// Radius of the rounded hull.
    pub radius: f32,
    /// Half-length of the core segment.
    pub half_height: f32,
}

impl Capsule {
    /// Endpoints of the core segment in local space.
    pub fn segment(&self) -> (Vec3, Vec3) {
        (Vec3::new(0.0, -self.half_height, 0.0), Vec3::new(0.0, self.half_height, 0.0))
    }
}

/// Convex hull of a point cloud.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvexHull {
    /// Hull points in local space. Interior points are allowed.
    pub points: Vec<Vec3>,
}

/// Indexed triangle mesh. Front faces wind counter-clockwise.
#[derive(Clone, Debug, PartialEq)]
pub struct TriangleMesh {
    /// Vertex positions in local space.
    pub vertices: Vec<Vec3>,
    /// Vertex indices, one triple per triangle.
    pub indices: Vec<[u32; 3]>,
}

impl TriangleMesh {
    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// Local-space corners of triangle `face`. Out-of-range vertex indices yield `None`.
    pub fn triangle(&self, face: usize) -> Option<[Vec3; 3]> {
        let [a, b, c] = *self.indices.get(face)?;
        Some([
            *self.vertices.get(a as usize)?,
            *self.vertices.get(b as usize)?,
            *self.vertices.get(c as usize)?,
        ])
    }
}

/// Regular grid of heights in the local XZ plane.
///
/// Sample `(row, col)` sits at `(col * scale.x, heights[row * cols + col] * scale.y, row * scale.z)`.
/// Each cell holds two upward-facing triangles; cell `(row, col)` owns faces
/// `2 * (row * (cols - 1) + col)` and the one after it.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightField {
    /// Row-major samples, `rows * cols` long.
    pub heights: Vec<f32>,
    /// Sample rows along local Z.
    pub rows: usize,
    /// Sample columns along local X.
    pub cols: usize,
    /// Column spacing, height scale, and row spacing.
    pub scale: Vec3,
}

impl HeightField {
    /// Create a height field, checking the sample count in debug builds.
    pub fn new(heights: Vec<f32>, rows: usize, cols: usize, scale: Vec3) -> Self {
        debug_assert_eq!(heights.len(), rows * cols, "height field needs rows * cols samples");
        debug_assert!(rows >= 2 && cols >= 2, "height field needs at least one cell");
        Self {
            heights,
            rows,
            cols,
            scale,
        }
    }

    /// Local position of sample `(row, col)`.
    pub fn vertex(&self, row: usize, col: usize) -> Vec3 {
        let h = self.heights.get(row * self.cols + col).copied().unwrap_or(0.0);
        Vec3::new(col as f32 * self.scale.x, h * self.scale.y, row as f32 * self.scale.z)
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        2 * self.rows.saturating_sub(1) * self.cols.saturating_sub(1)
    }

    /// Local-space corners of triangle `face`.
    pub fn triangle(&self, face: usize) -> Option<[Vec3; 3]> {
        if face >= self.triangle_count() {
            return None;
        }
        let cell = face / 2;
        let (row, col) = (cell / (self.cols - 1), cell % (self.cols - 1));
        let p00 = self.vertex(row, col);
        let p01 = self.vertex(row, col + 1);
        let p10 = self.vertex(row + 1, col);
        Some(if face % 2 == 0 {
            [p00, p10, p01]
        } else {
            [p01, p10, self.vertex(row + 1, col + 1)]
        })
    }

    /// Faces of every cell whose XZ footprint overlaps `local` (a local-space box).
    pub fn faces_in(&self, local: &Aabb3D) -> impl Iterator<Item = usize> + '_ {
        let (c0, c1) = cell_span(local.min.x, local.max.x, self.scale.x, self.cols);
        let (r0, r1) = cell_span(local.min.z, local.max.z, self.scale.z, self.rows);
        let cells_per_row = self.cols.saturating_sub(1);
        (r0..r1).flat_map(move |r| {
            (c0..c1).flat_map(move |c| {
                let cell = r * cells_per_row + c;
                [2 * cell, 2 * cell + 1]
            })
        })
    }

    fn sample_bounds(&self) -> Aabb3D {
        let (lo, hi) = self
            .heights
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), h| (lo.min(*h), hi.max(*h)));
        let (lo, hi) = if self.scale.y < 0.0 {
            (hi * self.scale.y, lo * self.scale.y)
        } else {
            (lo * self.scale.y, hi * self.scale.y)
        };
        Aabb3D::new(
            Vec3::new(0.0, lo, 0.0),
            Vec3::new(
                self.cols.saturating_sub(1) as f32 * self.scale.x,
                hi,
                self.rows.saturating_sub(1) as f32 * self.scale.z,
            ),
        )
    }
}

// Half-open range of cells along one axis touched by `[lo, hi]`.
#[allow(
    clippy::cast_possible_truncation,
    reason = "Cell coordinates are clamped to the grid size before the cast."
)]
fn cell_span(lo: f32, hi: f32, spacing: f32, samples: usize) -> (usize, usize) {
    let cells = samples.saturating_sub(1);
    if cells == 0 || spacing <= 0.0 || hi < 0.0 || lo > cells as f32 * spacing {
        return (0, 0);
    }
    let first = (lo / spacing).max(0.0) as usize;
    let last = ((hi / spacing).max(0.0) as usize).saturating_add(1).min(cells);
    (first.min(cells), last)
}

/// Closed set of shape geometries a body can carry and a query can use.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    /// Sphere.
    Sphere(Sphere),
    /// Box.
    Cuboid(Cuboid),
    /// Capsule.
    Capsule(Capsule),
    /// Convex hull.
    ConvexHull(ConvexHull),
    /// Triangle mesh.
    TriangleMesh(TriangleMesh),
    /// Height field.
    HeightField(HeightField),
}

impl Geometry {
    /// Sphere geometry.
    pub fn sphere(radius: f32) -> Self {
        debug_assert!(radius >= 0.0, "sphere radius must be non-negative");
        Self::Sphere(Sphere { radius })
    }

    /// Box geometry.
    pub fn cuboid(half_extents: Vec3) -> Self {
        debug_assert!(half_extents.min_element() >= 0.0, "box half-extents must be non-negative");
        Self::Cuboid(Cuboid { half_extents })
    }

    /// Capsule geometry along local Y.
    pub fn capsule(radius: f32, half_height: f32) -> Self {
        debug_assert!(
            radius >= 0.0 && half_height >= 0.0,
            "capsule dimensions must be non-negative"
        );
        Self::Capsule(Capsule {
            radius,
            half_height,
        })
    }

    /// Bounds in the shape's local frame.
    pub fn local_aabb(&self) -> Aabb3D {
        match self {
            Self::Sphere(s) => s.local_aabb(),
            Self::Cuboid(c) => c.local_aabb(),
            Self::Capsule(c) => c.local_aabb(),
            Self::ConvexHull(h) => h.local_aabb(),
            Self::TriangleMesh(m) => m.local_aabb(),
            Self::HeightField(h) => h.local_aabb(),
        }
    }

    /// World-space bounds of the shape placed at `pose`.
    pub fn world_aabb(&self, pose: &Pose) -> Aabb3D {
        match self {
            Self::Sphere(s) => {
                Aabb3D::from_center_half_extents(pose.position, Vec3::splat(s.radius))
            }
            Self::Capsule(c) => {
                let axis = (pose.rotation * Vec3::Y * c.half_height).abs();
                Aabb3D::from_center_half_extents(pose.position, axis + Vec3::splat(c.radius))
            }
            _ => transform_aabb(&self.local_aabb(), pose),
        }
    }
}

/// Conservative world bounds of a local box under `pose`.
pub fn transform_aabb(local: &Aabb3D, pose: &Pose) -> Aabb3D {
    if local.is_empty() {
        return *local;
    }
    let rot = Mat3::from_quat(pose.rotation);
    let abs = Mat3::from_cols(rot.x_axis.abs(), rot.y_axis.abs(), rot.z_axis.abs());
    Aabb3D::from_center_half_extents(
        pose.transform_point(local.center()),
        abs * local.half_extents(),
    )
}

/// Support mapping of a convex core plus a rounding margin.
///
/// Implemented by every geometry usable as sweep or overlap query geometry.
/// Meshes and height fields answer with the support of their vertex hull.
pub trait QueryShape: core::fmt::Debug {
    /// Farthest core point along `dir`, in local space. `dir` need not be unit length.
    fn core_support(&self, dir: Vec3) -> Vec3;

    /// Rounding radius added around the core.
    fn margin(&self) -> f32;

    /// Bounds in the shape's local frame, margin included.
    fn local_aabb(&self) -> Aabb3D;

    /// World-space bounds at `pose`.
    fn world_aabb(&self, pose: &Pose) -> Aabb3D {
        transform_aabb(&self.local_aabb(), pose)
    }
}

impl QueryShape for Sphere {
    fn core_support(&self, _dir: Vec3) -> Vec3 {
        Vec3::ZERO
    }

    fn margin(&self) -> f32 {
        self.radius
    }

    fn local_aabb(&self) -> Aabb3D {
        Aabb3D::from_center_half_extents(Vec3::ZERO, Vec3::splat(self.radius))
    }

    fn world_aabb(&self, pose: &Pose) -> Aabb3D {
        Aabb3D::from_center_half_extents(pose.position, Vec3::splat(self.radius))
    }
}

impl QueryShape for Cuboid {
    fn core_support(&self, dir: Vec3) -> Vec3 {
        Vec3::select(dir.cmplt(Vec3::ZERO), -self.half_extents, self.half_extents)
    }

    fn margin(&self) -> f32 {
        0.0
    }

    fn local_aabb(&self) -> Aabb3D {
        Aabb3D::from_center_half_extents(Vec3::ZERO, self.half_extents)
    }
}

impl QueryShape for Capsule {
    fn core_support(&self, dir: Vec3) -> Vec3 {
        let (bottom, top) = self.segment();
        if dir.y < 0.0 { bottom } else { top }
    }

    fn margin(&self) -> f32 {
        self.radius
    }

    fn local_aabb(&self) -> Aabb3D {
        Aabb3D::from_center_half_extents(
            Vec3::ZERO,
            Vec3::new(self.radius, self.half_height + self.radius, self.radius),
        )
    }
}

fn point_cloud_support(points: &[Vec3], dir: Vec3) -> Vec3 {
    points
        .iter()
        .copied()
        .fold((Vec3::ZERO, f32::NEG_INFINITY), |(best, best_d), p| {
            let d = p.dot(dir);
            if d > best_d { (p, d) } else { (best, best_d) }
        })
        .0
}

impl QueryShape for ConvexHull {
    fn core_support(&self, dir: Vec3) -> Vec3 {
        point_cloud_support(&self.points, dir)
    }

    fn margin(&self) -> f32 {
        0.0
    }

    fn local_aabb(&self) -> Aabb3D {
        Aabb3D::from_points(self.points.iter().copied())
    }
}

impl QueryShape for TriangleMesh {
    fn core_support(&self, dir: Vec3) -> Vec3 {
        point_cloud_support(&self.vertices, dir)
    }

    fn margin(&self) -> f32 {
        0.0
    }

    fn local_aabb(&self) -> Aabb3D {
        Aabb3D::from_points(self.vertices.iter().copied())
    }
}

impl QueryShape for HeightField {
    fn core_support(&self, dir: Vec3) -> Vec3 {
        let mut best = Vec3::ZERO;
        let mut best_d = f32::NEG_INFINITY;
        for row in 0..self.rows {
            for col in 0..self.cols {
                let p = self.vertex(row, col);
                let d = p.dot(dir);
                if d > best_d {
                    best = p;
                    best_d = d;
                }
            }
        }
        best
    }

    fn margin(&self) -> f32 {
        0.0
    }

    fn local_aabb(&self) -> Aabb3D {
        self.sample_bounds()
    }
}

/// A single triangle as a support mapping, used for per-face mesh tests.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct Triangle(pub(crate) [Vec3; 3]);

impl Triangle {
    pub(crate) fn support(&self, dir: Vec3) -> Vec3 {
        point_cloud_support(&self.0, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use glam::Quat;

    #[test]
    fn rotated_box_bounds_grow() {
        let g = Geometry::cuboid(Vec3::new(1.0, 0.5, 0.5));
        let pose = Pose::new(Vec3::ZERO, Quat::from_rotation_z(core::f32::consts::FRAC_PI_2));
        let b = g.world_aabb(&pose);
        assert!((b.max.y - 1.0).abs() < 1e-5, "{b:?}");
        assert!((b.max.x - 0.5).abs() < 1e-5, "{b:?}");
    }

    #[test]
    fn capsule_bounds_follow_axis() {
        let g = Geometry::capsule(0.5, 1.0);
        let b = g.world_aabb(&Pose::from_position(Vec3::new(0.0, 3.0, 0.0)));
        assert_eq!(b, Aabb3D::new(Vec3::new(-0.5, 1.5, -0.5), Vec3::new(0.5, 4.5, 0.5)));
    }

    #[test]
    fn cuboid_support_picks_corner() {
        let c = Cuboid {
            half_extents: Vec3::new(1.0, 2.0, 3.0),
        };
        assert_eq!(c.core_support(Vec3::new(-1.0, 1.0, -0.1)), Vec3::new(-1.0, 2.0, -3.0));
    }

    #[test]
    fn height_field_faces_and_triangles() {
        let hf = HeightField::new(vec![0.0; 9], 3, 3, Vec3::ONE);
        assert_eq!(hf.triangle_count(), 8);
        let [a, b, c] = hf.triangle(0).expect("face 0 exists");
        assert!((b - a).cross(c - a).y > 0.0, "faces point up");
        assert!(hf.triangle(8).is_none());

        let probe = Aabb3D::new(Vec3::new(0.2, -1.0, 0.2), Vec3::new(0.8, 1.0, 0.8));
        let faces: Vec<_> = hf.faces_in(&probe).collect();
        assert_eq!(faces, vec![0, 1]);
        let outside = Aabb3D::new(Vec3::splat(5.0), Vec3::splat(6.0));
        assert_eq!(hf.faces_in(&outside).count(), 0);
    }

    #[test]
    fn mesh_triangle_rejects_bad_indices() {
        let mesh = TriangleMesh {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Z],
            indices: vec![[0, 1, 2], [0, 1, 7]],
        };
        assert!(mesh.triangle(0).is_some());
        assert!(mesh.triangle(1).is_none());
    }
}
