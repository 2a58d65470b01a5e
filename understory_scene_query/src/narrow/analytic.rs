// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reference narrow phase: analytic rays, GJK-driven sweeps and overlaps.

use core::ops::ControlFlow;

use glam::Vec3;
use understory_query_index::Aabb3D;

#[cfg(not(feature = "std"))]
use crate::math::FloatFuncs as _;

use super::gjk;
use super::{NarrowPhase, ShapeHit};
use crate::geometry::{
    Capsule, Geometry, HeightField, QueryShape, Triangle, TriangleMesh, transform_aabb,
};
use crate::types::{HitFlags, Pose};

// Below this, a direction component or determinant counts as zero.
const PARALLEL_EPS: f32 = 1.0e-9;

/// Tuning for the iterative parts of [`AnalyticNarrowPhase`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NarrowPhaseConfig {
    /// Gap at which a sweep counts as touching.
    pub tolerance: f32,
    /// Conservative-advancement steps before a sweep gives up and reports a miss.
    pub max_iterations: u32,
}

impl Default for NarrowPhaseConfig {
    fn default() -> Self {
        Self {
            tolerance: 1.0e-4,
            max_iterations: 64,
        }
    }
}

/// Narrow phase with closed-form rays for spheres, boxes, and capsules,
/// Möller–Trumbore for triangles, and conservative advancement over GJK for
/// convex sweeps and hull raycasts.
#[derive(Copy, Clone, Debug, Default)]
pub struct AnalyticNarrowPhase {
    config: NarrowPhaseConfig,
}

// Contact found by conservative advancement; `point` lies on the target surface.
#[derive(Copy, Clone, Debug)]
struct Contact {
    distance: f32,
    normal: Vec3,
    point: Vec3,
}

// Ray hit in the target's local frame.
#[derive(Copy, Clone, Debug)]
struct LocalRayHit {
    t: f32,
    normal: Vec3,
    face: Option<u32>,
}

impl AnalyticNarrowPhase {
    /// Narrow phase with default tolerances.
    pub fn new() -> Self {
        Self::default()
    }

    /// Narrow phase with explicit tolerances.
    pub fn with_config(config: NarrowPhaseConfig) -> Self {
        debug_assert!(config.tolerance > 0.0, "narrow-phase tolerance must be positive");
        Self { config }
    }

    /// Current configuration.
    pub fn config(&self) -> NarrowPhaseConfig {
        self.config
    }

    /// Advance shape `a` along `dir` until it comes within tolerance of `b`.
    fn advance(
        &self,
        a: &dyn Fn(Vec3) -> Vec3,
        margin_a: f32,
        b: &dyn Fn(Vec3) -> Vec3,
        margin_b: f32,
        dir: Vec3,
        max_dist: f32,
        mtd: bool,
    ) -> Option<Contact> {
        let margin = margin_a + margin_b;
        let mut t = 0.0_f32;
        let mut normal = -dir;
        for _ in 0..self.config.max_iterations {
            let offset = dir * t;
            let moved = move |d: Vec3| a(d) + offset;
            let closest = gjk::closest_points(&moved, b);
            let separated = !closest.intersecting();
            if separated {
                normal = (closest.point_a - closest.point_b) / closest.distance;
            }
            let gap = closest.distance - margin;
            if gap <= self.config.tolerance {
                if t <= 0.0 {
                    let normal = if mtd && separated { normal } else { -dir };
                    return Some(Contact {
                        distance: 0.0,
                        normal,
                        point: closest.point_b + normal * margin_b,
                    });
                }
                return Some(Contact {
                    distance: t,
                    normal,
                    point: closest.point_b + normal * margin_b,
                });
            }
            let closing = -dir.dot(normal);
            if closing <= PARALLEL_EPS {
                return None;
            }
            t += gap / closing;
            if t > max_dist {
                return None;
            }
        }
        None
    }

    fn ray_convex(
        &self,
        hull: &dyn QueryShape,
        origin: Vec3,
        dir: Vec3,
        max_dist: f32,
    ) -> Option<LocalRayHit> {
        let point = move |_: Vec3| origin;
        let support = |d: Vec3| hull.core_support(d);
        self.advance(&point, 0.0, &support, hull.margin(), dir, max_dist, false)
            .map(|c| LocalRayHit {
                t: c.distance,
                normal: c.normal,
                face: None,
            })
    }

    fn sweep_triangles(
        &self,
        query: &dyn Fn(Vec3) -> Vec3,
        query_margin: f32,
        swept: &Aabb3D,
        dir: Vec3,
        max_dist: f32,
        target: &Geometry,
        target_pose: &Pose,
        mtd: bool,
    ) -> Option<ShapeHit> {
        let mut best: Option<ShapeHit> = None;
        visit_faces(target, target_pose, swept, &mut |face, tri| {
            let limit = best.map_or(max_dist, |b| b.distance);
            let tri = Triangle(tri);
            let support = |d: Vec3| tri.support(d);
            if let Some(c) = self.advance(query, query_margin, &support, 0.0, dir, limit, mtd)
                && best.is_none_or(|b| c.distance < b.distance)
            {
                best = Some(ShapeHit {
                    distance: c.distance,
                    position: c.point,
                    normal: c.normal,
                    face_index: Some(face),
                });
                if c.distance <= 0.0 {
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        });
        best
    }
}

impl NarrowPhase for AnalyticNarrowPhase {
    fn raycast(
        &self,
        target: &Geometry,
        target_pose: &Pose,
        origin: Vec3,
        dir: Vec3,
        max_dist: f32,
        flags: HitFlags,
    ) -> Option<ShapeHit> {
        debug_assert!(dir.is_normalized(), "ray direction must be unit length");
        let o = target_pose.inverse_transform_point(origin);
        let d = target_pose.inverse_transform_vector(dir);
        let both_sides = flags.contains(HitFlags::MESH_BOTH_SIDES);
        let hit = match target {
            Geometry::Sphere(s) => ray_sphere(o, d, s.radius, max_dist),
            Geometry::Cuboid(c) => ray_box(o, d, c.half_extents, max_dist),
            Geometry::Capsule(c) => ray_capsule(o, d, c, max_dist),
            Geometry::ConvexHull(h) => self.ray_convex(h, o, d, max_dist),
            Geometry::TriangleMesh(m) => ray_mesh(o, d, m, max_dist, both_sides),
            Geometry::HeightField(h) => ray_height_field(o, d, h, max_dist, both_sides),
        }?;
        Some(ShapeHit {
            distance: hit.t,
            position: origin + dir * hit.t,
            normal: target_pose.transform_vector(hit.normal),
            face_index: hit.face,
        })
    }

    fn sweep<G: QueryShape>(
        &self,
        query: &G,
        start: &Pose,
        dir: Vec3,
        max_dist: f32,
        target: &Geometry,
        target_pose: &Pose,
        flags: HitFlags,
    ) -> Option<ShapeHit> {
        debug_assert!(dir.is_normalized(), "sweep direction must be unit length");
        let mtd = flags.contains(HitFlags::MTD);
        let a = world_support(query, start);
        match convex_target(target) {
            Some(shape) => {
                let b = world_support(shape, target_pose);
                self.advance(&a, query.margin(), &b, shape.margin(), dir, max_dist, mtd)
                    .map(|c| ShapeHit {
                        distance: c.distance,
                        position: c.point,
                        normal: c.normal,
                        face_index: None,
                    })
            }
            None => {
                let at_start = query.world_aabb(start);
                let swept = at_start.union(&Aabb3D::new(
                    at_start.min + dir * max_dist,
                    at_start.max + dir * max_dist,
                ));
                self.sweep_triangles(
                    &a,
                    query.margin(),
                    &swept,
                    dir,
                    max_dist,
                    target,
                    target_pose,
                    mtd,
                )
            }
        }
    }

    fn overlap<G: QueryShape>(
        &self,
        query: &G,
        pose: &Pose,
        target: &Geometry,
        target_pose: &Pose,
    ) -> bool {
        let a = world_support(query, pose);
        match convex_target(target) {
            Some(shape) => {
                let b = world_support(shape, target_pose);
                gjk::closest_points(&a, &b).distance <= query.margin() + shape.margin()
            }
            None => {
                let region = query.world_aabb(pose);
                let mut found = false;
                visit_faces(target, target_pose, &region, &mut |_, tri| {
                    let tri = Triangle(tri);
                    let support = |d: Vec3| tri.support(d);
                    if gjk::closest_points(&a, &support).distance <= query.margin() {
                        found = true;
                        return ControlFlow::Break(());
                    }
                    ControlFlow::Continue(())
                });
                found
            }
        }
    }
}

fn convex_target(target: &Geometry) -> Option<&dyn QueryShape> {
    match target {
        Geometry::Sphere(s) => Some(s),
        Geometry::Cuboid(c) => Some(c),
        Geometry::Capsule(c) => Some(c),
        Geometry::ConvexHull(h) => Some(h),
        Geometry::TriangleMesh(_) | Geometry::HeightField(_) => None,
    }
}

fn world_support<'a>(shape: &'a dyn QueryShape, pose: &'a Pose) -> impl Fn(Vec3) -> Vec3 + 'a {
    move |d: Vec3| pose.transform_point(shape.core_support(pose.inverse_transform_vector(d)))
}

// Visit the world-space triangles of a mesh or height field whose bounds meet `region`.
fn visit_faces(
    target: &Geometry,
    pose: &Pose,
    region: &Aabb3D,
    f: &mut dyn FnMut(u32, [Vec3; 3]) -> ControlFlow<()>,
) {
    let to_world = |tri: [Vec3; 3]| tri.map(|p| pose.transform_point(p));
    match target {
        Geometry::TriangleMesh(mesh) => {
            for face in 0..mesh.triangle_count() {
                let Some(tri) = mesh.triangle(face).map(to_world) else {
                    continue;
                };
                if Aabb3D::from_points(tri).intersects(region)
                    && f(face_id(face), tri).is_break()
                {
                    return;
                }
            }
        }
        Geometry::HeightField(hf) => {
            let local = transform_aabb(region, &pose.inverse());
            for face in hf.faces_in(&local) {
                let Some(tri) = hf.triangle(face).map(to_world) else {
                    continue;
                };
                if f(face_id(face), tri).is_break() {
                    return;
                }
            }
        }
        _ => {}
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "Face counts above u32::MAX are clamped rather than wrapped."
)]
fn face_id(face: usize) -> u32 {
    face.min(u32::MAX as usize) as u32
}

fn ray_sphere(o: Vec3, d: Vec3, radius: f32, max_dist: f32) -> Option<LocalRayHit> {
    let b = o.dot(d);
    let c = o.length_squared() - radius * radius;
    if c <= 0.0 {
        return Some(inside(d));
    }
    if b > 0.0 {
        return None;
    }
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let t = -b - disc.sqrt();
    (t <= max_dist).then(|| LocalRayHit {
        t,
        normal: (o + d * t).normalize_or(-d),
        face: None,
    })
}

fn ray_box(o: Vec3, d: Vec3, half_extents: Vec3, max_dist: f32) -> Option<LocalRayHit> {
    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = max_dist;
    let mut normal = Vec3::ZERO;
    for axis in 0..3 {
        let (oa, da, ha) = (o[axis], d[axis], half_extents[axis]);
        if da.abs() < PARALLEL_EPS {
            if oa < -ha || oa > ha {
                return None;
            }
            continue;
        }
        let inv = 1.0 / da;
        let (mut t1, mut t2) = ((-ha - oa) * inv, (ha - oa) * inv);
        let mut sign = -1.0;
        if t1 > t2 {
            core::mem::swap(&mut t1, &mut t2);
            sign = 1.0;
        }
        if t1 > t_near {
            t_near = t1;
            normal = Vec3::ZERO;
            normal[axis] = sign;
        }
        t_far = t_far.min(t2);
        if t_near > t_far || t_far < 0.0 {
            return None;
        }
    }
    if t_near <= 0.0 {
        return Some(inside(d));
    }
    Some(LocalRayHit {
        t: t_near,
        normal,
        face: None,
    })
}

fn ray_capsule(o: Vec3, d: Vec3, capsule: &Capsule, max_dist: f32) -> Option<LocalRayHit> {
    let (r, hh) = (capsule.radius, capsule.half_height);
    let axis_point = Vec3::new(0.0, o.y.clamp(-hh, hh), 0.0);
    if (o - axis_point).length_squared() <= r * r {
        return Some(inside(d));
    }

    let mut best: Option<LocalRayHit> = None;
    let a = d.x * d.x + d.z * d.z;
    if a > PARALLEL_EPS {
        let b = o.x * d.x + o.z * d.z;
        let c = o.x * o.x + o.z * o.z - r * r;
        let disc = b * b - a * c;
        if disc >= 0.0 {
            let t = (-b - disc.sqrt()) / a;
            let p = o + d * t;
            if t >= 0.0 && t <= max_dist && p.y.abs() <= hh {
                best = Some(LocalRayHit {
                    t,
                    normal: Vec3::new(p.x, 0.0, p.z).normalize_or(-d),
                    face: None,
                });
            }
        }
    }
    for cap_y in [-hh, hh] {
        let center = Vec3::new(0.0, cap_y, 0.0);
        let Some(hit) = ray_sphere(o - center, d, r, max_dist) else {
            continue;
        };
        let y = o.y + d.y * hit.t;
        let beyond_end = if cap_y < 0.0 { y <= cap_y } else { y >= cap_y };
        if beyond_end && best.is_none_or(|b| hit.t < b.t) {
            best = Some(hit);
        }
    }
    best
}

fn ray_triangle(
    o: Vec3,
    d: Vec3,
    [a, b, c]: [Vec3; 3],
    max_dist: f32,
    both_sides: bool,
) -> Option<(f32, Vec3)> {
    let e1 = b - a;
    let e2 = c - a;
    let p = d.cross(e2);
    let det = e1.dot(p);
    // det > 0 exactly when the ray meets the counter-clockwise front face.
    if det < PARALLEL_EPS && (!both_sides || det > -PARALLEL_EPS) {
        return None;
    }
    let inv = 1.0 / det;
    let s = o - a;
    let u = s.dot(p) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = d.dot(q) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv;
    if t < 0.0 || t > max_dist {
        return None;
    }
    let n = e1.cross(e2).normalize_or(-d);
    Some((t, if n.dot(d) > 0.0 { -n } else { n }))
}

fn ray_mesh(
    o: Vec3,
    d: Vec3,
    mesh: &TriangleMesh,
    max_dist: f32,
    both_sides: bool,
) -> Option<LocalRayHit> {
    let mut best: Option<LocalRayHit> = None;
    for face in 0..mesh.triangle_count() {
        let Some(tri) = mesh.triangle(face) else {
            continue;
        };
        let limit = best.map_or(max_dist, |b| b.t);
        if let Some((t, normal)) = ray_triangle(o, d, tri, limit, both_sides)
            && best.is_none_or(|b| t < b.t)
        {
            best = Some(LocalRayHit {
                t,
                normal,
                face: Some(face_id(face)),
            });
        }
    }
    best
}

fn ray_height_field(
    o: Vec3,
    d: Vec3,
    hf: &HeightField,
    max_dist: f32,
    both_sides: bool,
) -> Option<LocalRayHit> {
    let bounds = QueryShape::local_aabb(hf);
    let (near, far) = ray_span(&bounds, o, d, max_dist)?;
    let region = Aabb3D::from_points([o + d * near, o + d * far]);
    let mut best: Option<LocalRayHit> = None;
    for face in hf.faces_in(&region) {
        let Some(tri) = hf.triangle(face) else {
            continue;
        };
        let limit = best.map_or(max_dist, |b| b.t);
        if let Some((t, normal)) = ray_triangle(o, d, tri, limit, both_sides)
            && best.is_none_or(|b| t < b.t)
        {
            best = Some(LocalRayHit {
                t,
                normal,
                face: Some(face_id(face)),
            });
        }
    }
    best
}

// Parameter interval of the ray inside `bounds`, clipped to `[0, max_dist]`.
fn ray_span(bounds: &Aabb3D, o: Vec3, d: Vec3, max_dist: f32) -> Option<(f32, f32)> {
    let mut near = 0.0_f32;
    let mut far = max_dist;
    for axis in 0..3 {
        let (oa, da) = (o[axis], d[axis]);
        if da.abs() < PARALLEL_EPS {
            if oa < bounds.min[axis] || oa > bounds.max[axis] {
                return None;
            }
            continue;
        }
        let t1 = (bounds.min[axis] - oa) / da;
        let t2 = (bounds.max[axis] - oa) / da;
        near = near.max(t1.min(t2));
        far = far.min(t1.max(t2));
    }
    (near <= far).then_some((near, far))
}

fn inside(d: Vec3) -> LocalRayHit {
    LocalRayHit {
        t: 0.0,
        normal: -d,
        face: None,
    }
}
