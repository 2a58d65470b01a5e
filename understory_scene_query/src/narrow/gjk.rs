// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GJK closest points between two convex cores given as support functions.
//!
//! The simplex is reduced after every step to the sub-feature nearest the origin,
//! following the closest-point routines in Ericson, *Real-Time Collision Detection*, ch. 5.

use glam::Vec3;
use smallvec::{SmallVec, smallvec};

// Squared distance below which the cores count as touching.
const TOUCH_SQ: f32 = 1.0e-12;
// Relative progress below which the iteration has converged.
const REL_EPS: f32 = 1.0e-6;
const MAX_ITERATIONS: usize = 48;

#[derive(Copy, Clone, Debug)]
struct Vertex {
    // Minkowski difference point `a - b`.
    w: Vec3,
    a: Vec3,
    b: Vec3,
}

type Simplex = SmallVec<[Vertex; 4]>;
type Weights = SmallVec<[f32; 4]>;

/// Closest points between two convex cores.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct Closest {
    /// Distance between the cores; `0` when they intersect.
    pub(crate) distance: f32,
    /// Witness point on the first core.
    pub(crate) point_a: Vec3,
    /// Witness point on the second core.
    pub(crate) point_b: Vec3,
}

impl Closest {
    pub(crate) fn intersecting(&self) -> bool {
        self.distance <= 0.0
    }
}

/// Run GJK on the world-space support functions of two convex sets.
pub(crate) fn closest_points(
    support_a: &dyn Fn(Vec3) -> Vec3,
    support_b: &dyn Fn(Vec3) -> Vec3,
) -> Closest {
    let vertex = |d: Vec3| {
        let a = support_a(d);
        let b = support_b(-d);
        Vertex { w: a - b, a, b }
    };

    let first = vertex(Vec3::X);
    let mut simplex: Simplex = smallvec![first];
    let mut weights: Weights = smallvec![1.0];
    let mut v = first.w;

    for _ in 0..MAX_ITERATIONS {
        let vv = v.length_squared();
        if vv <= TOUCH_SQ {
            return touching(&simplex, &weights);
        }
        let next = vertex(-v);
        if vv - v.dot(next.w) <= REL_EPS * vv {
            break;
        }
        if simplex.iter().any(|s| (s.w - next.w).length_squared() <= TOUCH_SQ) {
            break;
        }
        let mut candidate = simplex.clone();
        candidate.push(next);
        let Some((nv, reduced, nweights)) = solve(&candidate) else {
            // The origin lies inside the tetrahedron.
            return touching(&candidate, &SmallVec::from_slice(&[0.25; 4]));
        };
        if nv.length_squared() >= vv {
            break;
        }
        v = nv;
        simplex = reduced;
        weights = nweights;
    }

    let (point_a, point_b) = witnesses(&simplex, &weights);
    Closest {
        distance: v.length(),
        point_a,
        point_b,
    }
}

fn touching(simplex: &Simplex, weights: &Weights) -> Closest {
    let (point_a, point_b) = witnesses(simplex, weights);
    Closest {
        distance: 0.0,
        point_a,
        point_b,
    }
}

fn witnesses(simplex: &Simplex, weights: &Weights) -> (Vec3, Vec3) {
    simplex
        .iter()
        .zip(weights.iter())
        .fold((Vec3::ZERO, Vec3::ZERO), |(pa, pb), (s, w)| (pa + s.a * *w, pb + s.b * *w))
}

/// Closest point of the simplex to the origin, the sub-simplex supporting it,
/// and its barycentric weights. `None` when a tetrahedron contains the origin.
fn solve(simplex: &Simplex) -> Option<(Vec3, Simplex, Weights)> {
    match simplex.len() {
        1 => Some((simplex[0].w, simplex.clone(), smallvec![1.0])),
        2 => Some(segment(simplex[0], simplex[1])),
        3 => Some(triangle(simplex[0], simplex[1], simplex[2])),
        _ => tetrahedron(simplex[0], simplex[1], simplex[2], simplex[3]),
    }
}

fn segment(a: Vertex, b: Vertex) -> (Vec3, Simplex, Weights) {
    let ab = b.w - a.w;
    let len_sq = ab.length_squared();
    let t = if len_sq <= TOUCH_SQ {
        0.0
    } else {
        -a.w.dot(ab) / len_sq
    };
    if t <= 0.0 {
        (a.w, smallvec![a], smallvec![1.0])
    } else if t >= 1.0 {
        (b.w, smallvec![b], smallvec![1.0])
    } else {
        (a.w + ab * t, smallvec![a, b], smallvec![1.0 - t, t])
    }
}

fn triangle(a: Vertex, b: Vertex, c: Vertex) -> (Vec3, Simplex, Weights) {
    let ab = b.w - a.w;
    let ac = c.w - a.w;
    let ap = -a.w;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (a.w, smallvec![a], smallvec![1.0]);
    }

    let bp = -b.w;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (b.w, smallvec![b], smallvec![1.0]);
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let t = d1 / (d1 - d3);
        return (a.w + ab * t, smallvec![a, b], smallvec![1.0 - t, t]);
    }

    let cp = -c.w;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (c.w, smallvec![c], smallvec![1.0]);
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let t = d2 / (d2 - d6);
        return (a.w + ac * t, smallvec![a, c], smallvec![1.0 - t, t]);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let t = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b.w + (c.w - b.w) * t, smallvec![b, c], smallvec![1.0 - t, t]);
    }

    let denom = va + vb + vc;
    if (-f32::MIN_POSITIVE..=f32::MIN_POSITIVE).contains(&denom) {
        // Degenerate triangle: fall back to its longest edge.
        return segment(a, if ab.length_squared() >= ac.length_squared() { b } else { c });
    }
    let v = vb / denom;
    let w = vc / denom;
    (a.w + ab * v + ac * w, smallvec![a, b, c], smallvec![1.0 - v - w, v, w])
}

fn tetrahedron(a: Vertex, b: Vertex, c: Vertex, d: Vertex) -> Option<(Vec3, Simplex, Weights)> {
    let faces = [(a, b, c, d), (a, c, d, b), (a, d, b, c), (b, d, c, a)];
    let mut best: Option<(Vec3, Simplex, Weights)> = None;
    for (p, q, r, opposite) in faces {
        if !origin_outside_face(p.w, q.w, r.w, opposite.w) {
            continue;
        }
        let found = triangle(p, q, r);
        if best
            .as_ref()
            .is_none_or(|(v, _, _)| found.0.length_squared() < v.length_squared())
        {
            best = Some(found);
        }
    }
    best
}

// Whether the origin and `opposite` lie on different sides of plane `pqr`.
// Degenerate faces count as outside so their triangle gets examined.
fn origin_outside_face(p: Vec3, q: Vec3, r: Vec3, opposite: Vec3) -> bool {
    let n = (q - p).cross(r - p);
    let sign_origin = (-p).dot(n);
    let sign_opposite = (opposite - p).dot(n);
    sign_opposite * sign_opposite <= TOUCH_SQ * n.length_squared()
        || sign_origin * sign_opposite < 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_support(center: Vec3, half: f32) -> impl Fn(Vec3) -> Vec3 {
        move |d: Vec3| {
            center + Vec3::select(d.cmplt(Vec3::ZERO), Vec3::splat(-half), Vec3::splat(half))
        }
    }

    #[test]
    fn separated_cubes_report_gap_and_witnesses() {
        let a = cube_support(Vec3::ZERO, 1.0);
        let b = cube_support(Vec3::new(5.0, 0.5, 0.0), 1.0);
        let c = closest_points(&a, &b);
        assert!((c.distance - 3.0).abs() < 1e-4, "{c:?}");
        assert!((c.point_a.x - 1.0).abs() < 1e-4);
        assert!((c.point_b.x - 4.0).abs() < 1e-4);
    }

    #[test]
    fn overlapping_cubes_intersect() {
        let a = cube_support(Vec3::ZERO, 1.0);
        let b = cube_support(Vec3::new(1.5, 0.2, -0.3), 1.0);
        assert!(closest_points(&a, &b).intersecting());
    }

    #[test]
    fn point_to_segment_distance() {
        let point = |_: Vec3| Vec3::new(0.0, 0.0, 2.0);
        let seg = |d: Vec3| {
            if d.y < 0.0 {
                Vec3::new(0.0, -1.0, 0.0)
            } else {
                Vec3::new(0.0, 1.0, 0.0)
            }
        };
        let c = closest_points(&point, &seg);
        assert!((c.distance - 2.0).abs() < 1e-4, "{c:?}");
        assert!(c.point_b.length() < 1e-4, "closest point is the segment midpoint");
    }
}
