// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The candidate visitor shared by all query kinds.
//!
//! The index delivers actor payloads; the visitor resolves each into a body, runs
//! the filter pipeline and narrow phase for every shape, stores hits into the
//! caller's [`HitBuffer`], and shrinks the live ray on blocking hits so the index
//! prunes everything farther away.

use glam::Vec3;
use understory_query_index::{
    Aabb3D, OverlapVisitor, RayState, RaycastVisitor, SweepVisitor, Traversal,
};

use crate::buffer::HitBuffer;
use crate::filter::QueryFilterCallback;
use crate::geometry::QueryShape;
use crate::narrow::{NarrowPhase, ShapeHit};
use crate::store::{BodyStore, ShapeInstance};
use crate::types::{
    ActorHandle, FilterResult, HitFlags, LocationHit, OverlapHit, Pose, QueryFilterData,
    QueryFlags, QueryHit, QueryStats, ShapeFlags,
};

/// Per-kind behavior plugged into [`QueryVisitor`].
pub(crate) trait QueryKind {
    type Hit: QueryHit;

    /// Whether hits of this query may block.
    fn can_block(&self) -> bool;

    /// Whether a block at distance zero ends the query outright.
    fn stops_at_zero(&self, single_result: bool) -> bool;

    /// Whether the query can reach `bounds` within the remaining length.
    fn reaches(&self, bounds: &Aabb3D, state: Option<&RayState>) -> bool;

    /// Exact test of one shape at its world pose, bounded by `length`.
    fn test<N: NarrowPhase>(
        &self,
        narrow: &N,
        actor: ActorHandle,
        shape: &ShapeInstance,
        pose: &Pose,
        length: f32,
        output: HitFlags,
    ) -> Option<Self::Hit>;
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct RayQuery {
    pub(crate) origin: Vec3,
    pub(crate) dir: Vec3,
}

impl QueryKind for RayQuery {
    type Hit = LocationHit;

    fn can_block(&self) -> bool {
        true
    }

    fn stops_at_zero(&self, _: bool) -> bool {
        true
    }

    fn reaches(&self, bounds: &Aabb3D, state: Option<&RayState>) -> bool {
        state.is_none_or(|s| bounds.ray_entry(self.origin, s.inv_dir, s.length()).is_some())
    }

    fn test<N: NarrowPhase>(
        &self,
        narrow: &N,
        actor: ActorHandle,
        shape: &ShapeInstance,
        pose: &Pose,
        length: f32,
        output: HitFlags,
    ) -> Option<LocationHit> {
        narrow
            .raycast(&shape.geometry, pose, self.origin, self.dir, length, output)
            .map(|hit| location_hit(actor, shape, hit, output))
    }
}

#[derive(Debug)]
pub(crate) struct SweepQuery<'g, G> {
    pub(crate) geometry: &'g G,
    pub(crate) pose: Pose,
    pub(crate) dir: Vec3,
    /// World bounds of the geometry at the start pose.
    pub(crate) bounds: Aabb3D,
    pub(crate) can_block: bool,
}

impl<'g, G: QueryShape> SweepQuery<'g, G> {
    pub(crate) fn new(geometry: &'g G, pose: &Pose, dir: Vec3, max_dist: f32) -> Self {
        Self {
            geometry,
            pose: *pose,
            dir,
            bounds: geometry.world_aabb(pose),
            can_block: max_dist > 0.0,
        }
    }
}

impl<G: QueryShape> QueryKind for SweepQuery<'_, G> {
    type Hit = LocationHit;

    fn can_block(&self) -> bool {
        self.can_block
    }

    fn stops_at_zero(&self, single_result: bool) -> bool {
        single_result
    }

    fn reaches(&self, bounds: &Aabb3D, state: Option<&RayState>) -> bool {
        match state {
            Some(s) => bounds
                .inflated(self.bounds.half_extents())
                .ray_entry(s.origin, s.inv_dir, s.length())
                .is_some(),
            None => bounds.intersects(&self.bounds),
        }
    }

    fn test<N: NarrowPhase>(
        &self,
        narrow: &N,
        actor: ActorHandle,
        shape: &ShapeInstance,
        pose: &Pose,
        length: f32,
        output: HitFlags,
    ) -> Option<LocationHit> {
        if length > 0.0 {
            return narrow
                .sweep(self.geometry, &self.pose, self.dir, length, &shape.geometry, pose, output)
                .map(|hit| location_hit(actor, shape, hit, output));
        }
        narrow.overlap(self.geometry, &self.pose, &shape.geometry, pose).then(|| {
            let hit = ShapeHit {
                distance: 0.0,
                position: self.pose.position,
                normal: -self.dir,
                face_index: None,
            };
            location_hit(actor, shape, hit, output)
        })
    }
}

#[derive(Debug)]
pub(crate) struct OverlapQuery<'g, G> {
    pub(crate) geometry: &'g G,
    pub(crate) pose: Pose,
    pub(crate) bounds: Aabb3D,
}

impl<'g, G: QueryShape> OverlapQuery<'g, G> {
    pub(crate) fn new(geometry: &'g G, pose: &Pose) -> Self {
        Self {
            geometry,
            pose: *pose,
            bounds: geometry.world_aabb(pose),
        }
    }
}

impl<G: QueryShape> QueryKind for OverlapQuery<'_, G> {
    type Hit = OverlapHit;

    fn can_block(&self) -> bool {
        false
    }

    fn stops_at_zero(&self, _: bool) -> bool {
        false
    }

    fn reaches(&self, bounds: &Aabb3D, _: Option<&RayState>) -> bool {
        bounds.intersects(&self.bounds)
    }

    fn test<N: NarrowPhase>(
        &self,
        narrow: &N,
        actor: ActorHandle,
        shape: &ShapeInstance,
        pose: &Pose,
        _: f32,
        _: HitFlags,
    ) -> Option<OverlapHit> {
        narrow
            .overlap(self.geometry, &self.pose, &shape.geometry, pose)
            .then(|| OverlapHit {
                actor,
                shape: shape.handle(),
            })
    }
}

fn location_hit(
    actor: ActorHandle,
    shape: &ShapeInstance,
    hit: ShapeHit,
    output: HitFlags,
) -> LocationHit {
    let mut flags = output & (HitFlags::POSITION | HitFlags::NORMAL);
    let face_index = hit.face_index.filter(|_| output.contains(HitFlags::FACE_INDEX));
    if face_index.is_some() {
        flags |= HitFlags::FACE_INDEX;
    }
    LocationHit {
        actor,
        shape: shape.handle(),
        distance: hit.distance,
        position: hit.position,
        normal: hit.normal,
        face_index,
        flags,
    }
}

/// Drives the filter pipeline and narrow phase for one query over one accelerator.
pub(crate) struct QueryVisitor<'q, K: QueryKind, S, N> {
    pub(crate) kind: K,
    store: &'q S,
    narrow: &'q N,
    buffer: &'q mut HitBuffer<K::Hit>,
    filter: &'q QueryFilterData,
    callback: &'q mut dyn QueryFilterCallback,
    output: HitFlags,
    pub(crate) stats: QueryStats,
}

impl<'q, K, S, N> QueryVisitor<'q, K, S, N>
where
    K: QueryKind,
    S: BodyStore,
    N: NarrowPhase,
{
    pub(crate) fn new(
        kind: K,
        store: &'q S,
        narrow: &'q N,
        buffer: &'q mut HitBuffer<K::Hit>,
        filter: &'q QueryFilterData,
        callback: &'q mut dyn QueryFilterCallback,
        output: HitFlags,
    ) -> Self {
        Self {
            kind,
            store,
            narrow,
            buffer,
            filter,
            callback,
            output,
            stats: QueryStats::default(),
        }
    }

    fn visit(&mut self, actor: ActorHandle, mut state: Option<&mut RayState>) -> Traversal {
        self.stats.candidates += 1;
        let store = self.store;
        let Some(body) = store.resolve(actor) else {
            tracing::trace!(?actor, "skipping unresolved payload");
            return Traversal::Continue;
        };
        if body.shapes.len() > 1 && !self.kind.reaches(&body.bounds, state.as_deref()) {
            return Traversal::Continue;
        }
        let flags = self.filter.flags;
        let any_hit = flags.contains(QueryFlags::ANY_HIT);
        let single = self.buffer.wants_single_result();

        for shape in body.shapes {
            if !shape.flags.contains(ShapeFlags::SCENE_QUERY) {
                continue;
            }
            let pre = if flags.contains(QueryFlags::PRE_FILTER) {
                self.callback.pre_filter(&self.filter.data, shape, actor)
            } else {
                FilterResult::Block
            };
            if pre == FilterResult::None {
                continue;
            }

            let pose = body.pose.compose(&shape.local_pose);
            let length = state.as_deref().map_or(0.0, RayState::length);
            self.stats.narrow_tests += 1;
            let Some(hit) = self
                .kind
                .test(self.narrow, actor, shape, &pose, length, self.output)
            else {
                continue;
            };

            let result = if flags.contains(QueryFlags::POST_FILTER) {
                self.callback.post_filter(&self.filter.data, shape, &hit)
            } else {
                pre
            };
            if result == FilterResult::None {
                continue;
            }

            let blocking =
                self.kind.can_block() && (result == FilterResult::Block || any_hit || single);
            let distance = hit.distance().unwrap_or(0.0);
            if blocking {
                debug_assert!(
                    self.buffer.block_distance().is_none_or(|d| distance <= d),
                    "a new block is never farther than the previous one"
                );
                if let Some(state) = state.as_deref_mut() {
                    state.shrink(distance);
                }
            }
            self.buffer.insert_hit(hit, blocking);

            if any_hit {
                tracing::trace!(?actor, "any-hit query satisfied");
                return Traversal::Stop;
            }
            if blocking && distance <= 0.0 && self.kind.stops_at_zero(single) {
                return Traversal::Stop;
            }
        }
        Traversal::Continue
    }
}

impl<K: QueryKind, S: BodyStore, N: NarrowPhase> RaycastVisitor<ActorHandle>
    for QueryVisitor<'_, K, S, N>
{
    fn visit_raycast(
        &mut self,
        payload: &ActorHandle,
        _: &Aabb3D,
        state: &mut RayState,
    ) -> Traversal {
        self.visit(*payload, Some(state))
    }
}

impl<K: QueryKind, S: BodyStore, N: NarrowPhase> SweepVisitor<ActorHandle>
    for QueryVisitor<'_, K, S, N>
{
    fn visit_sweep(
        &mut self,
        payload: &ActorHandle,
        _: &Aabb3D,
        state: &mut RayState,
    ) -> Traversal {
        self.visit(*payload, Some(state))
    }
}

impl<K: QueryKind, S: BodyStore, N: NarrowPhase> OverlapVisitor<ActorHandle>
    for QueryVisitor<'_, K, S, N>
{
    fn visit_overlap(&mut self, payload: &ActorHandle, _: &Aabb3D) -> Traversal {
        self.visit(*payload, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{BlockAll, TouchAll};
    use crate::geometry::{Geometry, Sphere};
    use crate::narrow::AnalyticNarrowPhase;
    use crate::store::BodySet;
    use alloc::vec;

    fn two_sphere_body() -> (BodySet, ActorHandle) {
        let mut set = BodySet::new();
        let a = set.insert(
            Pose::IDENTITY,
            vec![
                ShapeInstance::new(Geometry::sphere(0.5))
                    .with_local_pose(Pose::from_position(Vec3::X * 6.0)),
                ShapeInstance::new(Geometry::sphere(0.5))
                    .with_local_pose(Pose::from_position(Vec3::X * 3.0)),
            ],
        );
        (set, a)
    }

    #[test]
    fn block_within_a_body_shrinks_for_later_shapes() {
        let (set, a) = two_sphere_body();
        let narrow = AnalyticNarrowPhase::new();
        let mut buffer = HitBuffer::new();
        let filter = QueryFilterData::blocking();
        let mut callback = BlockAll;
        let mut state = RayState::new(Vec3::ZERO, Vec3::X, 100.0);
        buffer.inc_flush_count();
        let mut visitor = QueryVisitor::new(
            RayQuery {
                origin: Vec3::ZERO,
                dir: Vec3::X,
            },
            &set,
            &narrow,
            &mut buffer,
            &filter,
            &mut callback,
            HitFlags::default(),
        );
        assert_eq!(visitor.visit_raycast(&a, &Aabb3D::EMPTY, &mut state), Traversal::Continue);
        assert_eq!(visitor.stats.narrow_tests, 2);
        buffer.dec_flush_count();
        assert!((state.length() - 2.5).abs() < 1e-4, "{}", state.length());
        assert_eq!(buffer.num_hits(), 1);
        assert_eq!(buffer.block().map(|h| h.shape.index()), Some(1));
    }

    #[test]
    fn multi_shape_body_outside_the_ray_is_not_tested() {
        let (set, a) = two_sphere_body();
        let narrow = AnalyticNarrowPhase::new();
        let mut buffer = HitBuffer::new();
        let filter = QueryFilterData::blocking();
        let mut callback = BlockAll;
        let mut state = RayState::new(Vec3::Y * 5.0, Vec3::X, 100.0);
        buffer.inc_flush_count();
        let mut visitor = QueryVisitor::new(
            RayQuery {
                origin: Vec3::Y * 5.0,
                dir: Vec3::X,
            },
            &set,
            &narrow,
            &mut buffer,
            &filter,
            &mut callback,
            HitFlags::default(),
        );
        visitor.visit_raycast(&a, &Aabb3D::EMPTY, &mut state);
        assert_eq!(visitor.stats.candidates, 1);
        assert_eq!(visitor.stats.narrow_tests, 0);
        buffer.dec_flush_count();
    }

    #[test]
    fn zero_length_sweep_reports_touches_at_the_start() {
        let (set, a) = two_sphere_body();
        let narrow = AnalyticNarrowPhase::new();
        let mut buffer = HitBuffer::new();
        let filter = QueryFilterData::blocking();
        let mut callback = TouchAll;
        let query = Sphere { radius: 1.0 };
        let pose = Pose::from_position(Vec3::X * 3.5);
        buffer.inc_flush_count();
        let mut visitor = QueryVisitor::new(
            SweepQuery::new(&query, &pose, Vec3::X, 0.0),
            &set,
            &narrow,
            &mut buffer,
            &filter,
            &mut callback,
            HitFlags::default(),
        );
        visitor.visit_overlap(&a, &Aabb3D::EMPTY);
        buffer.dec_flush_count();
        assert!(!buffer.has_blocking_hit(), "zero-length sweeps only touch");
        assert_eq!(buffer.num_hits(), 1);
        let hit = buffer.hits()[0];
        assert_eq!(hit.distance, 0.0);
        assert_eq!(hit.normal, -Vec3::X);
        assert_eq!(hit.position, pose.position);
    }
}
