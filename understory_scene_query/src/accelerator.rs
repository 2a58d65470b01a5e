// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Query entry points over one spatial index.

use glam::Vec3;
use understory_query_index::{Aabb3D, Backend, IndexGeneric};

use crate::buffer::HitBuffer;
use crate::filter::QueryFilterCallback;
use crate::geometry::{Geometry, QueryShape};
use crate::narrow::{AnalyticNarrowPhase, NarrowPhase};
use crate::store::{BodySet, BodyStore, ShapeInstance};
use crate::types::{
    ActorHandle, HitFlags, OverlapHit, Pose, QueryFilterData, QueryFlags, QueryStats, RaycastHit,
    SweepHit,
};
use crate::visitor::{OverlapQuery, QueryKind, QueryVisitor, RayQuery, SweepQuery};

/// The three scene-query entry points.
///
/// Every call opens its own scope on `buffer` and closes it before returning, so a
/// lone call leaves the buffer finalized. To merge several calls into one result,
/// hold an outer scope across them (see [`HitBuffer::flush_scope`]).
///
/// Directions must be unit length and distances non-negative. Each call returns the
/// work it performed.
pub trait SpatialAccelerator {
    /// Cast a ray from `origin` along `dir` for up to `max_dist`.
    fn raycast(
        &self,
        origin: Vec3,
        dir: Vec3,
        max_dist: f32,
        buffer: &mut HitBuffer<RaycastHit>,
        output: HitFlags,
        filter: &QueryFilterData,
        callback: &mut dyn QueryFilterCallback,
    ) -> QueryStats;

    /// Sweep `geometry` from `start` along `dir` for up to `max_dist`.
    ///
    /// A sweep of length zero is answered like an overlap at `start`: every hit is a
    /// touch at distance `0`.
    ///
    /// [`HitFlags::MTD`] cannot be combined with [`QueryFlags::ANY_HIT`] or with mesh
    /// and height field sweep geometry; debug builds panic on either.
    fn sweep(
        &self,
        geometry: &Geometry,
        start: &Pose,
        dir: Vec3,
        max_dist: f32,
        buffer: &mut HitBuffer<SweepHit>,
        output: HitFlags,
        filter: &QueryFilterData,
        callback: &mut dyn QueryFilterCallback,
    ) -> QueryStats;

    /// Report shapes overlapping `geometry` at `pose`. Overlap hits never block.
    fn overlap(
        &self,
        geometry: &Geometry,
        pose: &Pose,
        buffer: &mut HitBuffer<OverlapHit>,
        filter: &QueryFilterData,
        callback: &mut dyn QueryFilterCallback,
    ) -> QueryStats;
}

/// One spatial index of actors plus the store that resolves them.
///
/// The index holds one entry per actor, bounding all of its shapes. With a
/// [`BodySet`] store the accelerator keeps both in sync (see
/// [`add_body`](Accelerator::add_body)); other stores manage the index through
/// [`index_mut`](Self::index_mut). Queries see the index as of the last
/// [`commit`](IndexGeneric::commit).
#[derive(Debug)]
pub struct Accelerator<B: Backend, S, N = AnalyticNarrowPhase> {
    index: IndexGeneric<ActorHandle, B>,
    store: S,
    narrow: N,
}

impl<B: Backend, S: BodyStore> Accelerator<B, S> {
    /// Wrap an index and a store, using the analytic narrow phase.
    pub fn new(index: IndexGeneric<ActorHandle, B>, store: S) -> Self {
        Self::with_narrow_phase(index, store, AnalyticNarrowPhase::new())
    }
}

impl<B: Backend, S: BodyStore, N: NarrowPhase> Accelerator<B, S, N> {
    /// Wrap an index and a store with a custom narrow phase.
    pub fn with_narrow_phase(index: IndexGeneric<ActorHandle, B>, store: S, narrow: N) -> Self {
        Self { index, store, narrow }
    }

    /// The spatial index.
    pub fn index(&self) -> &IndexGeneric<ActorHandle, B> {
        &self.index
    }

    /// Mutable access to the spatial index, for stores the accelerator does not manage.
    pub fn index_mut(&mut self) -> &mut IndexGeneric<ActorHandle, B> {
        &mut self.index
    }

    /// The body store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the body store.
    ///
    /// Bodies moved through this reference keep their old index bounds until the
    /// index is updated.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// The narrow phase.
    pub fn narrow_phase(&self) -> &N {
        &self.narrow
    }

    fn visitor<'q, K: QueryKind>(
        &'q self,
        kind: K,
        buffer: &'q mut HitBuffer<K::Hit>,
        output: HitFlags,
        filter: &'q QueryFilterData,
        callback: &'q mut dyn QueryFilterCallback,
    ) -> QueryVisitor<'q, K, S, N> {
        QueryVisitor::new(kind, &self.store, &self.narrow, buffer, filter, callback, output)
    }

    fn sweep_shape<G: QueryShape>(
        &self,
        geometry: &G,
        start: &Pose,
        dir: Vec3,
        max_dist: f32,
        buffer: &mut HitBuffer<SweepHit>,
        output: HitFlags,
        filter: &QueryFilterData,
        callback: &mut dyn QueryFilterCallback,
    ) -> QueryStats {
        let kind = SweepQuery::new(geometry, start, dir, max_dist);
        let bounds = kind.bounds;
        let mut visitor = self.visitor(kind, buffer, output, filter, callback);
        if max_dist > 0.0 {
            self.index.traverse_sweep(&bounds, dir, max_dist, &mut visitor);
        } else {
            self.index.traverse_overlap(&bounds, &mut visitor);
        }
        visitor.stats
    }

    fn overlap_shape<G: QueryShape>(
        &self,
        geometry: &G,
        pose: &Pose,
        buffer: &mut HitBuffer<OverlapHit>,
        filter: &QueryFilterData,
        callback: &mut dyn QueryFilterCallback,
    ) -> QueryStats {
        let kind = OverlapQuery::new(geometry, pose);
        let bounds: Aabb3D = kind.bounds;
        let mut visitor = self.visitor(kind, buffer, HitFlags::empty(), filter, callback);
        self.index.traverse_overlap(&bounds, &mut visitor);
        visitor.stats
    }
}

impl<B: Backend, S: BodyStore, N: NarrowPhase> SpatialAccelerator for Accelerator<B, S, N> {
    fn raycast(
        &self,
        origin: Vec3,
        dir: Vec3,
        max_dist: f32,
        buffer: &mut HitBuffer<RaycastHit>,
        output: HitFlags,
        filter: &QueryFilterData,
        callback: &mut dyn QueryFilterCallback,
    ) -> QueryStats {
        debug_assert!(dir.is_normalized(), "raycast direction must be unit length");
        debug_assert!(max_dist >= 0.0, "raycast distance must be non-negative");
        buffer.inc_flush_count();
        let mut visitor = self.visitor(RayQuery { origin, dir }, buffer, output, filter, callback);
        self.index.traverse_raycast(origin, dir, max_dist, &mut visitor);
        let stats = visitor.stats;
        buffer.dec_flush_count();
        stats
    }

    fn sweep(
        &self,
        geometry: &Geometry,
        start: &Pose,
        dir: Vec3,
        max_dist: f32,
        buffer: &mut HitBuffer<SweepHit>,
        output: HitFlags,
        filter: &QueryFilterData,
        callback: &mut dyn QueryFilterCallback,
    ) -> QueryStats {
        debug_assert!(dir.is_normalized(), "sweep direction must be unit length");
        debug_assert!(max_dist >= 0.0, "sweep distance must be non-negative");
        debug_assert!(
            !(output.contains(HitFlags::MTD) && filter.flags.contains(QueryFlags::ANY_HIT)),
            "any-hit sweeps cannot request MTD"
        );
        debug_assert!(
            !(output.contains(HitFlags::MTD)
                && matches!(geometry, Geometry::TriangleMesh(_) | Geometry::HeightField(_))),
            "mesh and height field sweeps cannot request MTD"
        );
        buffer.inc_flush_count();
        let stats = match geometry {
            Geometry::Sphere(g) => {
                self.sweep_shape(g, start, dir, max_dist, buffer, output, filter, callback)
            }
            Geometry::Cuboid(g) => {
                self.sweep_shape(g, start, dir, max_dist, buffer, output, filter, callback)
            }
            Geometry::Capsule(g) => {
                self.sweep_shape(g, start, dir, max_dist, buffer, output, filter, callback)
            }
            Geometry::ConvexHull(g) => {
                self.sweep_shape(g, start, dir, max_dist, buffer, output, filter, callback)
            }
            Geometry::TriangleMesh(g) => {
                self.sweep_shape(g, start, dir, max_dist, buffer, output, filter, callback)
            }
            Geometry::HeightField(g) => {
                self.sweep_shape(g, start, dir, max_dist, buffer, output, filter, callback)
            }
        };
        buffer.dec_flush_count();
        stats
    }

    fn overlap(
        &self,
        geometry: &Geometry,
        pose: &Pose,
        buffer: &mut HitBuffer<OverlapHit>,
        filter: &QueryFilterData,
        callback: &mut dyn QueryFilterCallback,
    ) -> QueryStats {
        buffer.inc_flush_count();
        let stats = match geometry {
            Geometry::Sphere(g) => self.overlap_shape(g, pose, buffer, filter, callback),
            Geometry::Cuboid(g) => self.overlap_shape(g, pose, buffer, filter, callback),
            Geometry::Capsule(g) => self.overlap_shape(g, pose, buffer, filter, callback),
            Geometry::ConvexHull(g) => self.overlap_shape(g, pose, buffer, filter, callback),
            Geometry::TriangleMesh(g) => self.overlap_shape(g, pose, buffer, filter, callback),
            Geometry::HeightField(g) => self.overlap_shape(g, pose, buffer, filter, callback),
        };
        buffer.dec_flush_count();
        stats
    }
}

impl<B, N> Accelerator<B, BodySet, N>
where
    B: Backend,
    N: NarrowPhase,
{
    /// Add a body and stage its index entry.
    pub fn add_body(&mut self, pose: Pose, shapes: alloc::vec::Vec<ShapeInstance>) -> ActorHandle {
        let actor = self.store.insert(pose, shapes);
        if let Some(body) = self.store.get(actor) {
            let key = self.index.insert(body.bounds, actor);
            self.store.set_proxy(actor, key);
        }
        actor
    }

    /// Remove a body and stage the removal of its index entry. Returns `false` for stale handles.
    pub fn remove_body(&mut self, actor: ActorHandle) -> bool {
        if let Some(key) = self.store.proxy(actor) {
            self.index.remove(key);
        }
        self.store.remove(actor)
    }

    /// Move a body and stage the new bounds. Returns `false` for stale handles.
    pub fn set_body_pose(&mut self, actor: ActorHandle, pose: Pose) -> bool {
        let Some(bounds) = self.store.set_pose(actor, pose) else {
            return false;
        };
        if let Some(key) = self.store.proxy(actor) {
            self.index.update(key, bounds);
        }
        true
    }

    /// Publish staged changes to queries. Returns the number of changes applied.
    pub fn commit(&mut self) -> usize {
        let applied = self.index.commit();
        tracing::debug!(applied, bodies = self.store.len(), "accelerator committed");
        applied
    }
}
