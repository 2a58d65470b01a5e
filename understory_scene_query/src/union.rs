// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fan one query out to several accelerators.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::Debug;

use glam::Vec3;

use crate::accelerator::SpatialAccelerator;
use crate::buffer::HitBuffer;
use crate::filter::QueryFilterCallback;
use crate::geometry::Geometry;
use crate::types::{
    HitFlags, OverlapHit, Pose, QueryFilterData, QueryFlags, QueryHit, QueryStats, RaycastHit,
    SweepHit,
};

/// An ordered, duplicate-free list of accelerators queried as one.
///
/// Each entry point forwards to every member in order against the same buffer,
/// inside one scope of its own, so a direct call finalizes the buffer once, after
/// the last member. Under an outer scope held by the caller the union's scope is
/// nested and the buffer finalizes when the outer scope closes.
///
/// Members must be `Send + Sync` so one union can serve queries from several
/// threads at once.
///
/// ```
/// use std::sync::Arc;
/// use glam::Vec3;
/// use understory_scene_query::{
///     Accelerator, AcceleratorUnion, BlockAll, BodySet, Geometry, HitBuffer, HitFlags, Index,
///     Pose, QueryFilterData, RaycastHit, ShapeInstance, SpatialAccelerator,
/// };
///
/// let mut statics = Accelerator::new(Index::new(), BodySet::new());
/// statics.add_body(
///     Pose::from_position(Vec3::X * 8.0),
///     vec![ShapeInstance::new(Geometry::sphere(1.0))],
/// );
/// statics.commit();
/// let mut dynamics = Accelerator::new(Index::with_bvh(), BodySet::new());
/// dynamics.add_body(
///     Pose::from_position(Vec3::X * 4.0),
///     vec![ShapeInstance::new(Geometry::sphere(1.0))],
/// );
/// dynamics.commit();
///
/// let mut union = AcceleratorUnion::new();
/// union.add_member(Arc::new(statics));
/// union.add_member(Arc::new(dynamics));
///
/// let mut buffer = HitBuffer::<RaycastHit>::new();
/// union.raycast(
///     Vec3::ZERO,
///     Vec3::X,
///     100.0,
///     &mut buffer,
///     HitFlags::default(),
///     &QueryFilterData::blocking(),
///     &mut BlockAll,
/// );
/// assert_eq!(buffer.num_hits(), 1);
/// assert!(buffer.block().is_some_and(|h| (h.distance - 3.0).abs() < 1e-4));
/// ```
#[derive(Clone, Default)]
pub struct AcceleratorUnion {
    members: Vec<UnionMember>,
}

/// A shared accelerator held by an [`AcceleratorUnion`].
pub type UnionMember = Arc<dyn SpatialAccelerator + Send + Sync>;

impl AcceleratorUnion {
    /// Create an empty union.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `member`. Returns `false` if this exact accelerator is already a member.
    pub fn add_member(&mut self, member: UnionMember) -> bool {
        if self.members.iter().any(|m| Arc::ptr_eq(m, &member)) {
            return false;
        }
        self.members.push(member);
        true
    }

    /// Remove `member`, keeping the order of the rest. Returns `false` if it was not a member.
    pub fn remove_member(&mut self, member: &UnionMember) -> bool {
        match self.members.iter().position(|m| Arc::ptr_eq(m, member)) {
            Some(i) => {
                self.members.remove(i);
                true
            }
            None => false,
        }
    }

    /// Members in query order.
    pub fn members(&self) -> &[UnionMember] {
        &self.members
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the union has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl SpatialAccelerator for AcceleratorUnion {
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
        let mut stats = QueryStats::default();
        buffer.inc_flush_count();
        for member in &self.members {
            if stop_fan_out(buffer, filter) {
                break;
            }
            let remaining = remaining(buffer, max_dist);
            stats += member.raycast(origin, dir, remaining, buffer, output, filter, callback);
        }
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
        let mut stats = QueryStats::default();
        buffer.inc_flush_count();
        for member in &self.members {
            if stop_fan_out(buffer, filter) {
                break;
            }
            let remaining = remaining(buffer, max_dist);
            stats += member.sweep(
                geometry,
                start,
                dir,
                remaining,
                buffer,
                output,
                filter,
                callback,
            );
        }
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
        let mut stats = QueryStats::default();
        buffer.inc_flush_count();
        for member in &self.members {
            if stop_fan_out(buffer, filter) {
                break;
            }
            stats += member.overlap(geometry, pose, buffer, filter, callback);
        }
        buffer.dec_flush_count();
        stats
    }
}

// Later members start from the nearest block found so far.
fn remaining<H: QueryHit>(buffer: &HitBuffer<H>, max_dist: f32) -> f32 {
    buffer.block_distance().map_or(max_dist, |d| d.min(max_dist))
}

// An any-hit query is answered by the first member that reports a hit.
fn stop_fan_out<H: QueryHit>(buffer: &HitBuffer<H>, filter: &QueryFilterData) -> bool {
    filter.flags.contains(QueryFlags::ANY_HIT) && buffer.has_pending_hit()
}

impl Debug for AcceleratorUnion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AcceleratorUnion")
            .field("members", &self.members.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accelerator::Accelerator;
    use crate::filter::{BlockAll, TouchAll};
    use crate::store::{BodySet, ShapeInstance};
    use alloc::vec;
    use understory_query_index::Index;

    fn member(xs: &[f32]) -> UnionMember {
        let mut acc = Accelerator::new(Index::new(), BodySet::new());
        for &x in xs {
            acc.add_body(
                Pose::from_position(Vec3::X * x),
                vec![ShapeInstance::new(Geometry::sphere(0.5))],
            );
        }
        acc.commit();
        Arc::new(acc)
    }

    #[test]
    fn members_are_unique_and_ordered() {
        let a = member(&[]);
        let b = member(&[]);
        let mut union = AcceleratorUnion::new();
        assert!(union.add_member(a.clone()));
        assert!(union.add_member(b.clone()));
        assert!(!union.add_member(a.clone()), "duplicates are rejected");
        assert_eq!(union.len(), 2);
        assert!(Arc::ptr_eq(&union.members()[0], &a));
        assert!(union.remove_member(&a));
        assert!(!union.remove_member(&a));
        assert!(Arc::ptr_eq(&union.members()[0], &b));
    }

    #[test]
    fn outer_scope_merges_members_into_one_result() {
        let mut union = AcceleratorUnion::new();
        union.add_member(member(&[2.0, 9.0]));
        union.add_member(member(&[5.0, 7.0]));

        let mut buffer = HitBuffer::<RaycastHit>::new();
        let filter = QueryFilterData::from_flags(QueryFlags::PRE_FILTER);
        let stats = {
            let mut scope = buffer.flush_scope();
            let stats = union.raycast(
                Vec3::ZERO,
                Vec3::X,
                100.0,
                &mut scope,
                HitFlags::default(),
                &filter,
                &mut TouchAll,
            );
            assert!(!scope.is_finalized(), "members must not finalize inside the outer scope");
            stats
        };
        assert!(buffer.is_finalized());
        let distances: Vec<f32> = buffer.hits().iter().filter_map(QueryHit::distance).collect();
        assert_eq!(distances.len(), 4);
        for (got, want) in distances.iter().zip([1.5, 4.5, 6.5, 8.5]) {
            assert!((got - want).abs() < 1e-4, "{distances:?}");
        }
        assert_eq!(stats.narrow_tests, 4);
    }

    #[test]
    fn block_from_one_member_trims_touches_from_another() {
        let mut union = AcceleratorUnion::new();
        union.add_member(member(&[6.0, 8.0]));
        union.add_member(member(&[3.0]));

        let mut buffer = HitBuffer::<RaycastHit>::new();
        {
            let mut scope = buffer.flush_scope();
            union.raycast(
                Vec3::ZERO,
                Vec3::X,
                100.0,
                &mut scope,
                HitFlags::default(),
                &QueryFilterData::blocking(),
                &mut BlockAll,
            );
        }
        assert_eq!(buffer.num_hits(), 1);
        assert!(buffer.block().is_some_and(|h| (h.distance - 2.5).abs() < 1e-4));
    }

    #[test]
    fn overlaps_collect_from_every_member() {
        let mut union = AcceleratorUnion::new();
        union.add_member(member(&[1.0]));
        union.add_member(member(&[-1.0]));
        let mut buffer = HitBuffer::<OverlapHit>::new();
        {
            let mut scope = buffer.flush_scope();
            union.overlap(
                &Geometry::sphere(1.0),
                &Pose::IDENTITY,
                &mut scope,
                &QueryFilterData::default(),
                &mut BlockAll,
            );
        }
        assert_eq!(buffer.num_hits(), 2);
        assert!(!buffer.has_blocking_hit());
    }

    #[test]
    fn direct_call_finalizes_once_after_last_member() {
        let mut union = AcceleratorUnion::new();
        union.add_member(member(&[2.0]));
        union.add_member(member(&[5.0]));

        let mut buffer = HitBuffer::<RaycastHit>::new();
        union.raycast(
            Vec3::ZERO,
            Vec3::X,
            100.0,
            &mut buffer,
            HitFlags::default(),
            &QueryFilterData::blocking(),
            &mut BlockAll,
        );
        assert!(buffer.is_finalized());
        assert_eq!(buffer.flush_depth(), 0);
        assert_eq!(buffer.num_hits(), 1);
        assert!(buffer.block().is_some_and(|h| (h.distance - 1.5).abs() < 1e-4));
    }

    #[test]
    fn direct_call_merges_touches_from_every_member() {
        let mut union = AcceleratorUnion::new();
        union.add_member(member(&[6.0]));
        union.add_member(member(&[2.0]));

        let mut buffer = HitBuffer::<RaycastHit>::new();
        let filter = QueryFilterData::from_flags(QueryFlags::PRE_FILTER);
        union.raycast(
            Vec3::ZERO,
            Vec3::X,
            100.0,
            &mut buffer,
            HitFlags::default(),
            &filter,
            &mut TouchAll,
        );
        let distances: Vec<f32> = buffer.hits().iter().filter_map(QueryHit::distance).collect();
        assert_eq!(distances.len(), 2);
        assert!((distances[0] - 1.5).abs() < 1e-4, "{distances:?}");
        assert!((distances[1] - 5.5).abs() < 1e-4, "{distances:?}");
    }

    #[test]
    fn any_hit_overlap_stops_at_first_member_with_a_hit() {
        let mut union = AcceleratorUnion::new();
        union.add_member(member(&[0.5]));
        union.add_member(member(&[-0.5]));

        let mut buffer = HitBuffer::<OverlapHit>::new();
        let stats = {
            let mut scope = buffer.flush_scope();
            union.overlap(
                &Geometry::sphere(1.0),
                &Pose::IDENTITY,
                &mut scope,
                &QueryFilterData::from_flags(QueryFlags::ANY_HIT),
                &mut BlockAll,
            )
        };
        assert_eq!(buffer.num_hits(), 1);
        assert_eq!(stats.narrow_tests, 1);
    }

    #[test]
    fn any_hit_raycast_skips_later_members() {
        let mut union = AcceleratorUnion::new();
        union.add_member(member(&[]));
        union.add_member(member(&[8.0]));
        union.add_member(member(&[3.0]));

        let mut buffer = HitBuffer::<RaycastHit>::new();
        let stats = union.raycast(
            Vec3::ZERO,
            Vec3::X,
            100.0,
            &mut buffer,
            HitFlags::default(),
            &QueryFilterData::from_flags(QueryFlags::ANY_HIT),
            &mut BlockAll,
        );
        assert_eq!(buffer.num_hits(), 1);
        assert!(buffer.block().is_some_and(|h| (h.distance - 7.5).abs() < 1e-4));
        assert_eq!(stats.narrow_tests, 1);
    }

    #[test]
    fn union_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AcceleratorUnion>();
        assert_send_sync::<UnionMember>();
    }
}
