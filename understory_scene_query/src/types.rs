// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public value types: handles, poses, filter data, flags, and hit records.

use core::fmt::Debug;

use glam::{Quat, Vec3};

/// Handle to an actor (a body) in a [`BodyStore`](crate::store::BodyStore).
///
/// A slot index plus a generation counter. A handle becomes stale once its slot is
/// freed; reusing the slot bumps the generation so stale handles never alias a new body.
/// Hits and the spatial index only hold handles and never keep a body alive.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ActorHandle(pub(crate) u32, pub(crate) u32);

impl ActorHandle {
    /// Build a handle from a slot index and a generation, for custom body stores.
    pub const fn from_raw_parts(index: u32, generation: u32) -> Self {
        Self(index, generation)
    }

    /// Slot index.
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Generation of the slot when this handle was issued.
    pub const fn generation(self) -> u32 {
        self.1
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Handle to one shape attached to an actor.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ShapeHandle {
    actor: ActorHandle,
    index: u32,
}

impl ShapeHandle {
    /// The shape at position `index` of `actor`'s shape list.
    pub const fn new(actor: ActorHandle, index: u32) -> Self {
        Self { actor, index }
    }

    /// Owning actor.
    pub const fn actor(self) -> ActorHandle {
        self.actor
    }

    /// Position within the actor's shape list.
    pub const fn index(self) -> u32 {
        self.index
    }
}

/// Rigid transform: rotation followed by translation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pose {
    /// Translation.
    pub position: Vec3,
    /// Unit rotation.
    pub rotation: Quat,
}

impl Pose {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// Create a pose from a translation and a unit rotation.
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        debug_assert!(rotation.is_normalized(), "pose rotation must be a unit quaternion");
        Self { position, rotation }
    }

    /// A pure translation.
    pub const fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Map a local point into the parent frame.
    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation * p + self.position
    }

    /// Map a local direction into the parent frame.
    #[inline]
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        self.rotation * v
    }

    /// Map a parent-frame point into local space.
    #[inline]
    pub fn inverse_transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation.inverse() * (p - self.position)
    }

    /// Map a parent-frame direction into local space.
    #[inline]
    pub fn inverse_transform_vector(&self, v: Vec3) -> Vec3 {
        self.rotation.inverse() * v
    }

    /// The inverse transform.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            position: rotation * -self.position,
            rotation,
        }
    }

    /// `self * local`: the pose of a child expressed in this pose's parent frame.
    pub fn compose(&self, local: &Self) -> Self {
        Self {
            position: self.transform_point(local.position),
            rotation: (self.rotation * local.rotation).normalize(),
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Outcome of a filter callback for one shape or hit.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FilterResult {
    /// Ignore the shape or discard the hit.
    None,
    /// Record as a touching hit; the query continues past it.
    Touch,
    /// Record as a blocking hit; nothing beyond it is reported.
    Block,
}

/// Four opaque filter words.
///
/// Both queries and shapes carry one; their meaning belongs to the filter callback.
/// [`LayerMaskFilter`](crate::filter::LayerMaskFilter) gives one concrete interpretation.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct FilterData {
    /// Word 0.
    pub word0: u32,
    /// Word 1.
    pub word1: u32,
    /// Word 2.
    pub word2: u32,
    /// Word 3.
    pub word3: u32,
}

impl FilterData {
    /// Filter data with the given words.
    pub const fn new(word0: u32, word1: u32, word2: u32, word3: u32) -> Self {
        Self {
            word0,
            word1,
            word2,
            word3,
        }
    }
}

bitflags::bitflags! {
    /// Per-query switches controlling filtering and termination.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct QueryFlags: u8 {
        /// Consult [`QueryFilterCallback::pre_filter`](crate::filter::QueryFilterCallback::pre_filter)
        /// before the narrow phase. Without it every shape is treated as blocking.
        const PRE_FILTER  = 0b0000_0001;
        /// Consult [`QueryFilterCallback::post_filter`](crate::filter::QueryFilterCallback::post_filter)
        /// for every geometric hit. Without it the pre-filter result is kept.
        const POST_FILTER = 0b0000_0010;
        /// Any qualifying hit answers the query; traversal stops at the first one.
        const ANY_HIT     = 0b0000_0100;
    }
}

bitflags::bitflags! {
    /// Which hit fields a query asks for, and which a hit actually carries.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct HitFlags: u16 {
        /// World-space contact position.
        const POSITION        = 0b0000_0001;
        /// World-space surface normal.
        const NORMAL          = 0b0000_0010;
        /// Triangle index for meshes and height fields.
        const FACE_INDEX      = 0b0000_0100;
        /// For sweeps that start in overlap, derive the normal from the
        /// minimum translation direction instead of the sweep direction.
        const MTD             = 0b0000_1000;
        /// Report ray hits on back faces of meshes and height fields.
        const MESH_BOTH_SIDES = 0b0001_0000;
    }
}

impl Default for HitFlags {
    fn default() -> Self {
        Self::POSITION | Self::NORMAL | Self::FACE_INDEX
    }
}

bitflags::bitflags! {
    /// Per-shape participation flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ShapeFlags: u8 {
        /// The shape takes part in raycasts, sweeps, and overlaps.
        const SCENE_QUERY = 0b0000_0001;
    }
}

impl Default for ShapeFlags {
    fn default() -> Self {
        Self::SCENE_QUERY
    }
}

/// Caller-owned filtering input for one query.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct QueryFilterData {
    /// Words passed to the filter callback.
    pub data: FilterData,
    /// Filtering and termination switches.
    pub flags: QueryFlags,
}

impl QueryFilterData {
    /// Filter data with the given words and flags.
    pub const fn new(data: FilterData, flags: QueryFlags) -> Self {
        Self { data, flags }
    }

    /// No callbacks, no any-hit: every geometric hit blocks.
    pub const fn blocking() -> Self {
        Self {
            data: FilterData::new(0, 0, 0, 0),
            flags: QueryFlags::empty(),
        }
    }

    /// Only the flags; all filter words zero.
    pub const fn from_flags(flags: QueryFlags) -> Self {
        Self {
            data: FilterData::new(0, 0, 0, 0),
            flags,
        }
    }
}

/// Common view over the hit records produced by the three query kinds.
///
/// Object safe so post-filters can inspect any hit through `&dyn QueryHit`.
pub trait QueryHit: Debug {
    /// Actor that owns the hit shape.
    fn actor(&self) -> ActorHandle;
    /// Hit shape.
    fn shape(&self) -> ShapeHandle;
    /// Distance along the query direction; `None` for overlaps.
    fn distance(&self) -> Option<f32>;
    /// Triangle index for meshes and height fields.
    fn face_index(&self) -> Option<u32>;
    /// World-space contact position, if computed.
    fn position(&self) -> Option<Vec3>;
    /// World-space normal, if computed.
    fn normal(&self) -> Option<Vec3>;
}

/// A raycast or sweep hit: a located contact along the query direction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LocationHit {
    /// Actor that owns the hit shape.
    pub actor: ActorHandle,
    /// Hit shape.
    pub shape: ShapeHandle,
    /// Distance along the query direction.
    pub distance: f32,
    /// World-space contact position. Valid when `flags` contains `POSITION`.
    pub position: Vec3,
    /// World-space normal facing the query. Valid when `flags` contains `NORMAL`.
    pub normal: Vec3,
    /// Triangle index for meshes and height fields.
    pub face_index: Option<u32>,
    /// Which of the optional fields were computed.
    pub flags: HitFlags,
}

/// Hit record of a raycast.
pub type RaycastHit = LocationHit;
/// Hit record of a sweep.
pub type SweepHit = LocationHit;

impl QueryHit for LocationHit {
    fn actor(&self) -> ActorHandle {
        self.actor
    }

    fn shape(&self) -> ShapeHandle {
        self.shape
    }

    fn distance(&self) -> Option<f32> {
        Some(self.distance)
    }

    fn face_index(&self) -> Option<u32> {
        self.face_index
    }

    fn position(&self) -> Option<Vec3> {
        self.flags.contains(HitFlags::POSITION).then_some(self.position)
    }

    fn normal(&self) -> Option<Vec3> {
        self.flags.contains(HitFlags::NORMAL).then_some(self.normal)
    }
}

/// Hit record of an overlap. Overlaps have no distance and always touch.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct OverlapHit {
    /// Actor that owns the overlapping shape.
    pub actor: ActorHandle,
    /// Overlapping shape.
    pub shape: ShapeHandle,
}

impl QueryHit for OverlapHit {
    fn actor(&self) -> ActorHandle {
        self.actor
    }

    fn shape(&self) -> ShapeHandle {
        self.shape
    }

    fn distance(&self) -> Option<f32> {
        None
    }

    fn face_index(&self) -> Option<u32> {
        None
    }

    fn position(&self) -> Option<Vec3> {
        None
    }

    fn normal(&self) -> Option<Vec3> {
        None
    }
}

/// Work counters for one query call.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct QueryStats {
    /// Index candidates delivered to the visitor.
    pub candidates: usize,
    /// Shapes that reached the narrow phase.
    pub narrow_tests: usize,
}

impl core::ops::AddAssign for QueryStats {
    fn add_assign(&mut self, rhs: Self) {
        self.candidates += rhs.candidates;
        self.narrow_tests += rhs.narrow_tests;
    }
}
