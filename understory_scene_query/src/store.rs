// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Body storage: resolving index payloads into actors with poses and shapes.

use alloc::vec::Vec;
use core::fmt::Debug;

use understory_query_index::{Aabb3D, Key};

use crate::geometry::Geometry;
use crate::types::{ActorHandle, FilterData, Pose, ShapeFlags, ShapeHandle};

/// One shape attached to an actor.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeInstance {
    handle: ShapeHandle,
    /// Shape geometry in the shape's local frame.
    pub geometry: Geometry,
    /// Pose of the shape relative to its actor.
    pub local_pose: Pose,
    /// Words handed to filter callbacks.
    pub filter_data: FilterData,
    /// Participation flags.
    pub flags: ShapeFlags,
}

impl ShapeInstance {
    /// A scene-query shape at the actor origin with zeroed filter data.
    ///
    /// The handle is assigned when the shape is attached to a body.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            handle: ShapeHandle::new(ActorHandle(u32::MAX, 0), 0),
            geometry,
            local_pose: Pose::IDENTITY,
            filter_data: FilterData::default(),
            flags: ShapeFlags::default(),
        }
    }

    /// Set the pose relative to the actor.
    #[must_use]
    pub fn with_local_pose(mut self, local_pose: Pose) -> Self {
        self.local_pose = local_pose;
        self
    }

    /// Set the filter words.
    #[must_use]
    pub fn with_filter_data(mut self, filter_data: FilterData) -> Self {
        self.filter_data = filter_data;
        self
    }

    /// Set the participation flags.
    #[must_use]
    pub fn with_flags(mut self, flags: ShapeFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Handle of this shape. Only meaningful once attached to a body.
    pub fn handle(&self) -> ShapeHandle {
        self.handle
    }

    /// Bind the shape to `actor` at position `index`. For custom body stores.
    pub fn attach(&mut self, actor: ActorHandle, index: u32) {
        self.handle = ShapeHandle::new(actor, index);
    }

    /// World-space bounds when the owning actor sits at `actor_pose`.
    pub fn world_aabb(&self, actor_pose: &Pose) -> Aabb3D {
        self.geometry.world_aabb(&actor_pose.compose(&self.local_pose))
    }
}

/// Borrowed view of one actor, as resolved from an index payload.
#[derive(Copy, Clone, Debug)]
pub struct BodyView<'a> {
    /// The actor.
    pub actor: ActorHandle,
    /// World pose of the actor.
    pub pose: Pose,
    /// Current world bounds of all shapes.
    pub bounds: Aabb3D,
    /// Attached shapes.
    pub shapes: &'a [ShapeInstance],
}

/// Resolves index payloads into bodies.
///
/// Lookups may legitimately fail, for example when a body was removed after the
/// index last committed; queries skip such payloads.
pub trait BodyStore {
    /// Look up `actor`. Stale handles yield `None`.
    fn resolve(&self, actor: ActorHandle) -> Option<BodyView<'_>>;
}

#[derive(Clone, Debug)]
struct Body {
    generation: u32,
    pose: Pose,
    bounds: Aabb3D,
    shapes: Vec<ShapeInstance>,
    proxy: Option<Key>,
}

impl Body {
    fn recompute_bounds(&mut self) {
        self.bounds = self
            .shapes
            .iter()
            .fold(Aabb3D::EMPTY, |acc, s| acc.union(&s.world_aabb(&self.pose)));
    }
}

/// Arena of bodies addressed by generational [`ActorHandle`]s.
#[derive(Clone, Default)]
pub struct BodySet {
    bodies: Vec<Option<Body>>,
    generations: Vec<u32>,
    free_list: Vec<usize>,
}

impl BodySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a body and return its handle. Shapes are attached in order.
    pub fn insert(&mut self, pose: Pose, shapes: Vec<ShapeInstance>) -> ActorHandle {
        let idx = match self.free_list.pop() {
            Some(idx) => idx,
            None => {
                self.bodies.push(None);
                self.generations.push(0);
                self.bodies.len() - 1
            }
        };
        let generation = self.generations[idx].wrapping_add(1);
        self.generations[idx] = generation;
        let actor = ActorHandle::from_raw_parts(slot_id(idx), generation);
        let mut body = Body {
            generation,
            pose,
            bounds: Aabb3D::EMPTY,
            shapes,
            proxy: None,
        };
        for (i, shape) in body.shapes.iter_mut().enumerate() {
            shape.attach(actor, slot_id(i));
        }
        body.recompute_bounds();
        self.bodies[idx] = Some(body);
        actor
    }

    /// Remove a body. Returns `false` for stale handles.
    pub fn remove(&mut self, actor: ActorHandle) -> bool {
        if self.body(actor).is_none() {
            return false;
        }
        self.bodies[actor.idx()] = None;
        self.free_list.push(actor.idx());
        true
    }

    /// Move a body and return its new world bounds.
    pub fn set_pose(&mut self, actor: ActorHandle, pose: Pose) -> Option<Aabb3D> {
        let body = self.body_mut(actor)?;
        body.pose = pose;
        body.recompute_bounds();
        Some(body.bounds)
    }

    /// Borrow a body.
    pub fn get(&self, actor: ActorHandle) -> Option<BodyView<'_>> {
        self.body(actor).map(|b| BodyView {
            actor,
            pose: b.pose,
            bounds: b.bounds,
            shapes: &b.shapes,
        })
    }

    /// Whether `actor` refers to a live body.
    pub fn contains(&self, actor: ActorHandle) -> bool {
        self.body(actor).is_some()
    }

    /// Number of live bodies.
    pub fn len(&self) -> usize {
        self.bodies.iter().flatten().count()
    }

    /// Whether the set holds no bodies.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn proxy(&self, actor: ActorHandle) -> Option<Key> {
        self.body(actor)?.proxy
    }

    pub(crate) fn set_proxy(&mut self, actor: ActorHandle, key: Key) {
        if let Some(body) = self.body_mut(actor) {
            body.proxy = Some(key);
        }
    }

    fn body(&self, actor: ActorHandle) -> Option<&Body> {
        let b = self.bodies.get(actor.idx())?.as_ref()?;
        (b.generation == actor.generation()).then_some(b)
    }

    fn body_mut(&mut self, actor: ActorHandle) -> Option<&mut Body> {
        let b = self.bodies.get_mut(actor.idx())?.as_mut()?;
        (b.generation == actor.generation()).then_some(b)
    }
}

impl BodyStore for BodySet {
    fn resolve(&self, actor: ActorHandle) -> Option<BodyView<'_>> {
        self.get(actor)
    }
}

impl Debug for BodySet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BodySet")
            .field("total_slots", &self.bodies.len())
            .field("alive", &self.len())
            .finish_non_exhaustive()
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "Handles are 32-bit; stores beyond u32::MAX slots are unsupported."
)]
fn slot_id(idx: usize) -> u32 {
    idx as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use glam::Vec3;

    #[test]
    fn bounds_cover_all_shapes() {
        let mut set = BodySet::new();
        let a = set.insert(
            Pose::from_position(Vec3::new(10.0, 0.0, 0.0)),
            vec![
                ShapeInstance::new(Geometry::sphere(1.0)),
                ShapeInstance::new(Geometry::cuboid(Vec3::splat(0.5)))
                    .with_local_pose(Pose::from_position(Vec3::new(0.0, 3.0, 0.0))),
            ],
        );
        let view = set.get(a).expect("live body");
        assert_eq!(view.bounds, Aabb3D::new(Vec3::new(9.0, -1.0, -1.0), Vec3::new(11.0, 3.5, 1.0)));
        assert_eq!(view.shapes[1].handle(), ShapeHandle::new(a, 1));
    }

    #[test]
    fn stale_handles_do_not_resolve() {
        let mut set = BodySet::new();
        let a = set.insert(Pose::IDENTITY, vec![ShapeInstance::new(Geometry::sphere(1.0))]);
        assert!(set.remove(a));
        assert!(!set.remove(a));
        let b = set.insert(Pose::IDENTITY, vec![]);
        assert_eq!(a.index(), b.index(), "slot is reused");
        assert!(set.resolve(a).is_none());
        assert!(set.resolve(b).is_some());
        assert!(set.set_pose(a, Pose::IDENTITY).is_none());
    }

    #[test]
    fn set_pose_moves_bounds() {
        let mut set = BodySet::new();
        let a = set.insert(Pose::IDENTITY, vec![ShapeInstance::new(Geometry::sphere(1.0))]);
        let moved = set.set_pose(a, Pose::from_position(Vec3::Y * 5.0)).expect("live body");
        assert_eq!(moved.center(), Vec3::Y * 5.0);
    }
}
