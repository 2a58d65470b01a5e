// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binary bounding hierarchy backend with SAH-like splits and nearest-first traversal.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;

use glam::Vec3;
use smallvec::SmallVec;

use crate::backend::Backend;
use crate::types::Aabb3D;
use crate::visit::{RayState, Traversal};

/// A simple BVH backend using SAH-like splits.
pub struct BVH {
    max_leaf: usize,
    root: Option<NodeIdx>,
    arena: Vec<Node>,
    slots: Vec<Option<Aabb3D>>,
}

enum Kind {
    Leaf(Vec<(usize, Aabb3D)>),
    Internal { left: NodeIdx, right: NodeIdx },
}

struct Node {
    bbox: Aabb3D,
    kind: Kind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct NodeIdx(usize);

impl NodeIdx {
    const fn new(i: usize) -> Self {
        Self(i)
    }

    const fn get(self) -> usize {
        self.0
    }
}

impl Default for BVH {
    fn default() -> Self {
        Self::with_max_leaf(8)
    }
}

// Reduce clippy::type_complexity noise for local helpers.
type BvhItem = (usize, Aabb3D);
type BvhItems = Vec<BvhItem>;
type BvhBestSplit = Option<(f64, usize, usize)>;
type Stack = SmallVec<[(NodeIdx, f32); 32]>;

impl BVH {
    /// Create an empty BVH whose leaves split once they hold more than `max_leaf` items.
    pub fn with_max_leaf(max_leaf: usize) -> Self {
        debug_assert!(max_leaf >= 4, "BVH leaves must hold at least 4 items to split");
        Self {
            max_leaf: max_leaf.max(4),
            root: None,
            arena: Vec::new(),
            slots: Vec::new(),
        }
    }

    fn ensure_slot(&mut self, slot: usize, bbox: Aabb3D) {
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, || None);
        }
        self.slots[slot] = Some(bbox);
    }

    fn bbox_items(items: &[BvhItem]) -> Aabb3D {
        items
            .iter()
            .fold(Aabb3D::EMPTY, |acc, (_, bb)| acc.union(bb))
    }

    /// SAH-like split: sort along each axis, precompute prefix/suffix AABBs, and
    /// choose `k` that minimizes `area(LB_k) * k + area(RB_k) * (n - k)`.
    fn split_sah(mut items: BvhItems, max_leaf: usize) -> (BvhItems, BvhItems) {
        let n = items.len();
        let min_children = (max_leaf / 2).max(2).min(n.saturating_sub(2));
        let mut best: BvhBestSplit = None;
        for axis in 0..3 {
            Self::sort_by_centroid(&mut items, axis);
            let (prefix, suffix) = Self::prefix_suffix(&items);
            for k in min_children..=(n - min_children) {
                let cost = prefix[k - 1].surface_area() * k as f64
                    + suffix[k].surface_area() * (n - k) as f64;
                if best.as_ref().is_none_or(|(bc, _, _)| cost < *bc) {
                    best = Some((cost, axis, k));
                }
            }
        }
        let (axis, k) = best.map_or((0, n / 2), |(_, axis, k)| (axis, k));
        Self::sort_by_centroid(&mut items, axis);
        let right = items.split_off(k);
        (items, right)
    }

    fn sort_by_centroid(items: &mut [BvhItem], axis: usize) {
        items.sort_by(|a, b| {
            let ca = a.1.center()[axis];
            let cb = b.1.center()[axis];
            ca.partial_cmp(&cb).unwrap_or(core::cmp::Ordering::Equal)
        });
    }

    // Precompute prefix/suffix bboxes for O(1) split evaluation.
    fn prefix_suffix(items: &[BvhItem]) -> (Vec<Aabb3D>, Vec<Aabb3D>) {
        let mut prefix = Vec::with_capacity(items.len());
        let mut acc = Aabb3D::EMPTY;
        for (_, bb) in items {
            acc = acc.union(bb);
            prefix.push(acc);
        }
        let mut suffix = vec![Aabb3D::EMPTY; items.len()];
        let mut acc = Aabb3D::EMPTY;
        for (i, (_, bb)) in items.iter().enumerate().rev() {
            acc = acc.union(bb);
            suffix[i] = acc;
        }
        (prefix, suffix)
    }

    fn insert_node(
        arena: &mut Vec<Node>,
        node_idx: usize,
        slot: usize,
        bbox: Aabb3D,
        max_leaf: usize,
    ) {
        let kind = core::mem::replace(&mut arena[node_idx].kind, Kind::Leaf(Vec::new()));
        match kind {
            Kind::Leaf(mut items) => {
                items.push((slot, bbox));
                let mut node_bbox = arena[node_idx].bbox.union(&bbox);
                let new_kind = if items.len() > max_leaf {
                    let (l, r) = Self::split_sah(items, max_leaf);
                    let l_idx = arena.len();
                    arena.push(Node {
                        bbox: Self::bbox_items(&l),
                        kind: Kind::Leaf(l),
                    });
                    let r_idx = arena.len();
                    arena.push(Node {
                        bbox: Self::bbox_items(&r),
                        kind: Kind::Leaf(r),
                    });
                    node_bbox = arena[l_idx].bbox.union(&arena[r_idx].bbox);
                    Kind::Internal {
                        left: NodeIdx::new(l_idx),
                        right: NodeIdx::new(r_idx),
                    }
                } else {
                    Kind::Leaf(items)
                };
                arena[node_idx].kind = new_kind;
                arena[node_idx].bbox = node_bbox;
            }
            Kind::Internal { left, right } => {
                let lb = arena[left.get()].bbox;
                let rb = arena[right.get()].bbox;
                let cost_l = lb.union(&bbox).surface_area() - lb.surface_area();
                let cost_r = rb.union(&bbox).surface_area() - rb.surface_area();
                if cost_l <= cost_r {
                    Self::insert_node(arena, left.get(), slot, bbox, max_leaf);
                } else {
                    Self::insert_node(arena, right.get(), slot, bbox, max_leaf);
                }
                let node_bbox = arena[node_idx].bbox.union(&bbox);
                arena[node_idx].kind = Kind::Internal { left, right };
                arena[node_idx].bbox = node_bbox;
            }
        }
    }

    fn remove_node(arena: &mut Vec<Node>, node_idx: usize, slot: usize, old: &Aabb3D) -> bool {
        if !arena[node_idx].bbox.intersects(old) {
            return false;
        }
        let kind = core::mem::replace(&mut arena[node_idx].kind, Kind::Leaf(Vec::new()));
        let (new_kind, new_bbox, removed) = match kind {
            Kind::Leaf(mut items) => {
                let before = items.len();
                items.retain(|(s, _)| *s != slot);
                let removed = items.len() != before;
                let bbox = Self::bbox_items(&items);
                (Kind::Leaf(items), bbox, removed)
            }
            Kind::Internal { left, right } => {
                let removed = Self::remove_node(arena, left.get(), slot, old)
                    | Self::remove_node(arena, right.get(), slot, old);
                let is_left_empty =
                    matches!(arena[left.get()].kind, Kind::Leaf(ref v) if v.is_empty());
                let is_right_empty =
                    matches!(arena[right.get()].kind, Kind::Leaf(ref v) if v.is_empty());
                if removed && is_left_empty && !is_right_empty {
                    let kind =
                        core::mem::replace(&mut arena[right.get()].kind, Kind::Leaf(Vec::new()));
                    (kind, arena[right.get()].bbox, true)
                } else if removed && is_right_empty && !is_left_empty {
                    let kind =
                        core::mem::replace(&mut arena[left.get()].kind, Kind::Leaf(Vec::new()));
                    (kind, arena[left.get()].bbox, true)
                } else {
                    let bbox = arena[left.get()].bbox.union(&arena[right.get()].bbox);
                    (Kind::Internal { left, right }, bbox, removed)
                }
            }
        };
        arena[node_idx].kind = new_kind;
        arena[node_idx].bbox = new_bbox;
        removed
    }

    // Push the children reached by the ray, farther first so the nearer one pops next.
    fn push_children(
        &self,
        stack: &mut Stack,
        left: NodeIdx,
        right: NodeIdx,
        state: &RayState,
        inflate: Vec3,
    ) {
        let hit = |n: NodeIdx| {
            self.arena[n.get()]
                .bbox
                .inflated(inflate)
                .ray_entry(state.origin, state.inv_dir, state.length())
                .map(|t| (n, t))
        };
        match (hit(left), hit(right)) {
            (Some(l), Some(r)) => {
                let (near, far) = if l.1 <= r.1 { (l, r) } else { (r, l) };
                stack.push(far);
                stack.push(near);
            }
            (Some(only), None) | (None, Some(only)) => stack.push(only),
            (None, None) => {}
        }
    }
}

impl Backend for BVH {
    fn insert(&mut self, slot: usize, aabb: Aabb3D) {
        self.ensure_slot(slot, aabb);
        match self.root {
            None => {
                let idx = self.arena.len();
                self.arena.push(Node {
                    bbox: aabb,
                    kind: Kind::Leaf(vec![(slot, aabb)]),
                });
                self.root = Some(NodeIdx::new(idx));
            }
            Some(root_idx) => {
                Self::insert_node(&mut self.arena, root_idx.get(), slot, aabb, self.max_leaf);
            }
        }
    }

    fn update(&mut self, slot: usize, aabb: Aabb3D) {
        if let Some(old) = self.slots.get(slot).and_then(|x| *x)
            && let Some(root_idx) = self.root
        {
            let _ = Self::remove_node(&mut self.arena, root_idx.get(), slot, &old);
        }
        self.insert(slot, aabb);
    }

    fn remove(&mut self, slot: usize) {
        if let Some(old) = self.slots.get(slot).and_then(|x| *x)
            && let Some(root_idx) = self.root
        {
            let _ = Self::remove_node(&mut self.arena, root_idx.get(), slot, &old);
            if let Some(s) = self.slots.get_mut(slot) {
                *s = None;
            }
        }
    }

    fn clear(&mut self) {
        self.root = None;
        self.arena.clear();
        self.slots.clear();
    }

    fn raycast(
        &self,
        state: &mut RayState,
        inflate: Vec3,
        visit: &mut dyn FnMut(usize, &Aabb3D, &mut RayState) -> Traversal,
    ) -> Traversal {
        let Some(root_idx) = self.root else {
            return Traversal::Continue;
        };
        let Some(t_root) = self.arena[root_idx.get()]
            .bbox
            .inflated(inflate)
            .ray_entry(state.origin, state.inv_dir, state.length())
        else {
            return Traversal::Continue;
        };
        let mut stack: Stack = SmallVec::new();
        stack.push((root_idx, t_root));
        while let Some((i, t_enter)) = stack.pop() {
            // The ray may have shrunk since this node was pushed.
            if t_enter > state.length() {
                continue;
            }
            match &self.arena[i.get()].kind {
                Kind::Leaf(items) => {
                    for (s, b) in items {
                        if b.inflated(inflate)
                            .ray_entry(state.origin, state.inv_dir, state.length())
                            .is_some()
                            && visit(*s, b, state) == Traversal::Stop
                        {
                            return Traversal::Stop;
                        }
                    }
                }
                Kind::Internal { left, right } => {
                    self.push_children(&mut stack, *left, *right, state, inflate);
                }
            }
        }
        Traversal::Continue
    }

    fn overlap(
        &self,
        bounds: &Aabb3D,
        visit: &mut dyn FnMut(usize, &Aabb3D) -> Traversal,
    ) -> Traversal {
        let Some(root_idx) = self.root else {
            return Traversal::Continue;
        };
        let mut stack: SmallVec<[NodeIdx; 32]> = SmallVec::new();
        stack.push(root_idx);
        while let Some(i) = stack.pop() {
            let n = &self.arena[i.get()];
            if !n.bbox.intersects(bounds) {
                continue;
            }
            match &n.kind {
                Kind::Leaf(items) => {
                    for (s, b) in items {
                        if b.intersects(bounds) && visit(*s, b) == Traversal::Stop {
                            return Traversal::Stop;
                        }
                    }
                }
                Kind::Internal { left, right } => {
                    stack.push(*right);
                    stack.push(*left);
                }
            }
        }
        Traversal::Continue
    }
}

impl Debug for BVH {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let total = self.slots.len();
        let alive = self.slots.iter().filter(|e| e.is_some()).count();
        let has_root = self.root.is_some();
        f.debug_struct("BVH")
            .field("max_leaf", &self.max_leaf)
            .field("arena_nodes", &self.arena.len())
            .field("total_slots", &total)
            .field("alive", &alive)
            .field("has_root", &has_root)
            .finish_non_exhaustive()
    }
}
