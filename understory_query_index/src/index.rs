// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public `Index` API and generic implementation over a pluggable backend.

use alloc::vec::Vec;
use core::fmt::Debug;

use glam::Vec3;

use crate::backend::Backend;
use crate::types::Aabb3D;
use crate::visit::{OverlapVisitor, RayState, RaycastVisitor, SweepVisitor, Traversal};

/// Generational handle for entries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key(u32, u32);

impl Key {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Index keys are intentionally 32-bit; higher bits are truncated by design."
    )]
    const fn new(idx: usize, generation: u32) -> Self {
        Self(idx as u32, generation)
    }

    const fn idx(self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mark {
    Added,
    Updated,
    Removed,
}

#[derive(Clone, Debug)]
struct Entry<P> {
    generation: u32,
    aabb: Aabb3D,
    payload: P,
    mark: Option<Mark>,
}

/// A 3D AABB index parameterized by a spatial backend.
///
/// Mutations are staged and only reach the backend on [`commit`](Self::commit);
/// traversals always see the bounds as of the last commit.
#[derive(Debug)]
pub struct IndexGeneric<P: Copy + Debug, B: Backend> {
    entries: Vec<Option<Entry<P>>>,
    // Last generation handed out per slot; survives removal so reused slots get fresh keys.
    generations: Vec<u32>,
    free_list: Vec<usize>,
    backend: B,
}

impl<P, B> IndexGeneric<P, B>
where
    P: Copy + Debug,
    B: Backend + Default,
{
    /// Create an empty index using the backend's default constructor.
    pub fn new() -> Self {
        Self::with_backend(B::default())
    }
}

impl<P, B> IndexGeneric<P, B>
where
    P: Copy + Debug,
    B: Backend,
{
    /// Create an empty index around an explicitly configured backend.
    pub fn with_backend(backend: B) -> Self {
        Self {
            entries: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            backend,
        }
    }

    /// Reserve space for at least `n` entries.
    pub fn reserve(&mut self, n: usize) {
        self.entries.reserve(n);
    }

    /// Insert a new AABB with payload. Returns a stable handle `Key`.
    pub fn insert(&mut self, aabb: Aabb3D, payload: P) -> Key {
        let entry = |generation| Entry {
            generation,
            aabb,
            payload,
            mark: Some(Mark::Added),
        };
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].wrapping_add(1);
            self.generations[idx] = generation;
            self.entries[idx] = Some(entry(generation));
            (idx, generation)
        } else {
            self.entries.push(Some(entry(1)));
            self.generations.push(1);
            (self.entries.len() - 1, 1)
        };
        Key::new(idx, generation)
    }

    /// Update an existing AABB. Stale keys are ignored.
    pub fn update(&mut self, key: Key, aabb: Aabb3D) {
        if let Some(e) = self.entry_mut(key) {
            e.aabb = aabb;
            e.mark = Some(match e.mark {
                Some(Mark::Added) => Mark::Added,
                _ => Mark::Updated,
            });
        }
    }

    /// Remove an existing AABB. Stale keys are ignored.
    pub fn remove(&mut self, key: Key) {
        if let Some(e) = self.entry_mut(key) {
            if matches!(e.mark, Some(Mark::Added)) {
                self.entries[key.idx()] = None;
                self.free_list.push(key.idx());
            } else {
                e.mark = Some(Mark::Removed);
            }
        }
    }

    /// Clear the index and its backend.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.generations.clear();
        self.free_list.clear();
        self.backend.clear();
    }

    /// Apply pending changes to the backend. Returns the number of changes applied.
    pub fn commit(&mut self) -> usize {
        let mut applied = 0;
        for i in 0..self.entries.len() {
            let Some(entry) = self.entries[i].as_mut() else {
                continue;
            };
            match entry.mark.take() {
                Some(Mark::Added) => self.backend.insert(i, entry.aabb),
                Some(Mark::Updated) => self.backend.update(i, entry.aabb),
                Some(Mark::Removed) => {
                    self.backend.remove(i);
                    self.entries[i] = None;
                    self.free_list.push(i);
                }
                None => continue,
            }
            applied += 1;
        }
        applied
    }

    /// Number of live entries, including those pending insertion.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .flatten()
            .filter(|e| e.mark != Some(Mark::Removed))
            .count()
    }

    /// Whether the index holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current (possibly uncommitted) bounds and payload for `key`.
    pub fn get(&self, key: Key) -> Option<(Aabb3D, P)> {
        let e = self.entries.get(key.idx())?.as_ref()?;
        if e.generation != key.1 || e.mark == Some(Mark::Removed) {
            return None;
        }
        Some((e.aabb, e.payload))
    }

    /// Drive `visitor` with every committed entry whose bounds the ray
    /// `origin + t * dir`, `t` in `[0, max_dist]`, reaches.
    ///
    /// The visitor may shrink the ray; the traversal honors the shrunk length
    /// for every candidate delivered afterwards.
    pub fn traverse_raycast<V: RaycastVisitor<P>>(
        &self,
        origin: Vec3,
        dir: Vec3,
        max_dist: f32,
        visitor: &mut V,
    ) -> Traversal {
        let mut state = RayState::new(origin, dir, max_dist);
        self.traverse_ray_state(&mut state, Vec3::ZERO, &mut |payload, bounds, state| {
            visitor.visit_raycast(payload, bounds, state)
        })
    }

    /// Drive `visitor` with every committed entry that a box with the extents of
    /// `bounds` reaches while moving along `dir` for up to `max_dist`.
    ///
    /// The ray starts at the center of `bounds` and candidate boxes are inflated
    /// by its half-extents.
    pub fn traverse_sweep<V: SweepVisitor<P>>(
        &self,
        bounds: &Aabb3D,
        dir: Vec3,
        max_dist: f32,
        visitor: &mut V,
    ) -> Traversal {
        let mut state = RayState::new(bounds.center(), dir, max_dist);
        self.traverse_ray_state(&mut state, bounds.half_extents(), &mut |payload, bounds, state| {
            visitor.visit_sweep(payload, bounds, state)
        })
    }

    /// Drive `visitor` with every committed entry whose bounds intersect `bounds`.
    pub fn traverse_overlap<V: OverlapVisitor<P>>(
        &self,
        bounds: &Aabb3D,
        visitor: &mut V,
    ) -> Traversal {
        self.backend.overlap(bounds, &mut |slot, aabb| match self.payload(slot) {
            Some(payload) => visitor.visit_overlap(payload, aabb),
            None => Traversal::Continue,
        })
    }

    fn traverse_ray_state(
        &self,
        state: &mut RayState,
        inflate: Vec3,
        visit: &mut dyn FnMut(&P, &Aabb3D, &mut RayState) -> Traversal,
    ) -> Traversal {
        self.backend
            .raycast(state, inflate, &mut |slot, aabb, state| match self.payload(slot) {
                Some(payload) => visit(payload, aabb, state),
                None => Traversal::Continue,
            })
    }

    fn payload(&self, slot: usize) -> Option<&P> {
        self.entries.get(slot)?.as_ref().map(|e| &e.payload)
    }

    fn entry_mut(&mut self, key: Key) -> Option<&mut Entry<P>> {
        let e = self.entries.get_mut(key.idx())?.as_mut()?;
        if e.generation != key.1 || e.mark == Some(Mark::Removed) {
            return None;
        }
        Some(e)
    }
}

// Debug is derived above; backends implement Debug with concise, partial output.

/// Default index using a flat vector backend.
pub type Index<P> = IndexGeneric<P, crate::backends::flatvec::FlatVec>;

impl<P: Copy + Debug> Default for Index<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Copy + Debug> Index<P> {
    /// Create a BVH-backed index using SAH-like splits.
    pub fn with_bvh() -> IndexGeneric<P, crate::backends::bvh::BVH> {
        IndexGeneric::with_backend(crate::backends::bvh::BVH::default())
    }

    /// Create a BVH-backed index whose leaves hold up to `max_leaf` entries.
    pub fn with_bvh_leaf_size(max_leaf: usize) -> IndexGeneric<P, crate::backends::bvh::BVH> {
        IndexGeneric::with_backend(crate::backends::bvh::BVH::with_max_leaf(max_leaf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    fn cube(x: f32) -> Aabb3D {
        Aabb3D::from_center_half_extents(Vec3::new(x, 0.0, 0.0), Vec3::splat(0.5))
    }

    fn ray_payloads<B: Backend>(idx: &IndexGeneric<u32, B>) -> Vec<u32> {
        let mut out = Vec::new();
        let _ = idx.traverse_raycast(
            Vec3::new(-10.0, 0.0, 0.0),
            Vec3::X,
            100.0,
            &mut |p: &u32, _: &Aabb3D, _: &mut RayState| {
                out.push(*p);
                Traversal::Continue
            },
        );
        out.sort_unstable();
        out
    }

    #[test]
    fn traversal_sees_only_committed_state() {
        let mut idx: Index<u32> = Index::new();
        let k = idx.insert(cube(0.0), 1);
        assert!(ray_payloads(&idx).is_empty(), "pending insert is invisible");
        assert_eq!(idx.commit(), 1);
        assert_eq!(ray_payloads(&idx), vec![1]);

        idx.remove(k);
        assert_eq!(ray_payloads(&idx), vec![1], "pending removal still visible");
        assert!(idx.get(k).is_none());
        assert_eq!(idx.commit(), 1);
        assert!(ray_payloads(&idx).is_empty());
    }

    #[test]
    fn added_then_removed_before_commit_is_ignored() {
        let mut idx: Index<u32> = Index::new();
        let k = idx.insert(cube(0.0), 1);
        idx.remove(k);
        assert_eq!(idx.commit(), 0);
        assert!(idx.is_empty());
    }

    #[test]
    fn stale_keys_are_rejected_after_slot_reuse() {
        let mut idx: Index<u32> = Index::new();
        let k1 = idx.insert(cube(0.0), 1);
        let _ = idx.commit();
        idx.remove(k1);
        let _ = idx.commit();
        let k2 = idx.insert(cube(5.0), 2);
        assert_ne!(k1, k2);
        idx.update(k1, cube(50.0));
        assert_eq!(idx.get(k2), Some((cube(5.0), 2)));
        assert!(idx.get(k1).is_none());
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn update_moves_entry_out_of_ray() {
        let mut idx = Index::<u32>::with_bvh();
        let k = idx.insert(cube(0.0), 7);
        let _ = idx.insert(cube(3.0), 8);
        let _ = idx.commit();
        idx.update(k, Aabb3D::from_center_half_extents(Vec3::new(0.0, 20.0, 0.0), Vec3::ONE));
        let _ = idx.commit();
        assert_eq!(ray_payloads(&idx), vec![8]);
    }

    #[test]
    fn sweep_inflates_by_query_half_extents() {
        let mut idx: Index<u32> = Index::new();
        let _ = idx.insert(
            Aabb3D::from_center_half_extents(Vec3::new(5.0, 1.4, 0.0), Vec3::splat(0.5)),
            3,
        );
        let _ = idx.commit();
        let mut seen = Vec::new();
        let mut visit = |p: &u32, _: &Aabb3D, _: &mut RayState| {
            seen.push(*p);
            Traversal::Continue
        };
        let small = Aabb3D::from_center_half_extents(Vec3::ZERO, Vec3::splat(0.25));
        let _ = idx.traverse_sweep(&small, Vec3::X, 10.0, &mut visit);
        let large = Aabb3D::from_center_half_extents(Vec3::ZERO, Vec3::splat(1.0));
        let _ = idx.traverse_sweep(&large, Vec3::X, 10.0, &mut visit);
        assert_eq!(seen, vec![3]);
    }

    #[test]
    fn overlap_visits_intersecting_entries() {
        struct Collect(Vec<u32>);
        impl OverlapVisitor<u32> for Collect {
            fn visit_overlap(&mut self, payload: &u32, _: &Aabb3D) -> Traversal {
                self.0.push(*payload);
                Traversal::Continue
            }
        }
        let mut idx = Index::<u32>::with_bvh_leaf_size(4);
        for i in 0..10 {
            let _ = idx.insert(cube(i as f32 * 2.0), i);
        }
        let _ = idx.commit();
        let mut c = Collect(Vec::new());
        let q = Aabb3D::new(Vec3::new(3.8, -1.0, -1.0), Vec3::new(8.2, 1.0, 1.0));
        assert_eq!(idx.traverse_overlap(&q, &mut c), Traversal::Continue);
        c.0.sort_unstable();
        assert_eq!(c.0, vec![2, 3, 4]);
    }
}
