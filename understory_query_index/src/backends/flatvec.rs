// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flat vector backend with linear scans. Small and simple; good for tiny sets.

use alloc::vec::Vec;
use core::fmt::Debug;

use glam::Vec3;

use crate::backend::Backend;
use crate::types::Aabb3D;
use crate::visit::{RayState, Traversal};

/// Flat vector backend with linear scans in slot order.
#[derive(Default)]
pub struct FlatVec {
    entries: Vec<Option<Aabb3D>>,
}

impl Debug for FlatVec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let total = self.entries.len();
        let alive = self.entries.iter().filter(|e| e.is_some()).count();
        f.debug_struct("FlatVec")
            .field("total_slots", &total)
            .field("alive", &alive)
            .finish_non_exhaustive()
    }
}

impl Backend for FlatVec {
    fn insert(&mut self, slot: usize, aabb: Aabb3D) {
        if self.entries.len() <= slot {
            self.entries.resize_with(slot + 1, || None);
        }
        self.entries[slot] = Some(aabb);
    }
    fn update(&mut self, slot: usize, aabb: Aabb3D) {
        if let Some(e) = self.entries.get_mut(slot) {
            *e = Some(aabb);
        }
    }
    fn remove(&mut self, slot: usize) {
        if let Some(e) = self.entries.get_mut(slot) {
            *e = None;
        }
    }
    fn clear(&mut self) {
        self.entries.clear();
    }
    fn raycast(
        &self,
        state: &mut RayState,
        inflate: Vec3,
        visit: &mut dyn FnMut(usize, &Aabb3D, &mut RayState) -> Traversal,
    ) -> Traversal {
        for (i, slot) in self.entries.iter().enumerate() {
            if let Some(a) = slot.as_ref()
                && a.inflated(inflate)
                    .ray_entry(state.origin, state.inv_dir, state.length())
                    .is_some()
                && visit(i, a, state) == Traversal::Stop
            {
                return Traversal::Stop;
            }
        }
        Traversal::Continue
    }
    fn overlap(
        &self,
        bounds: &Aabb3D,
        visit: &mut dyn FnMut(usize, &Aabb3D) -> Traversal,
    ) -> Traversal {
        for (i, slot) in self.entries.iter().enumerate() {
            if let Some(a) = slot.as_ref()
                && a.intersects(bounds)
                && visit(i, a) == Traversal::Stop
            {
                return Traversal::Stop;
            }
        }
        Traversal::Continue
    }
}
