// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hit aggregation across one or more accelerators.
//!
//! ## Flush protocol
//!
//! A [`HitBuffer`] collects hits while a query runs and is finalized exactly once,
//! when the outermost query scope closes. Each accelerator call opens a scope with
//! [`HitBuffer::inc_flush_count`] and closes it with [`HitBuffer::dec_flush_count`];
//! a caller that fans one query out to several accelerators wraps all of them in an
//! outer scope (see [`HitBuffer::flush_scope`]) so that touches from every member
//! are trimmed against the single closest block.
//!
//! Finalizing sorts touching hits by distance, drops touches at or beyond the
//! blocking hit, and appends the blocking hit last.

use alloc::vec::Vec;
use core::fmt::Debug;
use core::ops::{Deref, DerefMut};

use crate::types::QueryHit;

/// Collects touching hits and at most one blocking hit for one query.
///
/// Reading results before the outermost scope has closed is a logic error and
/// panics in debug builds.
#[derive(Clone)]
pub struct HitBuffer<H> {
    hits: Vec<H>,
    block: Option<H>,
    has_block: bool,
    flush_depth: u32,
    single_result: bool,
    finalized: bool,
}

impl<H: QueryHit> HitBuffer<H> {
    /// A buffer that keeps touching hits plus the closest block.
    pub fn new() -> Self {
        Self {
            hits: Vec::new(),
            block: None,
            has_block: false,
            flush_depth: 0,
            single_result: false,
            finalized: false,
        }
    }

    /// A buffer that only wants the closest hit. Every sweep and raycast hit
    /// stored into it is treated as blocking.
    pub fn single() -> Self {
        Self {
            single_result: true,
            ..Self::new()
        }
    }

    /// Clear all hits so the buffer can serve another query. Keeps the allocation.
    pub fn reset(&mut self) {
        debug_assert_eq!(self.flush_depth, 0, "reset inside an open query scope");
        self.hits.clear();
        self.block = None;
        self.has_block = false;
        self.flush_depth = 0;
        self.finalized = false;
    }

    /// Open a query scope.
    pub fn inc_flush_count(&mut self) {
        debug_assert!(!self.finalized, "hit buffer reused without reset");
        self.flush_depth += 1;
    }

    /// Close a query scope. Closing the outermost scope finalizes the buffer.
    pub fn dec_flush_count(&mut self) {
        debug_assert!(self.flush_depth > 0, "unbalanced dec_flush_count");
        self.flush_depth = self.flush_depth.saturating_sub(1);
        if self.flush_depth == 0 {
            self.finalize();
        }
    }

    /// Open a scope that closes when the returned guard drops.
    ///
    /// ```
    /// use understory_scene_query::buffer::HitBuffer;
    /// use understory_scene_query::types::RaycastHit;
    ///
    /// let mut buffer = HitBuffer::<RaycastHit>::new();
    /// {
    ///     let scope = buffer.flush_scope();
    ///     assert_eq!(scope.flush_depth(), 1);
    ///     // run several accelerators against `&mut *scope` here
    /// }
    /// assert!(buffer.is_finalized());
    /// ```
    pub fn flush_scope(&mut self) -> FlushScope<'_, H> {
        self.inc_flush_count();
        FlushScope { buffer: self }
    }

    /// Record a hit. A blocking hit replaces any previous block; the visitor only
    /// produces a new block after shrinking the query, so it is never farther.
    pub fn insert_hit(&mut self, hit: H, blocking: bool) {
        debug_assert!(!self.finalized, "insert into a finalized hit buffer");
        if blocking {
            self.block = Some(hit);
            self.has_block = true;
        } else {
            self.hits.push(hit);
        }
    }

    /// Whether the query stored a blocking hit.
    pub fn has_blocking_hit(&self) -> bool {
        self.has_block
    }

    /// The blocking hit, stored last among [`hits`](Self::hits).
    pub fn block(&self) -> Option<&H> {
        debug_assert!(self.finalized, "hit buffer read before finalize");
        if self.has_block { self.hits.last() } else { None }
    }

    /// Touching hits sorted by distance, then the blocking hit if any.
    pub fn hits(&self) -> &[H] {
        debug_assert!(self.finalized, "hit buffer read before finalize");
        &self.hits
    }

    /// Touching hits, excluding the blocking hit.
    pub fn touches(&self) -> &[H] {
        let hits = self.hits();
        if self.has_block { &hits[..hits.len() - 1] } else { hits }
    }

    /// Number of reported hits, including the blocking hit.
    pub fn num_hits(&self) -> usize {
        self.hits().len()
    }

    /// Whether the buffer was created with [`HitBuffer::single`].
    pub fn wants_single_result(&self) -> bool {
        self.single_result
    }

    /// Whether the outermost scope has closed.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Number of currently open scopes.
    pub fn flush_depth(&self) -> u32 {
        self.flush_depth
    }

    /// Distance of the pending block, if one was stored. Valid while the query runs.
    pub(crate) fn block_distance(&self) -> Option<f32> {
        self.block.as_ref().and_then(QueryHit::distance)
    }

    /// Whether any hit, touching or blocking, was stored. Valid while the query runs.
    pub(crate) fn has_pending_hit(&self) -> bool {
        self.block.is_some() || !self.hits.is_empty()
    }

    fn finalize(&mut self) {
        if !self.hits.iter().any(|h| h.distance().is_none()) {
            self.hits.sort_by(|a, b| {
                let (da, db) = (a.distance().unwrap_or(0.0), b.distance().unwrap_or(0.0));
                da.total_cmp(&db)
            });
        }
        if let Some(block) = self.block.take() {
            if let Some(limit) = block.distance() {
                self.hits.retain(|h| h.distance().is_none_or(|d| d < limit));
            }
            self.hits.push(block);
        }
        self.finalized = true;
        tracing::debug!(
            touches = self.hits.len() - usize::from(self.has_block),
            has_block = self.has_block,
            "hit buffer finalized"
        );
    }
}

impl<H: QueryHit> Default for HitBuffer<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Debug> Debug for HitBuffer<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HitBuffer")
            .field("hits", &self.hits.len())
            .field("has_block", &self.has_block)
            .field("flush_depth", &self.flush_depth)
            .field("single_result", &self.single_result)
            .field("finalized", &self.finalized)
            .finish_non_exhaustive()
    }
}

/// Guard returned by [`HitBuffer::flush_scope`]. Closes the scope on drop.
pub struct FlushScope<'a, H: QueryHit> {
    buffer: &'a mut HitBuffer<H>,
}

impl<H: QueryHit> Deref for FlushScope<'_, H> {
    type Target = HitBuffer<H>;

    fn deref(&self) -> &HitBuffer<H> {
        self.buffer
    }
}

impl<H: QueryHit> DerefMut for FlushScope<'_, H> {
    fn deref_mut(&mut self) -> &mut HitBuffer<H> {
        self.buffer
    }
}

impl<H: QueryHit> Drop for FlushScope<'_, H> {
    fn drop(&mut self) {
        self.buffer.dec_flush_count();
    }
}

impl<H: QueryHit> Debug for FlushScope<'_, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FlushScope")
            .field("flush_depth", &self.buffer.flush_depth)
            .finish_non_exhaustive()
    }
}
