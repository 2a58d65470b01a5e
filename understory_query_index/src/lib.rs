// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_query_index --heading-base-level=0

//! Understory Query Index: a 3D AABB index driven by query visitors.
//!
//! Understory Query Index is the broad phase for scene queries.
//!
//! - Insert, update, and remove axis-aligned bounding boxes ([`Aabb3D`]) with user payloads.
//! - Batch updates with [`IndexGeneric::commit`]; traversals only see committed bounds.
//! - Drive a visitor with every candidate a ray, a swept box, or an overlap box reaches.
//!
//! Ray and sweep visitors receive the live [`RayState`] and may shrink it; the
//! traversal prunes everything farther than the shrunk length. Any visitor can
//! return [`Traversal::Stop`] to abort.
//!
//! Backends are pluggable via a simple trait so you can swap the spatial strategy without API churn.
//! The default backend is a flat vector (linear scan).
//!
//! # Example
//!
//! ```rust
//! use glam::Vec3;
//! use understory_query_index::{Aabb3D, Index, RayState, Traversal};
//!
//! // Create an index and add two boxes along +X.
//! let mut idx: Index<u32> = Index::new();
//! let near = Aabb3D::from_center_half_extents(Vec3::new(3.0, 0.0, 0.0), Vec3::ONE);
//! let far = Aabb3D::from_center_half_extents(Vec3::new(8.0, 0.0, 0.0), Vec3::ONE);
//! idx.insert(near, 1);
//! idx.insert(far, 2);
//! assert_eq!(idx.commit(), 2);
//!
//! // Cast a ray; every candidate is delivered with its bounds and the live ray state.
//! let mut seen = Vec::new();
//! idx.traverse_raycast(Vec3::ZERO, Vec3::X, 20.0, &mut |p: &u32, _: &Aabb3D, _: &mut RayState| {
//!     seen.push(*p);
//!     Traversal::Continue
//! });
//! seen.sort();
//! assert_eq!(seen, [1, 2]);
//! ```
//!
//! ## Choosing a backend
//!
//! - `FlatVec` (default): simplest and smallest, linear scans. Good for very small sets
//!   or when inserts/updates vastly outnumber queries.
//! - `BVH` ([`Index::with_bvh`]): binary hierarchy with SAH-like splits. Rays visit
//!   children nearest-first, so a visitor that shrinks the ray skips most of the tree.
//!   See the [`backends`] docs for a brief SAH overview.
//!
//! ### Float semantics
//!
//! This crate assumes no NaNs in bounds or query parameters. Debug builds may assert.

#![no_std]

extern crate alloc;

#[cfg(not(any(feature = "std", feature = "libm")))]
compile_error!("understory_query_index requires either the `std` or `libm` feature");

pub mod backend;
pub mod backends;
pub mod index;
pub mod types;
pub mod visit;

pub use backend::Backend;
pub use backends::bvh::BVH;
pub use backends::flatvec::FlatVec;
pub use index::{Index, IndexGeneric, Key};
pub use types::Aabb3D;
pub use visit::{OverlapVisitor, RayState, RaycastVisitor, SweepVisitor, Traversal};
