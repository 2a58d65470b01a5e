// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_scene_query --heading-base-level=0

//! Understory Scene Query: raycasts, sweeps, and overlaps against a scene of bodies.
//!
//! A scene is a set of actors (bodies), each with a pose and one or more shapes.
//! An [`Accelerator`] pairs a spatial index of actor bounds
//! ([`understory_query_index`]) with a [`BodyStore`] that resolves index payloads
//! into actors. Queries run the index traversal and, for every candidate:
//!
//! - skip candidates whose body no longer resolves;
//! - classify each shape with an optional pre-filter ([`QueryFilterCallback`]);
//! - run the exact narrow-phase test ([`NarrowPhase`]);
//! - classify the hit with an optional post-filter;
//! - record it in a [`HitBuffer`] as touching or blocking.
//!
//! A blocking hit shrinks the live query so the index prunes everything farther
//! away. When the outermost query scope closes, the buffer sorts its touching hits,
//! drops those at or beyond the block, and appends the block last.
//! [`AcceleratorUnion`] fans one query out to several accelerators sharing one buffer.
//!
//! Overlap hits never block, whatever the filters return.
//!
//! # Example
//!
//! ```rust
//! use glam::Vec3;
//! use understory_scene_query::{
//!     Accelerator, BodySet, FilterData, Geometry, HitBuffer, HitFlags, Index, LayerMaskFilter,
//!     Pose, QueryFilterData, QueryFlags, ShapeInstance, SpatialAccelerator,
//! };
//!
//! const WALLS: u32 = 0b01;
//! const GLASS: u32 = 0b10;
//!
//! let mut scene = Accelerator::new(Index::with_bvh(), BodySet::new());
//! // A glass pane the ray passes through, then a wall that stops it.
//! scene.add_body(
//!     Pose::from_position(Vec3::new(3.0, 0.0, 0.0)),
//!     vec![ShapeInstance::new(Geometry::cuboid(Vec3::new(0.1, 2.0, 2.0)))
//!         .with_filter_data(FilterData::new(0, 0, GLASS, 0))],
//! );
//! scene.add_body(
//!     Pose::from_position(Vec3::new(6.0, 0.0, 0.0)),
//!     vec![ShapeInstance::new(Geometry::cuboid(Vec3::new(0.5, 2.0, 2.0)))
//!         .with_filter_data(FilterData::new(0, WALLS, 0, 0))],
//! );
//! scene.commit();
//!
//! let layers = FilterData::new(WALLS | GLASS, 0, 0, 0);
//! let filter = QueryFilterData::new(layers, QueryFlags::PRE_FILTER);
//! let mut hits = HitBuffer::new();
//! scene.raycast(
//!     Vec3::ZERO,
//!     Vec3::X,
//!     100.0,
//!     &mut hits,
//!     HitFlags::default(),
//!     &filter,
//!     &mut LayerMaskFilter,
//! );
//!
//! assert_eq!(hits.num_hits(), 2);
//! assert!(hits.has_blocking_hit());
//! let block = hits.block().unwrap();
//! assert!((block.distance - 5.5).abs() < 1e-4);
//! ```
//!
//! ## Geometry
//!
//! [`Geometry`] is a closed set of shapes: sphere, box, capsule, convex hull,
//! triangle mesh, and height field. Query geometries are matched once per call and
//! the narrow phase runs at the concrete type.
//!
//! ## Features
//!
//! - `std` (default): link the standard library.
//! - `libm`: `no_std` float math through `libm`.

#![no_std]

extern crate alloc;

#[cfg(not(any(feature = "std", feature = "libm")))]
compile_error!("understory_scene_query requires either the `std` or `libm` feature");

pub mod accelerator;
pub mod buffer;
pub mod filter;
pub mod geometry;
#[cfg(not(feature = "std"))]
mod math;
pub mod narrow;
pub mod store;
pub mod types;
pub mod union;
mod visitor;

pub use accelerator::{Accelerator, SpatialAccelerator};
pub use buffer::{FlushScope, HitBuffer};
pub use filter::{BlockAll, FilterFn, LayerMaskFilter, QueryFilterCallback, TouchAll};
pub use geometry::{
    Capsule, ConvexHull, Cuboid, Geometry, HeightField, QueryShape, Sphere, TriangleMesh,
};
pub use narrow::{AnalyticNarrowPhase, NarrowPhase, NarrowPhaseConfig, ShapeHit};
pub use store::{BodySet, BodyStore, BodyView, ShapeInstance};
pub use types::{
    ActorHandle, FilterData, FilterResult, HitFlags, LocationHit, OverlapHit, Pose, QueryFilterData,
    QueryFlags, QueryHit, QueryStats, RaycastHit, ShapeFlags, ShapeHandle, SweepHit,
};
pub use union::{AcceleratorUnion, UnionMember};

pub use understory_query_index::{Aabb3D, BVH, FlatVec, Index, IndexGeneric};
