// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend implementations for different spatial strategies.
//!
//! - `flatvec`: flat vector with linear scans (small, simple).
//! - `bvh`: binary hierarchy with SAH-like splits and nearest-first ray traversal.
//!
//! SAH note
//! --------
//! For a split point `k` along a sorted axis the BVH minimizes:
//!
//! `cost(k) = area(LB_k) * k + area(RB_k) * (n - k)`
//!
//! where `LB_k` and `RB_k` are the bounding boxes of the first `k` and remaining `n - k` items
//! and `area` is the box surface area.
//! All `k` are evaluated in O(n) per axis using prefix/suffix bounding boxes.
//! Areas are accumulated in `f64`.

pub mod bvh;
pub mod flatvec;
