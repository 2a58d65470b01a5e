// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scalar float functions for `no_std` builds.
//!
//! With `std` the inherent `f32` methods win method resolution; without it this
//! trait supplies them through `libm`.

#[cfg(not(feature = "std"))]
pub(crate) trait FloatFuncs: Sized {
    fn sqrt(self) -> Self;
    fn abs(self) -> Self;
}

#[cfg(not(feature = "std"))]
impl FloatFuncs for f32 {
    #[inline]
    fn sqrt(self) -> Self {
        libm::sqrtf(self)
    }

    #[inline]
    fn abs(self) -> Self {
        libm::fabsf(self)
    }
}
