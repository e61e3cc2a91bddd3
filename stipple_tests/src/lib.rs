// Copyright 2025 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Test harness for the stipple raster stages.
//!
//! The production pipeline receives its input buffers from upstream
//! GPU passes (binning, path tiling, backdrop propagation, draw-leaf).
//! This crate carries reference implementations of those producers so
//! integration tests can fabricate every buffer from plain geometry,
//! drive the two stages end to end, and inspect the PTCL and the
//! framebuffer.

pub mod decode;
pub mod fixture;
pub mod reference;
mod tiling;

pub use fixture::{Frame, TestScene};
