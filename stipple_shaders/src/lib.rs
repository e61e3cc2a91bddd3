// Copyright 2025 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The compute stages of the stipple rasterization pipeline.
//!
//! The two stages consume the buffers written by the upstream binning
//! and tiling passes: the coarse stage merges each bin's draw object
//! lists and writes a per-tile command list (PTCL), and the fine stage
//! interprets the PTCL into anti-aliased pixels. The kernels in [`cpu`]
//! are written to mirror the structure of their SIMT formulation, with
//! workgroup-shared arrays as locals and lane loops standing in for the
//! hardware's lockstep execution.

pub mod cpu;
mod dispatch;

pub use dispatch::{render_to_buffer, RenderError, COARSE_BUMP_BINDING};
