// Copyright 2025 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host-visible data model for the stipple rasterization pipeline.
//!
//! Every type in this crate describes the exact layout of a GPU storage
//! buffer shared between pipeline stages, so all of them are `#[repr(C)]`
//! and implement [`bytemuck::Pod`]. The PTCL wire format produced by the
//! coarse stage and interpreted by the fine stage lives in [`ptcl`].

mod binning;
mod config;
mod draw;
mod path;
pub mod ptcl;

pub use binning::BinHeader;
pub use config::{
    BufferSize, BufferSizes, BumpAllocators, ConfigUniform, Layout, RenderConfig, WorkgroupCounts,
    WorkgroupSize, N_TILE, N_TILE_X, N_TILE_Y, STAGE_COARSE, TILE_HEIGHT, TILE_WIDTH,
};
pub use draw::{DrawColor, DrawMonoid, DrawTag};
pub use path::{Path, Segment, Tile};
