// Copyright 2025 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-tile command list wire format.
//!
//! The PTCL buffer is an `array<u32>` with two regions. The words below
//! `width_in_tiles * height_in_tiles * PTCL_INITIAL_ALLOC` are statically
//! partitioned into one [`PTCL_INITIAL_ALLOC`]-word block per tile, so
//! every tile's command stream starts at a deterministic address. The
//! words above are a bump-allocated pool of [`PTCL_INCREMENT`]-word
//! blocks, linked into streams by [`CMD_JUMP`] records.
//!
//! Commands are a tag word followed by payload words:
//!
//! | tag | payload |
//! |---|---|
//! | [`CMD_END`] | none; terminates the stream |
//! | [`CMD_FILL`] | segment list head, backdrop (i32 as u32) |
//! | [`CMD_STROKE`] | segment list head, half line width (f32 bits) |
//! | [`CMD_SOLID`] | none |
//! | [`CMD_COLOR`] | packed premultiplied RGBA |
//! | [`CMD_JUMP`] | absolute word offset of the next block |

/// Initial allocation of each tile's command list, in u32 words.
pub const PTCL_INITIAL_ALLOC: u32 = 64;
/// Size of each bump-allocated continuation block, in u32 words.
pub const PTCL_INCREMENT: u32 = 256;
/// Words reserved at the end of every block so a terminating jump
/// always fits.
pub const PTCL_HEADROOM: u32 = 2;

pub const CMD_END: u32 = 0;
pub const CMD_FILL: u32 = 1;
pub const CMD_STROKE: u32 = 2;
pub const CMD_SOLID: u32 = 3;
pub const CMD_COLOR: u32 = 5;
pub const CMD_JUMP: u32 = 11;
