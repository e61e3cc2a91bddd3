// Copyright 2025 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};

/// Tiled path object.
#[derive(Copy, Clone, Pod, Zeroable, Debug, Default)]
#[repr(C)]
pub struct Path {
    /// Bounding box in tiles: `[x0, y0, x1, y1]` with `x0 <= x1` and
    /// `y0 <= y1`. The row stride of the path's tile rectangle is
    /// `x1 - x0`.
    pub bbox: [u32; 4],
    /// Offset (in [`Tile`]s) of the path's tile rectangle in the global
    /// tile grid.
    pub tiles: u32,
    pub _padding: [u32; 3],
}

/// Tile object.
///
/// A tile is empty, and skipped by the coarse stage, iff both fields
/// are zero.
#[derive(Copy, Clone, Pod, Zeroable, Debug, Default)]
#[repr(C)]
pub struct Tile {
    /// Signed winding number at the top of the tile's left edge.
    pub backdrop: i32,
    /// Head of this tile's intrusive segment list; zero means no
    /// segments.
    pub segments: u32,
}

/// A line segment clipped to a single tile.
///
/// Coordinates are absolute pixel coordinates. Segments of one tile are
/// chained through `next`; index zero terminates the chain, so slot 0
/// of the segment buffer is reserved and never holds a segment.
#[derive(Copy, Clone, Pod, Zeroable, Debug, Default)]
#[repr(C)]
pub struct Segment {
    pub origin: [f32; 2],
    pub delta: [f32; 2],
    /// Y coordinate at which the segment crosses the tile's left edge,
    /// accounted as a half-open vertical edge from there to the bottom
    /// of the tile; `1e9` when the segment carries no such crossing.
    pub y_edge: f32,
    /// Next segment of this tile's list, or zero.
    pub next: u32,
}
