// Copyright 2025 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};

use super::ptcl::{PTCL_INCREMENT, PTCL_INITIAL_ALLOC};

/// Width of a tile in pixels.
pub const TILE_WIDTH: u32 = 16;
/// Height of a tile in pixels.
pub const TILE_HEIGHT: u32 = 16;
/// Width of a bin in tiles.
pub const N_TILE_X: u32 = 16;
/// Height of a bin in tiles.
pub const N_TILE_Y: u32 = 16;
/// Tiles per bin; also the coarse workgroup size and the partition size
/// of the binned draw object stream.
pub const N_TILE: u32 = N_TILE_X * N_TILE_Y;

/// Bit set in [`BumpAllocators::failed`] when the coarse stage runs out
/// of PTCL memory.
pub const STAGE_COARSE: u32 = 0x1;

/// Counters for tracking dynamic allocation in the PTCL buffer.
///
/// `ptcl` is advanced with fetch-add semantics; each grant hands the
/// caller exclusive ownership of the granted words past the statically
/// partitioned region. Must be zeroed before the coarse stage runs.
#[derive(Clone, Copy, Debug, Default, Zeroable, Pod)]
#[repr(C)]
pub struct BumpAllocators {
    /// Bitmask of stages that failed allocation.
    pub failed: u32,
    /// Word offset of the next free chunk in the dynamic PTCL region.
    pub ptcl: u32,
}

/// Layout of the packed scene stream.
#[derive(Clone, Copy, Debug, Default, Zeroable, Pod)]
#[repr(C)]
pub struct Layout {
    /// Number of draw objects.
    pub n_draw_objects: u32,
    /// Start of the draw tag stream (in u32s).
    pub draw_tag_base: u32,
    /// Start of the draw data stream (in u32s).
    pub draw_data_base: u32,
}

/// Uniform render configuration read by both stages.
#[derive(Clone, Copy, Debug, Default, Zeroable, Pod)]
#[repr(C)]
pub struct ConfigUniform {
    /// Width of the scene in tiles.
    pub width_in_tiles: u32,
    /// Height of the scene in tiles.
    pub height_in_tiles: u32,
    /// Width of the target in pixels.
    pub target_width: u32,
    /// Height of the target in pixels.
    pub target_height: u32,
    /// Layout of the packed scene data.
    pub layout: Layout,
    /// Size of the PTCL buffer allocation (in u32s); bounds the bump
    /// allocator.
    pub ptcl_size: u32,
}

/// CPU side setup and configuration.
#[derive(Debug, Default)]
pub struct RenderConfig {
    /// Configuration shared with the stages.
    pub gpu: ConfigUniform,
    /// Dispatch geometry for both stages.
    pub workgroup_counts: WorkgroupCounts,
    /// Sizes of the buffers owned by this pipeline.
    pub buffer_sizes: BufferSizes,
}

impl RenderConfig {
    pub fn new(layout: &Layout, width: u32, height: u32) -> Self {
        let width_in_tiles = width.div_ceil(TILE_WIDTH);
        let height_in_tiles = height.div_ceil(TILE_HEIGHT);
        let workgroup_counts = WorkgroupCounts::new(width_in_tiles, height_in_tiles);
        let buffer_sizes = BufferSizes::new(width_in_tiles, height_in_tiles);
        Self {
            gpu: ConfigUniform {
                width_in_tiles,
                height_in_tiles,
                target_width: width,
                target_height: height,
                layout: *layout,
                ptcl_size: buffer_sizes.ptcl.len(),
            },
            workgroup_counts,
            buffer_sizes,
        }
    }
}

/// Type alias for a workgroup size.
pub type WorkgroupSize = (u32, u32, u32);

/// Computed dispatch sizes for both stages.
///
/// The coarse stage launches one workgroup per bin and the fine stage
/// one workgroup per tile; coarse must complete before fine starts.
#[derive(Copy, Clone, Debug, Default)]
pub struct WorkgroupCounts {
    pub coarse: WorkgroupSize,
    pub fine: WorkgroupSize,
}

impl WorkgroupCounts {
    pub fn new(width_in_tiles: u32, height_in_tiles: u32) -> Self {
        let width_in_bins = width_in_tiles.div_ceil(N_TILE_X);
        let height_in_bins = height_in_tiles.div_ceil(N_TILE_Y);
        Self {
            coarse: (width_in_bins, height_in_bins, 1),
            fine: (width_in_tiles, height_in_tiles, 1),
        }
    }
}

/// Typed buffer size primitive.
#[derive(Copy, Clone, Eq, Default, Debug)]
pub struct BufferSize<T: Sized> {
    len: u32,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: Sized> BufferSize<T> {
    /// Creates a new buffer size from number of elements.
    pub const fn new(len: u32) -> Self {
        Self {
            // Buffer bindings must hold at least one element to avoid
            // triggering validation errors.
            len: if len > 0 { len } else { 1 },
            _phantom: std::marker::PhantomData,
        }
    }

    /// Returns the number of elements.
    #[allow(clippy::len_without_is_empty)]
    pub const fn len(self) -> u32 {
        self.len
    }

    /// Returns the size in bytes.
    pub const fn size_in_bytes(self) -> u32 {
        size_of::<T>() as u32 * self.len
    }
}

impl<T: Sized> PartialEq for BufferSize<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
    }
}

/// Computed sizes for the buffers this pipeline owns. The upstream
/// buffers (scene, bin headers, tile grid, segments) are sized by their
/// producers.
#[derive(Copy, Clone, Debug, Default)]
pub struct BufferSizes {
    pub bump: BufferSize<BumpAllocators>,
    pub ptcl: BufferSize<u32>,
    pub output: BufferSize<u32>,
}

impl BufferSizes {
    pub fn new(width_in_tiles: u32, height_in_tiles: u32) -> Self {
        let n_tiles = width_in_tiles * height_in_tiles;
        let bump = BufferSize::new(1);
        // The static region plus a dynamic pool. The pool size is a
        // heuristic that accommodates the test scenes; callers with
        // deeper per-tile draw stacks should size it from their scene.
        let ptcl = BufferSize::new(n_tiles * PTCL_INITIAL_ALLOC + (n_tiles * PTCL_INCREMENT).max(1 << 16));
        let output = BufferSize::new(n_tiles * TILE_WIDTH * TILE_HEIGHT);
        Self { bump, ptcl, output }
    }
}

#[cfg(test)]
mod tests {
    use super::{Layout, RenderConfig};

    #[test]
    fn tile_and_bin_geometry() {
        let config = RenderConfig::new(&Layout::default(), 272, 100);
        assert_eq!(config.gpu.width_in_tiles, 17);
        assert_eq!(config.gpu.height_in_tiles, 7);
        assert_eq!(config.workgroup_counts.coarse, (2, 1, 1));
        assert_eq!(config.workgroup_counts.fine, (17, 7, 1));
    }

    #[test]
    fn ptcl_size_covers_static_region() {
        let config = RenderConfig::new(&Layout::default(), 64, 64);
        let n_tiles = 4_u32 * 4;
        assert!(config.gpu.ptcl_size > n_tiles * super::PTCL_INITIAL_ALLOC);
    }
}
