// Copyright 2025 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use stipple_encoding::ptcl::{
    CMD_COLOR, CMD_END, CMD_FILL, CMD_JUMP, CMD_SOLID, CMD_STROKE, PTCL_HEADROOM, PTCL_INCREMENT,
    PTCL_INITIAL_ALLOC,
};
use stipple_encoding::{
    BinHeader, BumpAllocators, ConfigUniform, DrawMonoid, DrawTag, Path, Tile, STAGE_COARSE,
};

use super::CpuBinding;

// Tiles per bin
const N_TILE_X: usize = 16;
const N_TILE_Y: usize = 16;
const N_TILE: usize = N_TILE_X * N_TILE_Y;

// One lane per tile; the same lane indices are reinterpreted as one
// lane per window element in the middle of each outer iteration.
const WG_SIZE: usize = N_TILE;

// Bitmap slices: one u32 of per-tile bits for each 32 window elements.
const N_SLICE: usize = N_TILE / 32;

// Modeled in the WGSL as private-scoped variables
struct TileState {
    cmd_offset: u32,
    cmd_limit: u32,
}

impl TileState {
    fn new(tile_ix: u32) -> Self {
        let cmd_offset = tile_ix * PTCL_INITIAL_ALLOC;
        let cmd_limit = cmd_offset + (PTCL_INITIAL_ALLOC - PTCL_HEADROOM);
        Self {
            cmd_offset,
            cmd_limit,
        }
    }

    /// Ensures `size` words are writable at the cursor, linking in a
    /// freshly bumped block when the current one is about to overflow.
    ///
    /// Returns false, with the failed flag raised, when the bump
    /// allocator would run past the end of the PTCL buffer. The cursor
    /// is left unmoved in that case, so the stream written so far can
    /// still be terminated.
    fn alloc_cmd(
        &mut self,
        size: u32,
        config: &ConfigUniform,
        bump: &mut BumpAllocators,
        ptcl: &mut [u32],
    ) -> bool {
        if self.cmd_offset + size >= self.cmd_limit {
            let ptcl_dyn_start =
                config.width_in_tiles * config.height_in_tiles * PTCL_INITIAL_ALLOC;
            let chunk_size = PTCL_INCREMENT.max(size + PTCL_HEADROOM);
            let new_cmd = ptcl_dyn_start + bump.ptcl;
            if new_cmd + chunk_size > config.ptcl_size {
                bump.failed |= STAGE_COARSE;
                return false;
            }
            bump.ptcl += chunk_size;
            ptcl[self.cmd_offset as usize] = CMD_JUMP;
            ptcl[self.cmd_offset as usize + 1] = new_cmd;
            self.cmd_offset = new_cmd;
            self.cmd_limit = new_cmd + (PTCL_INCREMENT - PTCL_HEADROOM);
        }
        true
    }

    fn write(&mut self, ptcl: &mut [u32], offset: u32, value: u32) {
        ptcl[(self.cmd_offset + offset) as usize] = value;
    }

    /// Writes the coverage command for one (draw object, tile) pair. A
    /// negative line width selects a fill, anything else a stroke.
    fn write_path(
        &mut self,
        config: &ConfigUniform,
        bump: &mut BumpAllocators,
        ptcl: &mut [u32],
        tile: Tile,
        linewidth: f32,
    ) -> bool {
        // Reserved before dispatching on the style so both branches
        // fit; the solid branch wastes two words of the reservation.
        if !self.alloc_cmd(3, config, bump, ptcl) {
            return false;
        }
        if linewidth < 0.0 {
            if tile.segments != 0 {
                self.write(ptcl, 0, CMD_FILL);
                self.write(ptcl, 1, tile.segments);
                self.write(ptcl, 2, tile.backdrop as u32);
                self.cmd_offset += 3;
            } else {
                // Non-zero backdrop with no segments: the winding is
                // uniform across the tile and saturates to full
                // coverage under the non-zero rule.
                self.write(ptcl, 0, CMD_SOLID);
                self.cmd_offset += 1;
            }
        } else {
            self.write(ptcl, 0, CMD_STROKE);
            self.write(ptcl, 1, tile.segments);
            self.write(ptcl, 2, f32::to_bits(0.5 * linewidth));
            self.cmd_offset += 3;
        }
        true
    }

    fn write_color(
        &mut self,
        config: &ConfigUniform,
        bump: &mut BumpAllocators,
        ptcl: &mut [u32],
        rgba_color: u32,
    ) -> bool {
        if !self.alloc_cmd(2, config, bump, ptcl) {
            return false;
        }
        self.write(ptcl, 0, CMD_COLOR);
        self.write(ptcl, 1, rgba_color);
        self.cmd_offset += 2;
        true
    }
}

#[allow(clippy::too_many_arguments)]
fn coarse_main(
    config: &ConfigUniform,
    scene: &[u32],
    draw_monoids: &[DrawMonoid],
    bin_headers: &[BinHeader],
    bin_data: &[u32],
    info: &[u32],
    paths: &[Path],
    tiles: &[Tile],
    bump: &mut BumpAllocators,
    ptcl: &mut [u32],
) {
    let width_in_tiles = config.width_in_tiles;
    let height_in_tiles = config.height_in_tiles;
    let width_in_bins = width_in_tiles.div_ceil(N_TILE_X as u32);
    let height_in_bins = height_in_tiles.div_ceil(N_TILE_Y as u32);
    let n_bins = width_in_bins * height_in_bins;
    let drawtag_base = config.layout.draw_tag_base;
    let n_partitions = config.layout.n_draw_objects.div_ceil(N_TILE as u32);

    for bin in 0..n_bins {
        let bin_x = bin % width_in_bins;
        let bin_y = bin / width_in_bins;
        let bin_tile_x = N_TILE_X as u32 * bin_x;
        let bin_tile_y = N_TILE_Y as u32 * bin_y;

        // Workgroup-shared scratchpad, reinitialized per bin.
        let mut sh_part_count = [0u32; WG_SIZE];
        let mut sh_part_offsets = [0u32; WG_SIZE];
        let mut sh_drawobj_ix = [0u32; N_TILE];
        let mut sh_tile_stride = [0u32; N_TILE];
        let mut sh_tile_width = [0u32; N_TILE];
        let mut sh_tile_x0 = [0u32; N_TILE];
        let mut sh_tile_y0 = [0u32; N_TILE];
        let mut sh_tile_base = [0u32; N_TILE];
        let mut sh_tile_count = [0u32; N_TILE];
        let mut sh_bitmaps = [[0u32; N_TILE]; N_SLICE];

        // Per-lane PTCL cursors; lane l owns the tile at bin-local
        // coordinates (l % 16, l / 16).
        let mut tile_state: Vec<TileState> = (0..N_TILE)
            .map(|lane| {
                let tile_x = (lane % N_TILE_X) as u32;
                let tile_y = (lane / N_TILE_X) as u32;
                let this_tile_ix =
                    (bin_tile_y + tile_y) * width_in_tiles + bin_tile_x + tile_x;
                TileState::new(this_tile_ix)
            })
            .collect();

        // Streaming window counters. The window [rd_ix, wr_ix) holds the
        // draw object refs currently readable in sh_drawobj_ix;
        // ready_ix counts the refs known to exist up to the partition
        // scan frontier.
        let mut partition_ix = 0u32;
        let mut rd_ix = 0u32;
        let mut wr_ix = 0u32;
        let mut part_start_ix = 0u32;
        let mut ready_ix = 0u32;

        loop {
            for slice in &mut sh_bitmaps {
                slice.fill(0);
            }

            // Refill the window to N_TILE refs or until the source is
            // exhausted.
            loop {
                if ready_ix == wr_ix && partition_ix < n_partitions {
                    // Scan the next block of bin headers. The running
                    // sum stands in for the WGSL's Hillis-Steele scan;
                    // sh_part_count[l] ends up holding the exclusive
                    // upper bound of partition l's refs in bin-global
                    // index space.
                    part_start_ix = ready_ix;
                    let mut sum = part_start_ix;
                    for lane in 0..WG_SIZE {
                        let part = partition_ix + lane as u32;
                        let mut count = 0;
                        if part < n_partitions {
                            let in_ix = (part * N_TILE as u32 + bin) as usize;
                            count = bin_headers[in_ix].element_count;
                            sh_part_offsets[lane] = bin_headers[in_ix].chunk_offset;
                        }
                        sum += count;
                        sh_part_count[lane] = sum;
                    }
                    ready_ix = sh_part_count[WG_SIZE - 1];
                    partition_ix += WG_SIZE as u32;
                }
                // Each lane reads one draw object ref, binary searching
                // the partition that contains it.
                for lane in 0..N_TILE {
                    let ix = rd_ix + lane as u32;
                    if ix >= wr_ix && ix < ready_ix {
                        let mut part_ix = 0usize;
                        let mut probe = N_TILE / 2;
                        while probe > 0 {
                            if ix >= sh_part_count[part_ix + probe - 1] {
                                part_ix += probe;
                            }
                            probe /= 2;
                        }
                        let part_base = if part_ix > 0 {
                            sh_part_count[part_ix - 1]
                        } else {
                            part_start_ix
                        };
                        let offset = sh_part_offsets[part_ix] + (ix - part_base);
                        sh_drawobj_ix[lane] = bin_data[offset as usize];
                    }
                }
                wr_ix = ready_ix.min(rd_ix + N_TILE as u32);
                if wr_ix - rd_ix >= N_TILE as u32
                    || (wr_ix >= ready_ix && partition_ix >= n_partitions)
                {
                    break;
                }
            }

            // Fan each window element out over the tiles it covers.
            // Lane l is now the l-th draw object of the window, not a
            // tile.
            let tag_count = wr_ix - rd_ix;
            for lane in 0..N_TILE {
                let mut tag = DrawTag::NOP;
                if (lane as u32) < tag_count {
                    let drawobj_ix = sh_drawobj_ix[lane];
                    tag = DrawTag(scene[(drawtag_base + drawobj_ix) as usize]);
                }
                let mut x0 = 0i32;
                let mut y0 = 0i32;
                let mut x1 = 0i32;
                let mut y1 = 0i32;
                let mut stride = 0u32;
                let mut base = 0u32;
                if tag != DrawTag::NOP {
                    let path_ix = draw_monoids[sh_drawobj_ix[lane] as usize].path_ix;
                    let path = paths[path_ix as usize];
                    let dx = path.bbox[0] as i32 - bin_tile_x as i32;
                    let dy = path.bbox[1] as i32 - bin_tile_y as i32;
                    x0 = dx.clamp(0, N_TILE_X as i32);
                    y0 = dy.clamp(0, N_TILE_Y as i32);
                    x1 = (path.bbox[2] as i32 - bin_tile_x as i32).clamp(0, N_TILE_X as i32);
                    y1 = (path.bbox[3] as i32 - bin_tile_y as i32).clamp(0, N_TILE_Y as i32);
                    stride = path.bbox[2] - path.bbox[0];
                    // Arranged so that base + stride * y + x is the
                    // global tile index for bin-local (x, y) inside the
                    // clamped bbox; may transiently wrap below
                    // path.tiles.
                    base = path
                        .tiles
                        .wrapping_sub((dy * stride as i32 + dx) as u32);
                }
                let width = (x1 - x0) as u32;
                sh_tile_stride[lane] = stride;
                sh_tile_width[lane] = width;
                sh_tile_x0[lane] = x0 as u32;
                sh_tile_y0[lane] = y0 as u32;
                sh_tile_base[lane] = base;
                // The second load-balancing prefix sum of the window,
                // over tile counts.
                let tile_count = width * (y1 - y0) as u32;
                sh_tile_count[lane] =
                    tile_count + if lane > 0 { sh_tile_count[lane - 1] } else { 0 };
            }

            // Scatter: visit every (element, tile) pair and set the
            // element's bit in the bitmap of each non-empty tile it
            // covers. The lanes cooperate on this in strided steps of
            // N_TILE in the WGSL, with an atomicOr per bit.
            let total_tile_count = sh_tile_count[N_TILE - 1];
            for ix in 0..total_tile_count {
                let mut el_ix = 0usize;
                let mut probe = N_TILE / 2;
                while probe > 0 {
                    if ix >= sh_tile_count[el_ix + probe - 1] {
                        el_ix += probe;
                    }
                    probe /= 2;
                }
                let seq_ix = ix - if el_ix > 0 { sh_tile_count[el_ix - 1] } else { 0 };
                let width = sh_tile_width[el_ix];
                let x = sh_tile_x0[el_ix] + seq_ix % width;
                let y = sh_tile_y0[el_ix] + seq_ix / width;
                let tile_ix = sh_tile_base[el_ix]
                    .wrapping_add(sh_tile_stride[el_ix] * y + x) as usize;
                let tile = tiles[tile_ix];
                if tile.segments != 0 || tile.backdrop != 0 {
                    sh_bitmaps[el_ix / 32][(y as usize) * N_TILE_X + x as usize] |=
                        1 << (el_ix & 31);
                }
            }

            // Emit commands. Lane l is a tile again; scanning slices
            // low to high and bits LSB-first visits the window elements
            // in ascending draw object order, which is what the fine
            // stage's in-stream compositing relies on.
            for lane in 0..N_TILE {
                let tile_x = (lane % N_TILE_X) as u32;
                let tile_y = (lane / N_TILE_X) as u32;
                let tile_state = &mut tile_state[lane];
                'emit: for slice_ix in 0..N_SLICE {
                    let mut bits = sh_bitmaps[slice_ix][lane];
                    while bits != 0 {
                        let el_ix = slice_ix * 32 + bits.trailing_zeros() as usize;
                        bits &= bits - 1;
                        let drawobj_ix = sh_drawobj_ix[el_ix];
                        let drawtag = scene[(drawtag_base + drawobj_ix) as usize];
                        let draw_monoid = draw_monoids[drawobj_ix as usize];
                        let tile_ix = sh_tile_base[el_ix]
                            .wrapping_add(sh_tile_stride[el_ix] * tile_y + tile_x)
                            as usize;
                        let tile = tiles[tile_ix];
                        match DrawTag(drawtag) {
                            DrawTag::COLOR => {
                                let linewidth =
                                    f32::from_bits(info[draw_monoid.info_offset as usize]);
                                let dd =
                                    config.layout.draw_data_base + draw_monoid.scene_offset;
                                let rgba_color = scene[dd as usize];
                                if !tile_state.write_path(config, bump, ptcl, tile, linewidth)
                                    || !tile_state.write_color(config, bump, ptcl, rgba_color)
                                {
                                    break 'emit;
                                }
                            }
                            _ => (),
                        }
                    }
                }
            }

            rd_ix += N_TILE as u32;
            if rd_ix >= ready_ix && partition_ix >= n_partitions {
                break;
            }
        }

        // Terminate every in-bounds tile's stream. Bins on the right
        // and bottom edges can own tiles outside the viewport; those
        // never receive commands and get no terminator.
        for lane in 0..N_TILE {
            let tile_x = (lane % N_TILE_X) as u32;
            let tile_y = (lane / N_TILE_X) as u32;
            if bin_tile_x + tile_x < width_in_tiles && bin_tile_y + tile_y < height_in_tiles {
                ptcl[tile_state[lane].cmd_offset as usize] = CMD_END;
            }
        }
    }
}

/// The coarse rasterization stage.
///
/// Binding order: config, scene, draw monoids, bin headers, bin data,
/// info, paths, tiles, bump, ptcl.
pub fn coarse(_n_wg: u32, resources: &[CpuBinding<'_>]) {
    let config = resources[0].as_typed();
    let scene = resources[1].as_slice();
    let draw_monoids = resources[2].as_slice();
    let bin_headers = resources[3].as_slice();
    let bin_data = resources[4].as_slice();
    let info = resources[5].as_slice();
    let paths = resources[6].as_slice();
    let tiles = resources[7].as_slice();
    let mut bump = resources[8].as_typed_mut();
    let mut ptcl = resources[9].as_slice_mut();
    coarse_main(
        &config,
        &scene,
        &draw_monoids,
        &bin_headers,
        &bin_data,
        &info,
        &paths,
        &tiles,
        &mut bump,
        &mut ptcl,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(width_in_tiles: u32, height_in_tiles: u32, ptcl_size: u32) -> ConfigUniform {
        ConfigUniform {
            width_in_tiles,
            height_in_tiles,
            ptcl_size,
            ..Default::default()
        }
    }

    #[test]
    fn alloc_cmd_links_new_block() {
        let config = test_config(1, 1, 64 + 512);
        let mut bump = BumpAllocators::default();
        let mut ptcl = vec![0u32; (64 + 512) as usize];
        let mut state = TileState::new(0);
        assert!(state.alloc_cmd(3, &config, &mut bump, &mut ptcl));
        assert_eq!(state.cmd_offset, 0);

        // Push the cursor to the end of the initial block and force a
        // continuation.
        state.cmd_offset = 60;
        assert!(state.alloc_cmd(3, &config, &mut bump, &mut ptcl));
        assert_eq!(ptcl[60], CMD_JUMP);
        assert_eq!(ptcl[61], 64);
        assert_eq!(state.cmd_offset, 64);
        assert_eq!(state.cmd_limit, 64 + PTCL_INCREMENT - PTCL_HEADROOM);
        assert_eq!(bump.ptcl, PTCL_INCREMENT);
        assert_eq!(bump.failed, 0);
    }

    #[test]
    fn alloc_cmd_sets_failed_on_overflow() {
        let config = test_config(1, 1, 64);
        let mut bump = BumpAllocators::default();
        let mut ptcl = vec![0u32; 64];
        let mut state = TileState::new(0);
        state.cmd_offset = 60;
        assert!(!state.alloc_cmd(3, &config, &mut bump, &mut ptcl));
        assert_eq!(bump.failed, STAGE_COARSE);
        // Cursor is unmoved so the stream can still be terminated.
        assert_eq!(state.cmd_offset, 60);
        assert_eq!(bump.ptcl, 0);
    }

    #[test]
    fn write_path_emits_solid_for_backdrop_only_tile() {
        let config = test_config(1, 1, 64 + 512);
        let mut bump = BumpAllocators::default();
        let mut ptcl = vec![0u32; (64 + 512) as usize];
        let mut state = TileState::new(0);
        let tile = Tile {
            backdrop: 1,
            segments: 0,
        };
        assert!(state.write_path(&config, &mut bump, &mut ptcl, tile, -1.0));
        assert_eq!(ptcl[0], CMD_SOLID);
        assert_eq!(state.cmd_offset, 1);
    }

    #[test]
    fn write_path_emits_stroke_with_half_width() {
        let config = test_config(1, 1, 64 + 512);
        let mut bump = BumpAllocators::default();
        let mut ptcl = vec![0u32; (64 + 512) as usize];
        let mut state = TileState::new(0);
        let tile = Tile {
            backdrop: 0,
            segments: 7,
        };
        assert!(state.write_path(&config, &mut bump, &mut ptcl, tile, 3.0));
        assert_eq!(ptcl[0], CMD_STROKE);
        assert_eq!(ptcl[1], 7);
        assert_eq!(f32::from_bits(ptcl[2]), 1.5);
        assert_eq!(state.cmd_offset, 3);
    }
}
