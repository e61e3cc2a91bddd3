// Copyright 2025 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use stipple_encoding::ptcl::{
    CMD_COLOR, CMD_END, CMD_FILL, CMD_JUMP, CMD_SOLID, CMD_STROKE, PTCL_INITIAL_ALLOC,
};
use stipple_encoding::{BumpAllocators, ConfigUniform, Segment, Tile};

use super::util::Vec2;
use super::CpuBinding;

// Pixels per tile
const TILE_WIDTH: usize = 16;
const TILE_HEIGHT: usize = 16;
const TILE_SIZE: usize = TILE_WIDTH * TILE_HEIGHT;

fn read_fill(ptcl: &[u32], offset: u32) -> Tile {
    let segments = ptcl[(offset + 1) as usize];
    let backdrop = ptcl[(offset + 2) as usize] as i32;
    Tile { backdrop, segments }
}

struct CmdStroke {
    segments: u32,
    half_width: f32,
}

fn read_stroke(ptcl: &[u32], offset: u32) -> CmdStroke {
    let segments = ptcl[(offset + 1) as usize];
    let half_width = f32::from_bits(ptcl[(offset + 2) as usize]);
    CmdStroke {
        segments,
        half_width,
    }
}

fn read_color(ptcl: &[u32], offset: u32) -> u32 {
    ptcl[(offset + 1) as usize]
}

fn unpack4x8unorm(x: u32) -> [f32; 4] {
    let mut result = [0.0; 4];
    for (i, channel) in result.iter_mut().enumerate() {
        *channel = ((x >> (i * 8)) & 0xff) as f32 * (1.0 / 255.0);
    }
    result
}

fn pack4x8unorm(x: [f32; 4]) -> u32 {
    let mut result = 0;
    for (i, channel) in x.iter().enumerate() {
        let byte = (channel.clamp(0.0, 1.0) * 255.0).round() as u32;
        result |= byte << (i * 8);
    }
    result
}

/// Exact-area winding coverage of one tile for a fill.
///
/// Walks the tile's segment list and accumulates, per pixel, the signed
/// trapezoid area each segment sweeps in the pixel's row, on top of the
/// tile's backdrop winding. The half-open vertical contribution closes
/// segments that were clipped at the tile's left edge.
fn fill_path(area: &mut [f32; TILE_SIZE], segments: &[Segment], tile: &Tile, xy: Vec2) {
    let backdrop_f = tile.backdrop as f32;
    for a in area.iter_mut() {
        *a = backdrop_f;
    }
    let mut seg_ix = tile.segments;
    while seg_ix != 0 {
        let segment = segments[seg_ix as usize];
        let delta = segment.delta;
        for yi in 0..TILE_HEIGHT {
            let y = segment.origin[1] - (xy.y + yi as f32);
            let y0 = y.clamp(0.0, 1.0);
            let y1 = (y + delta[1]).clamp(0.0, 1.0);
            let dy = y0 - y1;
            let y_edge = delta[0].signum()
                * (xy.y + yi as f32 - segment.y_edge + 1.0).clamp(0.0, 1.0);
            if dy != 0.0 {
                let vec_y_recip = delta[1].recip();
                let t0 = (y0 - y) * vec_y_recip;
                let t1 = (y1 - y) * vec_y_recip;
                let startx = segment.origin[0] - xy.x;
                let x0 = startx + t0 * delta[0];
                let x1 = startx + t1 * delta[0];
                let xmin0 = x0.min(x1);
                let xmax0 = x0.max(x1);
                for i in 0..TILE_WIDTH {
                    let i_f = i as f32;
                    let xmin = (xmin0 - i_f).min(1.0) - 1.0e-6;
                    let xmax = xmax0 - i_f;
                    let b = xmax.min(1.0);
                    let c = b.max(0.0);
                    let d = xmin.max(0.0);
                    let a = (b + 0.5 * (d * d - c * c) - xmin) / (xmax - xmin);
                    area[yi * TILE_WIDTH + i] += y_edge + a * dy;
                }
            } else if y_edge != 0.0 {
                for i in 0..TILE_WIDTH {
                    area[yi * TILE_WIDTH + i] += y_edge;
                }
            }
        }
        seg_ix = segment.next;
    }
    // Non-zero winding rule.
    for a in area.iter_mut() {
        *a = a.abs().min(1.0);
    }
}

/// Distance-field coverage of one tile for a stroke.
fn stroke_path(
    area: &mut [f32; TILE_SIZE],
    segments: &[Segment],
    seg_ix: u32,
    half_width: f32,
    xy: Vec2,
) {
    let mut df = [1e9_f32; TILE_SIZE];
    let mut seg_ix = seg_ix;
    while seg_ix != 0 {
        let segment = segments[seg_ix as usize];
        let delta = Vec2::from_array(segment.delta);
        let delta_dot = delta.dot(delta);
        // Zero-length segments contribute nothing and would divide by
        // zero below.
        if delta_dot > 0.0 {
            let scale = 1.0 / delta_dot;
            let dpos0 = Vec2::new(
                xy.x + 0.5 - segment.origin[0],
                xy.y + 0.5 - segment.origin[1],
            );
            for yi in 0..TILE_HEIGHT {
                for i in 0..TILE_WIDTH {
                    let dpos = dpos0 + Vec2::new(i as f32, yi as f32);
                    let t = (dpos.dot(delta) * scale).clamp(0.0, 1.0);
                    let ix = yi * TILE_WIDTH + i;
                    df[ix] = df[ix].min((delta * t - dpos).length());
                }
            }
        }
        seg_ix = segment.next;
    }
    for i in 0..TILE_SIZE {
        // Alpha is 1 inside the stroke and falls off linearly across
        // the boundary pixel.
        area[i] = (half_width + 0.5 - df[i]).clamp(0.0, 1.0);
    }
}

fn fine_main(
    config: &ConfigUniform,
    segments: &[Segment],
    ptcl: &[u32],
    bump: &BumpAllocators,
    output: &mut [u32],
) {
    if bump.failed != 0 {
        // The command streams are incomplete; leave the output alone
        // and let the host surface the failure.
        return;
    }
    let width_in_tiles = config.width_in_tiles;
    let height_in_tiles = config.height_in_tiles;
    let n_tiles = width_in_tiles * height_in_tiles;
    let out_stride = width_in_tiles as usize * TILE_WIDTH;
    let mut area = [0.0_f32; TILE_SIZE];
    let mut rgba = [[0.0_f32; 4]; TILE_SIZE];
    for tile_ix in 0..n_tiles {
        area.fill(0.0);
        rgba.fill([0.0; 4]);
        let tile_x = tile_ix % width_in_tiles;
        let tile_y = tile_ix / width_in_tiles;
        let xy = Vec2::new(
            (tile_x as usize * TILE_WIDTH) as f32,
            (tile_y as usize * TILE_HEIGHT) as f32,
        );
        let mut cmd_ix = tile_ix * PTCL_INITIAL_ALLOC;
        loop {
            let tag = ptcl[cmd_ix as usize];
            if tag == CMD_END {
                break;
            }
            match tag {
                CMD_FILL => {
                    let tile = read_fill(ptcl, cmd_ix);
                    fill_path(&mut area, segments, &tile, xy);
                    cmd_ix += 3;
                }
                CMD_STROKE => {
                    let stroke = read_stroke(ptcl, cmd_ix);
                    stroke_path(&mut area, segments, stroke.segments, stroke.half_width, xy);
                    cmd_ix += 3;
                }
                CMD_SOLID => {
                    area.fill(1.0);
                    cmd_ix += 1;
                }
                CMD_COLOR => {
                    let color = read_color(ptcl, cmd_ix);
                    let fg = unpack4x8unorm(color);
                    // The packed word is RGBA with alpha in the low
                    // byte; swizzle to (r, g, b, a).
                    let fg = [fg[3], fg[2], fg[1], fg[0]];
                    for i in 0..TILE_SIZE {
                        let ai = area[i];
                        let fg_i = [fg[0] * ai, fg[1] * ai, fg[2] * ai, fg[3] * ai];
                        for j in 0..4 {
                            rgba[i][j] = rgba[i][j] * (1.0 - fg_i[3]) + fg_i[j];
                        }
                    }
                    cmd_ix += 2;
                }
                CMD_JUMP => {
                    cmd_ix = ptcl[(cmd_ix + 1) as usize];
                }
                _ => panic!("unhandled ptcl command {tag}"),
            }
        }
        for y in 0..TILE_HEIGHT {
            let base =
                out_stride * (tile_y as usize * TILE_HEIGHT + y) + tile_x as usize * TILE_WIDTH;
            for x in 0..TILE_WIDTH {
                let fg = rgba[y * TILE_WIDTH + x];
                let a_inv = 1.0 / (fg[3] + 1e-6);
                let rgba_sep = [fg[0] * a_inv, fg[1] * a_inv, fg[2] * a_inv, fg[3]];
                output[base + x] = pack4x8unorm(rgba_sep);
            }
        }
    }
}

/// The fine rasterization stage.
///
/// Binding order: config, segments, ptcl, bump, output.
pub fn fine(_n_wg: u32, resources: &[CpuBinding<'_>]) {
    let config = resources[0].as_typed();
    let segments = resources[1].as_slice();
    let ptcl = resources[2].as_slice();
    let bump = resources[3].as_typed();
    let mut output = resources[4].as_slice_mut();
    fine_main(&config, &segments, &ptcl, &bump, &mut output);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Chains segments into a buffer, returning the list head.
    fn link_segments(buf: &mut Vec<Segment>, segs: &[([f32; 2], [f32; 2], f32)]) -> u32 {
        let mut head = 0;
        for &(origin, delta, y_edge) in segs {
            let ix = buf.len() as u32;
            buf.push(Segment {
                origin,
                delta,
                y_edge,
                next: head,
            });
            head = ix;
        }
        head
    }

    #[test]
    fn fill_path_covers_interior_of_square() {
        // An axis-aligned square from (4, 4) to (12, 12), wound
        // clockwise, fully inside the tile at the origin.
        let mut segments = vec![Segment::default()];
        let head = link_segments(
            &mut segments,
            &[
                ([4.0, 4.0], [8.0, 0.0], 1e9),
                ([12.0, 4.0], [0.0, 8.0], 1e9),
                ([12.0, 12.0], [-8.0, 0.0], 1e9),
                ([4.0, 12.0], [0.0, -8.0], 1e9),
            ],
        );
        let tile = Tile {
            backdrop: 0,
            segments: head,
        };
        let mut area = [0.0; TILE_SIZE];
        fill_path(&mut area, &segments, &tile, Vec2::new(0.0, 0.0));
        assert!((area[8 * TILE_WIDTH + 8] - 1.0).abs() < 1e-5);
        assert!(area[2 * TILE_WIDTH + 2].abs() < 1e-5);
        assert!(area[8 * TILE_WIDTH + 14].abs() < 1e-5);
    }

    #[test]
    fn fill_path_starts_from_backdrop() {
        let segments = vec![Segment::default()];
        let tile = Tile {
            backdrop: 1,
            segments: 0,
        };
        let mut area = [0.0; TILE_SIZE];
        fill_path(&mut area, &segments, &tile, Vec2::new(0.0, 0.0));
        assert!(area.iter().all(|a| (a - 1.0).abs() < 1e-6));
    }

    #[test]
    fn fill_path_y_edge_closes_left_clipped_segment() {
        // A segment entering through the left edge at y = 6; rows below
        // the crossing pick up the vertical edge contribution.
        let mut segments = vec![Segment::default()];
        let head = link_segments(&mut segments, &[([0.0, 6.0], [8.0, -4.0], 6.0)]);
        let tile = Tile {
            backdrop: 0,
            segments: head,
        };
        let mut area = [0.0; TILE_SIZE];
        fill_path(&mut area, &segments, &tile, Vec2::new(0.0, 0.0));
        // Well below both the segment and the crossing: only the
        // y_edge term contributes, a full winding of sign(delta.x).
        assert!((area[12 * TILE_WIDTH + 4] - 1.0).abs() < 1e-5);
        // Above the crossing and left of the segment: nothing.
        assert!(area[TILE_WIDTH + 1].abs() < 1e-5);
    }

    #[test]
    fn stroke_path_distance_falloff() {
        // Horizontal segment through pixel centers at y = 8.5.
        let mut segments = vec![Segment::default()];
        let head = link_segments(&mut segments, &[([2.5, 8.5], [10.0, 0.0], 1e9)]);
        let mut area = [0.0; TILE_SIZE];
        stroke_path(&mut area, &segments, head, 0.5, Vec2::new(0.0, 0.0));
        // On the segment: full coverage.
        assert!((area[8 * TILE_WIDTH + 8] - 1.0).abs() < 1e-6);
        // One pixel above: distance 1, no coverage.
        assert!(area[7 * TILE_WIDTH + 8].abs() < 1e-6);
        // Past the cap: distance from the endpoint.
        assert!(area[8 * TILE_WIDTH + 14].abs() < 1e-6);
    }

    #[test]
    fn stroke_path_skips_degenerate_segment() {
        let mut segments = vec![Segment::default()];
        let head = link_segments(&mut segments, &[([8.0, 8.0], [0.0, 0.0], 1e9)]);
        let mut area = [0.0; TILE_SIZE];
        stroke_path(&mut area, &segments, head, 0.5, Vec2::new(0.0, 0.0));
        assert!(area.iter().all(|a| *a == 0.0));
    }

    #[test]
    fn color_packing_round_trip() {
        let packed = pack4x8unorm(unpack4x8unorm(0x80ff_40c0));
        assert_eq!(packed, 0x80ff_40c0);
    }
}
