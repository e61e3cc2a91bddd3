// Copyright 2025 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reference line tiler.
//!
//! Fill edges are marched across the tile grid of their path; each tile
//! a line passes through receives the piece clipped to it, chained onto
//! the tile's segment list. Winding state that leaves a tile sideways
//! is carried two ways: crossings of a tile's top seam deposit a delta
//! in the tile right of the crossing (resolved into per-tile backdrops
//! by [`backdrop_prefix`]), and crossings of a tile's left seam are
//! recorded in the emitted segment's `y_edge` for the fine stage's
//! half-open vertical term.

use stipple_encoding::{Path, Segment, Tile};
use stipple_shaders::cpu::util::{span, Vec2, ONE_MINUS_ULP, ROBUST_EPSILON};

const TILE_WIDTH: u32 = 16;
const TILE_HEIGHT: u32 = 16;
const TILE_RECIP: f32 = 1.0 / 16.0;

/// A monotone-down line's march through the tile grid, in tile units.
///
/// Step `i` of the march visits one grid cell. Writing `z(i)` for the
/// number of sideways moves taken in the first `i` steps, the visited
/// cell is `(col(i), row(i)) = (col_origin + dir * z(i), row0 + i -
/// z(i))`, and `z` itself is the floor of an affine function of `i`:
/// its slope is the fraction of boundary crossings that are vertical
/// seams, and its phase aligns step boundaries with the first seam the
/// line actually reaches. Mirroring leftward lines through `dir` keeps
/// `z` monotone either way.
struct GridWalk {
    slope: f32,
    phase: f32,
    /// +1 when the line runs rightward, -1 leftward.
    dir: f32,
    col_origin: f32,
    row0: f32,
    /// Total cells visited by the unclipped line.
    steps: u32,
    rightward: bool,
    /// The line begins exactly on a row seam.
    starts_on_row: bool,
}

impl GridWalk {
    /// Parameterizes the march for the line `top -> bot` (tile units,
    /// `bot.y >= top.y`). Returns `None` when no tile can be affected:
    /// a zero-length line, or a horizontal one lying exactly on a row
    /// seam.
    fn new(top: Vec2, bot: Vec2) -> Option<Self> {
        let x_extent = (bot.x - top.x).abs();
        let y_extent = bot.y - top.y;
        if x_extent + y_extent == 0.0 {
            return None;
        }
        if y_extent == 0.0 && top.y.floor() == top.y {
            return None;
        }
        let cols = span(top.x, bot.x) - 1;
        let steps = cols + span(top.y, bot.y);
        let rightward = bot.x >= top.x;
        let dir = if rightward { 1.0 } else { -1.0 };
        let mirrored = top.x * dir;
        let col0 = mirrored.floor();
        let row0 = top.y.floor();
        // The first seam the line meets: the next row boundary, or for
        // a horizontal line the end of its row.
        let first_exit = if top.y == bot.y {
            top.y.ceil()
        } else {
            row0 + 1.0
        };
        let recip = 1.0 / (x_extent + y_extent);
        let mut slope = x_extent * recip;
        // Kept strictly below 1 so z(0) lands on the starting cell.
        let phase = ((y_extent * (mirrored - col0) + x_extent * (first_exit - top.y)) * recip)
            .min(ONE_MINUS_ULP);
        // The march must make exactly `cols` sideways moves overall;
        // when accumulated rounding drifts off that, lean the slope
        // back.
        let drift = (slope * (steps as f32 - 1.0) + phase).floor() - cols as f32;
        if drift != 0.0 {
            slope -= ROBUST_EPSILON.copysign(drift);
        }
        let col_origin = col0 * dir + if rightward { 0.0 } else { -1.0 };
        Some(Self {
            slope,
            phase,
            dir,
            col_origin,
            row0,
            steps,
            rightward,
            starts_on_row: row0 == top.y,
        })
    }

    fn z(&self, step: f32) -> f32 {
        (self.slope * step + self.phase).floor()
    }

    fn col(&self, step: f32) -> f32 {
        self.col_origin + self.dir * self.z(step)
    }

    fn row(&self, step: f32) -> f32 {
        self.row0 + step - self.z(step)
    }
}

/// Point where `a -> b` meets the horizontal seam at `y`, pulled just
/// inside `[x_lo, x_hi]`.
fn cross_row(a: Vec2, b: Vec2, y: f32, x_lo: f32, x_hi: f32) -> Vec2 {
    let x = a.x + (b.x - a.x) * (y - a.y) / (b.y - a.y);
    Vec2::new(x.clamp(x_lo + 1e-3, x_hi), y)
}

/// Point where `a -> b` meets the vertical seam at `x`, pulled just
/// inside `[y_lo, y_hi]`.
fn cross_col(a: Vec2, b: Vec2, x: f32, y_lo: f32, y_hi: f32) -> Vec2 {
    let y = a.y + (b.y - a.y) * (x - a.x) / (b.x - a.x);
    Vec2::new(x, y.clamp(y_lo + 1e-3, y_hi))
}

/// Marches one fill edge across its path's tile rectangle.
///
/// `bbox` is the path's tile bounding box and `tile_base` the start of
/// its tile rectangle in the grid. The part of the line outside the
/// bbox is not walked, but the winding it would have carried into the
/// bbox still lands in the leftmost column's backdrop deltas.
pub(crate) fn tile_line(
    p0: Vec2,
    p1: Vec2,
    bbox: [i32; 4],
    tile_base: u32,
    tiles: &mut [Tile],
    segments: &mut Vec<Segment>,
) {
    let downward = p1.y >= p0.y;
    // Pixel-space endpoints sorted top-first; the original direction
    // survives in `downward` and decides the winding sign.
    let (tp0, tp1) = if downward { (p0, p1) } else { (p1, p0) };
    let top = tp0 * TILE_RECIP;
    let bot = tp1 * TILE_RECIP;
    let Some(walk) = GridWalk::new(top, bot) else {
        return;
    };
    let winding = if downward { -1 } else { 1 };

    let stride = bbox[2] - bbox[0];
    if top.y >= bbox[3] as f32
        || bot.y < bbox[1] as f32
        || top.x.min(bot.x) >= bbox[2] as f32
        || stride == 0
    {
        return;
    }

    // Restrict the march to the steps whose rows lie inside the bbox.
    let mut first = 0;
    if top.y < bbox[1] as f32 {
        let mut f = ((bbox[1] as f32 - walk.row0 + walk.phase - walk.slope)
            / (1.0 - walk.slope))
            .round()
            - 1.0;
        if walk.row(f) < bbox[1] as f32 {
            f += 1.0;
        }
        first = f as u32;
    }
    let mut last = walk.steps;
    if bot.y > bbox[3] as f32 {
        let mut f = ((bbox[3] as f32 - walk.row0 + walk.phase - walk.slope)
            / (1.0 - walk.slope))
            .round()
            - 1.0;
        if walk.row(f) < bbox[3] as f32 {
            f += 1.0;
        }
        last = f as u32;
    }

    // Steps outside the bbox sideways are dropped too, but rows the
    // line crosses left of the bbox still owe their winding to the
    // leftmost column.
    let mut spill_top = 0;
    let mut spill_bot = 0;
    if top.x.max(bot.x) < bbox[0] as f32 {
        // Entirely left of the rectangle: winding only.
        spill_top = top.y.ceil() as i32;
        spill_bot = bot.y.ceil() as i32;
        last = first;
    } else {
        // Step at which the march reaches tile column `col`, biased so
        // the returned step is the first one inside the bbox side.
        let col_cross = |col: f32| -> f32 {
            let bias = if walk.rightward { 0.0 } else { 1.0 };
            let mut f =
                ((walk.dir * (col - walk.col_origin) - walk.phase + bias) / walk.slope).round();
            if (walk.col(f) < col) == walk.rightward {
                f += 1.0;
            }
            f
        };
        if top.x.min(bot.x) < bbox[0] as f32 {
            let f = col_cross(bbox[0] as f32);
            let row_after = (walk.row(f) + 1.0) as i32;
            if walk.rightward {
                // Enters from the left: the head of the march spills.
                if f as u32 > first {
                    spill_top =
                        (walk.row0 + if walk.starts_on_row { 0.0 } else { 1.0 }) as i32;
                    spill_bot = row_after;
                    first = f as u32;
                }
            } else if (f as u32) < last {
                // Leaves to the left: the tail spills.
                spill_top = row_after;
                spill_bot = bot.y.ceil() as i32;
                last = f as u32;
            }
        }
        if top.x.max(bot.x) > bbox[2] as f32 {
            let f = col_cross(bbox[2] as f32);
            if walk.rightward {
                last = last.min(f as u32);
            } else {
                first = first.max(f as u32);
            }
        }
    }
    last = first.max(last);
    for row in spill_top.max(bbox[1])..spill_bot.min(bbox[3]) {
        tiles[(tile_base as i32 + (row - bbox[1]) * stride) as usize].backdrop += winding;
    }

    let mut prev_z = walk.z(first as f32 - 1.0);
    for i in first..last {
        let z = walk.z(i as f32);
        let cell_x = walk.col(i as f32) as i32;
        let cell_y = walk.row(i as f32) as i32;
        // Did the march enter this cell across its top seam? For the
        // very first cell that means starting exactly on one.
        let from_top = if i == 0 {
            walk.starts_on_row
        } else {
            prev_z == z
        };
        let row_base = tile_base as i32 + (cell_y - bbox[1]) * stride - bbox[0];
        if from_top && cell_x + 1 < bbox[2] {
            // A top-seam crossing changes the winding seen by every
            // tile to its right; the delta lands on the nearest one
            // still inside the bbox.
            tiles[(row_base + (cell_x + 1).max(bbox[0])) as usize].backdrop += winding;
        }

        // Clip the line to this cell. The entry point replaces the top
        // endpoint, and the exit is interpolated from the already
        // clipped entry.
        let tile_min = Vec2::new(
            (cell_x * TILE_WIDTH as i32) as f32,
            (cell_y * TILE_HEIGHT as i32) as f32,
        );
        let tile_max = tile_min + Vec2::new(TILE_WIDTH as f32, TILE_HEIGHT as f32);
        let mut start = tp0;
        let mut end = tp1;
        if i > 0 {
            start = if from_top {
                cross_row(start, end, tile_min.y, tile_min.x, tile_max.x)
            } else if walk.rightward {
                cross_col(start, end, tile_min.x, tile_min.y, tile_max.y)
            } else {
                cross_col(start, end, tile_max.x, tile_min.y, tile_max.y)
            };
        }
        if i + 1 < walk.steps {
            end = if walk.z(i as f32 + 1.0) == z {
                cross_row(start, end, tile_max.y, tile_min.x, tile_max.x)
            } else if walk.rightward {
                cross_col(start, end, tile_max.x, tile_min.y, tile_max.y)
            } else {
                cross_col(start, end, tile_min.x, tile_min.y, tile_max.y)
            };
        }

        // Seam bookkeeping in cell-relative coordinates. An endpoint
        // on the left seam either turns into the segment's y_edge
        // crossing, or gets nudged off the seam so the area integral
        // cannot alias it into the neighbor.
        const SEAM_NUDGE: f32 = 1e-6;
        let mut r0 = start - tile_min;
        let mut r1 = end - tile_min;
        let mut left_crossing = 1e9;
        if r0.x == 0.0 && r1.x == 0.0 {
            // The piece runs down the left seam itself. Entering at
            // the corner makes it stand in for the cell's whole left
            // boundary; otherwise the seam winding is already carried
            // by the deltas above and the piece collapses to nothing.
            r0.x = SEAM_NUDGE;
            if r0.y == 0.0 {
                r1 = Vec2::new(SEAM_NUDGE, TILE_HEIGHT as f32);
            } else {
                r1 = Vec2::new(2.0 * SEAM_NUDGE, r0.y);
            }
        } else if r0.x == 0.0 {
            if r0.y == 0.0 {
                r0.x = SEAM_NUDGE;
            } else {
                left_crossing = r0.y;
            }
        } else if r1.x == 0.0 {
            if r1.y == 0.0 {
                r1.x = SEAM_NUDGE;
            } else {
                left_crossing = r1.y;
            }
        }
        for r in [&mut r0, &mut r1] {
            if r.x != 0.0 && r.x == r.x.floor() {
                r.x -= SEAM_NUDGE;
            }
        }
        if !downward {
            std::mem::swap(&mut r0, &mut r1);
        }
        debug_assert!((0.0..=TILE_WIDTH as f32).contains(&r0.x));
        debug_assert!((0.0..=TILE_HEIGHT as f32).contains(&r0.y));
        debug_assert!((0.0..=TILE_WIDTH as f32).contains(&r1.x));
        debug_assert!((0.0..=TILE_HEIGHT as f32).contains(&r1.y));

        let y_edge = if left_crossing == 1e9 {
            1e9
        } else {
            tile_min.y + left_crossing
        };
        let tile = &mut tiles[(row_base + cell_x) as usize];
        let seg_ix = segments.len() as u32;
        segments.push(Segment {
            origin: (tile_min + r0).to_array(),
            delta: (r1 - r0).to_array(),
            y_edge,
            next: tile.segments,
        });
        tile.segments = seg_ix;
        prev_z = z;
    }
}

/// Resolves the winding deltas deposited by [`tile_line`] into each
/// tile's accumulated backdrop, left to right within every row of the
/// path's tile rectangle.
pub(crate) fn backdrop_prefix(path: &Path, tiles: &mut [Tile]) {
    let width = (path.bbox[2] - path.bbox[0]) as usize;
    let height = (path.bbox[3] - path.bbox[1]) as usize;
    let rect = &mut tiles[path.tiles as usize..][..width * height];
    for row in rect.chunks_exact_mut(width) {
        let mut winding = 0;
        for tile in row {
            winding += tile.backdrop;
            tile.backdrop = winding;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(segments: &[Segment], head: u32) -> Vec<Segment> {
        let mut out = Vec::new();
        let mut ix = head;
        while ix != 0 {
            out.push(segments[ix as usize]);
            ix = segments[ix as usize].next;
        }
        out
    }

    #[test]
    fn vertical_edge_spans_rows() {
        // A downward edge at x = 8 crossing two tile rows.
        let bbox = [0, 0, 1, 2];
        let mut tiles = vec![Tile::default(); 2];
        let mut segments = vec![Segment::default()];
        tile_line(
            Vec2::new(8.0, 0.0),
            Vec2::new(8.0, 32.0),
            bbox,
            0,
            &mut tiles,
            &mut segments,
        );
        let top = walk(&segments, tiles[0].segments);
        let bottom = walk(&segments, tiles[1].segments);
        assert_eq!(top.len(), 1);
        assert_eq!(bottom.len(), 1);
        assert_eq!(top[0].origin[1], 0.0);
        assert_eq!(bottom[0].origin[1], 16.0);
    }

    #[test]
    fn top_crossing_bumps_backdrop_to_the_right() {
        // A downward edge in the left tile of a 2x1 grid; the right
        // tile sees it only through its backdrop.
        let bbox = [0, 0, 2, 1];
        let mut tiles = vec![Tile::default(); 2];
        let mut segments = vec![Segment::default()];
        tile_line(
            Vec2::new(4.0, 0.0),
            Vec2::new(4.0, 16.0),
            bbox,
            0,
            &mut tiles,
            &mut segments,
        );
        assert_ne!(tiles[0].segments, 0);
        assert_eq!(tiles[1].segments, 0);
        assert_eq!(tiles[1].backdrop, -1);
        assert_eq!(tiles[0].backdrop, 0);
    }

    #[test]
    fn diagonal_visits_each_crossed_tile_once() {
        let bbox = [0, 0, 2, 2];
        let mut tiles = vec![Tile::default(); 4];
        let mut segments = vec![Segment::default()];
        tile_line(
            Vec2::new(2.0, 1.0),
            Vec2::new(30.0, 29.0),
            bbox,
            0,
            &mut tiles,
            &mut segments,
        );
        // Three tiles on the diagonal's path, one untouched.
        let touched: Vec<usize> = (0..4).filter(|&i| tiles[i].segments != 0).collect();
        assert_eq!(touched, vec![0, 1, 3]);
    }
}
