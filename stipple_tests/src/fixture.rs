// Copyright 2025 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scene builder and buffer harness.
//!
//! [`TestScene`] collects plain geometry, and [`TestScene::resolve`]
//! runs the reference upstream stages over it: draw stream encoding,
//! the draw-leaf info pass, line tiling with backdrop propagation, and
//! binning into partitions. The result is a [`Frame`] holding every
//! buffer the two raster stages bind.

use std::cell::RefCell;

use stipple_encoding::ptcl::PTCL_INITIAL_ALLOC;
use stipple_encoding::{
    BinHeader, BufferSize, BumpAllocators, DrawColor, DrawMonoid, DrawTag, Layout, Path,
    RenderConfig, Segment, Tile, N_TILE, N_TILE_X, N_TILE_Y, TILE_HEIGHT, TILE_WIDTH,
};
use stipple_shaders::cpu::util::Vec2;
use stipple_shaders::cpu::{self, CpuBinding};
use stipple_shaders::{render_to_buffer, RenderError};

use crate::decode::{self, DecodedTile};
use crate::tiling;

struct DrawObject {
    lines: Vec<[Vec2; 2]>,
    /// Negative for fills, the stroke width otherwise.
    linewidth: f32,
    color: DrawColor,
}

/// A scene under construction. Draw objects composite in insertion
/// order.
pub struct TestScene {
    width: u32,
    height: u32,
    ptcl_words: Option<u32>,
    objects: Vec<DrawObject>,
}

impl TestScene {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ptcl_words: None,
            objects: Vec::new(),
        }
    }

    /// Overrides the PTCL buffer size, e.g. to provoke bump exhaustion.
    pub fn with_ptcl_words(mut self, words: u32) -> Self {
        self.ptcl_words = Some(words);
        self
    }

    pub fn fill_rect(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, color: impl Into<DrawColor>) {
        self.fill_polygon(&[[x0, y0], [x1, y0], [x1, y1], [x0, y1]], color);
    }

    /// Fills a closed polygon (the last point connects back to the
    /// first), non-zero winding.
    pub fn fill_polygon(&mut self, points: &[[f32; 2]], color: impl Into<DrawColor>) {
        let mut lines = Vec::with_capacity(points.len());
        for (i, p) in points.iter().enumerate() {
            let q = points[(i + 1) % points.len()];
            lines.push([Vec2::from_array(*p), Vec2::from_array(q)]);
        }
        self.objects.push(DrawObject {
            lines,
            linewidth: -1.0,
            color: color.into(),
        });
    }

    pub fn stroke_polyline(&mut self, points: &[[f32; 2]], width: f32, color: impl Into<DrawColor>) {
        let lines = points
            .windows(2)
            .map(|w| [Vec2::from_array(w[0]), Vec2::from_array(w[1])])
            .collect();
        self.objects.push(DrawObject {
            lines,
            linewidth: width,
            color: color.into(),
        });
    }

    /// Runs the reference upstream stages and lays out every buffer.
    pub fn resolve(&self) -> Frame {
        let n_drawobj = self.objects.len() as u32;
        let layout = Layout {
            n_draw_objects: n_drawobj,
            draw_tag_base: 0,
            draw_data_base: n_drawobj,
        };
        let mut config = RenderConfig::new(&layout, self.width, self.height);
        if let Some(words) = self.ptcl_words {
            config.buffer_sizes.ptcl = BufferSize::new(words);
            config.gpu.ptcl_size = words;
        }
        let width_in_tiles = config.gpu.width_in_tiles;
        let height_in_tiles = config.gpu.height_in_tiles;

        // Scene stream: draw tags then draw data.
        let mut scene = vec![0u32; (2 * n_drawobj) as usize];
        for (i, obj) in self.objects.iter().enumerate() {
            scene[i] = DrawTag::COLOR.0;
            scene[n_drawobj as usize + i] = obj.color.rgba;
        }

        // Draw-leaf stand-in: exclusive monoid prefix plus the info
        // stream (one linewidth word per draw object).
        let mut draw_monoids = Vec::with_capacity(self.objects.len());
        let mut m = DrawMonoid::default();
        for _ in &self.objects {
            draw_monoids.push(m);
            m = m.combine(&DrawMonoid::new(DrawTag::COLOR));
        }
        let mut info = vec![0u32; (m.info_offset as usize).max(1)];
        for (obj, dm) in self.objects.iter().zip(&draw_monoids) {
            info[dm.info_offset as usize] = obj.linewidth.to_bits();
        }

        // Tiling stand-in.
        let mut paths = Vec::with_capacity(self.objects.len());
        let mut tiles: Vec<Tile> = Vec::new();
        let mut segments = vec![Segment::default()];
        for obj in &self.objects {
            let path = resolve_path(
                obj,
                width_in_tiles,
                height_in_tiles,
                &mut tiles,
                &mut segments,
            );
            paths.push(path);
        }

        // Binning stand-in.
        let width_in_bins = width_in_tiles.div_ceil(N_TILE_X);
        let height_in_bins = height_in_tiles.div_ceil(N_TILE_Y);
        let n_bins = (width_in_bins * height_in_bins) as usize;
        assert!(n_bins <= N_TILE as usize, "harness supports at most 256 bins");
        let n_partitions = n_drawobj.div_ceil(N_TILE);
        let mut bin_headers = vec![BinHeader::default(); ((n_partitions * N_TILE) as usize).max(1)];
        let mut bin_data: Vec<u32> = Vec::new();
        for part in 0..n_partitions {
            let mut counts = vec![0u32; n_bins];
            let mut bboxes = vec![[0i32; 4]; N_TILE as usize];
            for local in 0..N_TILE {
                let element = part * N_TILE + local;
                let mut bbox = [0i32; 4];
                if element < n_drawobj {
                    let pb = paths[element as usize].bbox;
                    if pb[0] < pb[2] && pb[1] < pb[3] {
                        bbox = [
                            (pb[0] / N_TILE_X) as i32,
                            (pb[1] / N_TILE_Y) as i32,
                            pb[2].div_ceil(N_TILE_X) as i32,
                            pb[3].div_ceil(N_TILE_Y) as i32,
                        ];
                    }
                }
                for y in bbox[1]..bbox[3] {
                    for x in bbox[0]..bbox[2] {
                        counts[(y * width_in_bins as i32 + x) as usize] += 1;
                    }
                }
                bboxes[local as usize] = bbox;
            }
            let mut chunk_offset = vec![0u32; n_bins];
            for bin in 0..n_bins {
                chunk_offset[bin] = bin_data.len() as u32;
                bin_headers[(part * N_TILE) as usize + bin] = BinHeader {
                    element_count: counts[bin],
                    chunk_offset: chunk_offset[bin],
                };
                bin_data.resize(bin_data.len() + counts[bin] as usize, 0);
            }
            for local in 0..N_TILE {
                let element = part * N_TILE + local;
                let bbox = bboxes[local as usize];
                for y in bbox[1]..bbox[3] {
                    for x in bbox[0]..bbox[2] {
                        let bin_ix = (y * width_in_bins as i32 + x) as usize;
                        bin_data[chunk_offset[bin_ix] as usize] = element;
                        chunk_offset[bin_ix] += 1;
                    }
                }
            }
        }

        let ptcl = vec![0u32; config.gpu.ptcl_size as usize];
        let output = vec![0u32; config.buffer_sizes.output.len() as usize];
        Frame {
            config_bytes: bytemuck::bytes_of(&config.gpu).to_vec(),
            scene: cast_vec(&scene),
            draw_monoids: cast_vec(&draw_monoids),
            bin_headers: cast_vec(&bin_headers),
            bin_data: cast_vec(&bin_data),
            info: cast_vec(&info),
            paths: cast_vec(&paths),
            tiles: cast_vec(&tiles),
            segments: cast_vec(&segments),
            bump: RefCell::new(vec![0u8; size_of::<BumpAllocators>()]),
            ptcl: RefCell::new(cast_vec(&ptcl)),
            output: RefCell::new(cast_vec(&output)),
            config,
        }
    }
}

fn cast_vec<T: bytemuck::Pod>(v: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(v).to_vec()
}

/// Tiles one draw object: allocates its tile rectangle, runs the line
/// tiler (fills) or the distance-field deposit (strokes), and resolves
/// backdrops.
fn resolve_path(
    obj: &DrawObject,
    width_in_tiles: u32,
    height_in_tiles: u32,
    tiles: &mut Vec<Tile>,
    segments: &mut Vec<Segment>,
) -> Path {
    let mut min = Vec2::new(f32::MAX, f32::MAX);
    let mut max = Vec2::new(f32::MIN, f32::MIN);
    for line in &obj.lines {
        for p in line {
            min = min.min(*p);
            max = max.max(*p);
        }
    }
    // Strokes influence pixels up to half a line width plus the
    // anti-aliasing ramp away from the spine.
    let expand = if obj.linewidth >= 0.0 {
        0.5 * obj.linewidth + 0.5
    } else {
        0.0
    };
    min = min - Vec2::new(expand, expand);
    max = max + Vec2::new(expand, expand);
    let x0 = ((min.x / TILE_WIDTH as f32).floor() as i32).clamp(0, width_in_tiles as i32);
    let y0 = ((min.y / TILE_HEIGHT as f32).floor() as i32).clamp(0, height_in_tiles as i32);
    let x1 = ((max.x / TILE_WIDTH as f32).ceil() as i32).clamp(0, width_in_tiles as i32);
    let y1 = ((max.y / TILE_HEIGHT as f32).ceil() as i32).clamp(0, height_in_tiles as i32);
    let tile_base = tiles.len() as u32;
    let path = Path {
        bbox: [x0 as u32, y0 as u32, x1 as u32, y1 as u32],
        tiles: tile_base,
        _padding: [0; 3],
    };
    if x0 >= x1 || y0 >= y1 {
        return Path {
            bbox: [0; 4],
            tiles: 0,
            _padding: [0; 3],
        };
    }
    tiles.resize(tiles.len() + ((x1 - x0) * (y1 - y0)) as usize, Tile::default());
    if obj.linewidth < 0.0 {
        for line in &obj.lines {
            tiling::tile_line(line[0], line[1], [x0, y0, x1, y1], tile_base, tiles, segments);
        }
        tiling::backdrop_prefix(&path, tiles);
    } else {
        // Distance fields need the true spine, so stroke segments are
        // deposited unclipped into every tile their expanded bounding
        // box overlaps.
        let stride = x1 - x0;
        for line in &obj.lines {
            let lo = line[0].min(line[1]) - Vec2::new(expand, expand);
            let hi = line[0].max(line[1]) + Vec2::new(expand, expand);
            let tx0 = ((lo.x / TILE_WIDTH as f32).floor() as i32).clamp(x0, x1);
            let ty0 = ((lo.y / TILE_HEIGHT as f32).floor() as i32).clamp(y0, y1);
            let tx1 = ((hi.x / TILE_WIDTH as f32).ceil() as i32).clamp(x0, x1);
            let ty1 = ((hi.y / TILE_HEIGHT as f32).ceil() as i32).clamp(y0, y1);
            for ty in ty0..ty1 {
                for tx in tx0..tx1 {
                    let tile =
                        &mut tiles[(tile_base as i32 + (ty - y0) * stride + (tx - x0)) as usize];
                    let seg_ix = segments.len() as u32;
                    segments.push(Segment {
                        origin: line[0].to_array(),
                        delta: (line[1] - line[0]).to_array(),
                        y_edge: 1e9,
                        next: tile.segments,
                    });
                    tile.segments = seg_ix;
                }
            }
        }
    }
    path
}

/// Every buffer of one frame, ready to bind.
pub struct Frame {
    pub config: RenderConfig,
    config_bytes: Vec<u8>,
    scene: Vec<u8>,
    draw_monoids: Vec<u8>,
    bin_headers: Vec<u8>,
    bin_data: Vec<u8>,
    info: Vec<u8>,
    paths: Vec<u8>,
    tiles: Vec<u8>,
    segments: Vec<u8>,
    bump: RefCell<Vec<u8>>,
    ptcl: RefCell<Vec<u8>>,
    output: RefCell<Vec<u8>>,
}

impl Frame {
    pub fn coarse_bindings(&self) -> [CpuBinding<'_>; 10] {
        [
            CpuBinding::Buffer(&self.config_bytes),
            CpuBinding::Buffer(&self.scene),
            CpuBinding::Buffer(&self.draw_monoids),
            CpuBinding::Buffer(&self.bin_headers),
            CpuBinding::Buffer(&self.bin_data),
            CpuBinding::Buffer(&self.info),
            CpuBinding::Buffer(&self.paths),
            CpuBinding::Buffer(&self.tiles),
            CpuBinding::BufferRW(&self.bump),
            CpuBinding::BufferRW(&self.ptcl),
        ]
    }

    pub fn fine_bindings(&self) -> [CpuBinding<'_>; 5] {
        // The ptcl and bump buffers are read-only to fine but live in
        // RefCells because coarse writes them; the RW binding serves
        // both access modes.
        [
            CpuBinding::Buffer(&self.config_bytes),
            CpuBinding::Buffer(&self.segments),
            CpuBinding::BufferRW(&self.ptcl),
            CpuBinding::BufferRW(&self.bump),
            CpuBinding::BufferRW(&self.output),
        ]
    }

    /// Dispatches both stages through the host helper.
    pub fn render(&self) -> Result<(), RenderError> {
        render_to_buffer(
            &self.coarse_bindings(),
            &self.fine_bindings(),
            &self.config.workgroup_counts,
        )
    }

    pub fn run_coarse(&self) {
        let (x, y, _) = self.config.workgroup_counts.coarse;
        cpu::coarse(x * y, &self.coarse_bindings());
    }

    pub fn run_fine(&self) {
        let (x, y, _) = self.config.workgroup_counts.fine;
        cpu::fine(x * y, &self.fine_bindings());
    }

    pub fn bump(&self) -> BumpAllocators {
        *bytemuck::from_bytes(&self.bump.borrow())
    }

    pub fn ptcl_words(&self) -> Vec<u32> {
        bytemuck::cast_slice(&self.ptcl.borrow()).to_vec()
    }

    pub fn output_pixels(&self) -> Vec<u32> {
        bytemuck::cast_slice(&self.output.borrow()).to_vec()
    }

    pub fn segments(&self) -> Vec<Segment> {
        bytemuck::cast_slice(&self.segments).to_vec()
    }

    /// Framebuffer row stride in pixels.
    pub fn stride(&self) -> usize {
        (self.config.gpu.width_in_tiles * TILE_WIDTH) as usize
    }

    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.output_pixels()[y as usize * self.stride() + x as usize]
    }

    pub fn tile_ix(&self, tile_x: u32, tile_y: u32) -> u32 {
        tile_y * self.config.gpu.width_in_tiles + tile_x
    }

    /// Decodes one tile's command stream, following jumps.
    pub fn decode_tile(&self, tile_x: u32, tile_y: u32) -> DecodedTile {
        decode::decode_tile(&self.ptcl_words(), self.tile_ix(tile_x, tile_y))
    }

    /// Word offset where an untouched tile's stream would start.
    pub fn initial_offset(&self, tile_x: u32, tile_y: u32) -> u32 {
        self.tile_ix(tile_x, tile_y) * PTCL_INITIAL_ALLOC
    }
}
