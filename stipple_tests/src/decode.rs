// Copyright 2025 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! PTCL stream decoder.

use stipple_encoding::ptcl::{
    CMD_COLOR, CMD_END, CMD_FILL, CMD_JUMP, CMD_SOLID, CMD_STROKE, PTCL_INITIAL_ALLOC,
};

/// A decoded command. Jumps are transparent to the decoder and
/// reported separately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Fill { segments: u32, backdrop: i32 },
    Stroke { segments: u32, half_width: f32 },
    Solid,
    Color { rgba: u32 },
}

#[derive(Debug, Default)]
pub struct DecodedTile {
    pub commands: Vec<Command>,
    /// Absolute word offsets the stream jumped to, in stream order.
    pub jumps: Vec<u32>,
}

impl DecodedTile {
    /// The color payloads in stream order, the order the fine stage
    /// composites in.
    pub fn colors(&self) -> Vec<u32> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::Color { rgba } => Some(*rgba),
                _ => None,
            })
            .collect()
    }
}

/// Walks one tile's command stream from its initial block to `CMD_END`,
/// following every jump. Panics on a malformed stream.
pub fn decode_tile(ptcl: &[u32], tile_ix: u32) -> DecodedTile {
    let mut cmd_ix = tile_ix * PTCL_INITIAL_ALLOC;
    let mut out = DecodedTile::default();
    loop {
        let tag = ptcl[cmd_ix as usize];
        match tag {
            CMD_END => break,
            CMD_FILL => {
                out.commands.push(Command::Fill {
                    segments: ptcl[(cmd_ix + 1) as usize],
                    backdrop: ptcl[(cmd_ix + 2) as usize] as i32,
                });
                cmd_ix += 3;
            }
            CMD_STROKE => {
                out.commands.push(Command::Stroke {
                    segments: ptcl[(cmd_ix + 1) as usize],
                    half_width: f32::from_bits(ptcl[(cmd_ix + 2) as usize]),
                });
                cmd_ix += 3;
            }
            CMD_SOLID => {
                out.commands.push(Command::Solid);
                cmd_ix += 1;
            }
            CMD_COLOR => {
                out.commands.push(Command::Color {
                    rgba: ptcl[(cmd_ix + 1) as usize],
                });
                cmd_ix += 2;
            }
            CMD_JUMP => {
                let target = ptcl[(cmd_ix + 1) as usize];
                out.jumps.push(target);
                cmd_ix = target;
            }
            _ => panic!("unknown ptcl tag {tag} at word {cmd_ix}"),
        }
    }
    out
}
