// Copyright 2025 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};

/// Binning header, one per (partition, bin) pair.
///
/// Partition `p` owns draw objects `[p * N_TILE, (p + 1) * N_TILE)`;
/// within a bin, partitions are concatenated in partition index order,
/// which is what lets the coarse stage merge them back into global draw
/// object order.
#[derive(Copy, Clone, Pod, Zeroable, Debug, Default)]
#[repr(C)]
pub struct BinHeader {
    /// Number of draw object refs this partition contributes to the bin.
    pub element_count: u32,
    /// Start of those refs in the bin data buffer.
    pub chunk_offset: u32,
}
