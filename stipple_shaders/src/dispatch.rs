// Copyright 2025 the Stipple Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use stipple_encoding::{BumpAllocators, WorkgroupCounts};
use thiserror::Error;

use crate::cpu::{self, CpuBinding};

/// Errors surfaced by the host dispatch helper.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The coarse stage ran out of PTCL memory. Rerun with a larger
    /// `ptcl_size`; the output buffer was not written.
    #[error("ptcl bump buffer exceeded (failed stages: {failed:#x})")]
    BumpBufferExceeded { failed: u32 },
}

/// Binding index of the bump allocator in the coarse resource list.
pub const COARSE_BUMP_BINDING: usize = 8;

/// Dispatches the coarse stage, then the fine stage, in order.
///
/// The caller provides the resource lists in the binding order
/// documented on [`cpu::coarse`] and [`cpu::fine`], with the bump
/// allocator zeroed. The bump flags are checked at the barrier between
/// the stages; on failure the fine stage is not dispatched.
pub fn render_to_buffer(
    coarse_resources: &[CpuBinding<'_>],
    fine_resources: &[CpuBinding<'_>],
    workgroups: &WorkgroupCounts,
) -> Result<(), RenderError> {
    let (coarse_x, coarse_y, _) = workgroups.coarse;
    cpu::coarse(coarse_x * coarse_y, coarse_resources);
    let failed = {
        let bump = coarse_resources[COARSE_BUMP_BINDING].as_typed::<BumpAllocators>();
        bump.failed
    };
    if failed != 0 {
        log::warn!("coarse rasterization failed (flags {failed:#x}); skipping fine stage");
        return Err(RenderError::BumpBufferExceeded { failed });
    }
    let (fine_x, fine_y, _) = workgroups.fine;
    cpu::fine(fine_x * fine_y, fine_resources);
    Ok(())
}
