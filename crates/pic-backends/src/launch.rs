//! Launch geometry for a requested number of parallel units.
//!
//! Block counts follow `floor(units / tpb) + 1`. When `units` is an exact
//! multiple of `tpb` this yields one idle block beyond the minimal ceiling;
//! kernels bounds-check their global index, so the extra block only costs a
//! few no-op threads.

use crate::backend::LaunchConfig;
use crate::error::{BackendError, Result};

/// Default threads per block for 1D launches.
pub const DEFAULT_TPB_1D: u32 = 256;

/// Default `(x, y)` threads per block for 2D launches.
pub const DEFAULT_TPB_2D: (u32, u32) = (1, 128);

fn blocks_for(units: u64, tpb: u32, axis: &str) -> Result<u32> {
    if tpb == 0 {
        return Err(BackendError::InvalidLaunchConfig(format!(
            "threads per block along {axis} must be positive"
        )));
    }
    let too_many = || BackendError::InvalidLaunchConfig(format!("{units} units along {axis} exceed the block limit"));
    let blocks = (units / u64::from(tpb)).checked_add(1).ok_or_else(too_many)?;
    u32::try_from(blocks).map_err(|_| too_many())
}

/// `(blocks_per_grid, threads_per_block)` covering `x` units.
pub fn blocks_per_grid_1d(x: u64, tpb: u32) -> Result<(u32, u32)> {
    Ok((blocks_for(x, tpb, "x")?, tpb))
}

/// Per-axis `((bpg_x, bpg_y), (tpb_x, tpb_y))` covering an `x * y` grid.
pub fn blocks_per_grid_2d(x: u64, y: u64, tpbx: u32, tpby: u32) -> Result<((u32, u32), (u32, u32))> {
    Ok(((blocks_for(x, tpbx, "x")?, blocks_for(y, tpby, "y")?), (tpbx, tpby)))
}

/// Builders for [`LaunchConfig`] from unit counts.
pub struct LaunchGeometry;

impl LaunchGeometry {
    pub fn for_units_1d(x: u64, tpb: u32) -> Result<LaunchConfig> {
        let (bpg, tpb) = blocks_per_grid_1d(x, tpb)?;
        Ok(LaunchConfig::one_d(bpg, tpb))
    }

    pub fn for_units_2d(x: u64, y: u64, tpb: (u32, u32)) -> Result<LaunchConfig> {
        let (bpg, tpb) = blocks_per_grid_2d(x, y, tpb.0, tpb.1)?;
        Ok(LaunchConfig::two_d(bpg, tpb))
    }
}
