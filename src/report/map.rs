//! Plain text allocation map

use crate::error::Result;
use crate::extent::{Extent, ExtentState};
use crate::state::VolumeState;
use std::io::Write;

/// Write every physical volume's extents in physical order
///
/// Each volume's listing stops after `line_limit` extents unless `verbose`
/// is set, followed by a count of the extents left out.
pub fn write_allocation_map<W: Write>(
    state: &VolumeState,
    out: &mut W,
    line_limit: usize,
    verbose: bool,
) -> Result<()> {
    writeln!(out, "\nAllocation Map:")?;

    for (pv_index, pv) in state.physical_volumes().iter().enumerate() {
        let pv_index = pv_index as u32;
        writeln!(out, "\nPhysical Volume {} Extents:", pv_index)?;

        for (printed, extent) in state.physical_extents(pv_index).enumerate() {
            if printed >= line_limit && !verbose {
                writeln!(
                    out,
                    "  ... ({} more extents, enable verbose output for the full list)",
                    pv.extent_count() - printed
                )?;
                break;
            }
            write_extent_line(out, extent)?;
        }
    }

    Ok(())
}

fn write_extent_line<W: Write>(out: &mut W, extent: &Extent) -> Result<()> {
    write!(
        out,
        "  [{:<9}] blocks {}-{} ({} blocks)",
        extent.state,
        extent.physical_block_start,
        extent.physical_last(),
        extent.physical_block_count
    )?;

    match extent.state {
        ExtentState::Allocated => write!(
            out,
            " -> LV{}:{}-{}",
            extent.logical_volume_index,
            extent.logical_block_start,
            extent.logical_last()
        )?,
        ExtentState::Reserved => write!(
            out,
            " - {}",
            extent.reserved_description.unwrap_or("Reserved")
        )?,
        _ => {}
    }

    writeln!(out)?;
    Ok(())
}
