//! Plain text allocation summary

use super::{format_uuid, percent};
use crate::error::Result;
use crate::state::VolumeState;
use std::io::Write;

/// Write the allocation summary, refreshing statistics first
pub fn write_summary<W: Write>(state: &mut VolumeState, out: &mut W) -> Result<()> {
    state.calculate_statistics();

    writeln!(out, "\nAllocation Summary:")?;

    for (pv_index, pv) in state.physical_volumes().iter().enumerate() {
        let total = pv.size_in_blocks;

        writeln!(out, "\nPhysical Volume {}:", pv_index)?;
        writeln!(out, "  Identifier:       {}", format_uuid(&pv.uuid))?;
        writeln!(out, "  Total blocks:     {}", total)?;
        writeln!(
            out,
            "  Reserved:         {} ({:.2}%)",
            pv.reserved_blocks,
            percent(pv.reserved_blocks, total)
        )?;
        writeln!(
            out,
            "  Allocated:        {} ({:.2}%)",
            pv.allocated_blocks,
            percent(pv.allocated_blocks, total)
        )?;
        writeln!(
            out,
            "  Free:             {} ({:.2}%)",
            pv.free_blocks,
            percent(pv.free_blocks, total)
        )?;
    }

    for (lv_index, lv) in state.logical_volumes().iter().enumerate() {
        let total = lv.size_in_blocks;

        writeln!(out, "\nLogical Volume {}:", lv_index)?;
        writeln!(out, "  Identifier:       {}", format_uuid(&lv.uuid))?;
        writeln!(out, "  Total blocks:     {}", total)?;
        writeln!(
            out,
            "  Mapped:           {} ({:.2}%)",
            lv.mapped_blocks,
            percent(lv.mapped_blocks, total)
        )?;
        writeln!(out, "  Unmapped:         {}", lv.unmapped_blocks)?;
    }

    writeln!(out)?;
    writeln!(out, "Total extents tracked: {}", state.total_extents())?;
    writeln!(out, "Errors: {}", state.error_count())?;
    for finding in state.findings() {
        writeln!(out, "  {}: {}", finding.volume_label(), finding)?;
    }
    writeln!(out, "Warnings: {}", state.warning_count())?;
    for warning in state.warnings() {
        writeln!(out, "  {}", warning)?;
    }

    Ok(())
}
