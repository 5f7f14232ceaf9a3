//! Point lookups of a single block
//!
//! A lookup resolves one address to the extent that owns it and derives the
//! matching address in the other address space when the block is allocated.

use crate::error::Result;
use crate::extent::{Extent, ExtentState};
use crate::state::VolumeState;
use crate::translate::{sector_to_block, SECTOR_SIZE};
use serde::Serialize;
use std::io::Write;

/// Address a lookup was asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LookupQuery {
    /// 512-byte sector on physical volume 0
    Sector { sector: u64 },
    Physical { pv_index: u32, block: u64 },
    Logical { lv_index: u32, block: u64 },
}

/// Result of a point lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockLookup {
    pub query: LookupQuery,

    /// Physical location, when known
    pub physical_volume_index: Option<u32>,
    pub physical_block: Option<u64>,

    /// Logical location, when known
    pub logical_volume_index: Option<u32>,
    pub logical_block: Option<u64>,

    /// Owning extent; `None` when no tracked extent covers the block
    pub extent: Option<Extent>,
}

impl BlockLookup {
    /// Look up a Linux 512-byte sector on physical volume 0
    pub fn sector(state: &VolumeState, sector: u64) -> Self {
        let block = sector_to_block(sector, state.block_size());
        let mut lookup = Self::physical(state, 0, block);
        lookup.query = LookupQuery::Sector { sector };
        lookup
    }

    /// Look up a physical block
    pub fn physical(state: &VolumeState, pv_index: u32, block: u64) -> Self {
        let extent = state.find_physical_extent(pv_index, block).cloned();
        let logical_block = extent.as_ref().and_then(|e| e.logical_block_for(block));
        let logical_volume_index = logical_block
            .and(extent.as_ref())
            .map(|e| e.logical_volume_index);

        BlockLookup {
            query: LookupQuery::Physical { pv_index, block },
            physical_volume_index: Some(pv_index),
            physical_block: Some(block),
            logical_volume_index,
            logical_block,
            extent,
        }
    }

    /// Look up a logical block
    pub fn logical(state: &VolumeState, lv_index: u32, block: u64) -> Self {
        let extent = state.find_logical_extent(lv_index, block).cloned();
        let physical = extent.as_ref().and_then(|e| {
            e.physical_block_for(block)
                .map(|physical_block| (e.physical_volume_index, physical_block))
        });

        BlockLookup {
            query: LookupQuery::Logical { lv_index, block },
            physical_volume_index: physical.map(|(pv, _)| pv),
            physical_block: physical.map(|(_, b)| b),
            logical_volume_index: Some(lv_index),
            logical_block: Some(block),
            extent,
        }
    }

    /// State of the owning extent, `Unknown` when untracked
    pub fn state(&self) -> ExtentState {
        self.extent
            .as_ref()
            .map(|e| e.state)
            .unwrap_or(ExtentState::Unknown)
    }

    /// Render the lookup as text
    pub fn write_text<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "\nBlock Information:")?;

        match self.query {
            LookupQuery::Sector { sector } => {
                let byte_offset = sector.wrapping_mul(SECTOR_SIZE);
                writeln!(out, "  Linux sector:       {} (512-byte sectors)", sector)?;
                writeln!(
                    out,
                    "  Linux byte offset:  {} (0x{:x})",
                    byte_offset, byte_offset
                )?;
                self.write_physical_location(out)?;
            }
            LookupQuery::Physical { .. } => self.write_physical_location(out)?,
            LookupQuery::Logical { lv_index, block } => {
                writeln!(out, "\n  FVDE logical:")?;
                writeln!(out, "    Volume index:     {}", lv_index)?;
                writeln!(out, "    Block number:     {}", block)?;
                self.write_physical_location(out)?;
            }
        }

        let Some(extent) = &self.extent else {
            writeln!(
                out,
                "\n  State:              UNKNOWN (not in any tracked extent)"
            )?;
            writeln!(out)?;
            return Ok(());
        };

        writeln!(out, "\n  State:              {}", extent.state)?;
        match extent.state {
            ExtentState::Reserved => writeln!(
                out,
                "  Reserved for:       {}",
                extent.reserved_description.unwrap_or("Unknown")
            )?,
            ExtentState::Allocated => {
                writeln!(
                    out,
                    "  Allocated by:       Transaction {}, 0x{:04x}",
                    extent.provenance.transaction_id, extent.provenance.block_type
                )?;
                if !matches!(self.query, LookupQuery::Logical { .. }) {
                    if let (Some(lv), Some(block)) = (self.logical_volume_index, self.logical_block)
                    {
                        writeln!(out, "\n  FVDE logical:")?;
                        writeln!(out, "    Volume index:     {}", lv)?;
                        writeln!(out, "    Block number:     {}", block)?;
                    }
                }
            }
            ExtentState::Free => writeln!(
                out,
                "  Freed by:           Transaction {}, 0x{:04x}",
                extent.provenance.transaction_id, extent.provenance.block_type
            )?,
            ExtentState::Unknown => {}
        }

        writeln!(out, "\n  Extent context:")?;
        writeln!(
            out,
            "    Physical extent:  PV{} blocks {}-{} ({} blocks)",
            extent.physical_volume_index,
            extent.physical_block_start,
            extent.physical_last(),
            extent.physical_block_count
        )?;
        if extent.state == ExtentState::Allocated {
            writeln!(
                out,
                "    Logical extent:   LV{} blocks {}-{} ({} blocks)",
                extent.logical_volume_index,
                extent.logical_block_start,
                extent.logical_last(),
                extent.physical_block_count
            )?;
        }
        writeln!(out)?;

        Ok(())
    }

    fn write_physical_location<W: Write>(&self, out: &mut W) -> Result<()> {
        if let (Some(pv), Some(block)) = (self.physical_volume_index, self.physical_block) {
            writeln!(out, "\n  FVDE physical:")?;
            writeln!(out, "    Volume index:     {}", pv)?;
            writeln!(out, "    Block number:     {}", block)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extent::Provenance;

    fn sample_state() -> VolumeState {
        let mut state = VolumeState::default();
        state.add_physical_volume(&[0u8; 16], 1_000_000).unwrap();
        state.add_logical_volume(&[0x11u8; 16], 500_000).unwrap();
        state.mark_reserved(0, 0, 1, "Volume header").unwrap();
        state
            .mark_allocated(0, 1, 500_000, 0, 0, Provenance::new(12, 3, 0x0305))
            .unwrap();
        state
            .mark_free(0, 600_000, 10, Provenance::new(14, 4, 0x0105))
            .unwrap();
        state
    }

    fn render(lookup: &BlockLookup) -> String {
        let mut out = Vec::new();
        lookup.write_text(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_sector_lookup_allocated() {
        let state = sample_state();
        let lookup = BlockLookup::sector(&state, 250_000 * 8);

        assert_eq!(lookup.physical_block, Some(250_000));
        assert_eq!(lookup.state(), ExtentState::Allocated);
        assert_eq!(lookup.logical_volume_index, Some(0));
        assert_eq!(lookup.logical_block, Some(249_999));

        let text = render(&lookup);
        assert!(text.contains("  Linux sector:       2000000 (512-byte sectors)"));
        assert!(text.contains("  Linux byte offset:  1024000000 (0x3d090000)"));
        assert!(text.contains("  State:              ALLOCATED"));
        assert!(text.contains("  Allocated by:       Transaction 12, 0x0305"));
        assert!(text.contains("    Block number:     249999"));
        assert!(text.contains("    Physical extent:  PV0 blocks 1-500000 (500000 blocks)"));
        assert!(text.contains("    Logical extent:   LV0 blocks 0-499999 (500000 blocks)"));
    }

    #[test]
    fn test_sector_lookup_reserved() {
        let state = sample_state();
        let lookup = BlockLookup::sector(&state, 3);

        assert_eq!(lookup.physical_block, Some(0));
        assert_eq!(lookup.state(), ExtentState::Reserved);
        assert!(lookup.logical_block.is_none());

        let text = render(&lookup);
        assert!(text.contains("  Reserved for:       Volume header"));
        assert!(text.contains("    Physical extent:  PV0 blocks 0-0 (1 blocks)"));
        assert!(!text.contains("Logical extent"));
    }

    #[test]
    fn test_physical_lookup_free() {
        let state = sample_state();
        let lookup = BlockLookup::physical(&state, 0, 600_005);

        assert_eq!(lookup.state(), ExtentState::Free);
        let text = render(&lookup);
        assert!(text.contains("  Freed by:           Transaction 14, 0x0105"));
    }

    #[test]
    fn test_lookup_unknown() {
        let state = sample_state();
        let lookup = BlockLookup::physical(&state, 0, 700_000);

        assert_eq!(lookup.state(), ExtentState::Unknown);
        assert!(lookup.extent.is_none());
        let text = render(&lookup);
        assert!(text.contains("UNKNOWN (not in any tracked extent)"));
        assert!(!text.contains("Extent context"));
    }

    #[test]
    fn test_logical_lookup() {
        let state = sample_state();
        let lookup = BlockLookup::logical(&state, 0, 249_999);

        assert_eq!(lookup.physical_volume_index, Some(0));
        assert_eq!(lookup.physical_block, Some(250_000));
        assert_eq!(lookup.state(), ExtentState::Allocated);

        let text = render(&lookup);
        assert!(text.contains("  FVDE logical:"));
        assert!(text.contains("  FVDE physical:"));
        assert_eq!(text.matches("  FVDE logical:").count(), 1);

        let missing = BlockLookup::logical(&state, 0, 500_000);
        assert!(missing.physical_block.is_none());
        assert_eq!(missing.state(), ExtentState::Unknown);
    }

    #[test]
    fn test_lookup_translation_overflow() {
        let mut state = VolumeState::default();
        state.add_physical_volume(&[0u8; 16], 1000).unwrap();
        state.add_physical_volume(&[0x22u8; 16], u64::MAX).unwrap();
        state.add_logical_volume(&[0x11u8; 16], 1000).unwrap();
        state
            .mark_allocated(0, 0, 100, 0, u64::MAX - 10, Provenance::default())
            .unwrap();
        state
            .mark_allocated(1, u64::MAX - 10, 100, 0, 0, Provenance::default())
            .unwrap();

        let lookup = BlockLookup::physical(&state, 0, 5);
        assert_eq!(lookup.logical_block, Some(u64::MAX - 5));

        let lookup = BlockLookup::physical(&state, 0, 50);
        assert_eq!(lookup.state(), ExtentState::Allocated);
        assert!(lookup.logical_volume_index.is_none());
        assert!(lookup.logical_block.is_none());
        let text = render(&lookup);
        assert!(text.contains("  State:              ALLOCATED"));
        assert_eq!(text.matches("  FVDE logical:").count(), 0);

        let lookup = BlockLookup::logical(&state, 0, 50);
        assert_eq!(lookup.state(), ExtentState::Allocated);
        assert!(lookup.physical_volume_index.is_none());
        assert!(lookup.physical_block.is_none());
        let text = render(&lookup);
        assert!(!text.contains("  FVDE physical:"));
    }
}
