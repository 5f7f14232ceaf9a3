//! Structured (JSON) report
//!
//! Field names and nesting form the external contract:
//!
//! ```json
//! {
//!   "volume": { "physical_volumes": [...], "logical_volumes": [...] },
//!   "processing": { "order": "ascending", "transactions_processed": 0,
//!                   "metadata_blocks_processed": 0 },
//!   "allocation": { "physical": { "0": {...} }, "logical": { "0": {...} } },
//!   "errors": [],
//!   "warnings": []
//! }
//! ```

use super::format_uuid;
use crate::config::ProcessingOrder;
use crate::error::Result;
use crate::findings::Finding;
use crate::state::VolumeState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredReport {
    pub volume: VolumeSection,
    pub processing: ProcessingSection,
    pub allocation: AllocationSection,
    pub errors: Vec<Finding>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSection {
    pub physical_volumes: Vec<PhysicalVolumeEntry>,
    pub logical_volumes: Vec<LogicalVolumeEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalVolumeEntry {
    pub index: u32,
    pub uuid: String,
    pub size_blocks: u64,
    pub block_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalVolumeEntry {
    pub index: u32,
    pub uuid: String,
    pub size_blocks: u64,
}

/// Processing parameters echoed into the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessingSection {
    pub order: ProcessingOrder,
    pub transactions_processed: u32,
    pub metadata_blocks_processed: u32,
}

/// Block-count breakdowns keyed by volume index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSection {
    pub physical: BTreeMap<u32, PhysicalAllocation>,
    pub logical: BTreeMap<u32, LogicalAllocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalAllocation {
    pub reserved_blocks: u64,
    pub allocated_blocks: u64,
    pub free_blocks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalAllocation {
    pub mapped_blocks: u64,
    pub unmapped_blocks: u64,
}

impl StructuredReport {
    /// Build the report, refreshing statistics first
    pub fn build(state: &mut VolumeState, processing: ProcessingSection) -> Self {
        state.calculate_statistics();
        let block_size = state.block_size();

        let physical_volumes = state
            .physical_volumes()
            .iter()
            .enumerate()
            .map(|(index, pv)| PhysicalVolumeEntry {
                index: index as u32,
                uuid: format_uuid(&pv.uuid),
                size_blocks: pv.size_in_blocks,
                block_size,
            })
            .collect();

        let logical_volumes = state
            .logical_volumes()
            .iter()
            .enumerate()
            .map(|(index, lv)| LogicalVolumeEntry {
                index: index as u32,
                uuid: format_uuid(&lv.uuid),
                size_blocks: lv.size_in_blocks,
            })
            .collect();

        let physical = state
            .physical_volumes()
            .iter()
            .enumerate()
            .map(|(index, pv)| {
                (
                    index as u32,
                    PhysicalAllocation {
                        reserved_blocks: pv.reserved_blocks,
                        allocated_blocks: pv.allocated_blocks,
                        free_blocks: pv.free_blocks,
                    },
                )
            })
            .collect();

        let logical = state
            .logical_volumes()
            .iter()
            .enumerate()
            .map(|(index, lv)| {
                (
                    index as u32,
                    LogicalAllocation {
                        mapped_blocks: lv.mapped_blocks,
                        unmapped_blocks: lv.unmapped_blocks,
                    },
                )
            })
            .collect();

        StructuredReport {
            volume: VolumeSection {
                physical_volumes,
                logical_volumes,
            },
            processing,
            allocation: AllocationSection { physical, logical },
            errors: state.findings().to_vec(),
            warnings: state.warnings().to_vec(),
        }
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty-printed JSON followed by a newline
    pub fn write_json<W: Write>(&self, out: &mut W) -> Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)?;
        Ok(())
    }
}
