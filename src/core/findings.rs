//! Consistency findings recorded while validating extents
//!
//! Findings never abort processing. They are collected on the volume state
//! and surfaced by the reporters.

use crate::extent::{Extent, ExtentState, Provenance};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of inconsistency detected between two extents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    PhysicalOverlap,
    LogicalOverlap,
    AllocateAfterAlloc,
    ReservedViolation,
    FreeAfterFree,
}

impl FindingKind {
    pub fn description(&self) -> &'static str {
        match self {
            FindingKind::PhysicalOverlap => "Physical overlap",
            FindingKind::LogicalOverlap => "Logical overlap",
            FindingKind::AllocateAfterAlloc => "Block already allocated",
            FindingKind::ReservedViolation => "Allocation overlaps reserved area",
            FindingKind::FreeAfterFree => "Block freed when already free",
        }
    }

    /// Classify a physical collision between an existing extent and a new event
    pub fn for_physical_collision(existing: ExtentState, incoming: ExtentState) -> Self {
        match (existing, incoming) {
            (ExtentState::Reserved, _) => FindingKind::ReservedViolation,
            (ExtentState::Allocated, ExtentState::Allocated) => FindingKind::AllocateAfterAlloc,
            (ExtentState::Free, ExtentState::Free) => FindingKind::FreeAfterFree,
            _ => FindingKind::PhysicalOverlap,
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A recorded inconsistency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,

    /// Volume the conflicting range lives on. Physical volume index for
    /// physical findings, logical volume index for `LogicalOverlap`.
    pub volume_index: u32,
    pub block_start: u64,
    pub block_count: u64,

    /// Provenance of the extent that was already tracked
    pub first: Provenance,
    /// Provenance of the event that collided with it
    pub second: Provenance,

    pub description: String,
}

impl Finding {
    /// Build a finding for a new event colliding with an existing extent
    pub(crate) fn collision(
        kind: FindingKind,
        volume_index: u32,
        block_start: u64,
        block_count: u64,
        existing: &Extent,
        second: Provenance,
    ) -> Self {
        let (existing_start, existing_last) = match kind {
            FindingKind::LogicalOverlap => (existing.logical_block_start, existing.logical_last()),
            _ => (existing.physical_block_start, existing.physical_last()),
        };
        let description = format!(
            "{}: blocks {}-{} collide with {} extent {}-{} (transaction {}, 0x{:04x})",
            kind,
            block_start,
            block_start.saturating_add(block_count).saturating_sub(1),
            existing.state,
            existing_start,
            existing_last,
            existing.provenance.transaction_id,
            existing.provenance.block_type,
        );

        Finding {
            kind,
            volume_index,
            block_start,
            block_count,
            first: existing.provenance,
            second,
            description,
        }
    }

    /// `PV<n>` or `LV<n>`, depending on the address space of the range
    pub fn volume_label(&self) -> String {
        match self.kind {
            FindingKind::LogicalOverlap => format!("LV{}", self.volume_index),
            _ => format!("PV{}", self.volume_index),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_classification() {
        use ExtentState::*;

        assert_eq!(
            FindingKind::for_physical_collision(Reserved, Allocated),
            FindingKind::ReservedViolation
        );
        assert_eq!(
            FindingKind::for_physical_collision(Reserved, Free),
            FindingKind::ReservedViolation
        );
        assert_eq!(
            FindingKind::for_physical_collision(Allocated, Allocated),
            FindingKind::AllocateAfterAlloc
        );
        assert_eq!(
            FindingKind::for_physical_collision(Free, Free),
            FindingKind::FreeAfterFree
        );
        assert_eq!(
            FindingKind::for_physical_collision(Free, Allocated),
            FindingKind::PhysicalOverlap
        );
    }

    #[test]
    fn test_collision_description() {
        let existing = Extent {
            physical_block_start: 0,
            physical_block_count: 1,
            state: ExtentState::Reserved,
            reserved_description: Some("Volume header"),
            ..Extent::new()
        };

        let finding = Finding::collision(
            FindingKind::ReservedViolation,
            0,
            0,
            4,
            &existing,
            Provenance::new(7, 0, 0x0305),
        );

        assert_eq!(finding.first, Provenance::default());
        assert_eq!(finding.second.transaction_id, 7);
        assert!(finding
            .description
            .starts_with("Allocation overlaps reserved area: blocks 0-3"));
        assert_eq!(finding.volume_label(), "PV0");
    }
}
