//! Extent records tracked by the volume state
//!
//! An extent is a contiguous run of physical blocks with one disposition.
//! Allocated extents additionally map onto a logical block run of the same
//! length.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Block type recorded for extents derived from segment descriptors
pub const BLOCK_TYPE_SEGMENT_MAPPING: u16 = 0x0305;

/// Stable handle of an extent inside the volume state arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtentId(pub(crate) usize);

impl ExtentId {
    /// Position of the extent in creation order
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Disposition of an extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtentState {
    #[default]
    Unknown,
    Free,
    Allocated,
    Reserved,
}

impl ExtentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtentState::Unknown => "UNKNOWN",
            ExtentState::Free => "FREE",
            ExtentState::Allocated => "ALLOCATED",
            ExtentState::Reserved => "RESERVED",
        }
    }
}

impl fmt::Display for ExtentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // pad() so width/alignment flags work in the allocation map
        f.pad(self.as_str())
    }
}

/// Where an extent came from in the volume metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Provenance {
    /// Metadata transaction that produced the extent
    pub transaction_id: u64,
    /// Index of the metadata block holding the record
    pub metadata_block_index: u32,
    /// Metadata block type tag
    pub block_type: u16,
}

impl Provenance {
    pub fn new(transaction_id: u64, metadata_block_index: u32, block_type: u16) -> Self {
        Provenance {
            transaction_id,
            metadata_block_index,
            block_type,
        }
    }
}

/// A contiguous run of physical blocks with a single disposition
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Extent {
    pub physical_volume_index: u32,
    pub physical_block_start: u64,
    pub physical_block_count: u64,

    /// Only meaningful for allocated extents
    pub logical_volume_index: u32,
    /// Only meaningful for allocated extents; the logical run length equals
    /// `physical_block_count`
    pub logical_block_start: u64,

    pub state: ExtentState,
    pub provenance: Provenance,

    /// Set for reserved extents
    pub reserved_description: Option<&'static str>,
}

impl Extent {
    /// Create a zeroed extent in the `Unknown` state
    pub fn new() -> Self {
        Self::default()
    }

    /// First physical block past the end of the extent
    pub fn physical_end(&self) -> u64 {
        self.physical_block_start
            .saturating_add(self.physical_block_count)
    }

    /// First logical block past the end of the extent
    pub fn logical_end(&self) -> u64 {
        self.logical_block_start
            .saturating_add(self.physical_block_count)
    }

    /// Check if the physical range contains a block
    pub fn contains_physical(&self, block: u64) -> bool {
        block >= self.physical_block_start && block < self.physical_end()
    }

    /// Check if the logical range contains a block
    pub fn contains_logical(&self, block: u64) -> bool {
        self.state == ExtentState::Allocated
            && block >= self.logical_block_start
            && block < self.logical_end()
    }

    /// Half-open intersection test against `[start, start + count)`
    pub fn overlaps_physical(&self, start: u64, count: u64) -> bool {
        start < self.physical_end() && self.physical_block_start < start.saturating_add(count)
    }

    /// Half-open intersection test against a logical range
    pub fn overlaps_logical(&self, start: u64, count: u64) -> bool {
        start < self.logical_end() && self.logical_block_start < start.saturating_add(count)
    }

    /// Translate a physical block inside this extent to its logical block
    ///
    /// Returns `None` unless the extent is allocated and contains the block,
    /// or when the logical address does not fit in a `u64`.
    pub fn logical_block_for(&self, physical_block: u64) -> Option<u64> {
        if self.state != ExtentState::Allocated || !self.contains_physical(physical_block) {
            return None;
        }
        self.logical_block_start
            .checked_add(physical_block - self.physical_block_start)
    }

    /// Translate a logical block inside this extent to its physical block
    ///
    /// Returns `None` unless the extent is allocated and contains the block,
    /// or when the physical address does not fit in a `u64`.
    pub fn physical_block_for(&self, logical_block: u64) -> Option<u64> {
        if !self.contains_logical(logical_block) {
            return None;
        }
        self.physical_block_start
            .checked_add(logical_block - self.logical_block_start)
    }

    /// Last physical block of the extent (inclusive), as printed in reports
    pub fn physical_last(&self) -> u64 {
        self.physical_end().saturating_sub(1)
    }

    /// Last logical block of the extent (inclusive)
    pub fn logical_last(&self) -> u64 {
        self.logical_end().saturating_sub(1)
    }
}
