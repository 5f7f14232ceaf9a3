//! Volume state: the authoritative record of which blocks belong to which extent
//!
//! Extents live in a single arena owned by [`VolumeState`] and are never
//! removed. Each physical volume keeps an ordered index of its extents by
//! physical start block, and each logical volume keeps an ordered index of
//! its allocated extents by logical start block. Both indices point at the
//! same arena entries through [`ExtentId`] handles.
//!
//! Marking operations record facts and never reject overlapping ranges.
//! Overlap detection is a separate query ([`VolumeState::check_overlap`]),
//! and the `checked_mark_*` variants turn positive results into recorded
//! findings before marking.

use crate::config::{CheckConfig, DEFAULT_BLOCK_SIZE, DEFAULT_MAX_VOLUMES};
use crate::error::{CheckError, Result};
use crate::extent::{Extent, ExtentId, ExtentState, Provenance};
use crate::findings::{Finding, FindingKind};
use std::collections::btree_map;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Length in bytes of a volume identifier
pub const UUID_SIZE: usize = 16;

/// Ordered index of extents sharing one address space
///
/// Keys are `(start block, creation sequence)`, so extents starting at the
/// same block stay in insertion order.
#[derive(Debug, Clone, Default)]
struct ExtentIndex {
    entries: BTreeMap<(u64, usize), ExtentId>,
    /// Longest run inserted so far; bounds how far back a containing
    /// extent can start
    longest: u64,
}

impl ExtentIndex {
    fn insert(&mut self, start: u64, length: u64, id: ExtentId) {
        self.entries.insert((start, id.0), id);
        self.longest = self.longest.max(length);
    }

    /// Entries that could intersect a range starting at `start` and ending
    /// before `end` (exclusive upper bound on the start block)
    fn candidates(&self, start: u64, end: u64) -> btree_map::Range<'_, (u64, usize), ExtentId> {
        let lower = start.saturating_sub(self.longest);
        self.entries.range((lower, 0)..(end, 0))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Per physical volume aggregate
#[derive(Debug, Clone)]
pub struct PhysicalVolumeInfo {
    pub uuid: [u8; UUID_SIZE],
    pub size_in_blocks: u64,

    /// Statistics, refreshed by [`VolumeState::calculate_statistics`]
    pub reserved_blocks: u64,
    pub allocated_blocks: u64,
    pub free_blocks: u64,

    index: ExtentIndex,
}

impl PhysicalVolumeInfo {
    /// Number of extents on this volume
    pub fn extent_count(&self) -> usize {
        self.index.len()
    }
}

/// Per logical volume aggregate
#[derive(Debug, Clone)]
pub struct LogicalVolumeInfo {
    pub uuid: [u8; UUID_SIZE],
    pub size_in_blocks: u64,

    /// Statistics, refreshed by [`VolumeState::calculate_statistics`]
    pub mapped_blocks: u64,
    pub unmapped_blocks: u64,

    index: ExtentIndex,
}

impl LogicalVolumeInfo {
    /// Number of allocated extents mapped into this volume
    pub fn extent_count(&self) -> usize {
        self.index.len()
    }
}

/// Iterator over extents in index order
pub struct Extents<'a> {
    arena: &'a [Extent],
    ids: Option<btree_map::Values<'a, (u64, usize), ExtentId>>,
}

impl<'a> Iterator for Extents<'a> {
    type Item = &'a Extent;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.as_mut()?.next()?;
        self.arena.get(id.0)
    }
}

/// Authoritative store of all extents across all volumes
#[derive(Debug, Clone)]
pub struct VolumeState {
    extents: Vec<Extent>,

    physical_volumes: Vec<PhysicalVolumeInfo>,
    logical_volumes: Vec<LogicalVolumeInfo>,
    max_physical_volumes: usize,
    max_logical_volumes: usize,

    /// Bytes per block
    block_size: u32,

    /// Processing cursor maintained by callers
    pub current_transaction_id: u64,
    pub current_metadata_block_index: u32,

    findings: Vec<Finding>,
    warnings: Vec<String>,
    error_count: u32,
    warning_count: u32,
}

impl Default for VolumeState {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

impl VolumeState {
    /// Create an empty state with the default volume capacity
    pub fn new(block_size: u32) -> Self {
        Self::with_capacity(block_size, DEFAULT_MAX_VOLUMES, DEFAULT_MAX_VOLUMES)
    }

    /// Create an empty state with explicit volume capacities
    pub fn with_capacity(
        block_size: u32,
        max_physical_volumes: usize,
        max_logical_volumes: usize,
    ) -> Self {
        VolumeState {
            extents: Vec::new(),
            physical_volumes: Vec::new(),
            logical_volumes: Vec::new(),
            max_physical_volumes,
            max_logical_volumes,
            block_size,
            current_transaction_id: 0,
            current_metadata_block_index: 0,
            findings: Vec::new(),
            warnings: Vec::new(),
            error_count: 0,
            warning_count: 0,
        }
    }

    pub fn from_config(config: &CheckConfig) -> Self {
        Self::with_capacity(
            config.block_size,
            config.max_physical_volumes,
            config.max_logical_volumes,
        )
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn num_physical_volumes(&self) -> u32 {
        self.physical_volumes.len() as u32
    }

    pub fn num_logical_volumes(&self) -> u32 {
        self.logical_volumes.len() as u32
    }

    pub fn physical_volumes(&self) -> &[PhysicalVolumeInfo] {
        &self.physical_volumes
    }

    pub fn logical_volumes(&self) -> &[LogicalVolumeInfo] {
        &self.logical_volumes
    }

    pub fn physical_volume(&self, pv_index: u32) -> Option<&PhysicalVolumeInfo> {
        self.physical_volumes.get(pv_index as usize)
    }

    pub fn logical_volume(&self, lv_index: u32) -> Option<&LogicalVolumeInfo> {
        self.logical_volumes.get(lv_index as usize)
    }

    /// Total number of extents ever created
    pub fn total_extents(&self) -> u64 {
        self.extents.len() as u64
    }

    pub fn extent(&self, id: ExtentId) -> Option<&Extent> {
        self.extents.get(id.0)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn warning_count(&self) -> u32 {
        self.warning_count
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Extents of a physical volume ordered by physical start block
    pub fn physical_extents(&self, pv_index: u32) -> Extents<'_> {
        Extents {
            arena: &self.extents,
            ids: self
                .physical_volume(pv_index)
                .map(|pv| pv.index.entries.values()),
        }
    }

    /// Allocated extents of a logical volume ordered by logical start block
    pub fn logical_extents(&self, lv_index: u32) -> Extents<'_> {
        Extents {
            arena: &self.extents,
            ids: self
                .logical_volume(lv_index)
                .map(|lv| lv.index.entries.values()),
        }
    }

    /// Register a physical volume and return its index
    ///
    /// The identifier must be exactly 16 bytes and is copied.
    pub fn add_physical_volume(&mut self, uuid: &[u8], size_in_blocks: u64) -> Result<u32> {
        let uuid = copy_uuid(uuid)?;

        if self.physical_volumes.len() >= self.max_physical_volumes {
            return Err(CheckError::PhysicalVolumeCapacity {
                capacity: self.max_physical_volumes,
            });
        }

        let pv_index = self.physical_volumes.len() as u32;
        self.physical_volumes.push(PhysicalVolumeInfo {
            uuid,
            size_in_blocks,
            reserved_blocks: 0,
            allocated_blocks: 0,
            free_blocks: 0,
            index: ExtentIndex::default(),
        });

        debug!(
            "Added physical volume {} ({} blocks)",
            pv_index, size_in_blocks
        );
        Ok(pv_index)
    }

    /// Register a logical volume and return its index
    pub fn add_logical_volume(&mut self, uuid: &[u8], size_in_blocks: u64) -> Result<u32> {
        let uuid = copy_uuid(uuid)?;

        if self.logical_volumes.len() >= self.max_logical_volumes {
            return Err(CheckError::LogicalVolumeCapacity {
                capacity: self.max_logical_volumes,
            });
        }

        let lv_index = self.logical_volumes.len() as u32;
        self.logical_volumes.push(LogicalVolumeInfo {
            uuid,
            size_in_blocks,
            mapped_blocks: 0,
            unmapped_blocks: 0,
            index: ExtentIndex::default(),
        });

        debug!("Added logical volume {} ({} blocks)", lv_index, size_in_blocks);
        Ok(lv_index)
    }

    /// Record a reserved physical range (format metadata)
    pub fn mark_reserved(
        &mut self,
        pv_index: u32,
        block_start: u64,
        block_count: u64,
        description: &'static str,
    ) -> Result<ExtentId> {
        self.ensure_physical(pv_index)?;

        let extent = Extent {
            physical_volume_index: pv_index,
            physical_block_start: block_start,
            physical_block_count: block_count,
            state: ExtentState::Reserved,
            reserved_description: Some(description),
            ..Extent::new()
        };

        debug!(
            "PV{} blocks {}+{} reserved: {}",
            pv_index, block_start, block_count, description
        );
        Ok(self.insert(extent))
    }

    /// Record a freed physical range
    pub fn mark_free(
        &mut self,
        pv_index: u32,
        block_start: u64,
        block_count: u64,
        provenance: Provenance,
    ) -> Result<ExtentId> {
        self.ensure_physical(pv_index)?;

        let extent = Extent {
            physical_volume_index: pv_index,
            physical_block_start: block_start,
            physical_block_count: block_count,
            state: ExtentState::Free,
            provenance,
            ..Extent::new()
        };

        debug!(
            "PV{} blocks {}+{} free (transaction {})",
            pv_index, block_start, block_count, provenance.transaction_id
        );
        Ok(self.insert(extent))
    }

    /// Record a physical range mapped onto a logical range of equal length
    pub fn mark_allocated(
        &mut self,
        pv_index: u32,
        phys_block_start: u64,
        block_count: u64,
        lv_index: u32,
        logical_block_start: u64,
        provenance: Provenance,
    ) -> Result<ExtentId> {
        self.ensure_physical(pv_index)?;
        self.ensure_logical(lv_index)?;

        let extent = Extent {
            physical_volume_index: pv_index,
            physical_block_start: phys_block_start,
            physical_block_count: block_count,
            logical_volume_index: lv_index,
            logical_block_start,
            state: ExtentState::Allocated,
            provenance,
            reserved_description: None,
        };

        debug!(
            "PV{} blocks {}+{} allocated -> LV{}:{} (transaction {})",
            pv_index,
            phys_block_start,
            block_count,
            lv_index,
            logical_block_start,
            provenance.transaction_id
        );
        Ok(self.insert(extent))
    }

    /// Like [`mark_reserved`](Self::mark_reserved), recording a finding first
    /// if the range collides with a tracked extent
    pub fn checked_mark_reserved(
        &mut self,
        pv_index: u32,
        block_start: u64,
        block_count: u64,
        description: &'static str,
    ) -> Result<ExtentId> {
        self.ensure_physical(pv_index)?;
        self.probe_physical(
            pv_index,
            block_start,
            block_count,
            ExtentState::Reserved,
            Provenance::default(),
        );
        self.mark_reserved(pv_index, block_start, block_count, description)
    }

    /// Like [`mark_free`](Self::mark_free), recording a finding first if the
    /// range collides with a tracked extent
    pub fn checked_mark_free(
        &mut self,
        pv_index: u32,
        block_start: u64,
        block_count: u64,
        provenance: Provenance,
    ) -> Result<ExtentId> {
        self.ensure_physical(pv_index)?;
        self.probe_physical(
            pv_index,
            block_start,
            block_count,
            ExtentState::Free,
            provenance,
        );
        self.mark_free(pv_index, block_start, block_count, provenance)
    }

    /// Like [`mark_allocated`](Self::mark_allocated), recording findings first
    /// for physical and logical collisions
    pub fn checked_mark_allocated(
        &mut self,
        pv_index: u32,
        phys_block_start: u64,
        block_count: u64,
        lv_index: u32,
        logical_block_start: u64,
        provenance: Provenance,
    ) -> Result<ExtentId> {
        self.ensure_physical(pv_index)?;
        self.ensure_logical(lv_index)?;

        self.probe_physical(
            pv_index,
            phys_block_start,
            block_count,
            ExtentState::Allocated,
            provenance,
        );

        let logical = self
            .check_logical_overlap(lv_index, logical_block_start, block_count)
            .map(|existing| {
                Finding::collision(
                    FindingKind::LogicalOverlap,
                    lv_index,
                    logical_block_start,
                    block_count,
                    existing,
                    provenance,
                )
            });
        if let Some(finding) = logical {
            self.record_finding(finding);
        }

        self.mark_allocated(
            pv_index,
            phys_block_start,
            block_count,
            lv_index,
            logical_block_start,
            provenance,
        )
    }

    /// Find the extent whose physical range contains `block_number`
    ///
    /// When overlapping extents exist, the first one in physical order wins.
    pub fn find_physical_extent(&self, pv_index: u32, block_number: u64) -> Option<&Extent> {
        let pv = self.physical_volume(pv_index)?;
        pv.index
            .candidates(block_number, block_number.saturating_add(1))
            .map(|(_, id)| &self.extents[id.0])
            .find(|extent| extent.contains_physical(block_number))
    }

    /// Find the allocated extent whose logical range contains `block_number`
    pub fn find_logical_extent(&self, lv_index: u32, block_number: u64) -> Option<&Extent> {
        let lv = self.logical_volume(lv_index)?;
        lv.index
            .candidates(block_number, block_number.saturating_add(1))
            .map(|(_, id)| &self.extents[id.0])
            .find(|extent| extent.contains_logical(block_number))
    }

    /// Return the first extent in physical order intersecting
    /// `[block_start, block_start + block_count)`
    pub fn check_overlap(
        &self,
        pv_index: u32,
        block_start: u64,
        block_count: u64,
    ) -> Option<&Extent> {
        let pv = self.physical_volume(pv_index)?;
        let block_end = block_start.saturating_add(block_count);
        pv.index
            .candidates(block_start, block_end)
            .map(|(_, id)| &self.extents[id.0])
            .find(|extent| extent.overlaps_physical(block_start, block_count))
    }

    /// Return the first allocated extent in logical order intersecting a
    /// logical range
    pub fn check_logical_overlap(
        &self,
        lv_index: u32,
        block_start: u64,
        block_count: u64,
    ) -> Option<&Extent> {
        let lv = self.logical_volume(lv_index)?;
        let block_end = block_start.saturating_add(block_count);
        lv.index
            .candidates(block_start, block_end)
            .map(|(_, id)| &self.extents[id.0])
            .find(|extent| extent.overlaps_logical(block_start, block_count))
    }

    /// Recompute the per-volume block statistics
    ///
    /// Blocks not covered by any extent count towards none of the physical
    /// totals.
    pub fn calculate_statistics(&mut self) {
        let extents = &self.extents;

        for pv in &mut self.physical_volumes {
            let (mut reserved, mut allocated, mut free) = (0u64, 0u64, 0u64);
            for id in pv.index.entries.values() {
                let extent = &extents[id.0];
                let counter = match extent.state {
                    ExtentState::Reserved => &mut reserved,
                    ExtentState::Allocated => &mut allocated,
                    ExtentState::Free => &mut free,
                    ExtentState::Unknown => continue,
                };
                *counter = counter.saturating_add(extent.physical_block_count);
            }
            pv.reserved_blocks = reserved;
            pv.allocated_blocks = allocated;
            pv.free_blocks = free;
        }

        for lv in &mut self.logical_volumes {
            lv.mapped_blocks = lv
                .index
                .entries
                .values()
                .map(|id| extents[id.0].physical_block_count)
                .fold(0u64, u64::saturating_add);
            lv.unmapped_blocks = lv.size_in_blocks.saturating_sub(lv.mapped_blocks);
        }
    }

    /// Store a consistency finding and count it as an error
    pub fn record_finding(&mut self, finding: Finding) {
        warn!("{}", finding);
        self.error_count = self.error_count.saturating_add(1);
        self.findings.push(finding);
    }

    /// Store a warning message
    pub fn record_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warning_count = self.warning_count.saturating_add(1);
        self.warnings.push(message);
    }

    fn ensure_physical(&self, pv_index: u32) -> Result<()> {
        if (pv_index as usize) < self.physical_volumes.len() {
            Ok(())
        } else {
            Err(CheckError::InvalidPhysicalVolume(pv_index))
        }
    }

    fn ensure_logical(&self, lv_index: u32) -> Result<()> {
        if (lv_index as usize) < self.logical_volumes.len() {
            Ok(())
        } else {
            Err(CheckError::InvalidLogicalVolume(lv_index))
        }
    }

    fn probe_physical(
        &mut self,
        pv_index: u32,
        block_start: u64,
        block_count: u64,
        incoming: ExtentState,
        provenance: Provenance,
    ) {
        let finding = self
            .check_overlap(pv_index, block_start, block_count)
            .map(|existing| {
                Finding::collision(
                    FindingKind::for_physical_collision(existing.state, incoming),
                    pv_index,
                    block_start,
                    block_count,
                    existing,
                    provenance,
                )
            });
        if let Some(finding) = finding {
            self.record_finding(finding);
        }
    }

    /// Link a fully built extent into the arena and its indices
    ///
    /// Indices were validated by the caller, so this cannot fail.
    fn insert(&mut self, extent: Extent) -> ExtentId {
        let id = ExtentId(self.extents.len());

        self.physical_volumes[extent.physical_volume_index as usize]
            .index
            .insert(extent.physical_block_start, extent.physical_block_count, id);

        if extent.state == ExtentState::Allocated {
            self.logical_volumes[extent.logical_volume_index as usize]
                .index
                .insert(extent.logical_block_start, extent.physical_block_count, id);
        }

        self.extents.push(extent);
        id
    }
}

fn copy_uuid(uuid: &[u8]) -> Result<[u8; UUID_SIZE]> {
    uuid.try_into().map_err(|_| CheckError::MissingIdentifier)
}
