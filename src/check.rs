//! Check session: drives a volume source into the volume state
//!
//! Processing order is fixed:
//! 1. register every physical volume
//! 2. reserve the volume header on each physical volume, then the metadata
//!    and encrypted metadata regions on physical volume 0
//! 3. register every logical volume
//! 4. mark every segment descriptor of every logical volume allocated

use crate::config::CheckConfig;
use crate::error::{CheckError, Result};
use crate::extent::{Provenance, BLOCK_TYPE_SEGMENT_MAPPING};
use crate::report::{
    write_allocation_map, write_summary, BlockLookup, ProcessingSection, StructuredReport,
};
use crate::source::{SegmentDescriptor, VolumeSource};
use crate::state::VolumeState;
use crate::translate::bytes_to_blocks;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

const METADATA_DESCRIPTIONS: [&str; 4] = [
    "Metadata block 1",
    "Metadata block 2",
    "Metadata block 3",
    "Metadata block 4",
];

const ENCRYPTED_METADATA_DESCRIPTIONS: [&str; 2] =
    ["Encrypted metadata 1", "Encrypted metadata 2"];

/// Cooperative abort flag shared with whoever may cancel a run
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One tracking run over a decoded volume group
#[derive(Debug)]
pub struct CheckSession {
    config: CheckConfig,
    state: VolumeState,
    cancel: CancellationToken,
    transactions_processed: u32,
    metadata_blocks_processed: u32,
}

impl CheckSession {
    pub fn new(config: CheckConfig) -> Result<Self> {
        config.validate()?;
        Ok(CheckSession {
            state: VolumeState::from_config(&config),
            config,
            cancel: CancellationToken::new(),
            transactions_processed: 0,
            metadata_blocks_processed: 0,
        })
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    pub fn state(&self) -> &VolumeState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut VolumeState {
        &mut self.state
    }

    pub fn into_state(self) -> VolumeState {
        self.state
    }

    /// Token that aborts [`process`](Self::process) between logical volumes
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Build the volume state from a decoded volume group
    pub fn process<S: VolumeSource + ?Sized>(&mut self, source: &S) -> Result<()> {
        let physical_volumes = source.physical_volumes()?;
        if physical_volumes.is_empty() {
            return Err(CheckError::Source(
                "volume group has no physical volumes".to_string(),
            ));
        }

        info!(
            "Processing volume group: {} physical volume(s)",
            physical_volumes.len()
        );
        for pv in &physical_volumes {
            self.state
                .add_physical_volume(pv.uuid.as_bytes(), pv.size_blocks)?;
        }

        for pv_index in 0..self.state.num_physical_volumes() {
            self.reserve(pv_index, 0, 1, "Volume header")?;
        }
        self.reserve_metadata(source)?;

        let logical_volumes = source.logical_volumes()?;
        info!("{} logical volume(s)", logical_volumes.len());
        for lv in &logical_volumes {
            self.state
                .add_logical_volume(lv.uuid.as_bytes(), lv.size_blocks)?;
        }

        for lv_index in 0..self.state.num_logical_volumes() {
            if self.cancel.is_cancelled() {
                return Err(CheckError::Aborted);
            }

            let segments = source.segment_descriptors(lv_index)?;
            debug!(
                "LV{}: {} segment descriptor(s)",
                lv_index,
                segments.len()
            );
            for segment in &segments {
                self.allocate(lv_index, segment)?;
            }
        }

        info!(
            "Tracked {} extent(s), {} finding(s)",
            self.state.total_extents(),
            self.state.error_count()
        );
        Ok(())
    }

    fn reserve_metadata<S: VolumeSource + ?Sized>(&mut self, source: &S) -> Result<()> {
        let block_size = self.state.block_size();

        let offsets = source.header_metadata_offsets()?;
        let metadata_blocks = bytes_to_blocks(source.metadata_block_size()? as u64, block_size);
        for (offset, description) in offsets.iter().zip(METADATA_DESCRIPTIONS) {
            self.reserve_region(*offset, metadata_blocks, description)?;
        }

        if let Some(regions) = source.encrypted_metadata_regions()? {
            let blocks = bytes_to_blocks(regions.size, block_size);
            for (offset, description) in regions.offsets.iter().zip(ENCRYPTED_METADATA_DESCRIPTIONS)
            {
                if *offset > 0 && regions.size > 0 {
                    self.reserve_region(*offset, blocks, description)?;
                }
            }
        }

        Ok(())
    }

    /// Reserve a metadata region given as a byte offset on physical volume 0
    fn reserve_region(
        &mut self,
        offset: u64,
        block_count: u64,
        description: &'static str,
    ) -> Result<()> {
        if block_count == 0 {
            self.state.record_warning(format!(
                "{} at offset {} is smaller than one block, not reserved",
                description, offset
            ));
            return Ok(());
        }

        let start = bytes_to_blocks(offset, self.state.block_size());
        self.reserve(0, start, block_count, description)
    }

    fn reserve(
        &mut self,
        pv_index: u32,
        start: u64,
        count: u64,
        description: &'static str,
    ) -> Result<()> {
        if self.config.validate_overlaps {
            self.state
                .checked_mark_reserved(pv_index, start, count, description)?;
        } else {
            self.state
                .mark_reserved(pv_index, start, count, description)?;
        }
        Ok(())
    }

    fn allocate(&mut self, lv_index: u32, segment: &SegmentDescriptor) -> Result<()> {
        let provenance = Provenance::new(0, 0, BLOCK_TYPE_SEGMENT_MAPPING);
        if self.config.validate_overlaps {
            self.state.checked_mark_allocated(
                segment.physical_volume_index,
                segment.physical_block_number,
                segment.number_of_blocks,
                lv_index,
                segment.logical_block_number,
                provenance,
            )?;
        } else {
            self.state.mark_allocated(
                segment.physical_volume_index,
                segment.physical_block_number,
                segment.number_of_blocks,
                lv_index,
                segment.logical_block_number,
                provenance,
            )?;
        }
        Ok(())
    }

    pub fn processing(&self) -> ProcessingSection {
        ProcessingSection {
            order: self.config.order,
            transactions_processed: self.transactions_processed,
            metadata_blocks_processed: self.metadata_blocks_processed,
        }
    }

    pub fn write_summary<W: Write>(&mut self, out: &mut W) -> Result<()> {
        write_summary(&mut self.state, out)
    }

    /// Write the allocation map using the configured line limit
    pub fn write_allocation_map<W: Write>(&self, out: &mut W) -> Result<()> {
        write_allocation_map(
            &self.state,
            out,
            self.config.map_line_limit,
            self.config.verbose,
        )
    }

    pub fn structured_report(&mut self) -> StructuredReport {
        let processing = self.processing();
        StructuredReport::build(&mut self.state, processing)
    }

    pub fn lookup_sector(&self, sector: u64) -> BlockLookup {
        BlockLookup::sector(&self.state, sector)
    }

    pub fn lookup_physical(&self, pv_index: u32, block: u64) -> BlockLookup {
        BlockLookup::physical(&self.state, pv_index, block)
    }

    pub fn lookup_logical(&self, lv_index: u32, block: u64) -> BlockLookup {
        BlockLookup::logical(&self.state, lv_index, block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extent::ExtentState;
    use crate::findings::FindingKind;
    use crate::source::{EncryptedMetadataRegions, LogicalVolumeLayout, VolumeInfo, VolumeLayout};
    use uuid::Uuid;

    fn layout() -> VolumeLayout {
        VolumeLayout {
            physical_volumes: vec![VolumeInfo::new([0u8; 16], 1_000_000)],
            logical_volumes: vec![LogicalVolumeLayout {
                uuid: Uuid::from_bytes([0x11; 16]),
                size_blocks: 500_000,
                segments: vec![SegmentDescriptor {
                    physical_volume_index: 0,
                    physical_block_number: 1,
                    number_of_blocks: 499_000,
                    logical_block_number: 0,
                }],
            }],
            metadata_offsets: [
                900_000 * 4096,
                900_100 * 4096,
                900_200 * 4096,
                900_300 * 4096,
            ],
            metadata_size: 8 * 4096,
            encrypted_metadata: Some(EncryptedMetadataRegions {
                offsets: [950_000 * 4096, 0],
                size: 16 * 4096,
            }),
        }
    }

    #[test]
    fn test_process_layout() {
        let mut session = CheckSession::new(CheckConfig::default()).unwrap();
        session.process(&layout()).unwrap();

        let state = session.state();
        assert_eq!(state.num_physical_volumes(), 1);
        assert_eq!(state.num_logical_volumes(), 1);
        // header + 4 metadata + 1 encrypted metadata + 1 segment
        assert_eq!(state.total_extents(), 7);

        let header = state.find_physical_extent(0, 0).unwrap();
        assert_eq!(header.reserved_description, Some("Volume header"));

        let metadata = state.find_physical_extent(0, 900_107).unwrap();
        assert_eq!(metadata.reserved_description, Some("Metadata block 2"));
        assert_eq!(metadata.physical_block_count, 8);

        let encrypted = state.find_physical_extent(0, 950_015).unwrap();
        assert_eq!(encrypted.reserved_description, Some("Encrypted metadata 1"));

        let segment = state.find_physical_extent(0, 1000).unwrap();
        assert_eq!(segment.state, ExtentState::Allocated);
        assert_eq!(segment.provenance.block_type, 0x0305);
    }

    #[test]
    fn test_every_physical_volume_gets_header() {
        let mut source = layout();
        source
            .physical_volumes
            .push(VolumeInfo::new([0x22; 16], 2000));

        let mut session = CheckSession::new(CheckConfig::default()).unwrap();
        session.process(&source).unwrap();

        let header = session.state().find_physical_extent(1, 0).unwrap();
        assert_eq!(header.state, ExtentState::Reserved);
        assert!(session.state().find_physical_extent(1, 900_000).is_none());
    }

    #[test]
    fn test_undersized_metadata_region_is_warning() {
        let mut source = layout();
        source.metadata_size = 512;

        let mut session = CheckSession::new(CheckConfig::default()).unwrap();
        session.process(&source).unwrap();
        assert_eq!(session.state().warning_count(), 4);
        assert_eq!(session.state().error_count(), 0);
    }

    #[test]
    fn test_segment_on_unknown_physical_volume_aborts() {
        let mut source = layout();
        source.logical_volumes[0].segments[0].physical_volume_index = 3;

        let mut session = CheckSession::new(CheckConfig::default()).unwrap();
        let result = session.process(&source);
        assert!(matches!(result, Err(CheckError::InvalidPhysicalVolume(3))));
    }

    #[test]
    fn test_empty_volume_group() {
        let mut session = CheckSession::new(CheckConfig::default()).unwrap();
        let result = session.process(&VolumeLayout::default());
        assert!(matches!(result, Err(CheckError::Source(_))));
    }

    #[test]
    fn test_validation_records_findings() {
        let mut source = layout();
        source.logical_volumes[0].segments.push(SegmentDescriptor {
            physical_volume_index: 0,
            physical_block_number: 900_004,
            number_of_blocks: 10,
            logical_block_number: 499_000,
        });

        let config = CheckConfig {
            validate_overlaps: true,
            ..CheckConfig::default()
        };
        let mut session = CheckSession::new(config).unwrap();
        session.process(&source).unwrap();

        let kinds: Vec<_> = session.state().findings().iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FindingKind::ReservedViolation]);
        assert_eq!(session.state().error_count(), 1);
    }

    #[test]
    fn test_cancellation() {
        let mut session = CheckSession::new(CheckConfig::default()).unwrap();
        session.cancellation_token().cancel();

        let result = session.process(&layout());
        assert!(matches!(result, Err(CheckError::Aborted)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CheckConfig {
            block_size: 100,
            ..CheckConfig::default()
        };
        assert!(matches!(
            CheckSession::new(config),
            Err(CheckError::InvalidBlockSize(100))
        ));
    }
}
