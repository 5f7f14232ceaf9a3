//! Volume source: the contract consumed from the volume decoding library
//!
//! Opening, unlocking and decoding a FileVault 2 volume is done elsewhere.
//! The checker only needs the decoded volume group: physical and logical
//! volumes, each logical volume's segment descriptors, and the byte
//! offsets of the format's metadata regions. [`VolumeSource`] spells that
//! out as an explicit interface, and [`VolumeLayout`] is an owned
//! implementation that can be described in JSON.

use crate::error::{CheckError, Result};
use crate::state::UUID_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Identifier and size of a physical or logical volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub uuid: Uuid,
    /// Size in volume blocks
    pub size_blocks: u64,
}

impl VolumeInfo {
    pub fn new(uuid: [u8; UUID_SIZE], size_blocks: u64) -> Self {
        VolumeInfo {
            uuid: Uuid::from_bytes(uuid),
            size_blocks,
        }
    }
}

/// Mapping of a logical block run onto a physical block run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub physical_volume_index: u32,
    pub physical_block_number: u64,
    pub number_of_blocks: u64,
    pub logical_block_number: u64,
}

/// Byte offsets of the two encrypted metadata copies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EncryptedMetadataRegions {
    pub offsets: [u64; 2],
    /// Size of each copy in bytes
    pub size: u64,
}

/// Decoded volume group as exposed by the volume decoding library
pub trait VolumeSource {
    /// Physical volumes in volume group order
    fn physical_volumes(&self) -> Result<Vec<VolumeInfo>>;

    /// Logical volumes in volume group order
    fn logical_volumes(&self) -> Result<Vec<VolumeInfo>>;

    /// Segment descriptors of one logical volume
    fn segment_descriptors(&self, lv_index: u32) -> Result<Vec<SegmentDescriptor>>;

    /// Byte offsets of the four metadata blocks from the volume header
    fn header_metadata_offsets(&self) -> Result<[u64; 4]>;

    /// Size in bytes of each metadata block region
    fn metadata_block_size(&self) -> Result<u32>;

    /// Encrypted metadata regions, if the metadata has been decoded
    fn encrypted_metadata_regions(&self) -> Result<Option<EncryptedMetadataRegions>>;
}

/// Logical volume entry of a [`VolumeLayout`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalVolumeLayout {
    pub uuid: Uuid,
    pub size_blocks: u64,
    #[serde(default)]
    pub segments: Vec<SegmentDescriptor>,
}

/// Owned description of a decoded volume group
///
/// ```json
/// {
///   "physical_volumes": [
///     { "uuid": "00000000-0000-0000-0000-000000000000", "size_blocks": 1000000 }
///   ],
///   "logical_volumes": [
///     {
///       "uuid": "11111111-1111-1111-1111-111111111111",
///       "size_blocks": 500000,
///       "segments": [
///         { "physical_volume_index": 0, "physical_block_number": 1,
///           "number_of_blocks": 500000, "logical_block_number": 0 }
///       ]
///     }
///   ],
///   "metadata_offsets": [8192, 16384, 24576, 32768],
///   "metadata_size": 4096
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeLayout {
    #[serde(default)]
    pub physical_volumes: Vec<VolumeInfo>,
    #[serde(default)]
    pub logical_volumes: Vec<LogicalVolumeLayout>,
    #[serde(default)]
    pub metadata_offsets: [u64; 4],
    #[serde(default)]
    pub metadata_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_metadata: Option<EncryptedMetadataRegions>,
}

impl VolumeLayout {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

impl VolumeSource for VolumeLayout {
    fn physical_volumes(&self) -> Result<Vec<VolumeInfo>> {
        Ok(self.physical_volumes.clone())
    }

    fn logical_volumes(&self) -> Result<Vec<VolumeInfo>> {
        Ok(self
            .logical_volumes
            .iter()
            .map(|lv| VolumeInfo {
                uuid: lv.uuid,
                size_blocks: lv.size_blocks,
            })
            .collect())
    }

    fn segment_descriptors(&self, lv_index: u32) -> Result<Vec<SegmentDescriptor>> {
        self.logical_volumes
            .get(lv_index as usize)
            .map(|lv| lv.segments.clone())
            .ok_or_else(|| {
                CheckError::Source(format!("missing logical volume descriptor: {}", lv_index))
            })
    }

    fn header_metadata_offsets(&self) -> Result<[u64; 4]> {
        Ok(self.metadata_offsets)
    }

    fn metadata_block_size(&self) -> Result<u32> {
        Ok(self.metadata_size)
    }

    fn encrypted_metadata_regions(&self) -> Result<Option<EncryptedMetadataRegions>> {
        Ok(self.encrypted_metadata)
    }
}
