//! # fvdecheck - FileVault 2 Extent Allocation Tracker
//!
//! `fvdecheck` records the allocation state of every block range in an FVDE
//! (FileVault Drive Encryption) volume group and reports on it:
//!
//! - **Volume state** for physical and logical volumes, with per-volume
//!   extent indexes ordered by starting block
//! - **Overlap detection** between a new range and what is already tracked,
//!   with optional consistency findings recorded as ranges are marked
//! - **Reports**: allocation summary, allocation map, JSON report and
//!   point lookups by sector, physical block or logical block
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fvdecheck::{CheckConfig, CheckSession, Result, VolumeLayout};
//!
//! # fn main() -> Result<()> {
//! let layout = VolumeLayout::load("volume-group.json")?;
//!
//! let mut session = CheckSession::new(CheckConfig::default())?;
//! session.process(&layout)?;
//!
//! let mut stdout = std::io::stdout();
//! session.write_summary(&mut stdout)?;
//! session.write_allocation_map(&mut stdout)?;
//!
//! session.lookup_sector(2048).write_text(&mut stdout)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Tracking Without a Source
//!
//! ```rust
//! use fvdecheck::{Provenance, VolumeState};
//!
//! # fn main() -> fvdecheck::Result<()> {
//! let mut state = VolumeState::new(4096);
//! let pv = state.add_physical_volume(&[0u8; 16], 1_000_000)?;
//! let lv = state.add_logical_volume(&[0x11u8; 16], 500_000)?;
//!
//! state.mark_reserved(pv, 0, 1, "Volume header")?;
//! state.mark_allocated(pv, 1, 500_000, lv, 0, Provenance::default())?;
//!
//! let extent = state.find_physical_extent(pv, 250_000).unwrap();
//! assert_eq!(extent.logical_block_for(250_000), Some(249_999));
//! # Ok(())
//! # }
//! ```

pub mod check;
pub mod core;
pub mod report;
pub mod source;

// Re-export core modules internally so crate:: paths still work
#[allow(unused_imports)]
pub(crate) use crate::core::{config, error, extent, findings, state, translate};

pub use crate::check::{CancellationToken, CheckSession};
pub use crate::core::{
    config::{CheckConfig, ProcessingOrder},
    error::{CheckError, Result},
    extent::{Extent, ExtentId, ExtentState, Provenance},
    findings::{Finding, FindingKind},
    state::{LogicalVolumeInfo, PhysicalVolumeInfo, VolumeState},
    translate::{block_to_sector, sector_to_block, SECTOR_SIZE},
};
pub use crate::report::{
    format_uuid, write_allocation_map, write_summary, BlockLookup, LookupQuery,
    ProcessingSection, StructuredReport,
};
pub use crate::source::{
    EncryptedMetadataRegions, LogicalVolumeLayout, SegmentDescriptor, VolumeInfo, VolumeLayout,
    VolumeSource,
};
