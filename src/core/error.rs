//! Error types for extent tracking and volume checking

use thiserror::Error;

/// Check operation result type
pub type Result<T> = std::result::Result<T, CheckError>;

/// Extent tracking and volume checking errors
///
/// Lookups that find nothing return `None` rather than an error, and
/// metadata inconsistencies are recorded as findings on the volume state.
#[derive(Error, Debug)]
pub enum CheckError {
    /// Adding another physical volume would exceed the configured capacity
    #[error("Physical volume capacity exceeded (max {capacity})")]
    PhysicalVolumeCapacity { capacity: usize },

    /// Adding another logical volume would exceed the configured capacity
    #[error("Logical volume capacity exceeded (max {capacity})")]
    LogicalVolumeCapacity { capacity: usize },

    /// A volume identifier was missing or not 16 bytes long
    #[error("Missing or malformed volume identifier")]
    MissingIdentifier,

    /// Physical volume index is out of range
    #[error("Invalid physical volume index: {0}")]
    InvalidPhysicalVolume(u32),

    /// Logical volume index is out of range
    #[error("Invalid logical volume index: {0}")]
    InvalidLogicalVolume(u32),

    #[error("Invalid block size: {0} (must be a non-zero multiple of 512)")]
    InvalidBlockSize(u32),

    #[error("Invalid processing order '{0}'. Valid options: ascending, descending, physical")]
    InvalidOrder(String),

    /// The volume decoding collaborator reported a failure
    #[error("Volume source error: {0}")]
    Source(String),

    /// Processing was cancelled through a cancellation token
    #[error("Processing aborted")]
    Aborted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}
