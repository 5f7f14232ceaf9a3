//! Check configuration
//!
//! All settings have defaults, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! block_size = 4096
//! max_physical_volumes = 16
//! max_logical_volumes = 16
//! map_line_limit = 1000
//! verbose = false
//! order = "ascending"
//! validate_overlaps = true
//! ```

use crate::error::{CheckError, Result};
use crate::translate::SECTOR_SIZE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Default volume block size in bytes
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Default ceiling for physical and logical volumes
pub const DEFAULT_MAX_VOLUMES: usize = 16;

/// Default number of allocation map lines per physical volume
pub const DEFAULT_MAP_LINE_LIMIT: usize = 1000;

/// Order in which metadata transactions are replayed
///
/// Serialized in lowercase; parsed case-insensitively through [`FromStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ProcessingOrder {
    #[default]
    Ascending,
    Descending,
    Physical,
}

impl ProcessingOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingOrder::Ascending => "ascending",
            ProcessingOrder::Descending => "descending",
            ProcessingOrder::Physical => "physical",
        }
    }
}

impl fmt::Display for ProcessingOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingOrder {
    type Err = CheckError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ascending" => Ok(ProcessingOrder::Ascending),
            "descending" => Ok(ProcessingOrder::Descending),
            "physical" => Ok(ProcessingOrder::Physical),
            _ => Err(CheckError::InvalidOrder(s.to_string())),
        }
    }
}

impl TryFrom<String> for ProcessingOrder {
    type Error = CheckError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Settings for a check session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Bytes per volume block
    pub block_size: u32,

    pub max_physical_volumes: usize,
    pub max_logical_volumes: usize,

    /// Extent lines printed per physical volume before the map is truncated
    pub map_line_limit: usize,

    /// Print the full allocation map regardless of `map_line_limit`
    pub verbose: bool,

    pub order: ProcessingOrder,

    /// Probe for overlaps before every mark and record findings
    pub validate_overlaps: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        CheckConfig {
            block_size: DEFAULT_BLOCK_SIZE,
            max_physical_volumes: DEFAULT_MAX_VOLUMES,
            max_logical_volumes: DEFAULT_MAX_VOLUMES,
            map_line_limit: DEFAULT_MAP_LINE_LIMIT,
            verbose: false,
            order: ProcessingOrder::default(),
            validate_overlaps: false,
        }
    }
}

impl CheckConfig {
    /// Parse and validate a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(text)?;

        // Surface a bad order as InvalidOrder rather than a TOML error
        if let Some(toml::Value::String(order)) = table.get("order") {
            order.parse::<ProcessingOrder>()?;
        }

        let config: CheckConfig = toml::Value::Table(table).try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size % SECTOR_SIZE as u32 != 0 {
            return Err(CheckError::InvalidBlockSize(self.block_size));
        }
        Ok(())
    }
}
