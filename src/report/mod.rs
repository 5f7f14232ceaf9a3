//! Reports rendered from the volume state
//!
//! Reporters only read the state, except that the summary and the
//! structured report refresh the cached statistics first.

pub mod lookup;
pub mod map;
pub mod structured;
pub mod summary;

pub use lookup::{BlockLookup, LookupQuery};
pub use map::write_allocation_map;
pub use structured::{ProcessingSection, StructuredReport};
pub use summary::write_summary;

use crate::state::UUID_SIZE;
use uuid::Uuid;

/// Lowercase hyphenated form of a big-endian volume identifier
pub fn format_uuid(bytes: &[u8; UUID_SIZE]) -> String {
    Uuid::from_bytes(*bytes).hyphenated().to_string()
}

/// Share of `part` in `total` as a percentage; 0 when `total` is 0
pub(crate) fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64) * 100.0
}
