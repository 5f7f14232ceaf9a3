//! Extent tracking core
//!
//! Leaf modules first: extent records and address translation, then the
//! volume state store and the consistency findings it records.

pub mod config;
pub mod error;
pub mod extent;
pub mod findings;
pub mod state;
pub mod translate;
