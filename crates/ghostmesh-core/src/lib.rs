//! GhostMesh Core Library
//!
//! This crate provides the fundamental types and error handling shared by
//! the GhostMesh memory store and its command line front end.
//!
//! # Modules
//!
//! - `error` - Error taxonomy and result alias
//! - `record` - Memory records, ordinals and the on-disk log entry format

pub mod error;
pub mod record;

pub use error::{Error, Result};
pub use record::{LineText, LogEntry, MemoryRecord, Ordinal};
