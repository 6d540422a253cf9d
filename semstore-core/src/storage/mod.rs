//! On-disk storage for a single collection.
//!
//! This module provides:
//! - WAL (Write-Ahead Log) for crash-safe mutations
//! - Append-only data file for rows

pub mod data_file;
pub mod wal;

pub use data_file::{DataFile, DataRecord};
pub use wal::{SyncMode, Wal, WalEntry};
