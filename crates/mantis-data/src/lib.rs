//! Data ingestion layer for the MANTIS service.
//!
//! Strips the firmware banner from raw MANTIS exports, parses the cleaned
//! CSV into typed rows, and reduces each batch into session-level records.

pub mod aggregator;
pub mod cleaner;
pub mod reader;

pub use mantis_core as core;
