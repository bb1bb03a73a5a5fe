//! Shared domain types for the MANTIS ingestion service.
//!
//! Holds the session/shot/heart-rate models, the ingestion error taxonomy,
//! CLI/env settings, and the lenient field parsers used on device exports.

pub mod data_processors;
pub mod error;
pub mod models;
pub mod settings;
