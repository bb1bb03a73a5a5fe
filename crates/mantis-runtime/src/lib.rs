//! Ingestion runtime for MANTIS and heart-rate uploads.
//!
//! Sequences cleaning, parsing, aggregation and storage for one upload and
//! guarantees the scratch copy is removed however the upload ends.

pub mod pipeline;

pub use mantis_core as core;
pub use mantis_data as data;
pub use mantis_store as store;
