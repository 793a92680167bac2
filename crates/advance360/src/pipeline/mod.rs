//! The decision pipeline: configuration store, stage implementations, and
//! the orchestrator that sequences them as resumable batch runs.
//!
//! A run sequences data load, feature engineering, clustering,
//! classification, risk filter, and summary in that order. Each stage reads
//! the run's pinned configuration snapshot and overwrites its own output
//! slot in the [`datasets::DatasetStore`].

pub mod classification;
pub mod clustering;
pub mod configuration;
pub mod datasets;
pub mod domain;
pub mod features;
pub mod ingest;
pub mod orchestrator;
pub mod profile;
pub mod risk;
pub mod summary;
