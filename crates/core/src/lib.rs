//! Pure domain logic for the Bahn similarity engine.
//!
//! Everything in this crate is deterministic and free of I/O: signal math,
//! metadata statistics and movement classification, embedding calculators,
//! rank fusion, DTW bounds, segmentation grouping, and recording-file
//! parsing. Persistence lives in `bahn-db`, orchestration in `bahn-search`
//! and `bahn-pipeline`.

pub mod channels;
pub mod dtw;
pub mod embedding;
pub mod error;
pub mod metadata;
pub mod recording;
pub mod rrf;
pub mod segmentation;
pub mod signal;
pub mod types;

pub use error::CoreError;
