//! Ingestion pipeline: CSV recordings in, raw channel tables plus derived
//! metadata and embeddings out, with an in-process task registry for
//! long-running batches.

pub mod error;
pub mod ingest;
pub mod tasks;

pub use error::PipelineError;
pub use ingest::{FileOutcome, IngestFile, IngestParams, IngestReport, Ingestor};
pub use tasks::{StartOutcome, TaskRegistry, TaskRecord, TaskStatus};
