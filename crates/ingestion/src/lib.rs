//! CourseMate Ingestion
//!
//! Turns raw classroom items into embedded content chunks:
//! - Semantic-boundary chunking with a date-entity guard
//! - Idempotent per-source upserts keyed by content hash
//! - Partial-failure reporting (a bad chunk never aborts a run)

pub mod chunker;
pub mod ingestor;

pub use chunker::{chunk_text, TextChunk};
pub use ingestor::{IngestReport, Ingestor};
