//! CourseMate Search
//!
//! Provides:
//! - The vector index contract consumed by ingestion and retrieval
//! - An in-memory cosine-similarity index for tests and single-process use
//! - The retrieval engine with composite re-ranking (semantic similarity,
//!   due-date proximity, course match)

pub mod index;
pub mod retrieval;

pub use index::{ChunkFilter, IndexHit, InMemoryIndex, VectorIndex};
pub use retrieval::{RankWeights, RetrievalEngine, RetrievalRequest, RetrievalResult};
