//! CourseMate Common Library
//!
//! Shared code for the CourseMate pipeline crates including:
//! - Core data model (courses, raw classroom items, content chunks)
//! - Error types and handling
//! - Configuration management
//! - Embedding client abstraction
//! - Classroom provider contract
//! - Retry policy for external calls
//! - Per-query reasoning trace

pub mod classroom;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod model;
pub mod retry;
pub mod telemetry;
pub mod trace;

// Re-export commonly used types
pub use crate::classroom::ClassroomProvider;
pub use crate::config::AppConfig;
pub use crate::embeddings::Embedder;
pub use crate::errors::{AppError, Result};
pub use crate::retry::RetryPolicy;
pub use crate::trace::{ReasoningStep, ReasoningTrace, TraceStage};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding dimension (matches the all-MiniLM family)
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

/// Default number of retrieval results per search action
pub const DEFAULT_MAX_RESULTS: usize = 5;
