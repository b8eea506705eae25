//! Configuration management for the CourseMate pipeline
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/<env>, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Language model configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Retrieval and ranking configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Text chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Context synthesis configuration
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Query analyzer configuration
    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: http, local
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for a remote embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// API key for the language model service
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_generation_base")]
    pub api_base: String,

    /// Model name
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Sampling temperature (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Maximum results returned per retrieval action
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Index oversampling factor before re-ranking
    #[serde(default = "default_oversample")]
    pub oversample: usize,

    /// Weight of semantic similarity in the composite score
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,

    /// Weight of due-date proximity in the composite score
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f32,

    /// Weight of course match in the composite score
    #[serde(default = "default_course_weight")]
    pub course_weight: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Minimum chunk size (smaller trailing chunks are dropped)
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SynthesisConfig {
    /// Character budget for the assembled context block
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Character cap per retrieved snippet
    #[serde(default = "default_max_snippet_chars")]
    pub max_snippet_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyzerConfig {
    /// Confidence below which a query is treated as ambiguous
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_embedding_provider() -> String { "local".to_string() }
fn default_embedding_model() -> String { "all-MiniLM-L6-v2".to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 10 }
fn default_max_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 32 }
fn default_generation_base() -> String { "https://api.openai.com/v1".to_string() }
fn default_generation_model() -> String { "gpt-4o-mini".to_string() }
fn default_generation_timeout() -> u64 { 30 }
fn default_max_tokens() -> usize { 1000 }
fn default_temperature() -> f32 { 0.7 }
fn default_max_results() -> usize { crate::DEFAULT_MAX_RESULTS }
fn default_oversample() -> usize { 4 }
fn default_semantic_weight() -> f32 { 0.7 }
fn default_recency_weight() -> f32 { 0.2 }
fn default_course_weight() -> f32 { 0.1 }
fn default_chunk_size() -> usize { 800 }
fn default_min_chunk_size() -> usize { 40 }
fn default_max_context_chars() -> usize { 6000 }
fn default_max_snippet_chars() -> usize { 600 }
fn default_confidence_threshold() -> f32 { 0.45 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { false }
fn default_service_name() -> String { "coursemate".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__MAX_RESULTS=10
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the embedding request timeout as Duration
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding.timeout_secs)
    }

    /// Get the generation request timeout as Duration
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation.timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            retrieval: RetrievalConfig::default(),
            chunking: ChunkingConfig::default(),
            synthesis: SynthesisConfig::default(),
            analyzer: AnalyzerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_max_retries(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_generation_base(),
            model: default_generation_model(),
            timeout_secs: default_generation_timeout(),
            max_retries: default_max_retries(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            oversample: default_oversample(),
            semantic_weight: default_semantic_weight(),
            recency_weight: default_recency_weight(),
            course_weight: default_course_weight(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            min_chunk_size: default_min_chunk_size(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_context_chars: default_max_context_chars(),
            max_snippet_chars: default_max_snippet_chars(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.retrieval.max_results, 5);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.generation.model, "gpt-4o-mini");
    }

    #[test]
    fn test_rank_weights_sum_close_to_one() {
        let config = RetrievalConfig::default();
        let sum = config.semantic_weight + config.recency_weight + config.course_weight;
        assert!((sum - 1.0).abs() < 1e-6);
    }
}
