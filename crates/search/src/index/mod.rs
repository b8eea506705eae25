//! Vector index contract and in-memory implementation
//!
//! The index owns content chunks. Mutation happens only through
//! `upsert_source`, which replaces every chunk of a source in one write-lock
//! section, so concurrent readers observe either the old chunks or the new
//! ones, never a mix.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coursemate_common::errors::Result;
use coursemate_common::model::{ContentChunk, ContentType};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

/// Filter applied to index queries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkFilter {
    /// Restrict to a single course
    pub course_id: Option<String>,

    /// Restrict to one kind of content
    pub content_type: Option<ContentType>,
}

impl ChunkFilter {
    pub fn course(course_id: impl Into<String>) -> Self {
        Self {
            course_id: Some(course_id.into()),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    fn matches(&self, chunk: &ContentChunk) -> bool {
        if let Some(course_id) = &self.course_id {
            if &chunk.course_id != course_id {
                return false;
            }
        }
        if let Some(content_type) = self.content_type {
            if chunk.content_type != content_type {
                return false;
            }
        }
        true
    }
}

/// A chunk returned from a nearest-neighbor query
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub chunk: ContentChunk,
    pub similarity: f32,
}

/// Storage contract for embedded content chunks
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Atomically replace all chunks for a source item
    async fn upsert_source(
        &self,
        source_id: &str,
        content_hash: &str,
        chunks: Vec<ContentChunk>,
    ) -> Result<()>;

    /// Content hash recorded for a source, if it has been ingested
    async fn source_hash(&self, source_id: &str) -> Result<Option<String>>;

    /// Nearest-neighbor query by cosine similarity, best-first
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&ChunkFilter>,
    ) -> Result<Vec<IndexHit>>;

    /// Chunks whose due date falls within `[from, until)`, one per source,
    /// ordered by due date ascending
    async fn due_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        filter: Option<&ChunkFilter>,
    ) -> Result<Vec<ContentChunk>>;

    /// Remove all chunks for a source; returns how many were removed
    async fn remove_source(&self, source_id: &str) -> Result<usize>;

    /// Number of chunks currently stored
    async fn chunk_count(&self) -> usize;
}

/// Cosine similarity between two vectors; zero-norm vectors score 0.0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

struct SourceEntry {
    content_hash: String,
    chunk_ids: Vec<String>,
}

#[derive(Default)]
struct IndexState {
    // BTreeMap keeps chunk iteration ordered by id, which makes
    // similarity ties deterministic.
    chunks: BTreeMap<String, ContentChunk>,
    sources: HashMap<String, SourceEntry>,
}

/// In-memory vector index
#[derive(Default)]
pub struct InMemoryIndex {
    state: RwLock<IndexState>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert_source(
        &self,
        source_id: &str,
        content_hash: &str,
        chunks: Vec<ContentChunk>,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        if let Some(previous) = state.sources.remove(source_id) {
            for chunk_id in previous.chunk_ids {
                state.chunks.remove(&chunk_id);
            }
        }

        let chunk_ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        for chunk in chunks {
            state.chunks.insert(chunk.id.clone(), chunk);
        }
        state.sources.insert(
            source_id.to_string(),
            SourceEntry {
                content_hash: content_hash.to_string(),
                chunk_ids,
            },
        );

        Ok(())
    }

    async fn source_hash(&self, source_id: &str) -> Result<Option<String>> {
        let state = self.state.read().await;
        Ok(state
            .sources
            .get(source_id)
            .map(|entry| entry.content_hash.clone()))
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&ChunkFilter>,
    ) -> Result<Vec<IndexHit>> {
        let state = self.state.read().await;

        let mut hits: Vec<IndexHit> = state
            .chunks
            .values()
            .filter(|chunk| filter.map_or(true, |f| f.matches(chunk)))
            .map(|chunk| IndexHit {
                similarity: cosine_similarity(embedding, &chunk.embedding),
                chunk: chunk.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        hits.truncate(k);

        Ok(hits)
    }

    async fn due_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        filter: Option<&ChunkFilter>,
    ) -> Result<Vec<ContentChunk>> {
        let state = self.state.read().await;
        let mut seen_sources = HashSet::new();

        let mut due: Vec<ContentChunk> = state
            .chunks
            .values()
            .filter(|chunk| filter.map_or(true, |f| f.matches(chunk)))
            .filter(|chunk| {
                chunk
                    .due_at
                    .map(|d| d >= from && d < until)
                    .unwrap_or(false)
            })
            .filter(|chunk| seen_sources.insert(chunk.source_id.clone()))
            .cloned()
            .collect();

        due.sort_by_key(|chunk| chunk.due_at);
        Ok(due)
    }

    async fn remove_source(&self, source_id: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        match state.sources.remove(source_id) {
            Some(entry) => {
                let removed = entry.chunk_ids.len();
                for chunk_id in entry.chunk_ids {
                    state.chunks.remove(&chunk_id);
                }
                Ok(removed)
            }
            None => Ok(0),
        }
    }

    async fn chunk_count(&self) -> usize {
        self.state.read().await.chunks.len()
    }
}
