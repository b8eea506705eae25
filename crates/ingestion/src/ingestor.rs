//! Content ingestor
//!
//! Renders raw classroom items into attributable documents, chunks and
//! embeds them, and upserts the chunks into the vector index. Re-ingesting
//! unchanged content is a no-op (content-hash check); a failed chunk is
//! skipped and counted, never fatal for the run. Runs for the same course
//! are serialized; different courses may ingest concurrently.

use crate::chunker::chunk_text;
use coursemate_common::config::ChunkingConfig;
use coursemate_common::embeddings::Embedder;
use coursemate_common::errors::Result;
use coursemate_common::model::{ContentChunk, Course, RawItem};
use coursemate_search::index::VectorIndex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// Outcome counts for one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Chunks embedded and stored
    pub succeeded: usize,
    /// Chunks skipped because embedding failed
    pub failed: usize,
    /// Items left untouched because their content hash was unchanged
    pub unchanged: usize,
}

impl IngestReport {
    pub fn absorb(&mut self, other: IngestReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.unchanged += other.unchanged;
    }
}

enum ItemOutcome {
    Unchanged,
    Stored { succeeded: usize, failed: usize },
}

/// Ingests classroom items into the vector index
pub struct Ingestor {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    course_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Ingestor {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            chunking,
            course_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn course_lock(&self, course_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.course_locks.lock().await;
        locks
            .entry(course_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Ingest all items of a course. Two runs for the same course never
    /// overlap; the per-course lock serializes them.
    #[instrument(skip(self, items), fields(course = %course.name, items = items.len()))]
    pub async fn ingest_course(&self, course: &Course, items: &[RawItem]) -> Result<IngestReport> {
        let lock = self.course_lock(&course.id).await;
        let _guard = lock.lock().await;

        let mut report = IngestReport::default();

        for item in items {
            match self.ingest_item(course, item).await {
                Ok(ItemOutcome::Unchanged) => report.unchanged += 1,
                Ok(ItemOutcome::Stored { succeeded, failed }) => {
                    report.succeeded += succeeded;
                    report.failed += failed;
                }
                Err(err) => {
                    warn!(item = %item.id, error = %err, "skipping item");
                    report.failed += 1;
                }
            }
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            unchanged = report.unchanged,
            "course ingestion complete"
        );
        Ok(report)
    }

    async fn ingest_item(&self, course: &Course, item: &RawItem) -> Result<ItemOutcome> {
        let document = compose_document(course, item);
        let hash = content_hash(item);

        if self.index.source_hash(&item.id).await?.as_deref() == Some(hash.as_str()) {
            return Ok(ItemOutcome::Unchanged);
        }

        let chunks = chunk_text(&document, &self.chunking);
        if chunks.is_empty() {
            // Empty bodies still get their hash recorded so re-ingestion
            // stays a no-op.
            self.index.upsert_source(&item.id, &hash, Vec::new()).await?;
            return Ok(ItemOutcome::Stored {
                succeeded: 0,
                failed: 0,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embed_with_fallback(&texts).await;

        let mut stored = Vec::with_capacity(chunks.len());
        let mut failed = 0usize;
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            match embedding {
                Some(embedding) => stored.push(ContentChunk {
                    id: ContentChunk::chunk_id(&item.id, chunk.index),
                    source_id: item.id.clone(),
                    course_id: course.id.clone(),
                    course_name: course.name.clone(),
                    content_type: item.content_type,
                    title: item.title.clone(),
                    text: chunk.text,
                    created_at: item.created_at,
                    due_at: item.due_at,
                    embedding,
                }),
                None => {
                    warn!(item = %item.id, offset = chunk.index, "embedding failed, chunk skipped");
                    failed += 1;
                }
            }
        }

        let succeeded = stored.len();
        self.index.upsert_source(&item.id, &hash, stored).await?;

        Ok(ItemOutcome::Stored { succeeded, failed })
    }

    /// Batch embedding with per-chunk salvage: when the batch call fails,
    /// each chunk is embedded individually so one bad chunk cannot sink the
    /// rest.
    async fn embed_with_fallback(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        match self.embedder.embed_batch(texts).await {
            Ok(embeddings) if embeddings.len() == texts.len() => {
                embeddings.into_iter().map(Some).collect()
            }
            Ok(embeddings) => {
                warn!(
                    expected = texts.len(),
                    got = embeddings.len(),
                    "batch embedding returned wrong arity, retrying per chunk"
                );
                self.embed_individually(texts).await
            }
            Err(err) => {
                warn!(error = %err, "batch embedding failed, retrying per chunk");
                self.embed_individually(texts).await
            }
        }
    }

    async fn embed_individually(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embedder.embed(text).await.ok());
        }
        out
    }
}

/// Render a raw item into the document text stored with its chunks. The
/// header keeps results attributable after retrieval.
fn compose_document(course: &Course, item: &RawItem) -> String {
    let mut doc = format!("Course: {}\nType: {}\n", course.name, item.content_type);
    if !item.title.trim().is_empty() {
        doc.push_str(&format!("Title: {}\n", item.title));
    }
    if let Some(due) = item.due_at {
        doc.push_str(&format!("Due: {}\n", due.format("%Y-%m-%d")));
    }
    doc.push_str(item.body.trim());
    doc
}

/// Stable content hash for idempotent upserts
fn content_hash(item: &RawItem) -> String {
    let mut hasher = Sha256::new();
    hasher.update(item.id.as_bytes());
    hasher.update([0]);
    hasher.update(item.title.as_bytes());
    hasher.update([0]);
    hasher.update(item.body.as_bytes());
    hasher.update([0]);
    hasher.update(item.created_at.to_rfc3339().as_bytes());
    if let Some(due) = item.due_at {
        hasher.update(due.to_rfc3339().as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use coursemate_common::embeddings::HashEmbedder;
    use coursemate_common::errors::AppError;
    use coursemate_common::model::ContentType;
    use coursemate_search::index::InMemoryIndex;

    fn make_item(id: &str, body: &str) -> RawItem {
        RawItem {
            id: id.to_string(),
            course_id: "c1".to_string(),
            content_type: ContentType::Assignment,
            title: "Group Presentation".to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
            due_at: Some(Utc::now() + Duration::days(5)),
        }
    }

    fn make_ingestor(index: Arc<InMemoryIndex>) -> Ingestor {
        Ingestor::new(
            index,
            Arc::new(HashEmbedder::new(64)),
            ChunkingConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_ingest_stores_chunks_with_attribution() {
        let index = Arc::new(InMemoryIndex::new());
        let ingestor = make_ingestor(index.clone());
        let course = Course::new("c1", "HS 103");
        let items = vec![make_item("item-1", "Prepare slides for the group presentation.")];

        let report = ingestor.ingest_course(&course, &items).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 0);

        let hits = index
            .query(&HashEmbedder::new(64).embed("group presentation slides").await.unwrap(), 5, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.course_name, "HS 103");
        assert!(hits[0].chunk.text.starts_with("Course: HS 103"));
        assert!(hits[0].chunk.due_at.is_some());
    }

    #[tokio::test]
    async fn test_reingesting_unchanged_item_is_a_noop() {
        let index = Arc::new(InMemoryIndex::new());
        let ingestor = make_ingestor(index.clone());
        let course = Course::new("c1", "HS 103");
        let items = vec![make_item("item-1", "Read chapter four before class.")];

        ingestor.ingest_course(&course, &items).await.unwrap();
        let count_before = index.chunk_count().await;
        let first_hash = index.source_hash("item-1").await.unwrap();

        let report = ingestor.ingest_course(&course, &items).await.unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.succeeded, 0);
        assert_eq!(index.chunk_count().await, count_before);
        assert_eq!(index.source_hash("item-1").await.unwrap(), first_hash);
    }

    #[tokio::test]
    async fn test_changed_content_replaces_prior_chunks() {
        let index = Arc::new(InMemoryIndex::new());
        let ingestor = make_ingestor(index.clone());
        let course = Course::new("c1", "HS 103");

        ingestor
            .ingest_course(&course, &[make_item("item-1", "Old instructions.")])
            .await
            .unwrap();
        let old_hash = index.source_hash("item-1").await.unwrap();

        ingestor
            .ingest_course(&course, &[make_item("item-1", "New instructions with details.")])
            .await
            .unwrap();
        let new_hash = index.source_hash("item-1").await.unwrap();

        assert_ne!(old_hash, new_hash);
        assert_eq!(index.chunk_count().await, 1);
    }

    struct FlakyEmbedder {
        inner: HashEmbedder,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, text: &str) -> coursemate_common::errors::Result<Vec<f32>> {
            if text.contains("poison") {
                return Err(AppError::Embedding {
                    message: "synthetic failure".into(),
                });
            }
            self.inner.embed(text).await
        }

        async fn embed_batch(
            &self,
            _texts: &[String],
        ) -> coursemate_common::errors::Result<Vec<Vec<f32>>> {
            Err(AppError::Embedding {
                message: "batch endpoint down".into(),
            })
        }

        fn model_name(&self) -> &str {
            "flaky"
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_skips_chunk_but_continues() {
        let index = Arc::new(InMemoryIndex::new());
        let ingestor = Ingestor::new(
            index.clone(),
            Arc::new(FlakyEmbedder {
                inner: HashEmbedder::new(64),
            }),
            ChunkingConfig::default(),
        );
        let course = Course::new("c1", "HS 103");
        let items = vec![
            make_item("good", "Normal announcement about the reading."),
            make_item("bad", "This body contains poison and cannot embed."),
        ];

        let report = ingestor.ingest_course(&course, &items).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(index.chunk_count().await, 1);
    }
}
