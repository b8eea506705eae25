//! Retrieval engine with composite re-ranking
//!
//! Retrieval runs in two phases: an oversampled nearest-neighbor query
//! against the vector index, then a re-rank by composite score combining
//! semantic similarity (primary), due-date proximity for deadline-flavored
//! queries, and course match. Ties resolve by ascending chunk id so results
//! are deterministic.

use crate::index::{ChunkFilter, IndexHit, VectorIndex};
use chrono::{DateTime, Utc};
use coursemate_common::config::RetrievalConfig;
use coursemate_common::embeddings::Embedder;
use coursemate_common::errors::Result;
use coursemate_common::model::{ContentChunk, ContentType};
use coursemate_common::DEFAULT_MAX_RESULTS;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Weights of the composite ranking score
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RankWeights {
    pub semantic: f32,
    pub recency: f32,
    pub course: f32,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            semantic: 0.7,
            recency: 0.2,
            course: 0.1,
        }
    }
}

impl From<&RetrievalConfig> for RankWeights {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            semantic: config.semantic_weight,
            recency: config.recency_weight,
            course: config.course_weight,
        }
    }
}

/// One retrieval action's parameters
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalRequest {
    /// Sub-query text to embed and search with
    pub query: String,

    /// Hard course filter applied at the index
    pub course_id: Option<String>,

    /// Restrict to one kind of content
    pub content_type: Option<ContentType>,

    /// Course the analyzer believes the query is about; used for the
    /// course-match boost when no hard filter is set
    pub target_course_id: Option<String>,

    /// Whether due-date proximity should boost ranking
    pub deadline_sensitive: bool,

    /// Result cap (K)
    pub limit: usize,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            course_id: None,
            content_type: None,
            target_course_id: None,
            deadline_sensitive: false,
            limit: DEFAULT_MAX_RESULTS,
        }
    }
}

/// A ranked retrieval candidate
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub chunk: ContentChunk,

    /// Raw cosine similarity from the index
    pub similarity: f32,

    /// Composite rank score
    pub score: f32,
}

/// Retrieval engine over a vector index
pub struct RetrievalEngine {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    weights: RankWeights,
    oversample: usize,
}

impl RetrievalEngine {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        weights: RankWeights,
    ) -> Self {
        Self {
            index,
            embedder,
            weights,
            oversample: 4,
        }
    }

    pub fn with_oversample(mut self, oversample: usize) -> Self {
        self.oversample = oversample.max(1);
        self
    }

    /// Execute one retrieval action. An empty result is a valid
    /// "no relevant content" outcome, not a failure.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<RetrievalResult>> {
        if request.query.trim().is_empty() || request.limit == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(&request.query).await?;

        let filter = ChunkFilter {
            course_id: request.course_id.clone(),
            content_type: request.content_type,
        };
        let filter = (filter != ChunkFilter::default()).then_some(filter);

        let hits = self
            .index
            .query(&embedding, request.limit * self.oversample, filter.as_ref())
            .await?;

        debug!(
            query = %request.query,
            candidates = hits.len(),
            limit = request.limit,
            "retrieval candidates ranked"
        );

        Ok(self.rank(hits, request, Utc::now()))
    }

    /// Composite re-rank; separated from `retrieve` so ranking is testable
    /// with a fixed clock.
    fn rank(
        &self,
        hits: Vec<IndexHit>,
        request: &RetrievalRequest,
        now: DateTime<Utc>,
    ) -> Vec<RetrievalResult> {
        let mut results: Vec<RetrievalResult> = hits
            .into_iter()
            .map(|hit| {
                let recency = due_date_boost(&hit.chunk, request.deadline_sensitive, now);
                let course = course_boost(&hit.chunk, request.target_course_id.as_deref());
                let score = self.weights.semantic * hit.similarity
                    + self.weights.recency * recency
                    + self.weights.course * course;
                RetrievalResult {
                    similarity: hit.similarity,
                    score,
                    chunk: hit.chunk,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        results.truncate(request.limit);
        results
    }
}

/// Boost for chunks with a near due date; only deadline-flavored queries
/// care about urgency.
fn due_date_boost(chunk: &ContentChunk, deadline_sensitive: bool, now: DateTime<Utc>) -> f32 {
    if !deadline_sensitive {
        return 0.0;
    }
    match chunk.due_at {
        None => 0.0,
        Some(due) => {
            let days = (due - now).num_days();
            if days < 0 {
                0.0
            } else if days <= 2 {
                1.0
            } else if days <= 7 {
                0.7
            } else if days <= 30 {
                0.4
            } else {
                0.15
            }
        }
    }
}

fn course_boost(chunk: &ContentChunk, target_course_id: Option<&str>) -> f32 {
    match target_course_id {
        Some(target) if chunk.course_id == target => 1.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;
    use chrono::Duration;
    use coursemate_common::embeddings::HashEmbedder;

    fn make_chunk(id: &str, course_id: &str, due_in_days: Option<i64>) -> ContentChunk {
        let now = Utc::now();
        ContentChunk {
            id: id.to_string(),
            source_id: id.to_string(),
            course_id: course_id.to_string(),
            course_name: course_id.to_uppercase(),
            content_type: ContentType::Assignment,
            title: "Item".to_string(),
            text: "text".to_string(),
            created_at: now,
            due_at: due_in_days.map(|d| now + Duration::days(d)),
            embedding: vec![1.0, 0.0],
        }
    }

    fn hit(chunk: ContentChunk, similarity: f32) -> IndexHit {
        IndexHit { chunk, similarity }
    }

    fn engine() -> RetrievalEngine {
        RetrievalEngine::new(
            Arc::new(InMemoryIndex::new()),
            Arc::new(HashEmbedder::new(64)),
            RankWeights::default(),
        )
    }

    #[test]
    fn test_rank_caps_and_orders_descending() {
        let engine = engine();
        let request = RetrievalRequest {
            limit: 2,
            ..RetrievalRequest::new("q")
        };

        let hits = vec![
            hit(make_chunk("a", "c1", None), 0.2),
            hit(make_chunk("b", "c1", None), 0.9),
            hit(make_chunk("c", "c1", None), 0.5),
        ];
        let ranked = engine.rank(hits, &request, Utc::now());

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].chunk.id, "b");
        assert_eq!(ranked[1].chunk.id, "c");
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[test]
    fn test_rank_breaks_ties_by_ascending_id() {
        let engine = engine();
        let request = RetrievalRequest::new("q");

        let hits = vec![
            hit(make_chunk("z", "c1", None), 0.8),
            hit(make_chunk("a", "c1", None), 0.8),
        ];
        let ranked = engine.rank(hits, &request, Utc::now());

        assert_eq!(ranked[0].chunk.id, "a");
        assert_eq!(ranked[1].chunk.id, "z");
    }

    #[test]
    fn test_due_date_boost_reorders_deadline_queries() {
        let engine = engine();
        let request = RetrievalRequest {
            deadline_sensitive: true,
            ..RetrievalRequest::new("what is due")
        };

        // Slightly less similar, but due tomorrow
        let hits = vec![
            hit(make_chunk("due-soon", "c1", Some(1)), 0.60),
            hit(make_chunk("no-date", "c1", None), 0.70),
        ];
        let ranked = engine.rank(hits, &request, Utc::now());
        assert_eq!(ranked[0].chunk.id, "due-soon");

        // Without the deadline flag similarity wins
        let request = RetrievalRequest::new("what is due");
        let hits = vec![
            hit(make_chunk("due-soon", "c1", Some(1)), 0.60),
            hit(make_chunk("no-date", "c1", None), 0.70),
        ];
        let ranked = engine.rank(hits, &request, Utc::now());
        assert_eq!(ranked[0].chunk.id, "no-date");
    }

    #[test]
    fn test_course_match_boost() {
        let engine = engine();
        let request = RetrievalRequest {
            target_course_id: Some("c1".to_string()),
            ..RetrievalRequest::new("q")
        };

        let hits = vec![
            hit(make_chunk("other", "c2", None), 0.72),
            hit(make_chunk("match", "c1", None), 0.70),
        ];
        let ranked = engine.rank(hits, &request, Utc::now());
        assert_eq!(ranked[0].chunk.id, "match");
    }

    #[tokio::test]
    async fn test_retrieve_recall_ranks_matching_chunk_first() {
        let index = Arc::new(InMemoryIndex::new());
        let embedder = Arc::new(HashEmbedder::new(384));

        for (source, text) in [
            ("hs103-pres", "HS 103 Group Presentation due Sept 20"),
            ("chem-lab", "CHEM 101 lab report on titration results"),
            ("hist-essay", "HIST 201 essay on Renaissance art movements"),
        ] {
            let embedding = embedder.embed(text).await.unwrap();
            let mut chunk = make_chunk(source, "c1", None);
            chunk.text = text.to_string();
            chunk.embedding = embedding;
            index.upsert_source(source, "h", vec![chunk]).await.unwrap();
        }

        let engine = RetrievalEngine::new(index, embedder, RankWeights::default());
        let results = engine
            .retrieve(&RetrievalRequest::new("when is my HS 103 presentation due"))
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].chunk.source_id, "hs103-pres");
        assert!(results.len() <= DEFAULT_MAX_RESULTS);
    }

    #[tokio::test]
    async fn test_retrieve_empty_index_is_not_an_error() {
        let engine = engine();
        let results = engine
            .retrieve(&RetrievalRequest::new("anything"))
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
