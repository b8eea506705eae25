//! Agent integrator
//!
//! Owns the readiness lifecycle for the content-aware pipeline and routes
//! every query: content-aware when ready, generic fallback otherwise, and
//! fallback again when a content-aware query retrieves nothing. Exposes the
//! application-facing chat, study-plan, course, search, and deadline-digest
//! surfaces.

use crate::deadlines::{classify_priority, keyword_priority, time_until, Priority};
use crate::executor::ActionExecutor;
use crate::generator::{ResponseGenerator, ResponseKind, GENERIC_APOLOGY};
use crate::llm::{GenerationOptions, LanguageModel};
use crate::pipeline::QueryPipeline;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use coursemate_common::classroom::ClassroomProvider;
use coursemate_common::config::AppConfig;
use coursemate_common::embeddings::Embedder;
use coursemate_common::errors::{AppError, Result};
use coursemate_common::model::{ContentType, Course};
use coursemate_common::retry::RetryPolicy;
use coursemate_common::trace::{ReasoningTrace, TraceStage};
use coursemate_context::analyzer::{QueryAnalyzer, Timeframe};
use coursemate_context::synthesizer::{ContextSynthesizer, SynthesizedContext};
use coursemate_ingestion::ingestor::{IngestReport, Ingestor};
use coursemate_search::index::VectorIndex;
use coursemate_search::retrieval::{RankWeights, RetrievalEngine, RetrievalRequest};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// How many courses ingest concurrently during initialization. Ingestion
/// for a single course stays serialized inside the ingestor.
const INGEST_CONCURRENCY: usize = 4;

/// Reply when the content pipeline retrieved nothing relevant
const NO_CONTENT_REPLY: &str = "I couldn't find relevant information in your classroom content \
for that question. Try being more specific, or check that the content has been posted.";

/// Reply body for a study plan with no supporting content
const NO_PLAN_CONTENT: &str = "No assignments, deadlines or announcements were found to build a \
study plan from. Try a different course, or check that content has been posted.";

/// Readiness lifecycle of the content-aware path
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentState::Uninitialized => "uninitialized",
            AgentState::Initializing => "initializing",
            AgentState::Ready => "ready",
            AgentState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Chat request from the host application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub show_reasoning: bool,
}

/// Chat reply to the host application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub has_reasoning: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub course_context: Vec<String>,
}

/// Study plan request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyPlanRequest {
    pub course: Option<String>,
    pub timeframe: Timeframe,
    #[serde(default)]
    pub show_reasoning: bool,
}

/// Study plan reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyPlanResponse {
    pub study_plan: String,
    pub has_reasoning: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// One direct-search result surfaced to the host
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub content: String,
    pub course: String,
    pub content_type: ContentType,
    /// Relevance percentage (0-100)
    pub relevance: u8,
}

/// One deadline-digest entry
#[derive(Debug, Clone, Serialize)]
pub struct DeadlineDigestItem {
    pub title: String,
    pub description: String,
    pub course: String,
    pub due_at: DateTime<Utc>,
    pub priority: Priority,
    pub time_until: String,
}

/// Optional web search collaborator used by the fallback route
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebHit>>;
}

/// A single web search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// Integrates the content-aware pipeline with generic fallbacks
pub struct AgentIntegrator {
    state: RwLock<AgentState>,
    courses: RwLock<Vec<Course>>,
    classroom: Arc<dyn ClassroomProvider>,
    web_search: Option<Arc<dyn WebSearchProvider>>,
    index: Arc<dyn VectorIndex>,
    ingestor: Arc<Ingestor>,
    retrieval: Arc<RetrievalEngine>,
    generator: Arc<ResponseGenerator>,
    pipeline: QueryPipeline,
    max_results: usize,
}

impl AgentIntegrator {
    /// Wire the full pipeline from its collaborators and configuration
    pub fn new(
        classroom: Arc<dyn ClassroomProvider>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        config: &AppConfig,
    ) -> Self {
        let retrieval = Arc::new(
            RetrievalEngine::new(
                index.clone(),
                embedder.clone(),
                RankWeights::from(&config.retrieval),
            )
            .with_oversample(config.retrieval.oversample),
        );
        let ingestor = Arc::new(Ingestor::new(
            index.clone(),
            embedder,
            config.chunking.clone(),
        ));
        let generator = Arc::new(ResponseGenerator::new(
            model,
            RetryPolicy::with_max_attempts(config.generation.max_retries),
            GenerationOptions::from(&config.generation),
        ));
        let executor = ActionExecutor::new(
            retrieval.clone(),
            index.clone(),
            ContextSynthesizer::new(config.synthesis.clone()),
            generator.clone(),
            classroom.clone(),
            config.retrieval.max_results,
        );
        let pipeline = QueryPipeline::new(QueryAnalyzer::new(&config.analyzer), executor);

        Self {
            state: RwLock::new(AgentState::Uninitialized),
            courses: RwLock::new(Vec::new()),
            classroom,
            web_search: None,
            index,
            ingestor,
            retrieval,
            generator,
            pipeline,
            max_results: config.retrieval.max_results,
        }
    }

    /// Attach a web search collaborator for the fallback route
    pub fn with_web_search(mut self, provider: Arc<dyn WebSearchProvider>) -> Self {
        self.web_search = Some(provider);
        self
    }

    pub async fn state(&self) -> AgentState {
        *self.state.read().await
    }

    /// Fetch courses and ingest their content. Per-course failures are
    /// tolerated; the agent reaches `Ready` as long as the course list
    /// itself was available and not every course failed.
    pub async fn initialize(&self) -> Result<IngestReport> {
        *self.state.write().await = AgentState::Initializing;

        let courses = match self.classroom.list_courses().await {
            Ok(courses) => courses,
            Err(err) => {
                error!(error = %err, "classroom provider unavailable, agent failed to initialize");
                *self.state.write().await = AgentState::Failed;
                return Err(err);
            }
        };
        *self.courses.write().await = courses.clone();

        if courses.is_empty() {
            info!("no courses available, agent ready with an empty index");
            *self.state.write().await = AgentState::Ready;
            return Ok(IngestReport::default());
        }

        let total = courses.len();
        let outcomes: Vec<(String, Result<IngestReport>)> = stream::iter(courses)
            .map(|course| {
                let classroom = self.classroom.clone();
                let ingestor = self.ingestor.clone();
                async move {
                    let name = course.name.clone();
                    let outcome = async {
                        let items = classroom.course_items(&course.id).await?;
                        ingestor.ingest_course(&course, &items).await
                    }
                    .await;
                    (name, outcome)
                }
            })
            .buffer_unordered(INGEST_CONCURRENCY)
            .collect()
            .await;

        let mut report = IngestReport::default();
        let mut failed_courses = 0usize;
        for (course, outcome) in outcomes {
            match outcome {
                Ok(course_report) => report.absorb(course_report),
                Err(err) => {
                    warn!(course = %course, error = %err, "course ingestion failed");
                    failed_courses += 1;
                }
            }
        }

        let state = if failed_courses == total {
            AgentState::Failed
        } else {
            AgentState::Ready
        };
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            unchanged = report.unchanged,
            failed_courses,
            %state,
            "initialization complete"
        );
        *self.state.write().await = state;
        Ok(report)
    }

    /// Answer a chat message, routing by readiness and retrieval outcome
    pub async fn chat(&self, request: &ChatRequest) -> ChatResponse {
        let state = self.state().await;
        if state != AgentState::Ready {
            let mut trace = ReasoningTrace::new(&request.message);
            let started = Instant::now();
            trace.record(
                TraceStage::Routing,
                "Selecting pipeline",
                format!("generic fallback, agent state {state}"),
                started.elapsed(),
            );
            return self.fallback_chat(request, trace).await;
        }

        let courses = self.courses.read().await.clone();
        match self.pipeline.run(&request.message, &courses, None).await {
            Ok(outcome) => {
                let reply = match outcome.reply {
                    Some(reply) if outcome.retrieved_total > 0 => reply,
                    _ => {
                        let mut trace = outcome.trace;
                        let started = Instant::now();
                        trace.record(
                            TraceStage::Routing,
                            "Selecting pipeline",
                            "fallback, no relevant classroom content",
                            started.elapsed(),
                        );
                        return self.no_content_chat(request, trace).await;
                    }
                };

                ChatResponse {
                    reply,
                    has_reasoning: request.show_reasoning,
                    reasoning: request.show_reasoning.then(|| outcome.trace.render_text()),
                    course_context: outcome.course_context,
                }
            }
            Err(err) => {
                // Unexpected internal failure: log it, apologize, never
                // surface the raw error to the student.
                error!(error = %err, code = ?err.code(), "query pipeline failed");
                ChatResponse {
                    reply: GENERIC_APOLOGY.to_string(),
                    has_reasoning: false,
                    reasoning: None,
                    course_context: Vec::new(),
                }
            }
        }
    }

    /// Generic fallback when the content-aware path is unavailable
    async fn fallback_chat(&self, request: &ChatRequest, mut trace: ReasoningTrace) -> ChatResponse {
        let context = self.web_context(&request.message, &mut trace).await;
        let generated = self
            .generator
            .respond(&ResponseKind::Generic, &request.message, &context)
            .await;

        ChatResponse {
            reply: generated.text,
            has_reasoning: request.show_reasoning,
            reasoning: request.show_reasoning.then(|| trace.render_text()),
            course_context: Vec::new(),
        }
    }

    /// Fallback when the content pipeline ran but retrieved nothing
    async fn no_content_chat(&self, request: &ChatRequest, mut trace: ReasoningTrace) -> ChatResponse {
        let mut reply = NO_CONTENT_REPLY.to_string();

        let context = self.web_context(&request.message, &mut trace).await;
        if !context.is_empty() {
            reply.push_str("\n\nAdditional information from the web:\n");
            reply.push_str(&context.text);
        }

        ChatResponse {
            reply,
            has_reasoning: request.show_reasoning,
            reasoning: request.show_reasoning.then(|| trace.render_text()),
            course_context: Vec::new(),
        }
    }

    /// Web results formatted as fallback context, when a provider is wired
    async fn web_context(&self, query: &str, trace: &mut ReasoningTrace) -> SynthesizedContext {
        let Some(web_search) = &self.web_search else {
            return SynthesizedContext::default();
        };

        let started = Instant::now();
        match web_search.search(query, 2).await {
            Ok(hits) => {
                let text = hits
                    .iter()
                    .enumerate()
                    .map(|(i, hit)| {
                        format!("{}. {}\n   {}\n   Source: {}", i + 1, hit.title, hit.snippet, hit.url)
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                trace.record(
                    TraceStage::DataRetrieval,
                    "Searching the web",
                    format!("{} results", hits.len()),
                    started.elapsed(),
                );
                SynthesizedContext {
                    text,
                    course_names: Vec::new(),
                    included: hits.len(),
                    dropped: 0,
                }
            }
            Err(err) => {
                warn!(error = %err, "web search failed");
                trace.record(
                    TraceStage::DataRetrieval,
                    "Searching the web",
                    "unavailable",
                    started.elapsed(),
                );
                SynthesizedContext::default()
            }
        }
    }

    /// Generate a study plan from classroom content
    pub async fn study_plan(&self, request: &StudyPlanRequest) -> Result<StudyPlanResponse> {
        let state = self.state().await;
        if state != AgentState::Ready {
            return Err(AppError::NotReady {
                state: state.to_string(),
            });
        }

        let courses = self.courses.read().await.clone();
        let course = match &request.course {
            Some(name) => Some(resolve_course(name, &courses).ok_or_else(|| {
                AppError::CourseNotFound { name: name.clone() }
            })?),
            None => None,
        };

        let query = match &course {
            Some(course) => format!(
                "Create a {} study plan for {} based on my assignments, deadlines, and announcements",
                request.timeframe, course.name
            ),
            None => format!(
                "Create a {} study plan across all courses based on my assignments, deadlines, and announcements",
                request.timeframe
            ),
        };

        let outcome = self
            .pipeline
            .run(&query, &courses, Some(request.timeframe))
            .await?;

        let study_plan = outcome.reply.unwrap_or_else(|| NO_PLAN_CONTENT.to_string());
        Ok(StudyPlanResponse {
            study_plan,
            has_reasoning: request.show_reasoning,
            reasoning: request.show_reasoning.then(|| outcome.trace.render_text()),
        })
    }

    /// Course listing passthrough: live when possible, cached otherwise
    pub async fn courses(&self) -> Result<Vec<Course>> {
        match self.classroom.list_courses().await {
            Ok(courses) => {
                *self.courses.write().await = courses.clone();
                Ok(courses)
            }
            Err(err) => {
                let cached = self.courses.read().await.clone();
                if cached.is_empty() {
                    Err(err)
                } else {
                    warn!(error = %err, "course listing unavailable, serving cached courses");
                    Ok(cached)
                }
            }
        }
    }

    /// Direct ranked content search without generation
    pub async fn search(&self, query: &str, course: Option<&str>) -> Result<Vec<SearchResultItem>> {
        let courses = self.courses.read().await.clone();
        let course_id = match course {
            Some(name) => Some(
                resolve_course(name, &courses)
                    .ok_or_else(|| AppError::CourseNotFound { name: name.to_string() })?
                    .id,
            ),
            None => None,
        };

        let request = RetrievalRequest {
            course_id,
            limit: self.max_results,
            ..RetrievalRequest::new(query)
        };
        let results = self.retrieval.retrieve(&request).await?;

        Ok(results
            .into_iter()
            .map(|result| SearchResultItem {
                relevance: (result.similarity.clamp(0.0, 1.0) * 100.0).round() as u8,
                content: result.chunk.text,
                course: result.chunk.course_name,
                content_type: result.chunk.content_type,
            })
            .collect())
    }

    /// Upcoming dated work across all courses, prioritized and capped
    pub async fn deadline_digest(&self) -> Result<Vec<DeadlineDigestItem>> {
        let now = Utc::now();
        let chunks = self
            .index
            .due_between(now - ChronoDuration::days(1), now + ChronoDuration::days(30), None)
            .await?;

        let mut items: Vec<DeadlineDigestItem> = chunks
            .into_iter()
            .filter_map(|chunk| {
                let due_at = chunk.due_at?;
                let by_date = classify_priority(due_at, now);
                // A keyword signal can only raise the priority, not lower it.
                let priority = keyword_priority(&chunk.text)
                    .map(|by_keyword| by_keyword.min(by_date))
                    .unwrap_or(by_date);
                Some(DeadlineDigestItem {
                    title: if chunk.title.is_empty() {
                        format!("{} update", chunk.course_name)
                    } else {
                        chunk.title.clone()
                    },
                    description: truncate(&chunk.text, 120),
                    course: chunk.course_name,
                    due_at,
                    priority,
                    time_until: time_until(due_at, now),
                })
            })
            .collect();

        items.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.due_at.cmp(&b.due_at)));
        items.truncate(8);
        Ok(items)
    }
}

/// Case-insensitive course resolution by name containment
fn resolve_course(name: &str, courses: &[Course]) -> Option<Course> {
    let needle = name.trim().to_lowercase();
    courses
        .iter()
        .find(|c| c.name.to_lowercase() == needle)
        .or_else(|| courses.iter().find(|c| c.name.to_lowercase().contains(&needle)))
        .cloned()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
