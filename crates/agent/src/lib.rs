//! CourseMate Agent
//!
//! The query-time half of the pipeline:
//! - Language model client with output repair and bounded retries
//! - Response generator with per-intent instruction templates and
//!   degraded fallbacks
//! - Exhaustive action executor over the fixed action catalog
//! - The per-query pipeline (analyze, plan, execute, trace)
//! - The agent integrator: readiness lifecycle, routing, and the
//!   application-facing chat/study-plan/search/digest surface

pub mod deadlines;
pub mod executor;
pub mod generator;
pub mod integrator;
pub mod llm;
pub mod pipeline;

pub use executor::{ActionExecutor, ExecutionOutcome};
pub use generator::{GeneratedResponse, ResponseGenerator, ResponseKind};
pub use integrator::{
    AgentIntegrator, AgentState, ChatRequest, ChatResponse, DeadlineDigestItem, SearchResultItem,
    StudyPlanRequest, StudyPlanResponse, WebHit, WebSearchProvider,
};
pub use llm::{create_language_model, GenerationOptions, HttpLanguageModel, LanguageModel};
pub use pipeline::{PipelineOutcome, QueryPipeline};
