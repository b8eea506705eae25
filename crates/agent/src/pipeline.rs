//! Per-query pipeline
//!
//! Strictly sequential: analyze, plan, execute. Each stage's output feeds
//! the next, and each records into the query's own trace. Dropping the
//! returned future between stages cancels cleanly because all mutable
//! state lives inside the call.

use crate::executor::{ActionExecutor, ExecutionOutcome};
use coursemate_common::errors::Result;
use coursemate_common::model::Course;
use coursemate_common::trace::{ReasoningTrace, TraceStage};
use coursemate_context::analyzer::{QueryAnalyzer, Timeframe};
use coursemate_context::planner;
use std::time::Instant;

/// Outcome of one content-aware query
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Final response text; absent when retrieval came back empty
    pub reply: Option<String>,

    /// Whether the reply came from the degraded generation path
    pub degraded: bool,

    /// Course names that contributed content
    pub course_context: Vec<String>,

    /// Total retrieval results across the plan
    pub retrieved_total: usize,

    /// Full reasoning trace for the query
    pub trace: ReasoningTrace,
}

/// The content-aware query pipeline
pub struct QueryPipeline {
    analyzer: QueryAnalyzer,
    executor: ActionExecutor,
}

impl QueryPipeline {
    pub fn new(analyzer: QueryAnalyzer, executor: ActionExecutor) -> Self {
        Self { analyzer, executor }
    }

    /// Run one query end to end. `timeframe` overrides whatever the
    /// analyzer detected (used by the study-plan surface).
    pub async fn run(
        &self,
        query: &str,
        courses: &[Course],
        timeframe: Option<Timeframe>,
    ) -> Result<PipelineOutcome> {
        let mut trace = ReasoningTrace::new(query);

        let started = Instant::now();
        let mut analysis = self.analyzer.analyze(query, courses);
        if let Some(timeframe) = timeframe {
            analysis.timeframe = Some(timeframe);
        }
        let course_note = analysis
            .target_course
            .as_ref()
            .map(|c| format!(", course \"{}\"", c.name))
            .unwrap_or_default();
        trace.record(
            TraceStage::QueryAnalysis,
            "Classifying intent and extracting entities",
            format!(
                "intent {} (confidence {:.2}){}",
                analysis.intent, analysis.confidence, course_note
            ),
            started.elapsed(),
        );

        let started = Instant::now();
        let plan = planner::plan(&analysis);
        let action_names: Vec<&str> = plan.actions().iter().map(|a| a.name()).collect();
        trace.record(
            TraceStage::ActionPlanning,
            format!("Planning {} actions", plan.len()),
            action_names.join(" -> "),
            started.elapsed(),
        );

        let ExecutionOutcome {
            response,
            degraded,
            course_context,
            retrieved_total,
        } = self.executor.execute(&analysis, &plan, &mut trace).await?;

        Ok(PipelineOutcome {
            reply: response,
            degraded,
            course_context,
            retrieved_total,
            trace,
        })
    }
}
