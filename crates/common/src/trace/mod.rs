//! Per-query reasoning trace
//!
//! Every pipeline stage appends a step describing what it did, what came
//! out of it, and how long it took. Recording is unconditional; whether the
//! trace is disclosed to the caller is decided at response time. The trace
//! is always a per-query accumulator threaded through the pipeline, never
//! shared state, so concurrent queries stay isolated.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Stage a reasoning step belongs to
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraceStage {
    Routing,
    QueryAnalysis,
    ActionPlanning,
    QueryRefinement,
    KnowledgeSearch,
    DataRetrieval,
    DeadlineAnalysis,
    UrgencyAssessment,
    InformationExtraction,
    OutlineDrafting,
    ContextSynthesis,
    AnswerGeneration,
}

impl TraceStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceStage::Routing => "routing",
            TraceStage::QueryAnalysis => "query_analysis",
            TraceStage::ActionPlanning => "action_planning",
            TraceStage::QueryRefinement => "query_refinement",
            TraceStage::KnowledgeSearch => "knowledge_search",
            TraceStage::DataRetrieval => "data_retrieval",
            TraceStage::DeadlineAnalysis => "deadline_analysis",
            TraceStage::UrgencyAssessment => "urgency_assessment",
            TraceStage::InformationExtraction => "information_extraction",
            TraceStage::OutlineDrafting => "outline_drafting",
            TraceStage::ContextSynthesis => "context_synthesis",
            TraceStage::AnswerGeneration => "answer_generation",
        }
    }
}

impl fmt::Display for TraceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded step
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningStep {
    /// 1-based position in the trace, contiguous per query
    pub index: usize,

    /// Stage that produced this step
    pub stage: TraceStage,

    /// What the stage set out to do
    pub description: String,

    /// Short summary of the stage result
    pub result_summary: String,

    /// Measured execution time
    pub duration_ms: u64,
}

/// Ordered record of the stages executed for one query
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningTrace {
    pub id: Uuid,
    pub query: String,
    pub started_at: DateTime<Utc>,
    steps: Vec<ReasoningStep>,
}

impl ReasoningTrace {
    pub fn new(query: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.to_string(),
            started_at: Utc::now(),
            steps: Vec::new(),
        }
    }

    /// Append a step; indices are assigned in completion order starting at 1
    pub fn record(
        &mut self,
        stage: TraceStage,
        description: impl Into<String>,
        result_summary: impl Into<String>,
        elapsed: Duration,
    ) {
        let index = self.steps.len() + 1;
        self.steps.push(ReasoningStep {
            index,
            stage,
            description: description.into(),
            result_summary: result_summary.into(),
            duration_ms: elapsed.as_millis() as u64,
        });
    }

    pub fn steps(&self) -> &[ReasoningStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.duration_ms).sum()
    }

    /// Plain-text rendering for disclosure alongside an answer
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str("REASONING TRACE\n");
        out.push_str(&format!("Query: \"{}\"\n", self.query));
        for step in &self.steps {
            out.push_str(&format!(
                "  {}. [{}] {} -> {} ({} ms)\n",
                step.index, step.stage, step.description, step.result_summary, step.duration_ms
            ));
        }
        out.push_str(&format!(
            "{} steps in {} ms\n",
            self.steps.len(),
            self.total_duration_ms()
        ));
        out
    }

    /// Markdown rendering, used by hosts that display formatted traces
    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("## Reasoning trace\n\n");
        out.push_str(&format!("Query: `{}`\n\n", self.query));
        for step in &self.steps {
            out.push_str(&format!(
                "{}. **{}** - {} ({} ms)\n   - {}\n",
                step.index, step.stage, step.description, step.duration_ms, step.result_summary
            ));
        }
        out.push_str(&format!(
            "\n_{} steps in {} ms_\n",
            self.steps.len(),
            self.total_duration_ms()
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_indices_are_contiguous() {
        let mut trace = ReasoningTrace::new("what is due this week");
        for stage in [
            TraceStage::QueryAnalysis,
            TraceStage::ActionPlanning,
            TraceStage::KnowledgeSearch,
            TraceStage::AnswerGeneration,
        ] {
            trace.record(stage, "step", "done", Duration::from_millis(3));
        }

        let indices: Vec<usize> = trace.steps().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
        assert_eq!(trace.len(), 4);
    }

    #[test]
    fn test_render_text_lists_every_step() {
        let mut trace = ReasoningTrace::new("q");
        trace.record(TraceStage::QueryAnalysis, "Analyzing query", "intent informational", Duration::from_millis(1));
        trace.record(TraceStage::KnowledgeSearch, "Searching index", "3 results", Duration::from_millis(2));

        let text = trace.render_text();
        assert!(text.contains("1. [query_analysis]"));
        assert!(text.contains("2. [knowledge_search]"));
        assert!(text.contains("2 steps"));
    }

    #[test]
    fn test_traces_are_isolated_per_query() {
        let mut a = ReasoningTrace::new("a");
        let mut b = ReasoningTrace::new("b");
        a.record(TraceStage::QueryAnalysis, "x", "y", Duration::ZERO);
        b.record(TraceStage::QueryAnalysis, "x", "y", Duration::ZERO);
        b.record(TraceStage::ActionPlanning, "x", "y", Duration::ZERO);

        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 2);
        assert_ne!(a.id, b.id);
    }
}
