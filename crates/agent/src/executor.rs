//! Action executor
//!
//! Runs an action plan sequentially, one exhaustive `match` over the fixed
//! catalog. Every action records a reasoning step with its result summary
//! and measured duration. State accumulated across actions (retrieved
//! chunks, findings, the synthesized context) is local to the call, so
//! concurrent queries never share anything.

use crate::deadlines::{
    classify_priority, entries_from_chunks, time_until, DeadlineEntry, Priority,
};
use crate::generator::{ResponseGenerator, ResponseKind};
use chrono::{Duration as ChronoDuration, Utc};
use coursemate_common::classroom::ClassroomProvider;
use coursemate_common::errors::Result;
use coursemate_common::model::ContentType;
use coursemate_common::trace::{ReasoningTrace, TraceStage};
use coursemate_context::analyzer::{QueryAnalysis, Timeframe};
use coursemate_context::planner::{Action, ActionPlan};
use coursemate_context::synthesizer::{ActionFinding, ContextSynthesizer, SynthesizedContext};
use coursemate_search::index::{ChunkFilter, VectorIndex};
use coursemate_search::retrieval::{RetrievalEngine, RetrievalRequest, RetrievalResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Result of executing a full plan
#[derive(Debug)]
pub struct ExecutionOutcome {
    /// Final response text, absent when nothing was retrieved to ground it
    pub response: Option<String>,

    /// Whether the response came from the degraded generation path
    pub degraded: bool,

    /// Course names that contributed to the response
    pub course_context: Vec<String>,

    /// Total retrieval results across all retrieval actions
    pub retrieved_total: usize,
}

#[derive(Default)]
struct ExecutionState {
    refined_query: Option<String>,
    retrieved: Vec<RetrievalResult>,
    findings: Vec<ActionFinding>,
    deadlines: Vec<DeadlineEntry>,
    context: Option<SynthesizedContext>,
    response: Option<String>,
    degraded: bool,
}

/// Executes actions against the retrieval engine, index, synthesizer, and
/// generator
pub struct ActionExecutor {
    retrieval: Arc<RetrievalEngine>,
    index: Arc<dyn VectorIndex>,
    synthesizer: ContextSynthesizer,
    generator: Arc<ResponseGenerator>,
    classroom: Arc<dyn ClassroomProvider>,
    max_results: usize,
}

impl ActionExecutor {
    pub fn new(
        retrieval: Arc<RetrievalEngine>,
        index: Arc<dyn VectorIndex>,
        synthesizer: ContextSynthesizer,
        generator: Arc<ResponseGenerator>,
        classroom: Arc<dyn ClassroomProvider>,
        max_results: usize,
    ) -> Self {
        Self {
            retrieval,
            index,
            synthesizer,
            generator,
            classroom,
            max_results,
        }
    }

    /// Execute every action in order, recording one trace step per action
    pub async fn execute(
        &self,
        analysis: &QueryAnalysis,
        plan: &ActionPlan,
        trace: &mut ReasoningTrace,
    ) -> Result<ExecutionOutcome> {
        let mut state = ExecutionState::default();

        for action in plan.actions() {
            let started = Instant::now();
            let summary = self.execute_action(action, analysis, &mut state).await?;
            trace.record(stage_for(action), describe(action), summary, started.elapsed());
        }

        let course_context = match &state.context {
            Some(context) if !context.course_names.is_empty() => context.course_names.clone(),
            _ => {
                let mut names = Vec::new();
                for result in &state.retrieved {
                    if !names.contains(&result.chunk.course_name) {
                        names.push(result.chunk.course_name.clone());
                    }
                }
                names
            }
        };

        Ok(ExecutionOutcome {
            response: state.response,
            degraded: state.degraded,
            course_context,
            retrieved_total: state.retrieved.len(),
        })
    }

    async fn execute_action(
        &self,
        action: &Action,
        analysis: &QueryAnalysis,
        state: &mut ExecutionState,
    ) -> Result<String> {
        match action {
            Action::KnowledgeSearch { query, course_id } => {
                self.search(state, analysis, query, course_id.clone(), None).await
            }
            Action::AssignmentSearch { query, course_id } => {
                self.search(state, analysis, query, course_id.clone(), Some(ContentType::Assignment))
                    .await
            }
            Action::AnnouncementSearch { query, course_id } => {
                self.search(
                    state,
                    analysis,
                    query,
                    course_id.clone(),
                    Some(ContentType::Announcement),
                )
                .await
            }
            Action::MaterialSearch { query, course_id } => {
                self.search(state, analysis, query, course_id.clone(), Some(ContentType::Material))
                    .await
            }

            Action::UpcomingDeadlines {
                within_days,
                course_id,
            } => {
                let now = Utc::now();
                let filter = course_id.clone().map(ChunkFilter::course);
                let chunks = self
                    .index
                    .due_between(now, now + ChronoDuration::days(*within_days), filter.as_ref())
                    .await?;
                let count = chunks.len();
                merge_deadlines(&mut state.deadlines, entries_from_chunks(chunks.iter()));
                Ok(format!("{count} items due within {within_days} days"))
            }

            Action::DeadlineAnalysis { .. } => {
                merge_deadlines(
                    &mut state.deadlines,
                    entries_from_chunks(state.retrieved.iter().map(|r| &r.chunk)),
                );
                state.deadlines.sort_by_key(|e| e.due_at);

                let now = Utc::now();
                let body = if state.deadlines.is_empty() {
                    "No dated coursework found.".to_string()
                } else {
                    state
                        .deadlines
                        .iter()
                        .map(|e| {
                            format!(
                                "- {}: {} due {} ({})",
                                e.course,
                                e.title,
                                e.due_at.format("%Y-%m-%d"),
                                time_until(e.due_at, now)
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                state
                    .findings
                    .push(ActionFinding::new("Upcoming deadlines", body));
                Ok(format!("{} deadlines identified", state.deadlines.len()))
            }

            Action::UrgencyAssessment => {
                let now = Utc::now();
                let mut urgent = Vec::new();
                let mut important = Vec::new();
                let mut normal = Vec::new();
                for entry in &state.deadlines {
                    let line = format!("{}: {}", entry.course, entry.title);
                    match classify_priority(entry.due_at, now) {
                        Priority::Urgent => urgent.push(line),
                        Priority::Important => important.push(line),
                        Priority::Normal => normal.push(line),
                    }
                }

                let mut body = String::new();
                for (label, bucket) in [
                    ("Urgent (next 2 days)", &urgent),
                    ("Important (this week)", &important),
                    ("Later", &normal),
                ] {
                    if !bucket.is_empty() {
                        body.push_str(&format!("{label}:\n"));
                        for line in bucket {
                            body.push_str(&format!("- {line}\n"));
                        }
                    }
                }
                if !body.is_empty() {
                    state.findings.push(ActionFinding::new("Priorities", body));
                }
                Ok(format!(
                    "{} urgent, {} important, {} normal",
                    urgent.len(),
                    important.len(),
                    normal.len()
                ))
            }

            Action::InformationExtraction => {
                let details = extract_key_sentences(&state.retrieved, 5);
                let count = details.len();
                if count > 0 {
                    state
                        .findings
                        .push(ActionFinding::new("Key details", details.join("\n")));
                }
                Ok(format!("{count} key details extracted"))
            }

            Action::CourseListing => match self.classroom.list_courses().await {
                Ok(courses) => {
                    let body = courses
                        .iter()
                        .map(|c| format!("- {}", c.name))
                        .collect::<Vec<_>>()
                        .join("\n");
                    let count = courses.len();
                    if count > 0 {
                        state.findings.push(ActionFinding::new("Courses", body));
                    }
                    Ok(format!("{count} courses listed"))
                }
                Err(err) => {
                    // Auxiliary data; the plan carries on without it.
                    warn!(error = %err, "course listing failed");
                    Ok("course listing unavailable".to_string())
                }
            },

            Action::QueryRefinement => {
                let keywords = &analysis.entities.keywords;
                if keywords.is_empty() {
                    Ok("no refinement possible, keeping original query".to_string())
                } else {
                    let refined = keywords.join(" ");
                    let summary = format!("refined to \"{refined}\"");
                    state.refined_query = Some(refined);
                    Ok(summary)
                }
            }

            Action::ContextIntegration => {
                let context = self.synthesizer.synthesize(&state.retrieved, &state.findings);
                let summary = format!(
                    "{} chars from {} snippets, {} dropped",
                    context.text.len(),
                    context.included,
                    context.dropped
                );
                state.context = Some(context);
                Ok(summary)
            }

            Action::StudyOutline { timeframe } => {
                let finding = study_outline(&state.deadlines, *timeframe);
                let summary = format!("outline with {} dated tasks", state.deadlines.len());
                state.findings.push(finding);
                Ok(summary)
            }

            Action::ExamOutline => {
                let finding = exam_outline(&state.retrieved, &state.deadlines);
                state.findings.push(finding);
                Ok("exam topics outlined".to_string())
            }

            Action::DirectAnswer => {
                self.generate(state, analysis, ResponseKind::Answer).await
            }
            Action::StudyPlanGeneration { timeframe } => {
                self.generate(state, analysis, ResponseKind::StudyPlan(*timeframe))
                    .await
            }
            Action::ExamPrepGeneration => {
                self.generate(state, analysis, ResponseKind::ExamPrep).await
            }
        }
    }

    async fn search(
        &self,
        state: &mut ExecutionState,
        analysis: &QueryAnalysis,
        query: &str,
        course_id: Option<String>,
        content_type: Option<ContentType>,
    ) -> Result<String> {
        let request = RetrievalRequest {
            query: state
                .refined_query
                .clone()
                .unwrap_or_else(|| query.to_string()),
            course_id,
            content_type,
            target_course_id: analysis.target_course.as_ref().map(|c| c.id.clone()),
            deadline_sensitive: analysis.deadline_sensitive,
            limit: self.max_results,
        };

        let results = self.retrieval.retrieve(&request).await?;
        let count = results.len();
        merge_results(&mut state.retrieved, results);
        Ok(format!("{count} results"))
    }

    async fn generate(
        &self,
        state: &mut ExecutionState,
        analysis: &QueryAnalysis,
        kind: ResponseKind,
    ) -> Result<String> {
        // Nothing retrieved anywhere: leave the response empty so the
        // integrator can reroute to the fallback path instead of asking the
        // model to answer from thin air.
        if state.retrieved.is_empty() && state.deadlines.is_empty() {
            return Ok("skipped, no classroom content retrieved".to_string());
        }

        let context = match &state.context {
            Some(context) => context.clone(),
            None => self.synthesizer.synthesize(&state.retrieved, &state.findings),
        };

        let generated = self.generator.respond(&kind, &analysis.query, &context).await;
        let summary = format!(
            "{} chars{}",
            generated.text.len(),
            if generated.degraded { " (degraded)" } else { "" }
        );
        state.degraded = generated.degraded;
        state.response = Some(generated.text);
        Ok(summary)
    }
}

/// Merge new results, keeping the best score per chunk and overall ordering
fn merge_results(existing: &mut Vec<RetrievalResult>, incoming: Vec<RetrievalResult>) {
    for result in incoming {
        match existing.iter_mut().find(|r| r.chunk.id == result.chunk.id) {
            Some(found) => {
                if result.score > found.score {
                    *found = result;
                }
            }
            None => existing.push(result),
        }
    }
    existing.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
}

fn merge_deadlines(existing: &mut Vec<DeadlineEntry>, incoming: Vec<DeadlineEntry>) {
    for entry in incoming {
        if !existing
            .iter()
            .any(|e| e.course == entry.course && e.title == entry.title)
        {
            existing.push(entry);
        }
    }
}

/// Sentences in retrieved content that carry dates or submission language
fn extract_key_sentences(retrieved: &[RetrievalResult], cap: usize) -> Vec<String> {
    const MARKERS: [&str; 6] = ["due", "deadline", "submit", "exam", "quiz", "bring"];

    let mut sentences = Vec::new();
    for result in retrieved {
        for sentence in result.chunk.text.split(['.', '!', '?']) {
            let sentence = sentence.trim().trim_start_matches('\n');
            if sentence.len() < 15 || sentence.len() > 300 {
                continue;
            }
            let lower = sentence.to_lowercase();
            if MARKERS.iter().any(|m| lower.contains(m)) {
                let line = format!("- {} ({})", sentence.replace('\n', " "), result.chunk.course_name);
                if !sentences.contains(&line) {
                    sentences.push(line);
                }
            }
        }
        if sentences.len() >= cap {
            break;
        }
    }
    sentences.truncate(cap);
    sentences
}

fn study_outline(deadlines: &[DeadlineEntry], timeframe: Timeframe) -> ActionFinding {
    let now = Utc::now();
    let horizon = now + ChronoDuration::days(timeframe.horizon_days());

    let mut first = Vec::new();
    let mut within = Vec::new();
    let mut later = Vec::new();
    for entry in deadlines {
        let line = format!(
            "{}: {} (due {})",
            entry.course,
            entry.title,
            entry.due_at.format("%Y-%m-%d")
        );
        if (entry.due_at - now).num_days() <= 2 {
            first.push(line);
        } else if entry.due_at <= horizon {
            within.push(line);
        } else {
            later.push(line);
        }
    }

    let mut body = String::new();
    for (label, bucket) in [
        ("Start immediately", &first),
        ("Schedule this period", &within),
        ("Plan ahead", &later),
    ] {
        if !bucket.is_empty() {
            body.push_str(&format!("{label}:\n"));
            for line in bucket {
                body.push_str(&format!("- {line}\n"));
            }
        }
    }
    if body.is_empty() {
        body.push_str("No dated tasks in this window; allocate time to review recent materials.");
    }

    ActionFinding::new(format!("Study outline ({timeframe})"), body)
}

fn exam_outline(retrieved: &[RetrievalResult], deadlines: &[DeadlineEntry]) -> ActionFinding {
    let mut body = String::new();

    let mut topics = Vec::new();
    for result in retrieved {
        let topic = format!("{} ({})", result.chunk.title, result.chunk.course_name);
        if !result.chunk.title.is_empty() && !topics.contains(&topic) {
            topics.push(topic);
        }
    }
    if !topics.is_empty() {
        body.push_str("Topics to review:\n");
        for topic in topics.iter().take(6) {
            body.push_str(&format!("- {topic}\n"));
        }
    }

    let now = Utc::now();
    if let Some(next) = deadlines.first() {
        body.push_str(&format!(
            "Next dated item: {} ({}) due {} ({})\n",
            next.title,
            next.course,
            next.due_at.format("%Y-%m-%d"),
            time_until(next.due_at, now)
        ));
    }

    if body.is_empty() {
        body.push_str("No exam-specific material retrieved; review the latest course materials.");
    }

    ActionFinding::new("Exam preparation outline", body)
}

fn stage_for(action: &Action) -> TraceStage {
    match action {
        Action::KnowledgeSearch { .. }
        | Action::AssignmentSearch { .. }
        | Action::AnnouncementSearch { .. }
        | Action::MaterialSearch { .. } => TraceStage::KnowledgeSearch,
        Action::CourseListing | Action::UpcomingDeadlines { .. } => TraceStage::DataRetrieval,
        Action::DeadlineAnalysis { .. } => TraceStage::DeadlineAnalysis,
        Action::UrgencyAssessment => TraceStage::UrgencyAssessment,
        Action::InformationExtraction => TraceStage::InformationExtraction,
        Action::StudyOutline { .. } | Action::ExamOutline => TraceStage::OutlineDrafting,
        Action::QueryRefinement => TraceStage::QueryRefinement,
        Action::ContextIntegration => TraceStage::ContextSynthesis,
        Action::DirectAnswer
        | Action::StudyPlanGeneration { .. }
        | Action::ExamPrepGeneration => TraceStage::AnswerGeneration,
    }
}

fn describe(action: &Action) -> String {
    match action {
        Action::KnowledgeSearch { query, .. } => format!("Searching classroom content for \"{query}\""),
        Action::AssignmentSearch { .. } => "Searching assignments".to_string(),
        Action::AnnouncementSearch { .. } => "Searching announcements".to_string(),
        Action::MaterialSearch { .. } => "Searching course materials".to_string(),
        Action::DeadlineAnalysis { .. } => "Analyzing due dates".to_string(),
        Action::UrgencyAssessment => "Assessing task urgency".to_string(),
        Action::InformationExtraction => "Extracting key details".to_string(),
        Action::StudyOutline { timeframe } => format!("Drafting {timeframe} study outline"),
        Action::ExamOutline => "Drafting exam preparation outline".to_string(),
        Action::DirectAnswer => "Generating answer".to_string(),
        Action::StudyPlanGeneration { timeframe } => {
            format!("Generating {timeframe} study plan")
        }
        Action::ExamPrepGeneration => "Generating exam preparation guide".to_string(),
        Action::CourseListing => "Listing available courses".to_string(),
        Action::UpcomingDeadlines { within_days, .. } => {
            format!("Collecting deadlines within {within_days} days")
        }
        Action::QueryRefinement => "Refining search query".to_string(),
        Action::ContextIntegration => "Assembling context".to_string(),
    }
}
