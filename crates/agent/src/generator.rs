//! Response generator
//!
//! Builds the instruction prompt for the requested response kind, calls the
//! language model under the shared retry policy, repairs fenced output, and
//! degrades to a user-safe response assembled from retrieved content when
//! the provider stays unavailable.

use crate::llm::{strip_code_fences, GenerationOptions, LanguageModel};
use coursemate_common::retry::RetryPolicy;
use coursemate_context::analyzer::Timeframe;
use coursemate_context::synthesizer::SynthesizedContext;
use std::sync::Arc;
use tracing::error;

/// Fixed apology used when an unexpected internal error reaches the caller
pub const GENERIC_APOLOGY: &str =
    "Sorry, I ran into an unexpected problem while answering. Please try again.";

/// What kind of response the terminal action asked for
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseKind {
    /// Direct answer grounded in classroom content
    Answer,
    /// Structured study plan for a timeframe
    StudyPlan(Timeframe),
    /// Exam preparation guide
    ExamPrep,
    /// Generic answer without classroom context (fallback route)
    Generic,
}

/// Generated reply plus whether it came from the degraded path
#[derive(Debug, Clone)]
pub struct GeneratedResponse {
    pub text: String,
    pub degraded: bool,
}

/// Generator over an external language model
pub struct ResponseGenerator {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    options: GenerationOptions,
}

impl ResponseGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryPolicy, options: GenerationOptions) -> Self {
        Self {
            model,
            retry,
            options,
        }
    }

    /// Produce the response text for a query and its synthesized context.
    /// Never fails: transient provider errors are retried, and exhaustion
    /// degrades to a response assembled from the context itself.
    pub async fn respond(
        &self,
        kind: &ResponseKind,
        query: &str,
        context: &SynthesizedContext,
    ) -> GeneratedResponse {
        let prompt = build_prompt(kind, query, context);

        match self
            .retry
            .run("generation", || self.model.generate(&prompt, &self.options))
            .await
        {
            Ok(text) => GeneratedResponse {
                text: repair_output(&text),
                degraded: false,
            },
            Err(err) => {
                error!(
                    error = %err,
                    model = self.model.model_name(),
                    "generation failed after retries, returning degraded response"
                );
                GeneratedResponse {
                    text: degraded_response(kind, context),
                    degraded: true,
                }
            }
        }
    }
}

/// A whole-payload code fence is a formatting artifact, not content.
fn repair_output(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        strip_code_fences(trimmed).to_string()
    } else {
        trimmed.to_string()
    }
}

fn build_prompt(kind: &ResponseKind, query: &str, context: &SynthesizedContext) -> String {
    match kind {
        ResponseKind::Answer => format!(
            "You are a teaching assistant helping a student with their classroom content.\n\n\
             Student question: \"{query}\"\n\n\
             Relevant classroom content:\n{context}\n\
             Answer using only the content above. Reference course names, titles, and due dates \
             explicitly when they appear. If the content does not cover the question, say so \
             plainly instead of guessing. Keep the answer between 150 and 300 words and end with \
             one practical next step.",
            query = query,
            context = context.text
        ),
        ResponseKind::StudyPlan(timeframe) => format!(
            "You are a study planner helping a student organize their coursework.\n\n\
             Student request: \"{query}\"\n\n\
             Classroom content and deadlines:\n{context}\n\
             Create a structured study plan covering the next {horizon} days. Include:\n\
             1. Priority tasks ordered by due date, with the dates that appear above\n\
             2. A realistic day-by-day schedule with time estimates\n\
             3. Study strategies specific to the listed content\n\
             Use markdown headers and bullet points. Highlight any course that needs extra \
             attention and close with a short encouraging note.",
            query = query,
            context = context.text,
            horizon = timeframe.horizon_days()
        ),
        ResponseKind::ExamPrep => format!(
            "You are a teaching assistant helping a student prepare for an exam.\n\n\
             Student request: \"{query}\"\n\n\
             Classroom content:\n{context}\n\
             Build an exam preparation guide: list the topics to review (drawn from the content \
             above), order them by importance, and suggest a revision sequence with checkpoints. \
             Mention exam or quiz dates when they appear in the content.",
            query = query,
            context = context.text
        ),
        ResponseKind::Generic => format!(
            "You are a teaching assistant. The student's classroom content is not available \
             right now.\n\n\
             Student question: \"{query}\"\n\n\
             {web}\
             Answer briefly from general knowledge and recommend checking the classroom for \
             authoritative course details.",
            query = query,
            web = if context.is_empty() {
                String::new()
            } else {
                format!("Web search results:\n{}\n", context.text)
            }
        ),
    }
}

/// User-safe response when the provider stays unavailable. Built from what
/// retrieval already produced so the student still gets the facts.
fn degraded_response(kind: &ResponseKind, context: &SynthesizedContext) -> String {
    if context.is_empty() {
        return "I couldn't generate an answer right now. Please try again in a moment."
            .to_string();
    }

    let heading = match kind {
        ResponseKind::StudyPlan(_) => {
            "I couldn't reach the language model to write a full study plan, but here is the \
             classroom content a plan should be built around:"
        }
        ResponseKind::ExamPrep => {
            "I couldn't reach the language model to write a full preparation guide, but here is \
             the relevant classroom content:"
        }
        _ => "I couldn't reach the language model just now. Here is the most relevant classroom \
             content I found:",
    };

    format!(
        "{heading}\n\n{content}\nTry again in a moment for a full answer.",
        content = context.text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use coursemate_common::errors::{AppError, Result};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct ScriptedModel {
        reply: String,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
            Ok(self.reply.clone())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct FailingModel {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LanguageModel for FailingModel {
        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Generation {
                message: "rate limited".into(),
                transient: true,
            })
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            multiplier: 2.0,
        }
    }

    fn context_with(text: &str) -> SynthesizedContext {
        SynthesizedContext {
            text: text.to_string(),
            course_names: vec!["HS 103".into()],
            included: 1,
            dropped: 0,
        }
    }

    #[tokio::test]
    async fn test_successful_generation_is_not_degraded() {
        let generator = ResponseGenerator::new(
            Arc::new(ScriptedModel {
                reply: "The presentation is due Sept 20.".into(),
            }),
            fast_retry(),
            GenerationOptions::default(),
        );

        let response = generator
            .respond(
                &ResponseKind::Answer,
                "when is my presentation due",
                &context_with("[1] HS 103 - Presentation\ndue Sept 20"),
            )
            .await;

        assert!(!response.degraded);
        assert_eq!(response.text, "The presentation is due Sept 20.");
    }

    #[tokio::test]
    async fn test_fenced_reply_is_repaired() {
        let generator = ResponseGenerator::new(
            Arc::new(ScriptedModel {
                reply: "```json\n{\"plan\":\"review notes\"}\n```".into(),
            }),
            fast_retry(),
            GenerationOptions::default(),
        );

        let response = generator
            .respond(&ResponseKind::Answer, "q", &context_with("content"))
            .await;

        assert_eq!(response.text, "{\"plan\":\"review notes\"}");
    }

    #[tokio::test]
    async fn test_exhausted_retries_degrade_with_context() {
        let model = Arc::new(FailingModel {
            calls: AtomicU32::new(0),
        });
        let generator =
            ResponseGenerator::new(model.clone(), fast_retry(), GenerationOptions::default());

        let response = generator
            .respond(
                &ResponseKind::Answer,
                "q",
                &context_with("[1] HS 103 - Presentation\ndue Sept 20"),
            )
            .await;

        assert!(response.degraded);
        assert!(response.text.contains("due Sept 20"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_degraded_without_context_is_an_apology() {
        let generator = ResponseGenerator::new(
            Arc::new(FailingModel {
                calls: AtomicU32::new(0),
            }),
            fast_retry(),
            GenerationOptions::default(),
        );

        let response = generator
            .respond(&ResponseKind::Answer, "q", &SynthesizedContext::default())
            .await;

        assert!(response.degraded);
        assert!(response.text.contains("try again"));
    }

    #[test]
    fn test_prompts_carry_query_and_context() {
        let context = context_with("[1] HS 103 - Presentation");
        for kind in [
            ResponseKind::Answer,
            ResponseKind::StudyPlan(Timeframe::Week),
            ResponseKind::ExamPrep,
        ] {
            let prompt = build_prompt(&kind, "my question", &context);
            assert!(prompt.contains("my question"));
            assert!(prompt.contains("[1] HS 103 - Presentation"));
        }
    }
}
