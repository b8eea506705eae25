//! Context synthesizer
//!
//! Assembles one bounded context block from ranked retrieval results and
//! the structured outputs of analysis actions. Action-derived findings are
//! always retained; when the character budget runs out, the lowest-ranked
//! retrieval snippets are dropped first.

use coursemate_common::config::SynthesisConfig;
use coursemate_search::retrieval::RetrievalResult;
use serde::Serialize;
use tracing::debug;

/// Structured output of a non-generation action, e.g. a deadline list
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActionFinding {
    pub title: String,
    pub body: String,
}

impl ActionFinding {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// The assembled context block
#[derive(Debug, Clone, Default, Serialize)]
pub struct SynthesizedContext {
    /// Context text handed to the generator
    pub text: String,

    /// Course names that contributed content, in order of appearance
    pub course_names: Vec<String>,

    /// Retrieval snippets included
    pub included: usize,

    /// Retrieval snippets dropped for budget
    pub dropped: usize,
}

impl SynthesizedContext {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Synthesizer for bounded context assembly
pub struct ContextSynthesizer {
    config: SynthesisConfig,
}

impl ContextSynthesizer {
    pub fn new(config: SynthesisConfig) -> Self {
        Self { config }
    }

    /// Merge findings and ranked retrieval results into one context block.
    /// `retrieved` must already be ordered best-first.
    pub fn synthesize(
        &self,
        retrieved: &[RetrievalResult],
        findings: &[ActionFinding],
    ) -> SynthesizedContext {
        let budget = self.config.max_context_chars;
        let mut text = String::new();
        let mut course_names: Vec<String> = Vec::new();

        for finding in findings {
            let body = truncate_chars(&finding.body, budget.saturating_sub(text.len() + finding.title.len() + 8));
            if body.is_empty() {
                break;
            }
            text.push_str(&format!("## {}\n{}\n\n", finding.title, body));
        }

        let mut included = 0usize;
        for (position, result) in retrieved.iter().enumerate() {
            let snippet = truncate_chars(&result.chunk.text, self.config.max_snippet_chars);
            let entry = format!(
                "[{}] {} - {} ({})\n{}\n\n",
                position + 1,
                result.chunk.course_name,
                result.chunk.title,
                result.chunk.content_type,
                snippet
            );

            if text.len() + entry.len() > budget {
                break;
            }

            text.push_str(&entry);
            included += 1;
            if !course_names.contains(&result.chunk.course_name) {
                course_names.push(result.chunk.course_name.clone());
            }
        }

        let dropped = retrieved.len() - included;
        if dropped > 0 {
            debug!(included, dropped, budget, "context budget trimmed retrieval snippets");
        }

        SynthesizedContext {
            text,
            course_names,
            included,
            dropped,
        }
    }
}

/// Character-boundary-safe truncation with an ASCII ellipsis
fn truncate_chars(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    if max_chars < 4 {
        return String::new();
    }
    let mut out: String = trimmed.chars().take(max_chars - 3).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coursemate_common::model::{ContentChunk, ContentType};

    fn result(course: &str, title: &str, text: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            chunk: ContentChunk {
                id: format!("{title}#000"),
                source_id: title.to_string(),
                course_id: course.to_lowercase(),
                course_name: course.to_string(),
                content_type: ContentType::Assignment,
                title: title.to_string(),
                text: text.to_string(),
                created_at: Utc::now(),
                due_at: None,
                embedding: vec![],
            },
            similarity: score,
            score,
        }
    }

    fn synthesizer(max_context_chars: usize) -> ContextSynthesizer {
        ContextSynthesizer::new(SynthesisConfig {
            max_context_chars,
            max_snippet_chars: 200,
        })
    }

    #[test]
    fn test_attribution_and_course_names() {
        let retrieved = vec![
            result("HS 103", "Presentation", "Slides due soon.", 0.9),
            result("CHEM 101", "Lab", "Bring goggles.", 0.8),
        ];
        let context = synthesizer(4000).synthesize(&retrieved, &[]);

        assert!(context.text.contains("[1] HS 103 - Presentation (Assignment)"));
        assert!(context.text.contains("[2] CHEM 101 - Lab (Assignment)"));
        assert_eq!(context.course_names, vec!["HS 103", "CHEM 101"]);
        assert_eq!(context.included, 2);
        assert_eq!(context.dropped, 0);
    }

    #[test]
    fn test_budget_drops_lowest_ranked_first() {
        let retrieved = vec![
            result("HS 103", "First", &"a".repeat(150), 0.9),
            result("HS 103", "Second", &"b".repeat(150), 0.5),
            result("HS 103", "Third", &"c".repeat(150), 0.1),
        ];
        let context = synthesizer(420).synthesize(&retrieved, &[]);

        assert!(context.included < 3);
        assert!(context.text.contains("First"));
        assert!(!context.text.contains("[3]"));
        assert_eq!(context.dropped, 3 - context.included);
    }

    #[test]
    fn test_findings_are_retained_ahead_of_snippets() {
        let retrieved = vec![result("HS 103", "Item", &"x".repeat(300), 0.9)];
        let findings = vec![ActionFinding::new(
            "Upcoming deadlines",
            "- HS 103: Presentation due Sept 20",
        )];
        let context = synthesizer(160).synthesize(&retrieved, &findings);

        assert!(context.text.contains("## Upcoming deadlines"));
        assert!(context.text.contains("Presentation due Sept 20"));
        // The snippet no longer fits, the finding stays.
        assert_eq!(context.included, 0);
        assert_eq!(context.dropped, 1);
    }

    #[test]
    fn test_empty_inputs_yield_empty_context() {
        let context = synthesizer(1000).synthesize(&[], &[]);
        assert!(context.is_empty());
        assert!(context.course_names.is_empty());
    }

    #[test]
    fn test_truncate_chars_is_boundary_safe() {
        assert_eq!(truncate_chars("short", 10), "short");
        let truncated = truncate_chars(&"café".repeat(50), 23);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 23);
    }
}
