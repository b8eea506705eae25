//! Query analyzer
//!
//! Provides:
//! - Intent classification over student queries
//! - Fuzzy course-name matching (case, punctuation, abbreviations)
//! - Entity extraction (dates, keywords)
//! - Confidence scoring with a designed low-confidence degradation path

use coursemate_common::config::AnalyzerConfig;
use coursemate_common::model::Course;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Query intent classification
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    /// Looking for information in classroom content
    Informational,
    /// Asking for a study plan or schedule
    StudyPlan,
    /// Preparing for an exam or quiz
    ExamPrep,
    /// Intent could not be resolved with enough confidence
    Ambiguous,
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryIntent::Informational => "informational",
            QueryIntent::StudyPlan => "study_plan",
            QueryIntent::ExamPrep => "exam_prep",
            QueryIntent::Ambiguous => "ambiguous",
        };
        f.write_str(name)
    }
}

/// Planning horizon for study plans
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Week,
    Month,
    All,
}

impl Timeframe {
    /// How far ahead the deadline window reaches
    pub fn horizon_days(&self) -> i64 {
        match self {
            Timeframe::Week => 7,
            Timeframe::Month => 30,
            Timeframe::All => 120,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "week" | "weekly" => Some(Timeframe::Week),
            "month" | "monthly" => Some(Timeframe::Month),
            "all" => Some(Timeframe::All),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::All => "all",
        };
        f.write_str(name)
    }
}

/// Entities extracted from a query
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct QueryEntities {
    /// Date expressions found in the query
    pub dates: Vec<String>,
    /// Stop-word-filtered keywords, in query order
    pub keywords: Vec<String>,
}

/// Query understanding result, created per query and discarded after
/// planning
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryAnalysis {
    /// Original query text
    pub query: String,

    /// Whitespace-normalized query used for searching
    pub refined_query: String,

    /// Detected intent
    pub intent: QueryIntent,

    /// Course the query appears to be about
    pub target_course: Option<Course>,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,

    /// Extracted entities
    pub entities: QueryEntities,

    /// Whether due dates should influence ranking
    pub deadline_sensitive: bool,

    /// Explicit timeframe mentioned in the query, if any
    pub timeframe: Option<Timeframe>,
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "in", "on", "at", "to", "for",
    "of", "with", "by", "from", "and", "or", "but", "not", "this", "that", "these", "those",
    "it", "its", "as", "do", "does", "did", "has", "have", "had", "can", "could", "will",
    "would", "should", "may", "might", "what", "when", "who", "where", "how", "why", "which",
    "my", "our", "your", "me", "we", "you", "about", "please",
];

const DEADLINE_WORDS: &[&str] = &[
    "due", "deadline", "deadlines", "urgent", "prioritize", "overdue", "submit", "submission",
];

const STUDY_PLAN_MARKERS: &[&str] = &["study plan", "revision plan", "plan my", "schedule", "organize my"];

const EXAM_WORDS: &[&str] = &["exam", "exams", "quiz", "quizzes", "midterm", "final", "test", "revise"];

const QUESTION_STARTERS: &[&str] = &[
    "what", "when", "who", "where", "how", "why", "which", "is", "are", "do", "does", "can",
];

const CONTENT_WORDS: &[&str] = &[
    "assignment", "assignments", "homework", "announcement", "announcements", "material",
    "materials", "due", "deadline", "deadlines", "presentation", "project", "reading",
];

/// Query parser for understanding student queries
pub struct QueryAnalyzer {
    confidence_threshold: f32,
    date_pattern: Regex,
}

impl QueryAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Self {
        let date_pattern = Regex::new(
            r"(?i)\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?\b|\b\d{1,2}/\d{1,2}(?:/\d{2,4})?\b",
        )
        .unwrap();

        Self {
            confidence_threshold: config.confidence_threshold,
            date_pattern,
        }
    }

    /// Analyze a query against the known course list
    pub fn analyze(&self, query: &str, courses: &[Course]) -> QueryAnalysis {
        let refined_query = collapse_whitespace(query);
        let lower = refined_query.to_lowercase();

        let (mut intent, intent_confidence) = detect_intent(&lower);
        let deadline_sensitive = DEADLINE_WORDS.iter().any(|w| contains_word(&lower, w));
        let timeframe = detect_timeframe(&lower);
        let entities = self.extract_entities(&lower);

        let course_match = best_course_match(&lower, courses);
        let course_confidence = course_match.as_ref().map(|m| m.1).unwrap_or(0.3);
        let mut target_course = course_match.map(|m| m.0);

        let confidence = 0.55 * intent_confidence + 0.45 * course_confidence;

        // Designed degradation path, not an error: below the threshold the
        // query is ambiguous and gets the broad fallback plan.
        if confidence < self.confidence_threshold {
            intent = QueryIntent::Ambiguous;
            target_course = None;
        }

        QueryAnalysis {
            query: query.to_string(),
            refined_query,
            intent,
            target_course,
            confidence,
            entities,
            deadline_sensitive,
            timeframe,
        }
    }

    fn extract_entities(&self, lower: &str) -> QueryEntities {
        let dates = self
            .date_pattern
            .find_iter(lower)
            .map(|m| m.as_str().to_string())
            .collect();

        let mut seen = HashSet::new();
        let keywords = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 3 && !STOP_WORDS.contains(t))
            .filter(|t| seen.insert(t.to_string()))
            .take(8)
            .map(|t| t.to_string())
            .collect();

        QueryEntities { dates, keywords }
    }
}

/// Detect query intent using keyword heuristics
fn detect_intent(lower: &str) -> (QueryIntent, f32) {
    if STUDY_PLAN_MARKERS.iter().any(|m| lower.contains(m)) {
        return (QueryIntent::StudyPlan, 0.9);
    }

    if EXAM_WORDS.iter().any(|w| contains_word(lower, w)) {
        return (QueryIntent::ExamPrep, 0.85);
    }

    let first_word = lower.split_whitespace().next().unwrap_or_default();
    if QUESTION_STARTERS.contains(&first_word)
        || CONTENT_WORDS.iter().any(|w| contains_word(lower, w))
    {
        return (QueryIntent::Informational, 0.8);
    }

    if lower.ends_with('?') {
        return (QueryIntent::Informational, 0.7);
    }

    (QueryIntent::Informational, 0.4)
}

fn detect_timeframe(lower: &str) -> Option<Timeframe> {
    if contains_word(lower, "week") || contains_word(lower, "weekly") {
        Some(Timeframe::Week)
    } else if contains_word(lower, "month") || contains_word(lower, "monthly") {
        Some(Timeframe::Month)
    } else if contains_word(lower, "semester") {
        Some(Timeframe::All)
    } else {
        None
    }
}

/// Whole-word containment check
fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|t| t.eq_ignore_ascii_case(word))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize for fuzzy matching: lowercase, punctuation to spaces, a space
/// at every letter/digit boundary ("hs103" -> "hs 103"), whitespace
/// collapsed.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if let Some(p) = prev {
                if p.is_alphabetic() != c.is_alphabetic() {
                    out.push(' ');
                }
            }
            out.extend(c.to_lowercase());
            prev = Some(c);
        } else {
            out.push(' ');
            prev = None;
        }
    }
    collapse_whitespace(&out)
}

/// Best fuzzy course match for a query, with a match confidence
fn best_course_match(lower_query: &str, courses: &[Course]) -> Option<(Course, f32)> {
    let query_norm = normalize(lower_query);
    let query_tokens: HashSet<&str> = query_norm.split(' ').collect();

    let mut best: Option<(Course, f32)> = None;
    for course in courses {
        let score = course_match_score(&query_norm, &query_tokens, &course.name);
        if score > 0.5 && best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
            best = Some((course.clone(), score));
        }
    }
    best
}

fn course_match_score(query_norm: &str, query_tokens: &HashSet<&str>, course_name: &str) -> f32 {
    let name_norm = normalize(course_name);
    if name_norm.is_empty() {
        return 0.0;
    }

    if query_norm.contains(&name_norm) {
        return 1.0;
    }

    let tokens: Vec<&str> = name_norm
        .split(' ')
        .filter(|t| t.len() > 1 && !STOP_WORDS.contains(t))
        .collect();

    if !tokens.is_empty() {
        let present = tokens.iter().filter(|t| query_tokens.contains(*t)).count();
        if present == tokens.len() {
            return 0.9;
        }
        if present * 2 >= tokens.len() && present > 0 {
            return 0.7;
        }
    }

    // Abbreviation match: query token equals (or prefixes) the initials of
    // the course name, e.g. "flp" for "Future Leaders Program".
    let initials: String = name_norm
        .split(' ')
        .filter_map(|t| t.chars().next())
        .collect();
    if initials.len() >= 2
        && query_tokens
            .iter()
            .any(|t| t.len() >= 2 && initials.starts_with(*t))
    {
        return 0.6;
    }

    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> QueryAnalyzer {
        QueryAnalyzer::new(&AnalyzerConfig::default())
    }

    fn courses() -> Vec<Course> {
        vec![
            Course::new("c1", "HS 103 | 2023-4"),
            Course::new("c2", "Future Leaders Program Central Classroom"),
            Course::new("c3", "CHEM 101"),
        ]
    }

    #[test]
    fn test_informational_deadline_query() {
        let analysis = analyzer().analyze("when is my HS 103 presentation due", &courses());

        assert_eq!(analysis.intent, QueryIntent::Informational);
        assert!(analysis.deadline_sensitive);
        assert_eq!(analysis.target_course.as_ref().unwrap().id, "c1");
        assert!(analysis.confidence > 0.6);
    }

    #[test]
    fn test_study_plan_intent_with_timeframe() {
        let analysis = analyzer().analyze("create a weekly study plan for CHEM 101", &courses());

        assert_eq!(analysis.intent, QueryIntent::StudyPlan);
        assert_eq!(analysis.timeframe, Some(Timeframe::Week));
        assert_eq!(analysis.target_course.as_ref().unwrap().id, "c3");
    }

    #[test]
    fn test_exam_prep_intent() {
        let analysis = analyzer().analyze("help me prepare for the chem 101 midterm", &courses());
        assert_eq!(analysis.intent, QueryIntent::ExamPrep);
    }

    #[test]
    fn test_low_confidence_degrades_to_ambiguous() {
        let analysis = analyzer().analyze("that thing we discussed in class", &courses());

        assert_eq!(analysis.intent, QueryIntent::Ambiguous);
        assert!(analysis.target_course.is_none());
        assert!(analysis.confidence < 0.45);
    }

    #[test]
    fn test_fuzzy_course_matching_variants() {
        let a = analyzer();
        for query in [
            "what is due in hs 103",
            "what is due in HS-103?",
            "what is due in hs103",
        ] {
            let analysis = a.analyze(query, &courses());
            assert_eq!(
                analysis.target_course.as_ref().map(|c| c.id.as_str()),
                Some("c1"),
                "query {query:?} should match HS 103"
            );
        }
    }

    #[test]
    fn test_abbreviation_course_matching() {
        let analysis = analyzer().analyze("any announcements in flp today", &courses());
        assert_eq!(analysis.target_course.as_ref().unwrap().id, "c2");
    }

    #[test]
    fn test_entity_extraction() {
        let analysis = analyzer().analyze("is the essay due Sept 20 or 9/27", &courses());

        assert_eq!(analysis.entities.dates.len(), 2);
        assert!(analysis.entities.keywords.contains(&"essay".to_string()));
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let a = analyzer();
        let first = a.analyze("when is my HS 103 presentation due", &courses());
        let second = a.analyze("when is my HS 103 presentation due", &courses());
        assert_eq!(first, second);
    }
}
