//! Deadline extraction and prioritization helpers
//!
//! Shared by the deadline-analysis actions and the deadline digest surface.

use chrono::{DateTime, Utc};
use coursemate_common::model::ContentChunk;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// One dated piece of coursework
#[derive(Debug, Clone, PartialEq)]
pub struct DeadlineEntry {
    pub course: String,
    pub title: String,
    pub due_at: DateTime<Utc>,
}

/// Priority bucket for dated or flagged work
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    Important,
    Normal,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Urgent => "urgent",
            Priority::Important => "important",
            Priority::Normal => "normal",
        };
        f.write_str(name)
    }
}

/// Priority from due-date proximity alone
pub fn classify_priority(due_at: DateTime<Utc>, now: DateTime<Utc>) -> Priority {
    let days = (due_at - now).num_days();
    if days <= 2 {
        Priority::Urgent
    } else if days <= 7 {
        Priority::Important
    } else {
        Priority::Normal
    }
}

/// Priority signal carried by the text itself, when any
pub fn keyword_priority(text: &str) -> Option<Priority> {
    let lower = text.to_lowercase();
    if ["urgent", "asap", "immediately", "today", "tomorrow"]
        .iter()
        .any(|w| lower.contains(w))
    {
        return Some(Priority::Urgent);
    }
    if ["important", "due", "deadline", "exam", "quiz", "test"]
        .iter()
        .any(|w| lower.contains(w))
    {
        return Some(Priority::Important);
    }
    None
}

/// Human-readable time until a due date
pub fn time_until(due_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = (due_at - now).num_days();
    if days < 0 {
        "overdue".to_string()
    } else if days == 0 {
        "today".to_string()
    } else if days == 1 {
        "tomorrow".to_string()
    } else if days < 7 {
        format!("{days} days")
    } else if days < 30 {
        let weeks = days / 7;
        format!("{} week{}", weeks, if weeks > 1 { "s" } else { "" })
    } else {
        format!("{days} days")
    }
}

/// Dated entries from chunks, one per source item, due date ascending
pub fn entries_from_chunks<'a>(
    chunks: impl IntoIterator<Item = &'a ContentChunk>,
) -> Vec<DeadlineEntry> {
    let mut seen = HashSet::new();
    let mut entries: Vec<DeadlineEntry> = chunks
        .into_iter()
        .filter_map(|chunk| {
            let due_at = chunk.due_at?;
            seen.insert(chunk.source_id.clone()).then(|| DeadlineEntry {
                course: chunk.course_name.clone(),
                title: chunk.title.clone(),
                due_at,
            })
        })
        .collect();
    entries.sort_by_key(|e| e.due_at);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_classify_priority_by_proximity() {
        let now = Utc::now();
        assert_eq!(classify_priority(now + Duration::days(1), now), Priority::Urgent);
        assert_eq!(classify_priority(now + Duration::days(5), now), Priority::Important);
        assert_eq!(classify_priority(now + Duration::days(20), now), Priority::Normal);
        assert_eq!(classify_priority(now - Duration::days(1), now), Priority::Urgent);
    }

    #[test]
    fn test_keyword_priority() {
        assert_eq!(keyword_priority("submit ASAP please"), Some(Priority::Urgent));
        assert_eq!(keyword_priority("quiz on friday"), Some(Priority::Important));
        assert_eq!(keyword_priority("welcome to the course"), None);
    }

    #[test]
    fn test_time_until_buckets() {
        let now = Utc::now();
        assert_eq!(time_until(now - Duration::days(2), now), "overdue");
        assert_eq!(time_until(now + Duration::hours(3), now), "today");
        assert_eq!(time_until(now + Duration::days(1), now), "tomorrow");
        assert_eq!(time_until(now + Duration::days(4), now), "4 days");
        assert_eq!(time_until(now + Duration::days(15), now), "2 weeks");
    }

    #[test]
    fn test_priority_ordering_for_sorting() {
        let mut priorities = vec![Priority::Normal, Priority::Urgent, Priority::Important];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![Priority::Urgent, Priority::Important, Priority::Normal]
        );
    }
}
