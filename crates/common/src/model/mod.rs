//! Core data model shared across the pipeline crates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of classroom content an item or chunk was derived from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Assignment,
    Announcement,
    Material,
}

impl ContentType {
    /// Human-readable label used in context attribution
    pub fn label(&self) -> &'static str {
        match self {
            ContentType::Assignment => "Assignment",
            ContentType::Announcement => "Announcement",
            ContentType::Material => "Material",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A course as surfaced by the classroom provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Course {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher: Option<String>,
}

impl Course {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            section: None,
            teacher: None,
        }
    }
}

/// A raw classroom item as delivered by the provider, before chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawItem {
    /// Provider-assigned stable id
    pub id: String,

    /// Course this item belongs to
    pub course_id: String,

    /// Kind of content
    pub content_type: ContentType,

    /// Item title (may be empty for announcements)
    pub title: String,

    /// Item body text
    pub body: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Due date, when the item carries one
    pub due_at: Option<DateTime<Utc>>,
}

/// A bounded span of source text stored with its embedding
///
/// Owned by the vector index; created only by the ingestor. Chunk ids are
/// stable: derived from the source item id plus the chunk offset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentChunk {
    /// Stable id, `<source_id>#<offset>`
    pub id: String,

    /// Source item id this chunk was derived from
    pub source_id: String,

    /// Course id
    pub course_id: String,

    /// Course display name (kept for attribution)
    pub course_name: String,

    /// Kind of source content
    pub content_type: ContentType,

    /// Source item title
    pub title: String,

    /// Chunk text
    pub text: String,

    /// Source item creation time
    pub created_at: DateTime<Utc>,

    /// Source item due date, when present
    pub due_at: Option<DateTime<Utc>>,

    /// Embedding vector (fixed dimensionality per index)
    pub embedding: Vec<f32>,
}

impl ContentChunk {
    /// Build the stable chunk id for a source item and chunk offset.
    ///
    /// The offset is zero-padded so lexicographic order matches numeric
    /// order, which keeps id-based tie-breaking deterministic.
    pub fn chunk_id(source_id: &str, offset: usize) -> String {
        format!("{source_id}#{offset:03}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_ordering() {
        let a = ContentChunk::chunk_id("item-1", 2);
        let b = ContentChunk::chunk_id("item-1", 10);
        assert_eq!(a, "item-1#002");
        assert_eq!(b, "item-1#010");
        assert!(a < b);
    }

    #[test]
    fn test_content_type_serde() {
        let json = serde_json::to_string(&ContentType::Announcement).unwrap();
        assert_eq!(json, "\"announcement\"");
    }
}
