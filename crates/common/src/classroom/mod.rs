//! Classroom provider contract
//!
//! The classroom service that owns courses and their content is an external
//! collaborator. The pipeline only consumes this trait; credential handling
//! and API plumbing live with the host application.

use crate::errors::Result;
use crate::model::{Course, RawItem};
use async_trait::async_trait;
use std::collections::HashMap;

/// Source of courses and raw classroom items
#[async_trait]
pub trait ClassroomProvider: Send + Sync {
    /// List courses visible to the current user
    async fn list_courses(&self) -> Result<Vec<Course>>;

    /// Fetch all items (assignments, announcements, materials) for a course
    async fn course_items(&self, course_id: &str) -> Result<Vec<RawItem>>;
}

/// In-memory provider for tests and demos
#[derive(Debug, Default)]
pub struct StaticClassroomProvider {
    courses: Vec<Course>,
    items: HashMap<String, Vec<RawItem>>,
}

impl StaticClassroomProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a course together with its items
    pub fn with_course(mut self, course: Course, items: Vec<RawItem>) -> Self {
        self.items.insert(course.id.clone(), items);
        self.courses.push(course);
        self
    }
}

#[async_trait]
impl ClassroomProvider for StaticClassroomProvider {
    async fn list_courses(&self) -> Result<Vec<Course>> {
        Ok(self.courses.clone())
    }

    async fn course_items(&self, course_id: &str) -> Result<Vec<RawItem>> {
        Ok(self.items.get(course_id).cloned().unwrap_or_default())
    }
}
