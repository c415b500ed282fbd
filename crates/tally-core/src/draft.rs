//! Validation between form input and the store.
//!
//! Nothing reaches [`crate::store::Action::AddTask`] or
//! [`crate::store::Action::UpdateTask`] without passing through here first.

use chrono::{DateTime, Utc};
use tally_shared::{Priority, Task};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("task title cannot be empty")]
    EmptyTitle,
    #[error("no task matches '{0}'")]
    UnknownTask(String),
    #[error("'{0}' matches more than one task; use a longer id prefix")]
    AmbiguousTask(String),
    #[error("{kind} name cannot be empty")]
    EmptyName { kind: &'static str },
}

#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub due: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub category_id: Option<String>,
    pub tags: Vec<String>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn into_task(
        self,
        id: String,
        now: DateTime<Utc>,
        rank: Option<i64>,
    ) -> Result<Task, ValidationError> {
        let title = clean_title(&self.title)?;
        let mut task = Task::with_id(id, title, now);
        task.description = clean_optional(self.description);
        task.due = self.due;
        task.priority = self.priority;
        task.category_id = self.category_id;
        task.tags = dedup_tags(self.tags);
        task.order = rank;
        Ok(task)
    }
}

/// Edits to an existing task. Outer `None` keeps the field; `Some(None)`
/// clears an optional one.
#[derive(Debug, Clone, Default)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub due: Option<Option<DateTime<Utc>>>,
    pub priority: Option<Priority>,
    pub category_id: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub toggle_tags: Vec<String>,
}

impl TaskEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due.is_none()
            && self.priority.is_none()
            && self.category_id.is_none()
            && self.tags.is_none()
            && self.toggle_tags.is_empty()
    }

    /// Builds the full replacement for `task`. Fields not named in the edit
    /// are carried forward unchanged.
    pub fn apply(self, task: &Task, now: DateTime<Utc>) -> Result<Task, ValidationError> {
        let mut next = task.clone();
        if let Some(title) = self.title {
            next.title = clean_title(&title)?;
        }
        if let Some(description) = self.description {
            next.description = clean_optional(description);
        }
        if let Some(due) = self.due {
            next.due = due;
        }
        if let Some(priority) = self.priority {
            next.priority = priority;
        }
        if let Some(category_id) = self.category_id {
            next.category_id = category_id;
        }
        if let Some(tags) = self.tags {
            next.tags = dedup_tags(tags);
        }
        for tag in &self.toggle_tags {
            toggle_tag(&mut next.tags, tag);
        }
        next.updated_at = now;
        Ok(next)
    }
}

pub fn toggle_tag(tags: &mut Vec<String>, tag_id: &str) {
    if let Some(idx) = tags.iter().position(|t| t == tag_id) {
        tags.remove(idx);
    } else {
        tags.push(tag_id.to_string());
    }
}

/// Resolves a user-supplied id prefix against the collection.
pub fn resolve_task<'a>(tasks: &'a [Task], reference: &str) -> Result<&'a Task, ValidationError> {
    let reference = reference.trim();
    if let Some(exact) = tasks.iter().find(|t| t.id == reference) {
        return Ok(exact);
    }
    let mut candidates = tasks
        .iter()
        .filter(|t| !reference.is_empty() && t.id.starts_with(reference));
    let first = candidates
        .next()
        .ok_or_else(|| ValidationError::UnknownTask(reference.to_string()))?;
    if candidates.next().is_some() {
        return Err(ValidationError::AmbiguousTask(reference.to_string()));
    }
    Ok(first)
}

fn clean_title(raw: &str) -> Result<String, ValidationError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(title.to_string())
}

fn clean_optional(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}
