//! Filtered, sorted projection of the task collection.
//!
//! The projection is never stored; hosts recompute it from the current
//! snapshot whenever they render.

use std::cmp::Ordering;

use tally_shared::{FilterState, SortDirection, SortKey, SortState, Task};

use crate::store::Snapshot;

pub fn matches(task: &Task, filter: &FilterState) -> bool {
    let search_match = filter.search.is_empty()
        || task
            .title
            .to_lowercase()
            .contains(&filter.search.to_lowercase());

    let priority_match = filter.priority.admits(&task.priority);

    let category_match = match filter.category.only() {
        None => true,
        Some(selected) => task.category_id.as_deref() == Some(selected.as_str()),
    };

    let tag_match = filter.tags.is_empty() || filter.tags.iter().any(|tag| task.has_tag(tag));

    let completion_match = filter.show_completed || !task.completed;

    search_match && priority_match && category_match && tag_match && completion_match
}

pub fn compare(a: &Task, b: &Task, sort: &SortState) -> Ordering {
    match sort.key {
        // Missing due dates go last whichever way the list runs.
        SortKey::Due => match (a.due, b.due) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => directed(x.cmp(&y), sort.direction),
        },
        SortKey::Priority => directed(a.priority.rank().cmp(&b.priority.rank()), sort.direction),
        SortKey::Created => directed(a.created_at.cmp(&b.created_at), sort.direction),
        SortKey::Manual => directed(
            a.order.unwrap_or(0).cmp(&b.order.unwrap_or(0)),
            sort.direction,
        ),
    }
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

/// Borrowing projection; equal keys keep collection order.
pub fn project_refs<'a>(
    tasks: &'a [Task],
    filter: &FilterState,
    sort: &SortState,
) -> Vec<&'a Task> {
    let mut visible: Vec<&Task> = tasks.iter().filter(|t| matches(t, filter)).collect();
    visible.sort_by(|a, b| compare(a, b, sort));
    visible
}

pub fn project(tasks: &[Task], filter: &FilterState, sort: &SortState) -> Vec<Task> {
    project_refs(tasks, filter, sort)
        .into_iter()
        .cloned()
        .collect()
}

impl Snapshot {
    pub fn visible_tasks(&self) -> Vec<&Task> {
        project_refs(&self.tasks, &self.filter, &self.sort)
    }
}
