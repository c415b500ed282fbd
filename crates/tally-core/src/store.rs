//! Reducer-style state container.
//!
//! Every change to tasks, categories, tags or view preferences goes through
//! [`Action`] and the pure [`reduce`] transition. [`Store`] owns the current
//! [`Snapshot`] and swaps it for the reduced one in a single step, so readers
//! never see a half-applied action.

use tally_shared::{
    Category, FilterPatch, FilterState, SortPatch, SortState, Tag, Task, Theme, ThemePatch,
};
use tracing::{debug, trace};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub tasks: Vec<Task>,
    pub categories: Vec<Category>,
    pub tags: Vec<Tag>,
    pub filter: FilterState,
    pub sort: SortState,
    pub theme: Theme,
}

impl Snapshot {
    /// Startup state: empty collections, default filter and sort, theme seeded
    /// from the host light/dark preference.
    pub fn new(prefers_dark: bool) -> Self {
        Self {
            theme: Theme::seeded(prefers_dark),
            ..Self::default()
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn tag(&self, id: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetTasks(Vec<Task>),
    AddTask(Task),
    RemoveTask(String),
    ToggleTask(String),
    UpdateTask(Task),
    ReorderTasks(Vec<Task>),
    SetCategories(Vec<Category>),
    SetTags(Vec<Tag>),
    PatchFilter(FilterPatch),
    PatchSort(SortPatch),
    PatchTheme(ThemePatch),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetTasks(_) => "set_tasks",
            Self::AddTask(_) => "add_task",
            Self::RemoveTask(_) => "remove_task",
            Self::ToggleTask(_) => "toggle_task",
            Self::UpdateTask(_) => "update_task",
            Self::ReorderTasks(_) => "reorder_tasks",
            Self::SetCategories(_) => "set_categories",
            Self::SetTags(_) => "set_tags",
            Self::PatchFilter(_) => "patch_filter",
            Self::PatchSort(_) => "patch_sort",
            Self::PatchTheme(_) => "patch_theme",
        }
    }
}

/// Pure transition from one snapshot to the next. Total over well-formed
/// actions: unknown ids are ignored rather than reported.
pub fn reduce(mut state: Snapshot, action: Action) -> Snapshot {
    match action {
        Action::SetTasks(tasks) | Action::ReorderTasks(tasks) => {
            state.tasks = tasks;
        }
        Action::AddTask(task) => {
            state.tasks.push(task);
        }
        Action::RemoveTask(id) => {
            state.tasks.retain(|t| t.id != id);
        }
        Action::ToggleTask(id) => {
            if let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) {
                task.completed = !task.completed;
            }
        }
        Action::UpdateTask(task) => {
            if let Some(slot) = state.tasks.iter_mut().find(|t| t.id == task.id) {
                *slot = task;
            }
        }
        Action::SetCategories(categories) => {
            state.categories = categories;
        }
        Action::SetTags(tags) => {
            state.tags = tags;
        }
        Action::PatchFilter(patch) => {
            state.filter = state.filter.merge(patch);
        }
        Action::PatchSort(patch) => {
            state.sort = state.sort.merge(patch);
        }
        Action::PatchTheme(patch) => {
            state.theme = state.theme.merge(patch);
        }
    }
    state
}

#[derive(Debug, Default)]
pub struct Store {
    state: Snapshot,
}

impl Store {
    pub fn new(initial: Snapshot) -> Self {
        Self { state: initial }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.state
    }

    pub fn into_snapshot(self) -> Snapshot {
        self.state
    }

    pub fn dispatch(&mut self, action: Action) {
        debug!(action = action.name(), "dispatching action");
        let prior = std::mem::take(&mut self.state);
        self.state = reduce(prior, action);
        trace!(tasks = self.state.tasks.len(), "snapshot updated");
    }
}

/// Next manual rank for an appended task: one past the highest rank in use.
pub fn next_rank(tasks: &[Task]) -> i64 {
    tasks
        .iter()
        .filter_map(|t| t.order)
        .max()
        .map(|max| max + 1)
        .unwrap_or(tasks.len() as i64)
}

/// Moves `id` to `to_index` (clamped) and renumbers every task's manual rank
/// to its new position. Returns `None` when `id` is not in the collection.
pub fn reorder(tasks: &[Task], id: &str, to_index: usize) -> Option<Vec<Task>> {
    let from = tasks.iter().position(|t| t.id == id)?;
    let mut out = tasks.to_vec();
    let moved = out.remove(from);
    let to = to_index.min(out.len());
    out.insert(to, moved);
    for (rank, task) in out.iter_mut().enumerate() {
        task.order = Some(rank as i64);
    }
    Some(out)
}
