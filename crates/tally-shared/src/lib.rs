use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Numeric rank used when ordering by priority: low < medium < high.
    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Self::Low),
            "medium" | "med" | "m" => Ok(Self::Medium),
            "high" | "h" => Ok(Self::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Manual rank, only consulted when sorting manually.
    #[serde(default)]
    pub order: Option<i64>,
}

impl Task {
    pub fn new(title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::with_id(new_id(), title, now)
    }

    pub fn with_id(id: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            completed: false,
            created_at: now,
            updated_at: now,
            due: None,
            priority: Priority::default(),
            category_id: None,
            tags: vec![],
            order: None,
        }
    }

    pub fn has_tag(&self, tag_id: &str) -> bool {
        self.tags.iter().any(|t| t == tag_id)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due.map(|due| due < now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color: String,
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Either every value passes, or only the one selected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Selector<T> {
    #[default]
    All,
    Only(T),
}

impl<T: PartialEq> Selector<T> {
    pub fn admits(&self, value: &T) -> bool {
        match self {
            Self::All => true,
            Self::Only(selected) => selected == value,
        }
    }
}

impl<T> Selector<T> {
    pub fn only(&self) -> Option<&T> {
        match self {
            Self::All => None,
            Self::Only(selected) => Some(selected),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterState {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub priority: Selector<Priority>,
    #[serde(default)]
    pub category: Selector<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_show_completed")]
    pub show_completed: bool,
}

fn default_show_completed() -> bool {
    true
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            search: String::new(),
            priority: Selector::All,
            category: Selector::All,
            tags: vec![],
            show_completed: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct FilterPatch {
    pub search: Option<String>,
    pub priority: Option<Selector<Priority>>,
    pub category: Option<Selector<String>>,
    pub tags: Option<Vec<String>>,
    pub show_completed: Option<bool>,
}

impl FilterState {
    pub fn merge(mut self, patch: FilterPatch) -> Self {
        if let Some(search) = patch.search {
            self.search = search;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(show_completed) = patch.show_completed {
            self.show_completed = show_completed;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Due,
    Priority,
    #[default]
    Created,
    Manual,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Due => "due",
            Self::Priority => "priority",
            Self::Created => "created",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "due" | "due_date" | "duedate" => Ok(Self::Due),
            "priority" | "pri" => Ok(Self::Priority),
            "created" | "created_at" | "createdat" | "entry" => Ok(Self::Created),
            "manual" | "order" => Ok(Self::Manual),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl std::str::FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "+" => Ok(Self::Asc),
            "desc" | "descending" | "-" => Ok(Self::Desc),
            other => Err(format!("unknown sort direction: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SortState {
    #[serde(default)]
    pub key: SortKey,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SortPatch {
    pub key: Option<SortKey>,
    pub direction: Option<SortDirection>,
}

impl SortPatch {
    /// Selecting the active key flips its direction; any other key starts ascending.
    pub fn toggle(current: &SortState, key: SortKey) -> Self {
        if current.key == key {
            Self {
                key: None,
                direction: Some(current.direction.flipped()),
            }
        } else {
            Self {
                key: Some(key),
                direction: Some(SortDirection::Asc),
            }
        }
    }
}

impl SortState {
    pub fn merge(mut self, patch: SortPatch) -> Self {
        if let Some(key) = patch.key {
            self.key = key;
        }
        if let Some(direction) = patch.direction {
            self.direction = direction;
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Theme {
    pub name: String,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub dark: bool,
}

impl Theme {
    pub fn seeded(prefers_dark: bool) -> Self {
        Self {
            name: "system".to_string(),
            background: None,
            dark: prefers_dark,
        }
    }

    pub fn merge(mut self, patch: ThemePatch) -> Self {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(background) = patch.background {
            self.background = background;
        }
        if let Some(dark) = patch.dark {
            self.dark = dark;
        }
        self
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::seeded(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ThemePatch {
    pub name: Option<String>,
    pub background: Option<Option<String>>,
    pub dark: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_patch_only_touches_named_fields() {
        let base = FilterState {
            search: "milk".to_string(),
            tags: vec!["home".to_string()],
            ..FilterState::default()
        };

        let merged = base.clone().merge(FilterPatch {
            priority: Some(Selector::Only(Priority::High)),
            ..FilterPatch::default()
        });

        assert_eq!(merged.search, "milk");
        assert_eq!(merged.tags, vec!["home".to_string()]);
        assert_eq!(merged.priority, Selector::Only(Priority::High));
        assert!(merged.show_completed);
    }

    #[test]
    fn sort_toggle_flips_same_key_and_resets_new_key() {
        let current = SortState::default();
        assert_eq!(current.key, SortKey::Created);
        assert_eq!(current.direction, SortDirection::Desc);

        let same = current.merge(SortPatch::toggle(&current, SortKey::Created));
        assert_eq!(same.key, SortKey::Created);
        assert_eq!(same.direction, SortDirection::Asc);

        let other = same.merge(SortPatch::toggle(&same, SortKey::Due));
        assert_eq!(other.key, SortKey::Due);
        assert_eq!(other.direction, SortDirection::Asc);
    }

    #[test]
    fn theme_patch_can_clear_background() {
        let theme = Theme {
            background: Some("https://example.com/bg.png".to_string()),
            ..Theme::seeded(true)
        };
        let cleared = theme.merge(ThemePatch {
            background: Some(None),
            ..ThemePatch::default()
        });
        assert_eq!(cleared.background, None);
        assert!(cleared.dark);
        assert_eq!(cleared.name, "system");
    }

    #[test]
    fn task_round_trips_through_json_with_defaults() {
        let raw = r#"{
            "id": "t1",
            "title": "water plants",
            "created_at": "2024-01-01T08:00:00Z",
            "updated_at": "2024-01-01T08:00:00Z"
        }"#;
        let task: Task = serde_json::from_str(raw).unwrap();
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.tags.is_empty());
        assert!(!task.completed);
        assert_eq!(task.order, None);
    }
}
