use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tally_shared::{Category, FilterState, SortState, Tag, Task, Theme};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::store::Snapshot;

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub categories_path: PathBuf,
    pub tags_path: PathBuf,
    pub prefs_path: PathBuf,
}

/// View preferences the user explicitly saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedPrefs {
    #[serde(default)]
    pub filter: Option<FilterState>,
    #[serde(default)]
    pub sort: Option<SortState>,
    #[serde(default)]
    pub theme: Option<Theme>,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let categories_path = data_dir.join("categories.data");
        let tags_path = data_dir.join("tags.data");
        let prefs_path = data_dir.join("prefs.toml");

        for path in [&tasks_path, &categories_path, &tags_path, &prefs_path] {
            if !path.exists() {
                fs::write(path, "")
                    .with_context(|| format!("failed to create {}", path.display()))?;
            }
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            categories = %categories_path.display(),
            tags = %tags_path.display(),
            prefs = %prefs_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            categories_path,
            tags_path,
            prefs_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_categories(&self) -> anyhow::Result<Vec<Category>> {
        load_jsonl(&self.categories_path).context("failed to load categories.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tags(&self) -> anyhow::Result<Vec<Tag>> {
        load_jsonl(&self.tags_path).context("failed to load tags.data")
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    #[tracing::instrument(skip(self, categories))]
    pub fn save_categories(&self, categories: &[Category]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.categories_path, categories)
            .context("failed to save categories.data")
    }

    #[tracing::instrument(skip(self, tags))]
    pub fn save_tags(&self, tags: &[Tag]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tags_path, tags).context("failed to save tags.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_prefs(&self) -> anyhow::Result<SavedPrefs> {
        let raw = fs::read_to_string(&self.prefs_path)
            .with_context(|| format!("failed reading {}", self.prefs_path.display()))?;
        if raw.trim().is_empty() {
            return Ok(SavedPrefs::default());
        }
        toml::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.prefs_path.display()))
    }

    #[tracing::instrument(skip(self, prefs))]
    pub fn save_prefs(&self, prefs: &SavedPrefs) -> anyhow::Result<()> {
        let text = toml::to_string_pretty(prefs).context("failed to serialize preferences")?;
        write_atomic(&self.prefs_path, text.as_bytes())
    }

    /// Collections as persisted; preferences are left at their defaults.
    pub fn load_collections(&self) -> anyhow::Result<Snapshot> {
        Ok(Snapshot {
            tasks: self.load_tasks()?,
            categories: self.load_categories()?,
            tags: self.load_tags()?,
            ..Snapshot::default()
        })
    }

    pub fn save_collections(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        self.save_tasks(&snapshot.tasks)?;
        self.save_categories(&snapshot.categories)?;
        self.save_tags(&snapshot.tags)?;
        Ok(())
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let mut buf = Vec::new();
    for record in records {
        serde_json::to_writer(&mut buf, record)?;
        buf.push(b'\n');
    }
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
