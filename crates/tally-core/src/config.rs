use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::TimeDelta;
use tally_shared::{SortDirection, SortKey, SortState};
use tracing::{debug, info, trace, warn};

use crate::auth::AuthLimits;

/// How the dark-mode flag is seeded at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DarkMode {
    Auto,
    On,
    Off,
}

#[derive(Debug, Clone)]
pub struct Config {
    map: HashMap<String, String>,
    pub loaded_files: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let mut map = HashMap::new();
        for (key, value) in [
            ("data.location", "~/.tally"),
            ("color", "on"),
            ("sort.key", "created"),
            ("sort.direction", "desc"),
            ("filter.show_completed", "on"),
            ("theme.name", "system"),
            ("theme.dark", "auto"),
            ("auth.max_attempts", "5"),
            ("auth.window_secs", "60"),
            ("auth.cooldown_secs", "3"),
        ] {
            map.insert(key.to_string(), value.to_string());
        }
        Self {
            map,
            loaded_files: vec![],
        }
    }
}

impl Config {
    #[tracing::instrument(skip(tallyrc_override))]
    pub fn load(tallyrc_override: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Config::default();

        let tallyrc = resolve_tallyrc_path(tallyrc_override)?;
        if let Some(path) = tallyrc {
            info!(tallyrc = %path.display(), "loading tallyrc");
            cfg.load_file(&path)?;
        } else {
            debug!("no tallyrc found; using defaults");
        }

        Ok(cfg)
    }

    #[tracing::instrument(skip(self, overrides))]
    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (k, v) in overrides {
            let key = k.strip_prefix("rc.").unwrap_or(&k).to_string();
            debug!(key = %key, value = %v, "applying override");
            self.map.insert(key, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.map.get(key).map(|v| parse_bool(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.map.iter()
    }

    pub fn sort_state(&self) -> anyhow::Result<SortState> {
        let mut sort = SortState::default();
        if let Some(raw) = self.get("sort.key") {
            sort.key = raw
                .parse::<SortKey>()
                .map_err(|e| anyhow!("invalid sort.key: {e}"))?;
        }
        if let Some(raw) = self.get("sort.direction") {
            sort.direction = raw
                .parse::<SortDirection>()
                .map_err(|e| anyhow!("invalid sort.direction: {e}"))?;
        }
        Ok(sort)
    }

    pub fn show_completed(&self) -> bool {
        self.get_bool("filter.show_completed").unwrap_or(true)
    }

    pub fn dark_mode(&self) -> anyhow::Result<DarkMode> {
        let raw = self.get("theme.dark").unwrap_or_else(|| "auto".to_string());
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" | "system" => Ok(DarkMode::Auto),
            "1" | "y" | "yes" | "on" | "true" => Ok(DarkMode::On),
            "0" | "n" | "no" | "off" | "false" => Ok(DarkMode::Off),
            other => Err(anyhow!("invalid theme.dark setting: {other}")),
        }
    }

    pub fn auth_limits(&self) -> anyhow::Result<AuthLimits> {
        let defaults = AuthLimits::default();
        let max_attempts = match self.get("auth.max_attempts") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("invalid auth.max_attempts: {raw}"))?,
            None => defaults.max_attempts,
        };
        let window = self.get_secs("auth.window_secs")?.unwrap_or(defaults.window);
        let cooldown = self
            .get_secs("auth.cooldown_secs")?
            .unwrap_or(defaults.cooldown);
        Ok(AuthLimits {
            max_attempts,
            window,
            cooldown,
        })
    }

    /// Non-negative whole seconds; `None` when the key is unset.
    fn get_secs(&self, key: &str) -> anyhow::Result<Option<TimeDelta>> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        let secs = raw
            .trim()
            .parse::<i64>()
            .with_context(|| format!("invalid {key}: {raw}"))?;
        if secs < 0 {
            return Err(anyhow!("invalid {key}: {raw} (must not be negative)"));
        }
        TimeDelta::try_seconds(secs)
            .map(Some)
            .ok_or_else(|| anyhow!("invalid {key}: {raw} (out of range)"))
    }

    #[tracing::instrument(skip(self))]
    fn load_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = expand_tilde(path);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        self.loaded_files.push(path.clone());

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        for (line_num, raw_line) in text.lines().enumerate() {
            let mut line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((before, _)) = line.split_once('#') {
                line = before.trim();
            }

            if line.is_empty() {
                continue;
            }

            if let Some(include_rest) = line.strip_prefix("include ") {
                let include_path = resolve_include_path(&base_dir, include_rest.trim())?;
                debug!(
                    file = %path.display(),
                    include = %include_path.display(),
                    line = line_num + 1,
                    "processing include"
                );

                if self.loaded_files.contains(&include_path) {
                    warn!(include = %include_path.display(), "include already loaded; skipping");
                } else if include_path.exists() {
                    self.load_file(&include_path)?;
                } else {
                    warn!(include = %include_path.display(), "include file does not exist; skipping");
                }
                continue;
            }

            let (k, v) = line.split_once('=').ok_or_else(|| {
                anyhow!(
                    "invalid config line {}:{}: {}",
                    path.display(),
                    line_num + 1,
                    raw_line
                )
            })?;

            let key = k.trim().to_string();
            let value = v.trim().to_string();
            trace!(key = %key, value = %value, "loaded config key");
            self.map.insert(key, value);
        }

        Ok(())
    }
}

#[tracing::instrument(skip(cfg, override_dir))]
pub fn resolve_data_dir(cfg: &Config, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = if let Some(path) = override_dir {
        path.to_path_buf()
    } else if let Some(cfg_value) = cfg.get("data.location") {
        expand_tilde(Path::new(&cfg_value))
    } else {
        default_data_dir()?
    };

    if !dir.exists() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    Ok(dir)
}

/// Reads the terminal's `COLORFGBG` ("fg;bg") and treats a dark background
/// color index as a dark-mode preference.
pub fn host_prefers_dark() -> bool {
    std::env::var("COLORFGBG")
        .ok()
        .as_deref()
        .map(colorfgbg_is_dark)
        .unwrap_or(false)
}

fn colorfgbg_is_dark(raw: &str) -> bool {
    raw.rsplit(';')
        .next()
        .and_then(|bg| bg.trim().parse::<u8>().ok())
        .map(|bg| bg <= 6 || bg == 8)
        .unwrap_or(false)
}

#[tracing::instrument(skip(override_path))]
fn resolve_tallyrc_path(override_path: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = override_path {
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(tallyrc_env) = std::env::var("TALLYRC") {
        if tallyrc_env == "/dev/null" {
            return Ok(None);
        }
        return Ok(Some(PathBuf::from(tallyrc_env)));
    }

    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    let candidate = home.join(".tallyrc");
    if candidate.exists() {
        return Ok(Some(candidate));
    }

    Ok(None)
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".tally"))
}

fn resolve_include_path(base_dir: &Path, include: &str) -> anyhow::Result<PathBuf> {
    if include.trim().is_empty() {
        return Err(anyhow!("include path cannot be empty"));
    }

    let raw = PathBuf::from(include);
    let expanded = expand_tilde(&raw);
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(base_dir.join(expanded))
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if let Some(rest) = text.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "y" | "yes" | "on" | "true"
    )
}
