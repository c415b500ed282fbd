use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tally_shared::{Priority, SortDirection, SortKey};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tally",
    version,
    about = "Tally: a small personal task list",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "tallyrc")]
    pub tallyrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show the filtered, sorted task list.
    List(ListArgs),
    /// Create a task.
    Add(AddArgs),
    /// Change fields of an existing task.
    Edit(EditArgs),
    /// Flip a task between open and done.
    Done { task: String },
    /// Remove a task.
    Delete { task: String },
    /// Place a task at a 1-based position in the manual order.
    Move { task: String, position: usize },
    /// Show every field of one task.
    Info { task: String },
    /// Totals across the whole collection.
    Stats,
    #[command(subcommand)]
    Category(LabelCommand),
    #[command(subcommand)]
    Tag(LabelCommand),
    /// Update and save the theme.
    Theme(ThemeArgs),
    /// Update and save the default filter and sort.
    Prefs(PrefsArgs),
    /// Print the effective configuration.
    Show,
}

#[derive(Subcommand, Debug, Clone)]
pub enum LabelCommand {
    Add {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    List,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Case-insensitive title search; an empty string clears it.
    #[arg(long)]
    pub search: Option<String>,

    /// `low`, `medium`, `high` or `all`.
    #[arg(long)]
    pub priority: Option<String>,

    /// Category name or id, or `all`.
    #[arg(long)]
    pub category: Option<String>,

    /// Tag name or id; a task matches when it carries any of them.
    #[arg(long = "tag", action = ArgAction::Append)]
    pub tags: Vec<String>,

    #[arg(long, conflicts_with = "hide_completed")]
    pub show_completed: bool,

    #[arg(long)]
    pub hide_completed: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SortArgs {
    /// `due`, `priority`, `created` or `manual`. Repeating the active key
    /// flips its direction.
    #[arg(long)]
    pub sort: Option<SortKey>,

    #[arg(long, conflicts_with = "desc")]
    pub asc: bool,

    #[arg(long)]
    pub desc: bool,
}

impl SortArgs {
    pub fn direction(&self) -> Option<SortDirection> {
        if self.asc {
            Some(SortDirection::Asc)
        } else if self.desc {
            Some(SortDirection::Desc)
        } else {
            None
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    #[command(flatten)]
    pub sort: SortArgs,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    #[arg(long = "desc")]
    pub description: Option<String>,

    #[arg(long)]
    pub due: Option<String>,

    #[arg(long, short = 'p')]
    pub priority: Option<Priority>,

    #[arg(long, short = 'c')]
    pub category: Option<String>,

    #[arg(long = "tag", short = 't', action = ArgAction::Append)]
    pub tags: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub task: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long = "desc", conflicts_with = "clear_desc")]
    pub description: Option<String>,

    #[arg(long)]
    pub clear_desc: bool,

    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<String>,

    #[arg(long)]
    pub clear_due: bool,

    #[arg(long, short = 'p')]
    pub priority: Option<Priority>,

    #[arg(long, short = 'c', conflicts_with = "clear_category")]
    pub category: Option<String>,

    #[arg(long)]
    pub clear_category: bool,

    /// Adds the tag when absent, removes it when present.
    #[arg(long = "tag", short = 't', action = ArgAction::Append)]
    pub toggle_tags: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ThemeArgs {
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, conflicts_with = "clear_background")]
    pub background: Option<String>,

    #[arg(long)]
    pub clear_background: bool,

    /// `on` or `off`.
    #[arg(long)]
    pub dark: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PrefsArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    #[command(flatten)]
    pub sort: SortArgs,

    /// Forget saved filter and sort before applying the flags.
    #[arg(long)]
    pub reset: bool,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` words out of the argument
/// list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest
                .split_once('=')
                .or_else(|| rest.split_once(':'))
                .map(|(k, v)| (format!("rc.{k}"), v.to_string()));

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
