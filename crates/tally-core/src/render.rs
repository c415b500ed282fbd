use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tally_shared::{Priority, Task};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_local_date;
use crate::stats::Stats;
use crate::store::Snapshot;

const SHORT_ID_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, tasks, snapshot, now))]
    pub fn print_task_table(
        &mut self,
        tasks: &[&Task],
        snapshot: &Snapshot,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let rows = tasks
            .iter()
            .map(|task| self.task_row(task, snapshot, now))
            .collect();
        write_table(&mut out, table_headers(), rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task, snapshot))]
    pub fn print_task_info(&mut self, task: &Task, snapshot: &Snapshot) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "title     {}", task.title)?;
        if let Some(description) = &task.description {
            writeln!(out, "desc      {description}")?;
        }
        writeln!(out, "status    {}", if task.completed { "done" } else { "open" })?;
        writeln!(out, "priority  {}", task.priority.as_str())?;
        writeln!(out, "category  {}", category_label(task, snapshot))?;
        writeln!(out, "tags      {}", tag_labels(task, snapshot).join(", "))?;
        writeln!(out, "created   {}", task.created_at.to_rfc3339())?;
        writeln!(out, "updated   {}", task.updated_at.to_rfc3339())?;
        if let Some(due) = task.due {
            writeln!(out, "due       {}", due.to_rfc3339())?;
        }
        if let Some(order) = task.order {
            writeln!(out, "order     {order}")?;
        }

        Ok(())
    }

    pub fn print_stats(&mut self, stats: &Stats, pending_visible: usize) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "total       {}", stats.total)?;
        writeln!(out, "completed   {}", stats.completed)?;
        writeln!(out, "pending     {} ({} visible)", stats.pending, pending_visible)?;
        writeln!(out, "overdue     {}", stats.overdue)?;
        writeln!(
            out,
            "priority    high {} / medium {} / low {}",
            stats.high, stats.medium, stats.low
        )?;
        writeln!(out, "complete    {}%", stats.completion_rate())?;
        Ok(())
    }

    pub fn print_rows(&mut self, headers: &[&str], rows: Vec<Vec<String>>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        write_table(
            &mut out,
            headers.iter().map(|h| h.to_string()).collect(),
            rows,
        )
    }

    fn task_row(&self, task: &Task, snapshot: &Snapshot, now: DateTime<Utc>) -> Vec<String> {
        let id = self.paint(short_id(&task.id), "33");
        let done = if task.completed { "x" } else { " " }.to_string();

        let priority = match task.priority {
            Priority::High => self.paint("high", "31"),
            other => other.as_str().to_string(),
        };

        let due = task.due.map(format_local_date).unwrap_or_default();
        let due = if task.is_overdue(now) {
            self.paint(&due, "31")
        } else {
            due
        };

        let tags = tag_labels(task, snapshot)
            .iter()
            .map(|tag| format!("+{tag}"))
            .collect::<Vec<_>>()
            .join(" ");

        vec![
            id,
            done,
            priority,
            due,
            category_label(task, snapshot),
            task.title.clone(),
            tags,
        ]
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn table_headers() -> Vec<String> {
    ["ID", "Done", "Pri", "Due", "Category", "Title", "Tags"]
        .iter()
        .map(|h| h.to_string())
        .collect()
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Category name, or the raw id when the category no longer exists.
fn category_label(task: &Task, snapshot: &Snapshot) -> String {
    match task.category_id.as_deref() {
        None => String::new(),
        Some(id) => snapshot
            .category(id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| id.to_string()),
    }
}

fn tag_labels(task: &Task, snapshot: &Snapshot) -> Vec<String> {
    task.tags
        .iter()
        .map(|id| {
            snapshot
                .tag(id)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| id.clone())
        })
        .collect()
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (idx, header) in headers.iter().enumerate() {
        write!(writer, "{:width$} ", header, width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
