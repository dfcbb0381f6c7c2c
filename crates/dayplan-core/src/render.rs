use std::io::{self, IsTerminal, Write};

use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_clock;
use crate::grouping::DayGroup;
use crate::layout::Position;
use crate::summary::{DaySummary, WeekStrip};
use crate::task::{Category, Task};
use crate::user::User;

/// ANSI foreground codes cycled through by task id.
const PALETTE: [&str; 6] = ["34", "32", "35", "33", "36", "31"];

/// Character columns used to draw the timeline lane bar.
const TRACK_COLUMNS: usize = 20;

/// A card never draws narrower than one lane step.
const MIN_CARD_COLUMNS: usize = 4;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    tz: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config, tz: Tz) -> Self {
        Self {
            color: cfg.color,
            tz,
        }
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_task_table(&self, tasks: &[Task]) -> anyhow::Result<()> {
        self.write_task_table(io::stdout().lock(), tasks)
    }

    fn write_task_table<W: Write>(&self, out: W, tasks: &[Task]) -> anyhow::Result<()> {
        let headers = ["ID", "Date", "Time", "Mins", "Category", "Name", "Subtasks", "Status"]
            .map(String::from)
            .to_vec();

        let rows = tasks
            .iter()
            .map(|task| {
                vec![
                    self.paint(&task.id.to_string(), task_color(task.id)),
                    task.date.format("%Y-%m-%d").to_string(),
                    self.time_range(task),
                    task.duration_minutes().to_string(),
                    category_label(task.category).to_string(),
                    task.name.clone(),
                    subtask_progress(task),
                    self.status_label(task.completed),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip(self, entries))]
    pub fn print_timeline(&self, entries: &[(Task, Position)]) -> anyhow::Result<()> {
        self.write_timeline(io::stdout().lock(), entries)
    }

    fn write_timeline<W: Write>(&self, out: W, entries: &[(Task, Position)]) -> anyhow::Result<()> {
        let headers = ["ID", "Time", "Top", "Height", "Left", "Width", "Lane", "Name"]
            .map(String::from)
            .to_vec();

        let rows = entries
            .iter()
            .map(|(task, pos)| {
                vec![
                    self.paint(&task.id.to_string(), task_color(task.id)),
                    self.time_range(task),
                    format!("{:.2}%", pos.top_percent()),
                    format!("{:.2}%", pos.height_percent()),
                    format!("{:.0}%", pos.left_percent()),
                    format!("{:.0}%", pos.width_percent()),
                    lane_bar(pos),
                    task.name.clone(),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip(self, groups))]
    pub fn print_agenda(&self, groups: &[DayGroup]) -> anyhow::Result<()> {
        self.write_agenda(io::stdout().lock(), groups)
    }

    fn write_agenda<W: Write>(&self, mut out: W, groups: &[DayGroup]) -> anyhow::Result<()> {
        if groups.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        for (idx, group) in groups.iter().enumerate() {
            if idx > 0 {
                writeln!(out)?;
            }
            writeln!(out, "{}", self.paint(&group.day.format("%B %d, %Y").to_string(), "1"))?;
            for task in &group.tasks {
                writeln!(
                    out,
                    "  {}  {:<9} {} [{}] {}",
                    self.time_range(task),
                    category_label(task.category),
                    task.name,
                    self.status_label(task.completed),
                    subtask_progress(task)
                )?;
                for subtask in &task.subtasks {
                    let mark = if subtask.completed { "x" } else { " " };
                    writeln!(out, "      [{mark}] {}", subtask.name)?;
                }
            }
        }
        Ok(())
    }

    pub fn print_summary(&self, summary: &DaySummary) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "date        {}", summary.date.format("%Y-%m-%d"))?;
        writeln!(out, "total       {}", summary.total)?;
        writeln!(out, "completed   {}", summary.completed)?;
        writeln!(out, "percentage  {}%", summary.percentage)?;
        Ok(())
    }

    pub fn print_week(&self, strip: &WeekStrip) -> anyhow::Result<()> {
        let headers = ["Day", "Date", "Tasks", "Done"].map(String::from).to_vec();
        let rows = strip
            .days
            .iter()
            .map(|day| {
                let (weekday, date) = day.labels();
                let weekday = if day.is_anchor {
                    self.paint(&weekday, "1")
                } else {
                    weekday
                };
                vec![weekday, date, day.total.to_string(), day.completed.to_string()]
            })
            .collect();
        write_table(io::stdout().lock(), headers, rows)
    }

    pub fn print_users(&self, users: &[User]) -> anyhow::Result<()> {
        let headers = ["ID", "Name", "Email", "Age", "Born", "Phone"]
            .map(String::from)
            .to_vec();
        let rows = users
            .iter()
            .map(|u| {
                vec![
                    u.id.to_string(),
                    u.name.clone(),
                    u.email.clone(),
                    u.age.to_string(),
                    u.date_of_birth.format("%Y-%m-%d").to_string(),
                    u.phone_number.clone(),
                ]
            })
            .collect();
        write_table(io::stdout().lock(), headers, rows)
    }

    fn time_range(&self, task: &Task) -> String {
        format!(
            "{}-{}",
            format_clock(task.start_time, &self.tz),
            format_clock(task.end_time, &self.tz)
        )
    }

    fn status_label(&self, completed: bool) -> String {
        if completed {
            self.paint("done", "32")
        } else {
            "pending".to_string()
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn category_label(category: Category) -> &'static str {
    category.as_str()
}

fn subtask_progress(task: &Task) -> String {
    if task.subtasks.is_empty() {
        return String::new();
    }
    format!("{}/{}", task.completed_subtasks(), task.subtasks.len())
}

/// Stable colour per task so the same task reads the same across views.
fn task_color(id: u64) -> &'static str {
    let hash = id.to_string().bytes().fold(0u64, |acc, b| {
        acc.wrapping_shl(5).wrapping_add(u64::from(b))
    });
    PALETTE[(hash % PALETTE.len() as u64) as usize]
}

fn lane_bar(pos: &Position) -> String {
    let offset = ((pos.left * TRACK_COLUMNS as f64).round().max(0.0) as usize)
        .min(TRACK_COLUMNS - MIN_CARD_COLUMNS);
    let filled = TRACK_COLUMNS - offset;
    format!("{}{}", ".".repeat(offset), "#".repeat(filled))
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
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
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
