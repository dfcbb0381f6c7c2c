use chrono::NaiveDate;
use serde::Serialize;

use crate::datetime::week_days;
use crate::task::Task;

/// Completion feedback for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub total: usize,
    pub completed: usize,
    /// Whole percent, rounded half up; 0 for an empty day.
    pub percentage: u8,
}

impl DaySummary {
    /// Counts every task given; callers pass the tasks of `date` only.
    pub fn from_tasks<'a, I>(date: NaiveDate, tasks: I) -> Self
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let (total, completed) = tasks.into_iter().fold((0usize, 0usize), |(t, c), task| {
            (t + 1, c + usize::from(task.completed))
        });
        Self {
            date,
            total,
            completed,
            percentage: percentage(completed, total),
        }
    }
}

fn percentage(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    let rounded = (part * 200 + whole) / (whole * 2);
    u8::try_from(rounded.min(100)).unwrap_or(100)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekDay {
    pub date: NaiveDate,
    pub total: usize,
    pub completed: usize,
    pub is_anchor: bool,
}

impl WeekDay {
    /// `Mon`, `Oct 14`
    pub fn labels(&self) -> (String, String) {
        (
            self.date.format("%a").to_string(),
            self.date.format("%b %-d").to_string(),
        )
    }
}

/// The Monday-first week around an anchor day, with per-day counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekStrip {
    pub days: Vec<WeekDay>,
}

impl WeekStrip {
    pub fn build(anchor: NaiveDate, tasks: &[Task]) -> Self {
        let days = week_days(anchor)
            .into_iter()
            .map(|date| {
                let summary = DaySummary::from_tasks(date, tasks.iter().filter(|t| t.date == date));
                WeekDay {
                    date,
                    total: summary.total,
                    completed: summary.completed,
                    is_anchor: date == anchor,
                }
            })
            .collect();
        Self { days }
    }

    pub fn previous_anchor(anchor: NaiveDate) -> NaiveDate {
        anchor - chrono::Duration::days(7)
    }

    pub fn next_anchor(anchor: NaiveDate) -> NaiveDate {
        anchor + chrono::Duration::days(7)
    }
}
