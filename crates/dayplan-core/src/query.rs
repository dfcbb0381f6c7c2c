use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};
use tracing::trace;

use crate::datetime::day_range;
use crate::error::PlanError;
use crate::task::{
  Category,
  Task
};

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CategoryFilter {
  Education,
  Work,
  #[default]
  Both
}

impl CategoryFilter {
  pub fn admits(
    self,
    category: Category
  ) -> bool {
    match self {
      | CategoryFilter::Both => true,
      | CategoryFilter::Education => {
        category == Category::Education
      }
      | CategoryFilter::Work => {
        category == Category::Work
      }
    }
  }
}

impl FromStr for CategoryFilter {
  type Err = PlanError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "education" => {
        Ok(CategoryFilter::Education)
      }
      | "work" => Ok(CategoryFilter::Work),
      | "both" => {
        Ok(CategoryFilter::Both)
      }
      | _ => {
        Err(
          PlanError::InvalidCategoryFilter(
            s.to_string()
          )
        )
      }
    }
  }
}

impl fmt::Display for CategoryFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(match self {
      | CategoryFilter::Education => {
        "education"
      }
      | CategoryFilter::Work => "work",
      | CategoryFilter::Both => "both"
    })
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
  Done,
  Pending,
  #[default]
  Both
}

impl StatusFilter {
  pub fn admits(
    self,
    completed: bool
  ) -> bool {
    match self {
      | StatusFilter::Both => true,
      | StatusFilter::Done => completed,
      | StatusFilter::Pending => {
        !completed
      }
    }
  }
}

impl FromStr for StatusFilter {
  type Err = PlanError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "done" => {
        Ok(StatusFilter::Done)
      }
      | "pending" => {
        Ok(StatusFilter::Pending)
      }
      | "both" => {
        Ok(StatusFilter::Both)
      }
      | _ => {
        Err(
          PlanError::InvalidStatusFilter(
            s.to_string()
          )
        )
      }
    }
  }
}

impl fmt::Display for StatusFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(match self {
      | StatusFilter::Done => "done",
      | StatusFilter::Pending => {
        "pending"
      }
      | StatusFilter::Both => "both"
    })
  }
}

/// What the persistence side must be able
/// to filter on. `Both` means "no filter",
/// never a literal value.
#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct TaskQuery {
  pub user_id:  u64,
  #[serde(default)]
  pub date:     Option<NaiveDate>,
  #[serde(default)]
  pub category: CategoryFilter,
  #[serde(default)]
  pub status:   StatusFilter
}

impl TaskQuery {
  pub fn for_user(user_id: u64) -> Self {
    Self {
      user_id,
      date: None,
      category: CategoryFilter::Both,
      status: StatusFilter::Both
    }
  }

  #[must_use]
  pub fn on(
    mut self,
    date: NaiveDate
  ) -> Self {
    self.date = Some(date);
    self
  }

  #[must_use]
  pub fn category(
    mut self,
    category: CategoryFilter
  ) -> Self {
    self.category = category;
    self
  }

  #[must_use]
  pub fn status(
    mut self,
    status: StatusFilter
  ) -> Self {
    self.status = status;
    self
  }

  pub fn matches(
    &self,
    task: &Task,
    tz: &Tz
  ) -> bool {
    if task.owner_id != self.user_id {
      return false;
    }
    if !self.category.admits(task.category)
    {
      return false;
    }
    if !self.status.admits(task.completed)
    {
      return false;
    }
    if let Some(date) = self.date
      && !day_range(date, tz)
        .contains(task.start_time)
    {
      return false;
    }
    trace!(task_id = task.id, "task matched query");
    true
  }

  /// Filters and orders by start instant
  /// (then id).
  pub fn run<'a, I>(
    &self,
    tasks: I,
    tz: &Tz
  ) -> Vec<Task>
  where
    I: IntoIterator<Item = &'a Task>
  {
    let mut out: Vec<Task> = tasks
      .into_iter()
      .filter(|task| self.matches(task, tz))
      .cloned()
      .collect();
    out.sort_by_key(|t| {
      (t.start_time, t.id)
    });
    out
  }
}
