use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::calendar_date_serde;
use crate::error::PlanError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Education,
    Work,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Education => "education",
            Category::Work => "work",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "education" => Ok(Category::Education),
            "work" => Ok(Category::Work),
            _ => Err(PlanError::InvalidCategory(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub completed: bool,
}

/// A subtask as edited in a form: no id means "not stored yet", and an absent
/// completion flag means "leave whatever is stored".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DesiredSubtask {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub completed: Option<bool>,
}

impl DesiredSubtask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            completed: None,
        }
    }

    pub fn existing(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            completed: None,
        }
    }
}

impl From<&Subtask> for DesiredSubtask {
    fn from(subtask: &Subtask) -> Self {
        Self {
            id: Some(subtask.id),
            name: subtask.name.clone(),
            completed: Some(subtask.completed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: u64,

    pub owner_id: u64,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(with = "calendar_date_serde")]
    pub date: NaiveDate,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    pub category: Category,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub subtasks: Vec<Subtask>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    pub fn subtask_mut(&mut self, id: u64) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id == id)
    }

    pub fn completed_subtasks(&self) -> usize {
        self.subtasks.iter().filter(|s| s.completed).count()
    }
}
