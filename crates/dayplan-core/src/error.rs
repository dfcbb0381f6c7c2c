use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};

/// Validation and lookup failures surfaced to callers as typed values.
///
/// Store and CLI layers wrap these in `anyhow::Error`; the variant stays
/// reachable through `downcast_ref::<PlanError>()`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("unrecognized calendar date: {0:?}")]
    InvalidDate(String),

    #[error("unrecognized time of day: {0:?}")]
    InvalidTime(String),

    #[error("time range is empty or inverted: start {start} is not before end {end}")]
    InvertedTimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("time range {start} .. {end} does not lie within {date}")]
    OutsideDate {
        date: NaiveDate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("task name cannot be empty")]
    EmptyName,

    #[error("subtask {subtask_id} does not belong to task {task_id}")]
    UnknownSubtask { task_id: u64, subtask_id: u64 },

    #[error("subtask {0} appears more than once in the desired list")]
    DuplicateSubtask(u64),

    #[error("task not found: {0}")]
    TaskNotFound(u64),

    #[error("user not found: {0}")]
    UserNotFound(u64),

    #[error("no user registered with email {0:?}")]
    UnknownUser(String),

    #[error("email already registered: {0}")]
    DuplicateEmail(String),

    #[error("unknown category {0:?} (expected education or work)")]
    InvalidCategory(String),

    #[error("unknown category filter {0:?} (expected education, work or both)")]
    InvalidCategoryFilter(String),

    #[error("unknown status filter {0:?} (expected done, pending or both)")]
    InvalidStatusFilter(String),

    #[error("store transaction exceeded its {0:?} budget")]
    Timeout(Duration),
}
