use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::datetime::{day_range, parse_calendar_date, parse_time_on};
use crate::error::PlanError;
use crate::reconcile::{ReconcilePlan, apply_plan, reconcile};
use crate::task::{Category, DesiredSubtask, Subtask, Task};

/// The add/edit payload as it arrives from a form or a JSON file.
///
/// Without `id` it creates a task; with `id` it updates that task and, when
/// `subtasks` is present, reconciles the subtask list against it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskUpsert {
    #[serde(default)]
    pub id: Option<u64>,
    pub owner_id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub date: String,
    pub start: String,
    pub end: String,
    pub category: Category,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub subtasks: Option<Vec<DesiredSubtask>>,
}

/// A `TaskUpsert` whose date and times have been resolved and checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTaskUpsert {
    pub id: Option<u64>,
    pub owner_id: u64,
    pub name: String,
    pub description: String,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub category: Category,
    pub completed: Option<bool>,
    pub subtasks: Option<Vec<DesiredSubtask>>,
}

impl TaskUpsert {
    pub fn validate(self, tz: &Tz) -> Result<ValidTaskUpsert, PlanError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(PlanError::EmptyName);
        }

        let date = parse_calendar_date(&self.date)?;
        let start_time = parse_time_on(date, &self.start, tz)?;
        let end_time = parse_time_on(date, &self.end, tz)?;
        if start_time >= end_time {
            return Err(PlanError::InvertedTimeRange {
                start: start_time,
                end: end_time,
            });
        }

        // Timestamps are taken as written, so they may name another day.
        let day = day_range(date, tz);
        if !day.contains(start_time) || end_time > day.end {
            return Err(PlanError::OutsideDate {
                date,
                start: start_time,
                end: end_time,
            });
        }

        Ok(ValidTaskUpsert {
            id: self.id,
            owner_id: self.owner_id,
            name,
            description: self.description,
            date,
            start_time,
            end_time,
            category: self.category,
            completed: self.completed,
            subtasks: self.subtasks,
        })
    }
}

/// Outcome of an upsert, kept for logging and CLI feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub task: Task,
    pub created: bool,
    pub plan: Option<ReconcilePlan>,
}

fn next_task_id(tasks: &[Task]) -> u64 {
    tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
}

fn max_subtask_id(tasks: &[Task]) -> u64 {
    tasks
        .iter()
        .flat_map(|t| t.subtasks.iter().map(|s| s.id))
        .max()
        .unwrap_or(0)
}

/// Applies a validated upsert to an in-memory task list. Nothing is written;
/// callers run this inside a store transaction.
pub fn apply_upsert(
    tasks: &mut Vec<Task>,
    upsert: ValidTaskUpsert,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome, PlanError> {
    let mut subtask_seq = max_subtask_id(tasks);

    let Some(id) = upsert.id else {
        let id = next_task_id(tasks);
        let subtasks = upsert
            .subtasks
            .unwrap_or_default()
            .into_iter()
            .map(|entry| {
                // A fresh task has nothing to reconcile against.
                if let Some(subtask_id) = entry.id {
                    return Err(PlanError::UnknownSubtask {
                        task_id: id,
                        subtask_id,
                    });
                }
                subtask_seq += 1;
                Ok(Subtask {
                    id: subtask_seq,
                    name: entry.name,
                    completed: entry.completed.unwrap_or(false),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let task = Task {
            id,
            owner_id: upsert.owner_id,
            name: upsert.name,
            description: upsert.description,
            date: upsert.date,
            start_time: upsert.start_time,
            end_time: upsert.end_time,
            category: upsert.category,
            completed: upsert.completed.unwrap_or(false),
            subtasks,
            created_at: now,
            updated_at: now,
        };
        tasks.push(task.clone());
        info!(task_id = id, subtasks = task.subtasks.len(), "created task");
        return Ok(UpsertOutcome {
            task,
            created: true,
            plan: None,
        });
    };

    let task = tasks
        .iter_mut()
        .find(|t| t.id == id && t.owner_id == upsert.owner_id)
        .ok_or(PlanError::TaskNotFound(id))?;

    // Reconcile before touching the task so a bad subtask reference leaves
    // it exactly as it was.
    let plan = upsert
        .subtasks
        .as_deref()
        .map(|desired| reconcile(id, &task.subtasks, desired))
        .transpose()?;

    task.name = upsert.name;
    task.description = upsert.description;
    task.date = upsert.date;
    task.start_time = upsert.start_time;
    task.end_time = upsert.end_time;
    task.category = upsert.category;
    if let Some(completed) = upsert.completed {
        task.completed = completed;
    }
    if let Some(plan) = &plan {
        apply_plan(task, plan, || {
            subtask_seq += 1;
            subtask_seq
        });
    }
    task.updated_at = now;

    debug!(task_id = id, reconciled = plan.is_some(), "updated task");
    Ok(UpsertOutcome {
        task: task.clone(),
        created: false,
        plan,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn payload() -> TaskUpsert {
        TaskUpsert {
            id: None,
            owner_id: 1,
            name: "Study".to_string(),
            description: "chapter 3".to_string(),
            date: "2024-10-20".to_string(),
            start: "09:00 AM".to_string(),
            end: "10:30 AM".to_string(),
            category: Category::Education,
            completed: None,
            subtasks: Some(vec![DesiredSubtask::new("read"), DesiredSubtask::new("notes")]),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 19, 8, 0, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn validation_resolves_times_on_the_date() {
        let valid = payload().validate(&chrono_tz::UTC).expect("valid");
        assert_eq!(valid.date, NaiveDate::from_ymd_opt(2024, 10, 20).expect("date"));
        assert_eq!(
            valid.start_time,
            Utc.with_ymd_and_hms(2024, 10, 20, 9, 0, 0).single().expect("start")
        );
        assert_eq!((valid.end_time - valid.start_time).num_minutes(), 90);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let mut p = payload();
        p.start = "11:00".to_string();
        p.end = "10:00".to_string();
        assert!(matches!(
            p.validate(&chrono_tz::UTC),
            Err(PlanError::InvertedTimeRange { .. })
        ));

        let mut zero = payload();
        zero.end = zero.start.clone();
        assert!(matches!(
            zero.validate(&chrono_tz::UTC),
            Err(PlanError::InvertedTimeRange { .. })
        ));
    }

    #[test]
    fn timestamps_must_fall_on_the_task_date() {
        let mut far = payload();
        far.date = "2024-03-04".to_string();
        far.start = "2024-03-09T09:00:00Z".to_string();
        far.end = "2024-03-09T10:00:00Z".to_string();
        assert!(matches!(
            far.validate(&chrono_tz::UTC),
            Err(PlanError::OutsideDate { .. })
        ));

        let mut overnight = payload();
        overnight.date = "2024-03-04".to_string();
        overnight.start = "2024-03-04T23:00:00Z".to_string();
        overnight.end = "2024-03-05T01:00:00Z".to_string();
        assert!(matches!(
            overnight.validate(&chrono_tz::UTC),
            Err(PlanError::OutsideDate { .. })
        ));

        // Ending exactly at the next midnight still fits the day.
        let mut late = payload();
        late.date = "2024-03-04".to_string();
        late.start = "2024-03-04T23:00:00Z".to_string();
        late.end = "2024-03-05T00:00:00Z".to_string();
        assert!(late.validate(&chrono_tz::UTC).is_ok());
    }

    #[test]
    fn the_day_is_judged_in_the_planner_timezone() {
        // 23:30 UTC on the 3rd is 07:30 on the 4th in Manila.
        let mut p = payload();
        p.date = "2024-03-04".to_string();
        p.start = "2024-03-03T23:30:00Z".to_string();
        p.end = "2024-03-04T00:30:00Z".to_string();
        assert!(p.clone().validate(&chrono_tz::Asia::Manila).is_ok());
        assert!(matches!(
            p.validate(&chrono_tz::UTC),
            Err(PlanError::OutsideDate { .. })
        ));
    }

    #[test]
    fn bad_date_and_blank_name_are_rejected() {
        let mut p = payload();
        p.date = "someday".to_string();
        assert_eq!(
            p.validate(&chrono_tz::UTC),
            Err(PlanError::InvalidDate("someday".to_string()))
        );

        let mut blank = payload();
        blank.name = "  ".to_string();
        assert_eq!(blank.validate(&chrono_tz::UTC), Err(PlanError::EmptyName));
    }

    #[test]
    fn create_then_update_reconciles_subtasks() {
        let mut tasks = vec![];
        let valid = payload().validate(&chrono_tz::UTC).expect("valid");
        let created = apply_upsert(&mut tasks, valid, now()).expect("create");
        assert!(created.created);
        assert!(!created.task.completed);
        let ids: Vec<u64> = created.task.subtasks.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2]);

        let mut edit = payload();
        edit.id = Some(created.task.id);
        edit.completed = Some(true);
        edit.subtasks = Some(vec![
            DesiredSubtask {
                id: Some(1),
                name: "read twice".to_string(),
                completed: Some(true),
            },
            DesiredSubtask::new("summarize"),
        ]);
        let valid = edit.validate(&chrono_tz::UTC).expect("valid");
        let updated = apply_upsert(&mut tasks, valid, now()).expect("update");

        assert!(!updated.created);
        assert!(updated.task.completed);
        assert_eq!(
            updated.task.subtasks,
            vec![
                Subtask {
                    id: 1,
                    name: "read twice".to_string(),
                    completed: true
                },
                Subtask {
                    id: 3,
                    name: "summarize".to_string(),
                    completed: false
                },
            ]
        );
        assert_eq!(updated.plan.map(|p| p.to_delete), Some(vec![2]));
    }

    #[test]
    fn update_without_subtask_list_keeps_subtasks() {
        let mut tasks = vec![];
        let valid = payload().validate(&chrono_tz::UTC).expect("valid");
        let created = apply_upsert(&mut tasks, valid, now()).expect("create");

        let mut edit = payload();
        edit.id = Some(created.task.id);
        edit.name = "Study hard".to_string();
        edit.subtasks = None;
        let valid = edit.validate(&chrono_tz::UTC).expect("valid");
        let updated = apply_upsert(&mut tasks, valid, now()).expect("update");

        assert_eq!(updated.task.name, "Study hard");
        assert_eq!(updated.task.subtasks, created.task.subtasks);
    }

    #[test]
    fn dangling_subtask_leaves_task_untouched() {
        let mut tasks = vec![];
        let valid = payload().validate(&chrono_tz::UTC).expect("valid");
        let created = apply_upsert(&mut tasks, valid, now()).expect("create");

        let mut edit = payload();
        edit.id = Some(created.task.id);
        edit.name = "renamed".to_string();
        edit.subtasks = Some(vec![DesiredSubtask::existing(77, "ghost")]);
        let valid = edit.validate(&chrono_tz::UTC).expect("valid");
        let err = apply_upsert(&mut tasks, valid, now()).expect_err("dangling");

        assert_eq!(
            err,
            PlanError::UnknownSubtask {
                task_id: created.task.id,
                subtask_id: 77
            }
        );
        assert_eq!(tasks[0], created.task);
    }

    #[test]
    fn update_of_someone_elses_task_is_not_found() {
        let mut tasks = vec![];
        let valid = payload().validate(&chrono_tz::UTC).expect("valid");
        let created = apply_upsert(&mut tasks, valid, now()).expect("create");

        let mut edit = payload();
        edit.id = Some(created.task.id);
        edit.owner_id = 2;
        let valid = edit.validate(&chrono_tz::UTC).expect("valid");
        assert_eq!(
            apply_upsert(&mut tasks, valid, now()),
            Err(PlanError::TaskNotFound(created.task.id))
        );
    }
}
