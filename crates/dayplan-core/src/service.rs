use std::time::Duration;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::datastore::{DEFAULT_TIMEOUT, TaskStore};
use crate::datetime::week_days;
use crate::error::PlanError;
use crate::grouping::{DayGroup, group_by_day};
use crate::layout::{Position, compute_positions};
use crate::query::TaskQuery;
use crate::summary::{DaySummary, WeekStrip};
use crate::task::Task;
use crate::upsert::{TaskUpsert, UpsertOutcome, apply_upsert};
use crate::user::{User, UserUpsert, find_by_email, upsert_user};

/// Request-level entry points. Requests in one process are serialized on the
/// store lock, and every mutation is a single store transaction.
pub struct Planner<S> {
    store: Mutex<S>,
    tz: Tz,
    timeout: Duration,
}

impl<S: TaskStore> Planner<S> {
    pub fn new(store: S, tz: Tz) -> Self {
        Self {
            store: Mutex::new(store),
            tz,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timezone(&self) -> &Tz {
        &self.tz
    }

    #[instrument(skip(self))]
    pub fn resolve_user(&self, email: &str) -> anyhow::Result<User> {
        let store = self.store.lock();
        let users = store.load_users()?;
        Ok(find_by_email(&users, email)?.clone())
    }

    pub fn users(&self) -> anyhow::Result<Vec<User>> {
        self.store.lock().load_users()
    }

    #[instrument(skip(self, upsert), fields(id = ?upsert.id))]
    pub fn upsert_user(&self, upsert: UserUpsert) -> anyhow::Result<User> {
        let store = self.store.lock();
        store.transaction(self.timeout, |snap| upsert_user(&mut snap.users, upsert))
    }

    /// Validates and applies an add/edit payload. Subtask reconciliation and
    /// the task edit commit together or not at all.
    #[instrument(skip(self, upsert), fields(id = ?upsert.id, owner = upsert.owner_id))]
    pub fn upsert_task(&self, upsert: TaskUpsert) -> anyhow::Result<UpsertOutcome> {
        let valid = upsert.validate(&self.tz)?;
        let now = Utc::now();
        let store = self.store.lock();
        store.transaction(self.timeout, |snap| {
            if !snap.users.iter().any(|u| u.id == valid.owner_id) {
                return Err(PlanError::UserNotFound(valid.owner_id));
            }
            apply_upsert(&mut snap.tasks, valid, now)
        })
    }

    #[instrument(skip(self))]
    pub fn set_completed(&self, user_id: u64, task_id: u64, completed: bool) -> anyhow::Result<Task> {
        self.edit_task(user_id, task_id, |task| {
            task.completed = completed;
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub fn set_subtask_completed(
        &self,
        user_id: u64,
        task_id: u64,
        subtask_id: u64,
        completed: bool,
    ) -> anyhow::Result<Task> {
        self.edit_task(user_id, task_id, |task| {
            let subtask = task
                .subtask_mut(subtask_id)
                .ok_or(PlanError::UnknownSubtask { task_id, subtask_id })?;
            subtask.completed = completed;
            Ok(())
        })
    }

    /// Removes a task together with its subtasks.
    #[instrument(skip(self))]
    pub fn delete_task(&self, user_id: u64, task_id: u64) -> anyhow::Result<Task> {
        let store = self.store.lock();
        store.transaction(self.timeout, |snap| {
            let idx = snap
                .tasks
                .iter()
                .position(|t| t.id == task_id && t.owner_id == user_id)
                .ok_or(PlanError::TaskNotFound(task_id))?;
            Ok(snap.tasks.remove(idx))
        })
    }

    fn edit_task<F>(&self, user_id: u64, task_id: u64, edit: F) -> anyhow::Result<Task>
    where
        F: FnOnce(&mut Task) -> Result<(), PlanError>,
    {
        let now = Utc::now();
        let store = self.store.lock();
        store.transaction(self.timeout, |snap| {
            let task = snap
                .tasks
                .iter_mut()
                .find(|t| t.id == task_id && t.owner_id == user_id)
                .ok_or(PlanError::TaskNotFound(task_id))?;
            edit(task)?;
            task.updated_at = now;
            Ok(task.clone())
        })
    }

    #[instrument(skip(self))]
    pub fn list(&self, query: &TaskQuery) -> anyhow::Result<Vec<Task>> {
        let tasks = self.store.lock().query(query, &self.tz)?;
        debug!(count = tasks.len(), "query returned tasks");
        Ok(tasks)
    }

    /// Timeline placements for one day, in start order.
    #[instrument(skip(self))]
    pub fn day_layout(&self, query: &TaskQuery, date: NaiveDate) -> anyhow::Result<Vec<(Task, Position)>> {
        let tasks = self.list(&query.clone().on(date))?;
        let positions = compute_positions(&tasks, &self.tz);
        Ok(tasks.into_iter().zip(positions).collect())
    }

    #[instrument(skip(self))]
    pub fn agenda(&self, query: &TaskQuery) -> anyhow::Result<Vec<DayGroup>> {
        Ok(group_by_day(self.list(query)?))
    }

    #[instrument(skip(self))]
    pub fn summary(&self, user_id: u64, date: NaiveDate) -> anyhow::Result<DaySummary> {
        let tasks = self.list(&TaskQuery::for_user(user_id).on(date))?;
        Ok(DaySummary::from_tasks(date, &tasks))
    }

    #[instrument(skip(self))]
    pub fn week(&self, user_id: u64, anchor: NaiveDate) -> anyhow::Result<WeekStrip> {
        let days = week_days(anchor);
        let tasks: Vec<Task> = self
            .list(&TaskQuery::for_user(user_id))?
            .into_iter()
            .filter(|t| days.contains(&t.date))
            .collect();
        Ok(WeekStrip::build(anchor, &tasks))
    }
}
