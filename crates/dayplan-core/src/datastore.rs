use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use chrono_tz::Tz;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::PlanError;
use crate::query::TaskQuery;
use crate::task::Task;
use crate::user::User;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Working copy handed to a transaction body. Changes become visible only if
/// the body succeeds within the deadline.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub tasks: Vec<Task>,
    pub users: Vec<User>,
}

/// What the planner needs from persistence: filtered reads and atomic,
/// time-bounded multi-row writes.
pub trait TaskStore {
    fn load_tasks(&self) -> anyhow::Result<Vec<Task>>;

    fn load_users(&self) -> anyhow::Result<Vec<User>>;

    /// Runs `body` against a snapshot and commits it only if `body` succeeds
    /// before `timeout` elapses. On any failure nothing is written.
    fn transaction<T, F>(&self, timeout: Duration, body: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut Snapshot) -> Result<T, PlanError>;

    fn query(&self, query: &TaskQuery, tz: &Tz) -> anyhow::Result<Vec<Task>> {
        let tasks = self.load_tasks()?;
        Ok(query.run(&tasks, tz))
    }

    fn get_task(&self, id: u64) -> anyhow::Result<Task> {
        self.load_tasks()?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| PlanError::TaskNotFound(id).into())
    }
}

/// JSON Lines files under one data directory. Each file is replaced whole
/// through a temp file and rename, so a task and its subtasks change together.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub users_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let users_path = data_dir.join("users.data");

        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }
        if !users_path.exists() {
            fs::write(&users_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            users = %users_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            users_path,
        })
    }

    #[tracing::instrument(skip(self, tasks))]
    fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    #[tracing::instrument(skip(self, users))]
    fn save_users(&self, users: &[User]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.users_path, users).context("failed to save users.data")
    }
}

impl TaskStore for DataStore {
    #[tracing::instrument(skip(self))]
    fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    #[tracing::instrument(skip(self))]
    fn load_users(&self) -> anyhow::Result<Vec<User>> {
        load_jsonl(&self.users_path).context("failed to load users.data")
    }

    #[tracing::instrument(skip(self, body))]
    fn transaction<T, F>(&self, timeout: Duration, body: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut Snapshot) -> Result<T, PlanError>,
    {
        let deadline = Instant::now() + timeout;
        let before = Snapshot {
            tasks: self.load_tasks()?,
            users: self.load_users()?,
        };
        check_deadline(deadline, timeout)?;

        let mut working = before.clone();
        let out = body(&mut working).map_err(|err| {
            debug!(error = %err, "transaction body failed; discarding snapshot");
            anyhow::Error::new(err)
        })?;
        check_deadline(deadline, timeout)?;

        if working.tasks != before.tasks {
            self.save_tasks(&working.tasks)?;
        }
        if working.users != before.users {
            self.save_users(&working.users)?;
        }

        debug!(
            tasks = working.tasks.len(),
            users = working.users.len(),
            "transaction committed"
        );
        Ok(out)
    }
}

fn check_deadline(deadline: Instant, timeout: Duration) -> anyhow::Result<()> {
    if Instant::now() >= deadline {
        warn!(?timeout, "transaction deadline passed; aborting without writes");
        return Err(PlanError::Timeout(timeout).into());
    }
    Ok(())
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::testutil::sample_task;

    #[test]
    fn committed_transaction_is_visible() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");

        store
            .transaction(DEFAULT_TIMEOUT, |snap| {
                snap.tasks.push(sample_task(1));
                Ok(())
            })
            .expect("commit");

        assert_eq!(store.load_tasks().expect("load").len(), 1);
        assert_eq!(store.get_task(1).expect("get").id, 1);
    }

    #[test]
    fn failed_body_writes_nothing() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");

        let err = store
            .transaction(DEFAULT_TIMEOUT, |snap| -> Result<(), PlanError> {
                snap.tasks.push(sample_task(1));
                Err(PlanError::TaskNotFound(9))
            })
            .expect_err("body fails");

        assert_eq!(
            err.downcast_ref::<PlanError>(),
            Some(&PlanError::TaskNotFound(9))
        );
        assert!(store.load_tasks().expect("load").is_empty());
    }

    #[test]
    fn expired_deadline_writes_nothing() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");

        let err = store
            .transaction(Duration::ZERO, |snap| {
                snap.tasks.push(sample_task(1));
                Ok(())
            })
            .expect_err("deadline");

        assert!(matches!(
            err.downcast_ref::<PlanError>(),
            Some(PlanError::Timeout(_))
        ));
        assert!(store.load_tasks().expect("load").is_empty());
    }

    #[test]
    fn missing_task_is_typed() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        let err = store.get_task(3).expect_err("missing");
        assert_eq!(err.downcast_ref::<PlanError>(), Some(&PlanError::TaskNotFound(3)));
    }
}
