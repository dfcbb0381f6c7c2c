use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::error::PlanError;
use crate::task::{DesiredSubtask, Subtask, Task};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtaskUpdate {
    pub id: u64,
    pub name: String,
    /// `None` keeps the stored flag.
    pub completed: Option<bool>,
}

impl SubtaskUpdate {
    fn changes(&self, current: &Subtask) -> bool {
        current.name != self.name || self.completed.is_some_and(|c| c != current.completed)
    }
}

/// The writes needed to turn a task's stored subtasks into the desired set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilePlan {
    pub to_create: Vec<DesiredSubtask>,
    pub to_update: Vec<SubtaskUpdate>,
    pub to_delete: Vec<u64>,
}

impl ReconcilePlan {
    /// True when executing the plan against `persisted` would change nothing.
    pub fn is_noop(&self, persisted: &[Subtask]) -> bool {
        self.to_create.is_empty()
            && self.to_delete.is_empty()
            && self.to_update.iter().all(|update| {
                persisted
                    .iter()
                    .find(|s| s.id == update.id)
                    .is_some_and(|current| !update.changes(current))
            })
    }
}

/// Diffs the desired subtask list against what is stored.
///
/// Desired entries without an id are created, entries whose id is stored are
/// updated, and stored subtasks missing from the desired list are deleted. An
/// id that is not stored for this task is rejected rather than created.
pub fn reconcile(
    task_id: u64,
    persisted: &[Subtask],
    desired: &[DesiredSubtask],
) -> Result<ReconcilePlan, PlanError> {
    let stored: HashSet<u64> = persisted.iter().map(|s| s.id).collect();

    let mut seen = HashSet::new();
    let mut plan = ReconcilePlan::default();

    for entry in desired {
        match entry.id {
            None => plan.to_create.push(entry.clone()),
            Some(id) => {
                if !stored.contains(&id) {
                    return Err(PlanError::UnknownSubtask {
                        task_id,
                        subtask_id: id,
                    });
                }
                if !seen.insert(id) {
                    return Err(PlanError::DuplicateSubtask(id));
                }
                plan.to_update.push(SubtaskUpdate {
                    id,
                    name: entry.name.clone(),
                    completed: entry.completed,
                });
            }
        }
    }

    plan.to_delete = persisted
        .iter()
        .map(|s| s.id)
        .filter(|id| !seen.contains(id))
        .collect();

    debug!(
        task_id,
        create = plan.to_create.len(),
        update = plan.to_update.len(),
        delete = plan.to_delete.len(),
        "reconciled subtasks"
    );
    Ok(plan)
}

/// Executes a plan against a task in memory: deletes, then updates, then
/// creates. `next_id` hands out ids for created subtasks.
pub fn apply_plan<F>(task: &mut Task, plan: &ReconcilePlan, mut next_id: F)
where
    F: FnMut() -> u64,
{
    let doomed: BTreeSet<u64> = plan.to_delete.iter().copied().collect();
    task.subtasks.retain(|s| !doomed.contains(&s.id));

    for update in &plan.to_update {
        if let Some(current) = task.subtask_mut(update.id) {
            current.name = update.name.clone();
            if let Some(completed) = update.completed {
                current.completed = completed;
            }
        }
    }

    for entry in &plan.to_create {
        task.subtasks.push(Subtask {
            id: next_id(),
            name: entry.name.clone(),
            completed: entry.completed.unwrap_or(false),
        });
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn stored(id: u64, name: &str) -> Subtask {
        Subtask {
            id,
            name: name.to_string(),
            completed: false,
        }
    }

    #[test]
    fn splits_desired_into_create_update_delete() {
        let persisted = vec![stored(1, "a"), stored(2, "b")];
        let desired = vec![DesiredSubtask::existing(1, "a2"), DesiredSubtask::new("c")];

        let plan = reconcile(7, &persisted, &desired).expect("reconcile");

        assert_eq!(
            plan.to_update,
            vec![SubtaskUpdate {
                id: 1,
                name: "a2".to_string(),
                completed: None,
            }]
        );
        assert_eq!(plan.to_create, vec![DesiredSubtask::new("c")]);
        assert_eq!(plan.to_delete, vec![2]);
    }

    #[test]
    fn dangling_id_is_rejected() {
        let persisted = vec![stored(1, "a")];
        let desired = vec![DesiredSubtask::existing(9, "ghost")];

        let err = reconcile(7, &persisted, &desired).expect_err("dangling id");
        assert_eq!(
            err,
            PlanError::UnknownSubtask {
                task_id: 7,
                subtask_id: 9
            }
        );
    }

    #[test]
    fn repeated_id_is_rejected() {
        let persisted = vec![stored(1, "a")];
        let desired = vec![
            DesiredSubtask::existing(1, "a"),
            DesiredSubtask::existing(1, "a again"),
        ];

        let err = reconcile(7, &persisted, &desired).expect_err("duplicate id");
        assert_eq!(err, PlanError::DuplicateSubtask(1));
    }

    #[test]
    fn missing_flag_keeps_stored_completion() {
        let mut task_subtasks = vec![Subtask {
            id: 1,
            name: "a".to_string(),
            completed: true,
        }];
        let desired = vec![DesiredSubtask::existing(1, "renamed")];
        let plan = reconcile(7, &task_subtasks, &desired).expect("reconcile");

        let mut task = crate::testutil::sample_task(7);
        task.subtasks = std::mem::take(&mut task_subtasks);
        apply_plan(&mut task, &plan, || unreachable!("nothing to create"));

        assert_eq!(task.subtasks.len(), 1);
        assert_eq!(task.subtasks[0].name, "renamed");
        assert!(task.subtasks[0].completed);
    }

    #[test]
    fn reapplying_the_same_desired_state_is_a_noop() {
        let mut task = crate::testutil::sample_task(7);
        task.subtasks = vec![stored(1, "a"), stored(2, "b")];
        let desired = vec![DesiredSubtask::existing(1, "a2"), DesiredSubtask::new("c")];

        let mut next = 10;
        let plan = reconcile(task.id, &task.subtasks, &desired).expect("first pass");
        apply_plan(&mut task, &plan, || {
            next += 1;
            next
        });
        assert_eq!(
            task.subtasks,
            vec![
                Subtask {
                    id: 1,
                    name: "a2".to_string(),
                    completed: false
                },
                Subtask {
                    id: 11,
                    name: "c".to_string(),
                    completed: false
                },
            ]
        );

        let converged: Vec<DesiredSubtask> = task.subtasks.iter().map(DesiredSubtask::from).collect();
        let again = reconcile(task.id, &task.subtasks, &converged).expect("second pass");
        assert!(again.to_create.is_empty());
        assert!(again.to_delete.is_empty());
        assert!(again.is_noop(&task.subtasks));
    }

    #[test]
    fn empty_desired_list_deletes_everything() {
        let persisted = vec![stored(1, "a"), stored(2, "b")];
        let plan = reconcile(7, &persisted, &[]).expect("reconcile");
        assert_eq!(plan.to_delete, vec![1, 2]);
        assert!(!plan.is_noop(&persisted));
    }
}
