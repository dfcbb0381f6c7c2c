use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::task::Task;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayGroup {
    pub day: NaiveDate,
    pub tasks: Vec<Task>,
}

impl DayGroup {
    /// `YYYY-MM-DD`
    pub fn day_key(&self) -> String {
        self.day.format("%Y-%m-%d").to_string()
    }
}

/// Groups tasks by calendar day for the agenda view.
///
/// Groups come out in ascending date order. Inside a group tasks are ordered
/// by their start instant, falling back to id so equal starts stay stable.
/// Dates are already normalized when a `Task` exists, so this cannot fail.
pub fn group_by_day<I>(tasks: I) -> Vec<DayGroup>
where
    I: IntoIterator<Item = Task>,
{
    let mut by_day: BTreeMap<NaiveDate, Vec<Task>> = BTreeMap::new();
    for task in tasks {
        by_day.entry(task.date).or_default().push(task);
    }

    by_day
        .into_iter()
        .map(|(day, mut tasks)| {
            tasks.sort_by_key(|t| (t.start_time, t.id));
            DayGroup { day, tasks }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::task::Category;

    fn task_on(id: u64, day: u32, hour: u32) -> Task {
        let start = Utc
            .with_ymd_and_hms(2024, 1, day, hour, 0, 0)
            .single()
            .expect("valid instant");
        Task {
            id,
            owner_id: 1,
            name: format!("task {id}"),
            description: String::new(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).expect("valid date"),
            start_time: start,
            end_time: start + chrono::Duration::minutes(30),
            category: Category::Education,
            completed: false,
            subtasks: vec![],
            created_at: start,
            updated_at: start,
        }
    }

    fn summary(groups: &[DayGroup]) -> Vec<(String, Vec<u64>)> {
        groups
            .iter()
            .map(|g| (g.day_key(), g.tasks.iter().map(|t| t.id).collect()))
            .collect()
    }

    #[test]
    fn groups_ascend_by_day_then_start() {
        let groups = group_by_day(vec![
            task_on(1, 2, 9),
            task_on(2, 1, 10),
            task_on(3, 1, 8),
        ]);

        assert_eq!(
            summary(&groups),
            vec![
                ("2024-01-01".to_string(), vec![3, 2]),
                ("2024-01-02".to_string(), vec![1]),
            ]
        );
    }

    #[test]
    fn afternoon_sorts_after_morning() {
        // "01:00 PM" sorts before "11:00 AM" as text; the instant order is what counts.
        let groups = group_by_day(vec![task_on(1, 1, 13), task_on(2, 1, 11)]);
        assert_eq!(summary(&groups), vec![("2024-01-01".to_string(), vec![2, 1])]);
    }

    #[test]
    fn empty_input_has_no_groups() {
        assert!(group_by_day(Vec::new()).is_empty());
    }
}
