use chrono::{NaiveDate, TimeZone, Utc};

use crate::task::{Category, Task};

/// A work task for user 1 on 2024-01-01, 09:00-10:00 UTC.
pub(crate) fn sample_task(id: u64) -> Task {
    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
        .single()
        .expect("valid instant");
    Task {
        id,
        owner_id: 1,
        name: format!("task {id}"),
        description: String::new(),
        date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date"),
        start_time: start,
        end_time: start + chrono::Duration::hours(1),
        category: Category::Work,
        completed: false,
        subtasks: vec![],
        created_at: start,
        updated_at: start,
    }
}
