//! Task read order and lane projections.
//!
//! Tasks are listed by priority rank (urgent first), then manual position
//! ascending, then newest first, then id. The id makes the order total, so
//! the same data always lists the same way. The in-memory comparator and
//! the SQL `ORDER BY` are derived from the same ranks.

use serde::Serialize;
use std::cmp::Ordering;

use crate::model::task::{Priority, Task, TaskStatus};

/// Rank of a task without a recognised priority: after every named one.
pub const UNSPECIFIED_PRIORITY_RANK: u8 = 5;

#[must_use]
pub fn priority_rank(priority: Option<Priority>) -> u8 {
    priority.map_or(UNSPECIFIED_PRIORITY_RANK, Priority::rank)
}

/// Total order over tasks for listings.
#[must_use]
pub fn compare_tasks(a: &Task, b: &Task) -> Ordering {
    priority_rank(Some(a.priority))
        .cmp(&priority_rank(Some(b.priority)))
        .then_with(|| a.position.cmp(&b.position))
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(compare_tasks);
}

/// `ORDER BY` clause matching [`compare_tasks`] for the `tasks` table.
pub(crate) fn task_order_clause() -> String {
    let arms: String = Priority::ALL
        .iter()
        .map(|priority| format!("WHEN '{}' THEN {} ", priority.as_str(), priority.rank()))
        .collect();
    format!(
        "ORDER BY CASE priority {arms}ELSE {UNSPECIFIED_PRIORITY_RANK} END ASC, \
         position ASC, created_at_us DESC, task_id ASC"
    )
}

/// One column of a board view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lane<K> {
    pub key: K,
    pub tasks: Vec<Task>,
}

/// Group tasks into one lane per status, in workflow order. Every status
/// gets a lane, even an empty one.
#[must_use]
pub fn status_lanes(tasks: Vec<Task>) -> Vec<Lane<TaskStatus>> {
    group(tasks, TaskStatus::ALL, |task| task.status)
}

/// Group tasks into one lane per priority, urgent first. Every priority
/// gets a lane, even an empty one.
#[must_use]
pub fn priority_lanes(tasks: Vec<Task>) -> Vec<Lane<Priority>> {
    let mut keys = Priority::ALL.to_vec();
    keys.sort_by_key(|priority| priority.rank());
    group(tasks, &keys, |task| task.priority)
}

fn group<K: Copy + Eq>(mut tasks: Vec<Task>, keys: &[K], key_of: impl Fn(&Task) -> K) -> Vec<Lane<K>> {
    sort_tasks(&mut tasks);
    let mut lanes: Vec<Lane<K>> = keys
        .iter()
        .map(|&key| Lane {
            key,
            tasks: Vec::new(),
        })
        .collect();
    for task in tasks {
        let key = key_of(&task);
        if let Some(lane) = lanes.iter_mut().find(|lane| lane.key == key) {
            lane.tasks.push(task);
        }
    }
    lanes
}
