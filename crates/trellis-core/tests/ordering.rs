use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use trellis_core::classify::{Transition, classify};
use trellis_core::clock::SteppingClock;
use trellis_core::db::open_store_in_memory;
use trellis_core::db::query::{TaskFilter, list_tasks};
use trellis_core::model::task::{NewTask, Priority, Task, TaskStatus};
use trellis_core::ordering::{priority_lanes, sort_tasks};
use trellis_core::{Action, Actor, Coordinator, OwnerType};

fn store_tasks(
    conn: &rusqlite::Connection,
    step: Duration,
    specs: &[(Priority, i64)],
) -> Vec<Task> {
    let clock = Arc::new(SteppingClock::new(
        Utc.with_ymd_and_hms(2025, 2, 10, 9, 0, 0).unwrap(),
        step,
    ));
    let coordinator = Coordinator::with_clock(conn, clock);
    let actor = Actor::human("dana");
    specs
        .iter()
        .enumerate()
        .map(|(n, (priority, position))| {
            coordinator
                .create(
                    NewTask::new(format!("task {n}"), "dana", OwnerType::Human)
                        .with_priority(*priority)
                        .with_position(*position),
                    &actor,
                )
                .expect("create")
        })
        .collect()
}

fn titles(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|task| task.title.as_str()).collect()
}

#[test]
fn listing_puts_urgent_first_then_position() {
    let conn = open_store_in_memory().expect("store");
    store_tasks(
        &conn,
        Duration::seconds(1),
        &[
            (Priority::Low, 2),
            (Priority::Urgent, 1),
            (Priority::Medium, 5),
            (Priority::Urgent, 0),
        ],
    );

    let listed = list_tasks(&conn, &TaskFilter::default()).expect("list");
    assert_eq!(titles(&listed), vec!["task 3", "task 1", "task 2", "task 0"]);
}

#[test]
fn equal_rank_and_position_lists_newest_first() {
    let conn = open_store_in_memory().expect("store");
    store_tasks(
        &conn,
        Duration::minutes(5),
        &[(Priority::High, 0), (Priority::High, 0), (Priority::High, 0)],
    );
    let listed = list_tasks(&conn, &TaskFilter::default()).expect("list");
    assert_eq!(titles(&listed), vec!["task 2", "task 1", "task 0"]);
}

#[test]
fn priority_lanes_follow_listing_order() {
    let conn = open_store_in_memory().expect("store");
    store_tasks(
        &conn,
        Duration::seconds(1),
        &[(Priority::Urgent, 4), (Priority::Low, 0), (Priority::Urgent, 2)],
    );
    let listed = list_tasks(&conn, &TaskFilter::default()).expect("list");
    let lanes = priority_lanes(listed);
    assert_eq!(lanes[0].key, Priority::Urgent);
    assert_eq!(titles(&lanes[0].tasks), vec!["task 2", "task 0"]);
    assert!(lanes[1].tasks.is_empty());
    assert_eq!(titles(&lanes[3].tasks), vec!["task 1"]);
}

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop::sample::select(Priority::ALL.to_vec())
}

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop::sample::select(TaskStatus::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sql_order_matches_comparator(
        specs in prop::collection::vec((arb_priority(), 0i64..4), 0..16),
        tie_times in any::<bool>(),
    ) {
        let conn = open_store_in_memory().expect("store");
        let step = if tie_times { Duration::zero() } else { Duration::milliseconds(10) };
        let mut expected = store_tasks(&conn, step, &specs);
        sort_tasks(&mut expected);

        let listed = list_tasks(&conn, &TaskFilter::default()).expect("list");
        let listed_ids: Vec<&str> = listed.iter().map(|t| t.id.as_str()).collect();
        let expected_ids: Vec<&str> = expected.iter().map(|t| t.id.as_str()).collect();
        prop_assert_eq!(listed_ids, expected_ids);
    }
}

proptest! {
    #[test]
    fn status_transitions_classify_consistently(
        before in arb_status(),
        requested in prop::option::of(arb_status()),
    ) {
        let action = classify(Transition::Update { before, requested });
        let expected = match requested {
            Some(next) if next != before && next == TaskStatus::Done => Action::Completed,
            Some(next) if next != before => Action::Moved,
            _ => Action::Updated,
        };
        prop_assert_eq!(action, expected);
    }

    #[test]
    fn sorting_is_idempotent_and_order_independent(
        specs in prop::collection::vec((arb_priority(), 0i64..3, 0i64..3), 0..20),
    ) {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let tasks: Vec<Task> = specs
            .iter()
            .enumerate()
            .map(|(n, (priority, position, age))| {
                let mut task = NewTask::new("t", "dana", OwnerType::Human)
                    .with_priority(*priority)
                    .with_position(*position);
                task.title = format!("t{n}");
                <Task as trellis_core::Tracked>::from_draft(
                    task,
                    format!("{n:03}"),
                    base - Duration::hours(*age),
                )
            })
            .collect();

        let mut forward = tasks.clone();
        sort_tasks(&mut forward);
        let mut reversed: Vec<Task> = tasks.into_iter().rev().collect();
        sort_tasks(&mut reversed);
        prop_assert_eq!(&forward, &reversed);

        let mut again = forward.clone();
        sort_tasks(&mut again);
        prop_assert_eq!(forward, again);
    }
}
