//! Dashboard aggregates over tasks.

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

/// Weekly buckets returned by [`dashboard_stats`].
pub const WEEKS_SHOWN: u32 = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskTotals {
    pub completed: u64,
    /// `todo` or `in_progress`.
    pub active: u64,
    pub backlog: u64,
    /// Not done, owned by a human.
    pub active_human: u64,
    /// Not done, owned by an agent.
    pub active_agent: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectProgress {
    pub project_id: String,
    pub name: String,
    pub color: String,
    pub completed: u64,
    pub active: u64,
}

/// Completions in one `YYYY-WW` week (Monday-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekBucket {
    pub week: String,
    pub completed: u64,
    pub human: u64,
    pub agent: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub totals: TaskTotals,
    pub projects: Vec<ProjectProgress>,
    /// Most recent weeks with completions, newest first.
    pub weekly: Vec<WeekBucket>,
}

fn count(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: Option<i64> = row.get(idx)?;
    Ok(value.and_then(|v| u64::try_from(v).ok()).unwrap_or_default())
}

/// # Errors
///
/// Returns an error if any aggregate query fails.
pub fn dashboard_stats(conn: &Connection) -> Result<DashboardStats> {
    Ok(DashboardStats {
        totals: task_totals(conn)?,
        projects: project_progress(conn)?,
        weekly: weekly_completions(conn)?,
    })
}

fn task_totals(conn: &Connection) -> Result<TaskTotals> {
    conn.query_row(
        "SELECT
            SUM(status = 'done'),
            SUM(status IN ('todo', 'in_progress')),
            SUM(status = 'backlog'),
            SUM(owner_type = 'human' AND status <> 'done'),
            SUM(owner_type = 'agent' AND status <> 'done')
         FROM tasks",
        [],
        |row| {
            Ok(TaskTotals {
                completed: count(row, 0)?,
                active: count(row, 1)?,
                backlog: count(row, 2)?,
                active_human: count(row, 3)?,
                active_agent: count(row, 4)?,
            })
        },
    )
    .context("query task totals")
}

fn project_progress(conn: &Connection) -> Result<Vec<ProjectProgress>> {
    let mut stmt = conn
        .prepare(
            "SELECT p.project_id, p.name, p.color,
                    SUM(t.status = 'done'),
                    SUM(t.status <> 'done')
             FROM projects p
             LEFT JOIN tasks t ON t.project_id = p.project_id
             GROUP BY p.project_id
             ORDER BY 5 DESC, 4 DESC, p.name ASC",
        )
        .context("prepare project progress query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ProjectProgress {
                project_id: row.get(0)?,
                name: row.get(1)?,
                color: row.get(2)?,
                completed: count(row, 3)?,
                active: count(row, 4)?,
            })
        })
        .context("execute project progress query")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("read project progress row")?);
    }
    Ok(out)
}

fn weekly_completions(conn: &Connection) -> Result<Vec<WeekBucket>> {
    let mut stmt = conn
        .prepare(
            "SELECT strftime('%Y-%W', completed_at_us / 1000000, 'unixepoch') AS week,
                    COUNT(*),
                    SUM(owner_type = 'human'),
                    SUM(owner_type = 'agent'),
                    SUM(priority IN ('high', 'urgent')),
                    SUM(priority = 'medium'),
                    SUM(priority = 'low')
             FROM tasks
             WHERE status = 'done' AND completed_at_us IS NOT NULL
             GROUP BY week
             ORDER BY week DESC
             LIMIT ?1",
        )
        .context("prepare weekly completions query")?;
    let rows = stmt
        .query_map([WEEKS_SHOWN], |row| {
            Ok(WeekBucket {
                week: row.get(0)?,
                completed: count(row, 1)?,
                human: count(row, 2)?,
                agent: count(row, 3)?,
                high: count(row, 4)?,
                medium: count(row, 5)?,
                low: count(row, 6)?,
            })
        })
        .context("execute weekly completions query")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("read weekly completions row")?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::dashboard_stats;
    use crate::clock::SteppingClock;
    use crate::db::open_store_in_memory;
    use crate::model::project::{NewProject, Project};
    use crate::model::task::{NewTask, Priority, Task, TaskPatch, TaskStatus};
    use crate::model::{Actor, OwnerType};
    use crate::mutation::Coordinator;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    #[test]
    fn empty_store_has_zero_totals() {
        let conn = open_store_in_memory().expect("store");
        let stats = dashboard_stats(&conn).expect("stats");
        assert_eq!(stats.totals, super::TaskTotals::default());
        assert!(stats.projects.is_empty());
        assert!(stats.weekly.is_empty());
    }

    #[test]
    fn totals_projects_and_weeks() {
        let conn = open_store_in_memory().expect("store");
        // Monday 2025-03-03, one week per mutation.
        let clock = Arc::new(SteppingClock::new(
            Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap(),
            Duration::days(7),
        ));
        let coordinator = Coordinator::with_clock(&conn, clock);
        let actor = Actor::human("dana");

        let project: Project = coordinator
            .create(NewProject::new("Atlas"), &actor)
            .expect("project");
        let mut ids = Vec::new();
        for (owner_type, priority, status) in [
            (OwnerType::Human, Priority::High, TaskStatus::Todo),
            (OwnerType::Agent, Priority::Low, TaskStatus::InProgress),
            (OwnerType::Agent, Priority::Medium, TaskStatus::Backlog),
            (OwnerType::Human, Priority::Urgent, TaskStatus::Todo),
        ] {
            let task: Task = coordinator
                .create(
                    NewTask::new("t", "someone", owner_type)
                        .with_priority(priority)
                        .with_status(status)
                        .in_project(&project.id),
                    &actor,
                )
                .expect("task");
            ids.push(task.id);
        }
        coordinator
            .apply::<Task>(&ids[0], &TaskPatch::status(TaskStatus::Done), &actor)
            .expect("done");
        coordinator
            .apply::<Task>(&ids[3], &TaskPatch::status(TaskStatus::Done), &actor)
            .expect("done");

        let stats = dashboard_stats(&conn).expect("stats");
        assert_eq!(stats.totals.completed, 2);
        assert_eq!(stats.totals.active, 1);
        assert_eq!(stats.totals.backlog, 1);
        assert_eq!(stats.totals.active_human, 0);
        assert_eq!(stats.totals.active_agent, 2);

        assert_eq!(stats.projects.len(), 1);
        assert_eq!(stats.projects[0].completed, 2);
        assert_eq!(stats.projects[0].active, 2);

        assert_eq!(stats.weekly.len(), 2);
        assert!(stats.weekly[0].week > stats.weekly[1].week);
        assert_eq!(stats.weekly.iter().map(|w| w.completed).sum::<u64>(), 2);
        assert_eq!(stats.weekly.iter().map(|w| w.high).sum::<u64>(), 2);
    }
}
