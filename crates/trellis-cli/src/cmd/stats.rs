use std::io::{self, Write};

use anyhow::Result;
use trellis_core::db::stats::{DashboardStats, dashboard_stats};

use super::Session;
use crate::output::{pretty_kv, pretty_section, render};

pub fn run_stats(session: &Session) -> Result<()> {
    let conn = session.store()?;
    let stats = dashboard_stats(&conn)?;
    render(session.output, &stats, write_dashboard)
}

fn write_dashboard(stats: &DashboardStats, w: &mut dyn Write) -> io::Result<()> {
    let totals = &stats.totals;
    pretty_section(w, "Tasks")?;
    pretty_kv(w, "completed", totals.completed.to_string())?;
    pretty_kv(w, "active", totals.active.to_string())?;
    pretty_kv(w, "backlog", totals.backlog.to_string())?;
    pretty_kv(
        w,
        "open by",
        format!("{} human / {} agent", totals.active_human, totals.active_agent),
    )?;

    writeln!(w)?;
    pretty_section(w, "Projects")?;
    if stats.projects.is_empty() {
        writeln!(w, "(none)")?;
    }
    for project in &stats.projects {
        writeln!(
            w,
            "{} {:<24} {:>4} done {:>4} active",
            project.color, project.name, project.completed, project.active
        )?;
    }

    writeln!(w)?;
    pretty_section(w, "Completed per week")?;
    if stats.weekly.is_empty() {
        writeln!(w, "(none)")?;
    }
    for week in &stats.weekly {
        writeln!(
            w,
            "{}  {:>3}  human {:>3}  agent {:>3}  high {:>3}  medium {:>3}  low {:>3}",
            week.week, week.completed, week.human, week.agent, week.high, week.medium, week.low
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::db::stats::{ProjectProgress, TaskTotals, WeekBucket};

    #[test]
    fn dashboard_lists_weeks_and_projects() {
        let stats = DashboardStats {
            totals: TaskTotals {
                completed: 3,
                active: 2,
                backlog: 1,
                active_human: 2,
                active_agent: 1,
            },
            projects: vec![ProjectProgress {
                project_id: "p-1".into(),
                name: "Atlas".into(),
                color: "#10B981".into(),
                completed: 3,
                active: 2,
            }],
            weekly: vec![WeekBucket {
                week: "2025-10".into(),
                completed: 3,
                human: 1,
                agent: 2,
                high: 1,
                medium: 1,
                low: 1,
            }],
        };
        let mut buf = Vec::new();
        write_dashboard(&stats, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("2 human / 1 agent"));
        assert!(text.contains("#10B981 Atlas"));
        assert!(text.contains("2025-10    3  human   1  agent   2"));
    }

    #[test]
    fn empty_dashboard_says_none() {
        let stats = DashboardStats {
            totals: TaskTotals::default(),
            projects: Vec::new(),
            weekly: Vec::new(),
        };
        let mut buf = Vec::new();
        write_dashboard(&stats, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap().matches("(none)").count(), 2);
    }
}
