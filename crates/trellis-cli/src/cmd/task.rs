//! `trellis task`: Board tasks.

use std::io::{self, Write};

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand, ValueEnum};
use trellis_core::db::query::{self, ActivityFilter, TaskFilter};
use trellis_core::model::task::{AgentMetadata, NewTask, Priority, Task, TaskPatch, TaskStatus};
use trellis_core::model::{EntityKind, OwnerType};
use trellis_core::ordering::{Lane, priority_lanes, status_lanes};
use trellis_core::{Coordinator, MutationError};

use super::{Session, base_patch, parse_date, parse_enum, parse_opt_enum, tri_state};
use crate::cmd::activity::write_history;
use crate::output::{
    OutputMode, Renderable, or_dash, pretty_kv, pretty_section, render, render_item, render_list, write_json,
};

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Create a task.
    Add(TaskAddArgs),
    /// Change fields of a task. Status changes are recorded as moves or completions.
    Update(TaskUpdateArgs),
    /// Delete a task.
    Rm(TaskIdArgs),
    /// Show one task with its recent history.
    Show(TaskIdArgs),
    /// List tasks, urgent first.
    List(TaskListArgs),
    /// Group tasks into board lanes.
    Lanes(LanesArgs),
}

#[derive(Args, Debug)]
pub struct TaskIdArgs {
    pub id: String,
}

#[derive(Args, Debug, Default)]
pub struct AgentMetadataArgs {
    /// Model that ran the task (agent tasks).
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub iterations: Option<u32>,

    #[arg(long)]
    pub tokens: Option<u64>,
}

impl AgentMetadataArgs {
    fn metadata(&self) -> Option<AgentMetadata> {
        if self.model.is_none() && self.iterations.is_none() && self.tokens.is_none() {
            return None;
        }
        Some(AgentMetadata {
            model: self.model.clone(),
            iterations: self.iterations,
            tokens: self.tokens,
        })
    }
}

#[derive(Args, Debug)]
pub struct TaskAddArgs {
    pub title: String,

    #[arg(short, long)]
    pub description: Option<String>,

    /// Project the task belongs to.
    #[arg(short, long)]
    pub project: Option<String>,

    /// backlog, todo, in_progress, blocked, review, done.
    #[arg(short, long)]
    pub status: Option<String>,

    /// low, medium, high, urgent. Defaults to `[defaults] priority`.
    #[arg(long)]
    pub priority: Option<String>,

    /// Owner name. Defaults to the acting identity.
    #[arg(long)]
    pub owner: Option<String>,

    #[arg(long)]
    pub owner_type: Option<String>,

    /// Tags (comma-separated or repeated).
    #[arg(short, long = "tag", value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Due date, `YYYY-MM-DD` or RFC 3339.
    #[arg(long)]
    pub due: Option<String>,

    /// Manual position within the lane.
    #[arg(long)]
    pub position: Option<i64>,

    #[command(flatten)]
    pub agent: AgentMetadataArgs,
}

#[derive(Args, Debug)]
pub struct TaskUpdateArgs {
    pub id: String,

    /// JSON patch applied first; flags below override its fields.
    #[arg(long)]
    pub patch: Option<String>,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(short, long)]
    pub description: Option<String>,

    #[arg(long, conflicts_with = "description")]
    pub clear_description: bool,

    #[arg(short, long)]
    pub project: Option<String>,

    #[arg(long, conflicts_with = "project")]
    pub clear_project: bool,

    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(long)]
    pub priority: Option<String>,

    #[arg(long)]
    pub owner: Option<String>,

    #[arg(long)]
    pub owner_type: Option<String>,

    /// Replace the tag set.
    #[arg(short, long = "tag", value_delimiter = ',')]
    pub tags: Vec<String>,

    #[arg(long, conflicts_with = "tags")]
    pub clear_tags: bool,

    #[arg(long)]
    pub due: Option<String>,

    #[arg(long, conflicts_with = "due")]
    pub clear_due: bool,

    #[arg(long)]
    pub position: Option<i64>,

    /// Replaces any stored agent metadata.
    #[command(flatten)]
    pub agent: AgentMetadataArgs,

    #[arg(long)]
    pub clear_agent_metadata: bool,
}

#[derive(Args, Debug, Default)]
pub struct TaskListArgs {
    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(long)]
    pub priority: Option<String>,

    #[arg(short, long)]
    pub project: Option<String>,

    #[arg(long)]
    pub owner_type: Option<String>,

    #[arg(short, long)]
    pub tag: Option<String>,

    /// Include done tasks.
    #[arg(short, long)]
    pub all: bool,

    #[arg(short = 'n', long)]
    pub limit: Option<u32>,
}

impl TaskListArgs {
    fn filter(&self) -> Result<TaskFilter> {
        Ok(TaskFilter {
            status: parse_opt_enum(self.status.as_deref())?,
            priority: parse_opt_enum(self.priority.as_deref())?,
            project_id: self.project.clone(),
            owner_type: parse_opt_enum(self.owner_type.as_deref())?,
            tag: self.tag.clone(),
            include_done: self.all,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LaneKey {
    #[default]
    Status,
    Priority,
}

#[derive(Args, Debug)]
pub struct LanesArgs {
    /// Group by status (board columns) or priority.
    #[arg(long, value_enum, default_value_t = LaneKey::Status)]
    pub by: LaneKey,

    #[arg(short, long)]
    pub project: Option<String>,

    #[arg(long)]
    pub owner_type: Option<String>,

    #[arg(short, long)]
    pub tag: Option<String>,

    /// Include done tasks in priority lanes. Status lanes always show them.
    #[arg(short, long)]
    pub all: bool,
}

pub fn run(command: &TaskCommand, session: &Session) -> Result<()> {
    match command {
        TaskCommand::Add(args) => run_add(args, session),
        TaskCommand::Update(args) => run_update(args, session),
        TaskCommand::Rm(args) => run_rm(args, session),
        TaskCommand::Show(args) => run_show(args, session),
        TaskCommand::List(args) => run_list(args, session),
        TaskCommand::Lanes(args) => run_lanes(args, session),
    }
}

fn run_add(args: &TaskAddArgs, session: &Session) -> Result<()> {
    let actor = session.actor()?;
    let defaults = &session.config.project.defaults;

    let owner_type = match (&args.owner, args.owner_type.as_deref()) {
        (_, Some(raw)) => parse_enum(raw)?,
        (Some(_), None) => defaults.owner_type,
        (None, None) => actor.kind,
    };
    let owner = args.owner.clone().unwrap_or_else(|| actor.name.clone());

    let mut draft = NewTask::new(&args.title, owner, owner_type)
        .with_priority(parse_opt_enum(args.priority.as_deref())?.unwrap_or(defaults.priority));
    draft.description = args.description.clone();
    draft.project_id = args.project.clone();
    draft.status = parse_opt_enum(args.status.as_deref())?;
    draft.tags = args.tags.clone();
    draft.due_date = args.due.as_deref().map(|raw| parse_date("due_date", raw)).transpose()?;
    draft.position = args.position;
    draft.agent_metadata = args.agent.metadata();

    let conn = session.store()?;
    let task: Task = Coordinator::new(&conn).create(draft, &actor)?;
    render_item(&task, session.output)?;
    Ok(())
}

fn run_update(args: &TaskUpdateArgs, session: &Session) -> Result<()> {
    let actor = session.actor()?;
    let mut patch: TaskPatch = base_patch(args.patch.as_deref())?;

    if let Some(title) = &args.title {
        patch.title = Some(title.clone());
    }
    if let Some(description) = tri_state(args.description.clone(), args.clear_description) {
        patch.description = Some(description);
    }
    if let Some(project) = tri_state(args.project.clone(), args.clear_project) {
        patch.project_id = Some(project);
    }
    if let Some(status) = parse_opt_enum::<TaskStatus>(args.status.as_deref())? {
        patch.status = Some(status);
    }
    if let Some(priority) = parse_opt_enum::<Priority>(args.priority.as_deref())? {
        patch.priority = Some(priority);
    }
    if let Some(owner) = &args.owner {
        patch.owner = Some(owner.clone());
    }
    if let Some(owner_type) = parse_opt_enum::<OwnerType>(args.owner_type.as_deref())? {
        patch.owner_type = Some(owner_type);
    }
    if args.clear_tags {
        patch.tags = Some(Vec::new());
    } else if !args.tags.is_empty() {
        patch.tags = Some(args.tags.clone());
    }
    let due = args.due.as_deref().map(|raw| parse_date("due_date", raw)).transpose()?;
    if let Some(due) = tri_state(due, args.clear_due) {
        patch.due_date = Some(due);
    }
    if let Some(position) = args.position {
        patch.position = Some(position);
    }
    if let Some(metadata) = tri_state(args.agent.metadata(), args.clear_agent_metadata) {
        patch.agent_metadata = Some(metadata);
    }

    let conn = session.store()?;
    let task: Task = Coordinator::new(&conn)
        .apply(&args.id, &patch, &actor)
        .with_context(|| format!("update task {}", args.id))?;
    render_item(&task, session.output)?;
    Ok(())
}

fn run_rm(args: &TaskIdArgs, session: &Session) -> Result<()> {
    let actor = session.actor()?;
    let conn = session.store()?;
    let task: Task = Coordinator::new(&conn).delete(&args.id, &actor)?;
    render_item(&task, session.output)?;
    Ok(())
}

fn run_show(args: &TaskIdArgs, session: &Session) -> Result<()> {
    let conn = session.store()?;
    let task = query::get_task(&conn, &args.id)?
        .ok_or_else(|| MutationError::NotFound {
            kind: "task",
            id: args.id.clone(),
        })?;
    let history = query::list_activity(
        &conn,
        &ActivityFilter {
            entity_type: Some(EntityKind::Task),
            entity_id: Some(task.id.clone()),
            limit: Some(20),
            ..ActivityFilter::default()
        },
    )?;

    if session.output == OutputMode::Pretty {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        write_task_details(&mut out, &task)?;
        writeln!(out)?;
        write_history(&mut out, &history)?;
        return Ok(());
    }
    render_item(&task, session.output)?;
    Ok(())
}

fn run_list(args: &TaskListArgs, session: &Session) -> Result<()> {
    let filter = args.filter()?;
    let conn = session.store()?;
    let tasks = query::list_tasks(&conn, &filter)?;
    render_list(&tasks, session.output)?;
    Ok(())
}

fn run_lanes(args: &LanesArgs, session: &Session) -> Result<()> {
    let filter = TaskFilter {
        project_id: args.project.clone(),
        owner_type: parse_opt_enum(args.owner_type.as_deref())?,
        tag: args.tag.clone(),
        include_done: args.all || args.by == LaneKey::Status,
        ..TaskFilter::default()
    };
    let conn = session.store()?;
    let tasks = query::list_tasks(&conn, &filter)?;

    match args.by {
        LaneKey::Status => render(session.output, &status_lanes(tasks), |lanes, w| write_lanes(w, lanes)),
        LaneKey::Priority => {
            render(session.output, &priority_lanes(tasks), |lanes, w| write_lanes(w, lanes))
        }
    }
}

fn write_lanes<K: std::fmt::Display>(w: &mut dyn Write, lanes: &[Lane<K>]) -> io::Result<()> {
    for lane in lanes {
        writeln!(w, "{} ({})", lane.key, lane.tasks.len())?;
        for task in &lane.tasks {
            writeln!(w, "  {}  {:<6}  {}", task.id, task.priority, task.title)?;
        }
    }
    Ok(())
}

fn write_task_details(w: &mut dyn Write, task: &Task) -> io::Result<()> {
    pretty_section(w, &task.title)?;
    pretty_kv(w, "id", &task.id)?;
    pretty_kv(w, "status", task.status.as_str())?;
    pretty_kv(w, "priority", task.priority.as_str())?;
    pretty_kv(w, "owner", format!("{} ({})", task.owner, task.owner_type))?;
    pretty_kv(w, "project", or_dash(task.project_id.as_deref()))?;
    if !task.tags.is_empty() {
        pretty_kv(w, "tags", task.tags.join(", "))?;
    }
    if let Some(due) = task.due_date {
        pretty_kv(w, "due", due.format("%Y-%m-%d").to_string())?;
    }
    pretty_kv(w, "position", task.position.to_string())?;
    if let Some(metadata) = &task.agent_metadata {
        pretty_kv(
            w,
            "agent run",
            format!(
                "model={} iterations={} tokens={}",
                or_dash(metadata.model.as_deref()),
                metadata.iterations.map_or_else(|| "-".to_string(), |n| n.to_string()),
                metadata.tokens.map_or_else(|| "-".to_string(), |n| n.to_string()),
            ),
        )?;
    }
    if let Some(completed) = task.completed_at {
        pretty_kv(w, "completed", completed.to_rfc3339())?;
    }
    pretty_kv(w, "updated", task.updated_at.to_rfc3339())?;
    if let Some(description) = &task.description {
        writeln!(w)?;
        writeln!(w, "{description}")?;
    }
    Ok(())
}

impl Renderable for Task {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let tags = if self.tags.is_empty() {
            String::new()
        } else {
            format!("  [{}]", self.tags.join(", "))
        };
        writeln!(
            w,
            "{:<11} {:<6} {}{}  ({}, {})",
            self.status, self.priority, self.title, tags, self.owner, self.id
        )
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        write_json(w, self)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}  {}  {}  {}",
            self.id, self.status, self.priority, self.owner, self.title
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "STATUS", "PRIORITY", "OWNER", "TITLE"]
    }
}
