//! `trellis project`: Projects, local or synced from the knowledge base.

use std::io::{self, Write};

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use trellis_core::db::query::{self, ActivityFilter, ProjectFilter, TaskFilter};
use trellis_core::model::EntityKind;
use trellis_core::model::project::{NewProject, Project, ProjectPatch, ProjectStatus};
use trellis_core::{Coordinator, MutationError};

use super::{Session, base_patch, parse_json_object, parse_opt_enum, tri_state};
use crate::cmd::activity::write_history;
use crate::output::{
    OutputMode, Renderable, or_dash, pretty_kv, pretty_section, render_item, render_list, write_json,
};

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Create a local project.
    Add(ProjectAddArgs),
    /// Change fields of a project.
    Update(ProjectUpdateArgs),
    /// Delete a project. Its tasks keep their project id.
    Rm(ProjectIdArgs),
    /// Show one project with its open tasks and history.
    Show(ProjectIdArgs),
    /// List projects, newest first.
    List(ProjectListArgs),
}

#[derive(Args, Debug)]
pub struct ProjectIdArgs {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ProjectAddArgs {
    pub name: String,

    #[arg(short, long)]
    pub description: Option<String>,

    /// idea, active, paused, shipped.
    #[arg(short, long)]
    pub status: Option<String>,

    /// `#RRGGBB`. Defaults to `[defaults] project_color`.
    #[arg(short, long)]
    pub color: Option<String>,

    /// Free-form JSON object.
    #[arg(long)]
    pub metadata: Option<String>,
}

#[derive(Args, Debug)]
pub struct ProjectUpdateArgs {
    pub id: String,

    /// JSON patch applied first; flags below override its fields.
    #[arg(long)]
    pub patch: Option<String>,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(short, long)]
    pub description: Option<String>,

    #[arg(long, conflicts_with = "description")]
    pub clear_description: bool,

    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(short, long)]
    pub color: Option<String>,

    #[arg(long)]
    pub metadata: Option<String>,

    #[arg(long, conflicts_with = "metadata")]
    pub clear_metadata: bool,
}

#[derive(Args, Debug, Default)]
pub struct ProjectListArgs {
    #[arg(short, long)]
    pub status: Option<String>,

    /// Only projects synced from this external source.
    #[arg(long)]
    pub source: Option<String>,
}

pub fn run(command: &ProjectCommand, session: &Session) -> Result<()> {
    match command {
        ProjectCommand::Add(args) => run_add(args, session),
        ProjectCommand::Update(args) => run_update(args, session),
        ProjectCommand::Rm(args) => run_rm(args, session),
        ProjectCommand::Show(args) => run_show(args, session),
        ProjectCommand::List(args) => run_list(args, session),
    }
}

fn run_add(args: &ProjectAddArgs, session: &Session) -> Result<()> {
    let actor = session.actor()?;
    let color = args
        .color
        .clone()
        .unwrap_or_else(|| session.config.project.defaults.project_color.clone());

    let mut draft = NewProject::new(&args.name).with_color(color);
    draft.description = args.description.clone();
    draft.status = parse_opt_enum(args.status.as_deref())?;
    draft.metadata = args
        .metadata
        .as_deref()
        .map(|raw| parse_json_object("metadata", raw))
        .transpose()?;

    let conn = session.store()?;
    let project: Project = Coordinator::new(&conn).create(draft, &actor)?;
    render_item(&project, session.output)?;
    Ok(())
}

fn run_update(args: &ProjectUpdateArgs, session: &Session) -> Result<()> {
    let actor = session.actor()?;
    let mut patch: ProjectPatch = base_patch(args.patch.as_deref())?;

    if let Some(name) = &args.name {
        patch.name = Some(name.clone());
    }
    if let Some(description) = tri_state(args.description.clone(), args.clear_description) {
        patch.description = Some(description);
    }
    if let Some(status) = parse_opt_enum::<ProjectStatus>(args.status.as_deref())? {
        patch.status = Some(status);
    }
    if let Some(color) = &args.color {
        patch.color = Some(color.clone());
    }
    let metadata = args
        .metadata
        .as_deref()
        .map(|raw| parse_json_object("metadata", raw))
        .transpose()?;
    if let Some(metadata) = tri_state(metadata, args.clear_metadata) {
        patch.metadata = Some(metadata);
    }

    let conn = session.store()?;
    let project: Project = Coordinator::new(&conn)
        .apply(&args.id, &patch, &actor)
        .with_context(|| format!("update project {}", args.id))?;
    render_item(&project, session.output)?;
    Ok(())
}

fn run_rm(args: &ProjectIdArgs, session: &Session) -> Result<()> {
    let actor = session.actor()?;
    let conn = session.store()?;
    let project: Project = Coordinator::new(&conn).delete(&args.id, &actor)?;
    render_item(&project, session.output)?;
    Ok(())
}

fn run_show(args: &ProjectIdArgs, session: &Session) -> Result<()> {
    let conn = session.store()?;
    let project = query::get_project(&conn, &args.id)?.ok_or_else(|| MutationError::NotFound {
        kind: "project",
        id: args.id.clone(),
    })?;
    if session.output != OutputMode::Pretty {
        render_item(&project, session.output)?;
        return Ok(());
    }

    let tasks = query::list_tasks(
        &conn,
        &TaskFilter {
            project_id: Some(project.id.clone()),
            ..TaskFilter::default()
        },
    )?;
    let history = query::list_activity(
        &conn,
        &ActivityFilter {
            entity_type: Some(EntityKind::Project),
            entity_id: Some(project.id.clone()),
            limit: Some(20),
            ..ActivityFilter::default()
        },
    )?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_project_details(&mut out, &project)?;
    writeln!(out)?;
    pretty_section(&mut out, &format!("Open tasks ({})", tasks.len()))?;
    for task in &tasks {
        task.render_human(&mut out)?;
    }
    writeln!(out)?;
    write_history(&mut out, &history)?;
    Ok(())
}

fn run_list(args: &ProjectListArgs, session: &Session) -> Result<()> {
    let filter = ProjectFilter {
        status: parse_opt_enum(args.status.as_deref())?,
        external_source: args.source.clone(),
    };
    let conn = session.store()?;
    let projects = query::list_projects(&conn, &filter)?;
    render_list(&projects, session.output)?;
    Ok(())
}

fn write_project_details(w: &mut dyn Write, project: &Project) -> io::Result<()> {
    pretty_section(w, &project.name)?;
    pretty_kv(w, "id", &project.id)?;
    pretty_kv(w, "status", project.status.as_str())?;
    pretty_kv(w, "color", &project.color)?;
    if let Some(identity) = project.external_identity() {
        pretty_kv(w, "synced", format!("{}:{}", identity.source, identity.id))?;
    }
    pretty_kv(w, "updated", project.updated_at.to_rfc3339())?;
    if let Some(description) = &project.description {
        writeln!(w)?;
        writeln!(w, "{description}")?;
    }
    Ok(())
}

impl Renderable for Project {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let origin = self
            .external_source
            .as_deref()
            .map_or_else(String::new, |source| format!("  <{source}>"));
        writeln!(w, "{:<8} {} {}{}  ({})", self.status, self.color, self.name, origin, self.id)
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        write_json(w, self)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}  {}  {}  {}",
            self.id,
            self.status,
            self.color,
            or_dash(self.external_source.as_deref()),
            self.name
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "STATUS", "COLOR", "SOURCE", "NAME"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(subcommand)]
        command: ProjectCommand,
    }

    #[test]
    fn add_parses_color_and_metadata() {
        let w = Wrapper::parse_from([
            "test",
            "add",
            "Atlas",
            "--color",
            "#10B981",
            "--metadata",
            r#"{"repo": "atlas"}"#,
        ]);
        let ProjectCommand::Add(args) = w.command else {
            panic!("expected add");
        };
        assert_eq!(args.color.as_deref(), Some("#10B981"));
        assert!(args.metadata.is_some());
    }

    #[test]
    fn metadata_set_and_clear_conflict() {
        let parsed = Wrapper::try_parse_from([
            "test",
            "update",
            "p-1",
            "--metadata",
            "{}",
            "--clear-metadata",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn synced_project_row_names_its_source() {
        let mut draft = NewProject::new("Atlas");
        draft.external_source = Some("knowledge".into());
        draft.external_id = Some("Atlas".into());
        let project = <Project as trellis_core::Tracked>::from_draft(
            draft,
            "p-1".into(),
            chrono::Utc::now(),
        );
        let mut buf = Vec::new();
        project.render_table(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "p-1  idea  #6B7280  knowledge  Atlas\n"
        );
    }
}
