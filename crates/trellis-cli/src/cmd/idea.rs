//! `trellis idea`: The idea pipeline.

use std::io::{self, Write};

use anyhow::Result;
use clap::{Args, Subcommand};
use trellis_core::db::query::{self, IdeaFilter};
use trellis_core::model::idea::{Idea, IdeaCategory, IdeaPatch, IdeaStatus, NewIdea};
use trellis_core::{Coordinator, OwnerType};

use super::{Session, base_patch, parse_json_object, parse_opt_enum, tri_state};
use crate::output::{Renderable, or_dash, render_item, render_list, write_json};

#[derive(Subcommand, Debug)]
pub enum IdeaCommand {
    /// Capture an idea.
    Add(IdeaAddArgs),
    /// Change fields of an idea, or move it along the pipeline.
    Update(IdeaUpdateArgs),
    /// Delete an idea.
    Rm {
        id: String,
    },
    /// List ideas, newest first.
    List(IdeaListArgs),
}

#[derive(Args, Debug)]
pub struct IdeaAddArgs {
    pub title: String,

    #[arg(short, long)]
    pub description: Option<String>,

    /// product, tool, business, research.
    #[arg(short, long)]
    pub category: Option<String>,

    /// brainstorm, research, in_progress, shipped.
    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(long)]
    pub owner: Option<String>,

    #[arg(long)]
    pub owner_type: Option<String>,

    #[arg(long)]
    pub metadata: Option<String>,
}

#[derive(Args, Debug)]
pub struct IdeaUpdateArgs {
    pub id: String,

    #[arg(long)]
    pub patch: Option<String>,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(short, long)]
    pub description: Option<String>,

    #[arg(long, conflicts_with = "description")]
    pub clear_description: bool,

    #[arg(short, long)]
    pub category: Option<String>,

    #[arg(long, conflicts_with = "category")]
    pub clear_category: bool,

    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(long)]
    pub owner: Option<String>,

    #[arg(long)]
    pub owner_type: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct IdeaListArgs {
    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(short, long)]
    pub category: Option<String>,
}

pub fn run(command: &IdeaCommand, session: &Session) -> Result<()> {
    match command {
        IdeaCommand::Add(args) => run_add(args, session),
        IdeaCommand::Update(args) => run_update(args, session),
        IdeaCommand::Rm { id } => {
            let actor = session.actor()?;
            let conn = session.store()?;
            let idea: Idea = Coordinator::new(&conn).delete(id, &actor)?;
            render_item(&idea, session.output)?;
            Ok(())
        }
        IdeaCommand::List(args) => {
            let filter = IdeaFilter {
                status: parse_opt_enum(args.status.as_deref())?,
                category: parse_opt_enum(args.category.as_deref())?,
            };
            let conn = session.store()?;
            render_list(&query::list_ideas(&conn, &filter)?, session.output)?;
            Ok(())
        }
    }
}

fn run_add(args: &IdeaAddArgs, session: &Session) -> Result<()> {
    let actor = session.actor()?;
    let owner_type = match (parse_opt_enum::<OwnerType>(args.owner_type.as_deref())?, &args.owner) {
        (Some(kind), _) => kind,
        (None, Some(_)) => session.config.project.defaults.owner_type,
        (None, None) => actor.kind,
    };
    let owner = args.owner.clone().unwrap_or_else(|| actor.name.clone());

    let mut draft = NewIdea::new(&args.title, owner, owner_type);
    draft.description = args.description.clone();
    draft.category = parse_opt_enum(args.category.as_deref())?;
    draft.status = parse_opt_enum(args.status.as_deref())?;
    draft.metadata = args
        .metadata
        .as_deref()
        .map(|raw| parse_json_object("metadata", raw))
        .transpose()?;

    let conn = session.store()?;
    let idea: Idea = Coordinator::new(&conn).create(draft, &actor)?;
    render_item(&idea, session.output)?;
    Ok(())
}

fn run_update(args: &IdeaUpdateArgs, session: &Session) -> Result<()> {
    let actor = session.actor()?;
    let mut patch: IdeaPatch = base_patch(args.patch.as_deref())?;

    if let Some(title) = &args.title {
        patch.title = Some(title.clone());
    }
    if let Some(description) = tri_state(args.description.clone(), args.clear_description) {
        patch.description = Some(description);
    }
    let category = parse_opt_enum::<IdeaCategory>(args.category.as_deref())?;
    if let Some(category) = tri_state(category, args.clear_category) {
        patch.category = Some(category);
    }
    if let Some(status) = parse_opt_enum::<IdeaStatus>(args.status.as_deref())? {
        patch.status = Some(status);
    }
    if let Some(owner) = &args.owner {
        patch.owner = Some(owner.clone());
    }
    if let Some(owner_type) = parse_opt_enum(args.owner_type.as_deref())? {
        patch.owner_type = Some(owner_type);
    }

    let conn = session.store()?;
    let idea: Idea = Coordinator::new(&conn).apply(&args.id, &patch, &actor)?;
    render_item(&idea, session.output)?;
    Ok(())
}

impl Renderable for Idea {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let category = self.category.map_or("-", IdeaCategory::as_str);
        writeln!(
            w,
            "{:<11} {:<8} {}  [{}]  ({})",
            self.status, category, self.title, self.owner, self.id
        )
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
            or_dash(self.category.map(IdeaCategory::as_str)),
            self.owner,
            self.title
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "STATUS", "CATEGORY", "OWNER", "TITLE"]
    }
}
