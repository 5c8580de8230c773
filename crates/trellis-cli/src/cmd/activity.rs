//! `trellis activity`: The audit feed, newest first.

use std::io::{self, Write};

use anyhow::Result;
use clap::Args;
use trellis_core::db::query::{ActivityFilter, DEFAULT_ACTIVITY_LIMIT, list_activity};
use trellis_core::model::activity::ActivityEntry;

use super::{Session, parse_opt_enum};
use crate::output::{Renderable, pretty_section, render_list, write_json};

#[derive(Args, Debug, Default)]
pub struct ActivityArgs {
    /// task, project, idea, or article.
    #[arg(long = "type")]
    pub entity_type: Option<String>,

    /// Only entries for this entity id.
    #[arg(long = "id")]
    pub entity_id: Option<String>,

    /// human or agent.
    #[arg(long)]
    pub actor_type: Option<String>,

    #[arg(short = 'n', long, default_value_t = DEFAULT_ACTIVITY_LIMIT)]
    pub limit: u32,
}

pub fn run_activity(args: &ActivityArgs, session: &Session) -> Result<()> {
    let filter = ActivityFilter {
        entity_type: parse_opt_enum(args.entity_type.as_deref())?,
        entity_id: args.entity_id.clone(),
        actor_type: parse_opt_enum(args.actor_type.as_deref())?,
        limit: Some(args.limit),
    };
    let conn = session.store()?;
    let entries = list_activity(&conn, &filter)?;
    render_list(&entries, session.output)?;
    Ok(())
}

/// Pretty history block used by the `show` commands.
pub fn write_history(w: &mut dyn Write, entries: &[ActivityEntry]) -> io::Result<()> {
    pretty_section(w, "History")?;
    if entries.is_empty() {
        return writeln!(w, "(none)");
    }
    for entry in entries {
        entry.render_human(w)?;
    }
    Ok(())
}

impl Renderable for ActivityEntry {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {:<9} {} {} by {} ({})",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.action,
            self.entity_type,
            self.entity_id,
            self.actor,
            self.actor_type
        )
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        write_json(w, self)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}  {}  {}  {}  {}",
            self.timestamp.to_rfc3339(),
            self.action,
            self.entity_type,
            self.entity_id,
            self.actor,
            self.actor_type
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["TIMESTAMP", "ACTION", "TYPE", "ID", "ACTOR", "ACTOR_TYPE"]
    }
}
