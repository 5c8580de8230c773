use std::io::{self, Write};

use anyhow::Result;
use clap::{Args, Subcommand};
use trellis_core::db::query::{self, ArticleFilter};
use trellis_core::model::article::{NewReadingList, ReadingList, ReadingListPatch, ReadingListSummary};
use trellis_core::{Coordinator, MutationError};

use super::{Session, tri_state};
use crate::output::{
    Renderable, or_dash, pretty_kv, pretty_section, render, render_item, render_list, write_json,
};

#[derive(Subcommand, Debug)]
pub enum ReadingCommand {
    /// Create a reading list.
    Add {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Rename a list or change its description.
    Update(ReadingUpdateArgs),
    /// Delete a list together with all of its articles.
    Rm {
        id: String,
    },
    /// Show a list and its articles.
    Show {
        id: String,
    },
    /// List reading lists with article counts.
    List,
}

#[derive(Args, Debug)]
pub struct ReadingUpdateArgs {
    pub id: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(short, long)]
    pub description: Option<String>,

    #[arg(long, conflicts_with = "description")]
    pub clear_description: bool,
}

pub fn run(command: &ReadingCommand, session: &Session) -> Result<()> {
    match command {
        ReadingCommand::Add { name, description } => {
            let mut draft = NewReadingList::new(name);
            draft.description.clone_from(description);
            let conn = session.store()?;
            let list = Coordinator::new(&conn).create_reading_list(draft)?;
            render_item(&list, session.output)?;
        }
        ReadingCommand::Update(args) => {
            let patch = ReadingListPatch {
                name: args.name.clone(),
                description: tri_state(args.description.clone(), args.clear_description),
            };
            let conn = session.store()?;
            let list = Coordinator::new(&conn).update_reading_list(&args.id, &patch)?;
            render_item(&list, session.output)?;
        }
        ReadingCommand::Rm { id } => {
            let actor = session.actor()?;
            let conn = session.store()?;
            let removed = Coordinator::new(&conn).delete_reading_list(id, &actor)?;
            render(session.output, &removed, |articles, w| {
                writeln!(w, "deleted reading list {id} and {} article(s)", articles.len())
            })?;
        }
        ReadingCommand::Show { id } => run_show(id, session)?,
        ReadingCommand::List => {
            let conn = session.store()?;
            render_list(&query::list_reading_lists(&conn)?, session.output)?;
        }
    }
    Ok(())
}

fn run_show(id: &str, session: &Session) -> Result<()> {
    let conn = session.store()?;
    let list = query::get_reading_list(&conn, id)?.ok_or_else(|| MutationError::NotFound {
        kind: "reading list",
        id: id.to_string(),
    })?;
    let articles = query::list_articles(
        &conn,
        &ArticleFilter {
            reading_list_id: Some(list.id.clone()),
            ..ArticleFilter::default()
        },
    )?;

    if session.output.is_json() {
        let doc = serde_json::json!({ "list": list, "articles": articles });
        render(session.output, &doc, |_, _| Ok(()))?;
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    pretty_section(&mut out, &list.name)?;
    pretty_kv(&mut out, "id", &list.id)?;
    pretty_kv(&mut out, "description", or_dash(list.description.as_deref()))?;
    writeln!(out)?;
    if articles.is_empty() {
        writeln!(out, "(no articles)")?;
    }
    for article in &articles {
        article.render_human(&mut out)?;
    }
    Ok(())
}

impl Renderable for ReadingList {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}  ({})", self.name, self.id)
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        write_json(w, self)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}  {}", self.id, self.name)
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "NAME"]
    }
}

impl Renderable for ReadingListSummary {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}/{} unread  ({})",
            self.list.name, self.unread_count, self.article_count, self.list.id
        )
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        write_json(w, self)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}  {}  {}",
            self.list.id, self.article_count, self.unread_count, self.list.name
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "ARTICLES", "UNREAD", "NAME"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(subcommand)]
        command: ReadingCommand,
    }

    #[test]
    fn add_takes_name_and_description() {
        let w = Wrapper::parse_from(["test", "add", "Papers", "-d", "to read"]);
        let ReadingCommand::Add { name, description } = w.command else {
            panic!("expected add");
        };
        assert_eq!(name, "Papers");
        assert_eq!(description.as_deref(), Some("to read"));
    }

    #[test]
    fn summary_human_line_shows_counts() {
        let summary = ReadingListSummary {
            list: ReadingList {
                id: "r-1".into(),
                name: "Papers".into(),
                description: None,
                created_at: Utc::now(),
            },
            article_count: 5,
            unread_count: 2,
        };
        let mut buf = Vec::new();
        summary.render_human(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "Papers  2/5 unread  (r-1)\n");
    }
}
