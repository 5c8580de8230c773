//! `trellis article`: Articles inside reading lists.

use std::io::{self, Write};

use anyhow::Result;
use clap::{Args, Subcommand};
use trellis_core::Coordinator;
use trellis_core::db::query::{self, ArticleFilter};
use trellis_core::model::article::{Article, ArticlePatch, ArticleStatus, NewArticle};

use super::{Session, parse_opt_enum, tri_state};
use crate::output::{Renderable, or_dash, render_item, render_list, write_json};

#[derive(Subcommand, Debug)]
pub enum ArticleCommand {
    /// Save an article to a reading list.
    Add(ArticleAddArgs),
    /// Edit an article or mark it read.
    Update(ArticleUpdateArgs),
    /// Remove an article.
    Rm {
        id: String,
    },
    /// List articles, newest first.
    List(ArticleListArgs),
}

#[derive(Args, Debug)]
pub struct ArticleAddArgs {
    /// Reading list id.
    pub list: String,

    pub url: String,

    #[arg(short, long)]
    pub title: Option<String>,

    #[arg(short, long)]
    pub author: Option<String>,

    /// unread, reading, read, archived.
    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(short, long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug)]
pub struct ArticleUpdateArgs {
    pub id: String,

    #[arg(long)]
    pub url: Option<String>,

    #[arg(short, long)]
    pub title: Option<String>,

    #[arg(long, conflicts_with = "title")]
    pub clear_title: bool,

    #[arg(short, long)]
    pub author: Option<String>,

    #[arg(long, conflicts_with = "author")]
    pub clear_author: bool,

    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(short, long)]
    pub notes: Option<String>,

    #[arg(long, conflicts_with = "notes")]
    pub clear_notes: bool,
}

#[derive(Args, Debug, Default)]
pub struct ArticleListArgs {
    /// Only articles in this reading list.
    #[arg(short, long)]
    pub list: Option<String>,

    #[arg(short, long)]
    pub status: Option<String>,
}

pub fn run(command: &ArticleCommand, session: &Session) -> Result<()> {
    match command {
        ArticleCommand::Add(args) => {
            let actor = session.actor()?;
            let mut draft = NewArticle::new(&args.list, &args.url);
            draft.title.clone_from(&args.title);
            draft.author.clone_from(&args.author);
            draft.status = parse_opt_enum(args.status.as_deref())?;
            draft.notes.clone_from(&args.notes);

            let conn = session.store()?;
            let article: Article = Coordinator::new(&conn).create(draft, &actor)?;
            render_item(&article, session.output)?;
        }
        ArticleCommand::Update(args) => {
            let actor = session.actor()?;
            let patch = ArticlePatch {
                url: args.url.clone(),
                title: tri_state(args.title.clone(), args.clear_title),
                author: tri_state(args.author.clone(), args.clear_author),
                status: parse_opt_enum::<ArticleStatus>(args.status.as_deref())?,
                notes: tri_state(args.notes.clone(), args.clear_notes),
            };
            let conn = session.store()?;
            let article: Article = Coordinator::new(&conn).apply(&args.id, &patch, &actor)?;
            render_item(&article, session.output)?;
        }
        ArticleCommand::Rm { id } => {
            let actor = session.actor()?;
            let conn = session.store()?;
            let article: Article = Coordinator::new(&conn).delete(id, &actor)?;
            render_item(&article, session.output)?;
        }
        ArticleCommand::List(args) => {
            let filter = ArticleFilter {
                reading_list_id: args.list.clone(),
                status: parse_opt_enum(args.status.as_deref())?,
            };
            let conn = session.store()?;
            render_list(&query::list_articles(&conn, &filter)?, session.output)?;
        }
    }
    Ok(())
}

impl Renderable for Article {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let label = self.title.as_deref().unwrap_or(&self.url);
        match &self.author {
            Some(author) => writeln!(w, "{:<8} {label} by {author}  ({})", self.status, self.id),
            None => writeln!(w, "{:<8} {label}  ({})", self.status, self.id),
        }
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        write_json(w, self)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}  {}  {}",
            self.id,
            self.status,
            self.url,
            or_dash(self.title.as_deref())
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "STATUS", "URL", "TITLE"]
    }
}
