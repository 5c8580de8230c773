//! `trellis sync`: Reconcile projects from an external feed.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use tracing::info;
use trellis_core::Reconciler;

use super::Session;
use crate::feed::{JsonFileFeed, feed_path};
use crate::output::{pretty_kv, render};

#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// JSON array of projects. `-` reads stdin. Defaults to `[sync] feed`.
    #[arg(long)]
    pub feed: Option<PathBuf>,

    /// Source label recorded on synced projects. Defaults to `[sync] source`.
    #[arg(long)]
    pub source: Option<String>,
}

/// Execute `trellis sync`.
///
/// Records that fail, including feed entries that are not project objects,
/// are counted in `errors` and never abort the run.
///
/// # Errors
///
/// Returns an error if the feed cannot be read or the store cannot be opened.
pub fn run_sync(args: &SyncArgs, session: &Session) -> Result<()> {
    let sync = &session.config.project.sync;
    let path = feed_path(&session.root, args.feed.as_deref(), sync.feed.as_deref())?;
    let feed = JsonFileFeed::open(&path)?;
    let source = args.source.as_deref().unwrap_or(&sync.source);

    let conn = session.store()?;
    let mut result = Reconciler::new(&conn, source).sync_from(&feed)?;
    result.errors += feed.rejected();

    info!(
        source,
        feed = %path.display(),
        synced = result.synced,
        created = result.created,
        updated = result.updated,
        errors = result.errors,
        "sync finished"
    );

    render(session.output, &result, |result, w| {
        pretty_kv(w, "source", source)?;
        pretty_kv(w, "synced", result.synced.to_string())?;
        pretty_kv(w, "created", result.created.to_string())?;
        pretty_kv(w, "updated", result.updated.to_string())?;
        pretty_kv(w, "errors", result.errors.to_string())
    })
}
