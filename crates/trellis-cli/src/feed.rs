//! JSON file project feed for `trellis sync`.
//!
//! The file holds an array of `{name, description?, status?, tags?, metadata?}`
//! objects. Entries that do not have that shape are skipped with a warning
//! and counted, so one bad entry never hides the rest. A path of `-`
//! reads the array from stdin.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::warn;
use trellis_core::{ErrorCode, ExternalProject, ProjectFeed};

use crate::output::CodedError;

#[derive(Debug)]
pub struct JsonFileFeed {
    records: Vec<ExternalProject>,
    rejected: usize,
}

impl JsonFileFeed {
    /// Read and decode the feed file.
    ///
    /// # Errors
    ///
    /// `E6001` when the file is missing, unreadable, or not a JSON array.
    pub fn open(path: &Path) -> Result<Self> {
        let raw = if path == Path::new("-") {
            std::io::read_to_string(std::io::stdin())
        } else {
            std::fs::read_to_string(path)
        };
        let raw = raw.map_err(|err| {
            CodedError::new(
                ErrorCode::FeedUnreadable,
                format!("cannot read feed {}: {err}", path.display()),
            )
        })?;
        Self::parse(path, &raw)
    }

    fn parse(path: &Path, raw: &str) -> Result<Self> {
        let entries: Vec<serde_json::Value> = serde_json::from_str(raw).map_err(|err| {
            CodedError::new(
                ErrorCode::FeedUnreadable,
                format!("feed {} is not a JSON array: {err}", path.display()),
            )
        })?;

        let mut records = Vec::with_capacity(entries.len());
        let mut rejected = 0;
        for (index, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<ExternalProject>(entry) {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(feed = %path.display(), index, error = %err, "skipping malformed feed entry");
                    rejected += 1;
                }
            }
        }

        Ok(Self {
            records,
            rejected,
        })
    }

    /// Entries dropped because they were not project objects.
    pub const fn rejected(&self) -> usize {
        self.rejected
    }
}

impl ProjectFeed for JsonFileFeed {
    fn records(&self) -> Result<Vec<ExternalProject>> {
        Ok(self.records.clone())
    }
}

/// Resolve `--feed` or the configured `[sync] feed` against `root`.
///
/// # Errors
///
/// `E6001` when neither names a feed.
pub fn feed_path(root: &Path, flag: Option<&Path>, configured: Option<&Path>) -> Result<PathBuf> {
    let chosen = flag.or(configured).ok_or_else(|| {
        CodedError::new(
            ErrorCode::FeedUnreadable,
            "no feed given; pass --feed or set [sync] feed in .trellis/config.toml",
        )
    })?;
    let path = if chosen.is_absolute() || chosen == Path::new("-") {
        chosen.to_path_buf()
    } else {
        root.join(chosen)
    };
    Ok(path)
}
