//! Import of externally sourced projects.
//!
//! The [`Reconciler`] upserts each upstream record against the project
//! holding `(source, record.name)` as its external identity. Records are
//! handled one at a time, each in its own write transaction: a bad record
//! is counted and logged, and the batch moves on.
//!
//! # Identity
//!
//! The upstream has no stable ids, so the record name is the external id.
//! An upstream rename therefore looks like a brand-new project and the old
//! one stays behind.
//!
//! # Audit
//!
//! Sync writes are not attributed to a human or an agent and produce no
//! activity entries.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::db::begin_write;
use crate::db::rows::{Persist, WriteToken, project_by_external_identity};
use crate::error::{MutationError, ValidationError, is_busy, is_constraint_violation};
use crate::model::project::{NewProject, Project, ProjectStatus};
use crate::model::{MAX_NAME_CHARS, normalize_tags, require_object, require_text};
use crate::mutation::Tracked;

/// Source tag used when the configuration names none.
pub const DEFAULT_SOURCE: &str = "knowledge";

/// Status given to upstream records that do not state one.
const DEFAULT_UPSTREAM_STATUS: ProjectStatus = ProjectStatus::Active;

/// One project record as supplied by the upstream feed. Untrusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl ExternalProject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            status: None,
            tags: Vec::new(),
            metadata: None,
        }
    }
}

/// Producer of upstream project records.
pub trait ProjectFeed {
    /// # Errors
    ///
    /// Returns an error when the feed cannot be read at all.
    fn records(&self) -> Result<Vec<ExternalProject>>;
}

impl ProjectFeed for Vec<ExternalProject> {
    fn records(&self) -> Result<Vec<ExternalProject>> {
        Ok(self.clone())
    }
}

/// Outcome of one reconciliation batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    /// `created + updated`.
    pub synced: usize,
    pub created: usize,
    pub updated: usize,
    /// Records that failed and were skipped.
    pub errors: usize,
    /// Names of the records that were synced, in feed order.
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
}

/// Validated upstream fields.
#[derive(Debug, Clone)]
struct Upstream {
    name: String,
    description: Option<String>,
    status: ProjectStatus,
    metadata: Option<serde_json::Value>,
}

impl Upstream {
    fn parse(record: &ExternalProject) -> Result<Self, ValidationError> {
        require_text("name", &record.name, MAX_NAME_CHARS)?;

        let status = match record.status.as_deref() {
            None => DEFAULT_UPSTREAM_STATUS,
            Some(raw) if raw.trim().is_empty() => DEFAULT_UPSTREAM_STATUS,
            Some(raw) => raw.parse::<ProjectStatus>()?,
        };

        require_object("metadata", record.metadata.as_ref())?;
        let tags = normalize_tags(&record.tags);
        let metadata = match record.metadata.clone() {
            Some(serde_json::Value::Object(mut map)) => {
                if !tags.is_empty() && !map.contains_key("tags") {
                    map.insert("tags".to_string(), serde_json::json!(tags));
                }
                Some(serde_json::Value::Object(map))
            }
            None if !tags.is_empty() => Some(serde_json::json!({ "tags": tags })),
            other => other,
        };

        let description = record
            .description
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);

        Ok(Self {
            name: record.name.trim().to_string(),
            description,
            status,
            metadata,
        })
    }
}

/// Upserts upstream project records keyed on their external identity.
pub struct Reconciler<'conn> {
    conn: &'conn Connection,
    source: String,
    clock: Arc<dyn Clock>,
}

impl<'conn> Reconciler<'conn> {
    pub fn new(conn: &'conn Connection, source: impl Into<String>) -> Self {
        Self::with_clock(conn, source, Arc::new(SystemClock))
    }

    pub fn with_clock(conn: &'conn Connection, source: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            conn,
            source: source.into(),
            clock,
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Read every record from `feed` and reconcile them.
    ///
    /// # Errors
    ///
    /// Returns an error only when the feed itself cannot be read; record
    /// failures are counted in the result.
    pub fn sync_from(&self, feed: &dyn ProjectFeed) -> Result<SyncResult> {
        let records = feed.records().context("read project feed")?;
        Ok(self.reconcile(&records))
    }

    /// Reconcile a batch. Never aborts on a single record.
    #[must_use]
    pub fn reconcile(&self, records: &[ExternalProject]) -> SyncResult {
        let mut result = SyncResult::default();

        for record in records {
            match self.reconcile_record(record) {
                Ok(outcome) => {
                    match outcome {
                        Outcome::Created => result.created += 1,
                        Outcome::Updated => result.updated += 1,
                    }
                    result.synced += 1;
                    result.names.push(record.name.trim().to_string());
                }
                Err(e) => {
                    warn!(
                        external_source = %self.source,
                        external_id = %record.name,
                        error = %e,
                        "skipping upstream project"
                    );
                    result.errors += 1;
                }
            }
        }

        info!(
            external_source = %self.source,
            synced = result.synced,
            created = result.created,
            updated = result.updated,
            errors = result.errors,
            "reconciled upstream projects"
        );
        result
    }

    fn reconcile_record(&self, record: &ExternalProject) -> Result<Outcome, MutationError> {
        let upstream = Upstream::parse(record)?;

        match self.upsert(&upstream) {
            // Another run inserted the same identity between our lookup and
            // insert, or the write lock stayed busy: the retry sees the row.
            Err(MutationError::Storage(err)) if is_constraint_violation(&err) || is_busy(&err) => {
                debug!(external_id = %upstream.name, error = %err, "retrying upstream project");
                self.upsert(&upstream)
            }
            other => other,
        }
    }

    fn upsert(&self, upstream: &Upstream) -> Result<Outcome, MutationError> {
        let tx = begin_write(self.conn)?;
        let now = self.clock.now();

        let outcome = match project_by_external_identity(&tx, &self.source, &upstream.name)? {
            Some(existing) => {
                let next = self.refreshed(existing, upstream, now);
                next.validate()?;
                next.update(&tx, WriteToken::new())?;
                Outcome::Updated
            }
            None => {
                let project = self.imported(upstream, now);
                project.validate()?;
                project.insert(&tx, WriteToken::new())?;
                Outcome::Created
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// Overwrite the upstream-owned fields. Color and local ids stay.
    fn refreshed(&self, existing: Project, upstream: &Upstream, now: DateTime<Utc>) -> Project {
        debug_assert_eq!(existing.external_source.as_deref(), Some(self.source.as_str()));
        Project {
            name: upstream.name.clone(),
            description: upstream.description.clone(),
            status: upstream.status,
            metadata: upstream.metadata.clone(),
            updated_at: now,
            ..existing
        }
    }

    fn imported(&self, upstream: &Upstream, now: DateTime<Utc>) -> Project {
        let draft = NewProject {
            name: upstream.name.clone(),
            description: upstream.description.clone(),
            status: Some(upstream.status),
            color: None,
            external_source: Some(self.source.clone()),
            external_id: Some(upstream.name.clone()),
            metadata: upstream.metadata.clone(),
        };
        Project::from_draft(draft, Uuid::new_v4().to_string(), now)
    }
}
