//! The audited write path.
//!
//! [`Coordinator`] is the only way to create, update or delete a tracked
//! entity. Each call runs in one `BEGIN IMMEDIATE` transaction that reads
//! the current row, validates the merged result, writes it, and appends
//! exactly one [`ActivityEntry`]. Any failure drops the transaction, so
//! neither the entity write nor the audit entry survives.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::classify::{Transition, classify};
use crate::clock::{Clock, SystemClock};
use crate::db::begin_write;
use crate::db::rows::{self, Persist, WriteToken};
use crate::error::{MutationError, ValidationError, is_busy, is_duplicate_identity};
use crate::model::activity::{ActivityEntry, Changes};
use crate::model::article::{Article, NewReadingList, ReadingList, ReadingListPatch};
use crate::model::{Action, Actor, EntityKind, Lifecycle};

/// An entity kind whose mutations are audited.
///
/// Implemented by [`crate::model::task::Task`], [`crate::model::project::Project`],
/// [`crate::model::idea::Idea`] and [`crate::model::article::Article`]. The
/// storage supertrait cannot be named outside this crate, so no other type
/// can implement it, and its writes need a token only this crate can build:
///
/// ```compile_fail
/// use rusqlite::Connection;
/// use trellis_core::Tracked;
///
/// fn store_unaudited<T: Tracked>(entity: &T, conn: &Connection) {
///     let _ = entity.insert(conn);
/// }
/// ```
pub trait Tracked: Persist + Serialize + Clone {
    type Status: Lifecycle;
    /// Creation request.
    type Draft;
    /// Partial update with a fixed field set.
    type Patch;

    const KIND: EntityKind;

    fn id(&self) -> &str;
    fn status(&self) -> Self::Status;
    fn from_draft(draft: Self::Draft, id: String, now: DateTime<Utc>) -> Self;

    /// Apply `patch` onto a copy of `self`, stamping `now` as the update time.
    fn merged(&self, patch: &Self::Patch, now: DateTime<Utc>) -> Self;

    /// The status the patch asks for, if it names one.
    fn requested_status(patch: &Self::Patch) -> Option<Self::Status>;

    /// # Errors
    ///
    /// Returns the first field that violates the kind's schema.
    fn validate(&self) -> Result<(), crate::error::ValidationError>;
}

/// Runs audited mutations against one connection.
pub struct Coordinator<'conn> {
    conn: &'conn Connection,
    clock: Arc<dyn Clock>,
}

impl<'conn> Coordinator<'conn> {
    #[must_use]
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_clock(conn, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(conn: &'conn Connection, clock: Arc<dyn Clock>) -> Self {
        Self { conn, clock }
    }

    /// Insert a new entity and its `created` entry.
    ///
    /// # Errors
    ///
    /// `Validation` for a bad draft, a dangling reference or a taken external
    /// identity. `Conflict` when the write lock stays contended, `Storage`
    /// for anything else.
    pub fn create<T: Tracked>(&self, draft: T::Draft, actor: &Actor) -> Result<T, MutationError> {
        actor.validate()?;
        let entity = T::from_draft(draft, Uuid::new_v4().to_string(), self.clock.now());
        entity.validate()?;

        self.write(T::KIND.as_str(), entity.id(), |tx| {
            entity.check_references(None, tx)?;
            entity.insert(tx, WriteToken::new())?;
            let changes = Changes {
                before: None,
                after: Some(snapshot(&entity)?),
            };
            self.record(tx, T::KIND, entity.id(), Action::Created, actor, changes)?;
            Ok(entity.clone())
        })
    }

    /// Merge `patch` into the stored entity and record the classified
    /// transition.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id; otherwise as [`Self::create`].
    pub fn apply<T: Tracked>(
        &self,
        id: &str,
        patch: &T::Patch,
        actor: &Actor,
    ) -> Result<T, MutationError> {
        actor.validate()?;

        self.write(T::KIND.as_str(), id, |tx| {
            let before =
                T::load(tx, id)?.ok_or_else(|| MutationError::not_found(T::KIND.as_str(), id))?;
            let after = before.merged(patch, self.clock.now());
            after.validate()?;
            after.check_references(Some(&before), tx)?;

            let action = classify(Transition::Update {
                before: before.status(),
                requested: T::requested_status(patch),
            });
            after.update(tx, WriteToken::new())?;
            let changes = Changes {
                before: Some(snapshot(&before)?),
                after: Some(snapshot(&after)?),
            };
            self.record(tx, T::KIND, id, action, actor, changes)?;
            Ok(after)
        })
    }

    /// Record a `deleted` entry holding the pre-delete snapshot, then remove
    /// the row. Returns the removed entity.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id; otherwise as [`Self::create`].
    pub fn delete<T: Tracked>(&self, id: &str, actor: &Actor) -> Result<T, MutationError> {
        actor.validate()?;

        self.write(T::KIND.as_str(), id, |tx| {
            let before =
                T::load(tx, id)?.ok_or_else(|| MutationError::not_found(T::KIND.as_str(), id))?;
            self.remove_loaded(tx, &before, actor)?;
            Ok(before)
        })
    }

    /// # Errors
    ///
    /// `Validation` for a blank or over-long name.
    pub fn create_reading_list(&self, draft: NewReadingList) -> Result<ReadingList, MutationError> {
        let list = ReadingList {
            id: Uuid::new_v4().to_string(),
            name: draft.name,
            description: draft.description,
            created_at: self.clock.now(),
        };
        list.validate()?;

        self.write(READING_LIST, &list.id, |tx| {
            rows::insert_reading_list(tx, &list)?;
            Ok(list.clone())
        })
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown list, `Validation` for a bad name.
    pub fn update_reading_list(
        &self,
        id: &str,
        patch: &ReadingListPatch,
    ) -> Result<ReadingList, MutationError> {
        self.write(READING_LIST, id, |tx| {
            let current = rows::load_reading_list(tx, id)?
                .ok_or_else(|| reading_list_not_found(id))?;
            let next = patch.apply(&current);
            next.validate()?;
            rows::update_reading_list(tx, &next)?;
            Ok(next)
        })
    }

    /// Delete a reading list and every article in it.
    ///
    /// Articles are removed one by one through the audited path, each with
    /// its own `deleted` entry, before the list row goes. All of it commits
    /// or none of it does. Returns the removed articles.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown list; otherwise as [`Self::create`].
    pub fn delete_reading_list(&self, id: &str, actor: &Actor) -> Result<Vec<Article>, MutationError> {
        actor.validate()?;

        self.write(READING_LIST, id, |tx| {
            if rows::load_reading_list(tx, id)?.is_none() {
                return Err(reading_list_not_found(id));
            }
            let articles = rows::articles_in_list(tx, id)?;
            for article in &articles {
                self.remove_loaded(tx, article, actor)?;
            }
            rows::remove_reading_list(tx, id)?;
            debug!(reading_list_id = id, articles = articles.len(), "deleted reading list");
            Ok(articles)
        })
    }

    fn remove_loaded<T: Tracked>(
        &self,
        tx: &Connection,
        before: &T,
        actor: &Actor,
    ) -> Result<(), MutationError> {
        let changes = Changes {
            before: Some(snapshot(before)?),
            after: None,
        };
        self.record(tx, T::KIND, before.id(), Action::Deleted, actor, changes)?;
        T::remove(tx, before.id(), WriteToken::new())?;
        Ok(())
    }

    fn record(
        &self,
        tx: &Connection,
        kind: EntityKind,
        entity_id: &str,
        action: Action,
        actor: &Actor,
        changes: Changes,
    ) -> rusqlite::Result<()> {
        let entry = ActivityEntry {
            id: Uuid::new_v4().to_string(),
            entity_type: kind,
            entity_id: entity_id.to_string(),
            action,
            actor: actor.name.clone(),
            actor_type: actor.kind,
            changes: Some(changes),
            timestamp: self.clock.now(),
        };
        rows::insert_activity(tx, &entry)?;
        debug!(
            entity_type = %kind,
            entity_id,
            action = %action,
            actor = %actor.name,
            "recorded mutation"
        );
        Ok(())
    }

    /// Run `op` in a write transaction, retrying once when the write lock is
    /// still held after the busy timeout. A project whose external identity
    /// is already taken is a validation failure, not a storage one.
    fn write<R, F>(&self, kind: &'static str, id: &str, op: F) -> Result<R, MutationError>
    where
        F: Fn(&Transaction<'_>) -> Result<R, MutationError>,
    {
        self.write_retrying(kind, id, op).map_err(|err| match err {
            MutationError::Storage(err) if is_duplicate_identity(&err) => {
                ValidationError::new("external_id", "already used by another project").into()
            }
            other => other,
        })
    }

    fn write_retrying<R, F>(&self, kind: &'static str, id: &str, op: F) -> Result<R, MutationError>
    where
        F: Fn(&Transaction<'_>) -> Result<R, MutationError>,
    {
        match self.attempt(&op) {
            Err(MutationError::Storage(err)) if is_busy(&err) => {
                warn!(entity_type = kind, entity_id = id, error = %err, "write lock busy, retrying");
                match self.attempt(&op) {
                    Err(MutationError::Storage(err)) if is_busy(&err) => {
                        Err(MutationError::Conflict {
                            kind,
                            id: id.to_string(),
                        })
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    fn attempt<R, F>(&self, op: &F) -> Result<R, MutationError>
    where
        F: Fn(&Transaction<'_>) -> Result<R, MutationError>,
    {
        let tx = begin_write(self.conn)?;
        let out = op(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

const READING_LIST: &str = "reading list";

fn reading_list_not_found(id: &str) -> MutationError {
    MutationError::not_found(READING_LIST, id)
}

fn snapshot<T: Serialize>(entity: &T) -> rusqlite::Result<serde_json::Value> {
    serde_json::to_value(entity).map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))
}
