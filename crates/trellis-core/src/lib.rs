//! trellis-core library.
//!
//! Tracked work (tasks, projects, ideas, articles) lives in one SQLite
//! store. Every human or agent write goes through [`mutation::Coordinator`],
//! which pairs the entity change with an activity entry in the same
//! transaction. Upstream projects arrive through [`reconcile::Reconciler`].
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` on read paths and setup; the typed
//!   [`error::MutationError`] on the write path.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod classify;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod mutation;
pub mod ordering;
pub mod reconcile;

pub use error::{ErrorCode, MutationError, ValidationError};
pub use model::{Action, Actor, EntityKind, OwnerType};
pub use mutation::{Coordinator, Tracked};
pub use reconcile::{ExternalProject, ProjectFeed, Reconciler, SyncResult};
