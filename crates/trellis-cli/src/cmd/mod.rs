pub mod activity;
pub mod article;
pub mod idea;
pub mod init;
pub mod project;
pub mod reading;
pub mod stats;
pub mod sync;
pub mod task;

use anyhow::{Context as _, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::str::FromStr;
use trellis_core::config::EffectiveConfig;
use trellis_core::db::open_store;
use trellis_core::model::ParseEnumError;
use trellis_core::{Actor, ErrorCode, ValidationError};

use crate::agent::{ActorHints, require_actor};
use crate::output::{CodedError, OutputMode};

/// Everything a command handler needs from the invocation.
pub struct Session {
    pub root: PathBuf,
    pub config: EffectiveConfig,
    pub output: OutputMode,
    pub actor_flag: Option<String>,
    pub actor_type_flag: Option<String>,
}

impl Session {
    /// Open the configured store. It must already exist.
    ///
    /// # Errors
    ///
    /// `E1001` when the store file is missing; storage errors otherwise.
    pub fn store(&self) -> Result<Connection> {
        let path = &self.config.db_path;
        if !path.exists() {
            return Err(CodedError::new(
                ErrorCode::NotInitialized,
                format!("no store at {}", path.display()),
            )
            .into());
        }
        open_store(path)
    }

    /// The identity mutations are attributed to.
    ///
    /// # Errors
    ///
    /// Fails when no actor can be resolved.
    pub fn actor(&self) -> Result<Actor> {
        require_actor(&ActorHints {
            flag: self.actor_flag.as_deref(),
            type_flag: self.actor_type_flag.as_deref(),
            user_config: self.config.user.actor.as_deref(),
        })
    }
}

/// Parse a CLI string into one of the model's text enums.
pub fn parse_enum<T>(raw: &str) -> Result<T, ValidationError>
where
    T: FromStr<Err = ParseEnumError>,
{
    raw.parse::<T>().map_err(ValidationError::from)
}

pub fn parse_opt_enum<T>(raw: Option<&str>) -> Result<Option<T>, ValidationError>
where
    T: FromStr<Err = ParseEnumError>,
{
    raw.map(parse_enum).transpose()
}

/// Accept `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_date(field: &'static str, raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| ValidationError::new(field, format!("expected YYYY-MM-DD or RFC 3339, got '{raw}'")))
}

pub fn parse_json_object(field: &'static str, raw: &str) -> Result<serde_json::Value, ValidationError> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) if value.is_object() => Ok(value),
        Ok(_) => Err(ValidationError::new(field, "must be a JSON object")),
        Err(err) => Err(ValidationError::new(field, format!("invalid JSON: {err}"))),
    }
}

/// Start an update from a `--patch` JSON document, or an empty patch.
/// Unknown fields are rejected by the patch types themselves.
pub fn base_patch<P: DeserializeOwned + Default>(raw: Option<&str>) -> Result<P> {
    match raw {
        None => Ok(P::default()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|err| ValidationError::new("patch", err.to_string()))
            .context("decode --patch"),
    }
}

/// Pick the set value, the clear flag, or leave the field alone.
pub fn tri_state<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear { Some(None) } else { value.map(Some) }
}
