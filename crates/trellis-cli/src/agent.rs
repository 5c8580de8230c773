//! Actor identity resolution for mutating CLI commands.
//!
//! Name: `--actor` flag > `TRELLIS_ACTOR` env > `AGENT` env > user config
//! `actor` > `USER` env (TTY only).
//!
//! Kind: `--actor-type` flag > `TRELLIS_ACTOR_TYPE` env > `agent` when the
//! name came from `AGENT` > `human`.
//!
//! Read-only commands never resolve an actor.

use std::env;
use trellis_core::{Actor, ErrorCode, OwnerType, ValidationError};

use crate::output::CodedError;

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
    fn is_tty(&self) -> bool;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn is_tty(&self) -> bool {
        use std::io::IsTerminal;
        std::io::stdin().is_terminal()
    }
}

/// What the caller supplied on the command line and in user config.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActorHints<'a> {
    pub flag: Option<&'a str>,
    pub type_flag: Option<&'a str>,
    pub user_config: Option<&'a str>,
}

fn resolve_name(hints: &ActorHints<'_>, env: &dyn EnvReader) -> Option<(String, bool)> {
    if let Some(name) = hints.flag.filter(|name| !name.trim().is_empty()) {
        return Some((name.to_string(), false));
    }
    if let Some(name) = env.get("TRELLIS_ACTOR") {
        return Some((name, false));
    }
    if let Some(name) = env.get("AGENT") {
        return Some((name, true));
    }
    if let Some(name) = hints.user_config.filter(|name| !name.trim().is_empty()) {
        return Some((name.to_string(), false));
    }
    if env.is_tty() {
        if let Some(name) = env.get("USER") {
            return Some((name, false));
        }
    }
    None
}

fn resolve_actor_with(hints: &ActorHints<'_>, env: &dyn EnvReader) -> anyhow::Result<Option<Actor>> {
    let Some((name, from_agent_env)) = resolve_name(hints, env) else {
        return Ok(None);
    };

    let explicit = hints
        .type_flag
        .map(str::to_string)
        .or_else(|| env.get("TRELLIS_ACTOR_TYPE"));
    let kind = match explicit {
        Some(raw) => raw
            .parse::<OwnerType>()
            .map_err(ValidationError::from)?,
        None if from_agent_env => OwnerType::Agent,
        None => OwnerType::Human,
    };

    Ok(Some(Actor::new(name, kind)))
}

/// Resolve the acting identity, failing when none can be found.
///
/// # Errors
///
/// `E2002` when no source names an actor, `E2005` for a bad actor type.
pub fn require_actor(hints: &ActorHints<'_>) -> anyhow::Result<Actor> {
    resolve_actor_with(hints, &RealEnv)?.ok_or_else(|| {
        CodedError::new(
            ErrorCode::ValidationFailed,
            "actor identity required for this command; \
             set --actor, TRELLIS_ACTOR, or AGENT",
        )
        .into()
    })
}
