//! Entity model for tracked work.
//!
//! Four kinds are tracked (task, project, idea, article): each carries a
//! status with one terminal value, and every user/agent mutation of them is
//! paired with an [`activity::ActivityEntry`]. Reading lists are plain
//! containers and are not audited.

pub mod activity;
pub mod article;
pub mod idea;
pub mod project;
pub mod task;

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Declares a closed set of lowercase string values with `Display`,
/// `FromStr` and serde support that all agree on the same spelling.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            /// Every value, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::model::ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = $crate::model::normalize(s);
                match normalized.as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err($crate::model::ParseEnumError {
                        expected: $label,
                        allowed: concat!($($text, " "),+).trim_end(),
                        got: s.to_string(),
                    }),
                }
            }
        }
    };
}

pub(crate) use text_enum;

text_enum! {
    /// Kinds whose mutations are recorded in the activity log.
    EntityKind, "entity type" {
        Task => "task",
        Project => "project",
        Idea => "idea",
        Article => "article",
    }
}

text_enum! {
    /// Who performs or owns work.
    OwnerType, "owner type" {
        Human => "human",
        Agent => "agent",
    }
}

text_enum! {
    /// The audit verb derived from a transition.
    Action, "action" {
        Created => "created",
        Updated => "updated",
        Completed => "completed",
        Moved => "moved",
        Deleted => "deleted",
    }
}

/// Status enums of tracked kinds: one value is the terminal "done" state.
pub trait Lifecycle: Copy + Eq + fmt::Debug + fmt::Display {
    const TERMINAL: Self;

    fn is_terminal(self) -> bool {
        self == Self::TERMINAL
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub allowed: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {}: '{}' (expected one of {})",
            self.expected, self.got, self.allowed
        )
    }
}

impl std::error::Error for ParseEnumError {}

pub(crate) fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase().replace('-', "_")
}

/// The human or agent a mutation is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    pub kind: OwnerType,
}

impl Actor {
    pub fn new(name: impl Into<String>, kind: OwnerType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn human(name: impl Into<String>) -> Self {
        Self::new(name, OwnerType::Human)
    }

    pub fn agent(name: impl Into<String>) -> Self {
        Self::new(name, OwnerType::Agent)
    }

    /// # Errors
    ///
    /// Rejects empty or over-long actor names.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("actor", &self.name, MAX_OWNER_CHARS)
    }
}

pub(crate) const MAX_TITLE_CHARS: usize = 500;
pub(crate) const MAX_NAME_CHARS: usize = 200;
pub(crate) const MAX_OWNER_CHARS: usize = 100;

/// Reject blank strings and strings longer than `max` characters.
pub(crate) fn require_text(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    let len = value.chars().count();
    if len > max {
        return Err(ValidationError::new(
            field,
            format!("must be at most {max} characters, got {len}"),
        ));
    }
    Ok(())
}

/// Structured metadata must be a JSON object when present.
pub(crate) fn require_object(
    field: &'static str,
    value: Option<&serde_json::Value>,
) -> Result<(), ValidationError> {
    match value {
        None | Some(serde_json::Value::Object(_)) => Ok(()),
        Some(other) => Err(ValidationError::new(
            field,
            format!("must be a JSON object, got {}", json_kind(other)),
        )),
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Trim, drop blanks, dedupe and sort a tag list.
pub(crate) fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tags
        .iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Deserialize a nullable patch field so that an absent key stays `None`
/// while an explicit `null` becomes `Some(None)`.
pub(crate) fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Apply a tri-state patch field onto a nullable value.
pub(crate) fn merge_nullable<T: Clone>(current: &Option<T>, patch: &Option<Option<T>>) -> Option<T> {
    match patch {
        None => current.clone(),
        Some(next) => next.clone(),
    }
}
