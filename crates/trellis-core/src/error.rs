use std::fmt;

use crate::model::ParseEnumError;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    EntityNotFound,
    ValidationFailed,
    InvalidEnumValue,
    WriteConflict,
    StorageFailure,
    FeedUnreadable,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::EntityNotFound => "E2001",
            Self::ValidationFailed => "E2002",
            Self::InvalidEnumValue => "E2005",
            Self::WriteConflict => "E5002",
            Self::StorageFailure => "E5003",
            Self::FeedUnreadable => "E6001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Store not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::EntityNotFound => "Entity not found",
            Self::ValidationFailed => "Validation failed",
            Self::InvalidEnumValue => "Invalid status/priority/owner type value",
            Self::WriteConflict => "Write conflict",
            Self::StorageFailure => "Storage failure",
            Self::FeedUnreadable => "Project feed unreadable",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `trellis init` to create the store."),
            Self::ConfigParseError => Some("Fix syntax in .trellis/config.toml and retry."),
            Self::EntityNotFound => None,
            Self::ValidationFailed => Some("Correct the rejected field and resubmit."),
            Self::InvalidEnumValue => Some("Use one of the documented status/priority values."),
            Self::WriteConflict => Some("Retry after the concurrent writer finishes."),
            Self::StorageFailure => Some("Check disk space and database permissions, then retry."),
            Self::FeedUnreadable => Some("Verify the feed path and that it holds a JSON array."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A field-level rejection raised before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    /// Whether this rejection came from an out-of-domain enum value.
    #[must_use]
    pub fn is_enum_value(&self) -> bool {
        self.reason.starts_with("expected one of")
    }
}

impl From<ParseEnumError> for ValidationError {
    fn from(value: ParseEnumError) -> Self {
        Self {
            field: value.expected,
            reason: format!("expected one of {}, got '{}'", value.allowed, value.got),
        }
    }
}

/// Failure of an audited create/update/delete.
///
/// Every variant implies the enclosing transaction was rolled back: neither
/// the entity write nor its activity entry is visible.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("write to {kind} {id} still contended after retry")]
    Conflict { kind: &'static str, id: String },

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl MutationError {
    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(err) if err.is_enum_value() => ErrorCode::InvalidEnumValue,
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::NotFound { .. } => ErrorCode::EntityNotFound,
            Self::Conflict { .. } => ErrorCode::WriteConflict,
            Self::Storage(_) => ErrorCode::StorageFailure,
        }
    }

    /// HTTP-equivalent status for callers exposing the store over a wire.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 503,
            Self::Storage(_) => 500,
        }
    }

    /// True when retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Storage(err) => is_busy(err),
            Self::Validation(_) | Self::NotFound { .. } => false,
        }
    }
}

/// Whether SQLite reported lock contention rather than a hard failure.
pub(crate) fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if matches!(
                inner.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
    )
}

/// Whether SQLite rejected a write on a UNIQUE/CHECK/FK constraint.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Whether a write collided with another project's external identity.
pub(crate) fn is_duplicate_identity(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, Some(message))
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
                && message.contains("projects.external_id")
    )
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, MutationError, ValidationError};
    use crate::model::ParseEnumError;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::NotInitialized,
            ErrorCode::ConfigParseError,
            ErrorCode::EntityNotFound,
            ErrorCode::ValidationFailed,
            ErrorCode::InvalidEnumValue,
            ErrorCode::WriteConflict,
            ErrorCode::StorageFailure,
            ErrorCode::FeedUnreadable,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::WriteConflict.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn status_codes_separate_client_and_server_failures() {
        let validation = MutationError::from(ValidationError::new("title", "must not be empty"));
        assert_eq!(validation.status_code(), 400);
        assert!(!validation.is_transient());

        let missing = MutationError::not_found("task", "t-1");
        assert_eq!(missing.status_code(), 404);
        assert_eq!(missing.code(), ErrorCode::EntityNotFound);

        let conflict = MutationError::Conflict {
            kind: "project",
            id: "p-1".to_string(),
        };
        assert!(conflict.is_transient());
        assert_eq!(conflict.code(), ErrorCode::WriteConflict);
    }

    #[test]
    fn enum_parse_failures_keep_their_own_code() {
        let parse = ParseEnumError {
            expected: "priority",
            allowed: "low, medium, high, urgent",
            got: "critical".to_string(),
        };
        let err = MutationError::from(ValidationError::from(parse));
        assert_eq!(err.code(), ErrorCode::InvalidEnumValue);
        assert!(err.to_string().contains("critical"));
    }
}
