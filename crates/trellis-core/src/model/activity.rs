use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Action, EntityKind, OwnerType};

/// State snapshots attached to an audit entry.
///
/// `created` carries only `after`, `deleted` only `before`, every other
/// action both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
}

/// One immutable row of the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: String,
    pub entity_type: EntityKind,
    /// Weak reference: outlives the entity it names.
    pub entity_id: String,
    pub action: Action,
    pub actor: String,
    pub actor_type: OwnerType,
    pub changes: Option<Changes>,
    pub timestamp: DateTime<Utc>,
}
