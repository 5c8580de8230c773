use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    EntityKind, Lifecycle, MAX_OWNER_CHARS, MAX_TITLE_CHARS, OwnerType, merge_nullable,
    normalize_tags, nullable, require_text, text_enum,
};
use crate::error::ValidationError;
use crate::mutation::Tracked;

text_enum! {
    /// Kanban column a task sits in.
    TaskStatus, "task status" {
        Backlog => "backlog",
        Todo => "todo",
        InProgress => "in_progress",
        Blocked => "blocked",
        Review => "review",
        Done => "done",
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Todo
    }
}

impl Lifecycle for TaskStatus {
    const TERMINAL: Self = Self::Done;
}

text_enum! {
    Priority, "priority" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl Priority {
    /// Listing rank: lower sorts first.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Urgent => 1,
            Self::High => 2,
            Self::Medium => 3,
            Self::Low => 4,
        }
    }
}

/// Run statistics attached to tasks executed by an agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
}

impl AgentMetadata {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(model) = &self.model {
            require_text("agent_metadata.model", model, MAX_OWNER_CHARS)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    /// Weak link: may dangle after the project is deleted.
    pub project_id: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub owner: String,
    pub owner_type: OwnerType,
    pub agent_metadata: Option<AgentMetadata>,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    /// Manual order inside one lane; meaningless across lanes.
    pub position: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creation request for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    pub owner: String,
    pub owner_type: OwnerType,
    #[serde(default)]
    pub agent_metadata: Option<AgentMetadata>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub position: Option<i64>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, owner: impl Into<String>, owner_type: OwnerType) -> Self {
        Self {
            title: title.into(),
            description: None,
            project_id: None,
            status: None,
            priority: None,
            owner: owner.into(),
            owner_type,
            agent_metadata: None,
            tags: Vec::new(),
            due_date: None,
            position: None,
        }
    }

    #[must_use]
    pub const fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub const fn with_position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }

    #[must_use]
    pub fn in_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

/// Partial update: only fields the caller supplied are `Some`.
///
/// Nullable fields are tri-state: absent, `Some(Some(v))` to set,
/// `Some(None)` to clear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_type: Option<OwnerType>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub agent_metadata: Option<Option<AgentMetadata>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

impl TaskPatch {
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Move within or across lanes: new status and/or manual position.
    #[must_use]
    pub fn moved_to(status: Option<TaskStatus>, position: i64) -> Self {
        Self {
            status,
            position: Some(position),
            ..Self::default()
        }
    }
}

impl Tracked for Task {
    type Status = TaskStatus;
    type Draft = NewTask;
    type Patch = TaskPatch;

    const KIND: EntityKind = EntityKind::Task;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> TaskStatus {
        self.status
    }

    fn from_draft(draft: NewTask, id: String, now: DateTime<Utc>) -> Self {
        let status = draft.status.unwrap_or_default();
        Self {
            id,
            title: draft.title,
            description: draft.description,
            project_id: draft.project_id,
            status,
            priority: draft.priority.unwrap_or_default(),
            owner: draft.owner,
            owner_type: draft.owner_type,
            agent_metadata: draft.agent_metadata,
            tags: normalize_tags(&draft.tags),
            due_date: draft.due_date,
            position: draft.position.unwrap_or(0),
            completed_at: status.is_terminal().then_some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn merged(&self, patch: &TaskPatch, now: DateTime<Utc>) -> Self {
        let status = patch.status.unwrap_or(self.status);
        let completed_at = match (self.status.is_terminal(), status.is_terminal()) {
            (false, true) => Some(now),
            (true, false) => None,
            _ => self.completed_at,
        };

        Self {
            id: self.id.clone(),
            title: patch.title.clone().unwrap_or_else(|| self.title.clone()),
            description: merge_nullable(&self.description, &patch.description),
            project_id: merge_nullable(&self.project_id, &patch.project_id),
            status,
            priority: patch.priority.unwrap_or(self.priority),
            owner: patch.owner.clone().unwrap_or_else(|| self.owner.clone()),
            owner_type: patch.owner_type.unwrap_or(self.owner_type),
            agent_metadata: merge_nullable(&self.agent_metadata, &patch.agent_metadata),
            tags: patch
                .tags
                .as_deref()
                .map_or_else(|| self.tags.clone(), normalize_tags),
            due_date: merge_nullable(&self.due_date, &patch.due_date),
            position: patch.position.unwrap_or(self.position),
            completed_at,
            created_at: self.created_at,
            updated_at: now,
        }
    }

    fn requested_status(patch: &TaskPatch) -> Option<TaskStatus> {
        patch.status
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title, MAX_TITLE_CHARS)?;
        require_text("owner", &self.owner, MAX_OWNER_CHARS)?;
        if let Some(project_id) = &self.project_id {
            require_text("project_id", project_id, MAX_OWNER_CHARS)?;
        }
        if self.position < 0 {
            return Err(ValidationError::new(
                "position",
                format!("must be >= 0, got {}", self.position),
            ));
        }
        if let Some(metadata) = &self.agent_metadata {
            metadata.validate()?;
        }
        Ok(())
    }
}
