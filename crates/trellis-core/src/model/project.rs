use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    EntityKind, Lifecycle, MAX_NAME_CHARS, MAX_OWNER_CHARS, merge_nullable, nullable,
    require_object, require_text, text_enum,
};
use crate::error::ValidationError;
use crate::mutation::Tracked;

/// Color given to projects that never picked one.
pub const DEFAULT_PROJECT_COLOR: &str = "#6B7280";

text_enum! {
    ProjectStatus, "project status" {
        Idea => "idea",
        Active => "active",
        Paused => "paused",
        Shipped => "shipped",
    }
}

impl Default for ProjectStatus {
    fn default() -> Self {
        Self::Idea
    }
}

impl Lifecycle for ProjectStatus {
    const TERMINAL: Self = Self::Shipped;
}

/// `(external_source, external_id)`: identity of a project imported from
/// outside. At most one project holds a given pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalIdentity {
    pub source: String,
    pub id: String,
}

impl ExternalIdentity {
    pub fn new(source: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub color: String,
    pub external_source: Option<String>,
    pub external_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// The external identity pair, when both halves are set.
    #[must_use]
    pub fn external_identity(&self) -> Option<ExternalIdentity> {
        match (&self.external_source, &self.external_id) {
            (Some(source), Some(id)) => Some(ExternalIdentity::new(source, id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub external_source: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl NewProject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            status: None,
            color: None,
            external_source: None,
            external_id: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    #[must_use]
    pub const fn with_status(mut self, status: ProjectStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Option<serde_json::Value>>,
}

fn validate_color(color: &str) -> Result<(), ValidationError> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new(
            "color",
            format!("must look like #RRGGBB, got '{color}'"),
        ))
    }
}

impl Tracked for Project {
    type Status = ProjectStatus;
    type Draft = NewProject;
    type Patch = ProjectPatch;

    const KIND: EntityKind = EntityKind::Project;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> ProjectStatus {
        self.status
    }

    fn from_draft(draft: NewProject, id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name,
            description: draft.description,
            status: draft.status.unwrap_or_default(),
            color: draft
                .color
                .unwrap_or_else(|| DEFAULT_PROJECT_COLOR.to_string()),
            external_source: draft.external_source,
            external_id: draft.external_id,
            metadata: draft.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    fn merged(&self, patch: &ProjectPatch, now: DateTime<Utc>) -> Self {
        Self {
            id: self.id.clone(),
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            description: merge_nullable(&self.description, &patch.description),
            status: patch.status.unwrap_or(self.status),
            color: patch.color.clone().unwrap_or_else(|| self.color.clone()),
            external_source: self.external_source.clone(),
            external_id: self.external_id.clone(),
            metadata: merge_nullable(&self.metadata, &patch.metadata),
            created_at: self.created_at,
            updated_at: now,
        }
    }

    fn requested_status(patch: &ProjectPatch) -> Option<ProjectStatus> {
        patch.status
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name, MAX_NAME_CHARS)?;
        validate_color(&self.color)?;
        require_object("metadata", self.metadata.as_ref())?;
        match (&self.external_source, &self.external_id) {
            (Some(source), Some(id)) => {
                require_text("external_source", source, MAX_OWNER_CHARS)?;
                require_text("external_id", id, MAX_NAME_CHARS)?;
            }
            (None, None) => {}
            (Some(_), None) => {
                return Err(ValidationError::new(
                    "external_id",
                    "required when external_source is set",
                ));
            }
            (None, Some(_)) => {
                return Err(ValidationError::new(
                    "external_source",
                    "required when external_id is set",
                ));
            }
        }
        Ok(())
    }
}
