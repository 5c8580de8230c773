use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    EntityKind, Lifecycle, MAX_OWNER_CHARS, MAX_TITLE_CHARS, OwnerType, merge_nullable, nullable,
    require_object, require_text, text_enum,
};
use crate::error::ValidationError;
use crate::mutation::Tracked;

text_enum! {
    IdeaStatus, "idea status" {
        Brainstorm => "brainstorm",
        Research => "research",
        InProgress => "in_progress",
        Shipped => "shipped",
    }
}

impl Default for IdeaStatus {
    fn default() -> Self {
        Self::Brainstorm
    }
}

impl Lifecycle for IdeaStatus {
    const TERMINAL: Self = Self::Shipped;
}

text_enum! {
    IdeaCategory, "idea category" {
        Product => "product",
        Tool => "tool",
        Business => "business",
        Research => "research",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idea {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<IdeaCategory>,
    pub status: IdeaStatus,
    pub owner: String,
    pub owner_type: OwnerType,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewIdea {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<IdeaCategory>,
    #[serde(default)]
    pub status: Option<IdeaStatus>,
    pub owner: String,
    pub owner_type: OwnerType,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl NewIdea {
    pub fn new(title: impl Into<String>, owner: impl Into<String>, owner_type: OwnerType) -> Self {
        Self {
            title: title.into(),
            description: None,
            category: None,
            status: None,
            owner: owner.into(),
            owner_type,
            metadata: None,
        }
    }

    #[must_use]
    pub const fn with_category(mut self, category: IdeaCategory) -> Self {
        self.category = Some(category);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdeaPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub category: Option<Option<IdeaCategory>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<IdeaStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_type: Option<OwnerType>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Option<serde_json::Value>>,
}

impl Tracked for Idea {
    type Status = IdeaStatus;
    type Draft = NewIdea;
    type Patch = IdeaPatch;

    const KIND: EntityKind = EntityKind::Idea;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> IdeaStatus {
        self.status
    }

    fn from_draft(draft: NewIdea, id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            category: draft.category,
            status: draft.status.unwrap_or_default(),
            owner: draft.owner,
            owner_type: draft.owner_type,
            metadata: draft.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    fn merged(&self, patch: &IdeaPatch, now: DateTime<Utc>) -> Self {
        Self {
            id: self.id.clone(),
            title: patch.title.clone().unwrap_or_else(|| self.title.clone()),
            description: merge_nullable(&self.description, &patch.description),
            category: merge_nullable(&self.category, &patch.category),
            status: patch.status.unwrap_or(self.status),
            owner: patch.owner.clone().unwrap_or_else(|| self.owner.clone()),
            owner_type: patch.owner_type.unwrap_or(self.owner_type),
            metadata: merge_nullable(&self.metadata, &patch.metadata),
            created_at: self.created_at,
            updated_at: now,
        }
    }

    fn requested_status(patch: &IdeaPatch) -> Option<IdeaStatus> {
        patch.status
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title, MAX_TITLE_CHARS)?;
        require_text("owner", &self.owner, MAX_OWNER_CHARS)?;
        require_object("metadata", self.metadata.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::{Idea, IdeaCategory, IdeaPatch, IdeaStatus, NewIdea};
    use crate::model::OwnerType;
    use crate::mutation::Tracked;
    use chrono::Utc;

    #[test]
    fn new_ideas_start_in_brainstorm() {
        let idea = Idea::from_draft(
            NewIdea::new("Offline sync", "kai", OwnerType::Agent).with_category(IdeaCategory::Tool),
            "i-1".to_string(),
            Utc::now(),
        );
        assert_eq!(idea.status, IdeaStatus::Brainstorm);
        assert_eq!(idea.category, Some(IdeaCategory::Tool));
        assert!(idea.validate().is_ok());
    }

    #[test]
    fn category_can_be_cleared() {
        let idea = Idea::from_draft(
            NewIdea::new("Offline sync", "kai", OwnerType::Agent).with_category(IdeaCategory::Tool),
            "i-1".to_string(),
            Utc::now(),
        );
        let patch: IdeaPatch = serde_json::from_str(r#"{"category": null}"#).unwrap();
        assert!(idea.merged(&patch, Utc::now()).category.is_none());
    }

    #[test]
    fn research_is_both_a_status_and_a_category() {
        assert_eq!("research".parse::<IdeaStatus>().unwrap(), IdeaStatus::Research);
        assert_eq!(
            "research".parse::<IdeaCategory>().unwrap(),
            IdeaCategory::Research
        );
    }
}
