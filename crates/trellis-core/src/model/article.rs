use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    EntityKind, Lifecycle, MAX_NAME_CHARS, MAX_TITLE_CHARS, merge_nullable, nullable,
    require_text, text_enum,
};
use crate::error::ValidationError;
use crate::mutation::Tracked;

const MAX_URL_CHARS: usize = 2048;

text_enum! {
    ArticleStatus, "article status" {
        Unread => "unread",
        Reading => "reading",
        Read => "read",
        Archived => "archived",
    }
}

impl Default for ArticleStatus {
    fn default() -> Self {
        Self::Unread
    }
}

impl Lifecycle for ArticleStatus {
    const TERMINAL: Self = Self::Read;
}

/// A named container of articles. Not audited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingList {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ReadingList {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name, MAX_NAME_CHARS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewReadingList {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewReadingList {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadingListPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
}

impl ReadingListPatch {
    pub(crate) fn apply(&self, list: &ReadingList) -> ReadingList {
        ReadingList {
            id: list.id.clone(),
            name: self.name.clone().unwrap_or_else(|| list.name.clone()),
            description: merge_nullable(&list.description, &self.description),
            created_at: list.created_at,
        }
    }
}

/// Reading list row with its article counters, as shown in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadingListSummary {
    #[serde(flatten)]
    pub list: ReadingList,
    pub article_count: u64,
    pub unread_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    /// Owning list. Fixed at creation.
    pub reading_list_id: String,
    pub url: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub status: ArticleStatus,
    pub notes: Option<String>,
    pub added_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewArticle {
    pub reading_list_id: String,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub status: Option<ArticleStatus>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewArticle {
    pub fn new(reading_list_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            reading_list_id: reading_list_id.into(),
            url: url.into(),
            title: None,
            author: None,
            status: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArticlePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub author: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ArticleStatus>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
}

/// Accept absolute `http`/`https` URLs with a non-empty host.
fn validate_url(url: &str) -> Result<(), ValidationError> {
    require_text("url", url, MAX_URL_CHARS)?;
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| ValidationError::new("url", "must start with http:// or https://"))?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("url", format!("has no valid host: '{url}'")));
    }
    Ok(())
}

impl Tracked for Article {
    type Status = ArticleStatus;
    type Draft = NewArticle;
    type Patch = ArticlePatch;

    const KIND: EntityKind = EntityKind::Article;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> ArticleStatus {
        self.status
    }

    fn from_draft(draft: NewArticle, id: String, now: DateTime<Utc>) -> Self {
        let status = draft.status.unwrap_or_default();
        Self {
            id,
            reading_list_id: draft.reading_list_id,
            url: draft.url,
            title: draft.title,
            author: draft.author,
            status,
            notes: draft.notes,
            added_at: now,
            read_at: status.is_terminal().then_some(now),
        }
    }

    fn merged(&self, patch: &ArticlePatch, now: DateTime<Utc>) -> Self {
        let status = patch.status.unwrap_or(self.status);
        let read_at = if status.is_terminal() && !self.status.is_terminal() {
            Some(now)
        } else {
            self.read_at
        };

        Self {
            id: self.id.clone(),
            reading_list_id: self.reading_list_id.clone(),
            url: patch.url.clone().unwrap_or_else(|| self.url.clone()),
            title: merge_nullable(&self.title, &patch.title),
            author: merge_nullable(&self.author, &patch.author),
            status,
            notes: merge_nullable(&self.notes, &patch.notes),
            added_at: self.added_at,
            read_at,
        }
    }

    fn requested_status(patch: &ArticlePatch) -> Option<ArticleStatus> {
        patch.status
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("reading_list_id", &self.reading_list_id, MAX_NAME_CHARS)?;
        validate_url(&self.url)?;
        if let Some(title) = &self.title {
            require_text("title", title, MAX_TITLE_CHARS)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Article, ArticlePatch, ArticleStatus, NewArticle, validate_url};
    use crate::mutation::Tracked;
    use chrono::{Duration, Utc};

    #[test]
    fn url_must_be_absolute_http() {
        assert!(validate_url("https://example.com/post?id=3").is_ok());
        assert!(validate_url("http://localhost:8080").is_ok());
        for bad in ["", "example.com", "ftp://example.com", "https://", "https:///path"] {
            assert!(validate_url(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn read_at_is_stamped_once() {
        let now = Utc::now();
        let article = Article::from_draft(
            NewArticle::new("rl-1", "https://example.com"),
            "a-1".to_string(),
            now,
        );
        assert_eq!(article.status, ArticleStatus::Unread);
        assert!(article.read_at.is_none());

        let later = now + Duration::minutes(3);
        let read = article.merged(
            &ArticlePatch {
                status: Some(ArticleStatus::Read),
                ..ArticlePatch::default()
            },
            later,
        );
        assert_eq!(read.read_at, Some(later));

        let archived = read.merged(
            &ArticlePatch {
                status: Some(ArticleStatus::Archived),
                ..ArticlePatch::default()
            },
            later + Duration::minutes(1),
        );
        assert_eq!(archived.read_at, Some(later));
    }

    #[test]
    fn patch_cannot_move_article_between_lists() {
        let err = serde_json::from_str::<ArticlePatch>(r#"{"reading_list_id": "rl-2"}"#);
        assert!(err.is_err());
    }
}
