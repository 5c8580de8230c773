//! Row codecs and the storage half of the write path.
//!
//! [`Persist`] is a supertrait of [`crate::mutation::Tracked`], so its
//! methods are reachable from any `T: Tracked`. The writing methods take a
//! [`WriteToken`], which only this crate can build: outside code can load
//! rows but every write goes through the coordinator or the reconciler.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};
use serde::{Serialize, de::DeserializeOwned};
use std::str::FromStr;

use crate::error::{MutationError, ValidationError};
use crate::model::ParseEnumError;
use crate::model::activity::ActivityEntry;
use crate::model::article::{Article, ReadingList};
use crate::model::idea::Idea;
use crate::model::project::Project;
use crate::model::task::Task;

/// Permission to write a tracked row. Built by the audited write paths.
#[derive(Debug, Clone, Copy)]
pub struct WriteToken(());

impl WriteToken {
    pub(crate) const fn new() -> Self {
        Self(())
    }
}

/// Storage operations for one tracked entity table.
pub trait Persist: Sized {
    fn load(conn: &Connection, id: &str) -> rusqlite::Result<Option<Self>>;
    fn insert(&self, conn: &Connection, token: WriteToken) -> rusqlite::Result<()>;
    fn update(&self, conn: &Connection, token: WriteToken) -> rusqlite::Result<()>;
    fn remove(conn: &Connection, id: &str, token: WriteToken) -> rusqlite::Result<()>;

    /// Check that references introduced by this write point at live rows.
    /// `before` is the stored state for updates and `None` for creates.
    fn check_references(&self, before: Option<&Self>, conn: &Connection) -> Result<(), MutationError> {
        let _ = (before, conn);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Column helpers
// ---------------------------------------------------------------------------

pub(crate) fn micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(idx: usize, us: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, us))
}

pub(crate) fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    from_micros(idx, row.get(idx)?)
}

pub(crate) fn opt_time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<i64>>(idx)?
        .map(|us| from_micros(idx, us))
        .transpose()
}

fn parse_text<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    raw.parse()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

pub(crate) fn enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    let raw: String = row.get(idx)?;
    parse_text(idx, &raw)
}

fn opt_enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = ParseEnumError>,
{
    row.get::<_, Option<String>>(idx)?
        .map(|raw| parse_text(idx, &raw))
        .transpose()
}

fn json_col<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    row.get::<_, Option<String>>(idx)?
        .map(|text| {
            serde_json::from_str(&text).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
            })
        })
        .transpose()
}

fn to_json<T: Serialize>(value: &T) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))
}

fn opt_json<T: Serialize>(value: Option<&T>) -> rusqlite::Result<Option<String>> {
    value.map(to_json).transpose()
}

fn exists(conn: &Connection, sql: &str, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(sql, [id], |row| row.get(0))
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

pub(crate) const TASK_COLUMNS: &str = "task_id, title, description, project_id, status, priority, \
     owner, owner_type, agent_metadata_json, tags_json, due_at_us, position, \
     completed_at_us, created_at_us, updated_at_us";

pub(crate) fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        project_id: row.get(3)?,
        status: enum_col(row, 4)?,
        priority: enum_col(row, 5)?,
        owner: row.get(6)?,
        owner_type: enum_col(row, 7)?,
        agent_metadata: json_col(row, 8)?,
        tags: json_col(row, 9)?.unwrap_or_default(),
        due_date: opt_time_col(row, 10)?,
        position: row.get(11)?,
        completed_at: opt_time_col(row, 12)?,
        created_at: time_col(row, 13)?,
        updated_at: time_col(row, 14)?,
    })
}

impl Persist for Task {
    fn load(conn: &Connection, id: &str) -> rusqlite::Result<Option<Self>> {
        conn.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?1"),
            [id],
            task_from_row,
        )
        .optional()
    }

    fn insert(&self, conn: &Connection, _: WriteToken) -> rusqlite::Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO tasks ({TASK_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ),
            params![
                self.id,
                self.title,
                self.description,
                self.project_id,
                self.status.as_str(),
                self.priority.as_str(),
                self.owner,
                self.owner_type.as_str(),
                opt_json(self.agent_metadata.as_ref())?,
                to_json(&self.tags)?,
                self.due_date.map(micros),
                self.position,
                self.completed_at.map(micros),
                micros(self.created_at),
                micros(self.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update(&self, conn: &Connection, _: WriteToken) -> rusqlite::Result<()> {
        conn.execute(
            "UPDATE tasks SET title = ?2, description = ?3, project_id = ?4, status = ?5, \
             priority = ?6, owner = ?7, owner_type = ?8, agent_metadata_json = ?9, \
             tags_json = ?10, due_at_us = ?11, position = ?12, completed_at_us = ?13, \
             updated_at_us = ?14 \
             WHERE task_id = ?1",
            params![
                self.id,
                self.title,
                self.description,
                self.project_id,
                self.status.as_str(),
                self.priority.as_str(),
                self.owner,
                self.owner_type.as_str(),
                opt_json(self.agent_metadata.as_ref())?,
                to_json(&self.tags)?,
                self.due_date.map(micros),
                self.position,
                self.completed_at.map(micros),
                micros(self.updated_at),
            ],
        )?;
        Ok(())
    }

    fn remove(conn: &Connection, id: &str, _: WriteToken) -> rusqlite::Result<()> {
        conn.execute("DELETE FROM tasks WHERE task_id = ?1", [id])?;
        Ok(())
    }

    fn check_references(&self, before: Option<&Self>, conn: &Connection) -> Result<(), MutationError> {
        let Some(project_id) = &self.project_id else {
            return Ok(());
        };
        // A link that was already stored may dangle; only new links are checked.
        if before.and_then(|task| task.project_id.as_ref()) == Some(project_id) {
            return Ok(());
        }
        if exists(
            conn,
            "SELECT EXISTS(SELECT 1 FROM projects WHERE project_id = ?1)",
            project_id,
        )? {
            Ok(())
        } else {
            Err(ValidationError::new("project_id", format!("no project with id '{project_id}'")).into())
        }
    }
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

pub(crate) const PROJECT_COLUMNS: &str = "project_id, name, description, status, color, \
     external_source, external_id, metadata_json, created_at_us, updated_at_us";

pub(crate) fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: enum_col(row, 3)?,
        color: row.get(4)?,
        external_source: row.get(5)?,
        external_id: row.get(6)?,
        metadata: json_col(row, 7)?,
        created_at: time_col(row, 8)?,
        updated_at: time_col(row, 9)?,
    })
}

/// Look up the project holding an external identity pair.
pub(crate) fn project_by_external_identity(
    conn: &Connection,
    source: &str,
    external_id: &str,
) -> rusqlite::Result<Option<Project>> {
    conn.query_row(
        &format!(
            "SELECT {PROJECT_COLUMNS} FROM projects \
             WHERE external_source = ?1 AND external_id = ?2"
        ),
        params![source, external_id],
        project_from_row,
    )
    .optional()
}

impl Persist for Project {
    fn load(conn: &Connection, id: &str) -> rusqlite::Result<Option<Self>> {
        conn.query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE project_id = ?1"),
            [id],
            project_from_row,
        )
        .optional()
    }

    fn insert(&self, conn: &Connection, _: WriteToken) -> rusqlite::Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO projects ({PROJECT_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                self.id,
                self.name,
                self.description,
                self.status.as_str(),
                self.color,
                self.external_source,
                self.external_id,
                opt_json(self.metadata.as_ref())?,
                micros(self.created_at),
                micros(self.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update(&self, conn: &Connection, _: WriteToken) -> rusqlite::Result<()> {
        conn.execute(
            "UPDATE projects SET name = ?2, description = ?3, status = ?4, color = ?5, \
             metadata_json = ?6, updated_at_us = ?7 \
             WHERE project_id = ?1",
            params![
                self.id,
                self.name,
                self.description,
                self.status.as_str(),
                self.color,
                opt_json(self.metadata.as_ref())?,
                micros(self.updated_at),
            ],
        )?;
        Ok(())
    }

    fn remove(conn: &Connection, id: &str, _: WriteToken) -> rusqlite::Result<()> {
        conn.execute("DELETE FROM projects WHERE project_id = ?1", [id])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ideas
// ---------------------------------------------------------------------------

pub(crate) const IDEA_COLUMNS: &str = "idea_id, title, description, category, status, owner, \
     owner_type, metadata_json, created_at_us, updated_at_us";

pub(crate) fn idea_from_row(row: &Row<'_>) -> rusqlite::Result<Idea> {
    Ok(Idea {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: opt_enum_col(row, 3)?,
        status: enum_col(row, 4)?,
        owner: row.get(5)?,
        owner_type: enum_col(row, 6)?,
        metadata: json_col(row, 7)?,
        created_at: time_col(row, 8)?,
        updated_at: time_col(row, 9)?,
    })
}

impl Persist for Idea {
    fn load(conn: &Connection, id: &str) -> rusqlite::Result<Option<Self>> {
        conn.query_row(
            &format!("SELECT {IDEA_COLUMNS} FROM ideas WHERE idea_id = ?1"),
            [id],
            idea_from_row,
        )
        .optional()
    }

    fn insert(&self, conn: &Connection, _: WriteToken) -> rusqlite::Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO ideas ({IDEA_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                self.id,
                self.title,
                self.description,
                self.category.map(|category| category.as_str()),
                self.status.as_str(),
                self.owner,
                self.owner_type.as_str(),
                opt_json(self.metadata.as_ref())?,
                micros(self.created_at),
                micros(self.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update(&self, conn: &Connection, _: WriteToken) -> rusqlite::Result<()> {
        conn.execute(
            "UPDATE ideas SET title = ?2, description = ?3, category = ?4, status = ?5, \
             owner = ?6, owner_type = ?7, metadata_json = ?8, updated_at_us = ?9 \
             WHERE idea_id = ?1",
            params![
                self.id,
                self.title,
                self.description,
                self.category.map(|category| category.as_str()),
                self.status.as_str(),
                self.owner,
                self.owner_type.as_str(),
                opt_json(self.metadata.as_ref())?,
                micros(self.updated_at),
            ],
        )?;
        Ok(())
    }

    fn remove(conn: &Connection, id: &str, _: WriteToken) -> rusqlite::Result<()> {
        conn.execute("DELETE FROM ideas WHERE idea_id = ?1", [id])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reading lists and articles
// ---------------------------------------------------------------------------

pub(crate) const READING_LIST_COLUMNS: &str = "reading_list_id, name, description, created_at_us";

pub(crate) fn reading_list_from_row(row: &Row<'_>) -> rusqlite::Result<ReadingList> {
    Ok(ReadingList {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: time_col(row, 3)?,
    })
}

pub(crate) fn load_reading_list(conn: &Connection, id: &str) -> rusqlite::Result<Option<ReadingList>> {
    conn.query_row(
        &format!("SELECT {READING_LIST_COLUMNS} FROM reading_lists WHERE reading_list_id = ?1"),
        [id],
        reading_list_from_row,
    )
    .optional()
}

pub(crate) fn insert_reading_list(conn: &Connection, list: &ReadingList) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO reading_lists ({READING_LIST_COLUMNS}) VALUES (?1, ?2, ?3, ?4)"),
        params![list.id, list.name, list.description, micros(list.created_at)],
    )?;
    Ok(())
}

pub(crate) fn update_reading_list(conn: &Connection, list: &ReadingList) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE reading_lists SET name = ?2, description = ?3 WHERE reading_list_id = ?1",
        params![list.id, list.name, list.description],
    )?;
    Ok(())
}

pub(crate) fn remove_reading_list(conn: &Connection, id: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM reading_lists WHERE reading_list_id = ?1", [id])?;
    Ok(())
}

pub(crate) const ARTICLE_COLUMNS: &str = "article_id, reading_list_id, url, title, author, status, \
     notes, added_at_us, read_at_us";

pub(crate) fn article_from_row(row: &Row<'_>) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        reading_list_id: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        author: row.get(4)?,
        status: enum_col(row, 5)?,
        notes: row.get(6)?,
        added_at: time_col(row, 7)?,
        read_at: opt_time_col(row, 8)?,
    })
}

/// Articles of one list, oldest first.
pub(crate) fn articles_in_list(conn: &Connection, reading_list_id: &str) -> rusqlite::Result<Vec<Article>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ARTICLE_COLUMNS} FROM articles \
         WHERE reading_list_id = ?1 ORDER BY added_at_us ASC, article_id ASC"
    ))?;
    stmt.query_map([reading_list_id], article_from_row)?
        .collect()
}

impl Persist for Article {
    fn load(conn: &Connection, id: &str) -> rusqlite::Result<Option<Self>> {
        conn.query_row(
            &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE article_id = ?1"),
            [id],
            article_from_row,
        )
        .optional()
    }

    fn insert(&self, conn: &Connection, _: WriteToken) -> rusqlite::Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO articles ({ARTICLE_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                self.id,
                self.reading_list_id,
                self.url,
                self.title,
                self.author,
                self.status.as_str(),
                self.notes,
                micros(self.added_at),
                self.read_at.map(micros),
            ],
        )?;
        Ok(())
    }

    fn update(&self, conn: &Connection, _: WriteToken) -> rusqlite::Result<()> {
        conn.execute(
            "UPDATE articles SET url = ?2, title = ?3, author = ?4, status = ?5, notes = ?6, \
             read_at_us = ?7 \
             WHERE article_id = ?1",
            params![
                self.id,
                self.url,
                self.title,
                self.author,
                self.status.as_str(),
                self.notes,
                self.read_at.map(micros),
            ],
        )?;
        Ok(())
    }

    fn remove(conn: &Connection, id: &str, _: WriteToken) -> rusqlite::Result<()> {
        conn.execute("DELETE FROM articles WHERE article_id = ?1", [id])?;
        Ok(())
    }

    fn check_references(&self, before: Option<&Self>, conn: &Connection) -> Result<(), MutationError> {
        if before.is_some() {
            return Ok(());
        }
        if exists(
            conn,
            "SELECT EXISTS(SELECT 1 FROM reading_lists WHERE reading_list_id = ?1)",
            &self.reading_list_id,
        )? {
            Ok(())
        } else {
            Err(ValidationError::new(
                "reading_list_id",
                format!("no reading list with id '{}'", self.reading_list_id),
            )
            .into())
        }
    }
}

// ---------------------------------------------------------------------------
// Activity log
// ---------------------------------------------------------------------------

pub(crate) const ACTIVITY_COLUMNS: &str =
    "entry_id, entity_type, entity_id, action, actor, actor_type, changes_json, created_at_us";

pub(crate) fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<ActivityEntry> {
    Ok(ActivityEntry {
        id: row.get(0)?,
        entity_type: enum_col(row, 1)?,
        entity_id: row.get(2)?,
        action: enum_col(row, 3)?,
        actor: row.get(4)?,
        actor_type: enum_col(row, 5)?,
        changes: json_col(row, 6)?,
        timestamp: time_col(row, 7)?,
    })
}

/// Append one audit entry. There is no update or delete counterpart.
pub(crate) fn insert_activity(conn: &Connection, entry: &ActivityEntry) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO activity_log ({ACTIVITY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        params![
            entry.id,
            entry.entity_type.as_str(),
            entry.entity_id,
            entry.action.as_str(),
            entry.actor,
            entry.actor_type.as_str(),
            opt_json(entry.changes.as_ref())?,
            micros(entry.timestamp),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Persist, WriteToken, insert_activity};
    use crate::db::open_store_in_memory;
    use crate::model::activity::{ActivityEntry, Changes};
    use crate::model::task::{NewTask, Priority, Task, TaskStatus};
    use crate::model::{Action, EntityKind, OwnerType};
    use crate::mutation::Tracked;
    use chrono::{TimeZone, Utc};

    fn sample_task() -> Task {
        let now = Utc.with_ymd_and_hms(2025, 4, 2, 8, 30, 0).unwrap();
        let mut draft = NewTask::new("Index the archive", "otto", OwnerType::Agent)
            .with_priority(Priority::High)
            .with_status(TaskStatus::InProgress)
            .with_position(3);
        draft.tags = vec!["search".to_string(), "infra".to_string()];
        Task::from_draft(draft, "t-1".to_string(), now)
    }

    #[test]
    fn task_row_roundtrips_every_column() {
        let conn = open_store_in_memory().expect("store");
        let task = sample_task();
        task.insert(&conn, WriteToken::new()).expect("insert");

        let loaded = Task::load(&conn, "t-1").expect("load").expect("present");
        assert_eq!(loaded, task);

        Task::remove(&conn, "t-1", WriteToken::new()).expect("remove");
        assert!(Task::load(&conn, "t-1").expect("load").is_none());
    }

    #[test]
    fn unknown_enum_text_surfaces_as_conversion_failure() {
        let conn = open_store_in_memory().expect("store");
        sample_task().insert(&conn, WriteToken::new()).expect("insert");
        conn.execute_batch("PRAGMA ignore_check_constraints = ON")
            .expect("pragma");
        conn.execute("UPDATE tasks SET priority = 'someday'", [])
            .expect("bypass check");

        let err = Task::load(&conn, "t-1").unwrap_err();
        assert!(matches!(
            err,
            rusqlite::Error::FromSqlConversionFailure(5, _, _)
        ));
    }

    #[test]
    fn new_project_link_must_exist() {
        let conn = open_store_in_memory().expect("store");
        let mut task = sample_task();
        task.project_id = Some("p-missing".to_string());
        let err = task.check_references(None, &conn).unwrap_err();
        assert_eq!(err.status_code(), 400);

        // An already-stored dangling link is tolerated on later edits.
        let before = task.clone();
        assert!(task.check_references(Some(&before), &conn).is_ok());
    }

    #[test]
    fn activity_changes_roundtrip_as_json() {
        let conn = open_store_in_memory().expect("store");
        let entry = ActivityEntry {
            id: "e-1".to_string(),
            entity_type: EntityKind::Task,
            entity_id: "t-1".to_string(),
            action: Action::Created,
            actor: "otto".to_string(),
            actor_type: OwnerType::Agent,
            changes: Some(Changes {
                before: None,
                after: Some(serde_json::json!({"title": "x"})),
            }),
            timestamp: Utc.with_ymd_and_hms(2025, 4, 2, 8, 30, 0).unwrap(),
        };
        insert_activity(&conn, &entry).expect("insert");

        let loaded = conn
            .query_row(
                &format!(
                    "SELECT {} FROM activity_log WHERE entry_id = 'e-1'",
                    super::ACTIVITY_COLUMNS
                ),
                [],
                super::activity_from_row,
            )
            .expect("load");
        assert_eq!(loaded, entry);
    }
}
