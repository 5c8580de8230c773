//! Typed read queries over the entity store.
//!
//! All functions take a shared `&Connection` and return `anyhow::Result`
//! with model structs (never raw rows). Reads never go through the
//! coordinator and never write.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params_from_iter, types::ToSql};

use super::rows::{
    ACTIVITY_COLUMNS, ARTICLE_COLUMNS, IDEA_COLUMNS, PROJECT_COLUMNS, READING_LIST_COLUMNS,
    TASK_COLUMNS, activity_from_row, article_from_row, idea_from_row, project_from_row,
    project_by_external_identity, reading_list_from_row, task_from_row,
};
use crate::model::activity::ActivityEntry;
use crate::model::article::{Article, ArticleStatus, ReadingList, ReadingListSummary};
use crate::model::idea::{Idea, IdeaCategory, IdeaStatus};
use crate::model::project::{ExternalIdentity, Project, ProjectStatus};
use crate::model::task::{Priority, Task, TaskStatus};
use crate::model::{EntityKind, OwnerType};
use crate::ordering::task_order_clause;

/// Entries returned by [`list_activity`] when no limit is given.
pub const DEFAULT_ACTIVITY_LIMIT: u32 = 50;

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Filter criteria for task listings. Set fields combine with AND.
///
/// Done tasks are hidden unless `include_done` is set or `status` asks
/// for them explicitly.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub project_id: Option<String>,
    pub owner_type: Option<OwnerType>,
    /// Task must carry this tag.
    pub tag: Option<String>,
    pub include_done: bool,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub external_source: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IdeaFilter {
    pub status: Option<IdeaStatus>,
    pub category: Option<IdeaCategory>,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub reading_list_id: Option<String>,
    pub status: Option<ArticleStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub entity_type: Option<EntityKind>,
    pub entity_id: Option<String>,
    pub actor_type: Option<OwnerType>,
    /// Defaults to [`DEFAULT_ACTIVITY_LIMIT`].
    pub limit: Option<u32>,
}

/// Accumulates `WHERE` terms with positional parameters.
#[derive(Default)]
struct Conditions {
    terms: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl Conditions {
    /// Add `term`, where `{}` is replaced by the parameter's placeholder.
    fn push(&mut self, term: &str, value: impl ToSql + 'static) {
        self.params.push(Box::new(value));
        let placeholder = format!("?{}", self.params.len());
        self.terms.push(term.replace("{}", &placeholder));
    }

    fn where_clause(&self) -> String {
        if self.terms.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.terms.join(" AND "))
        }
    }

    fn query<T>(
        &self,
        conn: &Connection,
        sql: &str,
        map: impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = conn
            .prepare(sql)
            .with_context(|| format!("prepare query: {sql}"))?;
        let params: Vec<&dyn ToSql> = self.params.iter().map(AsRef::as_ref).collect();
        let rows = stmt
            .query_map(params_from_iter(params), map)
            .with_context(|| format!("execute query: {sql}"))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("read row")?);
        }
        Ok(out)
    }
}

fn limit_clause(limit: Option<u32>) -> String {
    limit.map_or_else(String::new, |limit| format!(" LIMIT {limit}"))
}

// ---------------------------------------------------------------------------
// Single-row lookups
// ---------------------------------------------------------------------------

fn get_one<T>(
    conn: &Connection,
    sql: &str,
    id: &str,
    map: impl FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
) -> Result<Option<T>> {
    conn.query_row(sql, [id], map)
        .optional()
        .with_context(|| format!("lookup '{id}'"))
}

/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
    get_one(
        conn,
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?1"),
        id,
        task_from_row,
    )
}

/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_project(conn: &Connection, id: &str) -> Result<Option<Project>> {
    get_one(
        conn,
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE project_id = ?1"),
        id,
        project_from_row,
    )
}

/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_idea(conn: &Connection, id: &str) -> Result<Option<Idea>> {
    get_one(
        conn,
        &format!("SELECT {IDEA_COLUMNS} FROM ideas WHERE idea_id = ?1"),
        id,
        idea_from_row,
    )
}

/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_article(conn: &Connection, id: &str) -> Result<Option<Article>> {
    get_one(
        conn,
        &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE article_id = ?1"),
        id,
        article_from_row,
    )
}

/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_reading_list(conn: &Connection, id: &str) -> Result<Option<ReadingList>> {
    get_one(
        conn,
        &format!("SELECT {READING_LIST_COLUMNS} FROM reading_lists WHERE reading_list_id = ?1"),
        id,
        reading_list_from_row,
    )
}

/// Find the project holding an external identity pair.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn find_project_by_external_identity(
    conn: &Connection,
    identity: &ExternalIdentity,
) -> Result<Option<Project>> {
    project_by_external_identity(conn, &identity.source, &identity.id)
        .with_context(|| format!("lookup project {}:{}", identity.source, identity.id))
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// List tasks in priority order (see [`crate::ordering`]).
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_tasks(conn: &Connection, filter: &TaskFilter) -> Result<Vec<Task>> {
    let mut conditions = Conditions::default();

    match filter.status {
        Some(status) => conditions.push("status = {}", status.as_str()),
        None if !filter.include_done => {
            conditions.push("status <> {}", TaskStatus::Done.as_str());
        }
        None => {}
    }
    if let Some(priority) = filter.priority {
        conditions.push("priority = {}", priority.as_str());
    }
    if let Some(project_id) = &filter.project_id {
        conditions.push("project_id = {}", project_id.clone());
    }
    if let Some(owner_type) = filter.owner_type {
        conditions.push("owner_type = {}", owner_type.as_str());
    }
    if let Some(tag) = &filter.tag {
        conditions.push(
            "EXISTS (SELECT 1 FROM json_each(tasks.tags_json) WHERE json_each.value = {})",
            tag.trim().to_string(),
        );
    }

    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM tasks{} {}{}",
        conditions.where_clause(),
        task_order_clause(),
        limit_clause(filter.limit)
    );
    conditions.query(conn, &sql, task_from_row)
}

/// List projects, newest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_projects(conn: &Connection, filter: &ProjectFilter) -> Result<Vec<Project>> {
    let mut conditions = Conditions::default();
    if let Some(status) = filter.status {
        conditions.push("status = {}", status.as_str());
    }
    if let Some(source) = &filter.external_source {
        conditions.push("external_source = {}", source.clone());
    }

    let sql = format!(
        "SELECT {PROJECT_COLUMNS} FROM projects{} ORDER BY created_at_us DESC, project_id ASC",
        conditions.where_clause()
    );
    conditions.query(conn, &sql, project_from_row)
}

/// List ideas, newest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_ideas(conn: &Connection, filter: &IdeaFilter) -> Result<Vec<Idea>> {
    let mut conditions = Conditions::default();
    if let Some(status) = filter.status {
        conditions.push("status = {}", status.as_str());
    }
    if let Some(category) = filter.category {
        conditions.push("category = {}", category.as_str());
    }

    let sql = format!(
        "SELECT {IDEA_COLUMNS} FROM ideas{} ORDER BY created_at_us DESC, idea_id ASC",
        conditions.where_clause()
    );
    conditions.query(conn, &sql, idea_from_row)
}

/// List reading lists with article and unread counters, by name.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_reading_lists(conn: &Connection) -> Result<Vec<ReadingListSummary>> {
    let columns = READING_LIST_COLUMNS
        .split(", ")
        .map(|column| format!("rl.{column}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {columns}, COUNT(a.article_id), \
         COALESCE(SUM(CASE WHEN a.status = '{unread}' THEN 1 ELSE 0 END), 0) \
         FROM reading_lists rl \
         LEFT JOIN articles a ON a.reading_list_id = rl.reading_list_id \
         GROUP BY rl.reading_list_id \
         ORDER BY rl.name ASC, rl.reading_list_id ASC",
        unread = ArticleStatus::Unread.as_str()
    );

    Conditions::default().query(conn, &sql, |row| {
        let article_count: i64 = row.get(4)?;
        let unread_count: i64 = row.get(5)?;
        Ok(ReadingListSummary {
            list: reading_list_from_row(row)?,
            article_count: u64::try_from(article_count).unwrap_or_default(),
            unread_count: u64::try_from(unread_count).unwrap_or_default(),
        })
    })
}

/// List articles, newest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_articles(conn: &Connection, filter: &ArticleFilter) -> Result<Vec<Article>> {
    let mut conditions = Conditions::default();
    if let Some(list_id) = &filter.reading_list_id {
        conditions.push("reading_list_id = {}", list_id.clone());
    }
    if let Some(status) = filter.status {
        conditions.push("status = {}", status.as_str());
    }

    let sql = format!(
        "SELECT {ARTICLE_COLUMNS} FROM articles{} ORDER BY added_at_us DESC, article_id ASC",
        conditions.where_clause()
    );
    conditions.query(conn, &sql, article_from_row)
}

/// List audit entries, newest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_activity(conn: &Connection, filter: &ActivityFilter) -> Result<Vec<ActivityEntry>> {
    let mut conditions = Conditions::default();
    if let Some(kind) = filter.entity_type {
        conditions.push("entity_type = {}", kind.as_str());
    }
    if let Some(entity_id) = &filter.entity_id {
        conditions.push("entity_id = {}", entity_id.clone());
    }
    if let Some(actor_type) = filter.actor_type {
        conditions.push("actor_type = {}", actor_type.as_str());
    }
    let sql = format!(
        "SELECT {ACTIVITY_COLUMNS} FROM activity_log{} ORDER BY seq DESC{}",
        conditions.where_clause(),
        limit_clause(Some(filter.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT)))
    );
    conditions.query(conn, &sql, activity_from_row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_store_in_memory;
    use crate::model::Actor;
    use crate::model::article::{NewArticle, NewReadingList};
    use crate::model::project::NewProject;
    use crate::model::task::{NewTask, TaskPatch};
    use crate::mutation::Coordinator;

    fn human() -> Actor {
        Actor::human("dana")
    }

    fn add_task(coordinator: &Coordinator<'_>, title: &str, priority: Priority) -> Task {
        coordinator
            .create(
                NewTask::new(title, "dana", OwnerType::Human).with_priority(priority),
                &human(),
            )
            .expect("create task")
    }

    #[test]
    fn done_tasks_hidden_by_default() {
        let conn = open_store_in_memory().expect("store");
        let coordinator = Coordinator::new(&conn);
        let open = add_task(&coordinator, "open", Priority::Low);
        let closed = add_task(&coordinator, "closed", Priority::Urgent);
        coordinator
            .apply::<Task>(&closed.id, &TaskPatch::status(TaskStatus::Done), &human())
            .expect("complete");

        let visible = list_tasks(&conn, &TaskFilter::default()).expect("list");
        assert_eq!(visible.iter().map(|t| &t.id).collect::<Vec<_>>(), vec![&open.id]);

        let all = list_tasks(
            &conn,
            &TaskFilter {
                include_done: true,
                ..TaskFilter::default()
            },
        )
        .expect("list all");
        assert_eq!(all.len(), 2);

        let only_done = list_tasks(
            &conn,
            &TaskFilter {
                status: Some(TaskStatus::Done),
                ..TaskFilter::default()
            },
        )
        .expect("list done");
        assert_eq!(only_done.len(), 1);
        assert_eq!(only_done[0].id, closed.id);
    }

    #[test]
    fn tag_filter_matches_set_members() {
        let conn = open_store_in_memory().expect("store");
        let coordinator = Coordinator::new(&conn);
        let mut draft = NewTask::new("tagged", "dana", OwnerType::Human);
        draft.tags = vec!["infra".to_string(), "api".to_string()];
        let tagged: Task = coordinator.create(draft, &human()).expect("create");
        add_task(&coordinator, "plain", Priority::Medium);

        let hits = list_tasks(
            &conn,
            &TaskFilter {
                tag: Some("api".to_string()),
                ..TaskFilter::default()
            },
        )
        .expect("list");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, tagged.id);
    }

    #[test]
    fn project_filter_and_lookup() {
        let conn = open_store_in_memory().expect("store");
        let coordinator = Coordinator::new(&conn);
        let mut draft = NewProject::new("Atlas");
        draft.external_source = Some("knowledge".to_string());
        draft.external_id = Some("Atlas".to_string());
        let atlas: Project = coordinator.create(draft, &human()).expect("create");
        let _local: Project = coordinator
            .create(NewProject::new("Local"), &human())
            .expect("create");

        let imported = list_projects(
            &conn,
            &ProjectFilter {
                external_source: Some("knowledge".to_string()),
                ..ProjectFilter::default()
            },
        )
        .expect("list");
        assert_eq!(imported.len(), 1);

        let found = find_project_by_external_identity(
            &conn,
            &ExternalIdentity::new("knowledge", "Atlas"),
        )
        .expect("lookup")
        .expect("present");
        assert_eq!(found.id, atlas.id);
        assert!(get_project(&conn, "nope").expect("get").is_none());
    }

    #[test]
    fn reading_lists_report_counts() {
        let conn = open_store_in_memory().expect("store");
        let coordinator = Coordinator::new(&conn);
        let list = coordinator
            .create_reading_list(NewReadingList::new("Queue"))
            .expect("list");
        coordinator
            .create_reading_list(NewReadingList::new("Empty"))
            .expect("list");
        for url in ["https://a.example", "https://b.example"] {
            let _: Article = coordinator
                .create(NewArticle::new(&list.id, url), &human())
                .expect("article");
        }

        let summaries = list_reading_lists(&conn).expect("summaries");
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].list.name, "Empty");
        assert_eq!(summaries[0].article_count, 0);
        assert_eq!(summaries[1].article_count, 2);
        assert_eq!(summaries[1].unread_count, 2);
    }

    #[test]
    fn activity_defaults_to_fifty_newest_first() {
        let conn = open_store_in_memory().expect("store");
        let coordinator = Coordinator::new(&conn);
        let task = add_task(&coordinator, "busy", Priority::Medium);
        for position in 1..=60 {
            coordinator
                .apply::<Task>(
                    &task.id,
                    &TaskPatch {
                        position: Some(position),
                        ..TaskPatch::default()
                    },
                    &human(),
                )
                .expect("update");
        }

        let entries = list_activity(&conn, &ActivityFilter::default()).expect("activity");
        assert_eq!(entries.len(), DEFAULT_ACTIVITY_LIMIT as usize);
        let newest = entries[0].changes.as_ref().and_then(|c| c.after.as_ref()).expect("after");
        assert_eq!(newest["position"], 60);

        let by_agent = list_activity(
            &conn,
            &ActivityFilter {
                actor_type: Some(OwnerType::Agent),
                ..ActivityFilter::default()
            },
        )
        .expect("activity");
        assert!(by_agent.is_empty());
    }
}
