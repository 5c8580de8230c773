//! Canonical SQLite schema for the trellis entity store.
//!
//! - one table per entity kind, enum columns guarded by `CHECK`
//! - `projects` carries the external identity pair, unique when set
//! - `tasks.project_id` is a weak reference without a foreign key
//! - `activity_log` is append-only, enforced by triggers in v2
//! - `store_meta` records the applied schema version

/// Migration v1: entity tables, activity log, store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS projects (
    project_id TEXT PRIMARY KEY,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    description TEXT,
    status TEXT NOT NULL DEFAULT 'idea'
        CHECK (status IN ('idea', 'active', 'paused', 'shipped')),
    color TEXT NOT NULL DEFAULT '#6B7280' CHECK (color LIKE '#______'),
    external_source TEXT,
    external_id TEXT,
    metadata_json TEXT,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    CHECK ((external_source IS NULL) = (external_id IS NULL))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_external_identity
    ON projects(external_source, external_id)
    WHERE external_source IS NOT NULL AND external_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS tasks (
    task_id TEXT PRIMARY KEY,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    description TEXT,
    project_id TEXT,
    status TEXT NOT NULL DEFAULT 'todo'
        CHECK (status IN ('backlog', 'todo', 'in_progress', 'blocked', 'review', 'done')),
    priority TEXT NOT NULL DEFAULT 'medium'
        CHECK (priority IN ('low', 'medium', 'high', 'urgent')),
    owner TEXT NOT NULL CHECK (length(trim(owner)) > 0),
    owner_type TEXT NOT NULL CHECK (owner_type IN ('human', 'agent')),
    agent_metadata_json TEXT,
    tags_json TEXT NOT NULL DEFAULT '[]',
    due_at_us INTEGER,
    position INTEGER NOT NULL DEFAULT 0 CHECK (position >= 0),
    completed_at_us INTEGER,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS ideas (
    idea_id TEXT PRIMARY KEY,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    description TEXT,
    category TEXT
        CHECK (category IS NULL OR category IN ('product', 'tool', 'business', 'research')),
    status TEXT NOT NULL DEFAULT 'brainstorm'
        CHECK (status IN ('brainstorm', 'research', 'in_progress', 'shipped')),
    owner TEXT NOT NULL CHECK (length(trim(owner)) > 0),
    owner_type TEXT NOT NULL CHECK (owner_type IN ('human', 'agent')),
    metadata_json TEXT,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS reading_lists (
    reading_list_id TEXT PRIMARY KEY,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    description TEXT,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS articles (
    article_id TEXT PRIMARY KEY,
    reading_list_id TEXT NOT NULL
        REFERENCES reading_lists(reading_list_id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    title TEXT,
    author TEXT,
    status TEXT NOT NULL DEFAULT 'unread'
        CHECK (status IN ('unread', 'reading', 'read', 'archived')),
    notes TEXT,
    added_at_us INTEGER NOT NULL,
    read_at_us INTEGER
);

CREATE TABLE IF NOT EXISTS activity_log (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id TEXT NOT NULL UNIQUE,
    entity_type TEXT NOT NULL
        CHECK (entity_type IN ('task', 'project', 'idea', 'article')),
    entity_id TEXT NOT NULL,
    action TEXT NOT NULL
        CHECK (action IN ('created', 'updated', 'completed', 'moved', 'deleted')),
    actor TEXT NOT NULL,
    actor_type TEXT NOT NULL CHECK (actor_type IN ('human', 'agent')),
    changes_json TEXT,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version, created_at_us)
VALUES (1, 1, CAST((julianday('now') - 2440587.5) * 86400000000 AS INTEGER));
";

/// Migration v2: read-path indexes and audit immutability triggers.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_tasks_status_priority_position
    ON tasks(status, priority, position);

CREATE INDEX IF NOT EXISTS idx_tasks_project
    ON tasks(project_id);

CREATE INDEX IF NOT EXISTS idx_tasks_completed
    ON tasks(completed_at_us)
    WHERE completed_at_us IS NOT NULL;

CREATE INDEX IF NOT EXISTS idx_ideas_status
    ON ideas(status, created_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_articles_list_status
    ON articles(reading_list_id, status);

CREATE INDEX IF NOT EXISTS idx_activity_entity
    ON activity_log(entity_type, entity_id, seq DESC);

CREATE INDEX IF NOT EXISTS idx_activity_actor_type
    ON activity_log(actor_type, seq DESC);

CREATE TRIGGER IF NOT EXISTS activity_log_no_update
BEFORE UPDATE ON activity_log
BEGIN
    SELECT RAISE(ABORT, 'activity_log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS activity_log_no_delete
BEFORE DELETE ON activity_log
BEGIN
    SELECT RAISE(ABORT, 'activity_log is append-only');
END;
";

/// Indexes that must exist after all migrations.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_projects_external_identity",
    "idx_tasks_status_priority_position",
    "idx_tasks_project",
    "idx_tasks_completed",
    "idx_ideas_status",
    "idx_articles_list_status",
    "idx_activity_entity",
    "idx_activity_actor_type",
];
