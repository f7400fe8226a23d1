//! SQL migration definitions for the contentmirror database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: documents, type_schemas, sync_runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Materialized remote documents
CREATE TABLE IF NOT EXISTS documents (
    id         TEXT PRIMARY KEY,
    doc_type   TEXT NOT NULL,
    uid        TEXT,
    lang       TEXT,
    tags_json  TEXT NOT NULL,
    data_json  TEXT NOT NULL,
    fetched_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_doc_type ON documents(doc_type);

-- Registered base and custom type definitions
CREATE TABLE IF NOT EXISTS type_schemas (
    name            TEXT PRIMARY KEY,
    kind            TEXT NOT NULL,
    definition_json TEXT NOT NULL,
    registered_at   TEXT NOT NULL
);

-- Bootstrap/sync/webhook run history
CREATE TABLE IF NOT EXISTS sync_runs (
    id          TEXT PRIMARY KEY,
    repository  TEXT NOT NULL,
    kind        TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_sync_runs_repository ON sync_runs(repository);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
