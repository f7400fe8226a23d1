//! Turso Embedded / libSQL storage layer.
//!
//! The [`Storage`] struct wraps a libSQL database holding the locally
//! materialized document set, the registered type schemas, and the
//! sync-run history. It implements the core's [`NodeStore`] and
//! [`SchemaRegistry`] collaborator seams, so the sync core never sees
//! the representation.

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, Row, params};
use uuid::Uuid;

use contentmirror_core::{NodeStore, SchemaRegistry};
use contentmirror_shared::{ContentMirrorError, Document, Result, TypeSchema};

/// Base type definitions every repository needs before custom types.
/// Registration is idempotent: re-registering replaces by name.
const BASE_TYPE_SCHEMAS: &[(&str, &str)] = &[
    ("structured-text", r#"{"kind":"base","fields":["spans","text"]}"#),
    ("link", r#"{"kind":"base","fields":["link_type","target"]}"#),
    ("embed", r#"{"kind":"base","fields":["url","html"]}"#),
    ("geo-point", r#"{"kind":"base","fields":["latitude","longitude"]}"#),
];

/// A row of the sync-run history.
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub id: String,
    pub repository: String,
    pub kind: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub stats_json: Option<String>,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ContentMirrorError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    ContentMirrorError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Document operations
    // -----------------------------------------------------------------------

    /// Insert or replace a document by its stable ID.
    pub async fn upsert_document(&self, document: &Document) -> Result<()> {
        let tags_json = serde_json::to_string(&document.tags)
            .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;
        let data_json = serde_json::to_string(&document.data)
            .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO documents (id, doc_type, uid, lang, tags_json, data_json, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                   doc_type = excluded.doc_type,
                   uid = excluded.uid,
                   lang = excluded.lang,
                   tags_json = excluded.tags_json,
                   data_json = excluded.data_json,
                   fetched_at = excluded.fetched_at",
                params![
                    document.id.as_str(),
                    document.doc_type.as_str(),
                    document.uid.as_deref(),
                    document.lang.as_deref(),
                    tags_json.as_str(),
                    data_json.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a document by ID.
    pub async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, doc_type, uid, lang, tags_json, data_json
                 FROM documents WHERE id = ?1",
                params![document_id],
            )
            .await
            .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_document(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(ContentMirrorError::Storage(e.to_string())),
        }
    }

    /// List all materialized document IDs.
    pub async fn list_document_ids(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query("SELECT id FROM documents ORDER BY id", params![])
            .await
            .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;

        let mut ids = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            ids.push(
                row.get::<String>(0)
                    .map_err(|e| ContentMirrorError::Storage(e.to_string()))?,
            );
        }
        Ok(ids)
    }

    /// Count materialized documents.
    pub async fn count_documents(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM documents").await
    }

    /// Delete a document by ID. Unknown IDs are a no-op.
    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM documents WHERE id = ?1", params![document_id])
            .await
            .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Type schema operations
    // -----------------------------------------------------------------------

    /// Insert or replace a type schema definition.
    pub async fn upsert_type_schema(
        &self,
        name: &str,
        kind: &str,
        definition_json: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO type_schemas (name, kind, definition_json, registered_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                   kind = excluded.kind,
                   definition_json = excluded.definition_json,
                   registered_at = excluded.registered_at",
                params![name, kind, definition_json, now.as_str()],
            )
            .await
            .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Count registered type schemas.
    pub async fn count_type_schemas(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM type_schemas").await
    }

    // -----------------------------------------------------------------------
    // Sync run operations
    // -----------------------------------------------------------------------

    /// Insert a new sync run. Returns the generated run ID.
    pub async fn insert_sync_run(&self, repository: &str, kind: &str) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO sync_runs (id, repository, kind, started_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), repository, kind, now.as_str()],
            )
            .await
            .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Update a sync run with completion data.
    pub async fn update_sync_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE sync_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List sync runs for a repository, most recent first.
    pub async fn list_sync_runs(&self, repository: &str, limit: u32) -> Result<Vec<SyncRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, repository, kind, started_at, finished_at, stats_json
                 FROM sync_runs WHERE repository = ?1
                 ORDER BY started_at DESC LIMIT ?2",
                params![repository, i64::from(limit)],
            )
            .await
            .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;

        let mut runs = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            runs.push(SyncRun {
                id: row
                    .get::<String>(0)
                    .map_err(|e| ContentMirrorError::Storage(e.to_string()))?,
                repository: row
                    .get::<String>(1)
                    .map_err(|e| ContentMirrorError::Storage(e.to_string()))?,
                kind: row
                    .get::<String>(2)
                    .map_err(|e| ContentMirrorError::Storage(e.to_string()))?,
                started_at: row
                    .get::<String>(3)
                    .map_err(|e| ContentMirrorError::Storage(e.to_string()))?,
                finished_at: row.get(4).ok(),
                stats_json: row.get(5).ok(),
            });
        }
        Ok(runs)
    }

    async fn count(&self, sql: &str) -> Result<usize> {
        let mut rows = self
            .conn
            .query(sql, params![])
            .await
            .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count = row
                    .get::<i64>(0)
                    .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;
                Ok(count as usize)
            }
            _ => Ok(0),
        }
    }
}

/// Decode one `documents` row.
fn row_to_document(row: &Row) -> Result<Document> {
    let tags_json: String = row
        .get(4)
        .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;
    let data_json: String = row
        .get(5)
        .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;

    Ok(Document {
        id: row
            .get::<String>(0)
            .map_err(|e| ContentMirrorError::Storage(e.to_string()))?,
        doc_type: row
            .get::<String>(1)
            .map_err(|e| ContentMirrorError::Storage(e.to_string()))?,
        uid: row.get(2).ok(),
        lang: row.get(3).ok(),
        tags: serde_json::from_str(&tags_json)
            .map_err(|e| ContentMirrorError::Storage(format!("bad tags_json: {e}")))?,
        data: serde_json::from_str(&data_json)
            .map_err(|e| ContentMirrorError::Storage(format!("bad data_json: {e}")))?,
    })
}

// ---------------------------------------------------------------------------
// Collaborator trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl NodeStore for Storage {
    async fn upsert(&self, document: &Document) -> Result<()> {
        self.upsert_document(document).await
    }

    async fn delete(&self, document_id: &str) -> Result<()> {
        self.delete_document(document_id).await
    }
}

#[async_trait]
impl SchemaRegistry for Storage {
    async fn register_base_types(&self) -> Result<()> {
        for (name, definition_json) in BASE_TYPE_SCHEMAS {
            self.upsert_type_schema(name, "base", definition_json).await?;
        }
        Ok(())
    }

    async fn register_custom_types(&self, schemas: &[TypeSchema]) -> Result<()> {
        for schema in schemas {
            let definition_json = serde_json::to_string(&schema.definition)
                .map_err(|e| ContentMirrorError::Storage(e.to_string()))?;
            self.upsert_type_schema(&schema.name, "custom", &definition_json)
                .await?;
        }
        Ok(())
    }
}
