//! Collaborator seams consumed by the sync core.
//!
//! The core hands documents to a [`NodeStore`] and type definitions to a
//! [`SchemaRegistry`] without ever inspecting their representation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use contentmirror_shared::{Document, Result, TypeSchema};

/// Local materialization target for fetched documents.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Insert or replace a document by its stable ID.
    async fn upsert(&self, document: &Document) -> Result<()>;

    /// Remove a document. Deleting an unknown ID is a no-op.
    async fn delete(&self, document_id: &str) -> Result<()>;
}

/// Registration target for base and custom type definitions. Must be
/// idempotent; bootstrap may call it once per attempt.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    async fn register_base_types(&self) -> Result<()>;

    async fn register_custom_types(&self, schemas: &[TypeSchema]) -> Result<()>;
}

/// Presence check for the preview session cookie. The cookie value is
/// never parsed.
pub trait PreviewCookieSource: Send + Sync {
    fn has_preview_cookie(&self) -> bool;
}

/// Cookie source with a fixed answer, for headless/test usage.
pub struct StaticCookieSource {
    present: bool,
}

impl StaticCookieSource {
    pub fn new(present: bool) -> Self {
        Self { present }
    }
}

impl PreviewCookieSource for StaticCookieSource {
    fn has_preview_cookie(&self) -> bool {
        self.present
    }
}

/// In-memory node store for headless/test usage.
#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    documents: Mutex<HashMap<String, Document>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.documents
            .lock()
            .expect("store lock poisoned")
            .contains_key(document_id)
    }

    pub fn get(&self, document_id: &str) -> Option<Document> {
        self.documents
            .lock()
            .expect("store lock poisoned")
            .get(document_id)
            .cloned()
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn upsert(&self, document: &Document) -> Result<()> {
        self.documents
            .lock()
            .expect("store lock poisoned")
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn delete(&self, document_id: &str) -> Result<()> {
        self.documents
            .lock()
            .expect("store lock poisoned")
            .remove(document_id);
        Ok(())
    }
}
