//! Shared sourcing path: schema registration plus fetch-and-materialize.
//!
//! Used by the bootstrap pipeline (steps 3–4) and by the non-preview
//! `sync` entry point, which runs the same sequence without guards.

use tracing::{info, instrument};

use contentmirror_client::{Client, FetchOptions, fetch_all, resolve_ref};
use contentmirror_shared::{Query, Ref, Result, TypeSchema};

use crate::store::{NodeStore, SchemaRegistry};

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting sourcing status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each document is handed to the node store.
    fn document_materialized(&self, id: &str, current: usize, total: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document_materialized(&self, _id: &str, _current: usize, _total: usize) {}
}

// ---------------------------------------------------------------------------
// Sourcing dependencies
// ---------------------------------------------------------------------------

/// Everything one sourcing pass needs, borrowed from the caller.
pub struct SourcingDeps<'a> {
    /// Repository name, for state keying and logs.
    pub repository: &'a str,
    /// Client bound to the repository's API.
    pub client: &'a Client,
    /// Materialization target.
    pub store: &'a dyn NodeStore,
    /// Type definition target.
    pub schemas: &'a dyn SchemaRegistry,
    /// Predicates selecting the documents to mirror.
    pub predicates: &'a [Query],
    /// Custom type definitions to register before materializing.
    pub type_schemas: &'a [TypeSchema],
    /// Fetch options applied to every query.
    pub options: &'a FetchOptions,
    /// Progress sink.
    pub progress: &'a dyn ProgressReporter,
}

/// Result of a full (non-preview) sync pass.
#[derive(Debug)]
pub struct SyncSummary {
    /// Documents materialized.
    pub documents: usize,
    /// Snapshot the pass was consistent with.
    pub target_ref: Ref,
}

// ---------------------------------------------------------------------------
// Sourcing operations
// ---------------------------------------------------------------------------

/// Register base types, then the repository's custom type schemas.
pub async fn register_schemas(deps: &SourcingDeps<'_>) -> Result<()> {
    deps.progress.phase("Registering type schemas");
    deps.schemas.register_base_types().await?;
    deps.schemas.register_custom_types(deps.type_schemas).await?;
    info!(
        custom_types = deps.type_schemas.len(),
        "type schemas registered"
    );
    Ok(())
}

/// Fetch the full predicate set at `target_ref` and hand every document
/// to the node store. Returns the number of documents materialized.
pub async fn source_documents(deps: &SourcingDeps<'_>, target_ref: &Ref) -> Result<usize> {
    deps.progress.phase("Fetching documents");
    let documents = fetch_all(deps.client, deps.predicates, target_ref, deps.options).await?;

    deps.progress.phase("Materializing documents");
    let total = documents.len();
    for (i, document) in documents.iter().enumerate() {
        deps.store.upsert(document).await?;
        deps.progress.document_materialized(&document.id, i + 1, total);
    }

    info!(documents = total, %target_ref, "documents materialized");
    Ok(total)
}

/// Full sync against the resolved (non-preview) ref: schema
/// registration followed by fetch-and-materialize, without the
/// bootstrap guards.
#[instrument(skip_all, fields(repository = %deps.repository))]
pub async fn sync_repository(
    deps: &SourcingDeps<'_>,
    ref_override: Option<Ref>,
) -> Result<SyncSummary> {
    let target_ref = resolve_ref(deps.client, ref_override).await?;
    register_schemas(deps).await?;
    let documents = source_documents(deps, &target_ref).await?;
    Ok(SyncSummary {
        documents,
        target_ref,
    })
}

#[cfg(test)]
mod tests {
    use contentmirror_shared::ContentMirrorError;

    use crate::store::MemoryNodeStore;
    use crate::test_support::{
        RecordingSchemaRegistry, client_for, mount_descriptor, mount_search_page, page_docs,
    };

    use super::*;

    #[tokio::test]
    async fn sync_registers_schemas_and_materializes() {
        let server = wiremock::MockServer::start().await;
        mount_descriptor(&server).await;
        mount_search_page(&server, 1, 3, page_docs(0..3)).await;

        let client = client_for(&server.uri(), None);
        let store = MemoryNodeStore::new();
        let schemas = RecordingSchemaRegistry::default();
        let predicates = vec![Query::new("[any]")];
        let type_schemas = vec![TypeSchema {
            name: "page".into(),
            definition: serde_json::json!({ "title": { "type": "Text" } }),
        }];
        let options = FetchOptions::default();

        let deps = SourcingDeps {
            repository: "test-repo",
            client: &client,
            store: &store,
            schemas: &schemas,
            predicates: &predicates,
            type_schemas: &type_schemas,
            options: &options,
            progress: &SilentProgress,
        };

        let summary = sync_repository(&deps, None).await.expect("sync");

        assert_eq!(summary.documents, 3);
        assert_eq!(summary.target_ref.as_str(), "tok-master");
        assert_eq!(store.len(), 3);
        assert_eq!(schemas.base_registrations(), 1);
        assert_eq!(schemas.custom_registrations(), 1);
    }

    #[tokio::test]
    async fn sync_honors_ref_override() {
        let server = wiremock::MockServer::start().await;
        // No descriptor mounted: the override must skip ref resolution.
        mount_search_page(&server, 1, 1, page_docs(0..1)).await;

        let client = client_for(&server.uri(), None);
        let store = MemoryNodeStore::new();
        let schemas = RecordingSchemaRegistry::default();
        let predicates = vec![Query::new("[any]")];
        let options = FetchOptions::default();

        let deps = SourcingDeps {
            repository: "test-repo",
            client: &client,
            store: &store,
            schemas: &schemas,
            predicates: &predicates,
            type_schemas: &[],
            options: &options,
            progress: &SilentProgress,
        };

        let summary = sync_repository(&deps, Some(Ref::new("tok-preview")))
            .await
            .expect("sync");

        assert_eq!(summary.target_ref.as_str(), "tok-preview");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn sync_fetch_failure_aborts() {
        let server = wiremock::MockServer::start().await;
        mount_descriptor(&server).await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/api/v2/documents/search"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), None);
        let store = MemoryNodeStore::new();
        let schemas = RecordingSchemaRegistry::default();
        let predicates = vec![Query::new("[any]")];
        let options = FetchOptions::default();

        let deps = SourcingDeps {
            repository: "test-repo",
            client: &client,
            store: &store,
            schemas: &schemas,
            predicates: &predicates,
            type_schemas: &[],
            options: &options,
            progress: &SilentProgress,
        };

        let err = sync_repository(&deps, None).await.unwrap_err();
        assert!(matches!(err, ContentMirrorError::Transport(_)));
        assert!(store.is_empty());
    }
}
