//! Webhook reconciliation: change notification → upsert/delete plan.
//!
//! The plan is always derived fresh from the remote repository's current
//! state, never from notification history, so re-running a notification
//! (at-least-once delivery) converges to the same plan.

use std::collections::HashSet;

use tracing::{info, instrument};

use contentmirror_client::{Client, FetchOptions, fetch_by_ids, resolve_ref};
use contentmirror_shared::{Document, Ref, ReleaseId, Result, WebhookNotification};

use crate::store::NodeStore;

/// Concrete actions derived from one notification.
#[derive(Debug)]
pub struct ReconcilePlan {
    /// Documents that exist at the current ref; re-materialize them.
    pub to_upsert: Vec<Document>,
    /// Notified IDs that no longer fetch; remove them.
    pub to_delete: Vec<String>,
}

/// Counts from applying a plan against a node store.
#[derive(Debug)]
pub struct ReconcileStats {
    pub upserted: usize,
    pub deleted: usize,
}

/// Full candidate ID set for a notification: the notified document IDs
/// plus the documents of every release payload matching the active
/// release. Without an active release, payloads contribute nothing.
/// The result may contain duplicates; the subsequent fetch is by ID set,
/// so duplicates are harmless.
pub fn candidate_ids(
    notification: &WebhookNotification,
    active_release: Option<&ReleaseId>,
) -> Vec<String> {
    let mut ids = notification.document_ids.clone();

    if let Some(release) = active_release {
        for payload in notification.releases.iter() {
            if payload.id == *release {
                ids.extend(payload.documents.iter().cloned());
            }
        }
    }

    ids
}

/// Compute the upsert/delete plan for one notification.
///
/// Deletion is inferred empirically: a notified ID that no longer
/// fetches at the current ref was deleted or unpublished. The
/// notification's own update/addition/deletion bucket labels are
/// advisory only — an ID staged for deletion that still fetches is an
/// upsert. Any fetch failure aborts the whole computation; callers must
/// never apply a partial plan.
#[instrument(skip_all, fields(notified = notification.document_ids.len()))]
pub async fn reconcile(
    client: &Client,
    notification: &WebhookNotification,
    ref_override: Option<Ref>,
    options: &FetchOptions,
) -> Result<ReconcilePlan> {
    let candidates = candidate_ids(notification, client.release_id());

    let target_ref = resolve_ref(client, ref_override).await?;
    let fetched = fetch_by_ids(client, &candidates, &target_ref, options).await?;

    let fetched_ids: HashSet<&str> = fetched.iter().map(|d| d.id.as_str()).collect();

    // Set-difference over the notified IDs only: release-payload IDs
    // missing at this ref were never published, not deleted.
    let mut seen = HashSet::new();
    let to_delete: Vec<String> = notification
        .document_ids
        .iter()
        .filter(|id| !fetched_ids.contains(id.as_str()) && seen.insert(id.as_str()))
        .cloned()
        .collect();

    info!(
        to_upsert = fetched.len(),
        to_delete = to_delete.len(),
        %target_ref,
        "reconciliation plan computed"
    );

    Ok(ReconcilePlan {
        to_upsert: fetched,
        to_delete,
    })
}

/// Apply a plan against the node store: deletions first, then upserts.
pub async fn apply(plan: &ReconcilePlan, store: &dyn NodeStore) -> Result<ReconcileStats> {
    for document_id in &plan.to_delete {
        store.delete(document_id).await?;
    }
    for document in &plan.to_upsert {
        store.upsert(document).await?;
    }

    Ok(ReconcileStats {
        upserted: plan.to_upsert.len(),
        deleted: plan.to_delete.len(),
    })
}

#[cfg(test)]
mod tests {
    use contentmirror_shared::{ContentMirrorError, ReleasePayload};

    use crate::store::MemoryNodeStore;
    use crate::test_support::{
        client_for, doc_json, mount_descriptor, mount_search_page, search_page_json,
    };

    use super::*;

    fn notification(document_ids: &[&str]) -> WebhookNotification {
        WebhookNotification {
            document_ids: document_ids.iter().map(|s| s.to_string()).collect(),
            releases: Default::default(),
        }
    }

    fn payload(release: &str, documents: &[&str]) -> ReleasePayload {
        ReleasePayload {
            id: ReleaseId::new(release),
            documents: documents.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn candidates_without_release_filter() {
        let mut n = notification(&["a", "b"]);
        n.releases.update.push(payload("R1", &["c"]));

        // No active release: payloads contribute nothing.
        assert_eq!(candidate_ids(&n, None), vec!["a", "b"]);
    }

    #[test]
    fn candidates_include_matching_release_across_buckets() {
        let mut n = notification(&["a"]);
        n.releases.update.push(payload("R1", &["c"]));
        n.releases.addition.push(payload("R1", &["d"]));
        n.releases.deletion.push(payload("R1", &["e"]));
        n.releases.update.push(payload("R2", &["x"]));

        let release = ReleaseId::new("R1");
        assert_eq!(
            candidate_ids(&n, Some(&release)),
            vec!["a", "c", "d", "e"]
        );
    }

    #[test]
    fn candidates_exclude_mismatched_release() {
        let mut n = notification(&["a"]);
        n.releases.update.push(payload("R1", &["c"]));

        let release = ReleaseId::new("R2");
        assert_eq!(candidate_ids(&n, Some(&release)), vec!["a"]);
    }

    #[test]
    fn candidate_duplicates_are_preserved() {
        let mut n = notification(&["a"]);
        n.releases.update.push(payload("R1", &["a"]));

        let release = ReleaseId::new("R1");
        // Duplicates are harmless: the fetch is by ID set.
        assert_eq!(candidate_ids(&n, Some(&release)), vec!["a", "a"]);
    }

    #[tokio::test]
    async fn missing_notified_id_becomes_deletion() {
        let server = wiremock::MockServer::start().await;
        mount_descriptor(&server).await;
        // Only "a" still exists at the current ref.
        mount_search_page(&server, 1, 1, vec![doc_json("a")]).await;

        let client = client_for(&server.uri(), None);
        let plan = reconcile(
            &client,
            &notification(&["a", "b"]),
            None,
            &FetchOptions::default(),
        )
        .await
        .expect("reconcile");

        assert_eq!(plan.to_upsert.len(), 1);
        assert_eq!(plan.to_upsert[0].id, "a");
        assert_eq!(plan.to_delete, vec!["b"]);
    }

    #[tokio::test]
    async fn upsert_and_delete_are_disjoint_and_cover_notified_ids() {
        let server = wiremock::MockServer::start().await;
        mount_descriptor(&server).await;
        mount_search_page(&server, 1, 2, vec![doc_json("a"), doc_json("c")]).await;

        let client = client_for(&server.uri(), None);
        let n = notification(&["a", "b", "c", "b"]);
        let plan = reconcile(&client, &n, None, &FetchOptions::default())
            .await
            .expect("reconcile");

        let upserted: std::collections::HashSet<&str> =
            plan.to_upsert.iter().map(|d| d.id.as_str()).collect();
        for id in &plan.to_delete {
            assert!(!upserted.contains(id.as_str()));
        }
        for id in &n.document_ids {
            assert!(
                upserted.contains(id.as_str())
                    || plan.to_delete.iter().any(|d| d == id)
            );
        }
        // Duplicate notified IDs collapse into one deletion.
        assert_eq!(plan.to_delete, vec!["b"]);
    }

    #[tokio::test]
    async fn staged_deletion_that_still_fetches_is_an_upsert() {
        let server = wiremock::MockServer::start().await;
        mount_descriptor(&server).await;
        mount_search_page(&server, 1, 1, vec![doc_json("c")]).await;

        // Client targets release R1; "c" arrives in the deletion bucket
        // but still fetches, so the bucket label is ignored.
        let client = client_for(&server.uri(), Some("R1"));
        let mut n = notification(&[]);
        n.releases.deletion.push(payload("R1", &["c"]));

        let plan = reconcile(&client, &n, None, &FetchOptions::default())
            .await
            .expect("reconcile");

        assert_eq!(plan.to_upsert.len(), 1);
        assert_eq!(plan.to_upsert[0].id, "c");
        assert!(plan.to_delete.is_empty());
    }

    #[tokio::test]
    async fn rerunning_a_notification_is_idempotent() {
        let server = wiremock::MockServer::start().await;
        mount_descriptor(&server).await;
        mount_search_page(&server, 1, 1, vec![doc_json("a")]).await;

        let client = client_for(&server.uri(), None);
        let n = notification(&["a", "b"]);

        let first = reconcile(&client, &n, None, &FetchOptions::default())
            .await
            .expect("reconcile");
        let second = reconcile(&client, &n, None, &FetchOptions::default())
            .await
            .expect("reconcile");

        let ids = |plan: &ReconcilePlan| {
            plan.to_upsert
                .iter()
                .map(|d| d.id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.to_delete, second.to_delete);
    }

    #[tokio::test]
    async fn fetch_failure_aborts_reconciliation() {
        let server = wiremock::MockServer::start().await;
        mount_descriptor(&server).await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/api/v2/documents/search"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server.uri(), None);
        let err = reconcile(
            &client,
            &notification(&["a"]),
            None,
            &FetchOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ContentMirrorError::Transport(_)));
    }

    #[tokio::test]
    async fn empty_notification_reconciles_to_empty_plan() {
        let server = wiremock::MockServer::start().await;
        // Only the descriptor is mocked: an empty candidate set must not
        // hit the search endpoint.
        mount_descriptor(&server).await;

        let client = client_for(&server.uri(), None);
        let plan = reconcile(
            &client,
            &WebhookNotification::default(),
            None,
            &FetchOptions::default(),
        )
        .await
        .expect("reconcile");

        assert!(plan.to_upsert.is_empty());
        assert!(plan.to_delete.is_empty());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn apply_deletes_then_upserts() {
        let store = MemoryNodeStore::new();
        let stale: Document = serde_json::from_value(doc_json("b")).unwrap();
        store.upsert(&stale).await.unwrap();

        let plan = ReconcilePlan {
            to_upsert: vec![serde_json::from_value(doc_json("a")).unwrap()],
            to_delete: vec!["b".into()],
        };

        let stats = apply(&plan, &store).await.expect("apply");
        assert_eq!(stats.upserted, 1);
        assert_eq!(stats.deleted, 1);
        assert!(store.contains("a"));
        assert!(!store.contains("b"));
    }

    #[test]
    fn search_page_helper_shape() {
        // Guard against the fixture helper drifting from the wire shape.
        let value = search_page_json(1, 2, vec![doc_json("a"), doc_json("b")]);
        assert_eq!(value["total_results_size"], 2);
        assert_eq!(value["results"].as_array().unwrap().len(), 2);
    }
}
