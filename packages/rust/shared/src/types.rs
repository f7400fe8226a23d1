//! Core domain types for the contentmirror sync engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Ref / ReleaseId / Query newtypes
// ---------------------------------------------------------------------------

/// An opaque pointer to an immutable snapshot of the remote repository
/// (published master or a staged release). Exactly one ref is active for
/// a given fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ref(String);

impl Ref {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a staged release. When configured, it scopes which
/// release deltas in a webhook notification are relevant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseId(String);

impl ReleaseId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A server-evaluated predicate expression selecting a subset of
/// documents. Opaque to this crate; evaluated remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(String);

impl Query {
    pub fn new(expr: impl Into<String>) -> Self {
        Self(expr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A single remote document. Immutable once fetched; each fetch produces
/// a fresh authoritative copy, so there is no local mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable unique document identifier.
    pub id: String,
    /// Custom type tag.
    #[serde(rename = "type")]
    pub doc_type: String,
    /// Optional human-readable unique identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Document language code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Arbitrary nested fields, including link references to other
    /// documents. Kept opaque.
    #[serde(default)]
    pub data: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Query responses (wire shape)
// ---------------------------------------------------------------------------

/// One page of a paginated query response. Page boundaries are a pure
/// pagination artifact; they never appear in aggregated results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// 1-based page number of this response.
    #[serde(default)]
    pub page: u32,
    /// Page size the server applied.
    #[serde(default)]
    pub results_per_page: usize,
    /// Number of results in this page.
    #[serde(default)]
    pub results_size: usize,
    /// Total matching documents across all pages.
    #[serde(default)]
    pub total_results_size: usize,
    /// Total number of pages.
    #[serde(default)]
    pub total_pages: u32,
    /// Documents in this page, in server order.
    #[serde(default)]
    pub results: Vec<Document>,
}

/// The repository's current ref descriptor, returned by the API root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiInfo {
    /// All currently addressable refs (master plus staged releases).
    #[serde(default)]
    pub refs: Vec<RefInfo>,
}

/// One entry of the ref descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefInfo {
    /// Stable identifier ("master" or a release ID).
    pub id: String,
    /// The ref token to pass to queries.
    #[serde(rename = "ref")]
    pub r#ref: String,
    /// Display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Whether this is the published master ref.
    #[serde(rename = "isMasterRef", default)]
    pub is_master_ref: bool,
}

// ---------------------------------------------------------------------------
// Webhook notification (wire shape, camelCase)
// ---------------------------------------------------------------------------

/// An inbound change notification. Delivery is at-least-once and
/// unordered, so consumers must tolerate replays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookNotification {
    /// IDs of documents affected on the published snapshot.
    #[serde(rename = "documentIds", default)]
    pub document_ids: Vec<String>,
    /// Staged-release deltas, bucketed by the kind of change.
    #[serde(default)]
    pub releases: ReleaseDeltas,
}

/// Release payloads bucketed by change kind. The bucket labels are
/// advisory only; deletion is inferred from fetch-miss, never from the
/// bucket a payload arrived in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseDeltas {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update: Vec<ReleasePayload>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addition: Vec<ReleasePayload>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deletion: Vec<ReleasePayload>,
}

impl ReleaseDeltas {
    /// Iterate every payload across all three buckets.
    pub fn iter(&self) -> impl Iterator<Item = &ReleasePayload> {
        self.update
            .iter()
            .chain(self.addition.iter())
            .chain(self.deletion.iter())
    }
}

/// Documents affected within one staged release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleasePayload {
    /// The release this payload belongs to.
    pub id: ReleaseId,
    /// Affected document IDs.
    #[serde(default)]
    pub documents: Vec<String>,
}

// ---------------------------------------------------------------------------
// TypeSchema
// ---------------------------------------------------------------------------

/// A custom type schema definition handed to the schema-registration
/// collaborator before documents are materialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSchema {
    /// Custom type name (matches `Document::doc_type`).
    pub name: String,
    /// Opaque JSON definition of the type's fields.
    pub definition: serde_json::Value,
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for sync-run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn document_deserializes_wire_shape() {
        let json = r#"{
            "id": "doc-a",
            "type": "page",
            "uid": "about-us",
            "lang": "en-us",
            "tags": ["marketing"],
            "data": { "title": [{ "text": "About" }] }
        }"#;
        let doc: Document = serde_json::from_str(json).expect("deserialize");
        assert_eq!(doc.id, "doc-a");
        assert_eq!(doc.doc_type, "page");
        assert_eq!(doc.uid.as_deref(), Some("about-us"));
        assert_eq!(doc.tags, vec!["marketing"]);
    }

    #[test]
    fn document_minimal_fields_default() {
        let json = r#"{ "id": "doc-b", "type": "article" }"#;
        let doc: Document = serde_json::from_str(json).expect("deserialize");
        assert!(doc.uid.is_none());
        assert!(doc.tags.is_empty());
        assert!(doc.data.is_null());
    }

    #[test]
    fn query_response_defaults() {
        let json = r#"{ "total_results_size": 42, "results": [] }"#;
        let response: QueryResponse = serde_json::from_str(json).expect("deserialize");
        assert_eq!(response.total_results_size, 42);
        assert_eq!(response.page, 0);
        assert!(response.results.is_empty());
    }

    #[test]
    fn ref_descriptor_parses_master_flag() {
        let json = r#"{
            "refs": [
                { "id": "master", "ref": "tok-master", "label": "Master", "isMasterRef": true },
                { "id": "R1", "ref": "tok-r1", "label": "Spring launch" }
            ]
        }"#;
        let info: ApiInfo = serde_json::from_str(json).expect("deserialize");
        assert_eq!(info.refs.len(), 2);
        assert!(info.refs[0].is_master_ref);
        assert!(!info.refs[1].is_master_ref);
        assert_eq!(info.refs[1].r#ref, "tok-r1");
    }

    #[test]
    fn webhook_notification_parses_camel_case() {
        let json = r#"{
            "documentIds": ["a", "b"],
            "releases": {
                "update": [{ "id": "R1", "documents": ["c"] }],
                "deletion": [{ "id": "R2", "documents": ["d"] }]
            }
        }"#;
        let notification: WebhookNotification =
            serde_json::from_str(json).expect("deserialize");
        assert_eq!(notification.document_ids, vec!["a", "b"]);
        assert_eq!(notification.releases.update.len(), 1);
        assert!(notification.releases.addition.is_empty());
        assert_eq!(notification.releases.iter().count(), 2);
    }

    #[test]
    fn webhook_notification_all_fields_optional() {
        let notification: WebhookNotification =
            serde_json::from_str("{}").expect("deserialize");
        assert!(notification.document_ids.is_empty());
        assert_eq!(notification.releases.iter().count(), 0);
    }

    #[test]
    fn webhook_fixture_validates() {
        let fixture =
            std::fs::read_to_string("../../../fixtures/json/webhook.fixture.json")
                .expect("read fixture");
        let notification: WebhookNotification =
            serde_json::from_str(&fixture).expect("deserialize fixture webhook");
        assert_eq!(notification.document_ids.len(), 3);
        assert_eq!(notification.releases.update.len(), 1);
        assert_eq!(notification.releases.deletion.len(), 1);
    }
}
