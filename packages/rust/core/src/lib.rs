//! Sync core for contentmirror.
//!
//! Home of the two orchestrations built on top of the client crate:
//! - [`bootstrap`] — the one-shot, guarded preview bootstrap pipeline
//! - [`reconcile`] — webhook notification → upsert/delete plan
//!
//! plus the session-scoped state records ([`registry`]) and the
//! collaborator seams the core produces to ([`store`]).

pub mod bootstrap;
pub mod reconcile;
pub mod registry;
pub mod source;
pub mod store;

// Re-export public API at crate root for ergonomic imports.
pub use bootstrap::{BootstrapDeps, BootstrapOutcome, SkipReason, bootstrap};
pub use reconcile::{ReconcilePlan, ReconcileStats, apply, candidate_ids, reconcile};
pub use registry::{BootstrapRegistry, BootstrapState, PreviewSession};
pub use source::{
    ProgressReporter, SilentProgress, SourcingDeps, SyncSummary, register_schemas,
    source_documents, sync_repository,
};
pub use store::{
    MemoryNodeStore, NodeStore, PreviewCookieSource, SchemaRegistry, StaticCookieSource,
};
