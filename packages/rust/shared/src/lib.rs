//! Shared types, error model, and configuration for contentmirror.
//!
//! This crate is the foundation depended on by all other contentmirror crates.
//! It provides:
//! - [`ContentMirrorError`] — the unified error type
//! - Domain types ([`Document`], [`Ref`], [`WebhookNotification`], [`RunId`])
//! - Configuration ([`AppConfig`], [`RepositoryConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, RepositoryConfig, config_dir, config_file_path, expand_home,
    find_repository, init_config, load_config, load_config_from, preview_cookie_path,
};
pub use error::{ContentMirrorError, Result};
pub use types::{
    ApiInfo, Document, Query, QueryResponse, Ref, RefInfo, ReleaseDeltas, ReleaseId,
    ReleasePayload, RunId, TypeSchema, WebhookNotification,
};
