//! Ref selection: which repository snapshot a fetch should target.

use tracing::debug;

use contentmirror_shared::{ContentMirrorError, Ref, Result};

use crate::Client;

/// Resolve the ref a fetch should target.
///
/// An explicit ref is returned unchanged without touching the network.
/// Otherwise the repository's ref descriptor is queried: a configured
/// release ID resolves to that release's ref, else the master ref is
/// used. A configured release that matches no known release is a config
/// error, never a silent fallback to master.
pub async fn resolve_ref(client: &Client, explicit: Option<Ref>) -> Result<Ref> {
    if let Some(explicit) = explicit {
        return Ok(explicit);
    }

    let info = client.api_info().await?;

    match client.release_id() {
        Some(release) => info
            .refs
            .iter()
            .find(|r| r.id == release.as_str())
            .map(|r| Ref::new(r.r#ref.clone()))
            .ok_or_else(|| {
                ContentMirrorError::config(format!(
                    "release '{release}' does not match any known release"
                ))
            }),
        None => {
            let master = info
                .refs
                .iter()
                .find(|r| r.is_master_ref)
                .map(|r| Ref::new(r.r#ref.clone()))
                .ok_or_else(|| {
                    ContentMirrorError::validation("ref descriptor has no master ref")
                })?;
            debug!(%master, "resolved master ref");
            Ok(master)
        }
    }
}
