//! Session-scoped bootstrap and preview-session state.
//!
//! Both records are written exclusively by the bootstrap pipeline. Writes
//! carry the generation of the invocation that issued them, so a
//! superseded run can never overwrite state written by a newer run.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// BootstrapState
// ---------------------------------------------------------------------------

/// Per-repository bootstrap progress for the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapState {
    /// No bootstrap has run (or the last attempt failed).
    #[default]
    NotStarted,
    /// A bootstrap run is in flight.
    Bootstrapping,
    /// A bootstrap run completed; further runs no-op.
    Bootstrapped,
}

#[derive(Debug, Default)]
struct RepositoryEntry {
    state: BootstrapState,
    generation: u64,
}

// ---------------------------------------------------------------------------
// BootstrapRegistry
// ---------------------------------------------------------------------------

/// Registry of bootstrap state, keyed by repository name.
#[derive(Debug, Default)]
pub struct BootstrapRegistry {
    next_generation: AtomicU64,
    entries: Mutex<HashMap<String, RepositoryEntry>>,
}

impl BootstrapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a monotonically increasing generation for one pipeline
    /// invocation.
    pub fn allocate_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Current state for a repository. Unknown repositories are
    /// `NotStarted`.
    pub fn state(&self, repository: &str) -> BootstrapState {
        let entries = self.entries.lock().expect("registry lock poisoned");
        entries.get(repository).map(|e| e.state).unwrap_or_default()
    }

    /// Atomically claim the repository for one bootstrap run
    /// (`NotStarted` → `Bootstrapping`). Returns false if another run
    /// already claimed or completed it.
    pub fn begin(&self, repository: &str, generation: u64) -> bool {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        let entry = entries.entry(repository.to_string()).or_default();
        if entry.state == BootstrapState::NotStarted {
            entry.state = BootstrapState::Bootstrapping;
            entry.generation = generation;
            true
        } else {
            false
        }
    }

    /// `Bootstrapping` → `Bootstrapped`, only for the run that claimed
    /// the repository.
    pub fn complete(&self, repository: &str, generation: u64) -> bool {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        match entries.get_mut(repository) {
            Some(entry)
                if entry.state == BootstrapState::Bootstrapping
                    && entry.generation == generation =>
            {
                entry.state = BootstrapState::Bootstrapped;
                true
            }
            _ => false,
        }
    }

    /// `Bootstrapping` → `NotStarted` after a failed run, making the
    /// repository eligible for retry. Only the claiming run may revert.
    pub fn abandon(&self, repository: &str, generation: u64) -> bool {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        match entries.get_mut(repository) {
            Some(entry)
                if entry.state == BootstrapState::Bootstrapping
                    && entry.generation == generation =>
            {
                entry.state = BootstrapState::NotStarted;
                true
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// PreviewSession
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SessionInner {
    is_loading: bool,
    generation: u64,
}

/// Loading flag owned by the preview entry point. Starts loading and
/// flips exactly once per terminal pipeline outcome; stale writes lose.
#[derive(Debug)]
pub struct PreviewSession {
    inner: Mutex<SessionInner>,
}

impl PreviewSession {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                is_loading: true,
                generation: 0,
            }),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().expect("session lock poisoned").is_loading
    }

    /// Mark the session as done loading. Returns false when a newer
    /// invocation already wrote (last-writer-wins by generation).
    pub fn mark_loaded(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock().expect("session lock poisoned");
        if generation >= inner.generation {
            inner.is_loading = false;
            inner.generation = generation;
            true
        } else {
            false
        }
    }
}

impl Default for PreviewSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_repository_is_not_started() {
        let registry = BootstrapRegistry::new();
        assert_eq!(registry.state("repo"), BootstrapState::NotStarted);
    }

    #[test]
    fn begin_complete_transitions() {
        let registry = BootstrapRegistry::new();
        let generation = registry.allocate_generation();

        assert!(registry.begin("repo", generation));
        assert_eq!(registry.state("repo"), BootstrapState::Bootstrapping);

        assert!(registry.complete("repo", generation));
        assert_eq!(registry.state("repo"), BootstrapState::Bootstrapped);
    }

    #[test]
    fn begin_is_exclusive() {
        let registry = BootstrapRegistry::new();
        let first = registry.allocate_generation();
        let second = registry.allocate_generation();

        assert!(registry.begin("repo", first));
        // In-flight run blocks re-entry.
        assert!(!registry.begin("repo", second));

        assert!(registry.complete("repo", first));
        // Completed run blocks re-entry too.
        assert!(!registry.begin("repo", registry.allocate_generation()));
    }

    #[test]
    fn abandon_reopens_repository() {
        let registry = BootstrapRegistry::new();
        let generation = registry.allocate_generation();

        assert!(registry.begin("repo", generation));
        assert!(registry.abandon("repo", generation));
        assert_eq!(registry.state("repo"), BootstrapState::NotStarted);

        // Retry claims the repository again.
        assert!(registry.begin("repo", registry.allocate_generation()));
    }

    #[test]
    fn stale_generation_cannot_write() {
        let registry = BootstrapRegistry::new();
        let stale = registry.allocate_generation();
        let current = registry.allocate_generation();

        assert!(registry.begin("repo", current));
        assert!(!registry.complete("repo", stale));
        assert!(!registry.abandon("repo", stale));
        assert_eq!(registry.state("repo"), BootstrapState::Bootstrapping);
    }

    #[test]
    fn repositories_are_independent() {
        let registry = BootstrapRegistry::new();
        let generation = registry.allocate_generation();

        assert!(registry.begin("repo-a", generation));
        assert_eq!(registry.state("repo-b"), BootstrapState::NotStarted);
        assert!(registry.begin("repo-b", registry.allocate_generation()));
    }

    #[test]
    fn session_starts_loading() {
        let session = PreviewSession::new();
        assert!(session.is_loading());
    }

    #[test]
    fn session_mark_loaded() {
        let session = PreviewSession::new();
        assert!(session.mark_loaded(1));
        assert!(!session.is_loading());
    }

    #[test]
    fn session_stale_write_loses() {
        let session = PreviewSession::new();
        assert!(session.mark_loaded(5));
        // An older invocation arriving late is dropped.
        assert!(!session.mark_loaded(3));
        // Equal or newer generations may write again.
        assert!(session.mark_loaded(5));
        assert!(session.mark_loaded(9));
    }
}
