//! One-shot preview bootstrap pipeline.
//!
//! An explicit ordered list of steps, each a short-circuit gate. A
//! driver loop runs the steps in sequence and stops at the first
//! non-`Continue` outcome:
//!
//! 1. Preview-cookie guard (absent → silent skip, zero network calls)
//! 2. Single-run guard (`NotStarted` → `Bootstrapping`, else skip)
//! 3. Register base + custom type schemas
//! 4. Fetch the full predicate set at the resolved ref and materialize
//! 5. Mark the repository `Bootstrapped`
//! 6. Mark the preview session loaded
//!
//! A failed run reverts the repository to `NotStarted` so the next
//! trigger may retry; completed side effects are not rolled back.

use tracing::{debug, error, info, instrument, warn};

use contentmirror_client::resolve_ref;
use contentmirror_shared::{ContentMirrorError, Ref, Result};

use crate::registry::{BootstrapRegistry, PreviewSession};
use crate::source::{SourcingDeps, register_schemas, source_documents};
use crate::store::PreviewCookieSource;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a bootstrap invocation ended without running the pipeline.
/// Skips are not errors; they are observable only as "state unchanged."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No preview cookie: no preview was intended.
    NoPreviewCookie,
    /// Another invocation already claimed or completed this repository.
    AlreadyBootstrapped,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoPreviewCookie => write!(f, "no preview cookie"),
            Self::AlreadyBootstrapped => write!(f, "already bootstrapped"),
        }
    }
}

/// Terminal outcome of one bootstrap invocation.
#[derive(Debug)]
pub enum BootstrapOutcome {
    /// The full pipeline ran; the repository is now `Bootstrapped`.
    Completed { documents: usize },
    /// A guard short-circuited the pipeline.
    Skipped(SkipReason),
}

/// Outcome of a single step, consumed by the driver loop.
enum StepOutcome {
    Continue,
    Abort(SkipReason),
    Fail(ContentMirrorError),
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// Everything one bootstrap invocation needs, borrowed from the caller.
pub struct BootstrapDeps<'a> {
    /// Shared sourcing dependencies (client, store, schemas, predicates).
    pub sourcing: SourcingDeps<'a>,
    /// Preview cookie presence check.
    pub cookie: &'a dyn PreviewCookieSource,
    /// Session-wide bootstrap state, keyed by repository.
    pub registry: &'a BootstrapRegistry,
    /// Session-wide loading flag.
    pub session: &'a PreviewSession,
    /// Explicit ref to fetch at, bypassing ref resolution.
    pub ref_override: Option<Ref>,
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// The pipeline's steps, in contract order.
#[derive(Debug, Clone, Copy)]
enum Step {
    PreviewCookieGuard,
    SingleRunGuard,
    RegisterSchema,
    SourceDocuments,
    MarkBootstrapped,
    MarkLoaded,
}

impl Step {
    const SEQUENCE: [Step; 6] = [
        Step::PreviewCookieGuard,
        Step::SingleRunGuard,
        Step::RegisterSchema,
        Step::SourceDocuments,
        Step::MarkBootstrapped,
        Step::MarkLoaded,
    ];

    fn name(self) -> &'static str {
        match self {
            Step::PreviewCookieGuard => "preview-cookie-guard",
            Step::SingleRunGuard => "single-run-guard",
            Step::RegisterSchema => "register-schema",
            Step::SourceDocuments => "source-documents",
            Step::MarkBootstrapped => "mark-bootstrapped",
            Step::MarkLoaded => "mark-loaded",
        }
    }
}

/// Mutable state threaded through one invocation's steps.
struct RunState {
    generation: u64,
    documents: usize,
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Run the bootstrap pipeline once for the repository in `deps`.
///
/// Safe to invoke repeatedly: re-entry while `Bootstrapping` or after
/// `Bootstrapped` skips at the single-run guard, and state writes are
/// generation-tagged so a superseded invocation cannot overwrite a
/// newer one's writes.
#[instrument(skip_all, fields(repository = %deps.sourcing.repository))]
pub async fn bootstrap(deps: &BootstrapDeps<'_>) -> Result<BootstrapOutcome> {
    let mut run = RunState {
        generation: deps.registry.allocate_generation(),
        documents: 0,
    };

    for step in Step::SEQUENCE {
        debug!(step = step.name(), "running bootstrap step");

        match run_step(step, deps, &mut run).await {
            StepOutcome::Continue => {}
            StepOutcome::Abort(reason) => {
                debug!(%reason, "bootstrap skipped");
                // Completion and abort both end the loading state.
                deps.session.mark_loaded(run.generation);
                return Ok(BootstrapOutcome::Skipped(reason));
            }
            StepOutcome::Fail(err) => {
                // Completed side effects stay (at-least-once bootstrap);
                // reverting to NotStarted permits a retry on the next
                // trigger.
                deps.registry
                    .abandon(deps.sourcing.repository, run.generation);
                error!(step = step.name(), error = %err, "bootstrap failed");
                return Err(err);
            }
        }
    }

    info!(documents = run.documents, "bootstrap complete");
    Ok(BootstrapOutcome::Completed {
        documents: run.documents,
    })
}

async fn run_step(step: Step, deps: &BootstrapDeps<'_>, run: &mut RunState) -> StepOutcome {
    match step {
        Step::PreviewCookieGuard => {
            if deps.cookie.has_preview_cookie() {
                StepOutcome::Continue
            } else {
                StepOutcome::Abort(SkipReason::NoPreviewCookie)
            }
        }

        Step::SingleRunGuard => {
            if deps
                .registry
                .begin(deps.sourcing.repository, run.generation)
            {
                StepOutcome::Continue
            } else {
                StepOutcome::Abort(SkipReason::AlreadyBootstrapped)
            }
        }

        Step::RegisterSchema => match register_schemas(&deps.sourcing).await {
            Ok(()) => StepOutcome::Continue,
            Err(err) => StepOutcome::Fail(err),
        },

        Step::SourceDocuments => {
            let target_ref =
                match resolve_ref(deps.sourcing.client, deps.ref_override.clone()).await {
                    Ok(target_ref) => target_ref,
                    Err(err) => return StepOutcome::Fail(err),
                };
            match source_documents(&deps.sourcing, &target_ref).await {
                Ok(documents) => {
                    run.documents = documents;
                    StepOutcome::Continue
                }
                Err(err) => StepOutcome::Fail(err),
            }
        }

        Step::MarkBootstrapped => {
            // A rejected write means this run was superseded; drop it.
            if !deps
                .registry
                .complete(deps.sourcing.repository, run.generation)
            {
                warn!("stale bootstrap run; bootstrapped-state write dropped");
            }
            StepOutcome::Continue
        }

        Step::MarkLoaded => {
            deps.session.mark_loaded(run.generation);
            StepOutcome::Continue
        }
    }
}
