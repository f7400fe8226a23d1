//! CLI command definitions, routing, and tracing setup.

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use contentmirror_client::{Client, FetchOptions};
use contentmirror_core::{
    BootstrapDeps, BootstrapOutcome, BootstrapRegistry, PreviewCookieSource, PreviewSession,
    ProgressReporter, SourcingDeps, bootstrap, reconcile, sync_repository,
};
use contentmirror_shared::{
    AppConfig, ContentMirrorError, Ref, RepositoryConfig, TypeSchema, WebhookNotification,
    expand_home, find_repository, init_config, load_config, preview_cookie_path,
};
use contentmirror_storage::Storage;

/// Env var that marks an active preview session without a cookie file.
const PREVIEW_ENV_VAR: &str = "CONTENTMIRROR_PREVIEW";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// contentmirror — mirror a remote content repository locally.
#[derive(Parser)]
#[command(
    name = "contentmirror",
    version,
    about = "Keep a local mirror of a remote content repository in sync.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Initialize the config file with defaults.
    Init,

    /// Run the one-shot preview bootstrap for a repository.
    Bootstrap {
        /// Repository name (must be registered in the config file).
        repository: String,

        /// Explicit ref to fetch at, bypassing ref resolution.
        #[arg(long = "ref")]
        target_ref: Option<String>,
    },

    /// Fully sync a repository at its resolved (non-preview) ref.
    Sync {
        /// Repository name (must be registered in the config file).
        repository: String,

        /// Explicit ref to fetch at, bypassing ref resolution.
        #[arg(long = "ref")]
        target_ref: Option<String>,
    },

    /// Reconcile the mirror against a change-notification payload.
    Webhook {
        /// Repository name (must be registered in the config file).
        repository: String,

        /// Path to the notification JSON, or '-' for stdin.
        #[arg(long)]
        payload: String,

        /// Compute and print the plan without applying it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show mirror contents and recent sync runs.
    Status {
        /// Repository name (must be registered in the config file).
        repository: String,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "contentmirror=info",
        1 => "contentmirror=debug",
        _ => "contentmirror=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init => cmd_init().await,
        Command::Bootstrap {
            repository,
            target_ref,
        } => cmd_bootstrap(&repository, target_ref.map(Ref::new)).await,
        Command::Sync {
            repository,
            target_ref,
        } => cmd_sync(&repository, target_ref.map(Ref::new)).await,
        Command::Webhook {
            repository,
            payload,
            dry_run,
        } => cmd_webhook(&repository, &payload, dry_run).await,
        Command::Status { repository } => cmd_status(&repository).await,
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

/// One repository's resolved runtime pieces.
struct RepoContext {
    repository: RepositoryConfig,
    client: Client,
    storage: Storage,
    options: FetchOptions,
    type_schemas: Vec<TypeSchema>,
}

async fn repo_context(config: &AppConfig, name: &str) -> Result<RepoContext> {
    let repository = find_repository(config, name)?.clone();
    let client = Client::new(&repository, &config.defaults.endpoint_template)?;

    let db_path = expand_home(&config.defaults.data_dir)?
        .join(&repository.name)
        .join("mirror.db");
    let storage = Storage::open(&db_path).await?;

    let options = FetchOptions {
        fetch_links: repository.fetch_links.clone(),
        lang: repository.lang.clone(),
    };
    let type_schemas = load_type_schemas(&repository)?;

    Ok(RepoContext {
        repository,
        client,
        storage,
        options,
        type_schemas,
    })
}

/// Load custom type schemas from the repository's schemas directory.
/// Each `<name>.json` file becomes one type definition.
fn load_type_schemas(
    repository: &RepositoryConfig,
) -> std::result::Result<Vec<TypeSchema>, ContentMirrorError> {
    let Some(dir) = &repository.schemas_dir else {
        return Ok(Vec::new());
    };

    let dir = expand_home(dir)?;
    let entries = std::fs::read_dir(&dir).map_err(|e| ContentMirrorError::io(&dir, e))?;

    let mut schemas = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ContentMirrorError::io(&dir, e))?;
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| {
                ContentMirrorError::validation(format!("bad schema file name: {}", path.display()))
            })?;
        let content =
            std::fs::read_to_string(&path).map_err(|e| ContentMirrorError::io(&path, e))?;
        let definition = serde_json::from_str(&content).map_err(|e| {
            ContentMirrorError::validation(format!("invalid schema {}: {e}", path.display()))
        })?;

        schemas.push(TypeSchema { name, definition });
    }

    schemas.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(schemas)
}

/// Cookie source backed by an env var or the cookie file under the
/// config dir. Presence only; the value is never parsed.
struct CliCookieSource;

impl PreviewCookieSource for CliCookieSource {
    fn has_preview_cookie(&self) -> bool {
        if std::env::var(PREVIEW_ENV_VAR).is_ok_and(|v| !v.is_empty()) {
            return true;
        }
        preview_cookie_path().map(|p| p.exists()).unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn document_materialized(&self, id: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Materializing [{current}/{total}] {id}"));
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_init() -> Result<()> {
    let path = init_config()?;
    println!("Created config file at {}", path.display());
    println!("Register repositories under [[repositories]] to get started.");
    Ok(())
}

async fn cmd_bootstrap(name: &str, ref_override: Option<Ref>) -> Result<()> {
    let config = load_config()?;
    let context = repo_context(&config, name).await?;

    // The CLI process is the session: state registry and loading flag
    // live for this invocation.
    let registry = BootstrapRegistry::new();
    let session = PreviewSession::new();
    let cookie = CliCookieSource;
    let progress = CliProgress::new();

    info!(repository = name, "starting preview bootstrap");
    let run_id = context.storage.insert_sync_run(name, "bootstrap").await?;

    let deps = BootstrapDeps {
        sourcing: SourcingDeps {
            repository: name,
            client: &context.client,
            store: &context.storage,
            schemas: &context.storage,
            predicates: &context.repository.predicates,
            type_schemas: &context.type_schemas,
            options: &context.options,
            progress: &progress,
        },
        cookie: &cookie,
        registry: &registry,
        session: &session,
        ref_override,
    };

    let outcome = bootstrap(&deps).await;
    progress.finish();

    match outcome {
        Ok(BootstrapOutcome::Completed { documents }) => {
            context
                .storage
                .update_sync_run(
                    &run_id,
                    &serde_json::json!({ "outcome": "completed", "documents": documents })
                        .to_string(),
                )
                .await?;

            println!();
            println!("  Preview bootstrap complete!");
            println!("  Repository: {name}");
            println!("  Documents:  {documents}");
            println!();
            Ok(())
        }
        Ok(BootstrapOutcome::Skipped(reason)) => {
            context
                .storage
                .update_sync_run(
                    &run_id,
                    &serde_json::json!({ "outcome": "skipped", "reason": reason.to_string() })
                        .to_string(),
                )
                .await?;

            println!("Bootstrap skipped: {reason}.");
            Ok(())
        }
        Err(err) => {
            context
                .storage
                .update_sync_run(
                    &run_id,
                    &serde_json::json!({ "outcome": "failed", "error": err.to_string() })
                        .to_string(),
                )
                .await?;
            Err(err.into())
        }
    }
}

async fn cmd_sync(name: &str, ref_override: Option<Ref>) -> Result<()> {
    let config = load_config()?;
    let context = repo_context(&config, name).await?;
    let progress = CliProgress::new();

    info!(repository = name, "starting full sync");
    let run_id = context.storage.insert_sync_run(name, "sync").await?;

    let deps = SourcingDeps {
        repository: name,
        client: &context.client,
        store: &context.storage,
        schemas: &context.storage,
        predicates: &context.repository.predicates,
        type_schemas: &context.type_schemas,
        options: &context.options,
        progress: &progress,
    };

    let summary = sync_repository(&deps, ref_override).await;
    progress.finish();
    let summary = summary?;

    context
        .storage
        .update_sync_run(
            &run_id,
            &serde_json::json!({
                "documents": summary.documents,
                "ref": summary.target_ref.as_str(),
            })
            .to_string(),
        )
        .await?;

    println!();
    println!("  Sync complete!");
    println!("  Repository: {name}");
    println!("  Documents:  {}", summary.documents);
    println!("  Ref:        {}", summary.target_ref);
    println!();
    Ok(())
}

async fn cmd_webhook(name: &str, payload: &str, dry_run: bool) -> Result<()> {
    let config = load_config()?;
    let context = repo_context(&config, name).await?;

    let body = if payload == "-" {
        std::io::read_to_string(std::io::stdin())
            .map_err(|e| eyre!("cannot read payload from stdin: {e}"))?
    } else {
        std::fs::read_to_string(payload)
            .map_err(|e| eyre!("cannot read payload '{payload}': {e}"))?
    };
    let notification: WebhookNotification =
        serde_json::from_str(&body).map_err(|e| eyre!("invalid notification payload: {e}"))?;

    info!(
        repository = name,
        notified = notification.document_ids.len(),
        dry_run,
        "reconciling change notification"
    );

    let plan = reconcile(&context.client, &notification, None, &context.options).await?;

    if dry_run {
        println!();
        println!("  Reconciliation plan (not applied):");
        println!("  Upserts:   {}", plan.to_upsert.len());
        for document in &plan.to_upsert {
            println!("    + {}", document.id);
        }
        println!("  Deletions: {}", plan.to_delete.len());
        for id in &plan.to_delete {
            println!("    - {id}");
        }
        println!();
        return Ok(());
    }

    let run_id = context.storage.insert_sync_run(name, "webhook").await?;
    let stats = contentmirror_core::apply(&plan, &context.storage).await?;

    context
        .storage
        .update_sync_run(
            &run_id,
            &serde_json::json!({ "upserted": stats.upserted, "deleted": stats.deleted })
                .to_string(),
        )
        .await?;

    println!();
    println!("  Reconciliation applied!");
    println!("  Upserted: {}", stats.upserted);
    println!("  Deleted:  {}", stats.deleted);
    println!();
    Ok(())
}

async fn cmd_status(name: &str) -> Result<()> {
    let config = load_config()?;
    let repository = find_repository(&config, name)?;

    let db_path = expand_home(&config.defaults.data_dir)?
        .join(&repository.name)
        .join("mirror.db");
    if !db_path.exists() {
        println!("No local mirror for '{name}' yet — run `contentmirror sync {name}` first.");
        return Ok(());
    }

    let storage = Storage::open(&db_path).await?;
    let documents = storage.count_documents().await?;
    let type_schemas = storage.count_type_schemas().await?;
    let runs = storage.list_sync_runs(name, 5).await?;

    println!();
    println!("  Repository:   {name}");
    println!("  Mirror:       {}", db_path.display());
    println!("  Documents:    {documents}");
    println!("  Type schemas: {type_schemas}");
    println!("  Recent runs:");
    if runs.is_empty() {
        println!("    (none)");
    }
    for run in runs {
        let finished = run.finished_at.as_deref().unwrap_or("unfinished");
        let stats = run.stats_json.as_deref().unwrap_or("-");
        println!(
            "    {} {} started={} finished={} {}",
            run.id, run.kind, run.started_at, finished, stats
        );
    }
    println!();
    Ok(())
}
