//! tidy-organize: run and inspect auto-organization against a PostgreSQL
//! document store.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

use tidy_core::{ChangeAction, ClassificationService, EventBus};
use tidy_db::Database;
use tidy_inference::ClassifierConfig;
use tidy_organize::{Organizer, OrganizerConfig, RevertAction};

#[derive(Parser)]
#[command(name = "tidy-organize")]
#[command(author, version, about = "Auto-organize scratch notes into a document tree")]
#[command(propagate_version = true)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Profile whose change history is used
    #[arg(long, env = "TIDY_PROFILE_ID")]
    profile: Uuid,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Organize the unorganized blocks of a document
    Run {
        /// Source document id
        #[arg(short, long)]
        document: Uuid,
    },

    /// List revertable changes, newest first
    History,

    /// Describe what reverting a change would do
    Preview {
        /// Change id from `history`
        change: Uuid,
    },

    /// Revert a change
    Revert {
        /// Change id from `history`
        change: Uuid,
    },

    /// Print the destination tree as the classifier sees it
    Tree,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors
    //   RUST_LOG    - standard env filter
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tidy_organize=info,tidy_db=info,tidy_inference=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("tidy-organize.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Logs go to stderr so command output stays pipeable
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );

    let cli = Cli::parse();

    let db = Database::connect(&cli.database_url).await?;
    db.migrate().await?;

    let classifier_config = ClassifierConfig::from_env();
    let classifier = classifier_config.build()?;
    let config = OrganizerConfig::from_env_with(&classifier_config);
    info!(
        backend = classifier.backend_name(),
        primary_model = %config.routing.primary_model,
        fallback_model = %config.routing.fallback_model,
        "Classifier configured"
    );

    let history = Arc::new(db.history_for(cli.profile, config.history_capacity));
    let organizer = Organizer::new(
        Arc::new(db.documents.clone()),
        history,
        classifier,
        EventBus::default(),
        config,
    );

    match cli.command {
        Commands::Run { document } => {
            let report = organizer.run(document).await?;
            if report.is_noop() {
                println!("Nothing to organize.");
                return Ok(());
            }
            for applied in &report.apply.applied {
                println!(
                    "{:<8} {}",
                    if applied.outcome.is_written() { "filed" } else { "present" },
                    applied.target_path
                );
            }
            for skipped in &report.apply.skipped {
                println!("{:<8} {} ({})", "skipped", skipped.target_path, skipped.error);
            }
            println!(
                "{} block(s) organized in {} ms{}",
                report.organized_blocks.len(),
                report.duration_ms,
                if report.used_fallback() {
                    ", classifier unavailable"
                } else {
                    ""
                }
            );
        }
        Commands::History => {
            let changes = organizer.versions().list().await?;
            if changes.is_empty() {
                println!("No revertable changes.");
            }
            for change in changes {
                let action = match change.action {
                    ChangeAction::Created => "created",
                    ChangeAction::Updated => "updated",
                };
                println!(
                    "{}  {}  {:<8} {}  {}",
                    change.id,
                    change.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    action,
                    change.destination_path,
                    change.reason
                );
            }
        }
        Commands::Preview { change } => {
            let preview = organizer.versions().preview(change).await?;
            println!("{}", preview.description);
            if let Some(warning) = preview.warning {
                println!("Warning: {}", warning);
            }
        }
        Commands::Revert { change } => {
            let result = organizer.versions().revert(change).await?;
            let verb = match result.action {
                RevertAction::DeleteDocument => "Deleted",
                RevertAction::RestoreContent => "Restored",
            };
            println!("{} {}", verb, result.document.path);
        }
        Commands::Tree => {
            let outline = organizer.destination_outline().await?;
            if outline.is_empty() {
                println!("(no destinations)");
            } else {
                println!("{}", outline);
            }
        }
    }

    Ok(())
}
