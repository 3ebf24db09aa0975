use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use reviewer_assign::adapters::http;
use reviewer_assign::core::{ConfigProvider, Directory};
use reviewer_assign::utils::error::{AssignError, ErrorSeverity};
use reviewer_assign::utils::{logger, validation::Validate};
use reviewer_assign::{CliConfig, InMemoryStore, ReviewEngine, ServerSettings, StoreBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    let settings = match cli.resolve() {
        Ok(settings) => settings,
        Err(e) => {
            logger::init_cli_logger(cli.verbose.unwrap_or(false));
            exit_with(&e);
        }
    };

    if settings.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(settings.verbose);
    }

    tracing::info!("Starting reviewer-assign");
    tracing::debug!("Resolved settings: {:?}", settings);

    if let Err(e) = settings.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        exit_with(&e);
    }

    match settings.store_backend() {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; all data is lost on restart");
            serve(Arc::new(InMemoryStore::new()), &settings).await
        }
        StoreBackend::Sqlite => open_sqlite_and_serve(&settings).await,
    }
}

#[cfg(feature = "sqlite")]
async fn open_sqlite_and_serve(settings: &ServerSettings) -> anyhow::Result<()> {
    let path = std::path::Path::new(settings.database_path());
    match reviewer_assign::SqliteStore::open(path).await {
        Ok(store) => serve(Arc::new(store), settings).await,
        Err(e) => exit_with(&AssignError::store(format!("open database {}", path.display()))(e)),
    }
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite_and_serve(settings: &ServerSettings) -> anyhow::Result<()> {
    exit_with(&AssignError::ConfigError {
        message: format!(
            "cannot open {}: this build does not include the sqlite store",
            settings.database_path()
        ),
    })
}

async fn serve<D: Directory + 'static>(
    store: Arc<D>,
    settings: &ServerSettings,
) -> anyhow::Result<()> {
    let mut engine = ReviewEngine::new(store).with_status_cache(settings.status_cache());
    if settings.operation_timeout_ms() > 0 {
        let timeout = Duration::from_millis(settings.operation_timeout_ms());
        engine = engine.with_operation_timeout(timeout);
    }

    tracing::info!(
        store = %settings.store_backend(),
        status_cache = engine.statuses().is_caching(),
        operation_timeout_ms = settings.operation_timeout_ms(),
        "Review engine ready"
    );

    let bind_addr = settings.bind_addr();
    http::run_server(&bind_addr, Arc::new(engine))
        .await
        .with_context(|| format!("HTTP server on {bind_addr} failed"))?;

    tracing::info!("✅ Server stopped");
    Ok(())
}

fn exit_with(e: &AssignError) -> ! {
    tracing::error!(
        "❌ Startup failed: {} (Kind: {:?}, Severity: {:?})",
        e,
        e.kind(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    // Exit code follows severity so supervisors can tell bad config from a broken host.
    let exit_code = match e.severity() {
        ErrorSeverity::Low | ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}
