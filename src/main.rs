use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use pr_review_eval::config::{default_credentials_path, CliArgs, EvalConfig};
use pr_review_eval::evaluation::dataset;
use pr_review_eval::server;
use pr_review_eval::settings::{load_credentials, save_credentials, Credentials};
use pr_review_eval::state::AppState;

const DEFAULT_LOG_FILTER: &str = "pr_review_eval=info,tower_http=info";

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let dir = dir.unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)?;
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("log file path has no file name: {:?}", path))?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    // Held for the life of the process so buffered lines reach the file
    let _log_guard = init_tracing(args.log_file.as_deref())?;

    info!("Starting pr-review-eval v{}", env!("CARGO_PKG_VERSION"));

    let credentials_path = args
        .credentials
        .clone()
        .unwrap_or_else(default_credentials_path);
    let persist = args.save_credentials;
    let stored = load_credentials(&credentials_path);
    let config = EvalConfig::from_args(args, stored);

    if persist {
        save_credentials(
            &config.credentials_path,
            &Credentials {
                perplexity_api_key: config.api_key.clone(),
                github_token: config.github_token.clone(),
            },
        );
        info!("Saved credentials to {:?}", config.credentials_path);
    }

    if config.api_key.is_none() {
        warn!("No model API key configured; every review and judge call will fail closed");
    }
    if config.github_token.is_none() {
        info!("No GitHub token configured; PR import uses unauthenticated rate limits");
    }

    let items = match dataset::load(&config.dataset_path) {
        Ok(items) => items,
        Err(e) => {
            error!("Failed to load dataset {:?}: {:#}", config.dataset_path, e);
            std::process::exit(1);
        }
    };
    info!(
        "Models: {} | judge: {} | focus: {}",
        config.models.join(", "),
        config.judge_model,
        config.focus_model
    );

    let addr = config.bind_addr();
    let state = Arc::new(AppState::new(config, items));

    let router = server::build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
