//! calmgate -- AI request routing with budget admission and response caching.
//!
//! Entry point. Wires configuration, tracing, the database, the optional
//! paid provider and the router, spawns the periodic jobs, and serves the
//! HTTP API until SIGTERM / SIGINT.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use calmgate::AppState;
use calmgate::api;
use calmgate::budget::SystemClock;
use calmgate::config::Config;
use calmgate::db::Database;
use calmgate::providers::{CompletionProvider, OpenAiClient, OpenAiConfig};
use calmgate::router::{AiRouter, RouterSettings};
use calmgate::store::SqliteStore;

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

struct CliArgs {
    config_path: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                if let Some(path) = args.next() {
                    config_path = Some(PathBuf::from(path));
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("calmgate {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Run with --help for usage information.");
                std::process::exit(1);
            }
        }
    }

    CliArgs { config_path }
}

fn print_usage() {
    println!(
        "\
calmgate {version} -- AI request router with budget admission

USAGE:
    calmgate [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: calmgate.toml]
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    CALMGATE_CONFIG        Alternative to --config flag
    CALMGATE_AI_API_KEY    Provider API key; paid tiers are disabled without it
",
        version = env!("CARGO_PKG_VERSION")
    );
}

/// `--config` wins, then `CALMGATE_CONFIG`, then `calmgate.toml`.
fn resolve_config_path(cli: Option<PathBuf>, env: Option<String>) -> PathBuf {
    cli.or_else(|| env.map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("calmgate.toml"))
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Parse CLI arguments
    let cli = parse_args();
    let config_path = resolve_config_path(cli.config_path, std::env::var("CALMGATE_CONFIG").ok());

    // 2. Load configuration
    let config = Config::load(&config_path)?;

    // 3. Initialize tracing/logging
    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting calmgate"
    );

    // 4. Open database
    let db = Database::open(&config.database.path)?;
    tracing::info!(path = %config.database.path.display(), "Database opened");

    // 5. Paid provider, only when a credential is configured
    let provider = build_provider(&config)?;

    // 6. Router bootstrap: persisted mode and limits, then ledger refresh
    let router = Arc::new(AiRouter::with_store(
        RouterSettings::from_config(&config.ai),
        Arc::new(SqliteStore::new(db.clone())),
        provider,
        Arc::new(SystemClock),
    ));
    router.initialize().await?;

    // 7. Periodic jobs
    spawn_cache_sweep(router.clone(), config.ai.cache_sweep_interval_secs);
    spawn_ledger_refresh(router.clone(), config.ai.refresh_interval_secs);

    // 8. Build shared application state and the HTTP app
    let state = AppState {
        config: Arc::new(config.clone()),
        db,
        router,
    };
    let app = build_app(state);

    // 9. Bind and serve
    let listen_addr = config.listen_addr();
    let listener = TcpListener::bind(&listen_addr).await?;
    tracing::info!(addr = %listen_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down gracefully");
    Ok(())
}

fn build_provider(config: &Config) -> anyhow::Result<Option<Arc<dyn CompletionProvider>>> {
    let Some(api_key) = config.ai.credential() else {
        tracing::warn!("No provider API key configured, paid tiers fall back to local answers");
        return Ok(None);
    };

    let client = OpenAiClient::new(OpenAiConfig {
        base_url: config.ai.base_url.clone(),
        api_key: api_key.to_string(),
        timeout_secs: config.ai.request_timeout_secs,
    })
    .map_err(|e| anyhow::anyhow!("Provider init failed: {e}"))?;

    tracing::info!(
        base_url = %config.ai.base_url,
        model_primary = %config.ai.model_primary,
        model_deep = %config.ai.model_deep,
        "Provider configured"
    );
    Ok(Some(Arc::new(client)))
}

// ---------------------------------------------------------------------------
// Background jobs
// ---------------------------------------------------------------------------

fn spawn_cache_sweep(router: Arc<AiRouter>, every_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(every_secs.max(1)));
        loop {
            interval.tick().await;
            if let Err(e) = router.purge_expired_cache().await {
                tracing::warn!(error = %e, "Cache sweep failed");
            }
        }
    });
}

fn spawn_ledger_refresh(router: Arc<AiRouter>, every_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(every_secs.max(1)));
        // The first tick fires immediately; initialize() already refreshed.
        interval.tick().await;
        loop {
            interval.tick().await;
            router.refresh_or_keep().await;
        }
    });
}

// ---------------------------------------------------------------------------
// Router assembly
// ---------------------------------------------------------------------------

/// Build the application router with all middleware layers.
fn build_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);

    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let trace = TraceLayer::new_for_http();

    api::build_api_router()
        .layer(propagate_id)
        .layer(trace)
        .layer(request_id)
        .layer(cors)
        .with_state(state)
}

/// Build the CORS layer from config.
fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.server.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

// ---------------------------------------------------------------------------
// Tracing initialization
// ---------------------------------------------------------------------------

/// Set up the tracing subscriber based on configuration.
fn init_tracing(config: &Config) {
    // RUST_LOG env var takes precedence over config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("calmgate={level},tower_http={level},warn"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

/// Wait for a shutdown signal (SIGTERM or SIGINT / Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C)");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_usage_does_not_panic() {
        print_usage();
    }

    #[test]
    fn test_resolve_config_path_precedence() {
        assert_eq!(
            resolve_config_path(Some("a.toml".into()), Some("b.toml".into())),
            PathBuf::from("a.toml")
        );
        assert_eq!(resolve_config_path(None, Some("b.toml".into())), PathBuf::from("b.toml"));
        assert_eq!(resolve_config_path(None, None), PathBuf::from("calmgate.toml"));
    }

    #[test]
    fn test_build_provider_requires_key() {
        let mut config = Config::default();
        assert!(build_provider(&config).unwrap().is_none());

        config.ai.api_key = Some("sk-test".into());
        let provider = build_provider(&config).unwrap().unwrap();
        assert_eq!(provider.id(), "openai");
    }

    #[test]
    fn test_cors_layer_with_origins() {
        let mut config = Config::default();
        config.server.cors_origins = vec!["http://localhost:3000".into()];
        let _layer = build_cors_layer(&config);
    }
}
