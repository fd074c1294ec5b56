//! syslib-server entry point.
//!
//! Loads configuration, initializes tracing, resolves the security preset into
//! the request pipeline, sets up the Axum router and starts the listener.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use syslib_server::config::{log_filter_for_level, ServerConfig};
use syslib_server::routes::create_router;
use syslib_server::security::{build_pipeline, Capabilities};
use syslib_server::state::AppState;
use syslib_server::http;

/// syslib-server: static pages and system endpoints behind a security pipeline
#[derive(Parser, Debug)]
#[command(name = "syslib-server", version, about)]
struct Args {
    /// Path to configuration file (default: config/default.toml if present)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level filter (e.g., "syslib_server=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration under a bootstrap subscriber so preset warnings show up
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
        .finish();
    let config = tracing::subscriber::with_default(bootstrap, || {
        ServerConfig::load(args.config.as_deref())
    })?;

    // Initialize tracing with priority: CLI > env > config
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| log_filter_for_level(&config.logging.level));
    let filter = tracing_subscriber::EnvFilter::new(&log_filter);

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        env = %config.env,
        development = config.is_development(),
        preset = %config.security.preset,
        "Loaded configuration"
    );

    // Resolve the preset and assemble the security pipeline
    let (pipeline, security) = build_pipeline(&config.env, &config.security, &Capabilities::default());
    tracing::info!(stages = ?pipeline.stage_names(), "Built security pipeline");

    let host = config.server.host.clone();
    let port = config.server.port;

    // Create application state and router
    let state = AppState::new(config);
    let app = create_router(state, pipeline);

    // Start server
    let launched = http::launch(app, &security, &host, port).await?;
    launched.serve().await?;

    Ok(())
}
