use anyhow::Result;
use clap::{Parser, Subcommand};
use pokenae_config::{Config, LogConfig, LogFormat, Secrets, apply_env, process_env};
use pokenae_proxy::AppState;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

/// How often expired sessions and idle refresh bookkeeping are dropped.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Parser, Debug)]
#[command(
    name = "pokenae",
    about = "pokenae gateway: authenticated backend proxy with Google sign-in"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway server.
    Serve {
        /// Path to the YAML configuration file.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Override the listening port (default: 3001).
        #[arg(short, long)]
        port: Option<u16>,
        /// Override the listening address (default: 127.0.0.1).
        #[arg(long)]
        host: Option<String>,
    },
    /// Validate configuration and secrets, then print the service registry.
    Check {
        /// Path to the YAML configuration file.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port, host } => cmd_serve(config, port, host).await,
        Commands::Check { config } => cmd_check(config),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let mut config =
        Config::load(path.map(PathBuf::as_path)).map_err(|e| anyhow::anyhow!("config error: {e}"))?;
    apply_env(&mut config, &process_env);
    Ok(config)
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let registry = tracing_subscriber::registry().with(filter);
    match log.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

async fn cmd_serve(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    host: Option<String>,
) -> Result<()> {
    let mut config = load_config(config_path.as_ref())?;
    if let Some(p) = port {
        config.port = p;
    }
    if let Some(h) = host {
        config.host = h;
    }

    init_tracing(&config.log);
    config.validate()?;
    let secrets = Secrets::resolve_runtime(&config)?;

    if config.mock_mode {
        tracing::info!("mock mode enabled");
    }
    tracing::info!(
        environment = ?config.environment,
        services = config.services.len(),
        exchange = ?config.oauth.exchange,
        "configuration loaded"
    );

    let state = AppState::from_config(&config, &secrets)?;
    spawn_session_sweeper(&state);
    let app = pokenae_proxy::make_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, public_url = %config.public_url, "pokenae listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn spawn_session_sweeper(state: &Arc<AppState>) {
    let sessions = Arc::clone(&state.sessions);
    let auth = Arc::clone(&state.auth);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sessions.purge_expired();
            auth.prune_refresh_state();
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

fn cmd_check(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_ref())?;
    init_tracing(&config.log);
    config.validate()?;
    Secrets::resolve(&config, &process_env)?;

    println!("configuration OK ({:?})", config.environment);
    println!("oauth redirect: {}", config.redirect_uri());
    for (name, svc) in &config.services {
        let key = if svc.api_key.is_some() { "api key" } else { "no api key" };
        println!("{name}: {} ({} ms, {key})", svc.base_url, svc.timeout_ms);
    }
    Ok(())
}
