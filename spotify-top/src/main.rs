//! Spotify Top binary entry point.

use acton_reactive::prelude::ActonApp;
use anyhow::Context;
use clap::Parser;
use spotify_top::agents::{LoginStateAgent, LoginStateConfig};
use spotify_top::flash::FlashKey;
use spotify_top::oauth::{Authenticator, OAuthCoordinator, SpotifyAuthenticator};
use spotify_top::template::TemplateRegistry;
use spotify_top::{router, AppConfig, AppState, ConfigError, SessionStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shows your top Spotify artists and tracks.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Additional configuration file, merged after the default locations
    #[arg(short, long, env = "SPOTIFYTOP_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "spotify_top=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let loaded = AppConfig::load(args.config.as_deref());
    init_tracing(loaded.as_ref().is_ok_and(|config| config.log.json));

    let mut config = loaded.inspect_err(|e| tracing::error!(error = %e, "Could not load configuration"))?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let credentials = config
        .validate()
        .inspect_err(|e| tracing::error!(error = %e, "Invalid configuration"))?;

    tracing::info!("Starting spotify-top");

    let http = reqwest::Client::builder()
        .timeout(config.spotify.timeout())
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("Failed to build HTTP client")?;

    let authenticator: Arc<dyn Authenticator> = Arc::new(SpotifyAuthenticator::new(
        &config.spotify,
        &credentials.client_id,
        &credentials.client_secret,
        http,
    )?);

    let flash_key = FlashKey::new(credentials.cookie_key.as_bytes()).map_err(|_| ConfigError::Invalid {
        field: "cookies.key",
        reason: "unusable as an HMAC key".to_string(),
    })?;

    // Initialize acton-reactive runtime
    let mut runtime = ActonApp::launch_async().await;

    let login_states = LoginStateAgent::spawn_with_config(
        &mut runtime,
        LoginStateConfig {
            state_ttl: config.session.ttl(),
            cleanup_interval: config.session.cleanup_interval(),
        },
    )
    .await?;

    let store = Arc::new(SessionStore::new(Some(authenticator), config.session.ttl()));
    let sweeper = Arc::clone(&store).spawn_sweeper(config.session.cleanup_interval());

    let oauth = OAuthCoordinator::new(store, login_states, config.spotify.redirect_base.clone());
    let state = AppState::new(
        oauth,
        TemplateRegistry::with_pages()?,
        flash_key,
        config.cookies.policy(),
        config.cookies.max_age_seconds,
        config.http.request_timeout(),
    );

    let app = router(state, &config.server.assets_dir, config.router_timeout());

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!(
        redirect_base = %config.spotify.redirect_base,
        "Listening on http://{addr}"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();

    // Shutdown agents gracefully
    runtime.shutdown_all().await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        },
        () = terminate => {
            tracing::info!("Received terminate signal, shutting down");
        },
    }
}
