//! Herald binary — the voice-greeting companion process.
//!
//! Starts the engine event loop with structured logging, file-backed
//! stores, and graceful shutdown on SIGTERM/SIGINT. Until a platform
//! transport adapter is wired in, connections and playback run on the
//! in-process loopback transport.

use herald_server::config;
use herald_server::events;
use herald_server::{build_state, commands};
use herald_store::{PreferenceStore, SoundCatalog};
use herald_voice::{LoopbackSink, LoopbackTransport};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("HERALD_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // File-backed stores
    let store = PreferenceStore::new(&config.storage.preferences_path);
    let catalog = SoundCatalog::new(&config.storage.sounds_dir);

    let sounds = catalog.list();
    tracing::info!(
        sounds = sounds.len(),
        dir = %config.storage.sounds_dir,
        "sound catalog scanned"
    );

    // Voice transport. The loopback stands in until a platform adapter
    // provides real connections.
    let transport = Arc::new(LoopbackTransport::new());
    let sink = Arc::new(LoopbackSink::new(Duration::from_millis(
        config.voice.loopback_clip_ms,
    )));
    tracing::warn!("no platform voice adapter configured, using loopback transport");

    let (state, engine_rx) = build_state(
        store,
        catalog,
        transport,
        sink,
        config.voice.timeouts(),
    );

    {
        let prefs = state.prefs.read().await;
        tracing::info!(
            user_sounds = prefs.user_sounds.len(),
            channel_sounds = prefs.channel_sounds.len(),
            has_default = prefs.default_sound.is_some(),
            "preference mapping loaded"
        );
    }

    tracing::info!("starting herald engine");
    let loop_handle = tokio::spawn(events::run_event_loop(state.clone(), engine_rx));

    shutdown_signal().await;

    // Tear down every live session before exit so connection handles
    // are released.
    let active = commands::active_sessions(&state).await;
    if !active.is_empty() {
        tracing::info!(count = active.len(), "tearing down live sessions");
    }
    state.sessions.shutdown().await;
    loop_handle.abort();

    tracing::info!("herald shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
