//! # WAV Capture Server - Main Application Entry Point
//!
//! Accepts audio capture sessions over WebSocket and stores each one as a
//! named `.wav` file.
//!
//! ## Application Architecture:
//! - **config**: configuration (defaults, `config.toml`, environment)
//! - **state**: shared state and capture metrics
//! - **audio**: PCM decoding and WAV container encoding
//! - **capture**: per-connection session state machine, scratch files, commit
//! - **websocket**: one actor per connection speaking the capture protocol
//! - **health**: health endpoint
//! - **error**: protocol and HTTP error types

mod audio;
mod capture;
mod config;
mod error;
mod health;
mod state;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use crate::config::AppConfig;
use crate::state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set once a shutdown signal has been received.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// Startup order:
/// 1. **Load configuration** from files and environment variables
/// 2. **Set up logging**
/// 3. **Reset capture storage** so the output directory starts empty
/// 4. **Run the HTTP/WebSocket server** until it fails or a signal arrives
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!(
        sample_rate = config.audio.sample_rate,
        sample_format = ?config.audio.sample_format,
        workers = config.server.workers,
        "Configuration loaded"
    );

    let app_state = AppState::new(config.clone());
    app_state
        .store
        .prepare(config.storage.reset_on_startup)
        .await
        .with_context(|| {
            format!(
                "Failed to prepare capture storage at {}",
                config.storage.output_dir.display()
            )
        })?;

    let bind_addr = config.bind_addr();

    setup_signal_handlers();

    info!("Starting capture server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .configure(configure_routes)
    })
    .workers(config.server.workers)
    .disable_signals()
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Routes shared by the server and its tests.
///
/// The capture socket answers on `/ws` and on `/`, where clients of the
/// first version of the protocol connect.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health_check))
        .route("/ws", web::get().to(websocket::capture_websocket))
        .route("/", web::get().to(websocket::capture_websocket));
}

/// Structured console logging, filtered by `RUST_LOG`
/// (default `wav_capture_server=debug,actix_web=info`).
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wav_capture_server=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Flip [`SHUTDOWN_SIGNAL`] on SIGINT (and SIGTERM on unix).
fn setup_signal_handlers() {
    tokio::spawn(async {
        wait_for_signal().await;
        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received SIGINT");
            }
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received SIGINT"),
                Err(e) => error!("Failed to listen for SIGINT: {}", e),
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
    }
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
