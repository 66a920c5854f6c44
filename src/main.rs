//! # Emotion Stream Backend - Main Application Entry Point
//!
//! Actix-web server that receives live PCM audio over a WebSocket, cuts it into
//! fixed-size windows, transcribes each window and answers with the dominant emotion
//! of what was said.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + environment variables)
//! - **state**: Shared state: config, the window pipeline and stream statistics
//! - **health**: Liveness and detailed status endpoints
//! - **handlers**: HTTP handlers for the runtime config API
//! - **websocket**: The `/ws/audio` streaming endpoint
//! - **audio**: Windowing, WAV transcoding and the per-connection session loop
//! - **transcription**: Speech-to-text adapter and its HTTP client
//! - **emotion**: Emotion classification adapter and its HTTP client
//! - **error**: Error types and HTTP error responses

mod audio;
mod config;
mod emotion;
mod error;
mod handlers;
mod health;
mod state;
mod transcription;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use crate::audio::{WindowPipeline, WindowTranscoder};
use crate::config::AppConfig;
use crate::emotion::{EmotionAdapter, HttpEmotionClassifier};
use crate::state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use crate::transcription::{HttpSpeechRecognizer, TranscriptionAdapter};

/// Set once a termination signal arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// ## Startup order:
/// 1. Load `.env`, set up logging
/// 2. Load and validate configuration
/// 3. Build the speech and emotion clients and the shared window pipeline
/// 4. Start the HTTP server and wait for it to exit or for a shutdown signal
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting emotion-stream-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    info!(
        sample_rate = config.audio.sample_rate,
        window_threshold_bytes = config.audio.window_threshold_bytes,
        window_seconds = config.audio.window_seconds(),
        "Audio format"
    );

    let pipeline = build_pipeline(&config)?;
    info!(
        speech = pipeline.recognizer_name(),
        emotion = pipeline.classifier_name(),
        "Window pipeline ready"
    );

    let app_state = AppState::new(config.clone(), Arc::new(pipeline));
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        // Browser clients connect from arbitrary origins
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config)),
            )
            .route("/", web::get().to(health::root_status))
            .route("/health", web::get().to(health::health_check))
            .route("/ws/audio", web::get().to(websocket::audio_websocket))
    })
    .bind(&bind_addr)?
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

/// Wire the HTTP collaborators into the pipeline every session shares.
///
/// One `reqwest::Client` (and its connection pool) serves both services.
fn build_pipeline(config: &AppConfig) -> Result<WindowPipeline> {
    let timeout = config.services.request_timeout();
    let client = reqwest::Client::builder().timeout(timeout).build()?;

    let recognizer = Arc::new(HttpSpeechRecognizer::new(client.clone(), &config.services));
    let classifier = Arc::new(HttpEmotionClassifier::new(client, &config.services));

    Ok(WindowPipeline::new(
        WindowTranscoder::from_config(&config.audio),
        TranscriptionAdapter::new(recognizer, timeout),
        EmotionAdapter::new(classifier, timeout),
    ))
}

/// Logging goes to the console; `RUST_LOG` overrides the default filter.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "emotion_stream_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Flip `SHUTDOWN_SIGNAL` on SIGTERM or SIGINT.
fn setup_signal_handlers() {
    tokio::spawn(async {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
