use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Liveness check. Stateless and always the same answer.
pub async fn root_status() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "Backend is running successfully" }))
}

/// Detailed status: uptime, session load and window statistics.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let stats = state.get_stats_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "emotion-stream-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "audio": {
            "sample_rate": config.audio.sample_rate,
            "sample_width": config.audio.sample_width,
            "channels": config.audio.channels,
            "window_threshold_bytes": config.audio.window_threshold_bytes,
            "window_seconds": config.audio.window_seconds()
        },
        "collaborators": {
            "speech": state.pipeline.recognizer_name(),
            "emotion": state.pipeline.classifier_name()
        },
        "sessions": {
            "active": stats.active_sessions,
            "total": stats.total_sessions,
            "rejected": stats.rejected_sessions
        },
        "windows": {
            "processed": stats.windows_processed,
            "results_emitted": stats.results_emitted,
            "skipped_no_speech": stats.windows_skipped,
            "failed": stats.windows_failed,
            "abandoned_on_disconnect": stats.windows_abandoned,
            "failure_rate": stats.failure_rate(),
            "bytes_received": stats.bytes_received
        },
        "system": get_load_status(config.performance.max_concurrent_sessions, stats.active_sessions)
    }))
}

fn get_load_status(max_sessions: usize, active_sessions: u32) -> serde_json::Value {
    let session_usage = if max_sessions > 0 {
        active_sessions as f64 / max_sessions as f64
    } else {
        0.0
    };

    let status = if session_usage >= 1.0 {
        "at_capacity"
    } else if session_usage > 0.7 {
        "high_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "session_usage_percent": (session_usage * 100.0).round(),
        "max_sessions": max_sessions,
        "current_sessions": active_sessions
    })
}
