use crate::{config::AppConfig, error::{AppError, AppResult}, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Credentials are reported as set/unset, never echoed back.
fn config_json(config: &AppConfig) -> serde_json::Value {
    json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port
        },
        "audio": {
            "sample_rate": config.audio.sample_rate,
            "sample_width": config.audio.sample_width,
            "channels": config.audio.channels,
            "window_threshold_bytes": config.audio.window_threshold_bytes
        },
        "services": {
            "speech_endpoint": config.services.speech_endpoint,
            "speech_language": config.services.speech_language,
            "speech_api_key_set": !config.services.speech_api_key.is_empty(),
            "emotion_endpoint": config.services.emotion_endpoint,
            "emotion_api_token_set": !config.services.emotion_api_token.is_empty(),
            "request_timeout_secs": config.services.request_timeout_secs
        },
        "performance": {
            "max_concurrent_sessions": config.performance.max_concurrent_sessions,
            "heartbeat_interval_secs": config.performance.heartbeat_interval_secs,
            "client_timeout_secs": config.performance.client_timeout_secs,
            "max_queued_chunks": config.performance.max_queued_chunks
        }
    })
}

pub async fn get_config(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config_json(&config)
    })))
}

/// Partial runtime update. Applies to sessions opened afterwards.
pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> AppResult<HttpResponse> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state.update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    tracing::info!(
        window_threshold_bytes = current_config.audio.window_threshold_bytes,
        max_sessions = current_config.performance.max_concurrent_sessions,
        "Configuration updated"
    );

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": config_json(&current_config)
    })))
}
