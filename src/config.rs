//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix, `__` between section and field)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` environment variables (deployment platforms)
//! 2. Environment variables (APP_SERVER__PORT, APP_AUDIO__WINDOW_THRESHOLD_BYTES, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, audio, services, performance)
/// keeps each concern readable and lets the `/api/v1/config` handler report them separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub services: ServicesConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
/// - `port = 5000`: The port the browser client connects to by default
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Format of the PCM stream clients send, plus the windowing threshold.
///
/// There is no negotiation on the wire: the client is expected to send exactly
/// this format, so these values are fixed for the lifetime of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Samples per second (48kHz is what browsers capture at)
    pub sample_rate: u32,

    /// Bytes per sample (2 = 16-bit signed little-endian)
    pub sample_width: u16,

    /// Channel count (mono only)
    pub channels: u16,

    /// A window is flushed once the buffer holds MORE than this many bytes.
    /// 192000 bytes = 2 seconds * 48000 samples/sec * 2 bytes/sample
    pub window_threshold_bytes: usize,
}

/// Endpoints and credentials of the external speech and emotion services.
///
/// Empty strings mean "not set" for the optional credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub speech_endpoint: String,
    pub speech_language: String,
    pub speech_api_key: String,
    pub emotion_endpoint: String,
    pub emotion_api_token: String,

    /// Upper bound on a single transcription or classification call
    pub request_timeout_secs: u64,
}

/// Performance tuning configuration.
///
/// ## Fields:
/// - `max_concurrent_sessions`: Maximum number of streaming connections served at once
/// - `heartbeat_interval_secs`: How often the server pings each client
/// - `client_timeout_secs`: Silence after which a client is considered gone
/// - `max_queued_chunks`: Audio messages a session may fall behind by before the
///   connection is dropped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
    pub max_queued_chunks: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
            },
            audio: AudioConfig {
                sample_rate: 48000,
                sample_width: 2,
                channels: 1,
                window_threshold_bytes: 192_000,
            },
            services: ServicesConfig {
                speech_endpoint: "http://www.google.com/speech-api/v2/recognize".to_string(),
                speech_language: "en-US".to_string(),
                speech_api_key: String::new(),
                emotion_endpoint: "https://api-inference.huggingface.co/models/j-hartmann/emotion-english-distilroberta-base".to_string(),
                emotion_api_token: String::new(),
                request_timeout_secs: 15,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 32,
                heartbeat_interval_secs: 5,
                client_timeout_secs: 30,
                max_queued_chunks: 128,
            },
        }
    }
}

impl AudioConfig {
    /// Number of bytes that make up one second of audio in this format.
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.sample_width as usize * self.channels as usize
    }

    /// Approximate duration, in seconds, of a window that just crossed the threshold.
    pub fn window_seconds(&self) -> f64 {
        let per_second = self.bytes_per_second();
        if per_second == 0 {
            return 0.0;
        }
        self.window_threshold_bytes as f64 / per_second as f64
    }
}

impl ServicesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl PerformanceConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_AUDIO__WINDOW_THRESHOLD_BYTES=96000`: Flush roughly every second
    /// - `APP_SERVICES__EMOTION_API_TOKEN=hf_...`: Credentials for the emotion service
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // required(false) means "don't error if missing"
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Audio format is 16-bit mono with a non-zero rate and threshold
    /// - Service timeouts are bounded and non-zero
    /// - The heartbeat fires at least once before a client is declared dead
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Sample rate must be greater than 0"));
        }

        if self.audio.sample_width != 2 {
            return Err(anyhow::anyhow!(
                "Only 16-bit PCM is supported (sample_width = 2), got {}",
                self.audio.sample_width
            ));
        }

        if self.audio.channels != 1 {
            return Err(anyhow::anyhow!("Only mono audio is supported, got {} channels", self.audio.channels));
        }

        if self.audio.window_threshold_bytes == 0 {
            return Err(anyhow::anyhow!("Window threshold must be greater than 0"));
        }

        if self.services.request_timeout_secs == 0 || self.services.request_timeout_secs > 300 {
            return Err(anyhow::anyhow!("Request timeout must be between 1 and 300 seconds"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.performance.heartbeat_interval_secs == 0 {
            return Err(anyhow::anyhow!("Heartbeat interval must be greater than 0"));
        }

        if self.performance.max_queued_chunks == 0 {
            return Err(anyhow::anyhow!("Max queued chunks must be greater than 0"));
        }

        if self.performance.client_timeout_secs <= self.performance.heartbeat_interval_secs {
            return Err(anyhow::anyhow!("Client timeout must be longer than the heartbeat interval"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// Only settings that are read when a session opens can change at runtime:
    /// the window threshold and the performance limits. The `services` section is bound
    /// into the shared service clients at startup and is ignored here.
    ///
    /// ## Partial updates:
    /// Send just `{"audio": {"window_threshold_bytes": 96000}}` to change only the threshold.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(audio) = partial_config.get("audio") {
            if let Some(threshold) = audio.get("window_threshold_bytes").and_then(|v| v.as_u64()) {
                self.audio.window_threshold_bytes = threshold as usize;
            }
        }

        if let Some(performance) = partial_config.get("performance") {
            if let Some(sessions) = performance.get("max_concurrent_sessions").and_then(|v| v.as_u64()) {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
            if let Some(interval) = performance.get("heartbeat_interval_secs").and_then(|v| v.as_u64()) {
                self.performance.heartbeat_interval_secs = interval;
            }
            if let Some(timeout) = performance.get("client_timeout_secs").and_then(|v| v.as_u64()) {
                self.performance.client_timeout_secs = timeout;
            }
            if let Some(queued) = performance.get("max_queued_chunks").and_then(|v| v.as_u64()) {
                self.performance.max_queued_chunks = queued as usize;
            }
        }

        self.validate()?;
        Ok(())
    }
}
