//! # Audio Processing Module
//!
//! Handles the streaming audio path from raw bytes to emotion results.
//!
//! ## Key Components:
//! - **Accumulator**: Appends chunks and flushes fixed-threshold windows
//! - **Transcoder**: Wraps a PCM window in a WAV container
//! - **Pipeline**: Window → transcript → dominant emotion
//! - **Session**: Per-connection loop tying the above together
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: 48kHz (48,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers
//!
//! The WebSocket handler that feeds sessions lives in `src/websocket.rs`.

pub mod accumulator;
pub mod pipeline;
pub mod session;
pub mod transcoder;

pub use accumulator::{AudioAccumulator, Window};
pub use pipeline::{EmotionResult, WindowPipeline};
pub use session::{AudioSession, ResultSink, SessionSummary};
pub use transcoder::{AudioContainer, WindowTranscoder};
