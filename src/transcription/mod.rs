//! # Transcription Module
//!
//! Speech-to-text is delegated to an external service. This module wraps that
//! service behind a narrow interface and contains its failures.
//!
//! ## Key Components:
//! - **SpeechRecognizer**: the collaborator seam (any service or test double)
//! - **TranscriptionAdapter**: bounds each call with a timeout and normalizes outcomes
//! - **HttpSpeechRecognizer**: client for a line-delimited JSON recognition endpoint
//!
//! ## Outcomes:
//! - **Some(text)**: an utterance was recognized
//! - **None**: no intelligible speech, expected for silence and pauses
//! - **Err**: service failure, logged and skipped by the session loop

pub mod engine;
pub mod http;

pub use engine::{SpeechRecognizer, TranscriptionAdapter};
pub use http::HttpSpeechRecognizer;
