//! # Emotion Module
//!
//! Text emotion classification is delegated to an external multi-label classifier
//! that scores every label of a fixed vocabulary (anger, disgust, fear, joy,
//! neutral, sadness, surprise for the default model). This module picks the single
//! dominant label out of those scores.

pub mod classifier;
pub mod http;

pub use classifier::{EmotionAdapter, EmotionClassifier, EmotionScore};
pub use http::HttpEmotionClassifier;
