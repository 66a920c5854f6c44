//! # Emotion Adapter
//!
//! Wraps an [`EmotionClassifier`] collaborator and reduces its scores to one label.

use crate::error::{AdapterError, PipelineError, Stage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One (label, score) pair as returned by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionScore {
    pub label: String,
    pub score: f32,
}

#[cfg(test)]
impl EmotionScore {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self { label: label.into(), score }
    }
}

/// An external text-classification collaborator.
///
/// Shared read-only by all sessions, constructed once at startup.
#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    fn name(&self) -> &str;

    /// Score every label of the classifier's vocabulary for `text`.
    async fn scores(&self, text: &str) -> Result<Vec<EmotionScore>, AdapterError>;
}

/// Label with the highest score.
///
/// On an exact tie the label the classifier listed first wins. The classifier's
/// ordering carries no meaning, so exact ties are effectively implementation-defined.
/// Non-finite scores are ignored.
pub fn dominant_label(scores: &[EmotionScore]) -> Option<&EmotionScore> {
    scores
        .iter()
        .filter(|s| s.score.is_finite())
        .fold(None, |best: Option<&EmotionScore>, candidate| match best {
            Some(current) if candidate.score <= current.score => Some(current),
            _ => Some(candidate),
        })
}

#[derive(Clone)]
pub struct EmotionAdapter {
    classifier: Arc<dyn EmotionClassifier>,
    timeout: Duration,
}

impl EmotionAdapter {
    pub fn new(classifier: Arc<dyn EmotionClassifier>, timeout: Duration) -> Self {
        Self { classifier, timeout }
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    /// Classify a transcript and return its dominant emotion label.
    ///
    /// Fails on empty text, on a classifier error or timeout, and when the
    /// classifier returns no labels.
    pub async fn classify(&self, text: &str) -> Result<String, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::Classification(AdapterError::EmptyInput));
        }

        let scores = tokio::time::timeout(self.timeout, self.classifier.scores(text))
            .await
            .map_err(|_| PipelineError::Timeout(Stage::Classification))?
            .map_err(PipelineError::Classification)?;

        tracing::debug!(labels = scores.len(), "Classifier returned");

        dominant_label(&scores)
            .map(|best| best.label.clone())
            .ok_or(PipelineError::Classification(AdapterError::EmptyScores))
    }
}
