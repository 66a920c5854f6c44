//! # Transcription Adapter
//!
//! Invokes the speech recognizer on one encoded window, bounded by a timeout.

use crate::audio::AudioContainer;
use crate::error::{AdapterError, PipelineError, Stage};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// An external speech-to-text collaborator.
///
/// Implementations are constructed once at startup and shared by every session,
/// so they must be safe to call concurrently and keep no per-call state.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Short name used in logs and the health endpoint.
    fn name(&self) -> &str;

    /// Recognize speech in the container.
    ///
    /// `Ok(None)` is the "no intelligible speech" signal, not an error.
    async fn recognize(&self, audio: &AudioContainer) -> Result<Option<String>, AdapterError>;
}

/// Failure-contained wrapper around a [`SpeechRecognizer`].
#[derive(Clone)]
pub struct TranscriptionAdapter {
    recognizer: Arc<dyn SpeechRecognizer>,
    timeout: Duration,
}

impl TranscriptionAdapter {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, timeout: Duration) -> Self {
        Self { recognizer, timeout }
    }

    pub fn recognizer_name(&self) -> &str {
        self.recognizer.name()
    }

    /// Transcribe one window.
    ///
    /// ## Returns:
    /// - **Ok(Some(text))**: trimmed, non-empty transcript
    /// - **Ok(None)**: no speech (including a blank transcript)
    /// - **Err(PipelineError)**: service failure or timeout
    pub async fn transcribe(&self, audio: &AudioContainer) -> Result<Option<String>, PipelineError> {
        let start_time = Instant::now();

        let outcome = tokio::time::timeout(self.timeout, self.recognizer.recognize(audio))
            .await
            .map_err(|_| PipelineError::Timeout(Stage::Transcription))?
            .map_err(PipelineError::Transcription)?;

        tracing::debug!(
            recognizer = self.recognizer.name(),
            audio_seconds = audio.duration_seconds(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Recognizer returned"
        );

        Ok(outcome
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct Scripted(Result<Option<String>, u16>);

    #[async_trait]
    impl SpeechRecognizer for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn recognize(&self, _audio: &AudioContainer) -> Result<Option<String>, AdapterError> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(code) => Err(AdapterError::Status { code: *code, body: "quota".into() }),
            }
        }
    }

    struct Stalled;

    #[async_trait]
    impl SpeechRecognizer for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn recognize(&self, _audio: &AudioContainer) -> Result<Option<String>, AdapterError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }
    }

    fn container() -> AudioContainer {
        AudioContainer { bytes: vec![0; 44], sample_rate: 48000, sample_count: 0 }
    }

    fn adapter(recognizer: impl SpeechRecognizer + 'static) -> TranscriptionAdapter {
        TranscriptionAdapter::new(Arc::new(recognizer), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_transcript_is_trimmed() {
        let adapter = adapter(Scripted(Ok(Some("  hello world \n".into()))));
        assert_eq!(adapter.transcribe(&container()).await.unwrap(), Some("hello world".into()));
    }

    #[tokio::test]
    async fn test_no_speech_and_blank_text_are_skips() {
        assert_eq!(adapter(Scripted(Ok(None))).transcribe(&container()).await.unwrap(), None);
        assert_eq!(adapter(Scripted(Ok(Some("   ".into())))).transcribe(&container()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_service_error_is_reported() {
        let err = adapter(Scripted(Err(429))).transcribe(&container()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transcription);
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let err = adapter(Stalled).transcribe(&container()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.stage(), Some(Stage::Transcription));
    }
}
