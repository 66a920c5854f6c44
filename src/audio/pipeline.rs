//! # Window Pipeline
//!
//! Runs one flushed window through transcoding, transcription and emotion
//! classification. Built once at startup and shared by every session as an `Arc`,
//! since both collaborators are expensive to set up and stateless per call.

use crate::audio::Window;
use crate::audio::WindowTranscoder;
use crate::emotion::EmotionAdapter;
use crate::error::PipelineError;
use crate::transcription::TranscriptionAdapter;
use serde::{Deserialize, Serialize};
use tracing::info;

/// The only thing a client ever receives: the dominant emotion and the transcript
/// it was derived from.
///
/// Serialized as `{"emotion": "...", "text": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionResult {
    pub emotion: String,
    pub text: String,
}

pub struct WindowPipeline {
    transcoder: WindowTranscoder,
    transcription: TranscriptionAdapter,
    emotion: EmotionAdapter,
}

impl WindowPipeline {
    pub fn new(
        transcoder: WindowTranscoder,
        transcription: TranscriptionAdapter,
        emotion: EmotionAdapter,
    ) -> Self {
        Self {
            transcoder,
            transcription,
            emotion,
        }
    }

    pub fn recognizer_name(&self) -> &str {
        self.transcription.recognizer_name()
    }

    pub fn classifier_name(&self) -> &str {
        self.emotion.classifier_name()
    }

    /// Process one window.
    ///
    /// ## Returns:
    /// - **Ok(Some(result))**: speech was recognized and classified
    /// - **Ok(None)**: no intelligible speech in the window
    /// - **Err(PipelineError)**: a stage failed; the caller logs it and skips the window
    pub async fn process(&self, window: &Window) -> Result<Option<EmotionResult>, PipelineError> {
        let container = self.transcoder.encode(window)?;

        let Some(text) = self.transcription.transcribe(&container).await? else {
            return Ok(None);
        };
        info!(window_bytes = window.len(), "Transcribed: \"{}\"", text);

        let emotion = self.emotion.classify(&text).await?;
        info!(window_bytes = window.len(), emotion = %emotion, "Emotion classified");

        Ok(Some(EmotionResult { emotion, text }))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable collaborators shared by the pipeline and session tests.

    use super::*;
    use crate::audio::AudioContainer;
    use crate::emotion::{EmotionClassifier, EmotionScore};
    use crate::error::AdapterError;
    use crate::transcription::SpeechRecognizer;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// What the fake recognizer does for one window.
    #[derive(Debug, Clone)]
    pub enum Heard {
        Speech(&'static str),
        Silence,
        Fail,
        Panic,
        /// Hangs far longer than any adapter timeout
        Stall,
    }

    /// Replays a queue of outcomes, one per call; silence once exhausted.
    pub struct ScriptedRecognizer {
        script: Mutex<VecDeque<Heard>>,
        pub calls: Mutex<Vec<usize>>,
    }

    impl ScriptedRecognizer {
        pub fn new(script: Vec<Heard>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SpeechRecognizer for ScriptedRecognizer {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn recognize(&self, audio: &AudioContainer) -> Result<Option<String>, AdapterError> {
            self.calls.lock().unwrap().push(audio.sample_count);
            let next = self.script.lock().unwrap().pop_front().unwrap_or(Heard::Silence);
            match next {
                Heard::Speech(text) => Ok(Some(text.to_string())),
                Heard::Silence => Ok(None),
                Heard::Fail => Err(AdapterError::Transport("network unreachable".into())),
                Heard::Panic => panic!("recognizer blew up"),
                Heard::Stall => {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(None)
                }
            }
        }
    }

    /// Scores by keyword: "sad" => sadness, "angry" => anger, "error" fails, else joy.
    pub struct KeywordClassifier;

    #[async_trait]
    impl EmotionClassifier for KeywordClassifier {
        fn name(&self) -> &str {
            "keyword"
        }

        async fn scores(&self, text: &str) -> Result<Vec<EmotionScore>, AdapterError> {
            if text.contains("error") {
                return Err(AdapterError::Status { code: 500, body: "model crashed".into() });
            }
            let (sad, angry) = (text.contains("sad"), text.contains("angry"));
            Ok(vec![
                EmotionScore::new("anger", if angry { 0.9 } else { 0.05 }),
                EmotionScore::new("joy", if sad || angry { 0.05 } else { 0.9 }),
                EmotionScore::new("sadness", if sad { 0.9 } else { 0.05 }),
            ])
        }
    }

    pub fn pipeline(recognizer: Arc<ScriptedRecognizer>) -> WindowPipeline {
        let timeout = Duration::from_secs(1);
        WindowPipeline::new(
            WindowTranscoder::new(48000, 2),
            TranscriptionAdapter::new(recognizer, timeout),
            EmotionAdapter::new(Arc::new(KeywordClassifier), timeout),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::Arc;

    fn window() -> Window {
        Window::from(vec![0u8; 192_002])
    }

    #[tokio::test]
    async fn test_speech_yields_result() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![Heard::Speech("i feel sad today")]));
        let result = pipeline(recognizer.clone()).process(&window()).await.unwrap();

        assert_eq!(
            result,
            Some(EmotionResult { emotion: "sadness".into(), text: "i feel sad today".into() })
        );
        assert_eq!(*recognizer.calls.lock().unwrap(), vec![96_001]);
    }

    #[tokio::test]
    async fn test_silence_yields_nothing() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![Heard::Silence]));
        assert_eq!(pipeline(recognizer).process(&window()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stage_failures_are_reported() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![Heard::Fail, Heard::Speech("error here")]));
        let pipeline = pipeline(recognizer.clone());

        let err = pipeline.process(&window()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transcription);

        let err = pipeline.process(&window()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Classification);
    }

    #[tokio::test]
    async fn test_odd_window_never_reaches_recognizer() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![Heard::Speech("hello")]));
        let err = pipeline(recognizer.clone())
            .process(&Window::from(vec![0u8; 7]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(recognizer.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_result_wire_format() {
        let result = EmotionResult { emotion: "joy".into(), text: "hello".into() };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            serde_json::json!({"emotion": "joy", "text": "hello"})
        );
    }
}
