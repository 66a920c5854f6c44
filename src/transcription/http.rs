//! HTTP client for a speech recognition endpoint that answers with
//! line-delimited JSON, one object per line:
//!
//! ```text
//! {"result":[]}
//! {"result":[{"alternative":[{"transcript":"hello there","confidence":0.92}],"final":true}],"result_index":0}
//! ```
//!
//! Lines with an empty `result` carry no hypothesis. A body with no hypothesis at all
//! means the service heard no intelligible speech.

use crate::audio::AudioContainer;
use crate::config::ServicesConfig;
use crate::error::AdapterError;
use crate::transcription::SpeechRecognizer;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RecognizeLine {
    #[serde(default)]
    result: Vec<RecognizeResult>,
}

#[derive(Debug, Deserialize)]
struct RecognizeResult {
    #[serde(default)]
    alternative: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    transcript: String,
    #[serde(default)]
    confidence: Option<f32>,
}

pub struct HttpSpeechRecognizer {
    client: reqwest::Client,
    endpoint: String,
    language: String,
    api_key: Option<String>,
}

impl HttpSpeechRecognizer {
    pub fn new(client: reqwest::Client, services: &ServicesConfig) -> Self {
        Self {
            client,
            endpoint: services.speech_endpoint.clone(),
            language: services.speech_language.clone(),
            api_key: Some(services.speech_api_key.clone()).filter(|k| !k.is_empty()),
        }
    }

    fn request_url(&self) -> Result<reqwest::Url, AdapterError> {
        let mut params = vec![
            ("client", "chromium"),
            ("lang", self.language.as_str()),
            ("pFilter", "0"),
        ];
        if let Some(key) = &self.api_key {
            params.push(("key", key.as_str()));
        }

        reqwest::Url::parse_with_params(&self.endpoint, &params)
            .map_err(|e| AdapterError::Transport(format!("invalid speech endpoint: {}", e)))
    }
}

/// Pick the best hypothesis out of a line-delimited response body.
///
/// The first non-empty result wins. Inside it, an alternative that carries a
/// confidence is preferred (the service only scores its top hypothesis),
/// otherwise the first alternative is used.
fn parse_transcript(body: &str) -> Result<Option<String>, AdapterError> {
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let parsed: RecognizeLine =
            serde_json::from_str(line).map_err(|e| AdapterError::Decode(e.to_string()))?;

        let Some(result) = parsed.result.into_iter().find(|r| !r.alternative.is_empty()) else {
            continue;
        };

        let best = result
            .alternative
            .iter()
            .find(|a| a.confidence.is_some())
            .or_else(|| result.alternative.first());

        if let Some(alternative) = best {
            let text = alternative.transcript.trim();
            if !text.is_empty() {
                return Ok(Some(text.to_string()));
            }
        }
    }

    Ok(None)
}

#[async_trait]
impl SpeechRecognizer for HttpSpeechRecognizer {
    fn name(&self) -> &str {
        "http-speech"
    }

    async fn recognize(&self, audio: &AudioContainer) -> Result<Option<String>, AdapterError> {
        let response = self
            .client
            .post(self.request_url()?)
            .header(CONTENT_TYPE, audio.mime_type())
            .body(audio.bytes.clone())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AdapterError::Status { code: status.as_u16(), body });
        }

        parse_transcript(&body)
    }
}
