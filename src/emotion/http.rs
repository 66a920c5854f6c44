//! HTTP client for a hosted text-classification model (Hugging Face inference API shape).
//!
//! Request: `{"inputs": "<text>"}`. The response is either a list of
//! `{label, score}` objects or that list nested once more, one entry per input.

use crate::config::ServicesConfig;
use crate::emotion::{EmotionClassifier, EmotionScore};
use crate::error::AdapterError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifyResponse {
    Batched(Vec<Vec<EmotionScore>>),
    Flat(Vec<EmotionScore>),
}

impl ClassifyResponse {
    fn into_scores(self) -> Vec<EmotionScore> {
        match self {
            ClassifyResponse::Batched(mut batch) => {
                if batch.is_empty() {
                    Vec::new()
                } else {
                    batch.swap_remove(0)
                }
            }
            ClassifyResponse::Flat(scores) => scores,
        }
    }
}

pub struct HttpEmotionClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
}

impl HttpEmotionClassifier {
    pub fn new(client: reqwest::Client, services: &ServicesConfig) -> Self {
        Self {
            client,
            endpoint: services.emotion_endpoint.clone(),
            api_token: Some(services.emotion_api_token.clone()).filter(|t| !t.is_empty()),
        }
    }
}

#[async_trait]
impl EmotionClassifier for HttpEmotionClassifier {
    fn name(&self) -> &str {
        "http-emotion"
    }

    async fn scores(&self, text: &str) -> Result<Vec<EmotionScore>, AdapterError> {
        let mut request = self.client.post(&self.endpoint).json(&json!({
            "inputs": text,
            "options": { "wait_for_model": true }
        }));

        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Status { code: status.as_u16(), body });
        }

        let parsed: ClassifyResponse = response.json().await?;
        Ok(parsed.into_scores())
    }
}
