use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::TranslationService;
use crate::audio::encode_wav_bytes;
use crate::config::TranslateConfig;
use crate::error::{DubError, Result};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize)]
pub struct TextToTextRequest<'a> {
    pub text: &'a str,
    pub src_lang: &'a str,
    pub tgt_lang: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslationResponse {
    pub text: String,
}

/// Client for a translation inference server exposing speech-to-text and
/// text-to-text endpoints
pub struct HttpTranslationService {
    client: Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl HttpTranslationService {
    pub fn new(config: &TranslateConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| DubError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            retry: RetryPolicy::new(
                config.max_attempts,
                Duration::from_millis(config.backoff_base_ms),
                Duration::from_millis(config.backoff_max_ms),
            ),
        })
    }

    async fn read_text(response: reqwest::Response, what: &str) -> Result<String> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, what, &body));
        }
        let parsed: TranslationResponse = response.json().await?;
        Ok(parsed.text.trim().to_string())
    }
}

/// Server-side and throttling failures may clear up; client errors will not.
fn status_error(status: StatusCode, what: &str, body: &str) -> DubError {
    let message = format!("{} returned {}: {}", what, status, body.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT {
        DubError::Transport(message)
    } else {
        DubError::InvalidInput(message)
    }
}

fn transport(e: reqwest::Error) -> DubError {
    DubError::Transport(e.to_string())
}

#[async_trait]
impl TranslationService for HttpTranslationService {
    async fn speech_to_text(
        &self,
        samples: &[f32],
        sample_rate: u32,
        tgt_lang: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let body = encode_wav_bytes(samples, sample_rate)?;
        let url = format!("{}/v1/speech-to-text", self.endpoint);
        debug!("speech-to-text: {} samples -> {}", samples.len(), tgt_lang);

        self.retry
            .run("speech-to-text", cancel, |_| {
                let request = self
                    .client
                    .post(&url)
                    .query(&[("tgt_lang", tgt_lang)])
                    .header("content-type", "audio/wav")
                    .body(body.clone());
                async move {
                    let response = request.send().await.map_err(transport)?;
                    Self::read_text(response, "speech-to-text").await
                }
            })
            .await
    }

    async fn text_to_text(
        &self,
        text: &str,
        src_lang: &str,
        tgt_lang: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let url = format!("{}/v1/text-to-text", self.endpoint);
        let payload = TextToTextRequest { text, src_lang, tgt_lang };

        self.retry
            .run("text-to-text", cancel, |_| {
                let request = self.client.post(&url).json(&payload);
                async move {
                    let response = request.send().await.map_err(transport)?;
                    Self::read_text(response, "text-to-text").await
                }
            })
            .await
    }

    async fn health_check(&self, cancel: &CancellationToken) -> Result<()> {
        let url = format!("{}/health", self.endpoint);
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(DubError::Cancelled("health check cancelled".to_string())),
            response = self.client.get(&url).send() => response.map_err(|e| {
                DubError::Transport(format!("Failed to connect to translation service at {}: {}", self.endpoint, e))
            })?,
        };

        if response.status().is_success() {
            info!("Translation service at {} is available", self.endpoint);
            Ok(())
        } else {
            Err(DubError::Transport(format!(
                "Translation service health check returned {}",
                response.status()
            )))
        }
    }
}
