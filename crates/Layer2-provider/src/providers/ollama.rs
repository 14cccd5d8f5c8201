//! Ollama (local) text generator with NDJSON streaming

use crate::{
    error::ProviderError,
    r#trait::{GenerationRequest, TextGenerator, TokenStream},
};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 600; // Longer timeout for local models

/// Ollama 기반 텍스트 생성기
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    /// Create a new Ollama generator with default settings
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_timeout(base_url, model, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create with a custom request timeout
    pub fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn build_request(&self, request: &GenerationRequest) -> OllamaRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(OllamaMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        OllamaRequest {
            model: self.model.clone(),
            messages,
            stream: true,
        }
    }

    /// Check if Ollama server is reachable
    pub async fn ping(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        self.client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<TokenStream, ProviderError> {
        let body = self.build_request(&request);
        debug!(model = %self.model, "Opening Ollama chat stream");

        let response = self
            .client
            .post(self.chat_url())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_http_status(status, &body));
        }

        // Ollama streams JSON objects separated by newlines (NDJSON)
        let byte_stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let mut reader = BufReader::new(StreamReader::new(byte_stream));

        Ok(Box::pin(async_stream::stream! {
            let mut line_buffer = String::new();

            loop {
                line_buffer.clear();
                match reader.read_line(&mut line_buffer).await {
                    Ok(0) => {
                        yield Err(ProviderError::StreamError(
                            "stream ended before completion".to_string(),
                        ));
                        break;
                    }
                    Ok(_) => match parse_line(&line_buffer) {
                        LineOutcome::Skip => continue,
                        LineOutcome::Token(text) => yield Ok(text),
                        LineOutcome::Done(text) => {
                            if let Some(text) = text {
                                yield Ok(text);
                            }
                            break;
                        }
                        LineOutcome::Error(message) => {
                            yield Err(ProviderError::StreamError(message));
                            break;
                        }
                    },
                    Err(e) => {
                        yield Err(ProviderError::StreamError(format!("Stream read error: {}", e)));
                        break;
                    }
                }
            }
        }))
    }
}

// ============================================================================
// NDJSON
// ============================================================================

#[derive(Debug, PartialEq)]
enum LineOutcome {
    Skip,
    Token(String),
    Done(Option<String>),
    Error(String),
}

fn parse_line(line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Skip;
    }

    match serde_json::from_str::<OllamaStreamChunk>(line) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return LineOutcome::Error(error);
            }
            let text = chunk
                .message
                .map(|m| m.content)
                .filter(|c| !c.is_empty());
            match (chunk.done, text) {
                (true, text) => LineOutcome::Done(text),
                (false, Some(text)) => LineOutcome::Token(text),
                (false, None) => LineOutcome::Skip,
            }
        }
        Err(e) => {
            warn!("Failed to parse Ollama chunk: {} - line: {}", e, line);
            LineOutcome::Skip
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}
