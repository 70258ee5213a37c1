//! Ollama HTTP backend for the generation contract.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use medflow_core::config::GeneratorSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::generator::{
    GenerationError, GenerationRequest, GenerationResult, Generator, Role, Turn,
};

/// Blocking client for a local or remote Ollama `/api/chat` endpoint.
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    timeout_secs: u64,
    client: reqwest::blocking::Client,
}

impl OllamaGenerator {
    pub fn new(settings: &GeneratorSettings) -> GenerationResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            timeout_secs: settings.timeout_secs,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn send(&self, body: &ChatRequest<'_>) -> GenerationResult<String> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self.client.post(&url).json(body).send().map_err(|e| {
            if e.is_connect() {
                GenerationError::Unavailable(self.base_url.clone())
            } else if e.is_timeout() {
                GenerationError::Transport(format!(
                    "Request timed out after {}s",
                    self.timeout_secs
                ))
            } else {
                GenerationError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| GenerationError::Transport(format!("Unreadable response: {}", e)))?;
        Ok(parsed.message.content)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: Role,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Serialize)]
struct ChatOptions {
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

fn chat_request<'a>(model: &'a str, request: &'a GenerationRequest) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: request
            .turns
            .iter()
            .map(|turn| ChatMessage {
                role: turn.role,
                content: &turn.content,
                images: turn.images.iter().map(|i| STANDARD.encode(&i.bytes)).collect(),
            })
            .collect(),
        stream: false,
        options: ChatOptions {
            num_predict: request.max_new_tokens,
        },
    }
}

impl Generator for OllamaGenerator {
    fn generate(&self, request: &GenerationRequest) -> GenerationResult<Vec<Turn>> {
        debug!(
            turns = request.turns.len(),
            images = request.image_count(),
            "sending chat request"
        );
        let content = self.send(&chat_request(&self.model, request))?;
        info!(model = %self.model, chars = content.len(), "chat response received");

        let mut transcript = request.turns.clone();
        transcript.push(Turn::assistant(content));
        Ok(transcript)
    }
}
