//! Generation collaborator contract.
//!
//! A [`Generator`] takes an ordered list of turns and returns a transcript
//! ending with the newest response. Backends live in [`crate::ollama`] and
//! [`crate::simulation`]; [`MockGenerator`] is a recording stub for tests.

use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Generation errors.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation backend unavailable at {0}")]
    Unavailable(String),

    #[error("Generation backend returned HTTP {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("Generation backend returned an empty transcript")]
    EmptyTranscript,

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type GenerationResult<T> = Result<T, GenerationError>;

/// Speaker of a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// An image attached to a user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    pub fn new(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Read an image file, guessing the media type from its extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let media_type = match extension.as_deref() {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            _ => "application/octet-stream",
        };
        Ok(Self::new(media_type, bytes))
    }
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub images: Vec<ImageAttachment>,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<ImageAttachment>) -> Self {
        self.images = images;
        self
    }
}

/// A request to the generation collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub turns: Vec<Turn>,
    pub max_new_tokens: u32,
}

impl GenerationRequest {
    /// Content of the last user turn.
    pub fn user_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
    }

    /// Number of images across all turns.
    pub fn image_count(&self) -> usize {
        self.turns.iter().map(|t| t.images.len()).sum()
    }
}

/// The external generative model, as seen by the stages.
pub trait Generator {
    /// Run one blocking generation; the returned transcript ends with the response.
    fn generate(&self, request: &GenerationRequest) -> GenerationResult<Vec<Turn>>;
}

impl<G: Generator + ?Sized> Generator for Box<G> {
    fn generate(&self, request: &GenerationRequest) -> GenerationResult<Vec<Turn>> {
        (**self).generate(request)
    }
}

enum MockReply {
    Text(String),
    Unavailable,
    Silent,
}

/// Mock generator for testing: answers with a fixed reply and records every request.
pub struct MockGenerator {
    reply: MockReply,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerator {
    /// Reply with `response` appended to the request turns.
    pub fn new(response: &str) -> Self {
        Self::with_reply(MockReply::Text(response.to_string()))
    }

    /// Fail every call as an unavailable backend.
    pub fn unavailable() -> Self {
        Self::with_reply(MockReply::Unavailable)
    }

    /// Return an empty transcript.
    pub fn silent() -> Self {
        Self::with_reply(MockReply::Silent)
    }

    fn with_reply(reply: MockReply) -> Self {
        Self {
            reply,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl Generator for MockGenerator {
    fn generate(&self, request: &GenerationRequest) -> GenerationResult<Vec<Turn>> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        match &self.reply {
            MockReply::Text(text) => {
                let mut transcript = request.turns.clone();
                transcript.push(Turn::assistant(text.clone()));
                Ok(transcript)
            }
            MockReply::Unavailable => Err(GenerationError::Unavailable("mock".into())),
            MockReply::Silent => Ok(Vec::new()),
        }
    }
}
