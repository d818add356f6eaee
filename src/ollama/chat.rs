//! Ollama Chat API client
//!
//! This module provides a client for Ollama's `/api/chat` endpoint and the
//! [`Generator`] seam the agent loop talks to. The loop never sees HTTP; it
//! only sees an ordered list of role-tagged messages going in and assistant
//! text coming out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Default Ollama endpoint when `OLLAMA_HOST` is not set
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Who authored a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a chat conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Response from /api/chat
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub eval_count: u32,
    #[serde(default)]
    pub eval_duration: u64,
}

/// Error type for chat operations
#[derive(Debug)]
pub enum ChatError {
    Request(reqwest::Error),
    Status { code: u16, body: String },
    Parse(serde_json::Error),
    EmptyResponse,
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::Request(e) => write!(f, "Request error: {}", e),
            ChatError::Status { code, body } => write!(f, "HTTP {}: {}", code, body),
            ChatError::Parse(e) => write!(f, "Parse error: {}", e),
            ChatError::EmptyResponse => write!(f, "Empty response from Ollama"),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Request(e)
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Parse(e)
    }
}

/// Anything that can turn a conversation into the next assistant reply.
///
/// A failure here is a communication failure: the agent loop treats it as
/// terminal for the run and never retries it.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ChatError>;
}

/// Client for Ollama's /api/chat endpoint
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a new chat client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a client pointed at `OLLAMA_HOST`, or the local default
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        Self::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a non-streaming chat request
    ///
    /// # Arguments
    /// * `messages` - The conversation history
    /// * `model` - The model name (e.g., "deepseek-r1:14b")
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
    ) -> Result<ChatResponse, ChatError> {
        let endpoint = format!("{}/api/chat", self.base_url);

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
        });

        let response = self.client.post(&endpoint).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ChatError::Status {
                code: status.as_u16(),
                body: text,
            });
        }

        if text.is_empty() {
            return Err(ChatError::EmptyResponse);
        }

        let chat_response: ChatResponse = serde_json::from_str(&text)?;
        Ok(chat_response)
    }
}

#[async_trait]
impl Generator for ChatClient {
    async fn generate(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let response = self.chat(messages, model).await?;
        Ok(response.message.content)
    }
}

/// Default system prompt for the animation agent
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an autonomous Python Animation Agent specialized in procedural stick figure animation.
CORE OBJECTIVE: Translate natural language prompts into complete, executable Python scripts that generate MP4 videos using OpenCV.
TOOLS & LIBRARIES:
1. OpenCV (cv2): Use for all rendering.
    - Canvas: np.zeros((H, W, 3), np.uint8)
    - Drawing: cv2.line, cv2.circle
    - Colors: (B, G, R) tuples.
    - Anti-aliasing: Always use cv2.LINE_AA.
2. Math: Use math.sin, math.cos for periodic motion.
3. Numpy: Use for vector operations.
CONSTRAINTS:
    - Do NOT use external assets (images/sprites). Draw everything via code.
    - OUTPUT FORMAT: You must provide a valid JSON object with keys:
        - "thought": Your reasoning about the physics/math.
        - "code": The complete Python script.
    - COORDINATE SYSTEM: OpenCV (0,0) is TOP-LEFT. Y increases DOWNWARDS.
ERROR HANDLING: If your code fails, analyze the error provided in the user prompt and generate a FIXED version."#;
