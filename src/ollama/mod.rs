//! Ollama LLM integration module
//!
//! This module provides the chat client the agent loop uses as its code
//! generator.

pub mod chat;

// Re-export public types from the chat module
pub use chat::{
    ChatClient, ChatError, ChatMessage, ChatResponse, Generator, Role, DEFAULT_OLLAMA_URL,
    DEFAULT_SYSTEM_PROMPT,
};
