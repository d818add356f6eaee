//! Agent module for LLM-driven program generation
//!
//! This module provides the turn-bounded retry loop that orchestrates:
//! - Ollama chat as the program generator
//! - Candidate extraction from free-form replies
//! - Time-bounded local execution of each candidate
//!
//! # Architecture
//!
//! ```text
//! User Request → AgentController → Generator (Ollama /api/chat)
//!                      ↓
//!               Extractor: {json} → ```python → NoCandidate
//!                      ↓
//!               ProcessExecutor: write agent_script.py, run with timeout
//!                      ↓
//!               stderr empty? ── yes → success, stop
//!                      │ no
//!                      ↓
//!               "Your code failed with this error: ..." → next turn
//! ```

pub mod controller;
pub mod conversation;
pub mod events;
pub mod executor;
pub mod extract;

pub use controller::{AgentConfig, AgentController, RunOutcome, RunReport};
pub use conversation::Conversation;
pub use events::{ConsoleSink, EventSink, ProgressEvent, RecordingSink};
pub use executor::{ExecutionOutcome, Executor, ProcessExecutor};
pub use extract::{Candidate, Extraction, Extractor};
