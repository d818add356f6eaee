//! Deterministic stand-ins for the agent's external collaborators.
//!
//! These drive the loop without a running Ollama or real child processes and
//! are used by the crate's unit and integration tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::agent::events::ProgressEvent;
use crate::agent::executor::{ExecutionOutcome, Executor};
use crate::bridge::{EventOutlet, OutletClosed};
use crate::ollama::{ChatError, ChatMessage, Generator};

/// Generator that replays a fixed script of replies.
///
/// Once the script runs out it keeps answering with `fallback` if one was
/// set, otherwise with [`ChatError::EmptyResponse`].
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, ChatError>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<String, ChatError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    /// Answer every call with the same reply
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..Self::default()
        }
    }

    /// Fail every call
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    /// Conversation snapshot passed to each call, in call order
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, _model: &str, messages: &[ChatMessage]) -> Result<String, ChatError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let next = self.replies.lock().ok().and_then(|mut replies| replies.pop_front());
        match next {
            Some(reply) => reply,
            None => self.fallback.clone().ok_or(ChatError::EmptyResponse),
        }
    }
}

/// Executor that replays fixed outcomes instead of spawning processes.
///
/// When the script runs out the last outcome repeats. With `artifact` set,
/// every successful execution drops an empty file of that name into the
/// working directory, the way a real generated program leaves its video.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<ExecutionOutcome>>,
    last: Mutex<Option<ExecutionOutcome>>,
    artifact: Option<String>,
    programs: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new(outcomes: Vec<ExecutionOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }

    /// Always return the same `(stdout, stderr)` pair
    pub fn always(stdout: &str, stderr: &str) -> Self {
        Self::new(vec![ExecutionOutcome::from_streams(stdout, stderr)])
    }

    pub fn with_artifact(mut self, filename: impl Into<String>) -> Self {
        self.artifact = Some(filename.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.programs.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Program texts received, in call order
    pub fn programs(&self) -> Vec<String> {
        self.programs
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn next_outcome(&self) -> ExecutionOutcome {
        let next = self.outcomes.lock().ok().and_then(|mut o| o.pop_front());
        match (next, self.last.lock()) {
            (Some(outcome), Ok(mut last)) => {
                *last = Some(outcome.clone());
                outcome
            }
            (Some(outcome), Err(_)) => outcome,
            (None, Ok(last)) => last.clone().unwrap_or_default(),
            (None, Err(_)) => ExecutionOutcome::default(),
        }
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, program: &str, working_dir: &Path) -> ExecutionOutcome {
        if let Ok(mut programs) = self.programs.lock() {
            programs.push(program.to_string());
        }
        let outcome = self.next_outcome();
        if outcome.is_success() {
            if let Some(name) = &self.artifact {
                if let Err(e) = std::fs::write(working_dir.join(name), b"") {
                    return ExecutionOutcome::from_streams("", format!("Error: {}", e));
                }
            }
        }
        outcome
    }
}

/// Outlet that keeps every relayed event
#[derive(Debug, Default)]
pub struct CollectingOutlet {
    pub events: Vec<ProgressEvent>,
    /// Report the observer gone after this many events
    pub close_after: Option<usize>,
}

impl CollectingOutlet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn closing_after(count: usize) -> Self {
        Self {
            events: Vec::new(),
            close_after: Some(count),
        }
    }
}

#[async_trait]
impl EventOutlet for CollectingOutlet {
    async fn send_event(&mut self, event: &ProgressEvent) -> Result<(), OutletClosed> {
        if self.close_after.is_some_and(|limit| self.events.len() >= limit) {
            return Err(OutletClosed);
        }
        self.events.push(event.clone());
        Ok(())
    }
}
