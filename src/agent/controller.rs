//! Agent Controller - the generate → extract → execute → feedback loop
//!
//! The AgentController drives one turn-bounded conversation with the
//! generator, executing each extracted candidate and feeding failures back
//! until a candidate runs cleanly or the turn budget is spent.
//!
//! Every failure is converted to a [`ProgressEvent`] at the point it is
//! detected; nothing escapes `run` as an error.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agent::conversation::Conversation;
use crate::agent::events::{EventSink, ProgressEvent};
use crate::agent::executor::{Executor, ProcessExecutor};
use crate::agent::extract::{Extraction, Extractor};
use crate::metrics::{AGENT_RUNS, AGENT_TURNS, GENERATOR_CALL_DURATION, GENERATOR_ERRORS};
use crate::ollama::{ChatClient, ChatMessage, Generator, DEFAULT_SYSTEM_PROMPT};

/// Configuration for the agent controller
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier passed to the generator (e.g., "deepseek-r1:14b")
    pub model: String,
    /// Hard cap on generator calls per run
    pub max_turns: usize,
    /// Wall-clock limit for a single candidate execution
    pub execution_timeout: Duration,
    /// Directory candidates are written to and run in
    pub working_dir: PathBuf,
    /// Filename each candidate is written to (overwritten every turn)
    pub script_filename: String,
    /// Program used to run the candidate file
    pub interpreter: String,
    /// Fence tag the extractor falls back to (```` ```python ````)
    pub script_language: String,
    /// Custom system prompt (uses default if None)
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-r1:14b".to_string(),
            max_turns: 5,
            execution_timeout: Duration::from_secs(60),
            working_dir: PathBuf::from("."),
            script_filename: "agent_script.py".to_string(),
            interpreter: "python3".to_string(),
            script_language: "python".to_string(),
            system_prompt: None,
        }
    }
}

impl AgentConfig {
    /// Defaults overlaid with `ZEROSTICK_*` environment variables.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(model) = lookup("ZEROSTICK_MODEL") {
            config.model = model;
        }
        if let Some(raw) = lookup("ZEROSTICK_MAX_TURNS") {
            match raw.parse() {
                Ok(turns) => config.max_turns = turns,
                Err(_) => warn!(value = %raw, "Ignoring invalid ZEROSTICK_MAX_TURNS"),
            }
        }
        if let Some(raw) = lookup("ZEROSTICK_TIMEOUT_SECS") {
            match raw.parse() {
                Ok(secs) => config.execution_timeout = Duration::from_secs(secs),
                Err(_) => warn!(value = %raw, "Ignoring invalid ZEROSTICK_TIMEOUT_SECS"),
            }
        }
        if let Some(dir) = lookup("ZEROSTICK_WORKDIR") {
            config.working_dir = PathBuf::from(dir);
        }
        if let Some(interpreter) = lookup("ZEROSTICK_INTERPRETER") {
            config.interpreter = interpreter;
        }
        config
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    /// Executor matching this configuration's interpreter, filename and timeout
    pub fn process_executor(&self) -> ProcessExecutor {
        ProcessExecutor::new(
            self.interpreter.clone(),
            self.script_filename.clone(),
            self.execution_timeout,
        )
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A candidate executed with empty stderr on this turn (0-based)
    Succeeded { turn: usize },
    /// The reply on this turn had no usable program
    NoCandidate { turn: usize },
    /// The generator could not be reached on this turn
    GeneratorFailed { turn: usize },
    /// Every turn in the budget ended in an execution failure
    Exhausted,
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded { .. } => "success",
            RunOutcome::NoCandidate { .. } => "no_candidate",
            RunOutcome::GeneratorFailed { .. } => "generator_error",
            RunOutcome::Exhausted => "exhausted",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded { .. })
    }
}

/// Result of an agent run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Unique ID for this run (UUID v7)
    pub run_id: String,
    /// Number of generator calls made
    pub turns: usize,
    /// Number of candidate executions
    pub executions: usize,
    pub outcome: RunOutcome,
    /// Full history, including malformed replies and feedback
    pub conversation: Vec<ChatMessage>,
}

/// Agent Controller orchestrating the generator and the executor
pub struct AgentController<G = ChatClient, E = ProcessExecutor> {
    generator: G,
    executor: E,
    extractor: Extractor,
    config: AgentConfig,
}

impl AgentController<ChatClient, ProcessExecutor> {
    /// Controller backed by Ollama and local child processes
    pub fn with_ollama(chat_client: ChatClient, config: AgentConfig) -> Self {
        let executor = config.process_executor();
        Self::new(chat_client, executor, config)
    }
}

impl<G, E> AgentController<G, E> {
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

impl<G: Generator, E: Executor> AgentController<G, E> {
    /// Create a new agent controller
    ///
    /// # Arguments
    /// * `generator` - Produces the next assistant reply from the conversation
    /// * `executor` - Runs extracted candidates
    /// * `config` - Turn budget, working directory and friends
    pub fn new(generator: G, executor: E, config: AgentConfig) -> Self {
        let extractor = Extractor::new(&config.script_language);
        Self {
            generator,
            executor,
            extractor,
            config,
        }
    }

    /// Run the agent loop for a single request
    ///
    /// Progress is reported through `sink` in the order it happens. The
    /// returned report is for the caller; observers only ever see events.
    pub async fn run(&self, request: &str, sink: &dyn EventSink) -> RunReport {
        let run_id = Uuid::now_v7().to_string();

        let root_span = info_span!(
            "agent_run",
            run_id = %run_id,
            model = %self.config.model,
            max_turns = self.config.max_turns,
            otel.name = "agent_run"
        );

        async {
            info!(request = %request, "Starting agent run");
            sink.emit(ProgressEvent::status(format!(
                "Starting Agent Loop for request: '{}'",
                request
            )));

            let mut conversation = Conversation::new(self.config.system_prompt(), request);
            let mut turns = 0;
            let mut executions = 0;
            let mut outcome = RunOutcome::Exhausted;

            for turn in 0..self.config.max_turns {
                sink.emit(ProgressEvent::log(format!("--- Turn {} ---", turn + 1)));

                // 1. Inference
                sink.emit(ProgressEvent::status("Thinking..."));
                turns += 1;
                let reply = match self.call_generator(&conversation, turn).await {
                    Ok(reply) => reply,
                    Err(message) => {
                        sink.emit(ProgressEvent::error(message));
                        outcome = RunOutcome::GeneratorFailed { turn };
                        break;
                    }
                };
                conversation.push_assistant(reply.as_str());

                // 2. Parse
                let candidate = match self.extractor.extract(&reply) {
                    Extraction::Candidate(candidate) => candidate,
                    Extraction::NoCandidate => {
                        info!(turn, "No candidate in reply, ending run");
                        sink.emit(ProgressEvent::log(
                            "No code generated. Ending or asking for clarification.",
                        ));
                        outcome = RunOutcome::NoCandidate { turn };
                        break;
                    }
                };
                sink.emit(ProgressEvent::log(format!("Thought: {}", candidate.thought)));

                // 3. Execute
                sink.emit(ProgressEvent::status("Executing code..."));
                let exec_span = info_span!(
                    "code_execution",
                    turn,
                    code_len = candidate.code.len(),
                    otel.name = "code_execution"
                );
                executions += 1;
                let result = self
                    .executor
                    .execute(&candidate.code, &self.config.working_dir)
                    .instrument(exec_span)
                    .await;

                // 4. Feedback
                if result.is_success() {
                    info!(turn, duration_ms = result.duration_ms, "Candidate succeeded");
                    sink.emit(ProgressEvent::status("Execution Successful."));
                    if !result.stdout.is_empty() {
                        sink.emit(ProgressEvent::log(format!("Output: {}", result.stdout)));
                    }
                    outcome = RunOutcome::Succeeded { turn };
                    break;
                }

                warn!(
                    turn,
                    timed_out = result.timed_out,
                    exit_code = ?result.exit_code,
                    "Candidate failed"
                );
                sink.emit(ProgressEvent::error(format!(
                    "Error Detected: {}",
                    result.stderr
                )));
                conversation.push_feedback(&result.stderr);
            }

            AGENT_RUNS.with_label_values(&[outcome.label()]).inc();
            AGENT_TURNS.observe(turns as f64);
            info!(turns, executions, outcome = outcome.label(), "Agent run finished");

            RunReport {
                run_id: run_id.clone(),
                turns,
                executions,
                outcome,
                conversation: conversation.into_messages(),
            }
        }
        .instrument(root_span)
        .await
    }

    /// One generator call; failures come back as the user-facing message.
    async fn call_generator(
        &self,
        conversation: &Conversation,
        turn: usize,
    ) -> Result<String, String> {
        let llm_span = info_span!(
            "generator_call",
            turn,
            messages = conversation.messages().len(),
            otel.name = "generator_call"
        );

        let call_start = Instant::now();
        let result = self
            .generator
            .generate(&self.config.model, conversation.messages())
            .instrument(llm_span)
            .await;
        let call_secs = call_start.elapsed().as_secs_f64();
        GENERATOR_CALL_DURATION
            .with_label_values(&[&self.config.model])
            .observe(call_secs);

        match result {
            Ok(reply) => {
                info!(turn, duration_ms = call_secs * 1000.0, reply_len = reply.len(), "Generator replied");
                Ok(reply)
            }
            Err(e) => {
                warn!(turn, error = %e, "Generator call failed");
                GENERATOR_ERRORS
                    .with_label_values(&[&self.config.model])
                    .inc();
                Err(format!("Error communicating with Ollama: {}", e))
            }
        }
    }
}
