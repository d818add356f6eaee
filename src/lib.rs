//! ZeroStick - a self-correcting agent that writes and runs animation programs
//!
//! A local Ollama model is asked for a program that renders a stickman
//! animation. The program is run; any stderr goes back to the model as
//! feedback, and the loop repeats until a candidate runs cleanly or the turn
//! budget is spent. Progress is streamed as events, either to the console or
//! to a WebSocket observer.
//!
//! # Modules
//!
//! - `agent` - the generate → extract → execute → feedback loop
//! - `ollama` - chat client used as the program generator
//! - `bridge` - ordered hand-off of events from a running loop to an async observer
//! - `server` - WebSocket front end, artifact serving and `/metrics`
//! - `artifacts` - discovery of the newest media file a run produced
//! - `media` - `piper` / `ffmpeg` wrappers for narration and muxing
//! - `metrics` - Prometheus metrics for observability
//! - `testing` - scripted generator/executor fakes (`--features testing`)
//!
//! # Quick Start
//!
//! ```ignore
//! use zerostick::{AgentConfig, AgentController, ChatClient, ConsoleSink};
//!
//! let controller = AgentController::with_ollama(ChatClient::from_env(), AgentConfig::default());
//! let report = controller.run("Make a stickman jump", &ConsoleSink).await;
//! println!("{}", report.outcome.label());
//! ```

pub mod agent;
pub mod artifacts;
pub mod bridge;
pub mod media;
pub mod metrics;
pub mod ollama;
pub mod server;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentConfig, AgentController, ConsoleSink, EventSink, ProgressEvent, RunOutcome, RunReport};
pub use bridge::{run_bridged, EventOutlet};
pub use ollama::{ChatClient, Generator};
pub use server::{AppState, ServerConfig};
