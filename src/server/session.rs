//! Per-connection handling for the WebSocket front end
//!
//! A connection handles inbound frames one at a time, so at most one run is
//! in flight per connection. The shared run lock additionally serializes runs
//! across connections, because they all write into the same working
//! directory and artifact discovery picks "the newest file".

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::AppState;
use crate::agent::{Executor, ProgressEvent};
use crate::artifacts::{artifact_url, latest_artifact};
use crate::bridge::{run_bridged, EventOutlet, OutletClosed};
use crate::ollama::Generator;

/// Messages accepted from the observer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    Prompt { content: String },
}

/// Sends events as JSON text frames
struct WsOutlet {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl EventOutlet for WsOutlet {
    async fn send_event(&mut self, event: &ProgressEvent) -> Result<(), OutletClosed> {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize event");
                return Ok(());
            }
        };
        self.sink
            .send(Message::Text(json))
            .await
            .map_err(|_| OutletClosed)
    }
}

/// Drive one WebSocket connection until the client goes away.
pub(crate) async fn run_connection<G, E>(socket: WebSocket, state: Arc<AppState<G, E>>)
where
    G: Generator + 'static,
    E: Executor + 'static,
{
    let (sink, mut receiver) = socket.split();
    let mut outlet = WsOutlet { sink };
    info!("Client connected");

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if handle_text(&text, &state, &mut outlet).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            // Pings are answered by axum; binary frames are not part of the protocol.
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "WebSocket receive failed");
                break;
            }
        }
    }

    let _ = outlet.sink.send(Message::Close(None)).await;
    info!("Client disconnected");
}

/// Handle one inbound text frame.
///
/// Returns `Err` only when the observer is gone; every other problem is
/// reported to the observer as an `error` event and the connection stays open.
pub async fn handle_text<G, E, O>(
    text: &str,
    state: &AppState<G, E>,
    outlet: &mut O,
) -> Result<(), OutletClosed>
where
    G: Generator + 'static,
    E: Executor + 'static,
    O: EventOutlet + ?Sized,
{
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => return outlet.send_event(&ProgressEvent::error("Invalid JSON")).await,
    };

    if !value.is_object() {
        return outlet
            .send_event(&ProgressEvent::error(
                "Server Error: message must be a JSON object",
            ))
            .await;
    }

    if value.get("type").and_then(|t| t.as_str()) != Some("prompt") {
        debug!("Ignoring non-prompt message");
        return Ok(());
    }

    match serde_json::from_value::<InboundMessage>(value) {
        Ok(InboundMessage::Prompt { content }) => handle_prompt(content, state, outlet).await,
        Err(e) => {
            outlet
                .send_event(&ProgressEvent::error(format!("Server Error: {}", e)))
                .await
        }
    }
}

async fn handle_prompt<G, E, O>(
    prompt: String,
    state: &AppState<G, E>,
    outlet: &mut O,
) -> Result<(), OutletClosed>
where
    G: Generator + 'static,
    E: Executor + 'static,
    O: EventOutlet + ?Sized,
{
    let _run_guard = state.run_lock.lock().await;

    outlet
        .send_event(&ProgressEvent::status("Agent started..."))
        .await?;

    match run_bridged(state.controller.clone(), prompt, outlet).await {
        Ok((report, summary)) => {
            info!(
                run_id = %report.run_id,
                outcome = report.outcome.label(),
                forwarded = summary.forwarded,
                dropped = summary.dropped,
                "Run relayed"
            );
            if summary.dropped > 0 {
                return Err(OutletClosed);
            }
        }
        Err(e) => {
            warn!(error = %e, "Bridged run failed");
            outlet
                .send_event(&ProgressEvent::error(format!("Server Error: {}", e)))
                .await?;
        }
    }

    announce_artifact(state, outlet).await
}

/// Tell the observer which video the run produced, if any.
async fn announce_artifact<G, E, O>(state: &AppState<G, E>, outlet: &mut O) -> Result<(), OutletClosed>
where
    O: EventOutlet + ?Sized,
{
    let working_dir = &state.controller.config().working_dir;

    let found = latest_artifact(working_dir, &state.config.artifact_extension)
        .map(|path| path.and_then(|p| artifact_url(&state.config.public_url, &p).map(|url| (p, url))));

    match found {
        Ok(Some((path, url))) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            outlet.send_event(&ProgressEvent::video(url)).await?;
            outlet
                .send_event(&ProgressEvent::status(format!("Video created: {}", name)))
                .await
        }
        Ok(None) => {
            outlet
                .send_event(&ProgressEvent::status("No video found."))
                .await
        }
        Err(e) => {
            outlet
                .send_event(&ProgressEvent::error(format!("Server Error: {}", e)))
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentConfig, AgentController};
    use crate::server::ServerConfig;
    use crate::testing::{CollectingOutlet, ScriptedExecutor, ScriptedGenerator};

    fn state_in(
        dir: &std::path::Path,
        generator: ScriptedGenerator,
        executor: ScriptedExecutor,
    ) -> AppState<ScriptedGenerator, ScriptedExecutor> {
        let config = AgentConfig {
            working_dir: dir.to_path_buf(),
            ..AgentConfig::default()
        };
        AppState::new(
            AgentController::new(generator, executor, config),
            ServerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_invalid_json_reports_error_and_keeps_going() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path(), ScriptedGenerator::failing(), ScriptedExecutor::default());
        let mut outlet = CollectingOutlet::new();

        let result = handle_text("{not json", &state, &mut outlet).await;

        assert!(result.is_ok());
        assert_eq!(outlet.events, vec![ProgressEvent::error("Invalid JSON")]);
    }

    #[tokio::test]
    async fn test_non_prompt_message_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ScriptedGenerator::failing();
        let state = state_in(dir.path(), generator, ScriptedExecutor::default());
        let mut outlet = CollectingOutlet::new();

        handle_text(r#"{"type": "ping"}"#, &state, &mut outlet)
            .await
            .unwrap();

        assert!(outlet.events.is_empty());
    }

    #[tokio::test]
    async fn test_non_object_json_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path(), ScriptedGenerator::failing(), ScriptedExecutor::default());

        for frame in ["[1]", r#""prompt""#, "42"] {
            let mut outlet = CollectingOutlet::new();
            handle_text(frame, &state, &mut outlet).await.unwrap();
            assert_eq!(
                outlet.events,
                vec![ProgressEvent::error("Server Error: message must be a JSON object")]
            );
        }
    }

    #[tokio::test]
    async fn test_prompt_without_content_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path(), ScriptedGenerator::failing(), ScriptedExecutor::default());
        let mut outlet = CollectingOutlet::new();

        handle_text(r#"{"type": "prompt"}"#, &state, &mut outlet)
            .await
            .unwrap();

        assert_eq!(outlet.events.len(), 1);
        assert!(outlet.events[0].payload().starts_with("Server Error:"));
    }

    #[tokio::test]
    async fn test_successful_run_announces_video_last() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ScriptedGenerator::repeating(r#"{"thought": "t", "code": "print('ok')"}"#);
        let executor = ScriptedExecutor::always("ok\n", "").with_artifact("circle.mp4");
        let state = state_in(dir.path(), generator, executor);
        let mut outlet = CollectingOutlet::new();

        handle_text(
            r#"{"type": "prompt", "content": "draw a circle"}"#,
            &state,
            &mut outlet,
        )
        .await
        .unwrap();

        let events = &outlet.events;
        assert_eq!(events[0], ProgressEvent::status("Agent started..."));
        let n = events.len();
        assert_eq!(
            events[n - 2],
            ProgressEvent::video("http://localhost:8000/videos/circle.mp4")
        );
        assert_eq!(events[n - 1], ProgressEvent::status("Video created: circle.mp4"));
        assert!(events.contains(&ProgressEvent::status("Execution Successful.")));
        let success_at = events
            .iter()
            .position(|e| *e == ProgressEvent::status("Execution Successful."))
            .unwrap();
        assert!(success_at < n - 2);
    }

    #[tokio::test]
    async fn test_run_without_artifact_reports_none_found() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ScriptedGenerator::repeating("I need more details first.");
        let state = state_in(dir.path(), generator, ScriptedExecutor::default());
        let mut outlet = CollectingOutlet::new();

        handle_text(r#"{"type": "prompt", "content": "?"}"#, &state, &mut outlet)
            .await
            .unwrap();

        assert_eq!(
            outlet.events.last(),
            Some(&ProgressEvent::status("No video found."))
        );
        assert!(!outlet
            .events
            .iter()
            .any(|e| matches!(e, ProgressEvent::Video { .. })));
    }

    #[tokio::test]
    async fn test_disconnect_mid_run_reports_closed() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ScriptedGenerator::repeating(r#"{"code": "boom()"}"#);
        let executor = ScriptedExecutor::always("", "NameError: boom");
        let state = state_in(dir.path(), generator, executor);
        let mut outlet = CollectingOutlet::closing_after(3);

        let result = handle_text(r#"{"type": "prompt", "content": "x"}"#, &state, &mut outlet).await;

        assert_eq!(result, Err(OutletClosed));
        assert_eq!(outlet.events.len(), 3);
    }
}
