//! Event bridge between the agent loop and an asynchronous observer
//!
//! The loop emits events synchronously from the middle of a turn, so its
//! side of the bridge must never wait. The observer side is async and owns
//! the only read end.
//!
//! ```text
//!   worker task                          connection task
//!  ┌──────────────┐   unbounded FIFO    ┌─────────────────┐
//!  │ AgentController ─ emit(ev) ──────► │ relay(outlet)   │ ──► observer
//!  │   .run()     │                     │  until sentinel │
//!  └──────┬───────┘                     └─────────────────┘
//!         └── finish() ── Done ───────────────►┘
//! ```
//!
//! The sentinel is enqueued only after `run` has returned, so once the relay
//! sees it every event of the run has already been forwarded.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, warn};

use crate::agent::events::{EventSink, ProgressEvent};
use crate::agent::{AgentController, RunReport};
use crate::agent::executor::Executor;
use crate::metrics::EVENTS_RELAYED;
use crate::ollama::Generator;

enum BridgeItem {
    Event(ProgressEvent),
    Done,
}

/// Create a connected producer/consumer pair
pub fn event_bridge() -> (BridgeSender, BridgeReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        BridgeSender { tx },
        BridgeReceiver {
            rx,
            complete: false,
        },
    )
}

/// Producer half. Usable as an [`EventSink`] from any thread.
pub struct BridgeSender {
    tx: mpsc::UnboundedSender<BridgeItem>,
}

impl BridgeSender {
    /// Enqueue the sentinel. Consumes the sender so nothing can follow it.
    pub fn finish(self) {
        if self.tx.send(BridgeItem::Done).is_err() {
            debug!("Relay already gone before completion sentinel");
        }
    }
}

impl EventSink for BridgeSender {
    fn emit(&self, event: ProgressEvent) {
        if self.tx.send(BridgeItem::Event(event)).is_err() {
            debug!("Relay already gone, dropping event");
        }
    }
}

/// Where relayed events end up (a WebSocket, a test buffer, ...)
#[async_trait]
pub trait EventOutlet: Send {
    async fn send_event(&mut self, event: &ProgressEvent) -> Result<(), OutletClosed>;
}

/// The observer went away; further sends are pointless
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutletClosed;

impl std::fmt::Display for OutletClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "observer disconnected")
    }
}

impl std::error::Error for OutletClosed {}

/// What the relay did before it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    /// Events handed to the outlet successfully
    pub forwarded: usize,
    /// Events drained after the outlet closed
    pub dropped: usize,
    /// Whether the completion sentinel was observed
    pub completed: bool,
}

/// Consumer half. Owns the only read end of the queue.
pub struct BridgeReceiver {
    rx: mpsc::UnboundedReceiver<BridgeItem>,
    complete: bool,
}

impl BridgeReceiver {
    /// Next event in enqueue order, or `None` once the run is over.
    ///
    /// "Over" means the sentinel arrived, or every sender was dropped without
    /// sending it (the worker died).
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        if self.complete {
            return None;
        }
        match self.rx.recv().await {
            Some(BridgeItem::Event(event)) => Some(event),
            Some(BridgeItem::Done) => {
                self.complete = true;
                None
            }
            None => None,
        }
    }

    /// Forward every event to `outlet` in order until the sentinel.
    ///
    /// If the outlet closes mid-run the relay keeps draining (and discarding)
    /// so it still returns only after the run has finished.
    pub async fn relay<O>(mut self, outlet: &mut O) -> RelaySummary
    where
        O: EventOutlet + ?Sized,
    {
        let mut summary = RelaySummary::default();
        let mut outlet_open = true;

        while let Some(event) = self.recv().await {
            if !outlet_open {
                summary.dropped += 1;
                continue;
            }
            match outlet.send_event(&event).await {
                Ok(()) => {
                    summary.forwarded += 1;
                    EVENTS_RELAYED.with_label_values(&[event.kind()]).inc();
                }
                Err(OutletClosed) => {
                    warn!("Observer disconnected mid-run; draining remaining events");
                    outlet_open = false;
                    summary.dropped += 1;
                }
            }
        }

        summary.completed = self.complete;
        if !summary.completed {
            warn!("Event bridge closed without completion sentinel");
        }
        summary
    }
}

/// Error from driving a bridged run
#[derive(Debug)]
pub enum BridgeError {
    /// The worker task running the loop panicked or was cancelled
    Worker(JoinError),
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::Worker(e) => write!(f, "Agent worker failed: {}", e),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<JoinError> for BridgeError {
    fn from(e: JoinError) -> Self {
        BridgeError::Worker(e)
    }
}

/// Run the agent loop on its own task and relay its events to `outlet`.
///
/// Returns after the sentinel has been relayed and the worker has joined,
/// so anything the caller sends afterwards is strictly ordered after every
/// event of the run.
pub async fn run_bridged<G, E, O>(
    controller: Arc<AgentController<G, E>>,
    request: String,
    outlet: &mut O,
) -> Result<(RunReport, RelaySummary), BridgeError>
where
    G: Generator + 'static,
    E: Executor + 'static,
    O: EventOutlet + ?Sized,
{
    let (tx, rx) = event_bridge();

    let worker = tokio::spawn(async move {
        let report = controller.run(&request, &tx).await;
        tx.finish();
        report
    });

    let summary = rx.relay(outlet).await;
    let report = worker.await?;
    Ok((report, summary))
}
