//! Prometheus metrics for the agent loop and event relay
//!
//! All metrics live in the default registry; the server renders them at
//! `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, CounterVec, Encoder,
    Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Agent Loop Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Finished runs by terminal state.
    ///
    /// Labels:
    /// - outcome: "success", "exhausted", "no_candidate", "generator_error"
    pub static ref AGENT_RUNS: CounterVec = register_counter_vec!(
        "zerostick_agent_runs_total",
        "Agent runs by terminal outcome",
        &["outcome"]
    ).expect("failed to register AGENT_RUNS metric");

    /// Generator calls made per run.
    pub static ref AGENT_TURNS: Histogram = register_histogram!(
        "zerostick_agent_turns",
        "Turns (generator calls) per agent run",
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 8.0, 13.0]
    ).expect("failed to register AGENT_TURNS metric");

    /// Wall-clock duration of generator calls, by model.
    pub static ref GENERATOR_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "zerostick_generator_call_seconds",
        "Duration of generator (LLM) calls",
        &["model"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).expect("failed to register GENERATOR_CALL_DURATION metric");

    /// Generator calls that failed to communicate.
    pub static ref GENERATOR_ERRORS: CounterVec = register_counter_vec!(
        "zerostick_generator_errors_total",
        "Generator calls that failed",
        &["model"]
    ).expect("failed to register GENERATOR_ERRORS metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Execution Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Candidate executions by result.
    ///
    /// Labels:
    /// - status: "success", "error", "timeout"
    pub static ref CODE_EXECUTIONS: CounterVec = register_counter_vec!(
        "zerostick_code_executions_total",
        "Candidate program executions by result",
        &["status"]
    ).expect("failed to register CODE_EXECUTIONS metric");

    /// Wall-clock duration of candidate executions.
    pub static ref CODE_EXECUTION_DURATION: Histogram = register_histogram!(
        "zerostick_code_execution_seconds",
        "Duration of candidate program executions",
        vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    ).expect("failed to register CODE_EXECUTION_DURATION metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Relay Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Events forwarded to observers, by kind.
    pub static ref EVENTS_RELAYED: CounterVec = register_counter_vec!(
        "zerostick_events_relayed_total",
        "Progress events forwarded to observers",
        &["kind"]
    ).expect("failed to register EVENTS_RELAYED metric");
}

/// Render every registered metric in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_touched_metrics() {
        AGENT_RUNS.with_label_values(&["success"]).inc();
        CODE_EXECUTIONS.with_label_values(&["timeout"]).inc();
        let text = render();
        assert!(text.contains("zerostick_agent_runs_total"));
        assert!(text.contains("zerostick_code_executions_total"));
    }
}
