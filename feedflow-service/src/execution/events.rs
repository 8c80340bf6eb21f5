// Execution Events
// Progress reporting, event types and the per-write metrics sink

use crate::data_object::{ExecutionPhase, Metrics};
use crate::execution::executor::{ActionStatus, RunStatus};

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during a pipeline run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Run started
    RunStarted {
        pipeline_name: String,
        total_actions: usize,
    },

    /// Run completed
    RunCompleted {
        pipeline_name: String,
        status: RunStatus,
        duration: Duration,
    },

    /// Init or exec traversal started
    PhaseStarted { phase: ExecutionPhase },

    /// Init or exec traversal completed
    PhaseCompleted {
        phase: ExecutionPhase,
        duration: Duration,
    },

    /// Action started one of its phases
    ActionStarted {
        action_id: String,
        phase: ExecutionPhase,
    },

    /// Action finished one of its phases
    ActionCompleted {
        action_id: String,
        phase: ExecutionPhase,
        status: ActionStatus,
        duration: Duration,
    },

    /// Action will not run because an upstream action failed
    ActionCancelled { action_id: String, reason: String },

    /// An output was written
    WriteCompleted {
        action_id: String,
        data_object_id: String,
        duration: Duration,
        metrics: Metrics,
    },

    /// An output had no data and nothing was written
    NoDataFound {
        action_id: String,
        data_object_id: String,
    },
}

impl ExecutionEvent {
    /// Create a run started event
    pub fn run_started(name: impl Into<String>, total_actions: usize) -> Self {
        Self::RunStarted {
            pipeline_name: name.into(),
            total_actions,
        }
    }

    /// Create a run completed event
    pub fn run_completed(name: impl Into<String>, status: RunStatus, duration: Duration) -> Self {
        Self::RunCompleted {
            pipeline_name: name.into(),
            status,
            duration,
        }
    }

    pub fn action_started(action_id: impl Into<String>, phase: ExecutionPhase) -> Self {
        Self::ActionStarted {
            action_id: action_id.into(),
            phase,
        }
    }

    pub fn action_completed(
        action_id: impl Into<String>,
        phase: ExecutionPhase,
        status: ActionStatus,
        duration: Duration,
    ) -> Self {
        Self::ActionCompleted {
            action_id: action_id.into(),
            phase,
            status,
            duration,
        }
    }

    pub fn action_cancelled(action_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ActionCancelled {
            action_id: action_id.into(),
            reason: reason.into(),
        }
    }

    pub fn no_data_found(action_id: impl Into<String>, data_object_id: impl Into<String>) -> Self {
        Self::NoDataFound {
            action_id: action_id.into(),
            data_object_id: data_object_id.into(),
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

/// Receives timing and metrics for every completed write.
///
/// Recording never fails from the caller's point of view.
pub trait MetricsSink: Send + Sync {
    fn record(&self, action_id: &str, data_object_id: &str, duration: Duration, metrics: &Metrics);
}

impl MetricsSink for ProgressSender {
    fn record(&self, action_id: &str, data_object_id: &str, duration: Duration, metrics: &Metrics) {
        self.send_event(ExecutionEvent::WriteCompleted {
            action_id: action_id.to_string(),
            data_object_id: data_object_id.to_string(),
            duration,
            metrics: metrics.clone(),
        });
    }
}

/// Logs write metrics through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record(&self, action_id: &str, data_object_id: &str, duration: Duration, metrics: &Metrics) {
        let metrics = serde_json::to_string(metrics).unwrap_or_default();
        tracing::info!(
            action = action_id,
            data_object = data_object_id,
            duration_ms = duration.as_millis() as u64,
            %metrics,
            "Write metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_channel() {
        let (tx, mut rx) = progress_channel();

        tx.send_event(ExecutionEvent::run_started("sales", 2));
        tx.send_event(ExecutionEvent::PhaseStarted {
            phase: ExecutionPhase::Init,
        });

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(event1, ExecutionEvent::RunStarted { .. }));

        let event2 = rx.recv().await.unwrap();
        assert!(matches!(
            event2,
            ExecutionEvent::PhaseStarted {
                phase: ExecutionPhase::Init
            }
        ));
    }

    #[tokio::test]
    async fn test_progress_sender_records_writes() {
        let (tx, mut rx) = progress_channel();
        let mut metrics = Metrics::new();
        metrics.insert("rows_written".to_string(), 3.into());

        tx.record("copy", "tgt", Duration::from_millis(12), &metrics);

        if let Some(ExecutionEvent::WriteCompleted {
            action_id,
            data_object_id,
            duration,
            metrics,
        }) = rx.recv().await
        {
            assert_eq!(action_id, "copy");
            assert_eq!(data_object_id, "tgt");
            assert_eq!(duration, Duration::from_millis(12));
            assert_eq!(metrics.get("rows_written"), Some(&serde_json::json!(3)));
        } else {
            panic!("wrong event type");
        }
    }

    #[test]
    fn test_closed_channel_does_not_affect_sink() {
        let (tx, rx) = progress_channel();
        drop(rx);
        // Should not panic
        tx.record("copy", "tgt", Duration::ZERO, &Metrics::new());
        TracingMetricsSink.record("copy", "tgt", Duration::ZERO, &Metrics::new());
    }

    #[test]
    fn test_optional_sender() {
        let sender: Option<ProgressSender> = None;
        // Should not panic
        sender.send_event(ExecutionEvent::no_data_found("copy", "tgt"));
    }
}
