// Execution Engine Module
// Handles DAG construction, two-phase execution and progress reporting

pub mod events;
pub mod executor;
pub mod graph;

// Re-export key types
pub use events::{
    progress_channel, EventSender, ExecutionEvent, MetricsSink, ProgressReceiver, ProgressSender,
    TracingMetricsSink,
};
pub use executor::{
    ActionResult, ActionStatus, DagExecutor, ExecutorConfig, RunResult, RunStatus,
};
pub use graph::{ActionNode, ExecutionGraph, GraphNode};
