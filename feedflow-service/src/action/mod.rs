// Actions
// DAG nodes with a two-phase (init, exec) contract

pub mod common;
pub mod multi;
pub mod single;
pub mod transformer;

pub use common::{select_main, ActionSettings, MainCandidate};
pub use multi::MultiDataFrameAction;
pub use single::DataFrameAction;
pub use transformer::{
    MultiTransform, SingleTransform, TransformContext, Transformer, TransformerRegistry,
};

use crate::error::ActionError;
use crate::execution::events::{MetricsSink, ProgressSender, TracingMetricsSink};
use crate::outcome::Outcome;
use crate::subfeed::SubFeed;

use std::fmt;
use std::sync::Arc;

/// Lifecycle of an action within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Created,
    Initialized,
    Executed,
    PostExecuted,
    /// Nothing to process in this run
    Skipped,
    Failed,
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Executed => "executed",
            Self::PostExecuted => "post_executed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Run-scoped services handed to every action call
#[derive(Clone)]
pub struct ActionContext {
    pub metrics: Arc<dyn MetricsSink>,
    pub events: Option<ProgressSender>,
}

impl Default for ActionContext {
    fn default() -> Self {
        Self {
            metrics: Arc::new(TracingMetricsSink),
            events: None,
        }
    }
}

impl ActionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_events(mut self, events: ProgressSender) -> Self {
        self.events = Some(events);
        self
    }
}

/// One DAG node.
///
/// `init` and `exec` receive exactly one feed per declared input and return
/// exactly one feed per declared output. `Outcome::Skip` means there was no
/// data to process; its fallback still holds one (empty) feed per output.
#[async_trait::async_trait]
pub trait Action: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn input_ids(&self) -> &[String];

    fn output_ids(&self) -> &[String];

    fn state(&self) -> ActionState;

    /// Dry run: validate shapes and decide what to process without writing
    async fn init(
        &self,
        ctx: &ActionContext,
        inputs: Vec<SubFeed>,
    ) -> Result<Outcome<Vec<SubFeed>>, ActionError>;

    /// Repeat the init pipeline, then write every output
    async fn exec(
        &self,
        ctx: &ActionContext,
        inputs: Vec<SubFeed>,
    ) -> Result<Outcome<Vec<SubFeed>>, ActionError>;

    /// Bookkeeping after a successful exec
    async fn post_exec(&self, _inputs: &[SubFeed], _outputs: &[SubFeed]) -> Result<(), ActionError> {
        Ok(())
    }
}
