// DAG Executor
// Runs init for the whole graph, then exec, routing SubFeeds between actions

use crate::action::{Action, ActionContext};
use crate::data_object::ExecutionPhase;
use crate::error::{ActionError, ConfigError};
use crate::execution::events::{
    EventSender, ExecutionEvent, MetricsSink, ProgressSender, TracingMetricsSink,
};
use crate::execution::graph::{ActionNode, ExecutionGraph};
use crate::outcome::Outcome;
use crate::subfeed::{InitSubFeed, SubFeed, SubFeedOps};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Final status of one action in a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionStatus {
    Succeeded,
    /// The execution mode found nothing to process
    NoData,
    Failed(String),
    /// Not run because an upstream action failed
    Cancelled(String),
}

impl ActionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::NoData)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::NoData => write!(f, "no data"),
            Self::Failed(message) => write!(f, "failed: {}", message),
            Self::Cancelled(reason) => write!(f, "cancelled: {}", reason),
        }
    }
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    /// Some branches failed, others completed
    PartialFailure,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Succeeded => "succeeded",
            Self::PartialFailure => "partial failure",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Result of one action over both phases
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub action_id: String,
    pub status: ActionStatus,
    /// Init plus exec time
    pub duration: Duration,
    /// Feeds returned by exec
    pub outputs: Vec<SubFeed>,
}

/// Result of a pipeline run
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Per-action results in topological order
    pub actions: Vec<ActionResult>,
    pub status: RunStatus,
    pub duration: Duration,
}

impl RunResult {
    pub fn action(&self, id: &str) -> Option<&ActionResult> {
        self.actions.iter().find(|a| a.action_id == id)
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn failed_actions(&self) -> Vec<&ActionResult> {
        self.actions
            .iter()
            .filter(|a| !a.status.is_success())
            .collect()
    }
}

/// Configuration for pipeline execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum actions running at once (0 = unlimited)
    pub parallelism: usize,
    /// Whether independent branches keep running after a failure
    pub continue_on_error: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallelism: 1,
            continue_on_error: true,
        }
    }
}

/// Two-phase executor over an action graph
pub struct DagExecutor {
    name: String,
    graph: ExecutionGraph<Arc<dyn Action>>,
    config: ExecutorConfig,
    event_tx: Option<ProgressSender>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl fmt::Debug for DagExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DagExecutor")
            .field("name", &self.name)
            .field("actions", &self.graph.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Outcome of one action in one phase, as reported by its worker task
struct NodeRun {
    action_id: String,
    result: Result<Outcome<Vec<SubFeed>>, ActionError>,
    duration: Duration,
}

/// Per-action bookkeeping carried across both phases
#[derive(Default)]
struct RunState {
    /// Actions that failed or were cancelled; they take no further part
    terminal: HashMap<String, ActionStatus>,
    /// Latest phase status for the others
    statuses: HashMap<String, ActionStatus>,
    durations: HashMap<String, Duration>,
    outputs: HashMap<String, Vec<SubFeed>>,
}

impl DagExecutor {
    /// Build the graph for `actions`; fails before anything runs if the
    /// actions form a cycle or two actions write the same data object.
    pub fn new(name: impl Into<String>, actions: Vec<Arc<dyn Action>>) -> Result<Self, ConfigError> {
        Ok(Self::from_graph(name, ExecutionGraph::from_actions(actions)?))
    }

    pub fn from_graph(name: impl Into<String>, graph: ExecutionGraph<Arc<dyn Action>>) -> Self {
        Self {
            name: name.into(),
            graph,
            config: ExecutorConfig::default(),
            event_tx: None,
            metrics: None,
        }
    }

    /// Set executor configuration
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Set the sink receiving per-write metrics. Defaults to the progress
    /// channel when one is set, else to the tracing log.
    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn graph(&self) -> &ExecutionGraph<Arc<dyn Action>> {
        &self.graph
    }

    fn action_context(&self) -> ActionContext {
        let metrics: Arc<dyn MetricsSink> = match (&self.metrics, &self.event_tx) {
            (Some(sink), _) => sink.clone(),
            (None, Some(tx)) => Arc::new(tx.clone()),
            (None, None) => Arc::new(TracingMetricsSink),
        };
        let ctx = ActionContext::new().with_metrics(metrics);
        match &self.event_tx {
            Some(tx) => ctx.with_events(tx.clone()),
            None => ctx,
        }
    }

    /// Run init over the whole graph, then exec in the same order
    pub async fn run(&self) -> RunResult {
        let start = Instant::now();
        let ctx = self.action_context();
        let levels = self.graph.parallel_levels();
        let mut state = RunState::default();

        tracing::info!(
            pipeline = %self.name,
            actions = self.graph.len(),
            levels = levels.len(),
            "Starting pipeline run"
        );
        self.event_tx
            .send_event(ExecutionEvent::run_started(&self.name, self.graph.len()));

        for phase in [ExecutionPhase::Init, ExecutionPhase::Exec] {
            let phase_start = Instant::now();
            self.event_tx
                .send_event(ExecutionEvent::PhaseStarted { phase });

            let mut routing = self.seed_routing();
            for level in &levels {
                self.run_level(level, phase, &ctx, &mut routing, &mut state)
                    .await;
            }

            self.event_tx.send_event(ExecutionEvent::PhaseCompleted {
                phase,
                duration: phase_start.elapsed(),
            });
        }

        let actions: Vec<ActionResult> = self
            .graph
            .topological_order()
            .into_iter()
            .map(|node| {
                let id = node.id();
                let status = state
                    .terminal
                    .get(id)
                    .or_else(|| state.statuses.get(id))
                    .cloned()
                    .unwrap_or(ActionStatus::Succeeded);
                ActionResult {
                    action_id: id.to_string(),
                    status,
                    duration: state.durations.get(id).copied().unwrap_or_default(),
                    outputs: state.outputs.remove(id).unwrap_or_default(),
                }
            })
            .collect();

        let status = run_status(&actions);
        let duration = start.elapsed();

        tracing::info!(
            pipeline = %self.name,
            %status,
            duration_ms = duration.as_millis() as u64,
            "Pipeline run completed"
        );
        self.event_tx
            .send_event(ExecutionEvent::run_completed(&self.name, status, duration));

        RunResult {
            actions,
            status,
            duration,
        }
    }

    /// Start feeds for every input no action produces
    fn seed_routing(&self) -> HashMap<String, SubFeed> {
        let mut routing = HashMap::new();
        for node in &self.graph.nodes {
            for input in &node.start_inputs {
                routing
                    .entry(input.clone())
                    .or_insert_with(|| SubFeed::Init(InitSubFeed::new(input.clone())));
            }
        }
        routing
    }

    /// Run every action of one level, bounded by the configured parallelism
    async fn run_level(
        &self,
        level: &[&ActionNode<Arc<dyn Action>>],
        phase: ExecutionPhase,
        ctx: &ActionContext,
        routing: &mut HashMap<String, SubFeed>,
        state: &mut RunState,
    ) {
        let semaphore = match self.config.parallelism {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        let mut join_set: JoinSet<NodeRun> = JoinSet::new();
        let mut spawned: Vec<&str> = Vec::new();

        for node in level {
            let id = node.id();
            if state.terminal.contains_key(id) {
                continue;
            }

            let inputs = match collect_inputs(&node.action, routing) {
                Ok(inputs) => inputs,
                Err(missing) => {
                    let reason = format!("no feed available for input '{}'", missing);
                    self.cancel(id, reason, state);
                    continue;
                }
            };

            self.event_tx
                .send_event(ExecutionEvent::action_started(id, phase));
            tracing::debug!(action = id, %phase, "Starting action");

            let action = node.action.clone();
            let ctx = ctx.clone();
            let semaphore = semaphore.clone();
            spawned.push(id);

            join_set.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                let start = Instant::now();
                let result = run_action(action.as_ref(), &ctx, phase, inputs).await;
                NodeRun {
                    action_id: action.id().to_string(),
                    result,
                    duration: start.elapsed(),
                }
            });
        }

        let mut runs: HashMap<String, NodeRun> = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(run) => {
                    runs.insert(run.action_id.clone(), run);
                }
                Err(e) => tracing::error!(%phase, error = %e, "Action task aborted"),
            }
        }

        // Handle results in level order so routing and events are deterministic
        let mut first_failure: Option<&str> = None;
        for id in spawned {
            let Some(run) = runs.remove(id) else {
                self.fail(id, phase, "action task panicked".to_string(), state);
                first_failure.get_or_insert(id);
                continue;
            };
            *state.durations.entry(id.to_string()).or_default() += run.duration;

            let checked = run.result.and_then(|outcome| {
                self.check_outputs(id, &outcome)?;
                Ok(outcome)
            });

            match checked {
                Ok(outcome) => {
                    let status = if outcome.is_skip() {
                        ActionStatus::NoData
                    } else {
                        ActionStatus::Succeeded
                    };
                    tracing::info!(
                        action = id,
                        %phase,
                        %status,
                        duration_ms = run.duration.as_millis() as u64,
                        "Action completed"
                    );
                    self.event_tx.send_event(ExecutionEvent::action_completed(
                        id,
                        phase,
                        status.clone(),
                        run.duration,
                    ));

                    let outputs = outcome.into_value();
                    for feed in &outputs {
                        routing.insert(feed.data_object_id().to_string(), feed.clone());
                    }
                    state.statuses.insert(id.to_string(), status);
                    if phase == ExecutionPhase::Exec {
                        state.outputs.insert(id.to_string(), outputs);
                    }
                }
                Err(e) => {
                    let inputs = self
                        .graph
                        .get(id)
                        .map(|node| node.action.input_ids().join(", "))
                        .unwrap_or_default();
                    tracing::error!(
                        action = id,
                        inputs = %inputs,
                        %phase,
                        error = %e,
                        "Action failed"
                    );
                    self.event_tx.send_event(ExecutionEvent::action_completed(
                        id,
                        phase,
                        ActionStatus::Failed(e.to_string()),
                        run.duration,
                    ));
                    self.fail(id, phase, e.to_string(), state);
                    first_failure.get_or_insert(id);
                }
            }
        }

        if let Some(failed) = first_failure {
            if !self.config.continue_on_error {
                self.abort_remaining(failed, phase, state);
            }
        }
    }

    /// The engine's own check that an action honoured its output contract
    fn check_outputs(&self, id: &str, outcome: &Outcome<Vec<SubFeed>>) -> Result<(), ActionError> {
        let Some(node) = self.graph.get(id) else {
            return Ok(());
        };
        let declared = node.action.output_ids();
        let outputs = outcome.value();

        if outputs.len() != declared.len() {
            return Err(ConfigError::feed_count(id, "output", declared.len(), outputs.len()).into());
        }
        let mut seen = HashSet::new();
        for feed in outputs {
            let feed_id = feed.data_object_id();
            if !declared.iter().any(|d| d == feed_id) || !seen.insert(feed_id) {
                return Err(ConfigError::unknown_output(id, feed_id, declared).into());
            }
        }
        Ok(())
    }

    /// Mark an action failed and cancel what depends on it
    fn fail(&self, id: &str, phase: ExecutionPhase, message: String, state: &mut RunState) {
        state
            .terminal
            .insert(id.to_string(), ActionStatus::Failed(message));

        for downstream in self.graph.downstream(id) {
            let reason = format!("upstream action '{}' failed during {}", id, phase);
            self.cancel(&downstream, reason, state);
        }
    }

    /// Cancel every action that has not finished exec yet
    fn abort_remaining(&self, failed: &str, phase: ExecutionPhase, state: &mut RunState) {
        let remaining: Vec<String> = self
            .graph
            .nodes
            .iter()
            .map(|node| node.id().to_string())
            .filter(|other| !state.terminal.contains_key(other))
            .filter(|other| phase == ExecutionPhase::Init || !state.outputs.contains_key(other))
            .collect();
        for other in remaining {
            let reason = format!("run aborted after '{}' failed", failed);
            self.cancel(&other, reason, state);
        }
    }

    fn cancel(&self, id: &str, reason: String, state: &mut RunState) {
        if state.terminal.contains_key(id) {
            return;
        }
        tracing::warn!(action = id, reason = %reason, "Action cancelled");
        self.event_tx
            .send_event(ExecutionEvent::action_cancelled(id, &reason));
        state
            .terminal
            .insert(id.to_string(), ActionStatus::Cancelled(reason));
    }
}

/// One feed per declared input, taken from the routing table.
/// Returns the first input id with no feed on failure.
fn collect_inputs(
    action: &Arc<dyn Action>,
    routing: &HashMap<String, SubFeed>,
) -> Result<Vec<SubFeed>, String> {
    action
        .input_ids()
        .iter()
        .map(|id| routing.get(id).cloned().ok_or_else(|| id.clone()))
        .collect()
}

async fn run_action(
    action: &dyn Action,
    ctx: &ActionContext,
    phase: ExecutionPhase,
    inputs: Vec<SubFeed>,
) -> Result<Outcome<Vec<SubFeed>>, ActionError> {
    match phase {
        ExecutionPhase::Init => action.init(ctx, inputs).await,
        ExecutionPhase::Exec => {
            let outcome = action.exec(ctx, inputs.clone()).await?;
            if let Outcome::Proceed(outputs) = &outcome {
                action.post_exec(&inputs, outputs).await?;
            }
            Ok(outcome)
        }
    }
}

fn run_status(actions: &[ActionResult]) -> RunStatus {
    let failed = actions.iter().filter(|a| !a.status.is_success()).count();
    if failed == 0 {
        RunStatus::Succeeded
    } else if failed == actions.len() {
        RunStatus::Failed
    } else {
        RunStatus::PartialFailure
    }
}
