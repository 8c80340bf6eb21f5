// Action Core
// State, main input/output selection and the feed pipeline shared by all action kinds

use crate::action::{ActionContext, ActionState};
use crate::data_object::{DataObject, ExecutionPhase};
use crate::error::{ActionError, ConfigError};
use crate::execution::events::{EventSender, ExecutionEvent};
use crate::execution_mode::{ExecutionMode, ModeContext, ModeOutcome};
use crate::outcome::Outcome;
use crate::partition::{format_partition_values, partition_columns, PartitionValues};
use crate::subfeed::{DataSubFeed, SubFeed, SubFeedOps};

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::OnceCell;

/// Flags and overrides common to every action
#[derive(Debug, Clone, Default)]
pub struct ActionSettings {
    /// Drop materialized input datasets and re-read from storage
    pub break_lineage: bool,
    /// Ask the engine to cache input datasets for reuse
    pub persist: bool,
    pub main_input: Option<String>,
    pub main_output: Option<String>,
    pub execution_mode: Option<Arc<dyn ExecutionMode>>,
}

impl ActionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_break_lineage(mut self, break_lineage: bool) -> Self {
        self.break_lineage = break_lineage;
        self
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn with_main_input(mut self, id: impl Into<String>) -> Self {
        self.main_input = Some(id.into());
        self
    }

    pub fn with_main_output(mut self, id: impl Into<String>) -> Self {
        self.main_output = Some(id.into());
        self
    }

    pub fn with_execution_mode(mut self, mode: Arc<dyn ExecutionMode>) -> Self {
        self.execution_mode = Some(mode);
        self
    }
}

/// Something that can be chosen as an action's main input or output
pub trait MainCandidate {
    fn candidate_id(&self) -> &str;
    fn is_partitioned(&self) -> bool;
}

impl MainCandidate for Arc<dyn DataObject> {
    fn candidate_id(&self) -> &str {
        self.id()
    }

    fn is_partitioned(&self) -> bool {
        DataObject::is_partitioned(self.as_ref())
    }
}

/// Pick the authoritative data object among `candidates`:
/// the explicitly named one, else the only partitioned one, else the only one.
/// `None` means the choice is ambiguous.
pub fn select_main<'a, C: MainCandidate>(explicit: Option<&str>, candidates: &'a [C]) -> Option<&'a C> {
    if let Some(id) = explicit {
        return candidates.iter().find(|c| c.candidate_id() == id);
    }

    let mut partitioned = candidates.iter().filter(|c| c.is_partitioned());
    if let (Some(only), None) = (partitioned.next(), partitioned.next()) {
        return Some(only);
    }

    match candidates {
        [only] => Some(only),
        _ => None,
    }
}

#[derive(Debug)]
pub(crate) struct ActionCore {
    pub id: String,
    pub inputs: Vec<Arc<dyn DataObject>>,
    pub outputs: Vec<Arc<dyn DataObject>>,
    pub input_ids: Vec<String>,
    pub output_ids: Vec<String>,
    pub settings: ActionSettings,
    state: Mutex<ActionState>,
    /// Execution mode result, computed once in init and reused by exec
    mode_decision: OnceCell<Option<ModeOutcome>>,
}

impl ActionCore {
    pub fn new(
        id: impl Into<String>,
        inputs: Vec<Arc<dyn DataObject>>,
        outputs: Vec<Arc<dyn DataObject>>,
        settings: ActionSettings,
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        let input_ids: Vec<String> = inputs.iter().map(|o| o.id().to_string()).collect();
        let output_ids: Vec<String> = outputs.iter().map(|o| o.id().to_string()).collect();

        if outputs.is_empty() {
            return Err(ConfigError::invalid_structure(format!(
                "action '{}' must declare at least one output",
                id
            )));
        }
        for (role, ids) in [("input", &input_ids), ("output", &output_ids)] {
            let mut seen = HashSet::new();
            if let Some(dup) = ids.iter().find(|i| !seen.insert(i.as_str())) {
                return Err(ConfigError::invalid_structure(format!(
                    "action '{}' declares {} '{}' more than once",
                    id, role, dup
                )));
            }
        }

        let core = Self {
            id,
            inputs,
            outputs,
            input_ids,
            output_ids,
            settings,
            state: Mutex::new(ActionState::Created),
            mode_decision: OnceCell::new(),
        };

        if let Some(main) = core.explicit_main_input() {
            if !core.input_ids.iter().any(|i| i == main) {
                return Err(ConfigError::invalid_structure(format!(
                    "action '{}': main input '{}' is not one of its inputs [{}]",
                    core.id,
                    main,
                    core.input_ids.join(", ")
                )));
            }
        }
        if let Some(main) = core.explicit_main_output() {
            if !core.output_ids.iter().any(|o| o == main) {
                return Err(ConfigError::invalid_structure(format!(
                    "action '{}': main output '{}' is not one of its outputs [{}]",
                    core.id,
                    main,
                    core.output_ids.join(", ")
                )));
            }
        }

        Ok(core)
    }

    fn lock_state(&self) -> MutexGuard<'_, ActionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ActionState {
        *self.lock_state()
    }

    fn set_state(&self, state: ActionState) {
        *self.lock_state() = state;
    }

    fn explicit_main_input(&self) -> Option<&str> {
        self.settings
            .execution_mode
            .as_ref()
            .and_then(|m| m.main_input_id())
            .or(self.settings.main_input.as_deref())
    }

    fn explicit_main_output(&self) -> Option<&str> {
        self.settings
            .execution_mode
            .as_ref()
            .and_then(|m| m.main_output_id())
            .or(self.settings.main_output.as_deref())
    }

    pub fn try_main_input(&self) -> Option<&Arc<dyn DataObject>> {
        select_main(self.explicit_main_input(), &self.inputs)
    }

    pub fn main_input(&self) -> Result<&Arc<dyn DataObject>, ConfigError> {
        self.try_main_input()
            .ok_or_else(|| ConfigError::ambiguous_main_input(&self.id, &self.input_ids))
    }

    pub fn main_output(&self) -> Result<&Arc<dyn DataObject>, ConfigError> {
        select_main(self.explicit_main_output(), &self.outputs)
            .ok_or_else(|| ConfigError::ambiguous_main_output(&self.id, &self.output_ids))
    }

    pub fn check_input_count(&self, actual: usize) -> Result<(), ConfigError> {
        if actual != self.inputs.len() {
            return Err(ConfigError::feed_count(
                &self.id,
                "input",
                self.inputs.len(),
                actual,
            ));
        }
        Ok(())
    }

    /// Feed count first, then the state machine; a count mismatch fails the action
    pub fn begin_exec(&self, feed_count: usize) -> Result<(), ActionError> {
        if let Err(err) = self.check_input_count(feed_count) {
            self.set_state(ActionState::Failed);
            return Err(err.into());
        }
        match self.state() {
            ActionState::Initialized | ActionState::Skipped => Ok(()),
            state => Err(ActionError::InvalidState {
                action_id: self.id.clone(),
                state: state.to_string(),
            }),
        }
    }

    /// Record the state reached after a phase
    pub fn finish<T>(&self, phase: ExecutionPhase, result: &Result<Outcome<T>, ActionError>) {
        let state = match (phase, result) {
            (_, Err(_)) => ActionState::Failed,
            (_, Ok(Outcome::Skip { .. })) => ActionState::Skipped,
            (ExecutionPhase::Init, Ok(_)) => ActionState::Initialized,
            (ExecutionPhase::Exec, Ok(_)) => ActionState::Executed,
        };
        self.set_state(state);
    }

    pub fn mark_post_executed(&self) {
        let mut state = self.lock_state();
        if *state == ActionState::Executed {
            *state = ActionState::PostExecuted;
        }
    }

    /// All inputs were skipped upstream and none of them seeds the DAG
    pub fn inputs_skipped(&self, feeds: &[DataSubFeed]) -> bool {
        !feeds.is_empty() && feeds.iter().all(|f| f.is_skipped() && !f.is_dag_start())
    }

    /// Skip outcome carrying one empty "no data" feed per output
    pub fn skipped_outputs(&self, reason: impl Into<String>) -> Outcome<Vec<SubFeed>> {
        let reason = reason.into();
        tracing::info!(action = %self.id, %reason, "Skipping action, no data to process");
        Outcome::skip(
            reason,
            self.output_ids
                .iter()
                .map(|id| SubFeed::Data(DataSubFeed::skipped(id.clone())))
                .collect(),
        )
    }

    /// Execution mode decision for this run; evaluated on first call only
    pub async fn mode_decision(
        &self,
        main_feed: &DataSubFeed,
    ) -> Result<Option<ModeOutcome>, ActionError> {
        let Some(mode) = &self.settings.execution_mode else {
            return Ok(None);
        };

        let decision = self
            .mode_decision
            .get_or_try_init(|| async {
                let main_input = self.main_input()?;
                let main_output = self.main_output()?;
                let ctx = ModeContext {
                    action_id: &self.id,
                    main_input: &**main_input,
                    main_output: &**main_output,
                    partition_values: main_feed.partition_values(),
                    filter: main_feed.filter(),
                };
                let outcome = mode.evaluate(&ctx).await?;
                tracing::debug!(
                    action = %self.id,
                    mode = mode.name(),
                    skip = outcome.is_skip(),
                    partitions = %format_partition_values(&outcome.value().partition_values),
                    "Execution mode evaluated"
                );
                Ok::<_, ActionError>(Some(outcome))
            })
            .await?;

        Ok(decision.clone())
    }

    /// Override partition values and filter with a `Proceed` decision.
    /// A changed selection drops any upstream dataset so the input is re-read.
    pub fn apply_mode(&self, feed: DataSubFeed, decision: Option<&ModeOutcome>) -> DataSubFeed {
        let Some(Outcome::Proceed(result)) = decision else {
            return feed;
        };
        let reselected = result.partition_values.as_slice() != feed.partition_values()
            || result.filter.is_some();
        let feed = if reselected { feed.break_lineage() } else { feed };
        feed.with_partition_values(result.partition_values.clone())
            .with_filter(result.filter.clone())
    }

    /// Lineage break, read preparation, materialization (exec only) and persist
    pub async fn prepare_input(
        &self,
        data_object: &dyn DataObject,
        feed: DataSubFeed,
        phase: ExecutionPhase,
    ) -> Result<DataSubFeed, ActionError> {
        let feed = if self.settings.break_lineage {
            feed.break_lineage()
        } else {
            feed
        };

        let mut feed = data_object.prepare_for_read(feed, phase).await?;
        if phase == ExecutionPhase::Exec && feed.dataset().is_none() {
            let dataset = data_object.materialize(&feed).await?;
            feed = feed.with_dataset(dataset);
        }
        if self.settings.persist {
            feed = feed.persist();
        }
        Ok(feed)
    }

    /// Validate an output feed and, during exec, write it
    pub async fn finish_output(
        &self,
        ctx: &ActionContext,
        output: &dyn DataObject,
        feed: DataSubFeed,
        phase: ExecutionPhase,
    ) -> Result<DataSubFeed, ActionError> {
        let columns: Vec<String> = partition_columns(feed.partition_values())
            .into_iter()
            .collect();
        // An empty dataset has no usable schema to check columns against
        let schema = feed
            .dataset()
            .filter(|d| d.row_count() != Some(0))
            .map(|d| d.schema());
        output.validate_write(&columns, schema)?;

        if phase == ExecutionPhase::Init {
            return Ok(feed);
        }

        let Some(dataset) = feed.dataset().cloned() else {
            tracing::info!(action = %self.id, data_object = output.id(), "No data found");
            ctx.events
                .send_event(ExecutionEvent::no_data_found(&self.id, output.id()));
            return Ok(feed);
        };

        let start = Instant::now();
        let outcome = output.write(dataset, feed.partition_values()).await?;
        let duration = start.elapsed();

        ctx.metrics
            .record(&self.id, output.id(), duration, &outcome.metrics);
        tracing::info!(
            action = %self.id,
            data_object = output.id(),
            duration_ms = duration.as_millis() as u64,
            partitions = %format_partition_values(&outcome.partition_values),
            "Write completed"
        );

        Ok(feed.with_partition_values(outcome.partition_values))
    }

    /// Partition values of the main input feed, if the main input can be determined
    pub fn main_partition_values(&self, feeds: &[DataSubFeed]) -> Vec<PartitionValues> {
        self.try_main_input()
            .and_then(|main| feeds.iter().find(|f| f.data_object_id() == main.id()))
            .map(|f| f.partition_values().to_vec())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_object::MemoryDataObject;
    use crate::error::ConfigErrorKind;
    use crate::execution_mode::PartitionDiffMode;

    fn object(id: &str, partitions: &[&str]) -> Arc<dyn DataObject> {
        Arc::new(MemoryDataObject::new(id).with_partitions(partitions.iter().copied()))
    }

    #[test]
    fn test_select_main_prefers_unique_partitioned() {
        let candidates = vec![object("a", &[]), object("b", &["x"])];
        assert_eq!(select_main(None, &candidates).map(|o| o.id()), Some("b"));
    }

    #[test]
    fn test_select_main_ambiguous_when_several_partitioned() {
        let candidates = vec![object("a", &["x"]), object("b", &["y"])];
        assert!(select_main(None, &candidates).is_none());
    }

    #[test]
    fn test_select_main_explicit_and_sole() {
        let candidates = vec![object("a", &["x"]), object("b", &["y"])];
        assert_eq!(select_main(Some("a"), &candidates).map(|o| o.id()), Some("a"));

        let sole = vec![object("a", &[])];
        assert_eq!(select_main(None, &sole).map(|o| o.id()), Some("a"));

        let unpartitioned = vec![object("a", &[]), object("b", &[])];
        assert!(select_main(None, &unpartitioned).is_none());
    }

    #[test]
    fn test_main_input_error_lists_candidates() {
        let core = ActionCore::new(
            "join",
            vec![object("a", &["x"]), object("b", &["y"])],
            vec![object("tgt", &[])],
            ActionSettings::new(),
        )
        .unwrap();
        let err = core.main_input().unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::AmbiguousMainInput);
        assert!(err.message.contains("[a, b]"));
    }

    #[test]
    fn test_mode_explicit_main_input_wins() {
        let mode = PartitionDiffMode {
            main_input: Some("b".to_string()),
            ..Default::default()
        };
        let core = ActionCore::new(
            "join",
            vec![object("a", &["x"]), object("b", &["y"])],
            vec![object("tgt", &["y"])],
            ActionSettings::new()
                .with_main_input("a")
                .with_execution_mode(Arc::new(mode)),
        )
        .unwrap();
        assert_eq!(core.main_input().unwrap().id(), "b");
    }

    #[test]
    fn test_unknown_explicit_main_input_is_rejected() {
        let err = ActionCore::new(
            "copy",
            vec![object("a", &[])],
            vec![object("tgt", &[])],
            ActionSettings::new().with_main_input("zzz"),
        )
        .unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::InvalidStructure);
    }

    #[test]
    fn test_requires_outputs_and_unique_inputs() {
        let err = ActionCore::new("copy", vec![object("a", &[])], vec![], ActionSettings::new())
            .unwrap_err();
        assert!(err.message.contains("at least one output"));

        let err = ActionCore::new(
            "copy",
            vec![object("a", &[]), object("a", &[])],
            vec![object("tgt", &[])],
            ActionSettings::new(),
        )
        .unwrap_err();
        assert!(err.message.contains("more than once"));
    }

    #[test]
    fn test_begin_exec_requires_init() {
        let core = ActionCore::new(
            "copy",
            vec![object("a", &[])],
            vec![object("tgt", &[])],
            ActionSettings::new(),
        )
        .unwrap();
        assert!(matches!(
            core.begin_exec(1),
            Err(ActionError::InvalidState { .. })
        ));

        core.finish::<()>(ExecutionPhase::Init, &Ok(Outcome::Proceed(())));
        assert_eq!(core.state(), ActionState::Initialized);
        assert!(core.begin_exec(1).is_ok());
    }

    #[test]
    fn test_begin_exec_checks_feed_count_before_state() {
        let core = ActionCore::new(
            "copy",
            vec![object("a", &[])],
            vec![object("tgt", &[])],
            ActionSettings::new(),
        )
        .unwrap();

        let err = core.begin_exec(2).unwrap_err();
        assert_eq!(err.config_kind(), Some(&ConfigErrorKind::FeedCountMismatch));
        assert_eq!(core.state(), ActionState::Failed);
    }
}
