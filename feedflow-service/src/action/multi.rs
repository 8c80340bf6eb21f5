// Multi DataFrame Action
// N inputs, M outputs; the execution mode applies to the main input only

use crate::action::common::{ActionCore, ActionSettings};
use crate::action::transformer::{MultiTransform, TransformContext};
use crate::action::{Action, ActionContext, ActionState};
use crate::data_object::{DataObject, ExecutionPhase};
use crate::error::{ActionError, ConfigError, ConfigErrorKind};
use crate::outcome::Outcome;
use crate::subfeed::{DataSubFeed, SubFeed, SubFeedOps};

use std::fmt;
use std::sync::Arc;

pub struct MultiDataFrameAction {
    core: ActionCore,
    transform: MultiTransform,
}

impl fmt::Debug for MultiDataFrameAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiDataFrameAction")
            .field("id", &self.core.id)
            .field("inputs", &self.core.input_ids)
            .field("outputs", &self.core.output_ids)
            .finish()
    }
}

impl MultiDataFrameAction {
    pub fn new(
        id: impl Into<String>,
        inputs: Vec<Arc<dyn DataObject>>,
        outputs: Vec<Arc<dyn DataObject>>,
        transform: MultiTransform,
        settings: ActionSettings,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            core: ActionCore::new(id, inputs, outputs, settings)?,
            transform,
        })
    }

    /// Main input id, or an error listing the candidates when it is ambiguous
    pub fn main_input_id(&self) -> Result<&str, ConfigError> {
        self.core.main_input().map(|o| o.id())
    }

    pub fn main_output_id(&self) -> Result<&str, ConfigError> {
        self.core.main_output().map(|o| o.id())
    }

    /// Match transform results to declared outputs, in declaration order
    fn assign_outputs(
        &self,
        feeds: Vec<DataSubFeed>,
    ) -> Result<Vec<(usize, DataSubFeed)>, ConfigError> {
        if feeds.len() != self.core.outputs.len() {
            return Err(ConfigError::feed_count(
                &self.core.id,
                "output",
                self.core.outputs.len(),
                feeds.len(),
            ));
        }

        let mut slots: Vec<Option<DataSubFeed>> = vec![None; self.core.outputs.len()];
        for feed in feeds {
            let index = self
                .core
                .output_ids
                .iter()
                .position(|id| id == feed.data_object_id())
                .ok_or_else(|| {
                    ConfigError::unknown_output(
                        &self.core.id,
                        feed.data_object_id(),
                        &self.core.output_ids,
                    )
                })?;
            if slots[index].is_some() {
                return Err(ConfigError::new(
                    ConfigErrorKind::FeedCountMismatch,
                    format!(
                        "action '{}' produced more than one feed for output '{}'",
                        self.core.id,
                        feed.data_object_id()
                    ),
                ));
            }
            slots[index] = Some(feed);
        }

        Ok(slots
            .into_iter()
            .enumerate()
            .filter_map(|(i, feed)| feed.map(|f| (i, f)))
            .collect())
    }

    async fn run(
        &self,
        ctx: &ActionContext,
        inputs: Vec<SubFeed>,
        phase: ExecutionPhase,
    ) -> Result<Outcome<Vec<SubFeed>>, ActionError> {
        self.core.check_input_count(inputs.len())?;
        let mut feeds: Vec<DataSubFeed> =
            inputs.into_iter().map(DataSubFeed::from_generic).collect();

        if self.core.inputs_skipped(&feeds) {
            return Ok(self.core.skipped_outputs("all inputs were skipped upstream"));
        }

        if self.core.settings.execution_mode.is_some() {
            let main_id = self.core.main_input()?.id().to_string();
            let index = feeds
                .iter()
                .position(|f| f.data_object_id() == main_id)
                .ok_or_else(|| {
                    ConfigError::invalid_structure(format!(
                        "action '{}' received no feed for its main input '{}'",
                        self.core.id, main_id
                    ))
                })?;

            let decision = self.core.mode_decision(&feeds[index]).await?;
            if let Some(Outcome::Skip { reason, .. }) = &decision {
                return Ok(self.core.skipped_outputs(reason.clone()));
            }
            let main = feeds.remove(index);
            feeds.insert(index, self.core.apply_mode(main, decision.as_ref()));
        }

        let mut prepared = Vec::with_capacity(feeds.len());
        for feed in feeds {
            let data_object = self
                .core
                .inputs
                .iter()
                .find(|o| o.id() == feed.data_object_id())
                .ok_or_else(|| {
                    ConfigError::invalid_structure(format!(
                        "action '{}' received a feed for '{}' which is not one of its inputs [{}]",
                        self.core.id,
                        feed.data_object_id(),
                        self.core.input_ids.join(", ")
                    ))
                })?;
            prepared.push(
                self.core
                    .prepare_input(data_object.as_ref(), feed, phase)
                    .await?,
            );
        }

        let main_partition_values = self.core.main_partition_values(&prepared);
        let main_input = self.core.try_main_input().map(|o| o.id());
        let transform_ctx = TransformContext {
            action_id: &self.core.id,
            phase,
            main_input,
            output_ids: &self.core.output_ids,
        };
        let transformed = (self.transform)(&transform_ctx, prepared)?;

        let mut outputs = Vec::with_capacity(transformed.len());
        for (index, feed) in self.assign_outputs(transformed)? {
            let data_object = &self.core.outputs[index];
            let feed = if feed.has_partition_values() {
                feed
            } else {
                feed.with_partition_values(main_partition_values.clone())
            };
            let feed = feed
                .clear_dag_start()
                .update_partition_values(data_object.partitions());
            let feed = self
                .core
                .finish_output(ctx, data_object.as_ref(), feed, phase)
                .await?;
            outputs.push(SubFeed::Data(feed));
        }

        Ok(Outcome::Proceed(outputs))
    }
}

#[async_trait::async_trait]
impl Action for MultiDataFrameAction {
    fn id(&self) -> &str {
        &self.core.id
    }

    fn input_ids(&self) -> &[String] {
        &self.core.input_ids
    }

    fn output_ids(&self) -> &[String] {
        &self.core.output_ids
    }

    fn state(&self) -> ActionState {
        self.core.state()
    }

    async fn init(
        &self,
        ctx: &ActionContext,
        inputs: Vec<SubFeed>,
    ) -> Result<Outcome<Vec<SubFeed>>, ActionError> {
        let result = self.run(ctx, inputs, ExecutionPhase::Init).await;
        self.core.finish(ExecutionPhase::Init, &result);
        result
    }

    async fn exec(
        &self,
        ctx: &ActionContext,
        inputs: Vec<SubFeed>,
    ) -> Result<Outcome<Vec<SubFeed>>, ActionError> {
        self.core.begin_exec(inputs.len())?;
        let result = self.run(ctx, inputs, ExecutionPhase::Exec).await;
        self.core.finish(ExecutionPhase::Exec, &result);
        result
    }

    async fn post_exec(&self, _inputs: &[SubFeed], _outputs: &[SubFeed]) -> Result<(), ActionError> {
        self.core.mark_post_executed();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::transformer::union;
    use crate::data_object::MemoryDataObject;
    use crate::execution_mode::ProcessAllMode;
    use crate::partition::PartitionValues;

    fn object(id: &str, partitions: &[&str]) -> Arc<dyn DataObject> {
        Arc::new(MemoryDataObject::new(id).with_partitions(partitions.iter().copied()))
    }

    fn feed(id: &str, partition_values: Vec<PartitionValues>) -> SubFeed {
        SubFeed::Data(DataSubFeed::new(id, partition_values))
    }

    #[test]
    fn test_main_input_resolution() {
        let action = MultiDataFrameAction::new(
            "join",
            vec![object("a", &[]), object("b", &["x"])],
            vec![object("tgt", &["x"])],
            Arc::new(union),
            ActionSettings::new(),
        )
        .unwrap();
        assert_eq!(action.main_input_id().unwrap(), "b");
        assert_eq!(action.main_output_id().unwrap(), "tgt");

        let ambiguous = MultiDataFrameAction::new(
            "join",
            vec![object("a", &["x"]), object("b", &["y"])],
            vec![object("tgt", &[])],
            Arc::new(union),
            ActionSettings::new(),
        )
        .unwrap();
        let err = ambiguous.main_input_id().unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::AmbiguousMainInput);
    }

    #[tokio::test]
    async fn test_mode_with_ambiguous_main_input_fails() {
        let action = MultiDataFrameAction::new(
            "join",
            vec![object("a", &["x"]), object("b", &["y"])],
            vec![object("tgt", &[])],
            Arc::new(union),
            ActionSettings::new().with_execution_mode(Arc::new(ProcessAllMode::default())),
        )
        .unwrap();
        let err = action
            .init(
                &ActionContext::new(),
                vec![feed("a", Vec::new()), feed("b", Vec::new())],
            )
            .await
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(&ConfigErrorKind::AmbiguousMainInput));
    }

    #[tokio::test]
    async fn test_ambiguous_main_input_is_fine_without_mode() {
        let action = MultiDataFrameAction::new(
            "join",
            vec![object("a", &["x"]), object("b", &["y"])],
            vec![object("tgt", &[])],
            Arc::new(union),
            ActionSettings::new(),
        )
        .unwrap();
        let outcome = action
            .init(
                &ActionContext::new(),
                vec![feed("a", Vec::new()), feed("b", Vec::new())],
            )
            .await
            .unwrap();
        assert_eq!(outcome.value()[0].data_object_id(), "tgt");
    }

    #[tokio::test]
    async fn test_outputs_inherit_main_partitions() {
        let action = MultiDataFrameAction::new(
            "fanout",
            vec![object("src", &["p"])],
            vec![object("x", &["p"]), object("y", &[])],
            Arc::new(union),
            ActionSettings::new(),
        )
        .unwrap();
        let outputs = action
            .init(
                &ActionContext::new(),
                vec![feed("src", vec![PartitionValues::single("p", 7)])],
            )
            .await
            .unwrap()
            .into_value();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].partition_values(), &[PartitionValues::single("p", 7)]);
        // y is unpartitioned, so its partition values project away
        assert!(outputs[1].partition_values().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_output_count_is_config_error() {
        let transform: MultiTransform = Arc::new(
            |_ctx: &TransformContext<'_>,
             _feeds: Vec<DataSubFeed>|
             -> Result<Vec<DataSubFeed>, ActionError> { Ok(Vec::new()) },
        );
        let action = MultiDataFrameAction::new(
            "join",
            vec![object("a", &[])],
            vec![object("tgt", &[])],
            transform,
            ActionSettings::new(),
        )
        .unwrap();
        let err = action
            .init(&ActionContext::new(), vec![feed("a", Vec::new())])
            .await
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(&ConfigErrorKind::FeedCountMismatch));
    }

    #[tokio::test]
    async fn test_all_inputs_skipped_propagates_skip() {
        let action = MultiDataFrameAction::new(
            "join",
            vec![object("a", &[]), object("b", &[])],
            vec![object("tgt", &[])],
            Arc::new(union),
            ActionSettings::new(),
        )
        .unwrap();
        let inputs = vec![
            SubFeed::Data(DataSubFeed::skipped("a")),
            SubFeed::Data(DataSubFeed::skipped("b")),
        ];
        let outcome = action.init(&ActionContext::new(), inputs).await.unwrap();
        assert!(outcome.is_skip());
        assert_eq!(action.state(), ActionState::Skipped);
    }
}
