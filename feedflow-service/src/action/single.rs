// DataFrame Action
// Single input, single output action running one transform

use crate::action::common::{ActionCore, ActionSettings};
use crate::action::transformer::{SingleTransform, TransformContext};
use crate::action::{Action, ActionContext, ActionState};
use crate::data_object::{DataObject, ExecutionPhase};
use crate::error::{ActionError, ConfigError};
use crate::outcome::Outcome;
use crate::subfeed::{DataSubFeed, SubFeed, SubFeedOps};

use std::fmt;
use std::sync::Arc;

pub struct DataFrameAction {
    core: ActionCore,
    transform: SingleTransform,
}

impl fmt::Debug for DataFrameAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFrameAction")
            .field("id", &self.core.id)
            .field("input", &self.core.input_ids)
            .field("output", &self.core.output_ids)
            .finish()
    }
}

impl DataFrameAction {
    pub fn new(
        id: impl Into<String>,
        input: Arc<dyn DataObject>,
        output: Arc<dyn DataObject>,
        transform: SingleTransform,
        settings: ActionSettings,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            core: ActionCore::new(id, vec![input], vec![output], settings)?,
            transform,
        })
    }

    fn input(&self) -> &Arc<dyn DataObject> {
        &self.core.inputs[0]
    }

    fn output(&self) -> &Arc<dyn DataObject> {
        &self.core.outputs[0]
    }

    /// Give the transform result the output's id. A feed still labelled with
    /// the input id is relabelled; any other id is a configuration error.
    fn relabel(&self, feed: DataSubFeed) -> Result<DataSubFeed, ConfigError> {
        let output_id = self.output().id();
        if feed.data_object_id() == output_id {
            Ok(feed)
        } else if feed.data_object_id() == self.input().id() {
            Ok(feed.with_data_object_id(output_id))
        } else {
            Err(ConfigError::unknown_output(
                &self.core.id,
                feed.data_object_id(),
                &self.core.output_ids,
            ))
        }
    }

    async fn run(
        &self,
        ctx: &ActionContext,
        inputs: Vec<SubFeed>,
        phase: ExecutionPhase,
    ) -> Result<Outcome<Vec<SubFeed>>, ActionError> {
        self.core.check_input_count(inputs.len())?;
        let feed = inputs
            .into_iter()
            .next()
            .map(DataSubFeed::from_generic)
            .ok_or_else(|| ConfigError::feed_count(&self.core.id, "input", 1, 0))?;

        if self.core.inputs_skipped(std::slice::from_ref(&feed)) {
            return Ok(self.core.skipped_outputs("input was skipped upstream"));
        }

        let decision = self.core.mode_decision(&feed).await?;
        if let Some(Outcome::Skip { reason, .. }) = &decision {
            return Ok(self.core.skipped_outputs(reason.clone()));
        }
        let feed = self.core.apply_mode(feed, decision.as_ref());
        let feed = self
            .core
            .prepare_input(self.input().as_ref(), feed, phase)
            .await?;

        let transform_ctx = TransformContext {
            action_id: &self.core.id,
            phase,
            main_input: Some(self.input().id()),
            output_ids: &self.core.output_ids,
        };
        let transformed = (self.transform)(&transform_ctx, feed)?;

        let output = self
            .relabel(transformed)?
            .clear_dag_start()
            .update_partition_values(self.output().partitions());
        let output = self
            .core
            .finish_output(ctx, self.output().as_ref(), output, phase)
            .await?;

        Ok(Outcome::Proceed(vec![SubFeed::Data(output)]))
    }
}

#[async_trait::async_trait]
impl Action for DataFrameAction {
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
