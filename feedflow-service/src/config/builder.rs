// Pipeline Builder
// Turns a parsed configuration into an action graph, plan or executor

use crate::action::{
    select_main, Action, ActionSettings, DataFrameAction, MainCandidate, MultiDataFrameAction,
    Transformer, TransformerRegistry,
};
use crate::config::models::{ActionConfig, ActionKind, PipelineConfig};
use crate::config::parser::ConfigValidator;
use crate::data_object::{DataObject, MemoryDataObject};
use crate::error::{ConfigError, ConfigErrorKind};
use crate::execution::{DagExecutor, ExecutionGraph, ExecutorConfig, GraphNode};
use crate::registry::InstanceRegistry;

use std::sync::Arc;

/// What an action will do, resolved from configuration without any data objects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPlan {
    pub id: String,
    pub kind: ActionKind,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub transformer: String,
    /// `None` when the main input cannot be determined
    pub main_input: Option<String>,
    pub main_output: Option<String>,
    /// Name of the execution mode, if any
    pub execution_mode: Option<String>,
    pub break_lineage: bool,
}

impl GraphNode for ActionPlan {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn input_ids(&self) -> &[String] {
        &self.inputs
    }

    fn output_ids(&self) -> &[String] {
        &self.outputs
    }
}

struct PlannedObject<'a> {
    id: &'a str,
    partitioned: bool,
}

impl MainCandidate for PlannedObject<'_> {
    fn candidate_id(&self) -> &str {
        self.id
    }

    fn is_partitioned(&self) -> bool {
        self.partitioned
    }
}

/// Binds configured actions to transformers and data objects
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    transformers: TransformerRegistry,
}

impl PipelineBuilder {
    /// Builder with the built-in transformers
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transformers(mut self, transformers: TransformerRegistry) -> Self {
        self.transformers = transformers;
        self
    }

    pub fn register_transformer(&mut self, name: impl Into<String>, transformer: Transformer) {
        self.transformers.register(name, transformer);
    }

    pub fn transformers(&self) -> &TransformerRegistry {
        &self.transformers
    }

    /// Validate the configuration and order its actions.
    ///
    /// Catches every problem that can be found without touching data:
    /// structural errors, unknown transformers, cycles and unresolvable
    /// main inputs or outputs for actions with an execution mode.
    pub fn plan(&self, config: &PipelineConfig) -> Result<ExecutionGraph<ActionPlan>, ConfigError> {
        ConfigValidator::validate(config).map_err(first_error)?;

        let mut plans = Vec::with_capacity(config.actions.len());
        for (id, action) in &config.actions {
            let transformer = self.transformer_for(id, action)?;

            let inputs = planned_objects(config, &action.inputs);
            let outputs = planned_objects(config, &action.outputs);
            let main_input = select_main(action.explicit_main_input(), &inputs).map(|o| o.id.to_string());
            let main_output = select_main(action.explicit_main_output(), &outputs).map(|o| o.id.to_string());

            if action.execution_mode.is_some() {
                if main_input.is_none() {
                    return Err(ConfigError::ambiguous_main_input(id, &action.inputs));
                }
                if main_output.is_none() {
                    return Err(ConfigError::ambiguous_main_output(id, &action.outputs));
                }
            }

            plans.push(ActionPlan {
                id: id.clone(),
                kind: action.kind,
                inputs: action.inputs.clone(),
                outputs: action.outputs.clone(),
                transformer: format!("{} ({})", action.transformer_name(), transformer.kind()),
                main_input,
                main_output,
                execution_mode: action
                    .execution_mode
                    .as_ref()
                    .map(|m| m.build().name().to_string()),
                break_lineage: action.break_lineage,
            });
        }

        ExecutionGraph::from_actions(plans)
    }

    /// Register an in-memory data object for every declared data object the
    /// registry does not hold yet
    pub fn register_memory_objects(
        &self,
        config: &PipelineConfig,
        registry: &mut InstanceRegistry,
    ) -> Result<(), ConfigError> {
        for (id, object) in &config.data_objects {
            if !registry.contains_data_object(id) {
                registry.register_data_object(Arc::new(
                    MemoryDataObject::new(id.as_str()).with_partitions(object.partitions.iter().cloned()),
                ))?;
            }
        }
        Ok(())
    }

    /// Create the configured actions from data objects held by `registry`,
    /// registering each action there as well
    pub fn build_actions(
        &self,
        config: &PipelineConfig,
        registry: &mut InstanceRegistry,
    ) -> Result<Vec<Arc<dyn Action>>, ConfigError> {
        ConfigValidator::validate(config).map_err(first_error)?;

        let mut actions = Vec::with_capacity(config.actions.len());
        for (id, action_config) in &config.actions {
            let action = self.build_action(id, action_config, registry)?;
            registry.register_action(action.clone())?;
            actions.push(action);
        }

        tracing::debug!(
            pipeline = %config.name,
            actions = actions.len(),
            "Built pipeline actions"
        );
        Ok(actions)
    }

    /// Build every action and wrap them in an executor configured from `global`
    pub fn build_executor(
        &self,
        config: &PipelineConfig,
        registry: &mut InstanceRegistry,
    ) -> Result<DagExecutor, ConfigError> {
        let actions = self.build_actions(config, registry)?;
        Ok(DagExecutor::new(&config.name, actions)?.with_config(ExecutorConfig::from(&config.global)))
    }

    fn build_action(
        &self,
        id: &str,
        config: &ActionConfig,
        registry: &InstanceRegistry,
    ) -> Result<Arc<dyn Action>, ConfigError> {
        let inputs = lookup(&config.inputs, registry)?;
        let outputs = lookup(&config.outputs, registry)?;
        let settings: ActionSettings = config.settings();

        let action: Arc<dyn Action> = match (config.kind, self.transformer_for(id, config)?) {
            (ActionKind::Copy, Transformer::Single(transform)) => {
                let (Some(input), Some(output)) = (inputs.into_iter().next(), outputs.into_iter().next())
                else {
                    return Err(ConfigError::feed_count(id, "input", 1, 0));
                };
                Arc::new(DataFrameAction::new(id, input, output, transform, settings)?)
            }
            (ActionKind::Multi, Transformer::Multi(transform)) => {
                Arc::new(MultiDataFrameAction::new(id, inputs, outputs, transform, settings)?)
            }
            (_, _) => transformer_mismatch(id, config)?,
        };
        Ok(action)
    }

    /// Look up the configured transformer and check it fits the action shape
    fn transformer_for(&self, id: &str, config: &ActionConfig) -> Result<Transformer, ConfigError> {
        let name = config.transformer_name();
        let transformer = self.transformers.get(name)?;
        let fits = matches!(
            (config.kind, &transformer),
            (ActionKind::Copy, Transformer::Single(_)) | (ActionKind::Multi, Transformer::Multi(_))
        );
        if !fits {
            return transformer_mismatch(id, config);
        }
        Ok(transformer)
    }
}

fn transformer_mismatch<T>(id: &str, config: &ActionConfig) -> Result<T, ConfigError> {
    Err(ConfigError::invalid_structure(format!(
        "action '{}' of type {} cannot use transformer '{}'",
        id,
        config.kind,
        config.transformer_name()
    )))
}

fn planned_objects<'a>(config: &PipelineConfig, ids: &'a [String]) -> Vec<PlannedObject<'a>> {
    ids.iter()
        .map(|id| PlannedObject {
            id,
            partitioned: config.is_partitioned(id),
        })
        .collect()
}

fn lookup(ids: &[String], registry: &InstanceRegistry) -> Result<Vec<Arc<dyn DataObject>>, ConfigError> {
    ids.iter().map(|id| registry.data_object(id)).collect()
}

fn first_error(errors: Vec<ConfigError>) -> ConfigError {
    let count = errors.len();
    match errors.into_iter().next() {
        Some(first) if count == 1 => first,
        Some(first) => ConfigError::new(
            first.kind.clone(),
            format!("{} (and {} more problems)", first.message, count - 1),
        ),
        None => ConfigError::new(ConfigErrorKind::InvalidStructure, "invalid configuration"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::ConfigParser;
    use crate::data_object::MemoryTable;
    use crate::execution::RunStatus;
    use serde_json::json;

    const PIPELINE: &str = r#"
name: sales
data_objects:
  raw: { partitions: [p] }
  lookup: {}
  staged: { partitions: [p] }
  report: {}
actions:
  a-stage:
    type: copy
    inputs: [raw]
    outputs: [staged]
  b-report:
    type: multi
    inputs: [staged, lookup]
    outputs: [report]
"#;

    #[test]
    fn test_plan_orders_and_resolves_main() {
        let config = ConfigParser::from_str(PIPELINE).unwrap();
        let graph = PipelineBuilder::new().plan(&config).unwrap();

        let levels = graph.parallel_levels();
        assert_eq!(levels.len(), 2);
        let report = graph.get("b-report").unwrap();
        assert_eq!(report.action.main_input.as_deref(), Some("staged"));
        assert_eq!(report.action.main_output.as_deref(), Some("report"));
        assert_eq!(report.action.transformer, "union (multi)");
        assert_eq!(report.dependencies, vec!["a-stage"]);
        assert_eq!(report.start_inputs, vec!["lookup"]);
    }

    #[test]
    fn test_plan_rejects_unknown_transformer() {
        let mut config = ConfigParser::from_str(PIPELINE).unwrap();
        if let Some(action) = config.actions.get_mut("a-stage") {
            action.transformer = Some("pivot".to_string());
        }
        let err = PipelineBuilder::new().plan(&config).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::UnknownTransformer);
    }

    #[test]
    fn test_plan_rejects_mismatched_transformer() {
        let mut config = ConfigParser::from_str(PIPELINE).unwrap();
        if let Some(action) = config.actions.get_mut("a-stage") {
            action.transformer = Some("union".to_string());
        }
        let err = PipelineBuilder::new().plan(&config).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::InvalidStructure);
    }

    #[test]
    fn test_plan_requires_main_input_for_mode() {
        let config = ConfigParser::from_str(
            r#"
name: ambiguous
data_objects:
  a: { partitions: [x] }
  b: { partitions: [y] }
  out: {}
actions:
  join:
    type: multi
    inputs: [a, b]
    outputs: [out]
    execution_mode:
      type: process_all
"#,
        )
        .unwrap();
        let err = PipelineBuilder::new().plan(&config).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::AmbiguousMainInput);
        assert!(err.message.contains("a, b"));
    }

    #[test]
    fn test_plan_detects_cycle() {
        let config = ConfigParser::from_str(
            r#"
name: loop
actions:
  A:
    type: copy
    inputs: [b]
    outputs: [a]
  B:
    type: copy
    inputs: [a]
    outputs: [b]
"#,
        )
        .unwrap();
        let err = PipelineBuilder::new().plan(&config).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::CyclicDependency);
    }

    #[tokio::test]
    async fn test_build_and_run() {
        let config = ConfigParser::from_str(PIPELINE).unwrap();
        let builder = PipelineBuilder::new();
        let mut registry = InstanceRegistry::new();
        registry
            .register_data_object(Arc::new(
                MemoryDataObject::new("raw")
                    .with_partitions(["p"])
                    .with_table(MemoryTable::from_json_rows(vec![json!({"p": 1, "v": 10})])),
            ))
            .unwrap();
        registry
            .register_data_object(Arc::new(
                MemoryDataObject::new("lookup")
                    .with_table(MemoryTable::from_json_rows(vec![json!({"v": 20})])),
            ))
            .unwrap();
        builder.register_memory_objects(&config, &mut registry).unwrap();

        let executor = builder.build_executor(&config, &mut registry).unwrap();
        let result = executor.run().await;

        assert_eq!(result.status, RunStatus::Succeeded);
        assert!(registry.action("b-report").is_some());
        assert_eq!(registry.data_object_ids().len(), 4);
    }

    #[test]
    fn test_build_requires_registered_objects() {
        let config = ConfigParser::from_str(PIPELINE).unwrap();
        let mut registry = InstanceRegistry::new();
        let err = PipelineBuilder::new()
            .build_actions(&config, &mut registry)
            .unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::UnknownDataObject);
    }
}
