// Execution Modes
// Strategies deciding which partitions an action processes on a given run

use crate::data_object::DataObject;
use crate::error::{ActionError, ConfigError};
use crate::outcome::Outcome;
use crate::partition::{dedup_partition_values, format_partition_values, PartitionValues};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Everything an execution mode may look at
pub struct ModeContext<'a> {
    pub action_id: &'a str,
    pub main_input: &'a dyn DataObject,
    pub main_output: &'a dyn DataObject,
    /// Partition values of the incoming main input feed
    pub partition_values: &'a [PartitionValues],
    pub filter: Option<&'a str>,
}

/// Partitions and optional row filter selected for processing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModeResult {
    pub partition_values: Vec<PartitionValues>,
    pub filter: Option<String>,
}

pub type ModeOutcome = Outcome<ModeResult>;

/// Pluggable partition selection policy.
///
/// `evaluate` runs once per action during init and its result is reused in
/// exec, so it must be deterministic for the same storage state.
#[async_trait::async_trait]
pub trait ExecutionMode: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Input the mode names explicitly as its reference point
    fn main_input_id(&self) -> Option<&str> {
        None
    }

    /// Output the mode names explicitly as its reference point
    fn main_output_id(&self) -> Option<&str> {
        None
    }

    async fn evaluate(&self, ctx: &ModeContext<'_>) -> Result<ModeOutcome, ActionError>;
}

/// Process main input partitions that do not exist yet in the main output
#[derive(Debug, Clone, Default)]
pub struct PartitionDiffMode {
    pub main_input: Option<String>,
    pub main_output: Option<String>,
    /// Process at most this many partitions per run, smallest first
    pub nb_of_partition_values_per_run: Option<usize>,
}

#[async_trait::async_trait]
impl ExecutionMode for PartitionDiffMode {
    fn name(&self) -> &'static str {
        "partition_diff"
    }

    fn main_input_id(&self) -> Option<&str> {
        self.main_input.as_deref()
    }

    fn main_output_id(&self) -> Option<&str> {
        self.main_output.as_deref()
    }

    async fn evaluate(&self, ctx: &ModeContext<'_>) -> Result<ModeOutcome, ActionError> {
        let input = ctx.main_input;
        let output = ctx.main_output;
        if !input.is_partitioned() || !output.is_partitioned() {
            return Err(ConfigError::invalid_structure(format!(
                "action '{}': partition_diff needs partitioned main input and output, got '{}' {:?} and '{}' {:?}",
                ctx.action_id,
                input.id(),
                input.partitions(),
                output.id(),
                output.partitions()
            ))
            .into());
        }

        let common: Vec<String> = input
            .partitions()
            .iter()
            .filter(|c| output.partitions().contains(c))
            .cloned()
            .collect();
        if common.is_empty() {
            return Err(ConfigError::invalid_structure(format!(
                "action '{}': main input '{}' and main output '{}' share no partition columns",
                ctx.action_id,
                input.id(),
                output.id()
            ))
            .into());
        }

        let candidates = if ctx.partition_values.is_empty() {
            input.list_partition_values().await?
        } else {
            ctx.partition_values.to_vec()
        };
        let existing: HashSet<PartitionValues> = output
            .list_partition_values()
            .await?
            .iter()
            .map(|pv| pv.project(&common))
            .collect();

        let mut selected: Vec<PartitionValues> = candidates
            .into_iter()
            .filter(|pv| !existing.contains(&pv.project(&common)))
            .collect();
        selected.sort();
        let mut selected = dedup_partition_values(selected);
        if let Some(limit) = self.nb_of_partition_values_per_run {
            selected.truncate(limit);
        }

        if selected.is_empty() {
            return Ok(Outcome::skip(
                format!("no new partitions of '{}' to process", input.id()),
                ModeResult::default(),
            ));
        }

        tracing::debug!(
            action = ctx.action_id,
            partitions = %format_partition_values(&selected),
            "Selected partitions"
        );

        Ok(Outcome::Proceed(ModeResult {
            partition_values: selected,
            filter: ctx.filter.map(str::to_string),
        }))
    }
}

/// Process everything, optionally restricted by a row filter
#[derive(Debug, Clone, Default)]
pub struct ProcessAllMode {
    pub filter: Option<String>,
    pub main_input: Option<String>,
    pub main_output: Option<String>,
}

#[async_trait::async_trait]
impl ExecutionMode for ProcessAllMode {
    fn name(&self) -> &'static str {
        "process_all"
    }

    fn main_input_id(&self) -> Option<&str> {
        self.main_input.as_deref()
    }

    fn main_output_id(&self) -> Option<&str> {
        self.main_output.as_deref()
    }

    async fn evaluate(&self, ctx: &ModeContext<'_>) -> Result<ModeOutcome, ActionError> {
        Ok(Outcome::Proceed(ModeResult {
            partition_values: Vec::new(),
            filter: self
                .filter
                .clone()
                .or_else(|| ctx.filter.map(str::to_string)),
        }))
    }
}

/// Refuse to run without explicit partition values
#[derive(Debug, Clone, Default)]
pub struct FailIfNoPartitionValuesMode {
    pub main_input: Option<String>,
    pub main_output: Option<String>,
}

#[async_trait::async_trait]
impl ExecutionMode for FailIfNoPartitionValuesMode {
    fn name(&self) -> &'static str {
        "fail_if_no_partition_values"
    }

    fn main_input_id(&self) -> Option<&str> {
        self.main_input.as_deref()
    }

    fn main_output_id(&self) -> Option<&str> {
        self.main_output.as_deref()
    }

    async fn evaluate(&self, ctx: &ModeContext<'_>) -> Result<ModeOutcome, ActionError> {
        if ctx.partition_values.is_empty() {
            return Err(ActionError::NoPartitionValues {
                action_id: ctx.action_id.to_string(),
            });
        }
        Ok(Outcome::Proceed(ModeResult {
            partition_values: ctx.partition_values.to_vec(),
            filter: ctx.filter.map(str::to_string),
        }))
    }
}

/// Execution mode as declared in a pipeline file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionModeConfig {
    PartitionDiff {
        main_input: Option<String>,
        main_output: Option<String>,
        nb_of_partition_values_per_run: Option<usize>,
    },
    ProcessAll {
        filter: Option<String>,
        main_input: Option<String>,
        main_output: Option<String>,
    },
    FailIfNoPartitionValues {
        main_input: Option<String>,
        main_output: Option<String>,
    },
}

impl ExecutionModeConfig {
    pub fn build(&self) -> Arc<dyn ExecutionMode> {
        match self {
            Self::PartitionDiff {
                main_input,
                main_output,
                nb_of_partition_values_per_run,
            } => Arc::new(PartitionDiffMode {
                main_input: main_input.clone(),
                main_output: main_output.clone(),
                nb_of_partition_values_per_run: *nb_of_partition_values_per_run,
            }),
            Self::ProcessAll {
                filter,
                main_input,
                main_output,
            } => Arc::new(ProcessAllMode {
                filter: filter.clone(),
                main_input: main_input.clone(),
                main_output: main_output.clone(),
            }),
            Self::FailIfNoPartitionValues {
                main_input,
                main_output,
            } => Arc::new(FailIfNoPartitionValuesMode {
                main_input: main_input.clone(),
                main_output: main_output.clone(),
            }),
        }
    }

    pub fn main_input(&self) -> Option<&str> {
        match self {
            Self::PartitionDiff { main_input, .. }
            | Self::ProcessAll { main_input, .. }
            | Self::FailIfNoPartitionValues { main_input, .. } => main_input.as_deref(),
        }
    }

    pub fn main_output(&self) -> Option<&str> {
        match self {
            Self::PartitionDiff { main_output, .. }
            | Self::ProcessAll { main_output, .. }
            | Self::FailIfNoPartitionValues { main_output, .. } => main_output.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_object::{MemoryDataObject, MemoryTable};
    use crate::error::ConfigErrorKind;
    use serde_json::json;

    fn table(ps: &[i64]) -> MemoryTable {
        MemoryTable::from_json_rows(ps.iter().map(|p| json!({"p": p, "v": 0})).collect())
    }

    fn ctx<'a>(
        input: &'a MemoryDataObject,
        output: &'a MemoryDataObject,
        partition_values: &'a [PartitionValues],
    ) -> ModeContext<'a> {
        ModeContext {
            action_id: "copy",
            main_input: input,
            main_output: output,
            partition_values,
            filter: None,
        }
    }

    #[tokio::test]
    async fn test_partition_diff_selects_missing_partitions() {
        let input = MemoryDataObject::new("src")
            .with_partitions(["p"])
            .with_table(table(&[3, 1, 2]));
        let output = MemoryDataObject::new("tgt")
            .with_partitions(["p"])
            .with_table(table(&[1]));
        let mode = PartitionDiffMode::default();

        let outcome = mode.evaluate(&ctx(&input, &output, &[])).await.unwrap();
        assert_eq!(
            outcome.into_value().partition_values,
            vec![PartitionValues::single("p", 2), PartitionValues::single("p", 3)]
        );
    }

    #[tokio::test]
    async fn test_partition_diff_applies_limit() {
        let input = MemoryDataObject::new("src")
            .with_partitions(["p"])
            .with_table(table(&[3, 1, 2]));
        let output = MemoryDataObject::new("tgt").with_partitions(["p"]);
        let mode = PartitionDiffMode {
            nb_of_partition_values_per_run: Some(2),
            ..Default::default()
        };

        let outcome = mode.evaluate(&ctx(&input, &output, &[])).await.unwrap();
        assert_eq!(
            outcome.value().partition_values,
            vec![PartitionValues::single("p", 1), PartitionValues::single("p", 2)]
        );
    }

    #[tokio::test]
    async fn test_partition_diff_skips_when_up_to_date() {
        let input = MemoryDataObject::new("src")
            .with_partitions(["p"])
            .with_table(table(&[1]));
        let output = MemoryDataObject::new("tgt")
            .with_partitions(["p"])
            .with_table(table(&[1]));

        let outcome = PartitionDiffMode::default()
            .evaluate(&ctx(&input, &output, &[]))
            .await
            .unwrap();
        assert!(outcome.is_skip());
        assert!(outcome.value().partition_values.is_empty());
    }

    #[tokio::test]
    async fn test_partition_diff_prefers_incoming_partitions() {
        let input = MemoryDataObject::new("src")
            .with_partitions(["p"])
            .with_table(table(&[1, 2, 3]));
        let output = MemoryDataObject::new("tgt").with_partitions(["p"]);
        let incoming = vec![PartitionValues::single("p", 2)];

        let outcome = PartitionDiffMode::default()
            .evaluate(&ctx(&input, &output, &incoming))
            .await
            .unwrap();
        assert_eq!(outcome.into_value().partition_values, incoming);
    }

    #[tokio::test]
    async fn test_partition_diff_requires_partitioned_objects() {
        let input = MemoryDataObject::new("src");
        let output = MemoryDataObject::new("tgt").with_partitions(["p"]);
        let err = PartitionDiffMode::default()
            .evaluate(&ctx(&input, &output, &[]))
            .await
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(&ConfigErrorKind::InvalidStructure));
    }

    #[tokio::test]
    async fn test_process_all_clears_partitions() {
        let input = MemoryDataObject::new("src").with_partitions(["p"]);
        let output = MemoryDataObject::new("tgt");
        let incoming = vec![PartitionValues::single("p", 1)];
        let mode = ProcessAllMode {
            filter: Some("p = 1".to_string()),
            ..Default::default()
        };
        let result = mode
            .evaluate(&ctx(&input, &output, &incoming))
            .await
            .unwrap()
            .into_value();
        assert!(result.partition_values.is_empty());
        assert_eq!(result.filter.as_deref(), Some("p = 1"));
    }

    #[tokio::test]
    async fn test_fail_if_no_partition_values() {
        let input = MemoryDataObject::new("src");
        let output = MemoryDataObject::new("tgt");
        let mode = FailIfNoPartitionValuesMode::default();
        let err = mode.evaluate(&ctx(&input, &output, &[])).await.unwrap_err();
        assert!(matches!(err, ActionError::NoPartitionValues { .. }));

        let incoming = vec![PartitionValues::single("p", 1)];
        let outcome = mode.evaluate(&ctx(&input, &output, &incoming)).await.unwrap();
        assert_eq!(outcome.into_value().partition_values, incoming);
    }

    #[test]
    fn test_config_from_yaml() {
        let config: ExecutionModeConfig = serde_yaml::from_str(
            "type: partition_diff\nmain_input: src1\nnb_of_partition_values_per_run: 5",
        )
        .unwrap();
        assert_eq!(config.main_input(), Some("src1"));
        assert_eq!(config.main_output(), None);
        let mode = config.build();
        assert_eq!(mode.name(), "partition_diff");
        assert_eq!(mode.main_input_id(), Some("src1"));
    }
}
