// Pipeline Configuration Models
// Serde types for YAML pipeline files

use crate::action::ActionSettings;
use crate::execution::ExecutorConfig;
use crate::execution_mode::ExecutionModeConfig;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root of a pipeline file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Engine settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Data objects by id
    #[serde(default)]
    pub data_objects: BTreeMap<String, DataObjectConfig>,

    /// Actions by id
    #[serde(default)]
    pub actions: BTreeMap<String, ActionConfig>,
}

impl PipelineConfig {
    pub fn data_object(&self, id: &str) -> Option<&DataObjectConfig> {
        self.data_objects.get(id)
    }

    /// Whether `id` is declared partitioned. Undeclared ids count as unpartitioned.
    pub fn is_partitioned(&self, id: &str) -> bool {
        self.data_object(id)
            .map(|d| !d.partitions.is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Worker pool size (0 = one worker per ready action)
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Keep independent branches running after a failure
    #[serde(default = "default_continue_on_error")]
    pub continue_on_error: bool,
}

fn default_parallelism() -> usize {
    1
}

fn default_continue_on_error() -> bool {
    true
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            continue_on_error: default_continue_on_error(),
        }
    }
}

impl From<&GlobalConfig> for ExecutorConfig {
    fn from(global: &GlobalConfig) -> Self {
        Self {
            parallelism: global.parallelism,
            continue_on_error: global.continue_on_error,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataObjectConfig {
    /// Partition columns, empty for unpartitioned data
    #[serde(default)]
    pub partitions: Vec<String>,

    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// One input, one output
    Copy,
    /// Any number of inputs and outputs
    Multi,
}

impl ActionKind {
    /// Transformer used when an action names none
    pub fn default_transformer(&self) -> &'static str {
        match self {
            Self::Copy => "identity",
            Self::Multi => "union",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => write!(f, "copy"),
            Self::Multi => write!(f, "multi"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(rename = "type")]
    pub kind: ActionKind,

    #[serde(default)]
    pub inputs: Vec<String>,

    #[serde(default)]
    pub outputs: Vec<String>,

    /// Name bound through a `TransformerRegistry`
    pub transformer: Option<String>,

    pub main_input: Option<String>,

    pub main_output: Option<String>,

    /// Re-read inputs from storage instead of reusing upstream data
    #[serde(default)]
    pub break_lineage: bool,

    #[serde(default)]
    pub persist: bool,

    pub execution_mode: Option<ExecutionModeConfig>,
}

impl ActionConfig {
    pub fn transformer_name(&self) -> &str {
        self.transformer
            .as_deref()
            .unwrap_or_else(|| self.kind.default_transformer())
    }

    /// Explicit main input, from the execution mode first
    pub fn explicit_main_input(&self) -> Option<&str> {
        self.execution_mode
            .as_ref()
            .and_then(|m| m.main_input())
            .or(self.main_input.as_deref())
    }

    pub fn explicit_main_output(&self) -> Option<&str> {
        self.execution_mode
            .as_ref()
            .and_then(|m| m.main_output())
            .or(self.main_output.as_deref())
    }

    pub fn settings(&self) -> ActionSettings {
        let mut settings = ActionSettings::new()
            .with_break_lineage(self.break_lineage)
            .with_persist(self.persist);
        if let Some(id) = &self.main_input {
            settings = settings.with_main_input(id);
        }
        if let Some(id) = &self.main_output {
            settings = settings.with_main_output(id);
        }
        if let Some(mode) = &self.execution_mode {
            settings = settings.with_execution_mode(mode.build());
        }
        settings
    }
}
