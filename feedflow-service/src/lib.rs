// FeedFlow Service Library
// Action/SubFeed execution core for configuration-driven data pipelines

pub mod action;
pub mod config;
pub mod data_object;
pub mod error;
pub mod execution;
pub mod execution_mode;
pub mod outcome;
pub mod partition;
pub mod registry;
pub mod retry;
pub mod schema;
pub mod subfeed;

// Re-export commonly used types
pub use error::{
    ActionError, AdapterError, ConfigError, ConfigErrorKind, ServiceError, ServiceResult,
};
pub use outcome::Outcome;

// Re-export data types
pub use partition::{PartitionValue, PartitionValues};
pub use schema::{Field, Schema};
pub use subfeed::{
    DataSubFeed, Dataset, DatasetRef, FileSubFeed, InitSubFeed, SubFeed, SubFeedOps,
};

// Re-export adapter and action types
pub use action::{
    Action, ActionContext, ActionSettings, ActionState, DataFrameAction, MultiDataFrameAction,
    TransformContext, Transformer, TransformerRegistry,
};
pub use data_object::{DataObject, ExecutionPhase, MemoryDataObject, MemoryTable, WriteOutcome};
pub use execution_mode::{ExecutionMode, ExecutionModeConfig, ModeContext, ModeOutcome};
pub use registry::InstanceRegistry;
pub use retry::{retry_with_policy, RetryPolicy};

// Re-export configuration types
pub use config::{ActionPlan, ConfigParser, ConfigValidator, PipelineBuilder, PipelineConfig};

// Re-export execution types
pub use execution::{
    ActionResult, ActionStatus, DagExecutor, ExecutionEvent, ExecutionGraph, ExecutorConfig,
    ProgressSender, RunResult, RunStatus,
};
