// Service Errors
// Error taxonomy for configuration problems, adapter I/O and action failures

use std::fmt;
use thiserror::Error;

/// Fatal configuration error. Never retried.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub message: String,
    pub kind: ConfigErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// Main input could not be determined and an operation required it
    AmbiguousMainInput,
    /// Main output could not be determined and an operation required it
    AmbiguousMainOutput,
    /// Number of feeds handed to or returned from an action does not match its declaration
    FeedCountMismatch,
    /// A transform produced a feed for an id that is not a declared output
    UnknownOutput,
    /// Circular dependency between actions
    CyclicDependency,
    /// More than one action writes the same data object
    DuplicateProducer,
    /// Reference to a data object that is not registered
    UnknownDataObject,
    /// Reference to a transformer name that is not registered
    UnknownTransformer,
    /// Anything else that makes the pipeline definition unusable
    InvalidStructure,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub fn new(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn ambiguous_main_input(action_id: &str, candidates: &[String]) -> Self {
        Self::new(
            ConfigErrorKind::AmbiguousMainInput,
            format!(
                "action '{}' has no unambiguous main input, candidates are [{}]; set main_input explicitly",
                action_id,
                candidates.join(", ")
            ),
        )
    }

    pub fn ambiguous_main_output(action_id: &str, candidates: &[String]) -> Self {
        Self::new(
            ConfigErrorKind::AmbiguousMainOutput,
            format!(
                "action '{}' has no unambiguous main output, candidates are [{}]; set main_output explicitly",
                action_id,
                candidates.join(", ")
            ),
        )
    }

    pub fn feed_count(action_id: &str, what: &str, expected: usize, actual: usize) -> Self {
        Self::new(
            ConfigErrorKind::FeedCountMismatch,
            format!(
                "action '{}' expects {} {} feed(s) but got {}",
                action_id, expected, what, actual
            ),
        )
    }

    pub fn unknown_output(action_id: &str, feed_id: &str, declared: &[String]) -> Self {
        Self::new(
            ConfigErrorKind::UnknownOutput,
            format!(
                "action '{}' produced a feed for '{}' which is not one of its outputs [{}]",
                action_id,
                feed_id,
                declared.join(", ")
            ),
        )
    }

    pub fn cyclic(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::CyclicDependency, message)
    }

    pub fn unknown_data_object(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::UnknownDataObject, message)
    }

    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::InvalidStructure, message)
    }
}

/// Failure reported by a data object adapter
#[derive(Debug, Clone, Error)]
#[error("data object '{data_object_id}': {message}")]
pub struct AdapterError {
    pub data_object_id: String,
    pub message: String,
    /// Whether the adapter considers another attempt worthwhile
    pub retryable: bool,
}

impl AdapterError {
    pub fn new(data_object_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            data_object_id: data_object_id.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn transient(data_object_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            ..Self::new(data_object_id, message)
        }
    }

    pub fn unsupported(data_object_id: impl Into<String>, operation: &str) -> Self {
        Self::new(
            data_object_id,
            format!("operation '{}' is not supported", operation),
        )
    }
}

/// Errors raised while initializing or executing an action
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error(
        "schema mismatch for '{data_object_id}': missing partition columns [{}], unexpected partition columns [{}]",
        .missing.join(", "),
        .unexpected.join(", ")
    )]
    SchemaMismatch {
        data_object_id: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("transform failed in action '{action_id}': {message}")]
    Transform { action_id: String, message: String },

    #[error("action '{action_id}' received no partition values to process")]
    NoPartitionValues { action_id: String },

    #[error("action '{action_id}' cannot run while in state {state}")]
    InvalidState { action_id: String, state: String },
}

impl ActionError {
    pub fn transform(action_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transform {
            action_id: action_id.into(),
            message: message.into(),
        }
    }

    /// Configuration errors are fatal and must never be retried
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn config_kind(&self) -> Option<&ConfigErrorKind> {
        match self {
            Self::Config(e) => Some(&e.kind),
            _ => None,
        }
    }
}

/// Crate-level error
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for ServiceError {
    fn from(err: ConfigError) -> Self {
        Self::Action(ActionError::Config(err))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
