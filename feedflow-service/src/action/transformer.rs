// Transformers
// User transform functions bound to actions, looked up by name from configuration

use crate::data_object::{ExecutionPhase, MemoryTable};
use crate::error::{ActionError, ConfigError, ConfigErrorKind};
use crate::subfeed::{downcast_dataset, DataSubFeed, Dataset, SubFeedOps};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What a transform knows about the call it is part of
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub action_id: &'a str,
    pub phase: ExecutionPhase,
    pub main_input: Option<&'a str>,
    pub output_ids: &'a [String],
}

pub type SingleTransform = Arc<
    dyn Fn(&TransformContext<'_>, DataSubFeed) -> Result<DataSubFeed, ActionError> + Send + Sync,
>;

pub type MultiTransform = Arc<
    dyn Fn(&TransformContext<'_>, Vec<DataSubFeed>) -> Result<Vec<DataSubFeed>, ActionError>
        + Send
        + Sync,
>;

/// A transform for either action shape.
///
/// Transforms are called in both phases. During init the feeds carry no
/// dataset, so a transform must pass feeds through without touching data.
#[derive(Clone)]
pub enum Transformer {
    Single(SingleTransform),
    Multi(MultiTransform),
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(_) => write!(f, "Transformer::Single"),
            Self::Multi(_) => write!(f, "Transformer::Multi"),
        }
    }
}

impl Transformer {
    pub fn single<F>(f: F) -> Self
    where
        F: Fn(&TransformContext<'_>, DataSubFeed) -> Result<DataSubFeed, ActionError>
            + Send
            + Sync
            + 'static,
    {
        Self::Single(Arc::new(f))
    }

    pub fn multi<F>(f: F) -> Self
    where
        F: Fn(&TransformContext<'_>, Vec<DataSubFeed>) -> Result<Vec<DataSubFeed>, ActionError>
            + Send
            + Sync
            + 'static,
    {
        Self::Multi(Arc::new(f))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Single(_) => "single",
            Self::Multi(_) => "multi",
        }
    }
}

/// Named transformers available to pipeline configurations
#[derive(Debug, Clone)]
pub struct TransformerRegistry {
    transformers: HashMap<String, Transformer>,
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformerRegistry {
    /// Registry with the built-in transformers
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("identity", Transformer::single(identity));
        registry.register("broadcast", Transformer::multi(broadcast));
        registry.register("union", Transformer::multi(union));
        registry
    }

    pub fn empty() -> Self {
        Self {
            transformers: HashMap::new(),
        }
    }

    /// Add or replace a transformer
    pub fn register(&mut self, name: impl Into<String>, transformer: Transformer) {
        self.transformers.insert(name.into(), transformer);
    }

    pub fn get(&self, name: &str) -> Result<Transformer, ConfigError> {
        self.transformers.get(name).cloned().ok_or_else(|| {
            ConfigError::new(
                ConfigErrorKind::UnknownTransformer,
                format!(
                    "unknown transformer '{}', available: [{}]",
                    name,
                    self.names().join(", ")
                ),
            )
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transformers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.transformers.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Pass the input feed through unchanged
pub fn identity(
    _ctx: &TransformContext<'_>,
    feed: DataSubFeed,
) -> Result<DataSubFeed, ActionError> {
    Ok(feed)
}

/// Copy the main input feed (or the first one) to every output
pub fn broadcast(
    ctx: &TransformContext<'_>,
    feeds: Vec<DataSubFeed>,
) -> Result<Vec<DataSubFeed>, ActionError> {
    let source = ctx
        .main_input
        .and_then(|id| feeds.iter().find(|f| f.data_object_id() == id))
        .or_else(|| feeds.first())
        .cloned()
        .ok_or_else(|| ActionError::transform(ctx.action_id, "no input feed to broadcast"))?;

    Ok(ctx
        .output_ids
        .iter()
        .map(|id| source.clone().with_data_object_id(id.clone()))
        .collect())
}

/// Concatenate the rows of all input memory tables into every output.
///
/// Partition values are left empty so outputs inherit those of the main input.
pub fn union(
    ctx: &TransformContext<'_>,
    feeds: Vec<DataSubFeed>,
) -> Result<Vec<DataSubFeed>, ActionError> {
    let mut tables = Vec::new();
    for feed in &feeds {
        if let Some(dataset) = feed.dataset() {
            let table = downcast_dataset::<MemoryTable>(dataset).ok_or_else(|| {
                ActionError::transform(
                    ctx.action_id,
                    format!("'{}' is not a memory table", feed.data_object_id()),
                )
            })?;
            tables.push(table);
        }
    }

    let merged = tables.first().map(|first| {
        MemoryTable::new(
            first.schema().clone(),
            tables.iter().flat_map(|t| t.rows().iter().cloned()).collect(),
        )
    });

    Ok(ctx
        .output_ids
        .iter()
        .map(|id| {
            let feed = DataSubFeed::new(id.clone(), Vec::new());
            match &merged {
                Some(table) => feed.with_dataset(Arc::new(table.clone())),
                None => feed,
            }
        })
        .collect())
}
