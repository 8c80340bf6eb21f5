// SubFeeds
// Immutable data handles passed along DAG edges between actions

use crate::partition::{dedup_partition_values, project_partition_values, PartitionValues};
use crate::schema::Schema;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A materialized (in-memory or staged) dataset produced by the external data engine.
///
/// The core never looks inside a dataset; it only carries the handle between
/// actions, asks it for its schema during output validation, and lets the
/// concrete engine decide what `persist` means.
pub trait Dataset: fmt::Debug + Send + Sync {
    fn schema(&self) -> &Schema;

    fn row_count(&self) -> Option<usize> {
        None
    }

    /// Handle to reuse for several consumers, or `None` if the engine cannot cache.
    fn persist(&self) -> Option<DatasetRef> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

pub type DatasetRef = Arc<dyn Dataset>;

/// Downcast a dataset handle to the concrete engine type
pub fn downcast_dataset<T: Any>(dataset: &DatasetRef) -> Option<&T> {
    dataset.as_any().downcast_ref::<T>()
}

fn same_dataset(a: &Option<DatasetRef>, b: &Option<DatasetRef>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
        (None, None) => true,
        _ => false,
    }
}

/// Transition contract shared by every SubFeed kind.
///
/// Every transition consumes the feed and returns a new one; none can fail.
pub trait SubFeedOps: Sized {
    fn data_object_id(&self) -> &str;

    fn partition_values(&self) -> &[PartitionValues];

    /// Synthetic feed seeding an action with no upstream producer
    fn is_dag_start(&self) -> bool;

    /// Explicit "no data" feed produced by a skipped action
    fn is_skipped(&self) -> bool;

    /// Drop the materialized reference so the consumer re-reads from storage
    fn break_lineage(self) -> Self;

    fn clear_partition_values(self) -> Self;

    /// Project partition entries onto `allowed_columns`, dropping entries that become empty
    fn update_partition_values(self, allowed_columns: &[String]) -> Self;

    fn clear_dag_start(self) -> Self;

    fn with_data_object_id(self, data_object_id: impl Into<String>) -> Self;

    fn has_partition_values(&self) -> bool {
        !self.partition_values().is_empty()
    }
}

/// Feed carrying or referencing a dataset, with an optional row filter
#[derive(Debug, Clone)]
pub struct DataSubFeed {
    data_object_id: String,
    partition_values: Vec<PartitionValues>,
    dataset: Option<DatasetRef>,
    filter: Option<String>,
    is_dag_start: bool,
    is_skipped: bool,
    is_persisted: bool,
}

impl PartialEq for DataSubFeed {
    fn eq(&self, other: &Self) -> bool {
        self.data_object_id == other.data_object_id
            && self.partition_values == other.partition_values
            && same_dataset(&self.dataset, &other.dataset)
            && self.filter == other.filter
            && self.is_dag_start == other.is_dag_start
            && self.is_skipped == other.is_skipped
            && self.is_persisted == other.is_persisted
    }
}

impl DataSubFeed {
    pub fn new(data_object_id: impl Into<String>, partition_values: Vec<PartitionValues>) -> Self {
        Self {
            data_object_id: data_object_id.into(),
            partition_values: dedup_partition_values(partition_values),
            dataset: None,
            filter: None,
            is_dag_start: false,
            is_skipped: false,
            is_persisted: false,
        }
    }

    pub fn dag_start(data_object_id: impl Into<String>) -> Self {
        Self {
            is_dag_start: true,
            ..Self::new(data_object_id, Vec::new())
        }
    }

    /// Empty "no data" feed
    pub fn skipped(data_object_id: impl Into<String>) -> Self {
        Self {
            is_skipped: true,
            ..Self::new(data_object_id, Vec::new())
        }
    }

    /// Convert any feed kind into a data feed, keeping id, partition values and flags.
    /// References a data feed cannot represent (file lists) are discarded.
    pub fn from_generic(feed: SubFeed) -> Self {
        match feed {
            SubFeed::Data(data) => data,
            SubFeed::Init(init) => Self {
                is_dag_start: true,
                is_skipped: init.is_skipped,
                ..Self::new(init.data_object_id, init.partition_values)
            },
            SubFeed::File(file) => Self {
                is_dag_start: file.is_dag_start,
                is_skipped: file.is_skipped,
                ..Self::new(file.data_object_id, file.partition_values)
            },
        }
    }

    pub fn dataset(&self) -> Option<&DatasetRef> {
        self.dataset.as_ref()
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn is_persisted(&self) -> bool {
        self.is_persisted
    }

    pub fn with_dataset(mut self, dataset: DatasetRef) -> Self {
        self.dataset = Some(dataset);
        self.is_skipped = false;
        self
    }

    pub fn with_partition_values(mut self, partition_values: Vec<PartitionValues>) -> Self {
        self.partition_values = dedup_partition_values(partition_values);
        self
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_skipped(mut self, is_skipped: bool) -> Self {
        self.is_skipped = is_skipped;
        self
    }

    /// Mark the feed for reuse; the dataset is swapped for a persisted handle when the engine supports it
    pub fn persist(mut self) -> Self {
        if let Some(persisted) = self.dataset.as_ref().and_then(|ds| ds.persist()) {
            self.dataset = Some(persisted);
        }
        self.is_persisted = true;
        self
    }
}

impl SubFeedOps for DataSubFeed {
    fn data_object_id(&self) -> &str {
        &self.data_object_id
    }

    fn partition_values(&self) -> &[PartitionValues] {
        &self.partition_values
    }

    fn is_dag_start(&self) -> bool {
        self.is_dag_start
    }

    fn is_skipped(&self) -> bool {
        self.is_skipped
    }

    fn break_lineage(mut self) -> Self {
        self.dataset = None;
        self.is_persisted = false;
        self
    }

    fn clear_partition_values(mut self) -> Self {
        self.partition_values.clear();
        self
    }

    fn update_partition_values(mut self, allowed_columns: &[String]) -> Self {
        self.partition_values = project_partition_values(&self.partition_values, allowed_columns);
        self
    }

    fn clear_dag_start(mut self) -> Self {
        self.is_dag_start = false;
        self
    }

    fn with_data_object_id(mut self, data_object_id: impl Into<String>) -> Self {
        self.data_object_id = data_object_id.into();
        self
    }
}

/// Feed referencing a set of files instead of a dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSubFeed {
    data_object_id: String,
    partition_values: Vec<PartitionValues>,
    file_refs: Option<Vec<String>>,
    is_dag_start: bool,
    is_skipped: bool,
}

impl FileSubFeed {
    pub fn new(data_object_id: impl Into<String>, partition_values: Vec<PartitionValues>) -> Self {
        Self {
            data_object_id: data_object_id.into(),
            partition_values: dedup_partition_values(partition_values),
            file_refs: None,
            is_dag_start: false,
            is_skipped: false,
        }
    }

    pub fn from_generic(feed: SubFeed) -> Self {
        match feed {
            SubFeed::File(file) => file,
            SubFeed::Init(init) => Self {
                is_dag_start: true,
                is_skipped: init.is_skipped,
                ..Self::new(init.data_object_id, init.partition_values)
            },
            SubFeed::Data(data) => Self {
                is_dag_start: data.is_dag_start,
                is_skipped: data.is_skipped,
                ..Self::new(data.data_object_id, data.partition_values)
            },
        }
    }

    pub fn file_refs(&self) -> Option<&[String]> {
        self.file_refs.as_deref()
    }

    pub fn with_file_refs(mut self, file_refs: Vec<String>) -> Self {
        self.file_refs = Some(file_refs);
        self
    }
}

impl SubFeedOps for FileSubFeed {
    fn data_object_id(&self) -> &str {
        &self.data_object_id
    }

    fn partition_values(&self) -> &[PartitionValues] {
        &self.partition_values
    }

    fn is_dag_start(&self) -> bool {
        self.is_dag_start
    }

    fn is_skipped(&self) -> bool {
        self.is_skipped
    }

    fn break_lineage(mut self) -> Self {
        self.file_refs = None;
        self
    }

    fn clear_partition_values(mut self) -> Self {
        self.partition_values.clear();
        self
    }

    fn update_partition_values(mut self, allowed_columns: &[String]) -> Self {
        self.partition_values = project_partition_values(&self.partition_values, allowed_columns);
        self
    }

    fn clear_dag_start(mut self) -> Self {
        self.is_dag_start = false;
        self
    }

    fn with_data_object_id(mut self, data_object_id: impl Into<String>) -> Self {
        self.data_object_id = data_object_id.into();
        self
    }
}

/// Synthetic feed for DAG entry points. Always a DAG start, never carries data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitSubFeed {
    data_object_id: String,
    partition_values: Vec<PartitionValues>,
    is_skipped: bool,
}

impl InitSubFeed {
    pub fn new(data_object_id: impl Into<String>) -> Self {
        Self {
            data_object_id: data_object_id.into(),
            partition_values: Vec::new(),
            is_skipped: false,
        }
    }

    pub fn with_partition_values(mut self, partition_values: Vec<PartitionValues>) -> Self {
        self.partition_values = dedup_partition_values(partition_values);
        self
    }
}

impl SubFeedOps for InitSubFeed {
    fn data_object_id(&self) -> &str {
        &self.data_object_id
    }

    fn partition_values(&self) -> &[PartitionValues] {
        &self.partition_values
    }

    fn is_dag_start(&self) -> bool {
        true
    }

    fn is_skipped(&self) -> bool {
        self.is_skipped
    }

    fn break_lineage(self) -> Self {
        self
    }

    fn clear_partition_values(mut self) -> Self {
        self.partition_values.clear();
        self
    }

    fn update_partition_values(mut self, allowed_columns: &[String]) -> Self {
        self.partition_values = project_partition_values(&self.partition_values, allowed_columns);
        self
    }

    fn clear_dag_start(self) -> Self {
        self
    }

    fn with_data_object_id(mut self, data_object_id: impl Into<String>) -> Self {
        self.data_object_id = data_object_id.into();
        self
    }
}

/// Closed set of feed kinds that can travel along a DAG edge
#[derive(Debug, Clone, PartialEq)]
pub enum SubFeed {
    Init(InitSubFeed),
    Data(DataSubFeed),
    File(FileSubFeed),
}

impl SubFeed {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Data(_) => "data",
            Self::File(_) => "file",
        }
    }

    pub fn dataset(&self) -> Option<&DatasetRef> {
        match self {
            Self::Data(data) => data.dataset(),
            _ => None,
        }
    }
}

impl SubFeedOps for SubFeed {
    fn data_object_id(&self) -> &str {
        match self {
            Self::Init(f) => f.data_object_id(),
            Self::Data(f) => f.data_object_id(),
            Self::File(f) => f.data_object_id(),
        }
    }

    fn partition_values(&self) -> &[PartitionValues] {
        match self {
            Self::Init(f) => f.partition_values(),
            Self::Data(f) => f.partition_values(),
            Self::File(f) => f.partition_values(),
        }
    }

    fn is_dag_start(&self) -> bool {
        match self {
            Self::Init(f) => f.is_dag_start(),
            Self::Data(f) => f.is_dag_start(),
            Self::File(f) => f.is_dag_start(),
        }
    }

    fn is_skipped(&self) -> bool {
        match self {
            Self::Init(f) => f.is_skipped(),
            Self::Data(f) => f.is_skipped(),
            Self::File(f) => f.is_skipped(),
        }
    }

    fn break_lineage(self) -> Self {
        match self {
            Self::Init(f) => Self::Init(f.break_lineage()),
            Self::Data(f) => Self::Data(f.break_lineage()),
            Self::File(f) => Self::File(f.break_lineage()),
        }
    }

    fn clear_partition_values(self) -> Self {
        match self {
            Self::Init(f) => Self::Init(f.clear_partition_values()),
            Self::Data(f) => Self::Data(f.clear_partition_values()),
            Self::File(f) => Self::File(f.clear_partition_values()),
        }
    }

    fn update_partition_values(self, allowed_columns: &[String]) -> Self {
        match self {
            Self::Init(f) => Self::Init(f.update_partition_values(allowed_columns)),
            Self::Data(f) => Self::Data(f.update_partition_values(allowed_columns)),
            Self::File(f) => Self::File(f.update_partition_values(allowed_columns)),
        }
    }

    fn clear_dag_start(self) -> Self {
        match self {
            Self::Init(f) => Self::Init(f.clear_dag_start()),
            Self::Data(f) => Self::Data(f.clear_dag_start()),
            Self::File(f) => Self::File(f.clear_dag_start()),
        }
    }

    fn with_data_object_id(self, data_object_id: impl Into<String>) -> Self {
        match self {
            Self::Init(f) => Self::Init(f.with_data_object_id(data_object_id)),
            Self::Data(f) => Self::Data(f.with_data_object_id(data_object_id)),
            Self::File(f) => Self::File(f.with_data_object_id(data_object_id)),
        }
    }
}

impl From<DataSubFeed> for SubFeed {
    fn from(feed: DataSubFeed) -> Self {
        Self::Data(feed)
    }
}

impl From<FileSubFeed> for SubFeed {
    fn from(feed: FileSubFeed) -> Self {
        Self::File(feed)
    }
}

impl From<InitSubFeed> for SubFeed {
    fn from(feed: InitSubFeed) -> Self {
        Self::Init(feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct StaticDataset {
        schema: Schema,
    }

    impl Dataset for StaticDataset {
        fn schema(&self) -> &Schema {
            &self.schema
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn dataset() -> DatasetRef {
        Arc::new(StaticDataset {
            schema: Schema::from_columns(&[("p", "int")]),
        })
    }

    #[test]
    fn test_break_lineage_clears_dataset_and_is_terminal() {
        let feed = DataSubFeed::new("src", vec![PartitionValues::single("p", 1)])
            .with_dataset(dataset())
            .persist();
        assert!(feed.dataset().is_some());

        let broken = feed.break_lineage();
        assert!(broken.dataset().is_none());
        assert!(!broken.is_persisted());
        assert_eq!(broken.partition_values(), &[PartitionValues::single("p", 1)]);

        let again = broken.clone().break_lineage();
        assert_eq!(again, broken);
    }

    #[test]
    fn test_update_partition_values_is_idempotent() {
        let feed = SubFeed::Data(DataSubFeed::new(
            "src",
            vec![
                PartitionValues::new().with("p", 1).with("q", "a"),
                PartitionValues::new().with("p", 1).with("q", "b"),
            ],
        ));
        let columns = vec!["p".to_string()];
        let once = feed.update_partition_values(&columns);
        let twice = once.clone().update_partition_values(&columns);
        assert_eq!(once.partition_values(), &[PartitionValues::single("p", 1)]);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_update_partition_values_drops_empty_entries() {
        let feed = DataSubFeed::new("src", vec![PartitionValues::single("q", "a")]);
        let updated = feed.update_partition_values(&["p".to_string()]);
        assert!(!updated.has_partition_values());
    }

    #[test]
    fn test_from_generic_init_is_dag_start() {
        let init = SubFeed::Init(
            InitSubFeed::new("src").with_partition_values(vec![PartitionValues::single("p", 1)]),
        );
        let data = DataSubFeed::from_generic(init);
        assert!(data.is_dag_start());
        assert_eq!(data.data_object_id(), "src");
        assert_eq!(data.partition_values().len(), 1);
        assert!(data.dataset().is_none());
    }

    #[test]
    fn test_from_generic_file_discards_file_refs() {
        let file = FileSubFeed::new("raw", vec![PartitionValues::single("dt", "1")])
            .with_file_refs(vec!["raw/dt=1/a.csv".to_string()]);
        let data = DataSubFeed::from_generic(SubFeed::File(file));
        assert_eq!(data.data_object_id(), "raw");
        assert_eq!(data.partition_values(), &[PartitionValues::single("dt", "1")]);

        let back = FileSubFeed::from_generic(SubFeed::Data(data));
        assert!(back.file_refs().is_none());
    }

    #[test]
    fn test_new_dedups_partition_values() {
        let feed = DataSubFeed::new(
            "src",
            vec![PartitionValues::single("p", 1), PartitionValues::single("p", 1)],
        );
        assert_eq!(feed.partition_values().len(), 1);
    }

    #[test]
    fn test_relabel_and_clear_dag_start() {
        let feed = SubFeed::Data(DataSubFeed::dag_start("src"))
            .with_data_object_id("tgt")
            .clear_dag_start();
        assert_eq!(feed.data_object_id(), "tgt");
        assert!(!feed.is_dag_start());
        assert_eq!(feed.kind(), "data");
    }

    #[test]
    fn test_init_feed_stays_dag_start() {
        let init = InitSubFeed::new("src").clear_dag_start().break_lineage();
        assert!(init.is_dag_start());
    }

    #[test]
    fn test_skipped_feed_is_empty() {
        let feed = DataSubFeed::skipped("tgt");
        assert!(feed.is_skipped());
        assert!(feed.dataset().is_none());
        assert!(!feed.has_partition_values());
        assert!(!feed.with_dataset(dataset()).is_skipped());
    }
}
