// Data Objects
// Adapter contract for reading and writing a concrete dataset

pub mod memory;

pub use memory::{MemoryDataObject, MemoryTable};

use crate::error::{ActionError, AdapterError};
use crate::partition::PartitionValues;
use crate::schema::{PartitionColumnDiff, Schema};
use crate::subfeed::{DataSubFeed, DatasetRef};

use std::collections::BTreeMap;
use std::fmt;

/// Which traversal of the DAG is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionPhase {
    /// Dry run: validate shapes and decide what to process, no writes
    Init,
    /// Materialize and write
    Exec,
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Exec => write!(f, "exec"),
        }
    }
}

/// Metrics reported by an adapter after a write
pub type Metrics = BTreeMap<String, serde_json::Value>;

/// What a write actually committed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOutcome {
    pub partition_values: Vec<PartitionValues>,
    pub metrics: Metrics,
}

/// Read/write access to one dataset in external storage.
///
/// Only `id` and `partitions` are required; the defaults describe an object
/// that cannot be read or written, which is enough for validation and planning.
#[async_trait::async_trait]
pub trait DataObject: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    /// Partition columns this data object supports, in declaration order
    fn partitions(&self) -> &[String];

    fn is_partitioned(&self) -> bool {
        !self.partitions().is_empty()
    }

    /// Partition values that currently exist in storage
    async fn list_partition_values(&self) -> Result<Vec<PartitionValues>, AdapterError> {
        Ok(Vec::new())
    }

    /// Resolve missing partition columns and refresh metadata before reading.
    ///
    /// Must not fail just because data does not exist yet during `ExecutionPhase::Init`.
    async fn prepare_for_read(
        &self,
        feed: DataSubFeed,
        _phase: ExecutionPhase,
    ) -> Result<DataSubFeed, AdapterError> {
        Ok(feed)
    }

    /// Read the partitions (and filter) selected by the feed
    async fn materialize(&self, _feed: &DataSubFeed) -> Result<DatasetRef, AdapterError> {
        Err(AdapterError::unsupported(self.id(), "materialize"))
    }

    /// Check that a feed with these partition columns and schema could be written. No I/O.
    fn validate_write(
        &self,
        partition_columns: &[String],
        schema: Option<&Schema>,
    ) -> Result<(), ActionError> {
        let declared = self.partitions();
        let diff = PartitionColumnDiff {
            missing: match schema {
                Some(schema) => declared
                    .iter()
                    .filter(|c| !schema.contains(c))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            },
            unexpected: partition_columns
                .iter()
                .filter(|c| !declared.contains(c))
                .cloned()
                .collect(),
        };

        if diff.is_empty() {
            Ok(())
        } else {
            Err(ActionError::SchemaMismatch {
                data_object_id: self.id().to_string(),
                missing: diff.missing,
                unexpected: diff.unexpected,
            })
        }
    }

    /// Write the dataset, overwriting the given partitions
    async fn write(
        &self,
        _dataset: DatasetRef,
        _partition_values: &[PartitionValues],
    ) -> Result<WriteOutcome, AdapterError> {
        Err(AdapterError::unsupported(self.id(), "write"))
    }
}
