// Memory Data Object
// In-memory partitioned table and the adapter that stores it

use crate::data_object::{DataObject, ExecutionPhase, Metrics, WriteOutcome};
use crate::error::AdapterError;
use crate::partition::{dedup_partition_values, PartitionValue, PartitionValues};
use crate::retry::{retry_with_policy, RetryPolicy};
use crate::schema::Schema;
use crate::subfeed::{downcast_dataset, DataSubFeed, Dataset, DatasetRef, SubFeedOps};

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub type Row = BTreeMap<String, serde_json::Value>;

/// Rows plus a schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    schema: Schema,
    rows: Vec<Row>,
}

impl MemoryTable {
    pub fn new(schema: Schema, rows: Vec<Row>) -> Self {
        Self { schema, rows }
    }

    /// Build a table from JSON objects; the schema is taken from the first row
    pub fn from_json_rows(rows: Vec<serde_json::Value>) -> Self {
        let rows: Vec<Row> = rows
            .into_iter()
            .filter_map(|row| match row {
                serde_json::Value::Object(map) => Some(map.into_iter().collect()),
                _ => None,
            })
            .collect();
        let schema = rows
            .first()
            .map(|row| {
                let columns: Vec<(&str, &str)> = row
                    .iter()
                    .map(|(name, value)| (name.as_str(), json_type_name(value)))
                    .collect();
                Schema::from_columns(&columns)
            })
            .unwrap_or_default();
        Self { schema, rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows falling into any of the given partitions; all rows if none are given
    pub fn filter_partitions(&self, partition_values: &[PartitionValues]) -> Self {
        if partition_values.is_empty() {
            return self.clone();
        }
        Self {
            schema: self.schema.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| partition_values.iter().any(|pv| pv.matches_row(row)))
                .cloned()
                .collect(),
        }
    }

    /// Rows matching a filter of the form `col = value [and col = value ...]`
    pub fn filter_expression(&self, expression: &str) -> Self {
        let conditions: Vec<(&str, &str)> = expression
            .split(" and ")
            .filter_map(|cond| cond.split_once('='))
            .map(|(col, value)| (col.trim(), value.trim().trim_matches('\'')))
            .collect();
        Self {
            schema: self.schema.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| {
                    conditions.iter().all(|(col, expected)| {
                        row.get(*col)
                            .and_then(PartitionValue::from_json)
                            .is_some_and(|v| v.to_string() == *expected)
                    })
                })
                .cloned()
                .collect(),
        }
    }

    /// Distinct partition values present in the rows for the given columns
    pub fn partition_values(&self, columns: &[String]) -> Vec<PartitionValues> {
        if columns.is_empty() {
            return Vec::new();
        }
        let mut values: Vec<PartitionValues> = self
            .rows
            .iter()
            .filter_map(|row| {
                columns
                    .iter()
                    .map(|col| {
                        row.get(col)
                            .and_then(PartitionValue::from_json)
                            .map(|v| (col.clone(), v))
                    })
                    .collect::<Option<PartitionValues>>()
            })
            .collect();
        values.sort();
        dedup_partition_values(values)
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(n) if n.is_i64() => "int",
        serde_json::Value::Number(_) => "double",
        _ => "string",
    }
}

impl Dataset for MemoryTable {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn row_count(&self) -> Option<usize> {
        Some(self.rows.len())
    }

    fn persist(&self) -> Option<DatasetRef> {
        Some(Arc::new(self.clone()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Data object backed by a `MemoryTable`, with call counters and failure injection for tests
#[derive(Debug)]
pub struct MemoryDataObject {
    id: String,
    partitions: Vec<String>,
    table: Mutex<Option<MemoryTable>>,
    retry: Option<RetryPolicy>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    write_attempts: AtomicUsize,
    /// Number of upcoming write attempts that fail with a transient error
    transient_failures: AtomicUsize,
    permanent_failure: Option<String>,
}

impl MemoryDataObject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            partitions: Vec::new(),
            table: Mutex::new(None),
            retry: None,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            write_attempts: AtomicUsize::new(0),
            transient_failures: AtomicUsize::new(0),
            permanent_failure: None,
        }
    }

    pub fn with_partitions<S: Into<String>>(
        mut self,
        partitions: impl IntoIterator<Item = S>,
    ) -> Self {
        self.partitions = partitions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_table(mut self, table: MemoryTable) -> Self {
        self.table = Mutex::new(Some(table));
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Make the next `count` write attempts fail with a transient error
    pub fn with_transient_write_failures(self, count: usize) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Make every write fail with a non-retryable error
    pub fn with_failing_writes(mut self, message: impl Into<String>) -> Self {
        self.permanent_failure = Some(message.into());
        self
    }

    pub async fn snapshot(&self) -> Option<MemoryTable> {
        self.table.lock().await.clone()
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    async fn try_write(
        &self,
        incoming: &MemoryTable,
        partition_values: &[PartitionValues],
    ) -> Result<WriteOutcome, AdapterError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.permanent_failure {
            return Err(AdapterError::new(&self.id, message.clone()));
        }
        let injected = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AdapterError::transient(&self.id, "simulated transient write failure"));
        }

        let (committed, incoming) = if partition_values.is_empty() || !self.is_partitioned() {
            (incoming.partition_values(&self.partitions), incoming.clone())
        } else {
            // Rows outside the requested partitions are not written
            let committed = dedup_partition_values(partition_values.to_vec());
            let selected = incoming.filter_partitions(&committed);
            (committed, selected)
        };

        let mut guard = self.table.lock().await;
        let table = match guard.take() {
            Some(existing) if self.is_partitioned() => {
                let mut rows: Vec<Row> = existing
                    .rows
                    .into_iter()
                    .filter(|row| !committed.iter().any(|pv| pv.matches_row(row)))
                    .collect();
                rows.extend(incoming.rows.iter().cloned());
                MemoryTable::new(incoming.schema.clone(), rows)
            }
            _ => incoming.clone(),
        };
        *guard = Some(table);
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut metrics = Metrics::new();
        metrics.insert("rows_written".to_string(), incoming.len().into());
        metrics.insert("partitions_written".to_string(), committed.len().into());

        Ok(WriteOutcome {
            partition_values: committed,
            metrics,
        })
    }
}

#[async_trait::async_trait]
impl DataObject for MemoryDataObject {
    fn id(&self) -> &str {
        &self.id
    }

    fn partitions(&self) -> &[String] {
        &self.partitions
    }

    async fn list_partition_values(&self) -> Result<Vec<PartitionValues>, AdapterError> {
        let guard = self.table.lock().await;
        Ok(guard
            .as_ref()
            .map(|table| table.partition_values(&self.partitions))
            .unwrap_or_default())
    }

    async fn prepare_for_read(
        &self,
        feed: DataSubFeed,
        phase: ExecutionPhase,
    ) -> Result<DataSubFeed, AdapterError> {
        if !self.is_partitioned() || !feed.has_partition_values() {
            return Ok(feed);
        }

        // Expand entries naming only some partition columns to the full existing entries
        let existing = self.list_partition_values().await?;
        let mut resolved = Vec::new();
        for pv in feed.partition_values() {
            if pv.len() == self.partitions.len() {
                resolved.push(pv.clone());
                continue;
            }
            let matches: Vec<PartitionValues> = existing
                .iter()
                .filter(|e| pv.is_included_in(e))
                .cloned()
                .collect();
            if matches.is_empty() {
                tracing::debug!(
                    data_object = %self.id,
                    %phase,
                    partition = %pv,
                    "No existing partitions to expand"
                );
                resolved.push(pv.clone());
            } else {
                resolved.extend(matches);
            }
        }
        Ok(feed.with_partition_values(resolved))
    }

    async fn materialize(&self, feed: &DataSubFeed) -> Result<DatasetRef, AdapterError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let guard = self.table.lock().await;
        let table = guard
            .as_ref()
            .ok_or_else(|| AdapterError::new(&self.id, "table does not exist"))?;
        let mut selected = table.filter_partitions(feed.partition_values());
        if let Some(filter) = feed.filter() {
            selected = selected.filter_expression(filter);
        }
        Ok(Arc::new(selected))
    }

    async fn write(
        &self,
        dataset: DatasetRef,
        partition_values: &[PartitionValues],
    ) -> Result<WriteOutcome, AdapterError> {
        let incoming = downcast_dataset::<MemoryTable>(&dataset)
            .ok_or_else(|| AdapterError::new(&self.id, "dataset is not a memory table"))?;

        match &self.retry {
            Some(policy) => {
                retry_with_policy(policy, "write", move |_| {
                    self.try_write(incoming, partition_values)
                })
                .await
            }
            None => self.try_write(incoming, partition_values).await,
        }
    }
}
