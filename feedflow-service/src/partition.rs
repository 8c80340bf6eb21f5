// Partition Values
// Immutable column -> value partition identity used to select subsets of a data object

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Scalar value of a single partition column
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartitionValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl PartitionValue {
    /// Convert a JSON scalar into a partition value. Non-scalars have no partition identity.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n.as_i64().map(Self::Int),
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for PartitionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for PartitionValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PartitionValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for PartitionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for PartitionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// One partition entry: a mapping from partition column name to value.
///
/// Columns are kept sorted so that equality, ordering and display do not
/// depend on insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionValues {
    elements: BTreeMap<String, PartitionValue>,
}

impl PartitionValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-column entry, e.g. `PartitionValues::single("dt", "2024-01-01")`
    pub fn single(column: impl Into<String>, value: impl Into<PartitionValue>) -> Self {
        Self::new().with(column, value)
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<PartitionValue>) -> Self {
        self.elements.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&PartitionValue> {
        self.elements.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PartitionValue)> {
        self.elements.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Keep only the given columns
    pub fn project(&self, columns: &[String]) -> Self {
        Self {
            elements: self
                .elements
                .iter()
                .filter(|(k, _)| columns.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// True if every column of `self` exists in `other` with the same value
    pub fn is_included_in(&self, other: &PartitionValues) -> bool {
        self.elements
            .iter()
            .all(|(k, v)| other.elements.get(k) == Some(v))
    }

    /// True if the given row (column -> JSON value) falls into this partition
    pub fn matches_row(&self, row: &BTreeMap<String, serde_json::Value>) -> bool {
        self.elements.iter().all(|(k, v)| {
            row.get(k)
                .and_then(PartitionValue::from_json)
                .is_some_and(|rv| &rv == v)
        })
    }
}

impl fmt::Display for PartitionValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .elements
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        write!(f, "{}", parts.join("/"))
    }
}

impl<K, V> FromIterator<(K, V)> for PartitionValues
where
    K: Into<String>,
    V: Into<PartitionValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            elements: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Remove duplicate entries, keeping the first occurrence
pub fn dedup_partition_values(values: Vec<PartitionValues>) -> Vec<PartitionValues> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|pv| seen.insert(pv.clone()))
        .collect()
}

/// Project every entry onto `columns`, dropping entries that become empty, then dedup.
///
/// Applying this twice with the same columns yields the same result as once.
pub fn project_partition_values(
    values: &[PartitionValues],
    columns: &[String],
) -> Vec<PartitionValues> {
    dedup_partition_values(
        values
            .iter()
            .map(|pv| pv.project(columns))
            .filter(|pv| !pv.is_empty())
            .collect(),
    )
}

/// Union of all columns referenced by the given entries
pub fn partition_columns(values: &[PartitionValues]) -> BTreeSet<String> {
    values
        .iter()
        .flat_map(|pv| pv.columns().map(str::to_string))
        .collect()
}

/// Human readable list, e.g. `[dt=2024-01-01, dt=2024-01-02]`
pub fn format_partition_values(values: &[PartitionValues]) -> String {
    let parts: Vec<String> = values.iter().map(|pv| pv.to_string()).collect();
    format!("[{}]", parts.join(", "))
}
