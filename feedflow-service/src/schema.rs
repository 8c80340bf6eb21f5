// Schema
// Minimal column description used to validate outputs before anything is written

use serde::{Deserialize, Serialize};

/// A single column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type", default = "default_data_type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_data_type() -> String {
    "string".to_string()
}

fn default_nullable() -> bool {
    true
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Build a schema from `(name, type)` pairs
    pub fn from_columns(columns: &[(&str, &str)]) -> Self {
        Self {
            fields: columns
                .iter()
                .map(|(name, data_type)| Field::new(*name, *data_type))
                .collect(),
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.iter().any(|f| f.name == column)
    }

    pub fn field(&self, column: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == column)
    }
}

/// Difference between the partition columns a data object declares and what a feed provides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionColumnDiff {
    /// Declared but not provided
    pub missing: Vec<String>,
    /// Provided but not declared
    pub unexpected: Vec<String>,
}

impl PartitionColumnDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

pub fn diff_partition_columns(expected: &[String], actual: &[String]) -> PartitionColumnDiff {
    PartitionColumnDiff {
        missing: expected
            .iter()
            .filter(|c| !actual.contains(c))
            .cloned()
            .collect(),
        unexpected: actual
            .iter()
            .filter(|c| !expected.contains(c))
            .cloned()
            .collect(),
    }
}
