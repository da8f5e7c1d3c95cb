//! Query and metadata result models.
//!
//! These are the plain values the orchestrator serializes back to the
//! calling transport.

use serde::Serialize;
use serde_json::Value as JsonValue;

/// Metadata for one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub type_name: String,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Result of a single statement execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutput {
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    #[serde(rename = "fieldMetadata")]
    pub columns: Vec<ColumnMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    pub execution_time_ms: u64,
}

/// One column of a described table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub primary_key: bool,
}

/// One index of a described table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// `describe_table` result: columns plus indexes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescription {
    pub table: String,
    pub columns: Vec<TableColumn>,
    pub indexes: Vec<IndexEntry>,
}

/// One configured alias, credentials excluded, for `list_configured`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasSummary {
    pub alias: String,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_output_serializes_camel_case_field_names() {
        let out = QueryOutput {
            rows: Vec::new(),
            columns: vec![ColumnMetadata::new("id", "INT")],
            rows_affected: Some(0),
            execution_time_ms: 12,
        };
        let json = serde_json::to_value(&out).unwrap();
        assert!(json.get("fieldMetadata").is_some());
        assert!(json.get("rowsAffected").is_some());
        assert!(json.get("executionTimeMs").is_some());
    }

    #[test]
    fn test_rows_affected_omitted_when_absent() {
        let out = QueryOutput {
            rows: Vec::new(),
            columns: Vec::new(),
            rows_affected: None,
            execution_time_ms: 1,
        };
        let json = serde_json::to_value(&out).unwrap();
        assert!(json.get("rowsAffected").is_none());
    }
}
