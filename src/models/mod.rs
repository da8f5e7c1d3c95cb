//! Data models for the multi-backend access core.

pub mod connection;
pub mod query;

pub use connection::{
    AliasTable, BackendType, ConnectionConfig, ConnectionOverride, FieldOverrides,
    redact_credentials,
};
pub use query::{
    AliasSummary, ColumnMetadata, IndexEntry, QueryOutput, TableColumn, TableDescription,
};
