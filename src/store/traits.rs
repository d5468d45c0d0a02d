//! `TableBackend` trait — the single async interface to the remote tables.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::query::Query;

/// One record, as the JSON object the service exchanges.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Remote tables used by the chatbot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Messages,
    Users,
    Contexts,
    Knowledge,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Messages => "messages",
            Table::Users => "users",
            Table::Contexts => "contexts",
            Table::Knowledge => "knowledge",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Backend-agnostic table access. Every method is exactly one remote call.
#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Insert rows. Returns the stored representation.
    async fn insert(&self, table: Table, rows: Vec<Row>) -> Result<Vec<Row>, StoreError>;

    /// Insert rows, or merge into existing rows whose `on_conflict` column matches.
    async fn upsert(
        &self,
        table: Table,
        rows: Vec<Row>,
        on_conflict: &str,
    ) -> Result<Vec<Row>, StoreError>;

    /// Filtered, ordered, limited read.
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>, StoreError>;

    /// Delete every row matching the query's filters. Returns the deleted rows.
    async fn delete(&self, table: Table, query: &Query) -> Result<Vec<Row>, StoreError>;
}
