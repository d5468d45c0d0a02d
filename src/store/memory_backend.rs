//! In-memory backend — same observable semantics as the REST service.
//!
//! Used by tests and local development in place of the remote tables.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::store::query::{Direction, Query, Search, TextSearch};
use crate::store::traits::{Row, Table, TableBackend};

/// Fake table service holding rows in process memory.
#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<Table, Vec<Row>>>,
    next_id: AtomicI64,
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable service: every call fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    /// Number of backend calls made so far, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// Seed rows directly, bypassing the call counter.
    pub async fn seed(&self, table: Table, rows: Vec<Row>) {
        self.tables.write().await.entry(table).or_default().extend(rows);
    }

    /// Snapshot of a table's rows in storage order.
    pub async fn rows(&self, table: Table) -> Vec<Row> {
        self.tables
            .read()
            .await
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    fn begin_call(&self, op: &str, table: Table) -> Result<(), StoreError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Network(format!(
                "{op} {table}: backend unreachable"
            )));
        }
        debug!(table = %table, op = op, "Memory backend call");
        Ok(())
    }

    fn assign_id(&self, row: &mut Row) {
        if !row.contains_key("id") {
            let id = self.next_id.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            row.insert("id".to_string(), Value::from(id));
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn row_matches(row: &Row, query: &Query) -> bool {
    let filters_ok = query
        .filters
        .iter()
        .all(|f| row.get(&f.column).unwrap_or(&Value::Null) == &f.value);
    filters_ok && query.search.as_ref().is_none_or(|s| search_matches(row, s))
}

fn search_matches(row: &Row, search: &Search) -> bool {
    let Some(text) = row.get(&search.column).and_then(Value::as_str) else {
        return false;
    };
    let haystack = text.to_lowercase();
    let needle = search.query.to_lowercase();
    match search.mode {
        TextSearch::Phrase => haystack.contains(needle.trim()),
        TextSearch::Plain | TextSearch::Websearch | TextSearch::Raw => needle
            .split(|c: char| !c.is_alphanumeric())
            .filter(|term| !term.is_empty())
            .all(|term| haystack.contains(term)),
    }
}

/// Strings lexicographic, numbers numeric, bools false<true; missing/null last.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .unwrap_or(0.0)
            .total_cmp(&y.as_f64().unwrap_or(0.0)),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

fn project(row: &Row, columns: Option<&str>) -> Row {
    match columns.map(str::trim) {
        None | Some("*") => row.clone(),
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter_map(|col| row.get(col).map(|v| (col.to_string(), v.clone())))
            .collect(),
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl TableBackend for MemoryBackend {
    async fn insert(&self, table: Table, rows: Vec<Row>) -> Result<Vec<Row>, StoreError> {
        self.begin_call("insert", table)?;
        let mut stored = Vec::with_capacity(rows.len());
        let mut tables = self.tables.write().await;
        let target = tables.entry(table).or_default();
        for mut row in rows {
            self.assign_id(&mut row);
            target.push(row.clone());
            stored.push(row);
        }
        Ok(stored)
    }

    async fn upsert(
        &self,
        table: Table,
        rows: Vec<Row>,
        on_conflict: &str,
    ) -> Result<Vec<Row>, StoreError> {
        self.begin_call("upsert", table)?;
        let mut stored = Vec::with_capacity(rows.len());
        let mut tables = self.tables.write().await;
        let target = tables.entry(table).or_default();
        for row in rows {
            let key = row.get(on_conflict).cloned().ok_or_else(|| {
                StoreError::Rejected {
                    status: 400,
                    message: format!("upsert row is missing conflict column '{on_conflict}'"),
                }
            })?;
            match target.iter_mut().find(|r| r.get(on_conflict) == Some(&key)) {
                Some(existing) => {
                    existing.extend(row);
                    stored.push(existing.clone());
                }
                None => {
                    target.push(row.clone());
                    stored.push(row);
                }
            }
        }
        Ok(stored)
    }

    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>, StoreError> {
        self.begin_call("select", table)?;
        let tables = self.tables.read().await;
        let mut found: Vec<&Row> = tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| row_matches(r, query)).collect())
            .unwrap_or_default();

        if let Some(order) = &query.order {
            found.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.column), b.get(&order.column));
                match order.direction {
                    Direction::Asc => ord,
                    // Nulls stay last when descending too.
                    Direction::Desc => match (a.get(&order.column), b.get(&order.column)) {
                        (Some(x), Some(y)) if !x.is_null() && !y.is_null() => ord.reverse(),
                        _ => ord,
                    },
                }
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(found
            .into_iter()
            .take(limit)
            .map(|r| project(r, query.columns.as_deref()))
            .collect())
    }

    async fn delete(&self, table: Table, query: &Query) -> Result<Vec<Row>, StoreError> {
        if !query.has_filters() {
            return Err(StoreError::Validation(format!(
                "refusing unfiltered delete on {table}"
            )));
        }
        self.begin_call("delete", table)?;
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(&table) else {
            return Ok(Vec::new());
        };
        let (deleted, kept): (Vec<Row>, Vec<Row>) =
            rows.drain(..).partition(|r| row_matches(r, query));
        *rows = kept;
        Ok(deleted)
    }
}
