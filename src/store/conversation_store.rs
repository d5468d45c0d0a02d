//! ConversationStore — chatbot operations over the remote tables.
//!
//! Each public operation makes at most one backend call and never returns an
//! error: failures are logged once at `ERROR` and turned into `None`, an
//! empty `Vec`, or `false`. The `try_*` twins return the underlying
//! [`StoreError`] instead, for callers that need to tell "empty" from
//! "failed".

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::error::{ConfigError, StoreError};
use crate::store::models::{
    self, ContextRecord, KnowledgeEntry, Message, UserProfile, from_row, to_row,
};
use crate::store::query::{Direction, Query, TextSearch};
use crate::store::rest_backend::RestBackend;
use crate::store::traits::{Row, Table, TableBackend};

/// History length used when the caller has no preference.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Chatbot-facing store. Cheap to clone; clones share the backend handle.
#[derive(Clone)]
pub struct ConversationStore {
    backend: Arc<dyn TableBackend>,
}

impl ConversationStore {
    pub fn new(backend: Arc<dyn TableBackend>) -> Self {
        Self { backend }
    }

    /// Build a store over the REST backend described by `config`.
    pub fn connect(config: &StoreConfig) -> Result<Self, ConfigError> {
        let backend = RestBackend::connect(config)?;
        info!(url = %config.url, "Connected to table service");
        Ok(Self::new(Arc::new(backend)))
    }

    /// The shared connection handle.
    pub fn backend(&self) -> &Arc<dyn TableBackend> {
        &self.backend
    }

    // ── Messages ────────────────────────────────────────────────────

    /// Save one chat line. Returns the stored record.
    pub async fn save_message(&self, user_id: &str, body: &str, is_bot: bool) -> Option<Message> {
        self.try_save_message(user_id, body, is_bot)
            .await
            .map_err(|e| error!(user_id = user_id, error = %e, "Failed to save message"))
            .ok()
    }

    pub async fn try_save_message(
        &self,
        user_id: &str,
        body: &str,
        is_bot: bool,
    ) -> Result<Message, StoreError> {
        require_user_id(user_id)?;
        let message = Message {
            id: None,
            user_id: user_id.to_string(),
            body: body.to_string(),
            is_bot,
            timestamp: models::now(),
        };
        let rows = self
            .backend
            .insert(Table::Messages, vec![to_row(&message)?])
            .await?;
        let stored = first_or(rows, message)?;
        info!(user_id = user_id, is_bot = is_bot, "Message saved");
        Ok(stored)
    }

    /// Most recent messages for a user, newest first, at most `limit`.
    pub async fn get_history(&self, user_id: &str, limit: usize) -> Vec<Message> {
        self.try_get_history(user_id, limit)
            .await
            .unwrap_or_else(|e| {
                error!(user_id = user_id, error = %e, "Failed to get history");
                Vec::new()
            })
    }

    pub async fn try_get_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        require_user_id(user_id)?;
        if limit == 0 {
            return Err(StoreError::Validation("history limit must be at least 1".into()));
        }
        let query = Query::new()
            .eq("user_id", user_id)
            .order("timestamp", Direction::Desc)
            .limit(limit);
        let rows = self.backend.select(Table::Messages, &query).await?;
        let mut messages: Vec<Message> = decode_rows(rows, Table::Messages);
        // The service honours limit; this guards backends that don't.
        messages.truncate(limit);
        debug!(user_id = user_id, count = messages.len(), "History loaded");
        Ok(messages)
    }

    /// Delete every message of a user. `true` once the delete completed.
    pub async fn delete_history(&self, user_id: &str) -> bool {
        match self.try_delete_history(user_id).await {
            Ok(_) => true,
            Err(e) => {
                error!(user_id = user_id, error = %e, "Failed to delete history");
                false
            }
        }
    }

    /// Returns how many messages were removed, when the backend reports them.
    pub async fn try_delete_history(&self, user_id: &str) -> Result<usize, StoreError> {
        require_user_id(user_id)?;
        let query = Query::new().eq("user_id", user_id);
        let deleted = self.backend.delete(Table::Messages, &query).await?;
        info!(user_id = user_id, deleted = deleted.len(), "History deleted");
        Ok(deleted.len())
    }

    // ── Users ───────────────────────────────────────────────────────

    /// Create or replace a user profile. `extra_fields` are merged in last, so
    /// they may override `name` and `last_seen`; `id` always stays `user_id`.
    pub async fn upsert_user(
        &self,
        user_id: &str,
        name: &str,
        extra_fields: Map<String, Value>,
    ) -> Option<UserProfile> {
        self.try_upsert_user(user_id, name, extra_fields)
            .await
            .map_err(|e| error!(user_id = user_id, error = %e, "Failed to upsert user"))
            .ok()
    }

    pub async fn try_upsert_user(
        &self,
        user_id: &str,
        name: &str,
        extra_fields: Map<String, Value>,
    ) -> Result<UserProfile, StoreError> {
        require_user_id(user_id)?;
        let mut row = to_row(&UserProfile {
            id: user_id.to_string(),
            name: name.to_string(),
            last_seen: models::now(),
            extra: Map::new(),
        })?;
        row.extend(extra_fields);
        // The conflict key; an extra `id` would upsert some other user.
        row.insert("id".into(), Value::String(user_id.to_string()));
        let rows = self
            .backend
            .upsert(Table::Users, vec![row.clone()], "id")
            .await?;
        let stored: UserProfile = match rows.into_iter().next() {
            Some(returned) => from_row(returned)?,
            None => from_row(row)?,
        };
        info!(user_id = user_id, "User upserted");
        Ok(stored)
    }

    // ── Context ─────────────────────────────────────────────────────

    /// Store the conversational context for a user, replacing any previous one.
    pub async fn save_context<T>(&self, user_id: &str, context: &T) -> Option<ContextRecord>
    where
        T: Serialize + ?Sized,
    {
        self.try_save_context(user_id, context)
            .await
            .map_err(|e| error!(user_id = user_id, error = %e, "Failed to save context"))
            .ok()
    }

    pub async fn try_save_context<T>(
        &self,
        user_id: &str,
        context: &T,
    ) -> Result<ContextRecord, StoreError>
    where
        T: Serialize + ?Sized,
    {
        require_user_id(user_id)?;
        let context = serde_json::to_value(context)
            .map_err(|e| StoreError::Validation(format!("context not serializable: {e}")))?;
        let record = ContextRecord {
            user_id: user_id.to_string(),
            context,
            updated_at: models::now(),
        };
        let rows = self
            .backend
            .upsert(Table::Contexts, vec![to_row(&record)?], "user_id")
            .await?;
        let stored = first_or(rows, record)?;
        debug!(user_id = user_id, "Context saved");
        Ok(stored)
    }

    /// The saved context payload, or `None` when there is none or the read failed.
    pub async fn get_context(&self, user_id: &str) -> Option<Value> {
        self.try_get_context(user_id)
            .await
            .unwrap_or_else(|e| {
                error!(user_id = user_id, error = %e, "Failed to get context");
                None
            })
    }

    /// `Ok(None)` means no context is stored for the user.
    pub async fn try_get_context(&self, user_id: &str) -> Result<Option<Value>, StoreError> {
        require_user_id(user_id)?;
        let query = Query::new().columns("context").eq("user_id", user_id).limit(1);
        let rows = self.backend.select(Table::Contexts, &query).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove("context"))
            .filter(|ctx| !ctx.is_null()))
    }

    // ── Knowledge ───────────────────────────────────────────────────

    /// Full-text search over the knowledge base `content` column.
    pub async fn search_knowledge(&self, query: &str) -> Vec<KnowledgeEntry> {
        self.try_search_knowledge(query).await.unwrap_or_else(|e| {
            error!(query = query, error = %e, "Knowledge search failed");
            Vec::new()
        })
    }

    pub async fn try_search_knowledge(&self, query: &str) -> Result<Vec<KnowledgeEntry>, StoreError> {
        self.try_search_knowledge_with(query, TextSearch::default())
            .await
    }

    /// Search with an explicit text-search flavour.
    pub async fn try_search_knowledge_with(
        &self,
        query: &str,
        mode: TextSearch,
    ) -> Result<Vec<KnowledgeEntry>, StoreError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(StoreError::Validation("search query is empty".into()));
        }
        let q = Query::new().text_search("content", query, mode);
        let rows = self.backend.select(Table::Knowledge, &q).await?;
        let entries: Vec<KnowledgeEntry> = decode_rows(rows, Table::Knowledge);
        debug!(query = query, count = entries.len(), "Knowledge search done");
        Ok(entries)
    }
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore").finish_non_exhaustive()
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn require_user_id(user_id: &str) -> Result<(), StoreError> {
    if user_id.trim().is_empty() {
        return Err(StoreError::Validation("user_id must not be empty".into()));
    }
    Ok(())
}

/// Decode each row, skipping (and logging) any that don't fit `T`.
fn decode_rows<T>(rows: Vec<Row>, table: Table) -> Vec<T>
where
    T: for<'de> serde::Deserialize<'de>,
{
    rows.into_iter()
        .filter_map(|row| match from_row(row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(table = %table, error = %e, "Skipping undecodable row");
                None
            }
        })
        .collect()
}

/// First returned row decoded, or `sent` when the backend echoed nothing.
fn first_or<T>(rows: Vec<Row>, sent: T) -> Result<T, StoreError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    match rows.into_iter().next() {
        Some(row) => from_row(row),
        None => Ok(sent),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
