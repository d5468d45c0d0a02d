//! REST backend — `TableBackend` over a PostgREST-style HTTP API.
//!
//! Every trait call maps to exactly one HTTP request against
//! `{url}/rest/v1/{table}`. No retries, no local timeout.

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{ConfigError, StoreError};
use crate::store::query::Query;
use crate::store::traits::{Row, Table, TableBackend};

const PREFER_REPRESENTATION: &str = "return=representation";
const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=representation";

/// Shared connection handle to the remote table service.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct RestBackend {
    base_url: String,
    client: reqwest::Client,
}

impl RestBackend {
    /// Build the handle. Fails only if the key cannot be sent as a header.
    pub fn connect(config: &StoreConfig) -> Result<Self, ConfigError> {
        let key = config.access_key.expose_secret();

        let mut headers = HeaderMap::new();
        let mut apikey = HeaderValue::from_str(key).map_err(|e| ConfigError::InvalidValue {
            key: crate::config::ACCESS_KEY_VAR.to_string(),
            message: format!("not a valid header value: {e}"),
        })?;
        apikey.set_sensitive(true);
        let mut bearer =
            HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| ConfigError::InvalidValue {
                key: crate::config::ACCESS_KEY_VAR.to_string(),
                message: format!("not a valid header value: {e}"),
            })?;
        bearer.set_sensitive(true);
        headers.insert("apikey", apikey);
        headers.insert(header::AUTHORIZATION, bearer);
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.name())
    }

    fn request(&self, method: Method, table: Table) -> RequestBuilder {
        self.client.request(method, self.table_url(table))
    }
}

impl std::fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

async fn send(request: RequestBuilder, table: Table, op: &str) -> Result<Vec<Row>, StoreError> {
    let response = request
        .send()
        .await
        .map_err(|e| StoreError::Network(format!("{op} {table}: {e}")))?;
    read_rows(response, table, op).await
}

async fn read_rows(response: Response, table: Table, op: &str) -> Result<Vec<Row>, StoreError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| StoreError::Network(format!("{op} {table}: reading body: {e}")))?;

    if !status.is_success() {
        return Err(status_error(status, &body));
    }

    debug!(table = %table, op = op, status = status.as_u16(), "Backend call succeeded");

    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str::<Vec<Row>>(&body)
        .map_err(|e| StoreError::Decode(format!("{op} {table}: {e}")))
}

/// Map a non-2xx response to a store error, preferring the PostgREST `message`.
fn status_error(status: StatusCode, body: &str) -> StoreError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    let status = status.as_u16();
    match status {
        401 | 403 => StoreError::Auth { status, message },
        _ => StoreError::Rejected { status, message },
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl TableBackend for RestBackend {
    async fn insert(&self, table: Table, rows: Vec<Row>) -> Result<Vec<Row>, StoreError> {
        let request = self
            .request(Method::POST, table)
            .header("Prefer", PREFER_REPRESENTATION)
            .json(&rows);
        send(request, table, "insert").await
    }

    async fn upsert(
        &self,
        table: Table,
        rows: Vec<Row>,
        on_conflict: &str,
    ) -> Result<Vec<Row>, StoreError> {
        let request = self
            .request(Method::POST, table)
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", PREFER_UPSERT)
            .json(&rows);
        send(request, table, "upsert").await
    }

    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>, StoreError> {
        let request = self.request(Method::GET, table).query(&query.to_params());
        send(request, table, "select").await
    }

    async fn delete(&self, table: Table, query: &Query) -> Result<Vec<Row>, StoreError> {
        // PostgREST would wipe the table; refuse before sending.
        if !query.has_filters() {
            return Err(StoreError::Validation(format!(
                "refusing unfiltered delete on {table}"
            )));
        }
        let request = self
            .request(Method::DELETE, table)
            .query(&query.filter_params())
            .header("Prefer", PREFER_REPRESENTATION);
        send(request, table, "delete").await
    }
}
