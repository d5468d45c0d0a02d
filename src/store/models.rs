//! Record types for the four chatbot tables.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::store::traits::Row;

/// One chat line, from the user or the bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Backend-assigned key; absent until stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub user_id: String,
    pub body: String,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_bot: bool,
    #[serde(default, with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// A chatbot user, keyed on `id`. Unknown columns land in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    #[serde(default, with = "timestamp")]
    pub last_seen: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Conversational state for one user, keyed on `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub user_id: String,
    pub context: Value,
    #[serde(default, with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// A knowledge-base article. Only `content` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub content: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Current time at the precision Postgres stores.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn to_row<T: Serialize>(record: &T) -> Result<Row, StoreError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Validation(format!(
            "record must serialize to an object, got {other}"
        ))),
        Err(e) => Err(StoreError::Validation(format!("record not serializable: {e}"))),
    }
}

pub(crate) fn from_row<T: for<'de> Deserialize<'de>>(row: Row) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

fn null_as_false<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Parse the timestamp spellings found in the tables into DateTime<Utc>.
///
/// Unparseable values become `DateTime::<Utc>::MIN_UTC` rather than failing
/// the whole row.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // RFC 3339 first (our canonical write format and timestamptz output)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // Postgres text output: space separator, short offset
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return dt.with_timezone(&Utc);
    }
    // Naive ISO-8601, with `T` or space, as written by some clients
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return ndt.and_utc();
        }
    }
    DateTime::<Utc>::MIN_UTC
}

/// RFC 3339 with fixed microsecond precision, so stored strings sort by time.
mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?
            .map(|s| super::parse_datetime(&s))
            .unwrap_or(DateTime::<Utc>::MIN_UTC))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn message_timestamp_has_fixed_precision() {
        let msg = Message {
            id: None,
            user_id: "u1".into(),
            body: "hi".into(),
            is_bot: false,
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let row = to_row(&msg).unwrap();
        assert_eq!(row["timestamp"], json!("2024-05-01T10:00:00.000000Z"));
        assert!(!row.contains_key("id"));
    }

    #[test]
    fn parses_postgres_and_naive_timestamps() {
        let row = json!({
            "id": 12,
            "user_id": "u1",
            "body": "hi",
            "is_bot": true,
            "timestamp": "2024-05-01T10:00:00.123456+00:00"
        });
        let msg: Message = from_row(row.as_object().unwrap().clone()).unwrap();
        assert_eq!(msg.id, Some(json!(12)));
        assert!(msg.is_bot);

        let naive = json!({
            "user_id": "u1",
            "context": {},
            "updated_at": "2024-05-01T10:00:00.5"
        });
        let ctx: ContextRecord = from_row(naive.as_object().unwrap().clone()).unwrap();
        assert_eq!(ctx.updated_at.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn user_extra_fields_flatten() {
        let row = json!({
            "id": "u1",
            "name": "Demo",
            "last_seen": "2024-05-01T10:00:00Z",
            "email": "demo@example.com"
        });
        let user: UserProfile = from_row(row.as_object().unwrap().clone()).unwrap();
        assert_eq!(user.extra["email"], json!("demo@example.com"));
        assert!(!user.extra.contains_key("name"));
    }

    #[test]
    fn lenient_message_fields() {
        let row = json!({
            "user_id": "u1",
            "body": "legacy",
            "is_bot": null,
            "timestamp": "01/05/2024 10:00"
        });
        let msg: Message = from_row(row.as_object().unwrap().clone()).unwrap();
        assert!(!msg.is_bot);
        assert_eq!(msg.timestamp, DateTime::<Utc>::MIN_UTC);

        let sparse = json!({"user_id": "u1", "body": "no flag, no time"});
        let msg: Message = from_row(sparse.as_object().unwrap().clone()).unwrap();
        assert!(!msg.is_bot);
    }

    #[test]
    fn parse_datetime_formats() {
        let expected = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_datetime("2024-05-01T10:00:00+00:00"), expected);
        assert_eq!(parse_datetime("2024-05-01 10:00:00+00"), expected);
        assert_eq!(parse_datetime("2024-05-01 12:00:00+02"), expected);
        assert_eq!(parse_datetime("2024-05-01 10:00:00"), expected);
        assert_eq!(parse_datetime("garbage"), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn knowledge_requires_content() {
        let err = from_row::<KnowledgeEntry>(json!({"title": "x"}).as_object().unwrap().clone())
            .unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[test]
    fn now_is_truncated_to_micros() {
        assert_eq!(now().timestamp_subsec_nanos() % 1_000, 0);
    }
}
