//! Event records flowing through the job

use crate::config::EventDateField;
use crate::types::JsonObject;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One event row read from the events table
///
/// `org` and `org_sync_date` are outputs filled in by the enricher. Columns
/// outside the fixed set are kept in `extra` and written back out unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,

    #[serde(default, deserialize_with = "lenient_i64")]
    pub post_id: Option<i64>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub post_slug: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub post_date: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub event: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub useragent: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub subject: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub ip: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub channel: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub org: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub org_sync_date: Option<String>,

    /// Source columns outside the fixed set
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl EventRecord {
    /// Record for a user at a post date, the minimum the enricher needs
    pub fn new(email: impl Into<String>, post_date: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            post_date: Some(post_date.into()),
            ..Self::default()
        }
    }

    /// Convert a warehouse row into a record
    pub fn from_row(row: JsonObject) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(row))
    }

    /// Lowercased email used as the timeline key
    pub fn user_key(&self) -> Option<String> {
        self.email.as_deref().map(str::to_lowercase)
    }

    /// Date the record is attributed at
    pub fn date(&self, field: EventDateField) -> Option<&str> {
        match field {
            EventDateField::PostDate => self.post_date.as_deref(),
            EventDateField::Timestamp => self.timestamp.as_deref(),
        }
    }
}

/// Accept any scalar and keep its text form; objects and arrays are re-encoded as JSON
fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    })
}

/// Accept integers and integer strings
fn lenient_i64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error> {
    use serde::de::Error as _;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("post_id {n} is not an integer"))),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("post_id '{s}' is not an integer"))),
        other => Err(D::Error::custom(format!(
            "post_id has unsupported type: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_from_row_fixed_columns() {
        let record = EventRecord::from_row(row(json!({
            "email": "A@x.com",
            "post_id": 42,
            "post_slug": "hello-world",
            "post_date": "2020-06-01 00:00:00",
            "timestamp": "2020-06-02 10:00:00",
            "event": "open",
            "channel": "celltelligence"
        })))
        .unwrap();

        assert_eq!(record.email.as_deref(), Some("A@x.com"));
        assert_eq!(record.post_id, Some(42));
        assert_eq!(record.user_key().as_deref(), Some("a@x.com"));
        assert_eq!(record.date(EventDateField::PostDate), Some("2020-06-01 00:00:00"));
        assert_eq!(record.date(EventDateField::Timestamp), Some("2020-06-02 10:00:00"));
        assert!(record.org.is_none());
        assert!(record.extra.is_empty());
    }

    #[test]
    fn test_from_row_keeps_extra_columns() {
        let record = EventRecord::from_row(row(json!({
            "email": "a@x.com",
            "campaign_id": 7
        })))
        .unwrap();

        assert_eq!(record.extra.get("campaign_id"), Some(&json!(7)));

        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["campaign_id"], json!(7));
    }

    #[test]
    fn test_lenient_fields() {
        let record = EventRecord::from_row(row(json!({
            "email": "a@x.com",
            "post_id": "17",
            "post_date": 20_200_601,
            "ip": null
        })))
        .unwrap();

        assert_eq!(record.post_id, Some(17));
        assert_eq!(record.post_date.as_deref(), Some("20200601"));
        assert!(record.ip.is_none());
    }

    #[test]
    fn test_non_integer_post_id_is_rejected() {
        let result = EventRecord::from_row(row(json!({"post_id": "abc"})));
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_writes_null_outputs() {
        let record = EventRecord::new("a@x.com", "2020-06-01");
        let out = serde_json::to_value(&record).unwrap();

        assert_eq!(out["org"], Value::Null);
        assert_eq!(out["org_sync_date"], Value::Null);
        assert_eq!(out.as_object().unwrap().len(), 12);
    }
}
