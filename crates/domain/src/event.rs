/*!
 * Event Types
 *
 * The shapes an event takes on its way through the pipeline:
 *
 * ```text
 * HTTP body          Redis Stream              DuckDB
 * ─────────          ────────────              ──────
 * IngestEvent  ───>  StreamEntry        ───>   EventRow
 * (free-form)        (id + string map)         (fixed columns + data JSON)
 * ```
 */

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields that map to dedicated columns in the hot `event` table.
/// Everything else on a stream entry is folded into the `data` JSON blob.
pub const TABLE_FIELDS: [&str; 7] = [
    "id",
    "site",
    "name",
    "app",
    "app_version",
    "frappe_version",
    "timestamp",
];

/// An event as submitted to the ingest endpoint.
///
/// `event_name` and `captured_at` are required; everything else is optional
/// and any unknown fields are accepted and preserved verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestEvent {
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub captured_at: String,
    pub site: Option<String>,
    pub app: Option<String>,
    pub app_version: Option<String>,
    pub frappe_version: Option<String>,
    pub user: Option<String>,
    pub properties: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl IngestEvent {
    /// Return the list of missing required fields (empty means valid).
    pub fn missing_required(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.event_name.trim().is_empty() {
            missing.push("event_name".to_string());
        }
        if self.captured_at.trim().is_empty() {
            missing.push("captured_at".to_string());
        }
        missing
    }

    /// Flatten into stream fields. Null values are omitted, everything else
    /// is coerced to a string. `captured_at` must already be normalized to
    /// the server timezone by the caller; `received_at` is the server clock
    /// at append time.
    pub fn stream_fields(&self, captured_at: &str, received_at: &str) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), self.event_name.clone());
        fields.insert("timestamp".to_string(), captured_at.to_string());
        fields.insert("received_at".to_string(), received_at.to_string());

        for (key, value) in [
            ("site", &self.site),
            ("app", &self.app),
            ("app_version", &self.app_version),
            ("frappe_version", &self.frappe_version),
            ("user", &self.user),
        ] {
            if let Some(v) = value {
                fields.insert(key.to_string(), v.clone());
            }
        }

        let properties = self.properties.clone().unwrap_or_else(|| Value::Object(Default::default()));
        fields.insert("properties".to_string(), properties.to_string());

        for (key, value) in &self.extra {
            if let Some(coerced) = coerce_to_string(value) {
                fields.insert(key.clone(), coerced);
            }
        }

        fields
    }
}

/// Coerce a JSON value to its stream string form. `None` means "omit"
/// (null values are dropped before the append).
fn coerce_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// A normalized entry as returned by the stream log: server-assigned id
/// plus a flat string map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub id: String,
    pub data: HashMap<String, String>,
}

impl StreamEntry {
    /// Milliseconds-since-epoch prefix of the entry id, if parseable.
    pub fn receipt_ms(&self) -> Option<i64> {
        entry_ms(&self.id)
    }
}

/// Parse the `<ms>-<seq>` entry id form and return the millisecond prefix.
pub fn entry_ms(id: &str) -> Option<i64> {
    id.split('-').next()?.parse::<i64>().ok()
}

/// A row of the hot `event` table: fixed columns plus the overflow `data`
/// map that lands in the JSON column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub id: String,
    pub site: String,
    pub name: String,
    pub timestamp: String,
    pub app: Option<String>,
    pub app_version: Option<String>,
    pub frappe_version: Option<String>,
    pub data: BTreeMap<String, String>,
}

impl EventRow {
    /// Split a stream entry into fixed columns and overflow data.
    ///
    /// Returns the list of missing required columns on failure; entries that
    /// fail here are permanently unprocessable and get discarded (and ACKed)
    /// by the processor.
    pub fn from_entry(entry: &StreamEntry) -> Result<Self, Vec<String>> {
        let required = ["id", "site", "name", "timestamp"];

        let mut with_id = entry.data.clone();
        with_id.insert("id".to_string(), entry.id.clone());

        let missing: Vec<String> = required
            .iter()
            .filter(|f| with_id.get(**f).map(|v| v.is_empty()).unwrap_or(true))
            .map(|f| f.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }

        let take = |key: &str| with_id.get(key).cloned();
        let data: BTreeMap<String, String> = entry
            .data
            .iter()
            .filter(|(k, _)| !TABLE_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(EventRow {
            id: entry.id.clone(),
            site: take("site").unwrap_or_default(),
            name: take("name").unwrap_or_default(),
            timestamp: take("timestamp").unwrap_or_default(),
            app: take("app"),
            app_version: take("app_version"),
            frappe_version: take("frappe_version"),
            data,
        })
    }

    /// The overflow map serialized for the JSON column.
    pub fn data_json(&self) -> String {
        serde_json::to_string(&self.data).unwrap_or_else(|_| "{}".to_string())
    }
}
