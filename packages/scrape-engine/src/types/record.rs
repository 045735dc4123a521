//! Record - the unit of scraped data flowing through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One extracted item.
///
/// The engine treats `data` as opaque. `url` is the natural key exporters use
/// to decide between insert and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Canonical source URL (natural key)
    pub url: String,

    /// Source adapter id that produced the record
    pub source: String,

    /// Adapter-defined payload
    #[serde(default)]
    pub data: serde_json::Value,

    /// When the record was extracted
    pub scraped_at: DateTime<Utc>,
}

impl Record {
    pub fn new(url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source: source.into(),
            data: serde_json::Value::Object(Default::default()),
            scraped_at: Utc::now(),
        }
    }

    /// Replace the payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Set one payload field, turning the payload into an object if needed.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        if !self.data.is_object() {
            self.data = serde_json::Value::Object(Default::default());
        }
        if let Some(map) = self.data.as_object_mut() {
            map.insert(key.into(), value.into());
        }
        self
    }

    /// Natural key used for idempotent upserts.
    pub fn key(&self) -> &str {
        &self.url
    }

    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Merge a detail record into this listing record.
    ///
    /// Detail fields win over listing fields; the natural key stays the one
    /// reported by the detail page.
    pub fn merge(mut self, detail: Record) -> Self {
        match detail.data {
            serde_json::Value::Object(extra) if self.data.is_object() => {
                if let Some(base) = self.data.as_object_mut() {
                    base.extend(extra);
                }
            }
            serde_json::Value::Null => {}
            other => self.data = other,
        }
        self.url = detail.url;
        self.scraped_at = detail.scraped_at;
        self
    }
}
