//! JSON file exporter.
//!
//! Files have no natural upsert, so every export call writes a new
//! timestamped artifact. Re-exporting a record produces a second file that
//! contains it again; consumers that need uniqueness must de-duplicate on the
//! record's `url`.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::error::ExportResult;
use crate::traits::exporter::Exporter;
use crate::types::record::Record;

/// Writes each batch to `<dir>/<prefix>-<timestamp>-<suffix>.json`.
pub struct JsonFileExporter {
    dir: PathBuf,
    prefix: String,
    pretty: bool,
}

impl JsonFileExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: "records".to_string(),
            pretty: true,
        }
    }

    /// Set the file name prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Write compact JSON instead of pretty-printed.
    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn artifact_path(&self) -> PathBuf {
        // Random suffix keeps two calls within one millisecond apart.
        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!(
            "{}-{}-{}.json",
            self.prefix,
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
            &suffix[..8]
        );
        self.dir.join(name)
    }
}

#[async_trait]
impl Exporter for JsonFileExporter {
    fn exporter_type(&self) -> &str {
        "json"
    }

    async fn export_records(&self, records: &[Record]) -> ExportResult<Vec<String>> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let body = if self.pretty {
            serde_json::to_vec_pretty(records)?
        } else {
            serde_json::to_vec(records)?
        };

        let path = self.artifact_path();
        tokio::fs::write(&path, body).await?;
        debug!(path = %path.display(), count = records.len(), "wrote export file");

        Ok(records.iter().map(|r| r.key().to_string()).collect())
    }
}
