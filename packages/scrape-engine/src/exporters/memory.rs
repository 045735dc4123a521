//! In-memory upsert exporter.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::error::ExportResult;
use crate::traits::exporter::Exporter;
use crate::types::record::Record;

/// Keeps exported records in a map keyed by natural key.
///
/// Useful for testing and development; re-exporting a record replaces the
/// stored copy.
#[derive(Default)]
pub struct MemoryExporter {
    records: RwLock<HashMap<String, Record>>,
    calls: AtomicUsize,
}

impl MemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct records stored.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn get(&self, key: &str) -> Option<Record> {
        self.records.read().await.get(key).cloned()
    }

    /// All stored records, sorted by key.
    pub async fn records(&self) -> Vec<Record> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.url.cmp(&b.url));
        records
    }

    /// Number of batch calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Exporter for MemoryExporter {
    fn exporter_type(&self) -> &str {
        "memory"
    }

    async fn export_records(&self, records: &[Record]) -> ExportResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut stored = self.records.write().await;
        let ids = records
            .iter()
            .map(|record| {
                stored.insert(record.key().to_string(), record.clone());
                record.key().to_string()
            })
            .collect();

        Ok(ids)
    }
}
