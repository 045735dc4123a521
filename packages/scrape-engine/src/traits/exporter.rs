//! Exporter trait for record destinations.

use async_trait::async_trait;

use crate::error::ExportResult;
use crate::types::record::Record;

/// A sink that persists or emits batches of records.
///
/// Upsert-capable destinations must key on [`Record::key`]: exporting the
/// same record twice updates the existing entry instead of duplicating it.
/// File-based destinations have no natural upsert; they write a new
/// timestamped artifact per call and are exempt from that rule.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Short identifier of the destination kind (e.g. `"sqlite"`, `"json"`).
    fn exporter_type(&self) -> &str;

    /// Export a batch, returning one identifier per written record.
    ///
    /// An error fails the whole call; partial failures inside the batch are
    /// the exporter's own concern.
    async fn export_records(&self, records: &[Record]) -> ExportResult<Vec<String>>;

    /// Export a single record.
    async fn export_record(&self, record: &Record) -> ExportResult<String> {
        let ids = self.export_records(std::slice::from_ref(record)).await?;
        Ok(ids.into_iter().next().unwrap_or_else(|| record.key().to_string()))
    }
}
