//! Export fan-out.
//!
//! A page's records are handed to every selected destination in request
//! order. A failing destination is logged with its id and the job id, then
//! skipped: it never stops the remaining destinations and never fails the job.

use std::sync::Arc;
use tracing::{debug, error};

use crate::traits::exporter::Exporter;
use crate::types::job::JobId;
use crate::types::record::Record;

/// Result of one destination's export call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationOutcome {
    Exported { destination: String, count: usize },
    Failed { destination: String, error: String },
}

impl DestinationOutcome {
    pub fn destination(&self) -> &str {
        match self {
            DestinationOutcome::Exported { destination, .. } => destination,
            DestinationOutcome::Failed { destination, .. } => destination,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DestinationOutcome::Failed { .. })
    }
}

/// Per-destination outcomes of one fan-out, in dispatch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub outcomes: Vec<DestinationOutcome>,
}

impl FanoutReport {
    /// Destinations that accepted the batch.
    pub fn exported(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_failed())
            .map(|o| o.destination())
            .collect()
    }

    /// Destinations whose export call returned an error.
    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_failed())
            .map(|o| o.destination())
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|o| !o.is_failed())
    }
}

/// Dispatch `records` to each destination in turn.
///
/// Empty batches are not dispatched.
pub async fn fan_out(
    job_id: JobId,
    records: &[Record],
    destinations: &[(String, Arc<dyn Exporter>)],
) -> FanoutReport {
    let mut report = FanoutReport::default();

    if records.is_empty() {
        debug!(job_id = %job_id, "no records to export");
        return report;
    }

    for (destination, exporter) in destinations {
        match exporter.export_records(records).await {
            Ok(ids) => {
                debug!(
                    job_id = %job_id,
                    destination = %destination,
                    count = ids.len(),
                    "exported records"
                );
                report.outcomes.push(DestinationOutcome::Exported {
                    destination: destination.clone(),
                    count: ids.len(),
                });
            }
            Err(e) => {
                error!(
                    job_id = %job_id,
                    destination = %destination,
                    exporter_type = exporter.exporter_type(),
                    error = %e,
                    "export failed"
                );
                report.outcomes.push(DestinationOutcome::Failed {
                    destination: destination.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporters::MemoryExporter;
    use crate::testing::MockExporter;

    fn records() -> Vec<Record> {
        vec![
            Record::new("https://example.com/1", "test"),
            Record::new("https://example.com/2", "test"),
        ]
    }

    #[tokio::test]
    async fn test_failing_destination_does_not_stop_others() {
        let a = Arc::new(MemoryExporter::new());
        let b = Arc::new(MockExporter::failing());
        let c = Arc::new(MemoryExporter::new());
        let destinations: Vec<(String, Arc<dyn Exporter>)> = vec![
            ("a".to_string(), a.clone()),
            ("b".to_string(), b.clone()),
            ("c".to_string(), c.clone()),
        ];

        let report = fan_out(JobId::new(), &records(), &destinations).await;

        assert_eq!(report.exported(), vec!["a", "c"]);
        assert_eq!(report.failed(), vec!["b"]);
        assert!(!report.is_clean());
        assert_eq!(a.len().await, 2);
        assert_eq!(b.calls(), 1);
        assert_eq!(c.len().await, 2);
    }

    /// Captures formatted log output for the current thread.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn test_failure_log_names_the_destination() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let destinations: Vec<(String, Arc<dyn Exporter>)> = vec![
            ("a".to_string(), Arc::new(MemoryExporter::new())),
            ("b".to_string(), Arc::new(MockExporter::failing())),
        ];
        fan_out(JobId::new(), &records(), &destinations).await;

        let output = logs.contents();
        let failures: Vec<&str> = output.lines().filter(|l| l.contains("export failed")).collect();
        assert_eq!(failures.len(), 1, "{}", output);
        assert!(failures[0].contains("ERROR"));
        assert!(failures[0].contains("destination=b"));
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_dispatched() {
        let exporter = Arc::new(MemoryExporter::new());
        let destinations: Vec<(String, Arc<dyn Exporter>)> =
            vec![("memory".to_string(), exporter.clone())];

        let report = fan_out(JobId::new(), &[], &destinations).await;

        assert!(report.outcomes.is_empty());
        assert_eq!(exporter.calls(), 0);
    }
}
