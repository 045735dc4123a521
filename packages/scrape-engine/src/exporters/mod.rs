//! Exporter implementations and the fan-out dispatcher.
//!
//! Available destinations:
//! - `MemoryExporter` - In-memory upsert map (always available)
//! - `JsonFileExporter` - One timestamped JSON file per batch
//! - `SqliteExporter` - SQLite upsert table (requires `sqlite` feature)

pub mod fanout;
pub mod json_file;
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use fanout::{fan_out, DestinationOutcome, FanoutReport};
pub use json_file::JsonFileExporter;
pub use memory::MemoryExporter;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteExporter;
