// Scrape Jobs API - server core
//
// Thin HTTP surface over the scrape engine: request validation, job reads,
// configuration loading and wiring of stores, adapters and exporters.

pub mod config;
pub mod server;

pub use config::*;
