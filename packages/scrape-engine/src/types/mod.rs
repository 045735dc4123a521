//! Data types shared by the orchestrator, stores and exporters.

pub mod config;
pub mod job;
pub mod record;
