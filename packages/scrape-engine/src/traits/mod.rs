//! Core trait abstractions for the scrape engine.
//!
//! These traits define the seams applications plug into: where pages come
//! from, where records go, and where job state lives.

pub mod adapter;
pub mod exporter;
pub mod store;
