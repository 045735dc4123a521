//! Source adapter implementations.
//!
//! - `SelectorAdapter` - static HTML listings described by CSS selectors

pub mod selector;

pub use selector::{register_selector_sources, SelectorAdapter, SelectorSourceConfig};
