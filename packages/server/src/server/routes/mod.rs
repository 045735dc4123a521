// HTTP routes
pub mod health;
pub mod jobs;
pub mod scrape;
pub mod stats;

pub use health::*;
pub use jobs::*;
pub use scrape::*;
pub use stats::*;
