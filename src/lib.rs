pub mod config;
pub mod error;
pub mod executor;
pub mod feeds;
pub mod fetch;
pub mod logging;
pub mod model;
pub mod traits;

// Re-export common types for convenience
pub use config::*;
pub use error::*;
pub use executor::*;
pub use feeds::{CveAnswer, CveId, CveIndex, CveQuery, Feed, Meta, NvdFeedScraper};
pub use fetch::*;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use model::*;
pub use traits::*;
