//! Common utilities and types shared across keylock

pub mod config;
pub mod error;
pub mod hash;
pub mod logging;
pub mod metrics;

pub use config::Config;
pub use error::{Error, Result};
pub use hash::shard_key;
pub use metrics::AuthorityMetrics;
