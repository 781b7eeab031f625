//! On-chain Signal Generation Library
//!
//! Block-by-block analytics: independent analyzers fan out over a shared
//! block context, their signals are gated by quiet mode and persisted with
//! bounded retry. The same pipeline replays history for backfills.

pub mod analyzers;
pub mod backfill;
pub mod cli;
pub mod confidence;
pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod signal;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
