//! PatentGraph Common Library
//!
//! Shared code for the PatentGraph services including:
//! - The canonical patent model and relationship edges
//! - Field reconciliation rules
//! - Patent storage (Postgres repository and in-process store)
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{MemoryStore, PatentRepository, PatentStore};
pub use domain::{AggregationResult, Patent};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
