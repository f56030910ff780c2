//! PatentGraph Scraper
//!
//! Aggregates patent records from the Rospatent search platform:
//! - Upstream client seam with a reqwest implementation
//! - Source parsers for search, export, detail and similarity responses
//! - Fragment reconciliation and missing-info selection
//! - Relationship edge extraction
//! - The concurrent three-phase aggregation driver

pub mod aggregator;
pub mod client;
pub mod edges;
pub mod errors;
pub mod merge;
pub mod normalize;
pub mod parsers;
pub mod selector;

pub use aggregator::Aggregator;
pub use client::{Endpoint, RospatentClient, SearchPlatform};
#[cfg(any(test, feature = "test-util"))]
pub use client::MockPlatform;
pub use errors::ScraperError;
pub use normalize::normalize_id;
