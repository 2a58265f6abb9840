//! Weekly page-view counting, popularity scoring, and search index synchronization.

pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod models;
pub mod period;
pub mod pipeline;
pub mod report;
pub mod score;
pub mod search;
pub mod store;

pub use error::{PopularityError, Result};
