use std::time::Duration;

use reqwest::Url;

use crate::error::{PopularityError, Result};
use crate::score::DEFAULT_SMOOTHING;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreConfig {
    pub smoothing: f64,
}

impl ScoreConfig {
    pub fn new(smoothing: f64) -> Result<Self> {
        if !smoothing.is_finite() || smoothing <= 0.0 {
            return Err(PopularityError::Config(format!(
                "smoothing must be a positive number, got {smoothing}"
            )));
        }
        Ok(Self { smoothing })
    }
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            smoothing: DEFAULT_SMOOTHING,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub base_url: Url,
    pub index: String,
    pub timeout: Duration,
}

impl SearchConfig {
    pub fn new(base_url: &str, index: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PopularityError::Config(format!("invalid search url {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(PopularityError::Config(format!(
                "search url {base_url} cannot be used as a base"
            )));
        }

        let index = index.trim();
        if index.is_empty() || index.contains('/') {
            return Err(PopularityError::Config(format!(
                "invalid search index name {index:?}"
            )));
        }

        Ok(Self {
            base_url,
            index: index.to_string(),
            timeout,
        })
    }
}
