//! Popularity scoring.
//!
//! Three stages, always in this order:
//! 1. Bayesian blend of each entity's latest week with its own and the system average.
//! 2. Z-score standardization over all blended values (sample standard deviation).
//! 3. Min-max normalization into [0, 1], inverted so the most popular entity is 0.

use crate::error::{PopularityError, Result};
use crate::models::{EntityScore, EntitySeries, ScoreSummary};

/// Views an entity needs before its own average outweighs the system average.
pub const DEFAULT_SMOOTHING: f64 = 10.0;

pub fn score_series(series: &[EntitySeries], smoothing: f64) -> Result<ScoreSummary> {
    if !smoothing.is_finite() || smoothing <= 0.0 {
        return Err(PopularityError::Config(format!(
            "smoothing must be a positive number, got {smoothing}"
        )));
    }

    let series: Vec<&EntitySeries> = series.iter().filter(|s| !s.periods.is_empty()).collect();
    if series.len() < 2 {
        return Err(PopularityError::DegenerateScoreInput(format!(
            "need at least 2 entities, got {}",
            series.len()
        )));
    }

    let system_average = system_average(&series);
    let mut scores: Vec<EntityScore> = series
        .iter()
        .map(|s| EntityScore {
            entity_id: s.entity_id.clone(),
            score: raw_score(
                s.latest().unwrap_or(0),
                s.average(),
                system_average,
                smoothing,
            ),
        })
        .collect();

    standardize(&mut scores)?;
    normalize_inverted(&mut scores)?;

    if let Some(bad) = scores.iter().find(|s| !s.score.is_finite()) {
        return Err(PopularityError::DegenerateScoreInput(format!(
            "non-finite score for {}",
            bad.entity_id
        )));
    }

    Ok(ScoreSummary {
        entity_count: scores.len(),
        period_count: series.iter().map(|s| s.periods.len()).sum(),
        system_average,
        scores,
    })
}

/// Mean count over every period of every entity.
pub fn system_average(series: &[&EntitySeries]) -> f64 {
    let (sum, periods) = series.iter().fold((0u64, 0usize), |(sum, periods), s| {
        (sum + s.total(), periods + s.periods.len())
    });
    if periods == 0 {
        return 0.0;
    }
    sum as f64 / periods as f64
}

/// With `latest == 0` this is exactly `system_average`, and with
/// `entity_average == system_average` it is that average.
pub fn raw_score(latest: u64, entity_average: f64, system_average: f64, smoothing: f64) -> f64 {
    if latest == 0 {
        return system_average;
    }
    let latest = latest as f64;
    (latest * entity_average + smoothing * system_average) / (latest + smoothing)
}

/// Spread below this fraction of the values' magnitude is rounding noise.
const SPREAD_TOLERANCE: f64 = 1e-9;

fn negligible(spread: f64, magnitude: f64) -> bool {
    !spread.is_finite() || spread <= SPREAD_TOLERANCE * magnitude.abs().max(1.0)
}

pub fn standardize(scores: &mut [EntityScore]) -> Result<()> {
    let n = scores.len();
    if n < 2 {
        return Err(PopularityError::DegenerateScoreInput(
            "standard deviation needs at least 2 scores".to_string(),
        ));
    }

    let mean = scores.iter().map(|s| s.score).sum::<f64>() / n as f64;
    let variance = scores
        .iter()
        .map(|s| (s.score - mean).powi(2))
        .sum::<f64>()
        / (n - 1) as f64;
    let std_dev = variance.sqrt();

    if negligible(std_dev, mean) {
        return Err(PopularityError::DegenerateScoreInput(
            "raw scores have zero variance".to_string(),
        ));
    }

    for score in scores.iter_mut() {
        score.score = (score.score - mean) / std_dev;
    }
    Ok(())
}

pub fn normalize_inverted(scores: &mut [EntityScore]) -> Result<()> {
    let (min, max) = scores
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), s| {
            (min.min(s.score), max.max(s.score))
        });
    let range = max - min;

    if negligible(range, min.abs().max(max.abs())) {
        return Err(PopularityError::DegenerateScoreInput(
            "standardized scores have no spread".to_string(),
        ));
    }

    for score in scores.iter_mut() {
        score.score = 1.0 - (score.score - min) / range;
    }
    Ok(())
}
