use serde::{Deserialize, Serialize};

use crate::period::Period;

/// One counter row per (entity, year, week).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewCounter {
    pub entity_id: String,
    pub period: Period,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeeklyCount {
    pub week: u32,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodCount {
    pub period: Period,
    pub count: u64,
}

/// All recorded periods of one entity, ascending by (year, week). Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySeries {
    pub entity_id: String,
    pub periods: Vec<PeriodCount>,
}

impl EntitySeries {
    pub fn latest(&self) -> Option<u64> {
        self.periods.last().map(|p| p.count)
    }

    pub fn total(&self) -> u64 {
        self.periods.iter().map(|p| p.count).sum()
    }

    pub fn average(&self) -> f64 {
        if self.periods.is_empty() {
            return 0.0;
        }
        self.total() as f64 / self.periods.len() as f64
    }
}

/// Normalized popularity in [0, 1]; lower means more popular.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityScore {
    pub entity_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Document shape stored in the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub entity_id: String,
    pub name: String,
    pub location: GeoPoint,
    #[serde(default)]
    pub cuisine: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSummary {
    pub entity_count: usize,
    pub period_count: usize,
    pub system_average: f64,
    pub scores: Vec<EntityScore>,
}
