use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::models::{ViewCounter, WeeklyCount};
use crate::period::Period;

/// Transactional storage for weekly view counters.
///
/// `increment` must be atomic per (entity, period): concurrent callers never lose an
/// update. On failure nothing is written and the error is returned without retrying.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Adds one view and returns the new count.
    async fn increment(&self, entity_id: &str, period: Period) -> Result<u64>;

    /// Count for one period, 0 when no row exists. Never creates a row.
    async fn count(&self, entity_id: &str, period: Period) -> Result<u64>;

    /// Ascending by week.
    async fn year_series(&self, entity_id: &str, year: i32) -> Result<Vec<WeeklyCount>>;

    /// Every counter in the store, in no particular order.
    async fn all_records(&self) -> Result<Vec<ViewCounter>>;
}

#[async_trait]
impl<T: CounterStore + ?Sized> CounterStore for Arc<T> {
    async fn increment(&self, entity_id: &str, period: Period) -> Result<u64> {
        (**self).increment(entity_id, period).await
    }

    async fn count(&self, entity_id: &str, period: Period) -> Result<u64> {
        (**self).count(entity_id, period).await
    }

    async fn year_series(&self, entity_id: &str, year: i32) -> Result<Vec<WeeklyCount>> {
        (**self).year_series(entity_id, year).await
    }

    async fn all_records(&self) -> Result<Vec<ViewCounter>> {
        (**self).all_records().await
    }
}

/// In-process store keyed by (entity, period). Increments go through the
/// shard-locked entry API, so writers to different keys never contend on one lock.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: DashMap<(String, Period), u64>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a counter. Used to load historical data.
    pub fn insert(&self, entity_id: &str, period: Period, count: u64) {
        self.counters.insert((entity_id.to_string(), period), count);
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, entity_id: &str, period: Period) -> Result<u64> {
        let mut entry = self
            .counters
            .entry((entity_id.to_string(), period))
            .or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn count(&self, entity_id: &str, period: Period) -> Result<u64> {
        let key = (entity_id.to_string(), period);
        Ok(self.counters.get(&key).map(|c| *c).unwrap_or(0))
    }

    async fn year_series(&self, entity_id: &str, year: i32) -> Result<Vec<WeeklyCount>> {
        let mut series: Vec<WeeklyCount> = self
            .counters
            .iter()
            .filter(|item| item.key().0 == entity_id && item.key().1.year == year)
            .map(|item| WeeklyCount {
                week: item.key().1.week,
                count: *item.value(),
            })
            .collect();
        series.sort_by_key(|w| w.week);
        Ok(series)
    }

    async fn all_records(&self) -> Result<Vec<ViewCounter>> {
        Ok(self
            .counters
            .iter()
            .map(|item| ViewCounter {
                entity_id: item.key().0.clone(),
                period: item.key().1,
                count: *item.value(),
            })
            .collect())
    }
}
