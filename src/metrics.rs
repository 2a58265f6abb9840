use std::collections::BTreeMap;

use crate::error::{PopularityError, Result};
use crate::models::{EntitySeries, PeriodCount, ViewCounter, WeeklyCount};
use crate::period::PeriodClock;
use crate::store::CounterStore;

/// Weekly view counting and the read-side queries used by the scoring job.
pub struct MetricsClient<S, C> {
    store: S,
    clock: C,
}

impl<S: CounterStore, C: PeriodClock> MetricsClient<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Counts one view for the current period and returns the new count.
    pub async fn record_view(&self, entity_id: &str) -> Result<u64> {
        let entity_id = validate_entity_id(entity_id)?;
        let period = self.clock.current_period();
        let count = self.store.increment(entity_id, period).await?;
        tracing::debug!(entity_id = %entity_id, period = %period, count, "view recorded");
        Ok(count)
    }

    /// Best-effort variant for request handlers: failures are logged, never returned.
    pub async fn track_view(&self, entity_id: &str) -> Option<u64> {
        match self.record_view(entity_id).await {
            Ok(count) => Some(count),
            Err(err @ PopularityError::StoreUnavailable(_)) => {
                tracing::warn!(entity_id = %entity_id, error = %err, "view not counted");
                None
            }
            Err(err) => {
                tracing::error!(entity_id = %entity_id, error = %err, "view rejected");
                None
            }
        }
    }

    pub async fn current_count(&self, entity_id: &str) -> Result<u64> {
        let entity_id = validate_entity_id(entity_id)?;
        self.store
            .count(entity_id, self.clock.current_period())
            .await
    }

    pub async fn year_series(&self, entity_id: &str, year: i32) -> Result<Vec<WeeklyCount>> {
        let entity_id = validate_entity_id(entity_id)?;
        self.store.year_series(entity_id, year).await
    }

    /// Every entity with at least one counter, each series ascending by period.
    /// Entities come back ordered by identifier.
    pub async fn all_series(&self) -> Result<Vec<EntitySeries>> {
        let records = self.store.all_records().await?;
        Ok(group_series(records))
    }
}

fn validate_entity_id(entity_id: &str) -> Result<&str> {
    let trimmed = entity_id.trim();
    if trimmed.is_empty() {
        return Err(PopularityError::Config("entity id must not be empty".to_string()));
    }
    Ok(trimmed)
}

pub fn group_series(records: Vec<ViewCounter>) -> Vec<EntitySeries> {
    let mut grouped: BTreeMap<String, Vec<PeriodCount>> = BTreeMap::new();

    for record in records {
        grouped.entry(record.entity_id).or_default().push(PeriodCount {
            period: record.period,
            count: record.count,
        });
    }

    grouped
        .into_iter()
        .map(|(entity_id, mut periods)| {
            periods.sort_by_key(|p| p.period);
            EntitySeries { entity_id, periods }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::{FixedClock, Period};
    use crate::store::MemoryCounterStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    fn client_at(period: Period) -> MetricsClient<MemoryCounterStore, FixedClock> {
        MetricsClient::new(MemoryCounterStore::new(), FixedClock(period))
    }

    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
        async fn increment(&self, _: &str, _: Period) -> Result<u64> {
            Err(PopularityError::StoreUnavailable("transaction conflict".to_string()))
        }
        async fn count(&self, _: &str, _: Period) -> Result<u64> {
            Err(PopularityError::StoreUnavailable("offline".to_string()))
        }
        async fn year_series(&self, _: &str, _: i32) -> Result<Vec<WeeklyCount>> {
            Err(PopularityError::StoreUnavailable("offline".to_string()))
        }
        async fn all_records(&self) -> Result<Vec<ViewCounter>> {
            Err(PopularityError::StoreUnavailable("offline".to_string()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 3)]
    async fn three_concurrent_views_count_three() {
        let client = Arc::new(client_at(Period::new(2020, 26)));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.record_view("wildfire").await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(client.current_count("wildfire").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn views_in_one_week_do_not_touch_the_next() {
        let store = Arc::new(MemoryCounterStore::new());
        let week_26 = MetricsClient::new(Arc::clone(&store), FixedClock(Period::new(2020, 26)));
        let week_27 = MetricsClient::new(Arc::clone(&store), FixedClock(Period::new(2020, 27)));

        week_26.record_view("wildfire").await.unwrap();
        week_26.record_view("wildfire").await.unwrap();
        assert_eq!(week_27.current_count("wildfire").await.unwrap(), 0);

        week_27.record_view("wildfire").await.unwrap();
        assert_eq!(week_26.current_count("wildfire").await.unwrap(), 2);

        let series = week_26.year_series("wildfire", 2020).await.unwrap();
        assert_eq!(
            series,
            vec![
                WeeklyCount { week: 26, count: 2 },
                WeeklyCount { week: 27, count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn current_count_without_views_is_zero_and_creates_nothing() {
        let client = client_at(Period::new(2020, 26));
        assert_eq!(client.current_count("unknown").await.unwrap(), 0);
        assert!(client.store().is_empty());
    }

    #[tokio::test]
    async fn rejects_blank_entity_ids() {
        let client = client_at(Period::new(2020, 26));
        let err = client.record_view("   ").await.unwrap_err();
        assert!(matches!(err, PopularityError::Config(_)));
        assert!(client.store().is_empty());
    }

    #[tokio::test]
    async fn track_view_swallows_store_failures() {
        let client = MetricsClient::new(DownStore, FixedClock(Period::new(2020, 26)));
        assert_eq!(client.track_view("wildfire").await, None);

        let err = client.record_view("wildfire").await.unwrap_err();
        assert!(matches!(err, PopularityError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn track_view_rejects_blank_ids_without_writing() {
        let client = client_at(Period::new(2020, 26));
        assert_eq!(client.track_view("  ").await, None);
        assert!(client.store().is_empty());

        let err = client.record_view("  ").await.unwrap_err();
        assert!(matches!(err, PopularityError::Config(_)));
        assert_eq!(client.track_view("wildfire").await, Some(1));
    }

    #[test]
    fn groups_by_id_and_sorts_chronologically() {
        let record = |id: &str, year, week, count| ViewCounter {
            entity_id: id.to_string(),
            period: Period::new(year, week),
            count,
        };
        let series = group_series(vec![
            record("b", 2020, 27, 18),
            record("a", 2021, 1, 5),
            record("a", 2020, 26, 39),
            record("b", 2020, 26, 11),
            record("a", 2020, 53, 40),
        ]);

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].entity_id, "a");
        let periods: Vec<Period> = series[0].periods.iter().map(|p| p.period).collect();
        assert_eq!(
            periods,
            vec![Period::new(2020, 26), Period::new(2020, 53), Period::new(2021, 1)]
        );
        assert_eq!(series[0].latest(), Some(5));
        assert_eq!(series[1].entity_id, "b");
        assert_eq!(series[1].average(), 14.5);
    }

    #[test]
    fn no_records_means_no_series() {
        assert!(group_series(Vec::new()).is_empty());
    }
}
