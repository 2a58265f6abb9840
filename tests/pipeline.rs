use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use popularity_rank::config::ScoreConfig;
use popularity_rank::metrics::MetricsClient;
use popularity_rank::models::{EntityScore, SearchDocument};
use popularity_rank::period::{FixedClock, Period};
use popularity_rank::pipeline::{RunOutcome, ScoringJob};
use popularity_rank::search::SearchIndex;
use popularity_rank::store::MemoryCounterStore;
use popularity_rank::{PopularityError, Result};

/// Keeps the last published score per document, like the real index would.
#[derive(Default)]
struct ScoreBoard {
    published: Mutex<Vec<BTreeMap<String, f64>>>,
}

#[async_trait]
impl SearchIndex for ScoreBoard {
    async fn publish(&self, _document: &SearchDocument) -> Result<()> {
        Ok(())
    }

    async fn publish_scores(&self, scores: &[EntityScore]) -> Result<usize> {
        let batch = scores
            .iter()
            .map(|s| (s.entity_id.clone(), s.score))
            .collect();
        self.published.lock().unwrap().push(batch);
        Ok(scores.len())
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchDocument>> {
        Ok(Vec::new())
    }
}

fn two_restaurants() -> Arc<MemoryCounterStore> {
    let store = Arc::new(MemoryCounterStore::new());
    store.insert("restaurant-a", Period::new(2020, 26), 39);
    store.insert("restaurant-a", Period::new(2020, 27), 40);
    store.insert("restaurant-b", Period::new(2020, 26), 11);
    store.insert("restaurant-b", Period::new(2020, 27), 18);
    store
}

#[tokio::test]
async fn busier_restaurant_gets_the_lower_score() {
    let metrics = MetricsClient::new(two_restaurants(), FixedClock(Period::new(2020, 27)));
    let job = ScoringJob::new(metrics, ScoreBoard::default(), ScoreConfig::default());

    let RunOutcome::Published(summary) = job.run().await.unwrap() else {
        panic!("run should publish");
    };
    assert_eq!(summary.system_average, 27.0);

    let published = job.index().published.lock().unwrap();
    let scores = &published[0];
    assert!(scores["restaurant-a"] < scores["restaurant-b"]);
    assert_eq!(scores["restaurant-a"], 0.0);
    assert_eq!(scores["restaurant-b"], 1.0);
}

#[tokio::test]
async fn rerunning_on_unchanged_counters_publishes_identical_scores() {
    let store = two_restaurants();
    store.insert("restaurant-c", Period::new(2020, 26), 19);
    store.insert("restaurant-c", Period::new(2020, 27), 21);

    let metrics = MetricsClient::new(store, FixedClock(Period::new(2020, 27)));
    let job = ScoringJob::new(metrics, ScoreBoard::default(), ScoreConfig::default());

    job.run().await.unwrap();
    job.run().await.unwrap();

    let published = job.index().published.lock().unwrap();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0], published[1]);
    assert_eq!(published[0].len(), 3);
}

#[tokio::test]
async fn new_views_feed_the_next_run() {
    let store = two_restaurants();
    let clock = FixedClock(Period::new(2020, 28));
    let metrics = MetricsClient::new(Arc::clone(&store), clock);

    // restaurant-b overtakes restaurant-a in week 28.
    for _ in 0..120 {
        metrics.record_view("restaurant-b").await.unwrap();
    }
    metrics.record_view("restaurant-a").await.unwrap();
    assert_eq!(metrics.current_count("restaurant-b").await.unwrap(), 120);

    let job = ScoringJob::new(metrics, ScoreBoard::default(), ScoreConfig::default());
    job.run().await.unwrap();

    let published = job.index().published.lock().unwrap();
    assert!(published[0]["restaurant-b"] < published[0]["restaurant-a"]);
}

#[tokio::test]
async fn single_restaurant_never_publishes() {
    let store = Arc::new(MemoryCounterStore::new());
    store.insert("restaurant-a", Period::new(2020, 26), 39);

    let metrics = MetricsClient::new(store, FixedClock(Period::new(2020, 26)));
    let job = ScoringJob::new(metrics, ScoreBoard::default(), ScoreConfig::default());

    let err = job.run().await.unwrap_err();
    assert!(matches!(err, PopularityError::DegenerateScoreInput(_)));
    assert!(job.index().published.lock().unwrap().is_empty());
}
