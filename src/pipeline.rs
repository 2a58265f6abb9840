use tokio::sync::Mutex;

use crate::config::ScoreConfig;
use crate::error::Result;
use crate::metrics::MetricsClient;
use crate::models::ScoreSummary;
use crate::period::PeriodClock;
use crate::score;
use crate::search::SearchIndex;
use crate::store::CounterStore;

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Published(ScoreSummary),
    /// Another run held the guard; nothing was read or published.
    Skipped,
}

/// Recomputes every entity's score from the counter store and pushes it to the
/// search index. Overlapping runs are collapsed: a run that starts while another
/// is in flight returns `Skipped`.
pub struct ScoringJob<S, C, I> {
    metrics: MetricsClient<S, C>,
    index: I,
    config: ScoreConfig,
    in_flight: Mutex<()>,
}

impl<S, C, I> ScoringJob<S, C, I>
where
    S: CounterStore,
    C: PeriodClock,
    I: SearchIndex,
{
    pub fn new(metrics: MetricsClient<S, C>, index: I, config: ScoreConfig) -> Self {
        Self {
            metrics,
            index,
            config,
            in_flight: Mutex::new(()),
        }
    }

    pub fn metrics(&self) -> &MetricsClient<S, C> {
        &self.metrics
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Reads the store and scores it without publishing.
    pub async fn compute(&self) -> Result<ScoreSummary> {
        let series = self.metrics.all_series().await?;
        score::score_series(&series, self.config.smoothing)
    }

    pub async fn run(&self) -> Result<RunOutcome> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::info!("scoring run already in progress, skipping");
            return Ok(RunOutcome::Skipped);
        };

        let summary = match self.compute().await {
            Ok(summary) => summary,
            Err(err) if err.is_degenerate() => {
                tracing::warn!(error = %err, "scoring run skipped, nothing published");
                return Err(err);
            }
            Err(err) => {
                tracing::error!(error = %err, "scoring run failed");
                return Err(err);
            }
        };

        if let Err(err) = self.index.publish_scores(&summary.scores).await {
            tracing::error!(
                entities = summary.entity_count,
                error = %err,
                "score publish failed, next run will republish"
            );
            return Err(err);
        }

        tracing::info!(
            entities = summary.entity_count,
            periods = summary.period_count,
            system_average = summary.system_average,
            "scoring run published"
        );
        Ok(RunOutcome::Published(summary))
    }
}
