use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::{PopularityError, Result};
use crate::models::{ViewCounter, WeeklyCount};
use crate::period::Period;
use crate::store::CounterStore;

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed counters. Each increment is a query-then-write inside a
/// SERIALIZABLE transaction; a concurrent writer to the same period makes one of
/// the commits fail with a serialization error, which is reported, not retried.
#[derive(Debug, Clone)]
pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin_serializable(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    /// Sets a counter to an absolute value, creating the row if needed.
    pub async fn put_count(&self, entity_id: &str, period: Period, count: u64) -> Result<()> {
        let count = i64::try_from(count)
            .map_err(|_| PopularityError::Config(format!("count {count} out of range")))?;
        let mut tx = self.begin_serializable().await?;

        let existing = find_counter(&mut tx, entity_id, period).await?;
        match existing {
            Some((id, _)) => {
                sqlx::query(
                    "UPDATE popularity.view_counters SET count = $1, updated_at = now() WHERE id = $2",
                )
                .bind(count)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
            None => insert_counter(&mut tx, entity_id, period, count).await?,
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn find_counter(
    tx: &mut Transaction<'static, Postgres>,
    entity_id: &str,
    period: Period,
) -> Result<Option<(Uuid, i64)>> {
    let row = sqlx::query(
        r#"
        SELECT id, count FROM popularity.view_counters
        WHERE entity_id = $1 AND year = $2 AND week = $3
        LIMIT 1
        "#,
    )
    .bind(entity_id)
    .bind(period.year)
    .bind(period.week as i32)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(|row| (row.get("id"), row.get("count"))))
}

async fn insert_counter(
    tx: &mut Transaction<'static, Postgres>,
    entity_id: &str,
    period: Period,
    count: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO popularity.view_counters (id, entity_id, year, week, count)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entity_id)
    .bind(period.year)
    .bind(period.week as i32)
    .bind(count)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn to_count(raw: i64) -> u64 {
    raw.max(0) as u64
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn increment(&self, entity_id: &str, period: Period) -> Result<u64> {
        let mut tx = self.begin_serializable().await?;

        let new_count = match find_counter(&mut tx, entity_id, period).await? {
            Some((id, count)) => {
                let next = count + 1;
                sqlx::query(
                    "UPDATE popularity.view_counters SET count = $1, updated_at = now() WHERE id = $2",
                )
                .bind(next)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                next
            }
            None => {
                insert_counter(&mut tx, entity_id, period, 1).await?;
                1
            }
        };

        // Uncommitted transactions roll back on drop.
        tx.commit().await?;
        Ok(to_count(new_count))
    }

    async fn count(&self, entity_id: &str, period: Period) -> Result<u64> {
        let count: Option<i64> = sqlx::query(
            r#"
            SELECT count FROM popularity.view_counters
            WHERE entity_id = $1 AND year = $2 AND week = $3
            LIMIT 1
            "#,
        )
        .bind(entity_id)
        .bind(period.year)
        .bind(period.week as i32)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| row.get("count"));

        Ok(count.map(to_count).unwrap_or(0))
    }

    async fn year_series(&self, entity_id: &str, year: i32) -> Result<Vec<WeeklyCount>> {
        let rows = sqlx::query(
            r#"
            SELECT week, count FROM popularity.view_counters
            WHERE entity_id = $1 AND year = $2
            ORDER BY week ASC
            "#,
        )
        .bind(entity_id)
        .bind(year)
        .fetch_all(&self.pool)
        .await?;

        let mut series = Vec::with_capacity(rows.len());
        for row in rows {
            let week: i32 = row.get("week");
            let count: i64 = row.get("count");
            series.push(WeeklyCount {
                week: week as u32,
                count: to_count(count),
            });
        }
        Ok(series)
    }

    async fn all_records(&self) -> Result<Vec<ViewCounter>> {
        let rows = sqlx::query("SELECT entity_id, year, week, count FROM popularity.view_counters")
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let week: i32 = row.get("week");
            let count: i64 = row.get("count");
            records.push(ViewCounter {
                entity_id: row.get("entity_id"),
                period: Period::new(row.get("year"), week as u32),
                count: to_count(count),
            });
        }
        Ok(records)
    }
}

/// Historical weekly views for the demo restaurants, weeks 26-30 of 2020.
pub const SEED_VIEWS: &[(&str, [u64; 5])] = &[
    ("wildfire-restaurant", [39, 40, 26, 21, 29]),
    ("lazy-dog-restaurant-and-bar", [11, 18, 21, 31, 10]),
    ("alinea-in-residence", [19, 21, 16, 12, 4]),
    ("big-bowl-chinese-and-thai", [34, 31, 40, 22, 28]),
    ("mickey-finns-bar-and-grill", [17, 22, 29, 23, 18]),
];

pub async fn seed(store: &PgCounterStore) -> Result<usize> {
    let mut written = 0usize;
    for (entity_id, counts) in SEED_VIEWS {
        for (offset, count) in counts.iter().enumerate() {
            let period = Period::new(2020, 26 + offset as u32);
            store.put_count(entity_id, period, *count).await?;
            written += 1;
        }
    }
    Ok(written)
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    entity_id: String,
    year: i32,
    week: u32,
    count: u64,
}

/// Reads `entity_id,year,week,count` rows, skipping rows with a blank id or a
/// week outside 1..=53.
pub fn read_csv(csv_path: &std::path::Path) -> anyhow::Result<Vec<ViewCounter>> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut counters = Vec::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let entity_id = row.entity_id.trim();
        if entity_id.is_empty() || !(1..=53).contains(&row.week) {
            tracing::warn!(entity_id = %row.entity_id, week = row.week, "skipping invalid row");
            continue;
        }
        counters.push(ViewCounter {
            entity_id: entity_id.to_string(),
            period: Period::new(row.year, row.week),
            count: row.count,
        });
    }

    Ok(counters)
}

pub async fn import_csv(store: &PgCounterStore, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let counters = read_csv(csv_path)?;
    for counter in &counters {
        store
            .put_count(&counter.entity_id, counter.period, counter.count)
            .await?;
    }
    Ok(counters.len())
}
