//! Processed schedule repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{ProcessedScheduleDbModel, ProcessedScheduleInfo};
use crate::database::retry::retry_on_sqlite_busy;

/// Store of the last accepted schedule per date. One row per `date_iso`.
#[async_trait]
pub trait ProcessedScheduleRepository: Send + Sync {
    async fn find_by_date_iso(&self, date_iso: &str) -> Result<Option<ProcessedScheduleInfo>>;
    /// Inserts or replaces the row for `info.date_iso`.
    async fn upsert(&self, info: &ProcessedScheduleInfo) -> Result<()>;
    /// Most recent rows ordered by date, newest first.
    async fn list_recent(&self, limit: i64) -> Result<Vec<ProcessedScheduleInfo>>;
}

/// SQLx implementation of ProcessedScheduleRepository.
pub struct SqlxProcessedScheduleRepository {
    pool: SqlitePool,
}

impl SqlxProcessedScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessedScheduleRepository for SqlxProcessedScheduleRepository {
    async fn find_by_date_iso(&self, date_iso: &str) -> Result<Option<ProcessedScheduleInfo>> {
        let row = sqlx::query_as::<_, ProcessedScheduleDbModel>(
            "SELECT * FROM processed_schedules WHERE date_iso = ?",
        )
        .bind(date_iso)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProcessedScheduleDbModel::into_info).transpose()
    }

    async fn upsert(&self, info: &ProcessedScheduleInfo) -> Result<()> {
        let model = ProcessedScheduleDbModel::from_info(info)?;
        retry_on_sqlite_busy("upsert_processed_schedule", || async {
            sqlx::query(
                r#"
                INSERT INTO processed_schedules (date_iso, provider_id, updated_at, schedule_hours, is_sent)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(date_iso) DO UPDATE SET
                    provider_id = excluded.provider_id,
                    updated_at = excluded.updated_at,
                    schedule_hours = excluded.schedule_hours,
                    is_sent = excluded.is_sent
                "#,
            )
            .bind(&model.date_iso)
            .bind(&model.provider_id)
            .bind(model.updated_at)
            .bind(&model.schedule_hours)
            .bind(model.is_sent)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<ProcessedScheduleInfo>> {
        let rows = sqlx::query_as::<_, ProcessedScheduleDbModel>(
            "SELECT * FROM processed_schedules ORDER BY date_iso DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(ProcessedScheduleDbModel::into_info)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_memory_pool;
    use chrono::{TimeZone, Utc};
    use outage_sources::{Grid, PowerState, ProviderId};

    fn info(date_iso: &str, hours: Grid, is_sent: bool) -> ProcessedScheduleInfo {
        ProcessedScheduleInfo {
            date_iso: date_iso.to_string(),
            provider_id: ProviderId::KyivDigital,
            updated_at: Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap(),
            hours,
            is_sent,
        }
    }

    #[tokio::test]
    async fn test_find_missing_returns_none() {
        let repo = SqlxProcessedScheduleRepository::new(init_memory_pool().await.unwrap());
        assert!(repo
            .find_by_date_iso("2025-01-15T04:00:00.000Z")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_single_row_per_date() {
        let pool = init_memory_pool().await.unwrap();
        let repo = SqlxProcessedScheduleRepository::new(pool.clone());
        let date_iso = "2025-01-15T04:00:00.000Z";

        let first = info(date_iso, Grid::with_range(20..24, PowerState::Off), true);
        repo.upsert(&first).await.unwrap();

        let mut second = info(date_iso, Grid::with_range(20..25, PowerState::Off), false);
        second.provider_id = ProviderId::Yasno;
        repo.upsert(&second).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM processed_schedules")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let stored = repo.find_by_date_iso(date_iso).await.unwrap().unwrap();
        assert_eq!(stored, second);
    }

    #[tokio::test]
    async fn test_list_recent_orders_by_date() {
        let repo = SqlxProcessedScheduleRepository::new(init_memory_pool().await.unwrap());
        for date_iso in ["2025-01-14T04:00:00.000Z", "2025-01-16T04:00:00.000Z", "2025-01-15T04:00:00.000Z"] {
            repo.upsert(&info(date_iso, Grid::all_on(), false)).await.unwrap();
        }

        let recent = repo.list_recent(2).await.unwrap();
        let dates: Vec<&str> = recent.iter().map(|r| r.date_iso.as_str()).collect();
        assert_eq!(dates, ["2025-01-16T04:00:00.000Z", "2025-01-15T04:00:00.000Z"]);
    }
}
