//! Schedule configuration repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::config::ProviderConfig;
use crate::database::models::{SCHEDULE_CONFIG_ID, ScheduleConfigDbModel};
use crate::database::retry::retry_on_sqlite_busy;
use crate::{Error, Result};

/// Schedule config repository trait.
#[async_trait]
pub trait ScheduleConfigRepository: Send + Sync {
    /// Loads the config row, if it has been created.
    async fn find(&self) -> Result<Option<ProviderConfig>>;
    async fn get(&self) -> Result<ProviderConfig> {
        self.find()
            .await?
            .ok_or_else(|| Error::not_found("ScheduleConfig", SCHEDULE_CONFIG_ID.to_string()))
    }
    async fn save(&self, config: &ProviderConfig) -> Result<()>;
}

/// SQLx implementation of ScheduleConfigRepository.
pub struct SqlxScheduleConfigRepository {
    pool: SqlitePool,
}

impl SqlxScheduleConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleConfigRepository for SqlxScheduleConfigRepository {
    async fn find(&self) -> Result<Option<ProviderConfig>> {
        let row = sqlx::query_as::<_, ScheduleConfigDbModel>(
            "SELECT * FROM schedule_config WHERE id = ?",
        )
        .bind(SCHEDULE_CONFIG_ID)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ScheduleConfigDbModel::into_config).transpose()
    }

    async fn save(&self, config: &ProviderConfig) -> Result<()> {
        let model = ScheduleConfigDbModel::from_config(config)?;
        retry_on_sqlite_busy("save_schedule_config", || async {
            sqlx::query(
                r#"
                INSERT INTO schedule_config (id, schedule_sending_enabled, enabled_provider_ids, cooldown_minutes, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    schedule_sending_enabled = excluded.schedule_sending_enabled,
                    enabled_provider_ids = excluded.enabled_provider_ids,
                    cooldown_minutes = excluded.cooldown_minutes,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(model.id)
            .bind(model.schedule_sending_enabled)
            .bind(&model.enabled_provider_ids)
            .bind(model.cooldown_minutes)
            .bind(model.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_memory_pool;
    use outage_sources::ProviderId;

    #[tokio::test]
    async fn test_get_before_save_is_not_found() {
        let repo = SqlxScheduleConfigRepository::new(init_memory_pool().await.unwrap());
        assert!(repo.find().await.unwrap().is_none());
        assert!(matches!(repo.get().await, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let repo = SqlxScheduleConfigRepository::new(init_memory_pool().await.unwrap());

        let mut config = ProviderConfig::default();
        repo.save(&config).await.unwrap();
        assert_eq!(repo.get().await.unwrap(), config);

        config.schedule_sending_enabled = false;
        config.enabled_provider_ids = [ProviderId::Yasno].into_iter().collect();
        config.cooldown_minutes = 15;
        repo.save(&config).await.unwrap();
        assert_eq!(repo.get().await.unwrap(), config);
    }
}
