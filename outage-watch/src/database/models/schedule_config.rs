//! Runtime schedule configuration model.

use outage_sources::ProviderId;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;

use crate::Result;
use crate::config::ProviderConfig;
use crate::database::time::now_ms;

/// Id of the singleton config row.
pub const SCHEDULE_CONFIG_ID: i64 = 1;

/// Row of `schedule_config`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScheduleConfigDbModel {
    pub id: i64,
    pub schedule_sending_enabled: bool,
    /// JSON array of provider ids.
    pub enabled_provider_ids: String,
    pub cooldown_minutes: i64,
    pub updated_at: i64,
}

impl ScheduleConfigDbModel {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            id: SCHEDULE_CONFIG_ID,
            schedule_sending_enabled: config.schedule_sending_enabled,
            enabled_provider_ids: serde_json::to_string(&config.enabled_provider_ids)?,
            cooldown_minutes: i64::from(config.cooldown_minutes),
            updated_at: now_ms(),
        })
    }

    pub fn into_config(self) -> Result<ProviderConfig> {
        let enabled_provider_ids: BTreeSet<ProviderId> =
            serde_json::from_str(&self.enabled_provider_ids)?;
        Ok(ProviderConfig {
            schedule_sending_enabled: self.schedule_sending_enabled,
            enabled_provider_ids,
            cooldown_minutes: u32::try_from(self.cooldown_minutes.max(0)).unwrap_or(u32::MAX),
        })
    }
}
