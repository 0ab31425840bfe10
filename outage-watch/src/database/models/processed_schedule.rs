//! Processed schedule database model.

use chrono::{DateTime, Utc};
use outage_sources::{Grid, ProviderId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::{Error, Result};

/// Row of `processed_schedules`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProcessedScheduleDbModel {
    pub date_iso: String,
    pub provider_id: String,
    /// Unix epoch milliseconds (UTC).
    pub updated_at: i64,
    /// JSON object keyed `h00_0` .. `h23_1`.
    pub schedule_hours: String,
    pub is_sent: bool,
}

/// Last accepted schedule for a calendar date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedScheduleInfo {
    pub date_iso: String,
    /// Provider that wrote the current grid.
    pub provider_id: ProviderId,
    pub updated_at: DateTime<Utc>,
    pub hours: Grid,
    /// Whether this grid was published to the groups.
    pub is_sent: bool,
}

impl ProcessedScheduleDbModel {
    pub fn from_info(info: &ProcessedScheduleInfo) -> Result<Self> {
        Ok(Self {
            date_iso: info.date_iso.clone(),
            provider_id: info.provider_id.to_string(),
            updated_at: datetime_to_ms(info.updated_at),
            schedule_hours: serde_json::to_string(&info.hours)?,
            is_sent: info.is_sent,
        })
    }

    pub fn into_info(self) -> Result<ProcessedScheduleInfo> {
        let provider_id = ProviderId::from_str(&self.provider_id).map_err(|_| {
            Error::validation(format!(
                "unknown provider '{}' stored for {}",
                self.provider_id, self.date_iso
            ))
        })?;
        Ok(ProcessedScheduleInfo {
            hours: serde_json::from_str(&self.schedule_hours)?,
            date_iso: self.date_iso,
            provider_id,
            updated_at: ms_to_datetime(self.updated_at),
            is_sent: self.is_sent,
        })
    }
}
