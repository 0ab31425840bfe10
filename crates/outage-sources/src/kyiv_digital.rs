//! Kyiv Digital schedule source.
//!
//! The API returns a weekly template of tri-state half-hour values keyed by
//! ISO weekday (`1` = Monday .. `7` = Sunday).

use async_trait::async_trait;
use chrono::{Datelike, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, SourceError};
use crate::model::{Grid, NormalizedSchedule, ProviderId, local_date};
use crate::source::ScheduleSource;

pub const DEFAULT_API_BASE: &str = "https://kyiv.digital/api";

const CLIENT_VERSION: &str = "2.18.6";

#[derive(Debug, Clone)]
pub struct KyivDigitalConfig {
    pub api_base: String,
    pub object_id: String,
    /// Bearer token issued by the Kyiv Digital app.
    pub access_token: String,
    pub timezone: Tz,
}

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    #[serde(default)]
    schedule: Option<Vec<ScheduleItem>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleItem {
    pub day_of_week: u32,
    pub hours: Grid,
}

pub struct KyivDigitalSource {
    client: Client,
    config: KyivDigitalConfig,
}

impl KyivDigitalSource {
    pub fn new(client: Client, config: KyivDigitalConfig) -> Self {
        Self { client, config }
    }

    fn schedule_url(&self) -> String {
        format!(
            "{}/v4/dtek/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.object_id
        )
    }

    async fn fetch_week(&self) -> Result<Vec<ScheduleItem>> {
        let url = self.schedule_url();
        debug!("Fetching Kyiv Digital schedule from {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .header("x-client-version", CLIENT_VERSION)
            .send()
            .await?
            .error_for_status()?;

        let body: ScheduleResponse = response.json().await?;
        body.schedule
            .ok_or_else(|| SourceError::data_shape("response has no schedule field"))
    }
}

/// Weekday number used by the API (Monday = 1 .. Sunday = 7).
pub fn api_day_of_week(date: NaiveDate) -> u32 {
    date.weekday().number_from_monday()
}

/// Picks today's and tomorrow's entries from the weekly template.
///
/// Days containing a tentative slot are returned as not finalized.
pub fn schedules_for_horizon(items: &[ScheduleItem], today: NaiveDate) -> Vec<NormalizedSchedule> {
    let tomorrow = today.checked_add_days(Days::new(1));

    [Some(today), tomorrow]
        .into_iter()
        .flatten()
        .filter_map(|date| {
            let dow = api_day_of_week(date);
            let item = items.iter().find(|item| item.day_of_week == dow)?;
            Some(if item.hours.has_maybe_off() {
                NormalizedSchedule::tentative(date, item.hours)
            } else {
                NormalizedSchedule::new(date, item.hours)
            })
        })
        .collect()
}

#[async_trait]
impl ScheduleSource for KyivDigitalSource {
    fn id(&self) -> ProviderId {
        ProviderId::KyivDigital
    }

    async fn fetch_schedules(&self) -> Result<Vec<NormalizedSchedule>> {
        let week = self.fetch_week().await?;
        if week.is_empty() {
            return Ok(Vec::new());
        }
        let today = local_date(Utc::now(), self.config.timezone);
        Ok(schedules_for_horizon(&week, today))
    }
}
