//! Yasno blackout-service source.
//!
//! The address is resolved to a queue group once (`street -> house -> group`),
//! then planned outages are read for that group on every fetch.

pub mod normalize;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono_tz::Tz;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{Result, SourceError};
use crate::model::{NormalizedSchedule, ProviderId};
use crate::source::ScheduleSource;

pub use normalize::{DaySchedule, GroupSchedule, Slot, SlotType, normalize_slots, schedules_from_group};

pub const DEFAULT_API_BASE: &str = "https://app.yasno.ua/api/blackout-service/public/shutdowns";
pub const DEFAULT_REGION_ID: u32 = 25;
pub const DEFAULT_DSO_ID: u32 = 902;

#[derive(Debug, Clone)]
pub struct YasnoConfig {
    pub api_base: String,
    pub region_id: u32,
    pub dso_id: u32,
    /// Street search query.
    pub street: String,
    /// Building search query.
    pub building: String,
    pub timezone: Tz,
}

#[derive(Debug, Deserialize)]
struct IdValue {
    id: u64,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct GroupResponse {
    group: u32,
    subgroup: u32,
}

type PlannedOutages = HashMap<String, GroupSchedule>;

pub struct YasnoSource {
    client: Client,
    config: YasnoConfig,
    group_key: OnceCell<String>,
}

impl YasnoSource {
    pub fn new(client: Client, config: YasnoConfig) -> Self {
        Self {
            client,
            config,
            group_key: OnceCell::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    fn base_query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("regionId", self.config.region_id.to_string()),
            ("dsoId", self.config.dso_id.to_string()),
        ]
    }

    async fn resolve_street_id(&self) -> Result<u64> {
        let mut query = self.base_query();
        query.push(("query", self.config.street.clone()));
        let streets: Vec<IdValue> = self.get_json("addresses/v2/streets", &query).await?;
        let street = streets.into_iter().next().ok_or_else(|| {
            SourceError::data_shape(format!("street not found for query \"{}\"", self.config.street))
        })?;
        debug!("Yasno street resolved: {} ({})", street.value, street.id);
        Ok(street.id)
    }

    async fn resolve_house_id(&self, street_id: u64) -> Result<u64> {
        let mut query = self.base_query();
        query.push(("streetId", street_id.to_string()));
        query.push(("query", self.config.building.clone()));
        let houses: Vec<IdValue> = self.get_json("addresses/v2/houses", &query).await?;
        let house = houses.into_iter().next().ok_or_else(|| {
            SourceError::data_shape(format!(
                "house not found for street {}, query \"{}\"",
                street_id, self.config.building
            ))
        })?;
        debug!("Yasno house resolved: {} ({})", house.value, house.id);
        Ok(house.id)
    }

    async fn resolve_group_key(&self) -> Result<String> {
        let street_id = self.resolve_street_id().await?;
        let house_id = self.resolve_house_id(street_id).await?;

        let mut query = self.base_query();
        query.push(("streetId", street_id.to_string()));
        query.push(("houseId", house_id.to_string()));
        let group: GroupResponse = self.get_json("addresses/v2/group", &query).await?;

        let key = format!("{}.{}", group.group, group.subgroup);
        info!("Yasno address resolved to group {}", key);
        Ok(key)
    }

    /// Queue group of the configured address, resolved on first use.
    pub async fn group_key(&self) -> Result<&str> {
        let key = self
            .group_key
            .get_or_try_init(|| self.resolve_group_key())
            .await?;
        Ok(key.as_str())
    }

    async fn fetch_planned_outages(&self) -> Result<PlannedOutages> {
        let path = format!(
            "regions/{}/dsos/{}/planned-outages",
            self.config.region_id, self.config.dso_id
        );
        self.get_json(&path, &[]).await
    }
}

#[async_trait]
impl ScheduleSource for YasnoSource {
    fn id(&self) -> ProviderId {
        ProviderId::Yasno
    }

    async fn fetch_schedules(&self) -> Result<Vec<NormalizedSchedule>> {
        let group_key = self.group_key().await?.to_string();
        let mut planned = self.fetch_planned_outages().await?;

        let group = planned.remove(&group_key).ok_or_else(|| {
            SourceError::data_shape(format!("no schedule for group {group_key} in planned-outages"))
        })?;
        if let Some(updated_on) = &group.updated_on {
            debug!("Yasno group {} updated on {}", group_key, updated_on);
        }

        Ok(schedules_from_group(&group, self.config.timezone))
    }
}
