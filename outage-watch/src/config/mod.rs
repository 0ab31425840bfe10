//! Runtime schedule configuration.
//!
//! [`ProviderConfig`] is persisted in the database and cached by
//! [`ScheduleConfigService`]; every change is broadcast as a
//! [`ScheduleConfigEvent`]. Process settings come from the environment
//! ([`Settings`]).

mod events;
mod service;
mod settings;

pub use events::{ConfigEventBroadcaster, ScheduleConfigEvent};
pub use service::ScheduleConfigService;
pub use settings::{DtekSettings, KyivDigitalSettings, Settings, TelegramSettings, YasnoSettings};

use outage_sources::ProviderId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default cooldown between two group sends for the same date.
pub const DEFAULT_COOLDOWN_MINUTES: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// When false, schedules are persisted but never sent to groups.
    pub schedule_sending_enabled: bool,
    /// Providers whose polling runs. Empty means every provider.
    pub enabled_provider_ids: BTreeSet<ProviderId>,
    pub cooldown_minutes: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            schedule_sending_enabled: true,
            enabled_provider_ids: ProviderId::ALL.into_iter().collect(),
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
        }
    }
}

impl ProviderConfig {
    pub fn is_provider_enabled(&self, provider_id: ProviderId) -> bool {
        self.enabled_provider_ids.is_empty() || self.enabled_provider_ids.contains(&provider_id)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.cooldown_minutes))
    }

    /// Providers that currently poll, in priority order.
    pub fn enabled_providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|id| self.is_provider_enabled(*id))
            .collect()
    }
}
