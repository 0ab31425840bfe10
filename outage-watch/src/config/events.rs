//! Configuration update events.
//!
//! Pollers subscribe to start or stop immediately when a provider is
//! toggled; the gate reads the cached config on each decision.

use outage_sources::ProviderId;
use std::collections::BTreeSet;
use tokio::sync::broadcast;

use super::ProviderConfig;

/// Events broadcast when the schedule configuration changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleConfigEvent {
    /// Group sending was switched on or off.
    SendingToggled { enabled: bool },
    /// The provider allow-list changed.
    ProvidersChanged { enabled: BTreeSet<ProviderId> },
    /// The per-date cooldown changed.
    CooldownChanged { minutes: u32 },
    /// The config was re-read from the database and differed from the cache.
    Reloaded { config: ProviderConfig },
}

impl ScheduleConfigEvent {
    /// Get a description of the event for logging.
    pub fn description(&self) -> String {
        match self {
            Self::SendingToggled { enabled } => format!("Schedule sending enabled={}", enabled),
            Self::ProvidersChanged { enabled } => {
                let ids: Vec<&str> = enabled.iter().map(|id| id.as_str()).collect();
                format!("Enabled providers: [{}]", ids.join(", "))
            }
            Self::CooldownChanged { minutes } => format!("Cooldown set to {} min", minutes),
            Self::Reloaded { .. } => "Config reloaded from database".to_string(),
        }
    }

    /// Whether the event can change which providers poll.
    pub fn affects_providers(&self) -> bool {
        matches!(
            self,
            Self::ProvidersChanged { .. } | Self::Reloaded { .. }
        )
    }
}

/// Default channel capacity for config update events.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Broadcaster for configuration update events.
pub struct ConfigEventBroadcaster {
    sender: broadcast::Sender<ScheduleConfigEvent>,
}

impl ConfigEventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleConfigEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of receivers, 0 when nobody listens.
    pub fn publish(&self, event: ScheduleConfigEvent) -> usize {
        tracing::debug!("Publishing config event: {}", event.description());
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ConfigEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
