//! Schedule configuration service.
//!
//! Keeps the persisted [`ProviderConfig`] cached in memory and broadcasts
//! a [`ScheduleConfigEvent`] for every change.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use outage_sources::ProviderId;
use parking_lot::RwLock;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ProviderConfig;
use super::events::{ConfigEventBroadcaster, ScheduleConfigEvent};
use crate::database::repositories::ScheduleConfigRepository;
use crate::{Error, Result};

pub struct ScheduleConfigService {
    repo: Arc<dyn ScheduleConfigRepository>,
    cache: RwLock<ProviderConfig>,
    broadcaster: ConfigEventBroadcaster,
    /// Serializes read-modify-write updates.
    write_lock: Mutex<()>,
}

impl ScheduleConfigService {
    /// Loads the config from the database, seeding the defaults on first run.
    pub async fn load(repo: Arc<dyn ScheduleConfigRepository>) -> Result<Self> {
        debug!("Caching schedule config...");
        let config = match repo.find().await? {
            Some(config) => config,
            None => {
                debug!("No schedule config found, creating defaults");
                let config = ProviderConfig::default();
                repo.save(&config).await?;
                config
            }
        };
        info!(
            "Schedule config loaded: sending={}, providers={:?}, cooldown={}min",
            config.schedule_sending_enabled, config.enabled_provider_ids, config.cooldown_minutes
        );

        Ok(Self {
            repo,
            cache: RwLock::new(config),
            broadcaster: ConfigEventBroadcaster::new(),
            write_lock: Mutex::new(()),
        })
    }

    // ========== Event Broadcasting ==========

    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleConfigEvent> {
        self.broadcaster.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }

    // ========== Reads ==========

    /// Snapshot of the cached config.
    pub fn current(&self) -> ProviderConfig {
        self.cache.read().clone()
    }

    pub fn is_provider_enabled(&self, provider_id: ProviderId) -> bool {
        self.cache.read().is_provider_enabled(provider_id)
    }

    // ========== Updates ==========

    async fn update<F>(&self, mutate: F) -> Result<Option<ProviderConfig>>
    where
        F: FnOnce(&mut ProviderConfig) -> Result<()>,
    {
        let _guard = self.write_lock.lock().await;
        let mut next = self.current();
        mutate(&mut next)?;
        if next == self.current() {
            return Ok(None);
        }
        self.repo.save(&next).await?;
        *self.cache.write() = next.clone();
        Ok(Some(next))
    }

    pub async fn set_sending_enabled(&self, enabled: bool) -> Result<()> {
        if self
            .update(|config| {
                config.schedule_sending_enabled = enabled;
                Ok(())
            })
            .await?
            .is_some()
        {
            info!("Schedule sending {}", if enabled { "enabled" } else { "disabled" });
            self.broadcaster
                .publish(ScheduleConfigEvent::SendingToggled { enabled });
        }
        Ok(())
    }

    /// Flips `provider_id` in the allow-list and returns whether it is now enabled.
    ///
    /// Disabling the last listed provider is rejected: an empty list means
    /// every provider is enabled.
    pub async fn toggle_provider(&self, provider_id: ProviderId) -> Result<bool> {
        let updated = self
            .update(|config| {
                let mut ids = if config.enabled_provider_ids.is_empty() {
                    ProviderId::ALL.into_iter().collect()
                } else {
                    config.enabled_provider_ids.clone()
                };
                if !ids.remove(&provider_id) {
                    ids.insert(provider_id);
                }
                if ids.is_empty() {
                    return Err(Error::validation(
                        "at least one provider must stay enabled; turn sending off instead",
                    ));
                }
                config.enabled_provider_ids = ids;
                Ok(())
            })
            .await?;

        let config = updated.unwrap_or_else(|| self.current());
        let enabled = config.is_provider_enabled(provider_id);
        info!(
            "Provider {} {}",
            provider_id,
            if enabled { "enabled" } else { "disabled" }
        );
        self.broadcaster.publish(ScheduleConfigEvent::ProvidersChanged {
            enabled: config.enabled_provider_ids,
        });
        Ok(enabled)
    }

    /// Replaces the allow-list. An empty set enables every provider.
    pub async fn set_enabled_providers(&self, ids: BTreeSet<ProviderId>) -> Result<()> {
        let updated = self
            .update(|config| {
                config.enabled_provider_ids = ids;
                Ok(())
            })
            .await?;
        if let Some(config) = updated {
            self.broadcaster.publish(ScheduleConfigEvent::ProvidersChanged {
                enabled: config.enabled_provider_ids,
            });
        }
        Ok(())
    }

    pub async fn set_cooldown_minutes(&self, minutes: u32) -> Result<()> {
        if self
            .update(|config| {
                config.cooldown_minutes = minutes;
                Ok(())
            })
            .await?
            .is_some()
        {
            self.broadcaster
                .publish(ScheduleConfigEvent::CooldownChanged { minutes });
        }
        Ok(())
    }

    /// Re-reads the database and publishes `Reloaded` if the row changed
    /// outside this process. Returns whether the cache changed.
    pub async fn reload(&self) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(stored) = self.repo.find().await? else {
            return Ok(false);
        };
        if stored == self.current() {
            return Ok(false);
        }
        *self.cache.write() = stored.clone();
        info!("Schedule config changed in database, reloaded");
        self.broadcaster
            .publish(ScheduleConfigEvent::Reloaded { config: stored });
        Ok(true)
    }

    /// Periodically calls [`reload`](Self::reload) until cancelled.
    pub fn spawn_refresh(
        self: &Arc<Self>,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Config refresh task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = service.reload().await {
                            warn!("Failed to reload schedule config: {}", e);
                        }
                    }
                }
            }
        })
    }
}
