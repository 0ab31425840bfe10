//! Outward-send gate.
//!
//! Decides whether a qualifying change may go to the groups: sending must be
//! enabled and the date must be outside its cooldown window.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::config::ProviderConfig;

/// Map size above which stale entries are pruned on the next send.
const PRUNE_THRESHOLD: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Send,
    SendingDisabled,
    CoolingDown { remaining: Duration },
}

impl GateDecision {
    pub fn allows_send(&self) -> bool {
        matches!(self, GateDecision::Send)
    }
}

#[derive(Default)]
pub struct NotificationGate {
    /// `date_iso -> time of the last group send`
    last_sent: DashMap<String, DateTime<Utc>>,
}

impl NotificationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(&self, date_iso: &str, config: &ProviderConfig, at: DateTime<Utc>) -> GateDecision {
        if !config.schedule_sending_enabled {
            return GateDecision::SendingDisabled;
        }

        let Some(last) = self.last_sent.get(date_iso).map(|entry| *entry) else {
            return GateDecision::Send;
        };
        let ready_at = last + config.cooldown();
        if at < ready_at {
            GateDecision::CoolingDown {
                remaining: ready_at - at,
            }
        } else {
            GateDecision::Send
        }
    }

    pub fn record_send(&self, date_iso: &str, at: DateTime<Utc>, config: &ProviderConfig) {
        self.last_sent.insert(date_iso.to_string(), at);
        self.prune_if_needed(at, config.cooldown());
    }

    pub fn last_sent(&self, date_iso: &str) -> Option<DateTime<Utc>> {
        self.last_sent.get(date_iso).map(|entry| *entry)
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }

    fn prune_if_needed(&self, now: DateTime<Utc>, cooldown: Duration) {
        if self.last_sent.len() <= PRUNE_THRESHOLD {
            return;
        }
        let cutoff = now - cooldown;
        self.last_sent.retain(|_, sent| *sent > cutoff);
    }
}
