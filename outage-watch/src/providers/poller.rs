//! Per-source polling loop.
//!
//! A poller is either `Disabled` or `Polling`. Only config events move it
//! between the two; fetch failures never stop it. A fetch already in flight
//! when the provider is disabled completes, and its result is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use outage_sources::{Grid, ProviderId, ScheduleSource, SourceError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::failures::{FailureAction, FailureTracker};
use crate::config::{ScheduleConfigEvent, ScheduleConfigService};
use crate::notification::{ScheduleDelivery, escape_html};
use crate::schedule::ScheduleOrchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum PollerState {
    Disabled,
    Polling,
}

/// Mutable state owned by the polling task.
#[derive(Default)]
pub struct PollContext {
    failures: FailureTracker,
    /// Last grid submitted per `date_iso`.
    last_submitted: HashMap<String, Grid>,
}

impl PollContext {
    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    pub fn submitted_dates(&self) -> usize {
        self.last_submitted.len()
    }
}

pub struct ProviderPoller {
    source: Arc<dyn ScheduleSource>,
    orchestrator: Arc<ScheduleOrchestrator>,
    config: Arc<ScheduleConfigService>,
    delivery: Arc<dyn ScheduleDelivery>,
    poll_interval: Duration,
}

impl ProviderPoller {
    pub fn new(
        source: Arc<dyn ScheduleSource>,
        orchestrator: Arc<ScheduleOrchestrator>,
        config: Arc<ScheduleConfigService>,
        delivery: Arc<dyn ScheduleDelivery>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            orchestrator,
            config,
            delivery,
            poll_interval,
        }
    }

    pub fn provider_id(&self) -> ProviderId {
        self.source.id()
    }

    fn is_enabled(&self) -> bool {
        self.config.is_provider_enabled(self.provider_id())
    }

    pub fn spawn(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel_token).await })
    }

    pub async fn run(self, cancel_token: CancellationToken) {
        let provider_id = self.provider_id();
        // Subscribe before the first check so no toggle is missed.
        let mut events = self.config.subscribe();
        let mut ctx = PollContext::default();
        let mut state = None;

        loop {
            let next = if self.is_enabled() {
                PollerState::Polling
            } else {
                PollerState::Disabled
            };
            if state != Some(next) {
                info!(provider = %provider_id, "Poller state: {}", next);
                if next == PollerState::Disabled {
                    ctx.last_submitted.clear();
                }
                state = Some(next);
            }

            match next {
                PollerState::Disabled => {
                    tokio::select! {
                        _ = cancel_token.cancelled() => break,
                        event = events.recv() => {
                            if !self.handle_event(event) {
                                break;
                            }
                        }
                    }
                }
                PollerState::Polling => {
                    let delay = self.poll_once(&mut ctx).await;
                    if !self.sleep(delay, &mut events, &cancel_token).await {
                        break;
                    }
                }
            }
        }
        debug!(provider = %provider_id, "Poller stopped");
    }

    /// Returns false when the event channel is closed.
    fn handle_event(&self, event: Result<ScheduleConfigEvent, broadcast::error::RecvError>) -> bool {
        match event {
            Ok(event) => {
                debug!(provider = %self.provider_id(), "Config event: {}", event.description());
                true
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(provider = %self.provider_id(), "Config listener lagged by {} events", n);
                true
            }
            Err(broadcast::error::RecvError::Closed) => false,
        }
    }

    /// Sleeps for `delay`, waking early when the provider gets disabled.
    /// Returns false when the poller should stop.
    async fn sleep(
        &self,
        delay: Duration,
        events: &mut broadcast::Receiver<ScheduleConfigEvent>,
        cancel_token: &CancellationToken,
    ) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => return false,
                _ = &mut sleep => return true,
                event = events.recv() => {
                    let affects = matches!(&event, Ok(e) if e.affects_providers())
                        || matches!(&event, Err(broadcast::error::RecvError::Lagged(_)));
                    if !self.handle_event(event) {
                        return false;
                    }
                    if affects && !self.is_enabled() {
                        return true;
                    }
                }
            }
        }
    }

    /// One fetch and submit cycle. Returns the delay before the next one.
    pub async fn poll_once(&self, ctx: &mut PollContext) -> Duration {
        let provider_id = self.provider_id();
        let result = self.source.fetch_schedules().await;

        if !self.is_enabled() {
            debug!(provider = %provider_id, "Provider disabled during fetch, discarding result");
            return self.poll_interval;
        }

        match result {
            Ok(schedules) => {
                if let Some(streak) = ctx.failures.record_success() {
                    info!(
                        provider = %provider_id,
                        "Fetch recovered after {} failures since {}",
                        streak.count,
                        streak.first_failure
                    );
                }

                let current: Vec<String> = schedules
                    .iter()
                    .map(|s| self.orchestrator.date_iso(s.date))
                    .collect();
                ctx.last_submitted.retain(|date_iso, _| current.contains(date_iso));

                for (schedule, date_iso) in schedules.iter().zip(current) {
                    if ctx.last_submitted.get(&date_iso) == Some(&schedule.hours) {
                        continue;
                    }
                    let outcome = self
                        .orchestrator
                        .on_schedule_change(provider_id, schedule.date, schedule, None)
                        .await;
                    if outcome.needs_retry() {
                        ctx.last_submitted.remove(&date_iso);
                    } else {
                        ctx.last_submitted.insert(date_iso, schedule.hours);
                    }
                }
                self.poll_interval
            }
            Err(e) => self.handle_failure(ctx, &e).await,
        }
    }

    async fn handle_failure(&self, ctx: &mut PollContext, error: &SourceError) -> Duration {
        let provider_id = self.provider_id();
        let action = ctx.failures.record_failure(error);
        warn!(
            provider = %provider_id,
            failures = ctx.failures.failure_count(),
            "Fetch failed ({}): {}",
            error.kind(),
            error
        );

        match action {
            FailureAction::Log => self.poll_interval,
            FailureAction::Escalate => {
                self.report(provider_id, ctx.failures.failure_count(), error).await;
                self.poll_interval
            }
            FailureAction::EscalateAndBackoff(backoff) => {
                self.report(provider_id, ctx.failures.failure_count(), error).await;
                backoff.max(self.poll_interval)
            }
        }
    }

    async fn report(&self, provider_id: ProviderId, count: u32, error: &SourceError) {
        let text = format!(
            "⚠️ Джерело {} недоступне ({} помилок поспіль):\n{}",
            provider_id,
            count,
            escape_html(&error.to_string())
        );
        if let Err(e) = self.delivery.send_to_owner(&text).await {
            warn!("Failed to notify owner: {}", e);
        }
    }
}
