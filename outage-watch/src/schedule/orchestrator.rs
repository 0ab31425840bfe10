//! Change detection and publication of schedules.
//!
//! Every submission for a date runs read-diff-write under the per-date lock,
//! so two providers reporting the same fresh date never both see an empty
//! store. Calls for different dates proceed independently.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use outage_sources::model::date_iso;
use outage_sources::{Grid, NormalizedSchedule, ProviderId, ScheduleSource};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::gate::{GateDecision, NotificationGate};
use super::intents::ScheduleIntent;
use super::keyed_lock::KeyedLock;
use super::message;
use crate::Result;
use crate::config::ScheduleConfigService;
use crate::database::models::ProcessedScheduleInfo;
use crate::database::repositories::ProcessedScheduleRepository;
use crate::notification::{ScheduleDelivery, escape_html};

/// Why a changed schedule was not sent to the groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// The provider still marks part of the day as tentative.
    Tentative,
    SendingDisabled,
    CoolingDown,
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Tentative => "графік ще не остаточний",
            Self::SendingDisabled => "розсилку вимкнено",
            Self::CoolingDown => "активний інтервал тиші",
        };
        f.write_str(text)
    }
}

/// Result of a single submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Identical to the stored grid.
    Unchanged,
    /// Older than the stored record.
    Stale,
    Sent { is_new: bool },
    Suppressed(SuppressReason),
    /// The group send failed. Nothing persisted, so the next identical
    /// submission sends again.
    DeliveryFailed,
    /// Nothing persisted; the error was reported to the owner.
    Failed,
}

impl Outcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Outcome::Sent { .. })
    }

    /// Whether the submission left the store untouched and must be repeated.
    pub fn needs_retry(&self) -> bool {
        matches!(self, Outcome::DeliveryFailed | Outcome::Failed)
    }
}

pub struct ScheduleOrchestrator {
    repo: Arc<dyn ProcessedScheduleRepository>,
    delivery: Arc<dyn ScheduleDelivery>,
    config: Arc<ScheduleConfigService>,
    gate: NotificationGate,
    locks: KeyedLock,
    timezone: Tz,
    /// Fallback sources for on-demand requests, in priority order.
    sources: Vec<Arc<dyn ScheduleSource>>,
}

impl ScheduleOrchestrator {
    pub fn new(
        repo: Arc<dyn ProcessedScheduleRepository>,
        delivery: Arc<dyn ScheduleDelivery>,
        config: Arc<ScheduleConfigService>,
        timezone: Tz,
    ) -> Self {
        Self {
            repo,
            delivery,
            config,
            gate: NotificationGate::new(),
            locks: KeyedLock::new(),
            timezone,
            sources: Vec::new(),
        }
    }

    pub fn with_sources(mut self, mut sources: Vec<Arc<dyn ScheduleSource>>) -> Self {
        sources.sort_by_key(|source| source.id());
        self.sources = sources;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn date_iso(&self, date: NaiveDate) -> String {
        date_iso(date, self.timezone)
    }

    /// Submits a provider's schedule for `date`.
    ///
    /// Never fails: errors are logged and reported to the owner. The returned
    /// [`Outcome`] describes what happened.
    pub async fn on_schedule_change(
        &self,
        provider_id: ProviderId,
        date: NaiveDate,
        schedule: &NormalizedSchedule,
        updated_at: Option<DateTime<Utc>>,
    ) -> Outcome {
        let date_iso = self.date_iso(date);
        let _guard = self.locks.lock(&date_iso).await;

        match self
            .process_change(provider_id, date, &date_iso, schedule, updated_at)
            .await
        {
            Ok(outcome) => {
                debug!(
                    provider = %provider_id,
                    date = %date_iso,
                    "Schedule change processed: {:?}",
                    outcome
                );
                outcome
            }
            Err(e) => {
                error!(provider = %provider_id, date = %date_iso, "Failed to process schedule: {}", e);
                self.report_to_owner(&format!(
                    "⚠️ Помилка обробки графіка ({}, {}):\n{}",
                    provider_id,
                    date,
                    escape_html(&e.to_string())
                ))
                .await;
                Outcome::Failed
            }
        }
    }

    async fn process_change(
        &self,
        provider_id: ProviderId,
        date: NaiveDate,
        date_iso: &str,
        schedule: &NormalizedSchedule,
        updated_at: Option<DateTime<Utc>>,
    ) -> Result<Outcome> {
        let existing = self.repo.find_by_date_iso(date_iso).await?;

        if let Some(existing) = &existing {
            if updated_at.is_some_and(|ts| ts < existing.updated_at) {
                debug!(
                    provider = %provider_id,
                    date = %date_iso,
                    "Ignoring stale schedule (stored {} from {})",
                    existing.updated_at,
                    existing.provider_id
                );
                return Ok(Outcome::Stale);
            }
            if existing.hours == schedule.hours {
                debug!(provider = %provider_id, date = %date_iso, "Schedule unchanged");
                return Ok(Outcome::Unchanged);
            }
            debug!(
                provider = %provider_id,
                date = %date_iso,
                "Schedule changed in {} slots",
                existing.hours.diff_count(&schedule.hours)
            );
        }

        let is_new = existing.is_none();
        let at = updated_at.unwrap_or_else(Utc::now);
        let config = self.config.current();
        let text = message::schedule_message(date, &schedule.hours, is_new);

        let decision = if schedule.finalized {
            self.gate.evaluate(date_iso, &config, at)
        } else {
            GateDecision::SendingDisabled
        };

        let (outcome, is_sent) = match decision {
            GateDecision::Send => match self.delivery.send_to_all_enabled_groups(&text).await {
                Ok(()) => {
                    self.gate.record_send(date_iso, at, &config);
                    info!(provider = %provider_id, date = %date_iso, is_new, "Schedule sent to groups");
                    (Outcome::Sent { is_new }, true)
                }
                Err(e) => {
                    warn!(provider = %provider_id, date = %date_iso, "Group send failed: {}", e);
                    self.report_to_owner(&format!(
                        "⚠️ Не вдалося надіслати графік у групи: {}\n\n{}",
                        escape_html(&e.to_string()),
                        text
                    ))
                    .await;
                    return Ok(Outcome::DeliveryFailed);
                }
            },
            other => {
                let reason = match other {
                    _ if !schedule.finalized => SuppressReason::Tentative,
                    GateDecision::CoolingDown { .. } => SuppressReason::CoolingDown,
                    _ => SuppressReason::SendingDisabled,
                };
                info!(
                    provider = %provider_id,
                    date = %date_iso,
                    "Schedule change not sent to groups: {:?}",
                    other
                );
                let hint = if reason == SuppressReason::CoolingDown {
                    "\nГрупи отримають графік після наступної зміни або команди broadcast."
                } else {
                    ""
                };
                self.report_to_owner(&format!(
                    "ℹ️ Не надіслано ({}).{}\n\n{}",
                    reason, hint, text
                ))
                .await;
                (Outcome::Suppressed(reason), false)
            }
        };

        self.repo
            .upsert(&ProcessedScheduleInfo {
                date_iso: date_iso.to_string(),
                provider_id,
                updated_at: at,
                hours: schedule.hours,
                is_sent,
            })
            .await?;

        Ok(outcome)
    }

    async fn report_to_owner(&self, text: &str) {
        if let Err(e) = self.delivery.send_to_owner(text).await {
            warn!("Failed to notify owner: {}", e);
        }
    }

    /// Grid for `date` from the store, or from the first enabled source
    /// that publishes one.
    ///
    /// A grid found through a source is submitted like a polled one.
    pub async fn lookup_schedule(&self, date: NaiveDate) -> Result<Option<Grid>> {
        if let Some(stored) = self.repo.find_by_date_iso(&self.date_iso(date)).await? {
            return Ok(Some(stored.hours));
        }
        match self.fetch_from_sources(date).await {
            Some((provider_id, schedule)) => {
                self.on_schedule_change(provider_id, date, &schedule, None)
                    .await;
                Ok(Some(schedule.hours))
            }
            None => Ok(None),
        }
    }

    /// Like [`lookup_schedule`](Self::lookup_schedule), but a grid fetched
    /// from a source is neither stored nor published.
    pub async fn preview_schedule(&self, date: NaiveDate) -> Result<Option<Grid>> {
        if let Some(stored) = self.repo.find_by_date_iso(&self.date_iso(date)).await? {
            return Ok(Some(stored.hours));
        }
        Ok(self
            .fetch_from_sources(date)
            .await
            .map(|(_, schedule)| schedule.hours))
    }

    async fn fetch_from_sources(&self, date: NaiveDate) -> Option<(ProviderId, NormalizedSchedule)> {
        for source in &self.sources {
            let provider_id = source.id();
            if !self.config.is_provider_enabled(provider_id) {
                continue;
            }
            match source.get_schedule_for_date(date).await {
                Ok(Some(schedule)) => return Some((provider_id, schedule)),
                Ok(None) => debug!(provider = %provider_id, "No schedule for {}", date),
                Err(e) => warn!(provider = %provider_id, "On-demand fetch failed: {}", e),
            }
        }
        None
    }

    /// Answers an on-demand request. Errors are reported to the owner.
    pub async fn handle_intent(&self, intent: ScheduleIntent) {
        if let Err(e) = self.answer_intent(intent).await {
            error!("Failed to handle {:?}: {}", intent, e);
            self.report_to_owner(&format!(
                "⚠️ Помилка запиту графіка: {}",
                escape_html(&e.to_string())
            ))
            .await;
        }
    }

    async fn answer_intent(&self, intent: ScheduleIntent) -> Result<()> {
        let day = intent.day();
        let date = day.resolve(Utc::now(), self.timezone);
        let grid = self.lookup_schedule(date).await?;

        match (intent, grid) {
            (ScheduleIntent::GetSchedule { chat_id, .. }, Some(grid)) => {
                self.delivery
                    .send_to_chat(chat_id, &message::day_message(date, day, &grid))
                    .await
            }
            (ScheduleIntent::GetSchedule { chat_id, .. }, None) => {
                let text = format!(
                    "<b>{}</b>\n\n{}",
                    message::day_title(date, day),
                    message::NO_SCHEDULE_YET
                );
                self.delivery.send_to_chat(chat_id, &text).await
            }
            (ScheduleIntent::BroadcastSchedule { .. }, Some(grid)) => {
                if !self.config.current().schedule_sending_enabled {
                    warn!("Broadcast for {} requested while sending is disabled", date);
                    return Ok(());
                }
                self.delivery
                    .send_to_all_enabled_groups(&message::day_message(date, day, &grid))
                    .await
            }
            (ScheduleIntent::BroadcastSchedule { .. }, None) => {
                warn!("Broadcast requested but no schedule for {} yet", date);
                Ok(())
            }
        }
    }

    /// Handles intents from `rx` until cancelled or the channel closes.
    pub fn spawn_intent_listener(
        self: &Arc<Self>,
        mut rx: broadcast::Receiver<ScheduleIntent>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Intent listener shutting down");
                        break;
                    }
                    result = rx.recv() => {
                        match result {
                            Ok(intent) => orchestrator.handle_intent(intent).await,
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!("Intent listener lagged by {} requests", n);
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Intent channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_memory_pool;
    use crate::database::repositories::{
        SqlxProcessedScheduleRepository, SqlxScheduleConfigRepository,
    };
    use crate::testing::{FlakyScheduleRepository, RecordingDelivery};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use outage_sources::PowerState;

    const TZ: Tz = chrono_tz::Europe::Kyiv;

    struct Harness {
        orchestrator: ScheduleOrchestrator,
        delivery: Arc<RecordingDelivery>,
        repo: Arc<SqlxProcessedScheduleRepository>,
        config: Arc<ScheduleConfigService>,
    }

    async fn harness() -> Harness {
        let pool = init_memory_pool().await.unwrap();
        let repo = Arc::new(SqlxProcessedScheduleRepository::new(pool.clone()));
        let config = Arc::new(
            ScheduleConfigService::load(Arc::new(SqlxScheduleConfigRepository::new(pool)))
                .await
                .unwrap(),
        );
        let delivery = Arc::new(RecordingDelivery::default());
        let orchestrator = ScheduleOrchestrator::new(
            repo.clone(),
            delivery.clone(),
            config.clone(),
            TZ,
        );
        Harness {
            orchestrator,
            delivery,
            repo,
            config,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 7, 0, 0).unwrap()
    }

    fn schedule(range: std::ops::Range<usize>) -> NormalizedSchedule {
        NormalizedSchedule::new(date(), Grid::with_range(range, PowerState::Off))
    }

    #[tokio::test]
    async fn test_stale_submission_ignored() {
        let h = harness().await;
        let first = h
            .orchestrator
            .on_schedule_change(ProviderId::Dtek, date(), &schedule(20..24), Some(t0()))
            .await;
        assert_eq!(first, Outcome::Sent { is_new: true });

        let stale = h
            .orchestrator
            .on_schedule_change(
                ProviderId::Yasno,
                date(),
                &schedule(10..12),
                Some(t0() - Duration::minutes(5)),
            )
            .await;
        assert_eq!(stale, Outcome::Stale);

        let stored = h
            .repo
            .find_by_date_iso("2025-01-15T04:00:00.000Z")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.provider_id, ProviderId::Dtek);
        assert_eq!(h.delivery.group_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_sending_disabled_persists_and_reports() {
        let h = harness().await;
        h.config.set_sending_enabled(false).await.unwrap();

        let outcome = h
            .orchestrator
            .on_schedule_change(ProviderId::KyivDigital, date(), &schedule(20..24), Some(t0()))
            .await;
        assert_eq!(outcome, Outcome::Suppressed(SuppressReason::SendingDisabled));
        assert!(h.delivery.group_messages().is_empty());
        assert_eq!(h.delivery.owner_messages().len(), 1);

        let stored = h
            .repo
            .find_by_date_iso("2025-01-15T04:00:00.000Z")
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_sent);
    }

    #[tokio::test]
    async fn test_tentative_day_not_published() {
        let h = harness().await;
        let mut grid = Grid::with_range(20..24, PowerState::Off);
        grid.set(30, PowerState::MaybeOff);

        let outcome = h
            .orchestrator
            .on_schedule_change(
                ProviderId::KyivDigital,
                date(),
                &NormalizedSchedule::tentative(date(), grid),
                Some(t0()),
            )
            .await;
        assert_eq!(outcome, Outcome::Suppressed(SuppressReason::Tentative));
        assert!(h.delivery.group_messages().is_empty());
        assert_eq!(h.delivery.owner_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_failure_retried_on_next_submission() {
        let h = harness().await;
        h.delivery.fail_groups(true);

        let outcome = h
            .orchestrator
            .on_schedule_change(ProviderId::Dtek, date(), &schedule(20..24), Some(t0()))
            .await;
        assert_eq!(outcome, Outcome::DeliveryFailed);
        assert!(outcome.needs_retry());
        assert_eq!(h.delivery.owner_messages().len(), 1);
        assert!(
            h.repo
                .find_by_date_iso("2025-01-15T04:00:00.000Z")
                .await
                .unwrap()
                .is_none()
        );

        h.delivery.fail_groups(false);
        let retry = h
            .orchestrator
            .on_schedule_change(
                ProviderId::Dtek,
                date(),
                &schedule(20..24),
                Some(t0() + Duration::minutes(5)),
            )
            .await;
        assert_eq!(retry, Outcome::Sent { is_new: true });
        assert_eq!(h.delivery.group_messages().len(), 1);

        let stored = h
            .repo
            .find_by_date_iso("2025-01-15T04:00:00.000Z")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_sent);
    }

    #[tokio::test]
    async fn test_failed_write_reported_and_not_stored() {
        let pool = init_memory_pool().await.unwrap();
        let repo = Arc::new(FlakyScheduleRepository::new(
            SqlxProcessedScheduleRepository::new(pool.clone()),
            1,
        ));
        let config = Arc::new(
            ScheduleConfigService::load(Arc::new(SqlxScheduleConfigRepository::new(pool)))
                .await
                .unwrap(),
        );
        let delivery = Arc::new(RecordingDelivery::default());
        let orchestrator = ScheduleOrchestrator::new(repo.clone(), delivery.clone(), config, TZ);

        let outcome = orchestrator
            .on_schedule_change(ProviderId::Yasno, date(), &schedule(20..24), Some(t0()))
            .await;
        assert_eq!(outcome, Outcome::Failed);
        let owner = delivery.owner_messages();
        assert_eq!(owner.len(), 1);
        assert!(owner[0].contains("Помилка обробки графіка"));
        assert!(
            repo.find_by_date_iso("2025-01-15T04:00:00.000Z")
                .await
                .unwrap()
                .is_none()
        );
    }

    struct FixedSource {
        id: ProviderId,
        schedule: Option<NormalizedSchedule>,
    }

    #[async_trait]
    impl ScheduleSource for FixedSource {
        fn id(&self) -> ProviderId {
            self.id
        }

        async fn fetch_schedules(&self) -> outage_sources::error::Result<Vec<NormalizedSchedule>> {
            Ok(self.schedule.clone().into_iter().collect())
        }
    }

    #[tokio::test]
    async fn test_get_schedule_intent_replies_to_chat() {
        let h = harness().await;
        let today = outage_sources::model::local_date(Utc::now(), TZ);
        let orchestrator = h.orchestrator.with_sources(vec![
            Arc::new(FixedSource {
                id: ProviderId::Yasno,
                schedule: Some(NormalizedSchedule::new(
                    today,
                    Grid::with_range(20..24, PowerState::Off),
                )),
            }),
            Arc::new(FixedSource {
                id: ProviderId::KyivDigital,
                schedule: None,
            }),
        ]);

        orchestrator
            .handle_intent(ScheduleIntent::GetSchedule {
                day: outage_sources::Day::Today,
                chat_id: 42,
            })
            .await;

        let replies = h.delivery.chat_messages();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, 42);
        assert!(replies[0].1.contains("з 10:00 до 12:00"));
        // The fallback hit was stored.
        let stored = h
            .repo
            .find_by_date_iso(&orchestrator.date_iso(today))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.provider_id, ProviderId::Yasno);
    }

    #[tokio::test]
    async fn test_get_schedule_intent_without_data() {
        let h = harness().await;
        h.orchestrator
            .handle_intent(ScheduleIntent::GetSchedule {
                day: outage_sources::Day::Tomorrow,
                chat_id: 7,
            })
            .await;

        let replies = h.delivery.chat_messages();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].1.contains(message::NO_SCHEDULE_YET));
    }

    #[tokio::test]
    async fn test_preview_does_not_publish() {
        let h = harness().await;
        let today = outage_sources::model::local_date(Utc::now(), TZ);
        let orchestrator = h.orchestrator.with_sources(vec![Arc::new(FixedSource {
            id: ProviderId::Dtek,
            schedule: Some(NormalizedSchedule::new(
                today,
                Grid::with_range(20..24, PowerState::Off),
            )),
        })]);

        let grid = orchestrator.preview_schedule(today).await.unwrap();
        assert_eq!(grid, Some(Grid::with_range(20..24, PowerState::Off)));
        assert!(h.delivery.group_messages().is_empty());
        assert!(
            h.repo
                .find_by_date_iso(&orchestrator.date_iso(today))
                .await
                .unwrap()
                .is_none()
        );
    }
}
