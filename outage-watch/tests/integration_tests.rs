//! End-to-end tests of the schedule pipeline against an in-memory database.

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use outage_sources::{Grid, NormalizedSchedule, PowerState, ProviderId};
use outage_watch::config::ScheduleConfigService;
use outage_watch::database::init_memory_pool;
use outage_watch::database::models::ProcessedScheduleInfo;
use outage_watch::database::repositories::{
    ProcessedScheduleRepository, SqlxProcessedScheduleRepository, SqlxScheduleConfigRepository,
};
use outage_watch::notification::ScheduleDelivery;
use outage_watch::schedule::{Outcome, ScheduleOrchestrator, SuppressReason};
use parking_lot::Mutex;

const TZ: chrono_tz::Tz = chrono_tz::Europe::Kyiv;

#[derive(Default)]
struct CapturingDelivery {
    groups: Mutex<Vec<String>>,
    owner: Mutex<Vec<String>>,
}

impl CapturingDelivery {
    fn groups(&self) -> Vec<String> {
        self.groups.lock().clone()
    }

    fn owner(&self) -> Vec<String> {
        self.owner.lock().clone()
    }
}

#[async_trait]
impl ScheduleDelivery for CapturingDelivery {
    async fn send_to_all_enabled_groups(&self, text: &str) -> outage_watch::Result<()> {
        self.groups.lock().push(text.to_string());
        Ok(())
    }

    async fn send_to_owner(&self, text: &str) -> outage_watch::Result<()> {
        self.owner.lock().push(text.to_string());
        Ok(())
    }

    async fn send_to_chat(&self, _chat_id: i64, _text: &str) -> outage_watch::Result<()> {
        Ok(())
    }
}

/// Repository wrapper that delays lookups for one date.
struct SlowRepository {
    inner: SqlxProcessedScheduleRepository,
    slow_date_iso: String,
    delay: StdDuration,
}

#[async_trait]
impl ProcessedScheduleRepository for SlowRepository {
    async fn find_by_date_iso(&self, date_iso: &str) -> outage_watch::Result<Option<ProcessedScheduleInfo>> {
        if date_iso == self.slow_date_iso {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.find_by_date_iso(date_iso).await
    }

    async fn upsert(&self, info: &ProcessedScheduleInfo) -> outage_watch::Result<()> {
        self.inner.upsert(info).await
    }

    async fn list_recent(&self, limit: i64) -> outage_watch::Result<Vec<ProcessedScheduleInfo>> {
        self.inner.list_recent(limit).await
    }
}

struct Pipeline {
    orchestrator: Arc<ScheduleOrchestrator>,
    delivery: Arc<CapturingDelivery>,
    repo: Arc<dyn ProcessedScheduleRepository>,
}

async fn pipeline_with(
    wrap: impl FnOnce(SqlxProcessedScheduleRepository) -> Arc<dyn ProcessedScheduleRepository>,
) -> Pipeline {
    let pool = init_memory_pool().await.unwrap();
    let config = Arc::new(
        ScheduleConfigService::load(Arc::new(SqlxScheduleConfigRepository::new(pool.clone())))
            .await
            .unwrap(),
    );
    let repo = wrap(SqlxProcessedScheduleRepository::new(pool));
    let delivery = Arc::new(CapturingDelivery::default());
    let orchestrator = Arc::new(ScheduleOrchestrator::new(
        repo.clone(),
        delivery.clone(),
        config,
        TZ,
    ));
    Pipeline {
        orchestrator,
        delivery,
        repo,
    }
}

async fn pipeline() -> Pipeline {
    pipeline_with(|repo| Arc::new(repo)).await
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 7, 0, 0).unwrap()
}

fn off(range: std::ops::Range<usize>) -> NormalizedSchedule {
    NormalizedSchedule::new(day(), Grid::with_range(range, PowerState::Off))
}

const DATE_ISO: &str = "2025-01-15T04:00:00.000Z";

#[tokio::test]
async fn test_end_to_end_publication() {
    let p = pipeline().await;
    let o = &p.orchestrator;

    let first = o
        .on_schedule_change(ProviderId::KyivDigital, day(), &off(20..24), Some(t0()))
        .await;
    assert_eq!(first, Outcome::Sent { is_new: true });

    let stored = p.repo.find_by_date_iso(DATE_ISO).await.unwrap().unwrap();
    assert!(stored.is_sent);
    assert_eq!(stored.provider_id, ProviderId::KyivDigital);

    let groups = p.delivery.groups();
    assert_eq!(groups.len(), 1);
    assert!(groups[0].contains("Новий графік"));
    assert!(groups[0].contains("10:00"));
    assert!(groups[0].contains("12:00"));

    let second = o
        .on_schedule_change(
            ProviderId::KyivDigital,
            day(),
            &off(20..24),
            Some(t0() + Duration::minutes(5)),
        )
        .await;
    assert_eq!(second, Outcome::Unchanged);
    assert_eq!(p.delivery.groups().len(), 1);

    let third = o
        .on_schedule_change(
            ProviderId::KyivDigital,
            day(),
            &off(20..25),
            Some(t0() + Duration::minutes(61)),
        )
        .await;
    assert_eq!(third, Outcome::Sent { is_new: false });

    let groups = p.delivery.groups();
    assert_eq!(groups.len(), 2);
    assert!(groups[1].contains("з 10:00 до 12:30"));
    assert!(!groups[1].contains("Новий графік"));

    let stored = p.repo.find_by_date_iso(DATE_ISO).await.unwrap().unwrap();
    assert_eq!(stored.hours, Grid::with_range(20..25, PowerState::Off));
}

#[tokio::test]
async fn test_identical_submissions_store_one_record() {
    let p = pipeline().await;
    for provider in [ProviderId::KyivDigital, ProviderId::Dtek, ProviderId::Yasno] {
        p.orchestrator
            .on_schedule_change(provider, day(), &off(10..14), Some(t0()))
            .await;
    }

    assert_eq!(p.repo.list_recent(10).await.unwrap().len(), 1);
    assert_eq!(p.delivery.groups().len(), 1);
}

#[tokio::test]
async fn test_cooldown_persists_without_sending() {
    let p = pipeline().await;
    let o = &p.orchestrator;

    o.on_schedule_change(ProviderId::Dtek, day(), &off(20..24), Some(t0()))
        .await;

    let within = o
        .on_schedule_change(
            ProviderId::Dtek,
            day(),
            &off(20..26),
            Some(t0() + Duration::minutes(20)),
        )
        .await;
    assert_eq!(within, Outcome::Suppressed(SuppressReason::CoolingDown));
    assert_eq!(p.delivery.groups().len(), 1);
    let owner = p.delivery.owner();
    assert_eq!(owner.len(), 1);
    assert!(owner[0].contains("broadcast"));

    let stored = p.repo.find_by_date_iso(DATE_ISO).await.unwrap().unwrap();
    assert_eq!(stored.hours, Grid::with_range(20..26, PowerState::Off));
    assert!(!stored.is_sent);

    let after = o
        .on_schedule_change(
            ProviderId::Dtek,
            day(),
            &off(20..28),
            Some(t0() + Duration::minutes(61)),
        )
        .await;
    assert_eq!(after, Outcome::Sent { is_new: false });
    assert_eq!(p.delivery.groups().len(), 2);
}

#[tokio::test]
async fn test_concurrent_first_writes_send_one_new_notification() {
    let p = pipeline().await;

    let mut handles = Vec::new();
    for (i, provider) in [ProviderId::KyivDigital, ProviderId::Dtek, ProviderId::Yasno]
        .into_iter()
        .enumerate()
    {
        let orchestrator = p.orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .on_schedule_change(provider, day(), &off(20..24 + i), Some(t0()))
                .await
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    let new_sends = outcomes
        .iter()
        .filter(|o| **o == Outcome::Sent { is_new: true })
        .count();
    assert_eq!(new_sends, 1);

    let new_messages = p
        .delivery
        .groups()
        .iter()
        .filter(|m| m.contains("Новий графік"))
        .count();
    assert_eq!(new_messages, 1);
    assert_eq!(p.repo.list_recent(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_different_dates_do_not_wait_on_each_other() {
    let slow_day = NaiveDate::from_ymd_opt(2025, 1, 20).unwrap();
    let slow_date_iso = "2025-01-20T04:00:00.000Z".to_string();
    let p = pipeline_with(move |inner| {
        Arc::new(SlowRepository {
            inner,
            slow_date_iso,
            delay: StdDuration::from_millis(500),
        })
    })
    .await;

    let slow = {
        let orchestrator = p.orchestrator.clone();
        tokio::spawn(async move {
            let schedule = NormalizedSchedule::new(slow_day, Grid::with_range(0..4, PowerState::Off));
            orchestrator
                .on_schedule_change(ProviderId::Dtek, slow_day, &schedule, None)
                .await
        })
    };
    // Let the slow submission take its date lock first.
    tokio::time::sleep(StdDuration::from_millis(20)).await;

    let started = Instant::now();
    for offset in 0..2 {
        let date = day() + Duration::days(offset);
        let schedule = NormalizedSchedule::new(date, Grid::with_range(20..24, PowerState::Off));
        let outcome = p
            .orchestrator
            .on_schedule_change(ProviderId::Yasno, date, &schedule, None)
            .await;
        assert!(outcome.is_sent());
    }
    assert!(started.elapsed() < StdDuration::from_millis(400));
    assert!(!slow.is_finished());

    assert!(slow.await.unwrap().is_sent());
}

#[tokio::test]
async fn test_all_on_day_renders_single_line() {
    let p = pipeline().await;
    let schedule = NormalizedSchedule::new(day(), Grid::all_on());

    p.orchestrator
        .on_schedule_change(ProviderId::Yasno, day(), &schedule, Some(t0()))
        .await;

    let groups = p.delivery.groups();
    assert_eq!(groups.len(), 1);
    assert!(groups[0].ends_with("Світло буде весь день"));
}
