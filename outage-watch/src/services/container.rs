//! Service container for dependency injection.
//!
//! Builds the database pool, config service, delivery, sources and the
//! orchestrator from [`Settings`], and owns the background tasks started by
//! [`ServiceContainer::start`].

use std::sync::Arc;
use std::time::Duration;

use outage_sources::dtek::{DtekSource, PageSession};
use outage_sources::http::default_client;
use outage_sources::kyiv_digital::KyivDigitalSource;
use outage_sources::yasno::YasnoSource;
use outage_sources::{ProviderId, ScheduleSource};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Result;
use crate::config::{ScheduleConfigService, Settings};
use crate::database::repositories::{SqlxProcessedScheduleRepository, SqlxScheduleConfigRepository};
use crate::database::{self, DbPool};
use crate::notification::{LogDelivery, ScheduleDelivery, TelegramConfig, TelegramDelivery};
use crate::providers::ProviderPoller;
use crate::schedule::{IntentBroadcaster, ScheduleOrchestrator};

/// Default shutdown timeout.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

struct PolledSource {
    source: Arc<dyn ScheduleSource>,
    poll_interval: Duration,
}

pub struct ServiceContainer {
    pub pool: DbPool,
    pub settings: Settings,
    pub config_service: Arc<ScheduleConfigService>,
    pub schedule_repo: Arc<SqlxProcessedScheduleRepository>,
    pub delivery: Arc<dyn ScheduleDelivery>,
    pub orchestrator: Arc<ScheduleOrchestrator>,
    pub intents: IntentBroadcaster,
    sources: Vec<PolledSource>,
    dtek_session: Option<(Arc<PageSession>, Duration)>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Opens the database from `settings` and builds every service.
    pub async fn new(settings: Settings) -> Result<Self> {
        let pool = database::init_pool(&settings.database_url).await?;
        database::run_migrations(&pool).await?;
        Self::with_pool(pool, settings).await
    }

    /// Builds every service on an already migrated pool.
    pub async fn with_pool(pool: DbPool, settings: Settings) -> Result<Self> {
        info!("Initializing service container");

        let config_service = Arc::new(
            ScheduleConfigService::load(Arc::new(SqlxScheduleConfigRepository::new(pool.clone())))
                .await?,
        );
        let schedule_repo = Arc::new(SqlxProcessedScheduleRepository::new(pool.clone()));
        let delivery = build_delivery(&settings)?;

        let mut sources = Vec::new();
        let mut dtek_session = None;

        match (settings.kyiv_digital_config(), &settings.kyiv_digital) {
            (Some(config), Some(kd)) => sources.push(PolledSource {
                source: Arc::new(KyivDigitalSource::new(default_client()?, config)),
                poll_interval: kd.poll_interval,
            }),
            _ => warn!("{} source not configured (KD_OBJECT_ID, KD_TOKEN)", ProviderId::KyivDigital),
        }

        match (settings.dtek_config(), &settings.dtek) {
            (Some(config), Some(dtek)) => {
                let session = Arc::new(PageSession::new()?);
                sources.push(PolledSource {
                    source: Arc::new(DtekSource::new(session.clone(), config)),
                    poll_interval: dtek.poll_interval,
                });
                dtek_session = Some((session, dtek.restart_interval));
            }
            _ => warn!("{} source disabled", ProviderId::Dtek),
        }

        match (settings.yasno_config(), &settings.yasno) {
            (Some(config), Some(yasno)) => sources.push(PolledSource {
                source: Arc::new(YasnoSource::new(default_client()?, config)),
                poll_interval: yasno.poll_interval,
            }),
            _ => warn!("{} source not configured (YASNO_STREET, YASNO_BUILDING)", ProviderId::Yasno),
        }

        let orchestrator = Arc::new(
            ScheduleOrchestrator::new(
                schedule_repo.clone(),
                delivery.clone(),
                config_service.clone(),
                settings.timezone,
            )
            .with_sources(sources.iter().map(|s| s.source.clone()).collect()),
        );

        info!(
            "Service container ready with {} sources: [{}]",
            sources.len(),
            sources
                .iter()
                .map(|s| s.source.id().as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            pool,
            settings,
            config_service,
            schedule_repo,
            delivery,
            orchestrator,
            intents: IntentBroadcaster::new(),
            sources,
            dtek_session,
            tasks: Mutex::new(Vec::new()),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Spawns the pollers, the intent listener, config refresh and page
    /// session housekeeping.
    pub fn start(&self) {
        let token = &self.cancellation_token;
        let mut tasks = self.tasks.lock();

        tasks.push(
            self.config_service
                .spawn_refresh(self.settings.config_refresh_interval, token.clone()),
        );
        tasks.push(
            self.orchestrator
                .spawn_intent_listener(self.intents.subscribe(), token.clone()),
        );
        if let Some((session, interval)) = &self.dtek_session {
            tasks.push(session.spawn_housekeeping(*interval, token.clone()));
        }

        for polled in &self.sources {
            let poller = ProviderPoller::new(
                polled.source.clone(),
                self.orchestrator.clone(),
                self.config_service.clone(),
                self.delivery.clone(),
                polled.poll_interval,
            );
            info!(
                provider = %poller.provider_id(),
                "Starting poller (interval {:?})",
                polled.poll_interval
            );
            tasks.push(poller.spawn(token.clone()));
        }
    }

    /// Shutdown all services gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<()> {
        info!("Shutting down services (timeout: {:?})", timeout);
        self.cancellation_token.cancel();

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        let joined = tokio::time::timeout(timeout, futures::future::join_all(tasks)).await;
        match joined {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!("Background task ended abnormally: {}", e);
                    }
                }
            }
            Err(_) => warn!("Shutdown timeout reached, forcing shutdown"),
        }

        info!("Closing database pool...");
        self.pool.close().await;
        info!("Services shut down");
        Ok(())
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn source_ids(&self) -> Vec<ProviderId> {
        self.sources.iter().map(|s| s.source.id()).collect()
    }
}

fn build_delivery(settings: &Settings) -> Result<Arc<dyn ScheduleDelivery>> {
    match &settings.telegram {
        Some(telegram) => {
            info!(
                "Telegram delivery to {} groups",
                telegram.group_chat_ids.len()
            );
            Ok(Arc::new(TelegramDelivery::new(TelegramConfig::from(telegram))?))
        }
        None => {
            warn!("TELEGRAM_BOT_TOKEN or TELEGRAM_OWNER_CHAT_ID missing, messages will only be logged");
            Ok(Arc::new(LogDelivery))
        }
    }
}
