//! DTEK shutdowns page source.
//!
//! The schedule is embedded in the page script as `DisconSchedule.fact`,
//! one status code per clock hour for each queue group.

pub mod normalize;
pub mod session;

use std::sync::Arc;

use async_trait::async_trait;
use chrono_tz::Tz;
use tracing::debug;

use crate::error::Result;
use crate::model::{NormalizedSchedule, ProviderId};
use crate::source::ScheduleSource;

pub use normalize::{DisconFact, SlotCode, extract_fact, normalize_day, schedules_from_fact};
pub use session::{DEFAULT_RESTART_INTERVAL, PageSession, SessionGuard};

pub const DEFAULT_PAGE_URL: &str = "https://www.dtek-kem.com.ua/ua/shutdowns";

#[derive(Debug, Clone)]
pub struct DtekConfig {
    pub page_url: String,
    /// Queue group id as used on the page, e.g. `GPV4.1`.
    pub group: String,
    pub timezone: Tz,
}

pub struct DtekSource {
    session: Arc<PageSession>,
    config: DtekConfig,
}

impl DtekSource {
    pub fn new(session: Arc<PageSession>, config: DtekConfig) -> Self {
        Self { session, config }
    }

    pub fn session(&self) -> &Arc<PageSession> {
        &self.session
    }
}

#[async_trait]
impl ScheduleSource for DtekSource {
    fn id(&self) -> ProviderId {
        ProviderId::Dtek
    }

    async fn fetch_schedules(&self) -> Result<Vec<NormalizedSchedule>> {
        let html = self.session.fetch_text(&self.config.page_url).await?;
        let fact = extract_fact(&html)?;
        if let Some(update) = &fact.update {
            debug!("DTEK schedule last updated at {}", update);
        }
        schedules_from_fact(&fact, &self.config.group, self.config.timezone)
    }
}
