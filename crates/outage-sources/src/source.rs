use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::model::{NormalizedSchedule, ProviderId};

/// A provider of outage schedules for the configured address.
///
/// Implementations return today's and tomorrow's schedules already normalized
/// to the canonical grid. Days the provider has not published are omitted.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    fn id(&self) -> ProviderId;

    async fn fetch_schedules(&self) -> Result<Vec<NormalizedSchedule>>;

    /// Schedule for a single date, if the provider currently publishes one.
    async fn get_schedule_for_date(&self, date: NaiveDate) -> Result<Option<NormalizedSchedule>> {
        let schedules = self.fetch_schedules().await?;
        Ok(schedules.into_iter().find(|s| s.date == date))
    }
}
