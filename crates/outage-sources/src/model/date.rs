//! Calendar-date identity for schedules.
//!
//! Every schedule is keyed by its local date anchored at 06:00 in the
//! configured zone, so DST changes never move a schedule to another day.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

const ANCHOR_HOUR: u32 = 6;

/// Instant of `date` at the anchor time-of-day in `tz`.
pub fn anchor(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::from_hms_opt(ANCHOR_HOUR, 0, 0).unwrap_or(NaiveTime::MIN));
    match tz.from_local_datetime(&local).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        // Inside a DST gap: interpret the wall time as if it were UTC-offset free.
        None => tz.from_utc_datetime(&local).with_timezone(&Utc),
    }
}

/// Stable identity key of `date`, e.g. `2025-01-15T04:00:00.000Z`.
pub fn date_iso(date: NaiveDate, tz: Tz) -> String {
    anchor(date, tz).to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Local calendar date of `instant` in `tz`.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Relative day used by on-demand requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Day {
    Today,
    Tomorrow,
}

impl Day {
    /// Calendar date this day refers to at `now`.
    pub fn resolve(self, now: DateTime<Utc>, tz: Tz) -> NaiveDate {
        let today = local_date(now, tz);
        match self {
            Day::Today => today,
            Day::Tomorrow => today.checked_add_days(Days::new(1)).unwrap_or(today),
        }
    }
}
