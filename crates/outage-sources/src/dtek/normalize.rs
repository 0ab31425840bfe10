//! Decoding of the shutdowns page `DisconSchedule.fact` payload.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::DateTime;
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;
use strum::EnumString;
use tracing::debug;

use crate::error::{Result, SourceError};
use crate::model::{Grid, NormalizedSchedule, PowerState};

static FACT_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"DisconSchedule\.fact\s*=\s*").unwrap_or_else(|e| panic!("invalid regex: {e}"))
});

/// Hourly status code. Each code expands into a pair of half-hour states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SlotCode {
    Yes,
    No,
    Maybe,
    First,
    Second,
    #[strum(serialize = "mfirst")]
    MFirst,
    #[strum(serialize = "msecond")]
    MSecond,
}

impl SlotCode {
    /// `(first half, second half)` of the hour.
    pub fn halves(self) -> (PowerState, PowerState) {
        use PowerState::*;
        match self {
            SlotCode::Yes => (On, On),
            SlotCode::No => (Off, Off),
            SlotCode::Maybe => (MaybeOff, MaybeOff),
            SlotCode::First => (Off, On),
            SlotCode::Second => (On, Off),
            SlotCode::MFirst => (MaybeOff, On),
            SlotCode::MSecond => (On, MaybeOff),
        }
    }
}

/// `group -> hour ("1".."24") -> code`
pub type DayGroups = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Deserialize)]
pub struct DisconFact {
    #[serde(default)]
    pub today: Option<i64>,
    #[serde(default)]
    pub update: Option<String>,
    /// Keyed by the unix timestamp of the day start.
    #[serde(default)]
    pub data: BTreeMap<String, DayGroups>,
}

/// Extracts the `DisconSchedule.fact` object from the page HTML.
pub fn extract_fact(html: &str) -> Result<DisconFact> {
    let found = FACT_ASSIGNMENT
        .find(html)
        .ok_or_else(|| SourceError::data_shape("DisconSchedule.fact not found in page"))?;

    let mut stream =
        serde_json::Deserializer::from_str(&html[found.end()..]).into_iter::<DisconFact>();
    match stream.next() {
        Some(fact) => Ok(fact?),
        None => Err(SourceError::data_shape("DisconSchedule.fact is empty")),
    }
}

/// Expands hourly codes into a grid. Missing or unknown codes leave the hour On.
pub fn normalize_day(hours: &BTreeMap<String, String>) -> Grid {
    let mut grid = Grid::all_on();
    for hour in 0..24 {
        let key = (hour + 1).to_string();
        let Some(raw) = hours.get(&key) else {
            continue;
        };
        let Ok(code) = SlotCode::from_str(raw) else {
            debug!("Unknown DTEK slot code '{}' for hour {}", raw, key);
            continue;
        };
        let (first, second) = code.halves();
        grid.set(hour * 2, first);
        grid.set(hour * 2 + 1, second);
    }
    grid
}

/// Converts the fact payload into schedules for `group`.
///
/// Days where every slot is On are treated as not yet published.
pub fn schedules_from_fact(fact: &DisconFact, group: &str, tz: Tz) -> Result<Vec<NormalizedSchedule>> {
    if fact.data.is_empty() {
        return Err(SourceError::data_shape("DisconSchedule.fact has no data"));
    }

    let mut schedules = Vec::with_capacity(fact.data.len());
    for (day_ts, groups) in &fact.data {
        let ts: i64 = day_ts
            .parse()
            .map_err(|_| SourceError::data_shape(format!("invalid day timestamp '{day_ts}'")))?;
        let date = DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| SourceError::data_shape(format!("day timestamp out of range: {ts}")))?
            .with_timezone(&tz)
            .date_naive();

        let hours = groups.get(group).ok_or_else(|| {
            SourceError::data_shape(format!("group {group} missing for day {date}"))
        })?;

        let grid = normalize_day(hours);
        if grid.is_all_on() {
            debug!("DTEK day {} is all on, treating as unpublished", date);
            continue;
        }
        schedules.push(NormalizedSchedule::new(date, grid));
    }

    schedules.sort_by_key(|s| s.date);
    Ok(schedules)
}
