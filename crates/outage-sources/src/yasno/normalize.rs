//! Conversion of Yasno minute intervals into the half-hour grid.

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::model::{Grid, NormalizedSchedule, PowerState, SLOTS_PER_DAY};

/// Day status for which the published slots are authoritative.
pub const STATUS_SCHEDULE_APPLIES: &str = "ScheduleApplies";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SlotType {
    Definite,
    Possible,
    NotPlanned,
    #[serde(other)]
    Unknown,
}

/// Interval of minutes from local midnight, `start` inclusive, `end` exclusive.
#[derive(Debug, Clone, Deserialize)]
pub struct Slot {
    pub start: u32,
    pub end: u32,
    #[serde(rename = "type")]
    pub kind: SlotType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaySchedule {
    #[serde(default)]
    pub slots: Vec<Slot>,
    pub date: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSchedule {
    #[serde(default)]
    pub today: Option<DaySchedule>,
    #[serde(default)]
    pub tomorrow: Option<DaySchedule>,
    #[serde(default)]
    pub updated_on: Option<String>,
}

fn state_at(minute: u32, slots: &[Slot]) -> PowerState {
    slots
        .iter()
        .find(|slot| slot.start <= minute && minute < slot.end)
        .map(|slot| match slot.kind {
            SlotType::Definite => PowerState::Off,
            SlotType::Possible => PowerState::MaybeOff,
            SlotType::NotPlanned | SlotType::Unknown => PowerState::On,
        })
        .unwrap_or(PowerState::On)
}

/// Samples every half-hour bucket at its midpoint minute.
pub fn normalize_slots(slots: &[Slot]) -> Grid {
    let mut grid = Grid::all_on();
    for index in 0..SLOTS_PER_DAY {
        let minute = (index as u32) * 30 + 15;
        grid.set(index, state_at(minute, slots));
    }
    grid
}

fn parse_day_date(raw: &str, tz: Tz) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&tz).date_naive());
    }
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Schedules for the days the provider marks as applying.
pub fn schedules_from_group(group: &GroupSchedule, tz: Tz) -> Vec<NormalizedSchedule> {
    [group.today.as_ref(), group.tomorrow.as_ref()]
        .into_iter()
        .flatten()
        .filter(|day| day.status == STATUS_SCHEDULE_APPLIES && !day.slots.is_empty())
        .filter_map(|day| {
            let date = parse_day_date(&day.date, tz)?;
            Some(NormalizedSchedule::new(date, normalize_slots(&day.slots)))
        })
        .collect()
}
