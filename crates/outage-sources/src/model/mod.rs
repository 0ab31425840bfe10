//! Canonical schedule model shared by every source and by the orchestrator.
//!
//! A day is represented as a fixed 48-slot grid of [`PowerState`] values.
//! Slot `i` covers minutes `[i * 30, i * 30 + 30)` from local midnight.

mod date;

pub use date::{Day, anchor, date_iso, local_date};

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Number of half-hour slots in a day.
pub const SLOTS_PER_DAY: usize = 48;

/// Power state of a single half-hour slot.
///
/// Persisted and exchanged as an integer (`0`, `1`, `2`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum PowerState {
    #[default]
    On,
    /// Tentative outage, not yet confirmed by the provider.
    MaybeOff,
    Off,
}

impl PowerState {
    /// Whether this state describes a (possible) outage.
    pub fn is_outage(self) -> bool {
        !matches!(self, PowerState::On)
    }
}

impl From<PowerState> for u8 {
    fn from(state: PowerState) -> Self {
        match state {
            PowerState::On => 0,
            PowerState::MaybeOff => 1,
            PowerState::Off => 2,
        }
    }
}

impl TryFrom<u8> for PowerState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PowerState::On),
            1 => Ok(PowerState::MaybeOff),
            2 => Ok(PowerState::Off),
            other => Err(format!("invalid power state: {other}")),
        }
    }
}

/// Identifier of a schedule provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
pub enum ProviderId {
    /// Kyiv Digital API.
    #[serde(rename = "kd")]
    #[strum(serialize = "kd")]
    KyivDigital,
    /// DTEK shutdowns page.
    #[serde(rename = "dtek")]
    #[strum(serialize = "dtek")]
    Dtek,
    /// Yasno blackout service.
    #[serde(rename = "yasno")]
    #[strum(serialize = "yasno")]
    Yasno,
}

impl ProviderId {
    /// All known providers, in query priority order.
    pub const ALL: [ProviderId; 3] = [ProviderId::KyivDigital, ProviderId::Dtek, ProviderId::Yasno];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::KyivDigital => "kd",
            ProviderId::Dtek => "dtek",
            ProviderId::Yasno => "yasno",
        }
    }
}

/// Key of slot `index` in the persisted object form (`h00_0` .. `h23_1`).
pub fn slot_key(index: usize) -> String {
    format!("h{:02}_{}", index / 2, index % 2)
}

/// Wall-clock label for the start of slot `index`.
///
/// `index == 48` is the end of the day and renders as `00:00`.
pub fn slot_label(index: usize) -> String {
    let hour = (index / 2) % 24;
    let minute = (index % 2) * 30;
    format!("{:02}:{:02}", hour, minute)
}

fn parse_slot_key(key: &str) -> Option<usize> {
    let rest = key.strip_prefix('h')?;
    let (hour, half) = rest.split_once('_')?;
    if hour.len() != 2 || half.len() != 1 {
        return None;
    }
    let hour: usize = hour.parse().ok()?;
    let half: usize = half.parse().ok()?;
    if hour >= 24 || half > 1 {
        return None;
    }
    Some(hour * 2 + half)
}

/// A full day of half-hour slots.
///
/// Always holds exactly [`SLOTS_PER_DAY`] entries. Serializes as an object
/// keyed `h00_0` .. `h23_1`; deserialization rejects partial objects.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, PowerState>",
    into = "BTreeMap<String, PowerState>"
)]
pub struct Grid([PowerState; SLOTS_PER_DAY]);

impl Grid {
    pub fn all_on() -> Self {
        Self::filled(PowerState::On)
    }

    pub fn filled(state: PowerState) -> Self {
        Self([state; SLOTS_PER_DAY])
    }

    pub fn from_slots(slots: [PowerState; SLOTS_PER_DAY]) -> Self {
        Self(slots)
    }

    /// Builds a grid with `state` applied to `range` and On elsewhere.
    pub fn with_range(range: std::ops::Range<usize>, state: PowerState) -> Self {
        let mut grid = Self::all_on();
        for index in range.filter(|i| *i < SLOTS_PER_DAY) {
            grid.0[index] = state;
        }
        grid
    }

    pub fn get(&self, index: usize) -> PowerState {
        self.0[index]
    }

    pub fn set(&mut self, index: usize, state: PowerState) {
        self.0[index] = state;
    }

    pub fn slots(&self) -> &[PowerState; SLOTS_PER_DAY] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = PowerState> + '_ {
        self.0.iter().copied()
    }

    pub fn is_all_on(&self) -> bool {
        self.iter().all(|s| s == PowerState::On)
    }

    pub fn has_maybe_off(&self) -> bool {
        self.iter().any(|s| s == PowerState::MaybeOff)
    }

    pub fn has_outage(&self) -> bool {
        self.iter().any(PowerState::is_outage)
    }

    /// Number of slots whose state differs from `other`.
    pub fn diff_count(&self, other: &Grid) -> usize {
        self.iter().zip(other.iter()).filter(|(a, b)| a != b).count()
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::all_on()
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let compact: String = self
            .iter()
            .map(|s| match s {
                PowerState::On => '.',
                PowerState::MaybeOff => '?',
                PowerState::Off => 'x',
            })
            .collect();
        write!(f, "Grid({compact})")
    }
}

impl From<Grid> for BTreeMap<String, PowerState> {
    fn from(grid: Grid) -> Self {
        grid.iter()
            .enumerate()
            .map(|(index, state)| (slot_key(index), state))
            .collect()
    }
}

impl TryFrom<BTreeMap<String, PowerState>> for Grid {
    type Error = String;

    fn try_from(map: BTreeMap<String, PowerState>) -> Result<Self, Self::Error> {
        let mut slots = [None; SLOTS_PER_DAY];
        for (key, state) in map {
            let index = parse_slot_key(&key).ok_or_else(|| format!("unknown slot key: {key}"))?;
            slots[index] = Some(state);
        }

        let mut grid = Grid::all_on();
        for (index, slot) in slots.into_iter().enumerate() {
            let state = slot.ok_or_else(|| format!("missing slot: {}", slot_key(index)))?;
            grid.set(index, state);
        }
        Ok(grid)
    }
}

/// A provider schedule normalized to the canonical grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSchedule {
    /// Local calendar date the grid applies to.
    pub date: NaiveDate,
    pub hours: Grid,
    /// `false` when the provider still marks part of the day as tentative.
    pub finalized: bool,
}

impl NormalizedSchedule {
    pub fn new(date: NaiveDate, hours: Grid) -> Self {
        Self {
            date,
            hours,
            finalized: true,
        }
    }

    pub fn tentative(date: NaiveDate, hours: Grid) -> Self {
        Self {
            date,
            hours,
            finalized: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_slot_labels() {
        assert_eq!(slot_label(0), "00:00");
        assert_eq!(slot_label(20), "10:00");
        assert_eq!(slot_label(25), "12:30");
        assert_eq!(slot_label(47), "23:30");
        assert_eq!(slot_label(48), "00:00");
    }

    #[test]
    fn test_slot_keys_parse_back() {
        assert_eq!(slot_key(0), "h00_0");
        assert_eq!(slot_key(47), "h23_1");
        assert_eq!(parse_slot_key("h10_1"), Some(21));
        assert_eq!(parse_slot_key("h24_0"), None);
        assert_eq!(parse_slot_key("h1_0"), None);
    }

    #[test]
    fn test_grid_json_object_form() {
        let grid = Grid::with_range(20..24, PowerState::Off);
        let json = serde_json::to_value(grid).unwrap();
        assert_eq!(json["h10_0"], 2);
        assert_eq!(json["h09_1"], 0);
        assert_eq!(json.as_object().unwrap().len(), SLOTS_PER_DAY);

        let parsed: Grid = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, grid);
    }

    #[test]
    fn test_grid_rejects_partial_object() {
        let mut map: BTreeMap<String, PowerState> = Grid::all_on().into();
        map.remove("h12_1");
        let json = serde_json::to_string(&map).unwrap();
        let err = serde_json::from_str::<Grid>(&json).unwrap_err();
        assert!(err.to_string().contains("h12_1"));
    }

    #[test]
    fn test_power_state_rejects_unknown_code() {
        assert!(serde_json::from_str::<PowerState>("3").is_err());
        assert_eq!(serde_json::from_str::<PowerState>("1").unwrap(), PowerState::MaybeOff);
    }

    #[test]
    fn test_grid_predicates() {
        let mut grid = Grid::all_on();
        assert!(grid.is_all_on());
        assert!(!grid.has_outage());

        grid.set(3, PowerState::MaybeOff);
        assert!(grid.has_maybe_off());
        assert!(grid.has_outage());
        assert_eq!(grid.diff_count(&Grid::all_on()), 1);
    }

    #[test]
    fn test_provider_id_strings() {
        assert_eq!(ProviderId::KyivDigital.to_string(), "kd");
        assert_eq!(ProviderId::from_str("yasno").unwrap(), ProviderId::Yasno);
        assert_eq!(
            serde_json::to_string(&ProviderId::Dtek).unwrap(),
            "\"dtek\""
        );
        assert!(ProviderId::from_str("unknown").is_err());
    }
}
