//! Human-readable rendering of a day grid.
//!
//! The grid is compressed into outage ranges in a single left-to-right scan.
//! On is the implicit background and never rendered.

use std::fmt::Write;

use chrono::{Datelike, NaiveDate, Weekday};
use outage_sources::model::{SLOTS_PER_DAY, slot_label};
use outage_sources::{Day, Grid, PowerState};

pub const ALL_DAY_ON: &str = "Світло буде весь день";
pub const NO_SCHEDULE_YET: &str = "Графіка поки немає";

const MONTHS: [&str; 12] = [
    "січ.", "лют.", "бер.", "квіт.", "трав.", "черв.", "лип.", "серп.", "вер.", "жовт.", "лист.",
    "груд.",
];

/// A contiguous run of one non-On state. `end` is exclusive; 48 is the
/// next-day boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutageRange {
    pub state: PowerState,
    pub start: usize,
    pub end: usize,
}

impl OutageRange {
    pub fn start_label(&self) -> String {
        slot_label(self.start)
    }

    pub fn end_label(&self) -> String {
        slot_label(self.end)
    }
}

/// Outage ranges of `grid` in chronological order.
pub fn compress(grid: &Grid) -> Vec<OutageRange> {
    let mut ranges = Vec::new();
    let mut open: Option<OutageRange> = None;

    for (index, state) in grid.iter().enumerate() {
        if let Some(range) = open {
            if range.state == state {
                continue;
            }
            ranges.push(OutageRange { end: index, ..range });
            open = None;
        }
        if state.is_outage() {
            open = Some(OutageRange {
                state,
                start: index,
                end: SLOTS_PER_DAY,
            });
        }
    }
    ranges.extend(open);
    ranges
}

fn header(state: PowerState) -> &'static str {
    match state {
        PowerState::MaybeOff => "Можливе відключення:",
        _ => "Світло буде відсутнє:",
    }
}

/// Body text for `grid`.
///
/// A header is emitted whenever a range's state differs from the previous
/// range's state, so alternating Off/MaybeOff/Off renders as three blocks.
pub fn render_ranges(grid: &Grid) -> String {
    let ranges = compress(grid);
    if ranges.is_empty() {
        return ALL_DAY_ON.to_string();
    }

    let mut out = String::new();
    let mut previous: Option<PowerState> = None;
    for range in &ranges {
        if previous != Some(range.state) {
            if previous.is_some() {
                out.push('\n');
            }
            out.push_str(header(range.state));
            out.push('\n');
            previous = Some(range.state);
        }
        let _ = writeln!(out, "з {} до {}", range.start_label(), range.end_label());
    }
    out.truncate(out.trim_end().len());
    out
}

pub fn month_abbrev(date: NaiveDate) -> &'static str {
    MONTHS[date.month0() as usize]
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "понеділок",
        Weekday::Tue => "вівторок",
        Weekday::Wed => "середа",
        Weekday::Thu => "четвер",
        Weekday::Fri => "пʼятниця",
        Weekday::Sat => "субота",
        Weekday::Sun => "неділя",
    }
}

/// `🗓 Новий графік на 15 січ., середа` for a first publication,
/// `🗓 Графік на …` for an update.
pub fn title_line(date: NaiveDate, is_new: bool) -> String {
    format!(
        "🗓 {} на {} {}, {}",
        if is_new { "Новий графік" } else { "Графік" },
        date.day(),
        month_abbrev(date),
        weekday_name(date.weekday())
    )
}

pub fn day_title(date: NaiveDate, day: Day) -> String {
    let relative = match day {
        Day::Today => "сьогодні",
        Day::Tomorrow => "завтра",
    };
    format!("🗓 Графік на {} ({} {})", relative, date.day(), month_abbrev(date))
}

/// Full HTML message announcing a schedule change.
pub fn schedule_message(date: NaiveDate, grid: &Grid, is_new: bool) -> String {
    format!("<b>{}</b>\n\n{}", title_line(date, is_new), render_ranges(grid))
}

/// Full HTML message answering an on-demand request.
pub fn day_message(date: NaiveDate, day: Day, grid: &Grid) -> String {
    format!("<b>{}</b>\n\n{}", day_title(date, day), render_ranges(grid))
}
