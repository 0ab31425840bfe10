//! Database models.
//!
//! These map directly to the schema; JSON columns are stored as text and
//! converted to domain types by the `into_*` / `from_*` helpers.

pub mod processed_schedule;
pub mod schedule_config;

pub use processed_schedule::*;
pub use schedule_config::*;
