//! Repository layer for database access.

pub mod processed_schedule;
pub mod schedule_config;

pub use processed_schedule::*;
pub use schedule_config::*;
