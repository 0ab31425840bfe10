//! Power outage schedule watcher.
//!
//! Polls the configured providers, detects changes per calendar date and
//! publishes them to Telegram groups.

pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod notification;
pub mod providers;
pub mod schedule;
pub mod services;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
