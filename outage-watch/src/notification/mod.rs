//! Outward message delivery.
//!
//! The orchestrator only sees [`ScheduleDelivery`]: send to every enabled
//! group, to the owner (administrative channel) or to a single chat.

pub mod telegram;

use async_trait::async_trait;
use tracing::info;

use crate::Result;

pub use telegram::{TelegramConfig, TelegramDelivery};

/// Delivery of HTML-formatted text messages.
#[async_trait]
pub trait ScheduleDelivery: Send + Sync {
    /// Sends `text` to every enabled group chat.
    async fn send_to_all_enabled_groups(&self, text: &str) -> Result<()>;

    /// Sends `text` to the owner chat.
    async fn send_to_owner(&self, text: &str) -> Result<()>;

    async fn send_to_chat(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Delivery that only writes messages to the log.
///
/// Used when no bot token is configured.
#[derive(Debug, Default)]
pub struct LogDelivery;

#[async_trait]
impl ScheduleDelivery for LogDelivery {
    async fn send_to_all_enabled_groups(&self, text: &str) -> Result<()> {
        info!(target: "outage_watch::delivery", "[groups] {}", text);
        Ok(())
    }

    async fn send_to_owner(&self, text: &str) -> Result<()> {
        info!(target: "outage_watch::delivery", "[owner] {}", text);
        Ok(())
    }

    async fn send_to_chat(&self, chat_id: i64, text: &str) -> Result<()> {
        info!(target: "outage_watch::delivery", "[chat {}] {}", chat_id, text);
        Ok(())
    }
}

/// Escapes text for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
