//! Telegram Bot API delivery.
//!
//! Messages go through `POST /bot<token>/sendMessage` in HTML parse mode.
//! A 429 response is retried after the `parameters.retry_after` delay.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use super::ScheduleDelivery;
use crate::config::TelegramSettings;
use crate::{Error, Result};

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Room left in each chunk for closing and reopening tags.
const HTML_TAG_RESERVE: usize = 64;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: String,
    pub owner_chat_id: i64,
    pub group_chat_ids: Vec<i64>,
}

impl From<&TelegramSettings> for TelegramConfig {
    fn from(settings: &TelegramSettings) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token: settings.bot_token.clone(),
            owner_chat_id: settings.owner_chat_id,
            group_chat_ids: settings.group_chat_ids.clone(),
        }
    }
}

pub struct TelegramDelivery {
    config: TelegramConfig,
    client: Client,
}

impl TelegramDelivery {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let client = outage_sources::http::default_client()?;
        Ok(Self { config, client })
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    async fn send_with_retry(&self, payload: &serde_json::Value) -> Result<()> {
        let url = self.send_message_url();
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(&url)
                .json(payload)
                .send()
                .await
                .map_err(|e| Error::delivery(format!("Telegram request failed: {}", e)))?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            if status.as_u16() == 429 {
                let body: serde_json::Value = response.json().await.unwrap_or_default();
                let retry_after = body
                    .get("parameters")
                    .and_then(|p| p.get("retry_after"))
                    .and_then(|v| v.as_u64())
                    .map(Duration::from_secs);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Telegram rate limit: giving up after {} attempts, last retry_after {:?}",
                        attempts, retry_after
                    );
                    return Err(Error::delivery(format!(
                        "Telegram rate limit exceeded after {} retries",
                        MAX_RATE_LIMIT_RETRIES
                    )));
                }

                let wait = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "Telegram rate limited, waiting {:?} (attempt {}/{})",
                    wait, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Error::delivery(format!(
                "Telegram sendMessage failed: {} - {}",
                status, body
            )));
        }
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        for chunk in split_html(text, TELEGRAM_MESSAGE_LIMIT) {
            let payload = json!({
                "chat_id": chat_id,
                "text": chunk,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            });
            self.send_with_retry(&payload).await?;
        }
        debug!("Telegram message sent to {}", chat_id);
        Ok(())
    }
}

#[async_trait]
impl ScheduleDelivery for TelegramDelivery {
    async fn send_to_all_enabled_groups(&self, text: &str) -> Result<()> {
        let mut failed = 0;
        for chat_id in &self.config.group_chat_ids {
            if let Err(e) = self.send_text(*chat_id, text).await {
                warn!("Failed to send schedule to group {}: {}", chat_id, e);
                failed += 1;
            }
        }
        let total = self.config.group_chat_ids.len();
        if total > 0 && failed == total {
            return Err(Error::delivery(format!(
                "all {total} group sends failed"
            )));
        }
        Ok(())
    }

    async fn send_to_owner(&self, text: &str) -> Result<()> {
        self.send_text(self.config.owner_chat_id, text).await
    }

    async fn send_to_chat(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_text(chat_id, text).await
    }
}

/// Splits `text` into chunks of at most `limit` characters, on line
/// boundaries where possible.
fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > limit {
            // A single overlong line is cut hard.
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Splits HTML `text` like [`split_message`], closing tags left open at the
/// end of a chunk and reopening them at the start of the next one.
fn split_html(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut open: Vec<String> = Vec::new();
    let mut chunks = Vec::new();
    for piece in split_message(text, limit.saturating_sub(HTML_TAG_RESERVE).max(1)) {
        let mut chunk = open.concat();
        chunk.push_str(&piece);
        track_tags(&piece, &mut open);
        for tag in open.iter().rev() {
            chunk.push_str("</");
            chunk.push_str(tag_name(tag));
            chunk.push('>');
        }
        chunks.push(chunk);
    }
    chunks
}

/// Updates the stack of open tags with the tags found in `html`.
fn track_tags(html: &str, open: &mut Vec<String>) {
    let mut rest = html;
    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        let tag = &rest[start..=start + len];
        if let Some(name) = tag.strip_prefix("</") {
            let name = name.trim_end_matches('>');
            if let Some(pos) = open.iter().rposition(|t| tag_name(t) == name) {
                open.truncate(pos);
            }
        } else {
            open.push(tag.to_string());
        }
        rest = &rest[start + len + 1..];
    }
}

fn tag_name(tag: &str) -> &str {
    tag.trim_start_matches('<')
        .trim_end_matches('>')
        .split_whitespace()
        .next()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TelegramConfig {
        TelegramConfig::from(&TelegramSettings {
            bot_token: "123:ABC".to_string(),
            owner_chat_id: 1,
            group_chat_ids: vec![-100, -200],
        })
    }

    #[test]
    fn test_send_message_url() {
        let delivery = TelegramDelivery::new(config()).unwrap();
        assert_eq!(
            delivery.send_message_url(),
            "https://api.telegram.org/bot123:ABC/sendMessage"
        );
    }

    #[test]
    fn test_split_short_message_untouched() {
        assert_eq!(split_message("hello", 100), vec!["hello".to_string()]);
    }

    #[test]
    fn test_split_on_line_boundaries() {
        let text = "aaaa\nbbbb\ncccc\n";
        let chunks = split_message(text, 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb\n".to_string(), "cccc\n".to_string()]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_overlong_line() {
        let text = "я".repeat(25);
        let chunks = split_message(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_html_keeps_tags_balanced() {
        let text = format!("<b>Графік\n{}</b>", "з 10:00 до 12:00\n".repeat(10));
        let chunks = split_html(&text, 100);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100);
            assert!(chunk.starts_with("<b>"), "{chunk}");
            assert!(chunk.ends_with("</b>"), "{chunk}");
            assert_eq!(chunk.matches("<b>").count(), chunk.matches("</b>").count());
        }
        assert_eq!(
            chunks.iter().map(|c| c.matches("з 10:00").count()).sum::<usize>(),
            10
        );
    }

    #[test]
    fn test_tag_name_ignores_attributes() {
        assert_eq!(tag_name("<a href=\"https://t.me\">"), "a");
        assert_eq!(tag_name("<b>"), "b");
    }
}
