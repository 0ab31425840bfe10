//! Process settings read from the environment.
//!
//! `main` loads a `.env` file through `dotenvy` before calling
//! [`Settings::from_env`]. A source whose required variables are missing is
//! left unconfigured.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use outage_sources::{dtek, kyiv_digital, yasno};

use crate::{Error, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:outage.db?mode=rwc";
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Kyiv;

const DEFAULT_KD_POLL_SECS: u64 = 5 * 60;
const DEFAULT_DTEK_POLL_SECS: u64 = 5 * 60;
const DEFAULT_YASNO_POLL_SECS: u64 = 2 * 60;
const DEFAULT_CONFIG_REFRESH_SECS: u64 = 60;
const DEFAULT_DTEK_GROUP: &str = "GPV4.1";

#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub owner_chat_id: i64,
    pub group_chat_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct KyivDigitalSettings {
    pub api_base: String,
    pub object_id: String,
    pub access_token: String,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct DtekSettings {
    pub page_url: String,
    pub group: String,
    pub poll_interval: Duration,
    pub restart_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct YasnoSettings {
    pub api_base: String,
    pub region_id: u32,
    pub dso_id: u32,
    pub street: String,
    pub building: String,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub timezone: Tz,
    pub log_dir: Option<String>,
    pub config_refresh_interval: Duration,
    pub telegram: Option<TelegramSettings>,
    pub kyiv_digital: Option<KyivDigitalSettings>,
    pub dtek: Option<DtekSettings>,
    pub yasno: Option<YasnoSettings>,
}

/// Non-empty value of `key`.
fn var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(key: &str) -> Result<Option<T>> {
    match var(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("{key} has an invalid value: {raw}"))),
        None => Ok(None),
    }
}

fn secs_var(key: &str, default_secs: u64) -> Result<Duration> {
    Ok(Duration::from_secs(
        parse_var::<u64>(key)?.unwrap_or(default_secs),
    ))
}

fn parse_chat_ids(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| Error::config(format!("invalid chat id: {s}")))
        })
        .collect()
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let timezone = match var("TIMEZONE") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| Error::config(format!("unknown timezone: {name}")))?,
            None => DEFAULT_TIMEZONE,
        };

        let telegram = match (var("TELEGRAM_BOT_TOKEN"), parse_var::<i64>("TELEGRAM_OWNER_CHAT_ID")?) {
            (Some(bot_token), Some(owner_chat_id)) => Some(TelegramSettings {
                bot_token,
                owner_chat_id,
                group_chat_ids: var("TELEGRAM_GROUP_CHAT_IDS")
                    .map(|raw| parse_chat_ids(&raw))
                    .transpose()?
                    .unwrap_or_default(),
            }),
            _ => None,
        };

        let kyiv_digital = match (var("KD_OBJECT_ID"), var("KD_TOKEN")) {
            (Some(object_id), Some(access_token)) => Some(KyivDigitalSettings {
                api_base: var("KD_API_BASE")
                    .unwrap_or_else(|| kyiv_digital::DEFAULT_API_BASE.to_string()),
                object_id,
                access_token,
                poll_interval: secs_var("KD_POLL_INTERVAL_SECS", DEFAULT_KD_POLL_SECS)?,
            }),
            _ => None,
        };

        let dtek = Some(DtekSettings {
            page_url: var("DTEK_PAGE_URL").unwrap_or_else(|| dtek::DEFAULT_PAGE_URL.to_string()),
            group: var("DTEK_GROUP").unwrap_or_else(|| DEFAULT_DTEK_GROUP.to_string()),
            poll_interval: secs_var("DTEK_POLL_INTERVAL_SECS", DEFAULT_DTEK_POLL_SECS)?,
            restart_interval: secs_var(
                "DTEK_RESTART_INTERVAL_SECS",
                dtek::DEFAULT_RESTART_INTERVAL.as_secs(),
            )?,
        })
        .filter(|_| var("DTEK_DISABLED").is_none());

        let yasno = match (var("YASNO_STREET"), var("YASNO_BUILDING")) {
            (Some(street), Some(building)) => Some(YasnoSettings {
                api_base: var("YASNO_API_BASE")
                    .unwrap_or_else(|| yasno::DEFAULT_API_BASE.to_string()),
                region_id: parse_var("YASNO_REGION_ID")?.unwrap_or(yasno::DEFAULT_REGION_ID),
                dso_id: parse_var("YASNO_DSO_ID")?.unwrap_or(yasno::DEFAULT_DSO_ID),
                street,
                building,
                poll_interval: secs_var("YASNO_POLL_INTERVAL_SECS", DEFAULT_YASNO_POLL_SECS)?,
            }),
            _ => None,
        };

        Ok(Self {
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            timezone,
            log_dir: var("LOG_DIR"),
            config_refresh_interval: secs_var("CONFIG_REFRESH_SECS", DEFAULT_CONFIG_REFRESH_SECS)?,
            telegram,
            kyiv_digital,
            dtek,
            yasno,
        })
    }

    pub fn kyiv_digital_config(&self) -> Option<kyiv_digital::KyivDigitalConfig> {
        self.kyiv_digital
            .as_ref()
            .map(|kd| kyiv_digital::KyivDigitalConfig {
                api_base: kd.api_base.clone(),
                object_id: kd.object_id.clone(),
                access_token: kd.access_token.clone(),
                timezone: self.timezone,
            })
    }

    pub fn dtek_config(&self) -> Option<dtek::DtekConfig> {
        self.dtek.as_ref().map(|d| dtek::DtekConfig {
            page_url: d.page_url.clone(),
            group: d.group.clone(),
            timezone: self.timezone,
        })
    }

    pub fn yasno_config(&self) -> Option<yasno::YasnoConfig> {
        self.yasno.as_ref().map(|y| yasno::YasnoConfig {
            api_base: y.api_base.clone(),
            region_id: y.region_id,
            dso_id: y.dso_id,
            street: y.street.clone(),
            building: y.building.clone(),
            timezone: self.timezone,
        })
    }
}
