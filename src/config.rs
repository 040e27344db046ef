// Application configuration, loaded from environment variables.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::clan_logs::{DEFAULT_CLAN_LOG_URL, DEFAULT_INTERVAL, RECENT_CLAN_LOG_URL};
use crate::outbox::{CelebrationStyle, DEFAULT_DONATION_THRESHOLD};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Application configuration.
#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub application_id: u64,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Where the boss quest polls are posted.
    pub boss_channel: String,
    pub boss_summary_channel: String,
    /// Default destination for relayed clan log lines.
    pub clan_message_channel: String,
    pub donation_channel: String,
    pub general_channel: String,
    pub clan_log_url: String,
    pub clan_log_interval: Duration,
    /// Short clan log endpoint polled every minute alongside the main one.
    pub recent_clan_log_url: String,
    pub donation_threshold: u64,
    pub celebration_style: CelebrationStyle,
    /// When set, `/health` and `/metrics` are served on this port.
    pub health_port: Option<u16>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"<redacted>")
            .field("application_id", &self.application_id)
            .field("db_path", &self.db_path)
            .field("boss_channel", &self.boss_channel)
            .field("boss_summary_channel", &self.boss_summary_channel)
            .field("clan_message_channel", &self.clan_message_channel)
            .field("donation_channel", &self.donation_channel)
            .field("general_channel", &self.general_channel)
            .field("clan_log_url", &self.clan_log_url)
            .field("clan_log_interval", &self.clan_log_interval)
            .field("recent_clan_log_url", &self.recent_clan_log_url)
            .field("donation_threshold", &self.donation_threshold)
            .field("celebration_style", &self.celebration_style)
            .field("health_port", &self.health_port)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables (empty counts as unset):
    /// - `DISCORD_BOT_TOKEN` - bot token (required)
    /// - `DISCORD_APP_ID` - application id (required)
    /// - `DB_PATH` - SQLite file (default: `/app/data/lilhelper.db`)
    /// - `BOSS_CHANNEL` - quest poll channel (default: `boss`)
    /// - `BOSS_SUMMARY_CHANNEL` - summary channel (default: `tactical-dispatch`)
    /// - `CLAN_MESSAGE_CHANNEL` - default relay channel (default: `testing-ground`)
    /// - `DONATION_CHANNEL` - gold donation channel (default: `corporate-oversight`)
    /// - `GENERAL_CHANNEL` - celebrations (default: `general`)
    /// - `CLAN_LOG_URL` - clan log endpoint (default: the 500-entry KlutzCo log)
    /// - `CLAN_LOG_INTERVAL` - e.g. `30s`, `5m`, `1h30m` (default: `24h`)
    /// - `CLAN_LOG_RECENT_URL` - endpoint polled every minute (default: the 10-entry log)
    /// - `DONATION_THRESHOLD` - gold amount worth celebrating (default: 1000000)
    /// - `CELEBRATION_STYLE` - `text` or `embed` (default: `text`)
    /// - `HEALTH_PORT` - serve `/health` and `/metrics` when set
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. An unset optional takes its default;
    /// one that is set but fails to parse is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let or = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let discord_token = get("DISCORD_BOT_TOKEN").ok_or(ConfigError::Missing("DISCORD_BOT_TOKEN"))?;
        let app_id = get("DISCORD_APP_ID").ok_or(ConfigError::Missing("DISCORD_APP_ID"))?;
        let application_id = app_id
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .ok_or_else(|| ConfigError::Invalid {
                name: "DISCORD_APP_ID",
                value: app_id.clone(),
            })?;

        let clan_log_interval = parse_optional(
            "CLAN_LOG_INTERVAL",
            get("CLAN_LOG_INTERVAL"),
            |v| parse_duration(v).filter(|d| !d.is_zero()),
        )?
        .unwrap_or(DEFAULT_INTERVAL);
        let donation_threshold = parse_optional("DONATION_THRESHOLD", get("DONATION_THRESHOLD"), |v| {
            v.trim().parse::<u64>().ok()
        })?
        .unwrap_or(DEFAULT_DONATION_THRESHOLD);
        let celebration_style =
            parse_optional("CELEBRATION_STYLE", get("CELEBRATION_STYLE"), |v| v.parse::<CelebrationStyle>().ok())?
                .unwrap_or_default();
        let health_port =
            parse_optional("HEALTH_PORT", get("HEALTH_PORT"), |v| v.trim().parse::<u16>().ok())?;

        Ok(Config {
            discord_token,
            application_id,
            db_path: PathBuf::from(or("DB_PATH", "/app/data/lilhelper.db")),
            boss_channel: or("BOSS_CHANNEL", "boss"),
            boss_summary_channel: or("BOSS_SUMMARY_CHANNEL", "tactical-dispatch"),
            clan_message_channel: or("CLAN_MESSAGE_CHANNEL", crate::db::DEFAULT_CHANNEL_NAME),
            donation_channel: or("DONATION_CHANNEL", "corporate-oversight"),
            general_channel: or("GENERAL_CHANNEL", "general"),
            clan_log_url: or("CLAN_LOG_URL", DEFAULT_CLAN_LOG_URL),
            clan_log_interval,
            recent_clan_log_url: or("CLAN_LOG_RECENT_URL", RECENT_CLAN_LOG_URL),
            donation_threshold,
            celebration_style,
            health_port,
        })
    }
}

fn parse_optional<T>(
    name: &'static str,
    raw: Option<String>,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match parse(&raw) {
        Some(value) => Ok(Some(value)),
        None => Err(ConfigError::Invalid { name, value: raw }),
    }
}

/// Parse durations like `90s`, `5m`, `24h` or `1h30m`. Units: `ms`, `s`, `m`, `h`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let value: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60)?),
            "h" => Duration::from_secs(value.checked_mul(3600)?),
            _ => return None,
        };
        total = total.checked_add(part)?;
        rest = &rest[unit_len..];
    }
    Some(total)
}
