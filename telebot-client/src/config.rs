//! Client configuration, loaded from BOT_TOKEN, TELEGRAM_API_URL, LOG_FILE, POLL_INTERVAL_MS,
//! REQUEST_TIMEOUT_SECS and SAFE_MODE.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Telegram connection, polling and logging settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_url: String,
    pub log_file: Option<String>,
    /// Delay between two polls of the daemon.
    pub poll_interval: Duration,
    /// Timeout of a single HTTP request.
    pub request_timeout: Duration,
    /// Skip updates that cannot be decoded instead of failing the poll.
    pub safe_mode: bool,
}

impl TelegramConfig {
    /// Loads from environment. BOT_TOKEN is required unless `token` overrides it.
    pub fn from_env(token: Option<String>) -> Result<Self> {
        let bot_token = match token {
            Some(token) => token,
            None => env::var("BOT_TOKEN").map_err(|_| anyhow::anyhow!("BOT_TOKEN not set"))?,
        };
        let mut config = Self::with_token(bot_token);

        if let Ok(url) = env::var("TELEGRAM_API_URL") {
            config.api_url = url;
        }
        config.log_file = env::var("LOG_FILE").ok();
        if let Ok(ms) = env::var("POLL_INTERVAL_MS") {
            let ms: u64 = ms.parse().context("POLL_INTERVAL_MS must be milliseconds")?;
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Ok(secs) = env::var("REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().context("REQUEST_TIMEOUT_SECS must be seconds")?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Ok(flag) = env::var("SAFE_MODE") {
            config.safe_mode = parse_flag(&flag).context("SAFE_MODE must be true or false")?;
        }
        Ok(config)
    }

    /// Defaults for everything but the token.
    pub fn with_token(bot_token: String) -> Self {
        Self {
            bot_token,
            api_url: DEFAULT_API_URL.to_string(),
            log_file: None,
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
            safe_mode: false,
        }
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("unrecognized flag value: {}", other),
    }
}
