//! HTTP client for the Bot API update stream.
//!
//! Bootstrap once, then poll (manually or through the daemon); polled updates are decoded and
//! queued, and drained by [`UpdateSource`] consumers such as `telebot_wait::wait_for`.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use telebot_core::{
    ApiError, Content, Result, TelebotError, Update, UpdateQueue, UpdateSource,
};
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};

use crate::config::TelegramConfig;
use crate::daemon::PollDaemon;

/// Length of a valid bot token.
pub const TOKEN_LENGTH: usize = 46;

#[derive(Deserialize)]
struct Envelope {
    ok: bool,
    result: Option<Value>,
    description: Option<String>,
    error_code: Option<i64>,
}

pub struct TelegramClient {
    http: reqwest::Client,
    token: String,
    api_url: String,
    safe_mode: bool,
    bootstrapped: AtomicBool,
    /// Offset sent with the next `getUpdates`.
    last_update: AtomicI64,
    queue: UpdateQueue<Update>,
    poll_interval_ms: Arc<AtomicU64>,
    daemon: Mutex<Option<PollDaemon>>,
}

impl TelegramClient {
    /// Validates the token and builds the HTTP client. No request is made.
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        if config.bot_token.len() != TOKEN_LENGTH {
            return Err(TelebotError::InvalidToken(config.bot_token.len()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TelebotError::Http(e.to_string()))?;

        Ok(Self {
            http,
            token: config.bot_token.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            safe_mode: config.safe_mode,
            bootstrapped: AtomicBool::new(false),
            last_update: AtomicI64::new(0),
            queue: UpdateQueue::new(),
            poll_interval_ms: Arc::new(AtomicU64::new(duration_ms(config.poll_interval))),
            daemon: Mutex::new(None),
        })
    }

    /// Calls an API method and returns the `result` of the envelope.
    ///
    /// `ok: false` becomes [`TelebotError::Api`]. Transport errors are reported without the URL,
    /// which carries the token.
    #[instrument(skip(self, params))]
    pub async fn query(&self, method: &str, params: &Value) -> Result<Value> {
        let url = format!("{}/bot{}/{}", self.api_url, self.token, method);
        let response = self
            .http
            .post(&url)
            .json(params)
            .send()
            .await
            .map_err(|e| TelebotError::Http(e.without_url().to_string()))?;
        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| TelebotError::Http(e.without_url().to_string()))?;

        if !envelope.ok {
            let err = ApiError::new(
                method,
                envelope.error_code,
                envelope.description.unwrap_or_default(),
            );
            warn!(error = %err, "API responded not ok");
            return Err(err.into());
        }
        Ok(envelope.result.unwrap_or(Value::Null))
    }

    /// Raw `getUpdates` starting at the current offset.
    pub async fn get_updates(&self) -> Result<Vec<Value>> {
        let offset = self.last_update.load(Ordering::SeqCst);
        let result = self.query("getUpdates", &json!({ "offset": offset })).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// First `getUpdates`: positions the offset on the oldest pending update and enables polling.
    pub async fn bootstrap(&self) -> Result<()> {
        let updates = self.get_updates().await?;
        if let Some(first) = updates.first().and_then(update_id) {
            self.last_update.store(first, Ordering::SeqCst);
        }
        self.bootstrapped.store(true, Ordering::SeqCst);
        info!(pending = updates.len(), "client bootstrapped");
        Ok(())
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::SeqCst)
    }

    fn ensure_bootstrapped(&self) -> Result<()> {
        if self.is_bootstrapped() {
            Ok(())
        } else {
            Err(TelebotError::NotBootstrapped)
        }
    }

    /// Fetches new updates, queues the decoded ones and advances the offset. Returns how many were
    /// queued.
    ///
    /// In safe mode undecodable updates are skipped. Otherwise the first one stops the poll with
    /// its error; the updates before it are queued and the offset moves past it.
    pub async fn poll(&self) -> Result<usize> {
        self.ensure_bootstrapped()?;
        let values = self.get_updates().await?;

        let mut decoded = Vec::with_capacity(values.len());
        let mut next_offset = None;
        let mut failure = None;
        for value in values {
            let id = update_id(&value);
            if let Some(id) = id {
                next_offset = Some(id + 1);
            }
            match Update::from_value(value) {
                Ok(update) => decoded.push(update),
                Err(e) if self.safe_mode => {
                    warn!(update_id = ?id, error = %e, "skipping undecodable update");
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let queued = decoded.len();
        if queued > 0 {
            debug!(count = queued, "updates queued");
        }
        self.queue.extend(decoded);
        if let Some(offset) = next_offset {
            self.last_update.store(offset, Ordering::SeqCst);
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(queued),
        }
    }

    /// True if updates arrived since the last call.
    pub fn news(&self) -> Result<bool> {
        self.ensure_bootstrapped()?;
        Ok(self.queue.take_news())
    }

    pub fn has_updates(&self) -> Result<bool> {
        self.ensure_bootstrapped()?;
        Ok(!self.queue.is_empty())
    }

    /// Drains every queued update.
    pub fn take_updates(&self) -> Result<Vec<Update>> {
        self.ensure_bootstrapped()?;
        Ok(self.queue.drain())
    }

    /// Drains the queued updates sent by `user_id`, leaving the others queued.
    pub fn take_updates_from(&self, user_id: i64) -> Result<Vec<Update>> {
        self.ensure_bootstrapped()?;
        Ok(self
            .queue
            .drain_where(|u| u.content.sender().is_ok_and(|user| user.id == user_id)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.load(Ordering::SeqCst))
    }

    fn daemon_slot(&self) -> MutexGuard<'_, Option<PollDaemon>> {
        self.daemon.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts polling in the background. No-op if a daemon is already running.
    ///
    /// The task runs on the current Tokio runtime; called outside one this fails with
    /// [`TelebotError::Runtime`].
    pub fn start_daemon(self: &Arc<Self>) -> Result<()> {
        let runtime =
            Handle::try_current().map_err(|e| TelebotError::Runtime(e.to_string()))?;
        self.ensure_bootstrapped()?;
        let mut slot = self.daemon_slot();
        if slot.as_ref().is_some_and(PollDaemon::is_running) {
            return Ok(());
        }
        *slot = Some(PollDaemon::spawn(
            &runtime,
            Arc::downgrade(self),
            Arc::clone(&self.poll_interval_ms),
        ));
        Ok(())
    }

    /// Stops the background polling, if any, and waits for it to end.
    pub async fn stop_daemon(&self) {
        let daemon = self.daemon_slot().take();
        if let Some(daemon) = daemon {
            daemon.stop().await;
        }
    }

    pub async fn restart_daemon(self: &Arc<Self>) -> Result<()> {
        self.ensure_bootstrapped()?;
        self.stop_daemon().await;
        self.start_daemon()
    }

    pub fn daemon_running(&self) -> bool {
        self.daemon_slot().as_ref().is_some_and(PollDaemon::is_running)
    }
}

impl UpdateSource for TelegramClient {
    type Event = Content;

    fn next_pending(&self) -> Option<Content> {
        self.queue.next().map(|update| update.content)
    }

    fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Takes effect from the daemon's next sleep.
    fn set_poll_interval(&self, interval: Duration) {
        self.poll_interval_ms
            .store(duration_ms(interval), Ordering::SeqCst);
    }
}

impl fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramClient")
            .field("token", &mask_token(&self.token))
            .field("api_url", &self.api_url)
            .field("bootstrapped", &self.is_bootstrapped())
            .field("last_update", &self.last_update.load(Ordering::SeqCst))
            .field("queued", &self.queue.len())
            .finish()
    }
}

fn update_id(value: &Value) -> Option<i64> {
    value.get("update_id").and_then(Value::as_i64)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Keeps the bot id part before `:` and the last 4 characters.
fn mask_token(token: &str) -> String {
    let prefix = token.split(':').next().unwrap_or_default();
    let suffix: String = token
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{}:***{}", prefix, suffix)
}
