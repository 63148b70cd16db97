//! Background polling task.
//!
//! Holds only a weak reference to the client: once the client is dropped the task ends at its
//! next tick.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::client::TelegramClient;

pub(crate) struct PollDaemon {
    active: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl PollDaemon {
    /// Spawns the loop: poll, then sleep for the current interval, while active.
    pub(crate) fn spawn(
        runtime: &Handle,
        client: Weak<TelegramClient>,
        interval_ms: Arc<AtomicU64>,
    ) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let running = Arc::clone(&active);

        let handle = runtime.spawn(async move {
            info!("poll daemon started");
            while running.load(Ordering::SeqCst) {
                let Some(client) = client.upgrade() else {
                    debug!("client dropped, poll daemon exiting");
                    break;
                };
                if let Err(e) = client.poll().await {
                    error!(error = %e, "poll failed");
                }
                drop(client);

                let delay = Duration::from_millis(interval_ms.load(Ordering::SeqCst));
                tokio::time::sleep(delay).await;
            }
            info!("poll daemon stopped");
        });

        Self { active, handle }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Deactivates the loop and cancels it at its current await point.
    ///
    /// Cancelling cannot lose updates: a poll queues its updates and moves the offset after its
    /// last await.
    pub(crate) async fn stop(self) {
        self.active.store(false, Ordering::SeqCst);
        self.handle.abort();
        match self.handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => debug!("poll daemon cancelled"),
            Err(e) => error!(error = %e, "poll daemon panicked"),
        }
    }
}
