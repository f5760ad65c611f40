//! Sleep between poll cycles, and shutdown signalling.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Delay between the end of one cycle and the start of the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSchedule {
    pub interval_secs: u64,
    /// Upper bound of a uniform random extra delay.
    pub jitter_secs: u64,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            jitter_secs: 0,
        }
    }
}

impl PollSchedule {
    pub fn new(interval_secs: u64, jitter_secs: u64) -> Self {
        Self {
            interval_secs,
            jitter_secs,
        }
    }

    /// Interval plus a uniform draw from `[0, jitter]`.
    pub fn next_delay(&self) -> Duration {
        let base = Duration::from_secs(self.interval_secs);
        if self.jitter_secs == 0 {
            return base;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=self.jitter_secs * 1000);
        base + Duration::from_millis(jitter_ms)
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Create a linked trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

/// Requests shutdown of every linked [`ShutdownSignal`].
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes a shutdown request.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested.
    ///
    /// Never resolves if the trigger is dropped without firing.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
