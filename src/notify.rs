//! Sign-in notifications and their delivery worker.
//!
//! Login hands a `Notification` to a `NotificationQueue`, a bounded in-process
//! channel. `submit` never waits: when the queue is full or the worker has
//! stopped, the message is logged and dropped. The request never observes
//! delivery.
//!
//! A single background task drains the channel and hands each message to a
//! `NotificationSender`. Failed sends are retried with exponential backoff and
//! jitter until `max_attempts` is reached, then logged as failed.
//!
//! The default sender is `LogNotificationSender`, which logs and returns `Ok(())`.
use anyhow::Result;
use rand::Rng;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, error, info, warn};

pub const SIGN_IN_TEMPLATE: &str = "sign_in";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

impl Notification {
    /// Message sent to a principal after a successful login.
    #[must_use]
    pub fn sign_in(to_email: &str, name: &str, client_name: &str) -> Self {
        Self {
            to_email: to_email.to_string(),
            template: SIGN_IN_TEMPLATE.to_string(),
            payload_json: json!({ "name": name, "client": client_name }).to_string(),
        }
    }
}

/// Delivery abstraction used by the notification worker.
pub trait NotificationSender: Send + Sync {
    /// Deliver a message or return an error to have it retried.
    fn send(&self, message: &Notification) -> Result<()>;
}

/// Sender that logs the payload instead of delivering it.
#[derive(Clone, Debug)]
pub struct LogNotificationSender;

impl NotificationSender for LogNotificationSender {
    fn send(&self, message: &Notification) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "notification send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct NotificationWorkerConfig {
    queue_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl NotificationWorkerConfig {
    /// Default worker config: 1024 queued messages, 5 max attempts, and
    /// 1s->60s exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue_size: 1024,
            max_attempts: 5,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        let queue_size = self.queue_size.max(1);
        let max_attempts = self.max_attempts.max(1);
        let backoff_base = if self.backoff_base.is_zero() {
            Duration::from_secs(1)
        } else {
            self.backoff_base
        };
        let backoff_max = self.backoff_max.max(backoff_base);
        Self {
            queue_size,
            max_attempts,
            backoff_base,
            backoff_max,
        }
    }

    #[must_use]
    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }
}

impl Default for NotificationWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer side of the notification channel.
#[derive(Clone, Debug)]
pub struct NotificationQueue {
    tx: mpsc::Sender<Notification>,
}

impl NotificationQueue {
    /// Enqueue without waiting. Returns `false` when the message was dropped.
    pub fn submit(&self, message: Notification) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!(
                    to_email = %message.to_email,
                    template = %message.template,
                    "notification queue full, dropping message"
                );
                false
            }
            Err(TrySendError::Closed(message)) => {
                warn!(
                    to_email = %message.to_email,
                    template = %message.template,
                    "notification worker stopped, dropping message"
                );
                false
            }
        }
    }
}

/// Spawn the delivery worker. It runs until every `NotificationQueue` clone is dropped.
pub fn spawn_notification_worker(
    sender: Arc<dyn NotificationSender>,
    config: NotificationWorkerConfig,
) -> (NotificationQueue, JoinHandle<()>) {
    let config = config.normalize();
    let (tx, mut rx) = mpsc::channel(config.queue_size());

    let handle = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            deliver(sender.as_ref(), &message, &config).await;
        }
        debug!("notification queue closed, worker exiting");
    });

    (NotificationQueue { tx }, handle)
}

async fn deliver(
    sender: &dyn NotificationSender,
    message: &Notification,
    config: &NotificationWorkerConfig,
) {
    let mut attempt = 0u32;
    loop {
        attempt = attempt.saturating_add(1);
        let Err(err) = sender.send(message) else {
            return;
        };

        if attempt >= config.max_attempts() {
            error!(
                to_email = %message.to_email,
                template = %message.template,
                attempts = attempt,
                "notification delivery failed: {err:#}"
            );
            return;
        }

        let delay = backoff_delay(attempt, config.backoff_base(), config.backoff_max());
        warn!(
            to_email = %message.to_email,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "notification delivery failed, retrying: {err:#}"
        );
        sleep(delay).await;
    }
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    jitter_delay(delay.min(max))
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FlakySender {
        failures_left: Mutex<u32>,
        attempts: Mutex<u32>,
        delivered: Mutex<Vec<Notification>>,
    }

    impl FlakySender {
        fn failing(times: u32) -> Self {
            Self {
                failures_left: Mutex::new(times),
                ..Self::default()
            }
        }
    }

    impl NotificationSender for FlakySender {
        fn send(&self, message: &Notification) -> Result<()> {
            *self.attempts.lock().unwrap() += 1;
            let mut failures_left = self.failures_left.lock().unwrap();
            if *failures_left > 0 {
                *failures_left -= 1;
                bail!("smtp unavailable");
            }
            self.delivered.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn message() -> Notification {
        Notification::sign_in("a@x.com", "Ada", "web-admin")
    }

    #[test]
    fn config_normalize_clamps_values() {
        let config = NotificationWorkerConfig::new()
            .with_queue_size(0)
            .with_max_attempts(0)
            .with_backoff_base_seconds(0)
            .with_backoff_max_seconds(0)
            .normalize();
        assert_eq!(config.queue_size(), 1);
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.backoff_base(), Duration::from_secs(1));
        assert_eq!(config.backoff_max(), Duration::from_secs(1));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(10);
        let first = backoff_delay(1, base, max);
        assert!(first >= Duration::from_millis(500) && first <= base);
        let capped = backoff_delay(20, base, max);
        assert!(capped >= Duration::from_secs(5) && capped <= max);
    }

    #[test]
    fn sign_in_payload_is_json() -> Result<()> {
        let message = message();
        assert_eq!(message.template, SIGN_IN_TEMPLATE);
        let payload: serde_json::Value = serde_json::from_str(&message.payload_json)?;
        assert_eq!(payload["name"], "Ada");
        assert_eq!(payload["client"], "web-admin");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn worker_retries_until_delivered() -> Result<()> {
        let sender = Arc::new(FlakySender::failing(2));
        let (queue, handle) = spawn_notification_worker(
            sender.clone(),
            NotificationWorkerConfig::new().with_max_attempts(5),
        );
        assert!(queue.submit(message()));
        drop(queue);
        handle.await?;

        assert_eq!(*sender.attempts.lock().unwrap(), 3);
        assert_eq!(sender.delivered.lock().unwrap().as_slice(), &[message()]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn worker_gives_up_after_max_attempts() -> Result<()> {
        let sender = Arc::new(FlakySender::failing(u32::MAX));
        let (queue, handle) = spawn_notification_worker(
            sender.clone(),
            NotificationWorkerConfig::new().with_max_attempts(3),
        );
        assert!(queue.submit(message()));
        drop(queue);
        handle.await?;

        assert_eq!(*sender.attempts.lock().unwrap(), 3);
        assert!(sender.delivered.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn submit_drops_when_worker_is_gone() {
        let (queue, handle) = spawn_notification_worker(
            Arc::new(LogNotificationSender),
            NotificationWorkerConfig::new(),
        );
        handle.abort();
        let _ = handle.await;
        assert!(!queue.submit(message()));
    }
}
