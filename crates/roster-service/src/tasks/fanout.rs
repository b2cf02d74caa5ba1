//! Timeline fan-out worker.
//!
//! Persisted timeline batches are handed to this worker over a bounded mpsc
//! queue and delivered to two independent best-effort channels: a realtime
//! broadcast (Redis publish on a session-scoped channel) and an external
//! webhook. Delivery failures are logged and counted, never propagated — a
//! committed roster or meta upsert is never undone by a failed broadcast.
//!
//! # Graceful Shutdown
//!
//! The worker exits when the cancellation token fires or every handle is
//! dropped. In-flight deliveries run under their own timeouts; a timed-out
//! delivery is abandoned and logged.

use crate::config::Config;
use crate::models::StoredTimelineEvent;
use crate::observability::metrics;
use common::secret::{ExposeSecret, SecretString};
use redis::AsyncCommands;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Depth of the fan-out queue; full-queue dispatches drop the batch.
pub const FANOUT_QUEUE_DEPTH: usize = 256;

/// One batch of events bound for the fan-out channels.
#[derive(Debug, Clone)]
pub struct FanoutJob {
    pub session_id: Uuid,
    pub events: Vec<StoredTimelineEvent>,
}

/// Sending side of the fan-out queue.
#[derive(Clone)]
pub struct FanoutHandle {
    tx: mpsc::Sender<FanoutJob>,
}

impl FanoutHandle {
    /// Create a queue of the given depth; the receiver goes to the worker.
    pub fn channel(depth: usize) -> (Self, mpsc::Receiver<FanoutJob>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (Self { tx }, rx)
    }

    /// Non-blocking dispatch; a full or closed queue drops the batch with a
    /// warning. The HTTP caller is never held up by fan-out backpressure.
    pub fn dispatch(&self, job: FanoutJob) {
        if let Err(e) = self.tx.try_send(job) {
            metrics::record_fanout_dropped();
            warn!(
                target: "roster.tasks.fanout",
                error = %e,
                "Fan-out queue rejected batch; dropping"
            );
        }
    }
}

/// Fan-out worker configuration, derived from service config.
#[derive(Clone)]
pub struct FanoutConfig {
    pub realtime_url: Option<String>,
    pub channel_prefix: String,
    pub webhook_url: Option<String>,
    pub webhook_auth_header: Option<SecretString>,
    pub timeout: Duration,
}

impl FanoutConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            realtime_url: config.realtime_url.clone(),
            channel_prefix: config.realtime_channel_prefix.clone(),
            webhook_url: config.timeline_webhook_url.clone(),
            webhook_auth_header: config.timeline_webhook_auth_header.clone(),
            timeout: Duration::from_secs(config.fanout_timeout_seconds),
        }
    }
}

/// Webhook body: the batch plus its session scope.
#[derive(Serialize)]
struct WebhookPayload<'a> {
    session_id: Uuid,
    events: &'a [StoredTimelineEvent],
}

/// Run the fan-out worker loop.
///
/// Exits when the cancellation token fires or all senders are dropped.
pub async fn run_fanout_worker(
    config: FanoutConfig,
    mut rx: mpsc::Receiver<FanoutJob>,
    cancel_token: CancellationToken,
) {
    let webhook_client = build_webhook_client(&config);

    loop {
        tokio::select! {
            maybe_job = rx.recv() => {
                match maybe_job {
                    Some(job) => deliver(&config, webhook_client.as_ref(), &job).await,
                    None => {
                        info!(target: "roster.tasks.fanout", "Fan-out queue closed, exiting");
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!(target: "roster.tasks.fanout", "Fan-out worker received shutdown signal, exiting");
                break;
            }
        }
    }
}

fn build_webhook_client(config: &FanoutConfig) -> Option<reqwest::Client> {
    config.webhook_url.as_ref()?;

    match reqwest::Client::builder()
        .timeout(config.timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(
                target: "roster.tasks.fanout",
                error = %e,
                "Failed to build webhook client; webhook fan-out disabled"
            );
            None
        }
    }
}

/// Deliver one batch to both channels; each path is independent.
async fn deliver(config: &FanoutConfig, webhook_client: Option<&reqwest::Client>, job: &FanoutJob) {
    tokio::join!(
        deliver_realtime(config, job),
        deliver_webhook(config, webhook_client, job),
    );
}

/// Realtime path: open a channel scoped to the session, publish the batch,
/// and drop the connection even on failure.
async fn deliver_realtime(config: &FanoutConfig, job: &FanoutJob) {
    let Some(url) = &config.realtime_url else {
        return;
    };

    let start = Instant::now();
    match tokio::time::timeout(config.timeout, broadcast_realtime(url, config, job)).await {
        Ok(Ok(())) => {
            metrics::record_fanout("realtime", "success", start.elapsed());
        }
        Ok(Err(e)) => {
            metrics::record_fanout("realtime", "error", start.elapsed());
            warn!(
                target: "roster.tasks.fanout",
                session_id = %job.session_id,
                error = %e,
                "Realtime broadcast failed"
            );
        }
        Err(_) => {
            metrics::record_fanout("realtime", "timeout", start.elapsed());
            warn!(
                target: "roster.tasks.fanout",
                session_id = %job.session_id,
                timeout_seconds = config.timeout.as_secs(),
                "Realtime broadcast timed out; abandoning"
            );
        }
    }
}

async fn broadcast_realtime(url: &str, config: &FanoutConfig, job: &FanoutJob) -> Result<(), String> {
    let client = redis::Client::open(url).map_err(|e| e.to_string())?;
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| e.to_string())?;

    let channel = format!("{}:{}", config.channel_prefix, job.session_id);
    let payload = serde_json::to_string(&job.events).map_err(|e| e.to_string())?;

    conn.publish::<_, _, ()>(&channel, payload)
        .await
        .map_err(|e| e.to_string())?;

    Ok(())
    // conn drops here: the channel is torn down whether or not the publish
    // succeeded.
}

/// Webhook path: POST the batch with the configured auth header. The client
/// carries the bounded timeout.
async fn deliver_webhook(
    config: &FanoutConfig,
    webhook_client: Option<&reqwest::Client>,
    job: &FanoutJob,
) {
    let Some(url) = &config.webhook_url else {
        return;
    };
    let Some(client) = webhook_client else {
        return;
    };

    let start = Instant::now();

    let mut request = client.post(url).json(&WebhookPayload {
        session_id: job.session_id,
        events: &job.events,
    });

    if let Some(header) = &config.webhook_auth_header {
        request = request.header(reqwest::header::AUTHORIZATION, header.expose_secret());
    }

    match request.send().await {
        Ok(response) if response.status().is_success() => {
            metrics::record_fanout("webhook", "success", start.elapsed());
        }
        Ok(response) => {
            metrics::record_fanout("webhook", "error", start.elapsed());
            warn!(
                target: "roster.tasks.fanout",
                session_id = %job.session_id,
                status = %response.status(),
                "Timeline webhook rejected batch"
            );
        }
        Err(e) if e.is_timeout() => {
            metrics::record_fanout("webhook", "timeout", start.elapsed());
            warn!(
                target: "roster.tasks.fanout",
                session_id = %job.session_id,
                "Timeline webhook timed out; abandoning"
            );
        }
        Err(e) => {
            metrics::record_fanout("webhook", "error", start.elapsed());
            warn!(
                target: "roster.tasks.fanout",
                session_id = %job.session_id,
                error = %e,
                "Timeline webhook delivery failed"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event() -> StoredTimelineEvent {
        StoredTimelineEvent {
            event_id: "abc123".to_string(),
            event_type: "standin_backfill".to_string(),
            owner_id: None,
            turn: 3,
            occurred_at: Utc::now(),
            reason: None,
            context: None,
            metadata: serde_json::json!({}),
        }
    }

    fn job() -> FanoutJob {
        FanoutJob {
            session_id: Uuid::new_v4(),
            events: vec![event()],
        }
    }

    fn bare_config() -> FanoutConfig {
        FanoutConfig {
            realtime_url: None,
            channel_prefix: "session-timeline".to_string(),
            webhook_url: None,
            webhook_auth_header: None,
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_dispatch_enqueues_job() {
        let (handle, mut rx) = FanoutHandle::channel(4);
        handle.dispatch(job());

        let received = rx.recv().await.unwrap();
        assert_eq!(received.events.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_full_queue_drops_without_blocking() {
        let (handle, _rx) = FanoutHandle::channel(1);
        handle.dispatch(job());
        // Queue is full; this must return immediately and not panic.
        handle.dispatch(job());
    }

    #[tokio::test]
    async fn test_dispatch_after_receiver_dropped_is_silent() {
        let (handle, rx) = FanoutHandle::channel(1);
        drop(rx);
        handle.dispatch(job());
    }

    #[tokio::test]
    async fn test_worker_exits_on_cancellation() {
        let (handle, rx) = FanoutHandle::channel(4);
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(run_fanout_worker(bare_config(), rx, cancel.clone()));

        // A job with no channels configured is consumed as a no-op.
        handle.dispatch(job());
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), worker)
            .await
            .expect("worker should exit after cancellation")
            .expect("worker should not panic");
    }

    #[tokio::test]
    async fn test_worker_exits_when_all_handles_dropped() {
        let (handle, rx) = FanoutHandle::channel(4);
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(run_fanout_worker(bare_config(), rx, cancel));
        drop(handle);

        tokio::time::timeout(Duration::from_secs(2), worker)
            .await
            .expect("worker should exit after queue close")
            .expect("worker should not panic");
    }

    #[test]
    fn test_webhook_payload_shape() {
        let session_id = Uuid::new_v4();
        let events = vec![event()];
        let payload = WebhookPayload {
            session_id,
            events: &events,
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["session_id"], serde_json::json!(session_id));
        assert_eq!(json["events"].as_array().unwrap().len(), 1);
        assert_eq!(json["events"][0]["event_type"], "standin_backfill");
    }
}
