//! Notification queue bridge.
//!
//! Decouples "a notification should be sent" from "a notification is sent"
//! by publishing requests to a durable Redis topic and draining it with a
//! background consumer. If the broker cannot be reached even after the
//! reconnect budget, the request is dispatched directly instead, trading
//! durability for best-effort delivery.

use super::dispatcher::Dispatcher;
use super::types::NotificationRequest;
use crate::app_config::QueueConfig;
use chrono::Utc;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Queue entry. `key` is the recipient user identity, kept alongside the
/// payload for partition affinity and consumer-side logging; `ts` is the
/// producer-side timestamp in milliseconds.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    key: String,
    value: NotificationRequest,
    ts: i64,
}

pub struct NotificationQueue {
    client: redis::Client,
    dispatcher: Arc<Dispatcher>,
    cfg: QueueConfig,
}

impl NotificationQueue {
    pub fn new(client: redis::Client, dispatcher: Arc<Dispatcher>, cfg: QueueConfig) -> Self {
        Self {
            client,
            dispatcher,
            cfg,
        }
    }

    /// Enqueue one notification request.
    ///
    /// Never surfaces pipeline failures to the caller: if the broker is
    /// unreachable the request falls back to a direct dispatch, and failures
    /// on that path are logged and dropped.
    pub async fn enqueue(&self, request: NotificationRequest) {
        if let Err(e) = self.publish(&request).await {
            log::warn!(
                "Failed to queue notification for user {}: {}; dispatching directly",
                request.user_id,
                e
            );
            match self.dispatcher.dispatch(&request).await {
                Ok(_) => {}
                Err(e) => log::warn!(
                    "Fallback dispatch failed for user {}: {}",
                    request.user_id,
                    e
                ),
            }
        }
    }

    async fn publish(&self, request: &NotificationRequest) -> anyhow::Result<()> {
        // Probe first; a dead connection gets the reconnect treatment before
        // we give up on the broker.
        let mut conn = match self.probe().await {
            Ok(conn) => conn,
            Err(e) => {
                log::warn!("Broker probe failed ({}), reconnecting", e);
                self.connect_with_retry().await?
            }
        };

        let envelope = Envelope {
            key: request.user_id.clone(),
            value: request.clone(),
            ts: Utc::now().timestamp_millis(),
        };
        let body = serde_json::to_string(&envelope)?;
        let _: i64 = conn.rpush(&self.cfg.topic, body).await?;
        Ok(())
    }

    async fn probe(&self) -> anyhow::Result<redis::aio::Connection> {
        let mut conn = self.client.get_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(conn)
    }

    /// Reconnect with a capped backoff between attempts. Beyond the retry
    /// budget the error is surfaced and the caller falls back.
    async fn connect_with_retry(&self) -> anyhow::Result<redis::aio::Connection> {
        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 1..=self.cfg.reconnect_max_attempts {
            match self.probe().await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    let backoff = std::cmp::min(
                        u64::from(attempt) * self.cfg.reconnect_backoff_ms,
                        self.cfg.reconnect_backoff_cap_ms,
                    );
                    log::warn!(
                        "Broker reconnect attempt {}/{} failed: {}; retrying in {}ms",
                        attempt,
                        self.cfg.reconnect_max_attempts,
                        e,
                        backoff
                    );
                    last_err = Some(e);
                    actix_web::rt::time::sleep(Duration::from_millis(backoff)).await;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("broker unreachable, no retries budgeted")))
    }

    /// Background consumer loop. Runs for the life of the process: read
    /// errors reconnect with a pause, per-message failures are logged and the
    /// loop continues. Poison messages are dropped, not re-queued.
    pub async fn run_consumer(self: Arc<Self>) {
        log::info!("Notification consumer started on topic {}", self.cfg.topic);

        loop {
            let mut conn = match self.client.get_async_connection().await {
                Ok(conn) => conn,
                Err(e) => {
                    log::warn!("Consumer cannot reach broker: {}; retrying", e);
                    actix_web::rt::time::sleep(Duration::from_millis(
                        self.cfg.reconnect_backoff_cap_ms,
                    ))
                    .await;
                    continue;
                }
            };

            loop {
                let popped: Result<Option<(String, String)>, redis::RedisError> = conn
                    .blpop(&self.cfg.topic, self.cfg.consumer_block_secs as usize)
                    .await;

                match popped {
                    Ok(Some((_, body))) => self.consume_one(&body).await,
                    // Blocking read timed out with an empty topic; poll again.
                    Ok(None) => continue,
                    Err(e) => {
                        log::warn!("Consumer read failed: {}; reconnecting", e);
                        break;
                    }
                }
            }

            actix_web::rt::time::sleep(Duration::from_millis(self.cfg.reconnect_backoff_ms)).await;
        }
    }

    async fn consume_one(&self, body: &str) {
        let envelope: Envelope = match serde_json::from_str(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!("Dropping malformed queue entry: {}", e);
                return;
            }
        };

        match self.dispatcher.dispatch(&envelope.value).await {
            Ok(Some(message_id)) => log::debug!(
                "Consumed notification for user {} (provider id {})",
                envelope.key,
                message_id
            ),
            // Recipient has no token; silently skipped.
            Ok(None) => {}
            Err(e) => log::warn!(
                "Notification delivery failed for user {}: {}",
                envelope.key,
                e
            ),
        }
    }
}
