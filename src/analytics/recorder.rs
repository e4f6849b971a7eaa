//! Background click recorder
//!
//! Uses an actor with an mpsc channel so the redirect path only pays for a
//! `try_send`. The actor owns the pending batch outright (no locks) and is
//! the only writer to the event store, so events of one link are appended in
//! the order their redirects were resolved.
//!
//! A failed append keeps the batch and retries it with backoff, up to
//! [`MAX_PERSIST_ATTEMPTS`] times, before the events are dropped. While the
//! store is failing the pending buffer is capped; clicks beyond the cap are
//! dropped.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::analytics::summarize_user_agent;
use crate::config::RecorderConfig;
use crate::models::{ClickEvent, NewClickEvent};
use crate::storage::EventStore;

/// Append attempts for one pending batch before it is dropped
pub const MAX_PERSIST_ATTEMPTS: u32 = 3;

/// Delay before the first retry; doubles with every further failure
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Pending-buffer cap, in batches
const MAX_BUFFERED_BATCHES: usize = 16;

/// Message types for the RecorderActor
enum ActorMessage {
    Record(NewClickEvent),
    /// Persist everything received so far, then acknowledge
    Flush(oneshot::Sender<()>),
    /// Persist everything and stop
    Shutdown(oneshot::Sender<()>),
}

struct RecorderActor {
    receiver: mpsc::Receiver<ActorMessage>,
    events: Arc<dyn EventStore>,
    buffer: Vec<ClickEvent>,
    batch_size: usize,
    max_buffered: usize,
    flush_interval: Duration,
    failed_attempts: u32,
    /// Set after a failed append; size and interval triggers wait for it
    retry_at: Option<Instant>,
}

impl RecorderActor {
    async fn run(mut self) {
        let mut flush_ticker = tokio::time::interval(self.flush_interval);
        flush_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // Skip the first tick which fires immediately
        flush_ticker.tick().await;

        loop {
            tokio::select! {
                msg = self.receiver.recv() => {
                    match msg {
                        Some(ActorMessage::Record(click)) => {
                            if self.buffer.len() >= self.max_buffered {
                                warn!(
                                    link_id = click.link_id,
                                    pending = self.buffer.len(),
                                    "click buffer full while event store is failing, dropping event"
                                );
                            } else {
                                self.buffer.push(Self::summarize(click));
                                if self.buffer.len() >= self.batch_size {
                                    self.persist(false).await;
                                }
                            }
                        }
                        Some(ActorMessage::Flush(ack)) => {
                            self.persist(true).await;
                            let _ = ack.send(());
                        }
                        Some(ActorMessage::Shutdown(ack)) => {
                            info!("Click recorder received shutdown signal, flushing...");
                            self.drain().await;
                            let _ = ack.send(());
                            break;
                        }
                        None => {
                            // Every handle dropped without an explicit shutdown
                            self.drain().await;
                            break;
                        }
                    }
                }
                _ = flush_ticker.tick() => {
                    self.persist(false).await;
                }
            }
        }
    }

    /// User-agent parsing happens here, off the redirect path
    fn summarize(click: NewClickEvent) -> ClickEvent {
        ClickEvent {
            link_id: click.link_id,
            accessed_at: click.accessed_at,
            ip_address: click.ip_address,
            browser: summarize_user_agent(click.raw_user_agent.as_deref()),
        }
    }

    /// Append the pending buffer. Returns true once nothing is pending.
    ///
    /// Unless `force` is set, a buffer waiting out its retry backoff is left
    /// alone. Failures are logged and never reach the redirect path; after
    /// [`MAX_PERSIST_ATTEMPTS`] failures in a row the buffer is dropped.
    async fn persist(&mut self, force: bool) -> bool {
        if self.buffer.is_empty() {
            return true;
        }
        if !force && self.retry_at.is_some_and(|at| Instant::now() < at) {
            return false;
        }

        match self.events.append(&self.buffer).await {
            Ok(()) => {
                debug!(count = self.buffer.len(), "persisted click events");
                self.reset();
                true
            }
            Err(e) => {
                self.failed_attempts += 1;
                if self.failed_attempts >= MAX_PERSIST_ATTEMPTS {
                    warn!(
                        dropped = self.buffer.len(),
                        attempts = self.failed_attempts,
                        error = %e,
                        "failed to persist click events, dropping batch"
                    );
                    self.reset();
                    return true;
                }

                let backoff = RETRY_BACKOFF * 2u32.pow(self.failed_attempts - 1);
                warn!(
                    pending = self.buffer.len(),
                    attempt = self.failed_attempts,
                    retry_in_ms = backoff.as_millis() as u64,
                    error = %e,
                    "failed to persist click events, will retry"
                );
                self.retry_at = Some(Instant::now() + backoff);
                false
            }
        }
    }

    /// Persist until the buffer is empty or its attempts are used up
    async fn drain(&mut self) {
        while !self.persist(true).await {
            if let Some(at) = self.retry_at {
                tokio::time::sleep_until(at).await;
            }
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.failed_attempts = 0;
        self.retry_at = None;
    }
}

/// Cheap, cloneable handle to the recorder actor
#[derive(Clone)]
pub struct ClickRecorder {
    actor_tx: mpsc::Sender<ActorMessage>,
}

impl ClickRecorder {
    /// Spawn the recorder actor. Must be called inside a tokio runtime.
    pub fn new(events: Arc<dyn EventStore>, config: &RecorderConfig) -> Self {
        let (actor_tx, receiver) = mpsc::channel(config.queue_size.max(1));

        let batch_size = config.batch_size.max(1);
        let actor = RecorderActor {
            receiver,
            events,
            buffer: Vec::with_capacity(batch_size),
            batch_size,
            max_buffered: batch_size.saturating_mul(MAX_BUFFERED_BATCHES),
            flush_interval: Duration::from_millis(config.flush_interval_ms.max(1)),
            failed_attempts: 0,
            retry_at: None,
        };

        tokio::spawn(actor.run());

        Self { actor_tx }
    }

    /// Queue a click for recording. Never blocks and never fails the caller;
    /// a full or closed queue drops the click with a warning.
    pub fn record(
        &self,
        link_id: i64,
        accessed_at: DateTime<Utc>,
        ip_address: Option<String>,
        raw_user_agent: Option<String>,
    ) {
        let click = NewClickEvent {
            link_id,
            accessed_at,
            ip_address,
            raw_user_agent,
        };

        match self.actor_tx.try_send(ActorMessage::Record(click)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(link_id, "click queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(link_id, "click recorder stopped, dropping event");
            }
        }
    }

    /// Wait until every click recorded before this call has been handed to
    /// the event store
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.actor_tx.send(ActorMessage::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Flush pending clicks and stop the actor
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.actor_tx.send(ActorMessage::Shutdown(ack)).await.is_ok() {
            let _ = done.await;
        }
    }
}
