// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message pump: receives deliveries and dispatches handler tasks.
//!
//! Shutdown is two-phase. `begin_shutdown` stops new dispatch; `drain`
//! bounds the wait for in-flight handlers and logs whatever remains. A
//! handler abandoned mid-flight is safe: its message was never acked, so
//! the broker redelivers it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::handler::{Disposition, ValidationMessageHandler};
use crate::queue::MessageQueue;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Holds one slot in the in-flight count; released on drop, so the count
/// stays accurate even when a handler task panics.
struct InFlightSlot(Arc<AtomicUsize>);

impl InFlightSlot {
    fn claim(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Subscribes to the queue and runs one handler task per delivery.
pub struct MessagePump {
    handler: Arc<ValidationMessageHandler>,
    queue: Arc<dyn MessageQueue>,
    in_flight: Arc<AtomicUsize>,
    shutdown_tx: watch::Sender<bool>,
}

impl MessagePump {
    /// Create a pump over the queue and handler.
    pub fn new(handler: Arc<ValidationMessageHandler>, queue: Arc<dyn MessageQueue>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            handler,
            queue,
            in_flight: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Number of handler tasks currently running.
    pub fn requests_in_progress(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop dispatching new messages. In-flight handlers keep running.
    pub fn begin_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Receive and dispatch until shutdown begins or the queue closes.
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!("Message pump started");

        loop {
            // Shutdown may have begun before this task subscribed.
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                next = self.queue.receive() => {
                    match next {
                        Some(request) => self.dispatch(request),
                        None => {
                            info!("Message queue closed");
                            break;
                        }
                    }
                }
            }
        }

        info!("Message pump stopped");
    }

    /// Wait up to `timeout` for in-flight handlers to finish.
    pub async fn drain(&self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.requests_in_progress() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    in_flight = self.requests_in_progress(),
                    "Drain timeout elapsed with handlers still in flight"
                );
                return;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
        info!("All in-flight handlers finished");
    }

    fn dispatch(&self, request: prevet_core::validation_set::ValidationRequest) {
        let slot = InFlightSlot::claim(self.in_flight.clone());

        let handler = self.handler.clone();
        let queue = self.queue.clone();

        tokio::spawn(async move {
            let _slot = slot;
            let tracking_id = request.tracking_id;
            match handler.handle(&request).await {
                Ok(Disposition::Ack) => {}
                Ok(Disposition::Nack) => queue.nack(request).await,
                Err(err) => {
                    error!(%tracking_id, error = %err, "Validation handler failed");
                    queue.nack(request).await;
                }
            }
        });
    }
}
