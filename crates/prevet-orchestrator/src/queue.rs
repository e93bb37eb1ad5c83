// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message queue abstraction over the broker that delivers validation
//! requests.
//!
//! The broker owns durability and redelivery. Acknowledgement is implicit:
//! a message the handler completes is simply dropped; a nacked message is
//! redelivered with its delivery count incremented.

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::warn;

use prevet_core::validation_set::ValidationRequest;

/// Source of validation requests.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Receive the next request. Returns `None` once the queue is closed
    /// and drained.
    async fn receive(&self) -> Option<ValidationRequest>;

    /// Return a request for redelivery with its delivery count incremented.
    async fn nack(&self, request: ValidationRequest);
}

/// In-process queue over a tokio mpsc channel.
///
/// Used by tests and single-process deployments. Nacked messages go to the
/// back of the queue immediately; there is no redelivery delay.
pub struct MemoryQueue {
    tx: std::sync::Mutex<Option<mpsc::UnboundedSender<ValidationRequest>>>,
    rx: Mutex<mpsc::UnboundedReceiver<ValidationRequest>>,
}

impl MemoryQueue {
    /// Create an empty open queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
        }
    }

    /// Enqueue a request. Silently dropped after `close`.
    pub fn push(&self, request: ValidationRequest) {
        let guard = self.tx.lock().expect("queue sender lock poisoned");
        if let Some(tx) = guard.as_ref() {
            // Send only fails when the receiver is gone, which means the
            // queue itself was dropped.
            let _ = tx.send(request);
        }
    }

    /// Close the queue. `receive` returns `None` once the backlog drains.
    pub fn close(&self) {
        self.tx.lock().expect("queue sender lock poisoned").take();
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn receive(&self) -> Option<ValidationRequest> {
        self.rx.lock().await.recv().await
    }

    async fn nack(&self, mut request: ValidationRequest) {
        request.delivery_count += 1;
        let guard = self.tx.lock().expect("queue sender lock poisoned");
        match guard.as_ref() {
            Some(tx) => {
                let _ = tx.send(request);
            }
            None => {
                warn!(
                    tracking_id = %request.tracking_id,
                    "Dropping nack for closed queue"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request(delivery_count: u32) -> ValidationRequest {
        ValidationRequest {
            package_id: "pkg".to_string(),
            package_version: "1.0.0".to_string(),
            tracking_id: Uuid::new_v4(),
            delivery_count,
        }
    }

    #[tokio::test]
    async fn test_receive_in_push_order() {
        let queue = MemoryQueue::new();
        let first = request(1);
        let second = request(1);
        queue.push(first.clone());
        queue.push(second.clone());

        assert_eq!(queue.receive().await.unwrap().tracking_id, first.tracking_id);
        assert_eq!(queue.receive().await.unwrap().tracking_id, second.tracking_id);
    }

    #[tokio::test]
    async fn test_nack_increments_delivery_count() {
        let queue = MemoryQueue::new();
        queue.nack(request(1)).await;

        let redelivered = queue.receive().await.unwrap();
        assert_eq!(redelivered.delivery_count, 2);
    }

    #[tokio::test]
    async fn test_close_drains_backlog_then_ends() {
        let queue = MemoryQueue::new();
        queue.push(request(1));
        queue.close();

        assert!(queue.receive().await.is_some());
        assert!(queue.receive().await.is_none());
    }

    #[tokio::test]
    async fn test_push_after_close_is_dropped() {
        let queue = MemoryQueue::new();
        queue.close();
        queue.push(request(1));

        assert!(queue.receive().await.is_none());
    }
}
