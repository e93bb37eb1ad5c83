// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable orchestrator runtime.
//!
//! This module provides [`Orchestrator`] which allows embedding the
//! validation orchestrator into an existing tokio application instead of
//! running it as a standalone server.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prevet_orchestrator::runtime::Orchestrator;
//! use prevet_orchestrator::queue::MemoryQueue;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let queue = Arc::new(MemoryQueue::new());
//!
//!     let orchestrator = Orchestrator::builder()
//!         .store(store)
//!         .artifacts(artifacts)
//!         .registry(registry)
//!         .queue(queue.clone())
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... push validation requests onto the queue ...
//!
//!     // Graceful shutdown
//!     orchestrator.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{error, info};

use prevet_core::artifacts::ArtifactStore;
use prevet_core::persistence::ValidationStore;

use crate::handler::wire_handler;
use crate::pump::MessagePump;
use crate::queue::MessageQueue;
use crate::registry::ValidatorRegistry;
use crate::telemetry::{TelemetrySink, TracingTelemetry};

const DEFAULT_MISSING_PACKAGE_RETRY_LIMIT: u32 = 3;
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for creating an [`Orchestrator`].
pub struct OrchestratorBuilder {
    store: Option<Arc<dyn ValidationStore>>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    registry: Option<Arc<ValidatorRegistry>>,
    queue: Option<Arc<dyn MessageQueue>>,
    telemetry: Arc<dyn TelemetrySink>,
    missing_package_retry_limit: u32,
    drain_timeout: Duration,
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("store", &self.store.as_ref().map(|_| "..."))
            .field("artifacts", &self.artifacts.as_ref().map(|_| "..."))
            .field("registry", &self.registry.as_ref().map(|_| "..."))
            .field("queue", &self.queue.as_ref().map(|_| "..."))
            .field(
                "missing_package_retry_limit",
                &self.missing_package_retry_limit,
            )
            .field("drain_timeout", &self.drain_timeout)
            .finish()
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self {
            store: None,
            artifacts: None,
            registry: None,
            queue: None,
            telemetry: Arc::new(TracingTelemetry),
            missing_package_retry_limit: DEFAULT_MISSING_PACKAGE_RETRY_LIMIT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl OrchestratorBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the validation record store (required).
    pub fn store(mut self, store: Arc<dyn ValidationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the artifact store (required).
    pub fn artifacts(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    /// Set the validator registry (required).
    pub fn registry(mut self, registry: Arc<ValidatorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the message queue (required).
    pub fn queue(mut self, queue: Arc<dyn MessageQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Set the telemetry sink.
    ///
    /// Default: [`TracingTelemetry`]
    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Set the retry budget for messages naming an unknown package.
    ///
    /// Default: 3
    pub fn missing_package_retry_limit(mut self, limit: u32) -> Self {
        self.missing_package_retry_limit = limit;
        self
    }

    /// Set the bound on waiting for in-flight handlers at shutdown.
    ///
    /// Default: 30 seconds
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Build the orchestrator configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<OrchestratorConfig> {
        let store = self.store.ok_or_else(|| anyhow::anyhow!("store is required"))?;
        let artifacts = self
            .artifacts
            .ok_or_else(|| anyhow::anyhow!("artifacts is required"))?;
        let registry = self
            .registry
            .ok_or_else(|| anyhow::anyhow!("registry is required"))?;
        let queue = self.queue.ok_or_else(|| anyhow::anyhow!("queue is required"))?;

        Ok(OrchestratorConfig {
            store,
            artifacts,
            registry,
            queue,
            telemetry: self.telemetry,
            missing_package_retry_limit: self.missing_package_retry_limit,
            drain_timeout: self.drain_timeout,
        })
    }
}

/// Configuration for an [`Orchestrator`].
pub struct OrchestratorConfig {
    store: Arc<dyn ValidationStore>,
    artifacts: Arc<dyn ArtifactStore>,
    registry: Arc<ValidatorRegistry>,
    queue: Arc<dyn MessageQueue>,
    telemetry: Arc<dyn TelemetrySink>,
    missing_package_retry_limit: u32,
    drain_timeout: Duration,
}

impl std::fmt::Debug for OrchestratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorConfig")
            .field(
                "missing_package_retry_limit",
                &self.missing_package_retry_limit,
            )
            .field("drain_timeout", &self.drain_timeout)
            .finish_non_exhaustive()
    }
}

impl OrchestratorConfig {
    /// Start the orchestrator, spawning the message pump task.
    pub async fn start(self) -> Result<Orchestrator> {
        let handler = Arc::new(wire_handler(
            self.store,
            self.artifacts,
            self.registry,
            self.telemetry,
            self.missing_package_retry_limit,
        ));
        let pump = Arc::new(MessagePump::new(handler, self.queue));

        let pump_task = {
            let pump = pump.clone();
            tokio::spawn(async move { pump.run().await })
        };

        info!("Orchestrator started");

        Ok(Orchestrator {
            pump,
            pump_task,
            drain_timeout: self.drain_timeout,
        })
    }
}

/// A running orchestrator that can be embedded in an application.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct Orchestrator {
    pump: Arc<MessagePump>,
    pump_task: JoinHandle<()>,
    drain_timeout: Duration,
}

impl Orchestrator {
    /// Create a new builder for configuring the orchestrator.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Number of handler tasks currently running.
    pub fn requests_in_progress(&self) -> usize {
        self.pump.requests_in_progress()
    }

    /// Check if the pump is still running.
    pub fn is_running(&self) -> bool {
        !self.pump_task.is_finished()
    }

    /// Gracefully shut down the orchestrator.
    ///
    /// Stops dispatching, waits up to the drain timeout for in-flight
    /// handlers, then joins the pump task.
    pub async fn shutdown(self) -> Result<()> {
        info!("Orchestrator shutting down...");

        self.pump.begin_shutdown();
        self.pump.drain(self.drain_timeout).await;

        match self.pump_task.await {
            Ok(()) => {
                info!("Orchestrator shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("Message pump task panicked: {}", e);
                Err(anyhow::anyhow!("message pump task panicked: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::registry::{Validator, ValidatorConfig, ValidatorOutcome};
    use async_trait::async_trait;
    use prevet_core::artifacts::MemoryArtifactStore;
    use prevet_core::package::PackageRecord;
    use prevet_core::persistence::MemoryStore;
    use prevet_core::validation_set::ValidationSet;

    struct NoopValidator;

    #[async_trait]
    impl Validator for NoopValidator {
        async fn validate(
            &self,
            _package: &PackageRecord,
            _set: &ValidationSet,
        ) -> prevet_core::error::Result<ValidatorOutcome> {
            Ok(ValidatorOutcome::succeeded())
        }
    }

    fn registry() -> Arc<ValidatorRegistry> {
        Arc::new(
            ValidatorRegistry::builder()
                .register(
                    ValidatorConfig {
                        name: "scan".to_string(),
                        deadline_secs: 3600,
                        requires: vec![],
                        required: true,
                    },
                    Arc::new(NoopValidator),
                )
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_builder_defaults() {
        let builder = OrchestratorBuilder::new();
        assert!(builder.store.is_none());
        assert!(builder.queue.is_none());
        assert_eq!(builder.missing_package_retry_limit, 3);
        assert_eq!(builder.drain_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_debug_hides_components() {
        let builder = OrchestratorBuilder::new().store(Arc::new(MemoryStore::new()));
        let debug_str = format!("{:?}", builder);
        assert!(debug_str.contains("OrchestratorBuilder"));
        assert!(debug_str.contains("..."));
    }

    #[test]
    fn test_builder_build_missing_parts() {
        let result = OrchestratorBuilder::new().build();
        assert!(result.unwrap_err().to_string().contains("store is required"));

        let result = OrchestratorBuilder::new()
            .store(Arc::new(MemoryStore::new()))
            .build();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("artifacts is required")
        );

        let result = OrchestratorBuilder::new()
            .store(Arc::new(MemoryStore::new()))
            .artifacts(Arc::new(MemoryArtifactStore::new()))
            .registry(registry())
            .build();
        assert!(result.unwrap_err().to_string().contains("queue is required"));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let queue = Arc::new(MemoryQueue::new());
        let orchestrator = Orchestrator::builder()
            .store(Arc::new(MemoryStore::new()))
            .artifacts(Arc::new(MemoryArtifactStore::new()))
            .registry(registry())
            .queue(queue)
            .drain_timeout(Duration::from_secs(1))
            .build()
            .unwrap()
            .start()
            .await
            .unwrap();

        assert!(orchestrator.is_running());
        assert_eq!(orchestrator.requests_in_progress(), 0);

        orchestrator.shutdown().await.unwrap();
    }
}
