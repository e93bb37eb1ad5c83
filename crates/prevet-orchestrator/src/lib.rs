// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Prevet Orchestrator - Package Validation Orchestration
//!
//! This crate coordinates asynchronous validation of uploaded packages and
//! publishes the ones that pass. It consumes validation requests from a
//! message queue, drives a configured set of validators per request, and
//! applies the terminal outcome through a safe-publish protocol.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Message Broker                           │
//! │              (validation requests, redelivery)                  │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  MessagePump ── ValidationMessageHandler                        │
//! │       │              │                                          │
//! │       │              ├─ ValidationSetProvider   (idempotent     │
//! │       │              │                           set creation)  │
//! │       │              ├─ ValidatorExecutionCoordinator           │
//! │       │              │   └─ ValidatorStatusTracker              │
//! │       │              ├─ OutcomeEvaluator                        │
//! │       │              └─ PackageStatusProcessor (safe publish)   │
//! └───────┼──────────────────────┼──────────────────┼───────────────┘
//!         │                      │                  │
//!         ▼                      ▼                  ▼
//! ┌───────────────┐   ┌────────────────────┐   ┌──────────────────┐
//! │   Validators  │   │     PostgreSQL     │   │  Artifact Store  │
//! │  (external)   │   │  (prevet-core)     │   │  (prevet-core)   │
//! └───────────────┘   └────────────────────┘   └──────────────────┘
//! ```
//!
//! # Message flow
//!
//! One delivery runs end to end through [`handler::ValidationMessageHandler`]:
//!
//! | Step | Component | Responsibility |
//! |------|-----------|----------------|
//! | 1 | gallery lookup | bounded retry for packages the gallery has not committed yet |
//! | 2 | [`provider::ValidationSetProvider`] | create-or-load the set for the tracking id |
//! | 3 | [`coordinator::ValidatorExecutionCoordinator`] | drive pending validators, deadlines, adoption |
//! | 4 | [`outcome::OutcomeEvaluator`] | fold run statuses into one outcome |
//! | 5 | [`status::PackageStatusProcessor`] | conditional copies, metadata, compensation |
//!
//! Every step is idempotent; a crash anywhere leaves the message
//! redeliverable and the next delivery resumes the same validation set.
//!
//! # Embedding
//!
//! [`runtime::Orchestrator`] embeds the whole pipeline into an existing
//! tokio application; the binary in this crate is a thin standalone shell
//! over the same builder.

pub mod config;
pub mod coordinator;
pub mod handler;
pub mod outcome;
pub mod provider;
pub mod pump;
pub mod queue;
pub mod registry;
pub mod runtime;
pub mod status;
pub mod telemetry;
pub mod tracker;

pub use config::{Config, ConfigError};
pub use coordinator::ValidatorExecutionCoordinator;
pub use handler::{Disposition, ValidationMessageHandler, wire_handler};
pub use outcome::{OutcomeEvaluator, OutcomeSummary, ValidationSetOutcome};
pub use provider::{ResolvedSet, ValidationSetProvider};
pub use pump::MessagePump;
pub use queue::{MemoryQueue, MessageQueue};
pub use registry::{
    Validator, ValidatorConfig, ValidatorOutcome, ValidatorRegistry, parse_topology,
};
pub use runtime::{Orchestrator, OrchestratorBuilder, OrchestratorConfig};
pub use status::PackageStatusProcessor;
pub use telemetry::{TelemetrySink, TracingTelemetry};
pub use tracker::ValidatorStatusTracker;
