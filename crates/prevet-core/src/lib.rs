// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Prevet Core - Domain Model and Storage Interfaces
//!
//! This crate provides the data model and the two narrow storage interfaces
//! the validation orchestrator is built on:
//!
//! - [`persistence::ValidationStore`] - validation sets, validator runs,
//!   and the package entity's status/stream-metadata fields, backed by
//!   PostgreSQL or an in-memory store.
//! - [`artifacts::ArtifactStore`] - object storage with conditional copy
//!   semantics (fail-if-exists, token match), backed by the filesystem or
//!   an in-memory store.
//!
//! # Data model
//!
//! ```text
//! ValidationRequest (ephemeral, from the broker)
//!        │ tracking_id
//!        ▼
//! ValidationSet ──────────── one per validation attempt
//!   ├─ ValidatorRun "scan"      (not_started → incomplete → succeeded|failed)
//!   ├─ ValidatorRun "sign"
//!   └─ ...
//!        │ package_key
//!        ▼
//! PackageRecord ───────────── target entity (gallery-owned row;
//!                              this core writes status + stream metadata)
//! ```
//!
//! # Storage layout
//!
//! See [`paths`] for the three artifact locations (public, validation
//! container, per-attempt scratch).

pub mod artifacts;
pub mod error;
pub mod package;
pub mod paths;
pub mod persistence;
pub mod validation_set;

pub use error::{CoreError, Result};
pub use package::{PackageRecord, PackageStatus, StreamMetadata};
pub use validation_set::{
    ValidationIssue, ValidationRequest, ValidationSet, ValidationStatus, ValidatorRun,
};
