// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Validation record store interface and backends.
//!
//! All operations are atomic at the single-row/aggregate level; the core
//! never requires cross-row transactions. The validation set and its runs
//! form one aggregate and are created together.

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryStore;
pub use self::postgres::{MIGRATOR, PostgresStore};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::package::{PackageRecord, PackageStatus, StreamMetadata};
use crate::validation_set::{ValidationSet, ValidatorRun};

/// Record store interface used by the orchestrator.
#[async_trait]
pub trait ValidationStore: Send + Sync {
    /// Look up a package by identifier and normalized version.
    async fn find_package(
        &self,
        package_id: &str,
        normalized_version: &str,
    ) -> Result<Option<PackageRecord>>;

    /// Insert a package row. The gallery subsystem owns the row otherwise;
    /// this exists for seeding and integration tests.
    async fn create_package(&self, record: &PackageRecord) -> Result<()>;

    /// Update the entity's public status.
    async fn update_package_status(&self, package_key: &str, status: PackageStatus) -> Result<()>;

    /// Update the entity's stream metadata.
    async fn update_stream_metadata(
        &self,
        package_key: &str,
        metadata: &StreamMetadata,
    ) -> Result<()>;

    /// Look up a validation set by tracking id, including its runs.
    async fn get_validation_set(&self, tracking_id: Uuid) -> Result<Option<ValidationSet>>;

    /// Persist a freshly built validation set with its seeded runs.
    ///
    /// A tracking-id collision surfaces as
    /// [`CoreError::ValidationSetAlreadyExists`](crate::error::CoreError) so
    /// the caller can re-read the winner of a creation race.
    async fn create_validation_set(&self, set: &ValidationSet) -> Result<ValidationSet>;

    /// Update one validator run within a set, touching the set's
    /// `updated_at` alongside.
    async fn update_validator_run(&self, tracking_id: Uuid, run: &ValidatorRun) -> Result<()>;

    /// Most recently updated terminal run for this package + validator from
    /// any *other* tracking id. Supports the cross-request guard against
    /// silently re-validating already-validated packages.
    async fn latest_terminal_run(
        &self,
        package_id: &str,
        normalized_version: &str,
        validator_name: &str,
        exclude_tracking_id: Uuid,
    ) -> Result<Option<(Uuid, ValidatorRun)>>;

    /// Number of validation sets ever created for this package version.
    async fn count_validation_sets(
        &self,
        package_id: &str,
        normalized_version: &str,
    ) -> Result<i64>;
}
