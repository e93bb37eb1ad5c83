// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The safe-publish protocol: package status transitions with strictly
//! ordered copy / metadata / record-update / cleanup steps.
//!
//! Publication must be at-most-once visible even under concurrent attempts,
//! crashes, and redelivery. No in-process lock is held across attempts; the
//! artifact store's conditional copy is the sole arbiter of races. Two
//! conflict policies coexist deliberately:
//!
//! - the fresh, no-processor copy from the validation container swallows a
//!   fail-if-exists conflict once the destination is confirmed present (an
//!   earlier, possibly crashed, attempt already placed the file);
//! - the set-specific copy never swallows a conflict - a processor's output
//!   must not silently overwrite another attempt's output, and a token
//!   mismatch means the public bytes changed since validation began.
//!
//! Do not unify the two branches.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use prevet_core::artifacts::{ArtifactStore, CopyCondition};
use prevet_core::error::{CoreError, Result};
use prevet_core::package::{PackageRecord, PackageStatus, StreamMetadata};
use prevet_core::paths;
use prevet_core::persistence::ValidationStore;
use prevet_core::validation_set::ValidationSet;

use crate::registry::ValidatorRegistry;
use crate::telemetry::TelemetrySink;

/// Applies terminal validation outcomes to the target entity.
pub struct PackageStatusProcessor {
    store: Arc<dyn ValidationStore>,
    artifacts: Arc<dyn ArtifactStore>,
    registry: Arc<ValidatorRegistry>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl PackageStatusProcessor {
    /// Create a processor over the record and artifact stores.
    pub fn new(
        store: Arc<dyn ValidationStore>,
        artifacts: Arc<dyn ArtifactStore>,
        registry: Arc<ValidatorRegistry>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            store,
            artifacts,
            registry,
            telemetry,
        }
    }

    /// Transition the entity to `target`.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidStatusTransition`] for any disallowed target;
    /// nothing is written in that case. Storage conflicts and downstream
    /// failures propagate per the policies described at module level.
    #[instrument(
        skip(self, package, set),
        fields(package = %package.identity(), tracking_id = %set.tracking_id)
    )]
    pub async fn set_status(
        &self,
        package: &PackageRecord,
        set: &ValidationSet,
        target: PackageStatus,
    ) -> Result<()> {
        package.status.validate_transition(target)?;

        // 1. Telemetry only on an actual change.
        if package.status != target {
            self.telemetry.package_status_change(
                &package.package_id,
                &package.normalized_version,
                package.status,
                target,
            );
        }

        match target {
            PackageStatus::FailedValidation => {
                // 2. No file operations on rejection.
                self.store
                    .update_package_status(&package.package_key, target)
                    .await?;
                info!("Package marked failed validation");
                Ok(())
            }
            PackageStatus::Available => self.make_available(package, set).await,
            // validate_transition rejected everything else already.
            _ => unreachable!("validate_transition allows only terminal targets"),
        }
    }

    async fn make_available(&self, package: &PackageRecord, set: &ValidationSet) -> Result<()> {
        let public = paths::public_path(&package.package_id, &package.normalized_version);
        let container = paths::validation_path(&package.package_id, &package.normalized_version);
        let set_specific = paths::validation_set_path(
            set.tracking_id,
            &package.package_id,
            &package.normalized_version,
        );

        // 3a. A processor may have rewritten the artifact's bytes; its
        // output in the set-specific location is then the only valid source.
        let any_processor = set
            .runs
            .iter()
            .any(|r| self.registry.is_processor(&r.validator_name));
        let set_copy_exists = self.artifacts.exists(&set_specific).await?;

        // 3b/3c. Copy into the public location.
        let copied = if any_processor || set_copy_exists {
            self.copy_from_set_location(package, set, &set_specific, &public)
                .await?
        } else {
            self.copy_from_validation_container(package, &container, &public)
                .await?
        };

        // 3d + 3e, with compensation on failure.
        let update = self.update_record(package, &public).await;
        if let Err(err) = update {
            // 3f. Copied bytes without a matching Available row must not
            // stay public. An entity that was already Available introduced
            // nothing new, so nothing is deleted.
            if copied && package.status != PackageStatus::Available {
                warn!(path = %public, "Record update failed after copy, deleting public artifact");
                if let Err(cleanup_err) = self.artifacts.delete(&public).await {
                    error!(
                        path = %public,
                        error = %cleanup_err,
                        "Failed to delete public artifact during compensation"
                    );
                }
            }
            return Err(err);
        }

        // 3g. Housekeeping: the container copy is finished with; the
        // set-specific copy is left for garbage collection since other
        // in-flight readers may still reference it.
        self.artifacts.delete(&container).await?;

        // 3h. Detectable data-integrity signal, not an operational failure.
        if !self.artifacts.exists(&public).await? {
            self.telemetry
                .missing_public_artifact(&package.package_id, &package.normalized_version);
        }

        info!("Package made available");
        Ok(())
    }

    /// Fresh copy from the validation container. A fail-if-exists conflict
    /// is benign once the destination is confirmed present.
    ///
    /// Returns whether this call introduced new public bytes.
    async fn copy_from_validation_container(
        &self,
        package: &PackageRecord,
        container: &str,
        public: &str,
    ) -> Result<bool> {
        match self
            .artifacts
            .copy(container, public, CopyCondition::FailIfExists)
            .await
        {
            Ok(()) => Ok(true),
            Err(err) if err.is_conflict() => {
                if self.artifacts.exists(public).await? {
                    self.telemetry.benign_copy_conflict(
                        &package.package_id,
                        &package.normalized_version,
                        public,
                    );
                    Ok(false)
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Copy from the set-specific location. Conflicts are never swallowed.
    ///
    /// Returns whether this call introduced new public bytes.
    async fn copy_from_set_location(
        &self,
        package: &PackageRecord,
        set: &ValidationSet,
        set_specific: &str,
        public: &str,
    ) -> Result<bool> {
        let condition = match &set.validating_token {
            Some(token) => CopyCondition::IfMatches(token.clone()),
            None => CopyCondition::FailIfExists,
        };

        if let Err(err) = self.artifacts.copy(set_specific, public, condition).await {
            if err.is_conflict() && set.validating_token.is_some() {
                warn!(
                    package = %package.identity(),
                    tracking_id = %set.tracking_id,
                    "Public artifact changed since validation began"
                );
            }
            return Err(err);
        }
        Ok(true)
    }

    /// Refresh stream metadata if the copied bytes changed, then flip the
    /// status row to Available.
    async fn update_record(&self, package: &PackageRecord, public: &str) -> Result<()> {
        let bytes = self.artifacts.read(public).await?;
        let metadata = StreamMetadata::compute(&bytes);

        // Stable bytes under revalidation skip the needless write.
        if package.stream_metadata.as_ref() != Some(&metadata) {
            self.store
                .update_stream_metadata(&package.package_key, &metadata)
                .await?;
        }

        self.store
            .update_package_status(&package.package_key, PackageStatus::Available)
            .await
    }
}
