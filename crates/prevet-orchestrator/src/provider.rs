// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Idempotent resolution of tracking ids to validation sets.
//!
//! Lookup-before-create keeps a validation attempt for a given tracking id
//! to at most one set of side effects even under broker redelivery: an
//! existing set is returned unchanged, fully processed work is reported as
//! a duplicate, and a creation race is resolved by re-reading the winner.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use prevet_core::artifacts::ArtifactStore;
use prevet_core::error::{CoreError, Result};
use prevet_core::package::{PackageRecord, PackageStatus};
use prevet_core::paths;
use prevet_core::persistence::ValidationStore;
use prevet_core::validation_set::{ValidationSet, ValidatorRun};
use uuid::Uuid;

use crate::registry::ValidatorRegistry;
use crate::telemetry::TelemetrySink;

/// Result of resolving a tracking id.
#[derive(Debug)]
pub enum ResolvedSet {
    /// A set that still has work to drive.
    Active(ValidationSet),
    /// Redelivery of fully processed work; the caller should ack and stop.
    Duplicate,
}

/// Resolves tracking ids to validation sets, creating on first sight.
pub struct ValidationSetProvider {
    store: Arc<dyn ValidationStore>,
    artifacts: Arc<dyn ArtifactStore>,
    registry: Arc<ValidatorRegistry>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ValidationSetProvider {
    /// Create a provider over the given stores and validator topology.
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

    /// Resolve `tracking_id` to a validation set for `package`.
    ///
    /// # Errors
    ///
    /// [`CoreError::TrackingIdMismatch`] if an existing set references a
    /// different package - a tracking-id collision across packages
    /// indicates broker or caller corruption and is never retried.
    pub async fn get_or_create(
        &self,
        tracking_id: Uuid,
        package: &PackageRecord,
    ) -> Result<ResolvedSet> {
        if let Some(existing) = self.store.get_validation_set(tracking_id).await? {
            self.assert_matches(&existing, package)?;

            if self.fully_processed(&existing, package) {
                return Ok(ResolvedSet::Duplicate);
            }

            debug!(
                %tracking_id,
                package = %package.identity(),
                "Found existing validation set"
            );
            return Ok(ResolvedSet::Active(existing));
        }

        let set = self.build_set(tracking_id, package).await?;
        match self.store.create_validation_set(&set).await {
            Ok(created) => {
                info!(
                    %tracking_id,
                    package = %package.identity(),
                    validators = created.runs.len(),
                    "Created validation set"
                );
                self.telemetry.validation_set_created(
                    tracking_id,
                    &package.package_id,
                    &package.normalized_version,
                );
                Ok(ResolvedSet::Active(created))
            }
            Err(CoreError::ValidationSetAlreadyExists { .. }) => {
                // Lost a creation race; the winner's row is authoritative.
                let existing = self
                    .store
                    .get_validation_set(tracking_id)
                    .await?
                    .ok_or_else(|| CoreError::DatabaseError {
                        operation: "get_validation_set".to_string(),
                        details: format!(
                            "set '{}' reported as existing but not readable",
                            tracking_id
                        ),
                    })?;
                self.assert_matches(&existing, package)?;
                Ok(ResolvedSet::Active(existing))
            }
            Err(err) => Err(err),
        }
    }

    fn assert_matches(&self, set: &ValidationSet, package: &PackageRecord) -> Result<()> {
        if set.package_id != package.package_id
            || set.normalized_version != package.normalized_version
        {
            return Err(CoreError::TrackingIdMismatch {
                tracking_id: set.tracking_id.to_string(),
                expected: set.identity(),
                actual: package.identity(),
            });
        }
        Ok(())
    }

    /// Whether this set already drove the package to its terminal status.
    ///
    /// All required runs terminal and the package no longer `Validating`
    /// means a redelivery has nothing left to do.
    fn fully_processed(&self, set: &ValidationSet, package: &PackageRecord) -> bool {
        if package.status == PackageStatus::Validating {
            return false;
        }
        set.runs
            .iter()
            .filter(|r| self.registry.is_required(&r.validator_name))
            .all(|r| r.status.is_terminal())
    }

    async fn build_set(&self, tracking_id: Uuid, package: &PackageRecord) -> Result<ValidationSet> {
        let now = Utc::now();
        let runs: Vec<ValidatorRun> = self
            .registry
            .configs()
            .map(|c| ValidatorRun::seeded(c.name.clone(), now))
            .collect();

        // For revalidation the public artifact already exists; remember its
        // token so the publish protocol can detect bytes changing under us.
        let public = paths::public_path(&package.package_id, &package.normalized_version);
        let validating_token = self.artifacts.etag(&public).await?;

        Ok(ValidationSet {
            tracking_id,
            package_id: package.package_id.clone(),
            normalized_version: package.normalized_version.clone(),
            package_key: package.package_key.clone(),
            validating_token,
            created_at: now,
            updated_at: now,
            runs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ValidatorConfig, ValidatorOutcome};
    use crate::telemetry::recording::{RecordingTelemetry, TelemetryEvent};
    use async_trait::async_trait;
    use prevet_core::artifacts::MemoryArtifactStore;
    use prevet_core::persistence::MemoryStore;
    use prevet_core::validation_set::ValidationStatus;

    struct NoopValidator;

    #[async_trait]
    impl crate::registry::Validator for NoopValidator {
        async fn validate(
            &self,
            _package: &PackageRecord,
            _set: &ValidationSet,
        ) -> Result<ValidatorOutcome> {
            Ok(ValidatorOutcome::succeeded())
        }
    }

    fn registry(names: &[&str]) -> Arc<ValidatorRegistry> {
        let mut builder = ValidatorRegistry::builder();
        for name in names {
            builder = builder.register(
                ValidatorConfig {
                    name: name.to_string(),
                    deadline_secs: 3600,
                    requires: vec![],
                    required: true,
                },
                Arc::new(NoopValidator),
            );
        }
        Arc::new(builder.build().unwrap())
    }

    fn package(status: PackageStatus) -> PackageRecord {
        let now = Utc::now();
        PackageRecord {
            package_key: "pkg/1.0.0".to_string(),
            package_id: "pkg".to_string(),
            normalized_version: "1.0.0".to_string(),
            status,
            stream_metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        artifacts: Arc<MemoryArtifactStore>,
        telemetry: Arc<RecordingTelemetry>,
        provider: ValidationSetProvider,
    }

    fn fixture(names: &[&str]) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let telemetry = Arc::new(RecordingTelemetry::new());
        let provider = ValidationSetProvider::new(
            store.clone(),
            artifacts.clone(),
            registry(names),
            telemetry.clone(),
        );
        Fixture {
            store,
            artifacts,
            telemetry,
            provider,
        }
    }

    #[tokio::test]
    async fn test_creates_seeded_set_on_first_sight() {
        let f = fixture(&["scan", "sign"]);
        let tracking_id = Uuid::new_v4();

        let resolved = f
            .provider
            .get_or_create(tracking_id, &package(PackageStatus::Validating))
            .await
            .unwrap();

        let ResolvedSet::Active(set) = resolved else {
            panic!("expected active set");
        };
        assert_eq!(set.tracking_id, tracking_id);
        assert_eq!(set.runs.len(), 2);
        assert_eq!(set.runs[0].validator_name, "scan");
        assert_eq!(set.runs[1].validator_name, "sign");
        assert!(set
            .runs
            .iter()
            .all(|r| r.status == ValidationStatus::NotStarted));
        assert!(set.validating_token.is_none());
        assert_eq!(set.created_at, set.updated_at);

        assert!(f
            .telemetry
            .events()
            .contains(&TelemetryEvent::SetCreated { tracking_id }));
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let f = fixture(&["scan"]);
        let tracking_id = Uuid::new_v4();
        let pkg = package(PackageStatus::Validating);

        let first = f.provider.get_or_create(tracking_id, &pkg).await.unwrap();
        let second = f.provider.get_or_create(tracking_id, &pkg).await.unwrap();

        let (ResolvedSet::Active(a), ResolvedSet::Active(b)) = (first, second) else {
            panic!("expected active sets");
        };
        assert_eq!(a.tracking_id, b.tracking_id);
        assert_eq!(a.created_at, b.created_at);
        assert_eq!(a.runs.len(), b.runs.len());
        assert_eq!(f.store.count_validation_sets("pkg", "1.0.0").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mismatched_package_is_fatal() {
        let f = fixture(&["scan"]);
        let tracking_id = Uuid::new_v4();
        f.provider
            .get_or_create(tracking_id, &package(PackageStatus::Validating))
            .await
            .unwrap();

        let mut other = package(PackageStatus::Validating);
        other.package_id = "other".to_string();
        other.package_key = "other/1.0.0".to_string();

        let err = f
            .provider
            .get_or_create(tracking_id, &other)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "TRACKING_ID_MISMATCH");
    }

    #[tokio::test]
    async fn test_fully_processed_set_reports_duplicate() {
        let f = fixture(&["scan"]);
        let tracking_id = Uuid::new_v4();
        let pkg = package(PackageStatus::Validating);
        f.provider.get_or_create(tracking_id, &pkg).await.unwrap();

        // Required run terminal + package out of Validating.
        let mut run = ValidatorRun::seeded("scan", Utc::now());
        run.status = ValidationStatus::Succeeded;
        f.store.update_validator_run(tracking_id, &run).await.unwrap();

        let resolved = f
            .provider
            .get_or_create(tracking_id, &package(PackageStatus::Available))
            .await
            .unwrap();
        assert!(matches!(resolved, ResolvedSet::Duplicate));
    }

    #[tokio::test]
    async fn test_terminal_runs_while_still_validating_stay_active() {
        let f = fixture(&["scan"]);
        let tracking_id = Uuid::new_v4();
        let pkg = package(PackageStatus::Validating);
        f.provider.get_or_create(tracking_id, &pkg).await.unwrap();

        let mut run = ValidatorRun::seeded("scan", Utc::now());
        run.status = ValidationStatus::Succeeded;
        f.store.update_validator_run(tracking_id, &run).await.unwrap();

        // Package still Validating: the publish step has not happened, so
        // a redelivery must re-drive evaluation.
        let resolved = f.provider.get_or_create(tracking_id, &pkg).await.unwrap();
        assert!(matches!(resolved, ResolvedSet::Active(_)));
    }

    #[tokio::test]
    async fn test_revalidation_captures_public_artifact_token() {
        let f = fixture(&["scan"]);
        f.artifacts.put("packages/pkg.1.0.0.pkg", b"public bytes".to_vec());
        let expected = f
            .artifacts
            .etag("packages/pkg.1.0.0.pkg")
            .await
            .unwrap()
            .unwrap();

        let resolved = f
            .provider
            .get_or_create(Uuid::new_v4(), &package(PackageStatus::FailedValidation))
            .await
            .unwrap();
        let ResolvedSet::Active(set) = resolved else {
            panic!("expected active set");
        };
        assert_eq!(set.validating_token, Some(expected));
    }
}
