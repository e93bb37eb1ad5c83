// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Telemetry sink for orchestration events.
//!
//! Fire-and-forget: every method is infallible and must never affect the
//! operation it describes. The default sink emits structured tracing
//! events; tests swap in a recording sink.

use prevet_core::package::PackageStatus;
use tracing::{info, warn};
use uuid::Uuid;

/// Observability side-channel consumed by the orchestrator.
pub trait TelemetrySink: Send + Sync {
    /// The entity's public status changed. Emitted only when the target
    /// status differs from the current one.
    fn package_status_change(
        &self,
        package_id: &str,
        normalized_version: &str,
        from: PackageStatus,
        to: PackageStatus,
    );

    /// An available package has no public bytes. Data-integrity signal,
    /// not an operational failure.
    fn missing_public_artifact(&self, package_id: &str, normalized_version: &str);

    /// A fail-if-exists copy conflicted but the destination was already in
    /// place; the conflict was swallowed as an idempotent retry.
    fn benign_copy_conflict(&self, package_id: &str, normalized_version: &str, path: &str);

    /// A validator's deadline elapsed before it reached a terminal status.
    fn validator_timed_out(&self, tracking_id: Uuid, validator: &str);

    /// A run adopted the terminal result of an earlier tracking id instead
    /// of re-running the validator.
    fn validator_result_adopted(&self, tracking_id: Uuid, from_tracking_id: Uuid, validator: &str);

    /// A new validation set was created.
    fn validation_set_created(&self, tracking_id: Uuid, package_id: &str, version: &str);

    /// A redelivery of fully processed work was dropped.
    fn duplicate_validation_request(&self, tracking_id: Uuid);

    /// A message for a package absent from the gallery exhausted its retry
    /// budget and was dropped.
    fn missing_package_dropped(&self, package_id: &str, version: &str, delivery_count: u32);

    /// A set's outcome was evaluated, with the two derived success flags.
    /// These flags drive metrics, never control flow.
    fn set_outcome_evaluated(
        &self,
        tracking_id: Uuid,
        outcome: &str,
        any_validator_succeeded: bool,
        any_required_validator_succeeded: bool,
    );
}

/// Default sink: structured tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn package_status_change(
        &self,
        package_id: &str,
        normalized_version: &str,
        from: PackageStatus,
        to: PackageStatus,
    ) {
        info!(
            package_id,
            normalized_version,
            from = from.as_str(),
            to = to.as_str(),
            "Package status changed"
        );
    }

    fn missing_public_artifact(&self, package_id: &str, normalized_version: &str) {
        warn!(
            package_id,
            normalized_version, "Available package has no public artifact"
        );
    }

    fn benign_copy_conflict(&self, package_id: &str, normalized_version: &str, path: &str) {
        info!(
            package_id,
            normalized_version, path, "Copy conflict swallowed, destination already in place"
        );
    }

    fn validator_timed_out(&self, tracking_id: Uuid, validator: &str) {
        warn!(%tracking_id, validator, "Validator deadline elapsed");
    }

    fn validator_result_adopted(&self, tracking_id: Uuid, from_tracking_id: Uuid, validator: &str) {
        info!(
            %tracking_id,
            %from_tracking_id,
            validator,
            "Adopted validator result from earlier validation"
        );
    }

    fn validation_set_created(&self, tracking_id: Uuid, package_id: &str, version: &str) {
        info!(%tracking_id, package_id, version, "Validation set created");
    }

    fn duplicate_validation_request(&self, tracking_id: Uuid) {
        info!(%tracking_id, "Duplicate validation request dropped");
    }

    fn missing_package_dropped(&self, package_id: &str, version: &str, delivery_count: u32) {
        warn!(
            package_id,
            version, delivery_count, "Dropping message for package missing from gallery"
        );
    }

    fn set_outcome_evaluated(
        &self,
        tracking_id: Uuid,
        outcome: &str,
        any_validator_succeeded: bool,
        any_required_validator_succeeded: bool,
    ) {
        info!(
            %tracking_id,
            outcome,
            any_validator_succeeded,
            any_required_validator_succeeded,
            "Validation set outcome evaluated"
        );
    }
}

pub mod recording {
    //! Recording sink for assertions in unit and integration tests.

    use std::sync::Mutex;

    use super::*;

    /// One recorded telemetry event.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum TelemetryEvent {
        StatusChange {
            package_id: String,
            from: PackageStatus,
            to: PackageStatus,
        },
        MissingPublicArtifact {
            package_id: String,
        },
        BenignCopyConflict {
            path: String,
        },
        ValidatorTimedOut {
            validator: String,
        },
        ValidatorResultAdopted {
            validator: String,
            from_tracking_id: Uuid,
        },
        SetCreated {
            tracking_id: Uuid,
        },
        DuplicateRequest {
            tracking_id: Uuid,
        },
        MissingPackageDropped {
            package_id: String,
            delivery_count: u32,
        },
        OutcomeEvaluated {
            outcome: String,
            any_succeeded: bool,
            any_required_succeeded: bool,
        },
    }

    /// Sink that records every event for later inspection.
    #[derive(Default)]
    pub struct RecordingTelemetry {
        events: Mutex<Vec<TelemetryEvent>>,
    }

    impl RecordingTelemetry {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<TelemetryEvent> {
            self.events.lock().expect("telemetry event lock poisoned").clone()
        }

        pub fn status_changes(&self) -> Vec<TelemetryEvent> {
            self.events()
                .into_iter()
                .filter(|e| matches!(e, TelemetryEvent::StatusChange { .. }))
                .collect()
        }

        fn push(&self, event: TelemetryEvent) {
            self.events
                .lock()
                .expect("telemetry event lock poisoned")
                .push(event);
        }
    }

    impl TelemetrySink for RecordingTelemetry {
        fn package_status_change(
            &self,
            package_id: &str,
            _normalized_version: &str,
            from: PackageStatus,
            to: PackageStatus,
        ) {
            self.push(TelemetryEvent::StatusChange {
                package_id: package_id.to_string(),
                from,
                to,
            });
        }

        fn missing_public_artifact(&self, package_id: &str, _normalized_version: &str) {
            self.push(TelemetryEvent::MissingPublicArtifact {
                package_id: package_id.to_string(),
            });
        }

        fn benign_copy_conflict(&self, _package_id: &str, _normalized_version: &str, path: &str) {
            self.push(TelemetryEvent::BenignCopyConflict {
                path: path.to_string(),
            });
        }

        fn validator_timed_out(&self, _tracking_id: Uuid, validator: &str) {
            self.push(TelemetryEvent::ValidatorTimedOut {
                validator: validator.to_string(),
            });
        }

        fn validator_result_adopted(
            &self,
            _tracking_id: Uuid,
            from_tracking_id: Uuid,
            validator: &str,
        ) {
            self.push(TelemetryEvent::ValidatorResultAdopted {
                validator: validator.to_string(),
                from_tracking_id,
            });
        }

        fn validation_set_created(&self, tracking_id: Uuid, _package_id: &str, _version: &str) {
            self.push(TelemetryEvent::SetCreated { tracking_id });
        }

        fn duplicate_validation_request(&self, tracking_id: Uuid) {
            self.push(TelemetryEvent::DuplicateRequest { tracking_id });
        }

        fn missing_package_dropped(&self, package_id: &str, _version: &str, delivery_count: u32) {
            self.push(TelemetryEvent::MissingPackageDropped {
                package_id: package_id.to_string(),
                delivery_count,
            });
        }

        fn set_outcome_evaluated(
            &self,
            _tracking_id: Uuid,
            outcome: &str,
            any_validator_succeeded: bool,
            any_required_validator_succeeded: bool,
        ) {
            self.push(TelemetryEvent::OutcomeEvaluated {
                outcome: outcome.to_string(),
                any_succeeded: any_validator_succeeded,
                any_required_succeeded: any_required_validator_succeeded,
            });
        }
    }
}
