// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message-level orchestration: one delivery, end to end.
//!
//! Every step is idempotent, so a crash anywhere leaves the message
//! redeliverable and the next delivery picks up where this one stopped.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use prevet_core::error::Result;
use prevet_core::package::PackageStatus;
use prevet_core::persistence::ValidationStore;
use prevet_core::validation_set::ValidationRequest;

use crate::coordinator::ValidatorExecutionCoordinator;
use crate::outcome::{OutcomeEvaluator, ValidationSetOutcome};
use crate::provider::{ResolvedSet, ValidationSetProvider};
use crate::status::PackageStatusProcessor;
use crate::telemetry::TelemetrySink;

/// What the pump should do with the delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Done with this message; drop it.
    Ack,
    /// Not done; the broker should redeliver it.
    Nack,
}

/// Per-message handler wiring the orchestration components together.
pub struct ValidationMessageHandler {
    store: Arc<dyn ValidationStore>,
    provider: ValidationSetProvider,
    coordinator: ValidatorExecutionCoordinator,
    evaluator: OutcomeEvaluator,
    status: PackageStatusProcessor,
    telemetry: Arc<dyn TelemetrySink>,
    missing_package_retry_limit: u32,
}

impl ValidationMessageHandler {
    /// Wire a handler from its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ValidationStore>,
        provider: ValidationSetProvider,
        coordinator: ValidatorExecutionCoordinator,
        evaluator: OutcomeEvaluator,
        status: PackageStatusProcessor,
        telemetry: Arc<dyn TelemetrySink>,
        missing_package_retry_limit: u32,
    ) -> Self {
        Self {
            store,
            provider,
            coordinator,
            evaluator,
            status,
            telemetry,
            missing_package_retry_limit,
        }
    }

    /// Process one delivery.
    ///
    /// `Ok(Ack)` completes the message. `Ok(Nack)` and `Err` both leave it
    /// for redelivery; the pump logs the error before nacking.
    #[instrument(
        skip(self, request),
        fields(
            tracking_id = %request.tracking_id,
            package_id = %request.package_id,
            version = %request.package_version,
            delivery_count = request.delivery_count,
        )
    )]
    pub async fn handle(&self, request: &ValidationRequest) -> Result<Disposition> {
        // 1. Gallery lookup. The gallery row may lag behind the message.
        let Some(package) = self
            .store
            .find_package(&request.package_id, &request.package_version)
            .await?
        else {
            return Ok(self.missing_package_disposition(request));
        };

        // 2. Resolve the validation set, creating it on first sight.
        let mut set = match self
            .provider
            .get_or_create(request.tracking_id, &package)
            .await?
        {
            ResolvedSet::Active(set) => set,
            ResolvedSet::Duplicate => {
                info!("Validation already fully processed, dropping redelivery");
                self.telemetry.duplicate_validation_request(request.tracking_id);
                return Ok(Disposition::Ack);
            }
        };

        // 3. Drive pending validators, then fold their statuses.
        self.coordinator.process(&package, &mut set).await?;
        let summary = self.evaluator.evaluate(&set);
        self.telemetry.set_outcome_evaluated(
            set.tracking_id,
            summary.outcome.as_str(),
            summary.any_validator_succeeded,
            summary.any_required_validator_succeeded,
        );

        // 4. Apply a terminal outcome. In-progress sets wait for the next
        // delivery or deadline expiry.
        match summary.outcome {
            ValidationSetOutcome::Accepted => {
                self.status
                    .set_status(&package, &set, PackageStatus::Available)
                    .await?;
            }
            ValidationSetOutcome::Rejected => {
                self.status
                    .set_status(&package, &set, PackageStatus::FailedValidation)
                    .await?;
            }
            ValidationSetOutcome::InProgress => {
                info!("Validation set still in progress");
            }
        }

        Ok(Disposition::Ack)
    }

    /// Absent package: retry a bounded number of times, then drop.
    fn missing_package_disposition(&self, request: &ValidationRequest) -> Disposition {
        let retries_so_far = request.delivery_count.saturating_sub(1);
        if retries_so_far >= self.missing_package_retry_limit {
            warn!("Package not found after retry limit, dropping message");
            self.telemetry.missing_package_dropped(
                &request.package_id,
                &request.package_version,
                request.delivery_count,
            );
            Disposition::Ack
        } else {
            info!("Package not found yet, leaving message for redelivery");
            Disposition::Nack
        }
    }
}

/// Build a fully wired handler over shared components.
///
/// Convenience for the runtime and tests; embedders composing custom
/// handlers can wire the pieces directly.
pub fn wire_handler(
    store: Arc<dyn ValidationStore>,
    artifacts: Arc<dyn prevet_core::artifacts::ArtifactStore>,
    registry: Arc<crate::registry::ValidatorRegistry>,
    telemetry: Arc<dyn TelemetrySink>,
    missing_package_retry_limit: u32,
) -> ValidationMessageHandler {
    let tracker = Arc::new(crate::tracker::ValidatorStatusTracker::new(
        store.clone(),
        telemetry.clone(),
    ));
    let provider = ValidationSetProvider::new(
        store.clone(),
        artifacts.clone(),
        registry.clone(),
        telemetry.clone(),
    );
    let coordinator =
        ValidatorExecutionCoordinator::new(registry.clone(), tracker, telemetry.clone());
    let evaluator = OutcomeEvaluator::new(registry.clone());
    let status = PackageStatusProcessor::new(
        store.clone(),
        artifacts,
        registry,
        telemetry.clone(),
    );
    ValidationMessageHandler::new(
        store,
        provider,
        coordinator,
        evaluator,
        status,
        telemetry,
        missing_package_retry_limit,
    )
}
