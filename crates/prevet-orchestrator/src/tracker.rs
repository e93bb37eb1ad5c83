// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-validator-per-request status tracking.
//!
//! Wraps run persistence and guards against silently re-validating a
//! package that a *different* request already validated: a prior request's
//! terminal success can be adopted explicitly, with the adoption logged and
//! surfaced through telemetry.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use prevet_core::error::Result;
use prevet_core::persistence::ValidationStore;
use prevet_core::validation_set::{ValidationIssue, ValidationSet, ValidationStatus, ValidatorRun};

use crate::telemetry::TelemetrySink;

/// Terminal result of the same validator from an earlier tracking id.
#[derive(Debug, Clone)]
pub struct PriorResult {
    /// The tracking id that produced the result.
    pub tracking_id: Uuid,
    /// The terminal run.
    pub run: ValidatorRun,
}

/// Persists validator run updates and exposes the cross-request guard.
pub struct ValidatorStatusTracker {
    store: Arc<dyn ValidationStore>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ValidatorStatusTracker {
    /// Create a tracker over the record store.
    pub fn new(store: Arc<dyn ValidationStore>, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self { store, telemetry }
    }

    /// Record a new status (and issues, when terminal) for one run, both in
    /// the store and on the in-memory set.
    pub async fn record(
        &self,
        set: &mut ValidationSet,
        validator_name: &str,
        status: ValidationStatus,
        issues: Vec<ValidationIssue>,
    ) -> Result<()> {
        let now = Utc::now();
        let tracking_id = set.tracking_id;
        let run = set.run_mut(validator_name).ok_or_else(|| {
            prevet_core::CoreError::ValidatorNotRegistered {
                validator: validator_name.to_string(),
            }
        })?;

        run.status = status;
        // Issues are attached only to terminal results.
        run.issues = if status.is_terminal() { issues } else { Vec::new() };
        run.updated_at = now;

        let snapshot = run.clone();
        set.updated_at = now;

        debug!(
            %tracking_id,
            validator = validator_name,
            status = status.as_str(),
            "Recording validator status"
        );
        self.store.update_validator_run(tracking_id, &snapshot).await
    }

    /// Look for a terminal `Succeeded` result for this package + validator
    /// produced by a different tracking id.
    ///
    /// Failed prior runs are never offered for adoption: a new attempt must
    /// run the validator again.
    pub async fn prior_success(
        &self,
        set: &ValidationSet,
        validator_name: &str,
    ) -> Result<Option<PriorResult>> {
        let found = self
            .store
            .latest_terminal_run(
                &set.package_id,
                &set.normalized_version,
                validator_name,
                set.tracking_id,
            )
            .await?;

        Ok(found.and_then(|(tracking_id, run)| {
            (run.status == ValidationStatus::Succeeded).then_some(PriorResult { tracking_id, run })
        }))
    }

    /// Record an adopted prior success on this set's run.
    pub async fn adopt(
        &self,
        set: &mut ValidationSet,
        validator_name: &str,
        prior: PriorResult,
    ) -> Result<()> {
        self.telemetry
            .validator_result_adopted(set.tracking_id, prior.tracking_id, validator_name);
        self.record(
            set,
            validator_name,
            ValidationStatus::Succeeded,
            prior.run.issues,
        )
        .await
    }
}
