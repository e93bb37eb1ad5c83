// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Validator execution coordinator.
//!
//! Drives pending validator runs respecting declared prerequisites and
//! per-validator deadlines. The topology is small and static, so it is
//! re-evaluated on every message instead of being persisted as a DAG:
//! runs are walked in configuration order, repeatedly, until a full pass
//! makes no progress. Deadlines are measured from the validation set's
//! creation time, so a crash-and-resume does not reset the clock.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use prevet_core::error::Result;
use prevet_core::package::PackageRecord;
use prevet_core::validation_set::{ValidationIssue, ValidationSet, ValidationStatus};

use crate::registry::{ValidatorConfig, ValidatorRegistry};
use crate::telemetry::TelemetrySink;
use crate::tracker::ValidatorStatusTracker;

/// Issue code attached when a validator's deadline elapses.
pub const TIMEOUT_ISSUE_CODE: &str = "validator-timeout";

/// Runs pending validators for one validation set.
pub struct ValidatorExecutionCoordinator {
    registry: Arc<ValidatorRegistry>,
    tracker: Arc<ValidatorStatusTracker>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ValidatorExecutionCoordinator {
    /// Create a coordinator over the registry and tracker.
    pub fn new(
        registry: Arc<ValidatorRegistry>,
        tracker: Arc<ValidatorStatusTracker>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            registry,
            tracker,
            telemetry,
        }
    }

    /// Drive every non-terminal run that is currently eligible.
    ///
    /// Multiple passes in configuration order: a validator whose
    /// prerequisites succeed earlier in the same message runs in that same
    /// message. Each run is driven at most once per message; later passes
    /// only pick up runs previously skipped on unmet prerequisites.
    pub async fn process(&self, package: &PackageRecord, set: &mut ValidationSet) -> Result<()> {
        let names: Vec<String> = self
            .registry
            .configs()
            .map(|c| c.name.clone())
            .collect();
        let mut driven: HashSet<String> = HashSet::new();

        loop {
            let mut progressed = false;

            for name in &names {
                if driven.contains(name) {
                    continue;
                }
                let config = self.registry.config(name)?;
                let Some(run) = set.run(name) else {
                    // Topology grew since this set was seeded; new
                    // validators apply to future sets only.
                    driven.insert(name.clone());
                    continue;
                };
                if run.status.is_terminal() {
                    driven.insert(name.clone());
                    continue;
                }
                if !self.prerequisites_met(set, config) {
                    debug!(
                        tracking_id = %set.tracking_id,
                        validator = %name,
                        "Prerequisites not met, skipping"
                    );
                    continue;
                }

                driven.insert(name.clone());
                if self.drive_run(package, set, name).await? {
                    progressed = true;
                }
            }

            if !progressed {
                return Ok(());
            }
        }
    }

    fn prerequisites_met(&self, set: &ValidationSet, config: &ValidatorConfig) -> bool {
        config.requires.iter().all(|dep| {
            set.run(dep)
                .map(|r| r.status == ValidationStatus::Succeeded)
                .unwrap_or(false)
        })
    }

    /// Drive one eligible run. Returns true if it reached `Succeeded`,
    /// which is the only transition that can unblock dependents.
    async fn drive_run(
        &self,
        package: &PackageRecord,
        set: &mut ValidationSet,
        name: &str,
    ) -> Result<bool> {
        let config = self.registry.config(name)?.clone();
        let elapsed = (Utc::now() - set.created_at)
            .to_std()
            .unwrap_or_default();

        if elapsed >= config.deadline() {
            warn!(
                tracking_id = %set.tracking_id,
                validator = name,
                elapsed_secs = elapsed.as_secs(),
                deadline_secs = config.deadline_secs,
                "Validator deadline elapsed, failing without running"
            );
            self.telemetry.validator_timed_out(set.tracking_id, name);
            let issue = ValidationIssue::new(
                TIMEOUT_ISSUE_CODE,
                serde_json::json!({
                    "validator": name,
                    "deadline_secs": config.deadline_secs,
                }),
            );
            self.tracker
                .record(set, name, ValidationStatus::Failed, vec![issue])
                .await?;
            return Ok(false);
        }

        // A different request may already have validated this package;
        // adopt its success explicitly rather than re-running.
        if let Some(prior) = self.tracker.prior_success(set, name).await? {
            self.tracker.adopt(set, name, prior).await?;
            return Ok(true);
        }

        let validator = self.registry.validator(name)?.clone();
        let remaining = config.deadline() - elapsed;

        let outcome =
            match tokio::time::timeout(remaining, validator.validate(package, set)).await {
                Ok(result) => result?,
                Err(_) => {
                    // Invocation outlived the remaining deadline budget; a
                    // later delivery re-evaluates it (and fails it once the
                    // deadline itself has passed).
                    debug!(
                        tracking_id = %set.tracking_id,
                        validator = name,
                        "Validator invocation timed out, leaving incomplete"
                    );
                    crate::registry::ValidatorOutcome::incomplete()
                }
            };

        let succeeded = outcome.status == ValidationStatus::Succeeded;
        self.tracker
            .record(set, name, outcome.status, outcome.issues)
            .await?;
        Ok(succeeded)
    }
}
