// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Folds validator statuses into one validation-set outcome.

use std::sync::Arc;

use prevet_core::validation_set::{ValidationSet, ValidationStatus};

use crate::registry::ValidatorRegistry;

/// Terminal or in-progress outcome of a validation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSetOutcome {
    /// At least one required validator has no terminal result yet.
    InProgress,
    /// Every required validator succeeded. Best-effort validators do not
    /// block acceptance.
    Accepted,
    /// At least one required validator failed.
    Rejected,
}

impl ValidationSetOutcome {
    /// Short name for telemetry and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

/// Outcome plus the derived observability flags.
///
/// The flags drive metrics only, never control flow.
#[derive(Debug, Clone, Copy)]
pub struct OutcomeSummary {
    /// The folded outcome.
    pub outcome: ValidationSetOutcome,
    /// Whether any validator (required or best-effort) succeeded.
    pub any_validator_succeeded: bool,
    /// Whether any required validator succeeded.
    pub any_required_validator_succeeded: bool,
}

/// Computes validation-set outcomes from run statuses.
pub struct OutcomeEvaluator {
    registry: Arc<ValidatorRegistry>,
}

impl OutcomeEvaluator {
    /// Create an evaluator over the validator topology.
    pub fn new(registry: Arc<ValidatorRegistry>) -> Self {
        Self { registry }
    }

    /// Fold all run statuses into one outcome.
    pub fn evaluate(&self, set: &ValidationSet) -> OutcomeSummary {
        let mut any_validator_succeeded = false;
        let mut any_required_validator_succeeded = false;
        let mut any_required_failed = false;
        let mut any_required_pending = false;

        for run in &set.runs {
            let required = self.registry.is_required(&run.validator_name);
            match run.status {
                ValidationStatus::Succeeded => {
                    any_validator_succeeded = true;
                    if required {
                        any_required_validator_succeeded = true;
                    }
                }
                ValidationStatus::Failed => {
                    if required {
                        any_required_failed = true;
                    }
                }
                ValidationStatus::NotStarted | ValidationStatus::Incomplete => {
                    if required {
                        any_required_pending = true;
                    }
                }
            }
        }

        let outcome = if any_required_failed {
            ValidationSetOutcome::Rejected
        } else if any_required_pending {
            ValidationSetOutcome::InProgress
        } else {
            ValidationSetOutcome::Accepted
        };

        OutcomeSummary {
            outcome,
            any_validator_succeeded,
            any_required_validator_succeeded,
        }
    }
}
