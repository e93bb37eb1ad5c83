// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Validation set model: one tracked attempt to validate a package version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound validation request delivered by the message broker.
///
/// Ephemeral; never persisted by this core. The broker owns redelivery and
/// supplies `delivery_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    /// Package identifier.
    pub package_id: String,
    /// Package version as supplied by the caller.
    pub package_version: String,
    /// Opaque unique id for one validation attempt.
    pub tracking_id: Uuid,
    /// 1-based delivery counter supplied by the broker.
    pub delivery_count: u32,
}

/// Status of a single validator within a validation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    /// Seeded at set creation; the validator has not been invoked yet.
    NotStarted,
    /// The validator was started and has not reported a terminal result.
    Incomplete,
    /// Terminal success.
    Succeeded,
    /// Terminal failure.
    Failed,
}

impl ValidationStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Incomplete => "incomplete",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Parse a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "incomplete" => Some(Self::Incomplete),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Structured issue attached to a terminal validator result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Machine-readable issue code.
    pub code: String,
    /// Opaque payload interpreted by the issue's consumer.
    pub data: serde_json::Value,
}

impl ValidationIssue {
    /// Build an issue with a code and payload.
    pub fn new(code: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code: code.into(),
            data,
        }
    }
}

/// Status record of one configured validator within a validation set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorRun {
    /// Validator name, unique within the set.
    pub validator_name: String,
    /// Current status.
    pub status: ValidationStatus,
    /// When this run was seeded.
    pub started_at: DateTime<Utc>,
    /// Issues attached when the run reached a terminal status.
    pub issues: Vec<ValidationIssue>,
    /// When the run was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ValidatorRun {
    /// Seed a run in `NotStarted` for a configured validator.
    pub fn seeded(validator_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            validator_name: validator_name.into(),
            status: ValidationStatus::NotStarted,
            started_at: now,
            issues: Vec::new(),
            updated_at: now,
        }
    }
}

/// Aggregate root for one validation attempt.
///
/// Created exactly once per tracking id, mutated by updating runs, never
/// deleted by this core.
#[derive(Debug, Clone)]
pub struct ValidationSet {
    /// Immutable key for this attempt.
    pub tracking_id: Uuid,
    /// Package identifier; must always match the target entity's.
    pub package_id: String,
    /// Normalized package version; must always match the target entity's.
    pub normalized_version: String,
    /// Storage key of the target entity.
    pub package_key: String,
    /// Concurrency token of the public artifact captured at set creation,
    /// when the artifact already existed (revalidation).
    pub validating_token: Option<String>,
    /// When the set was created (UTC). Validator deadlines are measured
    /// from this instant, so crash-and-resume does not reset the clock.
    pub created_at: DateTime<Utc>,
    /// When the set was last updated (UTC).
    pub updated_at: DateTime<Utc>,
    /// One run per configured validator, in configuration order.
    pub runs: Vec<ValidatorRun>,
}

impl ValidationSet {
    /// Look up a run by validator name.
    pub fn run(&self, validator_name: &str) -> Option<&ValidatorRun> {
        self.runs.iter().find(|r| r.validator_name == validator_name)
    }

    /// Mutable lookup of a run by validator name.
    pub fn run_mut(&mut self, validator_name: &str) -> Option<&mut ValidatorRun> {
        self.runs
            .iter_mut()
            .find(|r| r.validator_name == validator_name)
    }

    /// Human-readable `id version` pair for logs and mismatch errors.
    pub fn identity(&self) -> String {
        format!("{} {}", self.package_id, self.normalized_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_status_roundtrip() {
        for status in [
            ValidationStatus::NotStarted,
            ValidationStatus::Incomplete,
            ValidationStatus::Succeeded,
            ValidationStatus::Failed,
        ] {
            assert_eq!(ValidationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ValidationStatus::parse(""), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ValidationStatus::NotStarted.is_terminal());
        assert!(!ValidationStatus::Incomplete.is_terminal());
        assert!(ValidationStatus::Succeeded.is_terminal());
        assert!(ValidationStatus::Failed.is_terminal());
    }

    #[test]
    fn test_seeded_run() {
        let now = Utc::now();
        let run = ValidatorRun::seeded("scan", now);
        assert_eq!(run.validator_name, "scan");
        assert_eq!(run.status, ValidationStatus::NotStarted);
        assert!(run.issues.is_empty());
        assert_eq!(run.started_at, now);
    }

    #[test]
    fn test_run_lookup() {
        let now = Utc::now();
        let mut set = ValidationSet {
            tracking_id: Uuid::new_v4(),
            package_id: "pkg".to_string(),
            normalized_version: "1.0.0".to_string(),
            package_key: "pkg/1.0.0".to_string(),
            validating_token: None,
            created_at: now,
            updated_at: now,
            runs: vec![ValidatorRun::seeded("scan", now), ValidatorRun::seeded("sign", now)],
        };

        assert!(set.run("scan").is_some());
        assert!(set.run("missing").is_none());

        set.run_mut("sign").unwrap().status = ValidationStatus::Succeeded;
        assert_eq!(set.run("sign").unwrap().status, ValidationStatus::Succeeded);
    }

    #[test]
    fn test_issue_serialization() {
        let issue = ValidationIssue::new(
            "obsolete-testing-certificate",
            serde_json::json!({"thumbprint": "abc"}),
        );
        let json = serde_json::to_string(&issue).unwrap();
        let back: ValidationIssue = serde_json::from_str(&json).unwrap();
        assert_eq!(issue, back);
    }
}
