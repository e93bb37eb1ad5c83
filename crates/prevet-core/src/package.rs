// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Target entity model: package records, public status, stream metadata.
//!
//! The package row is owned by the gallery subsystem; this core writes only
//! the `status` field and the stream metadata, and only along the allowed
//! transitions checked by [`PackageStatus::validate_transition`].

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// Hash algorithm recorded with stream metadata.
pub const STREAM_HASH_ALGORITHM: &str = "SHA256";

/// Public status of a package entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageStatus {
    /// Upload accepted, validation in progress; not publicly downloadable.
    Validating,
    /// Validated and publicly downloadable.
    Available,
    /// At least one required validator rejected the package.
    FailedValidation,
    /// Soft-deleted; terminal for this core.
    Deleted,
}

impl PackageStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Available => "available",
            Self::FailedValidation => "failed_validation",
            Self::Deleted => "deleted",
        }
    }

    /// Parse a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "validating" => Some(Self::Validating),
            "available" => Some(Self::Available),
            "failed_validation" => Some(Self::FailedValidation),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Check that a transition from `self` to `target` is allowed.
    ///
    /// Allowed: `Validating -> {Available, FailedValidation}`,
    /// `FailedValidation -> Available` (revalidation may later succeed), and
    /// self-transitions for the two reachable targets. Everything else is an
    /// immediate [`CoreError::InvalidStatusTransition`]: targets outside
    /// `{Available, FailedValidation}`, any transition out of `Deleted`, and
    /// `Available -> FailedValidation`.
    pub fn validate_transition(self, target: PackageStatus) -> Result<(), CoreError> {
        let allowed = match target {
            PackageStatus::Available => !matches!(self, PackageStatus::Deleted),
            PackageStatus::FailedValidation => {
                matches!(self, PackageStatus::Validating | PackageStatus::FailedValidation)
            }
            PackageStatus::Validating | PackageStatus::Deleted => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(CoreError::InvalidStatusTransition {
                current: self.as_str().to_string(),
                target: target.as_str().to_string(),
            })
        }
    }
}

/// Size, hash, and hash algorithm of the public artifact bytes.
///
/// Recorded on the entity once the bytes are known good, and refreshed by
/// the publish protocol only when the freshly copied bytes differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Size of the artifact in bytes.
    pub size: u64,
    /// Base64-encoded hash of the artifact bytes.
    pub hash: String,
    /// Algorithm used to produce `hash`.
    pub hash_algorithm: String,
}

impl StreamMetadata {
    /// Compute metadata for a byte stream using the standard algorithm.
    pub fn compute(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self {
            size: bytes.len() as u64,
            hash: BASE64.encode(digest),
            hash_algorithm: STREAM_HASH_ALGORITHM.to_string(),
        }
    }
}

/// Package entity record as seen through the gallery store interface.
#[derive(Debug, Clone)]
pub struct PackageRecord {
    /// Storage key for the entity row (`{id}/{version}`, lowercased).
    pub package_key: String,
    /// Package identifier.
    pub package_id: String,
    /// Normalized package version.
    pub normalized_version: String,
    /// Current public status.
    pub status: PackageStatus,
    /// Stream metadata, present once bytes were validated at least once.
    pub stream_metadata: Option<StreamMetadata>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When this core last touched the row.
    pub updated_at: DateTime<Utc>,
}

impl PackageRecord {
    /// Build the entity storage key for a package identity.
    pub fn key_for(package_id: &str, normalized_version: &str) -> String {
        format!(
            "{}/{}",
            package_id.to_lowercase(),
            normalized_version.to_lowercase()
        )
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
    fn test_status_roundtrip() {
        for status in [
            PackageStatus::Validating,
            PackageStatus::Available,
            PackageStatus::FailedValidation,
            PackageStatus::Deleted,
        ] {
            let s = status.as_str();
            assert_eq!(PackageStatus::parse(s), Some(status));
        }
        assert_eq!(PackageStatus::parse("unknown"), None);
    }

    #[test]
    fn test_allowed_transitions() {
        assert!(
            PackageStatus::Validating
                .validate_transition(PackageStatus::Available)
                .is_ok()
        );
        assert!(
            PackageStatus::Validating
                .validate_transition(PackageStatus::FailedValidation)
                .is_ok()
        );
        assert!(
            PackageStatus::FailedValidation
                .validate_transition(PackageStatus::Available)
                .is_ok()
        );
        // Self-transitions are allowed; the caller skips telemetry for them.
        assert!(
            PackageStatus::Available
                .validate_transition(PackageStatus::Available)
                .is_ok()
        );
        assert!(
            PackageStatus::FailedValidation
                .validate_transition(PackageStatus::FailedValidation)
                .is_ok()
        );
    }

    #[test]
    fn test_rejected_transitions() {
        // Available never regresses to FailedValidation.
        assert!(
            PackageStatus::Available
                .validate_transition(PackageStatus::FailedValidation)
                .is_err()
        );

        // Deleted is terminal.
        for target in [
            PackageStatus::Validating,
            PackageStatus::Available,
            PackageStatus::FailedValidation,
            PackageStatus::Deleted,
        ] {
            assert!(
                PackageStatus::Deleted.validate_transition(target).is_err(),
                "Deleted -> {:?} must be rejected",
                target
            );
        }

        // Targets outside {Available, FailedValidation} are never reachable.
        for current in [
            PackageStatus::Validating,
            PackageStatus::Available,
            PackageStatus::FailedValidation,
        ] {
            assert!(current.validate_transition(PackageStatus::Validating).is_err());
            assert!(current.validate_transition(PackageStatus::Deleted).is_err());
        }
    }

    #[test]
    fn test_rejected_transition_error_shape() {
        let err = PackageStatus::Available
            .validate_transition(PackageStatus::FailedValidation)
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATUS_TRANSITION");
        assert!(err.to_string().contains("available"));
        assert!(err.to_string().contains("failed_validation"));
    }

    #[test]
    fn test_stream_metadata_compute() {
        let meta = StreamMetadata::compute(b"package bytes");
        assert_eq!(meta.size, 13);
        assert_eq!(meta.hash_algorithm, "SHA256");
        // Deterministic for the same bytes, different for different bytes.
        assert_eq!(meta, StreamMetadata::compute(b"package bytes"));
        assert_ne!(meta, StreamMetadata::compute(b"other bytes"));
    }

    #[test]
    fn test_package_key_is_lowercased() {
        assert_eq!(
            PackageRecord::key_for("Newtonsoft.Json", "13.0.1-Beta"),
            "newtonsoft.json/13.0.1-beta"
        );
    }
}
