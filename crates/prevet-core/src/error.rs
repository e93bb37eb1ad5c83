// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for prevet.
//!
//! Provides a unified error type shared by the record store, the artifact
//! store, and the orchestration layer built on top of them.

use std::fmt;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur while driving a validation set.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// A validation set with this tracking id already exists.
    ValidationSetAlreadyExists {
        /// The tracking id that collided on creation.
        tracking_id: String,
    },

    /// A tracking id resolved to a set for a different package.
    ///
    /// This indicates broker or caller corruption and is never retried.
    TrackingIdMismatch {
        /// The tracking id that was looked up.
        tracking_id: String,
        /// Package identity recorded on the stored set.
        expected: String,
        /// Package identity supplied with the request.
        actual: String,
    },

    /// The requested package status transition is not allowed.
    InvalidStatusTransition {
        /// The entity's current status.
        current: String,
        /// The requested target status.
        target: String,
    },

    /// A conditional artifact copy was rejected by the store.
    ArtifactConflict {
        /// Destination path of the rejected copy.
        path: String,
        /// The condition that did not hold.
        condition: String,
    },

    /// An artifact required by the operation does not exist.
    ArtifactNotFound {
        /// The path that was read or copied from.
        path: String,
    },

    /// Artifact store I/O failed.
    ArtifactIo {
        /// The path involved in the failed operation.
        path: String,
        /// Error details.
        details: String,
    },

    /// A validator name has no registered implementation or configuration.
    ValidatorNotRegistered {
        /// The unknown validator name.
        validator: String,
    },

    /// Validator topology or runtime configuration is invalid.
    ConfigurationError {
        /// Description of the problem.
        message: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationSetAlreadyExists { .. } => "VALIDATION_SET_ALREADY_EXISTS",
            Self::TrackingIdMismatch { .. } => "TRACKING_ID_MISMATCH",
            Self::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::ArtifactConflict { .. } => "ARTIFACT_CONFLICT",
            Self::ArtifactNotFound { .. } => "ARTIFACT_NOT_FOUND",
            Self::ArtifactIo { .. } => "ARTIFACT_IO",
            Self::ValidatorNotRegistered { .. } => "VALIDATOR_NOT_REGISTERED",
            Self::ConfigurationError { .. } => "CONFIGURATION_ERROR",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }

    /// Whether this error is a conditional-write rejection.
    ///
    /// The publish protocol treats conflicts differently per copy path, so
    /// callers need to tell them apart from other storage failures.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ArtifactConflict { .. })
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationSetAlreadyExists { tracking_id } => {
                write!(f, "Validation set '{}' already exists", tracking_id)
            }
            Self::TrackingIdMismatch {
                tracking_id,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Tracking id '{}' belongs to package '{}', got '{}'",
                    tracking_id, expected, actual
                )
            }
            Self::InvalidStatusTransition { current, target } => {
                write!(
                    f,
                    "Package status transition '{}' -> '{}' is not allowed",
                    current, target
                )
            }
            Self::ArtifactConflict { path, condition } => {
                write!(
                    f,
                    "Conditional copy to '{}' rejected: {} did not hold",
                    path, condition
                )
            }
            Self::ArtifactNotFound { path } => {
                write!(f, "Artifact '{}' not found", path)
            }
            Self::ArtifactIo { path, details } => {
                write!(f, "Artifact store I/O failed for '{}': {}", path, details)
            }
            Self::ValidatorNotRegistered { validator } => {
                write!(f, "Validator '{}' is not registered", validator)
            }
            Self::ConfigurationError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}
