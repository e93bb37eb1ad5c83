// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storage key layout for package artifacts.
//!
//! Three locations per package file:
//!
//! | Location | Key | Lifetime |
//! |----------|-----|----------|
//! | Public | `packages/{file}` | Until deletion |
//! | Validation container | `validation/{file}` | Until publish housekeeping |
//! | Set-specific | `validation-sets/{tracking_id}/{file}` | Until garbage collection |
//!
//! The set-specific location is a per-tracking-id scratch area holding the
//! (possibly processor-mutated) bytes for that attempt only.

use uuid::Uuid;

/// Prefix for publicly downloadable artifacts.
pub const PUBLIC_PREFIX: &str = "packages";

/// Prefix for uploaded artifacts awaiting validation.
pub const VALIDATION_PREFIX: &str = "validation";

/// Prefix for per-attempt scratch copies.
pub const VALIDATION_SET_PREFIX: &str = "validation-sets";

/// Canonical artifact file name: `{id}.{version}.pkg`, lowercased.
pub fn artifact_file_name(package_id: &str, normalized_version: &str) -> String {
    format!(
        "{}.{}.pkg",
        package_id.to_lowercase(),
        normalized_version.to_lowercase()
    )
}

/// Public location of the package artifact.
pub fn public_path(package_id: &str, normalized_version: &str) -> String {
    format!(
        "{}/{}",
        PUBLIC_PREFIX,
        artifact_file_name(package_id, normalized_version)
    )
}

/// Validation-container location of the uploaded artifact.
pub fn validation_path(package_id: &str, normalized_version: &str) -> String {
    format!(
        "{}/{}",
        VALIDATION_PREFIX,
        artifact_file_name(package_id, normalized_version)
    )
}

/// Validation-set-specific scratch location for one attempt.
pub fn validation_set_path(
    tracking_id: Uuid,
    package_id: &str,
    normalized_version: &str,
) -> String {
    format!(
        "{}/{}/{}",
        VALIDATION_SET_PREFIX,
        tracking_id,
        artifact_file_name(package_id, normalized_version)
    )
}
