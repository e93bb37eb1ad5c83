// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Artifact store abstraction with conditional copy semantics.
//!
//! The publish protocol relies entirely on the store's conditional-write
//! behavior to arbitrate races between concurrent attempts: no in-process
//! lock is held across attempts. A rejected condition surfaces as the typed
//! [`CoreError::ArtifactConflict`] so callers can branch on it via
//! [`CoreError::is_conflict`].

pub mod fs;
pub mod memory;

pub use self::fs::FsArtifactStore;
pub use self::memory::MemoryArtifactStore;

use async_trait::async_trait;

use crate::error::{CoreError, Result};

/// Precondition for a conditional copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyCondition {
    /// Unconditional overwrite.
    None,
    /// Fail with a conflict if the destination already exists.
    FailIfExists,
    /// Fail with a conflict unless the destination's current concurrency
    /// token exactly matches. A missing destination is also a conflict:
    /// the token was captured from bytes that no longer exist.
    IfMatches(String),
}

impl CopyCondition {
    /// Short name used in conflict errors and logs.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::FailIfExists => "fail-if-exists",
            Self::IfMatches(_) => "if-matches",
        }
    }
}

/// Object storage interface used by the orchestrator.
///
/// Implementations must make `copy` atomic with respect to its condition
/// check, and `delete` idempotent (deleting a missing path is not an error).
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Copy `src` to `dst` if `condition` holds.
    ///
    /// Returns [`CoreError::ArtifactNotFound`] if `src` is missing and
    /// [`CoreError::ArtifactConflict`] if the condition is rejected.
    async fn copy(&self, src: &str, dst: &str, condition: CopyCondition) -> Result<()>;

    /// Delete `path`. Missing paths are Ok.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Read the full contents of `path`.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Whether `path` currently exists.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Current concurrency token of `path`, or None if it does not exist.
    async fn etag(&self, path: &str) -> Result<Option<String>>;
}

/// Build the conflict error for a rejected condition.
pub(crate) fn conflict(dst: &str, condition: &CopyCondition) -> CoreError {
    CoreError::ArtifactConflict {
        path: dst.to_string(),
        condition: condition.describe().to_string(),
    }
}
