// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Filesystem-backed artifact store.
//!
//! Keys map to paths under a root directory. Etags are derived from file
//! length and modification time. Condition checks are serialized through an
//! internal async mutex, so preconditions hold only against writers in this
//! process; multi-writer deployments need an object store with native
//! conditional writes behind the same trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{CoreError, Result};

use super::{ArtifactStore, CopyCondition, conflict};

/// [`ArtifactStore`] over a local directory tree.
pub struct FsArtifactStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| CoreError::ArtifactIo {
            path: root.display().to_string(),
            details: e.to_string(),
        })?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn io_error(path: &Path, err: std::io::Error) -> CoreError {
        CoreError::ArtifactIo {
            path: path.display().to_string(),
            details: err.to_string(),
        }
    }

    async fn etag_of(path: &Path) -> Result<Option<String>> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_nanos())
                    .unwrap_or(0);
                Ok(Some(format!("\"{}-{}\"", meta.len(), mtime)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(path, e)),
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn copy(&self, src: &str, dst: &str, condition: CopyCondition) -> Result<()> {
        let src_path = self.resolve(src);
        let dst_path = self.resolve(dst);

        let _guard = self.write_lock.lock().await;

        if !tokio::fs::try_exists(&src_path)
            .await
            .map_err(|e| Self::io_error(&src_path, e))?
        {
            return Err(CoreError::ArtifactNotFound {
                path: src.to_string(),
            });
        }

        match &condition {
            CopyCondition::None => {}
            CopyCondition::FailIfExists => {
                if tokio::fs::try_exists(&dst_path)
                    .await
                    .map_err(|e| Self::io_error(&dst_path, e))?
                {
                    return Err(conflict(dst, &condition));
                }
            }
            CopyCondition::IfMatches(expected) => match Self::etag_of(&dst_path).await? {
                Some(current) if current == *expected => {}
                _ => return Err(conflict(dst, &condition)),
            },
        }

        if let Some(parent) = dst_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_error(parent, e))?;
        }
        tokio::fs::copy(&src_path, &dst_path)
            .await
            .map_err(|e| Self::io_error(&dst_path, e))?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&full, e)),
        }
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CoreError::ArtifactNotFound {
                    path: path.to_string(),
                })
            }
            Err(e) => Err(Self::io_error(&full, e)),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path);
        tokio::fs::try_exists(&full)
            .await
            .map_err(|e| Self::io_error(&full, e))
    }

    async fn etag(&self, path: &str) -> Result<Option<String>> {
        Self::etag_of(&self.resolve(path)).await
    }
}
