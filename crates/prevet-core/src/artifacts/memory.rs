// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory artifact store for tests and embedded use.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::{CoreError, Result};

use super::{ArtifactStore, CopyCondition, conflict};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    etag: String,
}

/// In-memory [`ArtifactStore`] with version-counter etags.
///
/// Every write produces a fresh etag, so `IfMatches` behaves like a real
/// object store's generation check.
#[derive(Default)]
pub struct MemoryArtifactStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    version: AtomicU64,
}

impl MemoryArtifactStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an object directly, bypassing copy conditions. Test seeding.
    pub fn put(&self, path: &str, data: Vec<u8>) {
        let etag = self.next_etag();
        self.objects
            .lock()
            .expect("artifact store lock poisoned")
            .insert(path.to_string(), StoredObject { data, etag });
    }

    fn next_etag(&self) -> String {
        format!("\"v{}\"", self.version.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn copy(&self, src: &str, dst: &str, condition: CopyCondition) -> Result<()> {
        let etag = self.next_etag();
        let mut objects = self.objects.lock().expect("artifact store lock poisoned");

        let source = objects
            .get(src)
            .ok_or_else(|| CoreError::ArtifactNotFound {
                path: src.to_string(),
            })?
            .clone();

        match &condition {
            CopyCondition::None => {}
            CopyCondition::FailIfExists => {
                if objects.contains_key(dst) {
                    return Err(conflict(dst, &condition));
                }
            }
            CopyCondition::IfMatches(expected) => match objects.get(dst) {
                Some(existing) if existing.etag == *expected => {}
                _ => return Err(conflict(dst, &condition)),
            },
        }

        objects.insert(
            dst.to_string(),
            StoredObject {
                data: source.data,
                etag,
            },
        );
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects
            .lock()
            .expect("artifact store lock poisoned")
            .remove(path);
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .expect("artifact store lock poisoned")
            .get(path)
            .map(|obj| obj.data.clone())
            .ok_or_else(|| CoreError::ArtifactNotFound {
                path: path.to_string(),
            })
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self
            .objects
            .lock()
            .expect("artifact store lock poisoned")
            .contains_key(path))
    }

    async fn etag(&self, path: &str) -> Result<Option<String>> {
        Ok(self
            .objects
            .lock()
            .expect("artifact store lock poisoned")
            .get(path)
            .map(|obj| obj.etag.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_and_read() {
        let store = MemoryArtifactStore::new();
        store.put("src", b"bytes".to_vec());

        store.copy("src", "dst", CopyCondition::None).await.unwrap();
        assert_eq!(store.read("dst").await.unwrap(), b"bytes");
        assert!(store.exists("dst").await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_missing_source() {
        let store = MemoryArtifactStore::new();
        let err = store
            .copy("missing", "dst", CopyCondition::None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "ARTIFACT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_fail_if_exists() {
        let store = MemoryArtifactStore::new();
        store.put("src", b"a".to_vec());
        store
            .copy("src", "dst", CopyCondition::FailIfExists)
            .await
            .unwrap();

        let err = store
            .copy("src", "dst", CopyCondition::FailIfExists)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        // Original bytes survive the rejected copy.
        assert_eq!(store.read("dst").await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_if_matches_token() {
        let store = MemoryArtifactStore::new();
        store.put("src", b"new".to_vec());
        store.put("dst", b"old".to_vec());

        let token = store.etag("dst").await.unwrap().unwrap();
        store
            .copy("src", "dst", CopyCondition::IfMatches(token.clone()))
            .await
            .unwrap();
        assert_eq!(store.read("dst").await.unwrap(), b"new");

        // Token rotated by the copy; the old token no longer matches.
        let err = store
            .copy("src", "dst", CopyCondition::IfMatches(token))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_if_matches_missing_destination_is_conflict() {
        let store = MemoryArtifactStore::new();
        store.put("src", b"new".to_vec());

        let err = store
            .copy("src", "dst", CopyCondition::IfMatches("\"v9\"".to_string()))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryArtifactStore::new();
        store.put("path", b"x".to_vec());
        store.delete("path").await.unwrap();
        store.delete("path").await.unwrap();
        assert!(!store.exists("path").await.unwrap());
    }

    #[tokio::test]
    async fn test_etags_rotate_per_write() {
        let store = MemoryArtifactStore::new();
        store.put("a", b"1".to_vec());
        let first = store.etag("a").await.unwrap().unwrap();
        store.put("a", b"2".to_vec());
        let second = store.etag("a").await.unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(store.etag("missing").await.unwrap(), None);
    }
}
