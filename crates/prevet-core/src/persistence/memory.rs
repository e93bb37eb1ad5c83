// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory record store for tests and embedded use.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::package::{PackageRecord, PackageStatus, StreamMetadata};
use crate::validation_set::{ValidationSet, ValidationStatus, ValidatorRun};

use super::ValidationStore;

#[derive(Default)]
struct Inner {
    packages: HashMap<String, PackageRecord>,
    sets: HashMap<Uuid, ValidationSet>,
}

/// In-memory [`ValidationStore`] with the same observable semantics as the
/// Postgres backend, including the tracking-id uniqueness signal.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot a package row by key. Test inspection.
    pub fn package(&self, package_key: &str) -> Option<PackageRecord> {
        self.inner
            .lock()
            .expect("record store lock poisoned")
            .packages
            .get(package_key)
            .cloned()
    }
}

#[async_trait]
impl ValidationStore for MemoryStore {
    async fn find_package(
        &self,
        package_id: &str,
        normalized_version: &str,
    ) -> Result<Option<PackageRecord>> {
        let key = PackageRecord::key_for(package_id, normalized_version);
        Ok(self
            .inner
            .lock()
            .expect("record store lock poisoned")
            .packages
            .get(&key)
            .cloned())
    }

    async fn create_package(&self, record: &PackageRecord) -> Result<()> {
        self.inner
            .lock()
            .expect("record store lock poisoned")
            .packages
            .insert(record.package_key.clone(), record.clone());
        Ok(())
    }

    async fn update_package_status(&self, package_key: &str, status: PackageStatus) -> Result<()> {
        let mut inner = self.inner.lock().expect("record store lock poisoned");
        let record = inner
            .packages
            .get_mut(package_key)
            .ok_or_else(|| CoreError::DatabaseError {
                operation: "update_package_status".to_string(),
                details: format!("no package row for key '{}'", package_key),
            })?;
        record.status = status;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn update_stream_metadata(
        &self,
        package_key: &str,
        metadata: &StreamMetadata,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("record store lock poisoned");
        let record = inner
            .packages
            .get_mut(package_key)
            .ok_or_else(|| CoreError::DatabaseError {
                operation: "update_stream_metadata".to_string(),
                details: format!("no package row for key '{}'", package_key),
            })?;
        record.stream_metadata = Some(metadata.clone());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn get_validation_set(&self, tracking_id: Uuid) -> Result<Option<ValidationSet>> {
        Ok(self
            .inner
            .lock()
            .expect("record store lock poisoned")
            .sets
            .get(&tracking_id)
            .cloned())
    }

    async fn create_validation_set(&self, set: &ValidationSet) -> Result<ValidationSet> {
        let mut inner = self.inner.lock().expect("record store lock poisoned");
        if inner.sets.contains_key(&set.tracking_id) {
            return Err(CoreError::ValidationSetAlreadyExists {
                tracking_id: set.tracking_id.to_string(),
            });
        }
        inner.sets.insert(set.tracking_id, set.clone());
        Ok(set.clone())
    }

    async fn update_validator_run(&self, tracking_id: Uuid, run: &ValidatorRun) -> Result<()> {
        let mut inner = self.inner.lock().expect("record store lock poisoned");
        let set = inner
            .sets
            .get_mut(&tracking_id)
            .ok_or_else(|| CoreError::DatabaseError {
                operation: "update_validator_run".to_string(),
                details: format!("no validation set '{}'", tracking_id),
            })?;
        let stored =
            set.run_mut(&run.validator_name)
                .ok_or_else(|| CoreError::DatabaseError {
                    operation: "update_validator_run".to_string(),
                    details: format!(
                        "no run '{}' in set '{}'",
                        run.validator_name, tracking_id
                    ),
                })?;
        *stored = run.clone();
        set.updated_at = Utc::now();
        Ok(())
    }

    async fn latest_terminal_run(
        &self,
        package_id: &str,
        normalized_version: &str,
        validator_name: &str,
        exclude_tracking_id: Uuid,
    ) -> Result<Option<(Uuid, ValidatorRun)>> {
        let inner = self.inner.lock().expect("record store lock poisoned");
        let mut latest: Option<(Uuid, ValidatorRun)> = None;
        for set in inner.sets.values() {
            if set.tracking_id == exclude_tracking_id
                || set.package_id != package_id
                || set.normalized_version != normalized_version
            {
                continue;
            }
            if let Some(run) = set.run(validator_name)
                && run.status.is_terminal()
                && latest
                    .as_ref()
                    .is_none_or(|(_, best)| run.updated_at > best.updated_at)
            {
                latest = Some((set.tracking_id, run.clone()));
            }
        }
        Ok(latest)
    }

    async fn count_validation_sets(
        &self,
        package_id: &str,
        normalized_version: &str,
    ) -> Result<i64> {
        let inner = self.inner.lock().expect("record store lock poisoned");
        Ok(inner
            .sets
            .values()
            .filter(|s| s.package_id == package_id && s.normalized_version == normalized_version)
            .count() as i64)
    }
}
