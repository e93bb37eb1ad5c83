// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed record store.
//!
//! Schema lives under `migrations/`; run [`MIGRATOR`] before first use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::package::{PackageRecord, PackageStatus, StreamMetadata};
use crate::validation_set::{ValidationIssue, ValidationSet, ValidationStatus, ValidatorRun};

use super::ValidationStore;

/// Migrations for the prevet schema.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// PostgreSQL-backed [`ValidationStore`].
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new Postgres-backed store from an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(sqlx::FromRow)]
struct PackageRow {
    package_key: String,
    package_id: String,
    normalized_version: String,
    status: String,
    stream_size: Option<i64>,
    stream_hash: Option<String>,
    stream_hash_algorithm: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PackageRow {
    fn into_record(self) -> Result<PackageRecord> {
        let status = PackageStatus::parse(&self.status).ok_or_else(|| CoreError::DatabaseError {
            operation: "decode_package_status".to_string(),
            details: format!("unknown status '{}'", self.status),
        })?;
        let stream_metadata = match (self.stream_size, self.stream_hash, self.stream_hash_algorithm)
        {
            (Some(size), Some(hash), Some(hash_algorithm)) => Some(StreamMetadata {
                size: size as u64,
                hash,
                hash_algorithm,
            }),
            _ => None,
        };
        Ok(PackageRecord {
            package_key: self.package_key,
            package_id: self.package_id,
            normalized_version: self.normalized_version,
            status,
            stream_metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ValidationSetRow {
    tracking_id: Uuid,
    package_id: String,
    normalized_version: String,
    package_key: String,
    validating_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ValidatorRunRow {
    validator_name: String,
    status: String,
    started_at: DateTime<Utc>,
    issues: serde_json::Value,
    updated_at: DateTime<Utc>,
}

impl ValidatorRunRow {
    fn into_run(self) -> Result<ValidatorRun> {
        let status =
            ValidationStatus::parse(&self.status).ok_or_else(|| CoreError::DatabaseError {
                operation: "decode_validator_status".to_string(),
                details: format!("unknown status '{}'", self.status),
            })?;
        let issues: Vec<ValidationIssue> = serde_json::from_value(self.issues)?;
        Ok(ValidatorRun {
            validator_name: self.validator_name,
            status,
            started_at: self.started_at,
            issues,
            updated_at: self.updated_at,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl ValidationStore for PostgresStore {
    async fn find_package(
        &self,
        package_id: &str,
        normalized_version: &str,
    ) -> Result<Option<PackageRecord>> {
        // Package keys are canonically lowercase; fold the caller's casing
        // so message ids match gallery rows regardless of case.
        let key = PackageRecord::key_for(package_id, normalized_version);
        let row = sqlx::query_as::<_, PackageRow>(
            r#"
            SELECT package_key, package_id, normalized_version, status,
                   stream_size, stream_hash, stream_hash_algorithm,
                   created_at, updated_at
            FROM packages
            WHERE package_key = $1
            "#,
        )
        .bind(&key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PackageRow::into_record).transpose()
    }

    async fn create_package(&self, record: &PackageRecord) -> Result<()> {
        let (size, hash, algorithm) = match &record.stream_metadata {
            Some(meta) => (
                Some(meta.size as i64),
                Some(meta.hash.clone()),
                Some(meta.hash_algorithm.clone()),
            ),
            None => (None, None, None),
        };
        sqlx::query(
            r#"
            INSERT INTO packages (package_key, package_id, normalized_version, status,
                                  stream_size, stream_hash, stream_hash_algorithm,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&record.package_key)
        .bind(&record.package_id)
        .bind(&record.normalized_version)
        .bind(record.status.as_str())
        .bind(size)
        .bind(hash)
        .bind(algorithm)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(package_key = %record.package_key, "Inserted package row");
        Ok(())
    }

    async fn update_package_status(&self, package_key: &str, status: PackageStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE packages SET status = $2, updated_at = NOW()
            WHERE package_key = $1
            "#,
        )
        .bind(package_key)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::DatabaseError {
                operation: "update_package_status".to_string(),
                details: format!("no package row for key '{}'", package_key),
            });
        }
        debug!(%package_key, status = status.as_str(), "Updated package status");
        Ok(())
    }

    async fn update_stream_metadata(
        &self,
        package_key: &str,
        metadata: &StreamMetadata,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE packages
            SET stream_size = $2, stream_hash = $3, stream_hash_algorithm = $4,
                updated_at = NOW()
            WHERE package_key = $1
            "#,
        )
        .bind(package_key)
        .bind(metadata.size as i64)
        .bind(&metadata.hash)
        .bind(&metadata.hash_algorithm)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::DatabaseError {
                operation: "update_stream_metadata".to_string(),
                details: format!("no package row for key '{}'", package_key),
            });
        }
        Ok(())
    }

    async fn get_validation_set(&self, tracking_id: Uuid) -> Result<Option<ValidationSet>> {
        let set_row = sqlx::query_as::<_, ValidationSetRow>(
            r#"
            SELECT tracking_id, package_id, normalized_version, package_key,
                   validating_token, created_at, updated_at
            FROM validation_sets
            WHERE tracking_id = $1
            "#,
        )
        .bind(tracking_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(set_row) = set_row else {
            return Ok(None);
        };

        let run_rows = sqlx::query_as::<_, ValidatorRunRow>(
            r#"
            SELECT validator_name, status, started_at, issues, updated_at
            FROM validator_runs
            WHERE tracking_id = $1
            ORDER BY seed_order
            "#,
        )
        .bind(tracking_id)
        .fetch_all(&self.pool)
        .await?;

        let runs = run_rows
            .into_iter()
            .map(ValidatorRunRow::into_run)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(ValidationSet {
            tracking_id: set_row.tracking_id,
            package_id: set_row.package_id,
            normalized_version: set_row.normalized_version,
            package_key: set_row.package_key,
            validating_token: set_row.validating_token,
            created_at: set_row.created_at,
            updated_at: set_row.updated_at,
            runs,
        }))
    }

    async fn create_validation_set(&self, set: &ValidationSet) -> Result<ValidationSet> {
        // Set and runs form one aggregate; insert together.
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO validation_sets (tracking_id, package_id, normalized_version,
                                         package_key, validating_token, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(set.tracking_id)
        .bind(&set.package_id)
        .bind(&set.normalized_version)
        .bind(&set.package_key)
        .bind(&set.validating_token)
        .bind(set.created_at)
        .bind(set.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            if is_unique_violation(&err) {
                return Err(CoreError::ValidationSetAlreadyExists {
                    tracking_id: set.tracking_id.to_string(),
                });
            }
            return Err(err.into());
        }

        for (order, run) in set.runs.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO validator_runs (tracking_id, validator_name, status,
                                            started_at, issues, updated_at, seed_order)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(set.tracking_id)
            .bind(&run.validator_name)
            .bind(run.status.as_str())
            .bind(run.started_at)
            .bind(serde_json::to_value(&run.issues)?)
            .bind(run.updated_at)
            .bind(order as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            tracking_id = %set.tracking_id,
            runs = set.runs.len(),
            "Inserted validation set"
        );
        Ok(set.clone())
    }

    async fn update_validator_run(&self, tracking_id: Uuid, run: &ValidatorRun) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE validator_runs
            SET status = $3, issues = $4, updated_at = NOW()
            WHERE tracking_id = $1 AND validator_name = $2
            "#,
        )
        .bind(tracking_id)
        .bind(&run.validator_name)
        .bind(run.status.as_str())
        .bind(serde_json::to_value(&run.issues)?)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::DatabaseError {
                operation: "update_validator_run".to_string(),
                details: format!(
                    "no run '{}' in set '{}'",
                    run.validator_name, tracking_id
                ),
            });
        }

        sqlx::query(
            r#"
            UPDATE validation_sets SET updated_at = NOW() WHERE tracking_id = $1
            "#,
        )
        .bind(tracking_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn latest_terminal_run(
        &self,
        package_id: &str,
        normalized_version: &str,
        validator_name: &str,
        exclude_tracking_id: Uuid,
    ) -> Result<Option<(Uuid, ValidatorRun)>> {
        #[derive(sqlx::FromRow)]
        struct GuardRow {
            tracking_id: Uuid,
            validator_name: String,
            status: String,
            started_at: DateTime<Utc>,
            issues: serde_json::Value,
            updated_at: DateTime<Utc>,
        }

        let row = sqlx::query_as::<_, GuardRow>(
            r#"
            SELECT r.tracking_id, r.validator_name, r.status, r.started_at,
                   r.issues, r.updated_at
            FROM validator_runs r
            JOIN validation_sets s ON s.tracking_id = r.tracking_id
            WHERE s.package_id = $1
              AND s.normalized_version = $2
              AND r.validator_name = $3
              AND r.tracking_id <> $4
              AND r.status IN ('succeeded', 'failed')
            ORDER BY r.updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(package_id)
        .bind(normalized_version)
        .bind(validator_name)
        .bind(exclude_tracking_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let run = ValidatorRunRow {
                validator_name: r.validator_name,
                status: r.status,
                started_at: r.started_at,
                issues: r.issues,
                updated_at: r.updated_at,
            }
            .into_run()?;
            Ok((r.tracking_id, run))
        })
        .transpose()
    }

    async fn count_validation_sets(
        &self,
        package_id: &str,
        normalized_version: &str,
    ) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM validation_sets
            WHERE package_id = $1 AND normalized_version = $2
            "#,
        )
        .bind(package_id)
        .bind(normalized_version)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
