// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Prevet Orchestrator - Package Validation Service
//!
//! The orchestrator is responsible for:
//! - Driving configured validators per validation request
//! - Deciding acceptance or rejection per package version
//! - Publishing accepted packages through the safe-publish protocol
//!
//! Validator implementations live in their own services; this binary
//! registers client stubs for them in [`validator_factories`]. A topology
//! entry with no registered implementation is a configuration error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use prevet_core::artifacts::FsArtifactStore;
use prevet_core::persistence::{MIGRATOR, PostgresStore};
use prevet_orchestrator::config::Config;
use prevet_orchestrator::queue::MemoryQueue;
use prevet_orchestrator::registry::{Validator, ValidatorRegistry, parse_topology};
use prevet_orchestrator::runtime::Orchestrator;

/// Validator implementations available to this deployment, by name.
///
/// Each deployment registers its validator clients here; the topology file
/// then selects and orders them.
fn validator_factories() -> HashMap<String, Arc<dyn Validator>> {
    HashMap::new()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prevet_orchestrator=info".parse().unwrap()),
        )
        .init();

    info!("Starting Prevet Orchestrator");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        artifact_root = %config.artifact_root.display(),
        validator_config = %config.validator_config.display(),
        missing_package_retry_limit = config.missing_package_retry_limit,
        "Configuration loaded"
    );

    // Connect to database
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    info!("Database connection established");

    info!("Running database migrations...");
    MIGRATOR.run(&pool).await?;
    info!("Migrations completed");

    // Build the validator registry from the topology file
    let topology = std::fs::read_to_string(&config.validator_config)?;
    let factories = validator_factories();
    let mut builder = ValidatorRegistry::builder();
    for validator_config in parse_topology(&topology)? {
        let validator = factories
            .get(&validator_config.name)
            .cloned()
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no implementation registered for validator '{}'",
                    validator_config.name
                )
            })?;
        builder = builder.register(validator_config, validator);
    }
    let registry = Arc::new(builder.build()?);
    info!(validators = registry.len(), "Validator registry built");

    let store = Arc::new(PostgresStore::new(pool.clone()));
    let artifacts = Arc::new(FsArtifactStore::new(&config.artifact_root)?);

    // The in-process queue stands in for the deployment's broker binding;
    // embedders plug their own MessageQueue through the builder.
    let queue = Arc::new(MemoryQueue::new());

    let orchestrator = Orchestrator::builder()
        .store(store)
        .artifacts(artifacts)
        .registry(registry)
        .queue(queue)
        .missing_package_retry_limit(config.missing_package_retry_limit)
        .drain_timeout(Duration::from_secs(config.drain_timeout_secs))
        .build()?
        .start()
        .await?;

    info!("Prevet Orchestrator initialized successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    orchestrator.shutdown().await?;

    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
