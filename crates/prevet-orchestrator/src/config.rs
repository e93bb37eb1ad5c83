// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::path::PathBuf;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Root directory of the filesystem artifact store
    pub artifact_root: PathBuf,
    /// Path to the validator topology JSON file
    pub validator_config: PathBuf,
    /// Retries before a message for an unknown package is dropped
    pub missing_package_retry_limit: u32,
    /// Bound on waiting for in-flight handlers at shutdown, in seconds
    pub drain_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `PREVET_DATABASE_URL`: PostgreSQL connection string
    ///
    /// Optional (with defaults):
    /// - `PREVET_ARTIFACT_ROOT`: artifact store directory (default: `.data/artifacts`)
    /// - `PREVET_VALIDATOR_CONFIG`: topology file (default: `validators.json`)
    /// - `PREVET_MISSING_PACKAGE_RETRY_LIMIT`: retries before drop (default: 3)
    /// - `PREVET_DRAIN_TIMEOUT_SECS`: shutdown drain bound (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("PREVET_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("PREVET_DATABASE_URL"))?;

        let artifact_root = std::env::var("PREVET_ARTIFACT_ROOT")
            .unwrap_or_else(|_| ".data/artifacts".to_string())
            .into();

        let validator_config = std::env::var("PREVET_VALIDATOR_CONFIG")
            .unwrap_or_else(|_| "validators.json".to_string())
            .into();

        let missing_package_retry_limit: u32 =
            std::env::var("PREVET_MISSING_PACKAGE_RETRY_LIMIT")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::Invalid(
                        "PREVET_MISSING_PACKAGE_RETRY_LIMIT",
                        "must be a non-negative integer",
                    )
                })?;

        let drain_timeout_secs: u64 = std::env::var("PREVET_DRAIN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("PREVET_DRAIN_TIMEOUT_SECS", "must be a non-negative integer")
            })?;

        Ok(Self {
            database_url,
            artifact_root,
            validator_config,
            missing_package_retry_limit,
            drain_timeout_secs,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("PREVET_DATABASE_URL", "postgres://localhost/prevet");
        guard.remove("PREVET_ARTIFACT_ROOT");
        guard.remove("PREVET_VALIDATOR_CONFIG");
        guard.remove("PREVET_MISSING_PACKAGE_RETRY_LIMIT");
        guard.remove("PREVET_DRAIN_TIMEOUT_SECS");

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "postgres://localhost/prevet");
        assert_eq!(config.artifact_root, PathBuf::from(".data/artifacts"));
        assert_eq!(config.validator_config, PathBuf::from("validators.json"));
        assert_eq!(config.missing_package_retry_limit, 3);
        assert_eq!(config.drain_timeout_secs, 30);
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("PREVET_DATABASE_URL", "postgres://user:pass@db:5432/prod");
        guard.set("PREVET_ARTIFACT_ROOT", "/var/lib/prevet");
        guard.set("PREVET_VALIDATOR_CONFIG", "/etc/prevet/topology.json");
        guard.set("PREVET_MISSING_PACKAGE_RETRY_LIMIT", "10");
        guard.set("PREVET_DRAIN_TIMEOUT_SECS", "120");

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "postgres://user:pass@db:5432/prod");
        assert_eq!(config.artifact_root, PathBuf::from("/var/lib/prevet"));
        assert_eq!(
            config.validator_config,
            PathBuf::from("/etc/prevet/topology.json")
        );
        assert_eq!(config.missing_package_retry_limit, 10);
        assert_eq!(config.drain_timeout_secs, 120);
    }

    #[test]
    fn test_config_missing_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("PREVET_DATABASE_URL");

        let result = Config::from_env();
        assert!(result.is_err());

        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PREVET_DATABASE_URL")));
        assert!(err.to_string().contains("PREVET_DATABASE_URL"));
    }

    #[test]
    fn test_config_invalid_retry_limit() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("PREVET_DATABASE_URL", "postgres://localhost/prevet");
        guard.set("PREVET_MISSING_PACKAGE_RETRY_LIMIT", "many");

        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::Invalid("PREVET_MISSING_PACKAGE_RETRY_LIMIT", _)
        ));
    }

    #[test]
    fn test_config_invalid_drain_timeout() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("PREVET_DATABASE_URL", "postgres://localhost/prevet");
        guard.remove("PREVET_MISSING_PACKAGE_RETRY_LIMIT");
        guard.set("PREVET_DRAIN_TIMEOUT_SECS", "-1");

        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::Invalid("PREVET_DRAIN_TIMEOUT_SECS", _)
        ));
    }

    #[test]
    fn test_config_error_display() {
        let missing = ConfigError::Missing("MY_VAR");
        assert_eq!(
            missing.to_string(),
            "missing required environment variable: MY_VAR"
        );

        let invalid = ConfigError::Invalid("MY_VAR", "must be a number");
        assert_eq!(
            invalid.to_string(),
            "invalid value for MY_VAR: must be a number"
        );
    }
}
