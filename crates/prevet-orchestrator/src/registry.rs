// Copyright (C) 2025 Prevet Project Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Validator registry: configuration and implementations, keyed by name.
//!
//! The registry is an explicit name → implementation map populated at
//! startup. Validator topology (deadlines, prerequisites, required flags)
//! comes from configuration; implementations are registered by the
//! embedding application.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use prevet_core::error::{CoreError, Result};
use prevet_core::package::PackageRecord;
use prevet_core::validation_set::{ValidationIssue, ValidationSet, ValidationStatus};

/// Result of one validator invocation.
#[derive(Debug, Clone)]
pub struct ValidatorOutcome {
    /// Reported status. `Incomplete` means the validator is still working
    /// and a later delivery should re-evaluate it.
    pub status: ValidationStatus,
    /// Structured issues; attached to the run only when terminal.
    pub issues: Vec<ValidationIssue>,
}

impl ValidatorOutcome {
    /// Terminal success without issues.
    pub fn succeeded() -> Self {
        Self {
            status: ValidationStatus::Succeeded,
            issues: Vec::new(),
        }
    }

    /// Terminal failure with the given issues.
    pub fn failed(issues: Vec<ValidationIssue>) -> Self {
        Self {
            status: ValidationStatus::Failed,
            issues,
        }
    }

    /// Still running; no issues are recorded.
    pub fn incomplete() -> Self {
        Self {
            status: ValidationStatus::Incomplete,
            issues: Vec::new(),
        }
    }
}

/// External validator collaborator.
///
/// Invoked synchronously by the coordinator per pending run. A validator
/// that may mutate the artifact's bytes (e.g. signature stripping) must
/// report itself as a processor; the publish protocol then sources the
/// artifact from the set-specific location it wrote.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Run the validator against one package for one validation attempt.
    async fn validate(
        &self,
        package: &PackageRecord,
        set: &ValidationSet,
    ) -> Result<ValidatorOutcome>;

    /// Whether this validator may alter the artifact's bytes.
    fn is_processor(&self) -> bool {
        false
    }
}

impl std::fmt::Debug for dyn Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Validator")
    }
}

/// Configuration of one validator in the topology.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    /// Validator name, unique within the topology.
    pub name: String,
    /// Deadline measured from validation-set creation, in seconds.
    pub deadline_secs: u64,
    /// Names of validators that must succeed before this one runs.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Whether this validator must succeed for the package to be accepted.
    /// Best-effort validators never block acceptance.
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl ValidatorConfig {
    /// Deadline as a [`Duration`].
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

#[derive(Debug)]
struct Entry {
    config: ValidatorConfig,
    validator: Arc<dyn Validator>,
}

/// Startup-populated registry of validator configurations + implementations.
///
/// Iteration order is registration order; the coordinator and the set
/// provider both rely on it being deterministic.
#[derive(Debug)]
pub struct ValidatorRegistry {
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
}

impl ValidatorRegistry {
    /// Create a builder.
    pub fn builder() -> ValidatorRegistryBuilder {
        ValidatorRegistryBuilder {
            entries: Vec::new(),
        }
    }

    /// Configurations in registration order.
    pub fn configs(&self) -> impl Iterator<Item = &ValidatorConfig> {
        self.entries.iter().map(|e| &e.config)
    }

    /// Number of configured validators.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no validators are configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a validator implementation by name.
    pub fn validator(&self, name: &str) -> Result<&Arc<dyn Validator>> {
        self.by_name
            .get(name)
            .map(|&i| &self.entries[i].validator)
            .ok_or_else(|| CoreError::ValidatorNotRegistered {
                validator: name.to_string(),
            })
    }

    /// Look up a validator configuration by name.
    pub fn config(&self, name: &str) -> Result<&ValidatorConfig> {
        self.by_name
            .get(name)
            .map(|&i| &self.entries[i].config)
            .ok_or_else(|| CoreError::ValidatorNotRegistered {
                validator: name.to_string(),
            })
    }

    /// Whether the named validator may mutate artifact bytes.
    ///
    /// Unregistered names are not processors; the publish protocol treats
    /// them as pure checkers.
    pub fn is_processor(&self, name: &str) -> bool {
        self.by_name
            .get(name)
            .map(|&i| self.entries[i].validator.is_processor())
            .unwrap_or(false)
    }

    /// Whether the named validator must succeed for acceptance.
    pub fn is_required(&self, name: &str) -> bool {
        self.by_name
            .get(name)
            .map(|&i| self.entries[i].config.required)
            .unwrap_or(false)
    }
}

/// Builder validating the topology as it is assembled.
pub struct ValidatorRegistryBuilder {
    entries: Vec<Entry>,
}

impl ValidatorRegistryBuilder {
    /// Register a validator with its configuration.
    pub fn register(mut self, config: ValidatorConfig, validator: Arc<dyn Validator>) -> Self {
        self.entries.push(Entry { config, validator });
        self
    }

    /// Finish building, validating name uniqueness and prerequisite edges.
    pub fn build(self) -> Result<ValidatorRegistry> {
        let mut by_name = HashMap::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if by_name.insert(entry.config.name.clone(), i).is_some() {
                return Err(CoreError::ConfigurationError {
                    message: format!("duplicate validator name '{}'", entry.config.name),
                });
            }
        }

        let names: HashSet<&str> = self.entries.iter().map(|e| e.config.name.as_str()).collect();
        for entry in &self.entries {
            for dep in &entry.config.requires {
                if !names.contains(dep.as_str()) {
                    return Err(CoreError::ConfigurationError {
                        message: format!(
                            "validator '{}' requires unknown validator '{}'",
                            entry.config.name, dep
                        ),
                    });
                }
                if dep == &entry.config.name {
                    return Err(CoreError::ConfigurationError {
                        message: format!("validator '{}' requires itself", entry.config.name),
                    });
                }
            }
        }

        Ok(ValidatorRegistry {
            entries: self.entries,
            by_name,
        })
    }
}

/// Parse a validator topology file (JSON array of [`ValidatorConfig`]).
pub fn parse_topology(json: &str) -> Result<Vec<ValidatorConfig>> {
    serde_json::from_str(json).map_err(|e| CoreError::ConfigurationError {
        message: format!("invalid validator topology: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopValidator {
        processor: bool,
    }

    #[async_trait]
    impl Validator for NoopValidator {
        async fn validate(
            &self,
            _package: &PackageRecord,
            _set: &ValidationSet,
        ) -> Result<ValidatorOutcome> {
            Ok(ValidatorOutcome::succeeded())
        }

        fn is_processor(&self) -> bool {
            self.processor
        }
    }

    fn config(name: &str, requires: Vec<&str>) -> ValidatorConfig {
        ValidatorConfig {
            name: name.to_string(),
            deadline_secs: 86400,
            requires: requires.into_iter().map(String::from).collect(),
            required: true,
        }
    }

    #[test]
    fn test_registration_order_is_preserved() {
        let registry = ValidatorRegistry::builder()
            .register(config("scan", vec![]), Arc::new(NoopValidator { processor: false }))
            .register(config("sign", vec!["scan"]), Arc::new(NoopValidator { processor: true }))
            .build()
            .unwrap();

        let names: Vec<&str> = registry.configs().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["scan", "sign"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_processor_and_required_lookup() {
        let mut best_effort = config("symbols", vec![]);
        best_effort.required = false;

        let registry = ValidatorRegistry::builder()
            .register(config("sign", vec![]), Arc::new(NoopValidator { processor: true }))
            .register(best_effort, Arc::new(NoopValidator { processor: false }))
            .build()
            .unwrap();

        assert!(registry.is_processor("sign"));
        assert!(!registry.is_processor("symbols"));
        assert!(!registry.is_processor("unknown"));
        assert!(registry.is_required("sign"));
        assert!(!registry.is_required("symbols"));
        assert!(!registry.is_required("unknown"));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = ValidatorRegistry::builder()
            .register(config("scan", vec![]), Arc::new(NoopValidator { processor: false }))
            .register(config("scan", vec![]), Arc::new(NoopValidator { processor: false }))
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_unknown_prerequisite_rejected() {
        let err = ValidatorRegistry::builder()
            .register(config("sign", vec!["scan"]), Arc::new(NoopValidator { processor: false }))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("unknown validator 'scan'"));
    }

    #[test]
    fn test_self_reference_rejected() {
        let err = ValidatorRegistry::builder()
            .register(config("scan", vec!["scan"]), Arc::new(NoopValidator { processor: false }))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("requires itself"));
    }

    #[test]
    fn test_unregistered_lookup() {
        let registry = ValidatorRegistry::builder().build().unwrap();
        assert!(registry.is_empty());
        let err = registry.validator("scan").unwrap_err();
        assert_eq!(err.error_code(), "VALIDATOR_NOT_REGISTERED");
    }

    #[test]
    fn test_parse_topology() {
        let json = r#"[
            {"name": "scan", "deadline_secs": 3600},
            {"name": "sign", "deadline_secs": 7200, "requires": ["scan"], "required": false}
        ]"#;
        let configs = parse_topology(json).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].name, "scan");
        assert!(configs[0].required);
        assert!(configs[0].requires.is_empty());
        assert_eq!(configs[1].requires, vec!["scan"]);
        assert!(!configs[1].required);
        assert_eq!(configs[1].deadline(), Duration::from_secs(7200));

        assert!(parse_topology("not json").is_err());
    }
}
