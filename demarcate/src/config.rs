// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Container configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings shared by every invocation the container drives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Timeout applied before each container- or bean-initiated begin.
    /// `None` leaves the transaction manager's own default in place.
    pub transaction_timeout_secs: Option<u64>,

    /// env_logger filter used by `logging::init`
    pub log_filter: String,

    /// Record every transaction manager primitive in the in-memory manager's journal
    pub audit_manager_calls: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_secs: None,
            log_filter: "info".to_string(),
            audit_manager_calls: true,
        }
    }
}

impl ContainerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn transaction_timeout(&self) -> Option<Duration> {
        self.transaction_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = ContainerConfig::from_json_str(r#"{"transaction_timeout_secs": 30}"#).unwrap();
        assert_eq!(config.transaction_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.log_filter, "info");
        assert!(config.audit_manager_calls);
    }

    #[test]
    fn test_rejects_malformed_json() {
        let result = ContainerConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"log_filter": "demarcate=debug", "audit_manager_calls": false}}"#
        )
        .unwrap();

        let config = ContainerConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.log_filter, "demarcate=debug");
        assert!(!config.audit_manager_calls);
        assert_eq!(config.transaction_timeout(), None);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ContainerConfig::from_json_file(dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
