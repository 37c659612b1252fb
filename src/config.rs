//! Configuration
//!
//! One YAML document configures every component. Each section falls back to
//! its defaults, so a file only names what it overrides.

use crate::allocation::{NumberSpace, NumberSpaceConfig};
use crate::error::{Error, Result};
use crate::inventory::UispConfig;
use crate::notify::NotifierConfig;
use crate::reconcile::ReconcilerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub numbers: NumberSpaceConfig,
    pub reconciler: ReconcilerConfig,
    pub notifications: NotifierConfig,
    pub uisp: UispConfig,
}

impl MeshConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: MeshConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&raw)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        NumberSpace::new(self.numbers)?;
        self.reconciler.validate()?;

        let notifications = &self.notifications;
        if notifications.max_attempts == 0 {
            return Err(Error::Configuration(
                "notifications.max_attempts must be at least 1".into(),
            ));
        }
        if notifications.initial_backoff_ms > notifications.max_backoff_ms {
            return Err(Error::Configuration(format!(
                "notifications.initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                notifications.initial_backoff_ms, notifications.max_backoff_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "reconciler:\n  grace_period_days: 14\n  name_substitutions:\n    - {{from: sn1, to: nycmesh-227}}\nuisp:\n  base_url: https://uisp.example.net"
        )
        .unwrap();

        let config = MeshConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.reconciler.grace_period_days, 14);
        assert_eq!(config.reconciler.name_substitutions.len(), 1);
        assert_eq!(config.reconciler.excluded_categories, vec!["optical".to_string()]);
        assert_eq!(config.numbers, NumberSpaceConfig::default());
        assert_eq!(config.notifications.max_attempts, 4);
        assert_eq!(config.uisp.base_url.as_deref(), Some("https://uisp.example.net"));
        assert_eq!(config.uisp.timeout_secs, 30);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = MeshConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, MeshConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert_matches!(
            MeshConfig::from_yaml_str("numbers: {assign_min: 500, max: 200}"),
            Err(Error::Configuration(_))
        );
        assert_matches!(
            MeshConfig::from_yaml_str("notifications: {max_attempts: 0}"),
            Err(Error::Configuration(_))
        );
        assert_matches!(
            MeshConfig::from_yaml_str("reconciler: {network_number_pattern: '('}"),
            Err(Error::Configuration(_))
        );
        assert_matches!(
            MeshConfig::from_yaml_str("numbers: plenty"),
            Err(Error::YamlParse(_))
        );
    }
}
