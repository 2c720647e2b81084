//! Engine configuration.

use pledge_core::CampaignId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::ConfigError;

/// Configuration for the campaign engine
///
/// Loadable from TOML; every field is optional there and falls back to
/// [`EngineConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval between timer-driven refreshes, in milliseconds (default: 5000)
    pub refresh_interval_ms: u64,

    /// Run the fixed-cadence refresh timer
    pub auto_refresh_enabled: bool,

    /// Scan every published snapshot for refund-eligible campaigns
    pub refund_scan_enabled: bool,

    /// Refresh on ledger push events
    pub push_events_enabled: bool,

    /// Only this campaign's push events trigger refreshes; `None` means all
    pub focus_campaign: Option<CampaignId>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 5_000,
            auto_refresh_enabled: true,
            refund_scan_enabled: true,
            push_events_enabled: true,
            focus_campaign: None,
        }
    }
}

impl EngineConfig {
    /// Create config for testing (short interval)
    pub fn for_testing() -> Self {
        Self {
            refresh_interval_ms: 20,
            ..Self::default()
        }
    }

    /// Create config with the timer and push feed disabled
    pub fn manual_only() -> Self {
        Self {
            auto_refresh_enabled: false,
            push_events_enabled: false,
            ..Self::default()
        }
    }

    /// Timer cadence as a `Duration`
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Parse and validate TOML
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&input)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "refresh_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_cadence() {
        let config = EngineConfig::default();
        assert_eq!(config.refresh_interval(), Duration::from_secs(5));
        assert!(config.auto_refresh_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn manual_only_disables_background_triggers() {
        let config = EngineConfig::manual_only();
        assert!(!config.auto_refresh_enabled);
        assert!(!config.push_events_enabled);
        assert!(config.refund_scan_enabled);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            refresh_interval_ms = 750
            focus_campaign = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.refresh_interval_ms, 750);
        assert_eq!(config.focus_campaign, Some(CampaignId(3)));
        assert!(config.push_events_enabled);
    }

    #[test]
    fn zero_interval_is_invalid() {
        let err = EngineConfig::from_toml_str("refresh_interval_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = EngineConfig::from_toml_str("refresh_interval_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "auto_refresh_enabled = false").unwrap();

        let config = EngineConfig::load_from_file(file.path()).unwrap();
        assert!(!config.auto_refresh_enabled);
        assert_eq!(config.refresh_interval_ms, 5_000);
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::load_from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
