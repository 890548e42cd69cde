use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{model::LocationOptions, payload::ExtractOptions};

pub const DEFAULT_ENDPOINT: &str = "http://finance.google.com/finance/info?client=ig&q=SXX";

/// Geolocation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub timeout_ms: u64,
    pub max_age_ms: u64,
    /// Fixed coordinates for hosts without a positioning service.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            max_age_ms: 60_000,
            latitude: None,
            longitude: None,
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// endpoint = "http://finance.google.com/finance/info?client=ig&q=SXX"
/// preamble_len = 3
///
/// [location]
/// latitude = 48.85
/// longitude = 2.35
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: String,
    pub preamble_len: usize,
    pub value_field: String,
    pub label_field: String,
    /// Absent means the request may wait indefinitely.
    pub http_timeout_ms: Option<u64>,
    pub location: LocationConfig,
}

impl Default for Config {
    fn default() -> Self {
        let extract = ExtractOptions::default();
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            preamble_len: extract.preamble_len,
            value_field: extract.value_field,
            label_field: extract.label_field,
            http_timeout_ms: None,
            location: LocationConfig::default(),
        }
    }
}

impl Config {
    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "data-relay", "relay-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.endpoint)
            .with_context(|| format!("Invalid endpoint URL '{}'", self.endpoint))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Endpoint must use http or https, got '{}'", url.scheme());
        }
        if self.value_field.is_empty() || self.label_field.is_empty() {
            bail!("Field names must not be empty");
        }
        if self.location.latitude.is_some() != self.location.longitude.is_some() {
            bail!("Set both location.latitude and location.longitude, or neither");
        }
        Ok(())
    }

    pub fn location_options(&self) -> LocationOptions {
        LocationOptions {
            timeout: Duration::from_millis(self.location.timeout_ms),
            max_age: Duration::from_millis(self.location.max_age_ms),
        }
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            preamble_len: self.preamble_len,
            value_field: self.value_field.clone(),
            label_field: self.label_field.clone(),
        }
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_ms.map(Duration::from_millis)
    }

    /// Configured fixed coordinates, if both are present.
    pub fn fixed_coordinates(&self) -> Option<(f64, f64)> {
        self.location.latitude.zip(self.location.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_behavior() {
        let cfg = Config::default();

        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.extract_options(), ExtractOptions::default());
        assert_eq!(cfg.location_options(), LocationOptions::default());
        assert_eq!(cfg.http_timeout(), None);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("nope.toml")).unwrap();

        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.endpoint = "https://example.com/quote".into();
        cfg.location.latitude = Some(48.85);
        cfg.location.longitude = Some(2.35);
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.fixed_coordinates(), Some((48.85, 2.35)));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "preamble_len = 0\n[location]\ntimeout_ms = 500\n").unwrap();

        let cfg = Config::load_from(&path).unwrap();

        assert_eq!(cfg.preamble_len, 0);
        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.location.timeout_ms, 500);
        assert_eq!(cfg.location.max_age_ms, 60_000);
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let cfg = Config {
            endpoint: "ftp://example.com/x".into(),
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();

        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn rejects_relative_endpoint() {
        let cfg = Config {
            endpoint: "/finance/info".into(),
            ..Default::default()
        };
        assert!(cfg.validate().unwrap_err().to_string().contains("Invalid endpoint URL"));
    }

    #[test]
    fn rejects_half_configured_coordinates() {
        let mut cfg = Config::default();
        cfg.location.latitude = Some(1.0);

        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_keeps_invalid_values_for_later_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "endpoint = \"not a url\"\nvalue_field = \"\"\n").unwrap();

        let cfg = Config::load_from(&path).unwrap();

        assert_eq!(cfg.endpoint, "not a url");
        assert!(cfg.value_field.is_empty());
        assert!(cfg.validate().is_err());
    }
}
