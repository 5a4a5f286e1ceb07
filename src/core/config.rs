//! Configuration management

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "carbonexia-mrv";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub baseline: BaselineConfig,
    #[serde(default)]
    pub mrv: MrvConfig,
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

        let app_config_dir = config_dir.join(APP_DIR);

        if !app_config_dir.exists() {
            fs::create_dir_all(&app_config_dir)?;
        }

        Ok(app_config_dir.join("config.toml"))
    }

    /// Load configuration from the default location, writing defaults on first run
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            let config = Self::default();
            config.save_to(&path)?;
            return Ok(config);
        }

        Self::load_from(&path)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Check values that serde cannot constrain
    pub fn validate(&self) -> Result<()> {
        let threshold = self.baseline.outlier_threshold_pct;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(Error::Config(format!(
                "baseline.outlier_threshold_pct must be a non-negative number, got {}",
                threshold
            )));
        }
        if self.baseline.history_months == 0 {
            return Err(Error::Config("baseline.history_months must be at least 1".to_string()));
        }
        let factor = self.mrv.default_emission_factor;
        if !factor.is_finite() || factor < 0.0 {
            return Err(Error::Config(format!(
                "mrv.default_emission_factor must be a non-negative number, got {}",
                factor
            )));
        }
        Ok(())
    }

    /// Database file: configured path, or the platform data directory
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.general.database_path {
            return Ok(path.clone());
        }

        let data_dir = dirs::data_dir()
            .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?;
        let app_dir = data_dir.join(APP_DIR);
        fs::create_dir_all(&app_dir)?;

        Ok(app_dir.join("mrv.db"))
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log filter used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// SQLite database file (defaults to the platform data directory)
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            database_path: None,
        }
    }
}

/// Baseline calculation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// Relative deviation from the mean beyond which a month is an outlier
    #[serde(default = "default_outlier_threshold")]
    pub outlier_threshold_pct: f64,
    /// Number of recent readings fetched when the caller supplies no months
    #[serde(default = "default_history_months")]
    pub history_months: usize,
    /// Method label recorded when the caller does not name one
    #[serde(default = "default_method")]
    pub default_method: String,
}

fn default_outlier_threshold() -> f64 { 0.20 }
fn default_history_months() -> usize { 12 }
fn default_method() -> String { "historical_12_months".to_string() }

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            outlier_threshold_pct: default_outlier_threshold(),
            history_months: default_history_months(),
            default_method: default_method(),
        }
    }
}

/// Savings / credit calculation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MrvConfig {
    /// kg CO2 per kWh used when no factor is published for the region/year
    #[serde(default = "default_emission_factor")]
    pub default_emission_factor: f64,
    /// Region assumed for buildings without one
    #[serde(default = "default_region")]
    pub default_region: String,
}

fn default_emission_factor() -> f64 { 0.5 }
fn default_region() -> String { "US-CA".to_string() }

impl Default for MrvConfig {
    fn default() -> Self {
        Self {
            default_emission_factor: default_emission_factor(),
            default_region: default_region(),
        }
    }
}
