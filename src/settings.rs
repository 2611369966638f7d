use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateOptions, DEFAULT_OFF_CONTRACT_THRESHOLD_PCT, DEFAULT_TOP_N};
use crate::error::{Result, SpendError};

/// Environment variable overriding the configured data file.
pub const DATA_ENV_VAR: &str = "SPENDLENS_DATA";

pub const DEFAULT_DATA_FILE: &str = "synthetic_spend_data.csv";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub data_path: Option<String>,
    #[serde(default = "default_top_n")]
    pub top_n_vendors: usize,
    #[serde(default = "default_threshold")]
    pub off_contract_threshold_pct: f64,
    #[serde(default = "default_ppi_warning")]
    pub ppi_warning_pct: f64,
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

fn default_threshold() -> f64 {
    DEFAULT_OFF_CONTRACT_THRESHOLD_PCT
}

fn default_ppi_warning() -> f64 {
    50.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_path: None,
            top_n_vendors: default_top_n(),
            off_contract_threshold_pct: default_threshold(),
            ppi_warning_pct: default_ppi_warning(),
        }
    }
}

impl Settings {
    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            top_n: self.top_n_vendors,
            off_contract_threshold_pct: self.off_contract_threshold_pct,
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("spendlens")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

pub fn default_data_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("spendlens")
        .join(DEFAULT_DATA_FILE)
}

/// Missing or unreadable settings fall back to defaults.
pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

pub fn load_settings_from(path: &Path) -> Settings {
    if !path.exists() {
        return Settings::default();
    }
    let content = std::fs::read_to_string(path).unwrap_or_default();
    match serde_json::from_str(&content) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("Ignoring unreadable settings at {}: {e}", path.display());
            Settings::default()
        }
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(settings, &settings_path())
}

pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| SpendError::Settings(e.to_string()))?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

/// Input file precedence: explicit argument, then `SPENDLENS_DATA`, then the
/// saved setting, then the default under ~/Documents/spendlens.
pub fn resolve_data_path(explicit: Option<&str>, env: Option<String>, settings: &Settings) -> PathBuf {
    explicit
        .map(str::to_string)
        .or(env.filter(|v| !v.trim().is_empty()))
        .or_else(|| settings.data_path.clone())
        .map(|p| PathBuf::from(shellexpand_path(&p)))
        .unwrap_or_else(default_data_path)
}

pub fn shellexpand_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}
