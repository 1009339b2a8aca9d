//! Configuration management for the risk ledger
//!
//! Everything the core needs (thresholds, bucket width) is passed explicitly as
//! structs; this module only loads them from a TOML file and supplies defaults.

use crate::aggregation::AggregationConfig;
use crate::classifier::ClassifierConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default config file looked up by the binaries
pub const DEFAULT_CONFIG_PATH: &str = "config/risk-ledger.toml";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub classifier: ClassifierConfig,
    pub aggregation: AggregationConfig,
    pub paths: PathsConfig,
    pub generator: GeneratorConfig,
    pub logging: LoggingConfig,
}

/// Where raw data, the prepared table and the SQLite store live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding customers.csv, transactions.csv, payments.csv
    pub data_dir: PathBuf,
    /// Prepared analysis table (transactions + risk columns)
    pub analysis_table: PathBuf,
    /// SQLite database file
    pub database: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            data_dir: PathBuf::from("data"),
            analysis_table: PathBuf::from("data/analysis_table.csv"),
            database: PathBuf::from("db/finance.db"),
        }
    }
}

/// Synthetic data generator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub seed: u64,
    pub customers: usize,
    pub transactions: usize,
    /// Fraction of transaction rows duplicated to simulate dirty input
    pub duplicate_rate: f64,
    /// Probability that a transaction has a payment
    pub paid_probability: f64,
    /// Inclusive generation window, ISO dates
    pub start_date: String,
    pub end_date: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            seed: 42,
            customers: 120,
            transactions: 20_000,
            duplicate_rate: 0.005,
            paid_probability: 0.88,
            start_date: "2024-01-01".to_string(),
            end_date: "2025-12-31".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content).context("Invalid TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, else from the default location if it exists,
    /// else fall back to built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load_from_path(default_path)
                } else {
                    Ok(AppConfig::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.classifier.validate()?;
        if !(0.0..=1.0).contains(&self.generator.paid_probability) {
            anyhow::bail!(
                "generator.paid_probability must be within [0, 1], got {}",
                self.generator.paid_probability
            );
        }
        if !(0.0..=1.0).contains(&self.generator.duplicate_rate) {
            anyhow::bail!(
                "generator.duplicate_rate must be within [0, 1], got {}",
                self.generator.duplicate_rate
            );
        }
        Ok(())
    }
}
