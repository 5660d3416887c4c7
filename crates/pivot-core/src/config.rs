//! Configuration for strategy parameters, scoring and switching.

use crate::error::{Error, Result};
use crate::types::{ScoringWeights, StrategyKind, StrategyParams};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Complete engine configuration.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default strategy parameters for a run
    pub params: StrategyParams,
    /// Weights used when scoring strategies
    pub scoring: ScoringWeights,
    /// Live switching configuration
    pub switching: SwitchConfig,
    /// Strategy to start with instead of the best-scoring one
    pub forced_strategy: Option<StrategyKind>,
}

/// Thresholds and limits for switching strategies mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Switches allowed per controlled run, fallbacks included
    pub max_switches: usize,
    /// Items that must settle under a strategy before it is re-evaluated
    pub min_observations: usize,
    /// Failure rate above which only ordered strategies are considered
    pub failure_rate_threshold: f64,
    /// System load above which the concurrent strategy is excluded
    pub load_threshold: f64,
    /// Memory usage above which only chunked strategies are considered
    pub memory_threshold: f64,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            max_switches: 3,
            min_observations: 3,
            failure_rate_threshold: 0.3,
            load_threshold: 0.8,
            memory_threshold: 0.8,
        }
    }
}

impl EngineConfig {
    /// Get the default config directory path (`~/.pivot`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        use dirs::home_dir;
        let home = home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".pivot"))
    }

    /// Get the default config file path (`~/.pivot/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location (`~/.pivot/config.toml`)
    /// If the config doesn't exist, creates it with default values
    ///
    /// # Errors
    /// Returns an error if the config cannot be read or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or fails validation
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        tracing::debug!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = self.to_toml()?;
        let header = "# Pivot Engine Configuration File\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to customize your settings\n\n";

        fs::write(path, format!("{header}{contents}"))?;
        Ok(())
    }

    /// Render the config as TOML
    ///
    /// # Errors
    /// Returns an error if serialization fails
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks parameter ranges and switching thresholds.
    ///
    /// # Errors
    /// Returns an error if any parameter or threshold is out of range
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        let weights = [
            self.scoring.concurrency,
            self.scoring.memory,
            self.scoring.performance,
        ];
        if weights.iter().any(|weight| !weight.is_finite() || *weight < 0.0) {
            return Err(Error::Config(
                "scoring weights must be finite and non-negative".to_owned(),
            ));
        }
        let thresholds = [
            self.switching.failure_rate_threshold,
            self.switching.load_threshold,
            self.switching.memory_threshold,
        ];
        if thresholds.iter().any(|threshold| !threshold.is_finite()) {
            return Err(Error::Config(
                "switching thresholds must be finite".to_owned(),
            ));
        }
        Ok(())
    }
}
