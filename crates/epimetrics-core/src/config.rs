use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::acquisition::SourceId;
use crate::registry::FeatureFamily;

pub const DATA_DIR_ENV: &str = "EPIMETRICS_DATA_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub acquisition: AcquisitionConfig,
    pub cleaning: CleaningConfig,
    pub imputation: ImputationConfig,
    pub features: FeatureConfig,
    /// Keep only these locations after acquisition. `None` keeps everything.
    pub locations: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub source: String,
    pub local_path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub force_download: bool,
    pub allow_synthetic: bool,
    pub timeout_secs: u64,
    pub synthetic_start: NaiveDate,
    pub synthetic_end: NaiveDate,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            source: "owid".to_string(),
            local_path: None,
            data_dir: PathBuf::from("data"),
            force_download: false,
            allow_synthetic: true,
            timeout_secs: 60,
            synthetic_start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            synthetic_end: NaiveDate::from_ymd_opt(2025, 10, 24).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierMethod {
    Iqr,
    Zscore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub missing_threshold: f64,
    pub outlier_method: OutlierMethod,
    /// IQR multiplier, or the number of standard deviations for z-score capping.
    pub outlier_factor: f64,
    /// Columns exempt from capping on top of the registry exclusions.
    pub outlier_exclusions: Vec<String>,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            missing_threshold: 0.5,
            outlier_method: OutlierMethod::Iqr,
            outlier_factor: 3.0,
            outlier_exclusions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackStatistic {
    Median,
    Mean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImputationConfig {
    pub interpolation_limit: usize,
    pub fallback: FallbackStatistic,
}

impl Default for ImputationConfig {
    fn default() -> Self {
        Self {
            interpolation_limit: 7,
            fallback: FallbackStatistic::Median,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub moving_average_windows: Vec<usize>,
    pub lags: Vec<usize>,
    pub growth_periods: usize,
    pub growth_clip: f64,
    pub include_difference: bool,
    pub prune_families: Vec<FeatureFamily>,
    pub prune_columns: Vec<String>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            moving_average_windows: vec![7, 14],
            lags: vec![1, 7, 14],
            growth_periods: 1,
            growth_clip: 1000.0,
            include_difference: false,
            prune_families: vec![
                FeatureFamily::Temporal,
                FeatureFamily::MovingAverage,
                FeatureFamily::Lag,
                FeatureFamily::Difference,
            ],
            prune_columns: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Applies `EPIMETRICS_DATA_DIR` when it is set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.acquisition.data_dir = PathBuf::from(dir);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let acquisition = &self.acquisition;
        if SourceId::parse(&acquisition.source).is_err() {
            return Err(ConfigError::invalid(
                "acquisition.source",
                format!("unknown source identifier '{}'", acquisition.source),
            ));
        }
        if acquisition.timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "acquisition.timeout_secs",
                "must be greater than zero",
            ));
        }
        if acquisition.synthetic_end < acquisition.synthetic_start {
            return Err(ConfigError::invalid(
                "acquisition.synthetic_end",
                "must not precede synthetic_start",
            ));
        }

        let cleaning = &self.cleaning;
        if !(0.0..=1.0).contains(&cleaning.missing_threshold) {
            return Err(ConfigError::invalid(
                "cleaning.missing_threshold",
                format!("{} is outside [0, 1]", cleaning.missing_threshold),
            ));
        }
        if !(cleaning.outlier_factor.is_finite() && cleaning.outlier_factor > 0.0) {
            return Err(ConfigError::invalid(
                "cleaning.outlier_factor",
                "must be a positive number",
            ));
        }

        if self.imputation.interpolation_limit == 0 {
            return Err(ConfigError::invalid(
                "imputation.interpolation_limit",
                "must be greater than zero",
            ));
        }

        let features = &self.features;
        if features.moving_average_windows.is_empty() {
            return Err(ConfigError::invalid(
                "features.moving_average_windows",
                "at least one window is required",
            ));
        }
        if features.moving_average_windows.contains(&0) {
            return Err(ConfigError::invalid(
                "features.moving_average_windows",
                "windows must be positive",
            ));
        }
        if features.lags.is_empty() {
            return Err(ConfigError::invalid(
                "features.lags",
                "at least one lag is required",
            ));
        }
        if features.lags.contains(&0) {
            return Err(ConfigError::invalid("features.lags", "lags must be positive"));
        }
        if features.growth_periods == 0 {
            return Err(ConfigError::invalid(
                "features.growth_periods",
                "must be greater than zero",
            ));
        }
        if !(features.growth_clip.is_finite() && features.growth_clip > 0.0) {
            return Err(ConfigError::invalid(
                "features.growth_clip",
                "must be a positive number",
            ));
        }

        if let Some(locations) = &self.locations {
            if locations.is_empty() {
                return Err(ConfigError::invalid(
                    "locations",
                    "an empty filter would remove every row",
                ));
            }
        }

        Ok(())
    }
}
