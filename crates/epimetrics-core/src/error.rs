use thiserror::Error;

use crate::acquisition::AcquisitionError;
use crate::cleaning::CleaningError;
use crate::config::ConfigError;
use crate::features::FeatureError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Cleaning failed: {0}")]
    Cleaning(#[from] CleaningError),

    #[error("Feature derivation failed: {0}")]
    Features(#[from] FeatureError),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("stage '{stage}' produced an empty table")]
    EmptyTable { stage: &'static str },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
