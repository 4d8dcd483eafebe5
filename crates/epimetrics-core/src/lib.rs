pub mod acquisition;
pub mod cleaning;
pub mod config;
pub mod error;
pub mod features;
pub mod frame;
pub mod imputation;
pub mod pipeline;
pub mod registry;
pub mod store;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{run_pipeline, run_stages, PipelineOutput, RunReport};
pub use store::{DataStore, Snapshot};
