//! Process-wide holder of the finished table.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use tracing::{info, warn};

use crate::acquisition::Fetcher;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::{run_pipeline, PipelineOutput, RunReport};

/// An immutable build of the pipeline output.
#[derive(Debug)]
pub struct Snapshot {
    pub table: DataFrame,
    pub report: RunReport,
    pub built_at: DateTime<Utc>,
}

/// Readers get the current snapshot through a cheap `Arc` clone; a rebuild
/// constructs the replacement first and swaps it in only on success, so a
/// failed rebuild leaves the previous snapshot serving.
#[derive(Default)]
pub struct DataStore {
    current: RwLock<Option<Arc<Snapshot>>>,
    rebuild_lock: Mutex<()>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild(&self, config: &PipelineConfig, fetcher: &dyn Fetcher) -> Result<Arc<Snapshot>> {
        self.rebuild_with(|| run_pipeline(config, fetcher))
    }

    /// Serialised against other rebuilds; `build` runs outside the read lock.
    pub fn rebuild_with<F>(&self, build: F) -> Result<Arc<Snapshot>>
    where
        F: FnOnce() -> Result<PipelineOutput>,
    {
        let _guard = self
            .rebuild_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let output = match build() {
            Ok(output) => output,
            Err(err) => {
                warn!(error = %err, "rebuild failed; keeping previous snapshot");
                return Err(err);
            }
        };

        let snapshot = Arc::new(Snapshot {
            table: output.table,
            report: output.report,
            built_at: Utc::now(),
        });

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        info!(
            rows = snapshot.table.height(),
            columns = snapshot.table.width(),
            "snapshot replaced"
        );
        Ok(snapshot)
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
