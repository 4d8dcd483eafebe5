use std::time::Instant;

use once_cell::sync::Lazy;
use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{info, info_span};

use crate::acquisition::{self, Fetcher, SourceReport};
use crate::cleaning::{self, CleaningReport};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::features::{self, FeatureReport};
use crate::frame::distinct_locations;
use crate::imputation::{self, ImputationReport};

/// One step of the fixed transformation sequence. Each stage consumes the
/// whole table produced by its predecessor and returns a replacement.
pub trait PipelineStage: Send + Sync {
    fn code_identifier(&self) -> &'static str;
    fn transform(
        &self,
        table: &DataFrame,
        config: &PipelineConfig,
        report: &mut RunReport,
    ) -> Result<DataFrame>;
}

pub struct CleaningStage;
pub struct ImputationStage;
pub struct FeatureStage;

impl PipelineStage for CleaningStage {
    fn code_identifier(&self) -> &'static str {
        "cleaning"
    }

    fn transform(
        &self,
        table: &DataFrame,
        config: &PipelineConfig,
        report: &mut RunReport,
    ) -> Result<DataFrame> {
        let (cleaned, stage_report) = cleaning::clean(table, &config.cleaning)?;
        report.cleaning = Some(stage_report);
        Ok(cleaned)
    }
}

impl PipelineStage for ImputationStage {
    fn code_identifier(&self) -> &'static str {
        "imputation"
    }

    fn transform(
        &self,
        table: &DataFrame,
        config: &PipelineConfig,
        report: &mut RunReport,
    ) -> Result<DataFrame> {
        let (imputed, stage_report) = imputation::impute(table, &config.imputation)?;
        report.imputation = Some(stage_report);
        Ok(imputed)
    }
}

impl PipelineStage for FeatureStage {
    fn code_identifier(&self) -> &'static str {
        "feature_derivation"
    }

    fn transform(
        &self,
        table: &DataFrame,
        config: &PipelineConfig,
        report: &mut RunReport,
    ) -> Result<DataFrame> {
        let (derived, stage_report) = features::derive_features(table, &config.features)?;
        report.features = Some(stage_report);
        Ok(derived)
    }
}

static STAGES: Lazy<Vec<&'static dyn PipelineStage>> = Lazy::new(|| {
    vec![
        &CleaningStage as &dyn PipelineStage,
        &ImputationStage,
        &FeatureStage,
    ]
});

/// The stages in execution order.
pub fn all_stages() -> &'static [&'static dyn PipelineStage] {
    STAGES.as_slice()
}

#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: &'static str,
    pub elapsed_ms: u64,
    pub rows_out: usize,
    pub columns_out: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub source: Option<SourceReport>,
    pub cleaning: Option<CleaningReport>,
    pub imputation: Option<ImputationReport>,
    pub features: Option<FeatureReport>,
    pub timings: Vec<StageTiming>,
    pub rows: usize,
    pub columns: usize,
    pub locations: usize,
}

#[derive(Debug)]
pub struct PipelineOutput {
    pub table: DataFrame,
    pub report: RunReport,
}

/// Validates the configuration, acquires the source and runs every stage.
pub fn run_pipeline(config: &PipelineConfig, fetcher: &dyn Fetcher) -> Result<PipelineOutput> {
    config.validate()?;
    let mut report = RunReport::default();

    let started = Instant::now();
    let acquired = {
        let _span = info_span!("stage", name = "acquisition").entered();
        acquisition::acquire(config, fetcher)?
    };
    report.timings.push(StageTiming {
        stage: "acquisition",
        elapsed_ms: started.elapsed().as_millis() as u64,
        rows_out: acquired.table.height(),
        columns_out: acquired.table.width(),
    });
    report.source = Some(acquired.report);

    let table = run_stages(acquired.table, config, &mut report)?;
    Ok(PipelineOutput { table, report })
}

/// Runs the stages over an already acquired table.
pub fn run_stages(
    table: DataFrame,
    config: &PipelineConfig,
    report: &mut RunReport,
) -> Result<DataFrame> {
    if table.height() == 0 {
        return Err(PipelineError::EmptyTable {
            stage: "acquisition",
        });
    }

    let mut table = table;
    for stage in all_stages() {
        let stage_name = stage.code_identifier();
        let _span = info_span!("stage", name = stage_name).entered();
        let started = Instant::now();

        table = stage.transform(&table, config, report)?;
        if table.height() == 0 {
            return Err(PipelineError::EmptyTable { stage: stage_name });
        }

        report.timings.push(StageTiming {
            stage: stage_name,
            elapsed_ms: started.elapsed().as_millis() as u64,
            rows_out: table.height(),
            columns_out: table.width(),
        });
    }

    report.rows = table.height();
    report.columns = table.width();
    report.locations = distinct_locations(&table)?;
    info!(
        rows = report.rows,
        columns = report.columns,
        locations = report.locations,
        "pipeline complete"
    );
    Ok(table)
}
