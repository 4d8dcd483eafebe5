mod common;

use anyhow::Result;
use epimetrics_core::acquisition::OfflineFetcher;
use epimetrics_core::frame::{f64_values, str_values};
use epimetrics_core::pipeline::{all_stages, run_pipeline, run_stages, RunReport};
use epimetrics_core::{PipelineConfig, PipelineError};
use polars::prelude::*;
use tempfile::tempdir;

#[test]
fn stages_run_in_fixed_order() {
    let codes: Vec<&str> = all_stages()
        .iter()
        .map(|stage| stage.code_identifier())
        .collect();
    assert_eq!(codes, vec!["cleaning", "imputation", "feature_derivation"]);
}

#[test]
fn two_entities_end_to_end() -> Result<()> {
    let dir = tempdir()?;
    let local = common::write_fixture(dir.path())?;
    let config = common::local_config(dir.path(), local);

    let output = run_pipeline(&config, &OfflineFetcher)?;
    let table = &output.table;

    // 2 x 10 rows, minus Alpha's two invalid dates, plus one World row per valid date.
    assert_eq!(table.height(), 2 * 10 - 2 + 10);
    assert_eq!(output.report.rows, table.height());
    assert_eq!(output.report.locations, 3);
    assert_eq!(table.column("date")?.dtype(), &DataType::Date);

    let cleaning = output.report.cleaning.as_ref().expect("cleaning report");
    // Alpha's rows and the World rows built for the same two bad dates.
    assert_eq!(cleaning.invalid_dates_removed, 4);

    let locations = str_values(table, "location")?;
    let median_age = f64_values(table, "median_age")?;
    for (location, age) in locations.iter().zip(&median_age) {
        match location.as_deref() {
            Some("Alpha") => assert_eq!(*age, Some(40.0)),
            Some("Beta") => assert_eq!(*age, None, "Beta's static stays missing"),
            _ => {}
        }
    }

    let stages: Vec<&str> = output.report.timings.iter().map(|t| t.stage).collect();
    assert_eq!(
        stages,
        vec!["acquisition", "cleaning", "imputation", "feature_derivation"]
    );

    assert!(table.column("total_cases_per_million").is_ok());
    assert!(table.column("total_cases_growth_rate").is_ok());
    assert!(table.column("new_cases_ma7").is_err(), "pruned");
    Ok(())
}

#[test]
fn invalid_configuration_is_rejected_before_loading() {
    let mut config = PipelineConfig::default();
    config.features.lags = vec![0];
    let err = run_pipeline(&config, &OfflineFetcher).expect_err("zero lag");
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn stage_emptying_the_table_aborts() -> Result<()> {
    let df = df!(
        "location" => &["Alpha", "Alpha"],
        "date" => &["someday", "never"],
        "new_cases" => &[1.0, 2.0],
    )?;
    let mut report = RunReport::default();
    let err = run_stages(df, &PipelineConfig::default(), &mut report)
        .expect_err("every date is invalid");
    assert!(matches!(err, PipelineError::EmptyTable { stage: "cleaning" }));
    Ok(())
}
