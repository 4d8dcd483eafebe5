use anyhow::Result;
use epimetrics_core::cleaning::normalize_dates;
use epimetrics_core::config::FeatureConfig;
use epimetrics_core::features::{derive_features, FeatureError};
use epimetrics_core::frame::f64_values;
use polars::prelude::*;

fn with_dates(df: DataFrame) -> Result<DataFrame> {
    let (normalized, invalid, _) = normalize_dates(&df)?;
    assert_eq!(invalid, 0);
    Ok(normalized)
}

fn three_days() -> Vec<&'static str> {
    vec!["2021-01-01", "2021-01-02", "2021-01-03"]
}

#[test]
fn per_capita_with_zero_or_missing_population_is_missing() -> Result<()> {
    let df = with_dates(df!(
        "location" => &["Alpha", "Beta", "Gamma"],
        "date" => &["2021-01-01", "2021-01-01", "2021-01-01"],
        "total_cases" => &[10.0, 10.0, 10.0],
        "population" => &[Some(0.0), None, Some(1000.0)],
    )?)?;

    let (out, _) = derive_features(&df, &FeatureConfig::default())?;
    let per_million = f64_values(&out, "total_cases_per_million")?;
    assert_eq!(per_million, vec![None, None, Some(10_000.0)]);
    Ok(())
}

#[test]
fn growth_rate_from_zero_is_missing_and_large_jumps_are_clipped() -> Result<()> {
    let df = with_dates(df!(
        "location" => &["Alpha", "Alpha", "Alpha"],
        "date" => three_days(),
        "total_cases" => &[0.0, 5.0, 255.0],
    )?)?;

    let (out, _) = derive_features(&df, &FeatureConfig::default())?;
    let growth = f64_values(&out, "total_cases_growth_rate")?;
    assert_eq!(growth, vec![None, None, Some(1000.0)]);
    Ok(())
}

#[test]
fn ratios_never_divide_by_zero() -> Result<()> {
    let df = with_dates(df!(
        "location" => &["Alpha", "Alpha", "Alpha"],
        "date" => three_days(),
        "total_cases" => &[0.0, 50.0, 100.0],
        "total_deaths" => &[0.0, 1.0, 2.0],
    )?)?;

    let (out, report) = derive_features(&df, &FeatureConfig::default())?;
    let cfr = f64_values(&out, "case_fatality_rate")?;
    assert_eq!(cfr, vec![None, Some(2.0), Some(2.0)]);
    assert_eq!(report.summary.get("rate"), Some(&1));
    Ok(())
}

#[test]
fn intermediate_features_are_pruned_but_reported() -> Result<()> {
    let df = with_dates(df!(
        "location" => &["Alpha", "Alpha", "Alpha"],
        "date" => three_days(),
        "new_cases" => &[1.0, 2.0, 3.0],
    )?)?;

    let (out, report) = derive_features(&df, &FeatureConfig::default())?;
    for pruned in ["new_cases_ma7", "new_cases_lag1", "year", "days_since_first_case"] {
        assert!(out.column(pruned).is_err(), "{pruned} should be pruned");
        assert!(report.created.iter().any(|name| name == pruned));
        assert!(report.pruned.iter().any(|name| name == pruned));
    }

    // Rebuilt running total survives pruning.
    assert_eq!(
        f64_values(&out, "total_cases")?,
        vec![Some(1.0), Some(3.0), Some(6.0)]
    );
    Ok(())
}

#[test]
fn features_are_computed_per_entity() -> Result<()> {
    let df = with_dates(df!(
        "location" => &["Alpha", "Alpha", "Beta", "Beta"],
        "date" => &["2021-01-01", "2021-01-02", "2021-01-01", "2021-01-02"],
        "new_cases" => &[10.0, 20.0, 100.0, 300.0],
    )?)?;

    let config = FeatureConfig {
        prune_families: Vec::new(),
        include_difference: true,
        ..FeatureConfig::default()
    };
    let (out, _) = derive_features(&df, &config)?;
    assert_eq!(
        f64_values(&out, "new_cases_lag1")?,
        vec![None, Some(10.0), None, Some(100.0)]
    );
    assert_eq!(
        f64_values(&out, "new_cases_ma7")?,
        vec![Some(10.0), Some(15.0), Some(100.0), Some(200.0)]
    );
    assert_eq!(
        f64_values(&out, "new_cases_diff")?,
        vec![None, Some(10.0), None, Some(200.0)]
    );
    assert_eq!(
        f64_values(&out, "days_since_first_case")?,
        vec![Some(0.0), Some(1.0), Some(0.0), Some(1.0)]
    );
    Ok(())
}

#[test]
fn text_dates_are_rejected() -> Result<()> {
    let df = df!(
        "location" => &["Alpha"],
        "date" => &["2021-01-01"],
        "new_cases" => &[1.0],
    )?;
    let err = derive_features(&df, &FeatureConfig::default())
        .expect_err("dates must be normalised first");
    assert!(matches!(err, FeatureError::DateNotNormalized(_)));
    Ok(())
}
