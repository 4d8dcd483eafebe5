use anyhow::Result;
use epimetrics_core::config::{ConfigError, FallbackStatistic, OutlierMethod, PipelineConfig};
use epimetrics_core::registry::FeatureFamily;

#[test]
fn empty_toml_yields_defaults() -> Result<()> {
    let config = PipelineConfig::from_toml_str("")?;
    assert_eq!(config.acquisition.source, "owid");
    assert_eq!(config.cleaning.missing_threshold, 0.5);
    assert_eq!(config.imputation.interpolation_limit, 7);
    assert_eq!(config.features.moving_average_windows, vec![7, 14]);
    assert_eq!(config.features.lags, vec![1, 7, 14]);
    assert!(config.locations.is_none());
    Ok(())
}

#[test]
fn toml_sections_override_defaults() -> Result<()> {
    let config = PipelineConfig::from_toml_str(
        r#"
        locations = ["Peru", "Chile"]

        [acquisition]
        source = "owid_latest"
        allow_synthetic = false
        synthetic_start = "2021-01-01"
        synthetic_end = "2021-03-01"

        [cleaning]
        outlier_method = "zscore"
        outlier_factor = 2.5
        outlier_exclusions = ["stringency_index"]

        [imputation]
        fallback = "mean"

        [features]
        moving_average_windows = [3]
        prune_families = ["lag"]
        "#,
    )?;

    assert_eq!(config.acquisition.source, "owid_latest");
    assert!(!config.acquisition.allow_synthetic);
    assert_eq!(config.cleaning.outlier_method, OutlierMethod::Zscore);
    assert_eq!(config.imputation.fallback, FallbackStatistic::Mean);
    assert_eq!(config.features.moving_average_windows, vec![3]);
    assert_eq!(config.features.prune_families, vec![FeatureFamily::Lag]);
    assert_eq!(
        config.locations,
        Some(vec!["Peru".to_string(), "Chile".to_string()])
    );
    Ok(())
}

#[test]
fn invalid_values_are_rejected_not_corrected() {
    let cases = [
        ("[acquisition]\nsource = \"jhu\"", "acquisition.source"),
        ("[cleaning]\nmissing_threshold = 1.5", "cleaning.missing_threshold"),
        ("[features]\nmoving_average_windows = [0]", "features.moving_average_windows"),
        ("[features]\nlags = []", "features.lags"),
        ("[imputation]\ninterpolation_limit = 0", "imputation.interpolation_limit"),
        ("locations = []", "locations"),
    ];
    for (toml, expected) in cases {
        match PipelineConfig::from_toml_str(toml) {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
            other => panic!("expected {expected} to be rejected, got {other:?}"),
        }
    }
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let err = PipelineConfig::from_toml_str("[features\nlags = 1").expect_err("bad toml");
    assert!(matches!(err, ConfigError::Parse(_)));
}
