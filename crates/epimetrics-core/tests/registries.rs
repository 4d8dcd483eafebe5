use epimetrics_core::registry::{
    classify, excluded_from_outlier_capping, prune_list, world_aggregation, ColumnClass,
    FeatureFamily, WorldAggregation,
};

#[test]
fn registries_are_populated() {
    assert_eq!(classify("total_cases"), ColumnClass::Cumulative);
    assert_eq!(classify("new_deaths"), ColumnClass::Delta);
    assert_eq!(classify("median_age"), ColumnClass::Static);
    assert_eq!(classify("location"), ColumnClass::Identity);
    assert_eq!(classify("hosp_patients"), ColumnClass::Measure);
    assert_eq!(
        classify("new_cases_ma14"),
        ColumnClass::Derived(FeatureFamily::MovingAverage)
    );

    assert_eq!(world_aggregation("new_cases"), WorldAggregation::Sum);
    assert_eq!(world_aggregation("population"), WorldAggregation::PopulationTotal);
    assert_eq!(world_aggregation("gdp_per_capita"), WorldAggregation::PopulationWeighted);
    assert_eq!(world_aggregation("reproduction_rate"), WorldAggregation::Skip);
}

#[test]
fn substring_lookalikes_are_not_misclassified() {
    // Would match "new_" or "total_" heuristics, but are not registered.
    assert_eq!(classify("new_hampshire_index"), ColumnClass::Measure);
    assert_eq!(classify("total_rainfall_ma7"), ColumnClass::Measure);
    assert_eq!(classify("weekly_rate_lag2"), ColumnClass::Measure);
}

#[test]
fn capping_exclusions_and_pruning_follow_the_registry() {
    assert!(excluded_from_outlier_capping("population", &[]));
    assert!(excluded_from_outlier_capping("day_of_week", &[]));
    assert!(!excluded_from_outlier_capping("new_cases", &[]));
    assert!(excluded_from_outlier_capping("new_cases", &["new_cases".to_string()]));

    let present: Vec<String> = [
        "location",
        "new_cases",
        "new_cases_lag7",
        "month",
        "total_cases_growth_rate",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect();
    let pruned = prune_list(
        &present,
        &[FeatureFamily::Lag, FeatureFamily::Temporal],
        &["location".to_string()],
    );
    assert_eq!(pruned, vec!["location", "new_cases_lag7", "month"]);
}
