use anyhow::Result;
use epimetrics_core::acquisition::aggregate::recompute_world;
use epimetrics_core::frame::{f64_values, str_values};
use polars::prelude::*;

fn world_row(df: &DataFrame, date: &str) -> Result<usize> {
    let locations = str_values(df, "location")?;
    let dates = str_values(df, "date")?;
    locations
        .iter()
        .zip(&dates)
        .position(|(location, row_date)| {
            location.as_deref() == Some("World") && row_date.as_deref() == Some(date)
        })
        .ok_or_else(|| anyhow::anyhow!("no World row for {date}"))
}

fn three_countries() -> Result<DataFrame> {
    Ok(df!(
        "iso_code" => &[Some("AAA"), Some("BBB"), Some("CCC"), Some("OWID_ASI")],
        "continent" => &[Some("Asia"), Some("Asia"), Some("Europe"), None],
        "location" => &["Alpha", "Beta", "Gamma", "Asia"],
        "date" => &["2021-01-01", "2021-01-01", "2021-01-01", "2021-01-01"],
        "total_cases" => &[100.0, 200.0, 300.0, 600.0],
        "new_deaths" => &[None::<f64>, None, None, Some(4.0)],
        "population" => &[1000.0, 2000.0, 3000.0, 6000.0],
        "median_age" => &[10.0, 20.0, 30.0, 20.0],
    )?)
}

#[test]
fn world_row_sums_counts_and_weights_statics() -> Result<()> {
    let out = recompute_world(&three_countries()?)?;

    // Asia is an upstream aggregate and is dropped; one World row is added.
    assert_eq!(out.height(), 4);
    assert!(!str_values(&out, "location")?
        .iter()
        .any(|location| location.as_deref() == Some("Asia")));

    let idx = world_row(&out, "2021-01-01")?;
    assert_eq!(f64_values(&out, "total_cases")?[idx], Some(600.0));
    assert_eq!(f64_values(&out, "population")?[idx], Some(6000.0));

    let median_age = f64_values(&out, "median_age")?[idx].expect("weighted median age");
    assert!((median_age - 70_000.0 / 3_000.0).abs() < 1e-9);
    assert!((median_age - 23.33).abs() < 0.01);

    assert_eq!(str_values(&out, "iso_code")?[idx].as_deref(), Some("OWID_WRL"));
    assert_eq!(str_values(&out, "continent")?[idx].as_deref(), Some("Global"));
    Ok(())
}

#[test]
fn unobserved_sums_stay_missing() -> Result<()> {
    let out = recompute_world(&three_countries()?)?;
    let idx = world_row(&out, "2021-01-01")?;
    assert_eq!(f64_values(&out, "new_deaths")?[idx], None);
    Ok(())
}

#[test]
fn existing_world_rows_are_replaced() -> Result<()> {
    let df = df!(
        "continent" => &[Some("Africa"), Some("Africa"), None, Some("Africa"), Some("Africa"), None],
        "location" => &["Kenya", "Egypt", "World", "Kenya", "Egypt", "World"],
        "date" => &["2021-01-01", "2021-01-01", "2021-01-01", "2021-01-02", "2021-01-02", "2021-01-02"],
        "new_cases" => &[1.0, 2.0, 999.0, 3.0, 4.0, 999.0],
        "population" => &[10.0, 20.0, 999.0, 10.0, 30.0, 999.0],
    )?;
    let out = recompute_world(&df)?;
    assert_eq!(out.height(), 6);

    let new_cases = f64_values(&out, "new_cases")?;
    assert_eq!(new_cases[world_row(&out, "2021-01-01")?], Some(3.0));
    assert_eq!(new_cases[world_row(&out, "2021-01-02")?], Some(7.0));

    // Population comes from each country's latest record.
    let population = f64_values(&out, "population")?;
    assert_eq!(population[world_row(&out, "2021-01-01")?], Some(40.0));
    Ok(())
}

#[test]
fn table_without_countries_is_returned_unchanged() -> Result<()> {
    let df = df!(
        "continent" => &[None::<&str>, None],
        "location" => &["World", "Europe"],
        "date" => &["2021-01-01", "2021-01-01"],
        "new_cases" => &[5.0, 2.0],
    )?;
    let out = recompute_world(&df)?;
    assert!(out.equals_missing(&df));
    Ok(())
}

#[test]
fn zero_total_population_leaves_weighted_statics_missing() -> Result<()> {
    let df = df!(
        "continent" => &[Some("Oceania"), Some("Oceania")],
        "location" => &["Nauru", "Tuvalu"],
        "date" => &["2021-01-01", "2021-01-01"],
        "new_cases" => &[1.0, 2.0],
        "population" => &[0.0, 0.0],
        "median_age" => &[30.0, 40.0],
    )?;
    let out = recompute_world(&df)?;
    let idx = world_row(&out, "2021-01-01")?;

    assert_eq!(f64_values(&out, "population")?[idx], Some(0.0));
    assert_eq!(f64_values(&out, "median_age")?[idx], None);
    assert_eq!(f64_values(&out, "new_cases")?[idx], Some(3.0));
    Ok(())
}
