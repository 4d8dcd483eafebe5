use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{CleaningConfig, OutlierMethod};
use crate::frame::{
    count_nulls, date_series, date_to_days, entity_groups, f64_values, filter_rows, has_column,
    is_numeric_dtype, numeric_columns, replace_f64, sort_by_entity_date, str_values,
};
use crate::registry::{self, DATE, LOCATION};

const MAX_INVALID_DATE_SAMPLES: usize = 10;

#[derive(Error, Debug)]
pub enum CleaningError {
    #[error("Polars operation failed: {0}")]
    Polars(#[from] PolarsError),

    #[error("date column has unsupported type {0}")]
    UnsupportedDateType(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub duplicates_removed: usize,
    pub columns_dropped: Vec<String>,
    pub invalid_dates_removed: usize,
    pub invalid_date_samples: Vec<String>,
    pub negatives_clamped: usize,
    pub infinities_removed: usize,
    pub outliers_capped: usize,
}

pub fn clean(
    df: &DataFrame,
    config: &CleaningConfig,
) -> Result<(DataFrame, CleaningReport), CleaningError> {
    info!(rows = df.height(), columns = df.width(), "starting cleaning");
    let mut report = CleaningReport {
        rows_in: df.height(),
        ..CleaningReport::default()
    };

    let (table, duplicates) = remove_duplicates(df)?;
    report.duplicates_removed = duplicates;

    let (table, dropped) = drop_sparse_columns(&table, config.missing_threshold)?;
    report.columns_dropped = dropped;

    let (table, invalid, samples) = normalize_dates(&table)?;
    report.invalid_dates_removed = invalid;
    report.invalid_date_samples = samples;

    let (table, infinities, negatives) = sanitize_numeric(&table)?;
    report.infinities_removed = infinities;
    report.negatives_clamped = negatives;

    let (table, capped) = cap_outliers(&table, config)?;
    report.outliers_capped = capped;
    report.rows_out = table.height();

    info!(
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        duplicates_removed = report.duplicates_removed,
        columns_dropped = report.columns_dropped.len(),
        invalid_dates_removed = report.invalid_dates_removed,
        negatives_clamped = report.negatives_clamped,
        infinities_removed = report.infinities_removed,
        outliers_capped = report.outliers_capped,
        "cleaning complete"
    );

    Ok((table, report))
}

/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, and datetimes whose date part is
/// ISO formatted (`2021-03-04T10:00:00`, `2021-03-04 10:00`).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y/%m/%d") {
        return Some(date);
    }
    match (value.get(..10), value.as_bytes().get(10)) {
        (Some(prefix), Some(b'T') | Some(b' ')) => {
            NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
        }
        _ => None,
    }
}

/// Keeps the last row per (location, date) when both columns exist,
/// otherwise the first of every group of identical rows.
pub fn remove_duplicates(df: &DataFrame) -> PolarsResult<(DataFrame, usize)> {
    let height = df.height();
    let keep: Vec<bool> = if has_column(df, LOCATION) && has_column(df, DATE) {
        let locations = str_values(df, LOCATION)?;
        let dates = date_keys(df)?;

        let mut last: HashMap<(Option<&str>, Option<String>), usize> = HashMap::new();
        for idx in 0..height {
            last.insert((locations[idx].as_deref(), dates[idx].clone()), idx);
        }
        (0..height)
            .map(|idx| last.get(&(locations[idx].as_deref(), dates[idx].clone())) == Some(&idx))
            .collect()
    } else {
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut keep = Vec::with_capacity(height);
        for idx in 0..height {
            let mut row = Vec::with_capacity(df.width());
            for column in df.get_columns() {
                row.push(column.get(idx)?.to_string());
            }
            keep.push(seen.insert(row));
        }
        keep
    };

    let removed = keep.iter().filter(|kept| !**kept).count();
    if removed == 0 {
        return Ok((df.clone(), 0));
    }
    info!(removed, "removed duplicate rows");
    Ok((filter_rows(df, &keep)?, removed))
}

/// Dedup key for the date column: the normalised date when it parses, the raw
/// text otherwise.
fn date_keys(df: &DataFrame) -> PolarsResult<Vec<Option<String>>> {
    let column = df.column(DATE)?;
    if column.dtype() == &DataType::String {
        return Ok(column
            .str()?
            .into_iter()
            .map(|value| {
                value.map(|raw| match parse_date(raw) {
                    Some(date) => date.to_string(),
                    None => raw.to_string(),
                })
            })
            .collect());
    }
    let text = column.cast(&DataType::String)?;
    Ok(text
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

/// Missing shares are taken over the rows `normalize_dates` will keep.
/// Non-finite numbers count as missing.
pub fn drop_sparse_columns(
    df: &DataFrame,
    threshold: f64,
) -> PolarsResult<(DataFrame, Vec<String>)> {
    let surviving = rows_with_valid_dates(df)?;
    let kept = surviving.iter().filter(|kept| **kept).count();
    if kept == 0 {
        return Ok((df.clone(), Vec::new()));
    }

    let mut dropped = Vec::new();
    for column in df.get_columns() {
        let name = column.name().as_str();
        if registry::is_essential(name) {
            continue;
        }
        let missing_flags: Vec<bool> = if is_numeric_dtype(column.dtype()) {
            f64_values(df, name)?
                .iter()
                .map(|value| !value.is_some_and(f64::is_finite))
                .collect()
        } else {
            column
                .as_materialized_series()
                .is_null()
                .into_iter()
                .map(|flag| flag.unwrap_or(true))
                .collect()
        };
        let missing = missing_flags
            .iter()
            .zip(&surviving)
            .filter(|(missing, kept)| **missing && **kept)
            .count();
        if missing as f64 / kept as f64 > threshold {
            dropped.push(name.to_string());
        }
    }

    if dropped.is_empty() {
        return Ok((df.clone(), dropped));
    }

    info!(
        count = dropped.len(),
        threshold,
        columns = ?dropped,
        "dropped sparse columns"
    );
    let table = df.drop_many(dropped.iter().map(String::as_str));
    Ok((table, dropped))
}

/// Rows `normalize_dates` keeps. Every row when there is no date column.
fn rows_with_valid_dates(df: &DataFrame) -> PolarsResult<Vec<bool>> {
    let Ok(column) = df.column(DATE) else {
        return Ok(vec![true; df.height()]);
    };
    Ok(match column.dtype() {
        DataType::String => column
            .str()?
            .into_iter()
            .map(|raw| raw.and_then(parse_date).is_some())
            .collect(),
        DataType::Date | DataType::Datetime(_, _) => column
            .as_materialized_series()
            .is_not_null()
            .into_iter()
            .map(|flag| flag.unwrap_or(false))
            .collect(),
        _ => vec![true; df.height()],
    })
}

/// Converts the date column to `Date`, drops rows whose date cannot be
/// parsed, and sorts by (location, date).
pub fn normalize_dates(df: &DataFrame) -> Result<(DataFrame, usize, Vec<String>), CleaningError> {
    let Ok(column) = df.column(DATE) else {
        warn!("no date column found; skipping date normalisation");
        return Ok((df.clone(), 0, Vec::new()));
    };

    let (days, samples): (Vec<Option<i32>>, Vec<String>) = match column.dtype() {
        DataType::Date => {
            let days = column.cast(&DataType::Int32)?;
            (days.i32()?.into_iter().collect(), Vec::new())
        }
        DataType::Datetime(_, _) => {
            let days = column.cast(&DataType::Date)?.cast(&DataType::Int32)?;
            (days.i32()?.into_iter().collect(), Vec::new())
        }
        DataType::String => {
            let mut samples = Vec::new();
            let days: Vec<Option<i32>> = column
                .str()?
                .into_iter()
                .map(|raw| {
                    let parsed = raw.and_then(parse_date).map(date_to_days);
                    if parsed.is_none() && samples.len() < MAX_INVALID_DATE_SAMPLES {
                        let sample = raw.unwrap_or("<missing>").to_string();
                        if !samples.contains(&sample) {
                            samples.push(sample);
                        }
                    }
                    parsed
                })
                .collect();
            (days, samples)
        }
        other => return Err(CleaningError::UnsupportedDateType(other.to_string())),
    };

    let keep: Vec<bool> = days.iter().map(Option::is_some).collect();
    let invalid = keep.iter().filter(|kept| !**kept).count();

    let mut table = df.clone();
    table.with_column(date_series(DATE, days)?)?;
    if invalid > 0 {
        warn!(removed = invalid, samples = ?samples, "removing rows with invalid dates");
        table = filter_rows(&table, &keep)?;
    }

    Ok((sort_by_entity_date(&table)?, invalid, samples))
}

/// Infinities become missing; negative values in non-negative columns clamp
/// to zero. Returns (infinities removed, negatives clamped).
pub fn sanitize_numeric(df: &DataFrame) -> PolarsResult<(DataFrame, usize, usize)> {
    let mut table = df.clone();
    let mut infinities = 0;
    let mut negatives = 0;

    for name in numeric_columns(df) {
        let non_negative = registry::is_non_negative(&name);
        let mut changed = false;
        let values: Vec<Option<f64>> = f64_values(df, &name)?
            .into_iter()
            .map(|value| match value {
                Some(v) if v.is_infinite() => {
                    infinities += 1;
                    changed = true;
                    None
                }
                Some(v) if non_negative && v < 0.0 => {
                    negatives += 1;
                    changed = true;
                    Some(0.0)
                }
                other => other,
            })
            .collect();

        if changed {
            replace_f64(&mut table, &name, values)?;
        }
    }

    if negatives > 0 || infinities > 0 {
        debug!(infinities, negatives, "sanitised numeric columns");
    }
    Ok((table, infinities, negatives))
}

/// Clamps values outside the per-entity bounds. Never changes the row count.
pub fn cap_outliers(df: &DataFrame, config: &CleaningConfig) -> PolarsResult<(DataFrame, usize)> {
    let groups = entity_groups(df)?;
    let mut table = df.clone();
    let mut total = 0;

    for name in numeric_columns(df) {
        if registry::excluded_from_outlier_capping(&name, &config.outlier_exclusions) {
            continue;
        }
        let mut values = f64_values(df, &name)?;
        if count_nulls(&values) == values.len() {
            continue;
        }

        let mut capped = 0;
        for rows in &groups {
            capped += cap_group(&mut values, rows, config.outlier_method, config.outlier_factor);
        }

        if capped > 0 {
            debug!(column = %name, capped, "capped outliers");
            replace_f64(&mut table, &name, values)?;
            total += capped;
        }
    }

    if total > 0 {
        info!(outliers_capped = total, method = ?config.outlier_method, "capped outliers");
    }
    Ok((table, total))
}

const MAX_CAPPING_ROUNDS: usize = 10_000;

/// Clamps one entity's values until they sit inside the bounds computed from
/// the clamped values themselves. Returns how many distinct rows moved.
fn cap_group(
    values: &mut [Option<f64>],
    rows: &[usize],
    method: OutlierMethod,
    factor: f64,
) -> usize {
    let mut touched = vec![false; rows.len()];
    for _ in 0..MAX_CAPPING_ROUNDS {
        let observed: Vec<f64> = rows.iter().filter_map(|&idx| values[idx]).collect();
        let Some((lower, upper)) = bounds(&observed, method, factor) else {
            break;
        };
        let slack = (upper - lower).abs() * 1e-9;

        let mut moved = false;
        for (position, &idx) in rows.iter().enumerate() {
            let Some(value) = values[idx] else {
                continue;
            };
            if value < lower - slack {
                values[idx] = Some(lower);
            } else if value > upper + slack {
                values[idx] = Some(upper);
            } else {
                continue;
            }
            touched[position] = true;
            moved = true;
        }
        if !moved {
            return touched.iter().filter(|flag| **flag).count();
        }
    }

    warn!(
        rounds = MAX_CAPPING_ROUNDS,
        "outlier bounds did not settle; keeping last clamped values"
    );
    touched.iter().filter(|flag| **flag).count()
}

fn bounds(observed: &[f64], method: OutlierMethod, factor: f64) -> Option<(f64, f64)> {
    if observed.is_empty() {
        return None;
    }
    match method {
        OutlierMethod::Iqr => {
            let mut sorted = observed.to_vec();
            sorted.sort_by(f64::total_cmp);
            let q1 = quantile(&sorted, 0.25);
            let q3 = quantile(&sorted, 0.75);
            let iqr = q3 - q1;
            Some((q1 - factor * iqr, q3 + factor * iqr))
        }
        OutlierMethod::Zscore => {
            let n = observed.len() as f64;
            if observed.len() < 2 {
                return None;
            }
            let mean = observed.iter().sum::<f64>() / n;
            let variance = observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            let std = variance.sqrt();
            if std == 0.0 || !std.is_finite() {
                return None;
            }
            Some((mean - factor * std, mean + factor * std))
        }
    }
}

/// Linear interpolation between closest ranks over sorted input.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
