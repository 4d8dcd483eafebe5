//! Small helpers shared by the stages for moving columns between polars and
//! plain vectors, grouping rows by entity, and reordering tables.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

use crate::registry::{DATE, LOCATION};

/// Days between 0001-01-01 and 1970-01-01; polars `Date` counts from the latter.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
    )
}

/// Names of numeric columns, in table order.
pub fn numeric_columns(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|column| is_numeric_dtype(column.dtype()))
        .map(|column| column.name().to_string())
        .collect()
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

pub fn f64_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

pub fn str_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    let column = df.column(name)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

/// Days since the Unix epoch for a `Date` column, `None` when the table has
/// no date column or it has not been normalised yet.
pub fn date_days(df: &DataFrame) -> PolarsResult<Option<Vec<Option<i32>>>> {
    let Ok(column) = df.column(DATE) else {
        return Ok(None);
    };
    if column.dtype() != &DataType::Date {
        return Ok(None);
    }
    let days = column.cast(&DataType::Int32)?;
    Ok(Some(days.i32()?.into_iter().collect()))
}

pub fn date_series(name: &str, days: Vec<Option<i32>>) -> PolarsResult<Series> {
    Series::new(name.into(), days).cast(&DataType::Date)
}

pub fn replace_f64(df: &mut DataFrame, name: &str, values: Vec<Option<f64>>) -> PolarsResult<()> {
    df.with_column(Series::new(name.into(), values))?;
    Ok(())
}

pub fn count_nulls(values: &[Option<f64>]) -> usize {
    values.iter().filter(|value| value.is_none()).count()
}

/// Row indices per entity, in order of first appearance. Row order inside a
/// group is table order, so a table sorted by (location, date) yields
/// date-ordered groups. Without a location column the whole table is one group.
pub fn entity_groups(df: &DataFrame) -> PolarsResult<Vec<Vec<usize>>> {
    if !has_column(df, LOCATION) {
        return Ok(if df.height() == 0 {
            Vec::new()
        } else {
            vec![(0..df.height()).collect()]
        });
    }

    let locations = df.column(LOCATION)?.str()?;
    let mut position: HashMap<Option<&str>, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for (idx, location) in locations.into_iter().enumerate() {
        let slot = *position.entry(location).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(idx);
    }

    Ok(groups)
}

/// Number of distinct non-missing locations.
pub fn distinct_locations(df: &DataFrame) -> PolarsResult<usize> {
    if !has_column(df, LOCATION) {
        return Ok(0);
    }
    let mut names: Vec<String> = str_values(df, LOCATION)?.into_iter().flatten().collect();
    names.sort_unstable();
    names.dedup();
    Ok(names.len())
}

pub fn take_rows(df: &DataFrame, indices: &[usize]) -> PolarsResult<DataFrame> {
    let idx = IdxCa::from_vec(
        "idx".into(),
        indices.iter().map(|&i| i as IdxSize).collect(),
    );
    df.take(&idx)
}

pub fn filter_rows(df: &DataFrame, keep: &[bool]) -> PolarsResult<DataFrame> {
    let mask = BooleanChunked::from_slice("keep".into(), keep);
    df.filter(&mask)
}

/// Stable sort by (location, date). Dates compare chronologically once
/// normalised, and lexically while still text.
pub fn sort_by_entity_date(df: &DataFrame) -> PolarsResult<DataFrame> {
    let locations = if has_column(df, LOCATION) {
        Some(str_values(df, LOCATION)?)
    } else {
        None
    };

    let day_keys = date_days(df)?;
    let text_keys = match (&day_keys, df.column(DATE)) {
        (None, Ok(column)) if column.dtype() == &DataType::String => Some(str_values(df, DATE)?),
        _ => None,
    };

    let mut order: Vec<usize> = (0..df.height()).collect();
    order.sort_by(|&a, &b| {
        let by_location = match &locations {
            Some(values) => values[a].cmp(&values[b]),
            None => Ordering::Equal,
        };
        by_location.then_with(|| match (&day_keys, &text_keys) {
            (Some(days), _) => days[a].cmp(&days[b]),
            (None, Some(text)) => text[a].cmp(&text[b]),
            (None, None) => Ordering::Equal,
        })
    });

    take_rows(df, &order)
}

/// Ratio that yields `None` instead of infinity or NaN.
pub fn guarded_ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (num, den) = (numerator?, denominator?);
    if den == 0.0 || !den.is_finite() || !num.is_finite() {
        return None;
    }
    let value = num / den;
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guarded_ratio_never_returns_infinity() {
        assert_eq!(guarded_ratio(Some(10.0), Some(0.0)), None);
        assert_eq!(guarded_ratio(Some(10.0), None), None);
        assert_eq!(guarded_ratio(None, Some(2.0)), None);
        assert_eq!(guarded_ratio(Some(10.0), Some(f64::INFINITY)), None);
        assert_eq!(guarded_ratio(Some(10.0), Some(4.0)), Some(2.5));
    }

    #[test]
    fn epoch_day_conversion_round_trips() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(date_to_days(epoch), 0);

        let date = NaiveDate::from_ymd_opt(2021, 3, 4).unwrap();
        assert_eq!(days_to_date(date_to_days(date)), Some(date));
    }

    #[test]
    fn groups_follow_first_appearance() -> PolarsResult<()> {
        let df = df!(
            "location" => &["B", "A", "B", "A"],
            "value" => &[1.0, 2.0, 3.0, 4.0],
        )?;
        let groups = entity_groups(&df)?;
        assert_eq!(groups, vec![vec![0, 2], vec![1, 3]]);
        Ok(())
    }

    #[test]
    fn sorts_by_location_then_text_date() -> PolarsResult<()> {
        let df = df!(
            "location" => &["B", "A", "A"],
            "date" => &["2021-01-01", "2021-01-02", "2021-01-01"],
        )?;
        let sorted = sort_by_entity_date(&df)?;
        let dates = str_values(&sorted, "date")?;
        assert_eq!(
            dates,
            vec![
                Some("2021-01-01".to_string()),
                Some("2021-01-02".to_string()),
                Some("2021-01-01".to_string())
            ]
        );
        assert_eq!(str_values(&sorted, "location")?[2].as_deref(), Some("B"));
        Ok(())
    }
}
