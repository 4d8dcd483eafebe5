use polars::prelude::*;

use crate::errors::ParserError;

/// Columns that identify an observation and are always kept as text.
pub const TEXT_COLUMNS: [&str; 5] = ["location", "iso_code", "continent", "date", "tests_units"];

/// Columns every observation table must carry.
pub const REQUIRED_COLUMNS: [&str; 2] = ["location", "date"];

const MISSING_TOKENS: [&str; 6] = ["", "na", "nan", "null", "none", "n/a"];

pub fn is_text_column(name: &str) -> bool {
    TEXT_COLUMNS.contains(&name)
}

pub fn is_missing_token(raw: &str) -> bool {
    let trimmed = raw.trim();
    MISSING_TOKENS
        .iter()
        .any(|token| trimmed.eq_ignore_ascii_case(token))
}

/// Parses a numeric cell. Missing tokens and NaN yield `None`; infinities are
/// preserved for the cleaning stage to handle.
pub fn parse_optional_f64(raw: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    if is_missing_token(raw) {
        return Ok(None);
    }
    let value: f64 = raw.trim().parse()?;
    if value.is_nan() {
        Ok(None)
    } else {
        Ok(Some(value))
    }
}

pub fn optional_text(raw: &str) -> Option<String> {
    if is_missing_token(raw) {
        None
    } else {
        Some(raw.trim().to_string())
    }
}

pub fn ensure_required_columns(
    parser: &'static str,
    df: &DataFrame,
) -> Result<(), ParserError> {
    for column in REQUIRED_COLUMNS {
        if df.column(column).is_err() {
            return Err(ParserError::MissingColumn { parser, column });
        }
    }
    Ok(())
}

fn is_numeric_dtype(dtype: &DataType) -> bool {
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
            | DataType::Boolean
    )
}

/// Brings a frame read from a typed container into the raw-table layout:
/// text columns become `String`, numeric columns `Float64`, NaN becomes null.
pub fn normalize_column_types(
    parser: &'static str,
    df: DataFrame,
) -> Result<DataFrame, ParserError> {
    let polars_err = |source: PolarsError| ParserError::Polars { parser, source };

    let mut columns: Vec<Column> = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let series = column.as_materialized_series();
        let name = series.name().as_str();
        let normalized = if is_text_column(name) {
            series.cast(&DataType::String).map_err(polars_err)?
        } else if is_numeric_dtype(series.dtype()) {
            let as_float = series.cast(&DataType::Float64).map_err(polars_err)?;
            let values: Vec<Option<f64>> = as_float
                .f64()
                .map_err(polars_err)?
                .into_iter()
                .map(|value| value.filter(|v| !v.is_nan()))
                .collect();
            Series::new(name.into(), values)
        } else {
            series.cast(&DataType::String).map_err(polars_err)?
        };
        columns.push(normalized.into());
    }

    DataFrame::new(columns).map_err(polars_err)
}
