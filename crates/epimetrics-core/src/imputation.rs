//! Ordered missing-value cascade. Each step only touches the column classes
//! it is meant for, and runs after the steps that resolve values more
//! faithfully.

use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{FallbackStatistic, ImputationConfig};
use crate::frame::{
    count_nulls, entity_groups, f64_values, has_column, numeric_columns, replace_f64,
};
use crate::registry::{classify, ColumnClass, LOCATION};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImputationReport {
    pub static_filled: usize,
    pub forward_filled: usize,
    pub zero_filled: usize,
    pub interpolated: usize,
    pub statistic_filled: usize,
    pub remaining_missing: usize,
}

impl ImputationReport {
    pub fn total_filled(&self) -> usize {
        self.static_filled
            + self.forward_filled
            + self.zero_filled
            + self.interpolated
            + self.statistic_filled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Static,
    Forward,
    Zero,
    Interpolate,
    Statistic,
}

/// Runs the cascade over a table sorted by (location, date).
pub fn impute(
    df: &DataFrame,
    config: &ImputationConfig,
) -> PolarsResult<(DataFrame, ImputationReport)> {
    if !has_column(df, LOCATION) {
        warn!("no location column found; imputing the whole table as one series");
    }
    let groups = entity_groups(df)?;
    let mut table = df.clone();
    let mut report = ImputationReport::default();

    let columns: Vec<(String, ColumnClass)> = numeric_columns(df)
        .into_iter()
        .map(|name| {
            let class = classify(&name);
            (name, class)
        })
        .filter(|(_, class)| *class != ColumnClass::Identity)
        .collect();

    let initial_missing: usize = columns
        .iter()
        .map(|(name, _)| df.column(name).map(|column| column.null_count()))
        .sum::<PolarsResult<usize>>()?;

    for step in [
        Step::Static,
        Step::Forward,
        Step::Zero,
        Step::Interpolate,
        Step::Statistic,
    ] {
        for (name, class) in &columns {
            if !applies(step, *class) {
                continue;
            }
            let mut values = f64_values(&table, name)?;
            if count_nulls(&values) == 0 {
                continue;
            }

            let filled = per_group(&mut values, &groups, |series| match step {
                Step::Static => forward_fill(series) + backward_fill(series),
                Step::Forward => forward_fill(series),
                Step::Zero => zero_fill(series),
                Step::Interpolate => interpolate_bounded(series, config.interpolation_limit),
                Step::Statistic => fill_with_statistic(series, config.fallback),
            });

            if filled > 0 {
                debug!(column = %name, step = ?step, filled, "imputed values");
                replace_f64(&mut table, name, values)?;
                match step {
                    Step::Static => report.static_filled += filled,
                    Step::Forward => report.forward_filled += filled,
                    Step::Zero => report.zero_filled += filled,
                    Step::Interpolate => report.interpolated += filled,
                    Step::Statistic => report.statistic_filled += filled,
                }
            }
        }
    }

    report.remaining_missing = columns
        .iter()
        .map(|(name, _)| table.column(name).map(|column| column.null_count()))
        .sum::<PolarsResult<usize>>()?;

    info!(
        initial_missing,
        static_filled = report.static_filled,
        forward_filled = report.forward_filled,
        zero_filled = report.zero_filled,
        interpolated = report.interpolated,
        statistic_filled = report.statistic_filled,
        remaining_missing = report.remaining_missing,
        "imputation complete"
    );

    Ok((table, report))
}

fn applies(step: Step, class: ColumnClass) -> bool {
    match step {
        Step::Static => class == ColumnClass::Static,
        Step::Forward => class == ColumnClass::Cumulative,
        Step::Zero => class == ColumnClass::Delta,
        Step::Interpolate | Step::Statistic => !matches!(
            class,
            ColumnClass::Static | ColumnClass::Delta | ColumnClass::Identity
        ),
    }
}

/// Applies `fill` to each entity's slice of `values`, returning the total filled.
fn per_group<F>(values: &mut [Option<f64>], groups: &[Vec<usize>], mut fill: F) -> usize
where
    F: FnMut(&mut [Option<f64>]) -> usize,
{
    let mut filled = 0;
    let mut series = Vec::new();
    for rows in groups {
        series.clear();
        series.extend(rows.iter().map(|&idx| values[idx]));
        if count_nulls(&series) == 0 {
            continue;
        }
        filled += fill(series.as_mut_slice());
        for (&idx, value) in rows.iter().zip(&series) {
            values[idx] = *value;
        }
    }
    filled
}

pub fn forward_fill(series: &mut [Option<f64>]) -> usize {
    let mut last = None;
    let mut filled = 0;
    for value in series.iter_mut() {
        match value {
            Some(v) => last = Some(*v),
            None if last.is_some() => {
                *value = last;
                filled += 1;
            }
            None => {}
        }
    }
    filled
}

pub fn backward_fill(series: &mut [Option<f64>]) -> usize {
    let mut next = None;
    let mut filled = 0;
    for value in series.iter_mut().rev() {
        match value {
            Some(v) => next = Some(*v),
            None if next.is_some() => {
                *value = next;
                filled += 1;
            }
            None => {}
        }
    }
    filled
}

pub fn zero_fill(series: &mut [Option<f64>]) -> usize {
    fill_missing_with(series, 0.0)
}

/// Linear interpolation between known neighbours. A missing point is filled
/// only when it lies within `limit` positions of a known value on either
/// side; points before the first or after the last known value take that
/// value.
pub fn interpolate_bounded(series: &mut [Option<f64>], limit: usize) -> usize {
    let known: Vec<usize> = series
        .iter()
        .enumerate()
        .filter_map(|(idx, value)| value.map(|_| idx))
        .collect();
    let (Some(&first), Some(&last)) = (known.first(), known.last()) else {
        return 0;
    };

    let mut filled = 0;
    let original: Vec<Option<f64>> = series.to_vec();

    for idx in 0..series.len() {
        if original[idx].is_some() {
            continue;
        }
        let value = if idx < first {
            (first - idx <= limit).then(|| original[first]).flatten()
        } else if idx > last {
            (idx - last <= limit).then(|| original[last]).flatten()
        } else {
            let right_pos = known.partition_point(|&k| k < idx);
            let (left, right) = (known[right_pos - 1], known[right_pos]);
            if idx - left > limit && right - idx > limit {
                None
            } else {
                match (original[left], original[right]) {
                    (Some(a), Some(b)) => {
                        let t = (idx - left) as f64 / (right - left) as f64;
                        Some(a + (b - a) * t)
                    }
                    _ => None,
                }
            }
        };
        if value.is_some() {
            series[idx] = value;
            filled += 1;
        }
    }
    filled
}

pub fn fill_with_statistic(series: &mut [Option<f64>], statistic: FallbackStatistic) -> usize {
    let mut observed: Vec<f64> = series.iter().flatten().copied().collect();
    if observed.is_empty() {
        return 0;
    }
    let value = match statistic {
        FallbackStatistic::Mean => observed.iter().sum::<f64>() / observed.len() as f64,
        FallbackStatistic::Median => {
            observed.sort_by(f64::total_cmp);
            let mid = observed.len() / 2;
            if observed.len() % 2 == 0 {
                (observed[mid - 1] + observed[mid]) / 2.0
            } else {
                observed[mid]
            }
        }
    };
    fill_missing_with(series, value)
}

fn fill_missing_with(series: &mut [Option<f64>], fill: f64) -> usize {
    let mut filled = 0;
    for value in series.iter_mut().filter(|value| value.is_none()) {
        *value = Some(fill);
        filled += 1;
    }
    filled
}
