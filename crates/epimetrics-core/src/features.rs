//! Feature derivation. Sub-steps run in a fixed order because later ones
//! read columns produced by earlier ones.

use std::collections::BTreeMap;

use chrono::Datelike;
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::FeatureConfig;
use crate::frame::{
    date_days, days_to_date, entity_groups, f64_values, guarded_ratio, has_column, replace_f64,
};
use crate::registry::{
    self, DerivedColumn, FeatureFamily, CUMULATIVE_PAIRS, DAILY_SERIES, DATE, DIFFERENCE_SERIES,
    GROWTH_SERIES, PER_CAPITA, POPULATION,
};

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Polars operation failed: {0}")]
    Polars(#[from] PolarsError),

    #[error("date column must be a calendar date before deriving features, found {0}")]
    DateNotNormalized(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureReport {
    /// Every feature created, including ones removed by the final pruning.
    pub created: Vec<String>,
    pub pruned: Vec<String>,
    pub summary: BTreeMap<String, usize>,
}

impl FeatureReport {
    fn record(&mut self, family: FeatureFamily, name: impl Into<String>) {
        self.created.push(name.into());
        *self.summary.entry(family.as_str().to_string()).or_default() += 1;
    }
}

struct FeatureBuilder<'a> {
    table: DataFrame,
    groups: Vec<Vec<usize>>,
    config: &'a FeatureConfig,
    report: FeatureReport,
}

pub fn derive_features(
    df: &DataFrame,
    config: &FeatureConfig,
) -> Result<(DataFrame, FeatureReport), FeatureError> {
    let mut builder = FeatureBuilder {
        table: df.clone(),
        groups: entity_groups(df)?,
        config,
        report: FeatureReport::default(),
    };

    builder.temporal()?;
    builder.per_capita()?;
    builder.rates()?;
    builder.moving_averages()?;
    builder.growth_rates()?;
    builder.lags()?;
    builder.cumulative()?;
    if config.include_difference {
        builder.differences()?;
    }
    builder.prune();

    let FeatureBuilder { table, report, .. } = builder;
    info!(
        created = report.created.len(),
        pruned = report.pruned.len(),
        columns = table.width(),
        summary = ?report.summary,
        "feature derivation complete"
    );
    Ok((table, report))
}

impl FeatureBuilder<'_> {
    fn has(&self, name: &str) -> bool {
        has_column(&self.table, name)
    }

    fn values(&self, name: &str) -> PolarsResult<Vec<Option<f64>>> {
        f64_values(&self.table, name)
    }

    fn add(
        &mut self,
        family: FeatureFamily,
        name: &str,
        values: Vec<Option<f64>>,
    ) -> PolarsResult<()> {
        replace_f64(&mut self.table, name, values)?;
        self.report.record(family, name);
        Ok(())
    }

    /// Applies `op` to each entity's series of `source`, in table order.
    fn per_entity<F>(&self, source: &[Option<f64>], mut op: F) -> Vec<Option<f64>>
    where
        F: FnMut(&[Option<f64>]) -> Vec<Option<f64>>,
    {
        let mut output = vec![None; source.len()];
        for rows in &self.groups {
            let series: Vec<Option<f64>> = rows.iter().map(|&idx| source[idx]).collect();
            for (&idx, value) in rows.iter().zip(op(&series)) {
                output[idx] = value;
            }
        }
        output
    }

    fn temporal(&mut self) -> Result<(), FeatureError> {
        let Some(days) = date_days(&self.table)? else {
            if let Ok(column) = self.table.column(DATE) {
                return Err(FeatureError::DateNotNormalized(column.dtype().to_string()));
            }
            warn!("no date column found; skipping temporal features");
            return Ok(());
        };

        let dates: Vec<_> = days.iter().map(|day| day.and_then(days_to_date)).collect();
        let calendar = |f: fn(&chrono::NaiveDate) -> i32| -> Vec<Option<i32>> {
            dates.iter().map(|date| date.as_ref().map(f)).collect()
        };

        let mut columns: Vec<(&str, Vec<Option<i32>>)> = vec![
            ("year", calendar(|d| d.year())),
            ("month", calendar(|d| d.month() as i32)),
            ("day", calendar(|d| d.day() as i32)),
            ("day_of_week", calendar(|d| d.weekday().num_days_from_monday() as i32)),
            ("week_of_year", calendar(|d| d.iso_week().week() as i32)),
            ("quarter", calendar(|d| (d.month0() / 3 + 1) as i32)),
            (
                "is_weekend",
                calendar(|d| i32::from(d.weekday().num_days_from_monday() >= 5)),
            ),
        ];

        let mut since_first = vec![None; days.len()];
        for rows in &self.groups {
            let first = rows.iter().filter_map(|&idx| days[idx]).min();
            for &idx in rows {
                since_first[idx] = match (days[idx], first) {
                    (Some(day), Some(first)) => Some(day - first),
                    _ => None,
                };
            }
        }
        columns.push(("days_since_first_case", since_first));

        for (name, values) in columns {
            self.table.with_column(Series::new(name.into(), values))?;
            self.report.record(FeatureFamily::Temporal, name);
        }
        debug!("created temporal features");
        Ok(())
    }

    fn per_capita(&mut self) -> PolarsResult<()> {
        if !self.has(POPULATION) {
            return Ok(());
        }
        let population = self.values(POPULATION)?;
        for spec in PER_CAPITA {
            if !self.has(spec.base) || self.has(spec.target) {
                continue;
            }
            let base = self.values(spec.base)?;
            let values = base
                .iter()
                .zip(&population)
                .map(|(&value, &pop)| guarded_ratio(value, pop).map(|ratio| ratio * spec.scale))
                .collect();
            self.add(FeatureFamily::PerCapita, spec.target, values)?;
        }
        Ok(())
    }

    fn rates(&mut self) -> PolarsResult<()> {
        let mut definitions: Vec<(&str, &str, &str)> = vec![
            ("case_fatality_rate", "total_deaths", "total_cases"),
        ];
        if !self.has("positive_rate") {
            definitions.push(("positive_rate", "new_cases", "new_tests"));
        }
        definitions.push(("vaccination_coverage", "people_fully_vaccinated", POPULATION));
        definitions.push(("icu_to_hospitalized_ratio", "icu_patients", "hosp_patients"));

        for (target, numerator, denominator) in definitions {
            if !self.has(numerator) || !self.has(denominator) {
                continue;
            }
            let num = self.values(numerator)?;
            let den = self.values(denominator)?;
            let values = num
                .iter()
                .zip(&den)
                .map(|(&n, &d)| guarded_ratio(n, d).map(|ratio| ratio * 100.0))
                .collect();
            self.add(FeatureFamily::Rate, target, values)?;
        }
        Ok(())
    }

    fn moving_averages(&mut self) -> PolarsResult<()> {
        let config = self.config;
        for source in DAILY_SERIES {
            if !self.has(source) {
                continue;
            }
            let base = self.values(source)?;
            for &window in &config.moving_average_windows {
                let values = self.per_entity(&base, |series| trailing_mean(series, window));
                let name = DerivedColumn::MovingAverage { source, window }.name();
                self.add(FeatureFamily::MovingAverage, &name, values)?;
            }
        }
        Ok(())
    }

    fn growth_rates(&mut self) -> PolarsResult<()> {
        let periods = self.config.growth_periods;
        let clip = self.config.growth_clip;
        for source in GROWTH_SERIES {
            if !self.has(source) {
                continue;
            }
            let base = self.values(source)?;
            let values = self.per_entity(&base, |series| percent_change(series, periods, clip));
            let name = DerivedColumn::GrowthRate { source }.name();
            self.add(FeatureFamily::GrowthRate, &name, values)?;
        }
        Ok(())
    }

    fn lags(&mut self) -> PolarsResult<()> {
        let config = self.config;
        for source in DAILY_SERIES {
            if !self.has(source) {
                continue;
            }
            let base = self.values(source)?;
            for &periods in &config.lags {
                let values = self.per_entity(&base, |series| shift(series, periods));
                let name = DerivedColumn::Lag { source, periods }.name();
                self.add(FeatureFamily::Lag, &name, values)?;
            }
        }
        Ok(())
    }

    fn cumulative(&mut self) -> PolarsResult<()> {
        for (daily, total) in CUMULATIVE_PAIRS {
            if !self.has(daily) || self.has(total) {
                continue;
            }
            let base = self.values(daily)?;
            let values = self.per_entity(&base, running_sum);
            self.add(FeatureFamily::Cumulative, total, values)?;
        }
        Ok(())
    }

    fn differences(&mut self) -> PolarsResult<()> {
        for source in DIFFERENCE_SERIES {
            if !self.has(source) {
                continue;
            }
            let base = self.values(source)?;
            let values = self.per_entity(&base, difference);
            let name = DerivedColumn::Difference { source }.name();
            self.add(FeatureFamily::Difference, &name, values)?;
        }
        Ok(())
    }

    fn prune(&mut self) {
        let present: Vec<String> = self
            .table
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let pruned = registry::prune_list(
            &present,
            &self.config.prune_families,
            &self.config.prune_columns,
        );
        if !pruned.is_empty() {
            self.table = self.table.drop_many(pruned.iter().map(String::as_str));
            info!(count = pruned.len(), "pruned intermediate feature columns");
        }
        self.report.pruned = pruned;
    }
}

/// Mean over the trailing `window` points, ignoring missing ones; missing
/// when the window holds no observation.
pub fn trailing_mean(series: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..series.len())
        .map(|idx| {
            let start = (idx + 1).saturating_sub(window);
            let observed: Vec<f64> = series[start..=idx].iter().flatten().copied().collect();
            (!observed.is_empty()).then(|| observed.iter().sum::<f64>() / observed.len() as f64)
        })
        .collect()
}

/// Percent change against the value `periods` rows earlier, clipped to
/// `[-clip, clip]`. Division by zero yields a missing value.
pub fn percent_change(series: &[Option<f64>], periods: usize, clip: f64) -> Vec<Option<f64>> {
    (0..series.len())
        .map(|idx| {
            let previous = idx.checked_sub(periods).and_then(|prev| series[prev]);
            let current = series[idx];
            let change = guarded_ratio(current.zip(previous).map(|(c, p)| c - p), previous)?;
            Some((change * 100.0).clamp(-clip, clip))
        })
        .collect()
}

pub fn shift(series: &[Option<f64>], periods: usize) -> Vec<Option<f64>> {
    (0..series.len())
        .map(|idx| idx.checked_sub(periods).and_then(|prev| series[prev]))
        .collect()
}

/// Running total in which missing points contribute nothing.
pub fn running_sum(series: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut total = 0.0;
    series
        .iter()
        .map(|value| {
            total += value.unwrap_or(0.0);
            Some(total)
        })
        .collect()
}

pub fn difference(series: &[Option<f64>]) -> Vec<Option<f64>> {
    (0..series.len())
        .map(|idx| {
            let previous = idx.checked_sub(1).and_then(|prev| series[prev]);
            series[idx].zip(previous).map(|(current, prev)| current - prev)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_mean_needs_one_observation() {
        let series = [Some(2.0), None, Some(4.0), None, None, None];
        let means = trailing_mean(&series, 2);
        assert_eq!(means, vec![Some(2.0), Some(2.0), Some(4.0), Some(4.0), None, None]);
    }

    #[test]
    fn percent_change_handles_zero_base_and_clipping() {
        let series = [Some(0.0), Some(5.0), Some(255.0), Some(255.0)];
        let growth = percent_change(&series, 1, 1000.0);
        assert_eq!(growth[0], None);
        assert_eq!(growth[1], None, "growth from zero is undefined");
        assert_eq!(growth[2], Some(1000.0), "5000% is clipped");
        assert_eq!(growth[3], Some(0.0));
    }

    #[test]
    fn running_sum_treats_missing_as_zero() {
        let series = [Some(1.0), None, Some(2.0)];
        assert_eq!(running_sum(&series), vec![Some(1.0), Some(1.0), Some(3.0)]);
    }

    #[test]
    fn shift_and_difference_stay_within_series() {
        let series = [Some(1.0), Some(3.0), Some(6.0)];
        assert_eq!(shift(&series, 2), vec![None, None, Some(1.0)]);
        assert_eq!(difference(&series), vec![None, Some(2.0), Some(3.0)]);
    }
}
