//! Rebuilds the World entity from country rows.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{debug, warn};

use crate::cleaning::parse_date;
use crate::frame::{
    f64_values, filter_rows, has_column, is_numeric_dtype, sort_by_entity_date, str_values,
};
use crate::registry::{
    world_aggregation, WorldAggregation, CONTINENT, DATE, ISO_CODE, LOCATION, POPULATION,
    WORLD_CONTINENT, WORLD_ISO_CODE, WORLD_LOCATION,
};

/// Static attributes of the World entity taken from each country's latest row.
#[derive(Debug, Default, PartialEq)]
struct WorldStatics {
    population: Option<f64>,
    weighted: HashMap<String, Option<f64>>,
}

/// Drops upstream aggregates (rows without a continent, or an existing World
/// row), then appends one freshly computed World row per date.
pub fn recompute_world(df: &DataFrame) -> PolarsResult<DataFrame> {
    if !has_column(df, DATE) || !has_column(df, LOCATION) {
        warn!("table lacks location or date; World row not recomputed");
        return Ok(df.clone());
    }

    let locations = str_values(df, LOCATION)?;
    let continents = if has_column(df, CONTINENT) {
        Some(str_values(df, CONTINENT)?)
    } else {
        None
    };

    let is_country: Vec<bool> = (0..df.height())
        .map(|idx| {
            let has_continent = continents
                .as_ref()
                .map_or(true, |values| values[idx].is_some());
            has_continent && locations[idx].as_deref() != Some(WORLD_LOCATION)
        })
        .collect();

    let countries = filter_rows(df, &is_country)?;
    if countries.height() == 0 {
        warn!("no country rows found; World row not recomputed");
        return Ok(df.clone());
    }
    debug!(
        dropped_aggregates = df.height() - countries.height(),
        "filtered upstream aggregates"
    );

    let date_column = countries.column(DATE)?;
    let date_dtype = date_column.dtype().clone();
    let parsed: Vec<Option<NaiveDate>> = date_column
        .cast(&DataType::String)?
        .str()?
        .into_iter()
        .map(|value| value.and_then(parse_date))
        .collect();
    // ISO text when the date parses, so differently formatted spellings of one
    // day share a World row.
    let dates: Vec<Option<String>> = date_column
        .cast(&DataType::String)?
        .str()?
        .into_iter()
        .zip(&parsed)
        .map(|(raw, date)| match date {
            Some(date) => Some(date.format("%Y-%m-%d").to_string()),
            None => raw.map(str::to_string),
        })
        .collect();

    let mut rows_by_date: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, date) in dates.iter().enumerate() {
        if let Some(date) = date {
            rows_by_date.entry(date.as_str()).or_default().push(idx);
        }
    }

    let statics = latest_statics(&countries, &parsed)?;
    let world_height = rows_by_date.len();

    let mut world_columns: Vec<Column> = Vec::with_capacity(countries.width());
    for column in countries.get_columns() {
        let name = column.name().as_str();
        let dtype = column.dtype();

        let series = match name {
            LOCATION => Series::new(name.into(), vec![WORLD_LOCATION; world_height]),
            ISO_CODE => Series::new(name.into(), vec![WORLD_ISO_CODE; world_height]),
            CONTINENT => Series::new(name.into(), vec![WORLD_CONTINENT; world_height]),
            DATE => Series::new(name.into(), rows_by_date.keys().copied().collect::<Vec<_>>())
                .cast(&date_dtype)?,
            _ if is_numeric_dtype(dtype) => {
                let values: Vec<Option<f64>> = match world_aggregation(name) {
                    WorldAggregation::Sum => {
                        let source = f64_values(&countries, name)?;
                        rows_by_date
                            .values()
                            .map(|rows| sum_observed(rows.iter().map(|&idx| source[idx])))
                            .collect()
                    }
                    WorldAggregation::PopulationTotal if name == POPULATION => {
                        vec![statics.population; world_height]
                    }
                    WorldAggregation::PopulationWeighted => {
                        let value = statics.weighted.get(name).copied().flatten();
                        vec![value; world_height]
                    }
                    _ => vec![None::<f64>; world_height],
                };
                Series::new(name.into(), values).cast(dtype)?
            }
            _ => Series::full_null(name.into(), world_height, dtype),
        };
        world_columns.push(series.into());
    }

    let world = DataFrame::new(world_columns)?;
    let mut combined = countries;
    combined.vstack_mut(&world)?;
    debug!(world_rows = world_height, "appended recomputed World rows");

    sort_by_entity_date(&combined)
}

/// Sum that treats a group with no observations as missing rather than zero.
fn sum_observed(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    values.flatten().fold(None, |acc, value| Some(acc.unwrap_or(0.0) + value))
}

/// Rows with an unparseable date never count as a country's latest record
/// while a dated one exists.
fn latest_statics(
    countries: &DataFrame,
    dates: &[Option<NaiveDate>],
) -> PolarsResult<WorldStatics> {
    if !has_column(countries, POPULATION) {
        return Ok(WorldStatics::default());
    }

    let locations = str_values(countries, LOCATION)?;
    let mut latest: HashMap<&str, usize> = HashMap::new();
    for (idx, location) in locations.iter().enumerate() {
        let Some(location) = location.as_deref() else {
            continue;
        };
        latest
            .entry(location)
            .and_modify(|current| {
                if dates[idx] >= dates[*current] {
                    *current = idx;
                }
            })
            .or_insert(idx);
    }
    let mut latest_rows: Vec<usize> = latest.into_values().collect();
    latest_rows.sort_unstable();

    let population = f64_values(countries, POPULATION)?;
    let total_population = sum_observed(latest_rows.iter().map(|&idx| population[idx]));

    let mut weighted = HashMap::new();
    for column in countries.get_columns() {
        let name = column.name().as_str();
        if world_aggregation(name) != WorldAggregation::PopulationWeighted
            || !is_numeric_dtype(column.dtype())
        {
            continue;
        }
        let values = f64_values(countries, name)?;
        let weighted_sum = sum_observed(latest_rows.iter().map(|&idx| {
            match (values[idx], population[idx]) {
                (Some(value), Some(pop)) => Some(value * pop),
                _ => None,
            }
        }));
        let average = match (weighted_sum, total_population) {
            (Some(sum), Some(total)) if total > 0.0 => Some(sum / total),
            _ => None,
        };
        weighted.insert(name.to_string(), average);
    }

    Ok(WorldStatics {
        population: total_population,
        weighted,
    })
}
