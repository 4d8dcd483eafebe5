//! Column classification registry.
//!
//! Every stage decides how to treat a column by asking this module, never by
//! matching substrings of the column name on its own. Derived columns that the
//! feature stage generates from a base column (`new_cases_ma7`,
//! `total_cases_growth_rate`, ...) are named and recognised through
//! [`DerivedColumn`], so the outlier exclusions and the final pruning list are
//! always in sync with what the feature stage produces.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const LOCATION: &str = "location";
pub const DATE: &str = "date";
pub const ISO_CODE: &str = "iso_code";
pub const CONTINENT: &str = "continent";
pub const POPULATION: &str = "population";

pub const WORLD_LOCATION: &str = "World";
pub const WORLD_ISO_CODE: &str = "OWID_WRL";
pub const WORLD_CONTINENT: &str = "Global";

/// Never dropped by sparse-column pruning, however empty they are.
pub const ESSENTIAL_COLUMNS: [&str; 5] = [LOCATION, DATE, ISO_CODE, CONTINENT, POPULATION];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureFamily {
    Temporal,
    PerCapita,
    Rate,
    MovingAverage,
    GrowthRate,
    Lag,
    Cumulative,
    Difference,
}

impl FeatureFamily {
    pub const ALL: [FeatureFamily; 8] = [
        FeatureFamily::Temporal,
        FeatureFamily::PerCapita,
        FeatureFamily::Rate,
        FeatureFamily::MovingAverage,
        FeatureFamily::GrowthRate,
        FeatureFamily::Lag,
        FeatureFamily::Cumulative,
        FeatureFamily::Difference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureFamily::Temporal => "temporal",
            FeatureFamily::PerCapita => "per_capita",
            FeatureFamily::Rate => "rate",
            FeatureFamily::MovingAverage => "moving_average",
            FeatureFamily::GrowthRate => "growth_rate",
            FeatureFamily::Lag => "lag",
            FeatureFamily::Cumulative => "cumulative",
            FeatureFamily::Difference => "difference",
        }
    }
}

impl fmt::Display for FeatureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnClass {
    /// Entity/date keys and categorical context.
    Identity,
    /// Running totals, non-decreasing by convention.
    Cumulative,
    /// Daily increments; missing means nothing was reported.
    Delta,
    /// Per-entity constants.
    Static,
    /// Point-in-time reported values (hospital census, reproduction rate, ...).
    Measure,
    Derived(FeatureFamily),
}

/// How a column contributes to the recomputed World entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorldAggregation {
    /// Summed across countries for every date.
    Sum,
    /// Summed across the latest record of every country.
    PopulationTotal,
    /// Averaged across the latest record of every country, weighted by population.
    PopulationWeighted,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub class: ColumnClass,
    pub world: WorldAggregation,
    pub non_negative: bool,
}

const fn spec(
    name: &'static str,
    class: ColumnClass,
    world: WorldAggregation,
    non_negative: bool,
) -> ColumnSpec {
    ColumnSpec {
        name,
        class,
        world,
        non_negative,
    }
}

use ColumnClass::{Cumulative, Delta, Identity, Measure, Static};
use WorldAggregation::{PopulationTotal, PopulationWeighted, Skip, Sum};

const KNOWN_COLUMNS: &[ColumnSpec] = &[
    spec(LOCATION, Identity, Skip, false),
    spec(ISO_CODE, Identity, Skip, false),
    spec(CONTINENT, Identity, Skip, false),
    spec(DATE, Identity, Skip, false),
    spec("tests_units", Identity, Skip, false),
    // running totals
    spec("total_cases", Cumulative, Sum, true),
    spec("total_deaths", Cumulative, Sum, true),
    spec("total_tests", Cumulative, Sum, true),
    spec("total_vaccinations", Cumulative, Sum, true),
    spec("people_vaccinated", Cumulative, Sum, true),
    spec("people_fully_vaccinated", Cumulative, Sum, true),
    spec("total_boosters", Cumulative, Sum, true),
    spec("total_cases_per_million", Cumulative, Skip, true),
    spec("total_deaths_per_million", Cumulative, Skip, true),
    spec("total_tests_per_thousand", Cumulative, Skip, true),
    spec("total_vaccinations_per_hundred", Cumulative, Skip, true),
    spec("people_vaccinated_per_hundred", Cumulative, Skip, true),
    spec("people_fully_vaccinated_per_hundred", Cumulative, Skip, true),
    spec("total_boosters_per_hundred", Cumulative, Skip, true),
    // daily increments
    spec("new_cases", Delta, Sum, true),
    spec("new_deaths", Delta, Sum, true),
    spec("new_tests", Delta, Sum, true),
    spec("new_vaccinations", Delta, Sum, true),
    spec("new_cases_smoothed", Delta, Skip, true),
    spec("new_deaths_smoothed", Delta, Skip, true),
    spec("new_tests_smoothed", Delta, Skip, true),
    spec("new_vaccinations_smoothed", Delta, Skip, true),
    spec("new_people_vaccinated_smoothed", Delta, Skip, true),
    spec("new_cases_per_million", Delta, Skip, true),
    spec("new_deaths_per_million", Delta, Skip, true),
    spec("new_cases_smoothed_per_million", Delta, Skip, true),
    spec("new_deaths_smoothed_per_million", Delta, Skip, true),
    spec("new_tests_per_thousand", Delta, Skip, true),
    spec("new_tests_smoothed_per_thousand", Delta, Skip, true),
    spec("new_vaccinations_smoothed_per_million", Delta, Skip, true),
    spec("new_people_vaccinated_smoothed_per_hundred", Delta, Skip, true),
    // reported point-in-time values
    spec("hosp_patients", Measure, Sum, true),
    spec("icu_patients", Measure, Sum, true),
    spec("hosp_patients_per_million", Measure, Skip, true),
    spec("icu_patients_per_million", Measure, Skip, true),
    spec("weekly_icu_admissions", Measure, Skip, true),
    spec("weekly_icu_admissions_per_million", Measure, Skip, true),
    spec("weekly_hosp_admissions", Measure, Skip, true),
    spec("weekly_hosp_admissions_per_million", Measure, Skip, true),
    spec("reproduction_rate", Measure, Skip, false),
    spec("positive_rate", Measure, Skip, false),
    spec("tests_per_case", Measure, Skip, false),
    spec("stringency_index", Measure, Skip, false),
    spec("excess_mortality", Measure, Skip, false),
    spec("excess_mortality_cumulative", Measure, Skip, false),
    spec("excess_mortality_cumulative_absolute", Measure, Skip, false),
    spec("excess_mortality_cumulative_per_million", Measure, Skip, false),
    // per-entity constants
    spec(POPULATION, Static, PopulationTotal, true),
    spec("population_density", Static, Skip, true),
    spec("median_age", Static, PopulationWeighted, false),
    spec("aged_65_older", Static, PopulationWeighted, false),
    spec("aged_70_older", Static, PopulationWeighted, false),
    spec("gdp_per_capita", Static, PopulationWeighted, false),
    spec("extreme_poverty", Static, PopulationWeighted, false),
    spec("cardiovasc_death_rate", Static, PopulationWeighted, false),
    spec("diabetes_prevalence", Static, PopulationWeighted, false),
    spec("female_smokers", Static, PopulationWeighted, false),
    spec("male_smokers", Static, PopulationWeighted, false),
    spec("handwashing_facilities", Static, PopulationWeighted, false),
    spec("hospital_beds_per_thousand", Static, PopulationWeighted, true),
    spec("life_expectancy", Static, PopulationWeighted, false),
    spec("human_development_index", Static, PopulationWeighted, false),
    // produced by the feature stage
    spec("year", ColumnClass::Derived(FeatureFamily::Temporal), Skip, false),
    spec("month", ColumnClass::Derived(FeatureFamily::Temporal), Skip, false),
    spec("day", ColumnClass::Derived(FeatureFamily::Temporal), Skip, false),
    spec("day_of_week", ColumnClass::Derived(FeatureFamily::Temporal), Skip, false),
    spec("week_of_year", ColumnClass::Derived(FeatureFamily::Temporal), Skip, false),
    spec("quarter", ColumnClass::Derived(FeatureFamily::Temporal), Skip, false),
    spec("is_weekend", ColumnClass::Derived(FeatureFamily::Temporal), Skip, false),
    spec("days_since_first_case", ColumnClass::Derived(FeatureFamily::Temporal), Skip, false),
    spec("case_fatality_rate", ColumnClass::Derived(FeatureFamily::Rate), Skip, false),
    spec("vaccination_coverage", ColumnClass::Derived(FeatureFamily::Rate), Skip, false),
    spec("icu_to_hospitalized_ratio", ColumnClass::Derived(FeatureFamily::Rate), Skip, false),
];

static REGISTRY: Lazy<HashMap<&'static str, &'static ColumnSpec>> =
    Lazy::new(|| KNOWN_COLUMNS.iter().map(|spec| (spec.name, spec)).collect());

/// Daily series that get moving averages and lags.
pub const DAILY_SERIES: [&str; 4] = ["new_cases", "new_deaths", "new_tests", "new_vaccinations"];

/// Running totals that get a growth rate.
pub const GROWTH_SERIES: [&str; 3] = ["total_cases", "total_deaths", "total_vaccinations"];

/// Daily series that get a day-over-day difference when enabled.
pub const DIFFERENCE_SERIES: [&str; 2] = ["new_cases", "new_deaths"];

/// Daily series and the running total rebuilt from them when it is absent.
pub const CUMULATIVE_PAIRS: [(&str, &str); 4] = [
    ("new_cases", "total_cases"),
    ("new_deaths", "total_deaths"),
    ("new_tests", "total_tests"),
    ("new_vaccinations", "total_vaccinations"),
];

pub const TEMPORAL_COLUMNS: [&str; 8] = [
    "year",
    "month",
    "day",
    "day_of_week",
    "week_of_year",
    "quarter",
    "is_weekend",
    "days_since_first_case",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerCapitaSpec {
    pub base: &'static str,
    pub target: &'static str,
    pub scale: f64,
}

pub const PER_CAPITA: [PerCapitaSpec; 6] = [
    PerCapitaSpec {
        base: "total_cases",
        target: "total_cases_per_million",
        scale: 1_000_000.0,
    },
    PerCapitaSpec {
        base: "total_deaths",
        target: "total_deaths_per_million",
        scale: 1_000_000.0,
    },
    PerCapitaSpec {
        base: "new_cases",
        target: "new_cases_per_million",
        scale: 1_000_000.0,
    },
    PerCapitaSpec {
        base: "new_deaths",
        target: "new_deaths_per_million",
        scale: 1_000_000.0,
    },
    PerCapitaSpec {
        base: "total_tests",
        target: "total_tests_per_thousand",
        scale: 1_000.0,
    },
    PerCapitaSpec {
        base: "new_tests",
        target: "new_tests_per_thousand",
        scale: 1_000.0,
    },
];

/// A column generated by the feature stage from a base series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedColumn<'a> {
    MovingAverage { source: &'a str, window: usize },
    Lag { source: &'a str, periods: usize },
    GrowthRate { source: &'a str },
    Difference { source: &'a str },
}

impl<'a> DerivedColumn<'a> {
    pub fn name(&self) -> String {
        match self {
            DerivedColumn::MovingAverage { source, window } => format!("{source}_ma{window}"),
            DerivedColumn::Lag { source, periods } => format!("{source}_lag{periods}"),
            DerivedColumn::GrowthRate { source } => format!("{source}_growth_rate"),
            DerivedColumn::Difference { source } => format!("{source}_diff"),
        }
    }

    pub fn family(&self) -> FeatureFamily {
        match self {
            DerivedColumn::MovingAverage { .. } => FeatureFamily::MovingAverage,
            DerivedColumn::Lag { .. } => FeatureFamily::Lag,
            DerivedColumn::GrowthRate { .. } => FeatureFamily::GrowthRate,
            DerivedColumn::Difference { .. } => FeatureFamily::Difference,
        }
    }

    /// Recognises only names this module would generate: the base must be one
    /// of the registered feature sources.
    pub fn parse(name: &'a str) -> Option<Self> {
        if let Some(source) = name.strip_suffix("_growth_rate") {
            return GROWTH_SERIES
                .contains(&source)
                .then_some(DerivedColumn::GrowthRate { source });
        }
        if let Some(source) = name.strip_suffix("_diff") {
            return DIFFERENCE_SERIES
                .contains(&source)
                .then_some(DerivedColumn::Difference { source });
        }
        if let Some((source, window)) = split_numeric_suffix(name, "_ma") {
            return DAILY_SERIES
                .contains(&source)
                .then_some(DerivedColumn::MovingAverage { source, window });
        }
        if let Some((source, periods)) = split_numeric_suffix(name, "_lag") {
            return DAILY_SERIES
                .contains(&source)
                .then_some(DerivedColumn::Lag { source, periods });
        }
        None
    }
}

fn split_numeric_suffix<'a>(name: &'a str, marker: &str) -> Option<(&'a str, usize)> {
    let (source, digits) = name.rsplit_once(marker)?;
    if source.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(|value| (source, value))
}

pub fn column_spec(name: &str) -> Option<&'static ColumnSpec> {
    REGISTRY.get(name).copied()
}

/// Unknown columns are treated as reported measures.
pub fn classify(name: &str) -> ColumnClass {
    if let Some(spec) = column_spec(name) {
        return spec.class;
    }
    match DerivedColumn::parse(name) {
        Some(derived) => ColumnClass::Derived(derived.family()),
        None => ColumnClass::Measure,
    }
}

pub fn is_non_negative(name: &str) -> bool {
    column_spec(name).is_some_and(|spec| spec.non_negative)
}

pub fn world_aggregation(name: &str) -> WorldAggregation {
    column_spec(name).map_or(WorldAggregation::Skip, |spec| spec.world)
}

pub fn is_essential(name: &str) -> bool {
    ESSENTIAL_COLUMNS.contains(&name)
}

/// Outlier capping leaves identity columns, per-entity constants and
/// calendar-derived columns alone.
pub fn excluded_from_outlier_capping(name: &str, extra: &[String]) -> bool {
    if extra.iter().any(|column| column == name) {
        return true;
    }
    matches!(
        classify(name),
        ColumnClass::Identity | ColumnClass::Static | ColumnClass::Derived(FeatureFamily::Temporal)
    )
}

/// Columns of `present` removed by the final pruning pass, in table order.
pub fn prune_list(present: &[String], families: &[FeatureFamily], extra: &[String]) -> Vec<String> {
    present
        .iter()
        .filter(|name| {
            let derived = matches!(
                classify(name),
                ColumnClass::Derived(family) if families.contains(&family)
            );
            derived || extra.iter().any(|column| column == *name)
        })
        .cloned()
        .collect()
}
