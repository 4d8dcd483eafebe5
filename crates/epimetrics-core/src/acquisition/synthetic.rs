//! Deterministic sample dataset used when no real source can be obtained.

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

const COUNTRIES: &[(&str, &str, &str)] = &[
    ("South America", "Ecuador", "ECU"),
    ("South America", "Peru", "PER"),
    ("South America", "Colombia", "COL"),
    ("South America", "Brazil", "BRA"),
    ("South America", "Argentina", "ARG"),
    ("South America", "Chile", "CHL"),
    ("North America", "United States", "USA"),
    ("North America", "Canada", "CAN"),
    ("North America", "Mexico", "MEX"),
    ("Europe", "Spain", "ESP"),
    ("Europe", "France", "FRA"),
    ("Europe", "Germany", "DEU"),
    ("Europe", "Italy", "ITA"),
    ("Europe", "United Kingdom", "GBR"),
    ("Asia", "China", "CHN"),
    ("Asia", "India", "IND"),
    ("Asia", "Japan", "JPN"),
    ("Asia", "South Korea", "KOR"),
    ("Asia", "Indonesia", "IDN"),
    ("Africa", "South Africa", "ZAF"),
    ("Africa", "Nigeria", "NGA"),
    ("Africa", "Egypt", "EGY"),
    ("Africa", "Kenya", "KEN"),
    ("Africa", "Morocco", "MAR"),
    ("Oceania", "Australia", "AUS"),
    ("Oceania", "New Zealand", "NZL"),
    ("Oceania", "Fiji", "FJI"),
];

const VACCINATION_TARGET: f64 = 10_000_000.0;

fn digest(input: &str) -> u64 {
    let hash = blake3::hash(input.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

pub fn country_count() -> usize {
    COUNTRIES.len()
}

/// One row per country per day over `start..=end`, with dates as ISO text
/// like a freshly downloaded file.
pub fn generate(start: NaiveDate, end: NaiveDate) -> PolarsResult<DataFrame> {
    let dates: Vec<NaiveDate> = start.iter_days().take_while(|date| *date <= end).collect();
    let day_count = dates.len();
    let capacity = day_count * COUNTRIES.len();

    let mut iso_code = Vec::with_capacity(capacity);
    let mut continent = Vec::with_capacity(capacity);
    let mut location = Vec::with_capacity(capacity);
    let mut date = Vec::with_capacity(capacity);
    let mut total_cases = Vec::with_capacity(capacity);
    let mut new_cases = Vec::with_capacity(capacity);
    let mut new_deaths = Vec::with_capacity(capacity);
    let mut population = Vec::with_capacity(capacity);
    let mut people_vaccinated: Vec<Option<f64>> = Vec::with_capacity(capacity);

    for (continent_name, country, code) in COUNTRIES {
        let country_population = (digest(country) % 50_000_000 + 1_000_000) as f64;
        let mut running_total = 0.0;

        for (i, day) in dates.iter().enumerate() {
            let label = day.format("%Y-%m-%d").to_string();
            let base = 100.0 + i as f64 * 5.0;
            let jitter = (digest(&format!("{country}{label}")) % 20) as f64 - 10.0;
            let cases = (base * (1.0 + 0.05 * jitter)).floor().max(0.0);
            running_total += cases;

            iso_code.push(*code);
            continent.push(*continent_name);
            location.push(*country);
            total_cases.push(running_total);
            new_cases.push(cases);
            new_deaths.push((cases * 0.02).floor());
            population.push(country_population);
            people_vaccinated.push(
                (day.year() >= 2021)
                    .then(|| (i as f64 / day_count as f64 * VACCINATION_TARGET).floor()),
            );
            date.push(label);
        }
    }

    df!(
        "iso_code" => iso_code,
        "continent" => continent,
        "location" => location,
        "date" => date,
        "total_cases" => total_cases,
        "new_cases" => new_cases,
        "new_deaths" => new_deaths,
        "population" => population,
        "people_vaccinated" => people_vaccinated,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic() -> PolarsResult<()> {
        let start = NaiveDate::from_ymd_opt(2020, 12, 30).unwrap();
        let end = NaiveDate::from_ymd_opt(2021, 1, 2).unwrap();

        let first = generate(start, end)?;
        let second = generate(start, end)?;

        assert_eq!(first.height(), 4 * country_count());
        assert!(first.equals_missing(&second));

        let vaccinated = first.column("people_vaccinated")?.f64()?;
        assert_eq!(vaccinated.get(0), None, "no vaccinations before 2021");
        assert!(vaccinated.get(2).is_some());
        Ok(())
    }
}
