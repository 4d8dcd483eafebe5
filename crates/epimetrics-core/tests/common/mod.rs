#![allow(dead_code)]

use std::path::{Path, PathBuf};

use epimetrics_core::config::{AcquisitionConfig, PipelineConfig};

/// Two entities over ten days. Alpha has two rows with unparseable dates;
/// Beta never reports a median age.
pub fn two_entity_csv() -> String {
    let mut csv = String::from(
        "iso_code,continent,location,date,new_cases,total_cases,population,median_age\n",
    );
    for (code, name, factor, population, median_age) in
        [("AAA", "Alpha", 1.0, 1000.0, "40"), ("BBB", "Beta", 2.0, 2000.0, "")]
    {
        let mut total = 0.0;
        for day in 1..=10 {
            let date = match (name, day) {
                ("Alpha", 4) => "2021-01-32".to_string(),
                ("Alpha", 7) => "not-a-date".to_string(),
                _ => format!("2021-01-{day:02}"),
            };
            let new_cases = factor * day as f64;
            total += new_cases;
            csv.push_str(&format!(
                "{code},Europe,{name},{date},{new_cases},{total},{population},{median_age}\n"
            ));
        }
    }
    csv
}

pub fn write_fixture(dir: &Path) -> std::io::Result<PathBuf> {
    let path = dir.join("two_entities.csv");
    std::fs::write(&path, two_entity_csv())?;
    Ok(path)
}

pub fn local_config(dir: &Path, local: PathBuf) -> PipelineConfig {
    PipelineConfig {
        acquisition: AcquisitionConfig {
            local_path: Some(local),
            data_dir: dir.to_path_buf(),
            allow_synthetic: false,
            ..AcquisitionConfig::default()
        },
        ..PipelineConfig::default()
    }
}
