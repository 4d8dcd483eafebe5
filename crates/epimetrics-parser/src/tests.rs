use std::io::{Cursor, Write};

use polars::prelude::*;

use crate::errors::ParserError;
use crate::formats::{DelimitedParser, TEXT_COLUMNS};
use crate::model::TableFormat;
use crate::registry::TableParser;
use crate::{parse_table, parse_table_file};

const OWID_SAMPLE: &str = "\
iso_code,continent,location,date,total_cases,new_cases,population,tests_units
ECU,South America,Ecuador,2020-03-01,10,10,17000000,tests performed
ECU,South America,Ecuador,2020-03-02,,5,17000000,
ECU,South America,Ecuador,not-a-date,NaN,inf,17000000,tests performed
OWID_SAM,,South America,2020-03-01,100,40,430000000,
";

#[test]
fn parses_owid_style_csv() {
    let parsed = parse_table(OWID_SAMPLE.as_bytes()).expect("csv parse failed");

    assert_eq!(parsed.metadata.format, TableFormat::Delimited);
    assert_eq!(parsed.df.height(), 4);
    assert_eq!(parsed.df.width(), 8);

    let location = parsed.df.column("location").unwrap().str().unwrap();
    assert_eq!(location.get(0), Some("Ecuador"));

    let date = parsed.df.column("date").unwrap().str().unwrap();
    assert_eq!(date.get(2), Some("not-a-date"));

    let total_cases = parsed.df.column("total_cases").unwrap().f64().unwrap();
    assert_eq!(total_cases.get(0), Some(10.0));
    assert_eq!(total_cases.get(1), None);
    assert_eq!(total_cases.get(2), None, "NaN must read as missing");

    let new_cases = parsed.df.column("new_cases").unwrap().f64().unwrap();
    assert_eq!(new_cases.get(2), Some(f64::INFINITY));

    let continent = parsed.df.column("continent").unwrap().str().unwrap();
    assert_eq!(continent.get(3), None);

    for name in TEXT_COLUMNS {
        if let Ok(column) = parsed.df.column(name) {
            assert_eq!(column.dtype(), &DataType::String, "{name} should be text");
        }
    }
}

#[test]
fn unknown_non_numeric_columns_stay_text() {
    let content = "location,date,source_note,new_cases\nPeru,2021-01-01,ministry,4\nPeru,2021-01-02,press,5\n";
    let parsed = parse_table(content.as_bytes()).expect("csv parse failed");

    assert_eq!(
        parsed.df.column("source_note").unwrap().dtype(),
        &DataType::String
    );
    assert_eq!(
        parsed.df.column("new_cases").unwrap().dtype(),
        &DataType::Float64
    );
    assert!(parsed
        .metadata
        .text_columns
        .contains(&"source_note".to_string()));
}

#[test]
fn column_turning_non_numeric_midway_becomes_text() {
    let content = "location,date,reporting_note,new_cases\n\
        Peru,2021-01-01,12,4\n\
        Peru,2021-01-02,,5\n\
        Peru,2021-01-03,see note,6\n";
    let parsed = parse_table(content.as_bytes()).expect("csv parse failed");

    let note = parsed.df.column("reporting_note").unwrap().str().unwrap();
    assert_eq!(note.get(0), Some("12"));
    assert_eq!(note.get(1), None);
    assert_eq!(note.get(2), Some("see note"));

    let new_cases = parsed.df.column("new_cases").unwrap().f64().unwrap();
    assert_eq!(new_cases.get(2), Some(6.0));
}

#[test]
fn sniffs_semicolon_delimiter() {
    let content = "location;date;new_cases\nChile;2021-05-01;12\n";
    let parsed = DelimitedParser
        .parse(content.as_bytes())
        .expect("semicolon csv parse failed");

    let new_cases = parsed.df.column("new_cases").unwrap().f64().unwrap();
    assert_eq!(new_cases.get(0), Some(12.0));
}

#[test]
fn rejects_table_without_date_column() {
    let content = "location,new_cases\nChile,12\n";
    let err = parse_table(content.as_bytes()).unwrap_err();

    assert!(matches!(
        err,
        ParserError::MissingColumn {
            column: "date",
            ..
        }
    ));
}

#[test]
fn rejects_header_only_file() {
    let content = "location,date,new_cases\n";
    let err = parse_table(content.as_bytes()).unwrap_err();

    assert!(matches!(err, ParserError::EmptyData { .. }));
}

#[test]
fn rejects_duplicate_headers() {
    let content = "location,date,date\nChile,2021-01-01,2021-01-02\n";
    let err = parse_table(content.as_bytes()).unwrap_err();

    assert!(matches!(err, ParserError::InvalidHeader { .. }));
}

#[test]
fn parquet_input_is_normalized_to_raw_layout() -> PolarsResult<()> {
    let mut df = df!(
        "location" => &["Kenya", "Kenya"],
        "date" => &["2021-01-01", "2021-01-02"],
        "new_cases" => &[3i64, 4i64],
        "population" => &[Some(53_000_000i64), None],
    )?;

    let mut buffer = Vec::new();
    ParquetWriter::new(&mut Cursor::new(&mut buffer)).finish(&mut df)?;

    let parsed = parse_table(&buffer).expect("parquet parse failed");
    assert_eq!(parsed.metadata.format, TableFormat::Parquet);

    let new_cases = parsed.df.column("new_cases")?.f64()?;
    assert_eq!(new_cases.get(1), Some(4.0));

    let population = parsed.df.column("population")?.f64()?;
    assert_eq!(population.get(1), None);

    assert_eq!(parsed.df.column("date")?.dtype(), &DataType::String);
    Ok(())
}

#[test]
fn parse_table_file_reads_from_disk() {
    let mut file = tempfile::Builder::new()
        .suffix(".csv")
        .tempfile()
        .expect("tempfile");
    file.write_all(OWID_SAMPLE.as_bytes()).expect("write");

    let parsed = parse_table_file(file.path()).expect("file parse failed");
    assert_eq!(parsed.df.height(), 4);
}

#[test]
fn parse_table_file_reports_missing_file() {
    let err = parse_table_file(std::path::Path::new("/definitely/not/here.csv")).unwrap_err();
    assert!(matches!(err, ParserError::Io { .. }));
}
