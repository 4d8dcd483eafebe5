use std::path::Path;

use crate::errors::{ParserAttempt, ParserError};
use crate::formats::{DelimitedParser, ParquetTableParser};
use crate::model::{ParsedTable, TableFormat};

pub trait TableParser {
    fn name(&self) -> &'static str;
    fn format(&self) -> TableFormat;
    fn parse(&self, bytes: &[u8]) -> Result<ParsedTable, ParserError>;
}

/// Tries every known format in turn; the container format goes first because
/// its magic bytes make a mismatch cheap to detect.
pub fn parse_table(bytes: &[u8]) -> Result<ParsedTable, ParserError> {
    let parquet = ParquetTableParser;
    let delimited = DelimitedParser;
    let parsers: [&dyn TableParser; 2] = [&parquet, &delimited];
    parse_with_parsers(bytes, &parsers)
}

pub fn parse_with_parsers(
    bytes: &[u8],
    parsers: &[&dyn TableParser],
) -> Result<ParsedTable, ParserError> {
    let mut attempts = Vec::new();

    for parser in parsers {
        match parser.parse(bytes) {
            Ok(parsed) => return Ok(parsed),
            Err(ParserError::FormatMismatch { reason, .. }) => {
                attempts.push(ParserAttempt::new(parser.name(), reason));
            }
            Err(err) => return Err(err),
        }
    }

    Err(ParserError::NoMatchingParser { attempts })
}

/// Parses bytes, trying the parser for `hint` first when one is given.
pub fn parse_table_hinted(
    bytes: &[u8],
    hint: Option<TableFormat>,
) -> Result<ParsedTable, ParserError> {
    let parquet = ParquetTableParser;
    let delimited = DelimitedParser;
    let parsers: [&dyn TableParser; 2] = match hint {
        Some(TableFormat::Delimited) => [&delimited, &parquet],
        Some(TableFormat::Parquet) | None => [&parquet, &delimited],
    };
    parse_with_parsers(bytes, &parsers)
}

/// Reads a file and parses it, preferring the parser its extension names.
pub fn parse_table_file(path: &Path) -> Result<ParsedTable, ParserError> {
    let bytes = std::fs::read(path).map_err(|source| ParserError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_table_hinted(&bytes, TableFormat::from_path(path))
}
