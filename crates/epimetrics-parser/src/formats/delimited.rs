use std::collections::HashSet;

use polars::prelude::*;

use crate::errors::ParserError;
use crate::model::{ParsedTable, TableFormat};
use crate::registry::TableParser;

use super::{ensure_required_columns, is_text_column, optional_text, parse_optional_f64};

/// Comma/semicolon/tab separated text with a single header row.
pub struct DelimitedParser;

impl Default for DelimitedParser {
    fn default() -> Self {
        Self
    }
}

impl DelimitedParser {
    const NAME: &'static str = "DELIMITED";

    fn sniff_delimiter(header_line: &str) -> u8 {
        let candidates = [b',', b';', b'\t'];
        candidates
            .iter()
            .copied()
            .max_by_key(|candidate| header_line.bytes().filter(|b| b == candidate).count())
            .filter(|candidate| header_line.as_bytes().contains(candidate))
            .unwrap_or(b',')
    }

    fn read_columns(
        content: &str,
        delimiter: u8,
    ) -> Result<(Vec<String>, Vec<ColumnBuffer>, usize), ParserError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(content.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|source| ParserError::Csv {
                parser: Self::NAME,
                source,
            })?
            .iter()
            .map(|header| header.trim().trim_start_matches('\u{feff}').to_string())
            .collect();

        if headers.len() < 2 {
            return Err(ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: format!("expected at least two columns, found {}", headers.len()),
            });
        }

        let mut seen = HashSet::with_capacity(headers.len());
        for header in &headers {
            if header.is_empty() {
                return Err(ParserError::InvalidHeader {
                    parser: Self::NAME,
                    message: "empty column name".to_string(),
                });
            }
            if !seen.insert(header.as_str()) {
                return Err(ParserError::InvalidHeader {
                    parser: Self::NAME,
                    message: format!("duplicate column '{header}'"),
                });
            }
        }

        let mut buffers: Vec<ColumnBuffer> = headers
            .iter()
            .map(|name| ColumnBuffer::for_column(name))
            .collect();
        let mut record = csv::StringRecord::new();
        let mut rows = 0;
        while reader
            .read_record(&mut record)
            .map_err(|source| ParserError::Csv {
                parser: Self::NAME,
                source,
            })?
        {
            for (idx, buffer) in buffers.iter_mut().enumerate() {
                buffer.push(record.get(idx).unwrap_or(""));
            }
            rows += 1;
        }

        Ok((headers, buffers, rows))
    }
}

/// Cells are parsed as they stream in. A non-text column stays numeric until a
/// cell fails to parse, then it is demoted to text for the remaining rows and
/// the numbers read so far are rendered back to text.
enum ColumnBuffer {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnBuffer {
    fn for_column(name: &str) -> Self {
        if is_text_column(name) {
            Self::Text(Vec::new())
        } else {
            Self::Numeric(Vec::new())
        }
    }

    fn push(&mut self, raw: &str) {
        match self {
            Self::Numeric(values) => match parse_optional_f64(raw) {
                Ok(value) => values.push(value),
                Err(_) => {
                    let mut text: Vec<Option<String>> = values
                        .iter()
                        .map(|value| value.map(|number| number.to_string()))
                        .collect();
                    text.push(optional_text(raw));
                    *self = Self::Text(text);
                }
            },
            Self::Text(values) => values.push(optional_text(raw)),
        }
    }

    fn into_column(self, name: &str) -> Column {
        match self {
            Self::Numeric(values) => Series::new(name.into(), values).into(),
            Self::Text(values) => Series::new(name.into(), values).into(),
        }
    }
}

impl TableParser for DelimitedParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn format(&self) -> TableFormat {
        TableFormat::Delimited
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParsedTable, ParserError> {
        let content = std::str::from_utf8(bytes).map_err(|err| ParserError::FormatMismatch {
            parser: Self::NAME,
            reason: format!("contents were not valid UTF-8: {err}"),
        })?;

        let header_line = content.lines().next().unwrap_or("");
        let delimiter = Self::sniff_delimiter(header_line);
        let (headers, buffers, rows) = Self::read_columns(content, delimiter)?;

        if rows == 0 {
            return Err(ParserError::EmptyData { parser: Self::NAME });
        }

        let columns: Vec<Column> = headers
            .iter()
            .zip(buffers)
            .map(|(name, buffer)| buffer.into_column(name))
            .collect();

        let df = DataFrame::new(columns).map_err(|source| ParserError::Polars {
            parser: Self::NAME,
            source,
        })?;
        ensure_required_columns(Self::NAME, &df)?;

        Ok(ParsedTable::new(TableFormat::Delimited, df))
    }
}
