use std::io::Cursor;

use polars::prelude::*;

use crate::errors::ParserError;
use crate::model::{ParsedTable, TableFormat};
use crate::registry::TableParser;

use super::{ensure_required_columns, normalize_column_types};

const PARQUET_MAGIC: &[u8; 4] = b"PAR1";

pub struct ParquetTableParser;

impl Default for ParquetTableParser {
    fn default() -> Self {
        Self
    }
}

impl ParquetTableParser {
    const NAME: &'static str = "PARQUET";
}

impl TableParser for ParquetTableParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn format(&self) -> TableFormat {
        TableFormat::Parquet
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParsedTable, ParserError> {
        if bytes.len() < 8 || !bytes.starts_with(PARQUET_MAGIC) || !bytes.ends_with(PARQUET_MAGIC)
        {
            return Err(ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: "missing PAR1 magic bytes".to_string(),
            });
        }

        let df = ParquetReader::new(Cursor::new(bytes))
            .finish()
            .map_err(|source| ParserError::Polars {
                parser: Self::NAME,
                source,
            })?;

        if df.height() == 0 {
            return Err(ParserError::EmptyData { parser: Self::NAME });
        }

        let df = normalize_column_types(Self::NAME, df)?;
        ensure_required_columns(Self::NAME, &df)?;

        Ok(ParsedTable::new(TableFormat::Parquet, df))
    }
}
