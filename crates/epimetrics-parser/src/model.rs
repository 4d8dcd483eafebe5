use std::fmt;
use std::path::Path;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableFormat {
    Delimited,
    Parquet,
}

impl TableFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableFormat::Delimited => "delimited",
            TableFormat::Parquet => "parquet",
        }
    }

    /// Guesses the format from a file extension (case-insensitive).
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "csv" | "tsv" | "txt" => Some(TableFormat::Delimited),
            "parquet" | "pq" => Some(TableFormat::Parquet),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    pub format: TableFormat,
    pub row_count: usize,
    pub column_count: usize,
    pub text_columns: Vec<String>,
}

/// A raw observation table: identity and text columns as `String`, every
/// numeric column as `Float64`, `date` still unparsed.
#[derive(Debug, Clone)]
pub struct ParsedTable {
    pub metadata: TableMetadata,
    pub df: DataFrame,
}

impl ParsedTable {
    pub fn new(format: TableFormat, df: DataFrame) -> Self {
        let text_columns = df
            .get_columns()
            .iter()
            .filter(|column| column.dtype() == &DataType::String)
            .map(|column| column.name().to_string())
            .collect();

        Self {
            metadata: TableMetadata {
                format,
                row_count: df.height(),
                column_count: df.width(),
                text_columns,
            },
            df,
        }
    }
}
