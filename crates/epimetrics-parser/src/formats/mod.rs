mod common;
mod delimited;
mod parquet;

pub use common::{REQUIRED_COLUMNS, TEXT_COLUMNS};
pub use delimited::DelimitedParser;
pub use parquet::ParquetTableParser;

pub(crate) use common::{
    ensure_required_columns, is_text_column, normalize_column_types, optional_text,
    parse_optional_f64,
};
