pub mod errors;
pub mod formats;
pub mod model;
mod registry;

pub use errors::{ParserAttempt, ParserError};
pub use model::{ParsedTable, TableFormat, TableMetadata};
pub use registry::{
    parse_table, parse_table_file, parse_table_hinted, parse_with_parsers, TableParser,
};

#[cfg(test)]
mod tests;
