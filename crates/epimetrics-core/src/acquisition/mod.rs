pub mod aggregate;
pub mod fetch;
pub mod synthetic;

use std::fmt;
use std::path::{Path, PathBuf};

use epimetrics_parser::{parse_table_hinted, ParserError, TableFormat};
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{AcquisitionConfig, PipelineConfig};
use crate::frame::{distinct_locations, filter_rows, has_column, str_values};
use crate::registry::{LOCATION, WORLD_LOCATION};

pub use fetch::{FetchError, Fetcher, HttpFetcher, OfflineFetcher};

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("unknown source identifier '{0}' (expected 'owid' or 'owid_latest')")]
    UnknownSource(String),

    #[error("no data available for source '{source_id}' and synthetic fallback is disabled")]
    Unavailable { source_id: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParserError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] PolarsError),

    #[error("the loaded table is empty")]
    EmptyTable,

    #[error("none of the requested locations are present: {requested:?}")]
    NoMatchingLocations { requested: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Owid,
    OwidLatest,
}

impl SourceId {
    pub fn parse(id: &str) -> Result<Self, AcquisitionError> {
        match id {
            "owid" => Ok(SourceId::Owid),
            "owid_latest" => Ok(SourceId::OwidLatest),
            other => Err(AcquisitionError::UnknownSource(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Owid => "owid",
            SourceId::OwidLatest => "owid_latest",
        }
    }

    pub fn url(&self) -> &'static str {
        match self {
            SourceId::Owid => "https://covid.ourworldindata.org/data/owid-covid-data.csv",
            SourceId::OwidLatest => {
                "https://covid.ourworldindata.org/data/latest/owid-covid-latest.csv"
            }
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Local,
    Cache,
    Download,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    File { path: PathBuf, kind: SourceKind },
    Synthetic,
}

impl ResolvedSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            ResolvedSource::File { kind, .. } => *kind,
            ResolvedSource::Synthetic => SourceKind::Synthetic,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source_id: SourceId,
    pub kind: SourceKind,
    pub path: Option<PathBuf>,
    pub bytes: Option<u64>,
    pub content_hash: Option<String>,
    pub rows_loaded: usize,
    pub rows_out: usize,
    pub world_rows: usize,
    pub locations: usize,
}

#[derive(Debug)]
pub struct Acquired {
    pub table: DataFrame,
    pub report: SourceReport,
}

/// Known cache locations for a source, in lookup order.
pub fn cache_candidates(data_dir: &Path, source: SourceId) -> Vec<PathBuf> {
    let raw = data_dir.join("raw");
    vec![
        data_dir.join("owid-covid-data.csv"),
        data_dir.join("owid-covid-data.parquet"),
        raw.join(format!("{}.csv", source.as_str())),
        raw.join(format!("{}.parquet", source.as_str())),
    ]
}

/// The largest existing non-empty cache candidate.
pub fn find_cached(data_dir: &Path, source: SourceId) -> Option<PathBuf> {
    let mut found: Vec<(PathBuf, u64)> = cache_candidates(data_dir, source)
        .into_iter()
        .filter_map(|path| {
            let size = std::fs::metadata(&path).ok()?.len();
            (size > 0).then_some((path, size))
        })
        .collect();

    found.sort_by(|a, b| b.1.cmp(&a.1));
    let (path, size) = found.into_iter().next()?;
    info!(path = %path.display(), bytes = size, "using cached dataset");
    Some(path)
}

pub fn download_target(data_dir: &Path, source: SourceId) -> PathBuf {
    data_dir.join("raw").join(format!("{}.csv", source.as_str()))
}

/// Local file, then cache (unless forced), then network, then cache again,
/// then synthetic data.
pub fn resolve_source(
    config: &AcquisitionConfig,
    fetcher: &dyn Fetcher,
) -> Result<ResolvedSource, AcquisitionError> {
    let source = SourceId::parse(&config.source)?;

    if let Some(path) = &config.local_path {
        info!(path = %path.display(), "loading local file");
        return Ok(ResolvedSource::File {
            path: path.clone(),
            kind: SourceKind::Local,
        });
    }

    if !config.force_download {
        if let Some(path) = find_cached(&config.data_dir, source) {
            return Ok(ResolvedSource::File {
                path,
                kind: SourceKind::Cache,
            });
        }
    }

    match download(config, source, fetcher) {
        Ok(path) => {
            return Ok(ResolvedSource::File {
                path,
                kind: SourceKind::Download,
            })
        }
        Err(err) => warn!(source = %source, error = %err, "download failed"),
    }

    if let Some(path) = find_cached(&config.data_dir, source) {
        return Ok(ResolvedSource::File {
            path,
            kind: SourceKind::Cache,
        });
    }

    if config.allow_synthetic {
        warn!(source = %source, "no data could be obtained; generating synthetic sample data");
        return Ok(ResolvedSource::Synthetic);
    }

    Err(AcquisitionError::Unavailable {
        source_id: source.as_str().to_string(),
    })
}

fn download(
    config: &AcquisitionConfig,
    source: SourceId,
    fetcher: &dyn Fetcher,
) -> Result<PathBuf, AcquisitionError> {
    info!(source = %source, url = source.url(), "downloading dataset");
    let body = fetcher.fetch(source.url())?;

    let target = download_target(&config.data_dir, source);
    let io_err = |source: std::io::Error| AcquisitionError::Io {
        path: target.clone(),
        source,
    };
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(&target, &body).map_err(io_err)?;

    info!(path = %target.display(), bytes = body.len(), "dataset downloaded");
    Ok(target)
}

/// Loads the resolved source into a raw table plus the partial report
/// describing where it came from.
pub fn load_table(
    resolved: &ResolvedSource,
    config: &AcquisitionConfig,
) -> Result<(DataFrame, SourceReport), AcquisitionError> {
    let source_id = SourceId::parse(&config.source)?;

    let (df, path, bytes, content_hash) = match resolved {
        ResolvedSource::File { path, .. } => {
            let content = std::fs::read(path).map_err(|source| AcquisitionError::Io {
                path: path.clone(),
                source,
            })?;
            let hash = blake3::hash(&content).to_hex().to_string();
            let parsed = parse_table_hinted(&content, TableFormat::from_path(path))?;
            info!(
                path = %path.display(),
                format = %parsed.metadata.format,
                rows = parsed.metadata.row_count,
                columns = parsed.metadata.column_count,
                hash = %hash,
                "parsed source file"
            );
            (
                parsed.df,
                Some(path.clone()),
                Some(content.len() as u64),
                Some(hash),
            )
        }
        ResolvedSource::Synthetic => {
            let df = synthetic::generate(config.synthetic_start, config.synthetic_end)?;
            (df, None, None, None)
        }
    };

    let report = SourceReport {
        source_id,
        kind: resolved.kind(),
        path,
        bytes,
        content_hash,
        rows_loaded: df.height(),
        rows_out: df.height(),
        world_rows: 0,
        locations: 0,
    };
    Ok((df, report))
}

/// Keeps rows whose location is listed.
pub fn filter_locations(
    df: &DataFrame,
    locations: &[String],
) -> Result<DataFrame, AcquisitionError> {
    if !has_column(df, LOCATION) {
        return Err(AcquisitionError::NoMatchingLocations {
            requested: locations.to_vec(),
        });
    }
    let values = str_values(df, LOCATION)?;
    let keep: Vec<bool> = values
        .iter()
        .map(|value| {
            value
                .as_deref()
                .is_some_and(|location| locations.iter().any(|wanted| wanted == location))
        })
        .collect();

    let filtered = filter_rows(df, &keep)?;
    if filtered.height() == 0 {
        return Err(AcquisitionError::NoMatchingLocations {
            requested: locations.to_vec(),
        });
    }
    Ok(filtered)
}

/// Resolves, loads and aggregates the source, then applies the optional
/// location filter.
pub fn acquire(
    config: &PipelineConfig,
    fetcher: &dyn Fetcher,
) -> Result<Acquired, AcquisitionError> {
    let resolved = resolve_source(&config.acquisition, fetcher)?;
    let (raw, mut report) = load_table(&resolved, &config.acquisition)?;
    if raw.height() == 0 {
        return Err(AcquisitionError::EmptyTable);
    }

    let mut table = aggregate::recompute_world(&raw)?;
    if let Some(locations) = &config.locations {
        table = filter_locations(&table, locations)?;
    }
    if table.height() == 0 {
        return Err(AcquisitionError::EmptyTable);
    }

    let locations = distinct_locations(&table)?;
    let world_rows = if has_column(&table, LOCATION) {
        str_values(&table, LOCATION)?
            .iter()
            .filter(|value| value.as_deref() == Some(WORLD_LOCATION))
            .count()
    } else {
        0
    };
    report.rows_out = table.height();
    report.world_rows = world_rows;
    report.locations = locations;

    info!(
        kind = ?report.kind,
        rows_loaded = report.rows_loaded,
        rows_out = report.rows_out,
        world_rows,
        locations,
        "acquisition complete"
    );

    Ok(Acquired { table, report })
}
