use std::io;
use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors surfaced by the energy production engine.
///
/// All variants are raised synchronously to the caller; nothing is retried
/// internally. The only locally-recovered failure is the spline fit inside
/// the quantile smoother, which degrades instead of erroring (see `swi`).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("expected column '{column}' in input table")]
    MissingColumn { column: String },

    #[error("table does not match schema '{schema}': {reason}")]
    SchemaMismatch { schema: String, reason: String },

    #[error("unknown schema '{0}'")]
    UnknownSchema(String),

    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("power curve '{0}' not found")]
    UnknownPowerCurve(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("no valid years found in timeseries data")]
    NoData,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse power curve file {path}: {source}")]
    PowerCurveParse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Table(#[from] PolarsError),
}

pub type EngineResult<T> = Result<T, EngineError>;
