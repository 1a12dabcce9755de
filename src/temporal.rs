use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use polars::prelude::*;

use crate::errors::{EngineError, EngineResult};
use crate::schema::{TemporalEncoding, TemporalSchema};

/// Derive the canonical temporal dimensions (year/month/day/hour) a schema
/// requests from whatever encoding its tables use.
///
/// Returns the input unchanged when the dimensions are already present
/// (case-insensitive match). The input table is never mutated.
pub fn normalize(df: &DataFrame, schema: &TemporalSchema) -> EngineResult<DataFrame> {
    let dimensions = &schema.temporal_dimensions;
    if dimensions.is_empty() {
        return Ok(df.clone());
    }

    let columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|c| c.to_lowercase())
        .collect();
    if dimensions
        .iter()
        .all(|d| columns.contains(&d.to_lowercase()))
    {
        return Ok(df.clone());
    }

    match schema.encoding {
        Some(TemporalEncoding::DatetimeFull) => derive_from_datetime(df, dimensions),
        Some(TemporalEncoding::MohrEncoded) => derive_from_mohr(df, dimensions),
        None => Err(EngineError::Configuration(format!(
            "schema '{}' requests temporal dimensions but declares no encoding",
            schema.name
        ))),
    }
}

fn derive_from_datetime(df: &DataFrame, dimensions: &[String]) -> EngineResult<DataFrame> {
    let time = df.column("time")?.cast(&DataType::String)?;
    let parsed: Vec<Option<NaiveDateTime>> = time
        .str()?
        .into_iter()
        .map(|value| value.and_then(parse_timestamp))
        .collect();

    let mut result = df.clone();
    for dimension in dimensions {
        let values: Vec<Option<i32>> = match dimension.as_str() {
            "year" => parsed.iter().map(|t| t.map(|t| t.year())).collect(),
            "month" => parsed.iter().map(|t| t.map(|t| t.month() as i32)).collect(),
            "day" => parsed.iter().map(|t| t.map(|t| t.day() as i32)).collect(),
            "hour" => parsed.iter().map(|t| t.map(|t| t.hour() as i32)).collect(),
            other => {
                return Err(EngineError::Configuration(format!(
                    "unsupported temporal dimension '{}'",
                    other
                )))
            }
        };
        result.with_column(Series::new(dimension, values))?;
    }
    Ok(result)
}

fn derive_from_mohr(df: &DataFrame, dimensions: &[String]) -> EngineResult<DataFrame> {
    let mohr = df.column("mohr")?.cast(&DataType::Int64)?;
    let codes: Vec<Option<i64>> = mohr.i64()?.into_iter().collect();

    let mut result = df.clone();
    for dimension in dimensions {
        let values: Vec<Option<i32>> = match dimension.as_str() {
            "month" => codes.iter().map(|c| c.map(|c| (c / 100) as i32)).collect(),
            "hour" => codes.iter().map(|c| c.map(|c| (c % 100) as i32)).collect(),
            other => {
                return Err(EngineError::Configuration(format!(
                    "temporal dimension '{}' cannot be derived from a mohr code",
                    other
                )))
            }
        };
        result.with_column(Series::new(dimension, values))?;
    }
    Ok(result)
}

/// Parse a timestamp in the formats the source datasets use. Unparseable
/// values become null in the derived columns, non-fatally.
fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
