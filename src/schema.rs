use std::collections::HashMap;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};

/// Column names treated as temporal for validation purposes.
pub const TEMPORAL_COLUMN_NAMES: [&str; 6] = ["time", "year", "month", "day", "hour", "mohr"];

/// How a timeseries table encodes its time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalEncoding {
    /// A `time` column holding full timestamps, one row per real hour.
    DatetimeFull,
    /// A `mohr` column holding `month * 100 + hour` representative values.
    MohrEncoded,
}

/// Statistical shape of a dataset, resolved once when the registry is built.
///
/// Classification happens at load time so that computation dispatch is an
/// exhaustive match; a schema accepted by the registry can never hit an
/// "unknown schema" path at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Timeseries { encoding: TemporalEncoding },
    Quantile { has_year: bool, use_swi: bool },
}

/// Raw schema configuration as it appears in config files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub temporal_columns: Vec<String>,
    #[serde(default)]
    pub probability_columns: Vec<String>,
    #[serde(default)]
    pub temporal_dimensions: Vec<String>,
    #[serde(default)]
    pub encoding: Option<TemporalEncoding>,
    #[serde(default)]
    pub use_swi: bool,
}

/// A named temporal schema with its classification resolved.
#[derive(Debug, Clone)]
pub struct TemporalSchema {
    pub name: String,
    pub temporal_columns: Vec<String>,
    pub probability_columns: Vec<String>,
    pub temporal_dimensions: Vec<String>,
    pub encoding: Option<TemporalEncoding>,
    pub use_swi: bool,
    pub kind: SchemaKind,
}

impl TemporalSchema {
    /// Classify a raw schema config, rejecting shapes the engine cannot
    /// compute over.
    pub fn resolve(name: &str, config: SchemaConfig) -> EngineResult<Self> {
        let is_timeseries = config
            .temporal_columns
            .iter()
            .any(|c| c == "time" || c == "mohr");
        let is_quantile = config
            .probability_columns
            .iter()
            .any(|c| c == "probability");

        let kind = if is_timeseries {
            let encoding = config.encoding.ok_or_else(|| {
                EngineError::Configuration(format!(
                    "timeseries schema '{}' declares no temporal encoding",
                    name
                ))
            })?;
            SchemaKind::Timeseries { encoding }
        } else if is_quantile {
            SchemaKind::Quantile {
                has_year: config.temporal_columns.iter().any(|c| c == "year"),
                use_swi: config.use_swi,
            }
        } else {
            return Err(EngineError::Configuration(format!(
                "schema '{}' is neither timeseries nor quantile",
                name
            )));
        };

        Ok(Self {
            name: name.to_string(),
            temporal_columns: config.temporal_columns,
            probability_columns: config.probability_columns,
            temporal_dimensions: config.temporal_dimensions,
            encoding: config.encoding,
            use_swi: config.use_swi,
            kind,
        })
    }

    /// True when the schema carries neither temporal columns nor derived
    /// temporal dimensions (the atemporal quantile shape).
    pub fn is_atemporal(&self) -> bool {
        self.temporal_columns.is_empty() && self.temporal_dimensions.is_empty()
    }
}

/// Static, read-only mapping from dataset name to temporal schema.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<String, TemporalSchema>,
}

impl SchemaRegistry {
    pub fn from_configs(
        configs: impl IntoIterator<Item = (String, SchemaConfig)>,
    ) -> EngineResult<Self> {
        let mut schemas = HashMap::new();
        for (name, config) in configs {
            let schema = TemporalSchema::resolve(&name, config)?;
            schemas.insert(name, schema);
        }
        Ok(Self { schemas })
    }

    /// The four schemas shipped with the engine.
    pub fn builtin() -> EngineResult<Self> {
        let strings = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self::from_configs([
            (
                "era5-timeseries".to_string(),
                SchemaConfig {
                    temporal_columns: strings(&["time"]),
                    temporal_dimensions: strings(&["year", "month", "day", "hour"]),
                    encoding: Some(TemporalEncoding::DatetimeFull),
                    ..Default::default()
                },
            ),
            (
                "wtk-timeseries".to_string(),
                SchemaConfig {
                    temporal_columns: strings(&["mohr", "year"]),
                    temporal_dimensions: strings(&["month", "hour"]),
                    encoding: Some(TemporalEncoding::MohrEncoded),
                    ..Default::default()
                },
            ),
            (
                "era5-quantiles".to_string(),
                SchemaConfig {
                    temporal_columns: strings(&["year"]),
                    probability_columns: strings(&["probability"]),
                    use_swi: true,
                    ..Default::default()
                },
            ),
            (
                "ensemble-quantiles".to_string(),
                SchemaConfig {
                    probability_columns: strings(&["probability"]),
                    use_swi: true,
                    ..Default::default()
                },
            ),
        ])
    }

    pub fn get(&self, name: &str) -> EngineResult<&TemporalSchema> {
        self.schemas
            .get(name)
            .ok_or_else(|| EngineError::UnknownSchema(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.schemas.keys().map(String::as_str).collect()
    }
}

/// Check that a table carries the columns its schema requires, and that an
/// atemporal schema's table does not unexpectedly contain temporal columns.
pub fn validate_table(df: &DataFrame, schema: &TemporalSchema) -> EngineResult<()> {
    let columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|c| c.to_lowercase())
        .collect();

    for required in schema
        .temporal_columns
        .iter()
        .chain(schema.probability_columns.iter())
    {
        if !columns.contains(&required.to_lowercase()) {
            return Err(EngineError::SchemaMismatch {
                schema: schema.name.clone(),
                reason: format!("required column '{}' is absent", required),
            });
        }
    }

    if schema.is_atemporal() {
        for temporal in TEMPORAL_COLUMN_NAMES {
            if columns.iter().any(|c| c == temporal) {
                return Err(EngineError::SchemaMismatch {
                    schema: schema.name.clone(),
                    reason: format!(
                        "atemporal schema but table contains temporal column '{}'",
                        temporal
                    ),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_resolves_all_kinds() {
        let registry = SchemaRegistry::builtin().unwrap();
        assert_eq!(
            registry.get("era5-timeseries").unwrap().kind,
            SchemaKind::Timeseries {
                encoding: TemporalEncoding::DatetimeFull
            }
        );
        assert_eq!(
            registry.get("wtk-timeseries").unwrap().kind,
            SchemaKind::Timeseries {
                encoding: TemporalEncoding::MohrEncoded
            }
        );
        assert_eq!(
            registry.get("era5-quantiles").unwrap().kind,
            SchemaKind::Quantile {
                has_year: true,
                use_swi: true
            }
        );
        assert_eq!(
            registry.get("ensemble-quantiles").unwrap().kind,
            SchemaKind::Quantile {
                has_year: false,
                use_swi: true
            }
        );
        assert!(registry.get("ensemble-quantiles").unwrap().is_atemporal());
    }

    #[test]
    fn unknown_schema_name_is_rejected() {
        let registry = SchemaRegistry::builtin().unwrap();
        assert!(matches!(
            registry.get("hrrr-timeseries"),
            Err(EngineError::UnknownSchema(_))
        ));
    }

    #[test]
    fn unclassifiable_schema_is_rejected_at_build() {
        let result = TemporalSchema::resolve("bad", SchemaConfig::default());
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn timeseries_schema_without_encoding_is_rejected() {
        let config = SchemaConfig {
            temporal_columns: vec!["time".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            TemporalSchema::resolve("bad-ts", config),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn missing_required_column_fails_validation() {
        let registry = SchemaRegistry::builtin().unwrap();
        let schema = registry.get("era5-quantiles").unwrap();
        let df = df![
            "windspeed_100m" => [4.0, 5.0],
            "year" => [2020i32, 2020],
        ]
        .unwrap();
        assert!(matches!(
            validate_table(&df, schema),
            Err(EngineError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn atemporal_table_with_temporal_column_fails_validation() {
        let registry = SchemaRegistry::builtin().unwrap();
        let schema = registry.get("ensemble-quantiles").unwrap();
        let df = df![
            "probability" => [0.1, 0.5],
            "windspeed_100m" => [4.0, 5.0],
            "year" => [2020i32, 2020],
        ]
        .unwrap();
        assert!(matches!(
            validate_table(&df, schema),
            Err(EngineError::SchemaMismatch { .. })
        ));
    }
}
