use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};

/// Valid year sets for a model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YearRange {
    #[serde(default)]
    pub full: Vec<i32>,
    #[serde(default)]
    pub sample: Vec<i32>,
}

/// Per-model configuration: which temporal schema its tables follow, and the
/// heights/years the model covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub schema: String,
    #[serde(default)]
    pub heights: Vec<u32>,
    #[serde(default)]
    pub years: YearRange,
}

/// Read-only model configuration, initialized once at startup and shared by
/// all computations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub models: HashMap<String, ModelConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut models = HashMap::new();
        models.insert(
            "era5".to_string(),
            ModelConfig {
                schema: "era5-timeseries".to_string(),
                heights: vec![30, 40, 50, 60, 80, 100],
                years: YearRange {
                    full: (2013..=2023).collect(),
                    sample: vec![2020, 2021, 2022, 2023],
                },
            },
        );
        models.insert(
            "wtk".to_string(),
            ModelConfig {
                schema: "wtk-timeseries".to_string(),
                heights: vec![40, 60, 80, 100, 120, 140, 160, 200],
                years: YearRange {
                    full: (2000..=2020).collect(),
                    sample: vec![2018, 2019, 2020],
                },
            },
        );
        models.insert(
            "ensemble".to_string(),
            ModelConfig {
                schema: "ensemble-quantiles".to_string(),
                heights: vec![30, 40, 50, 60, 80, 100],
                years: YearRange::default(),
            },
        );
        Self { models }
    }
}

impl EngineConfig {
    /// Load a configuration override from a JSON file.
    pub fn from_json_file(path: &Path) -> EngineResult<Self> {
        let file = File::open(path).map_err(|e| EngineError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| EngineError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn model(&self, name: &str) -> EngineResult<&ModelConfig> {
        self.models
            .get(name)
            .ok_or_else(|| EngineError::UnknownModel(name.to_string()))
    }

    /// Validate a requested height against the model's supported heights.
    pub fn validate_height(&self, model: &str, height: u32) -> EngineResult<u32> {
        let config = self.model(model)?;
        if !config.heights.is_empty() && !config.heights.contains(&height) {
            return Err(EngineError::InvalidArgument(format!(
                "invalid height {}m for model '{}'; must be one of {:?}",
                height, model, config.heights
            )));
        }
        Ok(height)
    }

    /// Validate a requested year against the model's supported years.
    pub fn validate_year(&self, model: &str, year: i32) -> EngineResult<i32> {
        let config = self.model(model)?;
        let valid = &config.years.full;
        if !valid.is_empty() && !valid.contains(&year) {
            let min = valid.iter().min().copied().unwrap_or(year);
            let max = valid.iter().max().copied().unwrap_or(year);
            return Err(EngineError::InvalidArgument(format!(
                "invalid year {} for model '{}'; currently supporting years {}-{}",
                year, model, min, max
            )));
        }
        Ok(year)
    }
}
