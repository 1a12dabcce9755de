use std::collections::HashMap;
use std::path::Path;

use polars::prelude::*;
use serde::Deserialize;
use tracing::debug;

use crate::errors::{EngineError, EngineResult};

/// One row of a power-curve CSV file.
#[derive(Debug, Deserialize)]
struct PowerCurvePoint {
    #[serde(alias = "windspeed", alias = "Wind Speed")]
    wind_speed: f64,
    #[serde(alias = "power_kw", alias = "kW")]
    kw: f64,
}

/// A turbine power curve: tabulated (wind speed, kW) points with linear
/// interpolation between them. Lookups outside the tabulated range clamp to
/// the endpoint values.
#[derive(Debug, Clone)]
pub struct PowerCurve {
    speeds: Vec<f64>,
    kw: Vec<f64>,
}

impl PowerCurve {
    pub fn new(mut points: Vec<(f64, f64)>) -> EngineResult<Self> {
        if points.is_empty() {
            return Err(EngineError::Configuration(
                "power curve must contain at least one point".to_string(),
            ));
        }
        if points.iter().any(|(s, k)| !s.is_finite() || !k.is_finite()) {
            return Err(EngineError::Configuration(
                "power curve contains non-finite values".to_string(),
            ));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        if points.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(EngineError::Configuration(
                "power curve wind speeds must be distinct".to_string(),
            ));
        }
        let (speeds, kw) = points.into_iter().unzip();
        Ok(Self { speeds, kw })
    }

    pub fn from_csv_path(path: &Path) -> EngineResult<Self> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| EngineError::PowerCurveParse {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut points = Vec::new();
        for record in reader.deserialize::<PowerCurvePoint>() {
            let point = record.map_err(|e| EngineError::PowerCurveParse {
                path: path.to_path_buf(),
                source: e,
            })?;
            points.push((point.wind_speed, point.kw));
        }
        Self::new(points)
    }

    /// Instantaneous power output at the given wind speed.
    pub fn windspeed_to_kw_value(&self, speed: f64) -> f64 {
        if !speed.is_finite() {
            return f64::NAN;
        }
        let n = self.speeds.len();
        if speed <= self.speeds[0] {
            return self.kw[0];
        }
        if speed >= self.speeds[n - 1] {
            return self.kw[n - 1];
        }
        let i = self.speeds.partition_point(|&s| s <= speed) - 1;
        let span = self.speeds[i + 1] - self.speeds[i];
        let fraction = (speed - self.speeds[i]) / span;
        self.kw[i] + fraction * (self.kw[i + 1] - self.kw[i])
    }

    /// Map a windspeed column of a table through the curve, returning the
    /// corresponding kW column (`{column}_kw`). Nulls stay null.
    pub fn windspeed_to_kw(&self, df: &DataFrame, column: &str) -> EngineResult<Series> {
        let speeds = df.column(column)?.cast(&DataType::Float64)?;
        let kw: Vec<Option<f64>> = speeds
            .f64()?
            .into_iter()
            .map(|speed| speed.map(|s| self.windspeed_to_kw_value(s)))
            .collect();
        Ok(Series::new(&format!("{column}_kw"), kw))
    }
}

/// Name-keyed repository of power curves, loaded once at startup and shared
/// read-only by all computations.
#[derive(Debug, Clone, Default)]
pub struct PowerCurveManager {
    curves: HashMap<String, PowerCurve>,
}

impl PowerCurveManager {
    /// Load every `.csv` file in a directory as a power curve named after the
    /// file stem.
    pub fn from_dir(directory: &Path) -> EngineResult<Self> {
        let entries = std::fs::read_dir(directory).map_err(|e| EngineError::Io {
            path: directory.to_path_buf(),
            source: e,
        })?;

        let mut curves = HashMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::Io {
                path: directory.to_path_buf(),
                source: e,
            })?;
            let path = entry.path();
            if path.extension().map(|e| e == "csv") != Some(true) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            debug!(curve = name, "loading power curve");
            curves.insert(name.to_string(), PowerCurve::from_csv_path(&path)?);
        }
        Ok(Self { curves })
    }

    pub fn insert(&mut self, name: &str, curve: PowerCurve) {
        self.curves.insert(name.to_string(), curve);
    }

    pub fn get_curve(&self, name: &str) -> EngineResult<&PowerCurve> {
        self.curves
            .get(name)
            .ok_or_else(|| EngineError::UnknownPowerCurve(name.to_string()))
    }

    pub fn available(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.curves.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    fn reference_curve() -> PowerCurve {
        PowerCurve::new(vec![
            (3.0, 0.0),
            (5.0, 20.0),
            (8.0, 50.0),
            (12.0, 100.0),
            (25.0, 100.0),
        ])
        .unwrap()
    }

    #[test]
    fn interpolates_between_tabulated_points() {
        let curve = reference_curve();
        assert_relative_eq!(curve.windspeed_to_kw_value(8.0), 50.0);
        assert_relative_eq!(curve.windspeed_to_kw_value(6.5), 35.0);
        assert_relative_eq!(curve.windspeed_to_kw_value(4.0), 10.0);
    }

    #[test]
    fn clamps_outside_tabulated_range() {
        let curve = reference_curve();
        assert_relative_eq!(curve.windspeed_to_kw_value(1.0), 0.0);
        assert_relative_eq!(curve.windspeed_to_kw_value(30.0), 100.0);
    }

    #[test]
    fn columnar_mapping_preserves_nulls() {
        let curve = reference_curve();
        let df = df![
            "windspeed_100m" => [Some(8.0), None, Some(6.5)],
        ]
        .unwrap();
        let kw = curve.windspeed_to_kw(&df, "windspeed_100m").unwrap();
        assert_eq!(kw.name(), "windspeed_100m_kw");
        let ca = kw.f64().unwrap();
        assert_eq!(ca.get(0), Some(50.0));
        assert_eq!(ca.get(1), None);
        assert_eq!(ca.get(2), Some(35.0));
    }

    #[test]
    fn rejects_duplicate_speeds() {
        let result = PowerCurve::new(vec![(5.0, 10.0), (5.0, 12.0)]);
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn loads_curves_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference-100kW.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "wind_speed,kw").unwrap();
        writeln!(file, "3.0,0.0").unwrap();
        writeln!(file, "8.0,50.0").unwrap();
        writeln!(file, "12.0,100.0").unwrap();
        drop(file);

        let manager = PowerCurveManager::from_dir(dir.path()).unwrap();
        assert_eq!(manager.available(), vec!["reference-100kW"]);
        let curve = manager.get_curve("reference-100kW").unwrap();
        assert_relative_eq!(curve.windspeed_to_kw_value(8.0), 50.0);
        assert!(matches!(
            manager.get_curve("missing"),
            Err(EngineError::UnknownPowerCurve(_))
        ));
    }
}
