use std::collections::BTreeSet;

use polars::prelude::*;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::power_curve::{PowerCurve, PowerCurveManager};
use crate::schema::{self, SchemaKind, SchemaRegistry, TemporalSchema, TEMPORAL_COLUMN_NAMES};
use crate::swi;
use crate::temporal;

/// Schema-driven energy production computation.
///
/// Holds references to the process-wide read-only collaborators (model
/// config, schema registry, power-curve repository), all built once at
/// startup; each computation operates on caller-owned input and returns a
/// fresh table.
pub struct EnergyProductionComputer<'a> {
    config: &'a EngineConfig,
    schemas: &'a SchemaRegistry,
    power_curves: &'a PowerCurveManager,
}

impl<'a> EnergyProductionComputer<'a> {
    pub fn new(
        config: &'a EngineConfig,
        schemas: &'a SchemaRegistry,
        power_curves: &'a PowerCurveManager,
    ) -> Self {
        Self {
            config,
            schemas,
            power_curves,
        }
    }

    pub(crate) fn schema_for_model(&self, model_name: &str) -> EngineResult<&'a TemporalSchema> {
        self.schemas.get(&self.config.model(model_name)?.schema)
    }

    /// Convert a wind-speed table into an annotated production table.
    ///
    /// Timeseries schemas get a `{ws_col}_kw` column per requested height,
    /// row-wise. Quantile schemas are midpoint-binned per group (per year, or
    /// the whole table when atemporal), optionally SWI-smoothed first.
    ///
    /// With `relevant_columns_only` the result is pruned to the identifying
    /// columns plus the windspeed/kW pairs for the requested heights.
    pub fn compute(
        &self,
        df: &DataFrame,
        heights: &[u32],
        curve_name: &str,
        model_name: &str,
        relevant_columns_only: bool,
    ) -> EngineResult<(DataFrame, &'a TemporalSchema)> {
        if heights.is_empty() {
            return Err(EngineError::InvalidArgument(
                "heights parameter cannot be empty; provide at least one height value".to_string(),
            ));
        }

        let ws_cols: Vec<String> = heights.iter().map(|h| format!("windspeed_{h}m")).collect();
        let columns = df.get_column_names();
        for ws_col in &ws_cols {
            if !columns.iter().any(|c| *c == ws_col.as_str()) {
                return Err(EngineError::MissingColumn {
                    column: ws_col.clone(),
                });
            }
        }

        let schema = self.schema_for_model(model_name)?;
        schema::validate_table(df, schema)?;
        let normalized = temporal::normalize(df, schema)?;
        let curve = self.power_curves.get_curve(curve_name)?;
        debug!(schema = %schema.name, rows = normalized.height(), "computing energy production");

        match schema.kind {
            SchemaKind::Timeseries { .. } => {
                let mut result = normalized;
                for ws_col in &ws_cols {
                    let kw = curve.windspeed_to_kw(&result, ws_col)?;
                    result.with_column(kw)?;
                }

                if relevant_columns_only {
                    let present = result.get_column_names();
                    let mut cols: Vec<String> = TEMPORAL_COLUMN_NAMES
                        .iter()
                        .filter(|c| present.iter().any(|have| *have == **c))
                        .map(|c| c.to_string())
                        .collect();
                    cols.extend(ws_cols.iter().cloned());
                    cols.extend(ws_cols.iter().map(|ws| format!("{ws}_kw")));
                    result = result.select(cols)?;
                }
                Ok((result, schema))
            }
            SchemaKind::Quantile { has_year, use_swi } => {
                let mut frames: Vec<DataFrame> = Vec::new();
                if has_year {
                    // Rows within a group may be shuffled; midpoint binning
                    // requires ascending probability.
                    for (year, group) in group_by_int_column(&normalized, "year")? {
                        let sorted = group.sort(["probability"], Default::default())?;
                        let mut frame = midpoints_for_heights(&sorted, &ws_cols, curve, use_swi)?;
                        frame.with_column(Series::new("year", vec![year; frame.height()]))?;
                        frames.push(frame);
                    }
                } else {
                    let sorted = normalized.sort(["probability"], Default::default())?;
                    frames.push(midpoints_for_heights(&sorted, &ws_cols, curve, use_swi)?);
                }

                let mut iter = frames.into_iter();
                let mut result = match iter.next() {
                    Some(first) => first,
                    None => empty_quantile_frame(&ws_cols, has_year)?,
                };
                for frame in iter {
                    result.vstack_mut(&frame)?;
                }

                if relevant_columns_only {
                    let mut cols: Vec<String> = Vec::new();
                    if has_year {
                        cols.push("year".to_string());
                    }
                    for ws_col in &ws_cols {
                        cols.push(ws_col.clone());
                        cols.push(format!("{ws_col}_kw"));
                    }
                    result = result.select(cols)?;
                }
                Ok((result, schema))
            }
        }
    }
}

/// Midpoint/kW frames for every requested height, horizontally concatenated.
fn midpoints_for_heights(
    sorted: &DataFrame,
    ws_cols: &[String],
    curve: &PowerCurve,
    use_swi: bool,
) -> EngineResult<DataFrame> {
    let mut combined: Option<DataFrame> = None;
    for ws_col in ws_cols {
        let frame = quantiles_to_kw_midpoints(sorted, ws_col, curve, use_swi)?;
        combined = Some(match combined {
            None => frame,
            Some(acc) => acc.hstack(frame.get_columns())?,
        });
    }
    Ok(combined.unwrap_or_else(DataFrame::empty))
}

/// Equal-probability midpoint binning for one windspeed column of a
/// probability-sorted quantile table.
pub(crate) fn quantiles_to_kw_midpoints(
    sorted: &DataFrame,
    ws_col: &str,
    curve: &PowerCurve,
    use_swi: bool,
) -> EngineResult<DataFrame> {
    let probs = column_as_f64(sorted, "probability")?;
    let quants = column_as_f64(sorted, ws_col)?;

    let estimated = if use_swi {
        let outcome = swi::smooth(&quants, &probs);
        if outcome.is_degraded() {
            warn!(
                column = ws_col,
                "quantile smoothing degraded to a zero curve"
            );
        }
        outcome.into_inner().quantiles
    } else {
        quants
    };

    let midpoints: Vec<f64> = estimated.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    let kw: Vec<f64> = midpoints
        .iter()
        .map(|&m| curve.windspeed_to_kw_value(m))
        .collect();

    Ok(DataFrame::new(vec![
        Series::new(ws_col, midpoints),
        Series::new(&format!("{ws_col}_kw"), kw),
    ])?)
}

/// Split a table into per-value groups over an integer column, ascending.
/// Rows where the column is null belong to no group.
pub(crate) fn group_by_int_column(
    df: &DataFrame,
    column: &str,
) -> EngineResult<Vec<(i32, DataFrame)>> {
    let casted = df.column(column)?.cast(&DataType::Int32)?;
    let ca = casted.i32()?;

    let mut keys: BTreeSet<i32> = BTreeSet::new();
    for value in ca.into_iter().flatten() {
        keys.insert(value);
    }

    let mut groups = Vec::with_capacity(keys.len());
    for key in keys {
        let mask = ca.equal(key);
        groups.push((key, df.filter(&mask)?));
    }
    Ok(groups)
}

pub(crate) fn column_as_f64(df: &DataFrame, column: &str) -> EngineResult<Vec<f64>> {
    let casted = df.column(column)?.cast(&DataType::Float64)?;
    Ok(casted
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

fn empty_quantile_frame(ws_cols: &[String], has_year: bool) -> EngineResult<DataFrame> {
    let mut series = Vec::new();
    if has_year {
        series.push(Series::new("year", Vec::<i32>::new()));
    }
    for ws_col in ws_cols {
        series.push(Series::new(ws_col, Vec::<f64>::new()));
        series.push(Series::new(&format!("{ws_col}_kw"), Vec::<f64>::new()));
    }
    Ok(DataFrame::new(series)?)
}
