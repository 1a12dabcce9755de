use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::*;
use serde::Serialize;

use crate::errors::{EngineError, EngineResult};
use crate::production::{column_as_f64, group_by_int_column, EnergyProductionComputer};
use crate::schema::{SchemaKind, TemporalEncoding};

/// Hours in a (non-leap) year; quantile bins are equal-probability, so mean
/// bin power times annual hours gives expected annual energy.
pub const HOURS_PER_YEAR: f64 = 8760.0;
/// A mohr-encoded row is a representative hour-of-month value, scaled to a
/// 30-day month.
const DAYS_PER_REPRESENTATIVE_MONTH: f64 = 30.0;

const MONTH_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// One yearly aggregation row, before user-facing formatting. `year` is
/// `None` for the single row produced by an atemporal quantile table.
#[derive(Debug, Clone, PartialEq)]
pub struct YearlyRow {
    pub year: Option<i32>,
    pub avg_windspeed: f64,
    pub kwh: f64,
}

/// User-facing production figures: wind speed as 2-decimal text, kWh rounded
/// to the nearest integer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductionEntry {
    #[serde(rename = "Average wind speed (m/s)")]
    pub avg_windspeed: String,
    #[serde(rename = "kWh produced")]
    pub kwh: i64,
}

impl From<&YearlyRow> for ProductionEntry {
    fn from(row: &YearlyRow) -> Self {
        Self {
            avg_windspeed: format!("{:.2}", row.avg_windspeed),
            kwh: row.kwh.round() as i64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryEntry {
    pub year: Option<i32>,
    #[serde(flatten)]
    pub production: ProductionEntry,
}

impl From<&YearlyRow> for SummaryEntry {
    fn from(row: &YearlyRow) -> Self {
        Self {
            year: row.year,
            production: ProductionEntry::from(row),
        }
    }
}

/// Lowest/average/highest year summary. Selection is by average wind speed,
/// not kWh; the power curve is nonlinear, so these can disagree, but the
/// documented behavior sorts on the windspeed proxy.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryProduction {
    #[serde(rename = "Lowest year")]
    pub lowest: SummaryEntry,
    #[serde(rename = "Average year")]
    pub average: SummaryEntry,
    #[serde(rename = "Highest year")]
    pub highest: SummaryEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyProduction {
    pub month: String,
    #[serde(flatten)]
    pub production: ProductionEntry,
}

impl<'a> EnergyProductionComputer<'a> {
    /// Yearly rows for a single height, sorted ascending by average wind
    /// speed. Atemporal quantile tables yield one row with `year = None`.
    pub fn prepare_yearly(
        &self,
        df: &DataFrame,
        height: u32,
        curve_name: &str,
        model_name: &str,
    ) -> EngineResult<Vec<YearlyRow>> {
        let (prod, schema) = self.compute(df, &[height], curve_name, model_name, true)?;
        let ws_col = format!("windspeed_{height}m");
        let kw_col = format!("{ws_col}_kw");

        let mut rows = Vec::new();
        match schema.kind {
            SchemaKind::Timeseries { encoding } => {
                for (year, group) in group_by_int_column(&prod, "year")? {
                    let kw_sum = column_sum(&group, &kw_col)?;
                    let kwh = match encoding {
                        TemporalEncoding::MohrEncoded => kw_sum * DAYS_PER_REPRESENTATIVE_MONTH,
                        TemporalEncoding::DatetimeFull => kw_sum,
                    };
                    rows.push(YearlyRow {
                        year: Some(year),
                        avg_windspeed: column_mean(&group, &ws_col)?,
                        kwh,
                    });
                }
            }
            SchemaKind::Quantile { has_year, .. } => {
                if has_year {
                    for (year, group) in group_by_int_column(&prod, "year")? {
                        rows.push(YearlyRow {
                            year: Some(year),
                            avg_windspeed: column_mean(&group, &ws_col)?,
                            kwh: column_mean(&group, &kw_col)? * HOURS_PER_YEAR,
                        });
                    }
                } else {
                    if prod.height() == 0 {
                        return Ok(rows);
                    }
                    rows.push(YearlyRow {
                        year: None,
                        avg_windspeed: column_mean(&prod, &ws_col)?,
                        kwh: column_mean(&prod, &kw_col)? * HOURS_PER_YEAR,
                    });
                }
            }
        }

        rows.sort_by(|a, b| a.avg_windspeed.total_cmp(&b.avg_windspeed));
        Ok(rows)
    }

    /// Yearly production keyed by year digits, or `"Global"` for the single
    /// atemporal entry.
    pub fn calculate_yearly_energy_production(
        &self,
        df: &DataFrame,
        height: u32,
        curve_name: &str,
        model_name: &str,
    ) -> EngineResult<BTreeMap<String, ProductionEntry>> {
        let rows = self.prepare_yearly(df, height, curve_name, model_name)?;
        let mut result = BTreeMap::new();
        for row in &rows {
            let key = row
                .year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "Global".to_string());
            result.insert(key, ProductionEntry::from(row));
        }
        Ok(result)
    }

    /// Lowest/average/highest year summary over the windspeed-sorted yearly
    /// rows; the average row is the column-wise mean with `year = None`.
    pub fn calculate_energy_production_summary(
        &self,
        df: &DataFrame,
        height: u32,
        curve_name: &str,
        model_name: &str,
    ) -> EngineResult<SummaryProduction> {
        let rows = self.prepare_yearly(df, height, curve_name, model_name)?;
        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return Err(EngineError::NoData);
        };

        let n = rows.len() as f64;
        let average = YearlyRow {
            year: None,
            avg_windspeed: rows.iter().map(|r| r.avg_windspeed).sum::<f64>() / n,
            kwh: rows.iter().map(|r| r.kwh).sum::<f64>() / n,
        };

        Ok(SummaryProduction {
            lowest: SummaryEntry::from(first),
            average: SummaryEntry::from(&average),
            highest: SummaryEntry::from(last),
        })
    }

    /// Monthly averages for a timeseries table: per-month mean windspeed and
    /// summed kW, scaled per encoding and averaged across the years present.
    pub fn calculate_monthly_energy_production(
        &self,
        df: &DataFrame,
        height: u32,
        curve_name: &str,
        model_name: &str,
    ) -> EngineResult<Vec<MonthlyProduction>> {
        let (prod, schema) = self.compute(df, &[height], curve_name, model_name, true)?;
        let encoding = match schema.kind {
            SchemaKind::Timeseries { encoding } => encoding,
            SchemaKind::Quantile { .. } => {
                return Err(EngineError::UnsupportedOperation(
                    "monthly averages are only supported for timeseries schemas".to_string(),
                ))
            }
        };

        let ws_col = format!("windspeed_{height}m");
        let kw_col = format!("{ws_col}_kw");

        let years = prod.column("year")?.cast(&DataType::Int32)?;
        let n_years = years
            .i32()?
            .into_iter()
            .flatten()
            .collect::<BTreeSet<i32>>()
            .len();
        if n_years == 0 {
            return Err(EngineError::NoData);
        }

        let mut result = Vec::new();
        for (month, group) in group_by_int_column(&prod, "month")? {
            let abbr = usize::try_from(month - 1)
                .ok()
                .and_then(|i| MONTH_ABBR.get(i))
                .ok_or_else(|| {
                    EngineError::Configuration(format!("month index {month} out of range"))
                })?;

            let mut kwh = column_sum(&group, &kw_col)?;
            match encoding {
                TemporalEncoding::MohrEncoded => {
                    kwh *= DAYS_PER_REPRESENTATIVE_MONTH / n_years as f64;
                }
                TemporalEncoding::DatetimeFull => {
                    kwh /= n_years as f64;
                }
            }

            let row = YearlyRow {
                year: None,
                avg_windspeed: column_mean(&group, &ws_col)?,
                kwh,
            };
            result.push(MonthlyProduction {
                month: abbr.to_string(),
                production: ProductionEntry::from(&row),
            });
        }
        Ok(result)
    }
}

fn column_mean(df: &DataFrame, column: &str) -> EngineResult<f64> {
    let values = column_as_f64(df, column)?;
    let finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return Ok(f64::NAN);
    }
    Ok(finite.iter().sum::<f64>() / finite.len() as f64)
}

fn column_sum(df: &DataFrame, column: &str) -> EngineResult<f64> {
    let values = column_as_f64(df, column)?;
    Ok(values.into_iter().filter(|v| v.is_finite()).sum())
}
