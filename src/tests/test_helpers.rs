use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::config::EngineConfig;
use crate::power_curve::{PowerCurve, PowerCurveManager};
use crate::schema::SchemaRegistry;

/// A curve that produces the same power at every wind speed.
pub fn constant_curve(kw: f64) -> PowerCurve {
    PowerCurve::new(vec![(0.0, kw), (100.0, kw)]).unwrap()
}

/// kw = 10 * windspeed over the tabulated range.
pub fn linear_curve() -> PowerCurve {
    PowerCurve::new(vec![(0.0, 0.0), (100.0, 1000.0)]).unwrap()
}

/// Builtin config/registry plus the given named curves.
pub fn builtin_engine(
    curves: Vec<(&str, PowerCurve)>,
) -> (EngineConfig, SchemaRegistry, PowerCurveManager) {
    let mut manager = PowerCurveManager::default();
    for (name, curve) in curves {
        manager.insert(name, curve);
    }
    (
        EngineConfig::default(),
        SchemaRegistry::builtin().unwrap(),
        manager,
    )
}

fn midnight(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Every hour of a calendar year, formatted the way the source tables carry
/// timestamps. 8760 entries for a non-leap year.
pub fn hourly_times(year: i32) -> Vec<String> {
    hourly_times_between(midnight(year, 1, 1), midnight(year + 1, 1, 1))
}

/// Every hour of one month of a year.
pub fn hourly_times_for_month(year: i32, month: u32, hours: usize) -> Vec<String> {
    let start = midnight(year, month, 1);
    let mut times = hourly_times_between(start, start + Duration::hours(hours as i64));
    times.truncate(hours);
    times
}

fn hourly_times_between(start: NaiveDateTime, end: NaiveDateTime) -> Vec<String> {
    let mut times = Vec::new();
    let mut t = start;
    while t < end {
        times.push(t.format("%Y-%m-%d %H:%M:%S").to_string());
        t += Duration::hours(1);
    }
    times
}
