//! Timeframe tolerance table and fuzzy point equality.
//!
//! Coarser timeframes get wider price and time windows, since aggregated
//! candles leave less precision to draw with.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ChartPoint, GradeError, Result};

/// Key used when a timeframe is not present in the table
pub const DEFAULT_TIMEFRAME: &str = "1day";

const HOUR: i64 = 3_600;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;

/// Tolerances and scaling for one timeframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeframeSettings {
    /// Allowed relative price deviation (0.04 = 4%)
    pub price_tolerance: f64,
    /// Allowed time deviation in seconds
    pub time_tolerance: i64,
    /// Scales the minimum FVG size on coarser charts
    #[serde(default = "default_fvg_multiplier")]
    pub fvg_size_multiplier: f64,
}

fn default_fvg_multiplier() -> f64 {
    1.0
}

impl TimeframeSettings {
    pub const fn new(price_tolerance: f64, time_tolerance: i64, fvg_size_multiplier: f64) -> Self {
        Self {
            price_tolerance,
            time_tolerance,
            fvg_size_multiplier,
        }
    }

    /// True when `actual` is within the price and time window of `expected`.
    #[inline]
    pub fn points_match(&self, actual: ChartPoint, expected: ChartPoint) -> bool {
        self.price_matches(actual.price, expected.price)
            && time_deviation(actual.time, expected.time) <= self.time_tolerance
    }

    /// Relative price check against `expected`.
    #[inline]
    pub fn price_matches(&self, actual: f64, expected: f64) -> bool {
        price_deviation(actual, expected) <= self.price_tolerance
    }

    fn validate(&self, key: &str) -> Result<()> {
        if !self.price_tolerance.is_finite() || self.price_tolerance < 0.0 {
            return Err(GradeError::InvalidConfig(format!(
                "price tolerance for {key} must be a non-negative number"
            )));
        }
        if self.time_tolerance < 0 {
            return Err(GradeError::InvalidConfig(format!(
                "time tolerance for {key} must be non-negative"
            )));
        }
        if !self.fvg_size_multiplier.is_finite() || self.fvg_size_multiplier < 0.0 {
            return Err(GradeError::InvalidConfig(format!(
                "FVG size multiplier for {key} must be a non-negative number"
            )));
        }
        Ok(())
    }
}

/// `|actual - expected| / |expected|`. A zero `expected` only matches itself.
#[inline]
pub fn price_deviation(actual: f64, expected: f64) -> f64 {
    let diff = (actual - expected).abs();
    if expected == 0.0 {
        if diff == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        diff / expected.abs()
    }
}

#[inline]
pub fn time_deviation(a: i64, b: i64) -> i64 {
    a.abs_diff(b).min(i64::MAX as u64) as i64
}

/// Immutable map from timeframe key to settings, with a required default entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, TimeframeSettings>", into = "BTreeMap<String, TimeframeSettings>")]
pub struct ToleranceTable {
    entries: BTreeMap<String, TimeframeSettings>,
}

impl Default for ToleranceTable {
    fn default() -> Self {
        let entries = [
            ("1h", TimeframeSettings::new(0.04, 2 * HOUR, 1.0)),
            ("4h", TimeframeSettings::new(0.05, 8 * HOUR, 1.5)),
            ("1day", TimeframeSettings::new(0.06, 2 * DAY, 2.0)),
            ("1week", TimeframeSettings::new(0.08, WEEK, 3.0)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self { entries }
    }
}

impl ToleranceTable {
    /// Build a table; it must contain the `"1day"` default entry.
    pub fn new(entries: BTreeMap<String, TimeframeSettings>) -> Result<Self> {
        let table = Self { entries };
        table.validate()?;
        Ok(table)
    }

    /// Settings for `timeframe`, or the `"1day"` entry for unknown keys.
    pub fn resolve(&self, timeframe: &str) -> &TimeframeSettings {
        self.entries
            .get(timeframe.trim())
            .or_else(|| self.entries.get(DEFAULT_TIMEFRAME))
            .unwrap_or(&FALLBACK)
    }

    pub fn contains(&self, timeframe: &str) -> bool {
        self.entries.contains_key(timeframe.trim())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.entries.contains_key(DEFAULT_TIMEFRAME) {
            return Err(GradeError::InvalidConfig(format!(
                "tolerance table needs a \"{DEFAULT_TIMEFRAME}\" entry"
            )));
        }
        for (key, settings) in &self.entries {
            settings.validate(key)?;
        }
        Ok(())
    }
}

// Only reachable when a table was built without `new` and lacks the default key.
const FALLBACK: TimeframeSettings = TimeframeSettings::new(0.06, 2 * DAY, 2.0);

impl TryFrom<BTreeMap<String, TimeframeSettings>> for ToleranceTable {
    type Error = GradeError;

    fn try_from(entries: BTreeMap<String, TimeframeSettings>) -> Result<Self> {
        Self::new(entries)
    }
}

impl From<ToleranceTable> for BTreeMap<String, TimeframeSettings> {
    fn from(table: ToleranceTable) -> Self {
        table.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_widens_with_timeframe() {
        let table = ToleranceTable::default();
        let hour = table.resolve("1h");
        let week = table.resolve("1week");
        assert_eq!(hour.price_tolerance, 0.04);
        assert_eq!(hour.time_tolerance, 7_200);
        assert_eq!(week.price_tolerance, 0.08);
        assert_eq!(week.time_tolerance, 604_800);
        assert!(week.fvg_size_multiplier > hour.fvg_size_multiplier);
    }

    #[test]
    fn test_unknown_timeframe_uses_daily() {
        let table = ToleranceTable::default();
        assert_eq!(table.resolve("3m"), table.resolve("1day"));
        assert!(!table.contains("3m"));
    }

    #[test]
    fn test_table_requires_default_entry() {
        let mut entries = BTreeMap::new();
        entries.insert("1h".to_string(), TimeframeSettings::new(0.04, 7_200, 1.0));
        assert!(ToleranceTable::new(entries).is_err());
    }

    #[test]
    fn test_table_deserializes_from_json() {
        let table: ToleranceTable = serde_json::from_str(
            r#"{"1day": {"priceTolerance": 0.03, "timeTolerance": 86400}}"#,
        )
        .unwrap();
        assert_eq!(table.resolve("4h").price_tolerance, 0.03);
        assert_eq!(table.resolve("4h").fvg_size_multiplier, 1.0);

        let missing: std::result::Result<ToleranceTable, _> =
            serde_json::from_str(r#"{"1h": {"priceTolerance": 0.03, "timeTolerance": 60}}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn test_points_match() {
        let settings = TimeframeSettings::new(0.04, 7_200, 1.0);
        let truth = ChartPoint::new(10_000, 100.0);
        assert!(settings.points_match(ChartPoint::new(13_600, 104.0), truth));
        assert!(!settings.points_match(ChartPoint::new(10_000, 104.5), truth));
        assert!(!settings.points_match(ChartPoint::new(17_201, 100.0), truth));
    }

    #[test]
    fn test_price_deviation_zero_expected() {
        assert_eq!(price_deviation(0.0, 0.0), 0.0);
        assert!(price_deviation(1.0, 0.0).is_infinite());
    }
}
