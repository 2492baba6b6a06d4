//! Fair Value Gap detection
//!
//! Slides a three-candle window `[i, i+1, i+2]`. A Bullish gap exists when the
//! third candle's low is above the first candle's high; Bearish when the third
//! candle's high is below the first candle's low. The middle candle only has to
//! exist. Gaps below a range-relative minimum (scaled up on coarser
//! timeframes) are ignored, and only the largest few are reported.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
  params::{get_count, get_percent, get_ratio, ParamMeta, ParameterizedDetector},
  tolerance::TimeframeSettings,
  Candle, FvgKind, GradeError, Ratio, Result,
};

use super::helpers::{self, price_range};

// ============================================================
// TYPES
// ============================================================

/// An imbalance between the first and third candle of a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FairValueGap {
  pub start_time:   i64,
  pub end_time:     i64,
  pub top_price:    f64,
  pub bottom_price: f64,
  #[serde(rename = "type")]
  pub kind:         FvgKind,
  /// `top_price - bottom_price`
  pub size:         f64,
  /// Index of the first candle in the normalized series
  #[serde(default)]
  pub start_index:  usize,
}

/// Fill status of a gap. `Open -> Filled` is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum GapState {
  Open,
  Filled { time: i64 },
}

impl FairValueGap {
  #[inline]
  pub fn midpoint(&self) -> f64 {
    (self.top_price + self.bottom_price) / 2.0
  }

  #[inline]
  pub fn contains_time(&self, time: i64) -> bool {
    (self.start_time..=self.end_time).contains(&time)
  }

  /// First candle after the gap that trades back into it.
  ///
  /// Bullish gaps fill when a later low reaches the top of the gap; bearish
  /// gaps when a later high reaches the bottom. Candles at or before
  /// `end_time` are ignored.
  pub fn fill_state(&self, subsequent: &[Candle]) -> GapState {
    subsequent
      .iter()
      .filter(|c| c.time > self.end_time)
      .find(|c| match self.kind {
        FvgKind::Bullish => c.low <= self.top_price,
        FvgKind::Bearish => c.high >= self.bottom_price,
      })
      .map_or(GapState::Open, |c| GapState::Filled { time: c.time })
  }

  pub fn is_filled(&self, subsequent: &[Candle]) -> bool {
    matches!(self.fill_state(subsequent), GapState::Filled { .. })
  }
}

// ============================================================
// CONFIG
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FvgConfig {
  /// Minimum gap as a percentage of the series range, before timeframe scaling
  pub min_gap_percent: f64,
  /// Largest gaps kept
  pub max_gaps: usize,
  /// Overlap share of the smaller range for a drawing to match by area
  pub overlap_threshold: Ratio,
}

impl Default for FvgConfig {
  fn default() -> Self {
    Self {
      min_gap_percent: helpers::DEFAULT_MIN_GAP_PERCENT,
      max_gaps: helpers::DEFAULT_MAX_GAPS,
      overlap_threshold: Ratio::new_const(helpers::DEFAULT_OVERLAP_THRESHOLD),
    }
  }
}

impl FvgConfig {
  pub fn validate(&self) -> Result<()> {
    let pct = self.min_gap_percent;
    if pct.is_nan() || !(0.0..=100.0).contains(&pct) {
      return Err(GradeError::OutOfRange {
        field: "min_gap_percent",
        value: pct,
        min:   0.0,
        max:   100.0,
      });
    }
    if self.max_gaps == 0 {
      return Err(GradeError::InvalidConfig("max_gaps must be > 0".to_string()));
    }
    Ok(())
  }

  /// Absolute minimum gap size for a series with `range` on a timeframe.
  #[inline]
  pub fn min_gap_size(&self, range: f64, settings: &TimeframeSettings) -> f64 {
    range * self.min_gap_percent / 100.0 * settings.fvg_size_multiplier
  }
}

// ============================================================
// DETECTOR
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct FvgDetector {
  config: FvgConfig,
}

impl FvgDetector {
  pub fn new(config: FvgConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &FvgConfig {
    &self.config
  }

  pub fn detect(
    &self,
    candles: &[Candle],
    kind: Option<FvgKind>,
    settings: &TimeframeSettings,
  ) -> Vec<FairValueGap> {
    detect_with(candles, kind, &self.config, settings)
  }
}

static FVG_PARAMS: [ParamMeta; 3] = [
  ParamMeta::percent(
    "min_gap_percent",
    0.5,
    (0.0, 10.0, 0.25),
    "Minimum gap as a percentage of the series range",
  ),
  ParamMeta::count("max_gaps", 5.0, (1.0, 20.0, 1.0), "Largest gaps kept"),
  ParamMeta::ratio(
    "overlap_threshold",
    0.7,
    (0.5, 0.95, 0.05),
    "Overlap share of the smaller range for an area match",
  ),
];

impl ParameterizedDetector for FvgDetector {
  fn param_meta() -> &'static [ParamMeta] {
    &FVG_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Self::new(FvgConfig {
      min_gap_percent: get_percent(params, "min_gap_percent", helpers::DEFAULT_MIN_GAP_PERCENT)?,
      max_gaps: get_count(params, "max_gaps", helpers::DEFAULT_MAX_GAPS)?,
      overlap_threshold: get_ratio(
        params,
        "overlap_threshold",
        helpers::DEFAULT_OVERLAP_THRESHOLD,
      )?,
    })
  }

  fn detector_name() -> &'static str {
    "fair_value_gaps"
  }
}

/// Detect gaps of `kind` (both kinds when None), largest first, capped at
/// `config.max_gaps`. Errors only on an invalid `config`.
pub fn detect_fair_value_gaps(
  candles: &[Candle],
  kind: Option<FvgKind>,
  config: &FvgConfig,
  settings: &TimeframeSettings,
) -> Result<Vec<FairValueGap>> {
  config.validate()?;
  Ok(detect_with(candles, kind, config, settings))
}

pub(crate) fn detect_with(
  candles: &[Candle],
  kind: Option<FvgKind>,
  config: &FvgConfig,
  settings: &TimeframeSettings,
) -> Vec<FairValueGap> {
  if candles.len() < 3 {
    return Vec::new();
  }
  let min_size = config.min_gap_size(price_range(candles), settings);
  let wants = |k: FvgKind| kind.map_or(true, |want| want == k);

  let mut gaps: Vec<FairValueGap> = candles
    .windows(3)
    .enumerate()
    .filter_map(|(i, w)| {
      let (first, third) = (&w[0], &w[2]);
      let (kind, bottom, top) = if wants(FvgKind::Bullish) && third.low > first.high {
        (FvgKind::Bullish, first.high, third.low)
      } else if wants(FvgKind::Bearish) && first.low > third.high {
        (FvgKind::Bearish, third.high, first.low)
      } else {
        return None;
      };
      let size = top - bottom;
      (size >= min_size).then_some(FairValueGap {
        start_time: first.time,
        end_time: third.time,
        top_price: top,
        bottom_price: bottom,
        kind,
        size,
        start_index: i,
      })
    })
    .collect();

  // stable: earlier gaps win ties
  gaps.sort_by(|a, b| b.size.total_cmp(&a.size));
  gaps.truncate(config.max_gaps);

  tracing::debug!(candles = candles.len(), gaps = gaps.len(), min_size, "detected fair value gaps");
  gaps
}

#[cfg(test)]
mod tests {
  use super::*;

  fn daily() -> TimeframeSettings {
    TimeframeSettings::new(0.06, 172_800, 2.0)
  }

  fn candle(day: i64, high: f64, low: f64) -> Candle {
    Candle::new(day * 86_400, low, high, low, high)
  }

  #[test]
  fn test_single_bullish_gap() {
    let candles = vec![candle(0, 10.0, 8.0), candle(1, 14.0, 9.0), candle(2, 17.0, 15.0)];
    let gaps = detect_fair_value_gaps(&candles, None, &FvgConfig::default(), &daily()).unwrap();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].kind, FvgKind::Bullish);
    assert_eq!(gaps[0].bottom_price, 10.0);
    assert_eq!(gaps[0].top_price, 15.0);
    assert_eq!(gaps[0].size, 5.0);
    assert_eq!(gaps[0].start_time, 0);
    assert_eq!(gaps[0].end_time, 2 * 86_400);
  }

  #[test]
  fn test_bearish_gap_and_kind_filter() {
    let candles = vec![candle(0, 20.0, 18.0), candle(1, 19.0, 12.0), candle(2, 14.0, 11.0)];
    let config = FvgConfig::default();
    let gaps = detect_fair_value_gaps(&candles, Some(FvgKind::Bearish), &config, &daily()).unwrap();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].top_price, 18.0);
    assert_eq!(gaps[0].bottom_price, 14.0);
    assert!(detect_fair_value_gaps(&candles, Some(FvgKind::Bullish), &config, &daily())
      .unwrap()
      .is_empty());
  }

  #[test]
  fn test_touching_candles_are_not_a_gap() {
    let candles = vec![candle(0, 10.0, 8.0), candle(1, 12.0, 9.0), candle(2, 13.0, 10.0)];
    assert!(detect_fair_value_gaps(&candles, None, &FvgConfig::default(), &daily())
      .unwrap()
      .is_empty());
  }

  #[test]
  fn test_coarser_timeframe_needs_larger_gap() {
    // range = 100 - 0 = 100; gap of 1.2
    let candles = vec![
      candle(0, 10.0, 0.0),
      candle(1, 12.0, 9.0),
      candle(2, 100.0, 11.2),
    ];
    let config = FvgConfig { min_gap_percent: 1.0, ..FvgConfig::default() };
    let hourly = TimeframeSettings::new(0.04, 7_200, 1.0);
    let weekly = TimeframeSettings::new(0.08, 604_800, 3.0);
    assert_eq!(detect_fair_value_gaps(&candles, None, &config, &hourly).unwrap().len(), 1);
    assert!(detect_fair_value_gaps(&candles, None, &config, &weekly).unwrap().is_empty());
  }

  #[test]
  fn test_sorted_by_size_and_capped() {
    // staircase of bullish gaps with growing sizes
    let mut candles = Vec::new();
    let mut base = 100.0;
    for step in 0..8 {
      let gap = 1.0 + step as f64;
      candles.push(candle(candles.len() as i64, base + 1.0, base));
      candles.push(candle(candles.len() as i64, base + gap + 2.0, base + 0.5));
      base += gap + 1.0;
    }
    let config = FvgConfig { min_gap_percent: 0.0, ..FvgConfig::default() };
    let gaps = detect_fair_value_gaps(&candles, Some(FvgKind::Bullish), &config, &daily()).unwrap();
    assert_eq!(gaps.len(), 5);
    assert!(gaps.windows(2).all(|w| w[0].size >= w[1].size));
  }

  #[test]
  fn test_fill_state() {
    let gap = FairValueGap {
      start_time:   0,
      end_time:     200,
      top_price:    15.0,
      bottom_price: 10.0,
      kind:         FvgKind::Bullish,
      size:         5.0,
      start_index:  0,
    };
    let later = vec![
      Candle::new(100, 12.0, 13.0, 11.0, 12.0),
      Candle::new(300, 18.0, 19.0, 16.0, 17.0),
      Candle::new(400, 16.0, 17.0, 14.5, 15.0),
      Candle::new(500, 12.0, 13.0, 11.0, 12.0),
    ];
    assert_eq!(gap.fill_state(&later), GapState::Filled { time: 400 });
    assert!(gap.is_filled(&later));
    assert_eq!(gap.fill_state(&later[..2]), GapState::Open);
  }

  #[test]
  fn test_bearish_fill() {
    let gap = FairValueGap {
      start_time:   0,
      end_time:     200,
      top_price:    18.0,
      bottom_price: 14.0,
      kind:         FvgKind::Bearish,
      size:         4.0,
      start_index:  0,
    };
    let later = vec![Candle::new(300, 12.0, 13.5, 11.0, 12.0), Candle::new(400, 13.0, 14.0, 12.0, 13.5)];
    assert_eq!(gap.fill_state(&later), GapState::Filled { time: 400 });
  }

  #[test]
  fn test_invalid_config() {
    let config = FvgConfig { max_gaps: 0, ..FvgConfig::default() };
    assert!(FvgDetector::new(config).is_err());
    let mut params = HashMap::new();
    params.insert("overlap_threshold", 1.5);
    assert!(FvgDetector::with_params(&params).is_err());
  }
}
