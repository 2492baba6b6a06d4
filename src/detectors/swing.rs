//! Swing point detection
//!
//! A swing High is a candle whose high is strictly above every high within
//! `lookback` candles on both sides; a swing Low is the mirror on lows. The
//! symmetric window keeps single-candle spikes from registering as structure.
//!
//! Significance is the excursion from the extremum to the opposite extreme of
//! its window, normalized by the range of the whole series.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
  params::{get_count, get_percent, get_period, ParamMeta, ParameterizedDetector},
  Candle, ChartPoint, GradeError, Period, Ratio, Result, SwingKind,
};

use super::helpers::{
  self, is_strict_high, is_strict_low, price_range, window_max_high, window_min_low,
};

// ============================================================
// TYPES
// ============================================================

/// A confirmed local extremum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
  pub time: i64,
  pub price: f64,
  /// Excursion / series range
  pub significance: Ratio,
  #[serde(rename = "type")]
  pub kind: SwingKind,
  /// Position in the normalized series
  #[serde(default)]
  pub index: usize,
}

impl SwingPoint {
  #[inline]
  pub fn point(&self) -> ChartPoint {
    ChartPoint::new(self.time, self.price)
  }
}

/// Detected swing points, each list sorted by time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwingPoints {
  pub highs: Vec<SwingPoint>,
  pub lows: Vec<SwingPoint>,
}

impl SwingPoints {
  pub fn is_empty(&self) -> bool {
    self.highs.is_empty() && self.lows.is_empty()
  }

  pub fn len(&self) -> usize {
    self.highs.len() + self.lows.len()
  }

  pub fn of_kind(&self, kind: SwingKind) -> &[SwingPoint] {
    match kind {
      SwingKind::High => &self.highs,
      SwingKind::Low => &self.lows,
    }
  }

  /// Highs and lows merged in time order (highs first on equal time).
  pub fn by_time(&self) -> Vec<SwingPoint> {
    let mut all: Vec<SwingPoint> = self.highs.iter().chain(&self.lows).copied().collect();
    all.sort_by_key(|p| p.time);
    all
  }
}

// ============================================================
// CONFIG
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwingConfig {
  /// Candles required on each side of a swing
  pub lookback: Period,
  /// Candidates below this share of the series range (in percent) are dropped
  pub min_significance_percent: f64,
  /// Most significant swings always kept, per kind
  pub min_count: usize,
  /// Hard cap per kind
  pub max_count: usize,
}

impl Default for SwingConfig {
  fn default() -> Self {
    Self {
      lookback: Period::new_const(helpers::DEFAULT_LOOKBACK),
      min_significance_percent: helpers::DEFAULT_MIN_SIGNIFICANCE_PERCENT,
      min_count: helpers::DEFAULT_MIN_SWINGS,
      max_count: helpers::DEFAULT_MAX_SWINGS,
    }
  }
}

impl SwingConfig {
  pub fn validate(&self) -> Result<()> {
    if self.lookback.get() == 0 {
      return Err(GradeError::InvalidValue("lookback must be > 0"));
    }
    let pct = self.min_significance_percent;
    if pct.is_nan() || !(0.0..=100.0).contains(&pct) {
      return Err(GradeError::OutOfRange {
        field: "min_significance_percent",
        value: pct,
        min:   0.0,
        max:   100.0,
      });
    }
    if self.min_count > self.max_count {
      return Err(GradeError::InvalidConfig(format!(
        "min_count ({}) exceeds max_count ({})",
        self.min_count, self.max_count
      )));
    }
    Ok(())
  }
}

// ============================================================
// DETECTOR
// ============================================================

/// Swing point detector with a validated configuration
#[derive(Debug, Clone, Default)]
pub struct SwingDetector {
  config: SwingConfig,
}

impl SwingDetector {
  pub fn new(config: SwingConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &SwingConfig {
    &self.config
  }

  pub fn detect(&self, candles: &[Candle]) -> SwingPoints {
    detect_with(candles, &self.config)
  }
}

static SWING_PARAMS: [ParamMeta; 4] = [
  ParamMeta::period("lookback", 5.0, (2.0, 20.0, 1.0), "Candles required on each side of a swing"),
  ParamMeta::percent(
    "min_significance_percent",
    1.0,
    (0.0, 100.0, 0.5),
    "Minimum excursion as a percentage of the series range",
  ),
  ParamMeta::count("min_count", 3.0, (0.0, 50.0, 1.0), "Most significant swings always kept"),
  ParamMeta::count("max_count", 10.0, (0.0, 50.0, 1.0), "Maximum swings per kind"),
];

impl ParameterizedDetector for SwingDetector {
  fn param_meta() -> &'static [ParamMeta] {
    &SWING_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Self::new(SwingConfig {
      lookback: get_period(params, "lookback", helpers::DEFAULT_LOOKBACK)?,
      min_significance_percent: get_percent(
        params,
        "min_significance_percent",
        helpers::DEFAULT_MIN_SIGNIFICANCE_PERCENT,
      )?,
      min_count: get_count(params, "min_count", helpers::DEFAULT_MIN_SWINGS)?,
      max_count: get_count(params, "max_count", helpers::DEFAULT_MAX_SWINGS)?,
    })
  }

  fn detector_name() -> &'static str {
    "swing_points"
  }
}

/// Detect swing highs and lows. Errors only on an invalid `config`.
pub fn detect_swing_points(candles: &[Candle], config: &SwingConfig) -> Result<SwingPoints> {
  config.validate()?;
  Ok(detect_with(candles, config))
}

/// Every strict local extremum over `lookback`, with no significance filter
/// and no selection. Used to judge whether an arbitrary point is a plausible swing.
pub fn swing_candidates(candles: &[Candle], lookback: Period) -> SwingPoints {
  let (highs, lows) = candidates(candles, lookback.get());
  SwingPoints { highs, lows }
}

pub(crate) fn detect_with(candles: &[Candle], config: &SwingConfig) -> SwingPoints {
  let (highs, lows) = candidates(candles, config.lookback.get());
  let threshold = config.min_significance_percent / 100.0;
  let keep = |points: Vec<SwingPoint>| -> Vec<SwingPoint> {
    let significant = points
      .into_iter()
      .filter(|p| p.significance.get() >= threshold)
      .collect();
    select(significant, config.min_count, config.max_count)
  };
  let swings = SwingPoints { highs: keep(highs), lows: keep(lows) };
  tracing::debug!(
    candles = candles.len(),
    highs = swings.highs.len(),
    lows = swings.lows.len(),
    "detected swing points"
  );
  swings
}

fn candidates(candles: &[Candle], lookback: usize) -> (Vec<SwingPoint>, Vec<SwingPoint>) {
  let mut highs = Vec::new();
  let mut lows = Vec::new();
  if lookback == 0 || candles.len() < 2 * lookback + 1 {
    return (highs, lows);
  }
  let range = price_range(candles);
  if range <= 0.0 {
    return (highs, lows);
  }

  for i in lookback..candles.len() - lookback {
    let window = &candles[i - lookback..=i + lookback];
    let candle = &candles[i];

    if is_strict_high(candles, i, lookback) {
      let excursion = candle.high - window_min_low(window);
      highs.push(SwingPoint {
        time:         candle.time,
        price:        candle.high,
        significance: Ratio::saturating(excursion / range),
        kind:         SwingKind::High,
        index:        i,
      });
    }
    if is_strict_low(candles, i, lookback) {
      let excursion = window_max_high(window) - candle.low;
      lows.push(SwingPoint {
        time:         candle.time,
        price:        candle.low,
        significance: Ratio::saturating(excursion / range),
        kind:         SwingKind::Low,
        index:        i,
      });
    }
  }

  (highs, lows)
}

/// Keep the `min_count` most significant points, then fill up to `max_count`
/// by repeatedly placing a candidate into the widest time gap between selected
/// points (falling back to the next most significant candidate). Result is
/// sorted by time.
fn select(mut points: Vec<SwingPoint>, min_count: usize, max_count: usize) -> Vec<SwingPoint> {
  if points.len() <= max_count {
    points.sort_by_key(|p| p.time);
    return points;
  }

  points.sort_by(|a, b| {
    b.significance
      .get()
      .total_cmp(&a.significance.get())
      .then(a.time.cmp(&b.time))
  });
  let mut remaining = points.split_off(min_count.min(max_count));
  let mut selected = points;
  selected.sort_by_key(|p| p.time);

  while selected.len() < max_count && !remaining.is_empty() {
    let pick = widest_gap(&selected)
      .and_then(|(lo, hi)| remaining.iter().position(|p| p.time > lo && p.time < hi))
      .unwrap_or(0);
    let point = remaining.remove(pick);
    let at = selected.partition_point(|p| p.time < point.time);
    selected.insert(at, point);
  }

  selected
}

/// Widest gap between consecutive points; the earliest wins ties.
fn widest_gap(selected: &[SwingPoint]) -> Option<(i64, i64)> {
  selected
    .windows(2)
    .map(|w| (w[0].time, w[1].time))
    .fold(None, |best, gap| match best {
      Some((lo, hi)) if hi - lo >= gap.1 - gap.0 => best,
      _ => Some(gap),
    })
}
