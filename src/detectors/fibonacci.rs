//! Fibonacci retracement selection and level ladder
//!
//! The anchor pair is the most recent qualifying swing: for an uptrend, the
//! latest swing Low that has at least one swing High after it, paired with the
//! highest of those Highs. Downtrend mirrors it. Fresh structure wins over
//! older, larger moves.

use serde::{Deserialize, Serialize};

use crate::{Candle, ChartPoint, FibDirection, Result, SwingKind};

use super::swing::{detect_swing_points, SwingConfig, SwingPoint, SwingPoints};

/// Retracement ratios drawn between the two anchors
pub const FIB_RATIOS: [f64; 9] = [0.0, 0.236, 0.382, 0.5, 0.618, 0.786, 1.0, 1.272, 1.618];

/// Swing pair anchoring a retracement. `start.time < end.time`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FibonacciRetracement {
  pub start:     SwingPoint,
  pub end:       SwingPoint,
  pub direction: FibDirection,
}

impl FibonacciRetracement {
  pub fn levels(&self) -> FibonacciLevels {
    calculate_fibonacci_levels(self.start.point(), self.end.point())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FibonacciLevel {
  pub ratio: f64,
  pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibonacciLevels {
  pub direction: FibDirection,
  pub levels:    Vec<FibonacciLevel>,
}

impl FibonacciLevels {
  /// Price at an exact ratio of the ladder.
  pub fn price_at(&self, ratio: f64) -> Option<f64> {
    self.levels.iter().find(|l| l.ratio == ratio).map(|l| l.price)
  }
}

/// Linear ladder `start + ratio * (end - start)` over [`FIB_RATIOS`].
/// Direction is Uptrend when `end.price >= start.price`.
pub fn calculate_fibonacci_levels(start: ChartPoint, end: ChartPoint) -> FibonacciLevels {
  let delta = end.price - start.price;
  let direction = if delta >= 0.0 { FibDirection::Uptrend } else { FibDirection::Downtrend };
  let levels = FIB_RATIOS
    .iter()
    .map(|&ratio| FibonacciLevel {
      ratio,
      price: if ratio == 1.0 { end.price } else { start.price + ratio * delta },
    })
    .collect();
  FibonacciLevels { direction, levels }
}

/// Detect swings and pick the retracement for `direction`.
///
/// `Ok(None)` means no qualifying pair exists. Errors only on an invalid `config`.
pub fn select_retracement(
  candles: &[Candle],
  direction: FibDirection,
  config: &SwingConfig,
) -> Result<Option<FibonacciRetracement>> {
  let swings = detect_swing_points(candles, config)?;
  Ok(retracement_from_swings(&swings, direction))
}

/// Pick the retracement for `direction` from already-detected swings.
pub fn retracement_from_swings(
  swings: &SwingPoints,
  direction: FibDirection,
) -> Option<FibonacciRetracement> {
  let (anchor_kind, target_kind) = direction.anchor_kinds();

  let mut anchors = swings.of_kind(anchor_kind).to_vec();
  anchors.sort_by_key(|p| std::cmp::Reverse(p.time));
  let mut targets = swings.of_kind(target_kind).to_vec();
  targets.sort_by_key(|p| p.time);

  anchors.into_iter().find_map(|start| {
    let end = targets
      .iter()
      .filter(|t| t.time > start.time)
      .fold(None::<&SwingPoint>, |best, t| match best {
        Some(b) if !more_extreme(t, b, target_kind) => Some(b),
        _ => Some(t),
      })?;
    Some(FibonacciRetracement { start, end: *end, direction })
  })
}

/// Strictly higher for highs, strictly lower for lows; ties keep the earlier point.
#[inline]
fn more_extreme(candidate: &SwingPoint, current: &SwingPoint, kind: SwingKind) -> bool {
  match kind {
    SwingKind::High => candidate.price > current.price,
    SwingKind::Low => candidate.price < current.price,
  }
}
