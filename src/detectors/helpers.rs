//! Shared constants and window helpers for the detectors
//!
//! The defaults below are empirically chosen heuristics, not derived values.
//! Each one is overridable through the corresponding config struct.

use crate::OHLCV;

// ============================================================
// DEFAULT HEURISTICS
// ============================================================

/// Candles on each side of a swing candidate
pub const DEFAULT_LOOKBACK: usize = 5;
/// Minimum swing excursion as a percentage of the series range
pub const DEFAULT_MIN_SIGNIFICANCE_PERCENT: f64 = 1.0;
/// Swing points always kept per kind (most significant first)
pub const DEFAULT_MIN_SWINGS: usize = 3;
/// Upper bound on swing points per kind
pub const DEFAULT_MAX_SWINGS: usize = 10;
/// Minimum FVG size as a percentage of the series range, before timeframe scaling
pub const DEFAULT_MIN_GAP_PERCENT: f64 = 0.5;
/// Gaps reported per detection, largest first
pub const DEFAULT_MAX_GAPS: usize = 5;
/// Overlap share of the smaller range that still counts as a matching FVG drawing
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.7;

// ============================================================
// SERIES / WINDOW HELPERS
// ============================================================

/// Lowest low and highest high of a series. None for an empty slice.
#[inline]
pub fn price_bounds<T: OHLCV>(bars: &[T]) -> Option<(f64, f64)> {
    bars.iter().fold(None, |acc, bar| match acc {
        None => Some((bar.low(), bar.high())),
        Some((lo, hi)) => Some((lo.min(bar.low()), hi.max(bar.high()))),
    })
}

/// `max high - min low` over the whole series, 0.0 when empty.
#[inline]
pub fn price_range<T: OHLCV>(bars: &[T]) -> f64 {
    price_bounds(bars).map_or(0.0, |(lo, hi)| hi - lo)
}

#[inline]
pub fn window_min_low<T: OHLCV>(bars: &[T]) -> f64 {
    bars.iter().map(|b| b.low()).fold(f64::INFINITY, f64::min)
}

#[inline]
pub fn window_max_high<T: OHLCV>(bars: &[T]) -> f64 {
    bars.iter().map(|b| b.high()).fold(f64::NEG_INFINITY, f64::max)
}

/// Bars `[index - lookback, index + lookback]`, or None near the edges.
#[inline]
pub fn symmetric_window<T>(bars: &[T], index: usize, lookback: usize) -> Option<&[T]> {
    if index < lookback || index + lookback >= bars.len() {
        return None;
    }
    Some(&bars[index - lookback..=index + lookback])
}

/// Strict local maximum: the high at `index` exceeds every other high in the window.
#[inline]
pub fn is_strict_high<T: OHLCV>(bars: &[T], index: usize, lookback: usize) -> bool {
    let Some(window) = symmetric_window(bars, index, lookback) else {
        return false;
    };
    let pivot = bars[index].high();
    window
        .iter()
        .enumerate()
        .all(|(j, bar)| j == lookback || bar.high() < pivot)
}

/// Strict local minimum: the low at `index` is below every other low in the window.
#[inline]
pub fn is_strict_low<T: OHLCV>(bars: &[T], index: usize, lookback: usize) -> bool {
    let Some(window) = symmetric_window(bars, index, lookback) else {
        return false;
    };
    let pivot = bars[index].low();
    window
        .iter()
        .enumerate()
        .all(|(j, bar)| j == lookback || bar.low() > pivot)
}
