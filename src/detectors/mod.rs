//! Ground-truth detectors
//!
//! Each detector is a pure function of a normalized candle series. Too little
//! data never raises: the detectors return empty results and the scorer treats
//! "nothing to find" as a valid answer.
//!
//! # Detectors
//!
//! - **Swing points**: strict local extrema over a symmetric window, filtered by
//!   significance and spread out in time.
//! - **Fibonacci**: the most recent qualifying swing pair in a direction, plus
//!   the retracement ladder between two points.
//! - **Fair Value Gaps**: three-candle gaps where the outer candles do not overlap.

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod fibonacci;
pub mod fvg;
pub mod swing;

impl_with_defaults!(swing::SwingDetector, fvg::FvgDetector);

// Re-export all detectors for convenience
pub use fibonacci::*;
pub use fvg::*;
pub use helpers::*;
pub use swing::*;
