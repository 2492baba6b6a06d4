//! Parameter metadata for detectors
//!
//! The detection heuristics (lookback, significance floor, gap threshold, ...)
//! are empirically chosen. This module exposes them as named parameters so a
//! caller can discover, document and override them.
//!
//! # Example
//!
//! ```rust
//! use chartgrade::params::{ParamMeta, ParameterizedDetector};
//! use chartgrade::prelude::*;
//!
//! for param in SwingDetector::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::{GradeError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value (0.0..=1.0)
  Ratio,
  /// Period value (positive integer)
  Period,
  /// Percentage (0.0..=100.0)
  Percent,
  /// Non-negative integer count
  Count,
}

/// Metadata for a single detector parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "lookback")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Accepted range: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  pub const fn percent(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Percent, default, range, description }
  }

  pub const fn count(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Count, default, range, description }
  }

  /// Generate all values for a calibration sweep
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value.is_nan() || value < min || value > max {
      return Err(GradeError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio | ParamType::Percent => Ok(()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(GradeError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
      ParamType::Count => {
        if value.fract() != 0.0 {
          return Err(GradeError::InvalidValue("Count must be an integer"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED DETECTOR TRAIT
// ============================================================

/// Trait for detectors that support parameterization
pub trait ParameterizedDetector: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a detector with parameters from a HashMap
  ///
  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  /// Short name of the detector
  fn detector_name() -> &'static str;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value.fract() != 0.0 || value < 0.0 {
    return Err(GradeError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

/// Helper to get a percentage (0..=100) from params with default fallback
pub fn get_percent(params: &HashMap<&str, f64>, key: &'static str, default: f64) -> Result<f64> {
  let value = params.get(key).copied().unwrap_or(default);
  if value.is_nan() || !(0.0..=100.0).contains(&value) {
    return Err(GradeError::OutOfRange { field: key, value, min: 0.0, max: 100.0 });
  }
  Ok(value)
}

/// Helper to get a non-negative integer count from params with default fallback
pub fn get_count(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<usize> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value < 0.0 || value.fract() != 0.0 {
    return Err(GradeError::InvalidValue("Count must be a non-negative integer"));
  }
  Ok(value as usize)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_param_meta_period() {
    let meta = ParamMeta::period("lookback", 5.0, (2.0, 10.0, 1.0), "Window half-width");

    assert_eq!(meta.name, "lookback");
    assert_eq!(meta.param_type, ParamType::Period);
    assert_eq!(meta.default, 5.0);
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::percent("min_gap_percent", 0.5, (0.25, 0.75, 0.25), "Test");

    let grid = meta.generate_grid();
    assert_eq!(grid.len(), 3);
    assert!((grid[0] - 0.25).abs() < f64::EPSILON);
    assert!((grid[2] - 0.75).abs() < f64::EPSILON);
  }

  #[test]
  fn test_validate_period() {
    let meta = ParamMeta::period("lookback", 5.0, (2.0, 10.0, 1.0), "Test");

    assert!(meta.validate(5.0).is_ok());
    assert!(meta.validate(1.0).is_err());
    assert!(meta.validate(5.5).is_err());
    assert!(meta.validate(11.0).is_err());
  }

  #[test]
  fn test_validate_count() {
    let meta = ParamMeta::count("max_count", 10.0, (0.0, 50.0, 1.0), "Test");

    assert!(meta.validate(0.0).is_ok());
    assert!(meta.validate(2.5).is_err());
    assert!(meta.validate(f64::NAN).is_err());
  }

  #[test]
  fn test_get_helpers() {
    let mut params = HashMap::new();
    params.insert("lookback", 3.0);
    params.insert("min_significance_percent", 150.0);

    assert_eq!(get_period(&params, "lookback", 5).unwrap().get(), 3);
    assert_eq!(get_period(&params, "other", 5).unwrap().get(), 5);
    assert!(get_percent(&params, "min_significance_percent", 1.0).is_err());
    assert_eq!(get_count(&params, "max_count", 10).unwrap(), 10);
    assert!((get_ratio(&params, "ratio", 0.7).unwrap().get() - 0.7).abs() < f64::EPSILON);
  }
}
