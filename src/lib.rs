//! # chartgrade - Chart Annotation Grader
//!
//! Detects swing points, Fibonacci retracements and Fair Value Gaps in OHLC
//! candle data and scores a trader's manual drawings against them with
//! tolerance windows and partial credit.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartgrade::prelude::*;
//! use serde_json::json;
//!
//! let grader = GraderBuilder::new().build().unwrap();
//!
//! let request: GradeRequest = serde_json::from_value(json!({
//!     "tool": "swings",
//!     "drawings": [{ "noneFound": true }],
//!     "chartData": [],
//!     "timeframe": "1day"
//! }))
//! .unwrap();
//!
//! let response = grader.grade(&request).unwrap();
//! assert_eq!(response.score, 1.0);
//! ```

pub mod annotation;
pub mod detectors;
pub mod normalize;
pub mod params;
pub mod request;
pub mod scoring;
pub mod tolerance;

pub mod prelude {
    pub use crate::{
        // Annotations
        annotation::{parse_drawings, Annotation},
        // Detectors
        detectors::*,
        // Normalization
        normalize::{normalize_bars, normalize_candles, normalize_for_window},
        // Parameters
        params::{get_count, get_percent, get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
        // Request boundary
        request::{GradeRequest, GradeResponse, ResultRecord, ResultSink, UserId},
        // Scoring
        scoring::{CorrectAnswers, FibAnswer, FibScoring, GroundTruth, ValidationResult},
        // Tolerances
        tolerance::{TimeframeSettings, ToleranceTable},
        // Parallel
        grade_batch,
        // Types
        Candle,
        ChartPoint,
        FibDirection,
        FvgKind,
        // Errors
        GradeError,
        Grader,
        GraderBuilder,
        Part,
        Period,
        Ratio,
        Result,
        SwingKind,
        Tool,
        OHLCV,
        OHLCVExt,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, GradeError>;

/// Errors that can occur while detecting or grading
#[derive(Debug, Clone, thiserror::Error)]
pub enum GradeError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} candles, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid candle at index {index}: {reason}")]
    InvalidCandle { index: usize, reason: &'static str },

    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GradeError {
    /// HTTP-style status for the request boundary.
    pub fn status(&self) -> u16 {
        if self.is_bad_input() {
            400
        } else {
            500
        }
    }

    #[inline]
    pub fn is_bad_input(&self) -> bool {
        matches!(self, GradeError::BadInput(_) | GradeError::UnknownTool(_))
    }
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(GradeError::InvalidValue("Ratio cannot be NaN or infinite"));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(GradeError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Clamp an arbitrary finite value into a Ratio. NaN becomes 0.0.
    pub fn saturating(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(GradeError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }

    /// Number of candles covered by a symmetric window around one candle.
    #[inline]
    pub fn window_len(self) -> usize {
        2 * self.0 + 1
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Extension trait with consistency checks for OHLCV data
pub trait OHLCVExt: OHLCV {
    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let values = [self.open(), self.high(), self.low(), self.close()];
        if values.iter().any(|v| v.is_nan()) {
            return Err(GradeError::InvalidCandle {
                index: 0,
                reason: "NaN in OHLC",
            });
        }
        if values.iter().any(|v| v.is_infinite()) {
            return Err(GradeError::InvalidCandle {
                index: 0,
                reason: "Infinite value in OHLC",
            });
        }
        if self.high() < self.low() {
            return Err(GradeError::InvalidCandle {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// CORE TYPES
// ============================================================

/// Canonical candle produced by the normalizer. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candle {
    /// Epoch seconds
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    /// Position of the record in the caller's original array
    #[serde(default)]
    pub index: usize,
}

impl Candle {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume: None,
            index: 0,
        }
    }
}

impl OHLCV for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume.unwrap_or(0.0)
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.time)
    }
}

/// A point on the chart: epoch seconds and price
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChartPoint {
    pub time: i64,
    pub price: f64,
}

impl ChartPoint {
    pub const fn new(time: i64, price: f64) -> Self {
        Self { time, price }
    }

    /// The `{time: 0, price: 0}` placeholder used on the wire for "no point".
    pub const fn sentinel() -> Self {
        Self {
            time: 0,
            price: 0.0,
        }
    }
}

/// Swing point classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingKind {
    High,
    Low,
}

impl SwingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SwingKind::High => "high",
            SwingKind::Low => "low",
        }
    }
}

/// Direction of a Fibonacci retracement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FibDirection {
    Uptrend,
    Downtrend,
}

impl FibDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            FibDirection::Uptrend => "uptrend",
            FibDirection::Downtrend => "downtrend",
        }
    }

    /// Swing kinds anchoring (start, end) for this direction.
    #[inline]
    pub fn anchor_kinds(self) -> (SwingKind, SwingKind) {
        match self {
            FibDirection::Uptrend => (SwingKind::Low, SwingKind::High),
            FibDirection::Downtrend => (SwingKind::High, SwingKind::Low),
        }
    }
}

/// Fair Value Gap classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FvgKind {
    Bullish,
    Bearish,
}

impl FvgKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FvgKind::Bullish => "bullish",
            FvgKind::Bearish => "bearish",
        }
    }
}

/// Drawing tool being graded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Swings,
    Fibonacci,
    Fvg,
}

impl Tool {
    pub fn as_str(self) -> &'static str {
        match self {
            Tool::Swings => "swings",
            Tool::Fibonacci => "fibonacci",
            Tool::Fvg => "fvg",
        }
    }
}

impl std::str::FromStr for Tool {
    type Err = GradeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "swings" | "swing" | "swing-points" | "swing_points" => Ok(Tool::Swings),
            "fibonacci" | "fib" => Ok(Tool::Fibonacci),
            "fvg" | "fair-value-gaps" | "fair_value_gaps" => Ok(Tool::Fvg),
            other => Err(GradeError::UnknownTool(other.to_string())),
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional test part: narrows Fibonacci to one direction and FVG to one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    First,
    Second,
}

impl Part {
    pub fn from_number(n: u64) -> Result<Self> {
        match n {
            1 => Ok(Part::First),
            2 => Ok(Part::Second),
            _ => Err(GradeError::BadInput(format!("part must be 1 or 2, got {n}"))),
        }
    }

    /// Directions in scope for a Fibonacci test.
    pub fn directions(part: Option<Part>) -> Vec<FibDirection> {
        match part {
            Some(Part::First) => vec![FibDirection::Uptrend],
            Some(Part::Second) => vec![FibDirection::Downtrend],
            None => vec![FibDirection::Uptrend, FibDirection::Downtrend],
        }
    }

    /// Gap kinds in scope for an FVG test.
    pub fn gap_kinds(part: Option<Part>) -> Vec<FvgKind> {
        match part {
            Some(Part::First) => vec![FvgKind::Bullish],
            Some(Part::Second) => vec![FvgKind::Bearish],
            None => vec![FvgKind::Bullish, FvgKind::Bearish],
        }
    }
}

// ============================================================
// GRADER
// ============================================================

use detectors::{FvgConfig, SwingConfig};
use scoring::{FibScoring, GroundTruth, ValidationResult};
use tolerance::ToleranceTable;

/// Detection-and-scoring engine. Immutable; share it freely across threads.
#[derive(Debug, Clone)]
pub struct Grader {
    tolerances: ToleranceTable,
    swing: SwingConfig,
    fvg: FvgConfig,
    fib: FibScoring,
}

impl Grader {
    pub fn tolerances(&self) -> &ToleranceTable {
        &self.tolerances
    }

    pub fn swing_config(&self) -> &SwingConfig {
        &self.swing
    }

    pub fn fvg_config(&self) -> &FvgConfig {
        &self.fvg
    }

    pub fn fib_scoring(&self) -> &FibScoring {
        &self.fib
    }

    /// Compute the ground truth a submission for `tool` is graded against.
    pub fn ground_truth(
        &self,
        tool: Tool,
        candles: &[Candle],
        timeframe: &str,
        part: Option<Part>,
    ) -> GroundTruth {
        let settings = self.tolerances.resolve(timeframe);
        match tool {
            Tool::Swings => GroundTruth::Swings(detectors::swing::detect_with(candles, &self.swing)),
            Tool::Fibonacci => GroundTruth::Fibonacci(scoring::FibonacciTruth::compute(
                candles,
                &self.swing,
                &self.fib,
                Part::directions(part),
            )),
            Tool::Fvg => GroundTruth::Fvg(scoring::FvgTruth::compute(
                candles,
                Part::gap_kinds(part),
                &self.fvg,
                settings,
            )),
        }
    }

    /// Score `annotations` against `truth` using the tolerance window of `timeframe`.
    pub fn validate(
        &self,
        tool: Tool,
        annotations: &[annotation::Annotation],
        truth: &GroundTruth,
        timeframe: &str,
    ) -> Result<ValidationResult> {
        let settings = self.tolerances.resolve(timeframe);
        match (tool, truth) {
            (Tool::Swings, GroundTruth::Swings(points)) => {
                Ok(scoring::swings::score_swings(annotations, points, settings))
            },
            (Tool::Fibonacci, GroundTruth::Fibonacci(fib)) => Ok(
                scoring::fibonacci::score_fibonacci(annotations, fib, settings, &self.fib),
            ),
            (Tool::Fvg, GroundTruth::Fvg(fvg)) => {
                Ok(scoring::fvg::score_fvg(annotations, fvg, settings, &self.fvg))
            },
            (tool, truth) => Err(GradeError::Internal(format!(
                "ground truth for {} cannot grade {tool}",
                truth.tool()
            ))),
        }
    }

    fn validate_config(&self) -> Result<()> {
        self.swing.validate()?;
        self.fvg.validate()?;
        self.fib.validate()?;
        self.tolerances.validate()
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating Grader instances
#[derive(Debug, Clone, Default)]
pub struct GraderBuilder {
    tolerances: ToleranceTable,
    swing: SwingConfig,
    fvg: FvgConfig,
    fib: FibScoring,
}

impl GraderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the timeframe tolerance table
    pub fn tolerances(mut self, table: ToleranceTable) -> Self {
        self.tolerances = table;
        self
    }

    pub fn swing_config(mut self, config: SwingConfig) -> Self {
        self.swing = config;
        self
    }

    pub fn fvg_config(mut self, config: FvgConfig) -> Self {
        self.fvg = config;
        self
    }

    pub fn fib_scoring(mut self, scoring: FibScoring) -> Self {
        self.fib = scoring;
        self
    }

    /// Build the grader
    pub fn build(self) -> Result<Grader> {
        let grader = Grader {
            tolerances: self.tolerances,
            swing: self.swing,
            fvg: self.fvg,
            fib: self.fib,
        };
        grader.validate_config()?;
        Ok(grader)
    }
}

// ============================================================
// PARALLEL GRADING
// ============================================================

use rayon::prelude::*;
use request::{GradeRequest, GradeResponse};

/// Grade independent requests in parallel. Output order matches input order.
pub fn grade_batch<'a, I>(grader: &Grader, requests: I) -> Vec<Result<GradeResponse>>
where
    I: IntoParallelIterator<Item = &'a GradeRequest>,
{
    requests
        .into_par_iter()
        .map(|request| grader.grade(request))
        .collect()
}

// ============================================================
// TESTS
// ============================================================
