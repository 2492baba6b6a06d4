//! Tolerance matching and scoring
//!
//! Every tool follows the same order: a "none found" claim is settled first,
//! then drawings are matched against the ground truth inside the timeframe's
//! tolerance window. Matching is a fold over the user's drawings that threads
//! the set of ground-truth indices already used, so the outcome only depends on
//! the order of the drawings.

pub mod fibonacci;
pub mod fvg;
pub mod swings;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    detectors::{
        fvg::{detect_with as detect_gaps, FairValueGap, FvgConfig, GapState},
        retracement_from_swings,
        swing::{detect_with as detect_swings, swing_candidates, SwingConfig, SwingPoint, SwingPoints},
        FibonacciLevel, FibonacciRetracement,
    },
    tolerance::TimeframeSettings,
    Candle, ChartPoint, FibDirection, FvgKind, GradeError, Period, Result, Tool,
};

// ============================================================
// RESULT TYPES
// ============================================================

/// Outcome of grading one submission
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub score: f64,
    pub total_expected_points: f64,
    pub feedback: Vec<String>,
    pub message: String,
    pub correct_answers: CorrectAnswers,
    /// Ground-truth counts per kind or direction
    pub expected: BTreeMap<&'static str, usize>,
}

impl ValidationResult {
    /// `score / total * 100`, or 0 when nothing was expected.
    pub fn percentage(&self) -> f64 {
        if self.total_expected_points > 0.0 {
            self.score / self.total_expected_points * 100.0
        } else {
            0.0
        }
    }
}

/// Ground truth reported back to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CorrectAnswers {
    Swings(Vec<SwingPoint>),
    Fibonacci(Vec<FibAnswer>),
    Fvg(Vec<GapAnswer>),
}

/// One expected retracement. Missing ones carry `{time: 0, price: 0}` anchors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FibAnswer {
    pub direction: FibDirection,
    pub start: ChartPoint,
    pub end: ChartPoint,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<FibonacciLevel>,
}

impl FibAnswer {
    fn new(direction: FibDirection, retracement: Option<&FibonacciRetracement>) -> Self {
        match retracement {
            Some(r) => Self {
                direction,
                start: r.start.point(),
                end: r.end.point(),
                levels: r.levels().levels,
            },
            None => Self {
                direction,
                start: ChartPoint::sentinel(),
                end: ChartPoint::sentinel(),
                levels: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GapAnswer {
    #[serde(flatten)]
    pub gap: FairValueGap,
    pub filled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filled_at: Option<i64>,
}

// ============================================================
// GROUND TRUTH
// ============================================================

/// Detected ground truth for one tool
#[derive(Debug, Clone, PartialEq)]
pub enum GroundTruth {
    Swings(SwingPoints),
    Fibonacci(FibonacciTruth),
    Fvg(FvgTruth),
}

impl GroundTruth {
    pub fn tool(&self) -> Tool {
        match self {
            GroundTruth::Swings(_) => Tool::Swings,
            GroundTruth::Fibonacci(_) => Tool::Fibonacci,
            GroundTruth::Fvg(_) => Tool::Fvg,
        }
    }

    /// Number of expected entities.
    pub fn count(&self) -> usize {
        match self {
            GroundTruth::Swings(s) => s.len(),
            GroundTruth::Fibonacci(f) => f.count(),
            GroundTruth::Fvg(f) => f.gaps.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FibonacciTruth {
    /// One entry per direction in scope
    pub retracements: Vec<(FibDirection, Option<FibonacciRetracement>)>,
    /// Unfiltered local extrema used to judge off-target endpoints
    pub plausible: SwingPoints,
}

impl FibonacciTruth {
    pub fn compute(
        candles: &[Candle],
        swing: &SwingConfig,
        scoring: &FibScoring,
        directions: Vec<FibDirection>,
    ) -> Self {
        let swings = detect_swings(candles, swing);
        let retracements = directions
            .into_iter()
            .map(|d| (d, retracement_from_swings(&swings, d)))
            .collect();
        Self {
            retracements,
            plausible: swing_candidates(candles, scoring.plausibility_lookback),
        }
    }

    pub fn count(&self) -> usize {
        self.retracements.iter().filter(|(_, r)| r.is_some()).count()
    }

    pub fn answers(&self) -> Vec<FibAnswer> {
        self.retracements
            .iter()
            .map(|(d, r)| FibAnswer::new(*d, r.as_ref()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FvgTruth {
    pub gaps: Vec<FairValueGap>,
    /// Fill state of each gap against the rest of the series
    pub states: Vec<GapState>,
    /// Kinds in scope
    pub kinds: Vec<FvgKind>,
}

impl FvgTruth {
    pub fn compute(
        candles: &[Candle],
        kinds: Vec<FvgKind>,
        config: &FvgConfig,
        settings: &TimeframeSettings,
    ) -> Self {
        let kind = match kinds.as_slice() {
            [single] => Some(*single),
            _ => None,
        };
        let gaps = detect_gaps(candles, kind, config, settings);
        let states = gaps.iter().map(|g| g.fill_state(candles)).collect();
        Self { gaps, states, kinds }
    }

    pub fn answers(&self) -> Vec<GapAnswer> {
        self.gaps
            .iter()
            .zip(&self.states)
            .map(|(gap, state)| {
                let filled_at = match state {
                    GapState::Filled { time } => Some(*time),
                    GapState::Open => None,
                };
                GapAnswer {
                    gap: *gap,
                    filled: filled_at.is_some(),
                    filled_at,
                }
            })
            .collect()
    }
}

// ============================================================
// FIBONACCI SCORING CONFIG
// ============================================================

/// Partial-credit ladder for Fibonacci endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FibScoring {
    /// Points for a perfect endpoint (two endpoints per drawing)
    pub endpoint_points: f64,
    /// Share of the tolerance that still earns full points
    pub tight_factor: f64,
    /// Points at the edge of the tolerance window
    pub near_floor: f64,
    /// Points for an endpoint on some other genuine swing
    pub plausible_points: f64,
    /// Window used to decide whether an endpoint sits on a genuine swing
    pub plausibility_lookback: Period,
}

impl Default for FibScoring {
    fn default() -> Self {
        Self {
            endpoint_points: 50.0,
            tight_factor: 0.1,
            near_floor: 25.0,
            plausible_points: 15.0,
            plausibility_lookback: Period::new_const(2),
        }
    }
}

impl FibScoring {
    /// Points one direction is worth.
    #[inline]
    pub fn drawing_points(&self) -> f64 {
        2.0 * self.endpoint_points
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tight_factor > 0.0 && self.tight_factor < 1.0) {
            return Err(GradeError::OutOfRange {
                field: "tight_factor",
                value: self.tight_factor,
                min: 0.0,
                max: 1.0,
            });
        }
        let ladder = [self.plausible_points, self.near_floor, self.endpoint_points];
        if ladder.iter().any(|p| !p.is_finite() || *p < 0.0) || !ladder.windows(2).all(|w| w[0] <= w[1]) {
            return Err(GradeError::InvalidConfig(
                "expected 0 <= plausible_points <= near_floor <= endpoint_points".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// SHARED HELPERS
// ============================================================

/// Match each user item against the first unused ground-truth item accepted by
/// `matcher`. Returns, per user item, the matched index and the matcher's tag.
pub(crate) fn greedy_match<U, G, M>(
    user: &[U],
    truth: &[G],
    matcher: impl Fn(&U, &G) -> Option<M>,
) -> Vec<Option<(usize, M)>> {
    let (_, matches) = user.iter().fold(
        (BTreeSet::new(), Vec::with_capacity(user.len())),
        |(mut used, mut matches), u| {
            let hit = truth
                .iter()
                .enumerate()
                .filter(|(i, _)| !used.contains(i))
                .find_map(|(i, g)| matcher(u, g).map(|tag| (i, tag)));
            if let Some((i, _)) = &hit {
                used.insert(*i);
            }
            matches.push(hit);
            (used, matches)
        },
    );
    matches
}

/// Ground-truth indices left unmatched.
pub(crate) fn unmatched<M>(matches: &[Option<(usize, M)>], truth_len: usize) -> Vec<usize> {
    let used: BTreeSet<usize> = matches.iter().flatten().map(|(i, _)| *i).collect();
    (0..truth_len).filter(|i| !used.contains(i)).collect()
}

/// Settle a "none found" claim: 1/1 when nothing exists, 0/N otherwise.
pub(crate) fn none_claim_result(
    actual: usize,
    noun: &str,
    correct_answers: CorrectAnswers,
    expected: BTreeMap<&'static str, usize>,
) -> ValidationResult {
    if actual == 0 {
        let text = format!("Correct! There are no {noun} in this chart.");
        return ValidationResult {
            score: 1.0,
            total_expected_points: 1.0,
            feedback: vec![text.clone()],
            message: text,
            correct_answers,
            expected,
        };
    }
    let verb = if actual == 1 { "is" } else { "are" };
    ValidationResult {
        score: 0.0,
        total_expected_points: actual as f64,
        feedback: vec![format!("Incorrect. There {verb} {actual} {noun} in this chart.")],
        message: format!("You reported none, but this chart has {actual} {noun}."),
        correct_answers,
        expected,
    }
}

/// Summary line for a graded submission.
pub(crate) fn summary_message(score: f64, total: f64) -> String {
    if total <= 0.0 {
        return "No patterns to find in this chart.".to_string();
    }
    let pct = score / total * 100.0;
    let verdict = match pct {
        p if p >= 100.0 => "Perfect!",
        p if p >= 70.0 => "Good job!",
        p if p >= 40.0 => "Partially correct.",
        _ => "Keep practicing.",
    };
    format!("{verdict} You scored {} of {} ({pct:.0}%).", trim_num(score), trim_num(total))
}

/// `12` rather than `12.0`; two decimals otherwise.
pub(crate) fn trim_num(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        format!("{n:.2}")
    }
}

/// Human-readable UTC time for feedback.
pub(crate) fn fmt_time(time: i64) -> String {
    chrono::DateTime::from_timestamp(time, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| time.to_string())
}
