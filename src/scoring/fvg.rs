//! Fair Value Gap grading: one point per matched gap.

use std::collections::BTreeMap;

use crate::{
    annotation::Annotation,
    detectors::fvg::{FairValueGap, FvgConfig},
    tolerance::TimeframeSettings,
};

use super::{
    fmt_time, greedy_match, none_claim_result, summary_message, unmatched, CorrectAnswers,
    FvgTruth, ValidationResult,
};

/// Relative slack on the overlap comparison, scaled by price magnitude
const OVERLAP_EPSILON: f64 = 1e-9;

/// Which rule accepted a drawing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapMatch {
    /// Top and bottom both within price tolerance
    Edges,
    /// Price overlap covers enough of the smaller range
    Overlap,
    /// Horizontal line on the gap's midpoint
    Midline,
}

impl GapMatch {
    fn describe(self) -> &'static str {
        match self {
            GapMatch::Edges => "edges match",
            GapMatch::Overlap => "area overlaps",
            GapMatch::Midline => "midline",
        }
    }
}

/// Decide whether `drawing` identifies `gap`.
///
/// A tagged drawing must agree with the gap's kind. A rectangle matches on its
/// edges or on its price overlap, but only once it also overlaps the gap's time
/// span widened by the time tolerance on both sides. That time check tightens
/// the price-only rule so a box drawn over an unrelated stretch of the chart at
/// the same price level does not count. The overlap share is compared with a
/// small relative slack so an exact threshold survives decimal rounding.
pub fn match_gap(
    drawing: &Annotation,
    gap: &FairValueGap,
    settings: &TimeframeSettings,
    overlap_threshold: f64,
) -> Option<GapMatch> {
    match *drawing {
        Annotation::Rect { start_time, end_time, top, bottom, kind } => {
            if kind.is_some_and(|k| k != gap.kind) {
                return None;
            }
            let window_start = gap.start_time.saturating_sub(settings.time_tolerance);
            let window_end = gap.end_time.saturating_add(settings.time_tolerance);
            if end_time < window_start || start_time > window_end {
                return None;
            }
            if settings.price_matches(top, gap.top_price) && settings.price_matches(bottom, gap.bottom_price) {
                return Some(GapMatch::Edges);
            }
            let overlap = top.min(gap.top_price) - bottom.max(gap.bottom_price);
            let smaller = (top - bottom).min(gap.size);
            let slack = OVERLAP_EPSILON * top.abs().max(gap.top_price.abs()).max(smaller);
            (overlap > 0.0 && smaller > 0.0 && overlap + slack >= overlap_threshold * smaller)
                .then_some(GapMatch::Overlap)
        },
        Annotation::HLine { point, kind } => {
            if kind.is_some_and(|k| k != gap.kind) {
                return None;
            }
            (settings.price_matches(point.price, gap.midpoint()) && gap.contains_time(point.time))
                .then_some(GapMatch::Midline)
        },
        _ => None,
    }
}

/// Grade gap drawings against the detected gaps of the kinds in scope.
pub fn score_fvg(
    annotations: &[Annotation],
    truth: &FvgTruth,
    settings: &TimeframeSettings,
    config: &FvgConfig,
) -> ValidationResult {
    let expected: BTreeMap<&'static str, usize> = truth
        .kinds
        .iter()
        .map(|k| (k.as_str(), truth.gaps.iter().filter(|g| g.kind == *k).count()))
        .collect();
    let correct_answers = CorrectAnswers::Fvg(truth.answers());

    if annotations.iter().any(Annotation::is_none_claim) {
        return none_claim_result(truth.gaps.len(), "Fair Value Gaps", correct_answers, expected);
    }

    let drawings: Vec<&Annotation> = annotations
        .iter()
        .filter(|a| matches!(a, Annotation::Rect { .. } | Annotation::HLine { .. }))
        .collect();
    let threshold = config.overlap_threshold.get();
    let matches = greedy_match(&drawings, &truth.gaps, |d, g| match_gap(d, g, settings, threshold));

    let mut feedback = Vec::with_capacity(drawings.len() + truth.gaps.len());
    for (drawing, hit) in drawings.iter().zip(&matches) {
        feedback.push(match hit {
            Some((i, how)) => {
                let gap = &truth.gaps[*i];
                format!(
                    "Correct: {} gap {:.2}-{:.2} ({}, {}).",
                    gap.kind.as_str(),
                    gap.bottom_price,
                    gap.top_price,
                    fmt_time(gap.start_time),
                    how.describe()
                )
            },
            None => format!("Incorrect: {} does not match a Fair Value Gap.", describe_drawing(drawing)),
        });
    }
    for i in unmatched(&matches, truth.gaps.len()) {
        let gap = &truth.gaps[i];
        feedback.push(format!(
            "Missed: {} gap {:.2}-{:.2} ({}).",
            gap.kind.as_str(),
            gap.bottom_price,
            gap.top_price,
            fmt_time(gap.start_time)
        ));
    }

    let score = matches.iter().flatten().count() as f64;
    let total = truth.gaps.len() as f64;
    ValidationResult {
        score,
        total_expected_points: total,
        feedback,
        message: summary_message(score, total),
        correct_answers,
        expected,
    }
}

fn describe_drawing(drawing: &Annotation) -> String {
    match drawing {
        Annotation::Rect { start_time, top, bottom, .. } => {
            format!("box {bottom:.2}-{top:.2} at {}", fmt_time(*start_time))
        },
        Annotation::HLine { point, .. } => format!("line at {:.2} ({})", point.price, fmt_time(point.time)),
        _ => "drawing".to_string(),
    }
}
