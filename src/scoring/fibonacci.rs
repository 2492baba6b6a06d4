//! Fibonacci grading: continuous partial credit per endpoint.
//!
//! Each direction in scope is worth `2 * endpoint_points`. An endpoint earns
//! full points inside `tight_factor` of the tolerance, a linear slide down to
//! `near_floor` across the rest of the tolerance window, `plausible_points`
//! when it sits on some other genuine swing of the right kind, and nothing
//! otherwise.

use std::collections::BTreeMap;

use crate::{
    annotation::Annotation,
    detectors::swing::SwingPoints,
    tolerance::{price_deviation, time_deviation, TimeframeSettings},
    ChartPoint, FibDirection, SwingKind,
};

use super::{
    fmt_time, none_claim_result, summary_message, trim_num, CorrectAnswers, FibScoring,
    FibonacciTruth, ValidationResult,
};

/// How close a drawn endpoint came to the expected swing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointGrade {
    /// Inside the tight window
    Exact,
    /// Inside the tolerance window
    Close,
    /// Outside tolerance but on another genuine swing
    Plausible,
    Miss,
}

/// Points and grade for one endpoint.
pub fn endpoint_score(
    drawn: ChartPoint,
    expected: ChartPoint,
    kind: SwingKind,
    plausible: &SwingPoints,
    settings: &TimeframeSettings,
    scoring: &FibScoring,
) -> (f64, EndpointGrade) {
    let price = normalized(price_deviation(drawn.price, expected.price), settings.price_tolerance);
    let time = normalized(
        time_deviation(drawn.time, expected.time) as f64,
        settings.time_tolerance as f64,
    );
    let distance = price.max(time);

    if distance <= scoring.tight_factor {
        (scoring.endpoint_points, EndpointGrade::Exact)
    } else if distance <= 1.0 {
        let slide = (distance - scoring.tight_factor) / (1.0 - scoring.tight_factor);
        let points = scoring.endpoint_points - slide * (scoring.endpoint_points - scoring.near_floor);
        (points, EndpointGrade::Close)
    } else if is_plausible_swing(drawn, kind, plausible, settings) {
        (scoring.plausible_points, EndpointGrade::Plausible)
    } else {
        (0.0, EndpointGrade::Miss)
    }
}

/// True when a genuine local extremum of `kind` lies inside the tolerance
/// window of `drawn`.
pub fn is_plausible_swing(
    drawn: ChartPoint,
    kind: SwingKind,
    plausible: &SwingPoints,
    settings: &TimeframeSettings,
) -> bool {
    plausible
        .of_kind(kind)
        .iter()
        .any(|p| settings.points_match(drawn, p.point()))
}

/// Deviation as a share of the tolerance. A zero tolerance only accepts zero deviation.
#[inline]
fn normalized(deviation: f64, tolerance: f64) -> f64 {
    if tolerance > 0.0 {
        deviation / tolerance
    } else if deviation == 0.0 {
        0.0
    } else {
        f64::INFINITY
    }
}

/// Grade retracement drawings against the expected retracement of each direction in scope.
pub fn score_fibonacci(
    annotations: &[Annotation],
    truth: &FibonacciTruth,
    settings: &TimeframeSettings,
    scoring: &FibScoring,
) -> ValidationResult {
    let expected: BTreeMap<&'static str, usize> = truth
        .retracements
        .iter()
        .map(|(d, r)| (d.as_str(), usize::from(r.is_some())))
        .collect();
    let correct_answers = CorrectAnswers::Fibonacci(truth.answers());

    if annotations.iter().any(Annotation::is_none_claim) {
        return none_claim_result(truth.count(), "Fibonacci retracements", correct_answers, expected);
    }

    let lines: Vec<(ChartPoint, ChartPoint, FibDirection)> = annotations
        .iter()
        .filter_map(|a| match a {
            Annotation::Line { start, end, direction } => {
                let direction = direction.unwrap_or(if end.price >= start.price {
                    FibDirection::Uptrend
                } else {
                    FibDirection::Downtrend
                });
                Some((*start, *end, direction))
            },
            _ => None,
        })
        .collect();

    let mut score = 0.0;
    let mut total = 0.0;
    let mut feedback = Vec::new();

    for (direction, retracement) in &truth.retracements {
        let drawing = lines.iter().find(|(_, _, d)| d == direction);
        let label = capitalize(direction.as_str());
        match (retracement, drawing) {
            (Some(r), Some((start, end, _))) => {
                total += scoring.drawing_points();
                let (start_kind, end_kind) = direction.anchor_kinds();
                let (s, s_grade) =
                    endpoint_score(*start, r.start.point(), start_kind, &truth.plausible, settings, scoring);
                let (e, e_grade) =
                    endpoint_score(*end, r.end.point(), end_kind, &truth.plausible, settings, scoring);
                score += s + e;
                feedback.push(format!(
                    "{label}: {} of {} points.",
                    trim_num(s + e),
                    trim_num(scoring.drawing_points())
                ));
                feedback.push(endpoint_feedback("Start", start_kind, s_grade, s, scoring));
                feedback.push(endpoint_feedback("End", end_kind, e_grade, e, scoring));
            },
            (Some(r), None) => {
                total += scoring.drawing_points();
                feedback.push(format!(
                    "{label}: missing. Expected from {:.2} ({}) to {:.2} ({}).",
                    r.start.price,
                    fmt_time(r.start.time),
                    r.end.price,
                    fmt_time(r.end.time)
                ));
            },
            (None, Some(_)) => {
                feedback.push(format!("{label}: this chart has no valid {} retracement.", direction.as_str()));
            },
            (None, None) => {},
        }
    }

    ValidationResult {
        score,
        total_expected_points: total,
        feedback,
        message: summary_message(score, total),
        correct_answers,
        expected,
    }
}

fn endpoint_feedback(
    which: &str,
    kind: SwingKind,
    grade: EndpointGrade,
    points: f64,
    scoring: &FibScoring,
) -> String {
    let of = trim_num(scoring.endpoint_points);
    let pts = trim_num(points);
    let kind = kind.as_str();
    match grade {
        EndpointGrade::Exact => format!("{which} point is on the swing {kind} ({pts}/{of})."),
        EndpointGrade::Close => format!("{which} point is close to the swing {kind} ({pts}/{of})."),
        EndpointGrade::Plausible => {
            format!("{which} point is a valid swing {kind} but not the optimal one ({pts}/{of}).")
        },
        EndpointGrade::Miss => format!("{which} point is not near a swing {kind} ({pts}/{of})."),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
