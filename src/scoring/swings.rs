//! Swing point grading: one point per correctly placed swing.

use std::collections::BTreeMap;

use crate::{
    annotation::Annotation, detectors::swing::SwingPoints, tolerance::TimeframeSettings,
    ChartPoint, SwingKind,
};

use super::{
    fmt_time, greedy_match, none_claim_result, summary_message, unmatched, CorrectAnswers,
    ValidationResult,
};

/// Grade marked swing points against the detected highs and lows.
///
/// Each user point takes the first unused detected point of the same kind
/// inside the tolerance window. Points without a high/low tag are ignored.
pub fn score_swings(
    annotations: &[Annotation],
    truth: &SwingPoints,
    settings: &TimeframeSettings,
) -> ValidationResult {
    let expected_points = truth.by_time();
    let expected = BTreeMap::from([("highs", truth.highs.len()), ("lows", truth.lows.len())]);
    let correct_answers = CorrectAnswers::Swings(expected_points.clone());

    if annotations.iter().any(Annotation::is_none_claim) {
        return none_claim_result(expected_points.len(), "swing points", correct_answers, expected);
    }

    let user: Vec<(ChartPoint, SwingKind)> = annotations
        .iter()
        .filter_map(|a| match a {
            Annotation::Point { point, kind: Some(kind) } => Some((*point, *kind)),
            _ => None,
        })
        .collect();

    let matches = greedy_match(&user, &expected_points, |(point, kind), g| {
        (g.kind == *kind && settings.points_match(*point, g.point())).then_some(())
    });

    let mut feedback = Vec::with_capacity(user.len() + expected_points.len());
    for ((point, kind), hit) in user.iter().zip(&matches) {
        feedback.push(match hit {
            Some((i, _)) => format!(
                "Correct: swing {} at {:.2} ({}).",
                kind.as_str(),
                expected_points[*i].price,
                fmt_time(expected_points[*i].time)
            ),
            None => format!(
                "Incorrect: no swing {} near {:.2} ({}).",
                kind.as_str(),
                point.price,
                fmt_time(point.time)
            ),
        });
    }
    for i in unmatched(&matches, expected_points.len()) {
        let missed = &expected_points[i];
        feedback.push(format!(
            "Missed: swing {} at {:.2} ({}).",
            missed.kind.as_str(),
            missed.price,
            fmt_time(missed.time)
        ));
    }

    let score = matches.iter().flatten().count() as f64;
    let total = expected_points.len() as f64;
    ValidationResult {
        score,
        total_expected_points: total,
        feedback,
        message: summary_message(score, total),
        correct_answers,
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{detectors::swing::SwingPoint, Ratio};

    fn swing(time: i64, price: f64, kind: SwingKind) -> SwingPoint {
        SwingPoint { time, price, significance: Ratio::new_const(0.5), kind, index: 0 }
    }

    fn truth() -> SwingPoints {
        SwingPoints {
            highs: vec![swing(10_000, 100.0, SwingKind::High)],
            lows: vec![swing(20_000, 80.0, SwingKind::Low), swing(40_000, 82.0, SwingKind::Low)],
        }
    }

    fn hourly() -> TimeframeSettings {
        TimeframeSettings::new(0.04, 7_200, 1.0)
    }

    fn mark(time: i64, price: f64, kind: SwingKind) -> Annotation {
        Annotation::Point { point: ChartPoint::new(time, price), kind: Some(kind) }
    }

    #[test]
    fn test_matches_within_tolerance() {
        let drawings = vec![
            mark(11_000, 101.0, SwingKind::High),
            mark(20_500, 80.5, SwingKind::Low),
            mark(30_000, 90.0, SwingKind::High),
        ];
        let result = score_swings(&drawings, &truth(), &hourly());
        assert_eq!(result.score, 2.0);
        assert_eq!(result.total_expected_points, 3.0);
        assert_eq!(result.feedback.len(), 4);
        assert!(result.feedback[2].starts_with("Incorrect"));
        assert!(result.feedback[3].starts_with("Missed"));
    }

    #[test]
    fn test_kind_must_match() {
        let drawings = vec![mark(10_000, 100.0, SwingKind::Low)];
        let result = score_swings(&drawings, &truth(), &hourly());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_each_truth_point_used_once() {
        let drawings = vec![mark(10_000, 100.0, SwingKind::High), mark(10_100, 100.5, SwingKind::High)];
        let result = score_swings(&drawings, &truth(), &hourly());
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn test_untagged_points_ignored() {
        let drawings = vec![Annotation::Point { point: ChartPoint::new(10_000, 100.0), kind: None }];
        let result = score_swings(&drawings, &truth(), &hourly());
        assert_eq!(result.score, 0.0);
        assert_eq!(result.feedback.len(), 3);
    }

    #[test]
    fn test_none_claim_against_swings() {
        let result = score_swings(&[Annotation::NoneFound], &truth(), &hourly());
        assert_eq!(result.score, 0.0);
        assert_eq!(result.total_expected_points, 3.0);
        assert!(result.message.contains("3 swing points"));
    }

    #[test]
    fn test_none_claim_on_empty_truth() {
        let result = score_swings(&[Annotation::NoneFound], &SwingPoints::default(), &hourly());
        assert_eq!((result.score, result.total_expected_points), (1.0, 1.0));
        assert_eq!(result.percentage(), 100.0);
    }
}
