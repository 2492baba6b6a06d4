//! End-to-end grading tests through the JSON request boundary.

use chartgrade::prelude::*;
use serde_json::{json, Value};

const DAY: i64 = 86_400;
/// 2024-01-01 00:00 UTC
const T0: i64 = 1_704_067_200;

fn request(body: Value) -> GradeRequest {
    serde_json::from_value(body).unwrap()
}

fn grader() -> Grader {
    GraderBuilder::new().build().unwrap()
}

/// Daily candles built from highs; each low is two below its high.
fn candles_from_highs(highs: &[f64]) -> Vec<Value> {
    highs
        .iter()
        .enumerate()
        .map(|(i, h)| {
            json!({
                "time": T0 + i as i64 * DAY,
                "open": h - 2.0,
                "high": h,
                "low": h - 2.0,
                "close": h - 1.0,
            })
        })
        .collect()
}

/// Peaks at 5 and 15, trough at 10.
fn zigzag() -> Vec<Value> {
    candles_from_highs(&[
        10.0, 11.0, 12.0, 13.0, 14.0, 20.0, 14.0, 13.0, 12.0, 11.0, 10.5, 11.0, 12.0, 13.0, 14.0,
        18.0, 14.0, 13.0, 12.0, 11.0, 10.8,
    ])
}

fn at(index: i64) -> i64 {
    T0 + index * DAY
}

// ============================================================
// SWINGS
// ============================================================

#[test]
fn test_swings_graded_against_detected_points() {
    let req = request(json!({
        "tool": "swings",
        "timeframe": "1day",
        "chartData": zigzag(),
        "drawings": [
            { "time": at(5), "price": 20.2, "type": "swingHigh" },
            { "time": at(10) + 3_600, "price": 8.5, "type": "swingLow" },
            { "time": at(2), "price": 12.0, "type": "swingHigh" },
        ],
    }));
    let response = grader().grade(&req).unwrap();
    assert_eq!(response.score, 2.0);
    assert_eq!(response.total_expected_points, 3.0);
    assert!((response.percentage - 200.0 / 3.0).abs() < 1e-9);
    assert_eq!(response.expected.get("highs"), Some(&2));
    assert_eq!(response.expected.get("lows"), Some(&1));
    assert!(response.feedback.iter().any(|f| f.starts_with("Missed: swing high at 18.00")));
}

#[test]
fn test_none_claim_against_single_swing() {
    let req = request(json!({
        "tool": "swings",
        "chartData": candles_from_highs(&[10.0, 11.0, 12.0, 13.0, 14.0, 20.0, 14.0, 13.0, 12.0, 11.0, 10.0]),
        "drawings": [{ "noSwingsFound": true }],
    }));
    let response = grader().grade(&req).unwrap();
    assert_eq!(response.score, 0.0);
    assert_eq!(response.total_expected_points, 1.0);
    assert!(response.message.contains("has 1 swing points"));
}

// ============================================================
// FIBONACCI
// ============================================================

#[test]
fn test_fibonacci_close_start_and_far_end() {
    // expected uptrend runs from the trough (8.5) to the second peak (18)
    let req = request(json!({
        "tool": "fibonacci",
        "timeframe": "1day",
        "part": 1,
        "chartData": zigzag(),
        "drawings": [{
            "start": { "time": at(10), "price": 8.534 },
            "end": { "time": at(15), "price": 19.62 },
            "direction": "uptrend",
        }],
    }));
    let response = grader().grade(&req).unwrap();
    assert_eq!(response.total_expected_points, 100.0);
    assert!((response.score - 50.0).abs() < 1e-9);
    assert_eq!(response.expected.len(), 1);
}

#[test]
fn test_fibonacci_exact_drawing() {
    let req = request(json!({
        "tool": "fibonacci",
        "part": 1,
        "chartData": zigzag(),
        "drawings": [{
            "points": [{ "time": at(10), "price": 8.5 }, { "time": at(15), "price": 18.0 }],
        }],
    }));
    let response = grader().grade(&req).unwrap();
    assert_eq!(response.score, 100.0);
    assert_eq!(response.percentage, 100.0);
}

#[test]
fn test_fibonacci_both_directions() {
    // downtrend: latest high with a later low is the first peak (20) down to the trough
    let req = request(json!({
        "tool": "fibonacci",
        "chartData": zigzag(),
        "drawings": [],
    }));
    let response = grader().grade(&req).unwrap();
    assert_eq!(response.total_expected_points, 200.0);
    assert_eq!(response.score, 0.0);
    let body = serde_json::to_value(&response).unwrap();
    let answers = body["correctAnswers"].as_array().unwrap();
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[1]["direction"], json!("downtrend"));
    assert_eq!(answers[1]["start"]["price"], json!(20.0));
}

// ============================================================
// FAIR VALUE GAPS
// ============================================================

fn gap_chart() -> Vec<Value> {
    vec![
        json!({ "t": "2024-01-01", "o": 96.0, "h": 100.0, "l": 95.0, "c": 99.0 }),
        json!({ "t": "2024-01-02", "o": 99.0, "h": 115.0, "l": 98.0, "c": 114.0 }),
        json!({ "t": "2024-01-03", "o": 114.0, "h": 120.0, "l": 110.0, "c": 118.0 }),
    ]
}

#[test]
fn test_three_candle_bullish_gap() {
    let req = request(json!({
        "tool": "fvg",
        "timeframe": "1day",
        "chartData": gap_chart(),
        "drawings": [{
            "startTime": "2024-01-01", "endTime": "2024-01-03",
            "topPrice": 110.0, "bottomPrice": 100.0, "type": "bullish",
        }],
    }));
    let response = grader().grade(&req).unwrap();
    assert_eq!((response.score, response.total_expected_points), (1.0, 1.0));

    let body = serde_json::to_value(&response).unwrap();
    let gap = &body["correctAnswers"][0];
    assert_eq!(gap["type"], json!("bullish"));
    assert_eq!(gap["bottomPrice"], json!(100.0));
    assert_eq!(gap["topPrice"], json!(110.0));
    assert_eq!(gap["filled"], json!(false));
}

#[test]
fn test_gap_matched_by_overlap() {
    let req = request(json!({
        "tool": "fvg",
        "chartData": gap_chart(),
        "drawings": [{
            "startTime": T0, "endTime": T0 + 2 * DAY,
            "topPrice": 120.0, "bottomPrice": 103.0,
        }],
    }));
    let response = grader().grade(&req).unwrap();
    assert_eq!(response.score, 1.0);
    assert!(response.feedback[0].contains("area overlaps"));
}

#[test]
fn test_part_two_only_grades_bearish_gaps() {
    let req = request(json!({
        "tool": "fvg",
        "part": 2,
        "chartData": gap_chart(),
        "drawings": [{ "noFvgsFound": true }],
    }));
    let response = grader().grade(&req).unwrap();
    assert_eq!((response.score, response.total_expected_points), (1.0, 1.0));
    assert_eq!(response.expected.get("bearish"), Some(&0));
    assert!(response.expected.get("bullish").is_none());
}

// ============================================================
// EMPTY DATA AND ERRORS
// ============================================================

#[test]
fn test_empty_chart_data_never_divides_by_zero() {
    for tool in ["swings", "fibonacci", "fvg"] {
        let req = request(json!({ "tool": tool, "chartData": [], "drawings": [] }));
        let response = grader().grade(&req).unwrap();
        assert_eq!(response.total_expected_points, 0.0, "{tool}");
        assert_eq!(response.percentage, 0.0, "{tool}");
        assert!(response.message.contains("No patterns"), "{tool}");
    }
}

#[test]
fn test_handle_json_reports_bad_input() {
    let (status, body) = grader().handle_json(r#"{"tool":"swings","chartData":[]}"#);
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("drawings"));
}

#[test]
fn test_custom_tolerance_table() {
    let table: ToleranceTable = serde_json::from_value(json!({
        "1day": { "priceTolerance": 0.001, "timeTolerance": 60 },
    }))
    .unwrap();
    let strict = GraderBuilder::new().tolerances(table).build().unwrap();
    let req = request(json!({
        "tool": "swings",
        "chartData": zigzag(),
        "drawings": [{ "time": at(5), "price": 20.2, "type": "high" }],
    }));
    assert_eq!(strict.grade(&req).unwrap().score, 0.0);
    assert_eq!(grader().grade(&req).unwrap().score, 1.0);
}

#[test]
fn test_batch_preserves_order() {
    let requests = vec![
        request(json!({ "tool": "swings", "chartData": zigzag(), "drawings": [] })),
        request(json!({ "tool": "bogus", "chartData": [], "drawings": [] })),
        request(json!({ "tool": "fvg", "chartData": gap_chart(), "drawings": [] })),
    ];
    let results = grade_batch(&grader(), &requests);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().total_expected_points, 3.0);
    assert!(matches!(results[1], Err(GradeError::UnknownTool(_))));
    assert_eq!(results[2].as_ref().unwrap().total_expected_points, 1.0);
}
