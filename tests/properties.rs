//! Property tests for the ground-truth detectors.

use chartgrade::prelude::*;
use proptest::prelude::*;

const HOUR: i64 = 3_600;

/// Random walk of hourly candles: each step moves the mid price and sets a spread.
fn walk() -> impl Strategy<Value = Vec<Candle>> {
    prop::collection::vec((-5.0f64..5.0, 0.1f64..4.0), 0..120).prop_map(|steps| {
        let mut mid = 100.0;
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (delta, spread))| {
                mid = (mid + delta).max(5.0);
                let (high, low) = (mid + spread / 2.0, mid - spread / 2.0);
                Candle::new(i as i64 * HOUR, mid, high, low, mid)
            })
            .collect()
    })
}

fn swing_config() -> impl Strategy<Value = SwingConfig> {
    (1usize..8, 0.0f64..20.0, 0usize..5, 5usize..15).prop_map(|(lookback, pct, min, max)| SwingConfig {
        lookback: Period::new_const(lookback),
        min_significance_percent: pct,
        min_count: min,
        max_count: max,
    })
}

fn hourly() -> TimeframeSettings {
    TimeframeSettings::new(0.04, 2 * HOUR, 1.0)
}

proptest! {
    #[test]
    fn prop_flat_series_has_no_swings(len in 0usize..60, price in 1.0f64..1_000.0) {
        let candles: Vec<Candle> = (0..len)
            .map(|i| Candle::new(i as i64 * HOUR, price, price + 1.0, price - 1.0, price))
            .collect();
        let swings = detect_swing_points(&candles, &SwingConfig::default()).unwrap();
        prop_assert!(swings.is_empty());
    }

    #[test]
    fn prop_monotone_series_has_no_swings(len in 0usize..60, step in 0.01f64..5.0) {
        let candles: Vec<Candle> = (0..len)
            .map(|i| {
                let base = 100.0 + i as f64 * step;
                Candle::new(i as i64 * HOUR, base, base + 1.0, base - 1.0, base)
            })
            .collect();
        let swings = detect_swing_points(&candles, &SwingConfig::default()).unwrap();
        prop_assert!(swings.is_empty());
    }

    #[test]
    fn prop_swings_are_strict_local_extrema(candles in walk(), config in swing_config()) {
        let swings = detect_swing_points(&candles, &config).unwrap();
        let lookback = config.lookback.get();
        for high in &swings.highs {
            prop_assert!(is_strict_high(&candles, high.index, lookback));
            prop_assert_eq!(high.price, candles[high.index].high);
            prop_assert_eq!(high.kind, SwingKind::High);
        }
        for low in &swings.lows {
            prop_assert!(is_strict_low(&candles, low.index, lookback));
            prop_assert_eq!(low.price, candles[low.index].low);
        }
        prop_assert!(swings.highs.len() <= config.max_count);
        prop_assert!(swings.lows.len() <= config.max_count);
        prop_assert!(swings.highs.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn prop_detectors_are_idempotent(candles in walk()) {
        let config = SwingConfig::default();
        prop_assert_eq!(
            detect_swing_points(&candles, &config).unwrap(),
            detect_swing_points(&candles, &config).unwrap()
        );

        let fvg = FvgConfig::default();
        prop_assert_eq!(
            detect_fair_value_gaps(&candles, None, &fvg, &hourly()).unwrap(),
            detect_fair_value_gaps(&candles, None, &fvg, &hourly()).unwrap()
        );

        for direction in [FibDirection::Uptrend, FibDirection::Downtrend] {
            prop_assert_eq!(
                select_retracement(&candles, direction, &config).unwrap(),
                select_retracement(&candles, direction, &config).unwrap()
            );
        }
    }

    #[test]
    fn prop_levels_hit_both_anchors(
        t0 in 0i64..1_000_000,
        p0 in -1_000.0f64..1_000.0,
        p1 in -1_000.0f64..1_000.0,
    ) {
        let start = ChartPoint::new(t0, p0);
        let end = ChartPoint::new(t0 + HOUR, p1);
        let levels = calculate_fibonacci_levels(start, end);
        prop_assert_eq!(levels.price_at(0.0), Some(p0));
        prop_assert_eq!(levels.price_at(1.0), Some(p1));
        prop_assert_eq!(levels.levels.len(), FIB_RATIOS.len());
    }

    #[test]
    fn prop_fvg_count_monotone_in_min_gap(candles in walk(), a in 0.0f64..10.0, b in 0.0f64..10.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let loose = FvgConfig { min_gap_percent: lo, ..FvgConfig::default() };
        let strict = FvgConfig { min_gap_percent: hi, ..FvgConfig::default() };
        let n_loose = detect_fair_value_gaps(&candles, None, &loose, &hourly()).unwrap().len();
        let n_strict = detect_fair_value_gaps(&candles, None, &strict, &hourly()).unwrap().len();
        prop_assert!(n_strict <= n_loose);
    }

    #[test]
    fn prop_scores_stay_within_total(candles in walk(), offsets in prop::collection::vec(-3i64..3, 0..6)) {
        let grader = GraderBuilder::new().build().unwrap();
        let truth = grader.ground_truth(Tool::Swings, &candles, "1h", None);
        let drawings: Vec<Annotation> = offsets
            .iter()
            .zip(candles.iter().step_by(7))
            .map(|(off, c)| Annotation::Point {
                point: ChartPoint::new(c.time + off * HOUR, c.high),
                kind: Some(SwingKind::High),
            })
            .collect();
        let result = grader.validate(Tool::Swings, &drawings, &truth, "1h").unwrap();
        prop_assert!(result.score >= 0.0);
        prop_assert!(result.score <= result.total_expected_points);
        prop_assert!((0.0..=100.0).contains(&result.percentage()));
    }
}
