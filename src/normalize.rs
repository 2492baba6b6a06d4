//! Candle normalization
//!
//! Chart feeds disagree on field names (`high`/`h`/`High`), on time encoding
//! (epoch seconds, epoch milliseconds, ISO strings, business-day objects) and
//! on layout (objects or `[time, open, high, low, close, volume]` arrays). This
//! is the only place that knows about those variants; everything downstream
//! works on [`Candle`].

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::{Candle, GradeError, OHLCVExt, Period, Result, OHLCV};

const TIME_KEYS: &[&str] = &["time", "t", "timestamp", "Time", "date", "openTime", "open_time"];
const OPEN_KEYS: &[&str] = &["open", "o", "Open"];
const HIGH_KEYS: &[&str] = &["high", "h", "High"];
const LOW_KEYS: &[&str] = &["low", "l", "Low"];
const CLOSE_KEYS: &[&str] = &["close", "c", "Close"];
const VOLUME_KEYS: &[&str] = &["volume", "v", "Volume", "vol"];

/// Epoch values above this are treated as milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Normalize raw candle records. Malformed rows are dropped, never fatal.
///
/// The result is sorted by time with duplicate timestamps removed (first record
/// wins), so `time` is strictly increasing. `Candle::index` keeps the record's
/// position in `records`.
pub fn normalize_candles(records: &[Value]) -> Vec<Candle> {
    let candles: Vec<Candle> = records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            parse_record(record).map(|candle| Candle { index, ..candle })
        })
        .collect();
    finish(candles, records.len())
}

/// Normalize typed records. Bars without a timestamp use their position as time.
pub fn normalize_bars<T: OHLCV>(bars: &[T]) -> Vec<Candle> {
    let candles: Vec<Candle> = bars
        .iter()
        .enumerate()
        .filter_map(|(index, bar)| {
            if let Err(e) = bar.validate() {
                tracing::debug!(index, error = %e, "dropping candle");
                return None;
            }
            let time = bar.timestamp().unwrap_or(index as i64);
            if !representable(time) {
                tracing::debug!(index, time, "dropping candle with out-of-range time");
                return None;
            }
            let volume = bar.volume();
            Some(Candle {
                time,
                open: bar.open(),
                high: bar.high(),
                low: bar.low(),
                close: bar.close(),
                volume: volume.is_finite().then_some(volume),
                index,
            })
        })
        .collect();
    finish(candles, bars.len())
}

/// Like [`normalize_candles`], but fails when fewer than `2 * lookback + 1`
/// valid candles remain, since no windowed detector can run on them.
pub fn normalize_for_window(records: &[Value], lookback: Period) -> Result<Vec<Candle>> {
    let candles = normalize_candles(records);
    let need = lookback.window_len();
    if candles.len() < need {
        return Err(GradeError::InsufficientData {
            need,
            got: candles.len(),
        });
    }
    Ok(candles)
}

fn finish(mut candles: Vec<Candle>, total: usize) -> Vec<Candle> {
    // stable sort: the first record of a duplicated timestamp stays first
    candles.sort_by_key(|c| c.time);
    candles.dedup_by_key(|c| c.time);
    if candles.len() < total {
        tracing::debug!(
            kept = candles.len(),
            dropped = total - candles.len(),
            "normalized candle series"
        );
    }
    candles
}

fn parse_record(record: &Value) -> Option<Candle> {
    let candle = match record {
        Value::Object(map) => from_object(map)?,
        Value::Array(items) => from_array(items)?,
        _ => return None,
    };
    candle.validate().ok()?;
    Some(candle)
}

fn from_object(map: &Map<String, Value>) -> Option<Candle> {
    Some(Candle {
        time: lookup(map, TIME_KEYS).and_then(parse_time)?,
        open: lookup(map, OPEN_KEYS).and_then(parse_number)?,
        high: lookup(map, HIGH_KEYS).and_then(parse_number)?,
        low: lookup(map, LOW_KEYS).and_then(parse_number)?,
        close: lookup(map, CLOSE_KEYS).and_then(parse_number)?,
        volume: lookup(map, VOLUME_KEYS).and_then(parse_number),
        index: 0,
    })
}

/// `[time, open, high, low, close, volume?, ...]`
fn from_array(items: &[Value]) -> Option<Candle> {
    if items.len() < 5 {
        return None;
    }
    Some(Candle {
        time: parse_time(&items[0])?,
        open: parse_number(&items[1])?,
        high: parse_number(&items[2])?,
        low: parse_number(&items[3])?,
        close: parse_number(&items[4])?,
        volume: items.get(5).and_then(parse_number),
        index: 0,
    })
}

fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

pub(crate) fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Parse a time value into epoch seconds. Times outside the calendar range
/// chrono can represent are rejected, so differences between two parsed times
/// never overflow.
pub(crate) fn parse_time(value: &Value) -> Option<i64> {
    parse_raw_time(value).filter(|t| representable(*t))
}

#[inline]
fn representable(secs: i64) -> bool {
    DateTime::from_timestamp(secs, 0).is_some()
}

fn parse_raw_time(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(epoch_seconds(i)),
            None => n.as_f64().and_then(epoch_seconds_f64),
        },
        Value::String(s) => parse_time_str(s.trim()),
        Value::Object(map) => {
            // business-day object: { year, month, day }
            let year = map.get("year")?.as_i64()?;
            let month = map.get("month")?.as_u64()?;
            let day = map.get("day")?.as_u64()?;
            let date = NaiveDate::from_ymd_opt(
                i32::try_from(year).ok()?,
                u32::try_from(month).ok()?,
                u32::try_from(day).ok()?,
            )?;
            Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
        },
        _ => None,
    }
}

fn parse_time_str(s: &str) -> Option<i64> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(epoch_seconds(i));
    }
    if let Ok(f) = s.parse::<f64>() {
        return epoch_seconds_f64(f);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

#[inline]
fn epoch_seconds(t: i64) -> i64 {
    if t.unsigned_abs() > MILLIS_THRESHOLD.unsigned_abs() {
        t / 1000
    } else {
        t
    }
}

fn epoch_seconds_f64(t: f64) -> Option<i64> {
    if !t.is_finite() {
        return None;
    }
    let secs = if t.abs() > MILLIS_THRESHOLD as f64 { t / 1000.0 } else { t };
    if secs.abs() >= i64::MAX as f64 {
        return None;
    }
    Some(secs.trunc() as i64)
}
