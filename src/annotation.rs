//! User-submitted drawings
//!
//! Drawings arrive as loosely shaped JSON from the charting front end. Each
//! one is parsed on its own; a drawing missing a required field is skipped and
//! the rest are still graded.

use serde::Deserialize;
use serde_json::Value;

use crate::{
    normalize::{parse_number, parse_time},
    ChartPoint, FibDirection, FvgKind, SwingKind, Tool,
};

/// A parsed user drawing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Annotation {
    /// "I found none" claim
    NoneFound,
    /// Single marked point, e.g. a swing high
    Point {
        point: ChartPoint,
        kind: Option<SwingKind>,
    },
    /// Two anchored points, e.g. a Fibonacci retracement
    Line {
        start: ChartPoint,
        end: ChartPoint,
        direction: Option<FibDirection>,
    },
    /// Price/time box, e.g. a Fair Value Gap
    Rect {
        start_time: i64,
        end_time: i64,
        top: f64,
        bottom: f64,
        kind: Option<FvgKind>,
    },
    /// Degenerate box drawn as a horizontal line
    HLine {
        point: ChartPoint,
        kind: Option<FvgKind>,
    },
}

impl Annotation {
    /// Parse one drawing for `tool`. None when required fields are missing.
    pub fn parse(tool: Tool, value: &Value) -> Option<Self> {
        let raw = RawDrawing::deserialize(value).ok()?;
        if raw.is_none_claim() {
            return Some(Annotation::NoneFound);
        }
        match tool {
            Tool::Swings => raw.point().map(|point| Annotation::Point {
                point,
                kind: raw.swing_kind(),
            }),
            Tool::Fibonacci => {
                let (start, end) = raw.anchors()?;
                let direction = raw.fib_direction().or_else(|| {
                    Some(if end.price >= start.price {
                        FibDirection::Uptrend
                    } else {
                        FibDirection::Downtrend
                    })
                });
                Some(Annotation::Line {
                    start,
                    end,
                    direction,
                })
            },
            Tool::Fvg => raw.gap_shape(),
        }
    }

    #[inline]
    pub fn is_none_claim(&self) -> bool {
        matches!(self, Annotation::NoneFound)
    }
}

/// Parse all drawings for `tool`, skipping malformed ones.
pub fn parse_drawings(tool: Tool, drawings: &[Value]) -> Vec<Annotation> {
    drawings
        .iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let parsed = Annotation::parse(tool, value);
            if parsed.is_none() {
                tracing::warn!(%tool, index, "ignoring malformed drawing");
            }
            parsed
        })
        .collect()
}

// ============================================================
// RAW SHAPE
// ============================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDrawing {
    #[serde(default, rename = "type", alias = "kind")]
    kind: Option<String>,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    time: Option<Value>,
    #[serde(default)]
    price: Option<Value>,
    #[serde(default)]
    start: Option<RawPoint>,
    #[serde(default)]
    end: Option<RawPoint>,
    #[serde(default)]
    points: Option<Vec<RawPoint>>,
    #[serde(default)]
    start_time: Option<Value>,
    #[serde(default)]
    end_time: Option<Value>,
    #[serde(default, alias = "top")]
    top_price: Option<Value>,
    #[serde(default, alias = "bottom")]
    bottom_price: Option<Value>,
    #[serde(
        default,
        alias = "none_found",
        alias = "noSwingsFound",
        alias = "no_swings_found",
        alias = "noFvgsFound",
        alias = "noFVGsFound",
        alias = "no_fvgs_found",
        alias = "noFibonacciFound"
    )]
    none_found: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPoint {
    #[serde(default)]
    time: Option<Value>,
    #[serde(default)]
    price: Option<Value>,
}

impl RawPoint {
    fn resolve(&self) -> Option<ChartPoint> {
        Some(ChartPoint::new(
            parse_time(self.time.as_ref()?)?,
            parse_number(self.price.as_ref()?)?,
        ))
    }
}

impl RawDrawing {
    fn tag(&self) -> String {
        self.kind.as_deref().unwrap_or_default().trim().to_ascii_lowercase()
    }

    fn is_none_claim(&self) -> bool {
        self.none_found == Some(true) || matches!(self.tag().as_str(), "none" | "none_found")
    }

    fn point(&self) -> Option<ChartPoint> {
        match (&self.time, &self.price) {
            (Some(t), Some(p)) => Some(ChartPoint::new(parse_time(t)?, parse_number(p)?)),
            _ => self.start.as_ref().and_then(RawPoint::resolve),
        }
    }

    fn anchors(&self) -> Option<(ChartPoint, ChartPoint)> {
        if let (Some(start), Some(end)) = (&self.start, &self.end) {
            return Some((start.resolve()?, end.resolve()?));
        }
        match self.points.as_deref() {
            Some([start, end, ..]) => Some((start.resolve()?, end.resolve()?)),
            _ => None,
        }
    }

    /// Lowercase words of the tag, split on separators and camelCase humps.
    fn tag_words(&self) -> Vec<String> {
        let raw = self.kind.as_deref().unwrap_or_default();
        let mut words: Vec<String> = Vec::new();
        let mut prev_lower = false;
        for ch in raw.chars() {
            if !ch.is_alphanumeric() {
                prev_lower = false;
                words.push(String::new());
                continue;
            }
            if ch.is_uppercase() && prev_lower {
                words.push(String::new());
            }
            match words.last_mut() {
                Some(word) => word.extend(ch.to_lowercase()),
                None => words.push(ch.to_lowercase().collect()),
            }
            prev_lower = ch.is_lowercase();
        }
        words.retain(|w| !w.is_empty());
        words
    }

    /// The last word names the extreme: `higher_low` is a low, `lowerHigh` a high.
    fn swing_kind(&self) -> Option<SwingKind> {
        let words = self.tag_words();
        let whole = words.concat();
        match whole.as_str() {
            "hh" | "lh" | "swinghigh" => return Some(SwingKind::High),
            "ll" | "hl" | "swinglow" => return Some(SwingKind::Low),
            _ => {},
        }
        match words.last().map(String::as_str) {
            Some("high" | "peak" | "top") => Some(SwingKind::High),
            Some("low" | "trough" | "bottom") => Some(SwingKind::Low),
            _ => None,
        }
    }

    fn fib_direction(&self) -> Option<FibDirection> {
        let text = self.direction.as_deref().map(str::to_ascii_lowercase).unwrap_or_else(|| self.tag());
        match text.trim() {
            "uptrend" | "up" | "bullish" => Some(FibDirection::Uptrend),
            "downtrend" | "down" | "bearish" => Some(FibDirection::Downtrend),
            _ => None,
        }
    }

    fn gap_kind(&self) -> Option<FvgKind> {
        let tag = self.tag();
        if tag.contains("bull") {
            Some(FvgKind::Bullish)
        } else if tag.contains("bear") {
            Some(FvgKind::Bearish)
        } else {
            None
        }
    }

    fn gap_shape(&self) -> Option<Annotation> {
        let kind = self.gap_kind();
        let explicit = (
            self.start_time.as_ref().and_then(parse_time),
            self.end_time.as_ref().and_then(parse_time),
            self.top_price.as_ref().and_then(parse_number),
            self.bottom_price.as_ref().and_then(parse_number),
        );
        let (t0, t1, p0, p1) = match explicit {
            (Some(t0), Some(t1), Some(top), Some(bottom)) => (t0, t1, top, bottom),
            _ => match self.anchors() {
                Some((a, b)) => (a.time, b.time, a.price, b.price),
                None => {
                    let point = self.point()?;
                    return Some(Annotation::HLine { point, kind });
                },
            },
        };

        let (start_time, end_time) = (t0.min(t1), t0.max(t1));
        let (top, bottom) = (p0.max(p1), p0.min(p1));
        if top == bottom {
            return Some(Annotation::HLine {
                point: ChartPoint::new(start_time, top),
                kind,
            });
        }
        Some(Annotation::Rect {
            start_time,
            end_time,
            top,
            bottom,
            kind,
        })
    }
}
