//! Request boundary: JSON in, graded response out.
//!
//! Authentication and storage live outside this crate. A caller hands over an
//! already verified [`UserId`] and a [`ResultSink`] to persist results into.

use std::{
    collections::BTreeMap,
    panic::{catch_unwind, AssertUnwindSafe},
};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    annotation::parse_drawings, normalize::normalize_candles, scoring::CorrectAnswers,
    tolerance::DEFAULT_TIMEFRAME, GradeError, Grader, Part, Result, Tool,
};

const INTERNAL_ERROR_MESSAGE: &str = "Internal error while grading";

/// Grading request as posted by the front end
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub drawings: Option<Vec<Value>>,
    #[serde(default)]
    pub chart_data: Option<Vec<Value>>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub part: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResponse {
    pub score: f64,
    pub total_expected_points: f64,
    pub percentage: f64,
    pub feedback: Vec<String>,
    pub message: String,
    pub correct_answers: CorrectAnswers,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub expected: BTreeMap<&'static str, usize>,
}

/// Verified user identity supplied by the auth layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One graded attempt, as handed to the persistence layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub user_id: UserId,
    /// Tool key, e.g. `"swings"`
    pub test_type: String,
    pub score: f64,
    pub total_points: f64,
    /// Full response body
    pub details: Value,
}

/// Stores graded attempts
pub trait ResultSink: Send + Sync {
    fn save(&self, record: &ResultRecord) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl Grader {
    /// Grade one request end to end.
    pub fn grade(&self, request: &GradeRequest) -> Result<GradeResponse> {
        let tool = request
            .tool
            .as_deref()
            .ok_or_else(|| GradeError::BadInput("missing tool".to_string()))?;
        let chart_data = request
            .chart_data
            .as_deref()
            .ok_or_else(|| GradeError::BadInput("missing chartData".to_string()))?;
        let drawings = request
            .drawings
            .as_deref()
            .ok_or_else(|| GradeError::BadInput("missing drawings".to_string()))?;

        let tool: Tool = tool.parse()?;
        let part = request.part.map(Part::from_number).transpose()?;
        let timeframe = request.timeframe.as_deref().unwrap_or(DEFAULT_TIMEFRAME);
        if !self.tolerances().contains(timeframe) {
            tracing::debug!(timeframe, default = DEFAULT_TIMEFRAME, "unknown timeframe, using default tolerances");
        }

        let candles = normalize_candles(chart_data);
        let annotations = parse_drawings(tool, drawings);
        let truth = self.ground_truth(tool, &candles, timeframe, part);
        let result = self.validate(tool, &annotations, &truth, timeframe)?;

        tracing::info!(
            %tool,
            timeframe,
            candles = candles.len(),
            drawings = annotations.len(),
            score = result.score,
            total = result.total_expected_points,
            "graded submission"
        );

        Ok(GradeResponse {
            score: result.score,
            total_expected_points: result.total_expected_points,
            percentage: result.percentage(),
            feedback: result.feedback,
            message: result.message,
            correct_answers: result.correct_answers,
            expected: result.expected,
        })
    }

    /// Grade a raw JSON body, returning an HTTP-style status and body.
    ///
    /// 200 carries the response, 400 `{error}` a malformed request and 500 a
    /// fixed `{error, tool}` body for anything else, including panics. The
    /// cause of a 500 only goes to the log.
    pub fn handle_json(&self, body: &str) -> (u16, Value) {
        let request: GradeRequest = match serde_json::from_str(body) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "rejecting unparsable request");
                return (400, json!({ "error": format!("invalid request body: {e}") }));
            },
        };
        let tool = request.tool.clone().unwrap_or_default();

        let outcome = catch_unwind(AssertUnwindSafe(|| self.grade(&request)))
            .unwrap_or_else(|panic| Err(GradeError::Internal(panic_message(panic.as_ref()))));
        http_response(outcome, &tool)
    }

    /// Grade and persist. A failed save is logged and does not affect the response.
    pub fn grade_and_record(
        &self,
        request: &GradeRequest,
        user: Option<&UserId>,
        sink: &dyn ResultSink,
    ) -> Result<GradeResponse> {
        let response = self.grade(request)?;
        let Some(user) = user else {
            return Ok(response);
        };

        let details = serde_json::to_value(&response).unwrap_or(Value::Null);
        let record = ResultRecord {
            user_id: user.clone(),
            test_type: request.tool.clone().unwrap_or_default(),
            score: response.score,
            total_points: response.total_expected_points,
            details,
        };
        if let Err(e) = sink.save(&record) {
            tracing::warn!(error = %e, %user, test_type = %record.test_type, "failed to save result");
        }
        Ok(response)
    }
}

/// Map a grading outcome to a status and body. Internal failures are logged
/// with their cause; the body only carries a fixed message.
fn http_response(outcome: Result<GradeResponse>, tool: &str) -> (u16, Value) {
    let error = match outcome.and_then(|response| {
        serde_json::to_value(&response).map_err(|e| GradeError::Internal(format!("serialize response: {e}")))
    }) {
        Ok(body) => return (200, body),
        Err(error) => error,
    };

    if error.is_bad_input() {
        tracing::warn!(error = %error, tool, "bad grading request");
        (error.status(), json!({ "error": error.to_string() }))
    } else {
        tracing::error!(error = %error, tool, "grading failed");
        (error.status(), json!({ "error": INTERNAL_ERROR_MESSAGE, "tool": tool }))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic while grading".to_string()
    }
}
