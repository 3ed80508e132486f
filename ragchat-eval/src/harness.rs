//! Grading harness: one JSON request in, one JSON verdict out.
//!
//! Input is `{output, context: {vars, prompt}}`; output is
//! `{pass, score, reason, namedScores}` with scores rounded to two decimals.

use crate::error::Result;
use crate::scorer::{QualityScorer, QualityVerdict, SubScores, round2};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::{Read, Write};
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GradeContext {
    #[serde(default)]
    pub vars: Map<String, Value>,
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GradeRequest {
    /// The answer under test. Non-string values are graded as their JSON text.
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub context: GradeContext,
}

impl GradeRequest {
    pub fn answer(&self) -> String {
        match &self.output {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// The originating query: `context.prompt`, or `vars.query` when the
    /// prompt is empty.
    pub fn query(&self) -> &str {
        if !self.context.prompt.is_empty() {
            return &self.context.prompt;
        }
        self.context
            .vars
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResponse {
    pub pass: bool,
    pub score: f64,
    pub reason: String,
    #[serde(rename = "namedScores")]
    pub named_scores: SubScores,
}

impl From<QualityVerdict> for GradeResponse {
    fn from(verdict: QualityVerdict) -> Self {
        Self {
            pass: verdict.passes,
            score: round2(verdict.overall_score),
            reason: verdict.reason,
            named_scores: verdict.sub_scores.rounded(),
        }
    }
}

pub fn grade(scorer: &QualityScorer, request: &GradeRequest) -> GradeResponse {
    let answer = request.answer();
    let verdict = scorer.score(&answer, request.query());
    debug!(
        passes = verdict.passes,
        overall = verdict.overall_score,
        reason = %verdict.reason,
        "Graded answer"
    );
    verdict.into()
}

/// Read one grade request from `reader` and write the response as a single
/// JSON line to `writer`.
pub fn run_stdio<R: Read, W: Write>(
    scorer: &QualityScorer,
    reader: R,
    mut writer: W,
) -> Result<GradeResponse> {
    let request: GradeRequest = serde_json::from_reader(reader)?;
    let response = grade(scorer, &request);
    serde_json::to_writer(&mut writer, &response)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(response)
}
