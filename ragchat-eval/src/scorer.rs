//! Heuristic answer-quality scorer.
//!
//! Four lexical sub-scores (relevance, completeness, conciseness, factuality)
//! are averaged into an overall score. Nothing here checks facts against
//! ground truth; the scores are cheap proxies for regression tracking.

use crate::error::{EvalError, Result};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Word-count bands for the completeness sub-score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletenessBands {
    pub short_below: usize,
    pub short_score: f64,
    pub brief_below: usize,
    pub brief_score: f64,
    pub full_below: usize,
    pub full_score: f64,
    /// Score for answers at or above `full_below` words.
    pub verbose_score: f64,
}

impl Default for CompletenessBands {
    fn default() -> Self {
        Self {
            short_below: 10,
            short_score: 0.3,
            brief_below: 50,
            brief_score: 0.6,
            full_below: 200,
            full_score: 1.0,
            verbose_score: 0.8,
        }
    }
}

/// Marker phrases and scores for the factuality sub-score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactualityRules {
    /// Phrases that admit uncertainty. Any match scores `uncertain_score`.
    pub uncertainty_markers: Vec<String>,
    /// Citation-like phrases that are suspicious when the answer is off topic.
    pub fabrication_markers: Vec<String>,
    pub uncertain_score: f64,
    pub suspicious_score: f64,
    pub neutral_score: f64,
    /// Relevance below which a fabrication marker counts as suspicious.
    pub suspicious_relevance_below: f64,
}

impl Default for FactualityRules {
    fn default() -> Self {
        Self {
            uncertainty_markers: [
                "i don't know",
                "i'm not sure",
                "i cannot",
                "no information",
                "unclear",
                "uncertain",
                "maybe",
                "possibly",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            fabrication_markers: [
                "based on my knowledge",
                "as far as i know",
                "i believe",
                "the document states",
                "according to",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            uncertain_score: 1.0,
            suspicious_score: 0.3,
            neutral_score: 0.7,
            suspicious_relevance_below: 0.3,
        }
    }
}

/// Tunable thresholds for [`QualityScorer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Multiplier applied to the raw keyword overlap before capping at 1.0.
    pub relevance_scale: f64,
    pub completeness: CompletenessBands,
    pub factuality: FactualityRules,
    /// Minimum overall score for a passing verdict.
    pub pass_threshold: f64,
    /// Sub-scores below this are listed in the verdict reason.
    pub weak_below: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            relevance_scale: 2.0,
            completeness: CompletenessBands::default(),
            factuality: FactualityRules::default(),
            pass_threshold: 0.6,
            weak_below: 0.5,
        }
    }
}

impl ScorerConfig {
    /// Load scorer settings: defaults, then `path` (TOML, or JSON when the
    /// extension is `.json`), then `RAGCHAT_SCORER_` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(ScorerConfig::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(EvalError::InvalidInput(format!(
                    "Scorer config not found: {}",
                    path.display()
                )));
            }
            let is_json = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            figment = if is_json {
                figment.merge(Json::file(path))
            } else {
                figment.merge(Toml::file(path))
            };
        }
        figment = figment.merge(Env::prefixed("RAGCHAT_SCORER_").split("__"));
        figment.extract().map_err(|e| EvalError::Config(Box::new(e)))
    }
}

/// The four named sub-scores, serialized in their fixed reporting order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub relevance: f64,
    pub completeness: f64,
    pub conciseness: f64,
    pub factuality: f64,
}

impl SubScores {
    pub fn named(&self) -> [(&'static str, f64); 4] {
        [
            ("relevance", self.relevance),
            ("completeness", self.completeness),
            ("conciseness", self.conciseness),
            ("factuality", self.factuality),
        ]
    }

    pub fn mean(&self) -> f64 {
        self.named().iter().map(|(_, v)| v).sum::<f64>() / 4.0
    }

    /// Copy with every score rounded to two decimals.
    pub fn rounded(&self) -> Self {
        Self {
            relevance: round2(self.relevance),
            completeness: round2(self.completeness),
            conciseness: round2(self.conciseness),
            factuality: round2(self.factuality),
        }
    }
}

/// Outcome of grading one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub passes: bool,
    pub overall_score: f64,
    pub sub_scores: SubScores,
    pub reason: String,
}

pub const EMPTY_RESPONSE_REASON: &str = "Empty response";
pub const MEETS_STANDARDS_REASON: &str = "Response meets quality standards";

/// Deterministic, side-effect-free answer grader.
#[derive(Debug, Clone)]
pub struct QualityScorer {
    config: ScorerConfig,
    word: Regex,
}

impl QualityScorer {
    pub fn new(mut config: ScorerConfig) -> Result<Self> {
        // Answers are matched lowercased, so markers are too.
        for marker in config
            .factuality
            .uncertainty_markers
            .iter_mut()
            .chain(config.factuality.fabrication_markers.iter_mut())
        {
            *marker = marker.to_lowercase();
        }
        Ok(Self {
            config,
            word: Regex::new(r"\w+")?,
        })
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Grade `answer` as a response to `query`.
    pub fn score(&self, answer: &str, query: &str) -> QualityVerdict {
        if answer.trim().is_empty() {
            return QualityVerdict {
                passes: false,
                overall_score: 0.0,
                sub_scores: SubScores::default(),
                reason: EMPTY_RESPONSE_REASON.to_string(),
            };
        }

        let relevance = self.relevance_score(answer, query);
        let sub_scores = SubScores {
            relevance,
            completeness: self.completeness_score(answer),
            conciseness: conciseness_score(answer),
            factuality: self.factuality_score(answer, relevance),
        };
        let overall_score = sub_scores.mean();

        let weak: Vec<&str> = sub_scores
            .named()
            .into_iter()
            .filter(|(_, v)| *v < self.config.weak_below)
            .map(|(name, _)| name)
            .collect();
        let reason = if weak.is_empty() {
            MEETS_STANDARDS_REASON.to_string()
        } else {
            format!("Quality issues in: {}", weak.join(", "))
        };

        QualityVerdict {
            passes: overall_score >= self.config.pass_threshold,
            overall_score,
            sub_scores,
            reason,
        }
    }

    /// Scaled overlap of the query's lowercase word set with the answer's,
    /// capped at 1.0. An empty query scores 0.
    pub fn relevance_score(&self, answer: &str, query: &str) -> f64 {
        let query_words = self.word_set(query);
        let answer_words = self.word_set(answer);
        let overlap = query_words.intersection(&answer_words).count() as f64
            / query_words.len().max(1) as f64;
        (overlap * self.config.relevance_scale).min(1.0)
    }

    pub fn completeness_score(&self, answer: &str) -> f64 {
        let bands = &self.config.completeness;
        let words = answer.split_whitespace().count();
        if words < bands.short_below {
            bands.short_score
        } else if words < bands.brief_below {
            bands.brief_score
        } else if words < bands.full_below {
            bands.full_score
        } else {
            bands.verbose_score
        }
    }

    /// Uncertainty wins over everything; a fabrication marker only matters
    /// when `relevance` is low.
    pub fn factuality_score(&self, answer: &str, relevance: f64) -> f64 {
        let rules = &self.config.factuality;
        let lowered = answer.to_lowercase();
        let contains_any = |markers: &[String]| markers.iter().any(|m| lowered.contains(m.as_str()));

        if contains_any(&rules.uncertainty_markers) {
            rules.uncertain_score
        } else if contains_any(&rules.fabrication_markers)
            && relevance < rules.suspicious_relevance_below
        {
            rules.suspicious_score
        } else {
            rules.neutral_score
        }
    }

    fn word_set(&self, text: &str) -> HashSet<String> {
        self.word
            .find_iter(&text.to_lowercase())
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

/// Distinct lowercase whitespace tokens over total tokens.
pub fn conciseness_score(answer: &str) -> f64 {
    let lowered = answer.to_lowercase();
    let total = lowered.split_whitespace().count();
    let unique: HashSet<&str> = lowered.split_whitespace().collect();
    unique.len() as f64 / total.max(1) as f64
}

/// Round to two decimals, ties to even.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
