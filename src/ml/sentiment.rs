use crate::error::{RankError, RankResult};
use crate::types::{SentimentLabel, SentimentResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

/// Tokens after a negator that can still be flipped by it
const NEGATION_WINDOW: usize = 3;

/// Upper bound for stacked intensifiers on a single sentiment token
const MAX_BOOST: f64 = 4.0;

/// Scores review text. Implementations must be pure and thread safe.
pub trait SentimentScorer: Send + Sync {
    /// Score non-empty text into a bounded score and a label
    fn predict_sentiment(&self, text: &str) -> SentimentResult;

    /// Name of the loaded model
    fn model_name(&self) -> &str;
}

fn default_neutral_threshold() -> f64 {
    0.2
}

/// On-disk sentiment model artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub bias: f64,
    #[serde(default = "default_neutral_threshold")]
    pub neutral_threshold: f64,
    /// Token polarity weights
    pub weights: HashMap<String, f64>,
    #[serde(default)]
    pub negators: Vec<String>,
    /// Multipliers applied to the next weighted token
    #[serde(default)]
    pub intensifiers: HashMap<String, f64>,
}

impl ModelArtifact {
    /// Check the artifact before it is turned into a model
    pub fn validate(&self) -> RankResult<()> {
        if self.weights.is_empty() {
            return Err(RankError::ModelError(format!(
                "Model {} has an empty vocabulary",
                self.name
            )));
        }

        if !self.bias.is_finite() {
            return Err(RankError::ModelError("Model bias must be finite".to_string()));
        }

        if !self.neutral_threshold.is_finite() || !(0.0..1.0).contains(&self.neutral_threshold) {
            return Err(RankError::ModelError(
                "Model neutral_threshold must be in [0, 1)".to_string(),
            ));
        }

        if let Some((token, _)) = self
            .weights
            .iter()
            .chain(self.intensifiers.iter())
            .find(|(_, w)| !w.is_finite())
        {
            return Err(RankError::ModelError(format!(
                "Model weight for '{}' is not finite",
                token
            )));
        }

        Ok(())
    }
}

/// Lexicon-based sentiment model with negation and intensifier handling.
///
/// Scores are `tanh(bias + sum / sqrt(hits))` and therefore always lie in
/// [-1.0, 1.0]. Text without any known token scores `tanh(bias)`.
#[derive(Debug, Clone)]
pub struct SentimentModel {
    name: String,
    version: String,
    bias: f64,
    neutral_threshold: f64,
    weights: HashMap<String, f64>,
    negators: HashSet<String>,
    intensifiers: HashMap<String, f64>,
    token_pattern: Regex,
}

impl SentimentModel {
    /// Build a model from a parsed artifact
    pub fn from_artifact(artifact: ModelArtifact) -> RankResult<Self> {
        artifact.validate()?;

        let token_pattern = Regex::new(r"[\p{L}\p{N}]+(?:'\p{L}+)?")
            .map_err(|e| RankError::ModelError(format!("Failed to build tokenizer: {}", e)))?;

        let lower = |m: HashMap<String, f64>| -> HashMap<String, f64> {
            m.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect()
        };

        Ok(Self {
            name: artifact.name,
            version: artifact.version,
            bias: artifact.bias,
            neutral_threshold: artifact.neutral_threshold,
            weights: lower(artifact.weights),
            negators: artifact.negators.into_iter().map(|n| n.to_lowercase()).collect(),
            intensifiers: lower(artifact.intensifiers),
            token_pattern,
        })
    }

    /// Parse a JSON artifact and build the model
    pub fn from_json(json: &str) -> RankResult<Self> {
        let artifact: ModelArtifact = serde_json::from_str(json)
            .map_err(|e| RankError::ModelError(format!("Invalid model artifact: {}", e)))?;
        Self::from_artifact(artifact)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn vocabulary_size(&self) -> usize {
        self.weights.len()
    }

    /// Raw polarity before squashing
    fn raw_score(&self, text: &str) -> f64 {
        let normalized = text.replace('\u{2019}', "'").to_lowercase();

        let mut sum = 0.0;
        let mut hits = 0usize;
        let mut negation_left = 0usize;
        let mut boost = 1.0;

        for token in self.token_pattern.find_iter(&normalized) {
            let token = token.as_str();

            if self.negators.contains(token) {
                negation_left = NEGATION_WINDOW;
                continue;
            }

            if let Some(multiplier) = self.intensifiers.get(token) {
                boost = (boost * multiplier).clamp(-MAX_BOOST, MAX_BOOST);
                continue;
            }

            match self.weights.get(token) {
                Some(weight) => {
                    let mut value = weight * boost;
                    if negation_left > 0 {
                        value = -value;
                        negation_left = 0;
                    }
                    sum += value;
                    hits += 1;
                    boost = 1.0;
                }
                None => {
                    negation_left = negation_left.saturating_sub(1);
                    boost = 1.0;
                }
            }
        }

        if !sum.is_finite() {
            debug!("Discarding non-finite token sum");
            return self.bias;
        }
        self.bias + sum / (hits.max(1) as f64).sqrt()
    }

    /// Map a bounded score to its label
    pub fn label_for(&self, score: f64) -> SentimentLabel {
        if score >= self.neutral_threshold {
            SentimentLabel::Positive
        } else if score <= -self.neutral_threshold {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

impl SentimentScorer for SentimentModel {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    fn predict_sentiment(&self, text: &str) -> SentimentResult {
        let score = self.raw_score(text).tanh();
        let label = self.label_for(score);
        debug!("Sentiment score: {:.4} ({})", score, label);
        SentimentResult { score, label }
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}
