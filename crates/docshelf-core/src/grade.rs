//! Relevance grading policy for the fallback controller.
//!
//! A [`RelevanceGrader`] decides whether locally retrieved context is good
//! enough to answer a query. The controller takes the grader as an injected
//! policy; [`ThresholdGrader`] is the numeric default and the app crate adds
//! a model-judged grader.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::RetrievalResult;

/// Default minimum top score for [`ThresholdGrader`].
pub const DEFAULT_MIN_SCORE: f64 = 0.35;

/// Outcome of grading a retrieval result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Sufficient,
    Insufficient,
}

#[async_trait]
pub trait RelevanceGrader: Send + Sync {
    /// Short identifier used in logs and traces.
    fn name(&self) -> &str;

    async fn grade(&self, query: &str, result: &RetrievalResult) -> Result<Grade>;
}

/// Sufficient when the top hit scores at least `min_score`.
///
/// An empty result is always insufficient.
#[derive(Debug, Clone)]
pub struct ThresholdGrader {
    min_score: f64,
}

impl ThresholdGrader {
    pub fn new(min_score: f64) -> Result<Self> {
        if !min_score.is_finite() {
            return Err(Error::invalid(format!("min_score must be finite, got {}", min_score)));
        }
        Ok(Self { min_score })
    }

    pub fn min_score(&self) -> f64 {
        self.min_score
    }
}

impl Default for ThresholdGrader {
    fn default() -> Self {
        Self {
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

#[async_trait]
impl RelevanceGrader for ThresholdGrader {
    fn name(&self) -> &str {
        "threshold"
    }

    async fn grade(&self, _query: &str, result: &RetrievalResult) -> Result<Grade> {
        Ok(match result.top() {
            Some(hit) if hit.score >= self.min_score => Grade::Sufficient,
            _ => Grade::Insufficient,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HitSource, RetrievalHit};

    fn result(scores: &[f64]) -> RetrievalResult {
        RetrievalResult {
            hits: scores
                .iter()
                .map(|&score| RetrievalHit {
                    score,
                    source: HitSource::External {
                        title: String::new(),
                        url: String::new(),
                        snippet: String::new(),
                        provider: "test".to_string(),
                    },
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_empty_is_insufficient() {
        let g = ThresholdGrader::default();
        assert_eq!(g.grade("q", &result(&[])).await.unwrap(), Grade::Insufficient);
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        let g = ThresholdGrader::new(0.5).unwrap();
        assert_eq!(g.grade("q", &result(&[0.5, 0.1])).await.unwrap(), Grade::Sufficient);
        assert_eq!(g.grade("q", &result(&[0.49])).await.unwrap(), Grade::Insufficient);
    }

    #[test]
    fn test_rejects_non_finite() {
        assert!(ThresholdGrader::new(f64::NAN).is_err());
        assert!(ThresholdGrader::new(f64::INFINITY).is_err());
    }
}
