//! Pluggable face and liveness evaluators.
//!
//! Face matching and liveness classification are opaque: an evaluator receives the sample and
//! returns a confidence plus whether it clears the evaluator's threshold. Production deployments
//! plug in a model-backed implementation; the static evaluators serve tests and simulations.

use async_trait::async_trait;
use rollcall_core::{FaceSample, LivenessFrame};
use serde::Serialize;

use crate::error::EvaluatorError;

/// Confidence returned by an evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FactorScore {
    pub verified: bool,
    pub confidence: f64,
}

impl FactorScore {
    /// Score a confidence against a threshold (inclusive).
    pub fn against(confidence: f64, threshold: f64) -> Self {
        Self {
            verified: confidence >= threshold,
            confidence,
        }
    }
}

/// Compares a face sample with the user's enrolled face.
#[async_trait]
pub trait FaceEvaluator: Send + Sync {
    async fn evaluate(&self, user_id: &str, sample: &FaceSample) -> Result<FactorScore, EvaluatorError>;
}

/// Decides whether a frame sequence shows a live person.
#[async_trait]
pub trait LivenessEvaluator: Send + Sync {
    async fn evaluate(&self, frames: &[LivenessFrame]) -> Result<FactorScore, EvaluatorError>;
}

/// Face evaluator answering with a fixed confidence.
#[derive(Debug, Clone)]
pub struct StaticFaceEvaluator {
    confidence: f64,
    threshold: f64,
}

impl StaticFaceEvaluator {
    pub fn new(confidence: f64, threshold: f64) -> Self {
        Self { confidence, threshold }
    }
}

#[async_trait]
impl FaceEvaluator for StaticFaceEvaluator {
    async fn evaluate(&self, _user_id: &str, sample: &FaceSample) -> Result<FactorScore, EvaluatorError> {
        if sample.image.is_empty() {
            return Err(EvaluatorError::InvalidInput("empty face image".into()));
        }
        Ok(FactorScore::against(self.confidence, self.threshold))
    }
}

/// Liveness evaluator answering with a fixed confidence.
#[derive(Debug, Clone)]
pub struct StaticLivenessEvaluator {
    confidence: f64,
    threshold: f64,
}

impl StaticLivenessEvaluator {
    pub fn new(confidence: f64, threshold: f64) -> Self {
        Self { confidence, threshold }
    }
}

#[async_trait]
impl LivenessEvaluator for StaticLivenessEvaluator {
    async fn evaluate(&self, frames: &[LivenessFrame]) -> Result<FactorScore, EvaluatorError> {
        if frames.is_empty() {
            return Err(EvaluatorError::InvalidInput("no liveness frames".into()));
        }
        Ok(FactorScore::against(self.confidence, self.threshold))
    }
}

/// Stand-in for a deployment without a model. Every evaluation is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvaluator;

#[async_trait]
impl FaceEvaluator for NoEvaluator {
    async fn evaluate(&self, _user_id: &str, _sample: &FaceSample) -> Result<FactorScore, EvaluatorError> {
        Err(EvaluatorError::Unavailable("no face evaluator configured".into()))
    }
}

#[async_trait]
impl LivenessEvaluator for NoEvaluator {
    async fn evaluate(&self, _frames: &[LivenessFrame]) -> Result<FactorScore, EvaluatorError> {
        Err(EvaluatorError::Unavailable("no liveness evaluator configured".into()))
    }
}
