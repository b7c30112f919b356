//! Two-stage handwriting analysis: a binary gate decides whether the upload
//! is handwriting, and only then the trait model scores it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::{ConfidenceMode, ModelConfig};

pub mod model;
pub mod preprocess;
mod resample;

pub use model::{Model, OnnxModel};
pub use preprocess::{preprocess, ImageTensor};

/// Gate outputs strictly above this are handwriting.
pub const GATE_THRESHOLD: f32 = 0.5;

/// Reported confidence when [`ConfidenceMode::Fixed`] is configured.
pub const FIXED_CONFIDENCE: f64 = 95.0;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("image does not appear to be handwriting (p = {probability:.3})")]
    NotHandwriting { probability: f32 },

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
}

/// The five scored personality dimensions, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonalityTrait {
    Openness,
    Conscientiousness,
    Extraversion,
    Agreeableness,
    Neuroticism,
}

impl PersonalityTrait {
    pub const ALL: [PersonalityTrait; 5] = [
        PersonalityTrait::Openness,
        PersonalityTrait::Conscientiousness,
        PersonalityTrait::Extraversion,
        PersonalityTrait::Agreeableness,
        PersonalityTrait::Neuroticism,
    ];
}

/// Trait name to score in `[0, 1]`.
pub type TraitScores = BTreeMap<PersonalityTrait, f32>;

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub traits: TraitScores,
    pub confidence: f64,
    #[serde(skip)]
    pub gate_probability: f32,
}

/// Gate and trait models plus the confidence policy. Either model may be
/// absent when its artifact failed to load; predictions then fail with
/// [`InferenceError::ModelUnavailable`].
pub struct Pipeline {
    gate: Option<Arc<dyn Model>>,
    traits: Option<Arc<dyn Model>>,
    confidence: ConfidenceMode,
}

impl Pipeline {
    pub fn new(
        gate: Option<Arc<dyn Model>>,
        traits: Option<Arc<dyn Model>>,
        confidence: ConfidenceMode,
    ) -> Self {
        Self {
            gate,
            traits,
            confidence,
        }
    }

    /// Load both artifacts. Failures are logged and leave the stage empty.
    pub fn load(cfg: &ModelConfig, confidence: ConfidenceMode) -> Self {
        let gate = load_model("gate", &cfg.gate_path);
        let traits = load_model("traits", &cfg.traits_path);
        Self::new(gate, traits, confidence)
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_some() && self.traits.is_some()
    }

    /// Decode, normalize and classify raw upload bytes.
    pub fn run(&self, bytes: &[u8]) -> Result<Prediction, InferenceError> {
        if !self.is_ready() {
            return Err(InferenceError::ModelUnavailable("models not loaded".into()));
        }
        let tensor = preprocess(bytes)?;
        self.classify(&tensor)
    }

    /// Gate, then score. The trait model is never invoked for a rejected image.
    pub fn classify(&self, tensor: &ImageTensor) -> Result<Prediction, InferenceError> {
        let gate = self
            .gate
            .as_ref()
            .ok_or_else(|| InferenceError::ModelUnavailable("gate model not loaded".into()))?;
        let traits = self
            .traits
            .as_ref()
            .ok_or_else(|| InferenceError::ModelUnavailable("trait model not loaded".into()))?;

        let probability = gate_probability(gate.as_ref(), tensor)?;
        if probability <= GATE_THRESHOLD {
            warn!(probability, "gate rejected upload");
            return Err(InferenceError::NotHandwriting { probability });
        }
        debug!(probability, "gate accepted upload");

        let scores = score_traits(traits.as_ref(), tensor)?;
        let confidence = match self.confidence {
            ConfidenceMode::Fixed => FIXED_CONFIDENCE,
            ConfidenceMode::Gate => (probability as f64 * 10_000.0).round() / 100.0,
        };

        Ok(Prediction {
            traits: scores,
            confidence,
            gate_probability: probability,
        })
    }
}

fn load_model(stage: &str, path: &str) -> Option<Arc<dyn Model>> {
    match OnnxModel::load(path) {
        Ok(m) => Some(Arc::new(m) as Arc<dyn Model>),
        Err(e) => {
            error!(stage, path, error = %e, "failed to load model");
            None
        }
    }
}

fn gate_probability(gate: &dyn Model, tensor: &ImageTensor) -> Result<f32, InferenceError> {
    let out = gate
        .predict(tensor)
        .map_err(|e| InferenceError::ModelUnavailable(format!("gate: {e}")))?;
    match out.first() {
        Some(p) if p.is_finite() => Ok(*p),
        Some(p) => Err(InferenceError::ModelUnavailable(format!(
            "gate produced non-finite output {p}"
        ))),
        None => Err(InferenceError::ModelUnavailable(
            "gate produced no output".into(),
        )),
    }
}

fn score_traits(model: &dyn Model, tensor: &ImageTensor) -> Result<TraitScores, InferenceError> {
    let out = model
        .predict(tensor)
        .map_err(|e| InferenceError::ModelUnavailable(format!("traits: {e}")))?;
    if out.len() != PersonalityTrait::ALL.len() {
        return Err(InferenceError::ModelUnavailable(format!(
            "trait model produced {} outputs, expected {}",
            out.len(),
            PersonalityTrait::ALL.len()
        )));
    }
    if let Some(bad) = out.iter().find(|v| !v.is_finite()) {
        return Err(InferenceError::ModelUnavailable(format!(
            "trait model produced non-finite output {bad}"
        )));
    }

    Ok(PersonalityTrait::ALL
        .iter()
        .zip(out)
        .map(|(t, v)| (*t, v.clamp(0.0, 1.0)))
        .collect())
}
