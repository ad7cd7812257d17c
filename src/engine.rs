//! Inference engine seam.
//!
//! The pipeline drives four model stages through [`InferenceEngine`]. Every
//! call takes ownership of freshly built input tensors; nothing is pooled or
//! reused across calls.

use crate::error::{Result, TtsError};
use ndarray::{Array, ArrayD, Dimension};
use std::collections::HashMap;
use std::fmt;

/// One of the four model stages of a synthesis call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    DurationPredictor,
    TextEncoder,
    VectorEstimator,
    Vocoder,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::DurationPredictor,
        Stage::TextEncoder,
        Stage::VectorEstimator,
        Stage::Vocoder,
    ];

    /// Input tensor names, in the order the pipeline supplies them.
    pub fn input_names(self) -> &'static [&'static str] {
        match self {
            Stage::DurationPredictor => &["text_ids", "style_dp", "text_mask"],
            Stage::TextEncoder => &["text_ids", "style_ttl", "text_mask"],
            Stage::VectorEstimator => &[
                "noisy_latent",
                "text_emb",
                "style_ttl",
                "latent_mask",
                "text_mask",
                "current_step",
                "total_step",
            ],
            Stage::Vocoder => &["latent"],
        }
    }

    pub fn output_name(self) -> &'static str {
        match self {
            Stage::DurationPredictor => "duration",
            Stage::TextEncoder => "text_emb",
            Stage::VectorEstimator => "denoised_latent",
            Stage::Vocoder => "wav_tts",
        }
    }

    /// Model file name inside the model directory.
    pub fn model_file(self) -> &'static str {
        match self {
            Stage::DurationPredictor => "duration_predictor.onnx",
            Stage::TextEncoder => "text_encoder.onnx",
            Stage::VectorEstimator => "vector_estimator.onnx",
            Stage::Vocoder => "vocoder.onnx",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DurationPredictor => "duration predictor",
            Stage::TextEncoder => "text encoder",
            Stage::VectorEstimator => "vector estimator",
            Stage::Vocoder => "vocoder",
        };
        f.write_str(name)
    }
}

/// An owned tensor crossing the engine boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum Tensor {
    Float(ArrayD<f32>),
    Int(ArrayD<i64>),
}

impl Tensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            Tensor::Float(array) => array.shape(),
            Tensor::Int(array) => array.shape(),
        }
    }

    pub fn into_float(self) -> Result<ArrayD<f32>> {
        match self {
            Tensor::Float(array) => Ok(array),
            Tensor::Int(array) => Err(TtsError::engine(format!(
                "expected a float tensor, got int64 with shape {:?}",
                array.shape()
            ))),
        }
    }
}

impl<D: Dimension> From<Array<f32, D>> for Tensor {
    fn from(array: Array<f32, D>) -> Self {
        Tensor::Float(array.into_dyn())
    }
}

impl<D: Dimension> From<Array<i64, D>> for Tensor {
    fn from(array: Array<i64, D>) -> Self {
        Tensor::Int(array.into_dyn())
    }
}

/// Named inputs of one stage call, moved into the engine.
pub type TensorInputs = Vec<(&'static str, Tensor)>;

/// Named outputs of one stage call.
pub type TensorOutputs = HashMap<String, Tensor>;

/// Synchronous executor of the four model stages.
///
/// Implementations must return the stage's [`Stage::output_name`] tensor.
/// Output contents may be non-deterministic, shapes may not.
pub trait InferenceEngine: Send {
    fn run(&mut self, stage: Stage, inputs: TensorInputs) -> Result<TensorOutputs>;
}

/// Remove the stage's output tensor from `outputs` as a float array.
pub(crate) fn take_output(stage: Stage, mut outputs: TensorOutputs) -> Result<ArrayD<f32>> {
    let name = stage.output_name();
    outputs
        .remove(name)
        .ok_or_else(|| TtsError::engine(format!("{stage} did not return `{name}`")))?
        .into_float()
}
