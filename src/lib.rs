//! Supertonic TTS Inference Library
//!
//! Orchestrates a four-stage text-to-speech model (duration predictor, text
//! encoder, iterative vector estimator, vocoder) behind a pluggable
//! [`InferenceEngine`]. The ONNX Runtime engine lives behind the `onnx` feature;
//! the HTTP server binary behind `server`.

mod audio;
pub mod chunk;
pub mod config;
pub mod engine;
pub mod error;
pub mod latent;
pub mod normalize;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pipeline;
pub mod preprocessing;
pub mod runtime;
pub mod service;
pub mod trace;
pub mod vocab;
pub mod voice;

pub use audio::{encode_wav, output_file_name, sanitize_filename, save_wav};
pub use chunk::chunk_text;
pub use config::{Config, RuntimeConfig, SynthesisOptions};
pub use engine::{InferenceEngine, Stage, Tensor, TensorInputs, TensorOutputs};
pub use error::{Result, TtsError};
pub use normalize::{normalize, NormalizedText};
#[cfg(feature = "onnx")]
pub use onnx::OnnxEngine;
pub use pipeline::TextToSpeech;
pub use preprocessing::length_to_mask;
#[cfg(feature = "onnx")]
pub use runtime::load;
pub use runtime::{load_assets, SynthesisResult};
pub use service::{package_audio, run_job, AudioResponse, OneOrMany, TtsJob, TtsRequest};
pub use trace::SynthesisTrace;
pub use vocab::{EncodedBatch, SymbolTable};
pub use voice::VoiceStyle;
