//! Session construction and synthesis results.

use crate::config::{Config, RuntimeConfig};
use crate::error::Result;
use crate::vocab::SymbolTable;
use tracing::info;

#[cfg(feature = "onnx")]
use crate::onnx::OnnxEngine;
#[cfg(feature = "onnx")]
use crate::pipeline::TextToSpeech;

/// Output of one synthesis call.
///
/// `wav` holds `batch_size` equally sized segments back to back. Each item's
/// audible part is the first `round(duration[i] * sample_rate)` samples of
/// its segment.
#[derive(Clone, Debug)]
pub struct SynthesisResult {
    pub wav: Vec<f32>,
    /// Per-item duration in seconds.
    pub duration: Vec<f32>,
    pub sample_rate: u32,
    pub batch_size: usize,
}

impl SynthesisResult {
    pub fn new(wav: Vec<f32>, duration: Vec<f32>, sample_rate: u32) -> Self {
        let batch_size = duration.len();
        Self {
            wav,
            duration,
            sample_rate,
            batch_size,
        }
    }

    /// Samples per batch item in `wav`.
    pub fn segment_len(&self) -> usize {
        if self.batch_size == 0 {
            0
        } else {
            self.wav.len() / self.batch_size
        }
    }

    /// Audio of item `index`, trimmed to its duration.
    pub fn item(&self, index: usize) -> Option<&[f32]> {
        let duration = *self.duration.get(index)?;
        let segment = self.segment_len();
        let start = index * segment;
        let len = item_len(duration, self.sample_rate).min(segment);
        self.wav.get(start..start + len)
    }

    pub fn items(&self) -> Vec<&[f32]> {
        (0..self.batch_size).filter_map(|i| self.item(i)).collect()
    }

    /// Sum of the per-item durations, in seconds.
    pub fn total_duration(&self) -> f32 {
        self.duration.iter().sum()
    }
}

/// Number of samples covering `duration` seconds.
pub(crate) fn item_len(duration: f32, sample_rate: u32) -> usize {
    (duration.max(0.0) * sample_rate as f32).round() as usize
}

/// Load the model config and symbol table named by `runtime`.
pub fn load_assets(runtime: &RuntimeConfig) -> Result<(Config, SymbolTable)> {
    let config = Config::load(&runtime.config_path())?;
    let symbols = SymbolTable::load(&runtime.symbol_table_path())?;
    info!(
        sample_rate = config.sample_rate(),
        chunk_size = config.chunk_size(),
        latent_channels = config.latent_channels(),
        symbols = symbols.len(),
        "Loaded model config"
    );
    Ok((config, symbols))
}

/// Build a synthesis session backed by ONNX Runtime.
#[cfg(feature = "onnx")]
pub fn load(runtime: &RuntimeConfig) -> Result<TextToSpeech> {
    let (config, symbols) = load_assets(runtime)?;
    let engine = OnnxEngine::load(runtime)?;
    TextToSpeech::new(config, symbols, engine)
}
