//! Model configuration and synthesis options.

use crate::error::{Result, TtsError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Auto-encoder section of `tts.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AeConfig {
    pub sample_rate: u32,
    pub base_chunk_size: usize,
}

/// Text-to-latent section of `tts.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    pub chunk_compress_factor: usize,
    pub latent_dim: usize,
}

/// Read-only scalar parameters of a loaded model set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ae: AeConfig,
    pub ttl: TtlConfig,
}

impl Config {
    pub fn new(
        sample_rate: u32,
        base_chunk_size: usize,
        chunk_compress_factor: usize,
        latent_dim: usize,
    ) -> Self {
        Self {
            ae: AeConfig {
                sample_rate,
                base_chunk_size,
            },
            ttl: TtlConfig {
                chunk_compress_factor,
                latent_dim,
            },
        }
    }

    /// Load and validate a `tts.json` document.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| TtsError::load(format!("config {}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| TtsError::load(format!("config {}: {}", path.display(), e)))?;
        config
            .validate()
            .map_err(|e| TtsError::load(format!("config {}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Check that every size is non-zero; latent sizing divides by them.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("ae.sample_rate", self.ae.sample_rate as usize),
            ("ae.base_chunk_size", self.ae.base_chunk_size),
            ("ttl.chunk_compress_factor", self.ttl.chunk_compress_factor),
            ("ttl.latent_dim", self.ttl.latent_dim),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(TtsError::invalid_input(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.ae.sample_rate
    }

    /// Number of waveform samples covered by one latent frame.
    pub fn chunk_size(&self) -> usize {
        self.ae.base_chunk_size * self.ttl.chunk_compress_factor
    }

    /// Channel count of the latent tensor.
    pub fn latent_channels(&self) -> usize {
        self.ttl.latent_dim * self.ttl.chunk_compress_factor
    }
}

/// File layout of a model directory.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub onnx_dir: PathBuf,
    pub use_gpu: bool,
}

impl RuntimeConfig {
    pub fn new(onnx_dir: impl Into<PathBuf>) -> Self {
        Self {
            onnx_dir: onnx_dir.into(),
            use_gpu: false,
        }
    }

    /// Build from `TTS_ONNX_DIR` (default `assets/onnx`) and `TTS_USE_GPU`.
    pub fn from_env() -> Self {
        let onnx_dir = std::env::var("TTS_ONNX_DIR").unwrap_or_else(|_| "assets/onnx".to_string());
        let use_gpu = std::env::var("TTS_USE_GPU")
            .map(|value| env_flag(&value))
            .unwrap_or(false);
        Self::new(onnx_dir).with_gpu(use_gpu)
    }

    pub fn with_gpu(mut self, use_gpu: bool) -> Self {
        self.use_gpu = use_gpu;
        self
    }

    pub fn config_path(&self) -> PathBuf {
        self.onnx_dir.join("tts.json")
    }

    pub fn symbol_table_path(&self) -> PathBuf {
        self.onnx_dir.join("unicode_indexer.json")
    }

    pub fn model_path(&self, file_name: &str) -> PathBuf {
        self.onnx_dir.join(file_name)
    }
}

fn env_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

/// Per-request synthesis parameters.
#[derive(Clone, Debug)]
pub struct SynthesisOptions {
    /// Number of denoising steps.
    pub total_step: usize,
    /// Speech speed multiplier; predicted durations are divided by it.
    pub speed: f32,
    /// Seconds of silence inserted between chunks of a long text.
    pub silence_duration: f32,
    /// Character budget of one chunk.
    pub max_chunk_len: usize,
    /// Fixed seed for the initial noise; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            total_step: 5,
            speed: 1.0,
            silence_duration: 0.3,
            max_chunk_len: 300,
            seed: None,
        }
    }
}

impl SynthesisOptions {
    pub fn with_total_step(mut self, total_step: usize) -> Self {
        self.total_step = total_step;
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_silence_duration(mut self, seconds: f32) -> Self {
        self.silence_duration = seconds;
        self
    }

    pub fn with_max_chunk_len(mut self, max_chunk_len: usize) -> Self {
        self.max_chunk_len = max_chunk_len;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.total_step == 0 {
            return Err(TtsError::invalid_input("total_step must be at least 1"));
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(TtsError::invalid_input(format!(
                "speed must be a positive number, got {}",
                self.speed
            )));
        }
        if !self.silence_duration.is_finite() || self.silence_duration < 0.0 {
            return Err(TtsError::invalid_input(format!(
                "silence_duration must be non-negative, got {}",
                self.silence_duration
            )));
        }
        if self.max_chunk_len == 0 {
            return Err(TtsError::invalid_input("max_chunk_len must be at least 1"));
        }
        Ok(())
    }
}
