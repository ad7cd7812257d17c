//! Structured error type for public API surfaces.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TtsError {
    /// Empty batch, empty text, or out-of-range synthesis options.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Number of texts ({texts}) must match number of style vectors ({styles})")]
    BatchMismatch { texts: usize, styles: usize },

    /// The single-text path only accepts a style with one voice.
    #[error("Single speaker synthesis only supports a single style, got a batch of {0}")]
    UnsupportedBatch(usize),

    /// A style, config, symbol table or model file is missing or unparseable.
    #[error("Failed to load {0}")]
    Load(String),

    /// An inference call failed or returned a tensor of unexpected shape.
    #[error("Inference engine error: {0}")]
    Engine(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TtsError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        TtsError::InvalidInput(message.into())
    }

    pub fn load(message: impl Into<String>) -> Self {
        TtsError::Load(message.into())
    }

    pub fn engine(message: impl Into<String>) -> Self {
        TtsError::Engine(message.into())
    }
}

pub type Result<T> = std::result::Result<T, TtsError>;
