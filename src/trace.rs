//! Intermediate tensors of one synthesis call, for offline inspection.

use crate::error::{Result, TtsError};
use ndarray::{Array1, Array2, Array3};
use ndarray_npy::{NpzWriter, WriteNpyExt};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

/// Tensors captured while running [`crate::TextToSpeech::synthesize_batch_traced`].
#[derive(Clone, Debug, Default)]
pub struct SynthesisTrace {
    pub text_ids: Array2<i64>,
    pub text_mask: Array3<f32>,
    /// Predicted durations in seconds, after speed scaling.
    pub duration: Array1<f32>,
    pub text_emb: Array3<f32>,
    pub initial_latent: Array3<f32>,
    pub latent_mask: Array3<f32>,
    pub final_latent: Array3<f32>,
    /// Vocoder output, `[batch, samples]`.
    pub wav: Array2<f32>,
}

fn write_error(path: &Path, err: impl std::fmt::Display) -> TtsError {
    TtsError::Io(std::io::Error::other(format!(
        "failed to write {path:?}: {err}"
    )))
}

impl SynthesisTrace {
    /// Write the trace to `output_dir` as numbered `.npz`/`.npy` files.
    pub fn save(&self, output_dir: &Path) -> Result<()> {
        fs::create_dir_all(output_dir)?;
        info!("Saving trace tensors to {:?}", output_dir);

        let inputs_path = output_dir.join("00_inputs.npz");
        let mut inputs = NpzWriter::new(File::create(&inputs_path)?);
        inputs
            .add_array("text_ids.npy", &self.text_ids)
            .map_err(|e| write_error(&inputs_path, e))?;
        inputs
            .add_array("text_mask.npy", &self.text_mask)
            .map_err(|e| write_error(&inputs_path, e))?;
        inputs.finish().map_err(|e| write_error(&inputs_path, e))?;

        write_npy(output_dir, "01_duration.npy", |w| self.duration.write_npy(w))?;
        write_npy(output_dir, "02_text_emb.npy", |w| self.text_emb.write_npy(w))?;

        let latent_path = output_dir.join("03_latent.npz");
        let mut latent = NpzWriter::new(File::create(&latent_path)?);
        latent
            .add_array("initial_latent.npy", &self.initial_latent)
            .map_err(|e| write_error(&latent_path, e))?;
        latent
            .add_array("latent_mask.npy", &self.latent_mask)
            .map_err(|e| write_error(&latent_path, e))?;
        latent
            .add_array("final_latent.npy", &self.final_latent)
            .map_err(|e| write_error(&latent_path, e))?;
        latent.finish().map_err(|e| write_error(&latent_path, e))?;

        write_npy(output_dir, "04_wav.npy", |w| self.wav.write_npy(w))?;
        Ok(())
    }
}

fn write_npy<E, F>(output_dir: &Path, name: &str, write: F) -> Result<()>
where
    E: std::fmt::Display,
    F: FnOnce(BufWriter<File>) -> std::result::Result<(), E>,
{
    let path = output_dir.join(name);
    let file = BufWriter::new(File::create(&path)?);
    write(file).map_err(|e| write_error(&path, e))
}
