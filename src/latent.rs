//! Initial noise latents sized from predicted durations.

use crate::config::Config;
use crate::preprocessing::{latent_length, latent_mask, wav_lengths};
use ndarray::Array3;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Working buffer of the denoising loop together with its validity mask.
#[derive(Clone, Debug)]
pub struct LatentState {
    /// `[B, latent_dim * compress_factor, T]`
    pub latent: Array3<f32>,
    /// `[B, 1, T]`
    pub mask: Array3<f32>,
}

impl LatentState {
    /// Padded latent time extent shared by every batch item.
    pub fn time_len(&self) -> usize {
        self.latent.shape()[2]
    }
}

/// Padded latent length for a batch of durations (seconds).
pub fn padded_latent_len(durations: &[f32], config: &Config) -> usize {
    let wav_len_max = wav_lengths(durations, config.sample_rate())
        .into_iter()
        .max()
        .unwrap_or(0);
    latent_length(wav_len_max, config.chunk_size())
}

/// Draw standard-normal noise for each item and zero the padded frames.
pub fn sample_noisy_latent<R: Rng + ?Sized>(
    durations: &[f32],
    config: &Config,
    rng: &mut R,
) -> LatentState {
    let chunk_size = config.chunk_size();
    let lengths = wav_lengths(durations, config.sample_rate());
    let latent_len = padded_latent_len(durations, config);

    let shape = (durations.len(), config.latent_channels(), latent_len);
    let mut latent = Array3::<f32>::from_shape_simple_fn(shape, || StandardNormal.sample(rng));
    let mask = latent_mask(&lengths, chunk_size, latent_len);
    latent *= &mask;

    LatentState { latent, mask }
}
