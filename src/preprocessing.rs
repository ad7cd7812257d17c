//! Padding and mask construction for batched inference inputs.

use ndarray::{Array2, Array3};

/// Build a `[B, 1, max_len]` mask with 1.0 at valid positions.
///
/// `max_len` defaults to the longest length. Lengths beyond `max_len` are
/// clipped to it.
pub fn length_to_mask(lengths: &[usize], max_len: Option<usize>) -> Array3<f32> {
    let max_len = max_len.unwrap_or_else(|| lengths.iter().copied().max().unwrap_or(0));
    let mut mask = Array3::<f32>::zeros((lengths.len(), 1, max_len));
    for (i, &len) in lengths.iter().enumerate() {
        for j in 0..len.min(max_len) {
            mask[[i, 0, j]] = 1.0;
        }
    }
    mask
}

/// Right-pad every row with 0 to `max_len`, truncating longer rows.
pub fn pad_sequences(rows: &[Vec<i64>], max_len: usize) -> Array2<i64> {
    let mut padded = Array2::<i64>::zeros((rows.len(), max_len));
    for (i, row) in rows.iter().enumerate() {
        for (j, &id) in row.iter().take(max_len).enumerate() {
            padded[[i, j]] = id;
        }
    }
    padded
}

/// Waveform length in samples for each predicted duration (truncating).
pub fn wav_lengths(durations: &[f32], sample_rate: u32) -> Vec<usize> {
    durations
        .iter()
        .map(|&d| (d.max(0.0) * sample_rate as f32) as usize)
        .collect()
}

/// Number of latent frames needed to cover `wav_len` samples.
pub fn latent_length(wav_len: usize, chunk_size: usize) -> usize {
    wav_len.div_ceil(chunk_size)
}

/// Latent validity mask for per-item waveform lengths, padded to `latent_len` frames.
pub fn latent_mask(wav_lengths: &[usize], chunk_size: usize, latent_len: usize) -> Array3<f32> {
    let latent_lengths: Vec<usize> = wav_lengths
        .iter()
        .map(|&len| latent_length(len, chunk_size))
        .collect();
    length_to_mask(&latent_lengths, Some(latent_len))
}
