//! WAV audio output utilities.

use crate::error::{Result, TtsError};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

/// Length of the text prefix used in generated output file names.
pub(crate) const FILE_PREFIX_LEN: usize = 20;

fn wav_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

fn io_error(err: hound::Error) -> TtsError {
    match err {
        hound::Error::IoError(err) => TtsError::Io(err),
        other => TtsError::Io(std::io::Error::other(other)),
    }
}

/// Clamp to [-1.0, 1.0] and quantize to signed 16-bit by truncation.
pub(crate) fn quantize(sample: f32) -> i16 {
    let clamped = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    (clamped * i16::MAX as f32) as i16
}

fn write_samples<W: Write + Seek>(writer: W, samples: &[f32], sample_rate: u32) -> Result<()> {
    let mut writer = WavWriter::new(writer, wav_spec(sample_rate)).map_err(io_error)?;
    for &sample in samples {
        writer.write_sample(quantize(sample)).map_err(io_error)?;
    }
    writer.finalize().map_err(io_error)
}

/// Serialize samples as a mono 16-bit PCM RIFF/WAVE container.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    write_samples(&mut cursor, samples, sample_rate)?;
    Ok(cursor.into_inner())
}

/// Save audio samples to a WAV file.
///
/// Args:
///     samples: Audio samples, clamped to [-1.0, 1.0] on write
///     path: Output file path
///     sample_rate: Sample rate in Hz
pub fn save_wav(samples: &[f32], path: &Path, sample_rate: u32) -> Result<()> {
    let file = File::create(path)?;
    write_samples(BufWriter::new(file), samples, sample_rate)
}

/// Replace every non-alphanumeric character with `_`, keeping at most
/// `max_len` characters of the input.
pub fn sanitize_filename(text: &str, max_len: usize) -> String {
    text.chars()
        .take(max_len)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// File name for one synthesized item: sanitized text prefix plus a 1-based run index.
pub fn output_file_name(text: &str, run: usize) -> String {
    format!("{}_{}.wav", sanitize_filename(text, FILE_PREFIX_LEN), run)
}
