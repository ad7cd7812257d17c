//! HTTP request handling: the `/tts` request body, its validation, and
//! packaging of synthesized items as one WAV or a zip of WAVs.
//!
//! The axum server binary (feature `server`) is a thin shell over this module.

use crate::audio::{encode_wav, sanitize_filename};
use crate::config::SynthesisOptions;
use crate::error::{Result, TtsError};
use crate::pipeline::TextToSpeech;
use crate::runtime::SynthesisResult;
use crate::voice::VoiceStyle;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const DEFAULT_VOICE_STYLE: &str = "assets/voice_styles/M1.json";
pub const MAX_TOTAL_STEP: usize = 50;
/// Characters of the request text kept in a response file name.
pub const FILE_NAME_LEN: usize = 40;
pub const ZIP_FILE_NAME: &str = "tts_outputs.zip";

/// A JSON field that accepts a single string or a list of strings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// Body of `POST /tts`.
#[derive(Clone, Debug, Deserialize)]
pub struct TtsRequest {
    pub text: OneOrMany,
    /// Voice style JSON path(s), one per text in batch mode.
    #[serde(default = "default_voice_style")]
    pub voice_style: OneOrMany,
    #[serde(default = "default_total_step")]
    pub total_step: usize,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default)]
    pub batch: bool,
    /// Silence between chunks; only used outside batch mode.
    #[serde(default = "default_silence_duration")]
    pub silence_duration: f32,
}

fn default_voice_style() -> OneOrMany {
    OneOrMany::One(DEFAULT_VOICE_STYLE.to_string())
}

fn default_total_step() -> usize {
    5
}

fn default_speed() -> f32 {
    1.05
}

fn default_silence_duration() -> f32 {
    0.3
}

/// A validated request, ready to run against a session.
#[derive(Clone, Debug)]
pub struct TtsJob {
    pub texts: Vec<String>,
    pub voice_styles: Vec<PathBuf>,
    pub options: SynthesisOptions,
    pub batch: bool,
}

impl TtsRequest {
    /// Check counts and option ranges.
    ///
    /// Batch mode needs one voice style per text. Otherwise exactly one text
    /// and one voice style are allowed.
    pub fn into_job(self) -> Result<TtsJob> {
        let texts = self.text.into_vec();
        let voice_styles: Vec<PathBuf> = self
            .voice_style
            .into_vec()
            .into_iter()
            .map(PathBuf::from)
            .collect();

        if self.batch {
            if texts.len() != voice_styles.len() {
                return Err(TtsError::invalid_input(
                    "text and voice_style must have the same length",
                ));
            }
            if texts.is_empty() {
                return Err(TtsError::invalid_input("text must not be empty"));
            }
        } else if texts.len() != 1 || voice_styles.len() != 1 {
            return Err(TtsError::invalid_input(
                "non-batch mode requires a single text and voice_style",
            ));
        }

        if self.total_step > MAX_TOTAL_STEP {
            return Err(TtsError::invalid_input(format!(
                "total_step must be at most {}, got {}",
                MAX_TOTAL_STEP, self.total_step
            )));
        }
        let options = SynthesisOptions::default()
            .with_total_step(self.total_step)
            .with_speed(self.speed)
            .with_silence_duration(self.silence_duration);
        options.validate()?;

        Ok(TtsJob {
            texts,
            voice_styles,
            options,
            batch: self.batch,
        })
    }
}

/// Load the job's voice styles and synthesize.
pub fn run_job(tts: &mut TextToSpeech, job: &TtsJob) -> Result<SynthesisResult> {
    let style = VoiceStyle::load(&job.voice_styles)?;
    info!(
        texts = job.texts.len(),
        batch = job.batch,
        total_step = job.options.total_step,
        "Running TTS request"
    );
    if job.batch {
        tts.synthesize_batch(&job.texts, &style, &job.options)
    } else {
        tts.synthesize(&job.texts[0], &style, &job.options)
    }
}

/// Encoded response body with its content type and download name.
#[derive(Clone, Debug)]
pub struct AudioResponse {
    pub content_type: &'static str,
    pub file_name: String,
    pub body: Vec<u8>,
}

impl AudioResponse {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.file_name)
    }
}

/// One WAV for a single item, otherwise a deflated zip with one WAV per item.
///
/// `texts` names the files; an item whose text sanitizes to nothing falls
/// back to `tts` (single) or `tts_{n}` (zip, 1-based).
pub fn package_audio(result: &SynthesisResult, texts: &[String]) -> Result<AudioResponse> {
    let items = result.items();
    if items.len() == 1 {
        let stem = item_stem(texts.first().map(String::as_str), "tts".to_string());
        return Ok(AudioResponse {
            content_type: "audio/wav",
            file_name: format!("{stem}.wav"),
            body: encode_wav(items[0], result.sample_rate)?,
        });
    }

    let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut used = HashSet::new();
    for (index, samples) in items.iter().enumerate() {
        let mut stem = item_stem(
            texts.get(index).map(String::as_str),
            format!("tts_{}", index + 1),
        );
        // Repeated texts would collide inside the archive.
        if !used.insert(stem.clone()) {
            stem = format!("{}_{}", stem, index + 1);
            used.insert(stem.clone());
        }
        archive.start_file(format!("{stem}.wav"), options)
            .map_err(zip_error)?;
        archive.write_all(&encode_wav(samples, result.sample_rate)?)?;
    }
    let body = archive.finish().map_err(zip_error)?.into_inner();

    Ok(AudioResponse {
        content_type: "application/zip",
        file_name: ZIP_FILE_NAME.to_string(),
        body,
    })
}

fn item_stem(text: Option<&str>, fallback: String) -> String {
    let stem = text
        .map(|text| sanitize_filename(text, FILE_NAME_LEN))
        .unwrap_or_default();
    if stem.is_empty() {
        fallback
    } else {
        stem
    }
}

fn zip_error(err: zip::result::ZipError) -> TtsError {
    TtsError::Io(std::io::Error::other(err))
}
