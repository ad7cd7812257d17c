//! Synthesis orchestration for the four-stage flow-matching TTS model.
//!
//! A call runs: duration prediction, text encoding, `total_step` sequential
//! vector-estimation (denoising) steps over a noise latent, then vocoding.
//! Every stage call receives freshly built tensors it owns outright.

use crate::chunk::chunk_text;
use crate::config::{Config, SynthesisOptions};
use crate::engine::{take_output, InferenceEngine, Stage, TensorInputs};
use crate::error::{Result, TtsError};
use crate::latent::sample_noisy_latent;
use crate::normalize::{normalize, NormalizedText};
use crate::runtime::{item_len, SynthesisResult};
use crate::trace::SynthesisTrace;
use crate::vocab::SymbolTable;
use crate::voice::VoiceStyle;
use ndarray::{Array1, Array2, Array3, ArrayD, Ix3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Text used by [`TextToSpeech::warmup`].
const WARMUP_TEXT: &str = "Warm up.";

/// Raw output of one batched inference.
struct Inference {
    /// Vocoder output flattened across the batch, `batch * segment` samples.
    wav: Vec<f32>,
    /// Per-item duration in seconds, after speed scaling.
    duration: Vec<f32>,
}

/// A loaded synthesis session.
///
/// Owns the model configuration, the symbol table and the inference engine.
/// Create it once, reuse it for every request and drop it when done; nothing
/// is cached outside of it.
pub struct TextToSpeech {
    config: Config,
    symbols: SymbolTable,
    engine: Box<dyn InferenceEngine>,
}

impl TextToSpeech {
    /// Fails with `InvalidInput` if any size in `config` is zero.
    pub fn new(
        config: Config,
        symbols: SymbolTable,
        engine: impl InferenceEngine + 'static,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            symbols,
            engine: Box::new(engine),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate()
    }

    /// Run one short single-step synthesis with the first voice of `style`,
    /// so the engine's lazy initialization is paid before real requests.
    pub fn warmup(&mut self, style: &VoiceStyle) -> Result<()> {
        let voice = style.select(0)?;
        let options = SynthesisOptions::default().with_total_step(1).with_seed(0);

        let start = Instant::now();
        self.synthesize_batch(&[WARMUP_TEXT], &voice, &options)?;
        info!(elapsed_ms = start.elapsed().as_millis() as u64, "Warmup finished");
        Ok(())
    }

    /// Synthesize one utterance per text, all in a single batched pass.
    ///
    /// Args:
    ///     texts: Raw texts, one per style row
    ///     style: Voice style with `batch_size == texts.len()`
    ///     options: Step count, speed and noise seed
    ///
    /// Returns:
    ///     The flat batch waveform and per-item durations
    pub fn synthesize_batch<S: AsRef<str>>(
        &mut self,
        texts: &[S],
        style: &VoiceStyle,
        options: &SynthesisOptions,
    ) -> Result<SynthesisResult> {
        let normalized = self.prepare_batch(texts, style, options)?;
        let mut rng = noise_rng(options.seed);
        let output = self.infer(&normalized, style, options, &mut rng, None)?;
        Ok(SynthesisResult::new(output.wav, output.duration, self.sample_rate()))
    }

    /// Same as [`Self::synthesize_batch`], also capturing intermediate tensors.
    pub fn synthesize_batch_traced<S: AsRef<str>>(
        &mut self,
        texts: &[S],
        style: &VoiceStyle,
        options: &SynthesisOptions,
    ) -> Result<(SynthesisResult, SynthesisTrace)> {
        let normalized = self.prepare_batch(texts, style, options)?;
        let mut rng = noise_rng(options.seed);
        let mut trace = SynthesisTrace::default();
        let output = self.infer(&normalized, style, options, &mut rng, Some(&mut trace))?;
        let result = SynthesisResult::new(output.wav, output.duration, self.sample_rate());
        Ok((result, trace))
    }

    /// Synthesize a single, possibly long, text with a one-voice style.
    ///
    /// The text is split into chunks of at most `options.max_chunk_len`
    /// characters. Chunks are synthesized in order, each trimmed to its
    /// predicted duration, and joined with `options.silence_duration` seconds
    /// of silence. The reported duration includes the silences.
    pub fn synthesize(
        &mut self,
        text: &str,
        style: &VoiceStyle,
        options: &SynthesisOptions,
    ) -> Result<SynthesisResult> {
        options.validate()?;
        if style.batch_size() != 1 {
            return Err(TtsError::UnsupportedBatch(style.batch_size()));
        }

        let mut chunks = Vec::new();
        for (index, chunk) in chunk_text(text, options.max_chunk_len).iter().enumerate() {
            let normalized = normalize(chunk);
            if normalized.is_empty() {
                warn!(chunk = index, "Skipping chunk with no speakable text");
                continue;
            }
            chunks.push(normalized);
        }
        if chunks.is_empty() {
            return Err(TtsError::invalid_input("text has no speakable content"));
        }

        let sample_rate = self.sample_rate();
        let silence_len = (options.silence_duration * sample_rate as f32).round() as usize;
        let mut rng = noise_rng(options.seed);
        let mut wav = Vec::new();
        let mut total_duration = 0.0f32;

        for (index, chunk) in chunks.iter().enumerate() {
            info!(
                chunk = index + 1,
                of = chunks.len(),
                chars = chunk.char_len(),
                "Synthesizing chunk"
            );
            let output = self.infer(std::slice::from_ref(chunk), style, options, &mut rng, None)?;
            let duration = output.duration[0];
            let len = item_len(duration, sample_rate).min(output.wav.len());

            if index > 0 {
                wav.resize(wav.len() + silence_len, 0.0);
                total_duration += options.silence_duration;
            }
            wav.extend_from_slice(&output.wav[..len]);
            total_duration += duration;
        }

        Ok(SynthesisResult::new(wav, vec![total_duration], sample_rate))
    }

    fn prepare_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        style: &VoiceStyle,
        options: &SynthesisOptions,
    ) -> Result<Vec<NormalizedText>> {
        options.validate()?;
        if texts.is_empty() {
            return Err(TtsError::invalid_input("at least one text is required"));
        }
        if texts.len() != style.batch_size() {
            return Err(TtsError::BatchMismatch {
                texts: texts.len(),
                styles: style.batch_size(),
            });
        }

        texts
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let normalized = normalize(text.as_ref());
                if normalized.is_empty() {
                    Err(TtsError::invalid_input(format!(
                        "text {index} has no speakable content"
                    )))
                } else {
                    Ok(normalized)
                }
            })
            .collect()
    }

    fn infer(
        &mut self,
        texts: &[NormalizedText],
        style: &VoiceStyle,
        options: &SynthesisOptions,
        rng: &mut StdRng,
        trace: Option<&mut SynthesisTrace>,
    ) -> Result<Inference> {
        let batch = texts.len();
        let encoded = self.symbols.encode(texts)?;
        debug!(batch, text_len = encoded.ids.shape()[1], "Encoded text batch");

        // Duration prediction
        let raw_duration = self.run_stage(
            Stage::DurationPredictor,
            vec![
                ("text_ids", encoded.ids.clone().into()),
                ("style_dp", style.dp().clone().into()),
                ("text_mask", encoded.mask.clone().into()),
            ],
        )?;
        let duration = scale_durations(&raw_duration, batch, options.speed)?;

        // Text encoding
        let text_emb = self.run_stage(
            Stage::TextEncoder,
            vec![
                ("text_ids", encoded.ids.clone().into()),
                ("style_ttl", style.ttl().clone().into()),
                ("text_mask", encoded.mask.clone().into()),
            ],
        )?;
        let text_emb = into_batch3(Stage::TextEncoder, text_emb, batch)?;

        let state = sample_noisy_latent(&duration, &self.config, rng);
        if state.time_len() == 0 {
            return Err(TtsError::engine(format!(
                "predicted durations {duration:?} produce an empty latent"
            )));
        }
        debug!(shape = ?state.latent.shape(), "Sampled noisy latent");

        let initial_latent = trace.as_ref().map(|_| state.latent.clone());
        let latent_mask = state.mask;
        let mut latent = state.latent;
        let total_step = Array1::from_elem(batch, options.total_step as f32);

        // Denoising loop
        for step in 0..options.total_step {
            let expected = latent.shape().to_vec();
            let denoised = self.run_stage(
                Stage::VectorEstimator,
                vec![
                    ("noisy_latent", latent.into()),
                    ("text_emb", text_emb.clone().into()),
                    ("style_ttl", style.ttl().clone().into()),
                    ("latent_mask", latent_mask.clone().into()),
                    ("text_mask", encoded.mask.clone().into()),
                    ("current_step", Array1::from_elem(batch, step as f32).into()),
                    ("total_step", total_step.clone().into()),
                ],
            )?;
            latent = into_batch3(Stage::VectorEstimator, denoised, batch)?;
            if latent.shape() != expected.as_slice() {
                return Err(TtsError::engine(format!(
                    "{} step {step} returned shape {:?}, expected {:?}",
                    Stage::VectorEstimator,
                    latent.shape(),
                    expected
                )));
            }
        }

        // Vocoding
        let final_latent = trace.as_ref().map(|_| latent.clone());
        let wav = self.run_stage(Stage::Vocoder, vec![("latent", latent.into())])?;
        let wav = into_batch2(wav, batch)?;

        if let Some(trace) = trace {
            *trace = SynthesisTrace {
                text_ids: encoded.ids,
                text_mask: encoded.mask,
                duration: Array1::from_vec(duration.clone()),
                text_emb,
                initial_latent: initial_latent.unwrap_or_default(),
                latent_mask,
                final_latent: final_latent.unwrap_or_default(),
                wav: wav.clone(),
            };
        }

        Ok(Inference {
            wav: wav.iter().copied().collect(),
            duration,
        })
    }

    fn run_stage(&mut self, stage: Stage, inputs: TensorInputs) -> Result<ArrayD<f32>> {
        let start = Instant::now();
        let outputs = self.engine.run(stage, inputs)?;
        let output = take_output(stage, outputs)?;
        debug!(
            %stage,
            shape = ?output.shape(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Stage finished"
        );
        Ok(output)
    }
}

fn noise_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Per-item durations in seconds divided by `speed`.
///
/// Negative predictions clamp to zero; non-finite ones are an engine fault.
fn scale_durations(raw: &ArrayD<f32>, batch: usize, speed: f32) -> Result<Vec<f32>> {
    if raw.len() != batch {
        return Err(TtsError::engine(format!(
            "{} returned {} values for a batch of {}",
            Stage::DurationPredictor,
            raw.len(),
            batch
        )));
    }
    raw.iter()
        .map(|&d| {
            if d.is_finite() {
                Ok(d.max(0.0) / speed)
            } else {
                Err(TtsError::engine(format!(
                    "{} returned a non-finite duration",
                    Stage::DurationPredictor
                )))
            }
        })
        .collect()
}

fn into_batch3(stage: Stage, array: ArrayD<f32>, batch: usize) -> Result<Array3<f32>> {
    let shape = array.shape().to_vec();
    let array = array.into_dimensionality::<Ix3>().map_err(|e| {
        TtsError::engine(format!("{stage} returned shape {shape:?}, expected 3 axes: {e}"))
    })?;
    if array.shape()[0] != batch {
        return Err(TtsError::engine(format!(
            "{stage} returned batch {}, expected {batch}",
            array.shape()[0]
        )));
    }
    Ok(array)
}

/// Vocoder output as `[batch, samples]`. A singleton channel axis is accepted.
fn into_batch2(array: ArrayD<f32>, batch: usize) -> Result<Array2<f32>> {
    let shape = array.shape().to_vec();
    let samples = match shape.as_slice() {
        [b, n] if *b == batch => *n,
        [b, 1, n] if *b == batch => *n,
        _ => {
            return Err(TtsError::engine(format!(
                "{} returned shape {shape:?} for a batch of {batch}",
                Stage::Vocoder
            )))
        }
    };
    array
        .into_shape_with_order((batch, samples))
        .map_err(|e| TtsError::engine(format!("{} output: {e}", Stage::Vocoder)))
}
