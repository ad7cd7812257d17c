use ndarray::{Array2, Array3, ArrayD, Axis, Ix2, Ix3};
use serde_json::json;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use supertonic_tts::{
    chunk_text, encode_wav, normalize, Config, InferenceEngine, Result, Stage, SymbolTable,
    SynthesisOptions, Tensor, TensorInputs, TensorOutputs, TextToSpeech, TtsError, VoiceStyle,
};

const SAMPLE_RATE: u32 = 1000;
const SECONDS_PER_CHAR: f32 = 0.05;

#[derive(Debug, Clone, PartialEq)]
struct Call {
    stage: Stage,
    current_step: Option<f32>,
    total_step: Option<f32>,
    /// First value of each batch row of the style tensor the stage received.
    style_rows: Vec<f32>,
}

/// Deterministic stand-in for the four models.
///
/// Durations are `0.05 s` per unmasked character, the text embedding is the
/// symbol id plus the row's `style_ttl` value, each denoising step halves the
/// latent, and the vocoder emits `chunk_size` samples of 0.25 per frame.
///
/// Every call checks what it was handed: style rows must carry the per-voice
/// values of [`style`], masks must match the tensors they accompany, and each
/// denoising step must get the text encoder's output unchanged.
struct MockEngine {
    chunk_size: usize,
    calls: Arc<Mutex<Vec<Call>>>,
    text_emb: Option<ArrayD<f32>>,
}

impl MockEngine {
    fn new(calls: &Arc<Mutex<Vec<Call>>>) -> Self {
        Self {
            chunk_size: config().chunk_size(),
            calls: Arc::clone(calls),
            text_emb: None,
        }
    }
}

fn ttl_value(row: usize) -> f32 {
    10.0 * (row + 1) as f32
}

fn dp_value(row: usize) -> f32 {
    (row + 1) as f32
}

fn float(map: &mut HashMap<&'static str, Tensor>, name: &str) -> ArrayD<f32> {
    map.remove(name)
        .unwrap_or_else(|| panic!("missing input {name}"))
        .into_float()
        .unwrap()
}

fn text_ids(map: &mut HashMap<&'static str, Tensor>) -> Array2<i64> {
    match map.remove("text_ids").expect("missing input text_ids") {
        Tensor::Int(ids) => ids.into_dimensionality::<Ix2>().unwrap(),
        other => panic!("text_ids should be int64, got {other:?}"),
    }
}

/// Check a `[B, d1, d2]` style tensor row by row and return each row's value.
fn check_style(
    stage: Stage,
    style: &ArrayD<f32>,
    batch: usize,
    dims: [usize; 2],
    value: fn(usize) -> f32,
) -> Vec<f32> {
    assert_eq!(style.shape(), &[batch, dims[0], dims[1]], "style shape for {stage}");
    (0..batch)
        .map(|row| {
            let expected = value(row);
            let values = style.index_axis(Axis(0), row);
            assert!(
                values.iter().all(|&v| v == expected),
                "{stage} got the wrong style in row {row}"
            );
            expected
        })
        .collect()
}

impl InferenceEngine for MockEngine {
    fn run(&mut self, stage: Stage, inputs: TensorInputs) -> Result<TensorOutputs> {
        let names: Vec<&str> = inputs.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, stage.input_names(), "inputs of {stage}");
        let mut map: HashMap<&'static str, Tensor> = inputs.into_iter().collect();

        let mut call = Call {
            stage,
            current_step: None,
            total_step: None,
            style_rows: Vec::new(),
        };
        let output: ArrayD<f32> = match stage {
            Stage::DurationPredictor => {
                let (batch, len) = text_ids(&mut map).dim();
                let style_dp = float(&mut map, "style_dp");
                call.style_rows = check_style(stage, &style_dp, batch, [1, 2], dp_value);
                let mask = float(&mut map, "text_mask").into_dimensionality::<Ix3>().unwrap();
                assert_eq!(mask.dim(), (batch, 1, len), "text_mask for {stage}");
                mask.sum_axis(Axis(2))
                    .sum_axis(Axis(1))
                    .mapv(|len| len * SECONDS_PER_CHAR)
                    .into_dyn()
            }
            Stage::TextEncoder => {
                let ids = text_ids(&mut map);
                let (batch, len) = ids.dim();
                let style_ttl = float(&mut map, "style_ttl");
                call.style_rows = check_style(stage, &style_ttl, batch, [2, 3], ttl_value);
                let mask = float(&mut map, "text_mask");
                assert_eq!(mask.shape(), &[batch, 1, len], "text_mask for {stage}");
                let text_emb = Array3::from_shape_fn((batch, 4, len), |(b, _, t)| {
                    ids[[b, t]] as f32 + ttl_value(b)
                })
                .into_dyn();
                self.text_emb = Some(text_emb.clone());
                text_emb
            }
            Stage::VectorEstimator => {
                let latent = float(&mut map, "noisy_latent");
                let batch = latent.shape()[0];
                let frames = latent.shape()[2];

                let text_emb = float(&mut map, "text_emb");
                let encoded = self.text_emb.as_ref().expect("text encoder runs first");
                assert_eq!(&text_emb, encoded, "text_emb must be reused unchanged");
                let text_len = encoded.shape()[2];

                let style_ttl = float(&mut map, "style_ttl");
                call.style_rows = check_style(stage, &style_ttl, batch, [2, 3], ttl_value);

                let latent_mask = float(&mut map, "latent_mask");
                assert_eq!(latent_mask.shape(), &[batch, 1, frames], "latent_mask");
                let text_mask = float(&mut map, "text_mask");
                assert_eq!(text_mask.shape(), &[batch, 1, text_len], "text_mask for {stage}");

                call.current_step = float(&mut map, "current_step").iter().next().copied();
                call.total_step = float(&mut map, "total_step").iter().next().copied();
                latent * 0.5
            }
            Stage::Vocoder => {
                let latent = float(&mut map, "latent").into_dimensionality::<Ix3>().unwrap();
                let (batch, _, frames) = latent.dim();
                Array2::from_elem((batch, frames * self.chunk_size), 0.25f32).into_dyn()
            }
        };

        self.calls.lock().unwrap().push(call);
        let mut outputs = TensorOutputs::new();
        outputs.insert(stage.output_name().to_string(), Tensor::Float(output));
        Ok(outputs)
    }
}

fn config() -> Config {
    // chunk_size = 10 * 2 = 20 samples per latent frame, 6 latent channels.
    Config::new(SAMPLE_RATE, 10, 2, 3)
}

fn symbols() -> SymbolTable {
    SymbolTable::new((0..256).collect())
}

fn session() -> (TextToSpeech, Arc<Mutex<Vec<Call>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let tts = TextToSpeech::new(config(), symbols(), MockEngine::new(&calls)).unwrap();
    (tts, calls)
}

/// A batched style whose row `b` holds `ttl_value(b)` and `dp_value(b)`.
fn style(batch: usize) -> VoiceStyle {
    let ttl = Array3::from_shape_fn((batch, 2, 3), |(b, _, _)| ttl_value(b));
    let dp = Array3::from_shape_fn((batch, 1, 2), |(b, _, _)| dp_value(b));
    VoiceStyle::from_arrays(ttl, dp).unwrap()
}

/// Write one style file per voice, with the same per-row values as [`style`].
fn write_styles(dir: &TempDir, voices: usize) -> Vec<PathBuf> {
    (0..voices)
        .map(|voice| {
            let (ttl, dp) = (ttl_value(voice), dp_value(voice));
            let document = json!({
                "style_ttl": { "data": [[[ttl, ttl, ttl], [ttl, ttl, ttl]]], "dims": [1, 2, 3], "type": "float32" },
                "style_dp": { "data": [[[dp, dp]]], "dims": [1, 1, 2], "type": "float32" }
            });
            let path = dir.path().join(format!("voice_{voice}.json"));
            std::fs::write(&path, document.to_string()).unwrap();
            path
        })
        .collect()
}

fn expected_len(chars: usize) -> usize {
    (SECONDS_PER_CHAR * chars as f32 * SAMPLE_RATE as f32).round() as usize
}

#[test]
fn batch_synthesis_slices_each_item() {
    let (mut tts, calls) = session();
    let texts = ["Hello world", "Hi"];
    let options = SynthesisOptions::default().with_total_step(5).with_seed(7);

    let dir = TempDir::new().unwrap();
    let voices = VoiceStyle::load(&write_styles(&dir, 2)).unwrap();

    let result = tts.synthesize_batch(&texts, &voices, &options).unwrap();

    assert_eq!(result.batch_size, 2);
    assert_eq!(result.sample_rate, SAMPLE_RATE);
    assert_eq!(result.wav.len() % 2, 0);

    // "Hello world." and "Hi." after normalization.
    assert!((result.duration[0] - 0.6).abs() < 1e-5);
    assert!((result.duration[1] - 0.15).abs() < 1e-5);

    let segment = result.segment_len();
    for i in 0..2 {
        let expected = ((result.duration[i] * SAMPLE_RATE as f32).round() as usize).min(segment);
        assert_eq!(result.item(i).unwrap().len(), expected);
    }
    assert_eq!(result.item(0).unwrap().len(), expected_len(12));
    assert_eq!(result.item(1).unwrap().len(), expected_len(3));

    let calls = calls.lock().unwrap();
    let stages: Vec<Stage> = calls.iter().map(|c| c.stage).collect();
    assert_eq!(stages[0], Stage::DurationPredictor);
    assert_eq!(stages[1], Stage::TextEncoder);
    assert_eq!(stages[7], Stage::Vocoder);
    assert_eq!(stages.len(), 8);

    let steps: Vec<f32> = calls.iter().filter_map(|c| c.current_step).collect();
    assert_eq!(steps, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    assert!(calls
        .iter()
        .filter_map(|c| c.total_step)
        .all(|total| total == 5.0));
}

#[test]
fn speed_shortens_durations() {
    let (mut tts, _) = session();
    let options = SynthesisOptions::default().with_seed(1);
    let normal = tts.synthesize_batch(&["Hello world"], &style(1), &options).unwrap();
    let fast = tts
        .synthesize_batch(&["Hello world"], &style(1), &options.clone().with_speed(2.0))
        .unwrap();

    assert!((fast.duration[0] * 2.0 - normal.duration[0]).abs() < 1e-5);
    assert!(fast.wav.len() < normal.wav.len());
}

#[test]
fn long_text_is_chunked_and_stitched_with_silence() {
    let (mut tts, calls) = session();
    let sentence = "The quick brown fox jumps over the lazy dog near the river bank.";
    let text = vec![sentence; 8].join(" ");
    assert!(text.chars().count() >= 500);

    let options = SynthesisOptions::default()
        .with_max_chunk_len(200)
        .with_silence_duration(0.3)
        .with_total_step(2)
        .with_seed(3);
    let result = tts.synthesize(&text, &style(1), &options).unwrap();

    let chunks = chunk_text(&text, 200);
    assert!(chunks.len() >= 3);
    assert!(chunks.iter().all(|c| c.chars().count() <= 200));

    let chunk_chars: Vec<usize> = chunks.iter().map(|c| normalize(c).char_len()).collect();
    let speech: f32 = chunk_chars
        .iter()
        .map(|&n| SECONDS_PER_CHAR * n as f32)
        .sum();
    let silences = (chunks.len() - 1) as f32 * 0.3;

    assert_eq!(result.batch_size, 1);
    assert!((result.duration[0] - (speech + silences)).abs() < 1e-3);

    let silence_len = 300;
    let expected_wav: usize = chunk_chars.iter().map(|&n| expected_len(n)).sum::<usize>()
        + (chunks.len() - 1) * silence_len;
    assert_eq!(result.wav.len(), expected_wav);

    // Silence sits right after the first chunk's audio.
    let first = expected_len(chunk_chars[0]);
    assert!(result.wav[..first].iter().all(|&s| s == 0.25));
    assert!(result.wav[first..first + silence_len].iter().all(|&s| s == 0.0));

    let vocoder_calls = calls
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.stage == Stage::Vocoder)
        .count();
    assert_eq!(vocoder_calls, chunks.len());
}

#[test]
fn traced_synthesis_is_reproducible_with_seed() {
    let (mut tts, _) = session();
    let options = SynthesisOptions::default().with_total_step(5).with_seed(42);

    let (_, first) = tts
        .synthesize_batch_traced(&["Seeded noise"], &style(1), &options)
        .unwrap();
    let (_, second) = tts
        .synthesize_batch_traced(&["Seeded noise"], &style(1), &options)
        .unwrap();
    assert_eq!(first.initial_latent, second.initial_latent);

    let (_, other) = tts
        .synthesize_batch_traced(&["Seeded noise"], &style(1), &options.clone().with_seed(43))
        .unwrap();
    assert_ne!(first.initial_latent, other.initial_latent);

    // Five halving steps.
    let expected = first.initial_latent.mapv(|v| v * 0.5f32.powi(5));
    assert!(first
        .final_latent
        .iter()
        .zip(expected.iter())
        .all(|(a, b)| (a - b).abs() < 1e-6));

    // 13 chars -> 0.65 s -> 650 samples -> ceil(650 / 20) = 33 frames, 6 channels.
    assert_eq!(first.initial_latent.shape(), &[1, 6, 33]);
    assert_eq!(first.latent_mask.shape(), &[1, 1, 33]);
    assert_eq!(first.text_ids.shape(), &[1, 13]);
    assert_eq!(first.duration.len(), 1);
    assert!((first.duration[0] - 0.65).abs() < 1e-5);
}

#[test]
fn batch_and_style_counts_must_match() {
    let (mut tts, calls) = session();
    let err = tts
        .synthesize_batch(&["one", "two"], &style(1), &SynthesisOptions::default())
        .unwrap_err();
    assert!(matches!(err, TtsError::BatchMismatch { texts: 2, styles: 1 }));
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn single_text_path_requires_single_style() {
    let (mut tts, _) = session();
    let err = tts
        .synthesize("Hello.", &style(2), &SynthesisOptions::default())
        .unwrap_err();
    assert!(matches!(err, TtsError::UnsupportedBatch(2)));
}

#[test]
fn invalid_inputs_are_rejected_before_inference() {
    let (mut tts, calls) = session();
    let empty: [&str; 0] = [];

    assert!(matches!(
        tts.synthesize_batch(&empty, &style(1), &SynthesisOptions::default()),
        Err(TtsError::InvalidInput(_))
    ));
    assert!(matches!(
        tts.synthesize_batch(&["🙂"], &style(1), &SynthesisOptions::default()),
        Err(TtsError::InvalidInput(_))
    ));
    assert!(matches!(
        tts.synthesize("   ", &style(1), &SynthesisOptions::default()),
        Err(TtsError::InvalidInput(_))
    ));
    assert!(matches!(
        tts.synthesize_batch(&["Hi"], &style(1), &SynthesisOptions::default().with_total_step(0)),
        Err(TtsError::InvalidInput(_))
    ));
    assert!(matches!(
        tts.synthesize_batch(&["Hi"], &style(1), &SynthesisOptions::default().with_speed(0.0)),
        Err(TtsError::InvalidInput(_))
    ));
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn warmup_runs_one_step_with_first_voice() {
    let (mut tts, calls) = session();
    tts.warmup(&style(3)).unwrap();

    let calls = calls.lock().unwrap();
    let steps: Vec<_> = calls.iter().filter_map(|c| c.total_step).collect();
    assert_eq!(steps, vec![1.0]);
    assert_eq!(calls.last().unwrap().stage, Stage::Vocoder);
}

/// Returns a denoised latent one frame too short.
struct ShrinkingEngine(MockEngine);

impl InferenceEngine for ShrinkingEngine {
    fn run(&mut self, stage: Stage, inputs: TensorInputs) -> Result<TensorOutputs> {
        let mut outputs = self.0.run(stage, inputs)?;
        if stage == Stage::VectorEstimator {
            let latent = outputs
                .remove("denoised_latent")
                .unwrap()
                .into_float()
                .unwrap()
                .into_dimensionality::<Ix3>()
                .unwrap();
            let frames = latent.dim().2;
            let shorter = latent.slice(ndarray::s![.., .., ..frames - 1]).to_owned();
            outputs.insert("denoised_latent".to_string(), shorter.into());
        }
        Ok(outputs)
    }
}

#[test]
fn unexpected_engine_shapes_are_engine_errors() {
    let engine = ShrinkingEngine(MockEngine::new(&Arc::new(Mutex::new(Vec::new()))));
    let mut tts = TextToSpeech::new(config(), symbols(), engine).unwrap();
    let err = tts
        .synthesize_batch(&["Hello"], &style(1), &SynthesisOptions::default())
        .unwrap_err();
    assert!(matches!(err, TtsError::Engine(_)), "got {err:?}");
}

#[test]
fn synthesized_item_encodes_to_wav() {
    let (mut tts, _) = session();
    let result = tts
        .synthesize_batch(&["Hello world"], &style(1), &SynthesisOptions::default().with_seed(0))
        .unwrap();
    let samples = result.item(0).unwrap();

    let bytes = encode_wav(samples, result.sample_rate).unwrap();
    let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len() as usize, samples.len());
}

#[test]
fn styles_reach_their_stages_row_by_row() {
    let (mut tts, calls) = session();
    let dir = TempDir::new().unwrap();
    let voices = VoiceStyle::load(&write_styles(&dir, 2)).unwrap();
    let options = SynthesisOptions::default().with_total_step(3).with_seed(5);

    tts.synthesize_batch(&["First voice", "Second"], &voices, &options)
        .unwrap();

    let calls = calls.lock().unwrap();
    for call in calls.iter() {
        let expected = match call.stage {
            Stage::DurationPredictor => vec![dp_value(0), dp_value(1)],
            Stage::TextEncoder | Stage::VectorEstimator => vec![ttl_value(0), ttl_value(1)],
            Stage::Vocoder => Vec::new(),
        };
        assert_eq!(call.style_rows, expected, "style rows for {}", call.stage);
    }
    let denoise_calls = calls
        .iter()
        .filter(|c| c.stage == Stage::VectorEstimator)
        .count();
    assert_eq!(denoise_calls, 3);
}

#[test]
fn single_text_path_passes_the_selected_voice() {
    let (mut tts, calls) = session();
    let dir = TempDir::new().unwrap();
    let voices = VoiceStyle::load(&write_styles(&dir, 2)).unwrap();
    let first = voices.select(0).unwrap();

    let options = SynthesisOptions::default()
        .with_seed(1)
        .with_max_chunk_len(12);
    tts.synthesize("Hello there. How are you?", &first, &options)
        .unwrap();

    let calls = calls.lock().unwrap();
    assert!(calls.iter().filter(|c| c.stage == Stage::DurationPredictor).count() > 1);
    for call in calls.iter().filter(|c| c.stage != Stage::Vocoder) {
        let expected = if call.stage == Stage::DurationPredictor {
            dp_value(0)
        } else {
            ttl_value(0)
        };
        assert_eq!(call.style_rows, vec![expected]);
    }
}

#[test]
fn zero_sized_config_is_rejected_at_construction() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    for config in [
        Config::new(SAMPLE_RATE, 0, 2, 3),
        Config::new(SAMPLE_RATE, 10, 0, 3),
        Config::new(0, 10, 2, 3),
    ] {
        let result = TextToSpeech::new(config, symbols(), MockEngine::new(&calls));
        assert!(matches!(result, Err(TtsError::InvalidInput(_))));
    }
    assert!(calls.lock().unwrap().is_empty());
}
