//! CLI entry point for Supertonic TTS inference.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use supertonic_tts::{
    output_file_name, save_wav, RuntimeConfig, SynthesisOptions, SynthesisResult, TtsError,
    VoiceStyle,
};

const DEFAULT_TEXT: &str = "This morning, I took a walk in the park, and the sound of the birds and the breeze was so pleasant that I stopped for a long time just to listen.";

#[derive(Parser, Debug)]
#[command(name = "supertonic-tts")]
#[command(about = "Text-to-speech inference with ONNX Runtime")]
struct Args {
    /// Directory containing the ONNX models, tts.json and unicode_indexer.json
    /// [default: $TTS_ONNX_DIR or assets/onnx]
    #[arg(long)]
    onnx_dir: Option<PathBuf>,

    /// Request GPU execution (not supported, fails at load)
    #[arg(long)]
    use_gpu: bool,

    /// Number of denoising steps
    #[arg(long, default_value_t = 5)]
    total_step: usize,

    /// Number of times to repeat the synthesis
    #[arg(long, default_value_t = 4)]
    n_test: usize,

    /// Voice style JSON files, comma-separated, one per text
    #[arg(long, value_delimiter = ',', default_value = "assets/voice_styles/M1.json")]
    voice_style: Vec<PathBuf>,

    /// Texts to synthesize, separated by '|'
    #[arg(long, value_delimiter = '|', default_value = DEFAULT_TEXT)]
    text: Vec<String>,

    /// Output directory for WAV files
    #[arg(long, default_value = "results")]
    save_dir: PathBuf,

    /// Speech speed multiplier (1.0 = normal speed)
    #[arg(long, default_value_t = 1.0)]
    speed: f32,

    /// Synthesize all texts in one batch instead of one chunked call per text
    #[arg(long)]
    batch: bool,

    /// Seconds of silence between chunks of a long text
    #[arg(long, default_value_t = 0.3)]
    silence_duration: f32,

    /// Maximum characters per chunk of a long text
    #[arg(long, default_value_t = 300)]
    max_chunk_len: usize,

    /// Fixed seed for the initial noise latent
    #[arg(long)]
    seed: Option<u64>,

    /// Save intermediate tensors of the first batch run to this directory
    #[arg(long)]
    save_tensors: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "supertonic_tts=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.voice_style.len() != args.text.len() {
        return Err(TtsError::BatchMismatch {
            texts: args.text.len(),
            styles: args.voice_style.len(),
        }
        .into());
    }

    let mut options = SynthesisOptions::default()
        .with_total_step(args.total_step)
        .with_speed(args.speed)
        .with_silence_duration(args.silence_duration)
        .with_max_chunk_len(args.max_chunk_len);
    if let Some(seed) = args.seed {
        options = options.with_seed(seed);
    }
    options.validate().context("Invalid synthesis options")?;

    let runtime = match &args.onnx_dir {
        Some(dir) => RuntimeConfig::new(dir).with_gpu(args.use_gpu),
        None => {
            let runtime = RuntimeConfig::from_env();
            let use_gpu = runtime.use_gpu || args.use_gpu;
            runtime.with_gpu(use_gpu)
        }
    };

    info!("Loading models from {:?}...", runtime.onnx_dir);
    let mut tts = supertonic_tts::load(&runtime).context("Failed to load TTS models")?;

    info!("Loading voice styles {:?}...", args.voice_style);
    let style = VoiceStyle::load(&args.voice_style).context("Failed to load voice styles")?;

    tts.warmup(&style).context("Warmup failed")?;
    fs::create_dir_all(&args.save_dir)
        .with_context(|| format!("Failed to create {:?}", args.save_dir))?;

    for n in 0..args.n_test {
        info!("[{}/{}] Starting synthesis...", n + 1, args.n_test);
        let start = Instant::now();

        let results: Vec<SynthesisResult> = if args.batch {
            let result = match (&args.save_tensors, n) {
                (Some(dir), 0) => {
                    let (result, trace) = tts
                        .synthesize_batch_traced(&args.text, &style, &options)
                        .context("Synthesis failed")?;
                    trace.save(dir).context("Failed to save tensors")?;
                    result
                }
                _ => tts
                    .synthesize_batch(&args.text, &style, &options)
                    .context("Synthesis failed")?,
            };
            vec![result]
        } else {
            let mut results = Vec::with_capacity(args.text.len());
            for (i, text) in args.text.iter().enumerate() {
                let voice = style.select(i)?;
                results.push(
                    tts.synthesize(text, &voice, &options)
                        .with_context(|| format!("Synthesis of text {} failed", i + 1))?,
                );
            }
            results
        };

        info!(
            "Generated speech in {:.3}s",
            start.elapsed().as_secs_f64()
        );

        let items: Vec<&[f32]> = results.iter().flat_map(|r| r.items()).collect();
        for (text, samples) in args.text.iter().zip(items) {
            let path = args.save_dir.join(output_file_name(text, n + 1));
            save_wav(samples, &path, tts.sample_rate())
                .with_context(|| format!("Failed to save {:?}", path))?;
            info!(
                "Saved {:?} ({:.2}s)",
                path,
                samples.len() as f32 / tts.sample_rate() as f32
            );
        }
    }

    info!("Synthesis completed");
    Ok(())
}
