//! Online next-symbol prediction over a text corpus.
//!
//! Streams the corpus through a predictive stack one byte per step, learning
//! and forecasting as it goes. Writes JSONL metrics for live monitoring.

use clap::Parser;
use predictive_sdr::config::{load_config, save_config};
use predictive_sdr::{Alphabet, SdrError, SdrResult, SequencePredictor, StackConfig};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "sdr-predict",
    about = "Online next-symbol prediction with a predictive sparse stack"
)]
struct Args {
    /// Text corpus to stream (wraps around at the end)
    #[arg(long)]
    corpus: PathBuf,

    /// Stack configuration (JSON); defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective configuration here and continue
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Simulation steps (0 = one pass over the corpus)
    #[arg(long, default_value_t = 0)]
    steps: usize,

    /// RNG seed; overrides the config's seed
    #[arg(long)]
    seed: Option<u64>,

    /// Output metrics file (JSONL)
    #[arg(long, default_value = "data/output/metrics.jsonl")]
    metrics_file: PathBuf,

    /// Report progress every N steps
    #[arg(long, default_value_t = 1000)]
    report_every: usize,

    /// Echo each forecast symbol to stdout
    #[arg(long, default_value_t = false)]
    print: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn io_err(context: &str, e: std::io::Error) -> SdrError {
    SdrError::Io(format!("{context}: {e}"))
}

fn run(args: &Args) -> SdrResult<()> {
    let corpus = fs::read(&args.corpus)
        .map_err(|e| io_err(&format!("failed to read {}", args.corpus.display()), e))?;
    let alphabet = Alphabet::from_corpus(&corpus)?;

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => StackConfig::default(),
    };
    if let Some(path) = &args.save_config {
        save_config(&config, path)?;
        eprintln!("Saved config to {}", path.display());
    }

    let seed = args.seed.unwrap_or(config.seed);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let stack = config.build(alphabet.input_size(), &mut rng)?;
    let mut predictor = SequencePredictor::new(stack, alphabet)?;

    let steps = if args.steps == 0 { corpus.len() } else { args.steps };

    if let Some(parent) = args.metrics_file.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err("failed to create metrics directory", e))?;
    }
    let mut metrics_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.metrics_file)
        .map_err(|e| io_err("failed to open metrics file", e))?;

    eprintln!("Predictive SDR");
    eprintln!("  Corpus: {} ({} bytes)", args.corpus.display(), corpus.len());
    eprintln!(
        "  Alphabet: {}..={} ({} symbols, {}x{} field)",
        alphabet.min(),
        alphabet.max(),
        alphabet.num_inputs(),
        alphabet.inputs_root(),
        alphabet.inputs_root()
    );
    let shapes: Vec<String> = config
        .layers
        .iter()
        .map(|l| format!("{}x{}", l.width, l.height))
        .collect();
    eprintln!("  Layers: {}", shapes.join(" -> "));
    eprintln!("  Steps: {steps}, seed: {seed}");
    eprintln!("  Metrics: {}", args.metrics_file.display());

    let start_event = serde_json::json!({
        "type": "start",
        "corpus": args.corpus.display().to_string(),
        "symbols": alphabet.num_inputs(),
        "layers": shapes,
        "steps": steps,
        "seed": seed,
    });
    writeln!(metrics_file, "{start_event}").map_err(|e| io_err("failed to write start event", e))?;

    let started = Instant::now();
    let report_every = args.report_every.max(1);
    let mut stdout = std::io::stdout().lock();

    for t in 0..steps {
        let forecast = predictor.step(corpus[t % corpus.len()], &mut rng)?;
        if args.print {
            stdout
                .write_all(&[forecast.unwrap_or(b'?')])
                .map_err(|e| io_err("failed to write forecast", e))?;
        }

        if (t + 1) % report_every == 0 {
            let m = predictor.metrics();
            let event = serde_json::json!({
                "type": "progress",
                "step": t + 1,
                "accuracy": m.accuracy(),
                "average_error": m.average_error,
                "surprise": m.surprise,
                "elapsed_secs": started.elapsed().as_secs_f64(),
            });
            writeln!(metrics_file, "{event}").map_err(|e| io_err("failed to write progress event", e))?;
            eprintln!(
                "  step {:>8}/{steps}  acc={:.4}  avg_err={:.4}  surprise={:.4}",
                t + 1,
                m.accuracy(),
                m.average_error,
                m.surprise
            );
        }
    }
    if args.print {
        writeln!(stdout).map_err(|e| io_err("failed to write forecast", e))?;
    }
    let metrics = predictor.metrics().clone();

    let elapsed = started.elapsed().as_secs_f64();
    eprintln!(
        "Done: {} steps in {elapsed:.1}s, accuracy={:.4}, avg_error={:.4}, surprise={:.4}",
        metrics.steps,
        metrics.accuracy(),
        metrics.average_error,
        metrics.surprise
    );

    let final_event = serde_json::json!({
        "type": "final",
        "steps": metrics.steps,
        "scored": metrics.scored,
        "accuracy": metrics.accuracy(),
        "average_error": metrics.average_error,
        "surprise": metrics.surprise,
        "elapsed_secs": elapsed,
    });
    writeln!(metrics_file, "{final_event}").map_err(|e| io_err("failed to write final event", e))?;
    Ok(())
}
