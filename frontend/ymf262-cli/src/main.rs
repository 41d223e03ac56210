mod script;
mod wav;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use std::fs;
use std::path::PathBuf;
use wav::OutputLayout;
use ymf262_config::{DEFAULT_NOISE_SEED, RhythmNoise, SAMPLE_RATE, Ymf262Config};
use ymf262_core::{TimedWrite, Ymf262};

#[derive(Parser)]
struct Args {
    /// Register write script, one `<sample> <array> <address> <value>` write per line
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// Output WAV file path
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Samples to keep rendering after the last scripted write
    #[arg(long, default_value_t = u64::from(SAMPLE_RATE))]
    tail_samples: u64,

    /// Noise source for the snare drum and high hat
    #[arg(long, value_enum, default_value_t)]
    rhythm_noise: RhythmNoise,

    /// LFSR seed, only used with --rhythm-noise lfsr
    #[arg(long, default_value_t = DEFAULT_NOISE_SEED)]
    noise_seed: u32,

    /// Write all four output channels instead of only A and B
    #[arg(long, default_value_t)]
    quad: bool,
}

// Total samples to render: up to the last write, then the tail
fn render_length(writes: &[TimedWrite], tail_samples: u64) -> anyhow::Result<u64> {
    let last_sample = writes.last().map_or(0, |write| write.sample);
    last_sample.checked_add(tail_samples).with_context(|| {
        format!("Last write at sample {last_sample} plus {tail_samples} tail samples overflows")
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let script = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read script from '{}'", args.input.display()))?;
    let writes = script::parse(&script)
        .with_context(|| format!("Invalid script '{}'", args.input.display()))?;

    let sample_count = render_length(&writes, args.tail_samples)?;
    if writes.is_empty() {
        log::warn!("Script contains no register writes; output will be silent");
    }

    let config = Ymf262Config { rhythm_noise: args.rhythm_noise, noise_seed: args.noise_seed };
    log::info!("Running with config {config:?}");

    let layout = if args.quad { OutputLayout::Quad } else { OutputLayout::Stereo };
    let mut chip = Ymf262::new(config);
    let summary = wav::render_to_wav(&mut chip, &writes, sample_count, layout, &args.output)?;

    log::info!(
        "Wrote {} samples ({:.2}s) to '{}', applied {} register writes",
        summary.samples_rendered,
        summary.samples_rendered as f64 / f64::from(SAMPLE_RATE),
        args.output.display(),
        summary.writes_applied
    );

    Ok(())
}
