use anyhow::Context;
use std::path::Path;
use ymf262_core::{OUTPUT_CHANNELS, RenderSummary, SAMPLE_RATE, TimedWrite, Ymf262};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    /// Output channels A and B
    Stereo,
    /// All four output channels
    Quad,
}

impl OutputLayout {
    fn channels(self) -> u16 {
        match self {
            Self::Stereo => 2,
            Self::Quad => OUTPUT_CHANNELS as u16,
        }
    }
}

/// Render `sample_count` samples into a 16-bit PCM WAV file at the chip's native sample rate
pub fn render_to_wav(
    chip: &mut Ymf262,
    writes: &[TimedWrite],
    sample_count: u64,
    layout: OutputLayout,
    path: &Path,
) -> anyhow::Result<RenderSummary> {
    let spec = hound::WavSpec {
        channels: layout.channels(),
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file at '{}'", path.display()))?;

    let channels = usize::from(layout.channels());
    let mut write_result = Ok(());
    let summary = chip.render(writes.iter().copied(), sample_count, |sample| {
        if write_result.is_ok() {
            write_result =
                sample[..channels].iter().try_for_each(|&channel| writer.write_sample(channel));
        }
    });

    write_result.context("Failed to write WAV samples")?;
    writer.finalize().context("Failed to finalize WAV file")?;

    Ok(summary)
}
