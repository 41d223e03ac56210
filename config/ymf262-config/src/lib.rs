use bincode::{Decode, Encode};
use std::fmt::{self, Display, Formatter};

/// Output sample rate that every timing table in the core is derived from
pub const SAMPLE_RATE: u32 = 49700;

pub const DEFAULT_NOISE_SEED: u32 = 1;

/// Noise source for the snare drum and high hat rhythm voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum RhythmNoise {
    /// Unseeded process-wide RNG; output is not reproducible across runs
    #[default]
    Random,
    /// 23-bit LFSR seeded from the config; output is fully deterministic
    Lfsr,
}

impl RhythmNoise {
    pub const ALL: [Self; 2] = [Self::Random, Self::Lfsr];
}

impl Display for RhythmNoise {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => write!(f, "Random"),
            Self::Lfsr => write!(f, "Lfsr"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ymf262Config {
    pub rhythm_noise: RhythmNoise,
    /// Only used with [`RhythmNoise::Lfsr`]; a seed of 0 is treated as 1
    pub noise_seed: u32,
}

impl Ymf262Config {
    /// Config for reproducible output, e.g. for tests and offline rendering
    #[must_use]
    pub fn deterministic(noise_seed: u32) -> Self {
        Self { rhythm_noise: RhythmNoise::Lfsr, noise_seed }
    }
}

impl Default for Ymf262Config {
    fn default() -> Self {
        Self { rhythm_noise: RhythmNoise::default(), noise_seed: DEFAULT_NOISE_SEED }
    }
}
