use crate::num::GetBit;
use bincode::{Decode, Encode};
use ymf262_config::{RhythmNoise, Ymf262Config};

const LFSR_BITS: u32 = 23;

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) enum NoiseGenerator {
    Random,
    Lfsr { state: u32 },
}

impl NoiseGenerator {
    pub(crate) fn new(config: Ymf262Config) -> Self {
        match config.rhythm_noise {
            RhythmNoise::Random => Self::Random,
            RhythmNoise::Lfsr => {
                let state = config.noise_seed & ((1 << LFSR_BITS) - 1);
                Self::Lfsr { state: if state == 0 { 1 } else { state } }
            }
        }
    }

    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        match *self {
            Self::Lfsr { state } if state == 0 || state >= 1 << LFSR_BITS => {
                Err("noise LFSR state out of range")
            }
            Self::Random | Self::Lfsr { .. } => Ok(()),
        }
    }

    /// Next noise value in [0, 1)
    pub(crate) fn next(&mut self) -> f64 {
        match self {
            Self::Random => rand::random(),
            Self::Lfsr { state } => {
                // Shift out a full register width so that consecutive values are independent
                for _ in 0..LFSR_BITS {
                    shift_lfsr(state);
                }
                f64::from(*state) / f64::from(1_u32 << LFSR_BITS)
            }
        }
    }
}

fn shift_lfsr(lfsr: &mut u32) {
    let xor_operand = if lfsr.bit(0) {
        // Flip bits 22, 8, 7, and 0
        0x400181
    } else {
        0
    };
    *lfsr = (*lfsr >> 1) ^ xor_operand;
}
