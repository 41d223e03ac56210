use crate::ChipContext;
use crate::tables::{MULTIPLIER_TABLE, SAMPLE_RATE};
use bincode::{Decode, Encode};

/// Phase accumulator in units of full waveform cycles, always kept in [0, 1)
#[derive(Debug, Clone, Default, Encode, Decode)]
pub(crate) struct PhaseGenerator {
    phase: f64,
    increment: f64,
}

impl PhaseGenerator {
    pub(crate) fn set_frequency(&mut self, f_number: u16, block: u8, multiple: u8) {
        let base_frequency = f64::from(f_number) * 2.0_f64.powi(i32::from(block) - 1) * SAMPLE_RATE
            / 2.0_f64.powi(19);
        let operator_frequency = base_frequency * MULTIPLIER_TABLE[(multiple & 0x0F) as usize];
        self.increment = operator_frequency / SAMPLE_RATE;
    }

    pub(crate) fn next_phase(&mut self, vibrato: bool, context: &ChipContext) -> f64 {
        if vibrato {
            self.phase += self.increment * context.vibrato_multiplier();
        } else {
            self.phase += self.increment;
        }

        self.phase %= 1.0;
        if self.phase < 0.0 {
            self.phase = (self.phase + 1.0) % 1.0;
        }

        self.phase
    }

    pub(crate) fn key_on(&mut self) {
        self.phase = 0.0;
    }

    #[cfg(test)]
    pub(crate) fn increment(&self) -> f64 {
        self.increment
    }
}
