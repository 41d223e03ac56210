use crate::tables::{
    ATTACK_TIME_TABLE, DECAY_RELEASE_TIME_TABLE, KEY_SCALE_LEVEL_TABLE, RATE_OFFSET_TABLE,
    SAMPLE_RATE, calculate_increment,
};
use bincode::{Decode, Encode};
use std::cmp;

// Envelope floor in dB
const ENVELOPE_MINIMUM: f64 = -96.0;

// Attack ends once the envelope is within one resolution step of 0 dB
const ENVELOPE_RESOLUTION: f64 = 0.1875;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum EnvelopeStage {
    #[default]
    Off,
    Attack,
    Decay,
    Sustain,
    Release,
}

fn percentage_to_db(percentage: f64) -> f64 {
    10.0 * percentage.log10()
}

fn db_to_x(db: f64) -> f64 {
    (-db).log2()
}

fn percentage_to_x(percentage: f64) -> f64 {
    db_to_x(percentage_to_db(percentage))
}

fn actual_rate(rate: u8, key_scale_rate: bool, key_scale_number: u8) -> u8 {
    let rate_offset =
        RATE_OFFSET_TABLE[usize::from(key_scale_rate)][(key_scale_number & 0x0F) as usize];
    cmp::min(63, 4 * rate + rate_offset)
}

// Matches a float-to-int cast that saturates on infinite periods
fn seconds_to_samples(seconds: f64) -> i32 {
    (seconds * SAMPLE_RATE) as i32
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct EnvelopeGenerator {
    pub(crate) stage: EnvelopeStage,
    // All levels are in dB
    envelope: f64,
    sustain_level: f64,
    total_level: f64,
    key_scale_attenuation: f64,
    // Attack is an exponential curve -2^x with x moving by a fixed increment each sample
    x: f64,
    x_attack_increment: f64,
    x_minimum_in_attack: f64,
    decay_increment: f64,
    release_increment: f64,
}

impl EnvelopeGenerator {
    pub(crate) fn new() -> Self {
        Self {
            stage: EnvelopeStage::Off,
            envelope: ENVELOPE_MINIMUM,
            sustain_level: 0.0,
            total_level: 0.0,
            key_scale_attenuation: 0.0,
            x: db_to_x(ENVELOPE_MINIMUM),
            x_attack_increment: 0.0,
            x_minimum_in_attack: 0.0,
            decay_increment: 0.0,
            release_increment: 0.0,
        }
    }

    pub(crate) fn set_sustain_level(&mut self, sustain_level: u8) {
        self.sustain_level = match sustain_level {
            0x0F => -93.0,
            _ => -3.0 * f64::from(sustain_level),
        };
    }

    pub(crate) fn set_total_level(&mut self, total_level: u8) {
        // 0.75 dB per step
        self.total_level = f64::from(total_level) * -0.75;
    }

    pub(crate) fn set_key_scale_attenuation(
        &mut self,
        f_number: u16,
        block: u8,
        key_scale_level: u8,
    ) {
        let f_number_high_bits = ((f_number >> 6) & 0x0F) as usize;
        let block_attenuation = KEY_SCALE_LEVEL_TABLE[f_number_high_bits][(block & 0x07) as usize];

        self.key_scale_attenuation = match key_scale_level {
            0 => 0.0,
            // 3 dB/octave
            1 => block_attenuation,
            // 1.5 dB/octave
            2 => block_attenuation / 2.0,
            // 6 dB/octave
            _ => block_attenuation * 2.0,
        };
    }

    pub(crate) fn set_attack_rate(
        &mut self,
        attack_rate: u8,
        key_scale_rate: bool,
        key_scale_number: u8,
    ) {
        let rate = actual_rate(attack_rate, key_scale_rate, key_scale_number);
        let [period_0_to_100_ms, period_10_to_90_ms] = ATTACK_TIME_TABLE[rate as usize];

        let period_0_to_100 = period_0_to_100_ms / 1000.0;
        let period_10_to_90 = period_10_to_90_ms / 1000.0;

        self.x_attack_increment =
            calculate_increment(percentage_to_x(0.1), percentage_to_x(0.9), period_10_to_90);

        // The 10%-90% curve is extended by half of the remaining 0%-100% time on either side
        let remaining_samples =
            (seconds_to_samples(period_0_to_100) - seconds_to_samples(period_10_to_90)) / 2;
        self.x_minimum_in_attack =
            percentage_to_x(0.1) - f64::from(remaining_samples) * self.x_attack_increment;
    }

    pub(crate) fn set_decay_rate(
        &mut self,
        decay_rate: u8,
        key_scale_rate: bool,
        key_scale_number: u8,
    ) {
        self.decay_increment =
            decay_release_increment(decay_rate, key_scale_rate, key_scale_number);
    }

    pub(crate) fn set_release_rate(
        &mut self,
        release_rate: u8,
        key_scale_rate: bool,
        key_scale_number: u8,
    ) {
        self.release_increment =
            decay_release_increment(release_rate, key_scale_rate, key_scale_number);
    }

    /// Advance by one sample and return the output level in dB.
    ///
    /// `tremolo` is the current tremolo attenuation, or 0 if tremolo is disabled for this operator.
    pub(crate) fn next_envelope(&mut self, sustaining: bool, tremolo: f64) -> f64 {
        let sustain_level = self.sustain_level / 2.0;

        // Stages fall through into the next one on the same sample when they complete
        if self.stage == EnvelopeStage::Attack {
            if self.envelope < -ENVELOPE_RESOLUTION
                && self.x_attack_increment != f64::NEG_INFINITY
            {
                self.envelope = -(2.0_f64.powf(self.x));
                self.x += self.x_attack_increment;
                return self.output(tremolo);
            }

            self.envelope = 0.0;
            self.stage = EnvelopeStage::Decay;
        }

        if self.stage == EnvelopeStage::Decay {
            if self.envelope > sustain_level {
                self.envelope -= self.decay_increment;
                return self.output(tremolo);
            }

            self.stage = EnvelopeStage::Sustain;
        }

        match self.stage {
            EnvelopeStage::Sustain if sustaining => {}
            EnvelopeStage::Sustain | EnvelopeStage::Release => {
                if self.envelope > ENVELOPE_MINIMUM {
                    self.envelope -= self.release_increment;
                } else {
                    self.stage = EnvelopeStage::Off;
                }
            }
            EnvelopeStage::Off | EnvelopeStage::Attack | EnvelopeStage::Decay => {}
        }

        self.output(tremolo)
    }

    fn output(&self, tremolo: f64) -> f64 {
        let mut output = self.envelope;
        output += tremolo / 2.0;
        output += self.key_scale_attenuation / 2.0 + self.total_level / 2.0;
        output
    }

    pub(crate) fn key_on(&mut self) {
        // Retriggering resumes the attack curve from the current level
        let x_current = db_to_x(self.envelope);
        self.x =
            if x_current < self.x_minimum_in_attack { x_current } else { self.x_minimum_in_attack };
        self.stage = EnvelopeStage::Attack;
    }

    pub(crate) fn key_off(&mut self) {
        if self.stage != EnvelopeStage::Off {
            self.stage = EnvelopeStage::Release;
        }
    }

    #[cfg(test)]
    pub(crate) fn envelope(&self) -> f64 {
        self.envelope
    }

    #[cfg(test)]
    pub(crate) fn release_increment(&self) -> f64 {
        self.release_increment
    }
}

fn decay_release_increment(rate: u8, key_scale_rate: bool, key_scale_number: u8) -> f64 {
    let rate = actual_rate(rate, key_scale_rate, key_scale_number);
    let period_10_to_90 = DECAY_RELEASE_TIME_TABLE[rate as usize][1] / 1000.0;
    calculate_increment(percentage_to_db(0.1), percentage_to_db(0.9), period_10_to_90)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    struct EnvelopeParams {
        attack_rate: u8,
        decay_rate: u8,
        sustain_level: u8,
        release_rate: u8,
        key_scale_rate: bool,
        key_scale_number: u8,
    }

    impl EnvelopeParams {
        fn build(&self) -> EnvelopeGenerator {
            let mut envelope = EnvelopeGenerator::new();
            envelope.set_attack_rate(self.attack_rate, self.key_scale_rate, self.key_scale_number);
            envelope.set_decay_rate(self.decay_rate, self.key_scale_rate, self.key_scale_number);
            envelope.set_release_rate(
                self.release_rate,
                self.key_scale_rate,
                self.key_scale_number,
            );
            envelope.set_sustain_level(self.sustain_level);
            envelope
        }
    }

    #[test]
    fn actual_rate_is_clamped() {
        assert_eq!(actual_rate(15, true, 15), 63);
        assert_eq!(actual_rate(15, false, 15), 63);
        assert_eq!(actual_rate(10, false, 15), 43);
        assert_eq!(actual_rate(10, true, 7), 47);
        assert_eq!(actual_rate(0, false, 0), 0);
    }

    #[test]
    fn sustain_and_total_levels() {
        let mut envelope = EnvelopeGenerator::new();
        envelope.set_sustain_level(15);
        assert_eq!(envelope.sustain_level, -93.0);
        envelope.set_sustain_level(4);
        assert_eq!(envelope.sustain_level, -12.0);

        envelope.set_total_level(0x3F);
        assert_eq!(envelope.total_level, -47.25);
    }

    #[test]
    fn key_scale_attenuation() {
        let mut envelope = EnvelopeGenerator::new();

        envelope.set_key_scale_attenuation(0x3FF, 7, 0);
        assert_eq!(envelope.key_scale_attenuation, 0.0);

        envelope.set_key_scale_attenuation(0x3FF, 7, 1);
        assert_eq!(envelope.key_scale_attenuation, -21.0);

        envelope.set_key_scale_attenuation(0x3FF, 7, 2);
        assert_eq!(envelope.key_scale_attenuation, -10.5);

        envelope.set_key_scale_attenuation(0x3FF, 7, 3);
        assert_eq!(envelope.key_scale_attenuation, -42.0);
    }

    #[test]
    fn instant_attack_skips_to_decay() {
        let mut envelope = EnvelopeParams {
            attack_rate: 15,
            decay_rate: 15,
            sustain_level: 0,
            release_rate: 15,
            key_scale_rate: false,
            key_scale_number: 0,
        }
        .build();

        envelope.key_on();
        assert_eq!(envelope.next_envelope(true, 0.0), 0.0);
        assert_eq!(envelope.stage, EnvelopeStage::Sustain);

        // Held indefinitely while sustaining
        for _ in 0..1000 {
            assert_eq!(envelope.next_envelope(true, 0.0), 0.0);
        }
    }

    #[test]
    fn release_reaches_off() {
        let mut envelope = EnvelopeParams {
            attack_rate: 15,
            decay_rate: 15,
            sustain_level: 0,
            release_rate: 15,
            key_scale_rate: false,
            key_scale_number: 0,
        }
        .build();

        envelope.key_on();
        envelope.next_envelope(true, 0.0);
        envelope.key_off();
        assert_eq!(envelope.stage, EnvelopeStage::Release);

        for _ in 0..10_000 {
            envelope.next_envelope(true, 0.0);
        }
        assert_eq!(envelope.stage, EnvelopeStage::Off);
        assert!(envelope.envelope() <= ENVELOPE_MINIMUM);
    }

    #[test]
    fn key_off_does_not_leave_off() {
        let mut envelope = EnvelopeGenerator::new();
        envelope.key_off();
        assert_eq!(envelope.stage, EnvelopeStage::Off);
    }

    #[test]
    fn percussive_sustain_decays_without_key_off() {
        let mut envelope = EnvelopeParams {
            attack_rate: 15,
            decay_rate: 15,
            sustain_level: 2,
            release_rate: 12,
            key_scale_rate: false,
            key_scale_number: 0,
        }
        .build();

        envelope.key_on();
        for _ in 0..200_000 {
            envelope.next_envelope(false, 0.0);
            if envelope.stage == EnvelopeStage::Off {
                break;
            }
        }
        assert_eq!(envelope.stage, EnvelopeStage::Off);
    }

    #[test]
    fn tremolo_and_levels_are_halved_in_output() {
        let mut envelope = EnvelopeParams {
            attack_rate: 15,
            decay_rate: 15,
            sustain_level: 0,
            release_rate: 15,
            key_scale_rate: false,
            key_scale_number: 0,
        }
        .build();
        envelope.set_total_level(8);
        envelope.set_key_scale_attenuation(0x3FF, 7, 1);

        envelope.key_on();
        assert_eq!(envelope.next_envelope(true, -4.0), -2.0 - 10.5 - 3.0);
    }

    // For any envelope parameters, attack never gets quieter and decay and release never get
    // louder. Decay stops at the sustain level, and release reaches OFF within the number of
    // samples implied by the release rate.
    #[test]
    fn envelope_monotonicity_and_bounded_decay_and_release() {
        const ATTACK_SAMPLES: usize = 64;

        for attack_rate in [1, 4, 8, 12, 15] {
            for decay_rate in [0, 7, 15] {
                for sustain_level in [0, 7, 15] {
                    for release_rate in [8, 12, 15] {
                        for key_scale_rate in [false, true] {
                            for key_scale_number in [0, 9, 15] {
                                let params = EnvelopeParams {
                                    attack_rate,
                                    decay_rate,
                                    sustain_level,
                                    release_rate,
                                    key_scale_rate,
                                    key_scale_number,
                                };
                                check_envelope(&params, ATTACK_SAMPLES);
                            }
                        }
                    }
                }
            }
        }
    }

    fn check_envelope(params: &EnvelopeParams, attack_samples: usize) {
        let mut envelope = params.build();
        envelope.key_on();

        let mut last = f64::NEG_INFINITY;
        for _ in 0..attack_samples {
            let level = envelope.next_envelope(true, 0.0);
            if envelope.stage != EnvelopeStage::Attack {
                break;
            }
            assert!(level >= last, "attack decreased from {last} to {level}");
            last = level;
        }

        // Decay only runs if attack finished within the samples checked
        if envelope.stage == EnvelopeStage::Decay && envelope.decay_increment > 0.0 {
            check_decay(&mut envelope);
        }

        envelope.key_off();
        assert_eq!(envelope.stage, EnvelopeStage::Release);

        let bound = (-ENVELOPE_MINIMUM / envelope.release_increment()).ceil() as usize + 2;
        let mut last = f64::INFINITY;
        let mut samples = 0;
        while envelope.stage != EnvelopeStage::Off {
            let level = envelope.next_envelope(true, 0.0);
            assert!(level <= last, "release increased from {last} to {level}");
            last = level;

            samples += 1;
            assert!(samples <= bound, "release did not finish within {bound} samples");
        }
    }

    // Runs decay through to the sustain stage and returns the number of decay samples
    fn check_decay(envelope: &mut EnvelopeGenerator) -> usize {
        let target = envelope.sustain_level / 2.0;
        let bound = ((envelope.envelope() - target) / envelope.decay_increment).ceil() as usize + 2;

        let mut last = envelope.envelope();
        let mut samples = 0;
        while envelope.stage == EnvelopeStage::Decay {
            envelope.next_envelope(true, 0.0);
            let level = envelope.envelope();
            assert!(level <= last, "decay increased from {last} to {level}");
            last = level;

            samples += 1;
            assert!(samples <= bound, "decay did not reach sustain within {bound} samples");
        }

        assert_eq!(envelope.stage, EnvelopeStage::Sustain);
        // Stops within one step below the sustain level
        assert!(envelope.envelope() <= target);
        assert!(envelope.envelope() > target - envelope.decay_increment - 1e-9);

        samples
    }

    #[test]
    fn decay_falls_to_sustain_level() {
        for decay_rate in [6, 9, 12, 15] {
            for sustain_level in [1, 4, 7, 14] {
                let mut envelope = EnvelopeParams {
                    attack_rate: 15,
                    decay_rate,
                    sustain_level,
                    release_rate: 15,
                    key_scale_rate: false,
                    key_scale_number: 0,
                }
                .build();

                envelope.key_on();
                envelope.next_envelope(true, 0.0);
                assert_eq!(envelope.stage, EnvelopeStage::Decay);
                assert!(check_decay(&mut envelope) > 0);

                // Held while EGT is set
                let held = envelope.envelope();
                for _ in 0..100 {
                    envelope.next_envelope(true, 0.0);
                }
                assert_eq!(envelope.envelope(), held);
            }
        }
    }
}
