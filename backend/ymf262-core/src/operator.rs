use crate::ChipContext;
use crate::envelope::{EnvelopeGenerator, EnvelopeStage};
use crate::noise::NoiseGenerator;
use crate::num::GetBit;
use crate::phase::PhaseGenerator;
use crate::registers::{
    AM_VIB_EGT_KSR_MULT, AR_DR, KSL_TL, RegisterFile, SL_RR, WAVEFORM_SELECT,
};
use crate::tables::{MULTIPLIER_TABLE, WAVEFORM_LEN, WAVEFORMS};
use bincode::{Decode, Encode};
use std::array;

const MELODIC_OPERATORS_PER_ARRAY: usize = 18;
const MELODIC_OPERATORS: usize = 2 * MELODIC_OPERATORS_PER_ARRAY;
const OPERATOR_COUNT: usize = MELODIC_OPERATORS + 4;

// Operator register offsets per array are 0x00-0x05, 0x08-0x0D, 0x10-0x15
const OPERATOR_SLOTS_PER_ARRAY: usize = 0x20;

// Array 0 slots taken over by the rhythm operators when rhythm mode is enabled
const HIGH_HAT_OFFSET: u8 = 0x11;
const SNARE_DRUM_OFFSET: u8 = 0x14;
const TOM_TOM_OFFSET: u8 = 0x12;
const TOP_CYMBAL_OFFSET: u8 = 0x15;

/// Index into the fixed operator arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub(crate) struct OperatorId(u8);

impl OperatorId {
    pub(crate) const HIGH_HAT: Self = Self(MELODIC_OPERATORS as u8);
    pub(crate) const SNARE_DRUM: Self = Self(MELODIC_OPERATORS as u8 + 1);
    pub(crate) const TOM_TOM: Self = Self(MELODIC_OPERATORS as u8 + 2);
    pub(crate) const TOP_CYMBAL: Self = Self(MELODIC_OPERATORS as u8 + 3);

    pub(crate) const fn melodic(array: u8, offset: u8) -> Self {
        debug_assert!(array < 2 && offset < 0x16 && offset & 0x07 < 6);
        Self(array * MELODIC_OPERATORS_PER_ARRAY as u8 + (offset >> 3) * 6 + (offset & 0x07))
    }

    fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn is_valid(self) -> bool {
        self.index() < OPERATOR_COUNT
    }
}

fn is_operator_offset(offset: u8) -> bool {
    offset < 0x16 && offset & 0x07 < 6
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub(crate) enum OperatorKind {
    Normal,
    HighHat,
    SnareDrum,
    TomTom,
    TopCymbal,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct Operator {
    kind: OperatorKind,
    base_address: u16,
    phase_generator: PhaseGenerator,
    envelope_generator: EnvelopeGenerator,
    // Most recent phase and linear amplitude, read by the rhythm operators
    phase: f64,
    amplitude: f64,
    tremolo: bool,
    vibrato: bool,
    sustaining: bool,
    key_scale_rate: bool,
    multiple: u8,
    key_scale_level: u8,
    total_level: u8,
    attack_rate: u8,
    decay_rate: u8,
    sustain_level: u8,
    release_rate: u8,
    waveform: u8,
    // Copied from the owning channel
    key_scale_number: u8,
    f_number: u16,
    block: u8,
}

impl Operator {
    fn new(kind: OperatorKind, base_address: u16) -> Self {
        Self {
            kind,
            base_address,
            phase_generator: PhaseGenerator::default(),
            envelope_generator: EnvelopeGenerator::new(),
            phase: 0.0,
            amplitude: 0.0,
            tremolo: false,
            vibrato: false,
            sustaining: false,
            key_scale_rate: false,
            multiple: 0,
            key_scale_level: 0,
            total_level: 0,
            attack_rate: 0,
            decay_rate: 0,
            sustain_level: 0,
            release_rate: 0,
            waveform: 0,
            key_scale_number: 0,
            f_number: 0,
            block: 0,
        }
    }

    pub(crate) fn update_am_vib_egt_ksr_mult(&mut self, registers: &RegisterFile) {
        let value = registers.read(self.base_address + AM_VIB_EGT_KSR_MULT);
        self.tremolo = value.bit(7);
        self.vibrato = value.bit(6);
        self.sustaining = value.bit(5);
        self.key_scale_rate = value.bit(4);
        self.multiple = value & 0x0F;

        log::trace!(
            "Operator {:03X}: AM={}, VIB={}, EGT={}, KSR={}, MULT={}",
            self.base_address,
            self.tremolo,
            self.vibrato,
            self.sustaining,
            self.key_scale_rate,
            self.multiple
        );

        self.phase_generator.set_frequency(self.f_number, self.block, self.multiple);
        self.update_envelope_rates();
    }

    pub(crate) fn update_ksl_tl(&mut self, registers: &RegisterFile) {
        let value = registers.read(self.base_address + KSL_TL);
        self.key_scale_level = value >> 6;
        self.total_level = value & 0x3F;

        log::trace!(
            "Operator {:03X}: KSL={}, TL={}",
            self.base_address,
            self.key_scale_level,
            self.total_level
        );

        self.envelope_generator.set_key_scale_attenuation(
            self.f_number,
            self.block,
            self.key_scale_level,
        );
        self.envelope_generator.set_total_level(self.total_level);
    }

    pub(crate) fn update_ar_dr(&mut self, registers: &RegisterFile) {
        let value = registers.read(self.base_address + AR_DR);
        self.attack_rate = value >> 4;
        self.decay_rate = value & 0x0F;

        log::trace!(
            "Operator {:03X}: AR={}, DR={}",
            self.base_address,
            self.attack_rate,
            self.decay_rate
        );

        self.envelope_generator.set_attack_rate(
            self.attack_rate,
            self.key_scale_rate,
            self.key_scale_number,
        );
        self.envelope_generator.set_decay_rate(
            self.decay_rate,
            self.key_scale_rate,
            self.key_scale_number,
        );
    }

    pub(crate) fn update_sl_rr(&mut self, registers: &RegisterFile) {
        let value = registers.read(self.base_address + SL_RR);
        self.sustain_level = value >> 4;
        self.release_rate = value & 0x0F;

        log::trace!(
            "Operator {:03X}: SL={}, RR={}",
            self.base_address,
            self.sustain_level,
            self.release_rate
        );

        self.envelope_generator.set_sustain_level(self.sustain_level);
        self.envelope_generator.set_release_rate(
            self.release_rate,
            self.key_scale_rate,
            self.key_scale_number,
        );
    }

    pub(crate) fn update_waveform_select(&mut self, registers: &RegisterFile) {
        self.waveform = registers.read(self.base_address + WAVEFORM_SELECT) & 0x07;

        log::trace!("Operator {:03X}: WS={}", self.base_address, self.waveform);
    }

    /// Reload every register-derived field after the owning channel's frequency changed
    pub(crate) fn update_operator(
        &mut self,
        registers: &RegisterFile,
        key_scale_number: u8,
        f_number: u16,
        block: u8,
    ) {
        self.key_scale_number = key_scale_number;
        self.f_number = f_number;
        self.block = block;

        self.update_am_vib_egt_ksr_mult(registers);
        self.update_ksl_tl(registers);
        self.update_ar_dr(registers);
        self.update_sl_rr(registers);
        self.update_waveform_select(registers);
    }

    fn update_envelope_rates(&mut self) {
        let (ksr, ksn) = (self.key_scale_rate, self.key_scale_number);
        self.envelope_generator.set_attack_rate(self.attack_rate, ksr, ksn);
        self.envelope_generator.set_decay_rate(self.decay_rate, ksr, ksn);
        self.envelope_generator.set_release_rate(self.release_rate, ksr, ksn);
    }

    fn validate(&self) -> Result<(), &'static str> {
        let nibbles = [
            self.multiple,
            self.attack_rate,
            self.decay_rate,
            self.sustain_level,
            self.release_rate,
            self.key_scale_number,
        ];
        if nibbles.iter().any(|&field| field > 0x0F) {
            return Err("operator rate or multiplier out of range");
        }

        if self.key_scale_level > 0x03 || self.waveform > 0x07 || self.block > 0x07 {
            return Err("operator waveform or block out of range");
        }

        Ok(())
    }

    pub(crate) fn key_on(&mut self) {
        // AR=0 never sounds
        if self.attack_rate > 0 {
            self.envelope_generator.key_on();
            self.phase_generator.key_on();
        } else {
            self.envelope_generator.stage = EnvelopeStage::Off;
        }
    }

    pub(crate) fn key_off(&mut self) {
        self.envelope_generator.key_off();
    }

    pub(crate) fn is_off(&self) -> bool {
        self.envelope_generator.stage == EnvelopeStage::Off
    }

    pub(crate) fn envelope_stage(&self) -> EnvelopeStage {
        self.envelope_generator.stage
    }

    // Used by the bass drum, which mutes its modulator while in series mode
    pub(crate) fn clear_attack_rate(&mut self) {
        self.attack_rate = 0;
    }

    fn advance_envelope(&mut self, context: &ChipContext) {
        let tremolo = if self.tremolo { context.tremolo() } else { 0.0 };
        let envelope_db = self.envelope_generator.next_envelope(self.sustaining, tremolo);
        self.amplitude = 10.0_f64.powf(envelope_db / 10.0);
    }

    fn waveform_index(&self, context: &ChipContext) -> usize {
        // OPL2 mode only has the first four waveforms
        (self.waveform & context.waveform_mask()) as usize
    }

    fn sample(&self, waveform: usize, modulator: f64, phase: f64) -> f64 {
        let mut phase = (phase + modulator) % 1.0;
        if phase < 0.0 {
            phase = (phase + 1.0) % 1.0;
        }

        let index = (phase * WAVEFORM_LEN as f64) as usize;
        WAVEFORMS[waveform][index] * self.amplitude
    }

    fn output(&mut self, modulator: f64, context: &ChipContext) -> f64 {
        if self.is_off() {
            return 0.0;
        }

        self.advance_envelope(context);
        let waveform = self.waveform_index(context);
        self.phase = self.phase_generator.next_phase(self.vibrato, context);
        self.sample(waveform, modulator, self.phase)
    }

    // Shared by the top cymbal and the high hat, each using the other's phase as the external phase
    fn cymbal_output(&mut self, external_phase: f64, context: &ChipContext) -> f64 {
        self.advance_envelope(context);
        self.phase = self.phase_generator.next_phase(self.vibrato, context);
        let waveform = self.waveform_index(context);

        let carrier_phase = (8.0 * self.phase) % 1.0;
        let modulator_output = self.sample(waveform, 0.0, external_phase);
        let carrier_output = self.sample(waveform, modulator_output, carrier_phase);

        let cycles = 4.0;
        if (carrier_phase * cycles) % cycles > 0.1 {
            return 0.0;
        }

        carrier_output * 2.0
    }

    #[allow(clippy::float_cmp)]
    fn snare_drum_output(
        &mut self,
        modulator: f64,
        high_hat_phase: f64,
        context: &ChipContext,
        noise: &mut NoiseGenerator,
    ) -> f64 {
        if self.is_off() {
            return 0.0;
        }

        self.advance_envelope(context);
        let waveform = self.waveform_index(context);

        // Snare drum phase is locked to twice the high hat phase; its own generator does not run
        self.phase = high_hat_phase * 2.0;
        let mut output = self.sample(waveform, modulator, self.phase);

        let noise = noise.next() * self.amplitude;
        let normalized = output / self.amplitude;
        if normalized != 1.0 && normalized != -1.0 {
            output = if output > 0.0 {
                noise
            } else if output < 0.0 {
                -noise
            } else {
                0.0
            };
        }

        output * 2.0
    }
}

/// All operators in the chip, plus the per-array table mapping register offsets to operators.
///
/// Rhythm mode swaps four dedicated rhythm operators into array 0's offset table. The melodic
/// operators they replace keep their state and come back when rhythm mode is disabled.
#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct Operators {
    arena: [Operator; OPERATOR_COUNT],
    slots: [[Option<OperatorId>; OPERATOR_SLOTS_PER_ARRAY]; 2],
}

impl Operators {
    pub(crate) fn new() -> Self {
        let arena = array::from_fn(|i| {
            if i < MELODIC_OPERATORS {
                let array = i / MELODIC_OPERATORS_PER_ARRAY;
                let within_array = i % MELODIC_OPERATORS_PER_ARRAY;
                let offset = (within_array / 6) * 8 + within_array % 6;
                Operator::new(OperatorKind::Normal, ((array << 8) | offset) as u16)
            } else {
                let (kind, offset) = match i - MELODIC_OPERATORS {
                    0 => (OperatorKind::HighHat, HIGH_HAT_OFFSET),
                    1 => (OperatorKind::SnareDrum, SNARE_DRUM_OFFSET),
                    2 => (OperatorKind::TomTom, TOM_TOM_OFFSET),
                    _ => (OperatorKind::TopCymbal, TOP_CYMBAL_OFFSET),
                };
                Operator::new(kind, offset.into())
            }
        });

        let slots = array::from_fn(|array| {
            array::from_fn(|offset| {
                let offset = offset as u8;
                is_operator_offset(offset).then(|| OperatorId::melodic(array as u8, offset))
            })
        });

        Self { arena, slots }
    }

    pub(crate) fn slot(&self, array: u8, offset: u8) -> Option<OperatorId> {
        self.slots[usize::from(array & 0x01)][(offset & 0x1F) as usize]
    }

    pub(crate) fn get(&self, id: OperatorId) -> &Operator {
        &self.arena[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: OperatorId) -> &mut Operator {
        &mut self.arena[id.index()]
    }

    /// Check the fields that are used as table indices, which register writes always keep in range
    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if !self.slots.iter().flatten().flatten().all(|id| id.is_valid()) {
            return Err("operator slot out of range");
        }

        self.arena.iter().try_for_each(Operator::validate)
    }

    pub(crate) fn set_rhythm_mode(&mut self, enabled: bool) {
        let rhythm_slots = [
            (HIGH_HAT_OFFSET, OperatorId::HIGH_HAT),
            (SNARE_DRUM_OFFSET, OperatorId::SNARE_DRUM),
            (TOM_TOM_OFFSET, OperatorId::TOM_TOM),
            (TOP_CYMBAL_OFFSET, OperatorId::TOP_CYMBAL),
        ];

        for (offset, rhythm_id) in rhythm_slots {
            self.slots[0][offset as usize] =
                Some(if enabled { rhythm_id } else { OperatorId::melodic(0, offset) });
        }
    }

    /// Run one operator for one sample. Rhythm operators read the most recent phase of their
    /// partner, so the order in which operators are evaluated within a sample matters.
    #[allow(clippy::float_cmp)]
    pub(crate) fn output(
        &mut self,
        id: OperatorId,
        modulator: f64,
        context: &ChipContext,
        noise: &mut NoiseGenerator,
    ) -> f64 {
        match self.get(id).kind {
            OperatorKind::Normal | OperatorKind::TomTom => {
                self.get_mut(id).output(modulator, context)
            }
            OperatorKind::TopCymbal => {
                let external_phase = self.scaled_phase(OperatorId::HIGH_HAT);
                self.get_mut(id).cymbal_output(external_phase, context)
            }
            OperatorKind::HighHat => {
                let external_phase = self.scaled_phase(OperatorId::TOP_CYMBAL);
                let operator = self.get_mut(id);
                let output = operator.cymbal_output(external_phase, context);
                if output == 0.0 { noise.next() * operator.amplitude } else { output }
            }
            OperatorKind::SnareDrum => {
                let high_hat_phase = self.get(OperatorId::HIGH_HAT).phase;
                self.get_mut(id).snare_drum_output(modulator, high_hat_phase, context, noise)
            }
        }
    }

    fn scaled_phase(&self, id: OperatorId) -> f64 {
        let operator = self.get(id);
        operator.phase * MULTIPLIER_TABLE[operator.multiple as usize]
    }
}
