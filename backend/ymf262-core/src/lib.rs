//! Yamaha YMF262 (OPL3) FM synthesis sound chip
//!
//! This is a floating-point model of the chip: envelopes are computed in decibels and waveforms
//! are sampled from precomputed tables, with output at a fixed 49700 Hz. The high hat, snare drum,
//! and top cymbal rhythm voices use empirically derived formulas that are reproduced as-is.
//!
//! Registers are written through two 256-byte arrays. Array 1 holds the OPL3 extension registers
//! and the second set of 9 channels, which are only mixed into the output in OPL3 mode (NEW=1).

mod channel;
mod envelope;
mod noise;
mod num;
mod operator;
mod phase;
mod registers;
pub mod serialize;
mod tables;
mod timeline;

use crate::channel::{CHANNELS_PER_ARRAY, Channel, ChannelId, ChannelKind, Channels};
use crate::noise::NoiseGenerator;
use crate::num::GetBit;
use crate::operator::{OperatorId, Operators};
use crate::registers::{
    CONNECTION_SELECT_ADDRESS, NEW_ADDRESS, NOTE_SELECT_ADDRESS, PANNING_FEEDBACK_CONNECTION,
    RHYTHM_ADDRESS, RegisterFile,
};
use crate::tables::{TREMOLO_TABLES, VIBRATO_TABLES};
use bincode::{Decode, Encode};

pub use envelope::EnvelopeStage;
pub use registers::REGISTER_FILE_LEN;
pub use serialize::SaveStateError;
pub use timeline::{RenderSummary, TimedWrite};
pub use ymf262_config::{RhythmNoise, SAMPLE_RATE, Ymf262Config};

pub const OUTPUT_CHANNELS: usize = 4;

// Output is normalized against every channel of both arrays playing at full volume
const MAX_CHANNELS: f64 = 18.0;

/// Chip-wide state that operators and channels read while updating or producing samples
#[derive(Debug, Clone, Default, Encode, Decode)]
pub(crate) struct ChipContext {
    pub(crate) opl3_mode: bool,
    pub(crate) note_select: bool,
    pub(crate) deep_tremolo: bool,
    pub(crate) deep_vibrato: bool,
    pub(crate) vibrato_index: u16,
    pub(crate) tremolo_index: u16,
}

impl ChipContext {
    pub(crate) fn vibrato_multiplier(&self) -> f64 {
        VIBRATO_TABLES[usize::from(self.deep_vibrato)][self.vibrato_index as usize]
    }

    pub(crate) fn tremolo(&self) -> f64 {
        TREMOLO_TABLES[usize::from(self.deep_tremolo)][self.tremolo_index as usize]
    }

    pub(crate) fn waveform_mask(&self) -> u8 {
        if self.opl3_mode { 0x07 } else { 0x03 }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.vibrato_index as usize >= VIBRATO_TABLES[usize::from(self.deep_vibrato)].len() {
            return Err("vibrato position out of range");
        }

        if self.tremolo_index as usize >= TREMOLO_TABLES[usize::from(self.deep_tremolo)].len() {
            return Err("tremolo position out of range");
        }

        Ok(())
    }

    // Indices wrap at the length of the currently selected depth table
    fn advance(&mut self) {
        self.vibrato_index += 1;
        if self.vibrato_index as usize >= VIBRATO_TABLES[usize::from(self.deep_vibrato)].len() {
            self.vibrato_index = 0;
        }

        self.tremolo_index += 1;
        if self.tremolo_index as usize >= TREMOLO_TABLES[usize::from(self.deep_tremolo)].len() {
            self.tremolo_index = 0;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
struct RhythmState {
    enabled: bool,
    // BD, SD, TOM, TC, HH in bits 4-0
    key_bits: u8,
}

// Rhythm register key bit and the operators it keys
const RHYTHM_VOICES: [(u8, &str, &[OperatorId]); 5] = [
    (4, "Bass drum", &[BASS_DRUM_MODULATOR, BASS_DRUM_CARRIER]),
    (3, "Snare drum", &[OperatorId::SNARE_DRUM]),
    (2, "Tom-tom", &[OperatorId::TOM_TOM]),
    (1, "Top cymbal", &[OperatorId::TOP_CYMBAL]),
    (0, "High hat", &[OperatorId::HIGH_HAT]),
];

const BASS_DRUM_MODULATOR: OperatorId = OperatorId::melodic(0, 0x10);
const BASS_DRUM_CARRIER: OperatorId = OperatorId::melodic(0, 0x13);

type ChannelUpdateFn = fn(&mut Channel, &RegisterFile, &mut Operators, &ChipContext);

#[derive(Debug, Clone, Encode, Decode)]
pub struct Ymf262 {
    config: Ymf262Config,
    registers: RegisterFile,
    operators: Operators,
    channels: Channels,
    context: ChipContext,
    rhythm: RhythmState,
    connection_select: u8,
    noise: NoiseGenerator,
}

impl Ymf262 {
    #[must_use]
    pub fn new(config: Ymf262Config) -> Self {
        tables::initialize();

        Self {
            config,
            registers: RegisterFile::new(),
            operators: Operators::new(),
            channels: Channels::new(),
            context: ChipContext::default(),
            rhythm: RhythmState::default(),
            connection_select: 0,
            noise: NoiseGenerator::new(config),
        }
    }

    /// Return to power-on state, keeping the current config
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    /// Swap the rhythm noise source without touching register state
    pub fn reload_config(&mut self, config: Ymf262Config) {
        self.config = config;
        self.noise = NoiseGenerator::new(config);
    }

    // Decoded state is not guaranteed to come from register writes
    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        self.context.validate()?;
        self.operators.validate()?;
        self.channels.validate()?;
        self.noise.validate()
    }

    #[must_use]
    pub fn config(&self) -> Ymf262Config {
        self.config
    }

    /// Write to register `address` in register array `array` (0 or 1).
    ///
    /// Writes to other arrays and to unused addresses are ignored.
    pub fn write(&mut self, array: u8, address: u8, value: u8) {
        self.write_register((u16::from(array) << 8) | u16::from(address), value);
    }

    /// Write using a logical register address in `0x000..=0x1FF`, i.e. `array << 8 | address`
    pub fn write_register(&mut self, register: u16, value: u8) {
        if register as usize >= REGISTER_FILE_LEN {
            log::trace!("Ignoring write to out-of-range register {register:03X}");
            return;
        }

        log::trace!("Write to register {register:03X}: {value:02X}");

        self.registers.write(register, value);

        let array = (register >> 8) as u8;
        let address = register as u8;
        match address & 0xE0 {
            0x00 => self.write_global_register(register),
            0xA0 => {
                if address == 0xBD {
                    if array == 0 {
                        self.write_rhythm_register();
                    }
                } else if address & 0xF0 == 0xB0 && address <= 0xB8 {
                    self.update_channel_slot(
                        array,
                        address & 0x0F,
                        Channel::update_key_on_block_f_number_high,
                    );
                } else if address & 0xF0 == 0xA0 && address <= 0xA8 {
                    self.update_channel_slot(array, address & 0x0F, Channel::update_f_number_low);
                }
            }
            0xC0 => {
                if address <= 0xC8 {
                    self.update_channel_slot(
                        array,
                        address & 0x0F,
                        Channel::update_panning_feedback_connection,
                    );
                }
            }
            _ => self.write_operator_register(array, address),
        }
    }

    fn write_global_register(&mut self, register: u16) {
        let value = self.registers.read(register);
        match register {
            NOTE_SELECT_ADDRESS => {
                self.context.note_select = value.bit(6);
                log::trace!("NTS: {}", self.context.note_select);
            }
            CONNECTION_SELECT_ADDRESS => {
                self.connection_select = value & 0x3F;
                log::debug!("4-op connections: {:06b}", self.connection_select);
                self.set_four_op_connections();
            }
            NEW_ADDRESS => {
                let opl3_mode = value.bit(0);
                let newly_enabled = opl3_mode && !self.context.opl3_mode;
                if opl3_mode != self.context.opl3_mode {
                    log::debug!("OPL3 mode enabled: {opl3_mode}");
                }

                self.context.opl3_mode = opl3_mode;
                if newly_enabled {
                    self.enable_all_outputs();
                }
                self.set_four_op_connections();
            }
            _ => {}
        }
    }

    fn write_operator_register(&mut self, array: u8, address: u8) {
        let Some(id) = self.operators.slot(array, address & 0x1F) else {
            return;
        };

        let operator = self.operators.get_mut(id);
        match address & 0xE0 {
            0x20 => operator.update_am_vib_egt_ksr_mult(&self.registers),
            0x40 => operator.update_ksl_tl(&self.registers),
            0x60 => operator.update_ar_dr(&self.registers),
            0x80 => operator.update_sl_rr(&self.registers),
            0xE0 => operator.update_waveform_select(&self.registers),
            _ => {}
        }
    }

    fn update_channel_slot(&mut self, array: u8, index: u8, update: ChannelUpdateFn) {
        if index as usize >= CHANNELS_PER_ARRAY {
            return;
        }

        let id = self.channels.slot(array, index);
        update(self.channels.get_mut(id), &self.registers, &mut self.operators, &self.context);
    }

    fn write_rhythm_register(&mut self) {
        let value = self.registers.read(RHYTHM_ADDRESS);
        self.context.deep_tremolo = value.bit(7);
        self.context.deep_vibrato = value.bit(6);

        // Drum keys only count as held while rhythm mode is on, so leaving rhythm mode releases
        // every held drum even when the same write also clears its key bit
        let old_keys = if self.rhythm.enabled { self.rhythm.key_bits } else { 0 };

        let rhythm_enabled = value.bit(5);
        if rhythm_enabled != self.rhythm.enabled {
            self.rhythm.enabled = rhythm_enabled;
            self.set_rhythm_mode();
        }

        log::trace!(
            "DAM: {}, DVB: {}, rhythm mode enabled: {rhythm_enabled}",
            self.context.deep_tremolo,
            self.context.deep_vibrato
        );

        let key_bits = value & 0x1F;
        self.rhythm.key_bits = key_bits;

        let new_keys = if rhythm_enabled { key_bits } else { 0 };
        let changed = old_keys ^ new_keys;

        for (bit, name, operators) in RHYTHM_VOICES {
            if !changed.bit(bit) {
                continue;
            }

            let key_on = new_keys.bit(bit);
            log::trace!("  {name} on: {key_on}");

            for &id in operators {
                let operator = self.operators.get_mut(id);
                if key_on {
                    operator.key_on();
                } else {
                    operator.key_off();
                }
            }
        }
    }

    fn set_rhythm_mode(&mut self) {
        let enabled = self.rhythm.enabled;
        log::debug!("Rhythm mode enabled: {enabled}");

        let rhythm_channels =
            [ChannelId::BASS_DRUM, ChannelId::HIGH_HAT_SNARE_DRUM, ChannelId::TOM_TOM_TOP_CYMBAL];
        for (index, rhythm_id) in (6..9).zip(rhythm_channels) {
            let id = if enabled { rhythm_id } else { ChannelId::two_op(0, index) };
            self.channels.set_slot(0, index, id);
        }
        self.operators.set_rhythm_mode(enabled);

        for index in 6..9 {
            self.update_channel_slot(0, index, Channel::update_channel);
        }
    }

    // Force every output bit on so that channels written in OPL2 mode stay audible
    fn enable_all_outputs(&mut self) {
        for array in 0..2 {
            for index in 0..CHANNELS_PER_ARRAY as u8 {
                let id = self.channels.slot(array, index);
                let channel = self.channels.get_mut(id);
                if channel.kind() == ChannelKind::Disabled {
                    continue;
                }

                let address = channel.base_address() + PANNING_FEEDBACK_CONNECTION;
                self.registers.write(address, self.registers.read(address) | 0xF0);
                channel.update_panning_feedback_connection(
                    &self.registers,
                    &mut self.operators,
                    &self.context,
                );
            }
        }
    }

    fn set_four_op_connections(&mut self) {
        for array in 0..2 {
            for index in 0..3 {
                let four_op_bit = self.connection_select.bit(array * 3 + index);
                if self.context.opl3_mode && four_op_bit {
                    self.channels.set_slot(array, index, ChannelId::four_op(array, index));
                    self.channels.set_slot(array, index + 3, ChannelId::DISABLED);
                    self.update_channel_slot(array, index, Channel::update_channel);
                } else {
                    self.channels.set_slot(array, index, ChannelId::two_op(array, index));
                    self.channels.set_slot(array, index + 3, ChannelId::two_op(array, index + 3));
                    self.update_channel_slot(array, index, Channel::update_channel);
                    self.update_channel_slot(array, index + 3, Channel::update_channel);
                }
            }
        }
    }

    /// Produce one sample for each of the 4 output channels and advance the chip by one sample
    /// period. Should be called at [`SAMPLE_RATE`].
    ///
    /// Samples that would exceed the 16-bit range are saturated.
    #[must_use]
    pub fn read(&mut self) -> [i16; OUTPUT_CHANNELS] {
        let arrays = if self.context.opl3_mode { 2 } else { 1 };

        let mut buffer = [0.0; OUTPUT_CHANNELS];
        for array in 0..arrays {
            for index in 0..CHANNELS_PER_ARRAY as u8 {
                let id = self.channels.slot(array, index);
                let output = self.channels.get_mut(id).output(
                    &mut self.operators,
                    &self.registers,
                    &self.context,
                    &mut self.noise,
                );
                for (sum, sample) in buffer.iter_mut().zip(output) {
                    *sum += sample;
                }
            }
        }

        self.context.advance();

        buffer.map(|sample| (sample / MAX_CHANNELS * f64::from(i16::MAX)) as i16)
    }

    /// Raw register value as last written, or None if `register` is outside `0x000..=0x1FF`
    #[must_use]
    pub fn register(&self, register: u16) -> Option<u8> {
        self.registers.get(register)
    }

    #[must_use]
    pub fn is_opl3_mode(&self) -> bool {
        self.context.opl3_mode
    }

    #[must_use]
    pub fn is_rhythm_mode(&self) -> bool {
        self.rhythm.enabled
    }

    /// CONNECTIONSEL bits; bit `array * 3 + n` pairs channels n and n+3 of that array
    #[must_use]
    pub fn four_op_connections(&self) -> u8 {
        self.connection_select
    }

    #[must_use]
    pub fn vibrato_index(&self) -> u16 {
        self.context.vibrato_index
    }

    #[must_use]
    pub fn tremolo_index(&self) -> u16 {
        self.context.tremolo_index
    }

    /// Envelope stage of the operator currently mapped to operator register offset `offset`
    #[must_use]
    pub fn operator_envelope_stage(&self, array: u8, offset: u8) -> Option<EnvelopeStage> {
        self.operators.slot(array, offset).map(|id| self.operators.get(id).envelope_stage())
    }
}

impl Default for Ymf262 {
    fn default() -> Self {
        Self::new(Ymf262Config::default())
    }
}

#[cfg(test)]
mod tests;
