use crate::ChipContext;
use crate::noise::NoiseGenerator;
use crate::num::GetBit;
use crate::operator::{OperatorId, Operators};
use crate::registers::{
    F_NUMBER_LOW, KEY_ON_BLOCK_F_NUMBER_HIGH, PANNING_FEEDBACK_CONNECTION, RegisterFile,
};
use crate::tables::FEEDBACK_TABLE;
use bincode::{Decode, Encode};
use std::array;

pub(crate) const CHANNELS_PER_ARRAY: usize = 9;

const TWO_OP_CHANNELS: usize = 2 * CHANNELS_PER_ARRAY;
const FOUR_OP_CHANNELS_PER_ARRAY: usize = 3;
const CHANNEL_COUNT: usize = TWO_OP_CHANNELS + 2 * FOUR_OP_CHANNELS_PER_ARRAY + 4;

// Operator output is scaled by this before being used as another operator's phase modulation
const TO_PHASE: f64 = 4.0;

const NO_MODULATOR: f64 = 0.0;

/// Index into the fixed channel arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub(crate) struct ChannelId(u8);

impl ChannelId {
    pub(crate) const DISABLED: Self = Self(CHANNEL_COUNT as u8 - 4);
    pub(crate) const BASS_DRUM: Self = Self(CHANNEL_COUNT as u8 - 3);
    pub(crate) const HIGH_HAT_SNARE_DRUM: Self = Self(CHANNEL_COUNT as u8 - 2);
    pub(crate) const TOM_TOM_TOP_CYMBAL: Self = Self(CHANNEL_COUNT as u8 - 1);

    pub(crate) fn two_op(array: u8, index: u8) -> Self {
        Self(array * CHANNELS_PER_ARRAY as u8 + index)
    }

    pub(crate) fn four_op(array: u8, index: u8) -> Self {
        Self(TWO_OP_CHANNELS as u8 + array * FOUR_OP_CHANNELS_PER_ARRAY as u8 + index)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub(crate) enum ChannelKind {
    TwoOp([OperatorId; 2]),
    FourOp([OperatorId; 4]),
    // Second half of a 4-op pair
    Disabled,
    BassDrum([OperatorId; 2]),
    // High hat + snare drum, or tom-tom + top cymbal
    Rhythm([OperatorId; 2]),
}

impl ChannelKind {
    fn operators(&self) -> &[OperatorId] {
        match self {
            Self::TwoOp(operators) | Self::BassDrum(operators) | Self::Rhythm(operators) => {
                operators
            }
            Self::FourOp(operators) => operators,
            Self::Disabled => &[],
        }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct Channel {
    kind: ChannelKind,
    base_address: u16,
    f_number_low: u8,
    f_number_high: u8,
    block: u8,
    key_on: bool,
    // Output channels A/B/C/D
    panning: [bool; 4],
    feedback_level: u8,
    // false = FM (series), true = AM (parallel)
    connection: bool,
    // Last two raw outputs of the first operator, scaled by the feedback level
    feedback: [f64; 2],
}

impl Channel {
    fn new(kind: ChannelKind, base_address: u16) -> Self {
        Self {
            kind,
            base_address,
            f_number_low: 0,
            f_number_high: 0,
            block: 0,
            key_on: false,
            panning: [false; 4],
            feedback_level: 0,
            connection: false,
            feedback: [0.0; 2],
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if !self.kind.operators().iter().all(|id| id.is_valid()) {
            return Err("channel operator out of range");
        }

        if self.feedback_level > 0x07 || self.block > 0x07 || self.f_number_high > 0x03 {
            return Err("channel feedback or frequency out of range");
        }

        Ok(())
    }

    pub(crate) fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub(crate) fn base_address(&self) -> u16 {
        self.base_address
    }

    pub(crate) fn update_key_on_block_f_number_high(
        &mut self,
        registers: &RegisterFile,
        operators: &mut Operators,
        context: &ChipContext,
    ) {
        let value = registers.read(self.base_address + KEY_ON_BLOCK_F_NUMBER_HIGH);
        self.block = (value >> 2) & 0x07;
        self.f_number_high = value & 0x03;

        log::trace!(
            "Channel {:03X}: block={}, F-number={:03X}",
            self.base_address,
            self.block,
            self.f_number()
        );

        self.update_operators(registers, operators, context);

        let key_on = value.bit(5);
        if key_on != self.key_on {
            log::trace!("Channel {:03X}: key on {key_on}", self.base_address);

            if key_on {
                self.key_on(operators);
            } else {
                self.key_off(operators);
            }
        }
        self.key_on = key_on;
    }

    pub(crate) fn update_f_number_low(
        &mut self,
        registers: &RegisterFile,
        operators: &mut Operators,
        context: &ChipContext,
    ) {
        self.f_number_low = registers.read(self.base_address + F_NUMBER_LOW);

        log::trace!("Channel {:03X}: F-number={:03X}", self.base_address, self.f_number());

        self.update_operators(registers, operators, context);
    }

    pub(crate) fn update_panning_feedback_connection(
        &mut self,
        registers: &RegisterFile,
        operators: &mut Operators,
        context: &ChipContext,
    ) {
        let value = registers.read(self.base_address + PANNING_FEEDBACK_CONNECTION);
        self.panning = [value.bit(4), value.bit(5), value.bit(6), value.bit(7)];
        self.feedback_level = (value >> 1) & 0x07;
        self.connection = value.bit(0);

        log::trace!(
            "Channel {:03X}: panning={:?}, feedback={}, connection={}",
            self.base_address,
            self.panning,
            self.feedback_level,
            u8::from(self.connection)
        );

        self.update_operators(registers, operators, context);
    }

    pub(crate) fn update_channel(
        &mut self,
        registers: &RegisterFile,
        operators: &mut Operators,
        context: &ChipContext,
    ) {
        self.update_key_on_block_f_number_high(registers, operators, context);
        self.update_f_number_low(registers, operators, context);
        self.update_panning_feedback_connection(registers, operators, context);
    }

    fn f_number(&self) -> u16 {
        (u16::from(self.f_number_high) << 8) | u16::from(self.f_number_low)
    }

    fn update_operators(
        &self,
        registers: &RegisterFile,
        operators: &mut Operators,
        context: &ChipContext,
    ) {
        let note_select_bit = (self.f_number_high >> u8::from(context.note_select)) & 0x01;
        let key_scale_number = self.block * 2 + note_select_bit;
        let f_number = self.f_number();

        for &id in self.kind.operators() {
            let operator = operators.get_mut(id);
            operator.update_operator(registers, key_scale_number, f_number, self.block);
        }
    }

    // Rhythm voices are keyed through the rhythm register instead of the channel key on bit
    fn key_on(&mut self, operators: &mut Operators) {
        if let ChannelKind::TwoOp(_) | ChannelKind::FourOp(_) = self.kind {
            for &id in self.kind.operators() {
                operators.get_mut(id).key_on();
            }
            self.feedback = [0.0; 2];
        }
    }

    fn key_off(&mut self, operators: &mut Operators) {
        if let ChannelKind::TwoOp(_) | ChannelKind::FourOp(_) = self.kind {
            for &id in self.kind.operators() {
                operators.get_mut(id).key_off();
            }
        }
    }

    /// Produce one sample for each of the 4 output channels
    pub(crate) fn output(
        &mut self,
        operators: &mut Operators,
        registers: &RegisterFile,
        context: &ChipContext,
        noise: &mut NoiseGenerator,
    ) -> [f64; 4] {
        let sample = match self.kind {
            ChannelKind::TwoOp(ids) => self.two_op_output(ids, operators, context, noise),
            ChannelKind::FourOp(ids) => {
                self.four_op_output(ids, operators, registers, context, noise)
            }
            ChannelKind::Disabled => None,
            ChannelKind::BassDrum(ids) => {
                // Bass drum mutes its first operator in series mode
                if !self.connection {
                    operators.get_mut(ids[0]).clear_attack_rate();
                }
                self.two_op_output(ids, operators, context, noise)
            }
            ChannelKind::Rhythm([op1, op2]) => {
                // Both operators always run so that their phases stay current for each other
                let op1_output = operators.output(op1, NO_MODULATOR, context, noise);
                let op2_output = operators.output(op2, NO_MODULATOR, context, noise);
                Some((op1_output + op2_output) / 2.0)
            }
        };

        match sample {
            Some(sample) => self.pan(sample, context),
            None => [0.0; 4],
        }
    }

    // Returns None without running any operators if the output stage is silent
    fn two_op_output(
        &mut self,
        [op1, op2]: [OperatorId; 2],
        operators: &mut Operators,
        context: &ChipContext,
        noise: &mut NoiseGenerator,
    ) -> Option<f64> {
        let feedback = (self.feedback[0] + self.feedback[1]) / 2.0;

        let (op1_output, output) = if !self.connection {
            if operators.get(op2).is_off() {
                return None;
            }

            let op1_output = operators.output(op1, feedback, context, noise);
            let op2_output = operators.output(op2, op1_output * TO_PHASE, context, noise);
            (op1_output, op2_output)
        } else {
            if operators.get(op1).is_off() && operators.get(op2).is_off() {
                return None;
            }

            let op1_output = operators.output(op1, feedback, context, noise);
            let op2_output = operators.output(op2, NO_MODULATOR, context, noise);
            (op1_output, (op1_output + op2_output) / 2.0)
        };

        self.push_feedback(op1_output);
        Some(output)
    }

    fn four_op_output(
        &mut self,
        [op1, op2, op3, op4]: [OperatorId; 4],
        operators: &mut Operators,
        registers: &RegisterFile,
        context: &ChipContext,
        noise: &mut NoiseGenerator,
    ) -> Option<f64> {
        // Connection is formed from this channel's CNT bit and the CNT bit of the channel 3 ahead
        let partner_connection =
            registers.read(self.base_address + 3 + PANNING_FEEDBACK_CONNECTION) & 0x01;
        let connection = (u8::from(self.connection) << 1) | partner_connection;

        let is_off = |id: OperatorId| operators.get(id).is_off();
        let silent = match connection {
            0 => is_off(op4),
            1 => is_off(op2) && is_off(op4),
            2 => is_off(op1) && is_off(op4),
            _ => is_off(op1) && is_off(op3) && is_off(op4),
        };
        if silent {
            return None;
        }

        let feedback = (self.feedback[0] + self.feedback[1]) / 2.0;
        let op1_output = operators.output(op1, feedback, context, noise);

        let output = match connection {
            // FM-FM-FM
            0 => {
                let op2_output = operators.output(op2, op1_output * TO_PHASE, context, noise);
                let op3_output = operators.output(op3, op2_output * TO_PHASE, context, noise);
                operators.output(op4, op3_output * TO_PHASE, context, noise)
            }
            // FM + FM
            1 => {
                let op2_output = operators.output(op2, op1_output * TO_PHASE, context, noise);
                let op3_output = operators.output(op3, NO_MODULATOR, context, noise);
                let op4_output = operators.output(op4, op3_output * TO_PHASE, context, noise);
                (op2_output + op4_output) / 2.0
            }
            // AM + FM-FM
            2 => {
                let op2_output = operators.output(op2, NO_MODULATOR, context, noise);
                let op3_output = operators.output(op3, op2_output * TO_PHASE, context, noise);
                let op4_output = operators.output(op4, op3_output * TO_PHASE, context, noise);
                (op1_output + op4_output) / 2.0
            }
            // AM + FM + AM
            _ => {
                let op2_output = operators.output(op2, NO_MODULATOR, context, noise);
                let op3_output = operators.output(op3, op2_output * TO_PHASE, context, noise);
                let op4_output = operators.output(op4, NO_MODULATOR, context, noise);
                (op1_output + op3_output + op4_output) / 3.0
            }
        };

        self.push_feedback(op1_output);
        Some(output)
    }

    fn push_feedback(&mut self, op1_output: f64) {
        self.feedback[0] = self.feedback[1];
        self.feedback[1] = (op1_output * FEEDBACK_TABLE[self.feedback_level as usize]) % 1.0;
    }

    fn pan(&self, sample: f64, context: &ChipContext) -> [f64; 4] {
        // OPL2 mode has no panning
        if !context.opl3_mode {
            return [sample; 4];
        }

        self.panning.map(|enabled| if enabled { sample } else { 0.0 })
    }
}

/// All channel variants in the chip, plus the per-array table selecting which variant currently
/// occupies each of the 9 channel slots
#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct Channels {
    arena: [Channel; CHANNEL_COUNT],
    slots: [[ChannelId; CHANNELS_PER_ARRAY]; 2],
}

impl Channels {
    pub(crate) fn new() -> Self {
        let arena = array::from_fn(|i| {
            let i = i as u8;
            if i < TWO_OP_CHANNELS as u8 {
                let array = i / CHANNELS_PER_ARRAY as u8;
                let index = i % CHANNELS_PER_ARRAY as u8;
                let op1 = (index / 3) * 8 + index % 3;
                let kind = ChannelKind::TwoOp([
                    OperatorId::melodic(array, op1),
                    OperatorId::melodic(array, op1 + 3),
                ]);
                Channel::new(kind, channel_base_address(array, index))
            } else if i < ChannelId::DISABLED.0 {
                let i = i - TWO_OP_CHANNELS as u8;
                let array = i / FOUR_OP_CHANNELS_PER_ARRAY as u8;
                let index = i % FOUR_OP_CHANNELS_PER_ARRAY as u8;
                let kind = ChannelKind::FourOp(
                    [index, index + 3, index + 8, index + 0x0B]
                        .map(|offset| OperatorId::melodic(array, offset)),
                );
                Channel::new(kind, channel_base_address(array, index))
            } else if i == ChannelId::DISABLED.0 {
                Channel::new(ChannelKind::Disabled, 0)
            } else if i == ChannelId::BASS_DRUM.0 {
                let kind = ChannelKind::BassDrum([
                    OperatorId::melodic(0, 0x10),
                    OperatorId::melodic(0, 0x13),
                ]);
                Channel::new(kind, 6)
            } else if i == ChannelId::HIGH_HAT_SNARE_DRUM.0 {
                Channel::new(
                    ChannelKind::Rhythm([OperatorId::HIGH_HAT, OperatorId::SNARE_DRUM]),
                    7,
                )
            } else {
                Channel::new(
                    ChannelKind::Rhythm([OperatorId::TOM_TOM, OperatorId::TOP_CYMBAL]),
                    8,
                )
            }
        });

        let slots =
            array::from_fn(|array| array::from_fn(|i| ChannelId::two_op(array as u8, i as u8)));

        Self { arena, slots }
    }

    pub(crate) fn slot(&self, array: u8, index: u8) -> ChannelId {
        self.slots[usize::from(array & 0x01)][index as usize]
    }

    pub(crate) fn set_slot(&mut self, array: u8, index: u8, id: ChannelId) {
        self.slots[usize::from(array & 0x01)][index as usize] = id;
    }

    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if self.slots.iter().flatten().any(|id| id.index() >= CHANNEL_COUNT) {
            return Err("channel slot out of range");
        }

        self.arena.iter().try_for_each(Channel::validate)
    }

    #[cfg(test)]
    pub(crate) fn get(&self, id: ChannelId) -> &Channel {
        &self.arena[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: ChannelId) -> &mut Channel {
        &mut self.arena[id.index()]
    }
}

fn channel_base_address(array: u8, index: u8) -> u16 {
    (u16::from(array) << 8) | u16::from(index)
}
