use bincode::{Decode, Encode};

/// Size of the logical register space, two arrays of 256 bytes addressed as `array << 8 | address`
pub const REGISTER_FILE_LEN: usize = 0x200;

// Global registers
pub(crate) const NOTE_SELECT_ADDRESS: u16 = 0x008;
pub(crate) const RHYTHM_ADDRESS: u16 = 0x0BD;
pub(crate) const CONNECTION_SELECT_ADDRESS: u16 = 0x104;
pub(crate) const NEW_ADDRESS: u16 = 0x105;

// Operator register blocks, relative to an operator's base address
pub(crate) const AM_VIB_EGT_KSR_MULT: u16 = 0x20;
pub(crate) const KSL_TL: u16 = 0x40;
pub(crate) const AR_DR: u16 = 0x60;
pub(crate) const SL_RR: u16 = 0x80;
pub(crate) const WAVEFORM_SELECT: u16 = 0xE0;

// Channel register blocks, relative to a channel's base address
pub(crate) const F_NUMBER_LOW: u16 = 0xA0;
pub(crate) const KEY_ON_BLOCK_F_NUMBER_HIGH: u16 = 0xB0;
pub(crate) const PANNING_FEEDBACK_CONNECTION: u16 = 0xC0;

/// Raw register bytes exactly as written. Every decoded field in the chip is derived from these.
#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct RegisterFile {
    bytes: [u8; REGISTER_FILE_LEN],
}

impl RegisterFile {
    pub(crate) fn new() -> Self {
        Self { bytes: [0; REGISTER_FILE_LEN] }
    }

    pub(crate) fn get(&self, address: u16) -> Option<u8> {
        self.bytes.get(address as usize).copied()
    }

    // Addresses passed here are always derived from operator/channel base addresses, which are
    // in range by construction
    pub(crate) fn read(&self, address: u16) -> u8 {
        self.bytes[address as usize & (REGISTER_FILE_LEN - 1)]
    }

    pub(crate) fn write(&mut self, address: u16, value: u8) {
        self.bytes[address as usize & (REGISTER_FILE_LEN - 1)] = value;
    }
}
