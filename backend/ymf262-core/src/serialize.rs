use crate::{Ymf262, tables};
use bincode::config::{Fixint, LittleEndian};
use bincode::error::{DecodeError, EncodeError};
use std::io;
use std::io::{BufReader, BufWriter};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SaveStateError {
    #[error("error saving YMF262 state: {source}")]
    Serialization {
        #[from]
        source: EncodeError,
    },
    #[error("error loading YMF262 state: {source}")]
    Deserialization {
        #[from]
        source: DecodeError,
    },
    #[error("error loading YMF262 state: {0}")]
    InvalidState(&'static str),
}

const BINCODE_CONFIG: bincode::config::Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_little_endian().with_fixed_int_encoding();

/// Serialize the complete chip state, including the noise generator and LFO positions.
///
/// # Errors
///
/// Propagates any error from encoding or from the underlying writer.
pub fn save_state<W>(chip: &Ymf262, writer: W) -> Result<(), SaveStateError>
where
    W: io::Write,
{
    let mut writer = BufWriter::new(writer);

    bincode::encode_into_std_write(chip, &mut writer, BINCODE_CONFIG)?;

    Ok(())
}

/// # Errors
///
/// Returns an error if the data cannot be decoded as a chip, or if it decodes to a chip whose
/// table positions, operator and channel indices, or register fields are out of range.
pub fn load_state<R>(reader: R) -> Result<Ymf262, SaveStateError>
where
    R: io::Read,
{
    // Lookup tables are not part of the state
    tables::initialize();

    let mut reader = BufReader::new(reader);

    let chip: Ymf262 = bincode::decode_from_std_read(&mut reader, BINCODE_CONFIG)?;
    chip.validate().map_err(SaveStateError::InvalidState)?;

    Ok(chip)
}
