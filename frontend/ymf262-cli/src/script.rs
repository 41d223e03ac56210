//! Text register-write scripts: one `<sample> <array> <address> <value>` write per line

use thiserror::Error;
use ymf262_core::TimedWrite;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("line {line}: expected 4 fields (sample array address value), found {found}")]
    WrongFieldCount { line: usize, found: usize },
    #[error("line {line}: invalid number '{token}'")]
    InvalidNumber { line: usize, token: String },
    #[error("line {line}: {field} '{token}' is out of range (max {max:#X})")]
    ValueOutOfRange { line: usize, field: &'static str, token: String, max: u64 },
    #[error("line {line}: timestamp {sample} is earlier than the previous timestamp {previous}")]
    OutOfOrder { line: usize, sample: u64, previous: u64 },
}

fn parse_number(token: &str, line: usize) -> Result<u64, ScriptError> {
    let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => token.parse(),
    };

    parsed.map_err(|_| ScriptError::InvalidNumber { line, token: token.into() })
}

fn parse_field(token: &str, line: usize, field: &'static str, max: u8) -> Result<u8, ScriptError> {
    let value = parse_number(token, line)?;
    u8::try_from(value).ok().filter(|&value| value <= max).ok_or_else(|| {
        ScriptError::ValueOutOfRange { line, field, token: token.into(), max: max.into() }
    })
}

/// Parse a whole script into writes ordered by timestamp.
///
/// # Errors
///
/// Returns the first malformed line, see [`ScriptError`].
pub fn parse(script: &str) -> Result<Vec<TimedWrite>, ScriptError> {
    let mut writes = Vec::new();
    let mut previous = 0;

    for (i, line) in script.lines().enumerate() {
        let line_number = i + 1;

        let content = line.split_once('#').map_or(line, |(content, _)| content);
        let tokens: Vec<_> = content.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }

        let &[sample, array, address, value] = tokens.as_slice() else {
            return Err(ScriptError::WrongFieldCount { line: line_number, found: tokens.len() });
        };

        let sample = parse_number(sample, line_number)?;
        if sample < previous {
            return Err(ScriptError::OutOfOrder { line: line_number, sample, previous });
        }
        previous = sample;

        writes.push(TimedWrite {
            sample,
            array: parse_field(array, line_number, "array", 1)?,
            address: parse_field(address, line_number, "address", u8::MAX)?,
            value: parse_field(value, line_number, "value", u8::MAX)?,
        });
    }

    Ok(writes)
}
