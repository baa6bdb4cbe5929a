//! Symbol codec: turns a completed selection into the code sent to `/connect`.

use thiserror::Error;

use crate::model::{SessionCode, Symbol};

/// Number of symbols making up a session code.
pub const CODE_LENGTH: usize = 4;

/// Errors that can occur while encoding a symbol sequence.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("a session code needs exactly {CODE_LENGTH} symbols, got {0}")]
    InvalidSequenceLength(usize),
}

/// Encodes exactly four symbols into `0x` followed by one hex digit per symbol,
/// in selection order.
///
/// # Errors
///
/// Returns `CodecError::InvalidSequenceLength` for any other sequence length.
pub fn encode(sequence: &[Symbol]) -> Result<SessionCode, CodecError> {
    if sequence.len() != CODE_LENGTH {
        return Err(CodecError::InvalidSequenceLength(sequence.len()));
    }

    let mut code = String::with_capacity(2 + CODE_LENGTH);
    code.push_str("0x");
    code.extend(sequence.iter().map(|symbol| symbol.hex_digit()));

    Ok(SessionCode::from_encoded(code))
}
