//! ZeroMQ Z85 (RFC 32) text encoding.
//!
//! Stored objects travel as Z85 text; the gateway only checks the alphabet, clients
//! encode and decode.

use thiserror::Error;

const ALPHABET: &[u8; 85] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ.-:+=^!/*?&<>()[]{}@%$#";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Z85Error {
    #[error("input length {0} is not a multiple of {1}")]
    Length(usize, usize),

    #[error("byte 0x{0:02x} is outside the z85 alphabet")]
    Alphabet(u8),

    #[error("group does not fit in 32 bits")]
    Overflow,
}

pub fn is_z85_byte(byte: u8) -> bool {
    digit(byte).is_some()
}

/// Whether every byte of `text` belongs to the alphabet.
pub fn is_z85(text: &[u8]) -> bool {
    text.iter().all(|&byte| is_z85_byte(byte))
}

fn digit(byte: u8) -> Option<u32> {
    ALPHABET.iter().position(|&c| c == byte).and_then(|index| u32::try_from(index).ok())
}

/// # Errors
///
/// The input length must be a multiple of 4.
pub fn encode(data: &[u8]) -> Result<String, Z85Error> {
    if data.len() % 4 != 0 {
        return Err(Z85Error::Length(data.len(), 4));
    }

    let mut text = String::with_capacity(data.len() / 4 * 5);
    for group in data.chunks_exact(4) {
        let mut value = u32::from_be_bytes([group[0], group[1], group[2], group[3]]);
        let mut digits = [0u8; 5];
        for slot in digits.iter_mut().rev() {
            *slot = ALPHABET[(value % 85) as usize];
            value /= 85;
        }
        text.extend(digits.iter().map(|&c| char::from(c)));
    }
    Ok(text)
}

/// # Errors
///
/// The input length must be a multiple of 5 and every byte in the alphabet.
pub fn decode(text: &[u8]) -> Result<Vec<u8>, Z85Error> {
    if text.len() % 5 != 0 {
        return Err(Z85Error::Length(text.len(), 5));
    }

    let mut data = Vec::with_capacity(text.len() / 5 * 4);
    for group in text.chunks_exact(5) {
        let mut value: u32 = 0;
        for &byte in group {
            let digit = digit(byte).ok_or(Z85Error::Alphabet(byte))?;
            value = value.checked_mul(85).and_then(|v| v.checked_add(digit)).ok_or(Z85Error::Overflow)?;
        }
        data.extend_from_slice(&value.to_be_bytes());
    }
    Ok(data)
}
