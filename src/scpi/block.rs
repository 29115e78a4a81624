//! IEEE 488.2 block and delimited-ASCII codec.
//!
//! Trace and waveform data travel either as a definite-length binary block
//!
//! ```text
//! #<ndigits><length><payload bytes>[terminator]
//! ```
//!
//! e.g. `#3032` followed by 32 bytes, as an indefinite-length block (`#0`
//! followed by payload up to the terminator), or as plain ASCII numbers
//! separated by commas, semicolons or newlines.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{DriverError, DriverResult};

/// Byte order of multi-byte block elements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Least significant byte first (`FORM:BORD SWAP`)
    #[default]
    Little,
    /// Most significant byte first (`FORM:BORD NORM`)
    Big,
}

/// Numeric element type that can be carried in a block or as ASCII text.
pub trait BlockValue: Copy + FromStr {
    /// Encoded width in bytes
    const WIDTH: usize;

    /// Decode one element; `bytes` is exactly `WIDTH` long.
    fn decode(bytes: &[u8], order: ByteOrder) -> Self;

    /// Append the encoded element to `out`.
    fn encode(self, order: ByteOrder, out: &mut BytesMut);
}

macro_rules! impl_block_value {
    ($ty:ty, $width:expr, $get_be:ident, $get_le:ident, $put_be:ident, $put_le:ident) => {
        impl BlockValue for $ty {
            const WIDTH: usize = $width;

            fn decode(mut bytes: &[u8], order: ByteOrder) -> Self {
                match order {
                    ByteOrder::Little => bytes.$get_le(),
                    ByteOrder::Big => bytes.$get_be(),
                }
            }

            fn encode(self, order: ByteOrder, out: &mut BytesMut) {
                match order {
                    ByteOrder::Little => out.$put_le(self),
                    ByteOrder::Big => out.$put_be(self),
                }
            }
        }
    };
}

impl_block_value!(f32, 4, get_f32, get_f32_le, put_f32, put_f32_le);
impl_block_value!(f64, 8, get_f64, get_f64_le, put_f64, put_f64_le);
impl_block_value!(i16, 2, get_i16, get_i16_le, put_i16, put_i16_le);
impl_block_value!(i32, 4, get_i32, get_i32_le, put_i32, put_i32_le);

/// How much more of a reply must be read before it is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The message is complete.
    Complete,
    /// A definite-length block still lacks this many payload bytes.
    NeedBytes(usize),
    /// The block payload is complete but its trailing terminator is unread.
    NeedTerminator,
}

/// Decide whether `data` (as read so far, up to and including a terminator
/// byte) holds a complete reply.
///
/// Only definite-length blocks can be incomplete here: their payload may
/// contain the terminator byte, so the first terminator seen is not
/// necessarily the end of the message.
pub fn completion(data: &[u8], terminator: u8) -> Completion {
    let Some((header_len, payload_len)) = definite_header(data) else {
        return Completion::Complete;
    };
    let total = header_len + payload_len;
    if data.len() < total {
        Completion::NeedBytes(total - data.len())
    } else if data.len() == total || data[total..].last() != Some(&terminator) {
        Completion::NeedTerminator
    } else {
        Completion::Complete
    }
}

/// `(header length, payload length)` of a definite-length block, if `data`
/// starts with a well-formed one.
fn definite_header(data: &[u8]) -> Option<(usize, usize)> {
    let start = data.iter().position(|b| !b.is_ascii_whitespace())?;
    let data = &data[start..];
    if data.first() != Some(&b'#') {
        return None;
    }
    let ndigits = (*data.get(1)? as char).to_digit(10)? as usize;
    if ndigits == 0 {
        return None;
    }
    let digits = std::str::from_utf8(data.get(2..2 + ndigits)?).ok()?;
    let payload_len = digits.parse::<usize>().ok()?;
    Some((start + 2 + ndigits, payload_len))
}

/// Extract the payload of a block reply.
///
/// # Errors
/// `Parse` if the reply does not start with `#`, the header digits are
/// malformed, or the payload is shorter than the header announces.
pub fn block_payload(data: &[u8]) -> DriverResult<&[u8]> {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .ok_or_else(|| DriverError::Parse("empty block reply".to_string()))?;
    let data = &data[start..];

    if data[0] != b'#' {
        return Err(DriverError::Parse(format!(
            "block reply must start with '#', got {:?}",
            data[0] as char
        )));
    }
    let ndigits = data
        .get(1)
        .and_then(|b| (*b as char).to_digit(10))
        .ok_or_else(|| DriverError::Parse("block header is missing its digit count".to_string()))?
        as usize;

    if ndigits == 0 {
        // Indefinite length: payload runs to the terminator
        let mut payload = &data[2..];
        if payload.last() == Some(&b'\n') {
            payload = &payload[..payload.len() - 1];
        }
        if payload.last() == Some(&b'\r') {
            payload = &payload[..payload.len() - 1];
        }
        return Ok(payload);
    }

    let digits = data
        .get(2..2 + ndigits)
        .and_then(|d| std::str::from_utf8(d).ok())
        .ok_or_else(|| DriverError::Parse("block header is truncated".to_string()))?;
    let length = digits.parse::<usize>().map_err(|_| {
        DriverError::Parse(format!("block length '{}' is not a number", digits))
    })?;

    let start = 2 + ndigits;
    let available = data.len() - start;
    if available < length {
        return Err(DriverError::Parse(format!(
            "block payload truncated: header announces {} bytes, got {}",
            length, available
        )));
    }
    Ok(&data[start..start + length])
}

/// Decode a block reply into elements of `T`.
///
/// # Errors
/// `Parse` on a malformed header or a payload that is not a whole number of
/// elements.
pub fn decode_block<T: BlockValue>(data: &[u8], order: ByteOrder) -> DriverResult<Vec<T>> {
    let payload = block_payload(data)?;
    if payload.len() % T::WIDTH != 0 {
        return Err(DriverError::Parse(format!(
            "block payload of {} bytes is not a multiple of the {}-byte element size",
            payload.len(),
            T::WIDTH
        )));
    }
    Ok(payload
        .chunks_exact(T::WIDTH)
        .map(|chunk| T::decode(chunk, order))
        .collect())
}

/// Parse a delimited ASCII reply (`,` `;` or newline separated).
///
/// # Errors
/// `Parse` on any token that is not a number.
pub fn parse_ascii_values<T: BlockValue>(text: &str) -> DriverResult<Vec<T>> {
    text.split(|c: char| c == ',' || c == ';' || c == '\n' || c == '\r')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<T>()
                .map_err(|_| DriverError::Parse(format!("'{}' is not a number", token)))
        })
        .collect()
}

/// Parse a reply that may be either a binary block or delimited ASCII.
pub fn parse_values<T: BlockValue>(data: &[u8], order: ByteOrder) -> DriverResult<Vec<T>> {
    let first = data.iter().find(|b| !b.is_ascii_whitespace());
    if first == Some(&b'#') {
        return decode_block(data, order);
    }
    let text = std::str::from_utf8(data)
        .map_err(|_| DriverError::Parse("ASCII reply is not valid UTF-8".to_string()))?;
    parse_ascii_values(text)
}

/// Encode `values` as a definite-length block (header plus payload).
pub fn encode_block<T: BlockValue>(values: &[T], order: ByteOrder) -> BytesMut {
    let mut payload = BytesMut::with_capacity(values.len() * T::WIDTH);
    for value in values {
        value.encode(order, &mut payload);
    }

    let length = payload.len().to_string();
    let mut block = BytesMut::with_capacity(2 + length.len() + payload.len());
    block.put_u8(b'#');
    block.put_slice(length.len().to_string().as_bytes());
    block.put_slice(length.as_bytes());
    block.put(payload);
    block
}
