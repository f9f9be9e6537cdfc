//! Little-endian winnow readers shared by the texture, material, geometry and mesh parsers.
//!
//! Every reader consumes exactly the bytes its writer counterpart in
//! [`write_utils`](super::write_utils) produces. Running out of input is an
//! error; nothing is ever zero-filled.

use rootcause::Report;
use winnow::Parser;
use winnow::binary::{le_f32, le_f64, le_u8, le_u32};
use winnow::combinator::repeat;
use winnow::error::{ContextError, ErrMode};
use winnow::token::take;

use crate::error::MstError;

/// Common result type for winnow parsers.
pub type WResult<T> = Result<T, ErrMode<ContextError>>;

/// A single byte; any nonzero value is `true`.
pub fn parse_bool(input: &mut &[u8]) -> WResult<bool> {
    Ok(le_u8.parse_next(input)? != 0)
}

/// Three packed bytes (RGB colors, clear coat normals).
pub fn parse_rgb(input: &mut &[u8]) -> WResult<[u8; 3]> {
    let bytes = take(3usize).parse_next(input)?;
    Ok([bytes[0], bytes[1], bytes[2]])
}

pub fn parse_vec2(input: &mut &[u8]) -> WResult<[f32; 2]> {
    let x = le_f32.parse_next(input)?;
    let y = le_f32.parse_next(input)?;
    Ok([x, y])
}

pub fn parse_vec3(input: &mut &[u8]) -> WResult<[f32; 3]> {
    let x = le_f32.parse_next(input)?;
    let y = le_f32.parse_next(input)?;
    let z = le_f32.parse_next(input)?;
    Ok([x, y, z])
}

/// Sixteen doubles, column-major.
pub fn parse_mat4(input: &mut &[u8]) -> WResult<[f64; 16]> {
    let mut m = [0.0f64; 16];
    for slot in m.iter_mut() {
        *slot = le_f64.parse_next(input)?;
    }
    Ok(m)
}

/// Parse a `u32` count followed by that many elements.
pub fn length_prefixed<'i, O, P>(mut element: P) -> impl Parser<&'i [u8], Vec<O>, ErrMode<ContextError>>
where
    P: Parser<&'i [u8], O, ErrMode<ContextError>>,
{
    move |input: &mut &'i [u8]| -> WResult<Vec<O>> {
        let count = le_u32.parse_next(input)? as usize;
        repeat(count, element.by_ref()).parse_next(input)
    }
}

/// A `u32` byte count followed by the raw bytes.
pub fn parse_len_prefixed_bytes(input: &mut &[u8]) -> WResult<Vec<u8>> {
    let len = le_u32.parse_next(input)? as usize;
    let bytes = take(len).parse_next(input)?;
    Ok(bytes.to_vec())
}

/// A length-prefixed string. Invalid UTF-8 is replaced rather than rejected.
pub fn parse_string(input: &mut &[u8]) -> WResult<String> {
    let len = le_u32.parse_next(input)? as usize;
    let bytes = take(len).parse_next(input)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Run `parser` over the whole of `data`, turning winnow failures into
/// [`MstError::TruncatedInput`] reports with the failing offset.
pub fn parse_all<'i, O>(
    data: &'i [u8],
    mut parser: impl Parser<&'i [u8], O, ErrMode<ContextError>>,
) -> Result<O, Report<MstError>> {
    let input = &mut &data[..];
    parser
        .parse_next(input)
        .map_err(|e| Report::new(MstError::truncated(data.len() - input.len(), e)))
}
