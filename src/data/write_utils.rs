//! Little-endian writers, the encode-side mirror of [`parser_utils`](super::parser_utils).

/// A fixed-width scalar with a little-endian byte form.
pub trait LeScalar: Copy {
    fn write_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_le_scalar {
    ($($ty:ty),*) => {
        $(
            impl LeScalar for $ty {
                #[inline]
                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_le_scalar!(u8, u16, u32, i32, u64, f32, f64);

#[inline]
pub fn write_scalar<T: LeScalar>(out: &mut Vec<u8>, value: T) {
    value.write_le(out);
}

pub fn write_array<T: LeScalar, const N: usize>(out: &mut Vec<u8>, values: &[T; N]) {
    for v in values {
        v.write_le(out);
    }
}

/// Write a sequence length as `u32`.
///
/// Lengths beyond `u32::MAX` cannot be represented in the format and are
/// saturated; callers never build containers that large.
pub fn write_count(out: &mut Vec<u8>, len: usize) {
    write_scalar(out, u32::try_from(len).unwrap_or(u32::MAX));
}

pub fn write_len_prefixed_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_count(out, bytes.len());
    out.extend_from_slice(bytes);
}

pub fn write_str(out: &mut Vec<u8>, s: &str) {
    write_len_prefixed_bytes(out, s.as_bytes());
}

pub fn write_bool(out: &mut Vec<u8>, value: bool) {
    out.push(value as u8);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parser_utils::{parse_all, parse_bool, parse_mat4, parse_string};

    #[test]
    fn test_scalars_are_little_endian() {
        let mut out = Vec::new();
        write_scalar(&mut out, 0x0102_0304u32);
        write_scalar(&mut out, -2i32);
        write_scalar(&mut out, 0xABCDu16);
        assert_eq!(out, [0x04, 0x03, 0x02, 0x01, 0xFE, 0xFF, 0xFF, 0xFF, 0xCD, 0xAB]);
    }

    #[test]
    fn test_blob_has_length_prefix() {
        let mut out = Vec::new();
        write_len_prefixed_bytes(&mut out, b"xyz");
        assert_eq!(out, [3, 0, 0, 0, b'x', b'y', b'z']);
    }

    #[test]
    fn test_readers_consume_what_writers_produce() {
        let mut out = Vec::new();
        write_str(&mut out, "brick.png");
        write_bool(&mut out, true);
        let m: [f64; 16] = std::array::from_fn(|i| i as f64 * 0.5);
        write_array(&mut out, &m);

        let (name, flag, mat) = parse_all(&out, |input: &mut &[u8]| {
            let name = parse_string(input)?;
            let flag = parse_bool(input)?;
            let mat = parse_mat4(input)?;
            Ok((name, flag, mat))
        })
        .unwrap();
        assert_eq!(name, "brick.png");
        assert!(flag);
        assert_eq!(mat, m);
    }
}
