//! Length-octet encode/decode (X.690 §8.1.3): short form, long form, indefinite.

use crate::error::{ParseError, ParseErrorKind};
use crate::tag::Method;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Length {
    Definite(usize),
    Indefinite,
}

/// Decodes a length octet sequence from the front of `input`.
///
/// Rejects indefinite length when `method` is primitive (X.690 §8.1.3.2), and, when `strict` is
/// true, rejects non-minimal long-form length encodings (a long-form length whose value would
/// have fit in short form, or that carries leading zero octets).
pub fn decode_length(
    input: &[u8],
    method: Method,
    strict: bool,
) -> Result<(Length, usize), ParseError> {
    let first = *input.first().ok_or(ParseErrorKind::Truncated {
        what: "length octet",
    })?;

    if first & 0x80 == 0 {
        return Ok((Length::Definite(usize::from(first)), 1));
    }

    let count = usize::from(first & 0x7F);
    if count == 0 {
        if method != Method::Constructed {
            return Err(ParseErrorKind::IndefiniteOnPrimitive.into());
        }
        return Ok((Length::Indefinite, 1));
    }

    let rest = input.get(1..1 + count).ok_or(ParseErrorKind::Truncated {
        what: "long-form length octets",
    })?;

    if strict && rest.first() == Some(&0) && rest.len() > 1 {
        return Err(ParseErrorKind::NonMinimalLength.into());
    }

    let mut value: u128 = 0;
    for &byte in rest {
        value = value
            .checked_shl(8)
            .ok_or(ParseErrorKind::Malformed {
                what: "length exceeds addressable size",
            })?
            | u128::from(byte);
    }

    let value = usize::try_from(value).map_err(|_| ParseErrorKind::Malformed {
        what: "length exceeds addressable size",
    })?;

    if strict && value <= 127 {
        return Err(ParseErrorKind::NonMinimalLength.into());
    }

    Ok((Length::Definite(value), 1 + count))
}

/// Encodes a definite length in DER-minimal form.
pub fn encode_length(len: usize) -> Vec<u8> {
    if len <= 0x7F {
        return vec![len as u8];
    }

    let mut groups = Vec::new();
    let mut value = len;
    while value != 0 {
        groups.push((value & 0xFF) as u8);
        value >>= 8;
    }
    groups.reverse();

    let mut out = Vec::with_capacity(groups.len() + 1);
    out.push(0x80 | groups.len() as u8);
    out.extend_from_slice(&groups);
    out
}

pub const INDEFINITE_MARKER: u8 = 0x80;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form() {
        let (len, consumed) = decode_length(&[0x04], Method::Primitive, true).unwrap();
        assert_eq!(len, Length::Definite(4));
        assert_eq!(consumed, 1);
        assert_eq!(encode_length(4), vec![0x04]);
    }

    #[test]
    fn long_form() {
        let bytes = encode_length(300);
        assert_eq!(bytes, vec![0x82, 0x01, 0x2C]);
        let (len, consumed) = decode_length(&bytes, Method::Primitive, true).unwrap();
        assert_eq!(len, Length::Definite(300));
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn indefinite_requires_constructed() {
        assert!(decode_length(&[0x80], Method::Constructed, true).is_ok());
        assert!(matches!(
            decode_length(&[0x80], Method::Primitive, true)
                .unwrap_err()
                .kind,
            ParseErrorKind::IndefiniteOnPrimitive
        ));
    }

    #[test]
    fn strict_rejects_non_minimal_long_form() {
        // 0x81 0x04 -- one long-form octet encoding a value that fits in short form.
        assert!(matches!(
            decode_length(&[0x81, 0x04], Method::Primitive, true)
                .unwrap_err()
                .kind,
            ParseErrorKind::NonMinimalLength
        ));
        assert!(decode_length(&[0x81, 0x04], Method::Primitive, false).is_ok());
    }
}
