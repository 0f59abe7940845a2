//! Identifier-octet (class + method + tag number) encode/decode.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

use crate::error::{ParseError, ParseErrorKind};
use crate::tag::{Class, Method, Tag};

/// A decoded identifier octet sequence: class, method, and tag number.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Identifier {
    pub tag: Tag,
    pub method: Method,
}

impl Identifier {
    pub fn new(class: Class, method: Method, tag: u32) -> Self {
        Self {
            tag: Tag::new(class, tag),
            method,
        }
    }

    pub fn class(&self) -> Class {
        self.tag.class
    }
}

/// Decodes one identifier (class/method/tag) from the front of `input`.
///
/// Returns the identifier and the number of bytes consumed. Rejects non-minimal long-form tag
/// encodings: a long-form tag whose first continuation octet is `0x80` (a leading zero group), or
/// whose accumulated value is `<= 30` and so should have used short form.
pub fn decode_identifier(input: &[u8]) -> Result<(Identifier, usize), ParseError> {
    let first = *input.first().ok_or(ParseErrorKind::Truncated {
        what: "identifier octet",
    })?;

    let class = Class::from_u8((first & 0xC0) >> 6);
    let method = Method::from_bit(first & 0x20 != 0);
    let low_tag = u32::from(first & 0x1F);

    if low_tag != 0x1F {
        return Ok((Identifier::new(class, method, low_tag), 1));
    }

    // Long form: base-128 continuation octets, MSB group first.
    let rest = &input[1..];
    if rest.first() == Some(&0x80) {
        return Err(ParseErrorKind::NonMinimalTag.into());
    }

    let mut value = BigUint::zero();
    let mut consumed = 1usize;
    let mut found_end = false;
    for &byte in rest {
        consumed += 1;
        value = (value << 7u32) | BigUint::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            found_end = true;
            break;
        }
    }
    if !found_end {
        return Err(ParseErrorKind::Truncated {
            what: "identifier tag number",
        }
        .into());
    }

    let tag_value = value.to_u32().ok_or(ParseErrorKind::Malformed {
        what: "tag number exceeds u32",
    })?;
    if tag_value <= 30 {
        return Err(ParseErrorKind::NonMinimalTag.into());
    }

    Ok((Identifier::new(class, method, tag_value), consumed))
}

/// Encodes an identifier's octets (class/method/tag), DER-minimal.
pub fn encode_identifier(identifier: Identifier) -> Vec<u8> {
    let mut out = Vec::with_capacity(identifier.tag.encoded_len());
    let class_bits = identifier.class().to_u8() << 6;
    let method_bit = if identifier.method.is_constructed() {
        0x20
    } else {
        0x00
    };

    if identifier.tag.value <= 30 {
        out.push(class_bits | method_bit | identifier.tag.value as u8);
        return out;
    }

    out.push(class_bits | method_bit | 0x1F);
    let mut groups = Vec::new();
    let mut value = identifier.tag.value;
    groups.push((value & 0x7F) as u8);
    value >>= 7;
    while value != 0 {
        groups.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    groups.reverse();
    out.extend_from_slice(&groups);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_round_trip() {
        let id = Identifier::new(Class::Universal, Method::Primitive, 2);
        let bytes = encode_identifier(id);
        assert_eq!(bytes, vec![0x02]);
        let (decoded, consumed) = decode_identifier(&bytes).unwrap();
        assert_eq!(decoded, id);
        assert_eq!(consumed, 1);
    }

    #[test]
    fn long_form_round_trip() {
        let id = Identifier::new(Class::Context, Method::Constructed, 1000);
        let bytes = encode_identifier(id);
        let (decoded, consumed) = decode_identifier(&bytes).unwrap();
        assert_eq!(decoded, id);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn rejects_non_minimal_long_form() {
        // Tag 31 with leading-zero continuation group.
        let bytes = [0x1F, 0x80, 0x01];
        assert!(matches!(
            decode_identifier(&bytes).unwrap_err().kind,
            ParseErrorKind::NonMinimalTag
        ));
    }

    #[test]
    fn rejects_long_form_that_fits_short_form() {
        // Tag value 5 encoded long-form should have used short form.
        let bytes = [0x1F, 0x05];
        assert!(matches!(
            decode_identifier(&bytes).unwrap_err().kind,
            ParseErrorKind::NonMinimalTag
        ));
    }
}
