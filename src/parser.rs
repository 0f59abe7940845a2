//! Splits a byte string into TLV sextuples. Handles nested indefinite-length encodings by
//! recursively parsing child TLVs rather than scanning for a literal `00 00` -- a literal scan is
//! unsound once an inner value is itself indefinite-length, since its own EOC would be mistaken
//! for the outer one.

use crate::error::{ParseError, ParseErrorKind};
use crate::identifier::{decode_identifier, encode_identifier, Identifier};
use crate::length::{decode_length, encode_length, Length};
use crate::tag::{Class, Method, Tag};

/// The six wire-level fields of a parsed ASN.1 value (X.690 TLV), as specified in the data model.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tlv {
    pub class: Class,
    pub method: Method,
    pub tag: u32,
    pub header: Vec<u8>,
    pub contents: Vec<u8>,
    pub trailer: Vec<u8>,
}

impl Tlv {
    pub fn tag(&self) -> Tag {
        Tag::new(self.class, self.tag)
    }

    /// The complete encoded bytes of this TLV: header, contents, trailer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header.len() + self.contents.len() + self.trailer.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.contents);
        out.extend_from_slice(&self.trailer);
        out
    }
}

pub const DEFAULT_MAX_DEPTH: usize = 1000;

/// Parses one TLV from `input` at `offset`, honoring `strict` (non-minimal rejection) and
/// `max_depth` (recursion bound for nested indefinite lengths).
///
/// Returns the sextuple and the number of bytes consumed starting at `offset`.
pub fn parse_tlv(
    input: &[u8],
    offset: usize,
    strict: bool,
    max_depth: usize,
) -> Result<(Tlv, usize), ParseError> {
    parse_tlv_at_depth(input, offset, strict, max_depth, 0)
}

fn parse_tlv_at_depth(
    input: &[u8],
    offset: usize,
    strict: bool,
    max_depth: usize,
    depth: usize,
) -> Result<(Tlv, usize), ParseError> {
    if depth > max_depth {
        return Err(ParseErrorKind::DepthExceeded.into());
    }

    let slice = input.get(offset..).ok_or(ParseErrorKind::Truncated {
        what: "TLV",
    })?;

    let (identifier, id_len) =
        decode_identifier(slice).map_err(|e| e.at(offset))?;
    let after_id = &slice[id_len..];

    let (length, len_len) =
        decode_length(after_id, identifier.method, strict).map_err(|e| e.at(offset + id_len))?;
    let header_len = id_len + len_len;

    match length {
        Length::Definite(len) => {
            let contents = after_id
                .get(len_len..len_len + len)
                .ok_or_else(|| {
                    ParseError::from(ParseErrorKind::Truncated {
                        what: "TLV contents",
                    })
                    .at(offset + header_len)
                })?
                .to_vec();
            let header = slice[..header_len].to_vec();
            Ok((
                Tlv {
                    class: identifier.class(),
                    method: identifier.method,
                    tag: identifier.tag.value,
                    header,
                    contents,
                    trailer: Vec::new(),
                },
                header_len + len,
            ))
        }
        Length::Indefinite => {
            let mut pos = header_len;
            let mut contents = Vec::new();
            loop {
                let child_slice = input.get(offset + pos..).ok_or(ParseErrorKind::Truncated {
                    what: "indefinite-length contents (missing EOC)",
                })?;
                if child_slice.len() >= 2 && child_slice[0] == 0 && child_slice[1] == 0 {
                    pos += 2;
                    let header = input[offset..offset + header_len].to_vec();
                    return Ok((
                        Tlv {
                            class: identifier.class(),
                            method: identifier.method,
                            tag: identifier.tag.value,
                            header,
                            contents,
                            trailer: vec![0, 0],
                        },
                        pos,
                    ));
                }

                let (child, child_len) =
                    parse_tlv_at_depth(input, offset + pos, strict, max_depth, depth + 1)?;
                contents.extend_from_slice(&child.to_bytes());
                pos += child_len;
            }
        }
    }
}

/// Parses a whole buffer as a single outermost TLV, optionally requiring no trailing bytes.
pub fn parse(input: &[u8], strict: bool) -> Result<Tlv, ParseError> {
    let (tlv, consumed) = parse_tlv(input, 0, strict, DEFAULT_MAX_DEPTH)?;
    if strict && consumed != input.len() {
        return Err(ParseErrorKind::TrailingBytes.into());
    }
    Ok(tlv)
}

/// Returns the byte length of the first TLV in `input` without fully decoding its contents.
pub fn peek(input: &[u8]) -> Result<usize, ParseError> {
    let (_, consumed) = parse_tlv(input, 0, false, DEFAULT_MAX_DEPTH)?;
    Ok(consumed)
}

/// Builds the header+contents bytes for a TLV from its parts. Always DER-minimal.
pub fn emit(class: Class, method: Method, tag: u32, contents: &[u8]) -> Vec<u8> {
    let identifier = Identifier::new(class, method, tag);
    let mut out = encode_identifier(identifier);
    out.extend_from_slice(&encode_length(contents.len()));
    out.extend_from_slice(contents);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definite_length_round_trip() {
        let bytes = emit(Class::Universal, Method::Primitive, 2, &[0x00]);
        assert_eq!(bytes, vec![0x02, 0x01, 0x00]);
        let tlv = parse(&bytes, true).unwrap();
        assert_eq!(tlv.contents, vec![0x00]);
        assert_eq!(tlv.trailer, Vec::<u8>::new());
    }

    #[test]
    fn long_form_length() {
        let bytes = [0x04, 0x81, 0x02, 0xF0, 0xF0];
        let tlv = parse(&bytes, true).unwrap();
        assert_eq!(tlv.contents, vec![0xF0, 0xF0]);
    }

    #[test]
    fn indefinite_length_basic() {
        // OCTET STRING, indefinite, two segments "01" "01" then EOC.
        let bytes = [0x24, 0x80, 0x04, 0x01, 0x01, 0x04, 0x01, 0x01, 0x00, 0x00];
        let tlv = parse(&bytes, true).unwrap();
        assert_eq!(tlv.contents, vec![0x04, 0x01, 0x01, 0x04, 0x01, 0x01]);
        assert_eq!(tlv.trailer, vec![0x00, 0x00]);
    }

    #[test]
    fn nested_indefinite_length_three_levels() {
        // Outer indefinite OCTET STRING containing one indefinite child containing one
        // definite-length segment, regression test for the naive-EOC-scan bug: a literal search
        // for "00 00" would stop at the inner EOC.
        let inner_segment = emit(Class::Universal, Method::Primitive, 4, &[0xAB]);
        let mut middle_contents = inner_segment.clone();
        middle_contents.extend_from_slice(&[0x00, 0x00]); // inner EOC
        let middle = {
            let mut v = vec![0x24, 0x80];
            v.extend_from_slice(&middle_contents);
            v
        };
        let mut outer_contents = middle.clone();
        outer_contents.extend_from_slice(&[0x00, 0x00]); // outer EOC
        let mut outer = vec![0x24, 0x80];
        outer.extend_from_slice(&outer_contents);

        let tlv = parse(&outer, true).unwrap();
        assert_eq!(tlv.contents, middle);
    }

    #[test]
    fn strict_rejects_trailing_bytes() {
        let mut bytes = emit(Class::Universal, Method::Primitive, 2, &[0x01]);
        bytes.push(0xFF);
        assert!(matches!(
            parse(&bytes, true).unwrap_err().kind,
            ParseErrorKind::TrailingBytes
        ));
        assert!(parse(&bytes, false).is_ok());
    }

    #[test]
    fn depth_exceeded() {
        // Run on a thread with a larger stack: the default test-thread stack is too small to
        // hold ~1000 recursive `parse_tlv_at_depth` frames in an unoptimized debug build.
        std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let mut bytes = Vec::new();
                for _ in 0..2000 {
                    bytes.extend_from_slice(&[0x24, 0x80]);
                }
                bytes.extend_from_slice(&[0x00, 0x00]);
                for _ in 0..1999 {
                    bytes.extend_from_slice(&[0x00, 0x00]);
                }
                assert!(matches!(
                    parse_tlv(&bytes, 0, false, DEFAULT_MAX_DEPTH)
                        .unwrap_err()
                        .kind,
                    ParseErrorKind::DepthExceeded
                ));
            })
            .unwrap()
            .join()
            .unwrap();
    }
}
