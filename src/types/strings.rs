//! The restricted character-string types. Each pins a character encoding; §9's open question on
//! non-UTF-8-safe alphabets (GeneralString, GraphicString, TeletexString) is resolved here by
//! refusing to produce a native `str` when the octets aren't valid in the declared subset,
//! instead preserving the raw bytes -- never silently mis-decoding.

use crate::error::Error;
use crate::native::Native;
use crate::spec::SpecKind;

/// Whether `bytes` are valid under `kind`'s declared alphabet, and if so, the decoded `String`.
fn decode_checked(kind: &SpecKind, bytes: &[u8]) -> Option<String> {
    match kind {
        SpecKind::Utf8String => std::str::from_utf8(bytes).ok().map(str::to_owned),
        SpecKind::IA5String => ascii_subset(bytes, |_| true),
        SpecKind::PrintableString => ascii_subset(bytes, is_printable_char),
        SpecKind::VisibleString => ascii_subset(bytes, |b| (0x20..=0x7E).contains(&b)),
        SpecKind::NumericString => ascii_subset(bytes, |b| b.is_ascii_digit() || b == b' '),
        SpecKind::BmpString => decode_utf16_be(bytes),
        SpecKind::UniversalString => decode_utf32_be(bytes),
        // TeletexString (T.61), GeneralString, GraphicString: no strict alphabet enforced on
        // decode per §4.4, but we still refuse to claim UTF-8 validity we can't back.
        SpecKind::TeletexString | SpecKind::GeneralString | SpecKind::GraphicString => {
            std::str::from_utf8(bytes).ok().map(str::to_owned)
        }
        _ => None,
    }
}

fn is_printable_char(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b' ' | b'\'' | b'(' | b')' | b'+' | b',' | b'-' | b'.' | b'/' | b':' | b'=' | b'?'
        )
}

fn ascii_subset(bytes: &[u8], allowed: impl Fn(u8) -> bool) -> Option<String> {
    if bytes.iter().all(|&b| b.is_ascii() && allowed(b)) {
        Some(String::from_utf8_lossy(bytes).into_owned())
    } else {
        None
    }
}

fn decode_utf16_be(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

fn decode_utf32_be(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    bytes
        .chunks_exact(4)
        .map(|c| {
            let code = u32::from_be_bytes([c[0], c[1], c[2], c[3]]);
            char::from_u32(code)
        })
        .collect()
}

pub fn decode_native(kind: &SpecKind, contents: &[u8]) -> Native {
    match decode_checked(kind, contents) {
        Some(s) if matches!(kind, SpecKind::Utf8String) => Native::Utf8String(s),
        Some(s) => Native::RestrictedString(s),
        None => Native::RawString(contents.to_vec()),
    }
}

pub fn encode(kind: &SpecKind, native: &Native) -> Result<Vec<u8>, Error> {
    let s = match native {
        Native::Utf8String(s) | Native::RestrictedString(s) => s.as_str(),
        Native::RawString(bytes) => return Ok(bytes.clone()),
        other => {
            return Err(Error::invalid_value(format!(
                "cannot set a character string from {other:?}"
            )))
        }
    };

    match kind {
        SpecKind::BmpString => Ok(s.encode_utf16().flat_map(u16::to_be_bytes).collect()),
        SpecKind::UniversalString => Ok(s.chars().flat_map(|c| (c as u32).to_be_bytes()).collect()),
        SpecKind::IA5String
        | SpecKind::PrintableString
        | SpecKind::VisibleString
        | SpecKind::NumericString
        | SpecKind::TeletexString
        | SpecKind::GeneralString
        | SpecKind::GraphicString => {
            if !s.is_ascii() {
                return Err(Error::invalid_value(
                    "non-ASCII character in a restricted ASCII-subset string type",
                ));
            }
            Ok(s.as_bytes().to_vec())
        }
        SpecKind::Utf8String => Ok(s.as_bytes().to_vec()),
        _ => Err(Error::invalid_value("not a character string type")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bmp_round_trip() {
        let native = Native::RestrictedString("Hi".to_string());
        let encoded = encode(&SpecKind::BmpString, &native).unwrap();
        assert_eq!(encoded, vec![0x00, b'H', 0x00, b'i']);
        assert_eq!(
            decode_native(&SpecKind::BmpString, &encoded),
            Native::RestrictedString("Hi".to_string())
        );
    }

    #[test]
    fn universal_round_trip() {
        let native = Native::RestrictedString("Hi".to_string());
        let encoded = encode(&SpecKind::UniversalString, &native).unwrap();
        assert_eq!(encoded.len(), 8);
        assert_eq!(
            decode_native(&SpecKind::UniversalString, &encoded),
            Native::RestrictedString("Hi".to_string())
        );
    }

    #[test]
    fn invalid_alphabet_preserves_raw_bytes() {
        let invalid = [0xFF, 0xFE];
        let native = decode_native(&SpecKind::PrintableString, &invalid);
        assert_eq!(native, Native::RawString(invalid.to_vec()));
    }
}
