//! BOOLEAN (X.690 §8.2).

use crate::error::Error;
use crate::native::Native;

/// Encodes a boolean: `0xFF` for true, `0x00` for false (DER mandates `0xFF`; BER would accept
/// any nonzero octet as true on decode, which we honor below).
pub fn encode(value: bool) -> Vec<u8> {
    vec![if value { 0xFF } else { 0x00 }]
}

/// Decodes BOOLEAN contents: any nonzero octet is true (BER), matching X.690 §8.2.2's
/// "any non-zero value shall mean TRUE" for non-DER encodings we still accept on decode.
pub fn decode(contents: &[u8]) -> Result<Native, Error> {
    let byte = *contents
        .first()
        .ok_or_else(|| Error::invalid_value("BOOLEAN contents must be exactly one octet"))?;
    if contents.len() != 1 {
        return Err(Error::invalid_value("BOOLEAN contents must be exactly one octet"));
    }
    Ok(Native::Boolean(byte != 0x00))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn true_is_0xff() {
        assert_eq!(encode(true), vec![0xFF]);
    }

    #[test]
    fn false_is_0x00() {
        assert_eq!(encode(false), vec![0x00]);
    }

    #[test]
    fn ber_tolerates_any_nonzero_as_true() {
        assert_eq!(decode(&[0x01]).unwrap(), Native::Boolean(true));
        assert_eq!(decode(&[0x00]).unwrap(), Native::Boolean(false));
    }
}
