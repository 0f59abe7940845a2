//! OCTET STRING (X.690 §8.7): raw bytes. BER additionally permits a constructed (segmented)
//! encoding whose children's contents concatenate to the logical value; DER always uses the
//! primitive form.

use crate::error::Error;
use crate::native::Native;

pub fn encode(bytes: &[u8]) -> Vec<u8> {
    bytes.to_vec()
}

pub fn decode_native(contents: &[u8]) -> Native {
    Native::OctetString(contents.to_vec())
}

pub fn resolve_native(native: &Native) -> Result<Vec<u8>, Error> {
    match native {
        Native::OctetString(b) | Native::Raw(b) => Ok(b.clone()),
        other => Err(Error::invalid_value(format!(
            "cannot set OCTET STRING from {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length() {
        assert_eq!(encode(&[]), Vec::<u8>::new());
        assert_eq!(decode_native(&[]), Native::OctetString(Vec::new()));
    }
}
