//! INTEGER (X.690 §8.3): arbitrary-precision signed, minimal two's-complement.

use num_bigint::{BigInt, Sign};

use crate::error::Error;
use crate::native::Native;
use crate::spec::IntegerNameMap;

/// Encodes a `BigInt` as minimal two's-complement big-endian contents. `0` encodes as one zero
/// octet (X.690 §8.3.2).
pub fn encode(value: &BigInt) -> Vec<u8> {
    if value.sign() == Sign::NoSign {
        return vec![0x00];
    }

    let mut bytes = value.to_signed_bytes_be();

    // `to_signed_bytes_be` already yields minimal two's complement for non-zero values, but
    // guard the invariant explicitly: no more than one leading 0x00/0xFF byte beyond what's
    // needed to fix the sign bit.
    while bytes.len() > 1 {
        let redundant_zero = bytes[0] == 0x00 && bytes[1] & 0x80 == 0;
        let redundant_ff = bytes[0] == 0xFF && bytes[1] & 0x80 != 0;
        if redundant_zero || redundant_ff {
            bytes.remove(0);
        } else {
            break;
        }
    }

    bytes
}

/// Decodes minimal two's-complement contents into a `BigInt`.
pub fn decode(contents: &[u8]) -> Result<BigInt, Error> {
    if contents.is_empty() {
        return Err(Error::invalid_value("INTEGER contents must not be empty"));
    }
    Ok(BigInt::from_signed_bytes_be(contents))
}

/// Decodes INTEGER contents into its native form, applying an optional name map (decoded integer
/// -> symbolic name).
pub fn decode_native(contents: &[u8], name_map: Option<&IntegerNameMap>) -> Result<Native, Error> {
    let value = decode(contents)?;
    if let Some(map) = name_map {
        use num_traits::ToPrimitive;
        if let Some(i) = value.to_i64() {
            if let Some(name) = map.get(&i) {
                return Ok(Native::Enumerated(name.clone()));
            }
        }
    }
    Ok(Native::Integer(value))
}

/// Resolves a native value (an integer, or -- with a name map -- a symbolic name) to the `BigInt`
/// to encode.
pub fn resolve_native(native: &Native, name_map: Option<&IntegerNameMap>) -> Result<BigInt, Error> {
    match native {
        Native::Integer(v) => Ok(v.clone()),
        Native::Enumerated(name) => {
            let map = name_map.ok_or_else(|| {
                Error::invalid_value("symbolic INTEGER value given but no name map declared")
            })?;
            map.iter()
                .find(|(_, n)| *n == name)
                .map(|(v, _)| BigInt::from(*v))
                .ok_or_else(|| Error::invalid_value(format!("unknown INTEGER name `{name}`")))
        }
        other => Err(Error::invalid_value(format!(
            "cannot set INTEGER from {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_one_zero_octet() {
        assert_eq!(encode(&BigInt::from(0)), vec![0x00]);
    }

    #[test]
    fn negative_128() {
        assert_eq!(encode(&BigInt::from(-128)), vec![0x80]);
        assert_eq!(decode(&[0x80]).unwrap(), BigInt::from(-128));
    }

    #[test]
    fn boundary_values_round_trip() {
        for v in [0i64, 1, -1, 127, -128, 32767, -32768, i64::MAX, i64::MIN] {
            let big = BigInt::from(v);
            let encoded = encode(&big);
            assert_eq!(decode(&encoded).unwrap(), big, "round-trip failed for {v}");
        }
    }

    #[test]
    fn large_multi_word() {
        let big = BigInt::from(2).pow(300);
        let encoded = encode(&big);
        assert_eq!(decode(&encoded).unwrap(), big);
    }
}
