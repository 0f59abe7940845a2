//! BIT STRING (X.690 §8.6): a leading unused-bits count octet (0-7), then the bits padded to a
//! whole number of octets, MSB first.

use bitvec::order::Msb0;
use bitvec::vec::BitVec;

use crate::error::Error;
use crate::native::Native;

pub type Bits = BitVec<u8, Msb0>;

/// Encodes a bit sequence as BIT STRING contents. When `named_bit_width` is `Some(n)`, DER
/// requires trailing zero bits beyond the declared named-bit width to be trimmed; with no name
/// map (`None`), the caller's bits -- including any trailing zeros they set -- are preserved
/// verbatim, per `SPEC_FULL.md`'s "strict DER" decision for the unmapped case.
pub fn encode(bits: &Bits, named_bit_width: Option<usize>) -> Vec<u8> {
    let mut bits = bits.clone();

    if named_bit_width.is_some() {
        while bits.last().as_deref() == Some(&false) {
            bits.pop();
        }
    }

    let unused = if bits.is_empty() {
        0
    } else {
        (8 - (bits.len() % 8)) % 8
    };

    let mut out = Vec::with_capacity(1 + bits.len().div_ceil(8));
    out.push(unused as u8);

    let mut padded = bits;
    for _ in 0..unused {
        padded.push(false);
    }
    out.extend_from_slice(padded.as_raw_slice());
    out
}

/// Decodes BIT STRING contents into its bit sequence.
pub fn decode(contents: &[u8]) -> Result<Bits, Error> {
    let unused = *contents
        .first()
        .ok_or_else(|| Error::invalid_value("BIT STRING contents must have an unused-bits octet"))?;
    if unused > 7 {
        return Err(Error::invalid_value(
            "BIT STRING unused-bits octet must be 0-7",
        ));
    }
    if unused > 0 && contents.len() < 2 {
        return Err(Error::invalid_value(
            "BIT STRING has unused bits but no content octets",
        ));
    }

    let mut bits: Bits = BitVec::from_slice(&contents[1..]);
    for _ in 0..unused {
        bits.pop();
    }
    Ok(bits)
}

pub fn decode_native(contents: &[u8], name_map: Option<&[(String, u32)]>) -> Result<Native, Error> {
    let bits = decode(contents)?;
    match name_map {
        None => Ok(Native::Bits(bits.iter().map(|b| *b).collect())),
        Some(map) => {
            let set: Vec<String> = map
                .iter()
                .filter(|(_, idx)| bits.get(*idx as usize).as_deref().copied().unwrap_or(false))
                .map(|(name, _)| name.clone())
                .collect();
            Ok(Native::NamedBits(set))
        }
    }
}

pub fn resolve_native(native: &Native, name_map: Option<&[(String, u32)]>) -> Result<(Bits, Option<usize>), Error> {
    match (native, name_map) {
        (Native::Bits(bits), _) => {
            let mut v: Bits = BitVec::new();
            v.extend(bits.iter().copied());
            Ok((v, None))
        }
        (Native::NamedBits(names), Some(map)) => {
            let width = map.iter().map(|(_, idx)| idx + 1).max().unwrap_or(0) as usize;
            let mut v: Bits = BitVec::repeat(false, width);
            for name in names {
                let idx = map
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, idx)| *idx)
                    .ok_or_else(|| Error::invalid_value(format!("unknown named bit `{name}`")))?;
                v.set(idx as usize, true);
            }
            Ok((v, Some(width)))
        }
        (Native::NamedBits(_), None) => Err(Error::invalid_value(
            "named bits given but BIT STRING has no name map",
        )),
        (other, _) => Err(Error::invalid_value(format!(
            "cannot set BIT STRING from {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_unused_bits() {
        let bits: Bits = BitVec::from_slice(&[0xD0]);
        let encoded = encode(&bits, None);
        assert_eq!(encoded, vec![0x00, 0xD0]);
    }

    #[test]
    fn seven_unused_bits() {
        let mut bits: Bits = BitVec::new();
        bits.push(true);
        let encoded = encode(&bits, None);
        assert_eq!(encoded[0], 7);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.len(), 1);
        assert!(decoded.get(0).as_deref().copied().unwrap_or(false));
    }

    #[test]
    fn named_bits_trim_trailing_zeros() {
        let map = vec![("a".to_string(), 0u32), ("b".to_string(), 1), ("c".to_string(), 2)];
        let native = Native::NamedBits(vec!["a".to_string()]);
        let (bits, width) = resolve_native(&native, Some(&map)).unwrap();
        assert_eq!(width, Some(3));
        let encoded = encode(&bits, Some(3));
        // only bit 0 set, trailing zero bits trimmed: unused count reflects 1 significant bit.
        assert_eq!(encoded[0], 7);
    }
}
