//! OBJECT IDENTIFIER and RELATIVE-OID (X.690 §8.19): dotted-decimal arcs, base-128 subidentifier
//! encoding with the first two arcs folded into one subidentifier for OBJECT IDENTIFIER.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

use crate::error::Error;
use crate::native::Native;
use crate::spec::OidNameMap;

fn parse_dotted(s: &str) -> Result<Vec<BigUint>, Error> {
    s.split('.')
        .map(|arc| {
            arc.parse::<BigUint>()
                .map_err(|_| Error::invalid_value(format!("invalid OID arc `{arc}`")))
        })
        .collect()
}

fn format_dotted(arcs: &[BigUint]) -> String {
    arcs.iter()
        .map(std::string::ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Appends one subidentifier's base-128, continuation-bit-terminated octets.
fn push_subidentifier(out: &mut Vec<u8>, value: &BigUint) {
    let mut groups = Vec::new();
    let mut v = value.clone();
    let mask = BigUint::from(0x7Fu32);
    loop {
        let group = (&v & &mask).to_u8().expect("masked to 7 bits");
        groups.push(group);
        v >>= 7u32;
        if v.is_zero() {
            break;
        }
    }
    groups.reverse();
    let last = groups.len() - 1;
    for (i, byte) in groups.iter().enumerate() {
        out.push(if i == last { *byte } else { byte | 0x80 });
    }
}

/// Encodes a dotted-decimal OID string as OBJECT IDENTIFIER contents.
pub fn encode_oid(dotted: &str) -> Result<Vec<u8>, Error> {
    let arcs = parse_dotted(dotted)?;
    if arcs.len() < 2 {
        return Err(Error::invalid_value(
            "OBJECT IDENTIFIER requires at least two arcs",
        ));
    }
    let (arc1, arc2) = (&arcs[0], &arcs[1]);
    if *arc1 > BigUint::from(2u32) {
        return Err(Error::invalid_value("OBJECT IDENTIFIER first arc must be 0, 1, or 2"));
    }
    if *arc1 < BigUint::from(2u32) && *arc2 >= BigUint::from(40u32) {
        return Err(Error::invalid_value(
            "OBJECT IDENTIFIER second arc must be < 40 unless first arc is 2",
        ));
    }

    let first = arc1 * BigUint::from(40u32) + arc2;
    let mut out = Vec::new();
    push_subidentifier(&mut out, &first);
    for arc in &arcs[2..] {
        push_subidentifier(&mut out, arc);
    }
    Ok(out)
}

/// Encodes a dotted-decimal string as RELATIVE-OID contents (no 40*arc1+arc2 folding).
pub fn encode_relative_oid(dotted: &str) -> Result<Vec<u8>, Error> {
    let arcs = parse_dotted(dotted)?;
    let mut out = Vec::new();
    for arc in &arcs {
        push_subidentifier(&mut out, arc);
    }
    Ok(out)
}

/// Decodes OBJECT IDENTIFIER contents into its dotted-decimal string. Rejects non-minimal
/// subidentifiers (a leading `0x80` continuation octet).
pub fn decode_oid(contents: &[u8]) -> Result<String, Error> {
    let subs = decode_subidentifiers(contents)?;
    if subs.is_empty() {
        return Err(Error::invalid_value("OBJECT IDENTIFIER must have contents"));
    }
    let first = &subs[0];
    let (arc1, arc2) = if *first >= BigUint::from(80u32) {
        (BigUint::from(2u32), first - BigUint::from(80u32))
    } else {
        let forty = BigUint::from(40u32);
        (first / &forty, first % &forty)
    };
    let mut arcs = vec![arc1, arc2];
    arcs.extend(subs.into_iter().skip(1));
    Ok(format_dotted(&arcs))
}

/// Decodes RELATIVE-OID contents into its dotted-decimal string.
pub fn decode_relative_oid(contents: &[u8]) -> Result<String, Error> {
    let subs = decode_subidentifiers(contents)?;
    Ok(format_dotted(&subs))
}

fn decode_subidentifiers(contents: &[u8]) -> Result<Vec<BigUint>, Error> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < contents.len() {
        if contents[i] == 0x80 {
            return Err(Error::invalid_value(
                "OID subidentifier has a non-minimal leading continuation octet",
            ));
        }
        let mut value = BigUint::zero();
        let mut terminated = false;
        while i < contents.len() {
            let byte = contents[i];
            i += 1;
            value = (value << 7u32) | BigUint::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                terminated = true;
                break;
            }
        }
        if !terminated {
            return Err(Error::invalid_value(
                "OID subidentifier has no terminating octet",
            ));
        }
        out.push(value);
    }
    Ok(out)
}

pub fn decode_native(contents: &[u8], name_map: Option<&OidNameMap>) -> Result<Native, Error> {
    let dotted = decode_oid(contents)?;
    if let Some(map) = name_map {
        if let Some(name) = map.get(&dotted) {
            return Ok(Native::ObjectIdentifier(name.clone()));
        }
    }
    Ok(Native::ObjectIdentifier(dotted))
}

pub fn resolve_native(native: &Native, name_map: Option<&OidNameMap>) -> Result<String, Error> {
    match native {
        Native::ObjectIdentifier(s) => {
            if s.chars().all(|c| c.is_ascii_digit() || c == '.') {
                return Ok(s.clone());
            }
            let map = name_map
                .ok_or_else(|| Error::invalid_value("symbolic OID given but no name map declared"))?;
            map.iter()
                .find(|(_, name)| *name == s)
                .map(|(dotted, _)| dotted.clone())
                .ok_or_else(|| Error::invalid_value(format!("unknown OID name `{s}`")))
        }
        other => Err(Error::invalid_value(format!(
            "cannot set OBJECT IDENTIFIER from {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsa_encryption_oid() {
        // 1.2.840.113549.1.1.1
        let expected = [0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];
        let encoded = encode_oid("1.2.840.113549.1.1.1").unwrap();
        assert_eq!(encoded, expected);
        assert_eq!(decode_oid(&expected).unwrap(), "1.2.840.113549.1.1.1");
    }

    #[test]
    fn boundary_oids() {
        assert_eq!(decode_oid(&encode_oid("0.0").unwrap()).unwrap(), "0.0");
        assert_eq!(decode_oid(&encode_oid("2.999").unwrap()).unwrap(), "2.999");
        let forty_arcs = (0..40).map(|i| i.to_string()).collect::<Vec<_>>().join(".");
        let dotted = format!("2.{forty_arcs}");
        assert_eq!(decode_oid(&encode_oid(&dotted).unwrap()).unwrap(), dotted);
    }

    #[test]
    fn rejects_non_minimal_subidentifier() {
        assert!(decode_oid(&[0x80, 0x01]).is_err());
    }
}
