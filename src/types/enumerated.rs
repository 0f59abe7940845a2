//! ENUMERATED (X.690 §8.4): encoded exactly like INTEGER, but the native form is always the
//! mapped symbolic name -- setting an unmapped integer is an error.

use num_bigint::BigInt;

use crate::error::Error;
use crate::native::Native;
use crate::spec::IntegerNameMap;
use crate::types::integer;

pub fn encode(name: &str, variants: &IntegerNameMap) -> Result<Vec<u8>, Error> {
    let value = variants
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(v, _)| BigInt::from(*v))
        .ok_or_else(|| Error::invalid_value(format!("unknown ENUMERATED name `{name}`")))?;
    Ok(integer::encode(&value))
}

pub fn decode_native(contents: &[u8], variants: &IntegerNameMap) -> Result<Native, Error> {
    let value = integer::decode(contents)?;
    // With no declared variant map (e.g. the universal-tag fallback when no spec narrows the
    // type, §4.3 rule 1), there's nothing to validate against: surface the raw integer.
    if variants.is_empty() {
        return Ok(Native::Integer(value));
    }
    use num_traits::ToPrimitive;
    let Some(i) = value.to_i64() else {
        return Err(Error::invalid_value("ENUMERATED value out of range"));
    };
    match variants.get(&i) {
        Some(name) => Ok(Native::Enumerated(name.clone())),
        None => Err(Error::invalid_value(format!(
            "ENUMERATED integer {i} has no name"
        ))),
    }
}

pub fn resolve_native(native: &Native) -> Result<String, Error> {
    match native {
        Native::Enumerated(name) => Ok(name.clone()),
        other => Err(Error::invalid_value(format!(
            "cannot set ENUMERATED from {other:?}"
        ))),
    }
}
