//! The language-neutral "native form" a decoded value materializes to (§6.1): a map for
//! Sequence/Set, a list for SequenceOf/SetOf/Concat, a string for OIDs, a byte string for
//! OctetString, a timestamp for times, a bit-set for mapped BitString, and the obvious scalar
//! types elsewhere.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use num_bigint::BigInt;

/// A materialized ASN.1 value, independent of wire encoding.
#[derive(Clone, Debug, PartialEq)]
pub enum Native {
    Absent,
    Boolean(bool),
    Integer(BigInt),
    /// A BitString's raw bits, MSB-first within each octet, trailing padding already removed.
    Bits(Vec<bool>),
    /// A BitString read through a name map: names whose bit is set.
    NamedBits(Vec<String>),
    OctetString(Vec<u8>),
    ObjectIdentifier(String),
    Enumerated(String),
    Utf8String(String),
    /// Restricted character strings whose octets are valid in their declared alphabet.
    RestrictedString(String),
    /// Octets that did not decode cleanly under their declared character set; see
    /// `SPEC_FULL.md` §9 open question 2 -- preserved rather than silently mis-decoded.
    RawString(Vec<u8>),
    /// Chrono's proleptic Gregorian calendar already covers year 0 and earlier, so UTCTime and
    /// GeneralizedTime share this one timestamp representation.
    Time(DateTime<FixedOffset>),
    Sequence(BTreeMap<String, Native>),
    List(Vec<Native>),
    /// `Any`/unparsed value: the raw TLV bytes.
    Raw(Vec<u8>),
}

impl Native {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Native::Integer(v) => {
                use num_traits::ToPrimitive;
                v.to_i64()
            }
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Native::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Native::Utf8String(s) | Native::RestrictedString(s) | Native::ObjectIdentifier(s) => {
                Some(s)
            }
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Native::OctetString(b) | Native::Raw(b) | Native::RawString(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&BTreeMap<String, Native>> {
        match self {
            Native::Sequence(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Native]> {
        match self {
            Native::List(items) => Some(items),
            _ => None,
        }
    }
}
