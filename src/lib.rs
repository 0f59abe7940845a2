//! A BER/DER codec built around a runtime schema: PKI structures are declared as data (a
//! [`spec::SpecRef`] tree), not as types with derived `Encode`/`Decode` impls, and a generic
//! interpreter (the [`value`] module) walks a spec against bytes to produce a
//! [`value::Node`] -- typed lazily, re-encodable to DER on demand.
//!
//! ```text
//! tag        - Class, Method, Tag: the wire identity of a value
//! identifier - identifier-octet codec
//! length     - length-octet codec, definite and indefinite
//! parser     - splits a byte string into TLV sextuples
//! native     - the language-neutral decoded form (Native)
//! spec       - the schema DSL (SpecKind, TaggedSpec, SequenceSpec, ...)
//! registry   - named spec lookup, breaking cyclic schema references
//! value      - Node: the runtime value tree, Build and encode
//! types      - per-primitive-type contents codecs
//! config     - DecodeConfig
//! ```

pub mod config;
pub mod error;
pub mod identifier;
pub mod length;
pub mod native;
pub mod parser;
pub mod registry;
pub mod spec;
pub mod tag;
pub mod types;
pub mod value;

pub mod prelude {
    pub use crate::config::DecodeConfig;
    pub use crate::error::{Error, ErrorKind};
    pub use crate::native::Native;
    pub use crate::registry::Registry;
    pub use crate::spec::{
        Alternative, Field, SequenceSpec, SpecKind, SpecRef, TagOverride, Tagging, TaggedSpec,
    };
    pub use crate::tag::{Class, Method, Tag};
    pub use crate::value::Node;
}
