//! The schema DSL: a *spec* is a type declaration that the [`crate::value`] runtime parses
//! bytes against and serializes native data through. Specs are plain data (an `Arc`-shared tree),
//! never code generated from them -- "the schema is fixed in source code, not loaded from ASN.1
//! modules at runtime" (§1), but it is a runtime value, not a compile-time trait impl.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{Error, ErrorKind};
use crate::native::Native;
use crate::tag::{Class, Tag};
use crate::value::Node;

/// How a field or alternative overrides the tag its child spec would otherwise present.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Tagging {
    None,
    Implicit,
    Explicit,
}

#[derive(Copy, Clone, Debug)]
pub struct TagOverride {
    pub tagging: Tagging,
    pub class: Class,
    pub tag: u32,
}

impl TagOverride {
    pub fn implicit(tag: u32) -> Self {
        Self {
            tagging: Tagging::Implicit,
            class: Class::Context,
            tag,
        }
    }

    pub fn implicit_in(class: Class, tag: u32) -> Self {
        Self {
            tagging: Tagging::Implicit,
            class,
            tag,
        }
    }

    pub fn explicit(tag: u32) -> Self {
        Self {
            tagging: Tagging::Explicit,
            class: Class::Context,
            tag,
        }
    }

    pub fn explicit_in(class: Class, tag: u32) -> Self {
        Self {
            tagging: Tagging::Explicit,
            class,
            tag,
        }
    }
}

/// A spec together with the tagging override a particular usage site (a field, an alternative,
/// or the top-level `load`/`new` call) applies to it.
#[derive(Clone)]
pub struct TaggedSpec {
    pub spec: SpecRef,
    pub tag_override: Option<TagOverride>,
}

impl TaggedSpec {
    pub fn new(spec: SpecRef) -> Self {
        Self {
            spec,
            tag_override: None,
        }
    }

    pub fn with_tagging(spec: SpecRef, tag_override: TagOverride) -> Result<Self, Error> {
        if tag_override.tagging == Tagging::Implicit && matches!(&spec.0.kind, SpecKind::Choice(_))
        {
            return Err(Error::new(ErrorKind::SchemaError {
                what: "implicit tagging of a Choice is forbidden".into(),
            }));
        }
        Ok(Self {
            spec,
            tag_override: Some(tag_override),
        })
    }

    /// The set of `(class, tag)` pairs that would be accepted as this usage's identity.
    /// A Choice with no tagging override yields the union of its alternatives' identities,
    /// since an untagged Choice contributes no wrapper of its own (§4.5).
    pub fn effective_tags(&self) -> Vec<Tag> {
        match &self.tag_override {
            Some(ov) => vec![Tag::new(ov.class, ov.tag)],
            None => self.spec.own_tags(),
        }
    }

    pub fn is_explicit(&self) -> bool {
        matches!(
            self.tag_override,
            Some(TagOverride {
                tagging: Tagging::Explicit,
                ..
            })
        )
    }

    pub fn is_implicit(&self) -> bool {
        matches!(
            self.tag_override,
            Some(TagOverride {
                tagging: Tagging::Implicit,
                ..
            })
        )
    }
}

/// A field of a `Sequence` or `Set`.
#[derive(Clone)]
pub struct Field {
    pub name: String,
    pub typ: TaggedSpec,
    pub optional: bool,
    pub default: Option<Native>,
}

impl Field {
    pub fn required(name: impl Into<String>, spec: SpecRef) -> Self {
        Self {
            name: name.into(),
            typ: TaggedSpec::new(spec),
            optional: false,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, spec: SpecRef) -> Self {
        Self {
            name: name.into(),
            typ: TaggedSpec::new(spec),
            optional: true,
            default: None,
        }
    }

    pub fn defaulted(name: impl Into<String>, spec: SpecRef, default: Native) -> Self {
        Self {
            name: name.into(),
            typ: TaggedSpec::new(spec),
            optional: true,
            default: Some(default),
        }
    }

    pub fn tagged(mut self, tag_override: TagOverride) -> Result<Self, Error> {
        self.typ = TaggedSpec::with_tagging(self.typ.spec.clone(), tag_override)?;
        Ok(self)
    }

    /// Whether this field may be elided from parsing/encoding (optional or defaulted).
    pub fn is_elidable(&self) -> bool {
        self.optional || self.default.is_some()
    }
}

/// A callback invoked with the partially-built parent node to compute a field's effective spec,
/// for value-dependent structure such as CMS's version-gated content fields (§9).
pub type SpecCallback = Arc<dyn Fn(&Node) -> SpecRef + Send + Sync>;

#[derive(Clone)]
pub struct SequenceSpec {
    pub fields: Vec<Field>,
    /// `(oid_field_name, open_field_name)`: the open field's effective spec is looked up in
    /// `oid_specs` by the already-parsed OID sibling's dotted string.
    pub oid_pair: Option<(String, String)>,
    pub oid_specs: BTreeMap<String, SpecRef>,
    pub spec_callbacks: BTreeMap<String, SpecCallback>,
}

impl SequenceSpec {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            oid_pair: None,
            oid_specs: BTreeMap::new(),
            spec_callbacks: BTreeMap::new(),
        }
    }

    pub fn with_oid_dispatch(
        mut self,
        oid_field: impl Into<String>,
        open_field: impl Into<String>,
        oid_specs: BTreeMap<String, SpecRef>,
    ) -> Self {
        self.oid_pair = Some((oid_field.into(), open_field.into()));
        self.oid_specs = oid_specs;
        self
    }

    pub fn with_callback(
        mut self,
        field: impl Into<String>,
        callback: impl Fn(&Node) -> SpecRef + Send + Sync + 'static,
    ) -> Self {
        self.spec_callbacks.insert(field.into(), Arc::new(callback));
        self
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

#[derive(Clone)]
pub struct Alternative {
    pub name: String,
    pub typ: TaggedSpec,
}

impl Alternative {
    pub fn new(name: impl Into<String>, spec: SpecRef) -> Self {
        Self {
            name: name.into(),
            typ: TaggedSpec::new(spec),
        }
    }

    pub fn tagged(name: impl Into<String>, spec: SpecRef, tag_override: TagOverride) -> Result<Self, Error> {
        Ok(Self {
            name: name.into(),
            typ: TaggedSpec::with_tagging(spec, tag_override)?,
        })
    }
}

/// A name map between decoded integers and mnemonic symbolic names (Integer/Enumerated/BitString).
pub type IntegerNameMap = BTreeMap<i64, String>;
/// A name map between an OID's dotted-decimal string and a mnemonic name.
pub type OidNameMap = BTreeMap<String, String>;

#[derive(Clone)]
pub enum SpecKind {
    Boolean,
    Integer {
        name_map: Option<IntegerNameMap>,
    },
    BitString {
        /// Named bits, in ascending bit-index order: `(name, bit_index)`.
        name_map: Option<Vec<(String, u32)>>,
    },
    OctetString,
    /// An OctetString whose contents are themselves ASN.1, parsed against `inner` on demand.
    ParsableOctetString {
        inner: SpecRef,
    },
    /// A BitString (assumed whole-octet) whose contents are themselves ASN.1.
    ParsableOctetBitString {
        inner: SpecRef,
    },
    Null,
    ObjectIdentifier {
        name_map: Option<OidNameMap>,
    },
    RelativeOid,
    /// Integer restricted to a mandatory name map; the native form is always the mapped name.
    Enumerated {
        variants: IntegerNameMap,
    },
    Utf8String,
    BmpString,
    UniversalString,
    IA5String,
    PrintableString,
    VisibleString,
    NumericString,
    TeletexString,
    GeneralString,
    GraphicString,
    UtcTime,
    GeneralizedTime,
    Sequence(SequenceSpec),
    SequenceOf(SpecRef),
    Set(SequenceSpec),
    SetOf(SpecRef),
    Choice(Vec<Alternative>),
    /// Wraps arbitrary TLV bytes; re-parseable on demand against a supplied spec.
    Any,
    /// A non-standard convenience: independent TLVs concatenated with no enclosing header.
    Concat(Vec<SpecRef>),
    /// Resolved through a [`crate::registry::Registry`] at decode/encode time, breaking cycles.
    Ref(String),
}

impl SpecKind {
    fn universal_tag(&self) -> Option<Tag> {
        use SpecKind::*;
        Some(match self {
            Boolean => Tag::BOOLEAN,
            Integer { .. } => Tag::INTEGER,
            BitString { .. } => Tag::BIT_STRING,
            OctetString | ParsableOctetString { .. } => Tag::OCTET_STRING,
            ParsableOctetBitString { .. } => Tag::BIT_STRING,
            Null => Tag::NULL,
            ObjectIdentifier { .. } => Tag::OBJECT_IDENTIFIER,
            RelativeOid => Tag::RELATIVE_OID,
            Enumerated { .. } => Tag::ENUMERATED,
            Utf8String => Tag::UTF8_STRING,
            BmpString => Tag::BMP_STRING,
            UniversalString => Tag::UNIVERSAL_STRING,
            IA5String => Tag::IA5_STRING,
            PrintableString => Tag::PRINTABLE_STRING,
            VisibleString => Tag::VISIBLE_STRING,
            NumericString => Tag::NUMERIC_STRING,
            TeletexString => Tag::TELETEX_STRING,
            GeneralString => Tag::GENERAL_STRING,
            GraphicString => Tag::GRAPHIC_STRING,
            UtcTime => Tag::UTC_TIME,
            GeneralizedTime => Tag::GENERALIZED_TIME,
            Sequence(_) | SequenceOf(_) => Tag::SEQUENCE,
            Set(_) | SetOf(_) => Tag::SET,
            Choice(_) | Any | Concat(_) | Ref(_) => return None,
        })
    }

    pub fn is_constructed_by_default(&self) -> bool {
        matches!(
            self,
            SpecKind::Sequence(_) | SpecKind::SequenceOf(_) | SpecKind::Set(_) | SpecKind::SetOf(_)
        )
    }
}

/// Per-type lookup tables computed once and cached: identity maps for Sequence/Set field
/// dispatch and Choice alternative dispatch (§4.8). Construction is a pure function of the
/// immutable spec tree, so racing it from two threads is safe even without an exclusive lock.
#[derive(Default)]
pub struct SchemaTable {
    /// `(class, tag) -> field or alternative index`, built once from the declared list.
    pub identity_index: BTreeMap<(u8, u32), usize>,
}

/// A reference-counted, sharable spec node. Cheap to clone; the tree itself is immutable once
/// constructed, so sharing between threads for read-only decode/encode is always safe.
#[derive(Clone)]
pub struct SpecRef(pub(crate) Arc<SpecNode>);

pub struct SpecNode {
    pub kind: SpecKind,
    table: OnceCell<SchemaTable>,
}

impl SpecRef {
    pub fn new(kind: SpecKind) -> Self {
        Self(Arc::new(SpecNode {
            kind,
            table: OnceCell::new(),
        }))
    }

    pub fn kind(&self) -> &SpecKind {
        &self.0.kind
    }

    /// The `(class, tag)` pairs this spec itself would present with no tagging override applied.
    pub fn own_tags(&self) -> Vec<Tag> {
        match &self.0.kind {
            SpecKind::Choice(alts) => alts.iter().flat_map(|a| a.typ.effective_tags()).collect(),
            SpecKind::Any | SpecKind::Concat(_) | SpecKind::Ref(_) => Vec::new(),
            other => vec![other
                .universal_tag()
                .expect("non-choice, non-any, non-ref kinds declare a universal tag")],
        }
    }

    /// Computes (if absent) and returns the identity lookup table for a Sequence/Set/Choice.
    pub fn table(&self) -> &SchemaTable {
        self.0.table.get_or_init(|| match &self.0.kind {
            SpecKind::Sequence(seq) | SpecKind::Set(seq) => {
                let mut identity_index = BTreeMap::new();
                for (i, field) in seq.fields.iter().enumerate() {
                    for tag in field.typ.effective_tags() {
                        identity_index.insert((tag.class.to_u8(), tag.value), i);
                    }
                }
                SchemaTable { identity_index }
            }
            SpecKind::Choice(alts) => {
                let mut identity_index = BTreeMap::new();
                for (i, alt) in alts.iter().enumerate() {
                    for tag in alt.typ.effective_tags() {
                        identity_index.insert((tag.class.to_u8(), tag.value), i);
                    }
                }
                SchemaTable { identity_index }
            }
            _ => SchemaTable::default(),
        })
    }
}

impl fmt::Debug for SpecRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpecRef(..)")
    }
}

/// Looks up the universal-tag table entry for a bare `(class, tag)` pair with no declared spec
/// (§4.3 Build rule 1): the fixed dispatch table every decoder must honor when no spec narrows
/// the expected type.
pub fn universal_spec_for(tag: Tag) -> Option<SpecRef> {
    if !tag.class.is_universal() {
        return None;
    }
    let kind = match tag.value {
        1 => SpecKind::Boolean,
        2 => SpecKind::Integer { name_map: None },
        3 => SpecKind::BitString { name_map: None },
        4 => SpecKind::OctetString,
        5 => SpecKind::Null,
        6 => SpecKind::ObjectIdentifier { name_map: None },
        10 => SpecKind::Enumerated {
            variants: IntegerNameMap::new(),
        },
        12 => SpecKind::Utf8String,
        13 => SpecKind::RelativeOid,
        16 => SpecKind::Sequence(SequenceSpec::new(Vec::new())),
        17 => SpecKind::Set(SequenceSpec::new(Vec::new())),
        18 => SpecKind::NumericString,
        19 => SpecKind::PrintableString,
        20 => SpecKind::TeletexString,
        22 => SpecKind::IA5String,
        23 => SpecKind::UtcTime,
        24 => SpecKind::GeneralizedTime,
        26 => SpecKind::VisibleString,
        27 => SpecKind::GeneralString,
        28 => SpecKind::UniversalString,
        30 => SpecKind::BmpString,
        _ => return None,
    };
    Some(SpecRef::new(kind))
}
