//! The runtime value tree: a polymorphic `Node` wrapping raw TLV bytes, a declared spec, and
//! lazily materialized typed children / native data (§3.3, §4.3).

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::config::DecodeConfig;
use crate::error::{Error, PathSegment};
use crate::native::Native;
use crate::parser::{self, Tlv};
use crate::registry::Registry;
use crate::spec::{self, SequenceSpec, SpecKind, SpecRef, TagOverride, Tagging, TaggedSpec};
use crate::tag::{Class, Method, Tag};
use crate::types;

/// Decode/encode-time context threaded through recursive `Build` calls: the schema registry for
/// resolving `SpecKind::Ref` cycles, and the decode configuration (strictness, recursion bound).
pub struct Context<'a> {
    pub registry: &'a Registry,
    pub config: DecodeConfig,
}

impl<'a> Context<'a> {
    pub fn new(registry: &'a Registry, config: DecodeConfig) -> Self {
        Self { registry, config }
    }
}

/// A constructed value's child: either a built node, or `Missing` for an elided optional/default
/// field. Unlike a lazy-everything design, `Build` promotes every present child to `Typed`
/// immediately, since sibling dispatch (OID lookups, spec callbacks) needs the earlier sibling's
/// native value while the parent is still being constructed.
#[derive(Clone)]
enum Child {
    Typed(Node),
    Missing,
}

impl Child {
    fn as_node(&self) -> Option<&Node> {
        match self {
            Child::Typed(n) => Some(n),
            Child::Missing => None,
        }
    }
}

#[derive(Clone)]
enum NodeData {
    Primitive {
        native: RefCell<Option<Native>>,
    },
    Constructed {
        children: RefCell<Vec<Child>>,
    },
    Choice {
        chosen: RefCell<Option<(usize, Box<Node>)>>,
    },
    Any {
        parsed: RefCell<Option<Box<Node>>>,
    },
    /// ParsableOctetString / ParsableOctetBitString: raw bytes plus a fixed inner spec,
    /// reparsed and cached on first [`Node::parsed_inner`].
    Parsable {
        native: Native,
        inner: SpecRef,
        parsed: RefCell<Option<Box<Node>>>,
    },
    Concat {
        children: RefCell<Vec<Node>>,
    },
    Absent,
}

/// A polymorphic ASN.1 value node (§3.3): {Primitive, Constructed, Choice, Any, Concat, Absent}.
#[derive(Clone)]
pub struct Node {
    spec: TaggedSpec,
    raw: RefCell<Option<Tlv>>,
    dirty: Cell<bool>,
    data: NodeData,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("raw", &self.raw)
            .field("dirty", &self.dirty.get())
            .finish_non_exhaustive()
    }
}

fn resolve_spec_kind(spec: &SpecRef, registry: &Registry) -> Result<SpecRef, Error> {
    if let SpecKind::Ref(name) = spec.kind() {
        registry
            .get(name)
            .ok_or_else(|| Error::schema_error(format!("unresolved schema reference `{name}`")))
    } else {
        Ok(spec.clone())
    }
}

impl Node {
    /// Parses `bytes` against `spec` (or the universal-tag table, when `spec` is `None`).
    pub fn load(
        bytes: &[u8],
        spec: Option<&TaggedSpec>,
        registry: &Registry,
        config: DecodeConfig,
    ) -> Result<Self, Error> {
        #[cfg(feature = "log")]
        let _span = tracing::trace_span!("Node::load", input_len = bytes.len()).entered();

        if let Some(max) = config.max_input_len {
            if bytes.len() > max {
                return Err(Error::invalid_value("input exceeds configured max_input_len"));
            }
        }

        let tlv = parser::parse(bytes, config.strict)?;
        #[cfg(feature = "log")]
        tracing::trace!(class = ?tlv.class, tag = tlv.tag, method = ?tlv.method, "parsed outermost TLV");
        let ctx = Context::new(registry, config);
        build(tlv, spec, &ctx)
    }

    /// Serializes this node. With `force`, re-encodes from the native/child data to guarantee
    /// DER even when this node still carries BER-only bytes from `load`.
    pub fn dump(&self, force: bool) -> Result<Vec<u8>, Error> {
        #[cfg(feature = "log")]
        let _span = tracing::trace_span!("Node::dump", force).entered();

        if !force && !self.dirty.get() {
            if let Some(tlv) = self.raw.borrow().as_ref() {
                #[cfg(feature = "log")]
                tracing::trace!("reusing cached bytes, node is not dirty");
                return Ok(tlv.to_bytes());
            }
        }
        encode_node(self)
    }

    pub fn native(&self) -> Result<Native, Error> {
        match &self.data {
            NodeData::Primitive { native } => native
                .borrow()
                .clone()
                .ok_or_else(|| Error::invalid_value("primitive has no value set")),
            NodeData::Parsable { native, .. } => Ok(native.clone()),
            NodeData::Constructed { children } => {
                native_for_constructed(self.spec.spec.kind(), &children.borrow())
            }
            NodeData::Choice { chosen } => {
                let chosen = chosen.borrow();
                let (_, inner) = chosen
                    .as_ref()
                    .ok_or_else(|| Error::invalid_value("Choice has no alternative selected"))?;
                inner.native()
            }
            NodeData::Any { .. } => Ok(Native::Raw(self.dump(false)?)),
            NodeData::Concat { children } => {
                let children = children.borrow();
                let mut list = Vec::with_capacity(children.len());
                for child in children.iter() {
                    list.push(child.native()?);
                }
                Ok(Native::List(list))
            }
            NodeData::Absent => Ok(Native::Absent),
        }
    }

    /// A new node with an alternative tagging applied (§6.1 `retag`).
    pub fn retag(&self, tag_override: TagOverride) -> Result<Self, Error> {
        let spec = TaggedSpec::with_tagging(self.spec.spec.clone(), tag_override)?;
        let mut copy = self.clone();
        copy.spec = spec;
        copy.dirty.set(true);
        copy.raw.replace(None);
        Ok(copy)
    }

    /// A new node with any tag override removed.
    pub fn untag(&self) -> Self {
        let mut copy = self.clone();
        copy.spec = TaggedSpec::new(self.spec.spec.clone());
        copy.dirty.set(true);
        copy.raw.replace(None);
        copy
    }

    /// A deep-ish copy: already-materialized children/natives are cloned; raw bytes are cloned
    /// verbatim (this crate owns node data outright rather than sharing it, so "copy" here is a
    /// plain, independent clone -- see `DESIGN.md`).
    pub fn copy(&self) -> Self {
        self.clone()
    }

    fn mark_dirty(&self) {
        self.dirty.set(true);
        self.raw.replace(None);
    }

    // ---- Sequence / Set field access ----

    /// The named field's value, cloned out of the parent (Node's `Clone` is cheap and preserves
    /// already-materialized caches, so this reads like a reference without borrowing `self`).
    pub fn field(&self, name: &str) -> Result<Node, Error> {
        self.with_field(name, |n| n.cloned())?
            .ok_or_else(|| Error::missing_field(name))
    }

    /// Runs `f` with a reference to the named field's node, or `Absent` semantics if the field
    /// was elided. Avoids exposing `Ref<Vec<Child>>` lifetimes through the public API.
    pub fn with_field<T>(&self, name: &str, f: impl FnOnce(Option<&Node>) -> T) -> Result<T, Error> {
        let seq = sequence_spec(self.spec.spec.kind())
            .ok_or_else(|| Error::schema_error("field access on a non-Sequence/Set value"))?;
        let idx = seq
            .field_index(name)
            .ok_or_else(|| Error::schema_error(format!("no such field `{name}`")))?;
        match &self.data {
            NodeData::Constructed { children } => {
                let children = children.borrow();
                Ok(f(children.get(idx).and_then(Child::as_node)))
            }
            _ => Ok(f(None)),
        }
    }

    pub fn set_field(&mut self, name: &str, value: Node) -> Result<(), Error> {
        let seq = sequence_spec(self.spec.spec.kind())
            .ok_or_else(|| Error::schema_error("field assignment on a non-Sequence/Set value"))?
            .clone();
        let idx = seq
            .field_index(name)
            .ok_or_else(|| Error::schema_error(format!("no such field `{name}`")))?;
        match &self.data {
            NodeData::Constructed { children } => {
                let mut children = children.borrow_mut();
                if children.len() <= idx {
                    children.resize(idx + 1, Child::Missing);
                }
                children[idx] = Child::Typed(value);
            }
            _ => return Err(Error::schema_error("not a constructed value")),
        }
        self.mark_dirty();
        Ok(())
    }

    // ---- SequenceOf / SetOf access ----

    pub fn len(&self) -> usize {
        match &self.data {
            NodeData::Constructed { children } => children.borrow().len(),
            NodeData::Concat { children } => children.borrow().len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn with_index<T>(&self, index: usize, f: impl FnOnce(Option<&Node>) -> T) -> T {
        match &self.data {
            NodeData::Constructed { children } => {
                let children = children.borrow();
                f(children.get(index).and_then(Child::as_node))
            }
            NodeData::Concat { children } => {
                let children = children.borrow();
                f(children.get(index))
            }
            _ => f(None),
        }
    }

    pub fn append(&mut self, value: Node) -> Result<(), Error> {
        match &self.data {
            NodeData::Constructed { children } => {
                children.borrow_mut().push(Child::Typed(value));
            }
            NodeData::Concat { children } => {
                children.borrow_mut().push(value);
            }
            _ => return Err(Error::schema_error("append on a non-list value")),
        }
        self.mark_dirty();
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<Node, Error> {
        let removed = match &self.data {
            NodeData::Constructed { children } => {
                let mut children = children.borrow_mut();
                if index >= children.len() {
                    return Err(Error::schema_error("index out of bounds"));
                }
                match children.remove(index) {
                    Child::Typed(n) => n,
                    Child::Missing => {
                        return Err(Error::schema_error("cannot remove an elided field"))
                    }
                }
            }
            NodeData::Concat { children } => {
                let mut children = children.borrow_mut();
                if index >= children.len() {
                    return Err(Error::schema_error("index out of bounds"));
                }
                children.remove(index)
            }
            _ => return Err(Error::schema_error("remove on a non-list value")),
        };
        self.mark_dirty();
        Ok(removed)
    }

    // ---- Choice access ----

    pub fn choice_name(&self) -> Result<&str, Error> {
        match (&self.data, self.spec.spec.kind()) {
            (NodeData::Choice { chosen }, SpecKind::Choice(alts)) => {
                let chosen = chosen.borrow();
                let (idx, _) = chosen
                    .as_ref()
                    .ok_or_else(|| Error::invalid_value("Choice has no alternative selected"))?;
                Ok(alts[*idx].name.as_str())
            }
            _ => Err(Error::schema_error("choice_name on a non-Choice value")),
        }
    }

    pub fn with_chosen<T>(&self, f: impl FnOnce(&Node) -> T) -> Result<T, Error> {
        match &self.data {
            NodeData::Choice { chosen } => {
                let chosen = chosen.borrow();
                let (_, inner) = chosen
                    .as_ref()
                    .ok_or_else(|| Error::invalid_value("Choice has no alternative selected"))?;
                Ok(f(inner))
            }
            _ => Err(Error::schema_error("chosen on a non-Choice value")),
        }
    }

    // ---- Any access ----

    pub fn parse_any(&self, spec: &TaggedSpec, registry: &Registry, config: DecodeConfig) -> Result<Node, Error> {
        match &self.data {
            NodeData::Any { parsed } => {
                let bytes = self.raw.borrow().as_ref().map(Tlv::to_bytes).ok_or_else(|| {
                    Error::invalid_value("Any value has no raw bytes to reparse")
                })?;
                let node = Node::load(&bytes, Some(spec), registry, config)?;
                *parsed.borrow_mut() = Some(Box::new(node.clone()));
                Ok(node)
            }
            _ => Err(Error::schema_error("parse() on a non-Any value")),
        }
    }

    /// The already-parsed inner value of a `ParsableOctetString`/`ParsableOctetBitString`,
    /// parsing and caching it against the spec's fixed inner spec on first access.
    pub fn parsed_inner(&self, registry: &Registry, config: DecodeConfig) -> Result<Node, Error> {
        match &self.data {
            NodeData::Parsable { native, inner, parsed } => {
                if let Some(cached) = parsed.borrow().as_ref() {
                    return Ok((**cached).clone());
                }
                let bytes = match native {
                    Native::OctetString(b) => b.clone(),
                    _ => {
                        return Err(Error::schema_error(
                            "ParsableOctetBitString reparse requires whole-octet bits",
                        ))
                    }
                };
                let node = Node::load(&bytes, Some(&TaggedSpec::new(inner.clone())), registry, config)?;
                *parsed.borrow_mut() = Some(Box::new(node.clone()));
                Ok(node)
            }
            _ => Err(Error::schema_error("parsed_inner on a non-parsable value")),
        }
    }

    // ---- constructors ----

    pub fn new_primitive(spec: SpecRef, native: Native) -> Result<Self, Error> {
        validate_primitive_native(spec.kind(), &native)?;
        Ok(Self {
            spec: TaggedSpec::new(spec),
            raw: RefCell::new(None),
            dirty: Cell::new(true),
            data: NodeData::Primitive {
                native: RefCell::new(Some(native)),
            },
        })
    }

    pub fn new_sequence(spec: SpecRef, fields: BTreeMap<String, Node>) -> Result<Self, Error> {
        let seq = sequence_spec(spec.kind())
            .ok_or_else(|| Error::schema_error("new_sequence requires a Sequence/Set spec"))?
            .clone();
        let mut children = Vec::with_capacity(seq.fields.len());
        for field in &seq.fields {
            match fields.get(&field.name) {
                Some(node) => {
                    // Mirrors `effective_field_spec` on the decode path: the field's declared
                    // tag override is the node's wire identity, not whatever it was built with.
                    let node = match field.typ.tag_override {
                        Some(ov) => node.retag(ov)?,
                        None => node.clone(),
                    };
                    children.push(Child::Typed(node));
                }
                None if field.is_elidable() => children.push(Child::Missing),
                None => return Err(Error::missing_field(field.name.clone())),
            }
        }
        Ok(Self {
            spec: TaggedSpec::new(spec),
            raw: RefCell::new(None),
            dirty: Cell::new(true),
            data: NodeData::Constructed {
                children: RefCell::new(children),
            },
        })
    }

    pub fn new_repeated(spec: SpecRef, items: Vec<Node>) -> Result<Self, Error> {
        if !matches!(spec.kind(), SpecKind::SequenceOf(_) | SpecKind::SetOf(_)) {
            return Err(Error::schema_error("new_repeated requires a SequenceOf/SetOf spec"));
        }
        Ok(Self {
            spec: TaggedSpec::new(spec),
            raw: RefCell::new(None),
            dirty: Cell::new(true),
            data: NodeData::Constructed {
                children: RefCell::new(items.into_iter().map(Child::Typed).collect()),
            },
        })
    }

    pub fn new_choice(spec: SpecRef, alternative: &str, inner: Node) -> Result<Self, Error> {
        let SpecKind::Choice(alts) = spec.kind() else {
            return Err(Error::schema_error("new_choice requires a Choice spec"));
        };
        let idx = alts
            .iter()
            .position(|a| a.name == alternative)
            .ok_or_else(|| Error::schema_error(format!("no such alternative `{alternative}`")))?;
        let inner = match alts[idx].typ.tag_override {
            Some(ov) => inner.retag(ov)?,
            None => inner,
        };
        Ok(Self {
            spec: TaggedSpec::new(spec),
            raw: RefCell::new(None),
            dirty: Cell::new(true),
            data: NodeData::Choice {
                chosen: RefCell::new(Some((idx, Box::new(inner)))),
            },
        })
    }

    pub fn new_any(bytes: Vec<u8>) -> Self {
        let tlv = parser::parse(&bytes, false).unwrap_or(Tlv {
            class: Class::Universal,
            method: Method::Primitive,
            tag: 0,
            header: Vec::new(),
            contents: bytes,
            trailer: Vec::new(),
        });
        Self {
            spec: TaggedSpec::new(SpecRef::new(SpecKind::Any)),
            raw: RefCell::new(Some(tlv)),
            dirty: Cell::new(false),
            data: NodeData::Any {
                parsed: RefCell::new(None),
            },
        }
    }

    pub fn spec(&self) -> &TaggedSpec {
        &self.spec
    }
}

fn sequence_spec(kind: &SpecKind) -> Option<&SequenceSpec> {
    match kind {
        SpecKind::Sequence(seq) | SpecKind::Set(seq) => Some(seq),
        _ => None,
    }
}

fn native_for_constructed(kind: &SpecKind, children: &[Child]) -> Result<Native, Error> {
    match kind {
        SpecKind::Sequence(seq) | SpecKind::Set(seq) => {
            let mut map = BTreeMap::new();
            for (field, child) in seq.fields.iter().zip(children.iter()) {
                let native = match child {
                    Child::Typed(n) => n.native()?,
                    Child::Missing => field.default.clone().unwrap_or(Native::Absent),
                };
                map.insert(field.name.clone(), native);
            }
            Ok(Native::Sequence(map))
        }
        SpecKind::SequenceOf(_) | SpecKind::SetOf(_) => {
            let mut list = Vec::with_capacity(children.len());
            for child in children {
                if let Child::Typed(n) = child {
                    list.push(n.native()?);
                }
            }
            Ok(Native::List(list))
        }
        _ => Err(Error::schema_error("native() on an unrecognized constructed kind")),
    }
}

fn validate_primitive_native(kind: &SpecKind, native: &Native) -> Result<(), Error> {
    // Cheap smoke-test that the native value's shape is plausible for the declared kind; the
    // authoritative check happens at encode time in `types::*::resolve_native`.
    match (kind, native) {
        (SpecKind::Boolean, Native::Boolean(_)) => Ok(()),
        (SpecKind::Integer { .. }, Native::Integer(_) | Native::Enumerated(_)) => Ok(()),
        (SpecKind::Enumerated { .. }, Native::Enumerated(_)) => Ok(()),
        (SpecKind::BitString { .. }, Native::Bits(_) | Native::NamedBits(_)) => Ok(()),
        (SpecKind::OctetString, Native::OctetString(_)) => Ok(()),
        (SpecKind::Null, Native::Absent) => Ok(()),
        (SpecKind::ObjectIdentifier { .. } | SpecKind::RelativeOid, Native::ObjectIdentifier(_)) => Ok(()),
        (
            SpecKind::Utf8String
            | SpecKind::BmpString
            | SpecKind::UniversalString
            | SpecKind::IA5String
            | SpecKind::PrintableString
            | SpecKind::VisibleString
            | SpecKind::NumericString
            | SpecKind::TeletexString
            | SpecKind::GeneralString
            | SpecKind::GraphicString,
            Native::Utf8String(_) | Native::RestrictedString(_) | Native::RawString(_),
        ) => Ok(()),
        (SpecKind::UtcTime | SpecKind::GeneralizedTime, Native::Time(_)) => Ok(()),
        _ => Err(Error::invalid_value(format!(
            "native value does not match declared primitive type"
        ))),
    }
}

fn decode_primitive_native(kind: &SpecKind, contents: &[u8]) -> Result<Native, Error> {
    match kind {
        SpecKind::Boolean => types::boolean::decode(contents),
        SpecKind::Integer { name_map } => types::integer::decode_native(contents, name_map.as_ref()),
        SpecKind::BitString { name_map } => {
            types::bit_string::decode_native(contents, name_map.as_deref())
        }
        SpecKind::OctetString => Ok(types::octet_string::decode_native(contents)),
        SpecKind::Null => {
            types::null::decode(contents)?;
            Ok(Native::Absent)
        }
        SpecKind::ObjectIdentifier { name_map } => types::oid::decode_native(contents, name_map.as_ref()),
        SpecKind::RelativeOid => Ok(Native::ObjectIdentifier(types::oid::decode_relative_oid(contents)?)),
        SpecKind::Enumerated { variants } => types::enumerated::decode_native(contents, variants),
        SpecKind::UtcTime => types::time::decode_utc_native(contents),
        SpecKind::GeneralizedTime => types::time::decode_generalized_native(contents),
        other @ (SpecKind::Utf8String
        | SpecKind::BmpString
        | SpecKind::UniversalString
        | SpecKind::IA5String
        | SpecKind::PrintableString
        | SpecKind::VisibleString
        | SpecKind::NumericString
        | SpecKind::TeletexString
        | SpecKind::GeneralString
        | SpecKind::GraphicString) => Ok(types::strings::decode_native(other, contents)),
        _ => Err(Error::schema_error("not a primitive spec kind")),
    }
}

fn encode_primitive_contents(kind: &SpecKind, native: &Native) -> Result<Vec<u8>, Error> {
    match kind {
        SpecKind::Boolean => Ok(types::boolean::encode(
            native.as_bool().ok_or_else(|| Error::invalid_value("expected BOOLEAN"))?,
        )),
        SpecKind::Integer { name_map } => {
            let value = types::integer::resolve_native(native, name_map.as_ref())?;
            Ok(types::integer::encode(&value))
        }
        SpecKind::BitString { name_map } => {
            let (bits, width) = types::bit_string::resolve_native(native, name_map.as_deref())?;
            Ok(types::bit_string::encode(&bits, width))
        }
        SpecKind::OctetString => types::octet_string::resolve_native(native),
        SpecKind::Null => Ok(types::null::encode()),
        SpecKind::ObjectIdentifier { name_map } => {
            types::oid::encode_oid(&types::oid::resolve_native(native, name_map.as_ref())?)
        }
        SpecKind::RelativeOid => {
            let dotted = native
                .as_str()
                .ok_or_else(|| Error::invalid_value("expected RELATIVE-OID string"))?;
            types::oid::encode_relative_oid(dotted)
        }
        SpecKind::Enumerated { variants } => {
            types::enumerated::encode(&types::enumerated::resolve_native(native)?, variants)
        }
        SpecKind::UtcTime => {
            let Native::Time(dt) = native else {
                return Err(Error::invalid_value("expected a timestamp for UTCTime"));
            };
            Ok(types::time::encode_utc_time(dt))
        }
        SpecKind::GeneralizedTime => {
            let Native::Time(dt) = native else {
                return Err(Error::invalid_value("expected a timestamp for GeneralizedTime"));
            };
            Ok(types::time::encode_generalized_time(dt))
        }
        other @ (SpecKind::Utf8String
        | SpecKind::BmpString
        | SpecKind::UniversalString
        | SpecKind::IA5String
        | SpecKind::PrintableString
        | SpecKind::VisibleString
        | SpecKind::NumericString
        | SpecKind::TeletexString
        | SpecKind::GeneralString
        | SpecKind::GraphicString) => types::strings::encode(other, native),
        _ => Err(Error::schema_error("not a primitive spec kind")),
    }
}

// ---------------------------------------------------------------------------------------------
// Build: bytes -> typed Node
// ---------------------------------------------------------------------------------------------

fn resolve_spec(
    spec_opt: Option<&TaggedSpec>,
    tlv: &Tlv,
    ctx: &Context,
) -> Result<TaggedSpec, Error> {
    match spec_opt {
        Some(tagged) => {
            let resolved = resolve_spec_kind(&tagged.spec, ctx.registry)?;
            Ok(TaggedSpec {
                spec: resolved,
                tag_override: tagged.tag_override,
            })
        }
        None => {
            let tag = Tag::new(tlv.class, tlv.tag);
            let universal = spec::universal_spec_for(tag)
                .ok_or_else(|| Error::unexpected_tag(Vec::new(), tag))?;
            Ok(TaggedSpec::new(universal))
        }
    }
}

fn build(tlv: Tlv, spec_opt: Option<&TaggedSpec>, ctx: &Context) -> Result<Node, Error> {
    let spec = resolve_spec(spec_opt, &tlv, ctx)?;

    if spec.is_explicit() {
        let ov = spec.tag_override.expect("is_explicit implies Some");
        if tlv.class != ov.class || tlv.tag != ov.tag || tlv.method != Method::Constructed {
            return Err(Error::unexpected_tag(vec![Tag::new(ov.class, ov.tag)], tlv.tag()));
        }
        let (inner_tlv, consumed) =
            parser::parse_tlv(&tlv.contents, 0, ctx.config.strict, ctx.config.max_depth)?;
        if ctx.config.strict && consumed != tlv.contents.len() {
            return Err(crate::error::ParseError::from(crate::error::ParseErrorKind::TrailingBytes).into());
        }
        let bare = TaggedSpec::new(spec.spec.clone());
        let mut inner_node = build(inner_tlv, Some(&bare), ctx)?;
        inner_node.spec = spec;
        inner_node.raw = RefCell::new(Some(tlv));
        return Ok(inner_node);
    }

    match spec.spec.kind() {
        SpecKind::Choice(alts) => build_choice(tlv, spec.clone(), alts, ctx),
        SpecKind::Any => Ok(build_any(tlv, spec)),
        _ => {
            let expected = spec.effective_tags();
            if !expected.iter().any(|t| *t == tlv.tag()) {
                return Err(Error::unexpected_tag(expected, tlv.tag()));
            }
            match spec.spec.kind() {
                SpecKind::ParsableOctetString { inner } => {
                    build_parsable(tlv, spec.clone(), inner.clone(), false, ctx)
                }
                SpecKind::ParsableOctetBitString { inner } => {
                    build_parsable(tlv, spec.clone(), inner.clone(), true, ctx)
                }
                SpecKind::Sequence(seq) => build_sequence(tlv, spec.clone(), seq, ctx),
                SpecKind::Set(seq) => build_set(tlv, spec.clone(), seq, ctx),
                SpecKind::SequenceOf(child) | SpecKind::SetOf(child) => {
                    build_repeated(tlv, spec.clone(), child.clone(), ctx)
                }
                SpecKind::Concat(parts) => build_concat(tlv, spec.clone(), parts.clone(), ctx),
                _ => build_primitive(tlv, spec.clone(), ctx),
            }
        }
    }
}

fn build_any(tlv: Tlv, spec: TaggedSpec) -> Node {
    Node {
        spec,
        raw: RefCell::new(Some(tlv)),
        dirty: Cell::new(false),
        data: NodeData::Any {
            parsed: RefCell::new(None),
        },
    }
}

/// BER permits OCTET STRING to be segmented: a constructed TLV whose contents are themselves a
/// run of nested OCTET STRING TLVs (possibly segmented again). The native value is the
/// concatenation of the *payloads*, not the literal bytes of the nested TLVs.
fn reassemble_octet_string(tlv: &Tlv, ctx: &Context) -> Result<Vec<u8>, Error> {
    if tlv.method == Method::Primitive {
        return Ok(tlv.contents.clone());
    }
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < tlv.contents.len() {
        let (child, consumed) =
            parser::parse_tlv(&tlv.contents, pos, ctx.config.strict, ctx.config.max_depth)?;
        out.extend(reassemble_octet_string(&child, ctx)?);
        pos += consumed;
    }
    Ok(out)
}

fn build_parsable(
    tlv: Tlv,
    spec: TaggedSpec,
    inner: SpecRef,
    is_bits: bool,
    ctx: &Context,
) -> Result<Node, Error> {
    let native = if is_bits {
        let bits = types::bit_string::decode(&tlv.contents)?;
        Native::Bits(bits.iter().map(|b| *b).collect())
    } else {
        let contents = reassemble_octet_string(&tlv, ctx)?;
        types::octet_string::decode_native(&contents)
    };
    Ok(Node {
        spec,
        raw: RefCell::new(Some(tlv)),
        dirty: Cell::new(false),
        data: NodeData::Parsable {
            native,
            inner,
            parsed: RefCell::new(None),
        },
    })
}

fn build_primitive(tlv: Tlv, spec: TaggedSpec, ctx: &Context) -> Result<Node, Error> {
    let native = if matches!(spec.spec.kind(), SpecKind::OctetString) {
        let contents = reassemble_octet_string(&tlv, ctx)?;
        types::octet_string::decode_native(&contents)
    } else {
        decode_primitive_native(spec.spec.kind(), &tlv.contents)?
    };
    Ok(Node {
        spec,
        raw: RefCell::new(Some(tlv)),
        dirty: Cell::new(false),
        data: NodeData::Primitive {
            native: RefCell::new(Some(native)),
        },
    })
}

fn build_choice(
    tlv: Tlv,
    spec: TaggedSpec,
    alts: &[crate::spec::Alternative],
    ctx: &Context,
) -> Result<Node, Error> {
    let table = spec.spec.table();
    let idx = *table
        .identity_index
        .get(&(tlv.class.to_u8(), tlv.tag))
        .ok_or_else(|| Error::unexpected_tag(spec.spec.own_tags(), tlv.tag()))?;
    let alt = &alts[idx];
    #[cfg(feature = "log")]
    tracing::trace!(alternative = %alt.name, "Choice dispatched");
    let inner = build(tlv, Some(&alt.typ), ctx)
        .map_err(|e| e.with_segment(PathSegment::ChoiceAlternative(alt.name.clone())))?;
    Ok(Node {
        spec,
        raw: RefCell::new(None),
        dirty: Cell::new(false),
        data: NodeData::Choice {
            chosen: RefCell::new(Some((idx, Box::new(inner)))),
        },
    })
}

fn build_repeated(tlv: Tlv, spec: TaggedSpec, child_spec: SpecRef, ctx: &Context) -> Result<Node, Error> {
    let child_tagged = TaggedSpec::new(child_spec);
    let mut children = Vec::new();
    let mut pos = 0usize;
    let contents = &tlv.contents;
    let mut index = 0usize;
    while pos < contents.len() {
        let (child_tlv, consumed) =
            parser::parse_tlv(contents, pos, ctx.config.strict, ctx.config.max_depth)?;
        let node = build(child_tlv, Some(&child_tagged), ctx)
            .map_err(|e| e.with_segment(PathSegment::Index(index)))?;
        children.push(Child::Typed(node));
        pos += consumed;
        index += 1;
    }
    Ok(Node {
        spec,
        raw: RefCell::new(Some(tlv)),
        dirty: Cell::new(false),
        data: NodeData::Constructed {
            children: RefCell::new(children),
        },
    })
}

fn build_concat(tlv: Tlv, spec: TaggedSpec, parts: Vec<SpecRef>, ctx: &Context) -> Result<Node, Error> {
    let mut children = Vec::with_capacity(parts.len());
    let mut pos = 0usize;
    let contents = &tlv.contents;
    for part in parts {
        let (child_tlv, consumed) =
            parser::parse_tlv(contents, pos, ctx.config.strict, ctx.config.max_depth)?;
        let node = build(child_tlv, Some(&TaggedSpec::new(part)), ctx)?;
        children.push(node);
        pos += consumed;
    }
    Ok(Node {
        spec,
        raw: RefCell::new(Some(tlv)),
        dirty: Cell::new(false),
        data: NodeData::Concat {
            children: RefCell::new(children),
        },
    })
}

fn build_sequence(tlv: Tlv, spec: TaggedSpec, seq: &SequenceSpec, ctx: &Context) -> Result<Node, Error> {
    let contents = tlv.contents.clone();
    let mut partial = Node {
        spec: spec.clone(),
        raw: RefCell::new(None),
        dirty: Cell::new(true),
        data: NodeData::Constructed {
            children: RefCell::new(Vec::with_capacity(seq.fields.len())),
        },
    };

    let mut pos = 0usize;
    for field in &seq.fields {
        let next_tlv = if pos < contents.len() {
            Some(parser::parse_tlv(&contents, pos, ctx.config.strict, ctx.config.max_depth)?)
        } else {
            None
        };

        let effective_typ = effective_field_spec(seq, field, &partial)?;

        let matched = match &next_tlv {
            Some((child_tlv, _)) => {
                effective_typ.effective_tags().iter().any(|t| *t == child_tlv.tag())
                    || matches!(effective_typ.spec.kind(), SpecKind::Choice(_) | SpecKind::Any)
            }
            None => false,
        };

        if !matched {
            if field.is_elidable() {
                push_child(&mut partial, Child::Missing);
                continue;
            }
            return Err(match next_tlv {
                Some((child_tlv, _)) => {
                    Error::unexpected_tag(effective_typ.effective_tags(), child_tlv.tag())
                        .with_segment(PathSegment::Field(field.name.clone()))
                }
                None => Error::missing_field(field.name.clone()),
            });
        }

        let (child_tlv, consumed) = next_tlv.expect("matched implies a TLV was present");
        let node = build(child_tlv, Some(&effective_typ), ctx)
            .map_err(|e| e.with_segment(PathSegment::Field(field.name.clone())))?;
        push_child(&mut partial, Child::Typed(node));
        pos += consumed;
    }

    if pos != contents.len() {
        return Err(crate::error::ParseError::from(crate::error::ParseErrorKind::TrailingBytes).into());
    }

    partial.raw = RefCell::new(Some(tlv));
    partial.dirty = Cell::new(false);
    Ok(partial)
}

fn push_child(partial: &mut Node, child: Child) {
    if let NodeData::Constructed { children } = &partial.data {
        children.borrow_mut().push(child);
    }
}

fn effective_field_spec(
    seq: &SequenceSpec,
    field: &crate::spec::Field,
    partial: &Node,
) -> Result<TaggedSpec, Error> {
    if let Some(callback) = seq.spec_callbacks.get(&field.name) {
        return Ok(TaggedSpec::new(callback(partial)));
    }
    if let Some((oid_field, open_field)) = &seq.oid_pair {
        if open_field == &field.name {
            let oid_native = partial.with_field(oid_field, |n| n.map(Node::native))?;
            let dotted = match oid_native {
                Some(Ok(native)) => native
                    .as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| Error::schema_error("oid_pair field is not an OID"))?,
                Some(Err(e)) => return Err(e),
                None => return Err(Error::schema_error("oid_pair OID field not yet parsed")),
            };
            let resolved = seq.oid_specs.get(&dotted).cloned();
            #[cfg(feature = "log")]
            tracing::trace!(
                oid = %dotted,
                resolved = resolved.is_some(),
                "OID-dispatched field resolved"
            );
            return Ok(TaggedSpec::new(resolved.unwrap_or_else(|| SpecRef::new(SpecKind::Any))));
        }
    }
    Ok(field.typ.clone())
}

fn build_set(tlv: Tlv, spec: TaggedSpec, seq: &SequenceSpec, ctx: &Context) -> Result<Node, Error> {
    let table = spec.spec.table();
    let mut slots: Vec<Option<Child>> = vec![None; seq.fields.len()];
    let contents = &tlv.contents;
    let mut pos = 0usize;
    while pos < contents.len() {
        let (child_tlv, consumed) =
            parser::parse_tlv(contents, pos, ctx.config.strict, ctx.config.max_depth)?;
        let idx = *table
            .identity_index
            .get(&(child_tlv.class.to_u8(), child_tlv.tag))
            .ok_or_else(|| Error::unexpected_tag(Vec::new(), child_tlv.tag()))?;
        let field = &seq.fields[idx];
        let node = build(child_tlv, Some(&field.typ), ctx)
            .map_err(|e| e.with_segment(PathSegment::Field(field.name.clone())))?;
        slots[idx] = Some(Child::Typed(node));
        pos += consumed;
    }

    let mut children = Vec::with_capacity(seq.fields.len());
    for (i, field) in seq.fields.iter().enumerate() {
        match slots[i].take() {
            Some(child) => children.push(child),
            None if field.is_elidable() => children.push(Child::Missing),
            None => return Err(Error::missing_field(field.name.clone())),
        }
    }

    Ok(Node {
        spec,
        raw: RefCell::new(Some(tlv)),
        dirty: Cell::new(false),
        data: NodeData::Constructed {
            children: RefCell::new(children),
        },
    })
}

// ---------------------------------------------------------------------------------------------
// Encode: typed Node -> DER bytes
// ---------------------------------------------------------------------------------------------

fn wrap(spec: &TaggedSpec, method: Method, contents: Vec<u8>) -> Result<Vec<u8>, Error> {
    match spec.tag_override {
        None => {
            let tag = spec
                .spec
                .own_tags()
                .into_iter()
                .next()
                .ok_or_else(|| Error::schema_error("spec has no tag of its own"))?;
            Ok(parser::emit(tag.class, method, tag.value, &contents))
        }
        Some(TagOverride {
            tagging: Tagging::Implicit,
            class,
            tag,
        }) => Ok(parser::emit(class, method, tag, &contents)),
        Some(TagOverride {
            tagging: Tagging::Explicit,
            class,
            tag,
        }) => {
            let own_tag = spec
                .spec
                .own_tags()
                .into_iter()
                .next()
                .ok_or_else(|| Error::schema_error("spec has no tag of its own to wrap explicitly"))?;
            let inner = parser::emit(own_tag.class, method, own_tag.value, &contents);
            Ok(parser::emit(class, Method::Constructed, tag, &inner))
        }
        Some(TagOverride {
            tagging: Tagging::None,
            ..
        }) => Ok(parser::emit(Class::Universal, method, 0, &contents)),
    }
}

fn encode_node(node: &Node) -> Result<Vec<u8>, Error> {
    match &node.data {
        NodeData::Primitive { native } => {
            let native = native.borrow();
            let native = native
                .as_ref()
                .ok_or_else(|| Error::invalid_value("primitive has no value set"))?;
            let contents = encode_primitive_contents(node.spec.spec.kind(), native)?;
            wrap(&node.spec, Method::Primitive, contents)
        }
        NodeData::Parsable { native, .. } => {
            let contents = match native {
                Native::OctetString(b) => b.clone(),
                Native::Bits(bits) => {
                    let bitvec: bitvec::vec::BitVec<u8, bitvec::order::Msb0> =
                        bits.iter().copied().collect();
                    types::bit_string::encode(&bitvec, None)
                }
                _ => return Err(Error::schema_error("unsupported Parsable native")),
            };
            wrap(&node.spec, Method::Primitive, contents)
        }
        NodeData::Constructed { children } => {
            let children = children.borrow();
            let contents = encode_constructed_contents(node.spec.spec.kind(), &children)?;
            wrap(&node.spec, Method::Constructed, contents)
        }
        NodeData::Choice { chosen } => {
            let chosen = chosen.borrow();
            let (_, inner) = chosen
                .as_ref()
                .ok_or_else(|| Error::invalid_value("Choice has no alternative selected"))?;
            let inner_bytes = encode_node(inner)?;
            match node.spec.tag_override {
                None => Ok(inner_bytes),
                Some(TagOverride {
                    tagging: Tagging::Explicit,
                    class,
                    tag,
                }) => Ok(parser::emit(class, Method::Constructed, tag, &inner_bytes)),
                Some(TagOverride {
                    tagging: Tagging::Implicit,
                    ..
                }) => unreachable!("implicit tagging of a Choice is rejected at schema setup"),
                Some(TagOverride { tagging: Tagging::None, .. }) => Ok(inner_bytes),
            }
        }
        NodeData::Any { parsed } => {
            if let Some(raw) = node.raw.borrow().as_ref() {
                return Ok(raw.to_bytes());
            }
            if let Some(parsed) = parsed.borrow().as_ref() {
                return encode_node(parsed);
            }
            Err(Error::invalid_value("Any value has no bytes to encode"))
        }
        NodeData::Concat { children } => {
            let children = children.borrow();
            let mut out = Vec::new();
            for child in children.iter() {
                out.extend(encode_node(child)?);
            }
            Ok(out)
        }
        NodeData::Absent => Ok(Vec::new()),
    }
}

fn encode_constructed_contents(kind: &SpecKind, children: &[Child]) -> Result<Vec<u8>, Error> {
    match kind {
        SpecKind::Sequence(seq) => {
            let mut out = Vec::new();
            for (field, child) in seq.fields.iter().zip(children.iter()) {
                match child {
                    Child::Missing => continue,
                    Child::Typed(node) => {
                        if let Some(default) = &field.default {
                            if &node.native()? == default {
                                continue;
                            }
                        }
                        out.extend(encode_node(node)?);
                    }
                }
            }
            Ok(out)
        }
        SpecKind::Set(seq) => {
            let mut parts: Vec<(Tag, Vec<u8>)> = Vec::new();
            for (field, child) in seq.fields.iter().zip(children.iter()) {
                let Child::Typed(node) = child else { continue };
                if let Some(default) = &field.default {
                    if &node.native()? == default {
                        continue;
                    }
                }
                let tag = field
                    .typ
                    .effective_tags()
                    .into_iter()
                    .next()
                    .unwrap_or(Tag::new(Class::Universal, 0));
                parts.push((tag, encode_node(node)?));
            }
            parts.sort_by_key(|(tag, _)| (tag.class.to_u8(), tag.value));
            Ok(parts.into_iter().flat_map(|(_, bytes)| bytes).collect())
        }
        SpecKind::SequenceOf(_) => {
            let mut out = Vec::new();
            for child in children {
                if let Child::Typed(node) = child {
                    out.extend(encode_node(node)?);
                }
            }
            Ok(out)
        }
        SpecKind::SetOf(_) => {
            let mut parts = Vec::new();
            for child in children {
                if let Child::Typed(node) = child {
                    parts.push(encode_node(node)?);
                }
            }
            parts.sort();
            Ok(parts.into_iter().flatten().collect())
        }
        _ => Err(Error::schema_error("encode on an unrecognized constructed kind")),
    }
}
