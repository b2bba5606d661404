//! The remote schema service interface and its descriptor cache.
//!
//! The streaming back-ends do not hold a [`DescriptorPool`]; they fetch
//! type definitions by URL through a [`SchemaResolver`] and convert the
//! returned wire-shape descriptions into [`Descriptor`]s, memoizing the
//! conversion per URL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::descriptor::{
    Cardinality, DefaultValue, Descriptor, EnumDescriptor, Field, Kind, TypeSource,
};
use crate::error::{Error, Result};

/// A message type description as produced by a schema service.
#[derive(Debug, Clone, Default)]
pub struct TypeProto {
    /// Fully-qualified message name.
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldProto>,
    /// Oneof group names, referenced by index from fields.
    pub oneofs: Vec<String>,
    /// Whether this type is a synthetic map entry.
    pub map_entry: bool,
}

/// One field of a [`TypeProto`].
#[derive(Debug, Clone)]
pub struct FieldProto {
    /// The low-level type tag.
    pub kind: Kind,
    /// The field cardinality.
    pub cardinality: Cardinality,
    /// The field number.
    pub number: i32,
    /// The declared field name.
    pub name: String,
    /// The lowerCamelCase JSON name; derived from `name` when empty.
    pub json_name: String,
    /// Type URL of the referenced message or enum type, if any.
    pub type_url: String,
    /// Index into the parent's oneof list, if the field belongs to one.
    pub oneof_index: Option<u32>,
    /// The packed encoding hint.
    pub packed: bool,
    /// Whether the referenced message type is a map entry.
    pub map: bool,
    /// The declared proto2 default, rendered as text.
    pub default_value: Option<String>,
}

impl FieldProto {
    /// A minimal field description; everything else defaults off.
    #[must_use]
    pub fn new(name: &str, number: i32, kind: Kind) -> Self {
        Self {
            kind,
            cardinality: Cardinality::Singular,
            number,
            name: name.to_owned(),
            json_name: String::new(),
            type_url: String::new(),
            oneof_index: None,
            packed: false,
            map: false,
            default_value: None,
        }
    }
}

/// An enum type description as produced by a schema service.
#[derive(Debug, Clone, Default)]
pub struct EnumProto {
    /// Fully-qualified enum name.
    pub name: String,
    /// `(name, number)` pairs in declaration order.
    pub values: Vec<(String, i32)>,
}

/// The minimal schema service consumed by the streaming back-ends.
///
/// Type URLs have the form `<host>/<fully.qualified.Name>`; the host
/// component is arbitrary. Implementations are expected to be cheap to call
/// repeatedly — the codec caches converted descriptors, not raw protos.
pub trait SchemaResolver {
    /// Fetches the message type description for `type_url`.
    fn resolve_message_type(&self, type_url: &str) -> Result<TypeProto>;

    /// Fetches the enum type description for `type_url`.
    fn resolve_enum_type(&self, type_url: &str) -> Result<EnumProto>;
}

/// An in-memory [`SchemaResolver`] backed by hash maps, keyed by
/// fully-qualified name.
#[derive(Debug, Default)]
pub struct MapResolver {
    types: HashMap<String, TypeProto>,
    enums: HashMap<String, EnumProto>,
}

impl MapResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a message type under its own name.
    pub fn add_type(&mut self, proto: TypeProto) {
        self.types.insert(proto.name.clone(), proto);
    }

    /// Registers an enum type under its own name.
    pub fn add_enum(&mut self, proto: EnumProto) {
        self.enums.insert(proto.name.clone(), proto);
    }
}

impl SchemaResolver for MapResolver {
    fn resolve_message_type(&self, type_url: &str) -> Result<TypeProto> {
        let name = type_name_of(type_url)?;
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no such message type: '{name}'")))
    }

    fn resolve_enum_type(&self, type_url: &str) -> Result<EnumProto> {
        let name = type_name_of(type_url)?;
        self.enums
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no such enum type: '{name}'")))
    }
}

/// Splits the type name out of `<host>/<fully.qualified.Name>`.
pub(crate) fn type_name_of(type_url: &str) -> Result<&str> {
    match type_url.rfind('/') {
        Some(slash) if slash >= 1 && slash + 1 < type_url.len() => Ok(&type_url[slash + 1..]),
        _ => Err(Error::invalid(format!("invalid type URL: '{type_url}'"))),
    }
}

/// A per-invocation cache of descriptors fetched through a
/// [`SchemaResolver`], keyed by type name.
pub(crate) struct ResolverPool<'r> {
    resolver: &'r dyn SchemaResolver,
    messages: Mutex<HashMap<String, Arc<Descriptor>>>,
    enums: Mutex<HashMap<String, Arc<EnumDescriptor>>>,
}

impl<'r> ResolverPool<'r> {
    pub(crate) fn new(resolver: &'r dyn SchemaResolver) -> Self {
        Self {
            resolver,
            messages: Mutex::new(HashMap::new()),
            enums: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn find_message(&self, type_url: &str) -> Result<Arc<Descriptor>> {
        let name = type_name_of(type_url)?.to_owned();
        if let Some(found) = self
            .messages
            .lock()
            .map_err(|_| Error::internal("resolver cache poisoned"))?
            .get(&name)
        {
            return Ok(Arc::clone(found));
        }
        let proto = self.resolver.resolve_message_type(type_url)?;
        let descriptor = Arc::new(descriptor_from_proto(&proto)?);
        self.messages
            .lock()
            .map_err(|_| Error::internal("resolver cache poisoned"))?
            .insert(name, Arc::clone(&descriptor));
        Ok(descriptor)
    }

    pub(crate) fn find_enum(&self, type_url: &str) -> Result<Arc<EnumDescriptor>> {
        let name = type_name_of(type_url)?.to_owned();
        if let Some(found) = self
            .enums
            .lock()
            .map_err(|_| Error::internal("resolver cache poisoned"))?
            .get(&name)
        {
            return Ok(Arc::clone(found));
        }
        let proto = self.resolver.resolve_enum_type(type_url)?;
        let descriptor = Arc::new(EnumDescriptor::new(&proto.name, proto.values));
        self.enums
            .lock()
            .map_err(|_| Error::internal("resolver cache poisoned"))?
            .insert(name, Arc::clone(&descriptor));
        Ok(descriptor)
    }
}

impl TypeSource for ResolverPool<'_> {
    fn message_type(&self, name: &str) -> Result<Arc<Descriptor>> {
        self.find_message(name)
    }

    fn enum_type(&self, name: &str) -> Result<Arc<EnumDescriptor>> {
        self.find_enum(name)
    }
}

/// Converts a wire-shape type description into the descriptor model.
fn descriptor_from_proto(proto: &TypeProto) -> Result<Descriptor> {
    let mut fields = Vec::with_capacity(proto.fields.len());
    for fp in &proto.fields {
        let mut field = Field::new(&fp.name, fp.number, fp.kind);
        if !fp.json_name.is_empty() {
            field = field.with_json_name(&fp.json_name);
        }
        match fp.cardinality {
            Cardinality::Singular => {}
            Cardinality::Optional => field = field.optional(),
            Cardinality::Repeated => field = field.repeated(),
        }
        if !fp.type_url.is_empty() {
            field = field.with_type(&fp.type_url);
        }
        if let Some(index) = fp.oneof_index {
            field = field.in_oneof(index);
        }
        if fp.packed {
            field = field.packed();
        }
        if fp.map {
            let entry = field.message_type_name()?.to_owned();
            field = Field::map(&fp.name, fp.number, &entry);
            if !fp.json_name.is_empty() {
                field = field.with_json_name(&fp.json_name);
            }
        }
        if let Some(text) = &fp.default_value {
            field = field.with_default(parse_default(fp.kind, text)?);
        }
        fields.push(field);
    }
    let mut descriptor = Descriptor::new(&proto.name, fields, proto.oneofs.clone())?;
    if proto.map_entry {
        let key = descriptor
            .field_by_number(1)
            .ok_or_else(|| Error::internal(format!("map entry '{}' has no key", proto.name)))?
            .as_ref()
            .clone();
        let value = descriptor
            .field_by_number(2)
            .ok_or_else(|| Error::internal(format!("map entry '{}' has no value", proto.name)))?
            .as_ref()
            .clone();
        descriptor = Descriptor::map_entry(&proto.name, key, value)?;
    }
    Ok(descriptor)
}

fn parse_default(kind: Kind, text: &str) -> Result<DefaultValue> {
    let bad = || Error::internal(format!("malformed default value: '{text}'"));
    Ok(match kind {
        Kind::Double | Kind::Float => DefaultValue::F64(text.parse().map_err(|_| bad())?),
        Kind::Int32 | Kind::Int64 | Kind::Sint32 | Kind::Sint64 | Kind::Sfixed32
        | Kind::Sfixed64 | Kind::Enum => DefaultValue::I64(text.parse().map_err(|_| bad())?),
        Kind::Uint32 | Kind::Uint64 | Kind::Fixed32 | Kind::Fixed64 => {
            DefaultValue::U64(text.parse().map_err(|_| bad())?)
        }
        Kind::Bool => DefaultValue::Bool(text.parse().map_err(|_| bad())?),
        Kind::String => DefaultValue::String(text.to_owned()),
        Kind::Bytes => DefaultValue::Bytes(text.as_bytes().to_vec()),
        Kind::Message | Kind::Group => return Err(bad()),
    })
}

/// Wire-shape descriptions of the well-known types, for registering into a
/// [`MapResolver`].
#[must_use]
pub fn well_known_type_protos() -> Vec<TypeProto> {
    crate::descriptor::well_known_descriptors()
        .iter()
        .map(|desc| TypeProto {
            name: desc.full_name().to_owned(),
            fields: desc
                .fields()
                .iter()
                .map(|f| FieldProto {
                    kind: f.kind(),
                    cardinality: f.cardinality(),
                    number: f.number(),
                    name: f.name().to_owned(),
                    json_name: f.json_name().to_owned(),
                    type_url: f
                        .type_name()
                        .map(|n| format!("type.googleapis.com/{n}"))
                        .unwrap_or_default(),
                    oneof_index: f.oneof_index(),
                    packed: f.is_packed(),
                    map: f.is_map(),
                    default_value: None,
                })
                .collect(),
            oneofs: desc.oneofs().to_vec(),
            map_entry: desc.is_map_entry(),
        })
        .collect()
}

/// The well-known `NullValue` enum in wire shape.
#[must_use]
pub fn null_value_enum_proto() -> EnumProto {
    EnumProto {
        name: "google.protobuf.NullValue".to_owned(),
        values: vec![("NULL_VALUE".to_owned(), 0)],
    }
}
