//! The schema data model.
//!
//! A [`Descriptor`] describes one message type: its fully-qualified name,
//! its fields, and its oneof groups. Fields reference message and enum
//! types by name (or by type URL when the schema came from a resolver), and
//! the codec resolves those references on demand through whichever type
//! source it is running against. This indirection is what lets the same
//! descriptor model serve both the in-memory pool and the remote resolver.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// The low-level type tag of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// 64-bit IEEE float, fixed64 on the wire.
    Double,
    /// 32-bit IEEE float, fixed32 on the wire.
    Float,
    /// Signed 64-bit integer, varint on the wire.
    Int64,
    /// Unsigned 64-bit integer, varint on the wire.
    Uint64,
    /// Signed 32-bit integer, varint on the wire.
    Int32,
    /// Unsigned 64-bit integer, fixed64 on the wire.
    Fixed64,
    /// Unsigned 32-bit integer, fixed32 on the wire.
    Fixed32,
    /// Boolean, varint on the wire.
    Bool,
    /// UTF-8 string, length-delimited on the wire.
    String,
    /// Nested message delimited by start/end group tags.
    Group,
    /// Nested message, length-delimited on the wire.
    Message,
    /// Opaque byte string, length-delimited on the wire.
    Bytes,
    /// Unsigned 32-bit integer, varint on the wire.
    Uint32,
    /// Enumeration, varint on the wire.
    Enum,
    /// Signed 32-bit integer, fixed32 on the wire.
    Sfixed32,
    /// Signed 64-bit integer, fixed64 on the wire.
    Sfixed64,
    /// Signed 32-bit integer, zig-zag varint on the wire.
    Sint32,
    /// Signed 64-bit integer, zig-zag varint on the wire.
    Sint64,
}

impl Kind {
    /// Whether values of this kind are restricted to 32-bit range checks.
    #[must_use]
    pub fn is_32bit(self) -> bool {
        matches!(
            self,
            Kind::Float
                | Kind::Int32
                | Kind::Uint32
                | Kind::Fixed32
                | Kind::Sfixed32
                | Kind::Sint32
                | Kind::Enum
        )
    }
}

/// How many values a field may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Implicit presence: absent and default are indistinguishable.
    Singular,
    /// Explicit presence, possibly through a synthetic oneof.
    Optional,
    /// An ordered list of values.
    Repeated,
}

/// A proto2-style declared default for an optional field.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Default for floating-point kinds.
    F64(f64),
    /// Default for signed integer and enum kinds.
    I64(i64),
    /// Default for unsigned integer kinds.
    U64(u64),
    /// Default for bool fields.
    Bool(bool),
    /// Default for string fields.
    String(String),
    /// Default for bytes fields.
    Bytes(Vec<u8>),
}

/// One field of a message type. Immutable once added to a [`Descriptor`].
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    json_name: String,
    number: i32,
    kind: Kind,
    cardinality: Cardinality,
    oneof_index: Option<u32>,
    packed: bool,
    map: bool,
    type_name: Option<String>,
    extendee: Option<String>,
    default: Option<DefaultValue>,
}

impl Field {
    /// A singular scalar field. The JSON name is derived from `name` by the
    /// usual lowerCamelCase rule.
    #[must_use]
    pub fn new(name: &str, number: i32, kind: Kind) -> Self {
        Self {
            name: name.to_owned(),
            json_name: derive_json_name(name),
            number,
            kind,
            cardinality: Cardinality::Singular,
            oneof_index: None,
            packed: false,
            map: false,
            type_name: None,
            extendee: None,
            default: None,
        }
    }

    /// A singular message field referencing `type_name`.
    #[must_use]
    pub fn message(name: &str, number: i32, type_name: &str) -> Self {
        Self::new(name, number, Kind::Message).with_type(type_name)
    }

    /// A singular group field referencing `type_name`.
    #[must_use]
    pub fn group(name: &str, number: i32, type_name: &str) -> Self {
        Self::new(name, number, Kind::Group).with_type(type_name)
    }

    /// A singular enum field referencing `type_name`.
    #[must_use]
    pub fn enumeration(name: &str, number: i32, type_name: &str) -> Self {
        Self::new(name, number, Kind::Enum).with_type(type_name)
    }

    /// A map field whose entries are described by `entry_type_name`.
    ///
    /// The entry type itself must be registered separately, typically via
    /// [`Descriptor::map_entry`].
    #[must_use]
    pub fn map(name: &str, number: i32, entry_type_name: &str) -> Self {
        let mut f = Self::message(name, number, entry_type_name).repeated();
        f.map = true;
        f
    }

    /// Marks the field repeated.
    #[must_use]
    pub fn repeated(mut self) -> Self {
        self.cardinality = Cardinality::Repeated;
        self
    }

    /// Marks the field as having explicit presence.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.cardinality = Cardinality::Optional;
        self
    }

    /// Sets the packed encoding hint.
    #[must_use]
    pub fn packed(mut self) -> Self {
        self.packed = true;
        self
    }

    /// Places the field in the oneof group with the given index.
    #[must_use]
    pub fn in_oneof(mut self, index: u32) -> Self {
        self.oneof_index = Some(index);
        self
    }

    /// Sets the referenced message or enum type name.
    #[must_use]
    pub fn with_type(mut self, type_name: &str) -> Self {
        self.type_name = Some(type_name.to_owned());
        self
    }

    /// Overrides the derived JSON name.
    #[must_use]
    pub fn with_json_name(mut self, json_name: &str) -> Self {
        self.json_name = json_name.to_owned();
        self
    }

    /// Attaches a declared default value.
    #[must_use]
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self.cardinality = Cardinality::Optional;
        self
    }

    /// Turns the field into an extension of `extendee`. Extension fields
    /// use their fully-qualified name as `name`.
    #[must_use]
    pub fn extension_of(mut self, extendee: &str) -> Self {
        self.extendee = Some(extendee.to_owned());
        self
    }

    /// The declared field name (fully qualified for extensions).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The lowerCamelCase JSON name.
    #[must_use]
    pub fn json_name(&self) -> &str {
        &self.json_name
    }

    /// The field number.
    #[must_use]
    pub fn number(&self) -> i32 {
        self.number
    }

    /// The low-level type tag.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The field's cardinality.
    #[must_use]
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// The oneof group index, if the field belongs to one.
    #[must_use]
    pub fn oneof_index(&self) -> Option<u32> {
        self.oneof_index
    }

    /// Whether the packed encoding hint is set.
    #[must_use]
    pub fn is_packed(&self) -> bool {
        self.packed
    }

    /// Whether this is a map field.
    #[must_use]
    pub fn is_map(&self) -> bool {
        self.map
    }

    /// Whether this is a repeated (or map) field.
    #[must_use]
    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    /// Whether this is an extension field.
    #[must_use]
    pub fn is_extension(&self) -> bool {
        self.extendee.is_some()
    }

    /// The extended type's full name, for extension fields.
    #[must_use]
    pub fn extendee(&self) -> Option<&str> {
        self.extendee.as_deref()
    }

    /// The referenced message or enum type name, if any.
    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// The declared default, if any.
    #[must_use]
    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    /// Whether absence and the default value are indistinguishable.
    #[must_use]
    pub fn is_implicit_presence(&self) -> bool {
        self.cardinality == Cardinality::Singular
            && self.oneof_index.is_none()
            && !matches!(self.kind, Kind::Message | Kind::Group)
    }

    pub(crate) fn message_type_name(&self) -> Result<&str> {
        self.type_name
            .as_deref()
            .ok_or_else(|| Error::internal(format!("field '{}' has no type reference", self.name)))
    }
}

/// Describes one message type.
#[derive(Debug)]
pub struct Descriptor {
    full_name: String,
    fields: Vec<Arc<Field>>,
    oneofs: Vec<String>,
    map_entry: bool,
}

impl Descriptor {
    /// Builds a descriptor, validating that field numbers are unique and
    /// oneof indices refer to existing groups.
    pub fn new(full_name: &str, fields: Vec<Field>, oneofs: Vec<String>) -> Result<Self> {
        let mut numbers = std::collections::HashSet::new();
        for field in &fields {
            if !numbers.insert(field.number) {
                return Err(Error::invalid(format!(
                    "duplicate field number {} in '{full_name}'",
                    field.number
                )));
            }
            if let Some(index) = field.oneof_index {
                if index as usize >= oneofs.len() {
                    return Err(Error::invalid(format!(
                        "field '{}' references missing oneof {index} in '{full_name}'",
                        field.name
                    )));
                }
            }
        }
        Ok(Self {
            full_name: full_name.to_owned(),
            fields: fields.into_iter().map(Arc::new).collect(),
            oneofs,
            map_entry: false,
        })
    }

    /// Builds the synthetic entry type of a map field: `key` at number 1,
    /// `value` at number 2.
    pub fn map_entry(full_name: &str, key: Field, value: Field) -> Result<Self> {
        let mut desc = Self::new(full_name, vec![key, value], Vec::new())?;
        desc.map_entry = true;
        Ok(desc)
    }

    /// The fully-qualified type name.
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// The fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    /// The declared oneof group names.
    #[must_use]
    pub fn oneofs(&self) -> &[String] {
        &self.oneofs
    }

    /// Whether this type is a synthetic map entry.
    #[must_use]
    pub fn is_map_entry(&self) -> bool {
        self.map_entry
    }

    /// Looks a field up by number.
    #[must_use]
    pub fn field_by_number(&self, number: i32) -> Option<&Arc<Field>> {
        self.fields.iter().find(|f| f.number == number)
    }

    /// Looks a field up by declared name or JSON name.
    #[must_use]
    pub fn field_by_name(&self, name: &str) -> Option<&Arc<Field>> {
        self.fields
            .iter()
            .find(|f| f.name == name || f.json_name == name)
    }

    /// The key field of a map entry type.
    pub fn key_field(&self) -> Result<&Arc<Field>> {
        self.must_have_field(1)
    }

    /// The value field of a map entry type.
    pub fn value_field(&self) -> Result<&Arc<Field>> {
        self.must_have_field(2)
    }

    /// Looks up a field that the schema contract guarantees to exist.
    pub(crate) fn must_have_field(&self, number: i32) -> Result<&Arc<Field>> {
        self.field_by_number(number).ok_or_else(|| {
            Error::internal(format!(
                "'{}' is missing required field number {number}",
                self.full_name
            ))
        })
    }
}

/// Describes one enumeration type.
#[derive(Debug)]
pub struct EnumDescriptor {
    full_name: String,
    values: Vec<(String, i32)>,
}

impl EnumDescriptor {
    /// Builds an enum descriptor from `(name, number)` pairs.
    #[must_use]
    pub fn new(full_name: &str, values: Vec<(String, i32)>) -> Self {
        Self {
            full_name: full_name.to_owned(),
            values,
        }
    }

    /// The fully-qualified type name.
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// The declared values in order.
    #[must_use]
    pub fn values(&self) -> &[(String, i32)] {
        &self.values
    }

    /// Looks a value number up by name.
    #[must_use]
    pub fn number_by_name(&self, name: &str, case_insensitive: bool) -> Option<i32> {
        self.values
            .iter()
            .find(|(n, _)| {
                if case_insensitive {
                    n.eq_ignore_ascii_case(name)
                } else {
                    n == name
                }
            })
            .map(|&(_, number)| number)
    }

    /// Looks a value name up by number.
    #[must_use]
    pub fn name_by_number(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|&&(_, n)| n == number)
            .map(|(name, _)| name.as_str())
    }
}

/// The well-known-type fingerprint of a descriptor, derived from its
/// fully-qualified name. Stable for a given descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WellKnown {
    NotWellKnown,
    Any,
    Wrapper,
    Struct,
    List,
    Value,
    Null,
    Timestamp,
    Duration,
    FieldMask,
}

pub(crate) fn classify(full_name: &str) -> WellKnown {
    // Type references from a schema service arrive as URLs.
    let name = full_name.rsplit('/').next().unwrap_or(full_name);
    let Some(rest) = name.strip_prefix("google.protobuf.") else {
        return WellKnown::NotWellKnown;
    };
    match rest {
        "Any" => WellKnown::Any,
        "DoubleValue" | "FloatValue" | "Int64Value" | "UInt64Value" | "Int32Value"
        | "UInt32Value" | "BoolValue" | "StringValue" | "BytesValue" => WellKnown::Wrapper,
        "Struct" => WellKnown::Struct,
        "ListValue" => WellKnown::List,
        "Value" => WellKnown::Value,
        "NullValue" => WellKnown::Null,
        "Timestamp" => WellKnown::Timestamp,
        "Duration" => WellKnown::Duration,
        "FieldMask" => WellKnown::FieldMask,
        _ => WellKnown::NotWellKnown,
    }
}

pub(crate) fn classify_field_type(field: &Field) -> WellKnown {
    field.type_name().map_or(WellKnown::NotWellKnown, classify)
}

/// Derives the lowerCamelCase JSON name of a declared field name.
fn derive_json_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut capitalize = false;
    for c in name.chars() {
        if c == '_' {
            capitalize = true;
        } else if capitalize {
            out.extend(c.to_uppercase());
            capitalize = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Breadcrumb describing where in the message tree the codec currently
/// operates. Pushed on descent, popped on ascent, rendered into errors.
#[derive(Debug, Default)]
pub(crate) struct MessagePath {
    root: String,
    frames: Vec<Frame>,
}

#[derive(Debug)]
struct Frame {
    name: String,
    index: Option<usize>,
}

impl MessagePath {
    pub(crate) fn new(root: &str) -> Self {
        Self {
            root: root.to_owned(),
            frames: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, name: &str) {
        self.frames.push(Frame {
            name: name.to_owned(),
            index: None,
        });
    }

    pub(crate) fn pop(&mut self) {
        self.frames.pop();
    }

    /// Advances the repeated index of the innermost frame.
    pub(crate) fn next_repeated(&mut self) {
        if let Some(top) = self.frames.last_mut() {
            top.index = Some(top.index.map_or(0, |i| i + 1));
        }
    }
}

impl fmt::Display for MessagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for frame in &self.frames {
            write!(f, ".{}", frame.name)?;
            if let Some(index) = frame.index {
                write!(f, "[{index}]")?;
            }
        }
        Ok(())
    }
}

/// Resolves type references against whatever schema storage a back-end
/// runs on: the in-memory [`DescriptorPool`] or a remote resolver cache.
pub(crate) trait TypeSource {
    fn message_type(&self, name: &str) -> Result<Arc<Descriptor>>;
    fn enum_type(&self, name: &str) -> Result<Arc<EnumDescriptor>>;
}

/// An in-memory registry of message, enum, and extension definitions.
#[derive(Debug, Default)]
pub struct DescriptorPool {
    messages: HashMap<String, Arc<Descriptor>>,
    enums: HashMap<String, Arc<EnumDescriptor>>,
    extensions: HashMap<String, Arc<Field>>,
    extensions_by_extendee: HashMap<String, Vec<Arc<Field>>>,
}

impl DescriptorPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pool with the `google.protobuf` well-known types
    /// pre-registered.
    #[must_use]
    pub fn with_well_known_types() -> Self {
        let mut pool = Self::new();
        pool.add_well_known_types();
        pool
    }

    /// Registers a message type. Fails on duplicate names.
    pub fn add_message(&mut self, descriptor: Descriptor) -> Result<()> {
        let name = descriptor.full_name.clone();
        if self
            .messages
            .insert(name.clone(), Arc::new(descriptor))
            .is_some()
        {
            return Err(Error::invalid(format!(
                "message type '{name}' registered twice"
            )));
        }
        Ok(())
    }

    /// Registers an enum type. Fails on duplicate names.
    pub fn add_enum(&mut self, descriptor: EnumDescriptor) -> Result<()> {
        let name = descriptor.full_name.clone();
        if self
            .enums
            .insert(name.clone(), Arc::new(descriptor))
            .is_some()
        {
            return Err(Error::invalid(format!(
                "enum type '{name}' registered twice"
            )));
        }
        Ok(())
    }

    /// Registers an extension field. The field must name its extendee and
    /// carry its fully-qualified name.
    pub fn add_extension(&mut self, field: Field) -> Result<()> {
        let Some(extendee) = field.extendee.clone() else {
            return Err(Error::invalid(format!(
                "extension '{}' does not name an extendee",
                field.name
            )));
        };
        let field = Arc::new(field);
        if self
            .extensions
            .insert(field.name.clone(), Arc::clone(&field))
            .is_some()
        {
            return Err(Error::invalid(format!(
                "extension '{}' registered twice",
                field.name
            )));
        }
        self.extensions_by_extendee
            .entry(extendee)
            .or_default()
            .push(field);
        Ok(())
    }

    /// Looks a message type up by fully-qualified name.
    #[must_use]
    pub fn message_by_name(&self, name: &str) -> Option<Arc<Descriptor>> {
        self.messages.get(name).cloned()
    }

    /// Looks an enum type up by fully-qualified name.
    #[must_use]
    pub fn enum_by_name(&self, name: &str) -> Option<Arc<EnumDescriptor>> {
        self.enums.get(name).cloned()
    }

    /// Looks an extension up by its fully-qualified name.
    #[must_use]
    pub fn extension_by_name(&self, name: &str) -> Option<Arc<Field>> {
        self.extensions.get(name).cloned()
    }

    /// All registered extensions of the given type.
    #[must_use]
    pub fn extensions_of(&self, extendee: &str) -> &[Arc<Field>] {
        self.extensions_by_extendee
            .get(extendee)
            .map_or(&[], Vec::as_slice)
    }

    /// Registers the `google.protobuf` types with a canonical JSON form.
    pub fn add_well_known_types(&mut self) {
        for descriptor in well_known_descriptors() {
            // Re-registration of the well-known set is harmless.
            let _ = self.add_message(descriptor);
        }
        let _ = self.add_enum(EnumDescriptor::new(
            "google.protobuf.NullValue",
            vec![("NULL_VALUE".to_owned(), 0)],
        ));
    }
}

impl TypeSource for DescriptorPool {
    fn message_type(&self, name: &str) -> Result<Arc<Descriptor>> {
        let name = name.rsplit('/').next().unwrap_or(name);
        self.message_by_name(name)
            .ok_or_else(|| Error::invalid(format!("cannot resolve message type: '{name}'")))
    }

    fn enum_type(&self, name: &str) -> Result<Arc<EnumDescriptor>> {
        let name = name.rsplit('/').next().unwrap_or(name);
        self.enum_by_name(name)
            .ok_or_else(|| Error::invalid(format!("cannot resolve enum type: '{name}'")))
    }
}

/// Descriptors for every `google.protobuf` type with special JSON handling.
pub(crate) fn well_known_descriptors() -> Vec<Descriptor> {
    let wrapper = |name: &str, kind: Kind| {
        Descriptor::new(
            &format!("google.protobuf.{name}"),
            vec![Field::new("value", 1, kind)],
            Vec::new(),
        )
        .expect("well-known wrapper is valid")
    };
    let mut out = vec![
        wrapper("DoubleValue", Kind::Double),
        wrapper("FloatValue", Kind::Float),
        wrapper("Int64Value", Kind::Int64),
        wrapper("UInt64Value", Kind::Uint64),
        wrapper("Int32Value", Kind::Int32),
        wrapper("UInt32Value", Kind::Uint32),
        wrapper("BoolValue", Kind::Bool),
        wrapper("StringValue", Kind::String),
        wrapper("BytesValue", Kind::Bytes),
    ];
    let must = |d: Result<Descriptor>| d.expect("well-known descriptor is valid");
    out.push(must(Descriptor::new(
        "google.protobuf.Any",
        vec![
            Field::new("type_url", 1, Kind::String),
            Field::new("value", 2, Kind::Bytes),
        ],
        Vec::new(),
    )));
    out.push(must(Descriptor::new(
        "google.protobuf.Timestamp",
        vec![
            Field::new("seconds", 1, Kind::Int64),
            Field::new("nanos", 2, Kind::Int32),
        ],
        Vec::new(),
    )));
    out.push(must(Descriptor::new(
        "google.protobuf.Duration",
        vec![
            Field::new("seconds", 1, Kind::Int64),
            Field::new("nanos", 2, Kind::Int32),
        ],
        Vec::new(),
    )));
    out.push(must(Descriptor::new(
        "google.protobuf.FieldMask",
        vec![Field::new("paths", 1, Kind::String).repeated()],
        Vec::new(),
    )));
    out.push(must(Descriptor::new(
        "google.protobuf.Struct",
        vec![Field::map("fields", 1, "google.protobuf.Struct.FieldsEntry")],
        Vec::new(),
    )));
    out.push(must(Descriptor::map_entry(
        "google.protobuf.Struct.FieldsEntry",
        Field::new("key", 1, Kind::String),
        Field::message("value", 2, "google.protobuf.Value"),
    )));
    out.push(must(Descriptor::new(
        "google.protobuf.Value",
        vec![
            Field::enumeration("null_value", 1, "google.protobuf.NullValue").in_oneof(0),
            Field::new("number_value", 2, Kind::Double).in_oneof(0),
            Field::new("string_value", 3, Kind::String).in_oneof(0),
            Field::new("bool_value", 4, Kind::Bool).in_oneof(0),
            Field::message("struct_value", 5, "google.protobuf.Struct").in_oneof(0),
            Field::message("list_value", 6, "google.protobuf.ListValue").in_oneof(0),
        ],
        vec!["kind".to_owned()],
    )));
    out.push(must(Descriptor::new(
        "google.protobuf.ListValue",
        vec![Field::message("values", 1, "google.protobuf.Value").repeated()],
        Vec::new(),
    )));
    out
}
