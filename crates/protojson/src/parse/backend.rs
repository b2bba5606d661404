//! The two parse back-ends behind one algorithm.
//!
//! The parser body in [`super`] is generic over [`ParseBackend`]: one
//! instantiation mutates an in-memory [`DynamicMessage`] through the
//! descriptor pool, the other emits binary wire format as it goes,
//! resolving types through a schema service. Neither is dynamically
//! dispatched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::descriptor::{Descriptor, DescriptorPool, Field, Kind, TypeSource};
use crate::error::{Error, Result};
use crate::message::{DynamicMessage, Value};
use crate::resolver::ResolverPool;
use crate::wire;

/// Which fields (and oneof groups) this parse has already written.
///
/// Tracking lives beside the message rather than in it: it describes the
/// parse in progress, not the message value.
#[derive(Default)]
pub(crate) struct SeenFields {
    numbers: HashSet<i32>,
    oneofs: HashMap<u32, i32>,
}

impl SeenFields {
    /// Records a write. Returns `true` the first time a field is seen.
    fn record(&mut self, field: &Field) -> bool {
        let first = self.numbers.insert(field.number());
        if first {
            if let Some(group) = field.oneof_index() {
                self.oneofs.entry(group).or_insert(field.number());
            }
        }
        first
    }

    /// Whether this parse already wrote the field, or a sibling in its
    /// oneof group. With `allow_repeated_non_oneof`, repeated fields
    /// outside oneofs are exempt so legacy mode can append.
    fn has(&self, field: &Field, allow_repeated_non_oneof: bool) -> bool {
        if self.numbers.contains(&field.number()) {
            return !(allow_repeated_non_oneof && field.is_repeated() && field.oneof_index().is_none());
        }
        field
            .oneof_index()
            .is_some_and(|group| self.oneofs.contains_key(&group))
    }
}

/// The capability set the JSON → message algorithm is written against.
pub(crate) trait ParseBackend {
    /// The in-flight representation of one message value.
    type Msg;

    /// Resolves the message type a field refers to.
    fn field_type(&self, field: &Field) -> Result<Arc<Descriptor>>;

    /// Looks up an extension by its fully-qualified name.
    fn extension_by_name(&self, name: &str) -> Option<Arc<Field>>;

    /// Resolves an enum value name to its number.
    fn enum_number_by_name(&self, field: &Field, name: &str, case_insensitive: bool)
    -> Result<i32>;

    /// Marks a field as written by this parse; the first call clears any
    /// prior value.
    fn record_as_seen(&self, field: &Field, msg: &mut Self::Msg);

    /// Whether this parse already wrote the field or a oneof sibling.
    fn has_parsed(&self, field: &Field, msg: &Self::Msg, allow_repeated_non_oneof: bool) -> bool;

    fn set_float(&self, field: &Field, msg: &mut Self::Msg, value: f32);
    fn set_double(&self, field: &Field, msg: &mut Self::Msg, value: f64);
    fn set_int32(&self, field: &Field, msg: &mut Self::Msg, value: i32);
    fn set_uint32(&self, field: &Field, msg: &mut Self::Msg, value: u32);
    fn set_int64(&self, field: &Field, msg: &mut Self::Msg, value: i64);
    fn set_uint64(&self, field: &Field, msg: &mut Self::Msg, value: u64);
    fn set_bool(&self, field: &Field, msg: &mut Self::Msg, value: bool);
    fn set_string(&self, field: &Field, msg: &mut Self::Msg, value: String);
    fn set_bytes(&self, field: &Field, msg: &mut Self::Msg, value: Vec<u8>);
    fn set_enum(&self, field: &Field, msg: &mut Self::Msg, value: i32);

    /// Appends or sets a nested message and invokes `body` with its
    /// descriptor and handle.
    fn new_msg(
        &self,
        field: &Field,
        msg: &mut Self::Msg,
        body: impl FnOnce(&Arc<Descriptor>, &mut Self::Msg) -> Result<()>,
    ) -> Result<()>;

    /// Like [`ParseBackend::new_msg`], but the target type is chosen at
    /// runtime by URL.
    fn new_dynamic(
        &self,
        field: &Field,
        type_url: &str,
        msg: &mut Self::Msg,
        body: impl FnOnce(&Arc<Descriptor>, &mut Self::Msg) -> Result<()>,
    ) -> Result<()>;
}

// ----------------------------------------------------------------
// Reflective back-end
// ----------------------------------------------------------------

/// A message being populated by the reflective back-end.
pub(crate) struct ReflectiveMsg {
    pub(crate) msg: DynamicMessage,
    seen: SeenFields,
}

impl ReflectiveMsg {
    pub(crate) fn new(msg: DynamicMessage) -> Self {
        Self {
            msg,
            seen: SeenFields::default(),
        }
    }

    pub(crate) fn into_message(self) -> DynamicMessage {
        self.msg
    }

    fn put(&mut self, field: &Field, value: Value) {
        if self.seen.record(field) {
            self.msg.clear(field.number());
        }
        if field.is_repeated() {
            self.msg.push(field.number(), value);
        } else {
            self.msg.set(field.number(), value);
        }
    }
}

/// Parse back-end that mutates a [`DynamicMessage`] tree.
pub(crate) struct ReflectiveParse<'p> {
    pub(crate) pool: &'p DescriptorPool,
}

impl ParseBackend for ReflectiveParse<'_> {
    type Msg = ReflectiveMsg;

    fn field_type(&self, field: &Field) -> Result<Arc<Descriptor>> {
        self.pool.message_type(field.message_type_name()?)
    }

    fn extension_by_name(&self, name: &str) -> Option<Arc<Field>> {
        self.pool.extension_by_name(name)
    }

    fn enum_number_by_name(
        &self,
        field: &Field,
        name: &str,
        case_insensitive: bool,
    ) -> Result<i32> {
        let enum_type = self.pool.enum_type(field.message_type_name()?)?;
        enum_type
            .number_by_name(name, case_insensitive)
            .ok_or_else(|| Error::invalid(format!("unknown enum value: '{name}'")))
    }

    fn record_as_seen(&self, field: &Field, msg: &mut Self::Msg) {
        if msg.seen.record(field) {
            msg.msg.clear(field.number());
        }
    }

    fn has_parsed(&self, field: &Field, msg: &Self::Msg, allow_repeated_non_oneof: bool) -> bool {
        msg.seen.has(field, allow_repeated_non_oneof)
    }

    fn set_float(&self, field: &Field, msg: &mut Self::Msg, value: f32) {
        msg.put(field, Value::Float(value));
    }

    fn set_double(&self, field: &Field, msg: &mut Self::Msg, value: f64) {
        msg.put(field, Value::Double(value));
    }

    fn set_int32(&self, field: &Field, msg: &mut Self::Msg, value: i32) {
        msg.put(field, Value::I32(value));
    }

    fn set_uint32(&self, field: &Field, msg: &mut Self::Msg, value: u32) {
        msg.put(field, Value::U32(value));
    }

    fn set_int64(&self, field: &Field, msg: &mut Self::Msg, value: i64) {
        msg.put(field, Value::I64(value));
    }

    fn set_uint64(&self, field: &Field, msg: &mut Self::Msg, value: u64) {
        msg.put(field, Value::U64(value));
    }

    fn set_bool(&self, field: &Field, msg: &mut Self::Msg, value: bool) {
        msg.put(field, Value::Bool(value));
    }

    fn set_string(&self, field: &Field, msg: &mut Self::Msg, value: String) {
        msg.put(field, Value::String(value));
    }

    fn set_bytes(&self, field: &Field, msg: &mut Self::Msg, value: Vec<u8>) {
        msg.put(field, Value::Bytes(value));
    }

    fn set_enum(&self, field: &Field, msg: &mut Self::Msg, value: i32) {
        msg.put(field, Value::Enum(value));
    }

    fn new_msg(
        &self,
        field: &Field,
        msg: &mut Self::Msg,
        body: impl FnOnce(&Arc<Descriptor>, &mut Self::Msg) -> Result<()>,
    ) -> Result<()> {
        let descriptor = self.field_type(field)?;
        self.record_as_seen(field, msg);
        let existing = if field.is_repeated() {
            None
        } else {
            msg.msg.take_message(field.number())
        };
        let child_msg = existing.unwrap_or_else(|| DynamicMessage::new(Arc::clone(&descriptor)));
        let mut child = ReflectiveMsg::new(child_msg);
        let result = body(&descriptor, &mut child);
        if field.is_repeated() {
            msg.msg.push(field.number(), Value::Message(child.msg));
        } else {
            msg.msg.set(field.number(), Value::Message(child.msg));
        }
        result
    }

    fn new_dynamic(
        &self,
        field: &Field,
        type_url: &str,
        msg: &mut Self::Msg,
        body: impl FnOnce(&Arc<Descriptor>, &mut Self::Msg) -> Result<()>,
    ) -> Result<()> {
        let descriptor = self.pool.message_type(type_url)?;
        self.record_as_seen(field, msg);
        let mut child = ReflectiveMsg::new(DynamicMessage::new(Arc::clone(&descriptor)));
        body(&descriptor, &mut child)?;
        // The embedded message travels as wire-format bytes.
        let mut bytes = Vec::new();
        wire::encode_message(&child.msg, &mut bytes)?;
        msg.msg.set(field.number(), Value::Bytes(bytes));
        Ok(())
    }
}

// ----------------------------------------------------------------
// Streaming back-end
// ----------------------------------------------------------------

/// A message being emitted as wire format.
#[derive(Default)]
pub(crate) struct WireMsg {
    buf: Vec<u8>,
    seen: SeenFields,
}

impl WireMsg {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn put(&mut self, field: &Field, value: &Value) {
        // Emission into a Vec cannot fail.
        let _ = wire::encode_value(field.number(), Some(field.kind()), value, &mut self.buf);
    }
}

/// Parse back-end that writes binary wire format directly, resolving
/// types through a schema service.
pub(crate) struct StreamingParse<'p> {
    pub(crate) pool: &'p ResolverPool<'p>,
}

impl ParseBackend for StreamingParse<'_> {
    type Msg = WireMsg;

    fn field_type(&self, field: &Field) -> Result<Arc<Descriptor>> {
        self.pool.message_type(field.message_type_name()?)
    }

    fn extension_by_name(&self, _name: &str) -> Option<Arc<Field>> {
        // The schema service wire shape does not describe extensions.
        None
    }

    fn enum_number_by_name(
        &self,
        field: &Field,
        name: &str,
        case_insensitive: bool,
    ) -> Result<i32> {
        let enum_type = self.pool.enum_type(field.message_type_name()?)?;
        enum_type
            .number_by_name(name, case_insensitive)
            .ok_or_else(|| Error::invalid(format!("unknown enum value: '{name}'")))
    }

    fn record_as_seen(&self, field: &Field, msg: &mut Self::Msg) {
        // Bytes already written cannot be unwritten; only the bookkeeping
        // side of the contract applies here.
        msg.seen.record(field);
    }

    fn has_parsed(&self, field: &Field, msg: &Self::Msg, allow_repeated_non_oneof: bool) -> bool {
        msg.seen.has(field, allow_repeated_non_oneof)
    }

    fn set_float(&self, field: &Field, msg: &mut Self::Msg, value: f32) {
        msg.seen.record(field);
        msg.put(field, &Value::Float(value));
    }

    fn set_double(&self, field: &Field, msg: &mut Self::Msg, value: f64) {
        msg.seen.record(field);
        msg.put(field, &Value::Double(value));
    }

    fn set_int32(&self, field: &Field, msg: &mut Self::Msg, value: i32) {
        msg.seen.record(field);
        msg.put(field, &Value::I32(value));
    }

    fn set_uint32(&self, field: &Field, msg: &mut Self::Msg, value: u32) {
        msg.seen.record(field);
        msg.put(field, &Value::U32(value));
    }

    fn set_int64(&self, field: &Field, msg: &mut Self::Msg, value: i64) {
        msg.seen.record(field);
        msg.put(field, &Value::I64(value));
    }

    fn set_uint64(&self, field: &Field, msg: &mut Self::Msg, value: u64) {
        msg.seen.record(field);
        msg.put(field, &Value::U64(value));
    }

    fn set_bool(&self, field: &Field, msg: &mut Self::Msg, value: bool) {
        msg.seen.record(field);
        msg.put(field, &Value::Bool(value));
    }

    fn set_string(&self, field: &Field, msg: &mut Self::Msg, value: String) {
        msg.seen.record(field);
        msg.put(field, &Value::String(value));
    }

    fn set_bytes(&self, field: &Field, msg: &mut Self::Msg, value: Vec<u8>) {
        msg.seen.record(field);
        msg.put(field, &Value::Bytes(value));
    }

    fn set_enum(&self, field: &Field, msg: &mut Self::Msg, value: i32) {
        msg.seen.record(field);
        msg.put(field, &Value::Enum(value));
    }

    fn new_msg(
        &self,
        field: &Field,
        msg: &mut Self::Msg,
        body: impl FnOnce(&Arc<Descriptor>, &mut Self::Msg) -> Result<()>,
    ) -> Result<()> {
        let descriptor = self.field_type(field)?;
        self.frame_child(field, &descriptor, msg, body)
    }

    fn new_dynamic(
        &self,
        field: &Field,
        type_url: &str,
        msg: &mut Self::Msg,
        body: impl FnOnce(&Arc<Descriptor>, &mut Self::Msg) -> Result<()>,
    ) -> Result<()> {
        let descriptor = self.pool.message_type(type_url)?;
        self.frame_child(field, &descriptor, msg, body)
    }
}

impl StreamingParse<'_> {
    /// Serializes a child message into a local buffer, then frames it as a
    /// length-delimited record (or between group tags).
    fn frame_child(
        &self,
        field: &Field,
        descriptor: &Arc<Descriptor>,
        msg: &mut WireMsg,
        body: impl FnOnce(&Arc<Descriptor>, &mut WireMsg) -> Result<()>,
    ) -> Result<()> {
        msg.seen.record(field);
        let mut child = WireMsg::new();
        body(descriptor, &mut child)?;
        if field.kind() == Kind::Group {
            wire::put_tag(field.number(), wire::WIRETYPE_START_GROUP, &mut msg.buf);
            msg.buf.extend_from_slice(&child.buf);
            wire::put_tag(field.number(), wire::WIRETYPE_END_GROUP, &mut msg.buf);
        } else {
            wire::put_tag(field.number(), wire::WIRETYPE_LEN, &mut msg.buf);
            wire::put_varint(child.buf.len() as u64, &mut msg.buf);
            msg.buf.extend_from_slice(&child.buf);
        }
        Ok(())
    }
}
