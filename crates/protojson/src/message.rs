//! The caller-owned in-memory message model.
//!
//! [`DynamicMessage`] stores field values keyed by field number, which is
//! also the order the writer emits them in. Map fields are stored the way
//! the wire sees them: as a repeated list of entry messages.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::descriptor::Descriptor;

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A `double` value.
    Double(f64),
    /// A `float` value.
    Float(f32),
    /// An `int32`, `sint32`, or `sfixed32` value.
    I32(i32),
    /// An `int64`, `sint64`, or `sfixed64` value.
    I64(i64),
    /// A `uint32` or `fixed32` value.
    U32(u32),
    /// A `uint64` or `fixed64` value.
    U64(u64),
    /// A `bool` value.
    Bool(bool),
    /// A `string` value.
    String(String),
    /// A `bytes` value.
    Bytes(Vec<u8>),
    /// An enum value, stored by number.
    Enum(i32),
    /// A nested message or group.
    Message(DynamicMessage),
}

#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    One(Value),
    Many(Vec<Value>),
}

/// A message value described by a [`Descriptor`].
///
/// The codec only ever manipulates messages through this type; the schema
/// itself stays immutable and shared.
///
/// Equality compares the type name and the stored fields, so two messages
/// built against separately-constructed copies of the same schema still
/// compare equal field by field.
#[derive(Debug, Clone)]
pub struct DynamicMessage {
    descriptor: Arc<Descriptor>,
    fields: BTreeMap<i32, FieldValue>,
}

impl PartialEq for DynamicMessage {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.full_name() == other.descriptor.full_name() && self.fields == other.fields
    }
}

impl DynamicMessage {
    /// Creates an empty message of the given type.
    #[must_use]
    pub fn new(descriptor: Arc<Descriptor>) -> Self {
        Self {
            descriptor,
            fields: BTreeMap::new(),
        }
    }

    /// The message's type descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &Arc<Descriptor> {
        &self.descriptor
    }

    /// Sets a singular field, replacing any previous value.
    ///
    /// If the field belongs to a oneof group, its siblings are cleared.
    pub fn set(&mut self, number: i32, value: Value) {
        self.clear_oneof_siblings(number);
        self.fields.insert(number, FieldValue::One(value));
    }

    /// Appends to a repeated field.
    pub fn push(&mut self, number: i32, value: Value) {
        match self
            .fields
            .entry(number)
            .or_insert_with(|| FieldValue::Many(Vec::new()))
        {
            FieldValue::Many(values) => values.push(value),
            FieldValue::One(_) => {
                // A singular value under a repeated number is a caller bug;
                // recover by restarting the list.
                self.fields.insert(number, FieldValue::Many(vec![value]));
            }
        }
    }

    /// Removes a field entirely.
    pub fn clear(&mut self, number: i32) {
        self.fields.remove(&number);
    }

    /// Number of values present: 0 when absent, 1 for a present singular,
    /// the element count for repeated fields.
    #[must_use]
    pub fn len_of(&self, number: i32) -> usize {
        match self.fields.get(&number) {
            None => 0,
            Some(FieldValue::One(_)) => 1,
            Some(FieldValue::Many(values)) => values.len(),
        }
    }

    /// Returns the value of a field.
    ///
    /// `index` selects an element of a repeated field; `None` reads a
    /// singular value.
    #[must_use]
    pub fn get(&self, number: i32, index: Option<usize>) -> Option<&Value> {
        match (self.fields.get(&number), index) {
            (Some(FieldValue::One(value)), None) => Some(value),
            (Some(FieldValue::Many(values)), Some(i)) => values.get(i),
            _ => None,
        }
    }

    /// Removes and returns a singular message value, for merge-style
    /// updates.
    pub(crate) fn take_message(&mut self, number: i32) -> Option<DynamicMessage> {
        match self.fields.get(&number) {
            Some(FieldValue::One(Value::Message(_))) => {
                let Some(FieldValue::One(Value::Message(msg))) = self.fields.remove(&number)
                else {
                    unreachable!()
                };
                Some(msg)
            }
            _ => None,
        }
    }

    /// Field numbers that currently hold at least one value, in ascending
    /// order.
    pub(crate) fn present_numbers(&self) -> impl Iterator<Item = i32> + '_ {
        self.fields.iter().filter_map(|(&number, value)| match value {
            FieldValue::Many(values) if values.is_empty() => None,
            _ => Some(number),
        })
    }

    /// Whether every field of the message is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.present_numbers().next().is_none()
    }

    fn clear_oneof_siblings(&mut self, number: i32) {
        let Some(field) = self.descriptor.field_by_number(number) else {
            return;
        };
        let Some(group) = field.oneof_index() else {
            return;
        };
        let siblings: Vec<i32> = self
            .descriptor
            .fields()
            .iter()
            .filter(|f| f.oneof_index() == Some(group) && f.number() != number)
            .map(|f| f.number())
            .collect();
        for sibling in siblings {
            self.fields.remove(&sibling);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Field, Kind};

    fn oneof_desc() -> Arc<Descriptor> {
        Arc::new(
            Descriptor::new(
                "test.OneofMsg",
                vec![
                    Field::new("a", 1, Kind::Int32).in_oneof(0),
                    Field::new("b", 2, Kind::String).in_oneof(0),
                    Field::new("c", 3, Kind::Bool),
                ],
                vec!["choice".to_owned()],
            )
            .unwrap(),
        )
    }

    #[test]
    fn setting_a_oneof_member_clears_siblings() {
        let mut msg = DynamicMessage::new(oneof_desc());
        msg.set(1, Value::I32(5));
        msg.set(3, Value::Bool(true));
        msg.set(2, Value::String("hi".to_owned()));
        assert_eq!(msg.len_of(1), 0);
        assert_eq!(msg.get(2, None), Some(&Value::String("hi".to_owned())));
        assert_eq!(msg.get(3, None), Some(&Value::Bool(true)));
    }

    #[test]
    fn repeated_fields_count_elements() {
        let mut msg = DynamicMessage::new(oneof_desc());
        assert_eq!(msg.len_of(4), 0);
        msg.push(4, Value::I32(1));
        msg.push(4, Value::I32(2));
        assert_eq!(msg.len_of(4), 2);
        assert_eq!(msg.get(4, Some(1)), Some(&Value::I32(2)));
        assert_eq!(msg.get(4, Some(2)), None);
    }

    #[test]
    fn equality_is_field_by_field() {
        let mut a = DynamicMessage::new(oneof_desc());
        let mut b = DynamicMessage::new(oneof_desc());
        a.set(1, Value::I32(7));
        assert_ne!(a, b);
        b.set(1, Value::I32(7));
        assert_eq!(a, b);
    }
}
