//! Binary wire-format primitives and the untyped message codec.
//!
//! Tags are `(field_number << 3) | wire_type`. Integers travel as varints
//! (zig-zag for the `sint` kinds), `fixed`/`float` kinds as little-endian
//! words, strings, bytes, and submessages as length-delimited records, and
//! groups between start/end tags.

use std::sync::Arc;

use crate::descriptor::{Descriptor, Field, Kind, TypeSource};
use crate::error::{Error, Result};
use crate::message::{DynamicMessage, Value};

pub(crate) const WIRETYPE_VARINT: u32 = 0;
pub(crate) const WIRETYPE_FIXED64: u32 = 1;
pub(crate) const WIRETYPE_LEN: u32 = 2;
pub(crate) const WIRETYPE_START_GROUP: u32 = 3;
pub(crate) const WIRETYPE_END_GROUP: u32 = 4;
pub(crate) const WIRETYPE_FIXED32: u32 = 5;

/// Recursion bound for decoding nested submessages and groups.
const DECODE_DEPTH_LIMIT: u32 = 100;

pub(crate) fn wire_type_of(kind: Kind) -> u32 {
    match kind {
        Kind::Int32
        | Kind::Int64
        | Kind::Uint32
        | Kind::Uint64
        | Kind::Sint32
        | Kind::Sint64
        | Kind::Bool
        | Kind::Enum => WIRETYPE_VARINT,
        Kind::Fixed64 | Kind::Sfixed64 | Kind::Double => WIRETYPE_FIXED64,
        Kind::Fixed32 | Kind::Sfixed32 | Kind::Float => WIRETYPE_FIXED32,
        Kind::String | Kind::Bytes | Kind::Message => WIRETYPE_LEN,
        Kind::Group => WIRETYPE_START_GROUP,
    }
}

pub(crate) fn put_varint(mut v: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub(crate) fn put_tag(number: i32, wire_type: u32, out: &mut Vec<u8>) {
    put_varint((number as u64) << 3 | u64::from(wire_type), out);
}

pub(crate) fn put_fixed32(v: u32, out: &mut Vec<u8>) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_fixed64(v: u64, out: &mut Vec<u8>) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn zigzag32(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

pub(crate) fn zigzag64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

pub(crate) fn unzigzag32(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

pub(crate) fn unzigzag64(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Serializes one message into `out`, fields in ascending number order,
/// repeated scalars tag-per-element.
pub(crate) fn encode_message(msg: &DynamicMessage, out: &mut Vec<u8>) -> Result<()> {
    let desc = Arc::clone(msg.descriptor());
    for number in msg.present_numbers().collect::<Vec<_>>() {
        let kind = desc.field_by_number(number).map(|f| f.kind());
        let count = msg.len_of(number);
        let indexes: Vec<Option<usize>> = if msg.get(number, None).is_some() {
            vec![None]
        } else {
            (0..count).map(Some).collect()
        };
        for index in indexes {
            let value = msg
                .get(number, index)
                .ok_or_else(|| Error::internal("message storage changed during encode"))?;
            encode_value(number, kind, value, out)?;
        }
    }
    Ok(())
}

pub(crate) fn encode_value(
    number: i32,
    kind: Option<Kind>,
    value: &Value,
    out: &mut Vec<u8>,
) -> Result<()> {
    match value {
        Value::Double(v) => {
            put_tag(number, WIRETYPE_FIXED64, out);
            put_fixed64(v.to_bits(), out);
        }
        Value::Float(v) => {
            put_tag(number, WIRETYPE_FIXED32, out);
            put_fixed32(v.to_bits(), out);
        }
        Value::I32(v) => match kind {
            Some(Kind::Sint32) => {
                put_tag(number, WIRETYPE_VARINT, out);
                put_varint(u64::from(zigzag32(*v)), out);
            }
            Some(Kind::Sfixed32) => {
                put_tag(number, WIRETYPE_FIXED32, out);
                put_fixed32(*v as u32, out);
            }
            _ => {
                put_tag(number, WIRETYPE_VARINT, out);
                put_varint(i64::from(*v) as u64, out);
            }
        },
        Value::I64(v) => match kind {
            Some(Kind::Sint64) => {
                put_tag(number, WIRETYPE_VARINT, out);
                put_varint(zigzag64(*v), out);
            }
            Some(Kind::Sfixed64) => {
                put_tag(number, WIRETYPE_FIXED64, out);
                put_fixed64(*v as u64, out);
            }
            _ => {
                put_tag(number, WIRETYPE_VARINT, out);
                put_varint(*v as u64, out);
            }
        },
        Value::U32(v) => {
            if kind == Some(Kind::Fixed32) {
                put_tag(number, WIRETYPE_FIXED32, out);
                put_fixed32(*v, out);
            } else {
                put_tag(number, WIRETYPE_VARINT, out);
                put_varint(u64::from(*v), out);
            }
        }
        Value::U64(v) => {
            if kind == Some(Kind::Fixed64) {
                put_tag(number, WIRETYPE_FIXED64, out);
                put_fixed64(*v, out);
            } else {
                put_tag(number, WIRETYPE_VARINT, out);
                put_varint(*v, out);
            }
        }
        Value::Bool(v) => {
            put_tag(number, WIRETYPE_VARINT, out);
            put_varint(u64::from(*v), out);
        }
        Value::Enum(v) => {
            put_tag(number, WIRETYPE_VARINT, out);
            put_varint(i64::from(*v) as u64, out);
        }
        Value::String(v) => {
            put_tag(number, WIRETYPE_LEN, out);
            put_varint(v.len() as u64, out);
            out.extend_from_slice(v.as_bytes());
        }
        Value::Bytes(v) => {
            put_tag(number, WIRETYPE_LEN, out);
            put_varint(v.len() as u64, out);
            out.extend_from_slice(v);
        }
        Value::Message(inner) => {
            if kind == Some(Kind::Group) {
                put_tag(number, WIRETYPE_START_GROUP, out);
                encode_message(inner, out)?;
                put_tag(number, WIRETYPE_END_GROUP, out);
            } else {
                let mut body = Vec::new();
                encode_message(inner, &mut body)?;
                put_tag(number, WIRETYPE_LEN, out);
                put_varint(body.len() as u64, out);
                out.extend_from_slice(&body);
            }
        }
    }
    Ok(())
}

struct Reader<'b> {
    buf: &'b [u8],
    pos: usize,
}

impl<'b> Reader<'b> {
    fn eof(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let Some(&byte) = self.buf.get(self.pos) else {
                return Err(Error::data_loss("unexpected EOF"));
            };
            self.pos += 1;
            if shift == 63 && byte > 1 {
                return Err(Error::invalid("varint too long"));
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(Error::invalid("varint too long"));
            }
        }
    }

    fn fixed32(&mut self) -> Result<u32> {
        let bytes = self.bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn fixed64(&mut self) -> Result<u64> {
        let bytes = self.bytes(8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(word))
    }

    fn bytes(&mut self, n: usize) -> Result<&'b [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(Error::data_loss("unexpected EOF"));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn delimited(&mut self) -> Result<&'b [u8]> {
        let len = self.varint()?;
        let len = usize::try_from(len).map_err(|_| Error::invalid("length out of range"))?;
        self.bytes(len)
    }
}

/// Deserializes one message of the given type from `buf`.
///
/// Both packed and tag-per-element repeated scalars are accepted; unknown
/// field numbers are skipped.
pub(crate) fn decode_message(
    desc: &Arc<Descriptor>,
    source: &dyn TypeSource,
    buf: &[u8],
) -> Result<DynamicMessage> {
    let mut reader = Reader { buf, pos: 0 };
    let msg = decode_body(desc, source, &mut reader, None, DECODE_DEPTH_LIMIT)?;
    Ok(msg)
}

/// Reads fields until end of buffer, or until the end-group tag for
/// `group_number` when decoding a group.
fn decode_body(
    desc: &Arc<Descriptor>,
    source: &dyn TypeSource,
    reader: &mut Reader<'_>,
    group_number: Option<i32>,
    depth: u32,
) -> Result<DynamicMessage> {
    if depth == 0 {
        return Err(Error::invalid("message was too deeply nested"));
    }
    let mut msg = DynamicMessage::new(Arc::clone(desc));
    loop {
        if reader.eof() {
            if group_number.is_some() {
                return Err(Error::data_loss("unexpected EOF"));
            }
            return Ok(msg);
        }
        let tag = reader.varint()?;
        let number = i32::try_from(tag >> 3).map_err(|_| Error::invalid("bad field number"))?;
        let wire_type = (tag & 7) as u32;
        if wire_type == WIRETYPE_END_GROUP {
            if group_number == Some(number) {
                return Ok(msg);
            }
            return Err(Error::invalid("mismatched end-group tag"));
        }
        match desc.field_by_number(number) {
            Some(field) => {
                let field = Arc::clone(field);
                decode_field(&field, source, reader, &mut msg, wire_type, depth)?;
            }
            None => skip_value(reader, wire_type, number, depth)?,
        }
    }
}

fn decode_field(
    field: &Field,
    source: &dyn TypeSource,
    reader: &mut Reader<'_>,
    msg: &mut DynamicMessage,
    wire_type: u32,
    depth: u32,
) -> Result<()> {
    let expected = wire_type_of(field.kind());
    if wire_type == WIRETYPE_LEN && expected != WIRETYPE_LEN && field.is_repeated() {
        // Packed repeated scalars.
        let body = reader.delimited()?;
        let mut packed = Reader { buf: body, pos: 0 };
        while !packed.eof() {
            let value = decode_scalar(field.kind(), &mut packed, expected)?;
            msg.push(field.number(), value);
        }
        return Ok(());
    }
    if wire_type != expected {
        return Err(Error::invalid(format!(
            "wire type {wire_type} does not match field '{}'",
            field.name()
        )));
    }
    let value = match field.kind() {
        Kind::Message => {
            let body = reader.delimited()?;
            let inner_desc = source.message_type(field.message_type_name()?)?;
            let mut inner = Reader { buf: body, pos: 0 };
            Value::Message(decode_body(&inner_desc, source, &mut inner, None, depth - 1)?)
        }
        Kind::Group => {
            let inner_desc = source.message_type(field.message_type_name()?)?;
            Value::Message(decode_body(
                &inner_desc,
                source,
                reader,
                Some(field.number()),
                depth - 1,
            )?)
        }
        Kind::String => {
            let body = reader.delimited()?;
            Value::String(
                std::str::from_utf8(body)
                    .map_err(|_| {
                        Error::invalid(format!("invalid UTF-8 in string field '{}'", field.name()))
                    })?
                    .to_owned(),
            )
        }
        Kind::Bytes => Value::Bytes(reader.delimited()?.to_vec()),
        kind => decode_scalar(kind, reader, wire_type)?,
    };
    if field.is_repeated() {
        msg.push(field.number(), value);
    } else {
        msg.set(field.number(), value);
    }
    Ok(())
}

fn decode_scalar(kind: Kind, reader: &mut Reader<'_>, wire_type: u32) -> Result<Value> {
    Ok(match (kind, wire_type) {
        (Kind::Int32, WIRETYPE_VARINT) => Value::I32(reader.varint()? as i64 as i32),
        (Kind::Int64, WIRETYPE_VARINT) => Value::I64(reader.varint()? as i64),
        (Kind::Uint32, WIRETYPE_VARINT) => Value::U32(reader.varint()? as u32),
        (Kind::Uint64, WIRETYPE_VARINT) => Value::U64(reader.varint()?),
        (Kind::Sint32, WIRETYPE_VARINT) => Value::I32(unzigzag32(reader.varint()? as u32)),
        (Kind::Sint64, WIRETYPE_VARINT) => Value::I64(unzigzag64(reader.varint()?)),
        (Kind::Bool, WIRETYPE_VARINT) => Value::Bool(reader.varint()? != 0),
        (Kind::Enum, WIRETYPE_VARINT) => Value::Enum(reader.varint()? as i64 as i32),
        (Kind::Fixed32, WIRETYPE_FIXED32) => Value::U32(reader.fixed32()?),
        (Kind::Sfixed32, WIRETYPE_FIXED32) => Value::I32(reader.fixed32()? as i32),
        (Kind::Float, WIRETYPE_FIXED32) => Value::Float(f32::from_bits(reader.fixed32()?)),
        (Kind::Fixed64, WIRETYPE_FIXED64) => Value::U64(reader.fixed64()?),
        (Kind::Sfixed64, WIRETYPE_FIXED64) => Value::I64(reader.fixed64()? as i64),
        (Kind::Double, WIRETYPE_FIXED64) => Value::Double(f64::from_bits(reader.fixed64()?)),
        (kind, _) => {
            return Err(Error::invalid(format!(
                "wire type {wire_type} cannot hold a {kind:?} value"
            )));
        }
    })
}

fn skip_value(reader: &mut Reader<'_>, wire_type: u32, number: i32, depth: u32) -> Result<()> {
    if depth == 0 {
        return Err(Error::invalid("message was too deeply nested"));
    }
    match wire_type {
        WIRETYPE_VARINT => {
            reader.varint()?;
        }
        WIRETYPE_FIXED64 => {
            reader.bytes(8)?;
        }
        WIRETYPE_LEN => {
            reader.delimited()?;
        }
        WIRETYPE_START_GROUP => loop {
            if reader.eof() {
                return Err(Error::data_loss("unexpected EOF"));
            }
            let tag = reader.varint()?;
            let inner =
                i32::try_from(tag >> 3).map_err(|_| Error::invalid("bad field number"))?;
            let inner_type = (tag & 7) as u32;
            if inner_type == WIRETYPE_END_GROUP {
                if inner == number {
                    break;
                }
                return Err(Error::invalid("mismatched end-group tag"));
            }
            skip_value(reader, inner_type, inner, depth - 1)?;
        },
        WIRETYPE_FIXED32 => {
            reader.bytes(4)?;
        }
        _ => return Err(Error::invalid(format!("unknown wire type {wire_type}"))),
    }
    Ok(())
}
