//! Message → JSON translation.
//!
//! One algorithmic body, generic over [`WriteBackend`]. Fields are
//! collected, merged with any set extensions, and emitted in ascending
//! field-number order; the well-known `google.protobuf` types replace the
//! generic object rendering with their canonical JSON shapes.

pub(crate) mod backend;
pub(crate) mod json;

use std::sync::Arc;

use crate::descriptor::{
    DefaultValue, Descriptor, Field, Kind, WellKnown, classify, classify_field_type,
};
use crate::error::{Error, Result};
use crate::message::{DynamicMessage, Value};
use backend::WriteBackend;
use json::JsonWriter;

/// Writes `msg` as one JSON value.
pub(crate) fn write_json<B: WriteBackend>(
    w: &mut JsonWriter<'_>,
    b: &B,
    msg: &DynamicMessage,
) -> Result<()> {
    write_message(w, b, msg, msg.descriptor(), true)
}

/// Where a singular value comes from: a present field or the declared
/// default.
#[derive(Clone, Copy)]
enum Src<'m> {
    Present(&'m DynamicMessage, Option<usize>),
    Default,
}

fn lookup<'m>(field: &Field, src: Src<'m>) -> Result<Option<&'m Value>> {
    match src {
        Src::Default => Ok(None),
        Src::Present(msg, index) => match msg.get(field.number(), index) {
            Some(value) => Ok(Some(value)),
            // An absent singular field reads as its default.
            None if index.is_none() => Ok(None),
            None => Err(Error::internal(format!(
                "index out of range on field '{}'",
                field.name()
            ))),
        },
    }
}

fn mismatch(field: &Field) -> Error {
    Error::internal(format!(
        "stored value does not match the declared type of field '{}'",
        field.name()
    ))
}

fn get_f64(field: &Field, src: Src<'_>) -> Result<f64> {
    match lookup(field, src)? {
        Some(Value::Double(v)) => Ok(*v),
        Some(_) => Err(mismatch(field)),
        None => Ok(match field.default_value() {
            Some(DefaultValue::F64(v)) => *v,
            _ => 0.0,
        }),
    }
}

fn get_f32(field: &Field, src: Src<'_>) -> Result<f32> {
    match lookup(field, src)? {
        Some(Value::Float(v)) => Ok(*v),
        Some(_) => Err(mismatch(field)),
        None => Ok(match field.default_value() {
            Some(DefaultValue::F64(v)) => *v as f32,
            _ => 0.0,
        }),
    }
}

fn get_i32(field: &Field, src: Src<'_>) -> Result<i32> {
    match lookup(field, src)? {
        Some(Value::I32(v)) => Ok(*v),
        Some(_) => Err(mismatch(field)),
        None => Ok(match field.default_value() {
            Some(DefaultValue::I64(v)) => *v as i32,
            _ => 0,
        }),
    }
}

fn get_i64(field: &Field, src: Src<'_>) -> Result<i64> {
    match lookup(field, src)? {
        Some(Value::I64(v)) => Ok(*v),
        Some(_) => Err(mismatch(field)),
        None => Ok(match field.default_value() {
            Some(DefaultValue::I64(v)) => *v,
            _ => 0,
        }),
    }
}

fn get_u32(field: &Field, src: Src<'_>) -> Result<u32> {
    match lookup(field, src)? {
        Some(Value::U32(v)) => Ok(*v),
        Some(_) => Err(mismatch(field)),
        None => Ok(match field.default_value() {
            Some(DefaultValue::U64(v)) => *v as u32,
            _ => 0,
        }),
    }
}

fn get_u64(field: &Field, src: Src<'_>) -> Result<u64> {
    match lookup(field, src)? {
        Some(Value::U64(v)) => Ok(*v),
        Some(_) => Err(mismatch(field)),
        None => Ok(match field.default_value() {
            Some(DefaultValue::U64(v)) => *v,
            _ => 0,
        }),
    }
}

fn get_bool(field: &Field, src: Src<'_>) -> Result<bool> {
    match lookup(field, src)? {
        Some(Value::Bool(v)) => Ok(*v),
        Some(_) => Err(mismatch(field)),
        None => Ok(matches!(field.default_value(), Some(DefaultValue::Bool(true)))),
    }
}

fn get_enum(field: &Field, src: Src<'_>) -> Result<i32> {
    match lookup(field, src)? {
        Some(Value::Enum(v)) => Ok(*v),
        Some(_) => Err(mismatch(field)),
        None => Ok(match field.default_value() {
            Some(DefaultValue::I64(v)) => *v as i32,
            _ => 0,
        }),
    }
}

fn get_str<'x>(field: &'x Field, src: Src<'x>) -> Result<&'x str> {
    match lookup(field, src)? {
        Some(Value::String(v)) => Ok(v),
        Some(_) => Err(mismatch(field)),
        None => Ok(match field.default_value() {
            Some(DefaultValue::String(v)) => v,
            _ => "",
        }),
    }
}

fn get_bytes<'x>(field: &'x Field, src: Src<'x>) -> Result<&'x [u8]> {
    match lookup(field, src)? {
        Some(Value::Bytes(v)) => Ok(v),
        Some(_) => Err(mismatch(field)),
        None => Ok(match field.default_value() {
            Some(DefaultValue::Bytes(v)) => v,
            _ => &[],
        }),
    }
}

fn get_message<'m>(field: &Field, src: Src<'m>) -> Result<&'m DynamicMessage> {
    match lookup(field, src)? {
        Some(Value::Message(v)) => Ok(v),
        _ => Err(mismatch(field)),
    }
}

/// Whether the integer is exactly representable as a double.
fn i64_round_trips_through_double(x: i64) -> bool {
    const MAX_PLUS_ONE: f64 = 9_223_372_036_854_775_808.0; // 2^63
    let d = x as f64;
    if !(-MAX_PLUS_ONE..MAX_PLUS_ONE).contains(&d) {
        return false;
    }
    d as i64 == x
}

fn u64_round_trips_through_double(x: u64) -> bool {
    const MAX_PLUS_ONE: f64 = 18_446_744_073_709_551_616.0; // 2^64
    let d = x as f64;
    if !(0.0..MAX_PLUS_ONE).contains(&d) {
        return false;
    }
    d as u64 == x
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum IntegerEnumStyle {
    Quoted,
    Unquoted,
}

fn write_enum<B: WriteBackend>(
    w: &mut JsonWriter<'_>,
    b: &B,
    field: &Field,
    value: i32,
    int_style: IntegerEnumStyle,
) {
    if classify_field_type(field) == WellKnown::Null {
        w.write("null");
        return;
    }
    if !w.options().always_print_enums_as_ints {
        if let Ok(name) = b.enum_name_by_number(field, value) {
            w.write("\"");
            w.write(&name);
            w.write("\"");
            return;
        }
    }
    // Unknown enumerators fall back to the bare number.
    if int_style == IntegerEnumStyle::Quoted {
        w.write_quoted_int(i64::from(value));
    } else {
        w.write_int(i64::from(value));
    }
}

fn write_singular<B: WriteBackend>(
    w: &mut JsonWriter<'_>,
    b: &B,
    field: &Field,
    src: Src<'_>,
) -> Result<()> {
    let is_default = matches!(src, Src::Default);
    match field.kind() {
        Kind::Float => {
            let mut x = get_f32(field, src)?;
            if w.options().allow_legacy_syntax && is_default && !x.is_finite() {
                x = 0.0;
            }
            w.write_f32(x);
        }
        Kind::Double => {
            let mut x = get_f64(field, src)?;
            if w.options().allow_legacy_syntax && is_default && !x.is_finite() {
                x = 0.0;
            }
            w.write_f64(x);
        }
        Kind::Sfixed64 | Kind::Sint64 | Kind::Int64 => {
            let x = get_i64(field, src)?;
            if w.options().unquote_int64_if_possible && i64_round_trips_through_double(x) {
                w.write_int(x);
            } else {
                w.write_quoted_int(x);
            }
        }
        Kind::Fixed64 | Kind::Uint64 => {
            let x = get_u64(field, src)?;
            if w.options().unquote_int64_if_possible && u64_round_trips_through_double(x) {
                w.write_uint(x);
            } else {
                w.write_quoted_uint(x);
            }
        }
        Kind::Sfixed32 | Kind::Sint32 | Kind::Int32 => {
            w.write_int(i64::from(get_i32(field, src)?));
        }
        Kind::Fixed32 | Kind::Uint32 => {
            w.write_uint(u64::from(get_u32(field, src)?));
        }
        Kind::Bool => {
            w.write(if get_bool(field, src)? { "true" } else { "false" });
        }
        Kind::String => {
            w.write_quoted(get_str(field, src)?);
        }
        Kind::Bytes => {
            w.write_base64(get_bytes(field, src)?);
        }
        Kind::Enum => {
            write_enum(w, b, field, get_enum(field, src)?, IntegerEnumStyle::Unquoted);
        }
        Kind::Message | Kind::Group => {
            let inner = get_message(field, src)?;
            return write_message(w, b, inner, inner.descriptor(), false);
        }
    }
    Ok(())
}

fn write_repeated<B: WriteBackend>(
    w: &mut JsonWriter<'_>,
    b: &B,
    msg: &DynamicMessage,
    field: &Field,
) -> Result<()> {
    w.write("[");
    w.push();

    let count = msg.len_of(field.number());
    let mut first = true;
    for i in 0..count {
        if classify_field_type(field) == WellKnown::Value {
            // Empty google.protobuf.Values are silently discarded.
            if let Some(Value::Message(inner)) = msg.get(field.number(), Some(i)) {
                if inner.is_empty() {
                    continue;
                }
            }
        }
        w.write_comma(&mut first);
        w.new_line();
        write_singular(w, b, field, Src::Present(msg, Some(i)))?;
    }

    w.pop();
    if !first {
        w.new_line();
    }
    w.write("]");
    Ok(())
}

fn write_map_key<B: WriteBackend>(
    w: &mut JsonWriter<'_>,
    b: &B,
    entry: &DynamicMessage,
    field: &Field,
) -> Result<()> {
    let src = Src::Present(entry, None);
    match field.kind() {
        Kind::Sfixed64 | Kind::Sint64 | Kind::Int64 => {
            w.write_quoted_int(get_i64(field, src)?);
        }
        Kind::Fixed64 | Kind::Uint64 => {
            w.write_quoted_uint(get_u64(field, src)?);
        }
        Kind::Sfixed32 | Kind::Sint32 | Kind::Int32 => {
            w.write_quoted_int(i64::from(get_i32(field, src)?));
        }
        Kind::Fixed32 | Kind::Uint32 => {
            w.write_quoted_uint(u64::from(get_u32(field, src)?));
        }
        Kind::Bool => {
            w.write(if get_bool(field, src)? {
                "\"true\""
            } else {
                "\"false\""
            });
        }
        Kind::String => {
            w.write_quoted(get_str(field, src)?);
        }
        Kind::Enum => {
            write_enum(w, b, field, get_enum(field, src)?, IntegerEnumStyle::Quoted);
        }
        _ => {
            return Err(Error::invalid(format!(
                "unsupported map key type on field '{}'",
                field.name()
            )));
        }
    }
    Ok(())
}

/// Whether a stored scalar equals its type's zero value.
fn is_zero(value: &Value) -> bool {
    match value {
        Value::Double(v) => *v == 0.0,
        Value::Float(v) => *v == 0.0,
        Value::I32(v) => *v == 0,
        Value::I64(v) => *v == 0,
        Value::U32(v) => *v == 0,
        Value::U64(v) => *v == 0,
        Value::Bool(v) => !v,
        Value::String(v) => v.is_empty(),
        Value::Bytes(v) => v.is_empty(),
        Value::Enum(v) => *v == 0,
        Value::Message(_) => false,
    }
}

/// Whether the field holds a `google.protobuf.Value` with no arm set.
fn is_empty_value(field: &Field, msg: &DynamicMessage) -> bool {
    classify_field_type(field) == WellKnown::Value
        && matches!(msg.get(field.number(), None), Some(Value::Message(inner)) if inner.is_empty())
}

fn write_map<B: WriteBackend>(
    w: &mut JsonWriter<'_>,
    b: &B,
    msg: &DynamicMessage,
    field: &Field,
) -> Result<()> {
    w.write("{");
    w.push();

    let count = msg.len_of(field.number());
    let mut first = true;
    for i in 0..count {
        let Some(Value::Message(entry)) = msg.get(field.number(), Some(i)) else {
            return Err(Error::internal(format!(
                "map field '{}' holds a non-message entry",
                field.name()
            )));
        };
        let entry_desc = Arc::clone(entry.descriptor());
        let value_field = entry_desc.value_field()?;
        if is_empty_value(value_field, entry) {
            // Empty google.protobuf.Values are silently discarded.
            continue;
        }
        w.write_comma(&mut first);
        w.new_line();
        write_map_key(w, b, entry, entry_desc.key_field()?)?;
        w.write(":");
        w.whitespace(" ");
        write_singular(w, b, value_field, Src::Present(entry, None))?;
    }

    w.pop();
    if !first {
        w.new_line();
    }
    w.write("}");
    Ok(())
}

fn write_field<B: WriteBackend>(
    w: &mut JsonWriter<'_>,
    b: &B,
    msg: &DynamicMessage,
    field: &Field,
    first: &mut bool,
) -> Result<()> {
    if !field.is_repeated() && is_empty_value(field, msg) {
        // Empty google.protobuf.Values are silently discarded.
        return Ok(());
    }

    w.write_comma(first);
    w.new_line();

    if field.is_extension() {
        w.write("\"[");
        w.write(field.name());
        w.write("]\":");
    } else if w.options().preserve_proto_field_names {
        w.write("\"");
        w.write(field.name());
        w.write("\":");
    } else {
        // The legacy writer capitalized JSON names whose declared name
        // starts uppercase.
        let declared = field.name();
        let json_name = field.json_name();
        let declared_upper = declared.chars().next().is_some_and(|c| c.is_ascii_uppercase());
        let json_upper = json_name.chars().next().is_some_and(|c| c.is_ascii_uppercase());
        if w.options().allow_legacy_syntax && declared_upper && !json_upper {
            let mut name = String::with_capacity(declared.len());
            name.extend(declared.chars().next().map(|c| c.to_ascii_uppercase()));
            name.push_str(&declared[1..]);
            w.write("\"");
            w.write(&name);
            w.write("\":");
        } else {
            w.write("\"");
            w.write(json_name);
            w.write("\":");
        }
    }
    w.whitespace(" ");

    if field.is_map() {
        return write_map(w, b, msg, field);
    }
    if field.is_repeated() {
        return write_repeated(w, b, msg, field);
    }
    if msg.len_of(field.number()) == 0 {
        if field.kind() == Kind::Group {
            // Groups lack full support; an absent group renders as null.
            w.write("null");
            return Ok(());
        }
        return write_singular(w, b, field, Src::Default);
    }
    write_singular(w, b, field, Src::Present(msg, None))
}

fn write_fields<B: WriteBackend>(
    w: &mut JsonWriter<'_>,
    b: &B,
    msg: &DynamicMessage,
    desc: &Arc<Descriptor>,
    first: &mut bool,
) -> Result<()> {
    let mut fields: Vec<Arc<Field>> = Vec::with_capacity(desc.fields().len());
    for field in desc.fields() {
        let mut has = msg.len_of(field.number()) > 0;
        // Without explicit presence, a stored default is the same as an
        // absent field.
        if has && !field.is_repeated() && field.is_implicit_presence() {
            if let Some(value) = msg.get(field.number(), None) {
                has = !is_zero(value);
            }
        }
        if w.options().always_print_fields_with_no_presence {
            has |= field.is_repeated() || field.is_implicit_presence();
        }
        if w.options().always_print_primitive_fields {
            has |= !field.is_repeated() && field.is_implicit_presence();
        }
        if has {
            fields.push(Arc::clone(field));
        }
    }

    // Extensions join before sorting so everything lands in field-number
    // order.
    b.find_extensions(msg, &mut fields);
    fields.sort_by_key(|f| f.number());

    for field in &fields {
        write_field(w, b, msg, field, first)?;
    }
    Ok(())
}

fn write_value<B: WriteBackend>(
    w: &mut JsonWriter<'_>,
    b: &B,
    msg: &DynamicMessage,
    desc: &Arc<Descriptor>,
    is_top_level: bool,
) -> Result<()> {
    // Field numbers 1 through 6 are the arms of the Value oneof.
    if msg.len_of(1) > 0 {
        w.write("null");
        return Ok(());
    }

    let number_field = desc.must_have_field(2)?;
    if msg.len_of(2) > 0 {
        let x = get_f64(number_field, Src::Present(msg, None))?;
        if x.is_nan() {
            return Err(Error::invalid(
                "google.protobuf.Value cannot encode double values for nan, \
                 because it would be parsed as a string",
            ));
        }
        if x.is_infinite() {
            return Err(Error::invalid(
                "google.protobuf.Value cannot encode double values for \
                 infinity, because it would be parsed as a string",
            ));
        }
        w.write_f64(x);
        return Ok(());
    }

    let string_field = desc.must_have_field(3)?;
    if msg.len_of(3) > 0 {
        w.write_quoted(get_str(string_field, Src::Present(msg, None))?);
        return Ok(());
    }

    let bool_field = desc.must_have_field(4)?;
    if msg.len_of(4) > 0 {
        w.write(if get_bool(bool_field, Src::Present(msg, None))? {
            "true"
        } else {
            "false"
        });
        return Ok(());
    }

    let struct_field = desc.must_have_field(5)?;
    if msg.len_of(5) > 0 {
        let inner = get_message(struct_field, Src::Present(msg, None))?;
        return write_struct_value(w, b, inner, inner.descriptor());
    }

    let list_field = desc.must_have_field(6)?;
    if msg.len_of(6) > 0 {
        let inner = get_message(list_field, Src::Present(msg, None))?;
        return write_list_value(w, b, inner, inner.descriptor());
    }

    if !is_top_level {
        return Err(Error::internal(
            "empty, non-top-level Value must be elided by its container",
        ));
    }
    Ok(())
}

fn write_struct_value<B: WriteBackend>(
    w: &mut JsonWriter<'_>,
    b: &B,
    msg: &DynamicMessage,
    desc: &Arc<Descriptor>,
) -> Result<()> {
    write_map(w, b, msg, desc.must_have_field(1)?)
}

fn write_list_value<B: WriteBackend>(
    w: &mut JsonWriter<'_>,
    b: &B,
    msg: &DynamicMessage,
    desc: &Arc<Descriptor>,
) -> Result<()> {
    write_repeated(w, b, msg, desc.must_have_field(1)?)
}

/// Splits nanoseconds into the shortest 3/6/9-digit fraction.
fn frac_digits(nanos: i32) -> (usize, u32) {
    let mut digits = 9usize;
    let mut frac = nanos.unsigned_abs();
    while frac % 1000 == 0 && digits > 3 {
        frac /= 1000;
        digits -= 3;
    }
    (digits, frac)
}

fn write_timestamp(w: &mut JsonWriter<'_>, msg: &DynamicMessage, desc: &Arc<Descriptor>) -> Result<()> {
    let secs_field = desc.must_have_field(1)?;
    let secs = get_i64(secs_field, Src::Present(msg, None))?;
    if secs < -62_135_596_800 {
        return Err(Error::invalid(
            "minimum acceptable time value is 0001-01-01T00:00:00Z",
        ));
    }
    if secs > 253_402_300_799 {
        return Err(Error::invalid(
            "maximum acceptable time value is 9999-12-31T23:59:59Z",
        ));
    }
    // Shift so the day arithmetic below runs on a non-negative count.
    let secs = secs + 62_135_596_800;

    let nanos_field = desc.must_have_field(2)?;
    let nanos = get_i32(nanos_field, Src::Present(msg, None))?;

    // Julian day number to calendar date, after Fliegel & Van Flandern.
    let mut l = (secs / 86_400) as i32 - 719_162 + 68_569 + 2_440_588;
    let n = 4 * l / 146_097;
    l -= (146_097 * n + 3) / 4;
    let mut i = 4000 * (l + 1) / 1_461_001;
    l = l - 1461 * i / 4 + 31;
    let mut j = 80 * l / 2447;
    let k = l - 2447 * j / 80;
    l = j / 11;
    j = j + 2 - 12 * l;
    i = 100 * (n - 49) + i + l;

    let sec = secs % 60;
    let min = (secs / 60) % 60;
    let hour = (secs / 3600) % 24;

    if nanos == 0 {
        w.write(&format!(
            "\"{i:04}-{j:02}-{k:02}T{hour:02}:{min:02}:{sec:02}Z\""
        ));
        return Ok(());
    }

    let (digits, frac) = frac_digits(nanos);
    w.write(&format!(
        "\"{i:04}-{j:02}-{k:02}T{hour:02}:{min:02}:{sec:02}.{frac:0digits$}Z\""
    ));
    Ok(())
}

fn write_duration(w: &mut JsonWriter<'_>, msg: &DynamicMessage, desc: &Arc<Descriptor>) -> Result<()> {
    const MAX_SECONDS: i64 = 3_652_500 * 86_400;
    const MAX_NANOS: i32 = 999_999_999;

    let secs = get_i64(desc.must_have_field(1)?, Src::Present(msg, None))?;
    if !(-MAX_SECONDS..=MAX_SECONDS).contains(&secs) {
        return Err(Error::invalid("duration out of range"));
    }

    let nanos = get_i32(desc.must_have_field(2)?, Src::Present(msg, None))?;
    if !(-MAX_NANOS..=MAX_NANOS).contains(&nanos) {
        return Err(Error::invalid("duration out of range"));
    }
    if secs != 0 && nanos != 0 && (secs < 0) != (nanos < 0) {
        return Err(Error::invalid("nanos and seconds signs do not match"));
    }

    if nanos == 0 {
        w.write(&format!("\"{secs}s\""));
        return Ok(());
    }

    let (digits, frac) = frac_digits(nanos);
    let sign = if secs < 0 || nanos < 0 { "-" } else { "" };
    w.write(&format!(
        "\"{sign}{}.{frac:0digits$}s\"",
        secs.unsigned_abs()
    ));
    Ok(())
}

fn write_field_mask(w: &mut JsonWriter<'_>, msg: &DynamicMessage, desc: &Arc<Descriptor>) -> Result<()> {
    let paths_field = desc.must_have_field(1)?;
    let count = msg.len_of(paths_field.number());

    let mut buf = String::new();
    for index in 0..count {
        if index > 0 {
            buf.push(',');
        }
        let path = get_str(paths_field, Src::Present(msg, Some(index)))?;
        let mut saw_underscore = false;
        for c in path.chars() {
            if c.is_ascii_lowercase() && saw_underscore {
                buf.push(c.to_ascii_uppercase());
            } else if c.is_ascii_digit() || c.is_ascii_lowercase() || c == '.' {
                buf.push(c);
            } else if c == '_' && (!saw_underscore || w.options().allow_legacy_syntax) {
                saw_underscore = true;
                continue;
            } else if !w.options().allow_legacy_syntax {
                return Err(Error::invalid("unexpected character in FieldMask"));
            } else {
                if saw_underscore {
                    buf.push('_');
                }
                buf.push(c);
            }
            saw_underscore = false;
        }
    }
    w.write("\"");
    w.write(&buf);
    w.write("\"");
    Ok(())
}

fn write_any<B: WriteBackend>(
    w: &mut JsonWriter<'_>,
    b: &B,
    msg: &DynamicMessage,
    desc: &Arc<Descriptor>,
) -> Result<()> {
    let type_url_field = desc.must_have_field(1)?;
    let value_field = desc.must_have_field(2)?;

    let has_type_url = msg.len_of(type_url_field.number()) > 0;
    let has_value = msg.len_of(value_field.number()) > 0;
    if !has_type_url && !has_value {
        w.write("{}");
        return Ok(());
    }
    if !has_type_url {
        return Err(Error::invalid("broken Any: missing type URL"));
    }
    if !has_value && !w.options().allow_legacy_syntax {
        return Err(Error::invalid("broken Any: missing value"));
    }

    w.write("{");
    w.push();

    let type_url = get_str(type_url_field, Src::Present(msg, None))?.to_owned();
    w.new_line();
    w.write("\"@type\":");
    w.whitespace(" ");
    w.write_quoted(&type_url);

    let any_desc = b.dynamic_type(&type_url)?;
    let bytes: &[u8] = if has_value {
        get_bytes(value_field, Src::Present(msg, None))?
    } else {
        &[]
    };
    let inner = b.decode_embedded(&any_desc, bytes)?;

    let mut first = false;
    if classify(any_desc.full_name()) == WellKnown::NotWellKnown {
        write_fields(w, b, &inner, &any_desc, &mut first)?;
    } else {
        // A well-known payload keeps its rendering under a "value" key.
        w.write_comma(&mut first);
        w.new_line();
        w.write("\"value\":");
        w.whitespace(" ");
        write_message(w, b, &inner, &any_desc, false)?;
    }

    w.pop();
    if !first {
        w.new_line();
    }
    w.write("}");
    Ok(())
}

fn write_message<B: WriteBackend>(
    w: &mut JsonWriter<'_>,
    b: &B,
    msg: &DynamicMessage,
    desc: &Arc<Descriptor>,
    is_top_level: bool,
) -> Result<()> {
    match classify(desc.full_name()) {
        WellKnown::Any => write_any(w, b, msg, desc),
        WellKnown::Wrapper => {
            let field = desc.must_have_field(1)?;
            if msg.len_of(field.number()) == 0 {
                write_singular(w, b, field, Src::Default)
            } else {
                write_singular(w, b, field, Src::Present(msg, None))
            }
        }
        WellKnown::Value => write_value(w, b, msg, desc, is_top_level),
        WellKnown::Struct => write_struct_value(w, b, msg, desc),
        WellKnown::List => write_list_value(w, b, msg, desc),
        WellKnown::Timestamp => write_timestamp(w, msg, desc),
        WellKnown::Duration => write_duration(w, msg, desc),
        WellKnown::FieldMask => write_field_mask(w, msg, desc),
        _ => {
            w.write("{");
            w.push();
            let mut first = true;
            write_fields(w, b, msg, desc, &mut first)?;
            w.pop();
            if !first {
                w.new_line();
            }
            w.write("}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_round_trip_detection() {
        assert!(i64_round_trips_through_double(0));
        assert!(i64_round_trips_through_double(1 << 53));
        assert!(!i64_round_trips_through_double((1 << 53) + 1));
        assert!(i64_round_trips_through_double(i64::MIN));
        assert!(!i64_round_trips_through_double(i64::MAX));
        assert!(u64_round_trips_through_double(1 << 53));
        assert!(!u64_round_trips_through_double(u64::MAX));
        assert!(u64_round_trips_through_double(1 << 62));
    }

    #[test]
    fn fraction_digit_grouping() {
        assert_eq!(frac_digits(500_000_000), (3, 500));
        assert_eq!(frac_digits(1_000_000), (3, 1));
        assert_eq!(frac_digits(1_000), (6, 1));
        assert_eq!(frac_digits(1), (9, 1));
        assert_eq!(frac_digits(-5), (9, 5));
        assert_eq!(frac_digits(123_456_789), (9, 123_456_789));
    }
}
