//! JSON → message translation.
//!
//! One algorithmic body, generic over [`ParseBackend`]. The lexer drives a
//! recursive descent over the JSON document; every write goes through the
//! back-end, which either mutates an in-memory message or emits wire
//! format. Well-known `google.protobuf` types get their special JSON
//! shapes here, dispatched off the descriptor's name fingerprint.

pub(crate) mod backend;

use std::collections::HashSet;
use std::sync::Arc;

use crate::descriptor::{Descriptor, Field, Kind, WellKnown, classify, classify_field_type};
use crate::error::Result;
use crate::io::SliceInput;
use crate::lexer::{JsonLexer, Located, TokenKind};
use backend::ParseBackend;

/// Parses one complete JSON value into `msg` and rejects trailing input.
pub(crate) fn parse_json<B: ParseBackend>(
    lex: &mut JsonLexer<'_>,
    b: &B,
    desc: &Arc<Descriptor>,
    msg: &mut B::Msg,
) -> Result<()> {
    parse_message(lex, b, desc, msg, false)?;
    if !lex.at_eof()? {
        return Err(lex.invalid("extraneous characters after end of JSON object"));
    }
    Ok(())
}

fn parse_message<B: ParseBackend>(
    lex: &mut JsonLexer<'_>,
    b: &B,
    desc: &Arc<Descriptor>,
    msg: &mut B::Msg,
    any_reparse: bool,
) -> Result<()> {
    let wk = classify(desc.full_name());
    if !any_reparse {
        match wk {
            WellKnown::Any => return parse_any(lex, b, desc, msg),
            WellKnown::Value => return parse_value_wkt(lex, b, desc, msg),
            WellKnown::Struct => return parse_struct_value(lex, b, desc, msg),
            _ => {}
        }
        // The remaining special shapes also accept their plain-object
        // form, so only a non-object turns on the special handling.
        if !lex.peek(TokenKind::Obj) {
            match wk {
                WellKnown::List => return parse_list_value(lex, b, desc, msg),
                WellKnown::Wrapper => {
                    return parse_singular(lex, b, desc.must_have_field(1)?, msg);
                }
                WellKnown::Timestamp => return parse_timestamp(lex, b, desc, msg),
                WellKnown::Duration => return parse_duration(lex, b, desc, msg),
                WellKnown::FieldMask => return parse_field_mask(lex, b, desc, msg),
                _ => {}
            }
        }
    }

    lex.visit_object(|lex, name| {
        if any_reparse {
            // A well-known type inside an Any keeps its payload under a
            // "value" key; everything else but @type is rejected.
            if name.value == "@type" {
                return lex.skip_value();
            }
            if wk != WellKnown::NotWellKnown {
                if name.value != "value" {
                    return Err(
                        lex.invalid("fields in a well-known-typed Any must be @type or value")
                    );
                }
                return parse_message(lex, b, desc, msg, false);
            }
        }
        parse_field(lex, b, desc, &name, msg)
    })
}

fn parse_field<B: ParseBackend>(
    lex: &mut JsonLexer<'_>,
    b: &B,
    desc: &Arc<Descriptor>,
    name: &Located<String>,
    msg: &mut B::Msg,
) -> Result<()> {
    let field: Option<Arc<Field>> = if name.value.starts_with('[') && name.value.ends_with(']') {
        let extension_name = &name.value[1..name.value.len() - 1];
        let found = b.extension_by_name(extension_name);
        if let Some(f) = &found {
            if f.extendee() != Some(desc.full_name()) {
                return Err(lex.invalid(format!(
                    "'{extension_name}' is a known extension name, but is not an extension \
                     of '{}' as expected",
                    desc.full_name()
                )));
            }
        }
        found
    } else {
        desc.field_by_name(&name.value).cloned()
    };

    let Some(field) = field else {
        if !lex.options().ignore_unknown_fields {
            return Err(lex.invalid(format!("no such field: '{}'", name.value)));
        }
        return lex.skip_value();
    };

    lex.with_frame(&name.value.clone(), |lex| {
        if b.has_parsed(&field, msg, lex.options().allow_legacy_syntax)
            && !lex.peek(TokenKind::Null)
        {
            return Err(lex.invalid(format!(
                "'{}' has already been set (either directly or as part of a oneof)",
                name.value
            )));
        }

        if field.is_map() {
            return parse_map(lex, b, &field, msg);
        }
        if field.is_repeated() {
            if lex.options().allow_legacy_syntax && !lex.peek(TokenKind::Arr) {
                // The legacy parser permits a single element in place of
                // an array thereof.
                return parse_singular(lex, b, &field, msg);
            }
            return parse_array(lex, b, &field, msg);
        }
        parse_singular(lex, b, &field, msg)
    })
}

fn parse_singular<B: ParseBackend>(
    lex: &mut JsonLexer<'_>,
    b: &B,
    field: &Field,
    msg: &mut B::Msg,
) -> Result<()> {
    if lex.peek(TokenKind::Null) {
        let wk = classify_field_type(field);
        match field.kind() {
            Kind::Enum => {
                if wk == WellKnown::Null {
                    b.set_enum(field, msg, 0);
                }
            }
            Kind::Message => {
                if wk == WellKnown::Value {
                    return b.new_msg(field, msg, |inner, child| {
                        lex.expect_literal("null")?;
                        b.set_enum(inner.must_have_field(1)?, child, 0);
                        Ok(())
                    });
                }
            }
            _ => {}
        }
        return lex.expect_literal("null");
    }

    match field.kind() {
        Kind::Float => {
            let v = parse_fp(lex, field)?;
            b.set_float(field, msg, v as f32);
        }
        Kind::Double => {
            let v = parse_fp(lex, field)?;
            b.set_double(field, msg, v);
        }
        Kind::Sfixed64 | Kind::Sint64 | Kind::Int64 => {
            let v = parse_int(lex, field)?;
            b.set_int64(field, msg, v);
        }
        Kind::Fixed64 | Kind::Uint64 => {
            let v = parse_uint(lex, field)?;
            b.set_uint64(field, msg, v);
        }
        Kind::Sfixed32 | Kind::Sint32 | Kind::Int32 => {
            let v = parse_int(lex, field)?;
            b.set_int32(field, msg, v as i32);
        }
        Kind::Fixed32 | Kind::Uint32 => {
            let v = parse_uint(lex, field)?;
            b.set_uint32(field, msg, v as u32);
        }
        Kind::Bool => match lex.peek_kind()? {
            TokenKind::True => {
                lex.expect_literal("true")?;
                b.set_bool(field, msg, true);
            }
            TokenKind::False => {
                lex.expect_literal("false")?;
                b.set_bool(field, msg, false);
            }
            TokenKind::Str if lex.options().allow_legacy_syntax => {
                let s = lex.parse_utf8()?;
                let Some(flag) = parse_bool_text(&s.value) else {
                    return Err(lex.invalid_at(s.loc, "expected 'true' or 'false'"));
                };
                b.set_bool(field, msg, flag);
            }
            _ => return Err(lex.invalid("expected 'true' or 'false'")),
        },
        Kind::String => {
            let s = lex.parse_utf8()?;
            b.set_string(field, msg, s.value);
        }
        Kind::Bytes => {
            let s = lex.parse_utf8()?;
            let decoded =
                base64_decode(&s.value).map_err(|reason| lex.invalid_at(s.loc, reason))?;
            b.set_bytes(field, msg, decoded);
        }
        Kind::Enum => match parse_enum(lex, b, field)? {
            Some(number) => b.set_enum(field, msg, number),
            None => {
                if field.is_implicit_presence() {
                    b.set_enum(field, msg, 0);
                }
            }
        },
        Kind::Message | Kind::Group => {
            return b.new_msg(field, msg, |inner, child| {
                parse_message(lex, b, inner, child, false)
            });
        }
    }
    Ok(())
}

/// Writes the zero value of `field`. Legacy arrays use this for `null`
/// elements.
fn emit_null<B: ParseBackend>(b: &B, field: &Field, msg: &mut B::Msg) -> Result<()> {
    match field.kind() {
        Kind::Float => b.set_float(field, msg, 0.0),
        Kind::Double => b.set_double(field, msg, 0.0),
        Kind::Sfixed64 | Kind::Sint64 | Kind::Int64 => b.set_int64(field, msg, 0),
        Kind::Fixed64 | Kind::Uint64 => b.set_uint64(field, msg, 0),
        Kind::Sfixed32 | Kind::Sint32 | Kind::Int32 => b.set_int32(field, msg, 0),
        Kind::Fixed32 | Kind::Uint32 => b.set_uint32(field, msg, 0),
        Kind::Bool => b.set_bool(field, msg, false),
        Kind::String => b.set_string(field, msg, String::new()),
        Kind::Bytes => b.set_bytes(field, msg, Vec::new()),
        Kind::Enum => b.set_enum(field, msg, 0),
        Kind::Message | Kind::Group => {
            return b.new_msg(field, msg, |_, _| Ok(()));
        }
    }
    Ok(())
}

fn parse_array<B: ParseBackend>(
    lex: &mut JsonLexer<'_>,
    b: &B,
    field: &Field,
    msg: &mut B::Msg,
) -> Result<()> {
    if lex.peek(TokenKind::Null) {
        return lex.expect_literal("null");
    }
    lex.visit_array(|lex| {
        lex.path_mut().next_repeated();
        let wk = classify_field_type(field);

        if lex.peek(TokenKind::Null) {
            if wk == WellKnown::Value || wk == WellKnown::Null {
                return parse_singular(lex, b, field, msg);
            }
            if lex.options().allow_legacy_syntax {
                lex.expect_literal("null")?;
                return emit_null(b, field, msg);
            }
            return Err(lex.invalid("null cannot occur inside of repeated fields"));
        }

        // In legacy mode an array nested where scalars belong is
        // flattened into its parent. Value and ListValue elements keep
        // their own array shape.
        let can_flatten = wk != WellKnown::Value && wk != WellKnown::List;
        if can_flatten && lex.options().allow_legacy_syntax && lex.peek(TokenKind::Arr) {
            return parse_array(lex, b, field, msg);
        }
        parse_singular(lex, b, field, msg)
    })
}

fn parse_map<B: ParseBackend>(
    lex: &mut JsonLexer<'_>,
    b: &B,
    field: &Field,
    msg: &mut B::Msg,
) -> Result<()> {
    if lex.peek(TokenKind::Null) {
        return lex.expect_literal("null");
    }
    let mut keys_seen: HashSet<String> = HashSet::new();
    lex.visit_object(|lex, key| {
        lex.path_mut().next_repeated();
        if !keys_seen.insert(key.value.clone()) {
            return Err(lex.invalid_at(
                key.loc,
                format!(
                    "got unexpectedly-repeated repeated map key: '{}'",
                    key.value
                ),
            ));
        }
        parse_map_entry(lex, b, field, msg, &key)
    })
}

fn parse_map_entry<B: ParseBackend>(
    lex: &mut JsonLexer<'_>,
    b: &B,
    map_field: &Field,
    msg: &mut B::Msg,
    key: &Located<String>,
) -> Result<()> {
    let entry_desc = b.field_type(map_field)?;
    if entry_desc.value_field()?.kind() == Kind::Enum {
        return parse_map_of_enums_entry(lex, b, map_field, &entry_desc, msg, key);
    }
    b.new_msg(map_field, msg, |entry_desc, entry| {
        parse_map_key(lex, b, entry_desc, entry, key)?;
        parse_singular(lex, b, entry_desc.value_field()?, entry)
    })
}

/// Map-of-enum entries are parsed value-first so an unknown enum value can
/// be dropped under `ignore_unknown_fields` without emitting an entry.
fn parse_map_of_enums_entry<B: ParseBackend>(
    lex: &mut JsonLexer<'_>,
    b: &B,
    map_field: &Field,
    entry_desc: &Arc<Descriptor>,
    msg: &mut B::Msg,
    key: &Located<String>,
) -> Result<()> {
    let enum_value = parse_enum(lex, b, entry_desc.value_field()?)?;
    let Some(enum_value) = enum_value else {
        debug_assert!(lex.options().ignore_unknown_fields);
        return Ok(());
    };
    b.new_msg(map_field, msg, |entry_desc, entry| {
        parse_map_key(lex, b, entry_desc, entry, key)?;
        b.set_enum(entry_desc.value_field()?, entry, enum_value);
        Ok(())
    })
}

/// Parses an already-consumed object key as the declared map key type.
fn parse_map_key<B: ParseBackend>(
    lex: &JsonLexer<'_>,
    b: &B,
    entry_desc: &Arc<Descriptor>,
    entry: &mut B::Msg,
    key: &Located<String>,
) -> Result<()> {
    let key_field = entry_desc.key_field()?;
    let bad_number = || lex.invalid_at(key.loc, "non-number characters in quoted number");
    match key_field.kind() {
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
            let n: i64 = key.value.parse().map_err(|_| bad_number())?;
            b.set_int64(key_field, entry, n);
        }
        Kind::Uint64 | Kind::Fixed64 => {
            let n: u64 = key.value.parse().map_err(|_| bad_number())?;
            b.set_uint64(key_field, entry, n);
        }
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
            let n: i32 = key.value.parse().map_err(|_| bad_number())?;
            b.set_int32(key_field, entry, n);
        }
        Kind::Uint32 | Kind::Fixed32 => {
            let n: u32 = key.value.parse().map_err(|_| bad_number())?;
            b.set_uint32(key_field, entry, n);
        }
        Kind::Bool => match key.value.as_str() {
            "true" => b.set_bool(key_field, entry, true),
            "false" => b.set_bool(key_field, entry, false),
            other => {
                return Err(
                    lex.invalid_at(key.loc, format!("expected bool string, got '{other}'"))
                );
            }
        },
        Kind::String => b.set_string(key_field, entry, key.value.clone()),
        Kind::Enum => {
            let ci = lex.options().case_insensitive_enum_parsing;
            let number = match b.enum_number_by_name(key_field, &key.value, ci) {
                Ok(n) => n,
                Err(e) => key.value.parse::<i32>().map_err(|_| e)?,
            };
            b.set_enum(key_field, entry, number);
        }
        _ => return Err(lex.invalid_at(key.loc, "unsupported map key type")),
    }
    Ok(())
}

// ----------------------------------------------------------------
// Primitive values
// ----------------------------------------------------------------

fn float_to_i64(lex: &JsonLexer<'_>, raw: &Located<String>, lo: f64, hi: f64) -> Result<i64> {
    let d: f64 = raw
        .value
        .parse()
        .map_err(|_| lex.invalid_at(raw.loc, format!("invalid number: '{}'", raw.value)))?;
    if !d.is_finite() {
        return Err(lex.invalid_at(raw.loc, format!("invalid number: '{}'", raw.value)));
    }
    if d < lo || d > hi {
        return Err(lex.invalid_at(raw.loc, "JSON number out of range for int"));
    }
    let v = d as i64;
    if d - v as f64 != 0.0 {
        return Err(lex.invalid_at(
            raw.loc,
            "expected integer, but JSON number had fractional part",
        ));
    }
    Ok(v)
}

fn float_to_u64(lex: &JsonLexer<'_>, raw: &Located<String>, lo: f64, hi: f64) -> Result<u64> {
    let d: f64 = raw
        .value
        .parse()
        .map_err(|_| lex.invalid_at(raw.loc, format!("invalid number: '{}'", raw.value)))?;
    if !d.is_finite() {
        return Err(lex.invalid_at(raw.loc, format!("invalid number: '{}'", raw.value)));
    }
    if d < lo || d > hi {
        return Err(lex.invalid_at(raw.loc, "JSON number out of range for int"));
    }
    let v = d as u64;
    if d - v as f64 != 0.0 {
        return Err(lex.invalid_at(
            raw.loc,
            "expected integer, but JSON number had fractional part",
        ));
    }
    Ok(v)
}

/// Reads a quoted integer, rejecting surrounding whitespace.
fn quoted_number(lex: &mut JsonLexer<'_>) -> Result<Located<String>> {
    let s = lex.parse_utf8()?;
    if s.value.bytes().any(|b| b.is_ascii_whitespace()) {
        return Err(lex.invalid_at(s.loc, "non-number characters in quoted number"));
    }
    Ok(s)
}

fn parse_i64_inner(lex: &mut JsonLexer<'_>) -> Result<Located<i64>> {
    // Doubles degrade above 2^53, so the fallback path is bounded there.
    const LO: f64 = -9_007_199_254_740_992.0;
    const HI: f64 = 9_007_199_254_740_992.0;
    let raw = match lex.peek_kind()? {
        TokenKind::Num => lex.parse_raw_number()?,
        TokenKind::Str => quoted_number(lex)?,
        _ => return Err(lex.invalid("expected number or string")),
    };
    let value = match raw.value.parse::<i64>() {
        Ok(v) => v,
        Err(_) => float_to_i64(lex, &raw, LO, HI)?,
    };
    Ok(Located {
        value,
        loc: raw.loc,
    })
}

fn parse_u64_inner(lex: &mut JsonLexer<'_>) -> Result<Located<u64>> {
    const LO: f64 = 0.0;
    const HI: f64 = 18_014_398_509_481_984.0;
    let raw = match lex.peek_kind()? {
        TokenKind::Num => lex.parse_raw_number()?,
        TokenKind::Str => quoted_number(lex)?,
        _ => return Err(lex.invalid("expected number or string")),
    };
    let value = match raw.value.parse::<u64>() {
        Ok(v) => v,
        Err(_) => float_to_u64(lex, &raw, LO, HI)?,
    };
    Ok(Located {
        value,
        loc: raw.loc,
    })
}

fn parse_int(lex: &mut JsonLexer<'_>, field: &Field) -> Result<i64> {
    let n = parse_i64_inner(lex)?;
    if field.kind().is_32bit() && i32::try_from(n.value).is_err() {
        return Err(lex.invalid_at(n.loc, "integer out of range"));
    }
    Ok(n.value)
}

fn parse_uint(lex: &mut JsonLexer<'_>, field: &Field) -> Result<u64> {
    let n = parse_u64_inner(lex)?;
    if field.kind().is_32bit() && u32::try_from(n.value).is_err() {
        return Err(lex.invalid_at(n.loc, "integer out of range"));
    }
    Ok(n.value)
}

fn parse_fp(lex: &mut JsonLexer<'_>, field: &Field) -> Result<f64> {
    let n = match lex.peek_kind()? {
        TokenKind::Num => lex.parse_number()?.value,
        TokenKind::Str => {
            let s = lex.parse_utf8()?;
            match s.value.as_str() {
                "NaN" => f64::NAN,
                "Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                other => other
                    .parse()
                    .map_err(|_| lex.invalid_at(s.loc, "non-number characters in quoted number"))?,
            }
        }
        _ => return Err(lex.invalid("expected number or string")),
    };
    // A finite double can still overflow the 32-bit float range.
    if field.kind().is_32bit() && n.is_finite() && !(n as f32).is_finite() {
        return Err(lex.invalid("float out of range"));
    }
    Ok(n)
}

fn parse_bool_text(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true")
        || text.eq_ignore_ascii_case("t")
        || text.eq_ignore_ascii_case("yes")
        || text.eq_ignore_ascii_case("y")
        || text == "1"
    {
        return Some(true);
    }
    if text.eq_ignore_ascii_case("false")
        || text.eq_ignore_ascii_case("f")
        || text.eq_ignore_ascii_case("no")
        || text.eq_ignore_ascii_case("n")
        || text == "0"
    {
        return Some(false);
    }
    None
}

fn parse_enum_from_str<B: ParseBackend>(
    lex: &JsonLexer<'_>,
    b: &B,
    field: &Field,
    text: &Located<String>,
) -> Result<Option<i32>> {
    match b.enum_number_by_name(field, &text.value, lex.options().case_insensitive_enum_parsing) {
        Ok(number) => Ok(Some(number)),
        Err(e) => {
            if let Ok(number) = text.value.parse::<i32>() {
                return Ok(Some(number));
            }
            if lex.options().ignore_unknown_fields {
                return Ok(None);
            }
            Err(e)
        }
    }
}

/// Parses an enum value. Returns `None` when an unknown enumerator was
/// dropped under `ignore_unknown_fields`.
fn parse_enum<B: ParseBackend>(
    lex: &mut JsonLexer<'_>,
    b: &B,
    field: &Field,
) -> Result<Option<i32>> {
    match lex.peek_kind()? {
        TokenKind::Str => {
            let s = lex.parse_utf8()?;
            parse_enum_from_str(lex, b, field, &s)
        }
        TokenKind::Num => {
            let n = parse_int(lex, field)?;
            Ok(Some(n as i32))
        }
        _ => Err(lex.invalid("expected number or string")),
    }
}

// ----------------------------------------------------------------
// base64
// ----------------------------------------------------------------

/// Maps one byte of base64 input to its 6-bit value. Both the standard
/// and the URL-safe alphabets are accepted.
fn base64_value(b: u8) -> i32 {
    match b {
        b'A'..=b'Z' => i32::from(b - b'A'),
        b'a'..=b'z' => i32::from(b - b'a') + 26,
        b'0'..=b'9' => i32::from(b - b'0') + 52,
        b'+' | b'-' => 62,
        b'/' | b'_' => 63,
        _ => -1,
    }
}

fn base64_decode(text: &str) -> Result<Vec<u8>, &'static str> {
    const CORRUPT: &str = "corrupt base64";
    let mut data = text.as_bytes();
    let mut padding = 0usize;
    while padding < 2 && data.last() == Some(&b'=') {
        data = &data[..data.len() - 1];
        padding += 1;
    }
    if padding > 0 && data.len() % 4 != 4 - padding {
        return Err(CORRUPT);
    }

    let mut out = Vec::with_capacity(data.len() / 4 * 3 + 2);
    let mut chunks = data.chunks_exact(4);
    for quad in &mut chunks {
        let word = base64_value(quad[0]) << 18
            | base64_value(quad[1]) << 12
            | base64_value(quad[2]) << 6
            | base64_value(quad[3]);
        if word < 0 {
            return Err(CORRUPT);
        }
        out.push((word >> 16) as u8);
        out.push((word >> 8) as u8);
        out.push(word as u8);
    }
    match *chunks.remainder() {
        [] => {}
        [a, b] => {
            let word = base64_value(a) << 18 | base64_value(b) << 12;
            if word < 0 {
                return Err(CORRUPT);
            }
            out.push((word >> 16) as u8);
        }
        [a, b, c] => {
            let word = base64_value(a) << 18 | base64_value(b) << 12 | base64_value(c) << 6;
            if word < 0 {
                return Err(CORRUPT);
            }
            out.push((word >> 16) as u8);
            out.push((word >> 8) as u8);
        }
        _ => return Err(CORRUPT),
    }
    Ok(out)
}

// ----------------------------------------------------------------
// Well-known types
// ----------------------------------------------------------------

/// Consumes digits (at most `max_digits`) followed by `suffix`, advancing
/// `data` past both.
fn take_time_digits(data: &mut &str, max_digits: u32, suffix: &str) -> Option<u32> {
    let mut value = 0u32;
    let mut limit = i64::from(max_digits);
    loop {
        let Some(&b) = data.as_bytes().first() else {
            break;
        };
        if !b.is_ascii_digit() {
            break;
        }
        limit -= 1;
        if limit < 0 {
            return None;
        }
        value = value * 10 + u32::from(b - b'0');
        *data = &data[1..];
    }
    *data = data.strip_prefix(suffix)?;
    Some(value)
}

/// Reads an optional `.digits` fraction, scaled to nanoseconds.
fn take_nanos(data: &mut &str) -> Option<i32> {
    let mut frac: i64 = 0;
    let mut digits = 0usize;
    if let Some(rest) = data.strip_prefix('.') {
        for b in rest.bytes() {
            if !b.is_ascii_digit() {
                break;
            }
            digits += 1;
        }
        if digits == 0 || digits > 9 {
            return None;
        }
        frac = rest[..digits].parse().ok()?;
        *data = &rest[digits..];
    }
    for _ in 0..(9 - digits) {
        frac *= 10;
    }
    i32::try_from(frac).ok()
}

fn parse_timestamp<B: ParseBackend>(
    lex: &mut JsonLexer<'_>,
    b: &B,
    desc: &Arc<Descriptor>,
    msg: &mut B::Msg,
) -> Result<()> {
    if lex.peek(TokenKind::Null) {
        return lex.expect_literal("null");
    }
    let s = lex.parse_utf8()?;
    if s.value.len() < 20 {
        return Err(lex.invalid_at(s.loc, "timestamp string too short"));
    }
    let mut data = s.value.as_str();

    let secs;
    {
        let year = take_time_digits(&mut data, 4, "-");
        let year = match year {
            Some(y) if y != 0 => y,
            _ => return Err(lex.invalid_at(s.loc, "bad year in timestamp")),
        };
        let mon = match take_time_digits(&mut data, 2, "-") {
            Some(m) if m != 0 => m,
            _ => return Err(lex.invalid_at(s.loc, "bad month in timestamp")),
        };
        let day = match take_time_digits(&mut data, 2, "T") {
            Some(d) if d != 0 => d,
            _ => return Err(lex.invalid_at(s.loc, "bad day in timestamp")),
        };
        let hour = take_time_digits(&mut data, 2, ":")
            .ok_or_else(|| lex.invalid_at(s.loc, "bad hours in timestamp"))?;
        let min = take_time_digits(&mut data, 2, ":")
            .ok_or_else(|| lex.invalid_at(s.loc, "bad minutes in timestamp"))?;
        let sec = take_time_digits(&mut data, 2, "")
            .ok_or_else(|| lex.invalid_at(s.loc, "bad seconds in timestamp"))?;

        // Epoch-day arithmetic over a March-based calendar.
        let m_adj = mon.wrapping_sub(3);
        let carry = u32::from(m_adj > mon);

        let year_base = 4800; // Before the minimum year, multiple of 400.
        let y_adj = year + year_base - carry;

        let month_days = (m_adj.wrapping_add(carry * 12) * 62_719 + 769) / 2048;
        let leap_days = y_adj / 4 - y_adj / 100 + y_adj / 400;
        let epoch_days =
            i64::from(y_adj * 365 + leap_days + month_days + (day - 1)) - 2_472_632;

        secs = epoch_days * 86_400
            + i64::from(hour) * 3600
            + i64::from(min) * 60
            + i64::from(sec);
    }

    let nanos = take_nanos(&mut data)
        .ok_or_else(|| lex.invalid_at(s.loc, "timestamp had bad nanoseconds"))?;

    if data.is_empty() {
        return Err(lex.invalid_at(s.loc, "timestamp missing timezone offset"));
    }

    let secs = match data.as_bytes()[0] {
        sign @ (b'-' | b'+') => {
            // [+-]hh:mm
            if data.len() != 6 {
                return Err(lex.invalid_at(s.loc, "timestamp offset of wrong size"));
            }
            data = &data[1..];
            let hour = take_time_digits(&mut data, 2, ":");
            let mins = take_time_digits(&mut data, 2, "");
            let (Some(hour), Some(mins)) = (hour, mins) else {
                return Err(lex.invalid_at(s.loc, "timestamp offset has bad hours and minutes"));
            };
            let offset = i64::from(hour * 60 + mins) * 60;
            if sign == b'-' { secs + offset } else { secs - offset }
        }
        // Lowercase z is not accepted.
        b'Z' if data.len() == 1 => secs,
        _ => return Err(lex.invalid_at(s.loc, "bad timezone offset")),
    };

    b.set_int64(desc.must_have_field(1)?, msg, secs);
    b.set_int32(desc.must_have_field(2)?, msg, nanos);
    Ok(())
}

fn parse_duration<B: ParseBackend>(
    lex: &mut JsonLexer<'_>,
    b: &B,
    desc: &Arc<Descriptor>,
    msg: &mut B::Msg,
) -> Result<()> {
    if lex.peek(TokenKind::Null) {
        return lex.expect_literal("null");
    }
    const MAX_SECONDS: i64 = 3_652_500 * 86_400;

    let s = lex.parse_utf8()?;
    let text = s.value.as_str();

    let int_part_end = text
        .bytes()
        .position(|b| !b.is_ascii_digit() && b != b'-')
        .unwrap_or(text.len());
    if int_part_end == 0 {
        return Err(lex.invalid_at(s.loc, "duration must start with an integer"));
    }

    let sec_digits = &text[..int_part_end];
    let secs: i64 = sec_digits
        .parse()
        .map_err(|_| lex.invalid_at(s.loc, "duration had bad seconds"))?;
    if !(-MAX_SECONDS..=MAX_SECONDS).contains(&secs) {
        return Err(lex.invalid_at(s.loc, "duration out of range"));
    }

    let mut rest = &text[int_part_end..];
    let mut nanos = take_nanos(&mut rest)
        .ok_or_else(|| lex.invalid_at(s.loc, "duration had bad nanoseconds"))?;

    // The fraction shares the sign of the integer part, including -0.
    if secs < 0 || sec_digits.starts_with('-') {
        nanos = -nanos;
    }

    if rest != "s" {
        return Err(lex.invalid_at(s.loc, "duration must end with a single 's'"));
    }

    b.set_int64(desc.must_have_field(1)?, msg, secs);
    b.set_int32(desc.must_have_field(2)?, msg, nanos);
    Ok(())
}

fn parse_field_mask<B: ParseBackend>(
    lex: &mut JsonLexer<'_>,
    b: &B,
    desc: &Arc<Descriptor>,
    msg: &mut B::Msg,
) -> Result<()> {
    let s = lex.parse_utf8()?;
    if s.value.is_empty() {
        return Ok(());
    }
    let paths_field = desc.must_have_field(1)?;
    for path in s.value.split(',') {
        let mut snake_path = String::with_capacity(path.len() * 7 / 6);
        for c in path.chars() {
            if c.is_ascii_digit() || c.is_ascii_lowercase() || c == '.' {
                snake_path.push(c);
            } else if c.is_ascii_uppercase() {
                snake_path.push('_');
                snake_path.push(c.to_ascii_lowercase());
            } else if lex.options().allow_legacy_syntax {
                snake_path.push(c);
            } else {
                return Err(lex.invalid_at(s.loc, "unexpected character in FieldMask"));
            }
        }
        b.set_string(paths_field, msg, snake_path);
    }
    Ok(())
}

/// Two-pass `Any` parse: buffer the whole object behind a mark while
/// hunting for `@type`, then re-lex the recorded span into the resolved
/// embedded type.
fn parse_any<B: ParseBackend>(
    lex: &mut JsonLexer<'_>,
    b: &B,
    desc: &Arc<Descriptor>,
    msg: &mut B::Msg,
) -> Result<()> {
    lex.skip_whitespace()?;
    let mark_loc = lex.location();
    lex.begin_mark();

    let mut type_url: Option<Located<String>> = None;
    let visited = lex.visit_object(|lex, key| {
        if key.value == "@type" {
            if type_url.is_some() {
                return Err(lex.invalid_at(key.loc, "repeated @type in Any"));
            }
            type_url = Some(lex.parse_utf8()?);
            return Ok(());
        }
        lex.skip_value()
    });
    let captured = if visited.is_ok() {
        lex.marked_to_vec(0)
    } else {
        Vec::new()
    };
    lex.end_mark();
    visited?;

    let Some(url) = type_url else {
        if !lex.options().allow_legacy_syntax {
            return Err(lex.invalid_at(mark_loc, "missing @type in Any"));
        }
        // Legacy mode accepts a missing @type only for an empty object.
        let path = lex.take_path();
        let mut input = SliceInput::new(&captured);
        let mut sub = JsonLexer::new(&mut input, *lex.options(), path, mark_loc);
        let result = sub.visit_object(|sub, key| {
            Err(sub.invalid_at(
                key.loc,
                "in legacy mode, missing @type in Any is only allowed for an empty object",
            ))
        });
        lex.restore_path(sub.into_path());
        return result;
    };

    b.set_string(desc.must_have_field(1)?, msg, url.value.clone());
    b.new_dynamic(desc.must_have_field(2)?, &url.value, msg, |inner, child| {
        let path = lex.take_path();
        let mut input = SliceInput::new(&captured);
        let mut sub = JsonLexer::new(&mut input, *lex.options(), path, mark_loc);
        let result = sub.with_frame("<any>", |sub| parse_message(sub, b, inner, child, true));
        lex.restore_path(sub.into_path());
        result
    })
}

fn parse_value_wkt<B: ParseBackend>(
    lex: &mut JsonLexer<'_>,
    b: &B,
    desc: &Arc<Descriptor>,
    msg: &mut B::Msg,
) -> Result<()> {
    // Field numbers 1 through 6 are the arms of the Value oneof.
    match lex.peek_kind()? {
        TokenKind::Null => {
            let field = desc.must_have_field(1)?;
            lex.with_frame(field.name(), |lex| lex.expect_literal("null"))?;
            b.set_enum(field, msg, 0);
        }
        TokenKind::Num => {
            let field = desc.must_have_field(2)?;
            let number = lex.with_frame(field.name(), |lex| lex.parse_number())?;
            b.set_double(field, msg, number.value);
        }
        TokenKind::Str => {
            let field = desc.must_have_field(3)?;
            let s = lex.with_frame(field.name(), JsonLexer::parse_utf8)?;
            b.set_string(field, msg, s.value);
        }
        kind @ (TokenKind::True | TokenKind::False) => {
            let field = desc.must_have_field(4)?;
            lex.with_frame(field.name(), |lex| {
                if kind == TokenKind::True {
                    lex.expect_literal("true")
                } else {
                    lex.expect_literal("false")
                }
            })?;
            b.set_bool(field, msg, kind == TokenKind::True);
        }
        TokenKind::Obj => {
            let field = desc.must_have_field(5)?;
            return lex.with_frame(field.name(), |lex| {
                b.new_msg(field, msg, |inner, child| {
                    parse_struct_value(lex, b, inner, child)
                })
            });
        }
        TokenKind::Arr => {
            let field = desc.must_have_field(6)?;
            return lex.with_frame(field.name(), |lex| {
                b.new_msg(field, msg, |inner, child| {
                    parse_list_value(lex, b, inner, child)
                })
            });
        }
    }
    Ok(())
}

fn parse_struct_value<B: ParseBackend>(
    lex: &mut JsonLexer<'_>,
    b: &B,
    desc: &Arc<Descriptor>,
    msg: &mut B::Msg,
) -> Result<()> {
    let entry_field = desc.must_have_field(1)?;
    lex.with_frame("<struct>", |lex| {
        // A Struct is cleared even when set to {}.
        b.record_as_seen(entry_field, msg);
        parse_map(lex, b, entry_field, msg)
    })
}

fn parse_list_value<B: ParseBackend>(
    lex: &mut JsonLexer<'_>,
    b: &B,
    desc: &Arc<Descriptor>,
    msg: &mut B::Msg,
) -> Result<()> {
    let entry_field = desc.must_have_field(1)?;
    lex.with_frame("<list>", |lex| {
        // A ListValue is cleared even when set to [].
        b.record_as_seen(entry_field, msg);
        parse_array(lex, b, entry_field, msg)
    })
}
