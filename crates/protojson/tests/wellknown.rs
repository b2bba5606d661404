//! Canonical JSON shapes of the `google.protobuf` well-known types.

mod common;

use protojson::{DynamicMessage, ParseOptions, Value, WriteOptions, message_to_json_string};
use rstest::rstest;

use common::{assert_json_eq, new_message, parse, parse_into, parse_legacy, pool, write};

fn timestamp_parts(msg: &DynamicMessage, number: i32) -> (i64, i32) {
    let Some(Value::Message(inner)) = msg.get(number, None) else {
        panic!("expected a message in field {number}");
    };
    let secs = match inner.get(1, None) {
        Some(Value::I64(s)) => *s,
        None => 0,
        other => panic!("unexpected seconds: {other:?}"),
    };
    let nanos = match inner.get(2, None) {
        Some(Value::I32(n)) => *n,
        None => 0,
        other => panic!("unexpected nanos: {other:?}"),
    };
    (secs, nanos)
}

// ----------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------

#[rstest]
#[case(r#""1970-01-01T00:00:00Z""#, 0, 0)]
#[case(r#""1970-01-01T00:00:00.021Z""#, 0, 21_000_000)]
#[case(r#""1970-01-02T00:00:00Z""#, 86_400, 0)]
#[case(r#""1969-12-31T23:59:59Z""#, -1, 0)]
#[case(r#""1970-01-01T01:00:00+01:00""#, 0, 0)]
#[case(r#""1970-01-01T00:00:00-08:00""#, 28_800, 0)]
#[case(r#""2000-02-29T12:30:45.123456789Z""#, 951_827_445, 123_456_789)]
#[case(r#""0001-01-01T00:00:00Z""#, -62_135_596_800, 0)]
#[case(r#""9999-12-31T23:59:59Z""#, 253_402_300_799, 0)]
fn timestamp_string_forms(#[case] json: &str, #[case] secs: i64, #[case] nanos: i32) {
    let pool = pool();
    let msg = parse(&pool, "test.Holder", &format!(r#"{{"ts": {json}}}"#)).unwrap();
    assert_eq!(timestamp_parts(&msg, 5), (secs, nanos), "{json}");
}

#[rstest]
#[case(r#""1970-01-01T00:00:00z""#)] // lowercase z
#[case(r#""0000-01-01T00:00:00Z""#)] // year zero
#[case(r#""1970-00-01T00:00:00Z""#)] // month zero
#[case(r#""1970-01-00T00:00:00Z""#)] // day zero
#[case(r#""1970-01-01T00:00:00""#)] // missing offset
#[case(r#""1970-01-01 00:00:00Z""#)] // wrong separator
#[case(r#""1970-01-01T00:00:00.Z""#)] // empty fraction
#[case(r#""1970-01-01T00:00:00.0123456789Z""#)] // ten fraction digits
#[case(r#""1970-01-01T00:00:00+0100""#)] // malformed offset
#[case(r#""70-01-01T00:00:00Z""#)] // too short
fn timestamp_rejects(#[case] json: &str) {
    let pool = pool();
    let err = parse(&pool, "test.Holder", &format!(r#"{{"ts": {json}}}"#)).unwrap_err();
    assert!(err.is_invalid_argument(), "{json}: {err}");
}

#[rstest]
#[case(0, 0, r#""1970-01-01T00:00:00Z""#)]
#[case(0, 500_000_000, r#""1970-01-01T00:00:00.500Z""#)]
#[case(0, 1_000, r#""1970-01-01T00:00:00.000001Z""#)]
#[case(0, 1, r#""1970-01-01T00:00:00.000000001Z""#)]
#[case(-62_135_596_800, 0, r#""0001-01-01T00:00:00Z""#)]
#[case(253_402_300_799, 0, r#""9999-12-31T23:59:59Z""#)]
#[case(951_827_445, 123_456_789, r#""2000-02-29T12:30:45.123456789Z""#)]
fn timestamp_rendering(#[case] secs: i64, #[case] nanos: i32, #[case] expected: &str) {
    let pool = pool();
    let mut ts = new_message(&pool, "google.protobuf.Timestamp");
    ts.set(1, Value::I64(secs));
    ts.set(2, Value::I32(nanos));
    let mut msg = new_message(&pool, "test.Holder");
    msg.set(5, Value::Message(ts));
    assert_json_eq(&write(&pool, &msg), &format!(r#"{{"ts": {expected}}}"#));
}

#[rstest]
#[case(-62_135_596_801)]
#[case(253_402_300_800)]
fn timestamp_rendering_range(#[case] secs: i64) {
    let pool = pool();
    let mut ts = new_message(&pool, "google.protobuf.Timestamp");
    ts.set(1, Value::I64(secs));
    let mut msg = new_message(&pool, "test.Holder");
    msg.set(5, Value::Message(ts));
    let err = message_to_json_string(&pool, &msg, &WriteOptions::default()).unwrap_err();
    assert!(err.is_invalid_argument());
}

// ----------------------------------------------------------------
// Duration
// ----------------------------------------------------------------

#[rstest]
#[case(r#""0.5s""#, 0, 500_000_000)]
#[case(r#""-0.000000005s""#, 0, -5)]
#[case(r#""3s""#, 3, 0)]
#[case(r#""-3.000000001s""#, -3, -1)]
#[case(r#""315576000000s""#, 315_576_000_000, 0)]
#[case(r#""-315576000000s""#, -315_576_000_000, 0)]
fn duration_string_forms(#[case] json: &str, #[case] secs: i64, #[case] nanos: i32) {
    let pool = pool();
    let msg = parse(&pool, "test.Holder", &format!(r#"{{"dur": {json}}}"#)).unwrap();
    assert_eq!(timestamp_parts(&msg, 6), (secs, nanos), "{json}");
}

#[rstest]
#[case(r#""315576000001s""#)]
#[case(r#""-315576000001s""#)]
#[case(r#""1.5""#)]
#[case(r#""s""#)]
#[case(r#""1.0000000001s""#)]
#[case(r#""1.5ss""#)]
fn duration_rejects(#[case] json: &str) {
    let pool = pool();
    let err = parse(&pool, "test.Holder", &format!(r#"{{"dur": {json}}}"#)).unwrap_err();
    assert!(err.is_invalid_argument(), "{json}: {err}");
}

#[test]
fn duration_round_trips() {
    let pool = pool();
    for (input, expected) in [
        (r#""0.5s""#, r#""0.500s""#),
        (r#""-0.000000005s""#, r#""-0.000000005s""#),
        (r#""3s""#, r#""3s""#),
        (r#""-3.5s""#, r#""-3.500s""#),
    ] {
        let msg = parse(&pool, "test.Holder", &format!(r#"{{"dur": {input}}}"#)).unwrap();
        assert_json_eq(&write(&pool, &msg), &format!(r#"{{"dur": {expected}}}"#));
    }
}

#[test]
fn duration_sign_mismatch_fails_on_write() {
    let pool = pool();
    let mut dur = new_message(&pool, "google.protobuf.Duration");
    dur.set(1, Value::I64(1));
    dur.set(2, Value::I32(-1));
    let mut msg = new_message(&pool, "test.Holder");
    msg.set(6, Value::Message(dur));
    let err = message_to_json_string(&pool, &msg, &WriteOptions::default()).unwrap_err();
    assert!(err.to_string().contains("signs"), "{err}");
}

// ----------------------------------------------------------------
// FieldMask
// ----------------------------------------------------------------

#[test]
fn field_mask_camel_and_snake() {
    let pool = pool();
    let msg = parse(&pool, "test.Holder", r#"{"mask": "a.bCd,e"}"#).unwrap();
    let Some(Value::Message(mask)) = msg.get(7, None) else {
        panic!("expected mask");
    };
    assert_eq!(mask.get(1, Some(0)), Some(&Value::String("a.b_cd".to_owned())));
    assert_eq!(mask.get(1, Some(1)), Some(&Value::String("e".to_owned())));

    let rendered = write(&pool, &msg);
    assert!(rendered.contains(r#""a.bCd,e""#), "{rendered}");
}

#[test]
fn field_mask_empty_string_is_no_paths() {
    let pool = pool();
    let msg = parse(&pool, "test.Holder", r#"{"mask": ""}"#).unwrap();
    let Some(Value::Message(mask)) = msg.get(7, None) else {
        panic!("expected mask");
    };
    assert_eq!(mask.len_of(1), 0);
}

#[test]
fn field_mask_rejects_odd_characters() {
    let pool = pool();
    let err = parse(&pool, "test.Holder", r#"{"mask": "a-b"}"#).unwrap_err();
    assert!(err.is_invalid_argument());
    assert!(parse_legacy(&pool, "test.Holder", r#"{"mask": "a-b"}"#).is_ok());
}

#[test]
fn field_mask_double_underscore_fails_on_write() {
    let pool = pool();
    let mut mask = new_message(&pool, "google.protobuf.FieldMask");
    mask.push(1, Value::String("a__b".to_owned()));
    let mut msg = new_message(&pool, "test.Holder");
    msg.set(7, Value::Message(mask));
    let err = message_to_json_string(&pool, &msg, &WriteOptions::default()).unwrap_err();
    assert!(err.is_invalid_argument());
    let ok = message_to_json_string(
        &pool,
        &msg,
        &WriteOptions {
            allow_legacy_syntax: true,
            ..WriteOptions::default()
        },
    );
    assert!(ok.is_ok());
}

// ----------------------------------------------------------------
// Wrappers
// ----------------------------------------------------------------

#[test]
fn wrappers_take_bare_primitives() {
    let pool = pool();
    let msg = parse(
        &pool,
        "test.Holder",
        r#"{"wd": 1.5, "wi": "42", "ws": "text"}"#,
    )
    .unwrap();
    assert_json_eq(
        &write(&pool, &msg),
        r#"{"wd": 1.5, "wi": "42", "ws": "text"}"#,
    );
}

#[test]
fn wrappers_accept_their_object_form() {
    let pool = pool();
    let msg = parse(&pool, "test.Holder", r#"{"wd": {"value": 1.5}}"#).unwrap();
    assert_json_eq(&write(&pool, &msg), r#"{"wd": 1.5}"#);
}

#[test]
fn wrapper_zero_still_prints() {
    let pool = pool();
    let msg = parse(&pool, "test.Holder", r#"{"wd": 0}"#).unwrap();
    // A present wrapper always renders, even at the default value.
    assert_json_eq(&write(&pool, &msg), r#"{"wd": 0}"#);
}

// ----------------------------------------------------------------
// Value / Struct / ListValue / NullValue
// ----------------------------------------------------------------

#[test]
fn value_dispatches_on_json_kind() {
    let pool = pool();
    for (json, expected_arm) in [
        ("null", 1),
        ("1.5", 2),
        (r#""x""#, 3),
        ("true", 4),
        (r#"{"k": 1}"#, 5),
        ("[1, 2]", 6),
    ] {
        let msg = parse(&pool, "test.Holder", &format!(r#"{{"val": {json}}}"#)).unwrap();
        let Some(Value::Message(val)) = msg.get(1, None) else {
            panic!("expected value message for {json}");
        };
        assert_eq!(val.len_of(expected_arm), 1, "arm for {json}");
        // Round trip through the writer.
        assert_json_eq(&write(&pool, &msg), &format!(r#"{{"val": {json}}}"#));
    }
}

#[test]
fn value_arms_are_a_oneof() {
    let pool = pool();
    let msg = parse(&pool, "test.Holder", r#"{"val": "x"}"#).unwrap();
    let Some(Value::Message(val)) = msg.get(1, None) else {
        panic!("expected value");
    };
    // Only the string arm is set.
    for arm in [1, 2, 4, 5, 6] {
        assert_eq!(val.len_of(arm), 0);
    }
}

#[test]
fn nested_struct_values_round_trip() {
    let pool = pool();
    let json = r#"{"st": {"a": [1, "two", false, null], "b": {"c": {}}}}"#;
    let msg = parse(&pool, "test.Holder", json).unwrap();
    assert_json_eq(&write(&pool, &msg), json);
}

#[test]
fn struct_and_list_always_print_even_empty() {
    let pool = pool();
    let msg = parse(&pool, "test.Holder", r#"{"st": {}, "lst": []}"#).unwrap();
    assert_json_eq(&write(&pool, &msg), r#"{"st": {}, "lst": []}"#);
}

#[test]
fn empty_values_are_elided_from_arrays() {
    let pool = pool();
    let mut msg = new_message(&pool, "test.Holder");
    let value_desc = pool.message_by_name("google.protobuf.Value").unwrap();
    let mut real = DynamicMessage::new(value_desc.clone());
    real.set(2, Value::Double(1.0));
    msg.push(11, Value::Message(DynamicMessage::new(value_desc.clone())));
    msg.push(11, Value::Message(real));
    msg.push(11, Value::Message(DynamicMessage::new(value_desc)));
    assert_json_eq(&write(&pool, &msg), r#"{"repVal": [1]}"#);
}

#[test]
fn empty_value_as_singular_field_is_elided() {
    let pool = pool();
    let value_desc = pool.message_by_name("google.protobuf.Value").unwrap();
    let mut msg = new_message(&pool, "test.Holder");
    msg.set(1, Value::Message(DynamicMessage::new(value_desc)));
    assert_json_eq(&write(&pool, &msg), "{}");
}

#[test]
fn empty_value_in_struct_entries_is_elided() {
    let pool = pool();
    let value_desc = pool.message_by_name("google.protobuf.Value").unwrap();
    let entry_desc = pool
        .message_by_name("google.protobuf.Struct.FieldsEntry")
        .unwrap();
    let mut entry = DynamicMessage::new(entry_desc);
    entry.set(1, Value::String("gone".to_owned()));
    entry.set(2, Value::Message(DynamicMessage::new(value_desc)));
    let mut st = new_message(&pool, "google.protobuf.Struct");
    st.push(1, Value::Message(entry));
    let mut msg = new_message(&pool, "test.Holder");
    msg.set(2, Value::Message(st));
    assert_json_eq(&write(&pool, &msg), r#"{"st": {}}"#);
}

#[test]
fn non_finite_value_numbers_fail_on_write() {
    let pool = pool();
    for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let value_desc = pool.message_by_name("google.protobuf.Value").unwrap();
        let mut val = DynamicMessage::new(value_desc);
        val.set(2, Value::Double(bad));
        let mut msg = new_message(&pool, "test.Holder");
        msg.set(1, Value::Message(val));
        let err = message_to_json_string(&pool, &msg, &WriteOptions::default()).unwrap_err();
        assert!(err.is_invalid_argument(), "{bad}");
    }
}

#[test]
fn quoted_infinity_parses_as_a_string_value() {
    let pool = pool();
    let msg = parse(&pool, "test.Holder", r#"{"val": "Infinity"}"#).unwrap();
    let Some(Value::Message(val)) = msg.get(1, None) else {
        panic!("expected value");
    };
    // Inside google.protobuf.Value all strings are genuine strings.
    assert_eq!(val.get(3, None), Some(&Value::String("Infinity".to_owned())));
}

#[test]
fn null_value_enum_field() {
    let pool = pool();
    let msg = parse(&pool, "test.Holder", r#"{"null": null}"#).unwrap();
    assert_eq!(msg.get(12, None), Some(&Value::Enum(0)));
}

// ----------------------------------------------------------------
// Any
// ----------------------------------------------------------------

#[test]
fn any_reparse_finds_type_anywhere() {
    let pool = pool();
    let msg = parse(
        &pool,
        "test.Holder",
        r#"{"any": {"x": 5, "@type": "t.example.com/test.Nested", "y": "hi"}}"#,
    )
    .unwrap();
    let Some(Value::Message(any)) = msg.get(4, None) else {
        panic!("expected Any");
    };
    assert_eq!(
        any.get(1, None),
        Some(&Value::String("t.example.com/test.Nested".to_owned()))
    );
    // Wire encoding of test.Nested { x: 5, y: "hi" }.
    assert_eq!(
        any.get(2, None),
        Some(&Value::Bytes(vec![0x08, 0x05, 0x12, 0x02, b'h', b'i']))
    );

    assert_json_eq(
        &write(&pool, &msg),
        r#"{"any": {"@type": "t.example.com/test.Nested", "x": 5, "y": "hi"}}"#,
    );
}

#[test]
fn any_with_well_known_payload_uses_value_key() {
    let pool = pool();
    let json =
        r#"{"any": {"@type": "t.example.com/google.protobuf.Duration", "value": "1.5s"}}"#;
    let msg = parse(&pool, "test.Holder", json).unwrap();
    assert_json_eq(
        &write(&pool, &msg),
        r#"{"any": {"@type": "t.example.com/google.protobuf.Duration", "value": "1.500s"}}"#,
    );

    // Anything except @type and value is rejected.
    let err = parse(
        &pool,
        "test.Holder",
        r#"{"any": {"@type": "t.example.com/google.protobuf.Duration", "seconds": 1}}"#,
    )
    .unwrap_err();
    assert!(err.is_invalid_argument());
}

#[test]
fn any_requires_type_url() {
    let pool = pool();
    let err = parse(&pool, "test.Holder", r#"{"any": {"x": 5}}"#).unwrap_err();
    assert!(err.to_string().contains("@type"), "{err}");

    // Legacy mode accepts a missing @type only for an empty object.
    assert!(parse_legacy(&pool, "test.Holder", r#"{"any": {}}"#).is_ok());
    assert!(parse_legacy(&pool, "test.Holder", r#"{"any": {"x": 5}}"#).is_err());
}

#[test]
fn any_rejects_repeated_and_unresolvable_types() {
    let pool = pool();
    let err = parse(
        &pool,
        "test.Holder",
        r#"{"any": {"@type": "a/test.Nested", "@type": "a/test.Nested"}}"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("repeated @type"), "{err}");

    let err = parse(
        &pool,
        "test.Holder",
        r#"{"any": {"@type": "a/no.Such"}}"#,
    )
    .unwrap_err();
    assert!(err.is_invalid_argument());
}

#[test]
fn any_rendering_edge_cases() {
    let pool = pool();

    // Fully empty Any renders as {}.
    let mut msg = new_message(&pool, "test.Holder");
    msg.set(4, Value::Message(new_message(&pool, "google.protobuf.Any")));
    assert_json_eq(&write(&pool, &msg), r#"{"any": {}}"#);

    // A value without a type URL is broken.
    let mut any = new_message(&pool, "google.protobuf.Any");
    any.set(2, Value::Bytes(vec![0x08, 0x05]));
    let mut msg = new_message(&pool, "test.Holder");
    msg.set(4, Value::Message(any));
    let err = message_to_json_string(&pool, &msg, &WriteOptions::default()).unwrap_err();
    assert!(err.to_string().contains("type URL"), "{err}");

    // A type URL without a value is broken outside legacy mode.
    let mut any = new_message(&pool, "google.protobuf.Any");
    any.set(1, Value::String("a/test.Nested".to_owned()));
    let mut msg = new_message(&pool, "test.Holder");
    msg.set(4, Value::Message(any));
    assert!(message_to_json_string(&pool, &msg, &WriteOptions::default()).is_err());
    let legacy = message_to_json_string(
        &pool,
        &msg,
        &WriteOptions {
            allow_legacy_syntax: true,
            ..WriteOptions::default()
        },
    )
    .unwrap();
    assert_json_eq(&legacy, r#"{"any": {"@type": "a/test.Nested"}}"#);
}

#[test]
fn any_holding_a_non_finite_value_fails_on_write() {
    let pool = pool();
    let mut any = new_message(&pool, "google.protobuf.Any");
    any.set(
        1,
        Value::String("t.example.com/google.protobuf.Value".to_owned()),
    );
    // Hand-built wire bytes: field 2 (number_value), fixed64, +inf.
    any.set(
        2,
        Value::Bytes(vec![0x11, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xF0, 0x7F]),
    );
    let mut msg = new_message(&pool, "test.Holder");
    msg.set(4, Value::Message(any));
    let err = message_to_json_string(&pool, &msg, &WriteOptions::default()).unwrap_err();
    assert!(err.is_invalid_argument());
}

#[test]
fn nested_any_round_trips() {
    let pool = pool();
    let json = r#"{"any": {
        "@type": "t.example.com/test.Holder",
        "any": {"@type": "t.example.com/test.Nested", "x": 1}
    }}"#;
    let msg = parse(&pool, "test.Holder", json).unwrap();
    assert_json_eq(
        &write(&pool, &msg),
        r#"{"any": {
            "@type": "t.example.com/test.Holder",
            "any": {"@type": "t.example.com/test.Nested", "x": 1}
        }}"#,
    );
}

#[test]
fn holder_defaults_against_ignore_unknown() {
    let pool = pool();
    // Unknown keys inside an Any payload respect ignore_unknown_fields.
    let err = parse(
        &pool,
        "test.Holder",
        r#"{"any": {"@type": "a/test.Nested", "zzz": 1}}"#,
    )
    .unwrap_err();
    assert!(err.is_invalid_argument());
    let msg = parse_into(
        &pool,
        "test.Holder",
        r#"{"any": {"@type": "a/test.Nested", "zzz": 1, "x": 2}}"#,
        &ParseOptions {
            ignore_unknown_fields: true,
            ..ParseOptions::default()
        },
    )
    .unwrap();
    let Some(Value::Message(any)) = msg.get(4, None) else {
        panic!("expected Any");
    };
    assert_eq!(any.get(2, None), Some(&Value::Bytes(vec![0x08, 0x02])));
}
