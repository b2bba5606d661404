use rstest::rstest;
use serde_json::json;

use super::*;
use crate::io::SliceInput;

/// Builds a JSON value through the visitor API, the same way the message
/// parser drives the lexer.
fn parse_value(lex: &mut JsonLexer) -> Result<serde_json::Value> {
    match lex.peek_kind()? {
        TokenKind::Obj => {
            let mut map = serde_json::Map::new();
            lex.visit_object(|lex, key| {
                let value = parse_value(lex)?;
                map.insert(key.value, value);
                Ok(())
            })?;
            Ok(serde_json::Value::Object(map))
        }
        TokenKind::Arr => {
            let mut values = Vec::new();
            lex.visit_array(|lex| {
                values.push(parse_value(lex)?);
                Ok(())
            })?;
            Ok(serde_json::Value::Array(values))
        }
        TokenKind::Str => Ok(serde_json::Value::String(lex.parse_utf8()?.value)),
        TokenKind::Num => {
            let n = lex.parse_number()?.value;
            Ok(serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, Into::into))
        }
        TokenKind::True => {
            lex.expect_literal("true")?;
            Ok(serde_json::Value::Bool(true))
        }
        TokenKind::False => {
            lex.expect_literal("false")?;
            Ok(serde_json::Value::Bool(false))
        }
        TokenKind::Null => {
            lex.expect_literal("null")?;
            Ok(serde_json::Value::Null)
        }
    }
}

/// Parses `json` under several chunkings and asserts they all agree.
fn parse(json: &str, options: ParseOptions) -> Result<serde_json::Value> {
    let mut outcomes = Vec::new();
    for block in [0usize, 1, 3, 7] {
        let mut input = SliceInput::with_block_size(json.as_bytes(), block);
        let mut lex = JsonLexer::new(
            &mut input,
            options,
            MessagePath::new("test.Root"),
            JsonLocation::default(),
        );
        let value = parse_value(&mut lex).and_then(|v| {
            if lex.at_eof()? {
                Ok(v)
            } else {
                Err(lex.invalid("trailing input"))
            }
        });
        outcomes.push(value);
    }
    let first = outcomes.remove(0);
    for other in outcomes {
        match (&first, &other) {
            (Ok(a), Ok(b)) => assert_eq!(a, b, "chunking changed the result for {json:?}"),
            (Err(_), Err(_)) => {}
            _ => panic!("chunking changed the outcome for {json:?}"),
        }
    }
    first
}

fn good(json: &str) -> serde_json::Value {
    parse(json, ParseOptions::default()).unwrap()
}

fn legacy(json: &str) -> serde_json::Value {
    let options = ParseOptions {
        allow_legacy_syntax: true,
        ..ParseOptions::default()
    };
    let value = parse(json, options).unwrap();
    // Everything that needs legacy mode must fail without it.
    parse(json, ParseOptions::default()).unwrap_err();
    value
}

fn bad(json: &str) {
    for allow_legacy_syntax in [false, true] {
        let options = ParseOptions {
            allow_legacy_syntax,
            ..ParseOptions::default()
        };
        let err = parse(json, options).unwrap_err();
        assert!(
            err.is_invalid_argument(),
            "wrong error kind for {json:?}: {err:?}"
        );
    }
}

#[test]
fn literals() {
    assert_eq!(good("null"), json!(null));
    assert_eq!(good("true"), json!(true));
    assert_eq!(good("false"), json!(false));
}

#[rstest]
#[case("nul")]
#[case("flase")]
#[case("truth")]
#[case("&")]
#[case("%")]
fn typos_and_unknown_characters(#[case] input: &str) {
    bad(input);
}

#[test]
fn strings() {
    assert_eq!(good(r#""""#), json!(""));
    assert_eq!(good(r#""My String""#), json!("My String"));
    assert_eq!(good(r#""Pokémon""#), json!("Pokémon"));
    assert_eq!(good(r#""施氏食獅史""#), json!("施氏食獅史"));
    assert_eq!(good(r#""😁\t""#), json!("😁\t"));
    assert_eq!(good(r#""\t😁""#), json!("\t😁"));
}

#[test]
fn ascii_escapes() {
    assert_eq!(
        good(r#"["\b", "\ning", "test\f", "\r\t", "test\\\"\/ing"]"#),
        json!(["\u{8}", "\ning", "test\u{c}", "\r\t", "test\\\"/ing"])
    );
}

#[test]
fn unicode_escape_boundaries() {
    assert_eq!(
        good(r#""\u0001\u07FF\uFFFF\uDBFF\uDFFF""#),
        json!("\u{1}\u{7FF}\u{FFFF}\u{10FFFF}")
    );
}

#[test]
fn surrogate_pairs() {
    assert_eq!(
        good(r#"["\ud83d\udc08\u200D\u2b1B\ud83d\uDdA4"]"#),
        json!(["\u{1F408}\u{200D}\u{2B1B}\u{1F5A4}"])
    );
}

#[rstest]
#[case(r#"["\ude36"]"#)]
#[case(r#"["\ud83d"]"#)]
#[case(r#"["\ud83d|trailing"]"#)]
#[case(r#"["\ud83d\ude--"]"#)]
#[case(r#"["\ud83d\ud83d"]"#)]
fn broken_surrogates(#[case] input: &str) {
    bad(input);
}

#[rstest]
#[case("\"Unterminated")]
#[case(r#"["Unterminated]"#)]
#[case("\"broken\\")]
#[case(r#""bad escape \x""#)]
fn broken_strings(#[case] input: &str) {
    bad(input);
}

#[test]
fn non_utf8_input_rejected() {
    // Raw invalid bytes cannot be written as a str literal; build them.
    let cases: [&[u8]; 3] = [
        b"\xff{}",
        b"{ \"address\": \xff\"x\" }",
        b"\"abc\xffdef\"",
    ];
    for case in cases {
        let mut input = SliceInput::new(case);
        let mut lex = JsonLexer::new(
            &mut input,
            ParseOptions::default(),
            MessagePath::new("test.Root"),
            JsonLocation::default(),
        );
        assert!(parse_value(&mut lex).is_err(), "accepted {case:?}");
    }
}

#[test]
fn overlong_utf8_rejected() {
    // U+0000 encoded in three bytes.
    let mut broken = b"\"".to_vec();
    broken.extend_from_slice(&[0xE0, 0x80, 0x80]);
    broken.push(b'"');
    let mut input = SliceInput::new(&broken);
    let mut lex = JsonLexer::new(
        &mut input,
        ParseOptions::default(),
        MessagePath::new("test.Root"),
        JsonLocation::default(),
    );
    assert!(parse_value(&mut lex).is_err());
}

#[test]
fn zeroes() {
    assert_eq!(good("0"), json!(0.0));
    assert_eq!(good("0.0"), json!(0.0));
    assert_eq!(good("-0"), json!(-0.0));
    bad("00");
    bad("-00");
    bad("0777");
}

#[test]
fn integers_and_doubles() {
    assert_eq!(good("123456"), json!(123_456.0));
    assert_eq!(good("-79497823553162768"), json!(-79_497_823_553_162_768.0));
    assert_eq!(good("42.5"), json!(42.5));
    assert_eq!(good("-1045.235"), json!(-1045.235));
    assert_eq!(good("-0.235"), json!(-0.235));
}

#[test]
fn scientific_notation() {
    assert_eq!(good("1.2345e+10"), json!(1.2345e10));
    assert_eq!(good("1.2345e-10"), json!(1.2345e-10));
    assert_eq!(good("1.2345E10"), json!(1.2345e10));
    assert_eq!(good("0e0"), json!(0.0));
    assert_eq!(good("9E9"), json!(9e9));
}

#[rstest]
#[case("42.")]
#[case("01.3")]
#[case(".5")]
#[case("-.5")]
#[case("1.e5")]
#[case("-e5")]
#[case("1e")]
#[case("1e-")]
#[case("1e+")]
#[case("1.89769e308")]
#[case("-1.89769e308")]
fn bad_numbers(#[case] input: &str) {
    bad(input);
}

#[test]
fn number_overflow_to_double() {
    assert_eq!(
        good("18446744073709551616"),
        json!(18_446_744_073_709_551_616.0)
    );
}

#[test]
fn arrays() {
    assert_eq!(good("[]"), json!([]));
    assert_eq!(
        good(r#"[true, false, null, "string"]"#),
        json!([true, false, null, "string"])
    );
    assert_eq!(good("[[]]"), json!([[]]));
    bad("[");
    bad("[[");
    bad("[true, null}");
    bad("[null,, null]");
}

#[test]
fn objects() {
    assert_eq!(good("{}"), json!({}));
    assert_eq!(
        good(r#"{"a": 0, "b": true, "o": {"key": [1, 2]}}"#),
        json!({"a": 0.0, "b": true, "o": {"key": [1.0, 2.0]}})
    );
    bad(r#"{"a": 0 "b": true}"#);
    bad(r#"{"a": 0,, "b": true}"#);
    bad(r#"{"a"}"#);
    bad(r#"{"a":}"#);
}

#[test]
fn legacy_single_quotes() {
    assert_eq!(legacy(r"'a string'"), json!("a string"));
    assert_eq!(legacy(r#"{'s': true}"#), json!({"s": true}));
    assert_eq!(legacy(r#"["\'", '\'']"#), json!(["'", "'"]));
}

#[test]
fn legacy_bare_keys() {
    assert_eq!(legacy("{key: null}"), json!({"key": null}));
    assert_eq!(legacy("{snake_key: []}"), json!({"snake_key": []}));
    assert_eq!(legacy("{camelKey: {}}"), json!({"camelKey": {}}));
    assert_eq!(legacy(r#"{nullkey: "a"}"#), json!({"nullkey": "a"}));
    assert_eq!(legacy(r#"{truekey: "b"}"#), json!({"truekey": "b"}));
    assert_eq!(legacy(r#"{falsekey: "c"}"#), json!({"falsekey": "c"}));
}

#[rstest]
#[case("{null: 0}")]
#[case("{true: 0}")]
#[case("{false: 0}")]
#[case("{lisp-kebab: 0}")]
#[case("{42: true}")]
fn bad_keys_even_in_legacy_mode(#[case] input: &str) {
    bad(input);
}

#[test]
fn legacy_trailing_commas() {
    assert_eq!(legacy(r#"{"foo": 42,}"#), json!({"foo": 42.0}));
    assert_eq!(
        legacy(r#"{"foo": [42,],}"#),
        json!({"foo": [42.0]})
    );
    assert_eq!(legacy("[42,]"), json!([42.0]));
    assert_eq!(legacy("[{},]"), json!([{}]));
}

#[test]
fn legacy_control_characters_in_strings() {
    assert_eq!(legacy("\"a\u{1}b\""), json!("a\u{1}b"));
}

#[test]
fn array_recursion_at_the_limit() {
    let depth = ParseOptions::default().recursion_depth as usize;
    let ok = "[".repeat(depth) + &"]".repeat(depth);
    assert!(parse(&ok, ParseOptions::default()).is_ok());

    let evil = format!("[{ok}]");
    let err = parse(&evil, ParseOptions::default()).unwrap_err();
    assert!(err.is_invalid_argument());
}

#[test]
fn object_recursion_at_the_limit() {
    let depth = ParseOptions::default().recursion_depth as usize;
    let mut ok = String::new();
    for _ in 0..depth - 1 {
        ok.push_str("{\"k\":");
    }
    ok.push('{');
    ok.push_str(&"}".repeat(depth));
    assert!(parse(&ok, ParseOptions::default()).is_ok());

    let evil = format!("{{\"k\":{ok}}}");
    assert!(parse(&evil, ParseOptions::default()).is_err());
}

#[test]
fn recursion_depth_is_configurable() {
    let options = ParseOptions {
        recursion_depth: 2,
        ..ParseOptions::default()
    };
    assert!(parse("[[]]", options).is_ok());
    assert!(parse("[[[]]]", options).is_err());
}

#[test]
fn skip_value_discards_arbitrary_nesting() {
    let json = r#"{"skip": {"a": [1, 2, {"b": null}], "c": "x"}, "keep": 7}"#;
    let mut input = SliceInput::new(json.as_bytes());
    let mut lex = JsonLexer::new(
        &mut input,
        ParseOptions::default(),
        MessagePath::new("test.Root"),
        JsonLocation::default(),
    );
    let mut kept = None;
    lex.visit_object(|lex, key| {
        if key.value == "keep" {
            kept = Some(lex.parse_number()?.value);
            Ok(())
        } else {
            lex.skip_value()
        }
    })
    .unwrap();
    assert_eq!(kept, Some(7.0));
    assert!(lex.at_eof().unwrap());
}

#[test]
fn error_location_points_at_offending_byte() {
    let json = "[true,\n @]";
    let mut input = SliceInput::new(json.as_bytes());
    let mut lex = JsonLexer::new(
        &mut input,
        ParseOptions::default(),
        MessagePath::new("test.Root"),
        JsonLocation::default(),
    );
    let err = parse_value(&mut lex).unwrap_err();
    let message = err.to_string();
    // Zero-indexed line and column of the '@', byte offset 8.
    assert!(message.contains("1:1"), "unexpected message: {message}");
    assert!(message.contains("(offset"), "unexpected message: {message}");
    assert!(message.contains("test.Root"), "unexpected message: {message}");
}

#[test]
fn error_text_is_stable_in_meaning_not_in_bytes() {
    let render = || {
        let json = "@";
        let mut input = SliceInput::new(json.as_bytes());
        let mut lex = JsonLexer::new(
            &mut input,
            ParseOptions::default(),
            MessagePath::new("test.Root"),
            JsonLocation::default(),
        );
        parse_value(&mut lex).unwrap_err().to_string()
    };
    let one = render();
    assert!(one.contains("invalid"));
    assert!(one.contains("JSON"));
    // Collapsing whitespace yields the same sentence every time.
    let collapse = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
    assert_eq!(collapse(&one), collapse(&render()));
}

#[test]
fn multiline_location_tracking() {
    let json = "{\n  \"a\": true,\n  \"b\": @\n}";
    let mut input = SliceInput::new(json.as_bytes());
    let mut lex = JsonLexer::new(
        &mut input,
        ParseOptions::default(),
        MessagePath::new("test.Root"),
        JsonLocation::default(),
    );
    let err = parse_value(&mut lex).unwrap_err();
    assert!(err.to_string().contains("2:7"), "got: {err}");
}
