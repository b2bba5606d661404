//! Low-level JSON emission.
//!
//! [`JsonWriter`] owns the output sink plus the comma/indent bookkeeping.
//! Writes never fail individually; the first stream error is latched and
//! every later write becomes a no-op, so the algorithm above stays free of
//! error plumbing and the caller collects the verdict from
//! [`JsonWriter::finish`].

use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::io::{ByteSink, Output};
use crate::options::WriteOptions;

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

pub(crate) struct JsonWriter<'a> {
    sink: ByteSink<'a>,
    options: WriteOptions,
    indent: usize,
    err: Option<Error>,
}

impl<'a> JsonWriter<'a> {
    pub(crate) fn new(output: &'a mut dyn Output, options: WriteOptions) -> Self {
        Self {
            sink: ByteSink::new(output),
            options,
            indent: 0,
            err: None,
        }
    }

    pub(crate) fn options(&self) -> &WriteOptions {
        &self.options
    }

    pub(crate) fn write(&mut self, text: &str) {
        self.write_bytes(text.as_bytes());
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        if self.err.is_none() {
            if let Err(e) = self.sink.append(bytes) {
                self.err = Some(e);
            }
        }
    }

    /// Writes a separating comma unless this is the first element; always
    /// clears `first`.
    pub(crate) fn write_comma(&mut self, first: &mut bool) {
        if !*first {
            self.write(",");
        }
        *first = false;
    }

    /// In whitespace mode, a newline followed by the current indent.
    pub(crate) fn new_line(&mut self) {
        if self.options.add_whitespace {
            self.write("\n");
            for _ in 0..self.indent {
                self.write("  ");
            }
        }
    }

    /// Writes `text` only in whitespace mode.
    pub(crate) fn whitespace(&mut self, text: &str) {
        if self.options.add_whitespace {
            self.write(text);
        }
    }

    pub(crate) fn push(&mut self) {
        self.indent += 1;
    }

    pub(crate) fn pop(&mut self) {
        self.indent -= 1;
    }

    pub(crate) fn write_int(&mut self, value: i64) {
        self.write(&value.to_string());
    }

    pub(crate) fn write_uint(&mut self, value: u64) {
        self.write(&value.to_string());
    }

    pub(crate) fn write_quoted_int(&mut self, value: i64) {
        self.write(&format!("\"{value}\""));
    }

    pub(crate) fn write_quoted_uint(&mut self, value: u64) {
        self.write(&format!("\"{value}\""));
    }

    pub(crate) fn write_f64(&mut self, value: f64) {
        let rendered = fmt_f64(value);
        self.write(&rendered);
    }

    pub(crate) fn write_f32(&mut self, value: f32) {
        let rendered = fmt_f32(value);
        self.write(&rendered);
    }

    /// Writes a quoted string with every control character, quote,
    /// backslash, non-ASCII code point, and HTML-significant character
    /// escaped.
    pub(crate) fn write_quoted(&mut self, text: &str) {
        let mut buf = String::with_capacity(text.len() + 2);
        buf.push('"');
        for c in text.chars() {
            match c {
                '"' => buf.push_str("\\\""),
                '\\' => buf.push_str("\\\\"),
                '\u{8}' => buf.push_str("\\b"),
                '\u{c}' => buf.push_str("\\f"),
                '\n' => buf.push_str("\\n"),
                '\r' => buf.push_str("\\r"),
                '\t' => buf.push_str("\\t"),
                // HTML-safe output: <, >, &, and ' always take the
                // escaped form.
                '<' | '>' | '&' | '\'' => {
                    let _ = write!(buf, "\\u{:04x}", c as u32);
                }
                c if (c as u32) < 0x20 => {
                    let _ = write!(buf, "\\u{:04x}", c as u32);
                }
                c if c.is_ascii() => buf.push(c),
                c if (c as u32) <= 0xFFFF => {
                    let _ = write!(buf, "\\u{:04x}", c as u32);
                }
                c => {
                    let v = c as u32 - 0x10000;
                    let high = 0xD800 + (v >> 10);
                    let low = 0xDC00 + (v & 0x3FF);
                    let _ = write!(buf, "\\u{high:04x}\\u{low:04x}");
                }
            }
        }
        buf.push('"');
        self.write(&buf);
    }

    /// Writes a quoted base64 rendering with the standard alphabet and
    /// padding.
    pub(crate) fn write_base64(&mut self, data: &[u8]) {
        let mut buf = String::with_capacity(data.len().div_ceil(3) * 4 + 2);
        buf.push('"');
        let mut chunks = data.chunks_exact(3);
        for triple in &mut chunks {
            let word =
                u32::from(triple[0]) << 16 | u32::from(triple[1]) << 8 | u32::from(triple[2]);
            buf.push(BASE64_ALPHABET[(word >> 18) as usize & 0x3F] as char);
            buf.push(BASE64_ALPHABET[(word >> 12) as usize & 0x3F] as char);
            buf.push(BASE64_ALPHABET[(word >> 6) as usize & 0x3F] as char);
            buf.push(BASE64_ALPHABET[word as usize & 0x3F] as char);
        }
        match *chunks.remainder() {
            [] => {}
            [a] => {
                let word = u32::from(a) << 16;
                buf.push(BASE64_ALPHABET[(word >> 18) as usize & 0x3F] as char);
                buf.push(BASE64_ALPHABET[(word >> 12) as usize & 0x3F] as char);
                buf.push_str("==");
            }
            [a, b] => {
                let word = u32::from(a) << 16 | u32::from(b) << 8;
                buf.push(BASE64_ALPHABET[(word >> 18) as usize & 0x3F] as char);
                buf.push(BASE64_ALPHABET[(word >> 12) as usize & 0x3F] as char);
                buf.push(BASE64_ALPHABET[(word >> 6) as usize & 0x3F] as char);
                buf.push('=');
            }
            _ => unreachable!("chunks_exact(3) remainder is at most two bytes"),
        }
        buf.push('"');
        self.write(&buf);
    }

    /// Returns the first stream error, if any write failed.
    pub(crate) fn finish(self) -> Result<()> {
        match self.err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Shortest round-trippable rendering; non-finite values take their quoted
/// spelling since plain JSON cannot carry them.
fn fmt_f64(value: f64) -> String {
    if value.is_nan() {
        return "\"NaN\"".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 {
            "\"Infinity\"".to_owned()
        } else {
            "\"-Infinity\"".to_owned()
        };
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-6..1e21).contains(&magnitude) {
        format!("{value:e}")
    } else {
        format!("{value}")
    }
}

fn fmt_f32(value: f32) -> String {
    if value.is_nan() {
        return "\"NaN\"".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 {
            "\"Infinity\"".to_owned()
        } else {
            "\"-Infinity\"".to_owned()
        };
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-6..1e21).contains(&magnitude) {
        format!("{value:e}")
    } else {
        format!("{value}")
    }
}
