//! The JSON lexer.
//!
//! Tokenizes RFC 8259 JSON plus the documented legacy extensions
//! (single-quoted strings, bare object keys, `\U` escapes, raw control
//! characters, trailing commas), driving a [`BufferedStream`] so input can
//! arrive in arbitrary chunks. Object and array traversal is exposed as
//! visitor methods that share one recursion budget with the message parser
//! sitting on top.
//!
//! Every error is rendered with the current message path and source
//! location. The whitespace inside the rendered sentence is deliberately
//! randomized per message so that callers cannot grow byte-exact
//! dependencies on error text; the meaning is stable, the bytes are not.

use std::fmt::Write as _;

use bstr::ByteSlice;

use crate::descriptor::MessagePath;
use crate::error::{Error, Result};
use crate::io::Input;
use crate::io::buffering::BufferedStream;
use crate::options::ParseOptions;

/// A zero-indexed source position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct JsonLocation {
    pub(crate) offset: usize,
    pub(crate) line: usize,
    pub(crate) col: usize,
}

/// A lexed value together with the location it started at.
#[derive(Debug, Clone)]
pub(crate) struct Located<T> {
    pub(crate) value: T,
    pub(crate) loc: JsonLocation,
}

/// The kind of the upcoming JSON value, judged from its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Obj,
    Arr,
    Str,
    Num,
    True,
    False,
    Null,
}

pub(crate) struct JsonLexer<'a> {
    stream: BufferedStream<'a>,
    options: ParseOptions,
    path: MessagePath,
    loc: JsonLocation,
    /// Remaining nesting budget, shared by lexer and parser recursion.
    depth: u32,
}

impl<'a> JsonLexer<'a> {
    pub(crate) fn new(
        input: &'a mut dyn Input,
        options: ParseOptions,
        path: MessagePath,
        start: JsonLocation,
    ) -> Self {
        Self {
            stream: BufferedStream::new(input),
            options,
            path,
            loc: start,
            depth: options.recursion_depth,
        }
    }

    pub(crate) fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub(crate) fn path_mut(&mut self) -> &mut MessagePath {
        &mut self.path
    }

    pub(crate) fn take_path(&mut self) -> MessagePath {
        std::mem::take(&mut self.path)
    }

    pub(crate) fn restore_path(&mut self, path: MessagePath) {
        self.path = path;
    }

    pub(crate) fn into_path(self) -> MessagePath {
        self.path
    }

    pub(crate) fn location(&self) -> JsonLocation {
        self.loc
    }

    /// Pushes a message-path frame around `body`.
    pub(crate) fn with_frame<R>(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        self.path.push(name);
        let result = body(self);
        self.path.pop();
        result
    }

    /// Renders an error at the current location.
    pub(crate) fn invalid(&self, reason: impl std::fmt::Display) -> Error {
        self.invalid_at(self.loc, reason)
    }

    /// Renders an error at a recorded location.
    pub(crate) fn invalid_at(&self, loc: JsonLocation, reason: impl std::fmt::Display) -> Error {
        Error::invalid(render_error(&self.path, loc, &reason.to_string()))
    }

    // ----------------------------------------------------------------
    // Byte-level plumbing
    // ----------------------------------------------------------------

    fn peek_byte(&mut self) -> Result<Option<u8>> {
        self.stream.peek_byte()
    }

    /// Makes `n` contiguous bytes visible, treating early EOF as a syntax
    /// error at the current location.
    fn fill(&mut self, n: usize) -> Result<()> {
        self.stream.fill(n).map_err(|e| {
            if e.is_data_loss() {
                self.invalid("unexpected EOF")
            } else {
                e
            }
        })
    }

    /// Consumes `n` visible bytes, maintaining the line/column counters.
    fn advance(&mut self, n: usize) {
        let window = self.stream.unread();
        for &b in &window[..n] {
            if b == b'\n' {
                self.loc.line += 1;
                self.loc.col = 0;
            } else {
                self.loc.col += 1;
            }
        }
        self.loc.offset += n;
        self.stream.advance(n);
    }

    pub(crate) fn skip_whitespace(&mut self) -> Result<()> {
        while let Some(b' ' | b'\n' | b'\r' | b'\t') = self.peek_byte()? {
            self.advance(1);
        }
        Ok(())
    }

    pub(crate) fn begin_mark(&mut self) {
        self.stream.begin_mark();
    }

    pub(crate) fn marked_to_vec(&self, clip: usize) -> Vec<u8> {
        self.stream.marked(clip).to_vec()
    }

    pub(crate) fn end_mark(&mut self) {
        self.stream.end_mark();
    }

    // ----------------------------------------------------------------
    // Tokens
    // ----------------------------------------------------------------

    /// Classifies the upcoming value without consuming it.
    pub(crate) fn peek_kind(&mut self) -> Result<TokenKind> {
        self.skip_whitespace()?;
        let Some(b) = self.peek_byte()? else {
            return Err(self.invalid("unexpected EOF"));
        };
        Ok(match b {
            b'{' => TokenKind::Obj,
            b'[' => TokenKind::Arr,
            b'"' => TokenKind::Str,
            b'\'' if self.options.allow_legacy_syntax => TokenKind::Str,
            b'-' | b'0'..=b'9' => TokenKind::Num,
            b't' => TokenKind::True,
            b'f' => TokenKind::False,
            b'n' => TokenKind::Null,
            other => {
                return Err(self.invalid(format!(
                    "unexpected character: '{}'",
                    [other].as_bstr()
                )));
            }
        })
    }

    /// Whether the upcoming value has the given kind. Errors (including
    /// EOF) report as `false` and resurface on the next real read.
    pub(crate) fn peek(&mut self, kind: TokenKind) -> bool {
        self.peek_kind().is_ok_and(|k| k == kind)
    }

    /// Consumes an exact literal such as `null`, `true`, or `false`.
    pub(crate) fn expect_literal(&mut self, literal: &str) -> Result<()> {
        self.skip_whitespace()?;
        self.fill(literal.len())?;
        if &self.stream.unread()[..literal.len()] != literal.as_bytes() {
            return Err(self.invalid(format!("expected '{literal}'")));
        }
        self.advance(literal.len());
        Ok(())
    }

    /// Parses a JSON string into UTF-8 text.
    pub(crate) fn parse_utf8(&mut self) -> Result<Located<String>> {
        self.skip_whitespace()?;
        let loc = self.loc;
        let quote = match self.peek_byte()? {
            Some(b'"') => b'"',
            Some(b'\'') if self.options.allow_legacy_syntax => b'\'',
            _ => return Err(self.invalid("expected string")),
        };
        self.advance(1);

        let mut out: Vec<u8> = Vec::new();
        loop {
            let Some(b) = self.peek_byte()? else {
                return Err(self.invalid("unexpected EOF"));
            };
            match b {
                _ if b == quote => {
                    self.advance(1);
                    break;
                }
                b'\\' => {
                    self.advance(1);
                    self.parse_escape(&mut out)?;
                }
                0x00..=0x1F => {
                    if !self.options.allow_legacy_syntax {
                        return Err(self.invalid("unescaped control character in string"));
                    }
                    out.push(b);
                    self.advance(1);
                }
                0x20..=0x7F => {
                    out.push(b);
                    self.advance(1);
                }
                _ => self.parse_multibyte(&mut out)?,
            }
        }

        let value = String::from_utf8(out)
            .map_err(|_| Error::internal("string scan produced invalid UTF-8"))?;
        Ok(Located { value, loc })
    }

    fn parse_escape(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let Some(e) = self.peek_byte()? else {
            return Err(self.invalid("unexpected EOF"));
        };
        match e {
            b'"' => out.push(b'"'),
            b'\\' => out.push(b'\\'),
            b'/' => out.push(b'/'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'\'' if self.options.allow_legacy_syntax => out.push(b'\''),
            b'u' => {
                self.advance(1);
                return self.parse_unicode_escape(out);
            }
            b'U' if self.options.allow_legacy_syntax => {
                self.advance(1);
                return self.parse_unicode_escape(out);
            }
            other => {
                return Err(self.invalid(format!(
                    "invalid escape character: '{}'",
                    [other].as_bstr()
                )));
            }
        }
        self.advance(1);
        Ok(())
    }

    /// Parses the four hex digits after `\u`, pairing surrogates.
    fn parse_unicode_escape(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let high = self.hex4()?;
        let code_point = if (0xD800..=0xDBFF).contains(&high) {
            self.fill(2)?;
            let window = self.stream.unread();
            let escape_ok = window[0] == b'\\'
                && (window[1] == b'u' || (self.options.allow_legacy_syntax && window[1] == b'U'));
            if !escape_ok {
                return Err(self.invalid("unpaired high surrogate in unicode escape"));
            }
            self.advance(2);
            let low = self.hex4()?;
            if !(0xDC00..=0xDFFF).contains(&low) {
                return Err(self.invalid("expected low surrogate in unicode escape"));
            }
            0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
        } else if (0xDC00..=0xDFFF).contains(&high) {
            return Err(self.invalid("unpaired low surrogate in unicode escape"));
        } else {
            high
        };
        let c = char::from_u32(code_point)
            .ok_or_else(|| self.invalid(format!("invalid unicode escape \\u{code_point:04X}")))?;
        let mut encoded = [0u8; 4];
        out.extend_from_slice(c.encode_utf8(&mut encoded).as_bytes());
        Ok(())
    }

    fn hex4(&mut self) -> Result<u32> {
        let bytes = self.stream.take(4).map_err(|e| {
            if e.is_data_loss() {
                self.invalid("unexpected EOF")
            } else {
                e
            }
        })?;
        // Hex digits never contain a newline.
        self.loc.offset += 4;
        self.loc.col += 4;
        let mut value = 0u32;
        for b in bytes {
            let digit = match b {
                b'0'..=b'9' => u32::from(b - b'0'),
                b'a'..=b'f' => u32::from(b - b'a') + 10,
                b'A'..=b'F' => u32::from(b - b'A') + 10,
                _ => {
                    return Err(self.invalid(format!(
                        "invalid character in unicode escape: '{}'",
                        [b].as_bstr()
                    )));
                }
            };
            value = value << 4 | digit;
        }
        Ok(value)
    }

    /// Validates and copies one multi-byte UTF-8 sequence.
    fn parse_multibyte(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let lead = self.stream.unread()[0];
        let len = match lead {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return Err(self.invalid("invalid UTF-8 in string")),
        };
        self.fill(len)?;
        let window = self.stream.unread();
        let b1_range = match lead {
            0xE0 => 0xA0..=0xBF,
            0xED => 0x80..=0x9F,
            0xF0 => 0x90..=0xBF,
            0xF4 => 0x80..=0x8F,
            _ => 0x80..=0xBF,
        };
        if !b1_range.contains(&window[1]) {
            return Err(self.invalid("invalid UTF-8 in string"));
        }
        for &b in &window[2..len] {
            if !(0x80..=0xBF).contains(&b) {
                return Err(self.invalid("invalid UTF-8 in string"));
            }
        }
        out.extend_from_slice(&window[..len]);
        self.advance(len);
        Ok(())
    }

    /// Parses a number token, returning its raw text.
    pub(crate) fn parse_raw_number(&mut self) -> Result<Located<String>> {
        self.skip_whitespace()?;
        let loc = self.loc;
        self.begin_mark();
        let scan = self.scan_number();
        let text = if scan.is_ok() {
            String::from_utf8(self.marked_to_vec(0))
                .map_err(|_| Error::internal("number scan produced invalid UTF-8"))
        } else {
            Ok(String::new())
        };
        self.end_mark();
        scan?;
        let value = text?;

        // A number token may only be followed by EOF or a close delimiter.
        self.skip_whitespace()?;
        match self.peek_byte()? {
            None | Some(b',' | b']' | b'}') => Ok(Located { value, loc }),
            Some(_) => Err(self.invalid("unexpected character after number")),
        }
    }

    fn scan_number(&mut self) -> Result<()> {
        if self.peek_byte()? == Some(b'-') {
            self.advance(1);
        }
        match self.peek_byte()? {
            Some(b'0') => self.advance(1),
            Some(b'1'..=b'9') => {
                self.advance(1);
                self.scan_digits();
            }
            _ => return Err(self.invalid("invalid number: expected digit")),
        }
        if self.peek_byte()? == Some(b'.') {
            self.advance(1);
            if !matches!(self.peek_byte()?, Some(b'0'..=b'9')) {
                return Err(self.invalid("invalid number: expected digit after '.'"));
            }
            self.scan_digits();
        }
        if let Some(b'e' | b'E') = self.peek_byte()? {
            self.advance(1);
            if let Some(b'+' | b'-') = self.peek_byte()? {
                self.advance(1);
            }
            if !matches!(self.peek_byte()?, Some(b'0'..=b'9')) {
                return Err(self.invalid("invalid number: expected exponent digit"));
            }
            self.scan_digits();
        }
        Ok(())
    }

    fn scan_digits(&mut self) {
        while let Ok(Some(b'0'..=b'9')) = self.peek_byte() {
            self.advance(1);
        }
    }

    /// Parses a number token as a finite double.
    pub(crate) fn parse_number(&mut self) -> Result<Located<f64>> {
        let raw = self.parse_raw_number()?;
        let value: f64 = raw
            .value
            .parse()
            .map_err(|_| self.invalid_at(raw.loc, format!("invalid number: '{}'", raw.value)))?;
        if !value.is_finite() {
            return Err(self.invalid_at(raw.loc, "number out of range"));
        }
        Ok(Located {
            value,
            loc: raw.loc,
        })
    }

    /// Parses a bare-identifier object key. Legacy mode only.
    fn parse_bare_word(&mut self) -> Result<Located<String>> {
        self.skip_whitespace()?;
        let loc = self.loc;
        if !matches!(self.peek_byte()?, Some(b'a'..=b'z' | b'A'..=b'Z' | b'_')) {
            return Err(self.invalid("expected object key"));
        }
        let word = self
            .stream
            .take_while(|b| b.is_ascii_alphanumeric() || b == b'_')?;
        self.loc.offset += word.len();
        self.loc.col += word.len();
        let value = String::from_utf8(word)
            .map_err(|_| Error::internal("bare word scan produced invalid UTF-8"))?;
        if matches!(value.as_str(), "null" | "true" | "false") {
            return Err(self.invalid_at(loc, format!("'{value}' cannot be an object key")));
        }
        Ok(Located { value, loc })
    }

    /// Discards one complete JSON value.
    pub(crate) fn skip_value(&mut self) -> Result<()> {
        match self.peek_kind()? {
            TokenKind::Obj => self.visit_object(|lex, _key| lex.skip_value()),
            TokenKind::Arr => self.visit_array(JsonLexer::skip_value),
            TokenKind::Str => self.parse_utf8().map(drop),
            TokenKind::Num => self.parse_raw_number().map(drop),
            TokenKind::True => self.expect_literal("true"),
            TokenKind::False => self.expect_literal("false"),
            TokenKind::Null => self.expect_literal("null"),
        }
    }

    /// Visits each `"key": value` pair of an object. The callback must
    /// consume the value.
    pub(crate) fn visit_object(
        &mut self,
        mut member: impl FnMut(&mut Self, Located<String>) -> Result<()>,
    ) -> Result<()> {
        self.push_depth()?;
        let result = self.visit_object_inner(&mut member);
        self.pop_depth();
        result
    }

    fn visit_object_inner(
        &mut self,
        member: &mut impl FnMut(&mut Self, Located<String>) -> Result<()>,
    ) -> Result<()> {
        self.skip_whitespace()?;
        if self.peek_byte()? != Some(b'{') {
            return Err(self.invalid("expected object"));
        }
        self.advance(1);
        self.skip_whitespace()?;
        if self.peek_byte()? == Some(b'}') {
            self.advance(1);
            return Ok(());
        }
        loop {
            let key = self.parse_key()?;
            self.skip_whitespace()?;
            if self.peek_byte()? != Some(b':') {
                return Err(self.invalid("expected ':' after object key"));
            }
            self.advance(1);
            member(self, key)?;

            self.skip_whitespace()?;
            match self.peek_byte()? {
                Some(b',') => {
                    self.advance(1);
                    self.skip_whitespace()?;
                    if self.peek_byte()? == Some(b'}') {
                        if !self.options.allow_legacy_syntax {
                            return Err(self.invalid("expected object key after ','"));
                        }
                        self.advance(1);
                        return Ok(());
                    }
                }
                Some(b'}') => {
                    self.advance(1);
                    return Ok(());
                }
                Some(_) => return Err(self.invalid("expected ',' or '}' after object value")),
                None => return Err(self.invalid("unexpected EOF")),
            }
        }
    }

    fn parse_key(&mut self) -> Result<Located<String>> {
        self.skip_whitespace()?;
        match self.peek_byte()? {
            Some(b'"') => self.parse_utf8(),
            Some(b'\'') if self.options.allow_legacy_syntax => self.parse_utf8(),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'_') if self.options.allow_legacy_syntax => {
                self.parse_bare_word()
            }
            _ => Err(self.invalid("expected object key")),
        }
    }

    /// Visits each element of an array. The callback must consume the
    /// value.
    pub(crate) fn visit_array(
        &mut self,
        mut element: impl FnMut(&mut Self) -> Result<()>,
    ) -> Result<()> {
        self.push_depth()?;
        let result = self.visit_array_inner(&mut element);
        self.pop_depth();
        result
    }

    fn visit_array_inner(
        &mut self,
        element: &mut impl FnMut(&mut Self) -> Result<()>,
    ) -> Result<()> {
        self.skip_whitespace()?;
        if self.peek_byte()? != Some(b'[') {
            return Err(self.invalid("expected array"));
        }
        self.advance(1);
        self.skip_whitespace()?;
        if self.peek_byte()? == Some(b']') {
            self.advance(1);
            return Ok(());
        }
        loop {
            element(self)?;

            self.skip_whitespace()?;
            match self.peek_byte()? {
                Some(b',') => {
                    self.advance(1);
                    self.skip_whitespace()?;
                    if self.peek_byte()? == Some(b']') {
                        if !self.options.allow_legacy_syntax {
                            return Err(self.invalid("expected array element after ','"));
                        }
                        self.advance(1);
                        return Ok(());
                    }
                }
                Some(b']') => {
                    self.advance(1);
                    return Ok(());
                }
                Some(_) => return Err(self.invalid("expected ',' or ']' after array element")),
                None => return Err(self.invalid("unexpected EOF")),
            }
        }
    }

    /// Whether only whitespace remains in the input.
    pub(crate) fn at_eof(&mut self) -> Result<bool> {
        self.skip_whitespace()?;
        Ok(self.peek_byte()?.is_none())
    }

    fn push_depth(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Err(self.invalid("JSON content was too deeply nested"));
        }
        self.depth -= 1;
        Ok(())
    }

    fn pop_depth(&mut self) {
        self.depth += 1;
    }
}

/// Renders the standard error sentence with unstable whitespace.
fn render_error(path: &MessagePath, loc: JsonLocation, reason: &str) -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut seed = RandomState::new().build_hasher().finish() | 1;
    let mut space = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        if seed & 1 == 0 { " " } else { "  " }
    };

    let mut out = String::with_capacity(reason.len() + 64);
    let _ = write!(
        out,
        "invalid{}JSON in {path},{}near {}:{} (offset{}{}):{}{reason}",
        space(),
        space(),
        loc.line,
        loc.col,
        space(),
        loc.offset,
        space(),
    );
    out
}

#[cfg(test)]
mod tests;
