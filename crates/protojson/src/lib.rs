//! A streaming, bidirectional JSON ⇄ binary wire-format codec for
//! schema-described messages.
//!
//! Messages are described by [`Descriptor`]s — either registered in an
//! in-memory [`DescriptorPool`] or fetched by type URL from a
//! [`SchemaResolver`] — and translated between their canonical JSON
//! rendering and the tagged binary wire format. The reflective entry
//! points ([`json_string_to_message`], [`message_to_json_string`]) operate
//! on a caller-owned [`DynamicMessage`]; the streaming entry points
//! ([`json_to_binary_stream`], [`binary_to_json_stream`]) translate
//! directly between byte streams without materializing a message tree on
//! the JSON-to-binary path.
//!
//! The fifteen `google.protobuf` well-known types (`Any`, `Value`,
//! `Struct`, `ListValue`, `Timestamp`, `Duration`, `FieldMask`, and the
//! wrappers) receive their canonical JSON shapes in both directions.
//!
//! ```
//! use protojson::{
//!     Descriptor, DescriptorPool, DynamicMessage, Field, Kind, ParseOptions, WriteOptions,
//!     json_string_to_message, message_to_json_string,
//! };
//!
//! # fn main() -> protojson::Result<()> {
//! let mut pool = DescriptorPool::with_well_known_types();
//! pool.add_message(Descriptor::new(
//!     "example.Greeting",
//!     vec![
//!         Field::new("text", 1, Kind::String),
//!         Field::new("count", 2, Kind::Int32),
//!     ],
//!     Vec::new(),
//! )?)?;
//!
//! let desc = pool.message_by_name("example.Greeting").unwrap();
//! let mut msg = DynamicMessage::new(desc);
//! json_string_to_message(
//!     &pool,
//!     r#"{"text": "hi", "count": 3}"#,
//!     &mut msg,
//!     &ParseOptions::default(),
//! )?;
//!
//! let json = message_to_json_string(&pool, &msg, &WriteOptions::default())?;
//! assert_eq!(json, r#"{"text":"hi","count":3}"#);
//! # Ok(())
//! # }
//! ```

mod descriptor;
mod error;
mod io;
mod lexer;
mod message;
mod options;
mod parse;
mod resolver;
mod wire;
mod write;

use std::sync::Arc;

use crate::descriptor::MessagePath;
use crate::io::ByteSink;
use crate::lexer::{JsonLexer, JsonLocation};
use crate::parse::backend::{ReflectiveMsg, ReflectiveParse, StreamingParse, WireMsg};
use crate::resolver::ResolverPool;
use crate::write::backend::{ReflectiveWrite, ResolverWrite};
use crate::write::json::JsonWriter;

pub use crate::descriptor::{
    Cardinality, DefaultValue, Descriptor, DescriptorPool, EnumDescriptor, Field, Kind,
};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::io::{Input, IterInput, Output, SliceInput, VecOutput};
pub use crate::message::{DynamicMessage, Value};
pub use crate::options::{ParseOptions, WriteOptions};
pub use crate::resolver::{
    EnumProto, FieldProto, MapResolver, SchemaResolver, TypeProto, null_value_enum_proto,
    well_known_type_protos,
};

/// Renders `message` as its canonical JSON string.
///
/// `pool` resolves nested message and enum types; it must contain every
/// type reachable from the message's descriptor.
pub fn message_to_json_string(
    pool: &DescriptorPool,
    message: &DynamicMessage,
    options: &WriteOptions,
) -> Result<String> {
    let mut out = VecOutput::new();
    let backend = ReflectiveWrite { pool };
    let mut writer = JsonWriter::new(&mut out, *options);
    write::write_json(&mut writer, &backend, message)?;
    writer.new_line();
    writer.finish()?;
    String::from_utf8(out.into_bytes()).map_err(|_| Error::internal("writer emitted invalid UTF-8"))
}

/// Parses a JSON string into `message`.
///
/// On failure the message is left in whatever partially-populated state
/// the parse reached; callers are expected to discard it.
pub fn json_string_to_message(
    pool: &DescriptorPool,
    text: &str,
    message: &mut DynamicMessage,
    options: &ParseOptions,
) -> Result<()> {
    let mut input = SliceInput::new(text.as_bytes());
    json_stream_to_message(pool, &mut input, message, options)
}

/// Parses a JSON byte stream into `message`.
pub fn json_stream_to_message(
    pool: &DescriptorPool,
    input: &mut dyn Input,
    message: &mut DynamicMessage,
    options: &ParseOptions,
) -> Result<()> {
    let desc = Arc::clone(message.descriptor());
    let path = MessagePath::new(desc.full_name());
    let mut lex = JsonLexer::new(input, *options, path, JsonLocation::default());
    let backend = ReflectiveParse { pool };
    let target = std::mem::replace(message, DynamicMessage::new(Arc::clone(&desc)));
    let mut state = ReflectiveMsg::new(target);
    let result = parse::parse_json(&mut lex, &backend, &desc, &mut state);
    *message = state.into_message();
    result
}

/// Reads the binary wire format of `type_url` from `input` and writes its
/// canonical JSON rendering to `output`.
///
/// Types are fetched on demand from `resolver` and cached for the
/// duration of the call.
pub fn binary_to_json_stream(
    resolver: &dyn SchemaResolver,
    type_url: &str,
    input: &mut dyn Input,
    output: &mut dyn Output,
    options: &WriteOptions,
) -> Result<()> {
    let pool = ResolverPool::new(resolver);
    let desc = pool.find_message(type_url)?;
    let bytes = read_all(input)?;
    let message = wire::decode_message(&desc, &pool, &bytes)?;

    let backend = ResolverWrite { pool: &pool };
    let mut writer = JsonWriter::new(output, *options);
    write::write_json(&mut writer, &backend, &message)?;
    writer.new_line();
    writer.finish()
}

/// Reads JSON from `input` and writes the binary wire format of
/// `type_url` to `output`.
pub fn json_to_binary_stream(
    resolver: &dyn SchemaResolver,
    type_url: &str,
    input: &mut dyn Input,
    output: &mut dyn Output,
    options: &ParseOptions,
) -> Result<()> {
    let pool = ResolverPool::new(resolver);
    let desc = pool.find_message(type_url)?;
    let path = MessagePath::new(type_url);
    let mut lex = JsonLexer::new(input, *options, path, JsonLocation::default());
    let backend = StreamingParse { pool: &pool };
    let mut message = WireMsg::new();
    parse::parse_json(&mut lex, &backend, &desc, &mut message)?;
    ByteSink::new(output).append(&message.into_bytes())
}

/// Convenience wrapper over [`binary_to_json_stream`] for in-memory data.
pub fn binary_to_json_string(
    resolver: &dyn SchemaResolver,
    type_url: &str,
    binary: &[u8],
    options: &WriteOptions,
) -> Result<String> {
    let mut input = SliceInput::new(binary);
    let mut out = VecOutput::new();
    binary_to_json_stream(resolver, type_url, &mut input, &mut out, options)?;
    String::from_utf8(out.into_bytes()).map_err(|_| Error::internal("writer emitted invalid UTF-8"))
}

/// Convenience wrapper over [`json_to_binary_stream`] for in-memory data.
pub fn json_to_binary_string(
    resolver: &dyn SchemaResolver,
    type_url: &str,
    json: &str,
    options: &ParseOptions,
) -> Result<Vec<u8>> {
    let mut input = SliceInput::new(json.as_bytes());
    let mut out = VecOutput::new();
    json_to_binary_stream(resolver, type_url, &mut input, &mut out, options)?;
    Ok(out.into_bytes())
}

fn read_all(input: &mut dyn Input) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    while input.poll()? {
        let len = input.chunk().len();
        out.extend_from_slice(input.chunk());
        input.consume(len);
    }
    Ok(out)
}
