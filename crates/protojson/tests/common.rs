//! Shared schema and helpers for the integration tests.
#![allow(dead_code)]

use protojson::{
    Descriptor, DescriptorPool, DynamicMessage, EnumDescriptor, EnumProto, Field, FieldProto,
    Kind, MapResolver, ParseOptions, TypeProto, WriteOptions, json_string_to_message,
    message_to_json_string, null_value_enum_proto, well_known_type_protos,
};

/// A pool holding the well-known types plus the test schema:
///
/// - `test.AllTypes` with one field of every kind, repeated fields, maps,
///   a oneof, and an optional field;
/// - `test.Nested`, `test.Color`;
/// - the `test.nickname` extension of `test.AllTypes`.
pub fn pool() -> DescriptorPool {
    let mut pool = DescriptorPool::with_well_known_types();

    pool.add_enum(EnumDescriptor::new(
        "test.Color",
        vec![
            ("RED".to_owned(), 0),
            ("GREEN".to_owned(), 1),
            ("BLUE".to_owned(), 2),
        ],
    ))
    .unwrap();

    pool.add_message(
        Descriptor::new(
            "test.Nested",
            vec![
                Field::new("x", 1, Kind::Int32),
                Field::new("y", 2, Kind::String),
            ],
            Vec::new(),
        )
        .unwrap(),
    )
    .unwrap();

    pool.add_message(
        Descriptor::map_entry(
            "test.AllTypes.IntsEntry",
            Field::new("key", 1, Kind::Int32),
            Field::new("value", 2, Kind::Int32),
        )
        .unwrap(),
    )
    .unwrap();

    pool.add_message(
        Descriptor::map_entry(
            "test.AllTypes.ByNameEntry",
            Field::new("key", 1, Kind::String),
            Field::message("value", 2, "test.Nested"),
        )
        .unwrap(),
    )
    .unwrap();

    pool.add_message(
        Descriptor::map_entry(
            "test.AllTypes.ColorsEntry",
            Field::new("key", 1, Kind::String),
            Field::enumeration("value", 2, "test.Color"),
        )
        .unwrap(),
    )
    .unwrap();

    pool.add_message(
        Descriptor::new(
            "test.AllTypes",
            vec![
                Field::new("i32", 1, Kind::Int32),
                Field::new("i64", 2, Kind::Int64),
                Field::new("u32", 3, Kind::Uint32),
                Field::new("u64", 4, Kind::Uint64),
                Field::new("s32", 5, Kind::Sint32),
                Field::new("s64", 6, Kind::Sint64),
                Field::new("fx32", 7, Kind::Fixed32),
                Field::new("fx64", 8, Kind::Fixed64),
                Field::new("sfx32", 9, Kind::Sfixed32),
                Field::new("sfx64", 10, Kind::Sfixed64),
                Field::new("fl", 11, Kind::Float),
                Field::new("db", 12, Kind::Double),
                Field::new("flag", 13, Kind::Bool),
                Field::new("text", 14, Kind::String),
                Field::new("data", 15, Kind::Bytes),
                Field::enumeration("color", 16, "test.Color"),
                Field::message("nested", 17, "test.Nested"),
                Field::new("rep_i32", 18, Kind::Int32).repeated(),
                Field::new("rep_text", 19, Kind::String).repeated(),
                Field::map("ints", 20, "test.AllTypes.IntsEntry"),
                Field::map("by_name", 21, "test.AllTypes.ByNameEntry"),
                Field::new("pick_a", 22, Kind::Int32).in_oneof(0),
                Field::new("pick_b", 23, Kind::String).in_oneof(0),
                Field::new("opt", 24, Kind::Int32).optional(),
                Field::message("rep_nested", 25, "test.Nested").repeated(),
                Field::map("colors", 26, "test.AllTypes.ColorsEntry"),
                Field::group("grp", 27, "test.Nested"),
            ],
            vec!["pick".to_owned()],
        )
        .unwrap(),
    )
    .unwrap();

    pool.add_extension(
        Field::new("test.nickname", 100, Kind::String).extension_of("test.AllTypes"),
    )
    .unwrap();

    pool.add_message(
        Descriptor::new(
            "test.Holder",
            vec![
                Field::message("val", 1, "google.protobuf.Value"),
                Field::message("st", 2, "google.protobuf.Struct"),
                Field::message("lst", 3, "google.protobuf.ListValue"),
                Field::message("any", 4, "google.protobuf.Any"),
                Field::message("ts", 5, "google.protobuf.Timestamp"),
                Field::message("dur", 6, "google.protobuf.Duration"),
                Field::message("mask", 7, "google.protobuf.FieldMask"),
                Field::message("wd", 8, "google.protobuf.DoubleValue"),
                Field::message("wi", 9, "google.protobuf.Int64Value"),
                Field::message("ws", 10, "google.protobuf.StringValue"),
                Field::message("rep_val", 11, "google.protobuf.Value").repeated(),
                Field::enumeration("null", 12, "google.protobuf.NullValue"),
            ],
            Vec::new(),
        )
        .unwrap(),
    )
    .unwrap();

    pool
}

/// A schema service mirroring [`pool`], for the streaming back-ends.
pub fn resolver() -> MapResolver {
    let mut resolver = MapResolver::new();
    for proto in well_known_type_protos() {
        resolver.add_type(proto);
    }
    resolver.add_enum(null_value_enum_proto());

    resolver.add_enum(EnumProto {
        name: "test.Color".to_owned(),
        values: vec![
            ("RED".to_owned(), 0),
            ("GREEN".to_owned(), 1),
            ("BLUE".to_owned(), 2),
        ],
    });

    resolver.add_type(TypeProto {
        name: "test.Nested".to_owned(),
        fields: vec![
            FieldProto::new("x", 1, Kind::Int32),
            FieldProto::new("y", 2, Kind::String),
        ],
        oneofs: Vec::new(),
        map_entry: false,
    });

    resolver.add_type(TypeProto {
        name: "test.Pair".to_owned(),
        fields: vec![
            FieldProto::new("int32_value", 1, Kind::Int32),
            FieldProto::new("bool_value", 13, Kind::Bool),
        ],
        oneofs: Vec::new(),
        map_entry: false,
    });

    resolver.add_type(TypeProto {
        name: "test.Various".to_owned(),
        fields: vec![
            FieldProto::new("text", 1, Kind::String),
            {
                let mut f = FieldProto::new("rep", 2, Kind::Int32);
                f.cardinality = protojson::Cardinality::Repeated;
                f
            },
            {
                let mut f = FieldProto::new("nested", 3, Kind::Message);
                f.type_url = "test.example.com/test.Nested".to_owned();
                f
            },
            {
                let mut f = FieldProto::new("color", 4, Kind::Enum);
                f.type_url = "test.example.com/test.Color".to_owned();
                f
            },
            {
                let mut f = FieldProto::new("ints", 5, Kind::Message);
                f.type_url = "test.example.com/test.Various.IntsEntry".to_owned();
                f.cardinality = protojson::Cardinality::Repeated;
                f.map = true;
                f
            },
            FieldProto::new("zz", 6, Kind::Sint64),
        ],
        oneofs: Vec::new(),
        map_entry: false,
    });

    resolver.add_type(TypeProto {
        name: "test.Various.IntsEntry".to_owned(),
        fields: vec![
            FieldProto::new("key", 1, Kind::Int32),
            FieldProto::new("value", 2, Kind::Int32),
        ],
        oneofs: Vec::new(),
        map_entry: true,
    });

    resolver
}

pub fn new_message(pool: &DescriptorPool, name: &str) -> DynamicMessage {
    DynamicMessage::new(pool.message_by_name(name).expect("type registered"))
}

pub fn parse_into(
    pool: &DescriptorPool,
    name: &str,
    json: &str,
    options: &ParseOptions,
) -> protojson::Result<DynamicMessage> {
    let mut msg = new_message(pool, name);
    json_string_to_message(pool, json, &mut msg, options)?;
    Ok(msg)
}

pub fn parse(pool: &DescriptorPool, name: &str, json: &str) -> protojson::Result<DynamicMessage> {
    parse_into(pool, name, json, &ParseOptions::default())
}

pub fn parse_legacy(
    pool: &DescriptorPool,
    name: &str,
    json: &str,
) -> protojson::Result<DynamicMessage> {
    parse_into(
        pool,
        name,
        json,
        &ParseOptions {
            allow_legacy_syntax: true,
            ..ParseOptions::default()
        },
    )
}

pub fn write(pool: &DescriptorPool, msg: &DynamicMessage) -> String {
    message_to_json_string(pool, msg, &WriteOptions::default()).expect("write succeeds")
}

/// Compares two JSON documents semantically.
pub fn assert_json_eq(actual: &str, expected: &str) {
    let a: serde_json::Value = serde_json::from_str(actual).expect("actual is valid JSON");
    let b: serde_json::Value = serde_json::from_str(expected).expect("expected is valid JSON");
    assert_eq!(a, b, "actual: {actual}");
}
