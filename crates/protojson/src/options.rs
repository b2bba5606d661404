#![allow(clippy::struct_excessive_bools)]

//! Configuration for the two translation directions.

/// Options controlling JSON → message parsing.
///
/// # Default
///
/// All flags default to `false`; `recursion_depth` defaults to `100`.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Whether unknown JSON object keys are skipped instead of rejected.
    ///
    /// The skipped value may be arbitrarily nested; it is discarded without
    /// being interpreted.
    ///
    /// # Default
    ///
    /// `false`
    pub ignore_unknown_fields: bool,

    /// Whether enum value names are matched with an ASCII case-insensitive
    /// comparison.
    ///
    /// # Default
    ///
    /// `false`
    pub case_insensitive_enum_parsing: bool,

    /// Whether the lexer and parser accept the legacy extensions of the
    /// original parser: single-quoted strings, bare object keys, `\U`
    /// unicode escapes, raw control characters in strings, trailing commas,
    /// scalars in place of single-element arrays, nested arrays flattened
    /// into their parent, and string-encoded booleans.
    ///
    /// # Default
    ///
    /// `false`
    pub allow_legacy_syntax: bool,

    /// Maximum nesting depth of objects and arrays before parsing fails.
    ///
    /// The same budget bounds parser recursion and lexer nesting.
    ///
    /// # Default
    ///
    /// `100`
    pub recursion_depth: u32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            ignore_unknown_fields: false,
            case_insensitive_enum_parsing: false,
            allow_legacy_syntax: false,
            recursion_depth: 100,
        }
    }
}

/// Options controlling message → JSON writing.
///
/// # Default
///
/// All flags default to `false`, which produces the compact canonical form.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Whether to pretty-print: a newline after `{`, `[` and `,`, plus
    /// two-space indentation.
    ///
    /// # Default
    ///
    /// `false`
    pub add_whitespace: bool,

    /// Whether singular primitive fields without explicit presence are
    /// printed even when set to their default value.
    ///
    /// # Default
    ///
    /// `false`
    pub always_print_primitive_fields: bool,

    /// Whether repeated and implicit-presence fields are printed even when
    /// empty.
    ///
    /// # Default
    ///
    /// `false`
    pub always_print_fields_with_no_presence: bool,

    /// Whether enum values are always printed as bare integers instead of
    /// their declared names.
    ///
    /// # Default
    ///
    /// `false`
    pub always_print_enums_as_ints: bool,

    /// Whether field keys use the declared field name instead of the JSON
    /// (lowerCamelCase) name.
    ///
    /// # Default
    ///
    /// `false`
    pub preserve_proto_field_names: bool,

    /// Whether 64-bit integers are printed unquoted when the value is
    /// exactly representable as a double.
    ///
    /// # Default
    ///
    /// `false`
    pub unquote_int64_if_possible: bool,

    /// Whether to reproduce the permissive defaults of the legacy writer:
    /// PascalCase output for declared names that start with an uppercase
    /// letter, `0` in place of non-finite defaults, and tolerance for `_`
    /// before a non-letter in `FieldMask` paths.
    ///
    /// # Default
    ///
    /// `false`
    pub allow_legacy_syntax: bool,
}
