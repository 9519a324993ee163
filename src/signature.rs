//! The D-Bus type-signature mini-language: parsing a signature string into a
//! structured [`Type`], and rendering a [`Type`] back into a signature.

use std::fmt;

use crate::error::{Error, ErrorKind};

/// Maximum length of a signature string, per the D-Bus specification.
pub const MAX_SIGNATURE_LENGTH: usize = 255;
/// Maximum nesting depth for arrays and for structs, tracked independently,
/// per the D-Bus specification.
pub const MAX_DEPTH: usize = 32;

/// An error produced while parsing or rendering a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureError(pub(crate) String);

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid signature: {}", self.0)
    }
}

impl std::error::Error for SignatureError {}

impl From<SignatureError> for Error {
    fn from(error: SignatureError) -> Self {
        Error::new(ErrorKind::InvalidSignature(error.0.into()))
    }
}

/// The shape of a D-Bus value.
///
/// This is the structured counterpart of a signature string: [`Type::parse`]
/// turns a string into one of these, and [`Type::render`] turns it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// `y` — 8-bit unsigned integer.
    Byte,
    /// `b` — boolean.
    Boolean,
    /// `n` — 16-bit signed integer.
    Int16,
    /// `q` — 16-bit unsigned integer.
    Uint16,
    /// `i` — 32-bit signed integer.
    Int32,
    /// `u` — 32-bit unsigned integer.
    Uint32,
    /// `x` — 64-bit signed integer.
    Int64,
    /// `t` — 64-bit unsigned integer.
    Uint64,
    /// `d` — IEEE-754 double.
    Double,
    /// `s` — UTF-8 string.
    String,
    /// `o` — object path.
    ObjectPath,
    /// `g` — signature.
    Signature,
    /// `a` + element type — homogeneous array.
    Array(Box<Type>),
    /// `v` — a value tagged with its own type at runtime.
    Variant,
    /// `(...)` — heterogeneous fixed tuple of one or more fields.
    Struct(Vec<Type>),
    /// `{..}` — a key/value pair; only valid as an array's element type.
    DictEntry(Box<Type>, Box<Type>),
    /// Not a real D-Bus type: a synthetic sequence of top-level types, used
    /// when a signature describes a message body with more than one
    /// argument.
    Tuple(Vec<Type>),
}

impl Type {
    /// The alignment in bytes this type's first byte must start at,
    /// measured from the message origin.
    pub fn alignment(&self) -> usize {
        match self {
            Type::Byte | Type::Signature | Type::Variant => 1,
            Type::Int16 | Type::Uint16 => 2,
            Type::Boolean
            | Type::Int32
            | Type::Uint32
            | Type::String
            | Type::ObjectPath
            | Type::Array(_) => 4,
            Type::Int64
            | Type::Uint64
            | Type::Double
            | Type::Struct(_)
            | Type::DictEntry(..) => 8,
            Type::Tuple(_) => 1,
        }
    }

    /// Parse a signature string into a structured type.
    ///
    /// An empty signature parses to `Tuple(vec![])`, which read/write treat
    /// as the unit value. A signature with exactly one top-level type
    /// returns that type bare. A signature with more than one top-level type
    /// is wrapped in [`Type::Tuple`].
    pub fn parse(sig: &str) -> Result<Type, SignatureError> {
        if sig.len() > MAX_SIGNATURE_LENGTH {
            return Err(SignatureError(format!(
                "signature of length {} exceeds {MAX_SIGNATURE_LENGTH}",
                sig.len()
            )));
        }

        let bytes = sig.as_bytes();
        let mut parser = Parser { bytes, pos: 0 };

        let mut top_level = Vec::new();

        while parser.pos < parser.bytes.len() {
            top_level.push(parser.parse_one(0, 0)?);
        }

        Ok(match top_level.len() {
            1 => top_level.into_iter().next().unwrap(),
            _ => Type::Tuple(top_level),
        })
    }

    /// Render this type back into a signature string.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        match self {
            Type::Byte => out.push('y'),
            Type::Boolean => out.push('b'),
            Type::Int16 => out.push('n'),
            Type::Uint16 => out.push('q'),
            Type::Int32 => out.push('i'),
            Type::Uint32 => out.push('u'),
            Type::Int64 => out.push('x'),
            Type::Uint64 => out.push('t'),
            Type::Double => out.push('d'),
            Type::String => out.push('s'),
            Type::ObjectPath => out.push('o'),
            Type::Signature => out.push('g'),
            Type::Variant => out.push('v'),
            Type::Array(element) => {
                out.push('a');
                element.render_into(out);
            }
            Type::Struct(fields) => {
                out.push('(');
                for field in fields {
                    field.render_into(out);
                }
                out.push(')');
            }
            Type::DictEntry(key, value) => {
                out.push('{');
                key.render_into(out);
                value.render_into(out);
                out.push('}');
            }
            Type::Tuple(fields) => {
                for field in fields {
                    field.render_into(out);
                }
            }
        }
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Parse exactly one complete type, starting at the current position.
    ///
    /// `array_depth`/`struct_depth` track nesting independently so deeply
    /// recursive signatures can be rejected before they blow the stack.
    fn parse_one(&mut self, array_depth: usize, struct_depth: usize) -> Result<Type, SignatureError> {
        let Some(byte) = self.bump() else {
            return Err(SignatureError("unexpected end of signature".into()));
        };

        Ok(match byte {
            b'y' => Type::Byte,
            b'b' => Type::Boolean,
            b'n' => Type::Int16,
            b'q' => Type::Uint16,
            b'i' => Type::Int32,
            b'u' => Type::Uint32,
            b'x' => Type::Int64,
            b't' => Type::Uint64,
            b'd' => Type::Double,
            b's' => Type::String,
            b'o' => Type::ObjectPath,
            b'g' => Type::Signature,
            b'v' => Type::Variant,
            b'a' => {
                if array_depth + 1 > MAX_DEPTH {
                    return Err(SignatureError("array nesting too deep".into()));
                }

                let element = if self.peek() == Some(b'{') {
                    self.bump();
                    self.parse_dict_entry(array_depth + 1, struct_depth)?
                } else {
                    self.parse_one(array_depth + 1, struct_depth)?
                };

                Type::Array(Box::new(element))
            }
            b'(' => {
                if struct_depth + 1 > MAX_DEPTH {
                    return Err(SignatureError("struct nesting too deep".into()));
                }

                let mut fields = Vec::new();

                while self.peek() != Some(b')') {
                    if self.peek().is_none() {
                        return Err(SignatureError("unterminated struct".into()));
                    }

                    fields.push(self.parse_one(array_depth, struct_depth + 1)?);
                }

                self.bump();

                if fields.is_empty() {
                    return Err(SignatureError("struct must have at least one field".into()));
                }

                Type::Struct(fields)
            }
            b'{' => {
                // A dict-entry is only reachable through parse_one when
                // called from the `a` arm above; a top-level or
                // struct-nested `{` is a context violation.
                return Err(SignatureError(
                    "dict-entry is only valid as an array element".into(),
                ));
            }
            other => {
                return Err(SignatureError(format!(
                    "unknown type code `{}`",
                    other as char
                )))
            }
        })
    }
}

/// Parsing of `a{...}` goes through this dedicated path instead of the
/// generic `parse_one`, since `{` is only legal directly after `a`.
impl<'a> Parser<'a> {
    fn parse_dict_entry(&mut self, array_depth: usize, struct_depth: usize) -> Result<Type, SignatureError> {
        let key = self.parse_one(array_depth, struct_depth)?;

        if !matches!(
            key,
            Type::Byte
                | Type::Boolean
                | Type::Int16
                | Type::Uint16
                | Type::Int32
                | Type::Uint32
                | Type::Int64
                | Type::Uint64
                | Type::Double
                | Type::String
                | Type::ObjectPath
                | Type::Signature
        ) {
            return Err(SignatureError("dict-entry key must be a basic type".into()));
        }

        let value = self.parse_one(array_depth, struct_depth)?;

        if self.bump() != Some(b'}') {
            return Err(SignatureError("unterminated dict-entry".into()));
        }

        Ok(Type::DictEntry(Box::new(key), Box::new(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::Arbitrary;

    #[test]
    fn parses_atomic_types() {
        assert_eq!(Type::parse("y").unwrap(), Type::Byte);
        assert_eq!(Type::parse("s").unwrap(), Type::String);
        assert_eq!(Type::parse("v").unwrap(), Type::Variant);
    }

    #[test]
    fn parses_array_and_struct() {
        assert_eq!(
            Type::parse("a(su)").unwrap(),
            Type::Array(Box::new(Type::Struct(vec![Type::String, Type::Uint32])))
        );
    }

    #[test]
    fn parses_dict_entry_only_inside_array() {
        assert_eq!(
            Type::parse("a{sv}").unwrap(),
            Type::Array(Box::new(Type::DictEntry(
                Box::new(Type::String),
                Box::new(Type::Variant)
            )))
        );

        assert!(Type::parse("{sv}").is_err());
    }

    #[test]
    fn empty_signature_is_unit_tuple() {
        assert_eq!(Type::parse("").unwrap(), Type::Tuple(vec![]));
    }

    #[test]
    fn multiple_top_level_types_become_a_tuple() {
        assert_eq!(
            Type::parse("su").unwrap(),
            Type::Tuple(vec![Type::String, Type::Uint32])
        );
    }

    #[test]
    fn render_round_trips_through_parse() {
        for sig in ["y", "b", "as", "a(su)", "a{sv}", "(yyv)", "su"] {
            let ty = Type::parse(sig).unwrap();
            let rendered = ty.render();
            let reparsed = Type::parse(&rendered).unwrap();
            assert_eq!(ty, reparsed, "signature `{sig}` did not round-trip");
        }
    }

    #[test]
    fn rejects_unbalanced_brackets() {
        assert!(Type::parse("(s").is_err());
        assert!(Type::parse("s)").is_err());
        assert!(Type::parse("a{s}").is_err());
    }

    #[quickcheck_macros::quickcheck]
    fn render_then_parse_is_identity(ty: ArbitraryType) -> bool {
        let ty = ty.0;
        Type::parse(&ty.render()).as_ref() == Ok(&ty)
    }

    /// A depth-bounded wrapper so `quickcheck::Arbitrary` cannot generate
    /// signatures past [`MAX_DEPTH`].
    #[derive(Debug, Clone)]
    struct ArbitraryType(Type);

    impl quickcheck::Arbitrary for ArbitraryType {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            ArbitraryType(arbitrary_type(g, 4))
        }
    }

    fn arbitrary_type(g: &mut quickcheck::Gen, depth: usize) -> Type {
        let basic = [
            Type::Byte,
            Type::Boolean,
            Type::Int16,
            Type::Uint16,
            Type::Int32,
            Type::Uint32,
            Type::Int64,
            Type::Uint64,
            Type::Double,
            Type::String,
            Type::ObjectPath,
            Type::Signature,
            Type::Variant,
        ];

        if depth == 0 {
            return g.choose(&basic).unwrap().clone();
        }

        match u32::arbitrary(g) % 4 {
            0 => Type::Array(Box::new(arbitrary_type(g, depth - 1))),
            1 => Type::Struct(vec![
                arbitrary_type(g, depth - 1),
                arbitrary_type(g, depth - 1),
            ]),
            2 => Type::DictEntry(
                Box::new(g.choose(&basic).unwrap().clone()),
                Box::new(arbitrary_type(g, depth - 1)),
            ),
            _ => g.choose(&basic).unwrap().clone(),
        }
        .pipe_array_wrap_dict_entry()
    }

    trait PipeArrayWrapDictEntry {
        fn pipe_array_wrap_dict_entry(self) -> Type;
    }

    impl PipeArrayWrapDictEntry for Type {
        /// A `DictEntry` can only legally occur as an array element; wrap it
        /// if the generator produced one at top level.
        fn pipe_array_wrap_dict_entry(self) -> Type {
            match self {
                Type::DictEntry(..) => Type::Array(Box::new(self)),
                other => other,
            }
        }
    }
}

