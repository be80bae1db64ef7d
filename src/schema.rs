//! The schema type algebra.
//!
//! A topic's schema fixes the binary interpretation of the opaque data bytes
//! of every datum appended to it. Schemas are a small tagged algebra: scalar
//! types, fixed-length arrays of fixed-width scalars, and string-keyed
//! composites. The textual grammar is
//!
//! ```text
//! schema    := type | array | composite
//! type      := "boolean" | "string" | "binary" | intN | uintN | floatN
//! array     := "[" integer "]" type
//! composite := "{" (key ":" schema ",")* "}"
//! ```

mod codec;
mod parse;

pub use codec::{decode_value, encode_value};

/// One of the closed set of scalar type names.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScalarType {
    /// A single byte, 0 or 1.
    Boolean,
    /// Variable-width UTF-8 text.
    String,
    /// Variable-width raw bytes; textual literals are base64.
    Binary,
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 8-bit integer.
    Uint8,
    /// Unsigned 16-bit integer.
    Uint16,
    /// Unsigned 32-bit integer.
    Uint32,
    /// Unsigned 64-bit integer.
    Uint64,
    /// IEEE 754 single-precision float.
    Float32,
    /// IEEE 754 double-precision float.
    Float64,
}

impl ScalarType {
    /// Resolves a type keyword, or `None` if the keyword is not in the
    /// closed scalar set.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "boolean" => Self::Boolean,
            "string" => Self::String,
            "binary" => Self::Binary,
            "int8" => Self::Int8,
            "int16" => Self::Int16,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint8" => Self::Uint8,
            "uint16" => Self::Uint16,
            "uint32" => Self::Uint32,
            "uint64" => Self::Uint64,
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            _ => return None,
        })
    }

    /// The keyword this scalar renders as.
    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Binary => "binary",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// Binary width in bytes, or `None` for the variable-width scalars.
    pub fn width(self) -> Option<usize> {
        match self {
            Self::Boolean | Self::Int8 | Self::Uint8 => Some(1),
            Self::Int16 | Self::Uint16 => Some(2),
            Self::Int32 | Self::Uint32 | Self::Float32 => Some(4),
            Self::Int64 | Self::Uint64 | Self::Float64 => Some(8),
            Self::String | Self::Binary => None,
        }
    }

    /// Whether values of this scalar participate in arithmetic.
    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::Boolean | Self::String | Self::Binary)
    }

    /// Whether this is one of the float types.
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Whether this is one of the signed integer types.
    pub fn is_signed_int(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    /// The numeric widening of two scalars: float wins over int, the wider
    /// width wins, and a signed/unsigned width tie widens to signed.
    pub fn widen(self, other: Self) -> Self {
        if self == other {
            return self;
        }
        if self.is_float() || other.is_float() {
            return if self == Self::Float32 && other == Self::Float32 {
                Self::Float32
            } else {
                Self::Float64
            };
        }
        let width = self
            .width()
            .unwrap_or(8)
            .max(other.width().unwrap_or(8));
        let signed = self.is_signed_int() || other.is_signed_int();
        match (width, signed) {
            (1, false) => Self::Uint8,
            (2, false) => Self::Uint16,
            (4, false) => Self::Uint32,
            (8, false) => Self::Uint64,
            (1, true) => Self::Int8,
            (2, true) => Self::Int16,
            (4, true) => Self::Int32,
            _ => Self::Int64,
        }
    }
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A schema object: the tagged description of a topic's value encoding.
#[derive(Clone, Debug, PartialEq)]
pub enum Schema {
    /// Schema of data nothing is known about.
    Unknown,
    /// A single scalar.
    Type(ScalarType),
    /// `length` fixed-width scalars, concatenated.
    Array {
        /// Number of elements.
        length: usize,
        /// Element type; string and binary are forbidden here.
        elem: ScalarType,
    },
    /// String-keyed fields, serialized in key-sorted order. `keys` and
    /// `values` are parallel; keys are unique and sorted lexicographically.
    Composite {
        /// Sorted, unique field names.
        keys: Vec<String>,
        /// Field schemas, parallel to `keys`; each is a type or an array.
        values: Vec<Schema>,
    },
}

impl Schema {
    /// Parses a schema string. See the module docs for the grammar.
    pub fn parse(input: &str) -> crate::FossilResult<Self> {
        parse::parse(input)
    }

    /// The fixed binary size of a value, or `None` when the schema contains
    /// a variable-width field.
    pub fn size(&self) -> Option<usize> {
        match self {
            Self::Unknown => None,
            Self::Type(t) => t.width(),
            Self::Array { length, elem } => Some(length * elem.width()?),
            Self::Composite { values, .. } => {
                let mut total = 0;
                for value in values {
                    total += value.size()?;
                }
                Some(total)
            }
        }
    }

    /// Whether values of this schema participate in arithmetic.
    pub fn is_numeric(&self) -> bool {
        match self {
            Self::Type(t) => t.is_numeric(),
            _ => false,
        }
    }

    /// Structurally checks `data` against this schema without decoding it.
    pub fn validate(&self, data: &[u8]) -> bool {
        match self {
            Self::Unknown => false,
            Self::Type(t) => match t.width() {
                Some(w) => data.len() == w,
                None => true,
            },
            Self::Array { .. } => self.size().is_some_and(|s| data.len() == s),
            Self::Composite { values, .. } => {
                let mut pos = 0;
                for value in values {
                    match value.size() {
                        Some(w) => pos += w,
                        None => {
                            // u32 length prefix for string/binary fields
                            let Some(prefix) = data.get(pos..pos + 4) else {
                                return false;
                            };
                            let len =
                                u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
                            pos += 4 + len as usize;
                        }
                    }
                    if pos > data.len() {
                        return false;
                    }
                }
                pos == data.len()
            }
        }
    }
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Type(t) => f.write_str(t.name()),
            Self::Array { length, elem } => write!(f, "[{length}]{elem}"),
            Self::Composite { keys, values } => {
                f.write_str("{")?;
                for (key, value) in keys.iter().zip(values) {
                    write!(f, "\"{key}\": {value},")?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widen_prefers_float_and_width() {
        assert_eq!(ScalarType::Int8.widen(ScalarType::Float32), ScalarType::Float64);
        assert_eq!(ScalarType::Float32.widen(ScalarType::Float32), ScalarType::Float32);
        assert_eq!(ScalarType::Int16.widen(ScalarType::Uint32), ScalarType::Int32);
        assert_eq!(ScalarType::Uint8.widen(ScalarType::Uint16), ScalarType::Uint16);
        assert_eq!(ScalarType::Int64.widen(ScalarType::Uint64), ScalarType::Int64);
    }

    #[test]
    fn sizes() {
        assert_eq!(Schema::Type(ScalarType::Boolean).size(), Some(1));
        assert_eq!(Schema::Type(ScalarType::String).size(), None);
        assert_eq!(
            Schema::Array {
                length: 3,
                elem: ScalarType::Int32
            }
            .size(),
            Some(12)
        );
    }

    #[test]
    fn validate_composite_with_var_width_field() {
        let schema = Schema::Composite {
            keys: vec!["key".to_string(), "value".to_string()],
            values: vec![
                Schema::Type(ScalarType::String),
                Schema::Type(ScalarType::Int64),
            ],
        };
        // "id" with length prefix, then an int64
        let mut data = 2u32.to_le_bytes().to_vec();
        data.extend_from_slice(b"id");
        data.extend_from_slice(&1i64.to_le_bytes());
        assert!(schema.validate(&data));
        data.pop();
        assert!(!schema.validate(&data));
    }
}
