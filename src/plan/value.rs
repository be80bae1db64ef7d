//! Runtime values and their codecs.
//!
//! Arithmetic and comparison upcast via the complexity order
//! `Unknown < Boolean < String < Int < Float`: the lower-complexity operand
//! is promoted to the higher, then the operation runs in that domain.

use crate::query::BinaryOp;
use crate::schema::{ScalarType, Schema};
use crate::{FossilError, FossilResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;
use std::io::Cursor;

/// A value flowing through the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Unknown,
    Boolean(bool),
    String(String),
    Int(i64),
    Float(f64),
    Tuple(Vec<Value>),
    Composite(BTreeMap<String, Value>),
}

impl Value {
    fn complexity(&self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Boolean(_) => 1,
            Self::String(_) => 2,
            Self::Int(_) => 3,
            Self::Float(_) => 4,
            Self::Tuple(_) => 5,
            Self::Composite(_) => 6,
        }
    }

    /// Whether a filter forwards on this value.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Boolean(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Boolean(_) => "boolean",
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Tuple(_) => "tuple",
            Self::Composite(_) => "composite",
        }
    }

    fn as_int(&self) -> FossilResult<i64> {
        match self {
            Self::Boolean(b) => Ok(i64::from(*b)),
            Self::Int(i) => Ok(*i),
            #[allow(clippy::cast_possible_truncation)]
            Self::Float(f) => Ok(*f as i64),
            Self::String(s) => s
                .parse()
                .map_err(|_| FossilError::Query(format!("{s:?} is not an integer"))),
            other => Err(FossilError::Query(format!(
                "cannot use a {} as an integer",
                other.type_name()
            ))),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_float(&self) -> FossilResult<f64> {
        match self {
            Self::Boolean(b) => Ok(f64::from(u8::from(*b))),
            Self::Int(i) => Ok(*i as f64),
            Self::Float(f) => Ok(*f),
            Self::String(s) => s
                .parse()
                .map_err(|_| FossilError::Query(format!("{s:?} is not a float"))),
            other => Err(FossilError::Query(format!(
                "cannot use a {} as a float",
                other.type_name()
            ))),
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Unknown => "unknown".to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::String(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Tuple(_) | Self::Composite(_) => format!("{self:?}"),
        }
    }

    /// Applies a binary operator after upcasting both operands to the
    /// domain of the more complex one. `/` always runs in the float
    /// domain.
    pub fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> FossilResult<Value> {
        if op == BinaryOp::Div {
            return Ok(Value::Float(lhs.as_float()? / rhs.as_float()?));
        }
        if matches!(lhs, Value::Tuple(_) | Value::Composite(_))
            || matches!(rhs, Value::Tuple(_) | Value::Composite(_))
        {
            return Err(FossilError::Query(format!(
                "operator requires scalars, got {} and {}",
                lhs.type_name(),
                rhs.type_name()
            )));
        }
        let domain = lhs.complexity().max(rhs.complexity());
        match domain {
            // float domain
            4 => {
                let (a, b) = (lhs.as_float()?, rhs.as_float()?);
                Ok(match op {
                    BinaryOp::Add => Value::Float(a + b),
                    BinaryOp::Sub => Value::Float(a - b),
                    BinaryOp::Mul => Value::Float(a * b),
                    other => Value::Boolean(compare(other, &a.partial_cmp(&b))?),
                })
            }
            // int domain
            3 => {
                let (a, b) = (lhs.as_int()?, rhs.as_int()?);
                Ok(match op {
                    BinaryOp::Add => Value::Int(a.wrapping_add(b)),
                    BinaryOp::Sub => Value::Int(a.wrapping_sub(b)),
                    BinaryOp::Mul => Value::Int(a.wrapping_mul(b)),
                    other => Value::Boolean(compare(other, &Some(a.cmp(&b)))?),
                })
            }
            // string domain
            2 => {
                let (a, b) = (lhs.render(), rhs.render());
                Ok(match op {
                    BinaryOp::Add => Value::String(format!("{a}{b}")),
                    BinaryOp::Sub | BinaryOp::Mul => {
                        return Err(FossilError::Query(
                            "cannot do arithmetic on strings".to_string(),
                        ));
                    }
                    other => Value::Boolean(compare(other, &Some(a.cmp(&b)))?),
                })
            }
            // boolean domain
            1 => match (lhs, rhs, op) {
                (Value::Boolean(a), Value::Boolean(b), BinaryOp::Eq) => Ok(Value::Boolean(a == b)),
                (Value::Boolean(a), Value::Boolean(b), BinaryOp::Ne) => Ok(Value::Boolean(a != b)),
                (Value::Boolean(_), Value::Boolean(_), _) => Err(FossilError::Query(
                    "booleans only support equality".to_string(),
                )),
                _ => Err(FossilError::Query(
                    "cannot operate on unknown values".to_string(),
                )),
            },
            _ => Err(FossilError::Query(
                "cannot operate on unknown values".to_string(),
            )),
        }
    }

    /// Materializes a value from an entry's schema and data bytes.
    pub fn from_entry(schema: &Schema, data: &[u8]) -> FossilResult<Value> {
        let mut rdr = Cursor::new(data);
        let value = decode(schema, &mut rdr, data)?;
        Ok(value)
    }

    /// Serializes a value back into `(schema string, data bytes)`.
    ///
    /// Tuples serialize only when homogeneous over a fixed-width scalar;
    /// anything else is an error the caller materializes as a `string`
    /// entry carrying the error text.
    pub fn encode(&self) -> FossilResult<(String, Vec<u8>)> {
        match self {
            Self::Unknown => Err(FossilError::Query("cannot encode an unknown value".to_string())),
            Self::Boolean(b) => Ok(("boolean".to_string(), vec![u8::from(*b)])),
            Self::Int(i) => Ok(("int64".to_string(), i.to_le_bytes().to_vec())),
            Self::Float(f) => Ok(("float64".to_string(), f.to_le_bytes().to_vec())),
            Self::String(s) => Ok(("string".to_string(), s.clone().into_bytes())),
            Self::Tuple(elements) => {
                let elem = match elements.first() {
                    Some(Value::Boolean(_)) => ScalarType::Boolean,
                    Some(Value::Int(_)) => ScalarType::Int64,
                    Some(Value::Float(_)) => ScalarType::Float64,
                    Some(other) => {
                        return Err(FossilError::Query(format!(
                            "a tuple of {} values cannot be stored",
                            other.type_name()
                        )));
                    }
                    None => {
                        return Err(FossilError::Query("cannot encode an empty tuple".to_string()));
                    }
                };
                let mut out = Vec::new();
                for value in elements {
                    match (elem, value) {
                        (ScalarType::Boolean, Value::Boolean(b)) => out.push(u8::from(*b)),
                        (ScalarType::Int64, Value::Int(i)) => {
                            out.extend_from_slice(&i.to_le_bytes());
                        }
                        (ScalarType::Float64, Value::Float(f)) => {
                            out.extend_from_slice(&f.to_le_bytes());
                        }
                        _ => {
                            return Err(FossilError::Query(
                                "heterogeneous tuples cannot be stored".to_string(),
                            ));
                        }
                    }
                }
                Ok((format!("[{}]{elem}", elements.len()), out))
            }
            Self::Composite(fields) => {
                let mut schema = String::from("{");
                let mut out = Vec::new();
                for (key, value) in fields {
                    let (field_schema, bytes) = value.encode()?;
                    if matches!(value, Value::Tuple(_) | Value::Composite(_)) {
                        return Err(FossilError::Query(
                            "composite fields must be scalars".to_string(),
                        ));
                    }
                    if matches!(value, Value::String(_)) {
                        out.write_u32::<LittleEndian>(bytes.len() as u32)?; // UI4 prefix
                    }
                    out.extend_from_slice(&bytes);
                    schema.push_str(&format!("\"{key}\": {field_schema},"));
                }
                schema.push('}');
                Ok((schema, out))
            }
        }
    }
}

fn compare(op: BinaryOp, ordering: &Option<std::cmp::Ordering>) -> FossilResult<bool> {
    use std::cmp::Ordering::{Equal, Greater, Less};
    let Some(ordering) = ordering else {
        // NaN comparisons
        return Ok(op == BinaryOp::Ne);
    };
    Ok(match op {
        BinaryOp::Eq => *ordering == Equal,
        BinaryOp::Ne => *ordering != Equal,
        BinaryOp::Lt => *ordering == Less,
        BinaryOp::Le => *ordering != Greater,
        BinaryOp::Gt => *ordering == Greater,
        BinaryOp::Ge => *ordering != Less,
        _ => return Err(FossilError::Impl("not a comparison operator")),
    })
}

fn decode(schema: &Schema, rdr: &mut Cursor<&[u8]>, all: &[u8]) -> FossilResult<Value> {
    match schema {
        Schema::Unknown => Ok(Value::Unknown),
        Schema::Type(t) => {
            // top-level strings and binaries take the remaining bytes
            let rest = all.len() - rdr.position() as usize;
            decode_scalar(*t, rdr, rest)
        }
        Schema::Array { length, elem } => {
            let mut elements = Vec::with_capacity(*length);
            for _ in 0..*length {
                elements.push(decode_scalar(*elem, rdr, 0)?);
            }
            Ok(Value::Tuple(elements))
        }
        Schema::Composite { keys, values } => {
            let mut fields = BTreeMap::new();
            for (key, value) in keys.iter().zip(values) {
                let field = match value {
                    Schema::Type(t) if t.width().is_none() => {
                        let len = rdr.read_u32::<LittleEndian>()? as usize; // UI4 prefix
                        decode_scalar(*t, rdr, len)?
                    }
                    other => decode(other, rdr, all)?,
                };
                fields.insert(key.clone(), field);
            }
            Ok(Value::Composite(fields))
        }
    }
}

fn decode_scalar(t: ScalarType, rdr: &mut Cursor<&[u8]>, var_len: usize) -> FossilResult<Value> {
    Ok(match t {
        ScalarType::Boolean => Value::Boolean(rdr.read_u8()? != 0),
        ScalarType::Int8 => Value::Int(i64::from(rdr.read_i8()?)),
        ScalarType::Int16 => Value::Int(i64::from(rdr.read_i16::<LittleEndian>()?)),
        ScalarType::Int32 => Value::Int(i64::from(rdr.read_i32::<LittleEndian>()?)),
        ScalarType::Int64 => Value::Int(rdr.read_i64::<LittleEndian>()?),
        ScalarType::Uint8 => Value::Int(i64::from(rdr.read_u8()?)),
        ScalarType::Uint16 => Value::Int(i64::from(rdr.read_u16::<LittleEndian>()?)),
        ScalarType::Uint32 => Value::Int(i64::from(rdr.read_u32::<LittleEndian>()?)),
        #[allow(clippy::cast_possible_wrap)]
        ScalarType::Uint64 => Value::Int(rdr.read_u64::<LittleEndian>()? as i64),
        ScalarType::Float32 => Value::Float(f64::from(rdr.read_f32::<LittleEndian>()?)),
        ScalarType::Float64 => Value::Float(rdr.read_f64::<LittleEndian>()?),
        ScalarType::String => {
            let mut buf = vec![0_u8; var_len];
            std::io::Read::read_exact(rdr, &mut buf)?;
            Value::String(String::from_utf8(buf).map_err(|_| {
                FossilError::Query("string data is not UTF-8".to_string())
            })?)
        }
        ScalarType::Binary => {
            let mut buf = vec![0_u8; var_len];
            std::io::Read::read_exact(rdr, &mut buf)?;
            Value::String(BASE64.encode(buf))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upcasting_promotes_toward_float() {
        let v = Value::binary(BinaryOp::Add, &Value::Int(1), &Value::Float(0.5)).unwrap();
        assert_eq!(v, Value::Float(1.5));
        let v = Value::binary(BinaryOp::Add, &Value::String("4".to_string()), &Value::Int(3))
            .unwrap();
        assert_eq!(v, Value::Int(7));
    }

    #[test]
    fn division_is_always_float() {
        let v = Value::binary(BinaryOp::Div, &Value::Int(7), &Value::Int(2)).unwrap();
        assert_eq!(v, Value::Float(3.5));
    }

    #[test]
    fn string_equality() {
        let v = Value::binary(
            BinaryOp::Eq,
            &Value::String("id".to_string()),
            &Value::String("id".to_string()),
        )
        .unwrap();
        assert_eq!(v, Value::Boolean(true));
    }

    #[test]
    fn from_entry_composite() {
        let schema = Schema::parse("{\"key\": string, \"value\": int64,}").unwrap();
        let data = crate::schema::encode_value(&schema, "key: \"id\", value: 1").unwrap();
        let value = Value::from_entry(&schema, &data).unwrap();
        let Value::Composite(fields) = value else {
            panic!("expected composite");
        };
        assert_eq!(fields["key"], Value::String("id".to_string()));
        assert_eq!(fields["value"], Value::Int(1));
    }

    #[test]
    fn from_entry_array() {
        let schema = Schema::parse("[3]int16").unwrap();
        let data = crate::schema::encode_value(&schema, "[1, 2, 3]").unwrap();
        let value = Value::from_entry(&schema, &data).unwrap();
        assert_eq!(
            value,
            Value::Tuple(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn homogeneous_tuples_encode() {
        let (schema, data) = Value::Tuple(vec![Value::Int(1), Value::Int(2)])
            .encode()
            .unwrap();
        assert_eq!(schema, "[2]int64");
        assert_eq!(data.len(), 16);
    }

    #[test]
    fn heterogeneous_tuples_do_not_encode() {
        let result = Value::Tuple(vec![Value::Int(1), Value::Float(2.0)]).encode();
        assert!(result.is_err());
    }

    #[test]
    fn composite_encodes_with_length_prefixes() {
        let mut fields = BTreeMap::new();
        fields.insert("key".to_string(), Value::String("id".to_string()));
        fields.insert("value".to_string(), Value::Int(1));
        let (schema, data) = Value::Composite(fields).encode().unwrap();
        assert_eq!(schema, "{\"key\": string,\"value\": int64,}");
        let parsed = Schema::parse(&schema).unwrap();
        assert!(parsed.validate(&data));
    }
}
