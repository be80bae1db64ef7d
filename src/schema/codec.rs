//! Textual literal ⇄ binary value codecs.
//!
//! The surface syntax is comma-separated; commas inside matched quotes or
//! bracket pairs are literal. The binary format is little-endian; fields of
//! variable width inside a composite carry a u32 length prefix.

use super::{ScalarType, Schema};
use crate::{FossilError, FossilResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Encodes a textual literal into the binary form declared by `schema`.
pub fn encode_value(schema: &Schema, literal: &str) -> FossilResult<Vec<u8>> {
    match schema {
        Schema::Unknown => Err(FossilError::Schema(
            "cannot encode against an unknown schema".to_string(),
        )),
        Schema::Type(t) => encode_scalar(*t, literal.trim()),
        Schema::Array { length, elem } => {
            let inner = strip_wrapping(literal.trim(), '[', ']');
            let elements = split_surface(inner)?;
            if elements.len() != *length {
                return Err(FossilError::Schema(format!(
                    "array literal has {} elements, schema wants {length}",
                    elements.len()
                )));
            }
            let mut out = Vec::new();
            for element in &elements {
                out.extend_from_slice(&encode_scalar(*elem, element)?);
            }
            Ok(out)
        }
        Schema::Composite { keys, values } => {
            let elements = split_surface(literal.trim())?;
            let mut fields: Vec<Option<&str>> = vec![None; keys.len()];
            for element in &elements {
                let (key, value) = element.split_once(':').ok_or_else(|| {
                    FossilError::Schema(format!("composite field {element:?} is missing a ':'"))
                })?;
                let key = unquote(key.trim());
                let idx = keys
                    .iter()
                    .position(|k| k == key)
                    .ok_or_else(|| FossilError::Schema(format!("unknown key {key:?}")))?;
                if fields[idx].is_some() {
                    return Err(FossilError::Schema(format!("duplicate key {key:?}")));
                }
                fields[idx] = Some(value.trim());
            }
            let mut out = Vec::new();
            for (idx, field) in fields.iter().enumerate() {
                let literal = field.ok_or_else(|| {
                    FossilError::Schema(format!("missing value for key {:?}", keys[idx]))
                })?;
                let bytes = encode_value(&values[idx], literal)?;
                if values[idx].size().is_none() {
                    out.write_u32::<LittleEndian>(bytes.len() as u32)?;
                }
                out.extend_from_slice(&bytes);
            }
            Ok(out)
        }
    }
}

/// Decodes binary data into the canonical textual rendering for `schema`.
///
/// Canonical means: composite keys in sorted order, `", "` separators, no
/// trailing comma, strings quoted inside composites and arrays bracketed.
pub fn decode_value(schema: &Schema, data: &[u8]) -> FossilResult<String> {
    match schema {
        Schema::Unknown => Err(FossilError::Schema(
            "cannot decode against an unknown schema".to_string(),
        )),
        Schema::Type(t) => decode_scalar(*t, data, false),
        Schema::Array { length, elem } => {
            let width = elem.width().ok_or_else(|| {
                FossilError::Schema(format!("array of variable-width type {elem}"))
            })?;
            if data.len() != width * length {
                return Err(width_error(schema, data.len()));
            }
            let rendered: FossilResult<Vec<String>> = data
                .chunks(width)
                .map(|chunk| decode_scalar(*elem, chunk, true))
                .collect();
            Ok(format!("[{}]", rendered?.join(", ")))
        }
        Schema::Composite { keys, values } => {
            let mut rdr = Cursor::new(data);
            let mut rendered = Vec::with_capacity(keys.len());
            for (key, value) in keys.iter().zip(values) {
                let bytes = match value.size() {
                    Some(width) => read_exact(&mut rdr, width)?,
                    None => {
                        let len = rdr.read_u32::<LittleEndian>()? as usize; // UI4 prefix
                        read_exact(&mut rdr, len)?
                    }
                };
                let text = match value {
                    Schema::Type(t) => decode_scalar(*t, &bytes, true)?,
                    other => decode_value(other, &bytes)?,
                };
                rendered.push(format!("{key}: {text}"));
            }
            if (rdr.position() as usize) < data.len() {
                return Err(width_error(schema, data.len()));
            }
            Ok(rendered.join(", "))
        }
    }
}

fn encode_scalar(t: ScalarType, literal: &str) -> FossilResult<Vec<u8>> {
    let mut out = Vec::new();
    match t {
        ScalarType::Boolean => match literal {
            "true" => out.push(1),
            "false" => out.push(0),
            other => {
                return Err(FossilError::Schema(format!("bad boolean literal {other:?}")));
            }
        },
        ScalarType::Int8 => out.write_i8(parse_number(literal)?)?,
        ScalarType::Int16 => out.write_i16::<LittleEndian>(parse_number(literal)?)?,
        ScalarType::Int32 => out.write_i32::<LittleEndian>(parse_number(literal)?)?,
        ScalarType::Int64 => out.write_i64::<LittleEndian>(parse_number(literal)?)?,
        ScalarType::Uint8 => out.write_u8(parse_number(literal)?)?,
        ScalarType::Uint16 => out.write_u16::<LittleEndian>(parse_number(literal)?)?,
        ScalarType::Uint32 => out.write_u32::<LittleEndian>(parse_number(literal)?)?,
        ScalarType::Uint64 => out.write_u64::<LittleEndian>(parse_number(literal)?)?,
        ScalarType::Float32 => out.write_f32::<LittleEndian>(parse_number(literal)?)?,
        ScalarType::Float64 => out.write_f64::<LittleEndian>(parse_number(literal)?)?,
        ScalarType::String => out.extend_from_slice(unquote(literal).as_bytes()),
        ScalarType::Binary => {
            let decoded = BASE64
                .decode(unquote(literal))
                .map_err(|e| FossilError::Schema(format!("bad binary literal: {e}")))?;
            out.extend_from_slice(&decoded);
        }
    }
    Ok(out)
}

fn decode_scalar(t: ScalarType, data: &[u8], quoted: bool) -> FossilResult<String> {
    if let Some(width) = t.width() {
        if data.len() != width {
            return Err(width_error(&Schema::Type(t), data.len()));
        }
    }
    let mut rdr = Cursor::new(data);
    Ok(match t {
        ScalarType::Boolean => {
            if rdr.read_u8()? == 0 { "false" } else { "true" }.to_string()
        }
        ScalarType::Int8 => rdr.read_i8()?.to_string(),
        ScalarType::Int16 => rdr.read_i16::<LittleEndian>()?.to_string(),
        ScalarType::Int32 => rdr.read_i32::<LittleEndian>()?.to_string(),
        ScalarType::Int64 => rdr.read_i64::<LittleEndian>()?.to_string(),
        ScalarType::Uint8 => rdr.read_u8()?.to_string(),
        ScalarType::Uint16 => rdr.read_u16::<LittleEndian>()?.to_string(),
        ScalarType::Uint32 => rdr.read_u32::<LittleEndian>()?.to_string(),
        ScalarType::Uint64 => rdr.read_u64::<LittleEndian>()?.to_string(),
        ScalarType::Float32 => rdr.read_f32::<LittleEndian>()?.to_string(),
        ScalarType::Float64 => rdr.read_f64::<LittleEndian>()?.to_string(),
        ScalarType::String => {
            let text = std::str::from_utf8(data)
                .map_err(|_| FossilError::Schema("string data is not UTF-8".to_string()))?;
            if quoted {
                format!("\"{text}\"")
            } else {
                text.to_string()
            }
        }
        ScalarType::Binary => {
            let text = BASE64.encode(data);
            if quoted {
                format!("\"{text}\"")
            } else {
                text
            }
        }
    })
}

// Splits a comma-separated surface literal; commas inside matched quotes or
// bracket pairs are literal. Rejects unmatched quotes, unbalanced brackets,
// and empty elements (which covers trailing commas).
fn split_surface(input: &str) -> FossilResult<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0i32;
    for c in input.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    current.push(c);
                }
                '[' | '{' | '(' => {
                    depth += 1;
                    current.push(c);
                }
                ']' | '}' | ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(FossilError::Schema(format!(
                            "unbalanced brackets in {input:?}"
                        )));
                    }
                    current.push(c);
                }
                ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
                _ => current.push(c),
            },
        }
    }
    if quote.is_some() {
        return Err(FossilError::Schema(format!("unmatched quote in {input:?}")));
    }
    if depth != 0 {
        return Err(FossilError::Schema(format!(
            "unbalanced brackets in {input:?}"
        )));
    }
    parts.push(current);
    let trimmed: Vec<String> = parts.into_iter().map(|p| p.trim().to_string()).collect();
    if trimmed.iter().any(String::is_empty) {
        return Err(FossilError::Schema(format!(
            "empty element (trailing comma?) in {input:?}"
        )));
    }
    Ok(trimmed)
}

fn parse_number<T: std::str::FromStr>(literal: &str) -> FossilResult<T> {
    literal
        .parse()
        .map_err(|_| FossilError::Schema(format!("bad numeric literal {literal:?}")))
}

fn unquote(literal: &str) -> &str {
    let bytes = literal.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &literal[1..literal.len() - 1];
        }
    }
    literal
}

fn strip_wrapping(literal: &str, open: char, close: char) -> &str {
    if literal.starts_with(open) && literal.ends_with(close) && literal.len() >= 2 {
        &literal[open.len_utf8()..literal.len() - close.len_utf8()]
    } else {
        literal
    }
}

fn read_exact(rdr: &mut Cursor<&[u8]>, len: usize) -> FossilResult<Vec<u8>> {
    let mut buf = vec![0_u8; len];
    std::io::Read::read_exact(rdr, &mut buf)?;
    Ok(buf)
}

fn width_error(schema: &Schema, got: usize) -> FossilError {
    FossilError::Schema(format!("{got} bytes do not fit schema {schema}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(text: &str) -> Schema {
        Schema::parse(text).unwrap()
    }

    #[test]
    fn scalar_round_trips() {
        let s = schema("int32");
        let bytes = encode_value(&s, "-7").unwrap();
        assert_eq!(bytes, (-7i32).to_le_bytes());
        assert_eq!(decode_value(&s, &bytes).unwrap(), "-7");

        let s = schema("string");
        let bytes = encode_value(&s, "hello, world").unwrap();
        assert_eq!(decode_value(&s, &bytes).unwrap(), "hello, world");
    }

    #[test]
    fn array_round_trip() {
        let s = schema("[3]int16");
        let bytes = encode_value(&s, "[1, 2, 3]").unwrap();
        assert_eq!(bytes.len(), 6);
        assert_eq!(decode_value(&s, &bytes).unwrap(), "[1, 2, 3]");
        // bare element list is accepted too
        assert_eq!(encode_value(&s, "1, 2, 3").unwrap(), bytes);
        assert!(encode_value(&s, "[1, 2]").is_err());
    }

    #[test]
    fn composite_canonicalizes() {
        let s = schema("{\"x\": int32, \"y\": int32,}");
        let bytes = encode_value(&s, "y: 4, x: 3").unwrap();
        assert_eq!(decode_value(&s, &bytes).unwrap(), "x: 3, y: 4");
    }

    #[test]
    fn composite_var_width_fields() {
        let s = schema("{\"key\": string, \"value\": int64,}");
        let bytes = encode_value(&s, "key: \"id\", value: 1").unwrap();
        // u32 length prefix before the string field
        assert_eq!(bytes[..4], 2u32.to_le_bytes());
        assert_eq!(decode_value(&s, &bytes).unwrap(), "key: \"id\", value: 1");
        assert!(s.validate(&bytes));
    }

    #[test]
    fn commas_inside_quotes_are_literal() {
        let s = schema("{\"a\": string, \"b\": int8,}");
        let bytes = encode_value(&s, "a: \"x, y\", b: 1").unwrap();
        assert_eq!(decode_value(&s, &bytes).unwrap(), "a: \"x, y\", b: 1");
    }

    #[test]
    fn malformed_literals_reject() {
        let s = schema("{\"a\": string, \"b\": int8,}");
        assert!(encode_value(&s, "a: \"x\", b: 1,").is_err(), "trailing comma");
        assert!(encode_value(&s, "a: \"x\", c: 1").is_err(), "unknown key");
        assert!(encode_value(&s, "a: \"x\", a: \"y\"").is_err(), "duplicate");
        assert!(encode_value(&s, "a: \"x").is_err(), "unmatched quote");
        assert!(encode_value(&s, "a: \"x\"").is_err(), "missing key");
    }

    #[test]
    fn binary_uses_base64() {
        let s = schema("binary");
        let bytes = encode_value(&s, "aGk=").unwrap();
        assert_eq!(bytes, b"hi");
        assert_eq!(decode_value(&s, &bytes).unwrap(), "aGk=");
    }
}
