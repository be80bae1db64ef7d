use super::{ScalarType, Schema};
use crate::{FossilError, FossilResult};

pub(super) fn parse(input: &str) -> FossilResult<Schema> {
    let mut parser = SchemaParser::new(input);
    let schema = parser.parse_schema(true)?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.fail("trailing input after schema"));
    }
    Ok(schema)
}

// Character-level recursive descent over the schema grammar.
struct SchemaParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> SchemaParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn fail(&self, message: &str) -> FossilError {
        FossilError::Schema(format!("{message} at byte {} of {:?}", self.pos, self.input))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, c: char) -> FossilResult<()> {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.bump();
            Ok(())
        } else {
            Err(self.fail(&format!("expected {c:?}")))
        }
    }

    fn parse_schema(&mut self, allow_composite: bool) -> FossilResult<Schema> {
        self.skip_whitespace();
        match self.peek() {
            Some('[') => self.parse_array(),
            Some('{') => {
                if allow_composite {
                    self.parse_composite()
                } else {
                    Err(self.fail("composite values must be types or arrays"))
                }
            }
            Some(_) => self.parse_type().map(Schema::Type),
            None => Err(self.fail("empty schema")),
        }
    }

    fn parse_type(&mut self) -> FossilResult<ScalarType> {
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric()) {
            self.bump();
        }
        let keyword = &self.input[start..self.pos];
        ScalarType::from_keyword(keyword)
            .ok_or_else(|| self.fail(&format!("unknown type keyword {keyword:?}")))
    }

    fn parse_array(&mut self) -> FossilResult<Schema> {
        self.expect('[')?;
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        let length: usize = self.input[start..self.pos]
            .parse()
            .map_err(|_| self.fail("expected array length"))?;
        self.expect(']')?;
        let elem = self.parse_type()?;
        if elem.width().is_none() {
            return Err(self.fail(&format!("array of variable-width type {elem}")));
        }
        Ok(Schema::Array { length, elem })
    }

    fn parse_composite(&mut self) -> FossilResult<Schema> {
        self.expect('{')?;
        let mut pairs: Vec<(String, Schema)> = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.bump();
                break;
            }
            let key = self.parse_key()?;
            if pairs.iter().any(|(k, _)| *k == key) {
                return Err(self.fail(&format!("duplicate composite key {key:?}")));
            }
            self.expect(':')?;
            let value = self.parse_schema(false)?;
            self.expect(',')?;
            pairs.push((key, value));
        }
        pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
        let (keys, values) = pairs.into_iter().unzip();
        Ok(Schema::Composite { keys, values })
    }

    // key := '"' word '"' | '\'' word '\'' where word is alphanumeric/-/_
    fn parse_key(&mut self) -> FossilResult<String> {
        self.skip_whitespace();
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.bump();
                q
            }
            _ => return Err(self.fail("expected quoted composite key")),
        };
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            self.bump();
        }
        let key = self.input[start..self.pos].to_string();
        if self.peek() != Some(quote) {
            return Err(self.fail("unmatched quote in composite key"));
        }
        self.bump();
        if key.is_empty() {
            return Err(self.fail("empty composite key"));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_keywords() {
        assert_eq!(parse("string").unwrap(), Schema::Type(ScalarType::String));
        assert_eq!(parse(" int32 ").unwrap(), Schema::Type(ScalarType::Int32));
        assert!(parse("int24").is_err());
    }

    #[test]
    fn arrays() {
        assert_eq!(
            parse("[4]float64").unwrap(),
            Schema::Array {
                length: 4,
                elem: ScalarType::Float64
            }
        );
        // string and binary are forbidden inside arrays
        assert!(parse("[4]string").is_err());
        assert!(parse("[4]binary").is_err());
    }

    #[test]
    fn composites_sort_keys() {
        let schema = parse("{\"y\": int32, \"x\": int32,}").unwrap();
        match schema {
            Schema::Composite { keys, .. } => assert_eq!(keys, vec!["x", "y"]),
            other => panic!("unexpected schema {other:?}"),
        }
    }

    #[test]
    fn composite_rejections() {
        assert!(parse("{\"x\": int32}").is_err(), "missing trailing comma");
        assert!(parse("{\"x\": int32, \"x\": int8,}").is_err(), "duplicate");
        assert!(parse("{\"x: int32,}").is_err(), "unmatched quote");
        assert!(parse("{\"x\": {\"y\": int8,},}").is_err(), "nested composite");
        assert!(parse("{'x': int32,}").is_ok(), "single quotes allowed");
    }

    #[test]
    fn renders_round_trip() {
        for text in ["int64", "[3]uint8", "{\"a\": string,\"b\": [2]int16,}"] {
            let schema = parse(text).unwrap();
            assert_eq!(parse(&schema.to_string()).unwrap(), schema);
        }
    }
}
