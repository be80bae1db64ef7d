//! Recursive-descent parser for the query language.
//!
//! ```text
//! query          := quantifier [topic-selector] [time-predicate] [data-pipeline]
//! quantifier     := "all" | "sample" "(" time-quantity ")"
//! topic-selector := "in" ( TOPIC | "/" )
//! time-predicate := ("since" | "before") time-expr | "between" time-expr "," time-expr
//! data-pipeline  := ( "|" data-function )+
//! ```
//!
//! Time quantities are constant and folded to nanoseconds while parsing. A
//! valid query must consume the entire input.

use super::ast::{
    timespan_nanos, BinaryOp, Expr, Quantifier, Query, Stage, StageKind, Subscript, TimeExpr,
    TimePredicate, TopicSelector, UnaryOp, Whence,
};
use super::scanner::{Location, Scanner, Token, TokenKind};
use super::syntax_error::SyntaxError;
use super::timestamp::parse_vague_timestamp;

type ParseResult<T> = Result<T, SyntaxError>;

/// Parses a query string into its AST.
pub fn parse_query(input: &str) -> ParseResult<Query> {
    Parser::new(input).parse()
}

#[derive(Debug)]
struct Parser<'a> {
    scanner: Scanner<'a>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            scanner: Scanner::new(input),
        }
    }

    fn fail<T>(token: &Token, message: impl Into<String>) -> ParseResult<T> {
        Err(SyntaxError::new(token.location, message))
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        let token = self.scanner.emit();
        if token.kind == kind {
            Ok(token)
        } else {
            Self::fail(&token, format!("expected {what}, found {:?}", token.lexeme))
        }
    }

    fn parse(&mut self) -> ParseResult<Query> {
        let quantifier = self.parse_quantifier()?;
        let topic = self.parse_topic_selector()?;
        let time = self.parse_time_predicate()?;
        let pipeline = self.parse_pipeline()?;
        let token = self.scanner.emit();
        if token.kind != TokenKind::Eof {
            return Self::fail(
                &token,
                format!("trailing input {:?} after query", token.lexeme),
            );
        }
        Ok(Query {
            quantifier,
            topic,
            time,
            pipeline,
        })
    }

    fn parse_quantifier(&mut self) -> ParseResult<Quantifier> {
        let token = self.scanner.emit();
        match token.kind {
            TokenKind::All => Ok(Quantifier::All {
                location: token.location,
            }),
            TokenKind::Sample => {
                self.expect(TokenKind::OpenParen, "'(' after sample")?;
                let (interval, _) = self.parse_time_quantity()?;
                let close = self.expect(TokenKind::CloseParen, "')' after sample interval")?;
                Ok(Quantifier::Sample {
                    interval,
                    location: token.location.span(close.location),
                })
            }
            _ => Self::fail(&token, "expected quantifier 'all' or 'sample'"),
        }
    }

    fn parse_topic_selector(&mut self) -> ParseResult<Option<TopicSelector>> {
        let token = self.scanner.emit();
        if token.kind != TokenKind::In {
            self.scanner.rewind();
            return Ok(None);
        }
        let topic = self.scanner.emit();
        match topic.kind {
            TokenKind::Topic => Ok(Some(TopicSelector {
                topic: topic.lexeme,
                location: token.location.span(topic.location),
            })),
            TokenKind::Slash => Ok(Some(TopicSelector {
                topic: "/".to_string(),
                location: token.location.span(topic.location),
            })),
            _ => Self::fail(&topic, "expected a topic after 'in'"),
        }
    }

    fn parse_time_predicate(&mut self) -> ParseResult<Option<TimePredicate>> {
        let token = self.scanner.emit();
        match token.kind {
            TokenKind::Since => {
                let expr = self.parse_time_expr()?;
                let location = token.location.span(expr.location);
                Ok(Some(TimePredicate::Since { expr, location }))
            }
            TokenKind::Before => {
                let expr = self.parse_time_expr()?;
                let location = token.location.span(expr.location);
                Ok(Some(TimePredicate::Before { expr, location }))
            }
            TokenKind::Between => {
                let start = self.parse_time_expr()?;
                self.expect(TokenKind::Comma, "',' between the range ends")?;
                let end = self.parse_time_expr()?;
                let location = token.location.span(end.location);
                Ok(Some(TimePredicate::Between {
                    start,
                    end,
                    location,
                }))
            }
            _ => {
                self.scanner.rewind();
                Ok(None)
            }
        }
    }

    // time-expr := time-whence [ ("+"|"-") time-quantity ]
    fn parse_time_expr(&mut self) -> ParseResult<TimeExpr> {
        let token = self.scanner.emit();
        if token.kind != TokenKind::Whence {
            return Self::fail(&token, "expected '~now' or '~(<timestamp>)'");
        }
        let whence = if token.lexeme == "~now" {
            Whence::Now
        } else {
            let inner = &token.lexeme[2..token.lexeme.len() - 1];
            match parse_vague_timestamp(inner) {
                Some(nanos) => Whence::Absolute(nanos),
                None => {
                    return Self::fail(&token, format!("unrecognized timestamp {inner:?}"));
                }
            }
        };
        let mut location = token.location;
        let mut offset = 0;
        let sign = self.scanner.emit();
        match sign.kind {
            TokenKind::Plus => {
                let (quantity, qloc) = self.parse_time_quantity()?;
                offset = quantity;
                location = location.span(qloc);
            }
            TokenKind::Minus => {
                let (quantity, qloc) = self.parse_time_quantity()?;
                offset = -quantity;
                location = location.span(qloc);
            }
            _ => self.scanner.rewind(),
        }
        Ok(TimeExpr {
            whence,
            offset,
            location,
        })
    }

    // time-quantity := time-term (("+"|"-") time-term)*
    fn parse_time_quantity(&mut self) -> ParseResult<(i64, Location)> {
        let (mut value, mut location) = self.parse_time_term()?;
        loop {
            let token = self.scanner.emit();
            match token.kind {
                TokenKind::Plus => {
                    let (rhs, rloc) = self.parse_time_term()?;
                    value += rhs;
                    location = location.span(rloc);
                }
                TokenKind::Minus => {
                    let (rhs, rloc) = self.parse_time_term()?;
                    value -= rhs;
                    location = location.span(rloc);
                }
                _ => {
                    self.scanner.rewind();
                    return Ok((value, location));
                }
            }
        }
    }

    // time-term := time-atom ("*" time-atom)*
    fn parse_time_term(&mut self) -> ParseResult<(i64, Location)> {
        let (mut value, mut location) = self.parse_time_atom()?;
        loop {
            let token = self.scanner.emit();
            if token.kind == TokenKind::Star {
                let (rhs, rloc) = self.parse_time_atom()?;
                value *= rhs;
                location = location.span(rloc);
            } else {
                self.scanner.rewind();
                return Ok((value, location));
            }
        }
    }

    fn parse_time_atom(&mut self) -> ParseResult<(i64, Location)> {
        let token = self.scanner.emit();
        match token.kind {
            TokenKind::Integer => {
                let value = token
                    .lexeme
                    .parse()
                    .map_err(|_| SyntaxError::new(token.location, "integer out of range"))?;
                Ok((value, token.location))
            }
            TokenKind::Timespan => match timespan_nanos(&token.lexeme) {
                Some(nanos) => Ok((nanos, token.location)),
                None => Self::fail(&token, "unknown timespan"),
            },
            _ => Self::fail(&token, "expected an integer or a timespan"),
        }
    }

    // data-pipeline := ( "|" data-function )+
    fn parse_pipeline(&mut self) -> ParseResult<Vec<Stage>> {
        let mut stages = Vec::new();
        loop {
            let token = self.scanner.emit();
            if token.kind != TokenKind::Pipe {
                self.scanner.rewind();
                return Ok(stages);
            }
            stages.push(self.parse_data_function()?);
        }
    }

    // data-function := ("filter"|"map"|"reduce") ident ("," ident)* "->" body
    fn parse_data_function(&mut self) -> ParseResult<Stage> {
        let name = self.scanner.emit();
        let kind = match name.kind {
            TokenKind::Identifier => StageKind::from_name(&name.lexeme),
            _ => None,
        };
        let Some(kind) = kind else {
            return Self::fail(&name, "expected 'filter', 'map' or 'reduce'");
        };
        let mut args = vec![self.expect(TokenKind::Identifier, "an argument name")?.lexeme];
        loop {
            let token = self.scanner.emit();
            if token.kind == TokenKind::Comma {
                args.push(self.expect(TokenKind::Identifier, "an argument name")?.lexeme);
            } else {
                self.scanner.rewind();
                break;
            }
        }
        self.expect(TokenKind::Arrow, "'->' before the stage body")?;
        let body = self.parse_stage_body()?;
        let location = name.location.span(body.location());
        Ok(Stage {
            kind,
            args,
            body,
            location,
        })
    }

    // body := composite | tuple. A composite is recognized by its leading
    // `key ":"`; the colon is not an expression operator, so after parsing
    // one expression a following ':' settles the question.
    fn parse_stage_body(&mut self) -> ParseResult<Expr> {
        let first = self.parse_expression()?;
        let token = self.scanner.emit();
        if token.kind == TokenKind::Colon {
            let key = match first {
                Expr::Ident { name, location } => (name, location),
                Expr::Str { value, location } => (value, location),
                other => {
                    return Err(SyntaxError::new(
                        other.location(),
                        "composite keys must be identifiers or strings",
                    ));
                }
            };
            return self.parse_composite_body(key.0, key.1);
        }
        self.scanner.rewind();
        let mut elements = vec![first];
        loop {
            let token = self.scanner.emit();
            if token.kind == TokenKind::Comma {
                elements.push(self.parse_expression()?);
            } else {
                self.scanner.rewind();
                break;
            }
        }
        if elements.len() == 1 {
            Ok(elements.pop().expect("one element"))
        } else {
            let location = elements[0]
                .location()
                .span(elements[elements.len() - 1].location());
            Ok(Expr::Tuple { elements, location })
        }
    }

    fn parse_composite_body(&mut self, first_key: String, start: Location) -> ParseResult<Expr> {
        let mut keys = vec![first_key];
        let mut values = vec![self.parse_expression()?];
        loop {
            let token = self.scanner.emit();
            if token.kind != TokenKind::Comma {
                self.scanner.rewind();
                break;
            }
            let key = self.scanner.emit();
            match key.kind {
                TokenKind::Identifier | TokenKind::Str => keys.push(key.lexeme),
                _ => return Self::fail(&key, "expected a composite key"),
            }
            self.expect(TokenKind::Colon, "':' after the composite key")?;
            values.push(self.parse_expression()?);
        }
        let location = start.span(values[values.len() - 1].location());
        Ok(Expr::Composite {
            keys,
            values,
            location,
        })
    }

    // expression := comparison ( ("==" | "!=") expression )*
    fn parse_expression(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_comparison()?;
        let token = self.scanner.emit();
        let op = match token.kind {
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::Ne,
            _ => {
                self.scanner.rewind();
                return Ok(lhs);
            }
        };
        let rhs = self.parse_expression()?;
        Ok(binary(op, lhs, rhs))
    }

    // comparison := term ( ("<"|"<="|">"|">=") comparison )*
    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_term()?;
        let token = self.scanner.emit();
        let op = match token.kind {
            TokenKind::Less => BinaryOp::Lt,
            TokenKind::LessEq => BinaryOp::Le,
            TokenKind::Greater => BinaryOp::Gt,
            TokenKind::GreaterEq => BinaryOp::Ge,
            _ => {
                self.scanner.rewind();
                return Ok(lhs);
            }
        };
        let rhs = self.parse_comparison()?;
        Ok(binary(op, lhs, rhs))
    }

    // term := term_md ( ("+"|"-") term )*
    fn parse_term(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_term_md()?;
        let token = self.scanner.emit();
        let op = match token.kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            _ => {
                self.scanner.rewind();
                return Ok(lhs);
            }
        };
        let rhs = self.parse_term()?;
        Ok(binary(op, lhs, rhs))
    }

    // term_md := unary ( ("*"|"/") term_md )*
    fn parse_term_md(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_unary()?;
        let token = self.scanner.emit();
        let op = match token.kind {
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            _ => {
                self.scanner.rewind();
                return Ok(lhs);
            }
        };
        let rhs = self.parse_term_md()?;
        Ok(binary(op, lhs, rhs))
    }

    // unary := ("+"|"-") (sub-value|integer|float|ident) | primary
    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let token = self.scanner.emit();
        let op = match token.kind {
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Minus => UnaryOp::Minus,
            _ => {
                self.scanner.rewind();
                return self.parse_primary();
            }
        };
        let operand = self.parse_unary_operand()?;
        let location = token.location.span(operand.location());
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
            location,
        })
    }

    fn parse_unary_operand(&mut self) -> ParseResult<Expr> {
        let token = self.scanner.emit();
        match token.kind {
            TokenKind::Integer => integer_expr(&token),
            TokenKind::Float => float_expr(&token),
            TokenKind::Identifier => self.ident_or_subvalue(token),
            _ => Self::fail(&token, "expected a numeric operand"),
        }
    }

    // primary := builtin | sub-value | integer | float | string | "(" expression ")"
    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.scanner.emit();
        match token.kind {
            TokenKind::Integer => integer_expr(&token),
            TokenKind::Float => float_expr(&token),
            TokenKind::Str => Ok(Expr::Str {
                value: token.lexeme,
                location: token.location,
            }),
            TokenKind::OpenParen => {
                let inner = self.parse_expression()?;
                self.expect(TokenKind::CloseParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Identifier => {
                let next = self.scanner.emit();
                match next.kind {
                    TokenKind::OpenParen => self.parse_builtin(token),
                    TokenKind::OpenBracket => self.parse_subscript(token),
                    _ => {
                        self.scanner.rewind();
                        Ok(Expr::Ident {
                            name: token.lexeme,
                            location: token.location,
                        })
                    }
                }
            }
            _ => Self::fail(&token, "expected an expression"),
        }
    }

    fn ident_or_subvalue(&mut self, ident: Token) -> ParseResult<Expr> {
        let next = self.scanner.emit();
        if next.kind == TokenKind::OpenBracket {
            self.parse_subscript(ident)
        } else {
            self.scanner.rewind();
            Ok(Expr::Ident {
                name: ident.lexeme,
                location: ident.location,
            })
        }
    }

    // builtin := ident "(" tuple ")"; the '(' is already consumed
    fn parse_builtin(&mut self, name: Token) -> ParseResult<Expr> {
        let mut args = vec![self.parse_expression()?];
        loop {
            let token = self.scanner.emit();
            match token.kind {
                TokenKind::Comma => args.push(self.parse_expression()?),
                TokenKind::CloseParen => {
                    let location = name.location.span(token.location);
                    return Ok(Expr::Builtin {
                        name: name.lexeme,
                        args,
                        location,
                    });
                }
                _ => return Self::fail(&token, "expected ',' or ')' in the argument list"),
            }
        }
    }

    // sub-value := ident "[" (integer | string | ident) "]"; '[' consumed
    fn parse_subscript(&mut self, target: Token) -> ParseResult<Expr> {
        let token = self.scanner.emit();
        let subscript = match token.kind {
            TokenKind::Integer => Subscript::Index(
                token
                    .lexeme
                    .parse()
                    .map_err(|_| SyntaxError::new(token.location, "integer out of range"))?,
            ),
            // a bare identifier subscript is an unquoted string key
            TokenKind::Str | TokenKind::Identifier => Subscript::Key(token.lexeme),
            _ => return Self::fail(&token, "expected an index or a key"),
        };
        let close = self.expect(TokenKind::CloseBracket, "']'")?;
        Ok(Expr::SubValue {
            target: target.lexeme,
            subscript,
            location: target.location.span(close.location),
        })
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let location = lhs.location().span(rhs.location());
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        location,
    }
}

fn integer_expr(token: &Token) -> ParseResult<Expr> {
    Ok(Expr::Integer {
        value: token
            .lexeme
            .parse()
            .map_err(|_| SyntaxError::new(token.location, "integer out of range"))?,
        location: token.location,
    })
}

fn float_expr(token: &Token) -> ParseResult<Expr> {
    Ok(Expr::Float {
        value: token
            .lexeme
            .parse()
            .map_err(|_| SyntaxError::new(token.location, "malformed float"))?,
        location: token.location,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::NANOS_PER_SECOND;
    use crate::store::RangeSemantics;

    #[test]
    fn parses_the_bare_quantifier() {
        let query = parse_query("all").unwrap();
        assert!(matches!(query.quantifier, Quantifier::All { .. }));
        assert!(query.topic.is_none());
        assert!(query.time.is_none());
        assert!(query.pipeline.is_empty());
    }

    #[test]
    fn parses_sample_with_a_folded_interval() {
        let query = parse_query("sample(2 * @minute + 30 * @second)").unwrap();
        match query.quantifier {
            Quantifier::Sample { interval, .. } => {
                assert_eq!(interval, 150 * NANOS_PER_SECOND);
            }
            other => panic!("unexpected quantifier {other:?}"),
        }
    }

    #[test]
    fn parses_topic_selectors() {
        let query = parse_query("all in /foo/bar").unwrap();
        assert_eq!(query.topic.unwrap().topic, "/foo/bar");
        let query = parse_query("all in /").unwrap();
        assert_eq!(query.topic.unwrap().topic, "/");
    }

    #[test]
    fn since_with_absolute_anchor_and_offset() {
        // the range starts one hour before the literal instant
        let query = parse_query("all in /x since ~(2006-01-02T15:04:05-07:00) - 1 * @hour").unwrap();
        let now = 9_000_000_000 * NANOS_PER_SECOND;
        let range = query.time.unwrap().to_range(now);
        assert_eq!(range.semantics, RangeSemantics::Since);
        assert_eq!(range.start, (1_136_239_445 - 3_600) * NANOS_PER_SECOND);
        assert_eq!(range.end, now);
    }

    #[test]
    fn between_parses_both_ends() {
        let query = parse_query("all between ~(2006-01-02), ~now").unwrap();
        let range = query.time.unwrap().to_range(77);
        assert_eq!(range.semantics, RangeSemantics::Between);
        assert_eq!(range.end, 77);
    }

    #[test]
    fn parses_pipeline_stages() {
        let query = parse_query("all in /m | map v -> v[x] + v[y]").unwrap();
        assert_eq!(query.pipeline.len(), 1);
        let stage = &query.pipeline[0];
        assert_eq!(stage.kind, StageKind::Map);
        assert_eq!(stage.args, vec!["v"]);
        match &stage.body {
            Expr::Binary { op, lhs, .. } => {
                assert_eq!(*op, BinaryOp::Add);
                assert!(matches!(**lhs, Expr::SubValue { .. }));
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn parses_tuple_and_composite_bodies() {
        let query = parse_query("all | map v -> v, v * 2").unwrap();
        assert!(matches!(&query.pipeline[0].body, Expr::Tuple { elements, .. } if elements.len() == 2));

        let query = parse_query("all | map v -> x: v[0], y: v[1]").unwrap();
        match &query.pipeline[0].body {
            Expr::Composite { keys, .. } => assert_eq!(keys, &["x", "y"]),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn parses_reduce_with_two_args() {
        let query = parse_query("all in /n | reduce a, b -> a + b").unwrap();
        let stage = &query.pipeline[0];
        assert_eq!(stage.kind, StageKind::Reduce);
        assert_eq!(stage.args, vec!["a", "b"]);
    }

    #[test]
    fn builtin_calls_parse() {
        let query = parse_query("all | map v -> max(v[0], v[1], 3)").unwrap();
        match &query.pipeline[0].body {
            Expr::Builtin { name, args, .. } => {
                assert_eq!(name, "max");
                assert_eq!(args.len(), 3);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        let err = parse_query("all in /x nonsense").unwrap_err();
        assert!(err.message.contains("trailing input"));
        assert_eq!(&"all in /x nonsense"[err.location.start..err.location.end], "nonsense");
    }

    #[test]
    fn bad_timestamp_reports_its_span() {
        let err = parse_query("all since ~(yesterday-ish)").unwrap_err();
        assert!(err.message.contains("unrecognized timestamp"));
        assert_eq!(err.location.start, 10);
    }

    #[test]
    fn division_parses_with_lone_slash_token() {
        let query = parse_query("all | map v -> v / 2").unwrap();
        assert!(matches!(
            &query.pipeline[0].body,
            Expr::Binary {
                op: BinaryOp::Div,
                ..
            }
        ));
    }
}
