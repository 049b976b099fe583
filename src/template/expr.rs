//! Expression lexer and parser
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or      := and ("or" and)*
//! and     := not ("and" not)*
//! not     := "not" not | compare
//! compare := sum (("==" | "!=" | "<" | "<=" | ">" | ">=" | "in" | "not in") sum)?
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/" | "%") unary)*
//! unary   := "-" unary | postfix
//! postfix := primary ("." ident | "[" or "]" | "(" args ")")*
//! primary := ident | int | string | "True" | "False" | "None" | "(" or ")" | "[" items "]"
//! ```

use crate::error::{InterpolationError, InterpolationResult};
use crate::template::Value;

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    List(Vec<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Str(String),
    Punct(&'static str),
    End,
}

const PUNCTUATION: &[&str] = &[
    "==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%", "(", ")", "[", "]", ".", ",",
];

fn syntax(offset: usize, message: impl Into<String>) -> InterpolationError {
    InterpolationError::InvalidSyntax {
        offset,
        message: message.into(),
    }
}

fn tokenize(src: &str) -> InterpolationResult<Vec<(usize, Token)>> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos] as char;

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = pos;
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            tokens.push((start, Token::Ident(src[start..pos].to_string())));
            continue;
        }

        if c.is_ascii_digit() {
            let start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            let number = src[start..pos]
                .parse::<i64>()
                .map_err(|e| syntax(start, format!("invalid integer: {}", e)))?;
            tokens.push((start, Token::Int(number)));
            continue;
        }

        if c == '"' || c == '\'' {
            let start = pos;
            pos += 1;
            let mut text = String::new();
            loop {
                let Some(ch) = src[pos..].chars().next() else {
                    return Err(syntax(start, "unterminated string literal"));
                };
                pos += ch.len_utf8();
                match ch {
                    '\\' => {
                        let Some(escaped) = src[pos..].chars().next() else {
                            return Err(syntax(start, "unterminated string literal"));
                        };
                        pos += escaped.len_utf8();
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                    }
                    ch if ch == c => break,
                    ch => text.push(ch),
                }
            }
            tokens.push((start, Token::Str(text)));
            continue;
        }

        match PUNCTUATION.iter().find(|p| src[pos..].starts_with(**p)) {
            Some(p) => {
                tokens.push((pos, Token::Punct(p)));
                pos += p.len();
            }
            None => return Err(syntax(pos, format!("unexpected character '{}'", c))),
        }
    }

    tokens.push((src.len(), Token::End));
    Ok(tokens)
}

/// Parse an expression
pub fn parse(src: &str) -> InterpolationResult<Expr> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or()?;
    match parser.peek() {
        Token::End => Ok(expr),
        other => Err(syntax(
            parser.offset(),
            format!("unexpected {} after expression", describe(other)),
        )),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(name) => format!("'{}'", name),
        Token::Int(i) => format!("'{}'", i),
        Token::Str(s) => format!("{:?}", s),
        Token::Punct(p) => format!("'{}'", p),
        Token::End => "end of expression".to_string(),
    }
}

/// Deepest nesting of parens, brackets and prefix operators
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].1
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].1
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].0
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].1.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if matches!(self.peek(), Token::Punct(q) if *q == p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if matches!(self.peek(), Token::Ident(name) if name == kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &'static str) -> InterpolationResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(syntax(
                self.offset(),
                format!("expected '{}', found {}", p, describe(self.peek())),
            ))
        }
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> InterpolationResult<T>,
    ) -> InterpolationResult<T> {
        if self.depth >= MAX_DEPTH {
            return Err(syntax(self.offset(), "expression nests too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn or(&mut self) -> InterpolationResult<Expr> {
        self.nested(Self::or_chain)
    }

    fn or_chain(&mut self) -> InterpolationResult<Expr> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> InterpolationResult<Expr> {
        let mut left = self.not()?;
        while self.eat_keyword("and") {
            let right = self.not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(&mut self) -> InterpolationResult<Expr> {
        if self.eat_keyword("not") {
            let inner = self.nested(Self::not)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.compare()
    }

    fn compare(&mut self) -> InterpolationResult<Expr> {
        let left = self.sum()?;
        let op = match self.peek() {
            Token::Punct("==") => BinaryOp::Eq,
            Token::Punct("!=") => BinaryOp::Ne,
            Token::Punct("<") => BinaryOp::Lt,
            Token::Punct("<=") => BinaryOp::Le,
            Token::Punct(">") => BinaryOp::Gt,
            Token::Punct(">=") => BinaryOp::Ge,
            Token::Ident(kw) if kw == "in" => BinaryOp::In,
            Token::Ident(kw)
                if kw == "not" && matches!(self.peek_at(1), Token::Ident(next) if next == "in") =>
            {
                BinaryOp::NotIn
            }
            _ => return Ok(left),
        };
        if op == BinaryOp::NotIn {
            self.advance();
        }
        self.advance();
        let right = self.sum()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn sum(&mut self) -> InterpolationResult<Expr> {
        let mut left = self.product()?;
        loop {
            let op = match self.peek() {
                Token::Punct("+") => BinaryOp::Add,
                Token::Punct("-") => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.product()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn product(&mut self) -> InterpolationResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Punct("*") => BinaryOp::Mul,
                Token::Punct("/") => BinaryOp::Div,
                Token::Punct("%") => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> InterpolationResult<Expr> {
        if self.eat_punct("-") {
            let inner = self.nested(Self::unary)?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> InterpolationResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_punct(".") {
                let offset = self.offset();
                match self.advance() {
                    Token::Ident(name) => expr = Expr::Attr(Box::new(expr), name),
                    other => {
                        return Err(syntax(
                            offset,
                            format!("expected attribute name, found {}", describe(&other)),
                        ))
                    }
                }
            } else if self.eat_punct("[") {
                let index = self.or()?;
                self.expect_punct("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if matches!(self.peek(), Token::Punct("(")) {
                let offset = self.offset();
                let Expr::Name(function) = expr else {
                    return Err(syntax(offset, "only builtin functions can be called"));
                };
                self.advance();
                let args = self.items(")")?;
                expr = Expr::Call(function, args);
            } else {
                return Ok(expr);
            }
        }
    }

    fn items(&mut self, close: &'static str) -> InterpolationResult<Vec<Expr>> {
        let mut items = Vec::new();
        if self.eat_punct(close) {
            return Ok(items);
        }
        loop {
            items.push(self.or()?);
            if self.eat_punct(close) {
                return Ok(items);
            }
            self.expect_punct(",")?;
            // trailing comma
            if self.eat_punct(close) {
                return Ok(items);
            }
        }
    }

    fn primary(&mut self) -> InterpolationResult<Expr> {
        let offset = self.offset();
        match self.advance() {
            Token::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::Ident(name) => Ok(match name.as_str() {
                "True" | "true" => Expr::Literal(Value::Bool(true)),
                "False" | "false" => Expr::Literal(Value::Bool(false)),
                "None" | "none" => Expr::Literal(Value::None),
                "and" | "or" | "not" | "in" | "if" | "elif" | "else" | "endif" => {
                    return Err(syntax(offset, format!("unexpected keyword '{}'", name)))
                }
                _ => Expr::Name(name),
            }),
            Token::Punct("(") => {
                let inner = self.or()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            Token::Punct("[") => Ok(Expr::List(self.items("]")?)),
            other => Err(syntax(offset, format!("unexpected {}", describe(&other)))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> Box<Expr> {
        Box::new(Expr::Name(n.to_string()))
    }

    #[test]
    fn test_parse_attribute_chain() {
        let expr = parse("env.config.general").unwrap();
        assert_eq!(
            expr,
            Expr::Attr(
                Box::new(Expr::Attr(name("env"), "config".to_string())),
                "general".to_string()
            )
        );
    }

    #[test]
    fn test_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Literal(Value::Int(1))),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::Literal(Value::Int(2))),
                    Box::new(Expr::Literal(Value::Int(3)))
                ))
            )
        );
    }

    #[test]
    fn test_call_and_index() {
        let expr = parse("len(task.files[0])").unwrap();
        assert!(matches!(expr, Expr::Call(ref f, ref args) if f == "len" && args.len() == 1));
    }

    #[test]
    fn test_not_in() {
        let expr = parse("'a' not in items").unwrap();
        assert!(matches!(expr, Expr::Binary(BinaryOp::NotIn, _, _)));
    }

    #[test]
    fn test_string_escapes() {
        let expr = parse(r#""a\"b""#).unwrap();
        assert_eq!(expr, Expr::Literal(Value::Str("a\"b".to_string())));
    }

    #[test]
    fn test_method_call_rejected() {
        let err = parse("config.path.strip()").unwrap_err();
        assert!(matches!(err, InterpolationError::InvalidSyntax { .. }));
    }

    #[test]
    fn test_unterminated_string() {
        let err = parse("'abc").unwrap_err();
        assert_eq!(
            err,
            InterpolationError::InvalidSyntax {
                offset: 0,
                message: "unterminated string literal".to_string()
            }
        );
    }

    #[test]
    fn test_trailing_tokens() {
        assert!(parse("a b").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        let err = parse(&deep).unwrap_err();
        assert!(matches!(err, InterpolationError::InvalidSyntax { .. }));
        assert!(err.to_string().contains("nests too deeply"));

        assert!(parse(&format!("{}x", "not ".repeat(200))).is_err());
        assert!(parse(&format!("{}1", "-".repeat(200))).is_err());
        assert!(parse(&format!("{}1{}", "[".repeat(200), "]".repeat(200))).is_err());
    }

    #[test]
    fn test_moderate_nesting_parses() {
        let nested = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        assert_eq!(parse(&nested).unwrap(), Expr::Literal(Value::Int(1)));
        assert!(parse("len([[1, 2], [3, (4 + -(-5))]]) > 1").is_ok());
    }
}
