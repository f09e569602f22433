//! Recursive-descent parser implementing the expression grammar
//! (specification §4.4), precedence low→high:
//! `or → and → eq → rel → add → mul → un → primary`.

use thiserror::Error;
use veto_core::value::path::ArgPath;

use crate::ast::{BinOp, Expr, Literal, UnOp};
use crate::lexer::{tokenize, LexError, Token};

/// A parse error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Lexing failed before parsing could begin.
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    /// The token stream ended before a complete expression was parsed.
    #[error("unexpected end of expression")]
    UnexpectedEof,
    /// A token appeared where it could not be used.
    #[error("unexpected token: {0:?}")]
    UnexpectedToken(Token),
    /// The parsed AST exceeds the maximum allowed depth.
    #[error("expression AST depth {depth} exceeds the maximum of {max}")]
    TooDeep {
        /// Depth reached.
        depth: u32,
        /// Configured maximum.
        max: u32,
    },
    /// A path segment could not be parsed (e.g. non-integer array index).
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Parse expression-language source into an AST, rejecting any result
/// whose depth exceeds [`Expr::MAX_DEPTH`](crate::ast::Expr::MAX_DEPTH).
///
/// The cap is checked against the depth of the constructed [`Expr`] tree,
/// not the parser's recursive-descent call stack: those differ because
/// every precedence level (`or` through `primary`) re-descends for a
/// single AST node, so a structurally shallow but heavily parenthesized
/// expression like `((((a))))` would otherwise be rejected even though
/// its tree depth is 1.
pub fn parse(src: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    parser.expect_eof()?;
    let depth = expr.depth();
    if depth > Expr::MAX_DEPTH {
        return Err(ParseError::TooDeep { depth, max: Expr::MAX_DEPTH });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if matches!(self.peek(), Token::Eof) {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken(self.peek().clone()))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Token::OrOr) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_eq()?;
        while matches!(self.peek(), Token::AndAnd) {
            self.advance();
            let rhs = self.parse_eq()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_eq(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_rel()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_rel()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_rel(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_add()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Gt => BinOp::Gt,
                Token::Le => BinOp::Le,
                Token::Ge => BinOp::Ge,
                Token::In => BinOp::In,
                Token::NotIn => BinOp::NotIn,
                Token::Contains => BinOp::Contains,
                Token::Matches => BinOp::Matches,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_add()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_un()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_un()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_un(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Token::Bang => {
                self.advance();
                let inner = self.parse_un()?;
                Ok(Expr::Unary(UnOp::Not, Box::new(inner)))
            }
            Token::Minus => {
                self.advance();
                let inner = self.parse_un()?;
                Ok(Expr::Unary(UnOp::Neg, Box::new(inner)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Number(n)))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(s)))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                match self.advance() {
                    Token::RParen => Ok(inner),
                    other => Err(ParseError::UnexpectedToken(other)),
                }
            }
            Token::Ident(name) => {
                self.advance();
                if matches!(self.peek(), Token::LParen) {
                    self.parse_call(name)
                } else {
                    self.parse_path_tail(name)
                }
            }
            Token::Eof => Err(ParseError::UnexpectedEof),
            other => Err(ParseError::UnexpectedToken(other)),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, ParseError> {
        self.advance(); // consume '('
        let mut args = Vec::new();
        if !matches!(self.peek(), Token::RParen) {
            args.push(self.parse_or()?);
            while matches!(self.peek(), Token::Comma) {
                self.advance();
                args.push(self.parse_or()?);
            }
        }
        match self.advance() {
            Token::RParen => Ok(Expr::Call(name, args)),
            other => Err(ParseError::UnexpectedToken(other)),
        }
    }

    /// Parses the `('.' IDENT | '[' INT ']' | '[' '*' ']')*` tail of a path
    /// given its already-consumed leading identifier, re-rendering the
    /// whole thing through [`ArgPath::parse`] for a single source of path
    /// semantics.
    fn parse_path_tail(&mut self, head: String) -> Result<Expr, ParseError> {
        let mut rendered = head;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    match self.advance() {
                        Token::Ident(name) => {
                            rendered.push('.');
                            rendered.push_str(&name);
                        }
                        other => return Err(ParseError::UnexpectedToken(other)),
                    }
                }
                Token::LBracket => {
                    self.advance();
                    match self.advance() {
                        Token::Number(n) => {
                            rendered.push_str(&format!("[{}]", n as i64));
                        }
                        Token::Star => rendered.push_str("[*]"),
                        other => return Err(ParseError::UnexpectedToken(other)),
                    }
                    match self.advance() {
                        Token::RBracket => {}
                        other => return Err(ParseError::UnexpectedToken(other)),
                    }
                }
                _ => break,
            }
        }
        let path = ArgPath::parse(&rendered).map_err(|e| ParseError::InvalidPath(e.to_string()))?;
        Ok(Expr::Path(path))
    }
}
