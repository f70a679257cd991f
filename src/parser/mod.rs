//! Recursive-descent parser for STELA.
//!
//! Productions follow the grammar one function per rule. Each function peeks
//! at the current token and either returns `Ok(None)` ("not this
//! production"), consumes the construct, or fails with a [`ParseError`]
//! carrying the context stack of enclosing productions. The first error
//! terminates parsing of the module.

pub mod ast;
mod decl;
mod expr;
mod stat;
mod types;

pub(crate) use decl::parse_module;

use std::{error::Error, fmt::Display};

use crate::lexer::{Span, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub position: Span,
    /// Enclosing productions, innermost first.
    pub context: Vec<String>,
}

impl ParseError {
    pub fn span(&self) -> Span {
        self.position.clone()
    }

    fn describe(&self) -> String {
        let mut msg = self.message.clone();
        for ctx in &self.context {
            msg.push(' ');
            msg.push_str(ctx);
        }
        msg
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.position.to_string(self.describe()).as_str())
    }
}

impl Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

/// Mutable cursor over the token sequence.
pub struct ParseState<'a> {
    tokens: &'a [Token],
    index: usize,
    source: &'a str,
    context: Vec<String>,
}

impl<'a> ParseState<'a> {
    pub fn new(tokens: &'a [Token], source: &'a str) -> ParseState<'a> {
        ParseState {
            tokens,
            index: 0,
            source,
            context: vec![],
        }
    }

    pub fn empty(&self) -> bool {
        self.index >= self.tokens.len()
    }

    pub fn front(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn eof_span(&self) -> Span {
        let lines = self.source.lines().count();
        let line = lines.saturating_sub(1);
        let col = self.source.lines().last().map(str::len).unwrap_or(0);
        Span {
            start: (line, col),
            end: (line, col + 1),
            source: self.source.to_string(),
        }
    }

    pub fn loc(&self) -> Span {
        self.front()
            .map(|tok| tok.position.clone())
            .unwrap_or_else(|| self.eof_span())
    }

    pub fn last_loc(&self) -> Span {
        if self.index == 0 {
            return self.loc();
        }
        self.tokens[self.index - 1].position.clone()
    }

    pub fn push_context(&mut self, desc: impl ToString) {
        self.context.push(desc.to_string());
    }

    pub fn pop_context(&mut self) {
        self.context.pop();
    }

    pub fn error(&self, message: impl ToString) -> ParseError {
        let mut context = self.context.clone();
        context.reverse();
        ParseError {
            message: message.to_string(),
            position: self.loc(),
            context,
        }
    }

    fn check(&mut self, kind: TokenKind, text: &str) -> bool {
        match self.front() {
            Some(tok) if tok.is(kind, text) => {
                self.index += 1;
                true
            }
            _ => false,
        }
    }

    pub fn check_keyword(&mut self, text: &str) -> bool {
        self.check(TokenKind::Keyword, text)
    }

    pub fn check_op(&mut self, text: &str) -> bool {
        self.check(TokenKind::Operator, text)
    }

    pub fn peek_kind(&self, kind: TokenKind) -> bool {
        matches!(self.front(), Some(tok) if tok.kind == kind)
    }

    pub fn peek_op(&self, text: &str) -> bool {
        matches!(self.front(), Some(tok) if tok.is(TokenKind::Operator, text))
    }

    pub fn peek_keyword(&self, text: &str) -> bool {
        matches!(self.front(), Some(tok) if tok.is(TokenKind::Keyword, text))
    }

    fn expect_token(&self) -> ParseResult<&Token> {
        self.front().ok_or_else(|| self.error("Unexpected end of input"))
    }

    pub fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        let token = self.expect_token()?;
        if token.kind != kind {
            return Err(self.error(format!("Expected {kind} but found {token}")));
        }
        let token = token.clone();
        self.index += 1;
        Ok(token)
    }

    pub fn expect_text(&mut self, kind: TokenKind, text: &str) -> ParseResult<()> {
        let token = self.expect_token()?;
        if !token.is(kind, text) {
            return Err(self.error(format!("Expected {kind} {text} but found {token}")));
        }
        self.index += 1;
        Ok(())
    }

    pub fn expect_id(&mut self) -> ParseResult<Token> {
        self.expect(TokenKind::Identifier)
    }

    pub fn expect_op(&mut self, text: &str) -> ParseResult<()> {
        self.expect_text(TokenKind::Operator, text)
    }

    pub fn expect_keyword(&mut self, text: &str) -> ParseResult<()> {
        self.expect_text(TokenKind::Keyword, text)
    }

    /// `a` or `b`, returning which one matched.
    pub fn expect_either_op(&mut self, a: &'static str, b: &'static str) -> ParseResult<&'static str> {
        let token = self.expect_token()?;
        if token.is(TokenKind::Operator, a) {
            self.index += 1;
            Ok(a)
        } else if token.is(TokenKind::Operator, b) {
            self.index += 1;
            Ok(b)
        } else {
            Err(self.error(format!("Expected operator {a} or {b} but found {token}")))
        }
    }

    /// Consume redundant semicolons, which are allowed between declarations.
    pub fn extra_semi(&mut self) {
        while self.check_op(";") {}
    }
}

/// Unwraps an optional production, failing with `expected ...` if it did not
/// match. The node comes first so the production's borrow of the state ends
/// before the error path needs it.
pub(crate) fn expect_node<T>(
    node: Option<T>,
    state: &ParseState,
    expected: &str,
) -> ParseResult<T> {
    node.ok_or_else(|| state.error(format!("Expected {expected}")))
}

#[cfg(test)]
mod tests {
    use super::ast::*;
    use crate::lexer::Lexer;

    pub(crate) fn parse_source(source: &str) -> super::ParseResult<Module<()>> {
        let tokens = Lexer::new(source).lex().expect("lexing failed");
        super::parse_module(&tokens, source)
    }

    #[test]
    fn test_empty_module() {
        let module = parse_source("").expect("parse failed");
        assert_eq!(module.name, "main");
        assert!(module.decls.is_empty());
    }

    #[test]
    fn test_module_header_and_imports() {
        let module = parse_source("module vectors; import math; import util;").expect("parse failed");
        assert_eq!(module.name, "vectors");
        assert_eq!(
            module.imports().collect::<Vec<_>>(),
            vec!["math", "util"]
        );
    }

    #[test]
    fn test_error_context_stack() {
        let err = parse_source("func bad(a: ) {}").unwrap_err();
        let msg = err.describe();
        assert!(msg.contains("Expected type"), "{msg}");
        assert!(msg.contains("in parameter list"), "{msg}");
        assert!(msg.contains("in function"), "{msg}");
    }

    #[test]
    fn test_global_scope_rejects_statements() {
        assert!(parse_source("return 1;").is_err());
    }
}
