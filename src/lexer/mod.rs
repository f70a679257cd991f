//! Lexical analysis for STELA source text.
//!
//! The lexer walks the input byte by byte and dispatches on the first
//! character of every token: letters start identifiers (split into keywords
//! by table lookup afterwards), digits and sign characters start numbers,
//! quotes start string and character literals, and everything else is
//! matched longest-first against the operator table. Tokens carry their
//! original text and a [`Span`] for diagnostics.

mod token;

pub use token::*;

use std::{error::Error, fmt::Display};

use once_cell::sync::Lazy;

pub const KEYWORDS: &[&str] = &[
    "module",
    "import",
    "extern",
    "func",
    "return",
    "ref",
    "var",
    "let",
    "type",
    "if",
    "else",
    "switch",
    "case",
    "default",
    "while",
    "for",
    "break",
    "continue",
    "terminate",
    "make",
    "struct",
    "true",
    "false",
];

/// Sorted longest first so that a linear scan implements longest-match.
static OPERATORS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    let mut ops = vec![
        "<<=", ">>=", "==", "!=", "<=", ">=", "&&", "||", "->", "<<", ">>", "+=", "-=", "*=",
        "/=", "%=", "&=", "|=", "^=", "++", "--", ":=", "=", "!", "<", ">", "&", "|", "^", "~",
        "{", "}", "(", ")", "[", "]", "+", "-", "*", "/", "%", ".", ",", ":", ";", "?",
    ];
    ops.sort_by_key(|op| std::cmp::Reverse(op.len()));
    ops
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    InvalidToken { character: char, position: Span },
    UnterminatedLiteral { position: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::InvalidToken { position, .. } => position.clone(),
            LexError::UnterminatedLiteral { position } => position.clone(),
        }
    }
}

impl Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexError::InvalidToken { character, position } => f.write_str(
                position
                    .to_string(format!("Invalid token '{character}'"))
                    .as_str(),
            ),
            LexError::UnterminatedLiteral { position } => {
                f.write_str(position.to_string("Unterminated literal").as_str())
            }
        }
    }
}

impl Error for LexError {}

pub type LexResult<T> = Result<T, LexError>;

pub struct Lexer<'a> {
    tokens: Vec<Token>,
    position: usize,
    col: usize,
    line: usize,
    input: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            tokens: vec![],
            position: 0,
            col: 0,
            line: 0,
            input,
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek(0) {
            if c == b'\n' {
                self.line += 1;
                self.col = 0;
            } else {
                self.col += 1;
            }
            self.position += 1;
        }
    }

    fn eat_whitespace_and_comments(&mut self) {
        loop {
            while let Some(c) = self.peek(0) {
                if !c.is_ascii_whitespace() {
                    break;
                }
                self.advance();
            }
            // line comments run to the end of the line
            if self.peek(0) == Some(b'/') && self.peek(1) == Some(b'/') {
                while let Some(c) = self.peek(0) {
                    if c == b'\n' {
                        break;
                    }
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    fn span_from(&self, start: (usize, usize)) -> Span {
        Span {
            start,
            end: (self.line, self.col),
            source: self.input.to_string(),
        }
    }

    fn here(&self) -> Span {
        Span {
            start: (self.line, self.col),
            end: (self.line, self.col + 1),
            source: self.input.to_string(),
        }
    }

    /// A sign character only begins a number when the previous token cannot
    /// end an operand; otherwise `a-1` would lex as two tokens.
    fn starts_number(&self, c: u8) -> bool {
        if c.is_ascii_digit() {
            return true;
        }
        if c == b'.' {
            return matches!(self.peek(1), Some(d) if d.is_ascii_digit());
        }
        if c != b'+' && c != b'-' {
            return false;
        }
        let digit_follows = matches!(self.peek(1), Some(d) if d.is_ascii_digit() || d == b'.');
        if !digit_follows {
            return false;
        }
        match self.tokens.last() {
            None => true,
            Some(tok) => !matches!(
                tok.kind,
                TokenKind::Identifier | TokenKind::Number | TokenKind::String | TokenKind::Character
            ) && !(tok.kind == TokenKind::Operator && (tok.text == ")" || tok.text == "]")),
        }
    }

    fn lex_identifier(&mut self) -> Token {
        let start = (self.line, self.col);
        let text_start = self.position;
        while let Some(c) = self.peek(0) {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.input[text_start..self.position];
        let kind = if KEYWORDS.contains(&text) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        };
        Token::new(kind, text, self.span_from(start))
    }

    fn lex_number(&mut self) -> Token {
        let start = (self.line, self.col);
        let text_start = self.position;
        // optional sign
        if matches!(self.peek(0), Some(b'+') | Some(b'-')) {
            self.advance();
        }
        while let Some(c) = self.peek(0) {
            let cont = c.is_ascii_hexdigit()
                || c == b'.'
                || c == b'x'
                || c == b'X'
                || c == b'u'
                || c == b'e'
                || c == b'E';
            if !cont {
                break;
            }
            // `1e-3` keeps its exponent sign
            let exp = c == b'e' || c == b'E';
            self.advance();
            if exp && matches!(self.peek(0), Some(b'+') | Some(b'-')) {
                self.advance();
            }
        }
        let text = &self.input[text_start..self.position];
        Token::new(TokenKind::Number, text, self.span_from(start))
    }

    fn lex_quoted(&mut self, quote: u8, kind: TokenKind) -> LexResult<Token> {
        let start = (self.line, self.col);
        let text_start = self.position;
        self.advance();
        loop {
            match self.peek(0) {
                None | Some(b'\n') => {
                    return Err(LexError::UnterminatedLiteral {
                        position: self.here(),
                    })
                }
                Some(b'\\') => {
                    // an escape consumes the next character unconditionally
                    self.advance();
                    self.advance();
                }
                Some(c) if c == quote => {
                    self.advance();
                    let text = &self.input[text_start..self.position];
                    return Ok(Token::new(kind, text, self.span_from(start)));
                }
                Some(_) => self.advance(),
            }
        }
    }

    fn lex_operator(&mut self) -> LexResult<Token> {
        let start = (self.line, self.col);
        let text_start = self.position;
        let rest = &self.input[self.position..];
        for op in OPERATORS.iter() {
            if rest.starts_with(op) {
                for _ in 0..op.len() {
                    self.advance();
                }
                return Ok(Token::new(
                    TokenKind::Operator,
                    &self.input[text_start..self.position],
                    self.span_from(start),
                ));
            }
        }
        Err(LexError::InvalidToken {
            character: rest.chars().next().unwrap_or('\0'),
            position: self.here(),
        })
    }

    pub fn lex(mut self) -> LexResult<Vec<Token>> {
        loop {
            self.eat_whitespace_and_comments();
            let Some(c) = self.peek(0) else {
                return Ok(self.tokens);
            };

            let token = if c.is_ascii_alphabetic() || c == b'_' {
                self.lex_identifier()
            } else if self.starts_number(c) {
                self.lex_number()
            } else if c == b'"' {
                self.lex_quoted(b'"', TokenKind::String)?
            } else if c == b'\'' {
                self.lex_quoted(b'\'', TokenKind::Character)?
            } else {
                self.lex_operator()?
            };
            self.tokens.push(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(TokenKind, String)> {
        Lexer::new(source)
            .lex()
            .expect("lexing failed")
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_lex_keywords_and_identifiers() {
        assert_eq!(
            kinds("func myFunc ref refs"),
            vec![
                (TokenKind::Keyword, "func".into()),
                (TokenKind::Identifier, "myFunc".into()),
                (TokenKind::Keyword, "ref".into()),
                (TokenKind::Identifier, "refs".into()),
            ]
        );
    }

    #[test]
    fn test_lex_numbers() {
        assert_eq!(
            kinds("0 36 0u 3.14 1e3 0xff"),
            vec![
                (TokenKind::Number, "0".into()),
                (TokenKind::Number, "36".into()),
                (TokenKind::Number, "0u".into()),
                (TokenKind::Number, "3.14".into()),
                (TokenKind::Number, "1e3".into()),
                (TokenKind::Number, "0xff".into()),
            ]
        );
    }

    #[test]
    fn test_minus_after_operand_is_operator() {
        assert_eq!(
            kinds("a-1u"),
            vec![
                (TokenKind::Identifier, "a".into()),
                (TokenKind::Operator, "-".into()),
                (TokenKind::Number, "1u".into()),
            ]
        );
        // but a leading sign binds to the literal
        assert_eq!(
            kinds("(-11)"),
            vec![
                (TokenKind::Operator, "(".into()),
                (TokenKind::Number, "-11".into()),
                (TokenKind::Operator, ")".into()),
            ]
        );
    }

    #[test]
    fn test_lex_operators_longest_match() {
        assert_eq!(
            kinds("a <<= b << c <= d"),
            vec![
                (TokenKind::Identifier, "a".into()),
                (TokenKind::Operator, "<<=".into()),
                (TokenKind::Identifier, "b".into()),
                (TokenKind::Operator, "<<".into()),
                (TokenKind::Identifier, "c".into()),
                (TokenKind::Operator, "<=".into()),
                (TokenKind::Identifier, "d".into()),
            ]
        );
    }

    #[test]
    fn test_lex_string_and_char() {
        assert_eq!(
            kinds(r#""hello \"there\"" 'a' '\n'"#),
            vec![
                (TokenKind::String, r#""hello \"there\"""#.into()),
                (TokenKind::Character, "'a'".into()),
                (TokenKind::Character, r"'\n'".into()),
            ]
        );
    }

    #[test]
    fn test_lex_comments() {
        assert_eq!(
            kinds("a // rest of line\nb"),
            vec![
                (TokenKind::Identifier, "a".into()),
                (TokenKind::Identifier, "b".into()),
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let result = Lexer::new("\"not closed\nnext").lex();
        assert!(matches!(
            result,
            Err(LexError::UnterminatedLiteral { .. })
        ));
    }

    #[test]
    fn test_invalid_token() {
        let result = Lexer::new("let x = @").lex();
        assert!(matches!(result, Err(LexError::InvalidToken { character: '@', .. })));
    }

    #[test]
    fn test_positions() {
        let tokens = Lexer::new("ab\n  cd").lex().expect("lexing failed");
        assert_eq!(tokens[0].position.start, (0, 0));
        assert_eq!(tokens[1].position.start, (1, 2));
    }
}
