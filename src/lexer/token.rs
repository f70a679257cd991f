use colored::Colorize;

/// Region of the original source text, tracked on every token and AST node.
/// `start` and `end` are zero based `(line, column)` pairs.
#[derive(Default, Debug, Clone, Eq, serde::Serialize, serde::Deserialize)]
pub struct Span {
    pub start: (usize, usize),
    pub end: (usize, usize),
    #[serde(skip)]
    pub source: String,
}

impl Span {
    pub fn to_string(&self, msg: impl ToString) -> String {
        let Span { start, end, source } = self;
        let lines = source.lines().collect::<Vec<_>>();
        if lines.is_empty() || start.0 >= lines.len() {
            return format!("{} (at {}:{})", msg.to_string(), start.0 + 1, start.1 + 1);
        }

        let line_str = lines[start.0];
        let prev_line = if start.0 > 0 { lines[start.0 - 1] } else { "" };

        let left_margin = format!("{}", end.0 + 2).len();
        let left_margin_fill = " ".repeat(left_margin);

        let split_at = start.1.min(line_str.len());
        let (left, right) = line_str.split_at(split_at);
        let marked = if start.0 != end.0 {
            // the error spans multiple lines, mark the rest of the first one
            format!("{left}{}", right.red())
        } else {
            let err_len = (end.1.saturating_sub(start.1)).min(right.len()).max(1);
            let (err_str, after_err) = right.split_at(err_len.min(right.len()));
            format!("{left}{}{after_err}", err_str.red())
        };

        let mut error_string = format!(
            "{left_margin_fill} |\n{left_margin_fill} |{prev_line}\n{line} |{marked}",
            line = start.0 + 1
        );

        for line_number in (start.0 + 1)..=(end.0.min(lines.len() - 1)) {
            error_string = format!(
                "{error_string}\n{left_margin_fill} |{}",
                lines[line_number].red()
            );
        }

        let left_padding_fill = " ".repeat(split_at);
        format!(
            "{error_string}\n{left_margin_fill} |{left_padding_fill}^--- {}\n{left_margin_fill} |",
            msg.to_string()
        )
    }

    pub fn merge(&self, other: &Span) -> Span {
        let Span { start, source, .. } = self.clone();
        let Span { end, .. } = other.clone();

        Span { start, end, source }
    }
}

impl PartialEq for Span {
    fn eq(&self, _other: &Span) -> bool {
        // spans never take part in structural comparisons of tokens or nodes
        true
    }
}

impl std::hash::Hash for Span {
    fn hash<H: std::hash::Hasher>(&self, _state: &mut H) {}
}

/// Lexical category of a token. The text itself lives in [`Token::text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TokenKind {
    Keyword,
    Identifier,
    Number,
    String,
    Character,
    Operator,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Keyword => f.write_str("keyword"),
            TokenKind::Identifier => f.write_str("identifier"),
            TokenKind::Number => f.write_str("number"),
            TokenKind::String => f.write_str("string"),
            TokenKind::Character => f.write_str("character"),
            TokenKind::Operator => f.write_str("operator"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub position: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl ToString, position: Span) -> Token {
        Token {
            kind,
            text: text.to_string(),
            position,
        }
    }

    pub fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.text)
    }
}
