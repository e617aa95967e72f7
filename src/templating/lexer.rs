//! Tokenizer for the template language.
//!
//! Text outside delimiters becomes a single [`TokenKind::Text`] token. Inside
//! `{{ ... }}` and `{% ... %}` the lexer produces expression tokens; `{# ... #}`
//! comments are dropped. Every token records its 0-based line/column and the
//! byte offset where it starts.

use super::ast::{CompareOp, Location};
use super::error::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Text(String),
    VariableStart,
    VariableEnd,
    BlockStart,
    BlockEnd,
    Symbol(String),
    Str(String),
    Int(i64),
    Float(f64),
    Compare(CompareOp),
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Eof,
}

impl TokenKind {
    /// Short description used in "expected X, but got Y" messages.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::VariableStart => "variable start",
            Self::VariableEnd => "variable end",
            Self::BlockStart => "block start",
            Self::BlockEnd => "block end",
            Self::Symbol(_) => "symbol",
            Self::Str(_) => "string",
            Self::Int(_) | Self::Float(_) => "number",
            Self::Compare(_) => "operator",
            Self::LeftParen => "left-paren",
            Self::RightParen => "right-paren",
            Self::LeftBracket => "left-bracket",
            Self::RightBracket => "right-bracket",
            Self::Comma => "comma",
            Self::Dot => "dot",
            Self::Eof => "end of template",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
    /// Byte offset of the first character of the token
    pub offset: usize,
}

pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    in_code: bool,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub const fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 0,
            column: 0,
            in_code: false,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();
        loop {
            if self.in_code {
                self.skip_whitespace();
                if self.at_end() {
                    return Err(CompileError::new(
                        "Unexpected end of template, expected a closing delimiter",
                        self.location(),
                    ));
                }
                tokens.push(self.code_token()?);
            } else {
                if self.at_end() {
                    tokens.push(self.token(TokenKind::Eof, self.location(), self.pos));
                    return Ok(tokens);
                }
                if let Some(text) = self.text_token() {
                    tokens.push(text);
                    continue;
                }
                let location = self.location();
                let offset = self.pos;
                if self.rest().starts_with("{#") {
                    self.skip_comment(location)?;
                } else if self.rest().starts_with("{{") {
                    self.advance(2);
                    self.in_code = true;
                    tokens.push(self.token(TokenKind::VariableStart, location, offset));
                } else {
                    self.advance(2);
                    self.in_code = true;
                    tokens.push(self.token(TokenKind::BlockStart, location, offset));
                }
            }
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    const fn location(&self) -> Location {
        Location {
            line: self.line,
            column: self.column,
        }
    }

    const fn token(&self, kind: TokenKind, location: Location, offset: usize) -> Token {
        Token {
            kind,
            location,
            offset,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn advance(&mut self, count: usize) {
        for _ in 0..count {
            self.bump();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// Consume literal text up to the next delimiter.
    fn text_token(&mut self) -> Option<Token> {
        let location = self.location();
        let start = self.pos;
        while !self.at_end() {
            let rest = self.rest();
            if rest.starts_with("{{") || rest.starts_with("{%") || rest.starts_with("{#") {
                break;
            }
            self.bump();
        }
        if self.pos == start {
            return None;
        }
        let text = self.source[start..self.pos].to_string();
        Some(self.token(TokenKind::Text(text), location, start))
    }

    fn skip_comment(&mut self, start: Location) -> Result<(), CompileError> {
        self.advance(2);
        while !self.at_end() {
            if self.rest().starts_with("#}") {
                self.advance(2);
                return Ok(());
            }
            self.bump();
        }
        Err(CompileError::new("Unterminated comment", start))
    }

    fn code_token(&mut self) -> Result<Token, CompileError> {
        let location = self.location();
        let offset = self.pos;
        let rest = self.rest();

        if rest.starts_with("}}") {
            self.advance(2);
            self.in_code = false;
            return Ok(self.token(TokenKind::VariableEnd, location, offset));
        }
        if rest.starts_with("%}") {
            self.advance(2);
            self.in_code = false;
            return Ok(self.token(TokenKind::BlockEnd, location, offset));
        }

        let Some(c) = self.peek() else {
            return Err(CompileError::new("Unexpected end of template", location));
        };

        let kind = match c {
            '\'' | '"' => self.string(c, location)?,
            c if c.is_ascii_digit() => self.number(location)?,
            c if c.is_alphabetic() || c == '_' => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                    self.bump();
                }
                TokenKind::Symbol(self.source[start..self.pos].to_string())
            }
            '=' | '!' | '<' | '>' => self.operator(c, location)?,
            _ => {
                self.bump();
                match c {
                    '(' => TokenKind::LeftParen,
                    ')' => TokenKind::RightParen,
                    '[' => TokenKind::LeftBracket,
                    ']' => TokenKind::RightBracket,
                    ',' => TokenKind::Comma,
                    '.' => TokenKind::Dot,
                    other => {
                        return Err(CompileError::new(
                            format!("Unexpected character '{other}'"),
                            location,
                        ));
                    }
                }
            }
        };
        Ok(self.token(kind, location, offset))
    }

    fn string(&mut self, quote: char, start: Location) -> Result<TokenKind, CompileError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(CompileError::new("Unterminated string literal", start)),
                Some(c) if c == quote => return Ok(TokenKind::Str(value)),
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some(other) => value.push(other),
                    None => return Err(CompileError::new("Unterminated string literal", start)),
                },
                Some(c) => value.push(c),
            }
        }
    }

    fn number(&mut self, start: Location) -> Result<TokenKind, CompileError> {
        let begin = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        let is_float = self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        let text = &self.source[begin..self.pos];
        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| CompileError::new(format!("Invalid number '{text}'"), start))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| CompileError::new(format!("Invalid number '{text}'"), start))
        }
    }

    fn operator(&mut self, first: char, start: Location) -> Result<TokenKind, CompileError> {
        self.bump();
        let followed_by_eq = self.peek() == Some('=');
        let op = match (first, followed_by_eq) {
            ('=', true) => CompareOp::Eq,
            ('!', true) => CompareOp::Ne,
            ('<', true) => CompareOp::Le,
            ('>', true) => CompareOp::Ge,
            ('<', false) => CompareOp::Lt,
            ('>', false) => CompareOp::Gt,
            (other, _) => {
                return Err(CompileError::new(format!("Unexpected character '{other}'"), start));
            }
        };
        if followed_by_eq {
            self.bump();
        }
        Ok(TokenKind::Compare(op))
    }
}
