//! Tokenizer for the textual IR.

use super::{ParseError, ParseResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Bare identifier: keywords, op names and types (`tensor<4xi32>` is one token)
    Ident(String),
    /// `@name`
    Symbol(String),
    /// `%name`
    Value(String),
    /// Decimal or `0x` hex literal
    Int(u128),
    /// `"text"`
    Str(String),
    Equals,
    Comma,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
}

/// A token with its 1-indexed line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
    pub col: u32,
}

pub struct Lexer<'input> {
    chars: std::iter::Peekable<std::str::Chars<'input>>,
    line: u32,
    col: u32,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$')
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        Self { chars: input.chars().peekable(), line: 1, col: 1 }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::LexerError { line: self.line as usize, message: message.into() }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if !pred(c) {
                break;
            }
            text.push(c);
            self.bump();
        }
        text
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    // `//` comments run to the end of the line
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    if ahead.next() != Some('/') {
                        return;
                    }
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn ident(&mut self) -> ParseResult<String> {
        let mut text = self.take_while(is_ident_char);
        if self.chars.peek() == Some(&'<') {
            // Parameterized type: swallow the balanced `<...>`.
            let mut depth = 0;
            while let Some(&c) = self.chars.peek() {
                if c == '\n' {
                    return Err(self.error(format!("unterminated type '{}'", text)));
                }
                text.push(c);
                self.bump();
                match c {
                    '<' => depth += 1,
                    '>' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
            }
            if depth != 0 {
                return Err(self.error(format!("unterminated type '{}'", text)));
            }
        }
        Ok(text)
    }

    fn number(&mut self) -> ParseResult<u128> {
        let text = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let digits = text.replace('_', "");
        let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            Some(hex) => u128::from_str_radix(hex, 16),
            None => digits.parse::<u128>(),
        };
        parsed.map_err(|_| self.error(format!("invalid integer literal '{}'", text)))
    }

    fn string(&mut self) -> ParseResult<String> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(text),
                Some('\n') | None => return Err(self.error("unterminated string literal")),
                Some(c) => text.push(c),
            }
        }
    }

    fn next_token(&mut self) -> ParseResult<Option<Spanned>> {
        self.skip_trivia();
        let (line, col) = (self.line, self.col);
        let c = match self.chars.peek() {
            Some(&c) => c,
            None => return Ok(None),
        };

        let token = match c {
            '=' | ',' | ':' | '(' | ')' | '{' | '}' => {
                self.bump();
                match c {
                    '=' => Token::Equals,
                    ',' => Token::Comma,
                    ':' => Token::Colon,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '{' => Token::LBrace,
                    _ => Token::RBrace,
                }
            }
            '@' | '%' => {
                self.bump();
                let name = self.take_while(is_ident_char);
                if name.is_empty() {
                    return Err(self.error(format!("expected a name after '{}'", c)));
                }
                if c == '@' {
                    Token::Symbol(name)
                } else {
                    Token::Value(name)
                }
            }
            '"' => Token::Str(self.string()?),
            c if c.is_ascii_digit() => Token::Int(self.number()?),
            c if is_ident_start(c) => Token::Ident(self.ident()?),
            other => return Err(self.error(format!("unexpected character '{}'", other))),
        };
        Ok(Some(Spanned { token, line, col }))
    }

    /// Tokenize the whole input.
    pub fn tokenize(mut self) -> ParseResult<Vec<Spanned>> {
        let mut tokens = Vec::new();
        while let Some(tok) = self.next_token()? {
            tokens.push(tok);
        }
        Ok(tokens)
    }
}
