//! Byte-level tokenizer for PDF object syntax.

use crate::error::{PdfError, Result};

/// PDF file-structure keywords. Known keywords are zero-allocation variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Keyword {
    // Structural
    ArrayStart, // [
    ArrayEnd,   // ]
    DictStart,  // <<
    DictEnd,    // >>

    // Primitives
    True,
    False,
    Null,

    // Object structure
    Obj,
    EndObj,
    R,
    Stream,
    EndStream,
    Xref,
    Trailer,
    StartXref,

    // Xref table entry types
    N,
    F,

    // Unknown (preserves original bytes)
    Unknown(Vec<u8>),
}

impl Keyword {
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"[" => Keyword::ArrayStart,
            b"]" => Keyword::ArrayEnd,
            b"<<" => Keyword::DictStart,
            b">>" => Keyword::DictEnd,
            b"true" => Keyword::True,
            b"false" => Keyword::False,
            b"null" => Keyword::Null,
            b"obj" => Keyword::Obj,
            b"endobj" => Keyword::EndObj,
            b"R" => Keyword::R,
            b"stream" => Keyword::Stream,
            b"endstream" => Keyword::EndStream,
            b"xref" => Keyword::Xref,
            b"trailer" => Keyword::Trailer,
            b"startxref" => Keyword::StartXref,
            b"n" => Keyword::N,
            b"f" => Keyword::F,
            _ => Keyword::Unknown(b.to_vec()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Keyword::ArrayStart => b"[",
            Keyword::ArrayEnd => b"]",
            Keyword::DictStart => b"<<",
            Keyword::DictEnd => b">>",
            Keyword::True => b"true",
            Keyword::False => b"false",
            Keyword::Null => b"null",
            Keyword::Obj => b"obj",
            Keyword::EndObj => b"endobj",
            Keyword::R => b"R",
            Keyword::Stream => b"stream",
            Keyword::EndStream => b"endstream",
            Keyword::Xref => b"xref",
            Keyword::Trailer => b"trailer",
            Keyword::StartXref => b"startxref",
            Keyword::N => b"n",
            Keyword::F => b"f",
            Keyword::Unknown(bytes) => bytes.as_slice(),
        }
    }
}

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Integer value
    Int(i64),
    /// Floating point value
    Real(f64),
    /// Boolean value
    Bool(bool),
    /// Name (e.g., /Type)
    Name(String),
    /// String (literal or hex)
    String(Vec<u8>),
    /// Keyword
    Keyword(Keyword),
}

/// Tokenizer over an in-memory PDF byte slice.
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
    /// Position where the current token started
    token_pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            token_pos: 0,
        }
    }

    /// Current position in stream
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Set current position in stream.
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
        self.token_pos = pos;
    }

    /// The underlying byte slice.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Get remaining unparsed data
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    pub(crate) fn is_whitespace(b: u8) -> bool {
        matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
    }

    pub(crate) fn is_delimiter(b: u8) -> bool {
        matches!(
            b,
            b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
        )
    }

    fn is_keyword_end(b: u8) -> bool {
        Self::is_whitespace(b) || Self::is_delimiter(b)
    }

    /// Skip whitespace and comments
    fn skip_whitespace(&mut self) {
        while self.pos < self.data.len() {
            let b = self.data[self.pos];
            if b == b'%' {
                self.pos += 1; // consume '%'
                if let Some(offset) = find_line_end(&self.data[self.pos..]) {
                    self.pos += offset + 1; // consume line ending
                } else {
                    self.pos = self.data.len();
                }
                continue;
            }
            if !Self::is_whitespace(b) {
                return;
            }
            self.pos += 1;
        }
    }

    /// Parse a name (/Name), decoding #xx hex escapes.
    fn parse_name(&mut self) -> Result<Token> {
        self.advance(); // Skip '/'
        let mut name = Vec::new();

        while let Some(b) = self.peek() {
            if Self::is_whitespace(b) || Self::is_delimiter(b) {
                break;
            }
            if b == b'#' {
                let h1 = self.peek_at(1).and_then(hex_value);
                let h2 = self.peek_at(2).and_then(hex_value);
                if let (Some(h1), Some(h2)) = (h1, h2) {
                    self.advance();
                    self.advance();
                    self.advance();
                    name.push((h1 << 4) | h2);
                    continue;
                }
                // Invalid hex escape: # is dropped, following bytes kept
                self.advance();
            } else {
                self.advance();
                name.push(b);
            }
        }

        Ok(Token::Name(name_from_bytes(&name)))
    }

    /// Parse a number (integer or real)
    fn parse_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut has_dot = false;

        if matches!(self.peek(), Some(b'+') | Some(b'-')) {
            self.advance();
        }

        if self.peek() == Some(b'.') {
            has_dot = true;
            self.advance();
        }

        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.advance();
            } else if b == b'.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let s = std::str::from_utf8(&self.data[start..self.pos]).map_err(|_| {
            PdfError::TokenError {
                pos: start,
                msg: "invalid number".into(),
            }
        })?;

        if has_dot {
            let val: f64 = s.parse().map_err(|_| PdfError::TokenError {
                pos: start,
                msg: format!("invalid real: {}", s),
            })?;
            Ok(Token::Real(val))
        } else {
            let val: i64 = s.parse().map_err(|_| PdfError::TokenError {
                pos: start,
                msg: format!("invalid int: {}", s),
            })?;
            Ok(Token::Int(val))
        }
    }

    /// Parse a literal string (...)
    fn parse_string(&mut self) -> Result<Token> {
        self.advance(); // Skip '('
        let mut result = Vec::new();
        let mut depth = 1;

        while depth > 0 {
            match self.advance() {
                Some(b'(') => {
                    depth += 1;
                    result.push(b'(');
                }
                Some(b')') => {
                    depth -= 1;
                    if depth > 0 {
                        result.push(b')');
                    }
                }
                Some(b'\\') => match self.advance() {
                    Some(b'n') => result.push(b'\n'),
                    Some(b'r') => result.push(b'\r'),
                    Some(b't') => result.push(b'\t'),
                    Some(b'b') => result.push(0x08),
                    Some(b'f') => result.push(0x0c),
                    Some(b'(') => result.push(b'('),
                    Some(b')') => result.push(b')'),
                    Some(b'\\') => result.push(b'\\'),
                    Some(b'\r') => {
                        // Line continuation - skip \r and optional \n
                        if self.peek() == Some(b'\n') {
                            self.advance();
                        }
                    }
                    Some(b'\n') => {
                        // Line continuation
                    }
                    Some(c) if c.is_ascii_digit() && c < b'8' => {
                        // Octal escape (1-3 digits)
                        let mut octal = (c - b'0') as u32;
                        for _ in 0..2 {
                            if let Some(d) = self.peek() {
                                if d.is_ascii_digit() && d < b'8' {
                                    self.advance();
                                    octal = octal * 8 + (d - b'0') as u32;
                                } else {
                                    break;
                                }
                            }
                        }
                        result.push((octal & 0xFF) as u8);
                    }
                    Some(c) => {
                        // Unknown escape, keep the character
                        result.push(c);
                    }
                    None => return Err(PdfError::UnexpectedEof),
                },
                Some(c) => result.push(c),
                None => return Err(PdfError::UnexpectedEof),
            }
        }

        Ok(Token::String(result))
    }

    /// Parse a hex string <...>
    fn parse_hex_string(&mut self) -> Result<Token> {
        self.advance(); // Skip '<'
        let mut result = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            match self.peek() {
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(c) => {
                    if let Some(nibble) = hex_value(c) {
                        self.pos += 1;
                        if let Some(high) = pending {
                            result.push((high << 4) | nibble);
                            pending = None;
                        } else {
                            pending = Some(nibble);
                        }
                    } else if Self::is_whitespace(c) {
                        self.pos += 1;
                    } else {
                        // Invalid character in hex string, stop here
                        break;
                    }
                }
                None => return Err(PdfError::UnexpectedEof),
            }
        }

        // Odd digit count: final nibble is padded with zero
        if let Some(nibble) = pending {
            result.push(nibble << 4);
        }

        Ok(Token::String(result))
    }

    /// Parse a keyword
    fn parse_keyword(&mut self) -> Result<Token> {
        let start = self.pos;

        while let Some(b) = self.peek() {
            if Self::is_keyword_end(b) {
                break;
            }
            self.advance();
        }

        let bytes = &self.data[start..self.pos];
        if bytes == b"true" {
            return Ok(Token::Bool(true));
        } else if bytes == b"false" {
            return Ok(Token::Bool(false));
        }

        Ok(Token::Keyword(Keyword::from_bytes(bytes)))
    }

    /// Get next token
    pub fn next_token(&mut self) -> Option<Result<(usize, Token)>> {
        self.skip_whitespace();

        if self.at_end() {
            return None;
        }

        self.token_pos = self.pos;
        let b = self.peek()?;

        let result = match b {
            b'/' => self.parse_name(),
            b'(' => self.parse_string(),
            b'<' => {
                if self.peek_at(1) == Some(b'<') {
                    self.advance();
                    self.advance();
                    Ok(Token::Keyword(Keyword::DictStart))
                } else {
                    self.parse_hex_string()
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'>') {
                    self.advance();
                    self.advance();
                    Ok(Token::Keyword(Keyword::DictEnd))
                } else {
                    // Lone '>' - invalid, preserve it as unknown
                    self.advance();
                    Ok(Token::Keyword(Keyword::Unknown(b">".to_vec())))
                }
            }
            b'[' => {
                self.advance();
                Ok(Token::Keyword(Keyword::ArrayStart))
            }
            b']' => {
                self.advance();
                Ok(Token::Keyword(Keyword::ArrayEnd))
            }
            b'+' | b'-' => {
                if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit() || c == b'.') {
                    self.parse_number()
                } else {
                    self.parse_keyword()
                }
            }
            b'.' => {
                if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
                    self.parse_number()
                } else {
                    self.parse_keyword()
                }
            }
            c if c.is_ascii_digit() => self.parse_number(),
            _ => self.parse_keyword(),
        };

        Some(result.map(|token| (self.token_pos, token)))
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn find_line_end(data: &[u8]) -> Option<usize> {
    data.iter().position(|&b| b == b'\r' || b == b'\n')
}

pub(crate) fn name_from_bytes(bytes: &[u8]) -> String {
    let mut name = String::with_capacity(bytes.len());
    for &b in bytes {
        name.push(char::from(b));
    }
    name
}
