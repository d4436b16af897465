//! PDF object parser - converts tokens to PDF objects.

use crate::error::{PdfError, Result};
use crate::model::{PdfDict, PdfObject, PdfRef, PdfStream};
use crate::parser::lexer::{Keyword, Lexer, Token};
use bytes::Bytes;

/// Resolver for indirect `/Length` values on stream dictionaries.
///
/// Streams read straight from a file may declare their length as an
/// indirect reference; the document layer supplies the lookup.
pub type LengthResolver<'r> = &'r dyn Fn(PdfRef) -> Option<usize>;

/// Parses PDF object syntax from a byte slice.
///
/// Uses [`Lexer`] for tokenization and builds PDF objects, handling
/// indirect references (`num num R`) with token lookahead.
pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    /// Pushed-back tokens, popped before the lexer is consulted
    lookahead: Vec<Token>,
}

impl<'a> ObjectParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            lexer: Lexer::new(data),
            lookahead: Vec::new(),
        }
    }

    /// Create a parser positioned at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        let mut lexer = Lexer::new(data);
        lexer.set_pos(pos);
        Self {
            lexer,
            lookahead: Vec::new(),
        }
    }

    /// Current position in the underlying data.
    ///
    /// Only meaningful when the lookahead buffer is empty.
    pub fn tell(&self) -> usize {
        self.lexer.tell()
    }

    /// Reposition the parser, discarding any lookahead.
    pub fn set_pos(&mut self, pos: usize) {
        self.lookahead.clear();
        self.lexer.set_pos(pos);
    }

    /// Get next token (from lookahead or lexer)
    fn next_token(&mut self) -> Result<Option<Token>> {
        if let Some(tok) = self.lookahead.pop() {
            return Ok(Some(tok));
        }
        match self.lexer.next_token() {
            Some(Ok((_, tok))) => Ok(Some(tok)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Push token back to lookahead
    fn push_back(&mut self, tok: Token) {
        self.lookahead.push(tok);
    }

    /// Parse next PDF object
    pub fn parse_object(&mut self) -> Result<PdfObject> {
        let token = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
        self.token_to_object(token)
    }

    /// Consume the next token, requiring a specific keyword.
    pub fn expect_keyword(&mut self, expected: Keyword) -> Result<()> {
        match self.next_token()? {
            Some(Token::Keyword(kw)) if kw == expected => Ok(()),
            Some(tok) => Err(PdfError::TokenError {
                pos: self.lexer.tell(),
                msg: format!(
                    "expected {}, got {:?}",
                    String::from_utf8_lossy(expected.as_bytes()),
                    tok
                ),
            }),
            None => Err(PdfError::UnexpectedEof),
        }
    }

    /// Consume the next token, requiring an integer.
    pub fn expect_int(&mut self) -> Result<i64> {
        match self.next_token()? {
            Some(Token::Int(n)) => Ok(n),
            Some(tok) => Err(PdfError::TokenError {
                pos: self.lexer.tell(),
                msg: format!("expected integer, got {:?}", tok),
            }),
            None => Err(PdfError::UnexpectedEof),
        }
    }

    /// Convert a token to a PDF object
    fn token_to_object(&mut self, token: Token) -> Result<PdfObject> {
        match token {
            Token::Int(n) => {
                // Could be start of indirect reference: objid genno R
                if let Some(tok2) = self.next_token()? {
                    if let Token::Int(m) = tok2 {
                        if let Some(tok3) = self.next_token()? {
                            if tok3 == Token::Keyword(Keyword::R)
                                && n >= 0
                                && n <= u32::MAX as i64
                                && (0..=PdfRef::MAX_GEN as i64).contains(&m)
                            {
                                return Ok(PdfObject::Ref(PdfRef::new(n as u32, m as u16)));
                            }
                            // Not R, push back both (stack order: tok3 pops last)
                            self.push_back(tok3);
                        }
                        self.push_back(Token::Int(m));
                    } else {
                        self.push_back(tok2);
                    }
                }
                Ok(PdfObject::Int(n))
            }
            Token::Real(n) => Ok(PdfObject::Real(n)),
            Token::Bool(b) => Ok(PdfObject::Bool(b)),
            Token::Name(s) => Ok(PdfObject::Name(s)),
            Token::String(s) => Ok(PdfObject::String(s)),
            Token::Keyword(kw) => match kw {
                Keyword::Null => Ok(PdfObject::Null),
                Keyword::True => Ok(PdfObject::Bool(true)),
                Keyword::False => Ok(PdfObject::Bool(false)),
                Keyword::ArrayStart => self.parse_array(),
                Keyword::DictStart => self.parse_dict(),
                other => Err(PdfError::TokenError {
                    pos: self.lexer.tell(),
                    msg: format!(
                        "unexpected keyword: {}",
                        String::from_utf8_lossy(other.as_bytes())
                    ),
                }),
            },
        }
    }

    /// Parse array contents until ]
    fn parse_array(&mut self) -> Result<PdfObject> {
        let mut arr = Vec::new();

        loop {
            let token = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
            if token == Token::Keyword(Keyword::ArrayEnd) {
                break;
            }
            arr.push(self.token_to_object(token)?);
        }

        Ok(PdfObject::Array(arr))
    }

    /// Parse dict contents until >>
    fn parse_dict(&mut self) -> Result<PdfObject> {
        let mut dict = PdfDict::new();

        loop {
            let token = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
            if token == Token::Keyword(Keyword::DictEnd) {
                break;
            }

            let key = match token {
                Token::Name(name) => name,
                _ => {
                    return Err(PdfError::TokenError {
                        pos: self.lexer.tell(),
                        msg: "expected name as dict key".into(),
                    });
                }
            };

            let value = self.parse_object()?;
            dict.insert(key, value);
        }

        Ok(PdfObject::Dict(dict))
    }

    /// Parse an indirect object (`N G obj ... endobj`) at the current
    /// position.
    ///
    /// When the body is a stream dictionary followed by the `stream`
    /// keyword, the raw stream bytes are extracted using `/Length`
    /// (resolved through `resolve_length` when indirect). A declared
    /// length that does not land on `endstream` is repaired by scanning
    /// for the keyword instead.
    pub fn parse_indirect_object(
        &mut self,
        resolve_length: Option<LengthResolver<'_>>,
    ) -> Result<(PdfRef, PdfObject)> {
        let objid = self.expect_int()?;
        let genno = self.expect_int()?;
        if objid < 0 || objid > u32::MAX as i64 || !(0..=PdfRef::MAX_GEN as i64).contains(&genno) {
            return Err(PdfError::SyntaxError(format!(
                "invalid object header: {} {} obj",
                objid, genno
            )));
        }
        let r = PdfRef::new(objid as u32, genno as u16);
        self.expect_keyword(Keyword::Obj)?;

        let obj = self.parse_object()?;

        match self.next_token()? {
            Some(Token::Keyword(Keyword::Stream)) => {
                let attrs = match obj {
                    PdfObject::Dict(d) => d,
                    other => {
                        return Err(PdfError::TypeError {
                            expected: "dict",
                            got: other.type_name(),
                        });
                    }
                };
                let rawdata = self.read_stream_body(&attrs, resolve_length)?;
                let mut stream = PdfStream::new(attrs, rawdata);
                stream.set_objid(r.objid, r.genno);

                // Tolerate a missing endobj after endstream
                match self.next_token()? {
                    Some(Token::Keyword(Keyword::EndObj)) | None => {}
                    Some(tok) => self.push_back(tok),
                }
                Ok((r, PdfObject::Stream(Box::new(stream))))
            }
            Some(Token::Keyword(Keyword::EndObj)) | None => Ok((r, obj)),
            Some(tok) => {
                // Garbage before endobj: keep the object, leave the token
                self.push_back(tok);
                Ok((r, obj))
            }
        }
    }

    /// Read the raw bytes of a stream body. The lexer sits just past the
    /// `stream` keyword on entry and just past `endstream` on exit.
    fn read_stream_body(
        &mut self,
        attrs: &PdfDict,
        resolve_length: Option<LengthResolver<'_>>,
    ) -> Result<Bytes> {
        let data = self.lexer.data();
        let mut start = self.lexer.tell();

        // The stream keyword is followed by CRLF or LF (a bare CR also
        // occurs in the wild)
        if data.get(start) == Some(&b'\r') {
            start += 1;
        }
        if data.get(start) == Some(&b'\n') {
            start += 1;
        }

        let declared = match attrs.get("Length") {
            Some(PdfObject::Int(n)) if *n >= 0 => Some(*n as usize),
            Some(PdfObject::Ref(r)) => resolve_length.and_then(|f| f(*r)),
            _ => None,
        };

        if let Some(len) = declared {
            if let Some(end) = start.checked_add(len) {
                if end <= data.len() && endstream_follows(data, end) {
                    self.lookahead.clear();
                    self.lexer.set_pos(end);
                    self.expect_keyword(Keyword::EndStream)?;
                    return Ok(Bytes::copy_from_slice(&data[start..end]));
                }
            }
        }

        // Declared length is wrong or unavailable: recover by scanning
        // for the endstream keyword
        let rel = find_subslice(&data[start..], b"endstream").ok_or(PdfError::UnexpectedEof)?;
        let mut end = start + rel;
        // The keyword is preceded by an EOL that is not part of the data
        if end > start && data[end - 1] == b'\n' {
            end -= 1;
        }
        if end > start && data[end - 1] == b'\r' {
            end -= 1;
        }
        self.lookahead.clear();
        self.lexer.set_pos(start + rel + b"endstream".len());
        Ok(Bytes::copy_from_slice(&data[start..end]))
    }
}

/// Whether `endstream` is the next keyword at or after `pos`, with only
/// whitespace before it.
fn endstream_follows(data: &[u8], mut pos: usize) -> bool {
    while pos < data.len() && Lexer::is_whitespace(data[pos]) {
        pos += 1;
    }
    data[pos..].starts_with(b"endstream")
}

pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scalar_objects() {
        let mut parser = ObjectParser::new(b"null true 7 2.5 /Name (str)");
        assert_eq!(parser.parse_object().unwrap(), PdfObject::Null);
        assert_eq!(parser.parse_object().unwrap(), PdfObject::Bool(true));
        assert_eq!(parser.parse_object().unwrap(), PdfObject::Int(7));
        assert_eq!(parser.parse_object().unwrap(), PdfObject::Real(2.5));
        assert_eq!(parser.parse_object().unwrap(), PdfObject::Name("Name".into()));
        assert_eq!(
            parser.parse_object().unwrap(),
            PdfObject::String(b"str".to_vec())
        );
    }

    #[test]
    fn parse_indirect_reference_lookahead() {
        let mut parser = ObjectParser::new(b"[1 0 R 2 3]");
        let obj = parser.parse_object().unwrap();
        assert_eq!(
            obj,
            PdfObject::Array(vec![
                PdfObject::Ref(PdfRef::new(1, 0)),
                PdfObject::Int(2),
                PdfObject::Int(3),
            ])
        );
    }

    #[test]
    fn parse_nested_dict() {
        let mut parser = ObjectParser::new(b"<< /A 1 /B << /C [1 2] >> >>");
        let obj = parser.parse_object().unwrap();
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get("A"), Some(&PdfObject::Int(1)));
        let inner = dict.get("B").unwrap().as_dict().unwrap();
        assert_eq!(
            inner.get("C"),
            Some(&PdfObject::Array(vec![PdfObject::Int(1), PdfObject::Int(2)]))
        );
    }

    #[test]
    fn parse_indirect_object_plain() {
        let mut parser = ObjectParser::new(b"4 0 obj\n<< /K 9 >>\nendobj");
        let (r, obj) = parser.parse_indirect_object(None).unwrap();
        assert_eq!(r, PdfRef::new(4, 0));
        assert_eq!(obj.as_dict().unwrap().get("K"), Some(&PdfObject::Int(9)));
    }

    #[test]
    fn parse_stream_with_declared_length() {
        let data = b"5 0 obj\n<< /Length 5 >>\nstream\nhello\nendstream\nendobj";
        let mut parser = ObjectParser::new(data);
        let (r, obj) = parser.parse_indirect_object(None).unwrap();
        assert_eq!(r, PdfRef::new(5, 0));
        let stream = obj.as_stream().unwrap();
        assert_eq!(stream.get_rawdata(), b"hello");
    }

    #[test]
    fn parse_stream_with_wrong_length_repairs() {
        // Declared length overshoots; recovered by scanning for endstream
        let data = b"5 0 obj\n<< /Length 99 >>\nstream\nhello\nendstream\nendobj";
        let mut parser = ObjectParser::new(data);
        let (_, obj) = parser.parse_indirect_object(None).unwrap();
        assert_eq!(obj.as_stream().unwrap().get_rawdata(), b"hello");
    }

    #[test]
    fn parse_stream_with_indirect_length() {
        let data = b"5 0 obj\n<< /Length 6 0 R >>\nstream\nhello\nendstream\nendobj";
        let mut parser = ObjectParser::new(data);
        let resolve = |r: PdfRef| (r == PdfRef::new(6, 0)).then_some(5usize);
        let (_, obj) = parser.parse_indirect_object(Some(&resolve)).unwrap();
        assert_eq!(obj.as_stream().unwrap().get_rawdata(), b"hello");
    }
}
