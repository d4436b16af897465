//! PDF tokenizer and object parser.
//!
//! - `lexer` - byte-level tokenizer for PDF object syntax
//! - `object_parser` - builds [`PdfObject`](crate::model::PdfObject) values
//!   from tokens, including indirect objects and stream bodies

pub mod lexer;
pub mod object_parser;

pub use lexer::{Keyword, Lexer, Token};
pub use object_parser::ObjectParser;
