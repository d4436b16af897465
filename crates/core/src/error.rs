//! Error types for the vellum PDF engine.

use crate::model::objects::PdfRef;
use thiserror::Error;

/// Primary error type for PDF read and write operations.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("invalid token at position {pos}: {msg}")]
    TokenError { pos: usize, msg: String },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("key not found: {0}")]
    KeyError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF object not found: {0}")]
    ObjectNotFound(u32),

    #[error("generation mismatch for object {objid}: entry has {entry}, requested {requested}")]
    GenerationMismatch {
        objid: u32,
        entry: u16,
        requested: u16,
    },

    #[error("no valid xref table found")]
    NoValidXref,

    #[error("PDF syntax error: {0}")]
    SyntaxError(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("filter not supported: {0}")]
    FilterNotSupported(String),

    #[error(
        "invalid object stream: object {objid} declared in stream {container} at index {index}"
    )]
    InvalidObjectStreamNumber {
        objid: u32,
        container: u32,
        index: u32,
    },

    #[error("xref structure size exceeded limit: requested {requested}, limit {limit}")]
    XrefSizeExceeded { limit: usize, requested: usize },

    #[error("single decompressed stream exceeded limit: occupied {occupied}, limit {limit}")]
    SingleStreamLimitExceeded { limit: usize, occupied: usize },

    #[error("sum of decompressed streams exceeded limit: occupied {occupied}, limit {limit}")]
    StreamSumLimitExceeded { limit: usize, occupied: usize },

    #[error("document has no writer; cannot create indirect object")]
    NoWriterForIndirect,

    #[error("object {0} was released and cannot be written")]
    ObjectReleasedAndCannotBeWritten(PdfRef),

    #[error("cannot copy an indirect object from a document that is only being written")]
    CannotCopyIndirectFromDocumentBeingWritten,

    #[error("cannot copy object {0}: its payload has already been flushed")]
    CannotCopyFlushedObject(PdfRef),

    #[error("cannot copy to a document opened in reading mode")]
    CannotCopyToDocumentInReadingMode,
}

/// Convenience Result type alias for PdfError.
pub type Result<T> = std::result::Result<T, PdfError>;
