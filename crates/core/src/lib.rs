//! vellum-core - PDF object graph, cross-reference, and incremental
//! update engine.

pub mod codec;
pub mod document;
pub mod error;
pub mod limits;
pub mod model;
pub mod parser;
pub mod xref;

pub use document::{
    ByteTransform, DocumentMode, DocumentRevision, PdfDocument, PdfReader, WriterConfig,
    XrefForm, XrefOrigin, read_revisions, write_append, write_full,
};
pub use error::{PdfError, Result};
pub use limits::MemoryLimitsAwareHandler;
pub use model::{ObjectFlags, OwnedRef, PdfDict, PdfObject, PdfRef, PdfStream};
pub use xref::{SlotState, XrefSlot, XrefTable};
