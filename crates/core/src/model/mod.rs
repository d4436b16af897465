//! PDF data model - object values, references, and lifecycle flags.
//!
//! - `objects` - PDF object types (PdfObject, PdfStream, PdfRef)
//! - `flags` - lifecycle bit set for stored indirect objects

pub mod flags;
pub mod objects;

// Re-export main types for convenience
pub use flags::ObjectFlags;
pub use objects::{OwnedRef, PdfDict, PdfObject, PdfRef, PdfStream};
