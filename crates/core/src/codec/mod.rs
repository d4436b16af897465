//! Codec modules for PDF stream filters.
//!
//! This module contains:
//! - `filter`: filter strategy trait, registry, and chain decoding
//! - `flate`: zlib/deflate with lenient corrupt-stream recovery
//! - `lzw`: LZW decompression
//! - `ascii85`: ASCII85 and ASCIIHex encoding
//! - `runlength`: Run-length coding
//! - `predictor`: PNG row predictors applied after decompression

pub mod ascii85;
pub mod filter;
pub mod flate;
pub mod lzw;
pub mod predictor;
pub mod runlength;

// Re-export main items for convenience
pub use ascii85::{ascii85decode, ascii85encode, asciihexdecode, asciihexencode};
pub use filter::{FilterStrategy, decode_chain, encode_chain, strategy_for};
pub use flate::{flatedecode, flateencode};
pub use lzw::{lzwdecode, lzwdecode_with_earlychange};
pub use runlength::{rldecode, rlencode};
