//! FlateDecode (zlib) with lenient corrupt-stream recovery.

use crate::error::Result;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

/// Decode zlib-compressed data.
///
/// Corrupt input falls back to byte-at-a-time decompression that returns
/// whatever decoded cleanly before the failure, which is usually the whole
/// payload minus a bad checksum.
pub fn flatedecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    if decoder.read_to_end(&mut decompressed).is_err() {
        decompressed = decompress_corrupted(data);
    }
    Ok(decompressed)
}

/// Encode data with zlib at the default compression level.
pub fn flateencode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Best-effort zlib decompression for corrupted streams.
///
/// Returns partial output up to the point the decoder fails (often due to
/// CRC errors near the end).
fn decompress_corrupted(data: &[u8]) -> Vec<u8> {
    use flate2::{Decompress, FlushDecompress, Status};
    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..i + 1], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        if produced > 0 {
            out.extend_from_slice(&buf[..produced]);
        }
        let consumed = (decoder.total_in() - before_in) as usize;
        if consumed == 0 {
            i += 1;
        } else {
            i += consumed;
        }
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let data = b"stream payload with some repetition repetition repetition";
        let encoded = flateencode(data).unwrap();
        assert_eq!(flatedecode(&encoded).unwrap(), data);
    }

    #[test]
    fn corrupted_tail_yields_partial_output() {
        let data = vec![b'x'; 2048];
        let mut encoded = flateencode(&data).unwrap();
        // Clobber the adler32 checksum at the end
        let len = encoded.len();
        encoded[len - 2] ^= 0xFF;
        let decoded = flatedecode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn garbage_input_returns_empty() {
        assert!(flatedecode(b"not zlib at all").unwrap().is_empty());
    }
}
