//! LZW stream coding using the weezl crate.

use crate::error::{PdfError, Result};
use weezl::{BitOrder, decode::Decoder, encode::Encoder};

/// Decode LZW-encoded data (PDF variant: MSB first, 8-bit).
pub fn lzwdecode(data: &[u8]) -> Result<Vec<u8>> {
    lzwdecode_with_earlychange(data, 1)
}

/// Decode LZW-encoded data with EarlyChange setting.
///
/// EarlyChange=1 is the PDF default and bumps the code width one code
/// early, which is weezl's TIFF variant; EarlyChange=0 switches at the
/// exact table size.
pub fn lzwdecode_with_earlychange(data: &[u8], early_change: i64) -> Result<Vec<u8>> {
    let mut decoder = if early_change == 0 {
        Decoder::new(BitOrder::Msb, 8)
    } else {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    };
    let mut output = Vec::new();
    // Lenient: return partial output on corrupt data
    let _ = decoder.into_vec(&mut output).decode(data);
    Ok(output)
}

/// Encode data as LZW with the default EarlyChange=1 code widths.
pub fn lzwencode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = Encoder::with_tiff_size_switch(BitOrder::Msb, 8);
    let mut output = Vec::new();
    encoder
        .into_vec(&mut output)
        .encode_all(data)
        .status
        .map_err(|e| PdfError::DecodeError(format!("lzw encode failed: {}", e)))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let data = b"TOBEORNOTTOBEORTOBEORNOT";
        let encoded = lzwencode(data).unwrap();
        assert_eq!(lzwdecode(&encoded).unwrap(), data);
    }

    #[test]
    fn corrupt_input_is_lenient() {
        // Must not error, partial output is fine
        assert!(lzwdecode(&[0xFF, 0x00, 0xAB]).is_ok());
    }
}
