//! ASCII85 and ASCIIHex stream coding.

use crate::error::Result;

/// Decode ASCII85-encoded data (PDF variant).
/// Handles: z-encoding, <~ ~> markers, whitespace, missing EOD.
pub fn ascii85decode(data: &[u8]) -> Result<Vec<u8>> {
    // Strip <~ prefix if present
    let data = if data.starts_with(b"<~") {
        &data[2..]
    } else {
        data
    };

    // Find ~> end marker, strip trailing junk
    let data = match data.iter().position(|&b| b == b'~') {
        Some(pos) => &data[..pos],
        None => data,
    };

    // Filter whitespace and expand 'z'
    let mut filtered = Vec::with_capacity(data.len());
    for &byte in data {
        match byte {
            b' ' | b'\t' | b'\n' | b'\r' | b'\x00' => {}
            b'z' => filtered.extend_from_slice(b"!!!!!"), // z = 4 zero bytes
            b'!'..=b'u' => filtered.push(byte),
            _ => {}
        }
    }

    let mut result = Vec::with_capacity(filtered.len() / 5 * 4 + 4);
    for chunk in filtered.chunks(5) {
        if chunk.len() == 5 {
            let mut value: u32 = 0;
            for &byte in chunk {
                value = value.wrapping_mul(85).wrapping_add((byte - b'!') as u32);
            }
            result.extend_from_slice(&value.to_be_bytes());
        } else if !chunk.is_empty() {
            // Partial group: pad with 'u' and keep len-1 bytes
            let mut padded = [b'u'; 5];
            padded[..chunk.len()].copy_from_slice(chunk);
            let mut value: u32 = 0;
            for &byte in &padded {
                value = value.wrapping_mul(85).wrapping_add((byte - b'!') as u32);
            }
            let bytes = value.to_be_bytes();
            result.extend_from_slice(&bytes[..chunk.len() - 1]);
        }
    }

    Ok(result)
}

/// Encode data as ASCII85 with a trailing `~>` EOD marker.
pub fn ascii85encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 4 * 5 + 8);
    for chunk in data.chunks(4) {
        let mut group = [0u8; 4];
        group[..chunk.len()].copy_from_slice(chunk);
        let value = u32::from_be_bytes(group);
        if value == 0 && chunk.len() == 4 {
            result.push(b'z');
            continue;
        }
        let mut digits = [0u8; 5];
        let mut v = value;
        for d in digits.iter_mut().rev() {
            *d = (v % 85) as u8 + b'!';
            v /= 85;
        }
        result.extend_from_slice(&digits[..chunk.len() + 1]);
    }
    result.extend_from_slice(b"~>");
    Ok(result)
}

/// Decode ASCIIHex-encoded data. Stops at `>`, skips whitespace, and pads
/// an odd trailing digit with zero.
pub fn asciihexdecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut pending: Option<u8> = None;

    for &byte in data {
        if byte == b'>' {
            break;
        }
        if let Some(nibble) = hex_nibble(byte) {
            if let Some(high) = pending.take() {
                result.push((high << 4) | nibble);
            } else {
                pending = Some(nibble);
            }
        }
    }

    if let Some(high) = pending {
        result.push(high << 4);
    }

    Ok(result)
}

/// Encode data as ASCIIHex with a trailing `>` EOD marker.
pub fn asciihexencode(data: &[u8]) -> Result<Vec<u8>> {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut result = Vec::with_capacity(data.len() * 2 + 1);
    for &byte in data {
        result.push(HEX[(byte >> 4) as usize]);
        result.push(HEX[(byte & 0x0F) as usize]);
    }
    result.push(b'>');
    Ok(result)
}

fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asciihex_decode_expected() {
        let data = b"<48656c6c6f 20776f726c64>";
        assert_eq!(asciihexdecode(&data[1..]).unwrap(), b"Hello world");
    }

    #[test]
    fn asciihex_odd_digit_pads_zero() {
        assert_eq!(asciihexdecode(b"41 4>").unwrap(), vec![0x41, 0x40]);
    }

    #[test]
    fn ascii85_decode_expected() {
        let data = b"<~87cURD]i,\"Ebo7~>";
        assert_eq!(ascii85decode(data).unwrap(), b"Hello World");
    }

    #[test]
    fn ascii85_round_trip_with_zero_group() {
        let data = b"abcd\x00\x00\x00\x00wxyz!";
        let encoded = ascii85encode(data).unwrap();
        assert!(encoded.ends_with(b"~>"));
        assert_eq!(ascii85decode(&encoded).unwrap(), data);
    }

    #[test]
    fn asciihex_round_trip() {
        let data = b"\x00\x01\xFE\xFF";
        let encoded = asciihexencode(data).unwrap();
        assert_eq!(asciihexdecode(&encoded).unwrap(), data);
    }
}
