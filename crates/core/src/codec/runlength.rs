//! RunLength stream coding.

use crate::error::Result;

/// Decode RunLength-encoded data.
///
/// Format:
/// - Length byte 0-127: Copy next (length + 1) bytes literally
/// - Length byte 128: End of data (EOD marker)
/// - Length byte 129-255: Repeat next byte (257 - length) times
///
/// Truncated or malformed input is tolerated: if the stream ends
/// mid-sequence, decoding stops without error.
pub fn rldecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;

        match length {
            128 => break, // EOD
            0..=127 => {
                // Copy next (length + 1) bytes literally
                let count = length as usize + 1;
                if i + count <= data.len() {
                    result.extend_from_slice(&data[i..i + count]);
                    i += count;
                }
            }
            129..=255 => {
                // Repeat next byte (257 - length) times
                if i < data.len() {
                    let count = 257 - length as usize;
                    let byte = data[i];
                    i += 1;
                    result.extend(std::iter::repeat_n(byte, count));
                }
            }
        }
    }

    Ok(result)
}

/// Encode data as RunLength with a trailing EOD marker.
///
/// Runs of 3 or more identical bytes become repeat sequences; everything
/// else is emitted as literal runs of up to 128 bytes.
pub fn rlencode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        let mut run = 1;
        while run < 128 && i + run < data.len() && data[i + run] == byte {
            run += 1;
        }
        if run >= 3 {
            result.push((257 - run) as u8);
            result.push(byte);
            i += run;
            continue;
        }

        // Literal run: collect until the next long repeat or 128 bytes
        let start = i;
        let mut len = 0;
        while len < 128 && i < data.len() {
            let b = data[i];
            let mut ahead = 1;
            while ahead < 3 && i + ahead < data.len() && data[i + ahead] == b {
                ahead += 1;
            }
            if ahead >= 3 {
                break;
            }
            i += 1;
            len += 1;
        }
        result.push((len - 1) as u8);
        result.extend_from_slice(&data[start..start + len]);
    }

    result.push(128); // EOD
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_literal_and_repeat() {
        // 2 -> copy 3 bytes; 254 -> repeat next byte 3 times; 128 -> EOD
        let data = [2, b'a', b'b', b'c', 254, b'x', 128, b'z'];
        assert_eq!(rldecode(&data).unwrap(), b"abcxxx");
    }

    #[test]
    fn decode_truncated_is_lenient() {
        assert_eq!(rldecode(&[5, b'a']).unwrap(), b"");
        assert_eq!(rldecode(&[255]).unwrap(), b"");
    }

    #[test]
    fn encode_round_trip() {
        let data = b"aaaaabcdefffffffg";
        let encoded = rlencode(data).unwrap();
        assert_eq!(rldecode(&encoded).unwrap(), data);
        assert_eq!(*encoded.last().unwrap(), 128);
    }
}
