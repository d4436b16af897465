//! Row predictors applied after FlateDecode and LZWDecode.

use crate::error::Result;
use crate::model::{PdfDict, PdfObject};

/// Undo the predictor declared in a filter's decode parameters.
///
/// Predictor 1 (or absent) is a no-op; 2 is TIFF horizontal differencing;
/// 10 and up are the PNG row filters, where each row carries its own
/// filter-type byte.
pub fn apply_predictor(data: Vec<u8>, parms: Option<&PdfDict>) -> Result<Vec<u8>> {
    let Some(parms) = parms else {
        return Ok(data);
    };
    let predictor = int_param(parms, "Predictor", 1);
    if predictor <= 1 {
        return Ok(data);
    }
    let columns = int_param(parms, "Columns", 1).max(1) as usize;
    let colors = int_param(parms, "Colors", 1).max(1) as usize;
    let bits = int_param(parms, "BitsPerComponent", 8).max(1) as usize;

    if predictor == 2 {
        return Ok(tiff_predictor(data, columns, colors, bits));
    }
    apply_png_predictor(&data, columns, colors, bits)
}

fn int_param(parms: &PdfDict, key: &str, default: i64) -> i64 {
    match parms.get(key) {
        Some(PdfObject::Int(n)) => *n,
        _ => default,
    }
}

/// TIFF predictor 2: horizontal differencing. Only the common 8-bit case
/// is undone; sub-byte depths pass through untouched.
fn tiff_predictor(mut data: Vec<u8>, columns: usize, colors: usize, bits: usize) -> Vec<u8> {
    if bits != 8 {
        return data;
    }
    let row_bytes = columns * colors;
    if row_bytes == 0 {
        return data;
    }
    for row in data.chunks_mut(row_bytes) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    data
}

/// Undo PNG row prediction.
///
/// PNG prediction adds a filter-type byte at the start of each row; this
/// reverses the prediction to recover the original data. Truncated final
/// rows are dropped.
pub fn apply_png_predictor(
    data: &[u8],
    columns: usize,
    colors: usize,
    bits_per_component: usize,
) -> Result<Vec<u8>> {
    let row_bytes = colors * columns * bits_per_component / 8;
    let bpp = std::cmp::max(1, colors * bits_per_component / 8); // bytes per pixel
    let row_size = row_bytes + 1; // +1 for filter byte

    let mut result = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_bytes];

    for row_start in (0..data.len()).step_by(row_size) {
        if row_start + row_size > data.len() {
            break;
        }

        let filter_type = data[row_start];
        let row_data = &data[row_start + 1..row_start + row_size];
        let mut current_row = vec![0u8; row_bytes];

        match filter_type {
            0 => {
                // None
                current_row.copy_from_slice(row_data);
            }
            1 => {
                // Sub - each byte depends on byte to the left
                for i in 0..row_bytes {
                    let left = if i >= bpp { current_row[i - bpp] } else { 0 };
                    current_row[i] = row_data[i].wrapping_add(left);
                }
            }
            2 => {
                // Up - each byte depends on byte above
                for i in 0..row_bytes {
                    current_row[i] = row_data[i].wrapping_add(prev_row[i]);
                }
            }
            3 => {
                // Average of left and above
                for i in 0..row_bytes {
                    let left = if i >= bpp {
                        current_row[i - bpp] as u16
                    } else {
                        0
                    };
                    let above = prev_row[i] as u16;
                    current_row[i] = row_data[i].wrapping_add(((left + above) / 2) as u8);
                }
            }
            4 => {
                // Paeth
                for i in 0..row_bytes {
                    let left = if i >= bpp { current_row[i - bpp] } else { 0 };
                    let above = prev_row[i];
                    let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
                    let paeth = paeth_predictor(left, above, upper_left);
                    current_row[i] = row_data[i].wrapping_add(paeth);
                }
            }
            _ => {
                // Unknown filter, just copy the data
                current_row.copy_from_slice(row_data);
            }
        }

        result.extend_from_slice(&current_row);
        prev_row = current_row;
    }

    Ok(result)
}

/// Paeth predictor function used in PNG filtering.
const fn paeth_predictor(left: u8, above: u8, upper_left: u8) -> u8 {
    let a = left as i32;
    let b = above as i32;
    let c = upper_left as i32;
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_predictor_none_strips_filter_bytes() {
        // Two rows of 4 bytes, filter type 0
        let data = vec![0, 1, 2, 3, 4, 0, 5, 6, 7, 8];
        let out = apply_png_predictor(&data, 4, 1, 8).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn png_predictor_up() {
        // Row 1: raw 1 2 3 4; row 2 filter Up adds row 1
        let data = vec![0, 1, 2, 3, 4, 2, 1, 1, 1, 1];
        let out = apply_png_predictor(&data, 4, 1, 8).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 2, 3, 4, 5]);
    }

    #[test]
    fn png_predictor_sub() {
        let data = vec![1, 10, 1, 1, 1];
        let out = apply_png_predictor(&data, 4, 1, 8).unwrap();
        assert_eq!(out, vec![10, 11, 12, 13]);
    }

    #[test]
    fn tiff_predictor_horizontal() {
        let mut parms = PdfDict::new();
        parms.insert("Predictor".into(), PdfObject::Int(2));
        parms.insert("Columns".into(), PdfObject::Int(4));
        let out = apply_predictor(vec![1, 1, 1, 1], Some(&parms)).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn no_parms_is_identity() {
        assert_eq!(apply_predictor(vec![9, 9], None).unwrap(), vec![9, 9]);
    }
}
