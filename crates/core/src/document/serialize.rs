//! Byte-level emission of PDF objects and cross-reference sections.

use crate::codec;
use crate::error::{PdfError, Result};
use crate::model::{PdfDict, PdfObject, PdfRef, PdfStream};
use crate::xref::{SlotState, XrefSlot};
use byteorder::{BigEndian, WriteBytesExt};

/// Serialize one object in PDF syntax.
///
/// Stream dictionaries are written with `/Length` forced to the actual
/// raw-data length, whatever the attribute currently claims.
pub fn serialize_object(out: &mut Vec<u8>, obj: &PdfObject) {
    match obj {
        PdfObject::Null => out.extend_from_slice(b"null"),
        PdfObject::Bool(true) => out.extend_from_slice(b"true"),
        PdfObject::Bool(false) => out.extend_from_slice(b"false"),
        PdfObject::Int(n) => out.extend_from_slice(n.to_string().as_bytes()),
        PdfObject::Real(f) => write_real(out, *f),
        PdfObject::Name(name) => write_name(out, name),
        PdfObject::String(bytes) => write_string(out, bytes),
        PdfObject::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                serialize_object(out, item);
            }
            out.push(b']');
        }
        PdfObject::Dict(dict) => write_dict(out, dict, None),
        PdfObject::Stream(stream) => {
            write_dict(out, &stream.attrs, Some(stream.get_rawdata().len()));
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(stream.get_rawdata());
            out.extend_from_slice(b"\nendstream");
        }
        PdfObject::Ref(r) => {
            out.extend_from_slice(format!("{} {} R", r.objid, r.genno).as_bytes());
        }
    }
}

/// Serialize a complete `N G obj ... endobj` record.
pub fn serialize_indirect(out: &mut Vec<u8>, r: PdfRef, obj: &PdfObject) {
    out.extend_from_slice(format!("{} {} obj\n", r.objid, r.genno).as_bytes());
    serialize_object(out, obj);
    out.extend_from_slice(b"\nendobj\n");
}

fn write_dict(out: &mut Vec<u8>, dict: &PdfDict, stream_len: Option<usize>) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict {
        if stream_len.is_some() && key == "Length" {
            continue;
        }
        out.push(b' ');
        write_name(out, key);
        out.push(b' ');
        serialize_object(out, value);
    }
    if let Some(len) = stream_len {
        out.extend_from_slice(format!(" /Length {}", len).as_bytes());
    }
    out.extend_from_slice(b" >>");
}

fn write_real(out: &mut Vec<u8>, f: f64) {
    if f.is_finite() {
        out.extend_from_slice(f.to_string().as_bytes());
    } else {
        out.push(b'0');
    }
}

/// Names escape delimiters, whitespace, `#`, and anything outside the
/// printable range as `#xx`.
fn write_name(out: &mut Vec<u8>, name: &str) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    out.push(b'/');
    for &b in name.as_bytes() {
        let needs_escape = !(0x21..=0x7E).contains(&b)
            || b == b'#'
            || matches!(
                b,
                b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
            );
        if needs_escape {
            out.push(b'#');
            out.push(HEX[(b >> 4) as usize]);
            out.push(HEX[(b & 0x0F) as usize]);
        } else {
            out.push(b);
        }
    }
}

/// Mostly-binary strings are written hex, everything else as a literal
/// with the standard escapes.
fn write_string(out: &mut Vec<u8>, bytes: &[u8]) {
    let binary = bytes
        .iter()
        .filter(|&&b| !(0x20..=0x7E).contains(&b))
        .count();
    if binary * 2 > bytes.len() {
        const HEX: &[u8; 16] = b"0123456789ABCDEF";
        out.push(b'<');
        for &b in bytes {
            out.push(HEX[(b >> 4) as usize]);
            out.push(HEX[(b & 0x0F) as usize]);
        }
        out.push(b'>');
        return;
    }
    out.push(b'(');
    for &b in bytes {
        match b {
            b'(' => out.extend_from_slice(b"\\("),
            b')' => out.extend_from_slice(b"\\)"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\t' => out.extend_from_slice(b"\\t"),
            b if !(0x20..=0x7E).contains(&b) => {
                out.extend_from_slice(format!("\\{:03o}", b).as_bytes());
            }
            b => out.push(b),
        }
    }
    out.push(b')');
}

/// Emit a classic `xref` table for the given entries.
///
/// Entries must be sorted by object number; contiguous runs become
/// subsections. Every record is exactly 20 bytes. Free entries store
/// their next-free link in the offset column.
pub fn serialize_xref_table(out: &mut Vec<u8>, entries: &[(u32, XrefSlot)]) {
    out.extend_from_slice(b"xref\n");
    let mut i = 0;
    while i < entries.len() {
        let start = entries[i].0;
        let mut run = 1;
        while i + run < entries.len() && entries[i + run].0 == start + run as u32 {
            run += 1;
        }
        out.extend_from_slice(format!("{} {}\n", start, run).as_bytes());
        for (_, slot) in &entries[i..i + run] {
            match slot.state {
                SlotState::Offset(offset) => {
                    out.extend_from_slice(
                        format!("{:010} {:05} n\r\n", offset, slot.genno).as_bytes(),
                    );
                }
                SlotState::Free { next_free } => {
                    out.extend_from_slice(
                        format!("{:010} {:05} f\r\n", next_free, slot.genno).as_bytes(),
                    );
                }
                SlotState::InStream { .. } => {
                    // Compressed entries cannot be expressed in a classic
                    // table; callers route these to the stream form
                    out.extend_from_slice(
                        format!("{:010} {:05} f\r\n", 0, PdfRef::MAX_GEN).as_bytes(),
                    );
                }
            }
        }
        i += run;
    }
}

/// Build a cross-reference stream object covering `entries`.
///
/// `trailer_extra` contributes the trailer keys (Root, Info, Prev, ID);
/// /Type, /Size, /W, /Index, /Filter, and /Length are owned by this
/// builder. Field widths are the minimum that fit the largest value.
pub fn build_xref_stream(
    entries: &[(u32, XrefSlot)],
    trailer_extra: &PdfDict,
    size: u32,
    compress: bool,
) -> Result<PdfStream> {
    let mut max_mid = 0u64;
    let mut max_wide = 0u64;
    for (_, slot) in entries {
        let (mid, wide) = match slot.state {
            SlotState::Free { next_free } => (next_free as u64, slot.genno as u64),
            SlotState::Offset(offset) => (offset, slot.genno as u64),
            SlotState::InStream { container, index } => (container as u64, index as u64),
        };
        max_mid = max_mid.max(mid);
        max_wide = max_wide.max(wide);
    }
    let w2 = byte_width(max_mid);
    let w3 = byte_width(max_wide);

    let mut data = Vec::with_capacity(entries.len() * (1 + w2 + w3));
    let mut index = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let start = entries[i].0;
        let mut run = 1;
        while i + run < entries.len() && entries[i + run].0 == start + run as u32 {
            run += 1;
        }
        index.push(PdfObject::Int(start as i64));
        index.push(PdfObject::Int(run as i64));
        for (_, slot) in &entries[i..i + run] {
            let (kind, mid, wide) = match slot.state {
                SlotState::Free { next_free } => (0u8, next_free as u64, slot.genno as u64),
                SlotState::Offset(offset) => (1, offset, slot.genno as u64),
                SlotState::InStream { container, index } => (2, container as u64, index as u64),
            };
            data.write_u8(kind)?;
            data.write_uint::<BigEndian>(mid, w2)?;
            data.write_uint::<BigEndian>(wide, w3)?;
        }
        i += run;
    }

    let mut attrs = PdfDict::new();
    attrs.insert("Type".into(), PdfObject::Name("XRef".into()));
    attrs.insert("Size".into(), PdfObject::Int(size as i64));
    attrs.insert(
        "W".into(),
        PdfObject::Array(vec![
            PdfObject::Int(1),
            PdfObject::Int(w2 as i64),
            PdfObject::Int(w3 as i64),
        ]),
    );
    attrs.insert("Index".into(), PdfObject::Array(index));
    let rawdata = if compress {
        attrs.insert("Filter".into(), PdfObject::Name("FlateDecode".into()));
        codec::flateencode(&data)?
    } else {
        data
    };
    attrs.insert("Length".into(), PdfObject::Int(rawdata.len() as i64));
    for (key, value) in trailer_extra {
        if !attrs.contains_key(key) {
            attrs.insert(key.clone(), value.clone());
        }
    }

    Ok(PdfStream::new(attrs, rawdata))
}

/// Build a `/Type /ObjStm` container holding the given direct objects.
///
/// Streams and references to the free sentinel cannot live in object
/// streams; callers must pass eligible objects only.
pub fn build_object_stream(objects: &[(u32, &PdfObject)], compress: bool) -> Result<PdfStream> {
    let mut header = Vec::new();
    let mut bodies = Vec::new();
    for (objid, obj) in objects {
        if matches!(obj, PdfObject::Stream(_)) {
            return Err(PdfError::SyntaxError(
                "streams cannot be stored in an object stream".into(),
            ));
        }
        header.extend_from_slice(format!("{} {} ", objid, bodies.len()).as_bytes());
        serialize_object(&mut bodies, obj);
        bodies.push(b'\n');
    }

    let first = header.len();
    let mut data = header;
    data.extend_from_slice(&bodies);

    let mut attrs = PdfDict::new();
    attrs.insert("Type".into(), PdfObject::Name("ObjStm".into()));
    attrs.insert("N".into(), PdfObject::Int(objects.len() as i64));
    attrs.insert("First".into(), PdfObject::Int(first as i64));
    let rawdata = if compress {
        attrs.insert("Filter".into(), PdfObject::Name("FlateDecode".into()));
        codec::flateencode(&data)?
    } else {
        data
    };
    attrs.insert("Length".into(), PdfObject::Int(rawdata.len() as i64));
    Ok(PdfStream::new(attrs, rawdata))
}

fn byte_width(value: u64) -> usize {
    let mut width = 1;
    let mut v = value >> 8;
    while v > 0 {
        width += 1;
        v >>= 8;
    }
    width
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(obj: &PdfObject) -> Vec<u8> {
        let mut out = Vec::new();
        serialize_object(&mut out, obj);
        out
    }

    #[test]
    fn scalars() {
        assert_eq!(render(&PdfObject::Null), b"null");
        assert_eq!(render(&PdfObject::Int(-7)), b"-7");
        assert_eq!(render(&PdfObject::Real(2.5)), b"2.5");
        assert_eq!(render(&PdfObject::Ref(PdfRef::new(3, 1))), b"3 1 R");
    }

    #[test]
    fn name_escaping() {
        assert_eq!(render(&PdfObject::Name("Simple".into())), b"/Simple");
        assert_eq!(render(&PdfObject::Name("A B#".into())), b"/A#20B#23");
    }

    #[test]
    fn string_literal_and_hex() {
        assert_eq!(
            render(&PdfObject::String(b"a(b)\\".to_vec())),
            b"(a\\(b\\)\\\\)"
        );
        assert_eq!(
            render(&PdfObject::String(vec![0x00, 0xFF, 0x01])),
            b"<00FF01>"
        );
    }

    #[test]
    fn stream_length_is_forced() {
        let mut attrs = PdfDict::new();
        attrs.insert("Length".into(), PdfObject::Int(999));
        let stream = PdfStream::new(attrs, b"body".to_vec());
        let rendered = render(&PdfObject::Stream(Box::new(stream)));
        let text = String::from_utf8_lossy(&rendered);
        assert!(text.contains("/Length 4"));
        assert!(!text.contains("999"));
    }

    #[test]
    fn xref_table_entries_are_20_bytes() {
        let entries = vec![
            (0, XrefSlot::free(3, PdfRef::MAX_GEN)),
            (1, XrefSlot::offset(17, 0)),
            (2, XrefSlot::offset(81, 2)),
        ];
        let mut out = Vec::new();
        serialize_xref_table(&mut out, &entries);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("xref\n0 3\n"));
        for line in text.lines().skip(2) {
            // +2 for the \r\n that lines() strips
            assert_eq!(line.len() + 2, 20, "entry not 20 bytes: {:?}", line);
        }
        assert!(text.contains("0000000003 65535 f"));
        assert!(text.contains("0000000017 00000 n"));
        assert!(text.contains("0000000081 00002 n"));
    }

    #[test]
    fn xref_table_splits_noncontiguous_runs() {
        let entries = vec![
            (0, XrefSlot::free(0, PdfRef::MAX_GEN)),
            (4, XrefSlot::offset(100, 0)),
            (5, XrefSlot::offset(200, 0)),
        ];
        let mut out = Vec::new();
        serialize_xref_table(&mut out, &entries);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("0 1\n"));
        assert!(text.contains("4 2\n"));
    }

    #[test]
    fn xref_stream_round_trips_through_reader_fields() {
        let entries = vec![
            (0, XrefSlot::free(0, PdfRef::MAX_GEN)),
            (1, XrefSlot::offset(0x1234, 0)),
            (2, XrefSlot::in_stream(1, 5)),
        ];
        let stream = build_xref_stream(&entries, &PdfDict::new(), 3, false).unwrap();
        assert!(matches!(
            stream.get("W"),
            Some(PdfObject::Array(w)) if w.len() == 3
        ));
        // 1 + 2 (0x1234 needs two bytes) + 2 (gen 65535 needs two)
        assert_eq!(stream.get_rawdata().len(), 3 * 5);
        let record1 = &stream.get_rawdata()[5..10];
        assert_eq!(record1, &[1, 0x12, 0x34, 0x00, 0x00]);
    }

    #[test]
    fn object_stream_header_offsets() {
        let a = PdfObject::Int(42);
        let b = PdfObject::Name("X".into());
        let stream = build_object_stream(&[(7, &a), (9, &b)], false).unwrap();
        let first = match stream.get("First") {
            Some(PdfObject::Int(n)) => *n as usize,
            _ => panic!("missing First"),
        };
        let data = stream.get_rawdata();
        let header = std::str::from_utf8(&data[..first]).unwrap();
        assert_eq!(header, "7 0 9 3 ");
        assert_eq!(&data[first..], b"42\n/X\n");
        assert_eq!(stream.get("N"), Some(&PdfObject::Int(2)));
    }

    #[test]
    fn streams_rejected_in_object_streams() {
        let s = PdfObject::Stream(Box::new(PdfStream::new(PdfDict::new(), Vec::new())));
        assert!(build_object_stream(&[(1, &s)], false).is_err());
    }
}
