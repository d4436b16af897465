use std::sync::Arc;
use vellum_core::codec::{decode_chain, flateencode};
use vellum_core::{MemoryLimitsAwareHandler, PdfDict, PdfDocument, PdfError, PdfObject, PdfStream};

#[test]
fn default_caps() {
    let limits = MemoryLimitsAwareHandler::default();
    assert_eq!(limits.max_single_stream(), (i32::MAX / 100) as usize);
    assert_eq!(limits.max_stream_sum(), (i32::MAX / 20) as usize);
    assert_eq!(limits.max_xref_elements(), 50_000_000);
}

#[test]
fn budget_scales_caps() {
    let limits = MemoryLimitsAwareHandler::with_budget(1000);
    assert_eq!(limits.max_single_stream(), 100_000);
    assert_eq!(limits.max_stream_sum(), 500_000);
    assert_eq!(limits.max_xref_elements(), 50_000);

    // The xref cap never exceeds the default
    let limits = MemoryLimitsAwareHandler::with_budget(usize::MAX / 100);
    assert_eq!(limits.max_xref_elements(), 50_000_000);
}

fn two_filter_stream(payload: &[u8]) -> PdfStream {
    let flated = flateencode(payload).unwrap();
    let hexed: Vec<u8> = flated
        .iter()
        .flat_map(|b| format!("{b:02X}").into_bytes())
        .chain(std::iter::once(b'>'))
        .collect();
    let mut attrs = PdfDict::new();
    attrs.insert(
        "Filter".into(),
        PdfObject::Array(vec![
            PdfObject::Name("ASCIIHexDecode".into()),
            PdfObject::Name("FlateDecode".into()),
        ]),
    );
    attrs.insert("Length".into(), PdfObject::Int(hexed.len() as i64));
    PdfStream::new(attrs, hexed)
}

#[test]
fn sum_cap_fails_across_streams() {
    // Each decode fits the single-stream cap; the running sum eventually
    // does not
    let limits = MemoryLimitsAwareHandler::with_budget(3);
    let payload = vec![7u8; 250];
    let stream = two_filter_stream(&payload);

    let mut successes = 0;
    let err = loop {
        match decode_chain(&stream, &limits) {
            Ok(data) => {
                assert_eq!(data, payload);
                successes += 1;
                assert!(successes < 20, "sum cap never tripped");
            }
            Err(err) => break err,
        }
    };
    assert!(successes >= 2);
    assert!(matches!(err, PdfError::StreamSumLimitExceeded { .. }));

    // The failed scope left the committed total untouched
    let committed = limits.committed_bytes();
    assert!(decode_chain(&stream, &limits).is_err());
    assert_eq!(limits.committed_bytes(), committed);
}

#[test]
fn custom_suspicion_policy() {
    // Treat every chain as suspicious, even single-filter ones
    let mut limits = MemoryLimitsAwareHandler::default();
    limits.set_suspicion_policy(|names: &[&str]| !names.is_empty());

    let payload = b"accounted".to_vec();
    let mut attrs = PdfDict::new();
    attrs.insert("Filter".into(), PdfObject::Name("FlateDecode".into()));
    let stream = PdfStream::new(attrs, flateencode(&payload).unwrap());

    assert_eq!(decode_chain(&stream, &limits).unwrap(), payload);
    assert_eq!(limits.committed_bytes(), payload.len());
}

#[test]
fn oversized_xref_rejects_the_file() {
    // 60 objects exceed the 50-element table a budget of 1 allows, and
    // the rebuild path hits the same cap
    let mut buf = b"%PDF-1.7\n".to_vec();
    let mut offsets = Vec::new();
    for i in 1..=60 {
        offsets.push(buf.len());
        buf.extend_from_slice(format!("{i} 0 obj\n{i}\nendobj\n").as_bytes());
    }
    let xref = buf.len();
    buf.extend_from_slice(b"xref\n0 61\n0000000000 65535 f \n");
    for off in &offsets {
        buf.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    buf.extend_from_slice(
        format!("trailer\n<< /Size 61 /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n").as_bytes(),
    );

    let tight = Arc::new(MemoryLimitsAwareHandler::with_budget(1));
    assert!(PdfDocument::open(buf.clone(), tight).is_err());

    // The same file is fine under default limits
    let doc = PdfDocument::open(buf, Arc::new(MemoryLimitsAwareHandler::default())).unwrap();
    assert_eq!(doc.xref().count_of_indirect_objects(), 60);
}
