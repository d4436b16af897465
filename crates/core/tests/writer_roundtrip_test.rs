use std::sync::Arc;
use vellum_core::{
    MemoryLimitsAwareHandler, PdfDict, PdfDocument, PdfObject, PdfRef, WriterConfig, XrefForm,
    XrefOrigin, read_revisions, write_append, write_full,
};

fn limits() -> Arc<MemoryLimitsAwareHandler> {
    Arc::new(MemoryLimitsAwareHandler::default())
}

/// A document with a catalog pointing at one data object.
fn seed_doc() -> (PdfDocument, PdfRef, PdfRef) {
    let mut doc = PdfDocument::new_writing(limits());
    let data = doc
        .make_indirect(PdfObject::String(b"v1".to_vec()))
        .unwrap();
    let mut catalog = PdfDict::new();
    catalog.insert("Type".into(), PdfObject::Name("Catalog".into()));
    catalog.insert("Data".into(), PdfObject::Ref(data));
    let root = doc.make_indirect(PdfObject::Dict(catalog)).unwrap();
    doc.trailer_mut()
        .insert("Root".into(), PdfObject::Ref(root));
    (doc, root, data)
}

#[test]
fn revision_history_grows_newest_first_and_truncates() {
    let (doc, _root, data) = seed_doc();
    let v1 = write_full(&doc, &WriterConfig::default()).unwrap();

    // Second revision: replace the data object
    let mut doc = PdfDocument::open_for_stamping(v1, limits()).unwrap();
    doc.set_object(data, PdfObject::String(b"v2".to_vec()))
        .unwrap();
    let v2 = write_append(&doc, &WriterConfig::default()).unwrap();

    // Third revision: replace it again
    let mut doc = PdfDocument::open_for_stamping(v2, limits()).unwrap();
    doc.set_object(data, PdfObject::String(b"v3".to_vec()))
        .unwrap();
    let v3 = write_append(&doc, &WriterConfig::default()).unwrap();

    let doc = PdfDocument::open(v3.clone(), limits()).unwrap();
    assert_eq!(doc.get_object(data).unwrap().as_string().unwrap(), b"v3");

    let revisions = read_revisions(&v3, &limits()).unwrap();
    assert_eq!(revisions.len(), 3);
    // Newest first; the two appends touched only the data object
    assert!(revisions[0].modified.contains(&data));
    assert!(revisions[1].modified.contains(&data));
    assert_eq!(revisions[0].modified.len(), 2);
    assert!(revisions[0].xref_offset > revisions[1].xref_offset);

    // Truncating at a revision's eof gives the document as of that save
    let middle = &v3[..revisions[1].eof_offset];
    let doc = PdfDocument::open(middle.to_vec(), limits()).unwrap();
    assert_eq!(doc.get_object(data).unwrap().as_string().unwrap(), b"v2");

    let oldest = &v3[..revisions[2].eof_offset];
    let doc = PdfDocument::open(oldest.to_vec(), limits()).unwrap();
    assert_eq!(doc.get_object(data).unwrap().as_string().unwrap(), b"v1");
}

#[test]
fn freed_number_is_reused_with_bumped_generation() {
    let (doc, _root, data) = seed_doc();
    let v1 = write_full(&doc, &WriterConfig::default()).unwrap();

    let mut doc = PdfDocument::open_for_stamping(v1, limits()).unwrap();
    doc.free(data).unwrap();
    let v2 = write_append(&doc, &WriterConfig::default()).unwrap();

    let mut doc = PdfDocument::open_for_stamping(v2, limits()).unwrap();
    assert!(doc.xref().get(data.objid).unwrap().is_free());
    let reused = doc
        .make_indirect(PdfObject::String(b"reborn".to_vec()))
        .unwrap();
    assert_eq!(reused.objid, data.objid);
    assert_eq!(reused.genno, data.genno + 1);

    let v3 = write_append(&doc, &WriterConfig::default()).unwrap();
    let doc = PdfDocument::open(v3, limits()).unwrap();
    assert_eq!(
        doc.get_object(reused).unwrap().as_string().unwrap(),
        b"reborn"
    );
    // The old incarnation is gone
    assert!(doc.get_object(data).is_err() || doc.get_object(data).unwrap().is_null());
}

#[test]
fn stream_form_appends_stay_in_stream_form() {
    let (doc, _root, data) = seed_doc();
    let config = WriterConfig {
        xref_form: XrefForm::Stream,
        compress: false,
        ..WriterConfig::default()
    };
    let v1 = write_full(&doc, &config).unwrap();

    let mut doc = PdfDocument::open_for_stamping(v1, limits()).unwrap();
    assert_eq!(doc.reader().unwrap().origin(), XrefOrigin::Stream);
    doc.set_object(data, PdfObject::String(b"v2".to_vec()))
        .unwrap();
    // Auto follows the source form
    let v2 = write_append(&doc, &WriterConfig::default()).unwrap();

    let doc = PdfDocument::open(v2.clone(), limits()).unwrap();
    assert_eq!(doc.reader().unwrap().origin(), XrefOrigin::Stream);
    assert_eq!(doc.get_object(data).unwrap().as_string().unwrap(), b"v2");

    let revisions = read_revisions(&v2, &limits()).unwrap();
    assert_eq!(revisions.len(), 2);
    assert!(revisions[0].modified.contains(&data));
}

#[test]
fn flushed_objects_survive_an_append() {
    let (doc, root, _data) = seed_doc();
    let v1 = write_full(&doc, &WriterConfig::default()).unwrap();

    let mut doc = PdfDocument::open_for_stamping(v1, limits()).unwrap();
    let extra = doc
        .make_indirect(PdfObject::String(b"flushed early".to_vec()))
        .unwrap();
    doc.flush(extra).unwrap();
    let mut catalog = (*doc.fetch_for_update(root).unwrap()).clone();
    if let PdfObject::Dict(d) = &mut catalog {
        d.insert("Extra".into(), PdfObject::Ref(extra));
    }
    doc.set_object(root, catalog).unwrap();

    let v2 = write_append(&doc, &WriterConfig::default()).unwrap();
    let doc = PdfDocument::open(v2, limits()).unwrap();
    assert_eq!(
        doc.get_object(extra).unwrap().as_string().unwrap(),
        b"flushed early"
    );
}

#[test]
fn reference_to_freed_object_is_written_as_null() {
    let mut doc = PdfDocument::new_writing(limits());
    let victim = doc.make_indirect(PdfObject::Int(7)).unwrap();
    let mut catalog = PdfDict::new();
    catalog.insert("Type".into(), PdfObject::Name("Catalog".into()));
    catalog.insert("Gone".into(), PdfObject::Ref(victim));
    let root = doc.make_indirect(PdfObject::Dict(catalog)).unwrap();
    doc.trailer_mut()
        .insert("Root".into(), PdfObject::Ref(root));

    doc.free(victim).unwrap();
    doc.flush(root).unwrap();

    let out = write_full(&doc, &WriterConfig::default()).unwrap();
    let doc = PdfDocument::open(out, limits()).unwrap();
    let root = doc.trailer().get("Root").unwrap().as_ref().unwrap();
    let catalog = doc.get_object(root).unwrap();
    assert!(catalog.as_dict().unwrap()["Gone"].is_null());
}

#[test]
fn full_rewrite_collapses_history() {
    let (doc, _root, data) = seed_doc();
    let v1 = write_full(&doc, &WriterConfig::default()).unwrap();

    let mut doc = PdfDocument::open_for_stamping(v1, limits()).unwrap();
    doc.set_object(data, PdfObject::String(b"v2".to_vec()))
        .unwrap();
    let v2 = write_append(&doc, &WriterConfig::default()).unwrap();

    // A full rewrite of the two-revision file yields a single revision
    let doc = PdfDocument::open_for_stamping(v2, limits()).unwrap();
    let flat = write_full(&doc, &WriterConfig::default()).unwrap();
    let revisions = read_revisions(&flat, &limits()).unwrap();
    assert_eq!(revisions.len(), 1);

    let doc = PdfDocument::open(flat, limits()).unwrap();
    assert_eq!(doc.get_object(data).unwrap().as_string().unwrap(), b"v2");
}
