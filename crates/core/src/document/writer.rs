//! Produces output files: full rewrites and incremental updates.

use crate::document::serialize::{
    build_object_stream, build_xref_stream, serialize_indirect, serialize_object,
    serialize_xref_table,
};
use crate::document::{DocumentMode, PdfDocument, XrefOrigin};
use crate::error::{PdfError, Result};
use crate::model::{ObjectFlags, PdfDict, PdfObject, PdfRef};
use crate::xref::{XrefSlot, XrefTable};
use itertools::Itertools;
use rustc_hash::FxHashSet;
use tracing::warn;

const HEADER: &[u8] = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n";

/// Which cross-reference form the output carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XrefForm {
    /// Match the form of the source file; new documents get a table.
    #[default]
    Auto,
    /// Classic `xref` table.
    Table,
    /// Cross-reference stream.
    Stream,
}

/// Knobs for [`write_full`] and [`write_append`].
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub xref_form: XrefForm,
    /// Flate-compress the xref stream and pack eligible objects into
    /// object streams (stream form only).
    pub compress: bool,
    /// Write every object the table knows, even ones unreachable from
    /// the trailer.
    pub keep_unused: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            xref_form: XrefForm::Auto,
            compress: true,
            keep_unused: false,
        }
    }
}

fn resolve_form(config: &WriterConfig, source: Option<XrefOrigin>) -> XrefForm {
    match config.xref_form {
        XrefForm::Auto => match source {
            Some(XrefOrigin::Stream) => XrefForm::Stream,
            _ => XrefForm::Table,
        },
        forced => forced,
    }
}

/// Trailer keys that carry over to a new trailer; everything structural
/// to the old xref section is dropped.
fn trailer_carryover(trailer: &PdfDict) -> PdfDict {
    const SKIP: &[&str] = &[
        "Prev",
        "XRefStm",
        "Size",
        "Type",
        "W",
        "Index",
        "Filter",
        "DecodeParms",
        "DP",
        "Length",
    ];
    trailer
        .iter()
        .filter(|(key, _)| !SKIP.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Rewrite the document as a single self-contained revision.
///
/// Object numbers are preserved; numbers that end up unused become free
/// entries, so references held by callers stay valid. Unreachable
/// objects are dropped unless configured otherwise or pinned with
/// `MUST_BE_FLUSHED`.
pub fn write_full(doc: &PdfDocument, config: &WriterConfig) -> Result<Vec<u8>> {
    let form = resolve_form(config, doc.reader.as_ref().map(|r| r.origin()));

    let mut live: Vec<u32> = doc
        .xref
        .iter()
        .filter(|(objid, slot)| *objid != 0 && !slot.is_free())
        .map(|(objid, _)| objid)
        .collect();
    if !config.keep_unused {
        let reachable = reachable_ids(doc);
        live.retain(|objid| {
            reachable.contains(objid)
                || doc
                    .objects
                    .get(objid)
                    .is_some_and(|s| s.flags.contains(ObjectFlags::MUST_BE_FLUSHED))
        });
    }
    if !doc.trailer.contains_key("Root") {
        warn!("writing a document without /Root in the trailer");
    }

    let mut out = Vec::new();
    out.extend_from_slice(HEADER);
    let mut table = XrefTable::new();
    let mut packable: Vec<(u32, PdfObject)> = Vec::new();

    for objid in live.iter().copied().sorted_unstable() {
        let genno = doc.xref.get(objid).map(|s| s.genno).unwrap_or(0);
        let Some(obj) = doc.fetch_for_write(objid, genno)? else {
            continue;
        };
        let mut obj = (*obj).clone();
        doc.null_dangling_refs(&mut obj);

        let pinned = doc
            .objects
            .get(&objid)
            .is_some_and(|s| s.flags.contains(ObjectFlags::MUST_BE_INDIRECT));
        let eligible = form == XrefForm::Stream
            && config.compress
            && genno == 0
            && !pinned
            && !matches!(obj, PdfObject::Stream(_));
        if eligible {
            packable.push((objid, obj));
            continue;
        }

        table.set(objid, XrefSlot::offset(out.len() as u64, genno), &doc.limits)?;
        serialize_indirect(&mut out, PdfRef::new(objid, genno), &obj);
    }

    let mut next_fresh = doc.xref.next_objid();
    for group in packable.chunks(100) {
        let container = next_fresh;
        next_fresh += 1;
        for (index, (objid, _)) in group.iter().enumerate() {
            table.set(
                *objid,
                XrefSlot::in_stream(container, index as u32),
                &doc.limits,
            )?;
        }
        let refs: Vec<(u32, &PdfObject)> = group.iter().map(|(id, obj)| (*id, obj)).collect();
        let objstm = build_object_stream(&refs, config.compress)?;
        table.set(
            container,
            XrefSlot::offset(out.len() as u64, 0),
            &doc.limits,
        )?;
        serialize_indirect(
            &mut out,
            PdfRef::new(container, 0),
            &PdfObject::Stream(Box::new(objstm)),
        );
    }

    let carry = trailer_carryover(&doc.trailer);
    match form {
        XrefForm::Stream => {
            let xref_objid = next_fresh;
            let xref_offset = out.len();
            table.set(
                xref_objid,
                XrefSlot::offset(xref_offset as u64, 0),
                &doc.limits,
            )?;
            let mut snapshot = table.clone();
            snapshot.init_free_list();
            let entries: Vec<(u32, XrefSlot)> =
                snapshot.iter().map(|(id, slot)| (id, *slot)).collect();
            let stream = build_xref_stream(
                &entries,
                &carry,
                snapshot.next_objid(),
                config.compress,
            )?;
            serialize_indirect(
                &mut out,
                PdfRef::new(xref_objid, 0),
                &PdfObject::Stream(Box::new(stream)),
            );
            out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_offset).as_bytes());
        }
        _ => {
            table.init_free_list();
            let entries: Vec<(u32, XrefSlot)> =
                table.iter().map(|(id, slot)| (id, *slot)).collect();
            let xref_offset = out.len();
            serialize_xref_table(&mut out, &entries);
            let mut trailer = PdfDict::new();
            trailer.insert("Size".into(), PdfObject::Int(table.next_objid() as i64));
            for (key, value) in carry {
                trailer.insert(key, value);
            }
            out.extend_from_slice(b"trailer\n");
            serialize_object(&mut out, &PdfObject::Dict(trailer));
            out.extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes());
        }
    }
    Ok(out)
}

/// Append an incremental update: the original bytes stay untouched and a
/// new body, xref section, and trailer follow them.
///
/// The delta covers exactly the touched objects (modified, flushed,
/// copied-in, or freed). The xref form follows the source file; forcing
/// the other form produces a file many readers mishandle, so it is
/// honored with a warning.
pub fn write_append(doc: &PdfDocument, config: &WriterConfig) -> Result<Vec<u8>> {
    if matches!(doc.mode, DocumentMode::Reading) {
        return Err(PdfError::NoWriterForIndirect);
    }
    let reader = doc
        .reader
        .as_ref()
        .ok_or_else(|| PdfError::SyntaxError("incremental update requires a source file".into()))?;
    if reader.origin() == XrefOrigin::Rebuilt {
        return Err(PdfError::SyntaxError(
            "cannot append to a file whose xref was rebuilt; write it out in full".into(),
        ));
    }

    let source_form = match reader.origin() {
        XrefOrigin::Stream => XrefForm::Stream,
        _ => XrefForm::Table,
    };
    let form = resolve_form(config, Some(reader.origin()));
    if form != source_form {
        warn!(
            ?form,
            ?source_form,
            "appending an xref section in a different form than the source file"
        );
    }

    let touched: Vec<u32> = doc
        .objects
        .iter()
        .filter(|(_, stored)| {
            stored.flags.contains(ObjectFlags::MODIFIED)
                || stored.flags.contains(ObjectFlags::MUST_BE_FLUSHED)
                || stored.flags.contains(ObjectFlags::FLUSHED)
                || stored.flags.contains(ObjectFlags::FREE)
        })
        .map(|(objid, _)| *objid)
        .sorted_unstable()
        .collect();

    let mut out = reader.data().to_vec();
    if out.last() != Some(&b'\n') {
        out.push(b'\n');
    }

    let mut entries: Vec<(u32, XrefSlot)> = Vec::with_capacity(touched.len() + 1);
    let sentinel = doc
        .xref
        .get(0)
        .copied()
        .unwrap_or(XrefSlot::free(0, PdfRef::MAX_GEN));
    entries.push((0, sentinel));

    for objid in touched {
        let stored = doc.objects.get(&objid).expect("touched id is stored");
        if stored.flags.contains(ObjectFlags::FREE) {
            let slot = doc
                .xref
                .get(objid)
                .copied()
                .unwrap_or(XrefSlot::free(0, stored.genno));
            entries.push((objid, slot));
            continue;
        }
        let offset = out.len() as u64;
        if let Some(bytes) = &stored.serialized {
            out.extend_from_slice(bytes);
        } else {
            let r = PdfRef::new(objid, stored.genno);
            let Some(obj) = doc.fetch_for_write(objid, stored.genno)? else {
                return Err(PdfError::ObjectReleasedAndCannotBeWritten(r));
            };
            let mut obj = (*obj).clone();
            doc.null_dangling_refs(&mut obj);
            serialize_indirect(&mut out, r, &obj);
        }
        entries.push((objid, XrefSlot::offset(offset, stored.genno)));
    }

    let mut carry = trailer_carryover(&doc.trailer);
    carry.insert("Prev".into(), PdfObject::Int(reader.startxref() as i64));

    match form {
        XrefForm::Stream => {
            let xref_objid = doc.xref.next_objid();
            let xref_offset = out.len();
            entries.push((xref_objid, XrefSlot::offset(xref_offset as u64, 0)));
            entries.sort_unstable_by_key(|(objid, _)| *objid);
            let stream = build_xref_stream(&entries, &carry, xref_objid + 1, config.compress)?;
            serialize_indirect(
                &mut out,
                PdfRef::new(xref_objid, 0),
                &PdfObject::Stream(Box::new(stream)),
            );
            out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_offset).as_bytes());
        }
        _ => {
            let xref_offset = out.len();
            serialize_xref_table(&mut out, &entries);
            let mut trailer = PdfDict::new();
            trailer.insert("Size".into(), PdfObject::Int(doc.xref.next_objid() as i64));
            for (key, value) in carry {
                trailer.insert(key, value);
            }
            out.extend_from_slice(b"trailer\n");
            serialize_object(&mut out, &PdfObject::Dict(trailer));
            out.extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes());
        }
    }
    Ok(out)
}

/// Object numbers reachable from the trailer's references.
fn reachable_ids(doc: &PdfDocument) -> FxHashSet<u32> {
    let mut seen: FxHashSet<u32> = FxHashSet::default();
    let mut stack: Vec<PdfRef> = Vec::new();
    for (_, value) in &doc.trailer {
        collect_refs(value, &mut stack);
    }
    while let Some(r) = stack.pop() {
        if !seen.insert(r.objid) {
            continue;
        }
        let genno = doc.xref.get(r.objid).map(|s| s.genno).unwrap_or(r.genno);
        let Ok(Some(obj)) = doc.fetch_for_write(r.objid, genno) else {
            continue;
        };
        collect_refs(&obj, &mut stack);
    }
    seen
}

fn collect_refs(obj: &PdfObject, stack: &mut Vec<PdfRef>) {
    match obj {
        PdfObject::Ref(r) => stack.push(*r),
        PdfObject::Array(items) => {
            for item in items {
                collect_refs(item, stack);
            }
        }
        PdfObject::Dict(dict) => {
            for (_, value) in dict {
                collect_refs(value, stack);
            }
        }
        PdfObject::Stream(stream) => {
            for (_, value) in &stream.attrs {
                collect_refs(value, stack);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::MemoryLimitsAwareHandler;
    use crate::xref::SlotState;
    use std::sync::Arc;

    fn limits() -> Arc<MemoryLimitsAwareHandler> {
        Arc::new(MemoryLimitsAwareHandler::default())
    }

    fn minimal_doc() -> PdfDocument {
        let mut doc = PdfDocument::new_writing(limits());
        let mut catalog = PdfDict::new();
        catalog.insert("Type".into(), PdfObject::Name("Catalog".into()));
        let root = doc.make_indirect(PdfObject::Dict(catalog)).unwrap();
        doc.trailer_mut()
            .insert("Root".into(), PdfObject::Ref(root));
        doc
    }

    #[test]
    fn full_write_round_trips() {
        let doc = minimal_doc();
        let bytes = write_full(&doc, &WriterConfig::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7"));
        assert!(bytes.ends_with(b"%%EOF\n"));

        let reopened = PdfDocument::open(bytes, limits()).unwrap();
        assert_eq!(reopened.reader().unwrap().origin(), XrefOrigin::Table);
        let root = reopened.trailer().get("Root").unwrap().as_ref().unwrap();
        let catalog = reopened.get_object(root).unwrap();
        assert_eq!(
            catalog.as_dict().unwrap().get("Type"),
            Some(&PdfObject::Name("Catalog".into()))
        );
    }

    #[test]
    fn unreachable_objects_are_dropped_unless_kept() {
        let mut doc = minimal_doc();
        let orphan = doc.make_indirect(PdfObject::Int(42)).unwrap();
        // Clear the flags make_indirect set so the orphan is truly loose
        doc.objects.get_mut(&orphan.objid).unwrap().flags = ObjectFlags::empty();

        let bytes = write_full(&doc, &WriterConfig::default()).unwrap();
        let reopened = PdfDocument::open(bytes, limits()).unwrap();
        assert!(reopened.get_object(orphan).unwrap().is_null());

        let config = WriterConfig {
            keep_unused: true,
            ..WriterConfig::default()
        };
        let bytes = write_full(&doc, &config).unwrap();
        let reopened = PdfDocument::open(bytes, limits()).unwrap();
        assert_eq!(reopened.get_object(orphan).unwrap().as_int().unwrap(), 42);
    }

    #[test]
    fn stream_form_packs_objects_and_reopens() {
        let mut doc = minimal_doc();
        let mut pages = PdfDict::new();
        pages.insert("Type".into(), PdfObject::Name("Pages".into()));
        let pages = doc.make_indirect(PdfObject::Dict(pages)).unwrap();
        let root = doc.trailer().get("Root").unwrap().as_ref().unwrap();
        let mut catalog = (*doc.get_object(root).unwrap()).clone();
        if let PdfObject::Dict(d) = &mut catalog {
            d.insert("Pages".into(), PdfObject::Ref(pages));
        }
        doc.set_object(root, catalog).unwrap();

        let config = WriterConfig {
            xref_form: XrefForm::Stream,
            ..WriterConfig::default()
        };
        let bytes = write_full(&doc, &config).unwrap();
        let reopened = PdfDocument::open(bytes, limits()).unwrap();
        assert_eq!(reopened.reader().unwrap().origin(), XrefOrigin::Stream);

        // Both dictionaries landed in an object stream
        assert!(matches!(
            reopened.xref().get(root.objid).unwrap().state,
            SlotState::InStream { .. }
        ));
        let catalog = reopened.get_object(root).unwrap();
        let pages_ref = catalog.as_dict().unwrap()["Pages"].as_ref().unwrap();
        let pages = reopened.get_object(pages_ref).unwrap();
        assert_eq!(
            pages.as_dict().unwrap().get("Type"),
            Some(&PdfObject::Name("Pages".into()))
        );
    }

    #[test]
    fn append_preserves_original_bytes_and_records_touched_set() {
        let doc = minimal_doc();
        let base = write_full(&doc, &WriterConfig::default()).unwrap();

        let mut doc = PdfDocument::open_for_stamping(base.clone(), limits()).unwrap();
        let note = doc
            .make_indirect(PdfObject::String(b"updated".to_vec()))
            .unwrap();
        let root = doc.trailer().get("Root").unwrap().as_ref().unwrap();
        let mut catalog = (*doc.fetch_for_update(root).unwrap()).clone();
        if let PdfObject::Dict(d) = &mut catalog {
            d.insert("Note".into(), PdfObject::Ref(note));
        }
        doc.set_object(root, catalog).unwrap();

        let bytes = write_append(&doc, &WriterConfig::default()).unwrap();
        assert_eq!(&bytes[..base.len()], base.as_slice());

        let reopened = PdfDocument::open(bytes.clone(), limits()).unwrap();
        let catalog = reopened.get_object(root).unwrap();
        let note_ref = catalog.as_dict().unwrap()["Note"].as_ref().unwrap();
        assert_eq!(
            reopened
                .get_object(note_ref)
                .unwrap()
                .as_string()
                .unwrap(),
            b"updated"
        );

        // The newest revision's modified set is exactly the touched objects
        let revisions = crate::document::read_revisions(&bytes, &limits()).unwrap();
        assert_eq!(revisions.len(), 2);
        let newest = &revisions[0];
        assert!(newest.modified.contains(&PdfRef::sentinel()));
        assert!(newest.modified.contains(&root));
        assert!(newest.modified.contains(&note));
        assert_eq!(newest.modified.len(), 3);
    }

    #[test]
    fn append_records_freed_entries() {
        let mut doc = minimal_doc();
        let victim = doc.make_indirect(PdfObject::Int(9)).unwrap();
        let root = doc.trailer().get("Root").unwrap().as_ref().unwrap();
        let mut catalog = (*doc.get_object(root).unwrap()).clone();
        if let PdfObject::Dict(d) = &mut catalog {
            d.insert("Victim".into(), PdfObject::Ref(victim));
        }
        doc.set_object(root, catalog).unwrap();
        let base = write_full(&doc, &WriterConfig::default()).unwrap();

        let mut doc = PdfDocument::open_for_stamping(base, limits()).unwrap();
        doc.free(victim).unwrap();
        let bytes = write_append(&doc, &WriterConfig::default()).unwrap();

        let reopened = PdfDocument::open(bytes, limits()).unwrap();
        assert!(reopened.xref().get(victim.objid).unwrap().is_free());
        // Generation was bumped at free time
        assert_eq!(
            reopened.xref().get(victim.objid).unwrap().genno,
            victim.genno + 1
        );
        assert!(reopened.get_object(victim).unwrap().is_null());
    }

    #[test]
    fn append_without_source_file_fails() {
        let doc = minimal_doc();
        assert!(write_append(&doc, &WriterConfig::default()).is_err());
    }

    #[test]
    fn forced_form_mismatch_is_honored() {
        let doc = minimal_doc();
        let base = write_full(&doc, &WriterConfig::default()).unwrap();

        let mut doc = PdfDocument::open_for_stamping(base, limits()).unwrap();
        let extra = doc.make_indirect(PdfObject::Int(1)).unwrap();
        let config = WriterConfig {
            xref_form: XrefForm::Stream,
            ..WriterConfig::default()
        };
        let bytes = write_append(&doc, &config).unwrap();

        // The delta section really is a stream despite the table source
        let reopened = PdfDocument::open(bytes, limits()).unwrap();
        assert_eq!(reopened.reader().unwrap().origin(), XrefOrigin::Stream);
        assert_eq!(reopened.get_object(extra).unwrap().as_int().unwrap(), 1);
    }
}
