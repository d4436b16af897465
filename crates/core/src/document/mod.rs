//! Document state: the object store, its lifecycle flags, and the
//! reader/writer halves.

pub mod reader;
pub mod revisions;
pub mod serialize;
pub mod writer;

pub use reader::{ByteTransform, MAX_REF_DEPTH, PdfReader, XrefOrigin};
pub use revisions::{DocumentRevision, read_revisions};
pub use writer::{WriterConfig, XrefForm, write_append, write_full};

use crate::error::{PdfError, Result};
use crate::limits::MemoryLimitsAwareHandler;
use crate::model::{ObjectFlags, PdfDict, PdfObject, PdfRef};
use crate::xref::{SlotState, XrefTable};
use bytes::Bytes;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

static NEXT_DOC_ID: AtomicU64 = AtomicU64::new(1);

/// What a document instance is allowed to do with its objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentMode {
    /// Read-only view of an existing file.
    Reading,
    /// A new document being produced from scratch.
    Writing,
    /// An existing file being modified for an incremental update or a
    /// full rewrite.
    Stamping,
}

/// A locally stored indirect object with its lifecycle flags.
struct StoredObject {
    /// In-memory value; `None` after release or flush dropped it.
    payload: Option<PdfObject>,
    /// Serialized `N G obj ... endobj` record produced by [`flush`].
    ///
    /// [`flush`]: PdfDocument::flush
    serialized: Option<Vec<u8>>,
    flags: ObjectFlags,
    genno: u16,
}

/// A document: an optional backing file plus local objects layered on
/// top of it.
///
/// Every document gets a process-unique id so references copied between
/// documents can be told apart.
pub struct PdfDocument {
    id: u64,
    mode: DocumentMode,
    reader: Option<PdfReader>,
    xref: XrefTable,
    objects: FxHashMap<u32, StoredObject>,
    trailer: PdfDict,
    limits: Arc<MemoryLimitsAwareHandler>,
    /// Source (document id, ref) to local ref, so repeated copies of the
    /// same subtree share objects.
    copied: FxHashMap<(u64, PdfRef), PdfRef>,
}

impl PdfDocument {
    /// Open an existing file read-only.
    pub fn open(data: impl Into<Bytes>, limits: Arc<MemoryLimitsAwareHandler>) -> Result<Self> {
        Self::from_reader(data, limits, DocumentMode::Reading)
    }

    /// Open an existing file for modification.
    pub fn open_for_stamping(
        data: impl Into<Bytes>,
        limits: Arc<MemoryLimitsAwareHandler>,
    ) -> Result<Self> {
        Self::from_reader(data, limits, DocumentMode::Stamping)
    }

    fn from_reader(
        data: impl Into<Bytes>,
        limits: Arc<MemoryLimitsAwareHandler>,
        mode: DocumentMode,
    ) -> Result<Self> {
        let reader = PdfReader::new(data, Arc::clone(&limits))?;
        let xref = reader.xref().clone();
        let trailer = reader.trailer().clone();
        Ok(Self {
            id: NEXT_DOC_ID.fetch_add(1, Ordering::Relaxed),
            mode,
            reader: Some(reader),
            xref,
            objects: FxHashMap::default(),
            trailer,
            limits,
            copied: FxHashMap::default(),
        })
    }

    /// Create an empty document to be written from scratch.
    pub fn new_writing(limits: Arc<MemoryLimitsAwareHandler>) -> Self {
        Self {
            id: NEXT_DOC_ID.fetch_add(1, Ordering::Relaxed),
            mode: DocumentMode::Writing,
            reader: None,
            xref: XrefTable::new(),
            objects: FxHashMap::default(),
            trailer: PdfDict::new(),
            limits,
            copied: FxHashMap::default(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mode(&self) -> DocumentMode {
        self.mode
    }

    pub fn reader(&self) -> Option<&PdfReader> {
        self.reader.as_ref()
    }

    pub fn xref(&self) -> &XrefTable {
        &self.xref
    }

    pub fn trailer(&self) -> &PdfDict {
        &self.trailer
    }

    pub fn trailer_mut(&mut self) -> &mut PdfDict {
        &mut self.trailer
    }

    pub fn limits(&self) -> &Arc<MemoryLimitsAwareHandler> {
        &self.limits
    }

    /// The save history of the backing file, newest revision first.
    pub fn revisions(&self) -> Result<Vec<DocumentRevision>> {
        let reader = self.reader.as_ref().ok_or(PdfError::NoValidXref)?;
        read_revisions(reader.data(), &self.limits)
    }

    fn require_writable(&self) -> Result<()> {
        match self.mode {
            DocumentMode::Reading => Err(PdfError::NoWriterForIndirect),
            DocumentMode::Writing | DocumentMode::Stamping => Ok(()),
        }
    }

    /// Turn a direct value into an indirect object, allocating a number.
    ///
    /// Freed numbers are reused with their bumped generation. Streams are
    /// additionally pinned indirect, since PDF syntax cannot inline them.
    pub fn make_indirect(&mut self, obj: PdfObject) -> Result<PdfRef> {
        self.require_writable()?;
        let r = self.xref.allocate(&self.limits)?;
        let mut flags = ObjectFlags::MODIFIED | ObjectFlags::MUST_BE_FLUSHED;
        if matches!(obj, PdfObject::Stream(_)) {
            flags.set(ObjectFlags::MUST_BE_INDIRECT);
        }
        self.objects.insert(
            r.objid,
            StoredObject {
                payload: Some(obj),
                serialized: None,
                flags,
                genno: r.genno,
            },
        );
        Ok(r)
    }

    /// Fetch an object, locally stored ones shadowing the backing file.
    ///
    /// Freed and unknown numbers yield null; a stale generation on a live
    /// local object is an error, matching the reader's behavior.
    pub fn get_object(&self, r: PdfRef) -> Result<Arc<PdfObject>> {
        if let Some(stored) = self.objects.get(&r.objid) {
            if stored.flags.contains(ObjectFlags::FREE) {
                return Ok(Arc::new(PdfObject::Null));
            }
            if stored.genno != r.genno {
                return Err(PdfError::GenerationMismatch {
                    objid: r.objid,
                    entry: stored.genno,
                    requested: r.genno,
                });
            }
            if let Some(payload) = &stored.payload {
                return Ok(Arc::new(payload.clone()));
            }
            // Released: fall through to the backing file if there is one
        }
        match &self.reader {
            Some(reader) => reader.resolve(r),
            None => Ok(Arc::new(PdfObject::Null)),
        }
    }

    /// Fetch an object and pin it into the local store so it can be
    /// updated, released, or flushed.
    pub fn fetch_for_update(&mut self, r: PdfRef) -> Result<Arc<PdfObject>> {
        self.require_writable()?;
        let obj = self.get_object(r)?;
        let entry = self.objects.entry(r.objid).or_insert_with(|| StoredObject {
            payload: None,
            serialized: None,
            flags: ObjectFlags::empty(),
            genno: r.genno,
        });
        if entry.payload.is_none() && !entry.flags.contains(ObjectFlags::FREE) {
            entry.payload = Some((*obj).clone());
            entry.flags.set(ObjectFlags::READ_ONLY);
            entry.flags.clear(ObjectFlags::RELEASED);
            if let Some(SlotState::InStream { .. }) = self.xref.get(r.objid).map(|s| s.state) {
                entry.flags.set(ObjectFlags::ORIGINAL_OBJECT_STREAM);
            }
        }
        Ok(obj)
    }

    /// Replace the value of an existing indirect object.
    pub fn set_object(&mut self, r: PdfRef, obj: PdfObject) -> Result<()> {
        self.require_writable()?;
        let slot = self
            .xref
            .get(r.objid)
            .copied()
            .ok_or(PdfError::ObjectNotFound(r.objid))?;
        if slot.is_free() {
            return Err(PdfError::ObjectNotFound(r.objid));
        }
        if slot.genno != r.genno {
            return Err(PdfError::GenerationMismatch {
                objid: r.objid,
                entry: slot.genno,
                requested: r.genno,
            });
        }
        let entry = self.objects.entry(r.objid).or_insert_with(|| StoredObject {
            payload: None,
            serialized: None,
            flags: ObjectFlags::empty(),
            genno: r.genno,
        });
        entry.payload = Some(obj);
        entry.serialized = None;
        entry.flags.set(ObjectFlags::MODIFIED);
        entry.flags.clear(ObjectFlags::FLUSHED | ObjectFlags::RELEASED | ObjectFlags::READ_ONLY);
        Ok(())
    }

    /// Mark lifecycle flags on a stored object, e.g. `MUST_BE_INDIRECT`
    /// or `FORBID_RELEASE`.
    pub fn add_flags(&mut self, r: PdfRef, flags: ObjectFlags) -> Result<()> {
        let entry = self
            .objects
            .get_mut(&r.objid)
            .ok_or(PdfError::ObjectNotFound(r.objid))?;
        entry.flags.set(flags);
        Ok(())
    }

    pub fn flags(&self, r: PdfRef) -> Option<ObjectFlags> {
        self.objects.get(&r.objid).map(|s| s.flags)
    }

    /// Drop a cached payload to reclaim memory.
    ///
    /// Modified objects and those pinned with `FORBID_RELEASE` are kept;
    /// anything recoverable from the backing file is re-resolved on the
    /// next fetch.
    pub fn release(&mut self, r: PdfRef) {
        let Some(stored) = self.objects.get_mut(&r.objid) else {
            return;
        };
        if stored.flags.contains(ObjectFlags::FORBID_RELEASE) {
            warn!(%r, "release refused, object is pinned");
            return;
        }
        if stored.flags.contains(ObjectFlags::MODIFIED) {
            return;
        }
        if stored.payload.take().is_some() {
            stored.flags.set(ObjectFlags::RELEASED);
        }
    }

    /// Drop a cached payload unconditionally, discarding unsaved changes.
    pub fn release_forced(&mut self, r: PdfRef) {
        let Some(stored) = self.objects.get_mut(&r.objid) else {
            return;
        };
        if stored.payload.take().is_some() {
            stored.flags.set(ObjectFlags::RELEASED);
            stored.flags.clear(ObjectFlags::MODIFIED | ObjectFlags::MUST_BE_FLUSHED);
        }
    }

    /// Free an indirect object: its number goes onto the free list with a
    /// bumped generation and a tombstone replaces the local value.
    pub fn free(&mut self, r: PdfRef) -> Result<()> {
        self.require_writable()?;
        self.xref.free_entry(r.objid);
        let genno = self.xref.get(r.objid).map(|s| s.genno).unwrap_or(0);
        self.objects.insert(
            r.objid,
            StoredObject {
                payload: None,
                serialized: None,
                flags: ObjectFlags::FREE | ObjectFlags::MODIFIED,
                genno,
            },
        );
        Ok(())
    }

    /// Serialize an object into its pending output record and drop the
    /// in-memory payload.
    ///
    /// References with no live xref entry behind them (unknown number,
    /// freed slot, or stale generation) are written as null.
    /// Flushing an unmodified, already-flushed object is a no-op; an
    /// object whose payload was released and cannot be recovered fails.
    pub fn flush(&mut self, r: PdfRef) -> Result<()> {
        self.require_writable()?;
        let stored = self
            .objects
            .get(&r.objid)
            .ok_or(PdfError::ObjectNotFound(r.objid))?;
        if stored.flags.contains(ObjectFlags::FREE) {
            return Ok(());
        }
        if stored.flags.contains(ObjectFlags::FLUSHED)
            && !stored.flags.contains(ObjectFlags::MODIFIED)
        {
            return Ok(());
        }
        let payload = match &stored.payload {
            Some(payload) => payload.clone(),
            None if stored.flags.contains(ObjectFlags::RELEASED) => {
                // Recoverable only when a backing file still has it
                match &self.reader {
                    Some(reader) => (*reader.resolve(r)?).clone(),
                    None => return Err(PdfError::ObjectReleasedAndCannotBeWritten(r)),
                }
            }
            None => return Err(PdfError::ObjectReleasedAndCannotBeWritten(r)),
        };

        let mut payload = payload;
        self.null_dangling_refs(&mut payload);
        let mut bytes = Vec::new();
        serialize::serialize_indirect(&mut bytes, r, &payload);

        let stored = self.objects.get_mut(&r.objid).expect("entry checked above");
        stored.serialized = Some(bytes);
        stored.flags.set(ObjectFlags::FLUSHED);
        stored.flags.clear(ObjectFlags::MODIFIED | ObjectFlags::MUST_BE_FLUSHED);
        if !stored.flags.contains(ObjectFlags::FORBID_RELEASE) {
            stored.payload = None;
        }
        Ok(())
    }

    fn null_dangling_refs(&self, obj: &mut PdfObject) {
        match obj {
            PdfObject::Ref(r) => {
                // A ref is dangling when its number has no slot, the slot
                // has been freed, or the generation is stale
                let dangling = match self.xref.get(r.objid) {
                    None => true,
                    Some(slot) => slot.is_free() || slot.genno != r.genno,
                };
                if dangling {
                    warn!(r = %r, "dangling reference written as null");
                    *obj = PdfObject::Null;
                }
            }
            PdfObject::Array(items) => {
                for item in items {
                    self.null_dangling_refs(item);
                }
            }
            PdfObject::Dict(dict) => {
                for (_, value) in dict.iter_mut() {
                    self.null_dangling_refs(value);
                }
            }
            PdfObject::Stream(stream) => {
                for (_, value) in stream.attrs.iter_mut() {
                    self.null_dangling_refs(value);
                }
            }
            _ => {}
        }
    }

    /// Deep-copy an object graph from another document.
    ///
    /// Each source reference is copied once and remembered, so shared
    /// subtrees stay shared and cycles terminate; `fresh` bypasses the
    /// memo and forces a new copy of the root.
    pub fn copy_object_from(
        &mut self,
        src: &PdfDocument,
        r: PdfRef,
        fresh: bool,
    ) -> Result<PdfRef> {
        if matches!(self.mode, DocumentMode::Reading) {
            return Err(PdfError::CannotCopyToDocumentInReadingMode);
        }
        if matches!(src.mode, DocumentMode::Writing) {
            return Err(PdfError::CannotCopyIndirectFromDocumentBeingWritten);
        }
        if !fresh {
            if let Some(&mapped) = self.copied.get(&(src.id, r)) {
                return Ok(mapped);
            }
        }

        let obj = src.copyable_object(r)?;
        let dest = self.xref.allocate(&self.limits)?;
        // Memoize before descending so cyclic graphs terminate
        if !fresh {
            self.copied.insert((src.id, r), dest);
        }
        let mut copy = (*obj).clone();
        self.remap_refs(&mut copy, src)?;
        let mut flags = ObjectFlags::MODIFIED | ObjectFlags::MUST_BE_FLUSHED;
        if matches!(copy, PdfObject::Stream(_)) {
            flags.set(ObjectFlags::MUST_BE_INDIRECT);
        }
        self.objects.insert(
            dest.objid,
            StoredObject {
                payload: Some(copy),
                serialized: None,
                flags,
                genno: dest.genno,
            },
        );
        Ok(dest)
    }

    fn copyable_object(&self, r: PdfRef) -> Result<Arc<PdfObject>> {
        if let Some(stored) = self.objects.get(&r.objid) {
            if stored.payload.is_none()
                && stored.flags.contains(ObjectFlags::FLUSHED)
                && self.reader.is_none()
            {
                return Err(PdfError::CannotCopyFlushedObject(r));
            }
        }
        self.get_object(r)
    }

    fn remap_refs(&mut self, obj: &mut PdfObject, src: &PdfDocument) -> Result<()> {
        match obj {
            PdfObject::Ref(r) => {
                *r = self.copy_object_from(src, *r, false)?;
            }
            PdfObject::Array(items) => {
                for item in items {
                    self.remap_refs(item, src)?;
                }
            }
            PdfObject::Dict(dict) => {
                for (_, value) in dict.iter_mut() {
                    self.remap_refs(value, src)?;
                }
            }
            PdfObject::Stream(stream) => {
                for (_, value) in stream.attrs.iter_mut() {
                    self.remap_refs(value, src)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Forget the copy memo entries recorded against one source document,
    /// after which re-copies from it produce fresh objects.
    pub fn flush_copied_objects(&mut self, src_id: u64) {
        self.copied.retain(|(doc, _), _| *doc != src_id);
    }

    /// Fetch an object for serialization without touching local state.
    ///
    /// Prefers the in-memory payload, then the flushed record (re-parsed),
    /// then the backing file. `None` means the number holds nothing
    /// writable.
    fn fetch_for_write(&self, objid: u32, genno: u16) -> Result<Option<Arc<PdfObject>>> {
        if let Some(stored) = self.objects.get(&objid) {
            if stored.flags.contains(ObjectFlags::FREE) {
                return Ok(None);
            }
            if let Some(payload) = &stored.payload {
                return Ok(Some(Arc::new(payload.clone())));
            }
            if let Some(bytes) = &stored.serialized {
                let (_, obj) =
                    crate::parser::ObjectParser::at(bytes, 0).parse_indirect_object(None)?;
                return Ok(Some(Arc::new(obj)));
            }
            if stored.flags.contains(ObjectFlags::RELEASED) && self.reader.is_none() {
                return Err(PdfError::ObjectReleasedAndCannotBeWritten(PdfRef::new(
                    objid, genno,
                )));
            }
        }
        match &self.reader {
            Some(reader) => {
                let obj = reader.resolve(PdfRef::new(objid, genno))?;
                if obj.is_null() {
                    Ok(None)
                } else {
                    Ok(Some(obj))
                }
            }
            None => Ok(None),
        }
    }
}
