//! Reads the cross-reference machinery of an existing file.
//!
//! Loading walks the `startxref` chain through classic tables, xref
//! streams, and hybrid files. When the chain is unreadable the reader
//! falls back to a full byte scan and rebuilds the table from the object
//! headers actually present; opening fails only if that scan finds
//! nothing either.

use crate::codec;
use crate::error::{PdfError, Result};
use crate::limits::MemoryLimitsAwareHandler;
use crate::model::{PdfDict, PdfObject, PdfRef, PdfStream};
use crate::parser::lexer::{Keyword, Lexer, Token};
use crate::parser::object_parser::{ObjectParser, find_subslice};
use crate::xref::{SlotState, XrefSlot, XrefTable};
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// How many reference-to-reference hops resolution follows before giving
/// up and substituting null.
pub const MAX_REF_DEPTH: u32 = 32;

/// How the cross-reference data of a file was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefOrigin {
    /// Classic `xref` table sections.
    Table,
    /// Cross-reference stream(s).
    Stream,
    /// Recovered by scanning the whole file for object headers.
    Rebuilt,
}

/// Byte-level transform applied to string and stream payloads at resolve
/// time, keyed by the owning object. This is the seam where a decryption
/// layer plugs in; the reader itself implements no cryptography.
pub trait ByteTransform: Send + Sync {
    fn transform(&self, objid: u32, genno: u16, data: &[u8]) -> Vec<u8>;
}

/// One parsed xref section: the entries it declares and its trailer.
pub(crate) struct XrefSection {
    pub entries: Vec<(u32, XrefSlot)>,
    pub trailer: PdfDict,
    pub is_stream: bool,
}

/// A parsed `/Type /ObjStm` container, cached per container object.
struct ParsedObjStm {
    /// `(objid, offset)` header pairs in declaration order
    pairs: Vec<(u32, usize)>,
    first: usize,
    data: Vec<u8>,
}

/// Read-side view of a document's bytes and cross-reference state.
pub struct PdfReader {
    data: Bytes,
    xref: XrefTable,
    trailer: PdfDict,
    origin: XrefOrigin,
    startxref: usize,
    limits: Arc<MemoryLimitsAwareHandler>,
    /// Resolved-object cache; keyed by object number with the generation
    /// it was resolved under
    cache: Mutex<FxHashMap<u32, (u16, Arc<PdfObject>)>>,
    objstm_cache: Mutex<FxHashMap<u32, Arc<ParsedObjStm>>>,
    transform: Option<Box<dyn ByteTransform>>,
}

impl PdfReader {
    pub fn new(data: impl Into<Bytes>, limits: Arc<MemoryLimitsAwareHandler>) -> Result<Self> {
        let data = data.into();

        let loaded = find_startxref(&data).and_then(|startxref| {
            load_chain(&data, startxref, &limits).map(|(xref, trailer, origin)| {
                (xref, trailer, origin, startxref)
            })
        });

        let (xref, trailer, origin, startxref) = match loaded {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!(error = %err, "xref chain unreadable, rebuilding from full scan");
                let (xref, trailer) = rebuild_xref(&data, &limits)?;
                (xref, trailer, XrefOrigin::Rebuilt, 0)
            }
        };

        Ok(Self {
            data,
            xref,
            trailer,
            origin,
            startxref,
            limits,
            cache: Mutex::new(FxHashMap::default()),
            objstm_cache: Mutex::new(FxHashMap::default()),
            transform: None,
        })
    }

    /// Install the byte transform applied to strings and stream bodies.
    pub fn set_transform(&mut self, transform: Box<dyn ByteTransform>) {
        self.transform = Some(transform);
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn trailer(&self) -> &PdfDict {
        &self.trailer
    }

    pub fn origin(&self) -> XrefOrigin {
        self.origin
    }

    /// Offset the newest revision's `startxref` points at (0 when the
    /// table was rebuilt).
    pub fn startxref(&self) -> usize {
        self.startxref
    }

    pub fn xref(&self) -> &XrefTable {
        &self.xref
    }

    /// Resolve a reference to its object, following reference chains.
    ///
    /// Chains longer than [`MAX_REF_DEPTH`] resolve to null rather than
    /// recursing without bound. Free and unknown object numbers also
    /// resolve to null, matching how consumers must treat them.
    pub fn resolve(&self, r: PdfRef) -> Result<Arc<PdfObject>> {
        self.resolve_depth(r, 0)
    }

    /// Resolve one level: if `obj` is a reference, fetch its target.
    pub fn resolve_obj(&self, obj: &PdfObject) -> Result<Arc<PdfObject>> {
        match obj {
            PdfObject::Ref(r) => self.resolve(*r),
            other => Ok(Arc::new(other.clone())),
        }
    }

    fn resolve_depth(&self, r: PdfRef, depth: u32) -> Result<Arc<PdfObject>> {
        if depth > MAX_REF_DEPTH {
            warn!(%r, "reference chain exceeds depth limit, substituting null");
            return Ok(Arc::new(PdfObject::Null));
        }

        {
            let cache = self.cache.lock().expect("reader cache poisoned");
            if let Some((genno, obj)) = cache.get(&r.objid) {
                if *genno == r.genno {
                    let obj = Arc::clone(obj);
                    drop(cache);
                    if let PdfObject::Ref(inner) = obj.as_ref() {
                        return self.resolve_depth(*inner, depth + 1);
                    }
                    return Ok(obj);
                }
            }
        }

        let Some(slot) = self.xref.get(r.objid).copied() else {
            return Ok(Arc::new(PdfObject::Null));
        };

        let obj = match slot.state {
            SlotState::Free { .. } => return Ok(Arc::new(PdfObject::Null)),
            SlotState::Offset(offset) => {
                if slot.genno != r.genno {
                    return Err(PdfError::GenerationMismatch {
                        objid: r.objid,
                        entry: slot.genno,
                        requested: r.genno,
                    });
                }
                self.parse_top_level(offset as usize, r, depth)?
            }
            SlotState::InStream { container, index } => {
                // Compressed objects always have generation 0
                if r.genno != 0 {
                    return Err(PdfError::GenerationMismatch {
                        objid: r.objid,
                        entry: 0,
                        requested: r.genno,
                    });
                }
                self.load_from_objstm(container, index, r.objid, depth)?
            }
        };

        let obj = Arc::new(obj);
        self.cache
            .lock()
            .expect("reader cache poisoned")
            .insert(r.objid, (r.genno, Arc::clone(&obj)));

        if let PdfObject::Ref(inner) = obj.as_ref() {
            return self.resolve_depth(*inner, depth + 1);
        }
        Ok(obj)
    }

    fn parse_top_level(&self, offset: usize, r: PdfRef, depth: u32) -> Result<PdfObject> {
        if offset >= self.data.len() {
            return Err(PdfError::ObjectNotFound(r.objid));
        }
        let resolve_length = |lr: PdfRef| -> Option<usize> {
            self.resolve_depth(lr, depth + 1)
                .ok()
                .and_then(|obj| obj.as_int().ok())
                .and_then(|n| usize::try_from(n).ok())
        };
        let mut parser = ObjectParser::at(&self.data, offset);
        let (parsed_ref, mut obj) = parser.parse_indirect_object(Some(&resolve_length))?;
        if parsed_ref.objid != r.objid {
            warn!(expected = %r, found = %parsed_ref, "object header does not match xref entry");
        }
        if let Some(transform) = &self.transform {
            apply_transform(&mut obj, r.objid, r.genno, transform.as_ref());
        }
        Ok(obj)
    }

    fn load_from_objstm(
        &self,
        container: u32,
        index: u32,
        objid: u32,
        depth: u32,
    ) -> Result<PdfObject> {
        let objstm = self.load_objstm(container, index, objid, depth)?;
        let idx = index as usize;
        let Some(&(declared, offset)) = objstm.pairs.get(idx) else {
            return Err(PdfError::InvalidObjectStreamNumber {
                objid,
                container,
                index,
            });
        };
        if declared != objid {
            return Err(PdfError::InvalidObjectStreamNumber {
                objid,
                container,
                index,
            });
        }
        let pos = objstm.first.saturating_add(offset);
        if pos >= objstm.data.len() {
            return Err(PdfError::InvalidObjectStreamNumber {
                objid,
                container,
                index,
            });
        }
        ObjectParser::at(&objstm.data, pos).parse_object()
    }

    fn load_objstm(
        &self,
        container: u32,
        index: u32,
        objid: u32,
        depth: u32,
    ) -> Result<Arc<ParsedObjStm>> {
        {
            let cache = self.objstm_cache.lock().expect("objstm cache poisoned");
            if let Some(parsed) = cache.get(&container) {
                return Ok(Arc::clone(parsed));
            }
        }

        let invalid = || PdfError::InvalidObjectStreamNumber {
            objid,
            container,
            index,
        };

        // The container itself must be a top-level stream
        let offset = match self.xref.get(container).map(|s| s.state) {
            Some(SlotState::Offset(offset)) => offset as usize,
            _ => return Err(invalid()),
        };
        // Depth is inherited so a container whose /Length points back into
        // itself bottoms out at the chain limit instead of recursing
        // without bound
        let resolve_length = |lr: PdfRef| -> Option<usize> {
            self.resolve_depth(lr, depth + 1)
                .ok()
                .and_then(|obj| obj.as_int().ok())
                .and_then(|n| usize::try_from(n).ok())
        };
        let (_, obj) =
            ObjectParser::at(&self.data, offset).parse_indirect_object(Some(&resolve_length))?;
        let stream = obj.as_stream().map_err(|_| invalid())?;
        match stream.get("Type") {
            Some(PdfObject::Name(name)) if name == "ObjStm" => {}
            _ => return Err(invalid()),
        }

        let count = match stream.get("N") {
            Some(PdfObject::Int(n)) if *n >= 0 => *n as usize,
            _ => return Err(invalid()),
        };
        let first = match stream.get("First") {
            Some(PdfObject::Int(n)) if *n >= 0 => *n as usize,
            _ => return Err(invalid()),
        };

        let data = self.decode_stream(stream)?;
        if first > data.len() {
            return Err(invalid());
        }

        let mut pairs = Vec::with_capacity(count);
        let mut header = ObjectParser::new(&data[..first]);
        for _ in 0..count {
            let id = header.expect_int().map_err(|_| invalid())?;
            let off = header.expect_int().map_err(|_| invalid())?;
            if id < 0 || id > u32::MAX as i64 || off < 0 {
                return Err(invalid());
            }
            pairs.push((id as u32, off as usize));
        }

        let parsed = Arc::new(ParsedObjStm { pairs, first, data });
        self.objstm_cache
            .lock()
            .expect("objstm cache poisoned")
            .insert(container, Arc::clone(&parsed));
        Ok(parsed)
    }

    /// Decode a stream body through its filter chain under the limits
    /// handler.
    pub fn decode_stream(&self, stream: &PdfStream) -> Result<Vec<u8>> {
        codec::decode_chain(stream, &self.limits)
    }
}

/// Apply a byte transform to every string and stream payload in an
/// object graph.
fn apply_transform(obj: &mut PdfObject, objid: u32, genno: u16, transform: &dyn ByteTransform) {
    match obj {
        PdfObject::String(s) => {
            *s = transform.transform(objid, genno, s);
        }
        PdfObject::Array(items) => {
            for item in items {
                apply_transform(item, objid, genno, transform);
            }
        }
        PdfObject::Dict(dict) => {
            for (_, value) in dict.iter_mut() {
                apply_transform(value, objid, genno, transform);
            }
        }
        PdfObject::Stream(stream) => {
            let raw = transform.transform(objid, genno, stream.get_rawdata());
            stream.set_rawdata(raw);
            for (_, value) in stream.attrs.iter_mut() {
                apply_transform(value, objid, genno, transform);
            }
        }
        _ => {}
    }
}

/// Find the offset the final `startxref` keyword points at, scanning the
/// last 1024 bytes and taking the last occurrence.
pub(crate) fn find_startxref(data: &[u8]) -> Result<usize> {
    let needle = b"startxref";
    if data.len() < needle.len() {
        return Err(PdfError::SyntaxError("file too small".into()));
    }
    let search_start = data.len().saturating_sub(1024);
    let hay = &data[search_start..];
    let mut found = None;
    for pos in 0..=hay.len() - needle.len() {
        if &hay[pos..pos + needle.len()] == needle {
            found = Some(search_start + pos);
        }
    }
    let i = found.ok_or(PdfError::NoValidXref)?;

    let rest = &data[i + needle.len()..];
    let mut pos = 0;
    while pos < rest.len() && matches!(rest[pos], b' ' | b'\n' | b'\r') {
        pos += 1;
    }
    let mut num_end = pos;
    while num_end < rest.len() && rest[num_end].is_ascii_digit() {
        num_end += 1;
    }
    if num_end == pos {
        return Err(PdfError::NoValidXref);
    }
    let s = std::str::from_utf8(&rest[pos..num_end]).map_err(|_| PdfError::NoValidXref)?;
    s.parse::<usize>().map_err(|_| PdfError::NoValidXref)
}

/// Walk the `Prev` chain from the newest section, merging entries
/// first-write-wins so the newest mention of each object number is kept.
fn load_chain(
    data: &[u8],
    startxref: usize,
    limits: &MemoryLimitsAwareHandler,
) -> Result<(XrefTable, PdfDict, XrefOrigin)> {
    let mut xref = XrefTable::new();
    let mut trailer = PdfDict::new();
    let mut origin = None;
    let mut visited: FxHashSet<usize> = FxHashSet::default();
    let mut offset = startxref;

    loop {
        if !visited.insert(offset) {
            warn!(offset, "cycle in xref Prev chain");
            break;
        }
        let section = read_xref_at(data, offset, limits)?;
        if origin.is_none() {
            origin = Some(if section.is_stream {
                XrefOrigin::Stream
            } else {
                XrefOrigin::Table
            });
        }

        // Hybrid file: the /XRefStm section of this same revision takes
        // precedence over the table's own entries
        if !section.is_stream {
            if let Some(PdfObject::Int(stm_offset)) = section.trailer.get("XRefStm") {
                if *stm_offset >= 0 {
                    match read_xref_at(data, *stm_offset as usize, limits) {
                        Ok(stm_section) if stm_section.is_stream => {
                            merge_section(&mut xref, &stm_section, limits)?;
                        }
                        Ok(_) => warn!(offset = stm_offset, "XRefStm does not point at a stream"),
                        Err(err) => warn!(error = %err, "failed to read XRefStm section"),
                    }
                }
            }
        }

        merge_section(&mut xref, &section, limits)?;
        for (key, value) in &section.trailer {
            if !trailer.contains_key(key) {
                trailer.insert(key.clone(), value.clone());
            }
        }

        match section.trailer.get("Prev") {
            Some(PdfObject::Int(prev)) if *prev >= 0 => offset = *prev as usize,
            _ => break,
        }
    }

    if trailer.is_empty() {
        return Err(PdfError::NoValidXref);
    }
    Ok((xref, trailer, origin.unwrap_or(XrefOrigin::Table)))
}

fn merge_section(
    xref: &mut XrefTable,
    section: &XrefSection,
    limits: &MemoryLimitsAwareHandler,
) -> Result<()> {
    for (objid, slot) in &section.entries {
        xref.add(*objid, *slot, limits)?;
    }
    Ok(())
}

/// Parse one xref section (classic table or xref stream) at `offset`.
pub(crate) fn read_xref_at(
    data: &[u8],
    offset: usize,
    limits: &MemoryLimitsAwareHandler,
) -> Result<XrefSection> {
    if offset >= data.len() {
        return Err(PdfError::NoValidXref);
    }
    let mut lexer = Lexer::new(data);
    lexer.set_pos(offset);
    match lexer.next_token() {
        Some(Ok((_, Token::Keyword(Keyword::Xref)))) => read_xref_table(data, lexer.tell()),
        Some(Ok((_, Token::Int(_)))) => read_xref_stream(data, offset, limits),
        _ => Err(PdfError::NoValidXref),
    }
}

/// Parse a classic table's subsections and trailer. `pos` sits just past
/// the `xref` keyword.
fn read_xref_table(data: &[u8], pos: usize) -> Result<XrefSection> {
    let mut lexer = Lexer::new(data);
    lexer.set_pos(pos);
    let mut entries: Vec<(u32, XrefSlot)> = Vec::new();

    loop {
        let token = match lexer.next_token() {
            Some(result) => result?.1,
            None => return Err(PdfError::UnexpectedEof),
        };
        let start = match token {
            Token::Keyword(Keyword::Trailer) => break,
            Token::Int(n) if n >= 0 => n as u32,
            other => {
                return Err(PdfError::SyntaxError(format!(
                    "unexpected token in xref table: {:?}",
                    other
                )));
            }
        };
        let count = match lexer.next_token() {
            Some(Ok((_, Token::Int(n)))) if n >= 0 => n as usize,
            _ => return Err(PdfError::SyntaxError("bad xref subsection header".into())),
        };

        let mut raw: Vec<(u64, u16, bool)> = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = match lexer.next_token() {
                Some(Ok((_, Token::Int(n)))) if n >= 0 => n as u64,
                _ => return Err(PdfError::SyntaxError("bad xref entry offset".into())),
            };
            let genno = match lexer.next_token() {
                Some(Ok((_, Token::Int(n)))) if (0..=PdfRef::MAX_GEN as i64).contains(&n) => {
                    n as u16
                }
                _ => return Err(PdfError::SyntaxError("bad xref entry generation".into())),
            };
            let free = match lexer.next_token() {
                Some(Ok((_, Token::Keyword(Keyword::N)))) => false,
                Some(Ok((_, Token::Keyword(Keyword::F)))) => true,
                _ => return Err(PdfError::SyntaxError("bad xref entry type".into())),
            };
            raw.push((offset, genno, free));
        }

        // Repair the common off-by-one: a subsection claiming to start at
        // 1 whose first entry is really the object-0 free entry
        let start = if start == 1
            && matches!(raw.first(), Some((_, genno, true)) if *genno == PdfRef::MAX_GEN)
        {
            0
        } else {
            start
        };

        for (i, (offset, genno, free)) in raw.into_iter().enumerate() {
            let objid = start + i as u32;
            let slot = if free {
                XrefSlot::free(offset as u32, genno)
            } else {
                XrefSlot::offset(offset, genno)
            };
            entries.push((objid, slot));
        }
    }

    let trailer = ObjectParser::at(data, lexer.tell())
        .parse_object()?
        .as_dict()
        .cloned()
        .map_err(|_| PdfError::SyntaxError("xref trailer is not a dictionary".into()))?;

    Ok(XrefSection {
        entries,
        trailer,
        is_stream: false,
    })
}

/// Parse an xref stream at `offset`.
fn read_xref_stream(
    data: &[u8],
    offset: usize,
    limits: &MemoryLimitsAwareHandler,
) -> Result<XrefSection> {
    let (_, obj) = ObjectParser::at(data, offset).parse_indirect_object(None)?;
    let stream = obj.as_stream()?;
    match stream.get("Type") {
        Some(PdfObject::Name(name)) if name == "XRef" => {}
        _ => return Err(PdfError::SyntaxError("xref stream missing /Type /XRef".into())),
    }

    let widths: Vec<usize> = stream
        .get("W")
        .and_then(|w| w.as_array().ok())
        .ok_or_else(|| PdfError::KeyError("W".into()))?
        .iter()
        .map(|v| match v {
            PdfObject::Int(n) if (0..=8).contains(n) => Ok(*n as usize),
            _ => Err(PdfError::SyntaxError("bad /W width".into())),
        })
        .collect::<Result<_>>()?;
    if widths.len() != 3 {
        return Err(PdfError::SyntaxError("/W must have three elements".into()));
    }

    let size = match stream.get("Size") {
        Some(PdfObject::Int(n)) if *n >= 0 => *n as u64,
        _ => return Err(PdfError::KeyError("Size".into())),
    };

    let index: Vec<(u64, u64)> = match stream.get("Index") {
        Some(PdfObject::Array(items)) => items
            .chunks(2)
            .map(|pair| match pair {
                [PdfObject::Int(start), PdfObject::Int(count)] if *start >= 0 && *count >= 0 => {
                    Ok((*start as u64, *count as u64))
                }
                _ => Err(PdfError::SyntaxError("bad /Index pair".into())),
            })
            .collect::<Result<_>>()?,
        _ => vec![(0, size)],
    };

    let decoded = codec::decode_chain(stream, limits)?;
    let record_len: usize = widths.iter().sum();
    if record_len == 0 {
        return Err(PdfError::SyntaxError("zero-width xref records".into()));
    }

    let mut entries = Vec::new();
    let mut cursor = 0usize;
    for (start, count) in index {
        for i in 0..count {
            if cursor + record_len > decoded.len() {
                warn!("xref stream data shorter than /Index declares");
                break;
            }
            let record = &decoded[cursor..cursor + record_len];
            cursor += record_len;

            let mut fields = [0u64; 3];
            let mut at = 0usize;
            for (field, &w) in fields.iter_mut().zip(&widths) {
                *field = read_be(&record[at..at + w]);
                at += w;
            }
            // A missing type field defaults the entry to type 1
            let entry_type = if widths[0] == 0 { 1 } else { fields[0] };

            let objid = start + i;
            if objid > u32::MAX as u64 {
                return Err(PdfError::SyntaxError("object number out of range".into()));
            }
            let objid = objid as u32;
            let slot = match entry_type {
                0 => XrefSlot::free(
                    fields[1].min(u32::MAX as u64) as u32,
                    fields[2].min(PdfRef::MAX_GEN as u64) as u16,
                ),
                1 => XrefSlot::offset(fields[1], fields[2].min(PdfRef::MAX_GEN as u64) as u16),
                2 => XrefSlot::in_stream(
                    fields[1].min(u32::MAX as u64) as u32,
                    fields[2].min(u32::MAX as u64) as u32,
                ),
                other => {
                    warn!(objid, entry_type = other, "unknown xref entry type, skipping");
                    continue;
                }
            };
            entries.push((objid, slot));
        }
    }

    Ok(XrefSection {
        entries,
        trailer: stream.attrs.clone(),
        is_stream: true,
    })
}

/// Big-endian integer of 0..=8 bytes; zero width reads as 0.
fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

static OBJ_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?-u)(\d{1,10})[ \t\r\n]+(\d{1,5})[ \t\r\n]+obj\b").unwrap());

static TRAILER_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?-u)trailer\b").unwrap());

/// Rebuild the table by scanning the whole file for `N G obj` headers.
///
/// Later headers win, so the newest incremental update of each object is
/// the one indexed. Object streams found during the scan are expanded so
/// compressed objects stay reachable.
fn rebuild_xref(
    data: &[u8],
    limits: &MemoryLimitsAwareHandler,
) -> Result<(XrefTable, PdfDict)> {
    let mut found: FxHashMap<u32, (u64, u16)> = FxHashMap::default();
    for caps in OBJ_HEADER.captures_iter(data) {
        let whole = caps.get(0).unwrap();
        let objid = parse_ascii_u64(&caps[1]);
        let genno = parse_ascii_u64(&caps[2]);
        if let (Some(objid), Some(genno)) = (objid, genno) {
            if objid >= 1 && objid <= u32::MAX as u64 && genno <= PdfRef::MAX_GEN as u64 {
                // Later matches overwrite: the newest update wins
                found.insert(objid as u32, (whole.start() as u64, genno as u16));
            }
        }
    }

    if found.is_empty() {
        return Err(PdfError::NoValidXref);
    }

    let mut xref = XrefTable::new();
    for (&objid, &(offset, genno)) in &found {
        xref.set(objid, XrefSlot::offset(offset, genno), limits)?;
    }

    // Trailers still present in the file carry Root/Info; later wins
    let mut trailer = PdfDict::new();
    for m in TRAILER_KEYWORD.find_iter(data) {
        if let Ok(PdfObject::Dict(dict)) = ObjectParser::at(data, m.end()).parse_object() {
            for (key, value) in dict {
                trailer.insert(key, value);
            }
        }
    }
    trailer.shift_remove("Prev");
    trailer.shift_remove("XRefStm");

    // Expand object streams so their members are reachable; top-level
    // headers found by the scan keep precedence
    let top_level: Vec<(u32, u64)> = found.iter().map(|(&id, &(off, _))| (id, off)).collect();
    for (container, offset) in top_level {
        let parsed = ObjectParser::at(data, offset as usize).parse_indirect_object(None);
        let Ok((_, obj)) = parsed else { continue };
        let Ok(stream) = obj.as_stream() else { continue };
        let is_objstm = matches!(stream.get("Type"), Some(PdfObject::Name(n)) if n == "ObjStm");
        if is_objstm {
            if let Err(err) = index_objstm_members(stream, container, &mut xref, limits) {
                warn!(container, error = %err, "skipping unreadable object stream");
            }
        }
        // An xref stream's dictionary doubles as a trailer
        let is_xref = matches!(stream.get("Type"), Some(PdfObject::Name(n)) if n == "XRef");
        if is_xref {
            for (key, value) in &stream.attrs {
                if !trailer.contains_key(key) {
                    trailer.insert(key.clone(), value.clone());
                }
            }
            trailer.shift_remove("Prev");
        }
    }

    // Last resort for /Root: find a catalog among the scanned objects
    if !trailer.contains_key("Root") {
        let mut ids: Vec<u32> = found.keys().copied().collect();
        ids.sort_unstable();
        for objid in ids {
            let (offset, genno) = found[&objid];
            let Ok((_, obj)) =
                ObjectParser::at(data, offset as usize).parse_indirect_object(None)
            else {
                continue;
            };
            let is_catalog = obj
                .as_dict()
                .ok()
                .and_then(|d| d.get("Type"))
                .is_some_and(|t| matches!(t, PdfObject::Name(n) if n == "Catalog"));
            if is_catalog {
                trailer.insert("Root".into(), PdfObject::Ref(PdfRef::new(objid, genno)));
                break;
            }
        }
    }

    warn!(
        objects = xref.count_of_indirect_objects(),
        "cross-reference table rebuilt from full scan"
    );
    Ok((xref, trailer))
}

fn index_objstm_members(
    stream: &PdfStream,
    container: u32,
    xref: &mut XrefTable,
    limits: &MemoryLimitsAwareHandler,
) -> Result<()> {
    let count = match stream.get("N") {
        Some(PdfObject::Int(n)) if *n >= 0 => *n as usize,
        _ => return Err(PdfError::KeyError("N".into())),
    };
    let first = match stream.get("First") {
        Some(PdfObject::Int(n)) if *n >= 0 => *n as usize,
        _ => return Err(PdfError::KeyError("First".into())),
    };
    let data = codec::decode_chain(stream, limits)?;
    if first > data.len() {
        return Err(PdfError::SyntaxError("ObjStm /First beyond data".into()));
    }
    let mut header = ObjectParser::new(&data[..first]);
    for index in 0..count {
        let objid = header.expect_int()?;
        let _offset = header.expect_int()?;
        if objid >= 1 && objid <= u32::MAX as i64 {
            xref.add(
                objid as u32,
                XrefSlot::in_stream(container, index as u32),
                limits,
            )?;
        }
    }
    Ok(())
}

fn parse_ascii_u64(bytes: &[u8]) -> Option<u64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Byte offset just past the `%%EOF` marker (and its EOL) that follows
/// `from`, if any.
pub(crate) fn eof_offset_after(data: &[u8], from: usize) -> Option<usize> {
    let rel = find_subslice(&data[from.min(data.len())..], b"%%EOF")?;
    let mut end = from + rel + b"%%EOF".len();
    if data.get(end) == Some(&b'\r') {
        end += 1;
    }
    if data.get(end) == Some(&b'\n') {
        end += 1;
    }
    Some(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startxref_takes_last_occurrence() {
        let data = b"startxref\n5\n%%EOF\nstartxref\n42\n%%EOF\n";
        assert_eq!(find_startxref(data).unwrap(), 42);
    }

    #[test]
    fn startxref_missing_number_fails() {
        assert!(matches!(
            find_startxref(b"startxref\n%%EOF"),
            Err(PdfError::NoValidXref)
        ));
    }

    #[test]
    fn classic_table_off_by_one_repair() {
        let data = b"xref\n1 2\n0000000000 65535 f \n0000000017 00000 n \ntrailer\n<< /Size 2 >>\n";
        let limits = MemoryLimitsAwareHandler::default();
        let section = read_xref_at(data, 0, &limits).unwrap();
        assert!(!section.is_stream);
        // Subsection shifted down to start at object 0
        assert_eq!(section.entries[0].0, 0);
        assert!(section.entries[0].1.is_free());
        assert_eq!(section.entries[1].0, 1);
        assert_eq!(section.entries[1].1.state, SlotState::Offset(17));
    }

    #[test]
    fn classic_table_multiple_subsections() {
        let data =
            b"xref\n0 1\n0000000000 65535 f \n4 2\n0000000100 00000 n \n0000000200 00001 n \ntrailer\n<< /Size 6 /Root 4 0 R >>\n";
        let limits = MemoryLimitsAwareHandler::default();
        let section = read_xref_at(data, 0, &limits).unwrap();
        assert_eq!(section.entries.len(), 3);
        assert_eq!(section.entries[1], (4, XrefSlot::offset(100, 0)));
        assert_eq!(section.entries[2], (5, XrefSlot::offset(200, 1)));
        assert_eq!(
            section.trailer.get("Root"),
            Some(&PdfObject::Ref(PdfRef::new(4, 0)))
        );
    }

    #[test]
    fn eof_offset_includes_eol() {
        let data = b"junk %%EOF\r\nmore";
        assert_eq!(eof_offset_after(data, 0), Some(12));
        assert_eq!(eof_offset_after(data, 11), None);
    }

    #[test]
    fn read_be_widths() {
        assert_eq!(read_be(&[]), 0);
        assert_eq!(read_be(&[0x01]), 1);
        assert_eq!(read_be(&[0x01, 0x02]), 0x0102);
    }
}
