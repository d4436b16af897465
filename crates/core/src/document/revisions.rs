//! Enumerates the incremental revisions of a file.
//!
//! Each incremental save appends a body, an xref section, and `%%EOF`.
//! Walking the `Prev` chain from the newest section recovers the save
//! history: which objects each revision touched and where the file ended
//! at that point in time.

use crate::document::reader::{eof_offset_after, find_startxref, read_xref_at};
use crate::error::Result;
use crate::limits::MemoryLimitsAwareHandler;
use crate::model::{PdfObject, PdfRef};
use crate::xref::SlotState;
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use tracing::warn;

/// One incremental revision of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRevision {
    /// References written by this revision, including freed entries.
    /// The free-list sentinel `0 65535 R` is a member of every set.
    pub modified: BTreeSet<PdfRef>,
    /// Offset just past this revision's `%%EOF` marker and its EOL;
    /// truncating the file here yields the document as of this revision.
    pub eof_offset: usize,
    /// Offset of this revision's xref section.
    pub xref_offset: usize,
}

/// Read the revision history of a file, newest first.
///
/// Each revision's set is built from its own xref section only (plus the
/// `/XRefStm` section of the same revision in hybrid files), not from the
/// merged view. The walk stops with a warning at the first unparsable
/// link, returning the revisions recovered so far.
pub fn read_revisions(
    data: &[u8],
    limits: &MemoryLimitsAwareHandler,
) -> Result<Vec<DocumentRevision>> {
    let startxref = find_startxref(data)?;
    let mut revisions = Vec::new();
    let mut visited: FxHashSet<usize> = FxHashSet::default();
    let mut offset = startxref;

    loop {
        if !visited.insert(offset) {
            warn!(offset, "cycle in xref Prev chain, stopping revision walk");
            break;
        }
        let section = match read_xref_at(data, offset, limits) {
            Ok(section) => section,
            Err(err) => {
                warn!(offset, error = %err, "unparsable revision link, stopping walk");
                break;
            }
        };

        let mut modified = BTreeSet::new();
        modified.insert(PdfRef::sentinel());
        collect_refs(&mut modified, &section.entries);

        // Hybrid: the XRefStm section belongs to this same revision
        if !section.is_stream {
            if let Some(PdfObject::Int(stm_offset)) = section.trailer.get("XRefStm") {
                if *stm_offset >= 0 {
                    match read_xref_at(data, *stm_offset as usize, limits) {
                        Ok(stm_section) if stm_section.is_stream => {
                            collect_refs(&mut modified, &stm_section.entries);
                        }
                        Ok(_) => warn!(offset = stm_offset, "XRefStm does not point at a stream"),
                        Err(err) => warn!(error = %err, "failed to read XRefStm section"),
                    }
                }
            }
        }

        let eof_offset = eof_offset_after(data, offset).unwrap_or(data.len());
        revisions.push(DocumentRevision {
            modified,
            eof_offset,
            xref_offset: offset,
        });

        match section.trailer.get("Prev") {
            Some(PdfObject::Int(prev)) if *prev >= 0 => offset = *prev as usize,
            _ => break,
        }
    }

    Ok(revisions)
}

fn collect_refs(set: &mut BTreeSet<PdfRef>, entries: &[(u32, crate::xref::XrefSlot)]) {
    for (objid, slot) in entries {
        if *objid == 0 {
            continue;
        }
        let genno = match slot.state {
            SlotState::InStream { .. } => 0,
            _ => slot.genno,
        };
        set.insert(PdfRef::new(*objid, genno));
    }
}
