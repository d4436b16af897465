//! Cross-reference table with a threaded free list.
//!
//! Object numbers index a dense slot array. Slot 0 is always the free-list
//! sentinel (generation 65535); freed slots are threaded through it so
//! allocation pops in O(1). A freed slot carries the generation number its
//! next incarnation will use, so the bump happens at free time.

use crate::error::Result;
use crate::limits::MemoryLimitsAwareHandler;
use crate::model::PdfRef;

/// Where an object's bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Member of the free list; `next_free` is the next free object
    /// number, 0 terminates the chain at the sentinel.
    Free { next_free: u32 },
    /// Byte offset of an uncompressed `N G obj` in the file.
    Offset(u64),
    /// Stored inside an object stream at the given index.
    InStream { container: u32, index: u32 },
}

/// One cross-reference entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XrefSlot {
    pub genno: u16,
    pub state: SlotState,
}

impl XrefSlot {
    pub const fn offset(offset: u64, genno: u16) -> Self {
        Self {
            genno,
            state: SlotState::Offset(offset),
        }
    }

    pub const fn in_stream(container: u32, index: u32) -> Self {
        Self {
            genno: 0,
            state: SlotState::InStream { container, index },
        }
    }

    pub const fn free(next_free: u32, genno: u16) -> Self {
        Self {
            genno,
            state: SlotState::Free { next_free },
        }
    }

    pub const fn is_free(&self) -> bool {
        matches!(self.state, SlotState::Free { .. })
    }
}

/// Dense cross-reference table.
#[derive(Debug, Clone)]
pub struct XrefTable {
    /// Indexed by object number; `None` means the number was never
    /// mentioned by any xref section.
    slots: Vec<Option<XrefSlot>>,
}

impl Default for XrefTable {
    fn default() -> Self {
        Self::new()
    }
}

impl XrefTable {
    /// Create a table holding only the free-list sentinel.
    pub fn new() -> Self {
        Self {
            slots: vec![Some(XrefSlot::free(0, PdfRef::MAX_GEN))],
        }
    }

    /// Number of slots, including the sentinel and unmentioned holes.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Largest object number with any entry, plus one.
    pub fn next_objid(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Grow the slot array so that object numbers below `capacity` are
    /// addressable.
    pub fn grow_to(&mut self, capacity: usize, limits: &MemoryLimitsAwareHandler) -> Result<()> {
        if capacity <= self.slots.len() {
            return Ok(());
        }
        limits.check_xref_capacity(capacity)?;
        self.slots.resize(capacity, None);
        Ok(())
    }

    pub fn get(&self, objid: u32) -> Option<&XrefSlot> {
        self.slots.get(objid as usize).and_then(|s| s.as_ref())
    }

    /// Record an entry, keeping any existing one.
    ///
    /// Revision sections are loaded newest first and the newest mention
    /// of an object number wins, so insertion is first-write-wins.
    /// Returns whether the entry was recorded.
    pub fn add(
        &mut self,
        objid: u32,
        slot: XrefSlot,
        limits: &MemoryLimitsAwareHandler,
    ) -> Result<bool> {
        // Never displace the sentinel
        if objid == 0 {
            return Ok(false);
        }
        self.grow_to(objid as usize + 1, limits)?;
        let entry = &mut self.slots[objid as usize];
        if entry.is_some() {
            return Ok(false);
        }
        *entry = Some(slot);
        Ok(true)
    }

    /// Record an entry, replacing any existing one. Used while writing,
    /// where the table reflects the output being built.
    pub fn set(
        &mut self,
        objid: u32,
        slot: XrefSlot,
        limits: &MemoryLimitsAwareHandler,
    ) -> Result<()> {
        if objid == 0 {
            return Ok(());
        }
        self.grow_to(objid as usize + 1, limits)?;
        self.slots[objid as usize] = Some(slot);
        Ok(())
    }

    /// Free an entry and thread it onto the free list.
    ///
    /// The stored generation is bumped so the number's next incarnation
    /// is distinguishable from the old one. A slot that reaches the
    /// maximum generation is terminal: it stays off the reuse path.
    pub fn free_entry(&mut self, objid: u32) {
        if objid == 0 || objid as usize >= self.slots.len() {
            return;
        }
        let genno = match &self.slots[objid as usize] {
            Some(slot) if slot.is_free() => return,
            Some(slot) => slot.genno.saturating_add(1),
            None => 1,
        };
        if genno == PdfRef::MAX_GEN {
            self.slots[objid as usize] = Some(XrefSlot::free(0, genno));
            return;
        }
        let head = self.free_head();
        self.slots[objid as usize] = Some(XrefSlot::free(head, genno));
        self.set_free_head(objid);
    }

    /// Allocate an object number for a new indirect object.
    ///
    /// Pops the free-list head when one is available (reusing its
    /// already-bumped generation), otherwise appends a fresh slot with
    /// generation 0. The returned slot is marked occupied at offset 0
    /// until the writer records the real location.
    pub fn allocate(&mut self, limits: &MemoryLimitsAwareHandler) -> Result<PdfRef> {
        let head = self.free_head();
        if head != 0 {
            if let Some(XrefSlot {
                genno,
                state: SlotState::Free { next_free },
            }) = self.slots[head as usize]
            {
                self.set_free_head(next_free);
                self.slots[head as usize] = Some(XrefSlot::offset(0, genno));
                return Ok(PdfRef::new(head, genno));
            }
        }
        let objid = self.slots.len() as u32;
        self.grow_to(objid as usize + 1, limits)?;
        self.slots[objid as usize] = Some(XrefSlot::offset(0, 0));
        Ok(PdfRef::new(objid, 0))
    }

    /// Rebuild the free-list chain in ascending object-number order.
    ///
    /// Unmentioned holes become terminal free entries so they are never
    /// handed out; existing free slots keep their generation.
    pub fn init_free_list(&mut self) {
        let mut reusable: Vec<u32> = Vec::new();
        for objid in 1..self.slots.len() as u32 {
            match &self.slots[objid as usize] {
                Some(slot) if slot.is_free() => {
                    if slot.genno < PdfRef::MAX_GEN {
                        reusable.push(objid);
                    } else {
                        self.slots[objid as usize] = Some(XrefSlot::free(0, PdfRef::MAX_GEN));
                    }
                }
                Some(_) => {}
                None => {
                    self.slots[objid as usize] = Some(XrefSlot::free(0, PdfRef::MAX_GEN));
                }
            }
        }
        let mut next = 0u32;
        for &objid in reusable.iter().rev() {
            let genno = self.slots[objid as usize]
                .as_ref()
                .map(|s| s.genno)
                .unwrap_or(0);
            self.slots[objid as usize] = Some(XrefSlot::free(next, genno));
            next = objid;
        }
        self.set_free_head(next);
    }

    /// Number of live indirect objects: occupied slots, excluding the
    /// sentinel, free entries, and unmentioned holes.
    pub fn count_of_indirect_objects(&self) -> usize {
        self.slots
            .iter()
            .skip(1)
            .filter(|s| matches!(s, Some(slot) if !slot.is_free()))
            .count()
    }

    /// Iterate over all defined entries in object-number order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &XrefSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|slot| (i as u32, slot)))
    }

    fn free_head(&self) -> u32 {
        match self.slots[0] {
            Some(XrefSlot {
                state: SlotState::Free { next_free },
                ..
            }) => next_free,
            _ => 0,
        }
    }

    fn set_free_head(&mut self, objid: u32) {
        self.slots[0] = Some(XrefSlot::free(objid, PdfRef::MAX_GEN));
    }
}
