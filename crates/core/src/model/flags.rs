//! Lifecycle flags for indirect objects.

/// Bit set tracking the lifecycle state of a stored indirect object.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectFlags(u16);

impl ObjectFlags {
    /// The slot is a free-list tombstone.
    pub const FREE: ObjectFlags = ObjectFlags(1 << 0);
    /// The payload differs from what is on disk.
    pub const MODIFIED: ObjectFlags = ObjectFlags(1 << 1);
    /// The object must be written even if unreachable.
    pub const MUST_BE_FLUSHED: ObjectFlags = ObjectFlags(1 << 2);
    /// The payload has been serialized into the pending output.
    pub const FLUSHED: ObjectFlags = ObjectFlags(1 << 3);
    /// Releasing this object would corrupt invariants held elsewhere.
    pub const FORBID_RELEASE: ObjectFlags = ObjectFlags(1 << 4);
    /// The object originates from a reading document.
    pub const READ_ONLY: ObjectFlags = ObjectFlags(1 << 5);
    /// The object was read out of an object stream.
    pub const ORIGINAL_OBJECT_STREAM: ObjectFlags = ObjectFlags(1 << 6);
    /// The object may never be inlined as a direct value.
    pub const MUST_BE_INDIRECT: ObjectFlags = ObjectFlags(1 << 7);
    /// The payload was dropped without being flushed.
    pub const RELEASED: ObjectFlags = ObjectFlags(1 << 8);

    pub const fn empty() -> Self {
        ObjectFlags(0)
    }

    pub const fn contains(self, other: ObjectFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: ObjectFlags) {
        self.0 |= other.0;
    }

    pub fn clear(&mut self, other: ObjectFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for ObjectFlags {
    type Output = ObjectFlags;

    fn bitor(self, rhs: ObjectFlags) -> ObjectFlags {
        ObjectFlags(self.0 | rhs.0)
    }
}

impl std::fmt::Debug for ObjectFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [(ObjectFlags, &str); 9] = [
            (ObjectFlags::FREE, "FREE"),
            (ObjectFlags::MODIFIED, "MODIFIED"),
            (ObjectFlags::MUST_BE_FLUSHED, "MUST_BE_FLUSHED"),
            (ObjectFlags::FLUSHED, "FLUSHED"),
            (ObjectFlags::FORBID_RELEASE, "FORBID_RELEASE"),
            (ObjectFlags::READ_ONLY, "READ_ONLY"),
            (ObjectFlags::ORIGINAL_OBJECT_STREAM, "ORIGINAL_OBJECT_STREAM"),
            (ObjectFlags::MUST_BE_INDIRECT, "MUST_BE_INDIRECT"),
            (ObjectFlags::RELEASED, "RELEASED"),
        ];
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        if first {
            write!(f, "(empty)")?;
        }
        Ok(())
    }
}
