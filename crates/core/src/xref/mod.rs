//! Cross-reference table - maps object numbers to storage locations.

pub mod table;

pub use table::{SlotState, XrefSlot, XrefTable};
