//! The data model: one 1 KiB page of decorations parallel to memory, and
//! the value types it is built from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::xref::ReferenceSet;

/// Number of bytes in one page; the 16-bit address space is exactly
/// [`PAGE_COUNT`] of these.
pub const PAGE_SIZE: usize = 1024;
/// Number of pages covering the full 16-bit address space.
pub const PAGE_COUNT: usize = 65536 / PAGE_SIZE;

/// A value type identifying one referencing (or owning) instruction:
/// which bank it lived in when the reference was recorded, and its
/// address within that bank's address-space view.
///
/// `bank_id == -1` is used for references recorded against the flat byte
/// source with no bank mapped (the common case for a single flat 64 KiB
/// machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressRef {
    pub bank_id: i16,
    pub addr: u16,
}

impl AddressRef {
    pub const NONE: Self = Self { bank_id: -1, addr: 0 };

    #[must_use]
    pub fn new(bank_id: i16, addr: u16) -> Self {
        Self { bank_id, addr }
    }

    /// An `AddressRef` with no bank context, for flat (unbanked) machines.
    #[must_use]
    pub fn flat(addr: u16) -> Self {
        Self { bank_id: -1, addr }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabelKind {
    Code,
    Function,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Byte,
    Word,
    Text,
    Bitmap,
    CharacterMap,
    Graphics,
    Blob,
    InstructionOperand,
}

impl Default for DataType {
    fn default() -> Self {
        Self::Byte
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperandKind {
    Unknown,
    Decimal,
    Hex,
    Binary,
    Pointer,
    JumpAddress,
}

impl Default for OperandKind {
    fn default() -> Self {
        Self::Unknown
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelInfo {
    pub addr: u16,
    pub name: String,
    pub kind: LabelKind,
    pub global: bool,
    pub references: ReferenceSet,
    pub byte_size: u16,
    /// A standalone comment attached to the label itself, distinct from
    /// any [`CommentBlock`] at the same address. Empty for almost every
    /// label; carried so the binary and JSON formats can round-trip one.
    pub comment: String,
}

impl LabelInfo {
    #[must_use]
    pub fn new(addr: u16, name: String, kind: LabelKind) -> Self {
        let global = kind == LabelKind::Data;
        Self { addr, name, kind, global, references: ReferenceSet::new(), byte_size: 1, comment: String::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeInfo {
    pub addr: u16,
    pub text: String,
    pub byte_size: u8,
    pub jump_addr: Option<u16>,
    pub pointer_addr: Option<u16>,
    pub operand_kind: OperandKind,
    pub flags: u32,
    pub self_modifying: bool,
    pub disabled: bool,
    pub comment: String,
}

impl CodeInfo {
    #[must_use]
    pub fn new(addr: u16, text: String, byte_size: u8) -> Self {
        Self { addr, text, byte_size, ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataInfo {
    pub addr: u16,
    pub data_type: DataType,
    pub byte_size: u16,
    pub reads: ReferenceSet,
    pub writes: ReferenceSet,
    pub last_frame_read: u32,
    pub last_frame_written: u32,
    pub last_writer: Option<AddressRef>,
    pub char_set_address: Option<u16>,
    pub empty_char_no: Option<u8>,
    pub comment: String,
}

impl DataInfo {
    #[must_use]
    pub fn default_byte(addr: u16) -> Self {
        Self {
            addr,
            data_type: DataType::Byte,
            byte_size: 1,
            reads: ReferenceSet::new(),
            writes: ReferenceSet::new(),
            last_frame_read: 0,
            last_frame_written: 0,
            last_writer: None,
            char_set_address: None,
            empty_char_no: None,
            comment: String::new(),
        }
    }

    /// Whether this slot still holds the implicit default (a 1-byte,
    /// untouched `Byte` entry with nothing recorded against it) - used by
    /// the JSON exporter to decide whether an entry is worth writing out.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.data_type == DataType::Byte
            && self.byte_size == 1
            && self.reads.is_empty()
            && self.writes.is_empty()
            && self.comment.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentBlock {
    pub addr: u16,
    pub comment: String,
}

/// CPU register/frame snapshot recorded for an address, for UI display
/// only; the analyser never reasons about its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MachineState {
    pub pc: u16,
    pub frame_no: u32,
}

/// One 1 KiB unit of the address space.
///
/// `CodeInfo` back-references follow the arena + index pattern called
/// for in the design notes: `code_owner[offset]` gives the offset of the
/// primary slot owning that byte (if any), and the actual entry lives in
/// `code_primary`, keyed by that same primary offset. Non-primary slots
/// in a multi-byte span never appear as keys in `code_primary`.
#[derive(Debug, Clone)]
pub struct Page {
    pub base_addr: u16,
    /// Set once this page has ever held a label, code entry, or comment;
    /// never cleared back to `false`. Lets consumers (the JSON exporter)
    /// skip a page that never received any decoration without scanning
    /// its whole `data` array first.
    pub used: bool,
    pub labels: HashMap<u16, LabelInfo>,
    code_primary: HashMap<u16, CodeInfo>,
    code_owner: Vec<Option<u16>>,
    pub data: Vec<DataInfo>,
    pub comments: HashMap<u16, CommentBlock>,
    pub machine_state: HashMap<u16, MachineState>,
    pub dirty: bool,
}

impl Page {
    #[must_use]
    pub fn new(base_addr: u16) -> Self {
        let data = (0..PAGE_SIZE as u16).map(|offset| DataInfo::default_byte(base_addr.wrapping_add(offset))).collect();
        Self {
            base_addr,
            used: false,
            labels: HashMap::new(),
            code_primary: HashMap::new(),
            code_owner: vec![None; PAGE_SIZE],
            data,
            comments: HashMap::new(),
            machine_state: HashMap::new(),
            dirty: false,
        }
    }

    /// The `CodeInfo` owning `offset`, whether `offset` is itself the
    /// primary slot or a non-owning back-reference into its span.
    #[must_use]
    pub fn code_at(&self, offset: u16) -> Option<&CodeInfo> {
        let primary = self.code_owner[offset as usize]?;
        self.code_primary.get(&primary)
    }

    #[must_use]
    pub fn code_at_mut(&mut self, offset: u16) -> Option<&mut CodeInfo> {
        let primary = self.code_owner[offset as usize]?;
        self.code_primary.get_mut(&primary)
    }

    /// Whether `offset` is the primary (owning) slot of a `CodeInfo` span.
    #[must_use]
    pub fn is_code_primary(&self, offset: u16) -> bool {
        self.code_owner[offset as usize] == Some(offset)
    }

    /// Iterates primary `CodeInfo` entries in ascending offset order.
    pub fn primary_code_iter(&self) -> impl Iterator<Item = &CodeInfo> {
        let mut offsets: Vec<u16> = self.code_primary.keys().copied().collect();
        offsets.sort_unstable();
        offsets.into_iter().map(move |o| &self.code_primary[&o])
    }

    /// Claims `[offset, offset + info.byte_size)` for a new `CodeInfo`,
    /// clearing any previous owner in that span first. Returns the
    /// replaced entry, if `offset` was already a primary slot.
    pub fn set_code(&mut self, offset: u16, info: CodeInfo) -> Option<CodeInfo> {
        self.clear_code(offset);
        let span = info.byte_size.max(1) as u16;
        for i in 0..span {
            let slot = offset.wrapping_add(u16::from(i));
            if (slot as usize) < PAGE_SIZE {
                self.code_owner[slot as usize] = Some(offset);
            }
        }
        self.used = true;
        self.dirty = true;
        self.code_primary.insert(offset, info)
    }

    /// Removes the `CodeInfo` spanning from primary slot `offset`
    /// (a no-op if `offset` is not a primary slot), freeing every
    /// back-reference in its span.
    pub fn clear_code(&mut self, offset: u16) -> Option<CodeInfo> {
        let removed = self.code_primary.remove(&offset)?;
        let span = removed.byte_size.max(1) as u16;
        for i in 0..span {
            let slot = offset.wrapping_add(u16::from(i));
            if (slot as usize) < PAGE_SIZE && self.code_owner[slot as usize] == Some(offset) {
                self.code_owner[slot as usize] = None;
            }
        }
        self.dirty = true;
        Some(removed)
    }

    #[must_use]
    pub fn label_at(&self, offset: u16) -> Option<&LabelInfo> {
        self.labels.get(&offset)
    }

    pub fn set_label(&mut self, offset: u16, label: LabelInfo) -> Option<LabelInfo> {
        self.used = true;
        self.dirty = true;
        self.labels.insert(offset, label)
    }

    pub fn remove_label(&mut self, offset: u16) -> Option<LabelInfo> {
        self.dirty = true;
        self.labels.remove(&offset)
    }

    #[must_use]
    pub fn data_at(&self, offset: u16) -> &DataInfo {
        &self.data[offset as usize]
    }

    pub fn data_at_mut(&mut self, offset: u16) -> &mut DataInfo {
        self.dirty = true;
        &mut self.data[offset as usize]
    }

    pub fn set_comment(&mut self, offset: u16, comment: String) {
        self.used = true;
        self.dirty = true;
        if comment.is_empty() {
            self.comments.remove(&offset);
        } else {
            self.comments.insert(offset, CommentBlock { addr: self.base_addr.wrapping_add(offset), comment });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_page_has_default_byte_everywhere() {
        let page = Page::new(0x4000);
        assert!(page.data_at(0).is_default());
        assert!(page.data_at(1023).is_default());
        assert_eq!(page.data.len(), PAGE_SIZE);
    }

    #[test]
    fn set_code_claims_whole_span_and_clear_frees_it() {
        let mut page = Page::new(0x4000);
        let info = CodeInfo::new(0x4000, "ld hl,#OPERAND_ADDR#".to_string(), 3);
        page.set_code(0, info);
        assert!(page.is_code_primary(0));
        assert!(!page.is_code_primary(1));
        assert!(page.code_at(1).is_some());
        assert!(page.code_at(2).is_some());
        assert!(page.code_at(3).is_none());

        let removed = page.clear_code(0).unwrap();
        assert_eq!(removed.byte_size, 3);
        assert!(page.code_at(0).is_none());
        assert!(page.code_at(1).is_none());
    }

    #[test]
    fn set_code_overwriting_shrinks_previous_span_cleanly() {
        let mut page = Page::new(0x4000);
        page.set_code(0, CodeInfo::new(0x4000, "ld a,b".to_string(), 1));
        page.set_code(1, CodeInfo::new(0x4001, "ld hl,#OPERAND_ADDR#".to_string(), 3));
        assert!(page.is_code_primary(0));
        assert!(page.is_code_primary(1));
        // Re-claim offset 0 with a 2-byte instruction that overlaps the span at 1.
        page.set_code(0, CodeInfo::new(0x4000, "ld a,#OPERAND_ADDR#".to_string(), 2));
        assert!(page.is_code_primary(0));
        // The old primary at 1 is still tracked independently; overlap
        // handling (retyping) is the analyser's job, not the page's.
        assert!(page.code_at(0).is_some());
    }

    #[test]
    fn primary_code_iter_is_address_ordered() {
        let mut page = Page::new(0x4000);
        page.set_code(10, CodeInfo::new(0x400A, "nop".to_string(), 1));
        page.set_code(2, CodeInfo::new(0x4002, "nop".to_string(), 1));
        let addrs: Vec<u16> = page.primary_code_iter().map(|c| c.addr).collect();
        assert_eq!(addrs, vec![0x4002, 0x400A]);
    }
}
