//! Page store and bank manager.
//!
//! The 16-bit address space is covered by [`crate::page::PAGE_COUNT`]
//! slots. Two parallel page tables (read, write) index by `addr >> 10`
//! and each slot names a bank id plus a page index within that bank.
//! Banks own their pages outright; mapping a bank just points table
//! slots at its pages, it never copies them.

use crate::error::{AnalyserError, Result};
use crate::page::{Page, PAGE_COUNT, PAGE_SIZE};

/// One slot of a page table: which bank's which page is visible there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankPageRef {
    pub bank_id: i16,
    pub page_index: usize,
}

/// A named, contiguous region of host memory plus its analyser
/// decorations.
#[derive(Debug, Clone)]
pub struct Bank {
    pub id: i16,
    pub name: String,
    pub page_count: usize,
    pub pages: Vec<Page>,
    /// Raw bytes backing this bank, `page_count * PAGE_SIZE` long.
    ///
    /// The original wraps a pointer the host hands in at bank creation;
    /// that borrow does not translate cleanly into safe Rust ownership,
    /// so a bank here owns its memory outright (see DESIGN.md). A host
    /// that wants the analyser to see its own live RAM writes through
    /// [`BankManager::write_byte`] instead of mutating a pointer the
    /// analyser aliases.
    memory: Vec<u8>,
    pub primary_mapped_page: Option<usize>,
    pub mapped_pages: Vec<usize>,
    pub read_only: bool,
    /// Whether `memory` holds this bank's authoritative byte content.
    /// A decoration-only bank (the flat default [`CodeAnalyser::new`]
    /// maps across the whole space, see `analyser.rs`) leaves this
    /// `false`: its `memory` is never populated, so
    /// [`BankManager::read_byte`] must not serve from it and instead
    /// lets the caller fall through to the live [`crate::byte_source::ByteSource`].
    pub backed: bool,
    pub dirty: bool,
}

impl Bank {
    fn new(id: i16, name: String, page_count: usize, read_only: bool, backed: bool) -> Self {
        let pages = (0..page_count).map(|_| Page::new(0)).collect();
        Self {
            id,
            name,
            page_count,
            pages,
            memory: vec![0u8; page_count * PAGE_SIZE],
            primary_mapped_page: None,
            mapped_pages: Vec::new(),
            read_only,
            backed,
            dirty: false,
        }
    }

    #[must_use]
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// Clears the bank's dirty flag, returning whether it had been set.
    /// Consumers (serialiser, UI) call this after they have consulted
    /// and handled the dirty state.
    pub fn take_dirty(&mut self) -> bool {
        let was_dirty = self.dirty || self.pages.iter().any(|p| p.dirty);
        self.dirty = false;
        for page in &mut self.pages {
            page.dirty = false;
        }
        was_dirty
    }
}

/// Owns every [`Bank`] and the two page tables that project them into
/// the 16-bit address space.
#[derive(Debug)]
pub struct BankManager {
    banks: Vec<Bank>,
    next_id: i16,
    read_table: Vec<Option<BankPageRef>>,
    write_table: Vec<Option<BankPageRef>>,
    read_history: Vec<Vec<Option<BankPageRef>>>,
    write_history: Vec<Vec<Option<BankPageRef>>>,
    /// Raised by any map/unmap; cleared by whichever consumer observes
    /// it.
    pub memory_remapped: bool,
}

impl Default for BankManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BankManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            banks: Vec::new(),
            next_id: 0,
            read_table: vec![None; PAGE_COUNT],
            write_table: vec![None; PAGE_COUNT],
            read_history: (0..PAGE_COUNT).map(|_| Vec::new()).collect(),
            write_history: (0..PAGE_COUNT).map(|_| Vec::new()).collect(),
            memory_remapped: false,
        }
    }

    /// Creates a new, unmapped, decoration-only bank of `kib` kilobytes
    /// (so `kib` pages), returning its freshly assigned id. Its `memory`
    /// is never consulted by [`Self::read_byte`]/[`Self::write_byte`] -
    /// use [`Self::create_backed_bank`] for a bank meant to hold real
    /// byte content.
    pub fn create_bank(&mut self, name: impl Into<String>, kib: usize, read_only: bool) -> i16 {
        self.create_bank_with_backing(name, kib, read_only, false)
    }

    /// Like [`Self::create_bank`], but the returned bank's `memory` is
    /// the authoritative byte content for its range: [`Self::read_byte`]
    /// serves straight out of it (after [`Bank::memory_mut`] has been
    /// filled in) instead of falling through to the byte source.
    pub fn create_backed_bank(&mut self, name: impl Into<String>, kib: usize, read_only: bool) -> i16 {
        self.create_bank_with_backing(name, kib, read_only, true)
    }

    fn create_bank_with_backing(&mut self, name: impl Into<String>, kib: usize, read_only: bool, backed: bool) -> i16 {
        let id = self.next_id;
        self.next_id += 1;
        self.banks.push(Bank::new(id, name.into(), kib, read_only, backed));
        id
    }

    #[must_use]
    pub fn bank(&self, id: i16) -> Option<&Bank> {
        self.banks.iter().find(|b| b.id == id)
    }

    pub fn bank_mut(&mut self, id: i16) -> Option<&mut Bank> {
        self.banks.iter_mut().find(|b| b.id == id)
    }

    #[must_use]
    pub fn banks(&self) -> &[Bank] {
        &self.banks
    }

    /// Maps `id`'s pages into address-space slots `[start_page,
    /// start_page + page_count)`, rewriting both page tables. Read-only
    /// banks leave the write table pointing at whatever was there
    /// before (so writes fall through to the byte source, which is the
    /// host's ROM-shadowing behaviour).
    pub fn map_bank(&mut self, id: i16, start_page: usize) -> Result<()> {
        let bank_index = self.banks.iter().position(|b| b.id == id).ok_or(AnalyserError::UnknownBank(id))?;
        let page_count = self.banks[bank_index].page_count;
        let read_only = self.banks[bank_index].read_only;

        let mut mapped = Vec::with_capacity(page_count);
        for offset in 0..page_count {
            let slot = start_page + offset;
            if slot >= PAGE_COUNT {
                break;
            }
            self.read_history[slot].push(self.read_table[slot]);
            self.read_table[slot] = Some(BankPageRef { bank_id: id, page_index: offset });
            if !read_only {
                self.write_history[slot].push(self.write_table[slot]);
                self.write_table[slot] = Some(BankPageRef { bank_id: id, page_index: offset });
            }
            self.banks[bank_index].pages[offset].base_addr = (slot * PAGE_SIZE) as u16;
            mapped.push(slot);
        }

        self.banks[bank_index].primary_mapped_page = Some(start_page);
        self.banks[bank_index].mapped_pages = mapped;
        self.memory_remapped = true;
        Ok(())
    }

    /// Restores whatever occupied `id`'s slots before its last
    /// `map_bank` call — unmapping restores the previous occupant. A
    /// no-op, returning `Ok`, if `id` is not currently
    /// mapped.
    pub fn unmap_bank(&mut self, id: i16) -> Result<()> {
        let bank_index = self.banks.iter().position(|b| b.id == id).ok_or(AnalyserError::UnknownBank(id))?;
        let read_only = self.banks[bank_index].read_only;
        let slots = std::mem::take(&mut self.banks[bank_index].mapped_pages);
        for slot in slots {
            if let Some(previous) = self.read_history[slot].pop() {
                self.read_table[slot] = previous;
            } else {
                self.read_table[slot] = None;
            }
            if !read_only {
                if let Some(previous) = self.write_history[slot].pop() {
                    self.write_table[slot] = previous;
                } else {
                    self.write_table[slot] = None;
                }
            }
        }
        self.banks[bank_index].primary_mapped_page = None;
        self.memory_remapped = true;
        Ok(())
    }

    #[must_use]
    pub fn read_page(&self, addr: u16) -> Option<&Page> {
        let slot = self.read_table[(addr >> 10) as usize]?;
        self.banks.iter().find(|b| b.id == slot.bank_id).map(|b| &b.pages[slot.page_index])
    }

    pub fn read_page_mut(&mut self, addr: u16) -> Option<&mut Page> {
        let slot = self.read_table[(addr >> 10) as usize]?;
        self.banks.iter_mut().find(|b| b.id == slot.bank_id).map(|b| &mut b.pages[slot.page_index])
    }

    #[must_use]
    pub fn write_page(&self, addr: u16) -> Option<&Page> {
        let slot = self.write_table[(addr >> 10) as usize]?;
        self.banks.iter().find(|b| b.id == slot.bank_id).map(|b| &b.pages[slot.page_index])
    }

    pub fn write_page_mut(&mut self, addr: u16) -> Option<&mut Page> {
        let slot = self.write_table[(addr >> 10) as usize]?;
        self.banks.iter_mut().find(|b| b.id == slot.bank_id).map(|b| &mut b.pages[slot.page_index])
    }

    /// Reads a byte straight out of bank-owned memory, with no
    /// byte-source fallback; `None` means the slot is unmapped or
    /// occupied by a decoration-only bank (`Bank::backed == false`),
    /// which never holds real content no matter what its zero-filled
    /// `memory` looks like.
    #[must_use]
    pub fn read_byte(&self, addr: u16) -> Option<u8> {
        let slot = self.read_table[(addr >> 10) as usize]?;
        let bank = self.banks.iter().find(|b| b.id == slot.bank_id)?;
        if !bank.backed {
            return None;
        }
        let offset = slot.page_index * PAGE_SIZE + (addr & 0x03FF) as usize;
        bank.memory.get(offset).copied()
    }

    /// Writes a byte into bank-owned memory through the write table,
    /// a no-op if the slot is unmapped, the occupying bank is
    /// read-only, or the bank is decoration-only (`Bank::backed == false`).
    pub fn write_byte(&mut self, addr: u16, value: u8) {
        let Some(slot) = self.write_table[(addr >> 10) as usize] else { return };
        let Some(bank) = self.banks.iter_mut().find(|b| b.id == slot.bank_id) else { return };
        if bank.read_only || !bank.backed {
            return;
        }
        let offset = slot.page_index * PAGE_SIZE + (addr & 0x03FF) as usize;
        if let Some(byte) = bank.memory.get_mut(offset) {
            *byte = value;
        }
    }

    /// Clears the global remap flag, returning its previous value.
    pub fn take_memory_remapped(&mut self) -> bool {
        std::mem::replace(&mut self.memory_remapped, false)
    }

    /// The id of the bank currently read-mapped at `addr`, or `-1` if
    /// nothing is mapped there, for tagging reference-edge `AddressRef`s.
    #[must_use]
    pub fn bank_id_at(&self, addr: u16) -> i16 {
        self.read_table[(addr >> 10) as usize].map_or(-1, |slot| slot.bank_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_then_unmap_restores_prior_occupant() {
        let mut mgr = BankManager::new();
        let rom = mgr.create_bank("rom", 16, true);
        let ram = mgr.create_bank("ram", 16, false);
        mgr.map_bank(rom, 0).unwrap();
        assert_eq!(mgr.read_page(0x0000).unwrap().base_addr, 0);

        mgr.map_bank(ram, 0).unwrap();
        assert!(mgr.write_page(0x0000).is_some());

        mgr.unmap_bank(ram).unwrap();
        // rom should be visible again for reads; rom is read_only so it
        // never occupied the write table in the first place.
        let page = mgr.read_page(0x0000).unwrap();
        assert_eq!(page.base_addr, 0);
    }

    #[test]
    fn map_unknown_bank_fails() {
        let mut mgr = BankManager::new();
        assert_eq!(mgr.map_bank(99, 0), Err(AnalyserError::UnknownBank(99)));
    }

    #[test]
    fn map_raises_remap_flag_until_taken() {
        let mut mgr = BankManager::new();
        let id = mgr.create_bank("ram", 4, false);
        mgr.map_bank(id, 0).unwrap();
        assert!(mgr.take_memory_remapped());
        assert!(!mgr.take_memory_remapped());
    }

    #[test]
    fn unmapped_slot_reads_as_none() {
        let mgr = BankManager::new();
        assert!(mgr.read_page(0x8000).is_none());
    }

    #[test]
    fn decoration_only_bank_never_serves_read_byte() {
        let mut mgr = BankManager::new();
        let id = mgr.create_bank("default", 1, false);
        mgr.map_bank(id, 0).unwrap();
        assert!(mgr.read_byte(0x0000).is_none());
    }

    #[test]
    fn backed_bank_serves_its_own_memory() {
        let mut mgr = BankManager::new();
        let id = mgr.create_backed_bank("rom", 1, true);
        mgr.bank_mut(id).unwrap().memory_mut()[0] = 0xCD;
        mgr.map_bank(id, 0).unwrap();
        assert_eq!(mgr.read_byte(0x0000), Some(0xCD));
    }
}
