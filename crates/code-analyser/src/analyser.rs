//! `CodeAnalyser`: the facade wrapping the page store, bank manager and
//! byte source, and the recursive static analyser.

use std::ops::Range;

use crate::bank::BankManager;
use crate::byte_source::ByteSource;
use crate::classifier;
use crate::config::AnalyserConfig;
use crate::disassembler::{self, PlaceholderFormatter};
use crate::labels::LabelTable;
use crate::page::{AddressRef, CodeInfo, DataType, LabelInfo, LabelKind, OperandKind, PAGE_COUNT, PAGE_SIZE};

/// Owns the whole analysis state for one 64 KiB address space: the
/// paged decoration store (via [`BankManager`]), the process-wide
/// [`LabelTable`], the undo stack's bookkeeping, and a borrow of the
/// live [`ByteSource`] it decodes from.
pub struct CodeAnalyser<B: ByteSource> {
    byte_source: B,
    pub banks: BankManager,
    pub labels: LabelTable,
    config: AnalyserConfig,
    watches: Vec<AddressRef>,
    current_frame: u32,
}

impl<B: ByteSource> CodeAnalyser<B> {
    /// Builds a fresh analyser. A single default, decoration-only bank
    /// is created and mapped across the whole address space so every
    /// address has a home for its labels/code/data from the outset
    /// (exactly one read/write page is mapped at any instant); it holds
    /// no real byte content (`Bank::backed == false`), so [`Self::read_byte`]
    /// always falls through to the live [`ByteSource`] for the actual
    /// program bytes. A host with real bank-switching calls
    /// `banks.create_backed_bank`/`map_bank` itself afterwards to
    /// replace slots as it sets up ROM/RAM the analyser should read
    /// directly rather than through a `ByteSource`.
    pub fn new(byte_source: B, config: AnalyserConfig) -> Self {
        let mut banks = BankManager::new();
        let default_bank = banks.create_bank("default", PAGE_COUNT, false);
        banks.map_bank(default_bank, 0).expect("freshly created bank id must be valid");

        let mut analyser = Self { byte_source, banks, labels: LabelTable::new(), config, watches: Vec::new(), current_frame: 0 };
        if analyser.config.insert_initial_labels {
            analyser.run_initial_label_hooks();
        }
        analyser
    }

    fn run_initial_label_hooks(&mut self) {
        let mut pending = Vec::new();
        self.byte_source.insert_rom_labels(&mut |addr, name, kind| pending.push((addr, name.to_string(), kind)));
        self.byte_source.insert_system_labels(&mut |addr, name, kind| pending.push((addr, name.to_string(), kind)));
        for (addr, name, kind) in pending {
            self.add_named_label(addr, &name, kind);
        }
    }

    #[must_use]
    pub fn byte_source(&self) -> &B {
        &self.byte_source
    }

    pub fn byte_source_mut(&mut self) -> &mut B {
        &mut self.byte_source
    }

    #[must_use]
    pub fn config(&self) -> &AnalyserConfig {
        &self.config
    }

    /// Reads one byte through the page store, falling back to the byte
    /// source for any slot the page store does not hold real content
    /// for - either because nothing is mapped there or because the
    /// mapped bank is decoration-only (see `Bank::backed`; this is how
    /// the default bank `new` maps covers the whole space for labels,
    /// code and data without ever shadowing the byte source with
    /// zeros). Only a genuinely unmapped slot is diagnosed on stderr
    /// (the original always prints on an unmapped-page read; see
    /// `AnalyserError::PageNotMapped`) - falling through to a
    /// decoration-only bank is the expected common case, not an error.
    #[must_use]
    pub fn read_byte(&self, addr: u16) -> u8 {
        if let Some(byte) = self.banks.read_byte(addr) {
            return byte;
        }
        if self.banks.read_page(addr).is_none() {
            eprintln!("{}", crate::error::AnalyserError::PageNotMapped(addr));
        }
        self.byte_source.read_byte(addr)
    }

    #[must_use]
    pub fn read_word(&self, addr: u16) -> u16 {
        let lo = u16::from(self.read_byte(addr));
        let hi = u16::from(self.read_byte(addr.wrapping_add(1)));
        lo | (hi << 8)
    }

    /// Registers a label with an explicit name (as opposed to
    /// [`Self::ensure_label`]'s synthesised names), uniquified against
    /// the process-wide table if `name` collides.
    pub fn add_label(&mut self, addr: u16, name: &str, kind: LabelKind) -> String {
        let registered = self.labels.register(name);
        let label = LabelInfo::new(addr, registered.clone(), kind);
        let offset = addr & 0x03FF;
        if let Some(page) = self.banks.read_page_mut(addr) {
            page.set_label(offset, label);
        }
        registered
    }

    /// Creates a fresh label at `addr` with a synthesised name if and
    /// only if none exists there yet; returns
    /// the (possibly pre-existing) label's name.
    pub fn ensure_label(&mut self, addr: u16, kind: LabelKind) -> String {
        let offset = addr & 0x03FF;
        if let Some(existing) = self.banks.read_page(addr).and_then(|p| p.label_at(offset)) {
            return existing.name.clone();
        }
        let prefix = match kind {
            LabelKind::Function => "function",
            LabelKind::Code => "label",
            LabelKind::Data => "data",
        };
        self.add_named_label(addr, &format!("{prefix}_{addr:04X}"), kind)
    }

    /// Registers a label at `addr` with an exact (not yet uniquified)
    /// spelling, uniquifying it against the process-wide table if it
    /// collides — the shared path behind `ensure_label`'s synthesised
    /// names and the ROM/system label-seeding hooks run from `new`.
    fn add_named_label(&mut self, addr: u16, name: &str, kind: LabelKind) -> String {
        self.add_label(addr, name, kind)
    }

    fn add_reference(&mut self, target: u16, from: AddressRef) {
        let offset = target & 0x03FF;
        if let Some(page) = self.banks.read_page_mut(target) {
            if let Some(label) = page.labels.get_mut(&offset) {
                label.references.add(from);
            }
        }
    }

    /// Recursive, fixed-point static analysis seeded at `pc` (spec
    /// §4.4). Calls into itself for every discovered call/jump target;
    /// a `CodeInfo` already present and enabled at the current address
    /// halts the recursion (the fixed point).
    pub fn analyse_from_pc(&mut self, seed: u16) {
        let mut pc = seed;
        loop {
            let offset = pc & 0x03FF;
            let already_decoded = self.banks.read_page(pc).and_then(|p| p.code_at(offset)).is_some_and(|c| !c.disabled);
            if already_decoded {
                return;
            }

            let cpu_kind = self.byte_source.cpu_kind();
            let decoded = disassembler::disassemble(cpu_kind, |a| self.read_byte(a), pc, &PlaceholderFormatter);
            let jump = classifier::jump_target(cpu_kind, |a| self.read_byte(a), pc);
            let pointer_indirection = classifier::pointer_indirection_target(cpu_kind, |a| self.read_byte(a), pc);
            let pointer_reference = classifier::pointer_reference_target(cpu_kind, |a| self.read_byte(a), pc);
            let is_stop = classifier::is_stop_instruction(cpu_kind, |a| self.read_byte(a), pc);
            let is_call = classifier::is_call_instruction(cpu_kind, |a| self.read_byte(a), pc);

            let operand_kind = if jump.is_some() {
                OperandKind::JumpAddress
            } else if pointer_reference.is_some() {
                OperandKind::Pointer
            } else {
                OperandKind::Unknown
            };

            let mut info = CodeInfo::new(pc, decoded.text.clone(), decoded.byte_size);
            info.jump_addr = jump.map(|j| j.target);
            info.pointer_addr = pointer_reference;
            info.operand_kind = operand_kind;

            let from = AddressRef::new(self.banks.bank_id_at(pc), pc);
            let span = decoded.byte_size;
            if let Some(page) = self.banks.read_page_mut(pc) {
                page.set_code(offset, info);
                for i in 1..u16::from(span) {
                    let tail_offset = offset.wrapping_add(i);
                    if (tail_offset as usize) < PAGE_SIZE {
                        let tail = page.data_at_mut(tail_offset);
                        tail.data_type = DataType::InstructionOperand;
                        tail.byte_size = 1;
                    }
                }
            }

            if let Some(j) = jump {
                let kind = if is_call { LabelKind::Function } else { LabelKind::Code };
                self.ensure_label(j.target, kind);
                self.add_reference(j.target, from);
            }
            if let Some(target) = pointer_indirection {
                self.ensure_label(target, LabelKind::Data);
                self.add_reference(target, from);
            }

            if is_stop {
                if is_call {
                    if let Some(j) = jump {
                        self.analyse_from_pc(j.target);
                    }
                    pc = decoded.next_pc;
                    continue;
                }
                if let Some(j) = jump {
                    self.analyse_from_pc(j.target);
                }
                return;
            }
            if decoded.next_pc < pc {
                if let Some(j) = jump {
                    self.analyse_from_pc(j.target);
                }
                return;
            }
            pc = decoded.next_pc;
        }
    }

    /// Re-decodes every `CodeInfo` primary in `range` in place and flags
    /// self-modification where a `Data` label now shares the address
    /// Addresses lacking both `CodeInfo` and
    /// `DataInfo` are already covered by the page store's dense default
    /// `Byte` array, so nothing further is needed for that half of the
    /// contract.
    pub fn re_analyse(&mut self, range: Range<u16>) {
        let cpu_kind = self.byte_source.cpu_kind();
        for addr in range {
            let offset = addr & 0x03FF;
            let is_primary = self.banks.read_page(addr).is_some_and(|p| p.is_code_primary(offset));
            if !is_primary {
                continue;
            }
            let decoded = disassembler::disassemble(cpu_kind, |a| self.read_byte(a), addr, &PlaceholderFormatter);
            let co_located_with_data_label =
                self.banks.read_page(addr).and_then(|p| p.label_at(offset)).is_some_and(|l| l.kind == LabelKind::Data);
            if let Some(page) = self.banks.read_page_mut(addr) {
                if let Some(code) = page.code_at_mut(offset) {
                    code.text = decoded.text;
                    code.byte_size = decoded.byte_size;
                    code.self_modifying = co_located_with_data_label;
                }
            }
        }
    }

    /// Runtime hook: the host calls this once per retired instruction.
    /// Lazily extends static analysis from `pc`; the fixed-point check
    /// in [`Self::analyse_from_pc`] makes repeated calls at a known
    /// address cheap.
    pub fn register_code_executed(&mut self, pc: u16) {
        self.analyse_from_pc(pc);
    }

    /// Runtime hook: records a data read, bumping the reference
    /// multiset and the display-decay timestamp.
    pub fn register_data_read(&mut self, pc: u16, addr: u16) {
        let from = AddressRef::new(self.banks.bank_id_at(pc), pc);
        let frame = self.current_frame;
        let offset = addr & 0x03FF;
        if let Some(page) = self.banks.read_page_mut(addr) {
            let data = page.data_at_mut(offset);
            data.reads.add(from);
            data.last_frame_read = frame;
        }
    }

    /// Runtime hook: records a data write, and flags the target
    /// `CodeInfo` (if any) as self-modifying immediately, ahead of the
    /// next [`Self::re_analyse`] pass.
    pub fn register_data_write(&mut self, pc: u16, addr: u16) {
        let from = AddressRef::new(self.banks.bank_id_at(pc), pc);
        let frame = self.current_frame;
        let offset = addr & 0x03FF;
        if let Some(page) = self.banks.read_page_mut(addr) {
            let data = page.data_at_mut(offset);
            data.writes.add(from);
            data.last_frame_written = frame;
            data.last_writer = Some(from);
            if let Some(code) = page.code_at_mut(offset) {
                code.self_modifying = true;
            }
        }
    }

    /// Advances the frame counter used for read/write decay timestamps.
    /// The host calls this once per emulated video frame.
    pub fn advance_frame(&mut self) {
        self.current_frame = self.current_frame.wrapping_add(1);
    }

    #[must_use]
    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    fn iter_labels(&self) -> impl Iterator<Item = &LabelInfo> {
        self.banks.banks().iter().flat_map(|b| b.pages.iter()).flat_map(|p| p.labels.values())
    }

    /// All `Function`-kind labels, for UI filtering (supplemented
    /// feature, not named in the original data model but declared in
    /// the source this was distilled from).
    pub fn global_functions(&self) -> Vec<&LabelInfo> {
        self.iter_labels().filter(|l| l.kind == LabelKind::Function).collect()
    }

    /// All global `Data`-kind labels within the configured address
    /// filter range.
    pub fn global_data_items(&self) -> Vec<&LabelInfo> {
        self.iter_labels()
            .filter(|l| l.kind == LabelKind::Data && l.global)
            .filter(|l| self.config.global_data_min_address.is_none_or(|min| l.addr >= min))
            .filter(|l| self.config.global_data_max_address.is_none_or(|max| l.addr <= max))
            .collect()
    }

    pub fn add_watch(&mut self, addr_ref: AddressRef) {
        if !self.watches.contains(&addr_ref) {
            self.watches.push(addr_ref);
        }
    }

    pub fn remove_watch(&mut self, addr_ref: AddressRef) {
        self.watches.retain(|w| *w != addr_ref);
    }

    #[must_use]
    pub fn watches(&self) -> &[AddressRef] {
        &self.watches
    }

    /// Searches the whole address space for a literal byte sequence,
    /// returning every start address where it occurs (supplemented
    /// feature, `FindMemoryPattern` in the original).
    #[must_use]
    pub fn find_pattern(&self, pattern: &[u8]) -> Vec<u16> {
        let mut matches = Vec::new();
        if pattern.is_empty() || pattern.len() > 0x1_0000 {
            return matches;
        }
        for start in 0..=0xFFFFu32 {
            let start = start as u16;
            let found = pattern.iter().enumerate().all(|(i, &b)| self.read_byte(start.wrapping_add(i as u16)) == b);
            if found {
                matches.push(start);
            }
        }
        matches
    }
}
