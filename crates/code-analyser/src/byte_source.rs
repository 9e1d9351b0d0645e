//! The narrow interface the host emulator provides to the analyser.
//!
//! The analyser never owns CPU state; it borrows a [`ByteSource`] for
//! reads and the rare write, and asks it which instruction set is live so
//! the classifier/disassembler can pick the right decode table.

use crate::page::LabelKind;

/// Which instruction set a [`ByteSource`] decodes as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuKind {
    Z80,
    M6502,
}

/// Capability set consumed from the host emulator.
///
/// All analyser reads go through the page store first (see
/// [`crate::analyser::CodeAnalyser::read_byte`]); this trait is the
/// fallback for addresses no bank currently backs, and the only path for
/// the few things the page store can never own (the live program
/// counter, breakpoints, run control).
pub trait ByteSource {
    /// Reads one byte. A failing host read is treated as returning zero
    /// rather than propagating an error.
    fn read_byte(&self, addr: u16) -> u8;

    /// Reads a little-endian 16-bit word at `addr`/`addr+1`.
    fn read_word(&self, addr: u16) -> u16 {
        let lo = u16::from(self.read_byte(addr));
        let hi = u16::from(self.read_byte(addr.wrapping_add(1)));
        lo | (hi << 8)
    }

    /// Writes one byte back to host memory.
    fn write_byte(&mut self, addr: u16, value: u8);

    /// The live program counter.
    fn current_pc(&self) -> u16;

    /// The stack pointer, for breakpoint/run-control bookkeeping.
    fn current_sp(&self) -> u16;

    fn cpu_kind(&self) -> CpuKind;

    fn is_breakpointed(&self, addr: u16) -> bool;
    fn toggle_exec_breakpoint(&mut self, addr: u16);
    fn toggle_data_breakpoint(&mut self, addr: u16, size: u16);

    fn do_break(&mut self);
    fn continue_(&mut self);
    fn step_over(&mut self);
    fn step_into(&mut self);
    fn step_frame(&mut self);
    fn step_screen_write(&mut self);

    fn should_exec_this_frame(&self) -> bool;
    fn is_stopped(&self) -> bool;

    /// Called once at analyser init to seed ROM entry-point/vector
    /// labels, via `register(addr, name, kind)`. Most hosts have
    /// nothing to add here; the default does nothing.
    fn insert_rom_labels(&self, register: &mut dyn FnMut(u16, &str, LabelKind)) {
        let _ = register;
    }

    /// Called once at analyser init to seed OS/firmware entry-point
    /// labels (e.g. ROM call vectors). Default does nothing.
    fn insert_system_labels(&self, register: &mut dyn FnMut(u16, &str, LabelKind)) {
        let _ = register;
    }
}
