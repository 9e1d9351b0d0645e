//! Minimal [`ByteSource`] impls shared by unit and integration tests.
#![cfg(test)]

use std::cell::RefCell;

use crate::byte_source::{ByteSource, CpuKind};

/// A flat 64 KiB Z80 address space backed by a plain byte array,
/// read/write and otherwise inert (no breakpoints, no run control).
pub struct FlatZ80 {
    memory: RefCell<[u8; 0x1_0000]>,
}

impl FlatZ80 {
    #[must_use]
    pub fn new(contents: &[(u16, &[u8])]) -> Self {
        let mut memory = [0u8; 0x1_0000];
        for (base, bytes) in contents {
            for (i, &b) in bytes.iter().enumerate() {
                memory[usize::from(*base) + i] = b;
            }
        }
        Self { memory: RefCell::new(memory) }
    }
}

impl Default for FlatZ80 {
    fn default() -> Self {
        Self { memory: RefCell::new([0u8; 0x1_0000]) }
    }
}

impl ByteSource for FlatZ80 {
    fn read_byte(&self, addr: u16) -> u8 {
        self.memory.borrow()[addr as usize]
    }

    fn write_byte(&mut self, addr: u16, value: u8) {
        self.memory.borrow_mut()[addr as usize] = value;
    }

    fn current_pc(&self) -> u16 {
        0
    }

    fn current_sp(&self) -> u16 {
        0
    }

    fn cpu_kind(&self) -> CpuKind {
        CpuKind::Z80
    }

    fn is_breakpointed(&self, _addr: u16) -> bool {
        false
    }

    fn toggle_exec_breakpoint(&mut self, _addr: u16) {}
    fn toggle_data_breakpoint(&mut self, _addr: u16, _size: u16) {}
    fn do_break(&mut self) {}
    fn continue_(&mut self) {}
    fn step_over(&mut self) {}
    fn step_into(&mut self) {}
    fn step_frame(&mut self) {}
    fn step_screen_write(&mut self) {}

    fn should_exec_this_frame(&self) -> bool {
        true
    }

    fn is_stopped(&self) -> bool {
        false
    }
}

/// A Z80 byte source that reads all zero everywhere (`00` decodes as
/// `nop`), for tests that just need a well-defined, inert instruction
/// stream.
pub type ZeroSource = FlatZ80;

/// A byte source that also records rom/system label insertion, for
/// exercising `CodeAnalyser::new`'s init hooks.
#[derive(Default)]
pub struct LabelSeedingSource {
    inner: FlatZ80,
    pub rom_labels: Vec<(u16, String, crate::page::LabelKind)>,
}

impl LabelSeedingSource {
    #[must_use]
    pub fn new(rom_labels: Vec<(u16, String, crate::page::LabelKind)>) -> Self {
        Self { inner: FlatZ80::default(), rom_labels }
    }
}

impl ByteSource for LabelSeedingSource {
    fn read_byte(&self, addr: u16) -> u8 {
        self.inner.read_byte(addr)
    }

    fn write_byte(&mut self, addr: u16, value: u8) {
        self.inner.write_byte(addr, value);
    }

    fn current_pc(&self) -> u16 {
        0
    }

    fn current_sp(&self) -> u16 {
        0
    }

    fn cpu_kind(&self) -> CpuKind {
        CpuKind::Z80
    }

    fn is_breakpointed(&self, _addr: u16) -> bool {
        false
    }

    fn toggle_exec_breakpoint(&mut self, _addr: u16) {}
    fn toggle_data_breakpoint(&mut self, _addr: u16, _size: u16) {}
    fn do_break(&mut self) {}
    fn continue_(&mut self) {}
    fn step_over(&mut self) {}
    fn step_into(&mut self) {}
    fn step_frame(&mut self) {}
    fn step_screen_write(&mut self) {}

    fn should_exec_this_frame(&self) -> bool {
        true
    }

    fn is_stopped(&self) -> bool {
        false
    }

    fn insert_rom_labels(&self, register: &mut dyn FnMut(u16, &str, crate::page::LabelKind)) {
        for (addr, name, kind) in &self.rom_labels {
            register(*addr, name, *kind);
        }
    }
}
