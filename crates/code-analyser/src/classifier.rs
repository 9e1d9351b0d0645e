//! Instruction classifier.
//!
//! Pure functions over a byte-reading closure: given the byte(s) at
//! `pc`, decide whether the instruction there is a pointer reference, a
//! pointer indirection, a jump/call, or a control-flow terminator, and
//! extract whatever target address is implied. Every function is total:
//! an opcode that does not match falls through to "no" / `None`.

use crate::byte_source::CpuKind;

/// A jump or call target discovered by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpInfo {
    pub target: u16,
    pub is_call: bool,
}

fn word(read: &impl Fn(u16) -> u8, addr: u16) -> u16 {
    let lo = u16::from(read(addr));
    let hi = u16::from(read(addr.wrapping_add(1)));
    lo | (hi << 8)
}

const POINTER_INDIRECTION_PRIMARY: [u8; 4] = [0x22, 0x32, 0x2A, 0x3A];
const POINTER_INDIRECTION_ED: [u8; 8] = [0x43, 0x4B, 0x53, 0x5B, 0x63, 0x6B, 0x73, 0x7B];
const POINTER_INDIRECTION_INDEXED: [u8; 2] = [0x22, 0x2A];

const POINTER_LOAD_PRIMARY: [u8; 3] = [0x01, 0x11, 0x21];
const POINTER_LOAD_INDEXED: u8 = 0x21;

const JP_UNCONDITIONAL: u8 = 0xC3;
const CALL_UNCONDITIONAL: u8 = 0xCD;
const JP_CONDITIONAL: [u8; 8] = [0xC2, 0xCA, 0xD2, 0xDA, 0xE2, 0xEA, 0xF2, 0xFA];
const CALL_CONDITIONAL: [u8; 8] = [0xC4, 0xCC, 0xD4, 0xDC, 0xE4, 0xEC, 0xF4, 0xFC];
const JR_UNCONDITIONAL: u8 = 0x18;
const JR_RELATIVE: [u8; 6] = [0x18, 0x10, 0x20, 0x28, 0x30, 0x38];
const RST: [u8; 8] = [0xC7, 0xCF, 0xD7, 0xDF, 0xE7, 0xEF, 0xF7, 0xFF];

const RET_UNCONDITIONAL: u8 = 0xC9;
const RET_CONDITIONAL: [u8; 8] = [0xC0, 0xC8, 0xD0, 0xD8, 0xE0, 0xE8, 0xF0, 0xF8];
const ED_RETURN: [u8; 8] = [0x45, 0x55, 0x65, 0x75, 0x4D, 0x5D, 0x6D, 0x7D];
const JP_HL: u8 = 0xE9;

/// Pointer-indirection target for the Z80 family, or `None`
/// if the opcode at `pc` is not one.
#[must_use]
pub fn pointer_indirection_target_z80(read: impl Fn(u16) -> u8, pc: u16) -> Option<u16> {
    let op = read(pc);
    if POINTER_INDIRECTION_PRIMARY.contains(&op) {
        return Some(word(&read, pc.wrapping_add(1)));
    }
    if op == 0xED {
        let next = read(pc.wrapping_add(1));
        if POINTER_INDIRECTION_ED.contains(&next) {
            return Some(word(&read, pc.wrapping_add(2)));
        }
    }
    if op == 0xDD || op == 0xFD {
        let next = read(pc.wrapping_add(1));
        if POINTER_INDIRECTION_INDEXED.contains(&next) {
            return Some(word(&read, pc.wrapping_add(2)));
        }
    }
    None
}

/// Pointer-reference target: every pointer-indirection instruction plus
/// immediate 16-bit register-pair loads.
#[must_use]
pub fn pointer_reference_target_z80(read: impl Fn(u16) -> u8, pc: u16) -> Option<u16> {
    if let Some(target) = pointer_indirection_target_z80(&read, pc) {
        return Some(target);
    }
    let op = read(pc);
    if POINTER_LOAD_PRIMARY.contains(&op) {
        return Some(word(&read, pc.wrapping_add(1)));
    }
    if op == 0xDD || op == 0xFD {
        let next = read(pc.wrapping_add(1));
        if next == POINTER_LOAD_INDEXED {
            return Some(word(&read, pc.wrapping_add(2)));
        }
    }
    None
}

/// Jump/call target, with `is_call` set for `CALL`/`RST`.
#[must_use]
pub fn jump_target_z80(read: impl Fn(u16) -> u8, pc: u16) -> Option<JumpInfo> {
    let op = read(pc);

    if op == JP_UNCONDITIONAL || JP_CONDITIONAL.contains(&op) {
        return Some(JumpInfo { target: word(&read, pc.wrapping_add(1)), is_call: false });
    }
    if op == CALL_UNCONDITIONAL || CALL_CONDITIONAL.contains(&op) {
        return Some(JumpInfo { target: word(&read, pc.wrapping_add(1)), is_call: true });
    }
    if JR_RELATIVE.contains(&op) {
        let offset = read(pc.wrapping_add(1)) as i8;
        let target = pc.wrapping_add(2).wrapping_add_signed(i16::from(offset));
        return Some(JumpInfo { target, is_call: false });
    }
    if let Some(index) = RST.iter().position(|&rst| rst == op) {
        let target = (index as u16) * 8;
        return Some(JumpInfo { target, is_call: true });
    }
    None
}

/// Whether the instruction at `pc` unconditionally redirects control, so
/// linear static tracing must terminate here. Note that `CALL`/`RST`
/// *are* classified as stop instructions by this function even though
/// the analyser recurses into their target and then keeps tracing past
/// them (see `analyser::CodeAnalyser::analyse_from_pc`); this function
/// reports the Z80 ISA fact (control never falls through a `CALL`
/// opcode on the page it decoded from) not the analyser's traversal
/// choice.
#[must_use]
pub fn is_stop_instruction_z80(read: impl Fn(u16) -> u8, pc: u16) -> bool {
    let op = read(pc);

    if op == CALL_UNCONDITIONAL || CALL_CONDITIONAL.contains(&op) || RST.contains(&op) {
        return true;
    }
    if op == RET_UNCONDITIONAL || RET_CONDITIONAL.contains(&op) {
        return true;
    }
    if op == JP_UNCONDITIONAL || op == JR_UNCONDITIONAL {
        return true;
    }
    if op == JP_HL {
        return true;
    }
    if op == 0xED {
        let next = read(pc.wrapping_add(1));
        return ED_RETURN.contains(&next);
    }
    if op == 0xDD || op == 0xFD {
        let next = read(pc.wrapping_add(1));
        return next == JP_HL;
    }
    false
}

/// Whether the instruction at `pc` is a call (`CALL`/`RST`): the
/// analyser recurses into its target and keeps tracing past it, unlike
/// other stop instructions.
#[must_use]
pub fn is_call_instruction_z80(read: impl Fn(u16) -> u8, pc: u16) -> bool {
    let op = read(pc);
    op == CALL_UNCONDITIONAL || CALL_CONDITIONAL.contains(&op) || RST.contains(&op)
}

/// Dispatches to the Z80 classifier, or returns the 6502 stub (`None`/
/// `false`): this repository only wires Z80 opcodes for classification.
#[must_use]
pub fn pointer_indirection_target(kind: CpuKind, read: impl Fn(u16) -> u8, pc: u16) -> Option<u16> {
    match kind {
        CpuKind::Z80 => pointer_indirection_target_z80(read, pc),
        CpuKind::M6502 => None,
    }
}

#[must_use]
pub fn pointer_reference_target(kind: CpuKind, read: impl Fn(u16) -> u8, pc: u16) -> Option<u16> {
    match kind {
        CpuKind::Z80 => pointer_reference_target_z80(read, pc),
        CpuKind::M6502 => None,
    }
}

#[must_use]
pub fn jump_target(kind: CpuKind, read: impl Fn(u16) -> u8, pc: u16) -> Option<JumpInfo> {
    match kind {
        CpuKind::Z80 => jump_target_z80(read, pc),
        CpuKind::M6502 => None,
    }
}

#[must_use]
pub fn is_stop_instruction(kind: CpuKind, read: impl Fn(u16) -> u8, pc: u16) -> bool {
    match kind {
        CpuKind::Z80 => is_stop_instruction_z80(read, pc),
        CpuKind::M6502 => false,
    }
}

#[must_use]
pub fn is_call_instruction(kind: CpuKind, read: impl Fn(u16) -> u8, pc: u16) -> bool {
    match kind {
        CpuKind::Z80 => is_call_instruction_z80(read, pc),
        CpuKind::M6502 => false,
    }
}
