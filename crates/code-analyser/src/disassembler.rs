//! Single-instruction decoder and the operand-formatting policy it is
//! parameterised by.

use crate::byte_source::CpuKind;
use crate::page::OperandKind;

/// Emits a numeric operand as text. Implementors choose the radix, or
/// substitute a label name when one covers the address.
pub trait OperandFormatter {
    fn format_operand(&self, value: u16, kind: OperandKind) -> String;
}

/// Token `PlaceholderFormatter` emits in place of a concrete operand;
/// `crate::text` overlays the live label or raw number at render time
/// by substituting this token.
pub const OPERAND_PLACEHOLDER: &str = "#OPERAND_ADDR#";

/// The formatter the analyser itself decodes with: a placeholder token
/// so the renderer can overlay the live label or raw number later,
/// without re-running the decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderFormatter;

impl OperandFormatter for PlaceholderFormatter {
    fn format_operand(&self, _value: u16, _kind: OperandKind) -> String {
        OPERAND_PLACEHOLDER.to_string()
    }
}

/// Plain numeric rendering, for callers that want concrete text (export,
/// tests) rather than the placeholder token.
#[derive(Debug, Clone, Copy)]
pub enum NumberStyle {
    Decimal,
    HexPrefixed,
    HexSuffixed,
    Binary,
}

#[derive(Debug, Clone, Copy)]
pub struct NumericFormatter {
    pub style: NumberStyle,
}

impl OperandFormatter for NumericFormatter {
    fn format_operand(&self, value: u16, _kind: OperandKind) -> String {
        match self.style {
            NumberStyle::Decimal => value.to_string(),
            NumberStyle::HexPrefixed => format!("${value:04X}"),
            NumberStyle::HexSuffixed => format!("{value:04X}h"),
            NumberStyle::Binary => format!("{value:016b}"),
        }
    }
}

/// Substitutes a label name for jump/pointer operands that have one,
/// falling back to prefixed hex otherwise.
pub struct LabelFormatter<'a> {
    pub lookup: &'a dyn Fn(u16) -> Option<String>,
}

impl OperandFormatter for LabelFormatter<'_> {
    fn format_operand(&self, value: u16, kind: OperandKind) -> String {
        if matches!(kind, OperandKind::JumpAddress | OperandKind::Pointer) {
            if let Some(name) = (self.lookup)(value) {
                return name;
            }
        }
        format!("${value:04X}")
    }
}

/// The result of decoding one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    pub byte_size: u8,
    pub next_pc: u16,
}

const R: [&str; 8] = ["b", "c", "d", "e", "h", "l", "(hl)", "a"];
const RP: [&str; 4] = ["bc", "de", "hl", "sp"];
const RP2: [&str; 4] = ["bc", "de", "hl", "af"];
const CC: [&str; 8] = ["nz", "z", "nc", "c", "po", "pe", "p", "m"];
const ALU: [&str; 8] = ["add a,", "adc a,", "sub ", "sbc a,", "and ", "xor ", "or ", "cp "];
const ROT: [&str; 8] = ["rlc", "rrc", "rl", "rr", "sla", "sra", "sll", "srl"];

fn x_y_z(op: u8) -> (u8, u8, u8) {
    (op >> 6, (op >> 3) & 7, op & 7)
}

/// Decodes one Z80 instruction at `pc`. Always returns a byte size of at
/// least 1 even for bytes this decoder does not recognise, matching the
/// classifier's totality contract.
#[must_use]
pub fn disassemble_z80(read: impl Fn(u16) -> u8, pc: u16, formatter: &dyn OperandFormatter) -> Decoded {
    let op = read(pc);
    match op {
        0xCB => decode_cb(&read, pc),
        0xED => decode_ed(&read, pc, formatter),
        0xDD => decode_indexed(&read, pc, "ix", formatter),
        0xFD => decode_indexed(&read, pc, "iy", formatter),
        _ => decode_unprefixed(&read, pc, op, formatter),
    }
}

fn imm16(read: &impl Fn(u16) -> u8, pc: u16) -> u16 {
    u16::from(read(pc)) | (u16::from(read(pc.wrapping_add(1))) << 8)
}

fn decode_unprefixed(read: &impl Fn(u16) -> u8, pc: u16, op: u8, fmt: &dyn OperandFormatter) -> Decoded {
    let (x, y, z) = x_y_z(op);
    let p = y >> 1;
    let q = y & 1;

    // A handful of fixed single-byte opcodes that do not fit the x/y/z
    // table cleanly.
    match op {
        0x00 => return Decoded { text: "nop".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0x76 => return Decoded { text: "halt".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0xF3 => return Decoded { text: "di".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0xFB => return Decoded { text: "ei".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0xC9 => return Decoded { text: "ret".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0xE9 => return Decoded { text: "jp (hl)".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0xF9 => return Decoded { text: "ld sp,hl".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0xE3 => return Decoded { text: "ex (sp),hl".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0xEB => return Decoded { text: "ex de,hl".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0x08 => return Decoded { text: "ex af,af'".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0xD9 => return Decoded { text: "exx".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0x2F => return Decoded { text: "cpl".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0x3F => return Decoded { text: "ccf".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0x37 => return Decoded { text: "scf".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0x27 => return Decoded { text: "daa".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0x07 => return Decoded { text: "rlca".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0x0F => return Decoded { text: "rrca".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0x17 => return Decoded { text: "rla".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0x1F => return Decoded { text: "rra".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        0x10 => {
            let e = read(pc.wrapping_add(1)) as i8;
            let operand = fmt.format_operand(pc.wrapping_add(2).wrapping_add_signed(i16::from(e)), OperandKind::JumpAddress);
            return Decoded { text: format!("djnz {operand}"), byte_size: 2, next_pc: pc.wrapping_add(2) };
        }
        0x18 | 0x20 | 0x28 | 0x30 | 0x38 => {
            let e = read(pc.wrapping_add(1)) as i8;
            let operand = fmt.format_operand(pc.wrapping_add(2).wrapping_add_signed(i16::from(e)), OperandKind::JumpAddress);
            let mnemonic = if op == 0x18 { "jr".to_string() } else { format!("jr {},", CC[((op >> 3) & 3) as usize]) };
            let text = if op == 0x18 { format!("jr {operand}") } else { format!("{mnemonic}{operand}") };
            return Decoded { text, byte_size: 2, next_pc: pc.wrapping_add(2) };
        }
        _ => {}
    }

    match x {
        0 => match z {
            1 if q == 0 => {
                let operand = fmt.format_operand(imm16(read, pc.wrapping_add(1)), OperandKind::Pointer);
                Decoded { text: format!("ld {},{operand}", RP[p as usize]), byte_size: 3, next_pc: pc.wrapping_add(3) }
            }
            1 => Decoded { text: format!("add hl,{}", RP[p as usize]), byte_size: 1, next_pc: pc.wrapping_add(1) },
            2 => decode_indirect_load_store(read, pc, p, q, fmt),
            3 => {
                let text = if q == 0 { format!("inc {}", RP[p as usize]) } else { format!("dec {}", RP[p as usize]) };
                Decoded { text, byte_size: 1, next_pc: pc.wrapping_add(1) }
            }
            4 => Decoded { text: format!("inc {}", R[y as usize]), byte_size: 1, next_pc: pc.wrapping_add(1) },
            5 => Decoded { text: format!("dec {}", R[y as usize]), byte_size: 1, next_pc: pc.wrapping_add(1) },
            6 => {
                let n = read(pc.wrapping_add(1));
                let operand = fmt.format_operand(u16::from(n), OperandKind::Hex);
                Decoded { text: format!("ld {},{operand}", R[y as usize]), byte_size: 2, next_pc: pc.wrapping_add(2) }
            }
            _ => Decoded { text: format!("defb ${op:02X}"), byte_size: 1, next_pc: pc.wrapping_add(1) },
        },
        1 => Decoded { text: format!("ld {},{}", R[y as usize], R[z as usize]), byte_size: 1, next_pc: pc.wrapping_add(1) },
        2 => Decoded { text: format!("{}{}", ALU[y as usize], R[z as usize]), byte_size: 1, next_pc: pc.wrapping_add(1) },
        3 => match z {
            0 => Decoded { text: format!("ret {}", CC[y as usize]), byte_size: 1, next_pc: pc.wrapping_add(1) },
            1 if q == 0 => Decoded { text: format!("pop {}", RP2[p as usize]), byte_size: 1, next_pc: pc.wrapping_add(1) },
            1 => decode_q1_group(pc, p),
            2 => {
                let operand = fmt.format_operand(imm16(read, pc.wrapping_add(1)), OperandKind::JumpAddress);
                Decoded { text: format!("jp {},{operand}", CC[y as usize]), byte_size: 3, next_pc: pc.wrapping_add(3) }
            }
            3 => decode_z3_group(read, pc, y, fmt),
            4 => {
                let operand = fmt.format_operand(imm16(read, pc.wrapping_add(1)), OperandKind::JumpAddress);
                Decoded { text: format!("call {},{operand}", CC[y as usize]), byte_size: 3, next_pc: pc.wrapping_add(3) }
            }
            5 if q == 0 => Decoded { text: format!("push {}", RP2[p as usize]), byte_size: 1, next_pc: pc.wrapping_add(1) },
            5 => {
                let operand = fmt.format_operand(imm16(read, pc.wrapping_add(1)), OperandKind::JumpAddress);
                Decoded { text: format!("call {operand}"), byte_size: 3, next_pc: pc.wrapping_add(3) }
            }
            6 => {
                let n = read(pc.wrapping_add(1));
                let operand = fmt.format_operand(u16::from(n), OperandKind::Hex);
                Decoded { text: format!("{}{operand}", ALU[y as usize]), byte_size: 2, next_pc: pc.wrapping_add(2) }
            }
            7 => Decoded { text: format!("rst ${:02X}", y * 8), byte_size: 1, next_pc: pc.wrapping_add(1) },
            _ => Decoded { text: format!("defb ${op:02X}"), byte_size: 1, next_pc: pc.wrapping_add(1) },
        },
        _ => Decoded { text: format!("defb ${op:02X}"), byte_size: 1, next_pc: pc.wrapping_add(1) },
    }
}

fn decode_indirect_load_store(read: &impl Fn(u16) -> u8, pc: u16, p: u8, q: u8, fmt: &dyn OperandFormatter) -> Decoded {
    match (p, q) {
        (0, 0) => Decoded { text: "ld (bc),a".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        (0, 1) => Decoded { text: "ld a,(bc)".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        (1, 0) => Decoded { text: "ld (de),a".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        (1, 1) => Decoded { text: "ld a,(de)".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        (2, 0) => {
            let operand = fmt.format_operand(imm16(read, pc.wrapping_add(1)), OperandKind::Pointer);
            Decoded { text: format!("ld ({operand}),hl"), byte_size: 3, next_pc: pc.wrapping_add(3) }
        }
        (2, 1) => {
            let operand = fmt.format_operand(imm16(read, pc.wrapping_add(1)), OperandKind::Pointer);
            Decoded { text: format!("ld hl,({operand})"), byte_size: 3, next_pc: pc.wrapping_add(3) }
        }
        (3, 0) => {
            let operand = fmt.format_operand(imm16(read, pc.wrapping_add(1)), OperandKind::Pointer);
            Decoded { text: format!("ld ({operand}),a"), byte_size: 3, next_pc: pc.wrapping_add(3) }
        }
        _ => {
            let operand = fmt.format_operand(imm16(read, pc.wrapping_add(1)), OperandKind::Pointer);
            Decoded { text: format!("ld a,({operand})"), byte_size: 3, next_pc: pc.wrapping_add(3) }
        }
    }
}

fn decode_q1_group(pc: u16, p: u8) -> Decoded {
    match p {
        0 => Decoded { text: "ret".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        1 => Decoded { text: "exx".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        2 => Decoded { text: "jp (hl)".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        _ => {
            Decoded { text: "ld sp,hl".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) }
        }
    }
}

fn decode_z3_group(read: &impl Fn(u16) -> u8, pc: u16, y: u8, fmt: &dyn OperandFormatter) -> Decoded {
    match y {
        0 => {
            let operand = fmt.format_operand(imm16(read, pc.wrapping_add(1)), OperandKind::JumpAddress);
            Decoded { text: format!("jp {operand}"), byte_size: 3, next_pc: pc.wrapping_add(3) }
        }
        1 => decode_cb(read, pc.wrapping_add(1)), // CB handled by the dispatcher; unreachable in practice
        2 => {
            let port = read(pc.wrapping_add(1));
            Decoded { text: format!("out (${port:02X}),a"), byte_size: 2, next_pc: pc.wrapping_add(2) }
        }
        3 => {
            let port = read(pc.wrapping_add(1));
            Decoded { text: format!("in a,(${port:02X})"), byte_size: 2, next_pc: pc.wrapping_add(2) }
        }
        4 => Decoded { text: "ex (sp),hl".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        5 => Decoded { text: "ex de,hl".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        6 => Decoded { text: "di".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
        _ => Decoded { text: "ei".to_string(), byte_size: 1, next_pc: pc.wrapping_add(1) },
    }
}

fn decode_cb(read: &impl Fn(u16) -> u8, pc: u16) -> Decoded {
    let op = read(pc.wrapping_add(1));
    let (x, y, z) = x_y_z(op);
    let text = match x {
        0 => format!("{} {}", ROT[y as usize], R[z as usize]),
        1 => format!("bit {},{}", y, R[z as usize]),
        2 => format!("res {},{}", y, R[z as usize]),
        _ => format!("set {},{}", y, R[z as usize]),
    };
    Decoded { text, byte_size: 2, next_pc: pc.wrapping_add(2) }
}

fn decode_ed(read: &impl Fn(u16) -> u8, pc: u16, fmt: &dyn OperandFormatter) -> Decoded {
    let op = read(pc.wrapping_add(1));
    match op {
        0x47 => Decoded { text: "ld i,a".to_string(), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0x4F => Decoded { text: "ld r,a".to_string(), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0x57 => Decoded { text: "ld a,i".to_string(), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0x5F => Decoded { text: "ld a,r".to_string(), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0x45 | 0x55 | 0x65 | 0x75 => Decoded { text: "retn".to_string(), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0x4D | 0x5D | 0x6D | 0x7D => Decoded { text: "reti".to_string(), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0x44 | 0x54 | 0x64 | 0x74 | 0x4C | 0x5C | 0x6C | 0x7C => Decoded { text: "neg".to_string(), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0xA0 => Decoded { text: "ldi".to_string(), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0xB0 => Decoded { text: "ldir".to_string(), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0xA8 => Decoded { text: "ldd".to_string(), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0xB8 => Decoded { text: "lddr".to_string(), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0xA1 => Decoded { text: "cpi".to_string(), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0xB1 => Decoded { text: "cpir".to_string(), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0x43 | 0x53 | 0x63 | 0x73 => {
            let rp = ["bc", "de", "hl", "sp"][((op >> 4) & 3) as usize];
            let operand = fmt.format_operand(imm16(read, pc.wrapping_add(2)), OperandKind::Pointer);
            Decoded { text: format!("ld ({operand}),{rp}"), byte_size: 4, next_pc: pc.wrapping_add(4) }
        }
        0x4B | 0x5B | 0x6B | 0x7B => {
            let rp = ["bc", "de", "hl", "sp"][((op >> 4) & 3) as usize];
            let operand = fmt.format_operand(imm16(read, pc.wrapping_add(2)), OperandKind::Pointer);
            Decoded { text: format!("ld {rp},({operand})"), byte_size: 4, next_pc: pc.wrapping_add(4) }
        }
        _ => Decoded { text: format!("defb $ED,${op:02X}"), byte_size: 2, next_pc: pc.wrapping_add(2) },
    }
}

fn decode_indexed(read: &impl Fn(u16) -> u8, pc: u16, reg: &str, fmt: &dyn OperandFormatter) -> Decoded {
    let op = read(pc.wrapping_add(1));
    match op {
        0x21 => {
            let operand = fmt.format_operand(imm16(read, pc.wrapping_add(2)), OperandKind::Pointer);
            Decoded { text: format!("ld {reg},{operand}"), byte_size: 4, next_pc: pc.wrapping_add(4) }
        }
        0x22 => {
            let operand = fmt.format_operand(imm16(read, pc.wrapping_add(2)), OperandKind::Pointer);
            Decoded { text: format!("ld ({operand}),{reg}"), byte_size: 4, next_pc: pc.wrapping_add(4) }
        }
        0x2A => {
            let operand = fmt.format_operand(imm16(read, pc.wrapping_add(2)), OperandKind::Pointer);
            Decoded { text: format!("ld {reg},({operand})"), byte_size: 4, next_pc: pc.wrapping_add(4) }
        }
        0xE9 => Decoded { text: format!("jp ({reg})"), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0xE1 => Decoded { text: format!("pop {reg}"), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0xE5 => Decoded { text: format!("push {reg}"), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0xF9 => Decoded { text: format!("ld sp,{reg}"), byte_size: 2, next_pc: pc.wrapping_add(2) },
        0xCB => {
            // DD/FD CB d op: a displacement byte sits between the
            // prefixes and the CB opcode, so the instruction is 4 bytes.
            let op2 = read(pc.wrapping_add(3));
            let (x, y, _z) = x_y_z(op2);
            let d = read(pc.wrapping_add(2)) as i8;
            let text = match x {
                0 => format!("{} ({reg}{d:+})", ROT[y as usize]),
                1 => format!("bit {y},({reg}{d:+})"),
                2 => format!("res {y},({reg}{d:+})"),
                _ => format!("set {y},({reg}{d:+})"),
            };
            Decoded { text, byte_size: 4, next_pc: pc.wrapping_add(4) }
        }
        0x34 | 0x35 | 0x36 => {
            let d = read(pc.wrapping_add(2)) as i8;
            let mnemonic = match op {
                0x34 => "inc",
                0x35 => "dec",
                _ => "ld",
            };
            if op == 0x36 {
                let n = read(pc.wrapping_add(3));
                let operand = fmt.format_operand(u16::from(n), OperandKind::Hex);
                Decoded { text: format!("ld ({reg}{d:+}),{operand}"), byte_size: 4, next_pc: pc.wrapping_add(4) }
            } else {
                Decoded { text: format!("{mnemonic} ({reg}{d:+})"), byte_size: 3, next_pc: pc.wrapping_add(3) }
            }
        }
        0x46 | 0x4E | 0x56 | 0x5E | 0x66 | 0x6E | 0x7E => {
            let d = read(pc.wrapping_add(2)) as i8;
            let y = (op >> 3) & 7;
            Decoded { text: format!("ld {},({reg}{d:+})", R[y as usize]), byte_size: 3, next_pc: pc.wrapping_add(3) }
        }
        0x70..=0x77 if op != 0x76 => {
            let d = read(pc.wrapping_add(2)) as i8;
            let z = op & 7;
            Decoded { text: format!("ld ({reg}{d:+}),{}", R[z as usize]), byte_size: 3, next_pc: pc.wrapping_add(3) }
        }
        0x86 | 0x8E | 0x96 | 0x9E | 0xA6 | 0xAE | 0xB6 | 0xBE => {
            let d = read(pc.wrapping_add(2)) as i8;
            let y = (op >> 3) & 7;
            Decoded { text: format!("{}({reg}{d:+})", ALU[y as usize]), byte_size: 3, next_pc: pc.wrapping_add(3) }
        }
        0x09 | 0x19 | 0x29 | 0x39 => Decoded { text: format!("add {reg},{}", ["bc", "de", reg, "sp"][((op >> 4) & 3) as usize]), byte_size: 2, next_pc: pc.wrapping_add(2) },
        _ => Decoded { text: format!("defb ${:02X},${op:02X}", if reg == "ix" { 0xDDu8 } else { 0xFDu8 }), byte_size: 2, next_pc: pc.wrapping_add(2) },
    }
}

const M6502_LENGTHS: [u8; 256] = [
    1, 2, 1, 1, 2, 2, 2, 1, 1, 2, 1, 1, 3, 3, 3, 1, // 0x0_
    2, 2, 1, 1, 2, 2, 2, 1, 1, 3, 1, 1, 3, 3, 3, 1, // 0x1_
    3, 2, 1, 1, 2, 2, 2, 1, 1, 2, 1, 1, 3, 3, 3, 1, // 0x2_
    2, 2, 1, 1, 2, 2, 2, 1, 1, 3, 1, 1, 3, 3, 3, 1, // 0x3_
    1, 2, 1, 1, 2, 2, 2, 1, 1, 2, 1, 1, 3, 3, 3, 1, // 0x4_
    2, 2, 1, 1, 2, 2, 2, 1, 1, 3, 1, 1, 3, 3, 3, 1, // 0x5_
    1, 2, 1, 1, 2, 2, 2, 1, 1, 2, 1, 1, 3, 3, 3, 1, // 0x6_
    2, 2, 1, 1, 2, 2, 2, 1, 1, 3, 1, 1, 3, 3, 3, 1, // 0x7_
    2, 2, 2, 2, 2, 2, 2, 1, 1, 2, 1, 1, 3, 3, 3, 1, // 0x8_
    2, 2, 1, 1, 2, 2, 2, 1, 1, 3, 1, 1, 3, 3, 3, 1, // 0x9_
    2, 2, 2, 2, 2, 2, 2, 1, 1, 2, 1, 1, 3, 3, 3, 1, // 0xA_
    2, 2, 1, 1, 2, 2, 2, 1, 1, 3, 1, 1, 3, 3, 3, 1, // 0xB_
    2, 2, 2, 2, 2, 2, 2, 1, 1, 2, 1, 1, 3, 3, 3, 1, // 0xC_
    2, 2, 1, 1, 2, 2, 2, 1, 1, 3, 1, 1, 3, 3, 3, 1, // 0xD_
    2, 2, 2, 2, 2, 2, 2, 1, 1, 2, 1, 1, 3, 3, 3, 1, // 0xE_
    2, 2, 1, 1, 2, 2, 2, 1, 1, 3, 1, 1, 3, 3, 3, 1, // 0xF_
];

/// Best-effort mnemonic for the handful of 6502 opcodes worth naming
/// explicitly; everything else falls back to `???` since this
/// repository only wires 6502 opcodes for byte-length disassembly, not
/// full classification.
fn m6502_mnemonic(op: u8) -> &'static str {
    match op {
        0x00 => "brk",
        0xEA => "nop",
        0x4C | 0x6C => "jmp",
        0x20 => "jsr",
        0x60 => "rts",
        0x40 => "rti",
        0xA9 | 0xA5 | 0xAD => "lda",
        0x85 | 0x8D => "sta",
        0xA2 => "ldx",
        0xA0 => "ldy",
        0xE8 => "inx",
        0xC8 => "iny",
        0xCA => "dex",
        0x88 => "dey",
        0xF0 => "beq",
        0xD0 => "bne",
        0x10 => "bpl",
        0x30 => "bmi",
        0x90 => "bcc",
        0xB0 => "bcs",
        0x50 => "bvc",
        0x70 => "bvs",
        _ => "???",
    }
}

/// Decodes one 6502 instruction, returning correct byte length from the
/// fixed addressing-mode table above and a best-effort mnemonic (`???`
/// for opcodes not worth naming explicitly, since this repository only
/// wires 6502 opcodes for disassembly, not full classification).
#[must_use]
pub fn disassemble_m6502(read: impl Fn(u16) -> u8, pc: u16, fmt: &dyn OperandFormatter) -> Decoded {
    let op = read(pc);
    let size = M6502_LENGTHS[op as usize];
    let mnemonic = m6502_mnemonic(op);
    let text = match size {
        1 => mnemonic.to_string(),
        2 => {
            let operand_byte = read(pc.wrapping_add(1));
            let kind = if matches!(op, 0xF0 | 0xD0 | 0x10 | 0x30 | 0x90 | 0xB0 | 0x50 | 0x70) { OperandKind::JumpAddress } else { OperandKind::Hex };
            let target = if kind == OperandKind::JumpAddress {
                pc.wrapping_add(2).wrapping_add_signed(i16::from(operand_byte as i8))
            } else {
                u16::from(operand_byte)
            };
            format!("{mnemonic} {}", fmt.format_operand(target, kind))
        }
        _ => {
            let kind = if matches!(op, 0x4C | 0x20) { OperandKind::JumpAddress } else { OperandKind::Hex };
            format!("{mnemonic} {}", fmt.format_operand(imm16(&read, pc.wrapping_add(1)), kind))
        }
    };
    Decoded { text, byte_size: size, next_pc: pc.wrapping_add(u16::from(size)) }
}

/// Dispatches to the Z80 or 6502 decoder per the byte source's
/// [`CpuKind`].
#[must_use]
pub fn disassemble(kind: CpuKind, read: impl Fn(u16) -> u8, pc: u16, fmt: &dyn OperandFormatter) -> Decoded {
    match kind {
        CpuKind::Z80 => disassemble_z80(read, pc, fmt),
        CpuKind::M6502 => disassemble_m6502(read, pc, fmt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(mem: &'static [u8]) -> impl Fn(u16) -> u8 {
        move |addr| mem.get(addr as usize).copied().unwrap_or(0)
    }

    #[test]
    fn call_nn_decodes_to_three_bytes() {
        let decoded = disassemble_z80(flat(&[0xCD, 0x34, 0x12]), 0, &PlaceholderFormatter);
        assert_eq!(decoded.byte_size, 3);
        assert_eq!(decoded.next_pc, 3);
        assert!(decoded.text.starts_with("call"));
    }

    #[test]
    fn ld_hl_nn_then_ld_indirect_nn_hl_then_ret() {
        let mem: &'static [u8] = &[0x21, 0x00, 0x50, 0x22, 0x10, 0x50, 0xC9];
        let first = disassemble_z80(flat(mem), 0, &PlaceholderFormatter);
        assert_eq!(first.byte_size, 3);
        let second = disassemble_z80(flat(mem), 3, &PlaceholderFormatter);
        assert_eq!(second.byte_size, 3);
        let third = disassemble_z80(flat(mem), 6, &PlaceholderFormatter);
        assert_eq!(third.byte_size, 1);
        assert_eq!(third.text, "ret");
    }

    #[test]
    fn cb_bit_instruction_is_two_bytes() {
        let decoded = disassemble_z80(flat(&[0xCB, 0x7E]), 0, &PlaceholderFormatter);
        assert_eq!(decoded.byte_size, 2);
        assert_eq!(decoded.text, "bit 7,(hl)");
    }

    #[test]
    fn dd_cb_displacement_instruction_is_four_bytes() {
        let decoded = disassemble_z80(flat(&[0xDD, 0xCB, 0x02, 0x46]), 0, &PlaceholderFormatter);
        assert_eq!(decoded.byte_size, 4);
    }

    #[test]
    fn lengths_never_overlap_across_a_sequential_scan() {
        let mem: &'static [u8] = &[0x3E, 0x05, 0x06, 0x10, 0x0E, 0x20, 0x76];
        let mut pc = 0u16;
        let mut count = 0;
        while (pc as usize) < mem.len() && count < 10 {
            let decoded = disassemble_z80(flat(mem), pc, &PlaceholderFormatter);
            assert!(decoded.byte_size >= 1);
            pc = decoded.next_pc;
            count += 1;
        }
        assert_eq!(pc as usize, mem.len());
    }

    #[test]
    fn m6502_jmp_absolute_is_three_bytes() {
        let decoded = disassemble_m6502(flat(&[0x4C, 0x00, 0x80]), 0, &PlaceholderFormatter);
        assert_eq!(decoded.byte_size, 3);
        assert!(decoded.text.starts_with("jmp"));
    }
}
