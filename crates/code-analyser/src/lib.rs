//! Interactive static analyser and disassembler for 64 KiB Z80/6502
//! address spaces.
//!
//! Maintains, across an address space that may be partially ROM,
//! partially RAM, partially bank-switched, a classification of every
//! byte as code, data, label target, or comment; recursively
//! disassembles from known entry points; and records the graph of
//! cross-references produced by executed or statically traced
//! instructions. The host emulator CPU, GUI/viewer code, per-platform
//! wiring, and character-set rendering are external collaborators
//! reached only through [`ByteSource`].

mod analyser;
mod bank;
mod byte_source;
mod classifier;
mod command;
mod config;
mod disassembler;
mod error;
mod labels;
mod page;
mod persist;
mod text;
#[cfg(test)]
mod tests_support;
mod xref;

pub use analyser::CodeAnalyser;
pub use bank::{Bank, BankManager, BankPageRef};
pub use byte_source::{ByteSource, CpuKind};
pub use classifier::{
    is_call_instruction, is_call_instruction_z80, is_stop_instruction, is_stop_instruction_z80, jump_target,
    jump_target_z80, pointer_indirection_target, pointer_indirection_target_z80, pointer_reference_target,
    pointer_reference_target_z80, JumpInfo,
};
pub use command::{Command, CommandStack};
pub use config::AnalyserConfig;
pub use disassembler::{
    disassemble, disassemble_m6502, disassemble_z80, Decoded, LabelFormatter, NumberStyle, NumericFormatter,
    OperandFormatter, PlaceholderFormatter, OPERAND_PLACEHOLDER,
};
pub use error::{AnalyserError, Result};
pub use labels::LabelTable;
pub use page::{
    AddressRef, CodeInfo, CommentBlock, DataInfo, DataType, LabelInfo, LabelKind, MachineState, OperandKind, Page,
    PAGE_COUNT, PAGE_SIZE,
};
pub use persist::{export_json, import_json, read_page, write_page};
pub use text::{export_text, generate_address_label_string, Item, ItemList};
pub use xref::ReferenceSet;
