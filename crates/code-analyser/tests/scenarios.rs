//! End-to-end scenarios for the static analyser (S1-S6): a flat
//! 64 KiB Z80 address space, all zeros except the bytes a scenario
//! states, run through `analyse_from_pc` and inspected for the exact
//! labels/code/xrefs each scenario expects.

use code_analyser::{
    AnalyserConfig, Command, CommandStack, CodeAnalyser, CpuKind, DataType, LabelKind, ByteSource,
};
use std::cell::RefCell;

/// A flat 64 KiB Z80 address space backed by a plain byte array, with no
/// breakpoints or run control - everything this test file needs from the
/// host emulator is bytes in, bytes out.
struct FlatZ80 {
    memory: RefCell<[u8; 0x1_0000]>,
}

impl FlatZ80 {
    fn new(contents: &[(u16, &[u8])]) -> Self {
        let mut memory = [0u8; 0x1_0000];
        for (base, bytes) in contents {
            for (i, &b) in bytes.iter().enumerate() {
                memory[usize::from(*base) + i] = b;
            }
        }
        Self { memory: RefCell::new(memory) }
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

fn analyser(contents: &[(u16, &[u8])]) -> CodeAnalyser<FlatZ80> {
    CodeAnalyser::new(FlatZ80::new(contents), AnalyserConfig { insert_initial_labels: false, ..AnalyserConfig::default() })
}

/// S1: `CALL 0x1234` at 0x8000 claims 3 bytes, records a `Function`
/// label at the target with a reference back to the call site, and
/// static tracing terminates there (a `CALL` is a stop instruction).
#[test]
fn s1_call_creates_function_label_and_terminates() {
    let mut state = analyser(&[(0x8000, &[0xCD, 0x34, 0x12])]);
    state.analyse_from_pc(0x8000);

    let code = state.banks.read_page(0x8000).unwrap().code_at(0).unwrap();
    assert_eq!(code.byte_size, 3);
    assert_eq!(code.jump_addr, Some(0x1234));

    let label = state.banks.read_page(0x1234).unwrap().label_at(0x1234 & 0x03FF).unwrap();
    assert_eq!(label.name, "function_1234");
    assert_eq!(label.kind, LabelKind::Function);
    assert!(label.references.contains(code_analyser::AddressRef::new(state.banks.bank_id_at(0x8000), 0x8000)));
}

/// S2: `LD HL,0x5000; LD (0x5010),HL; RET` produces three code entries
/// with the expected sizes, a pointer-reference operand on the first
/// instruction with no label created at its target (a plain load of a
/// pointer value is not itself a dereference), a pointer-indirection
/// `Data` label on the second instruction's target, and no label at
/// the entry point itself.
#[test]
fn s2_pointer_chain_produces_data_labels_without_entry_label() {
    let mut state = analyser(&[(0x4000, &[0x21, 0x00, 0x50, 0x22, 0x10, 0x50, 0xC9])]);
    state.analyse_from_pc(0x4000);

    let page = state.banks.read_page(0x4000).unwrap();
    let first = page.code_at(0).unwrap();
    assert_eq!(first.byte_size, 3);
    assert_eq!(first.pointer_addr, Some(0x5000));

    let second = state.banks.read_page(0x4003).unwrap().code_at(0x4003 & 0x03FF).unwrap();
    assert_eq!(second.byte_size, 3);

    let third = state.banks.read_page(0x4006).unwrap().code_at(0x4006 & 0x03FF).unwrap();
    assert_eq!(third.byte_size, 1);

    assert!(state.banks.read_page(0x4000).unwrap().label_at(0).is_none());

    assert!(state.banks.read_page(0x5000).unwrap().label_at(0x5000 & 0x03FF).is_none());

    let data_5010 = state.banks.read_page(0x5010).unwrap().label_at(0x5010 & 0x03FF).unwrap();
    assert_eq!(data_5010.name, "data_5010");
    assert!(data_5010.references.contains(code_analyser::AddressRef::new(state.banks.bank_id_at(0x4003), 0x4003)));
}

/// S3: two independent entry points jumping to the same target both
/// show up in that target's reference multiset.
#[test]
fn s3_two_entry_points_both_reference_shared_target() {
    let mut state = analyser(&[(0x4000, &[0xC3, 0x00, 0x50]), (0x6000, &[0xC3, 0x00, 0x50])]);
    state.analyse_from_pc(0x4000);
    state.analyse_from_pc(0x6000);

    let label = state.banks.read_page(0x5000).unwrap().label_at(0x5000 & 0x03FF).unwrap();
    assert_eq!(label.kind, LabelKind::Code);
    assert!(label.references.contains(code_analyser::AddressRef::new(state.banks.bank_id_at(0x4000), 0x4000)));
    assert!(label.references.contains(code_analyser::AddressRef::new(state.banks.bank_id_at(0x6000), 0x6000)));
}

/// S4: `JR -2` at 0x4000 is a relative jump back to itself - an
/// infinite loop on paper, but the decoder completes in one step and
/// the analyser terminates immediately since it is a stop instruction,
/// leaving a self-referencing label in place.
#[test]
fn s4_relative_jump_to_self_terminates_with_self_reference() {
    let mut state = analyser(&[(0x4000, &[0x18, 0xFE])]);
    state.analyse_from_pc(0x4000);

    let code = state.banks.read_page(0x4000).unwrap().code_at(0).unwrap();
    assert_eq!(code.byte_size, 2);
    assert_eq!(code.jump_addr, Some(0x4000));

    let label = state.banks.read_page(0x4000).unwrap().label_at(0).unwrap();
    assert_eq!(label.name, "label_4000");
    assert!(label.references.contains(code_analyser::AddressRef::new(state.banks.bank_id_at(0x4000), 0x4000)));
}

/// S5: `SetItemData` cycles `Byte -> Word -> Byte -> Word`; undoing
/// three times restores the original `Byte`, size-1 state.
#[test]
fn s5_set_item_data_cycle_and_undo_round_trip() {
    let mut state = analyser(&[]);
    let mut stack = CommandStack::new(16);
    let addr = 0x4000;

    stack.do_command(&mut state, Command::SetItemData { addr });
    stack.do_command(&mut state, Command::SetItemData { addr });
    stack.do_command(&mut state, Command::SetItemData { addr });
    assert_eq!(state.banks.read_page(addr).unwrap().data_at(0).data_type, DataType::Word);

    stack.undo(&mut state);
    stack.undo(&mut state);
    stack.undo(&mut state);

    let data = state.banks.read_page(addr).unwrap().data_at(0);
    assert_eq!(data.data_type, DataType::Byte);
    assert_eq!(data.byte_size, 1);
}

/// S6: a page holding one label, one 2-byte code entry, and one `Word`
/// data entry serialises and deserialises to an equivalent page.
#[test]
fn s6_page_with_mixed_decorations_round_trips() {
    use code_analyser::{CodeInfo, DataInfo, LabelInfo, Page};

    let mut page = Page::new(0x4000);
    page.set_label(7, LabelInfo::new(0x4007, "foo".to_string(), LabelKind::Code));
    page.set_code(0, CodeInfo::new(0x4000, "nop".to_string(), 2));
    let mut word = DataInfo::default_byte(0x4009);
    word.data_type = DataType::Word;
    word.byte_size = 2;
    *page.data_at_mut(9) = word;

    let bytes = code_analyser::write_page(&page);
    let restored = code_analyser::read_page(&bytes).unwrap();

    assert_eq!(restored.label_at(7).unwrap().name, "foo");
    assert_eq!(restored.code_at(0).unwrap().byte_size, 2);
    assert!(restored.is_code_primary(0));
    assert_eq!(restored.data_at(9).data_type, DataType::Word);
    assert_eq!(restored.data_at(9).byte_size, 2);
}

/// Re-running `analyse_from_pc` from an already-decoded address is a
/// no-op: the recursive trace reaches a fixed point and stops.
#[test]
fn analyser_idempotence_over_repeated_calls() {
    let mut state = analyser(&[(0x8000, &[0xCD, 0x34, 0x12])]);
    state.analyse_from_pc(0x8000);
    let before = state.banks.read_page(0x8000).unwrap().code_at(0).unwrap().clone();
    state.analyse_from_pc(0x8000);
    let after = state.banks.read_page(0x8000).unwrap().code_at(0).unwrap().clone();
    assert_eq!(before, after);
}

/// Self-modifying code: a `CodeInfo` whose address gains a `Data`-kind
/// label during re-analysis is flagged self-modifying.
#[test]
fn re_analyse_flags_self_modifying_code() {
    let mut state = analyser(&[(0x4000, &[0x00])]);
    state.analyse_from_pc(0x4000);
    state.add_label(0x4000, "patched_by_loader", LabelKind::Data);
    state.re_analyse(0x4000..0x4001);

    let code = state.banks.read_page(0x4000).unwrap().code_at(0).unwrap();
    assert!(code.self_modifying);
}
