//! Undoable command stack.
//!
//! Every user-visible mutation is wrapped in a [`Command`]; pushing one
//! onto a [`CommandStack`] runs it immediately and records whatever is
//! needed to invert it. Commands whose consequences cascade (re-running
//! the static analyser) snapshot only the directly mutated slot — undo
//! restores that slot, not the wider re-derivation.

use crate::analyser::CodeAnalyser;
use crate::byte_source::ByteSource;
use crate::page::{CodeInfo, DataInfo, DataType, LabelInfo, LabelKind};

/// One user-visible mutation, as requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Cycles a data item `Byte -> Word -> Byte` or `Text -> Byte`.
    SetItemData { addr: u16 },
    /// Runs the text-detection heuristic forward from `addr`.
    SetItemText { addr: u16 },
    /// Un-disables an existing `CodeInfo` at `addr`, or runs static
    /// analysis from `addr` if none exists yet.
    SetItemCode { addr: u16 },
    AddLabel { addr: u16, name: String, kind: LabelKind },
    RemoveLabel { addr: u16 },
    Rename { addr: u16, new_name: String },
    SetComment { addr: u16, comment: String },
}

/// What a single applied [`Command`] takes to invert; computed at
/// `do`-time from the state it is about to overwrite.
#[derive(Debug, Clone)]
enum Inverse {
    NoOp,
    Data { addr: u16, previous: DataInfo },
    ToggleCodeDisabled { addr: u16 },
    Code { addr: u16, previous_code: Option<CodeInfo>, previous_data: Option<DataInfo> },
    AddedLabel { addr: u16, previous: Option<LabelInfo>, registered_name: String },
    RemovedLabel { addr: u16, removed: LabelInfo },
    Renamed { addr: u16, old_name: String },
    Comment { addr: u16, previous: String },
}

struct Applied {
    inverse: Inverse,
}

/// Bounded undo stack. Oldest entries are dropped once `capacity` is
/// exceeded; there is no redo list — non-cascading commands "flush the
/// stack", which for a stack with no
/// redo side is already a no-op).
pub struct CommandStack {
    stack: Vec<Applied>,
    capacity: usize,
}

impl CommandStack {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { stack: Vec::new(), capacity: capacity.max(1) }
    }

    /// Executes `command` against `analyser` and pushes it onto the
    /// stack, once its inverse has been captured.
    pub fn do_command<B: ByteSource>(&mut self, analyser: &mut CodeAnalyser<B>, command: Command) {
        let inverse = apply(analyser, command);
        self.stack.push(Applied { inverse });
        if self.stack.len() > self.capacity {
            self.stack.remove(0);
        }
    }

    /// Pops the most recent command and inverts it; a no-op on an empty
    /// stack.
    pub fn undo<B: ByteSource>(&mut self, analyser: &mut CodeAnalyser<B>) {
        let Some(applied) = self.stack.pop() else { return };
        unapply(analyser, applied.inverse);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Drops every entry without inverting them, for the "cascading
    /// command flushes the stack" case.
    pub fn clear(&mut self) {
        self.stack.clear();
    }
}

fn offset_of(addr: u16) -> u16 {
    addr & 0x03FF
}

fn apply<B: ByteSource>(analyser: &mut CodeAnalyser<B>, command: Command) -> Inverse {
    match command {
        Command::SetItemData { addr } => set_item_data(analyser, addr),
        Command::SetItemText { addr } => set_item_text(analyser, addr),
        Command::SetItemCode { addr } => set_item_code(analyser, addr),
        Command::AddLabel { addr, name, kind } => add_label(analyser, addr, &name, kind),
        Command::RemoveLabel { addr } => remove_label(analyser, addr),
        Command::Rename { addr, new_name } => rename(analyser, addr, &new_name),
        Command::SetComment { addr, comment } => set_comment(analyser, addr, &comment),
    }
}

fn set_item_data<B: ByteSource>(analyser: &mut CodeAnalyser<B>, addr: u16) -> Inverse {
    let offset = offset_of(addr);
    let Some(page) = analyser.banks.read_page_mut(addr) else { return Inverse::NoOp };
    let previous = page.data_at(offset).clone();
    let next_type = match previous.data_type {
        DataType::Byte => DataType::Word,
        DataType::Word | DataType::Text => DataType::Byte,
        other => other,
    };
    if next_type == previous.data_type {
        return Inverse::NoOp;
    }
    let data = page.data_at_mut(offset);
    data.data_type = next_type;
    data.byte_size = if next_type == DataType::Word { 2 } else { 1 };
    Inverse::Data { addr, previous }
}

/// Scans forward from `addr` while bytes are plausible ASCII text (spec
/// §4.9: configurable via `AnalyserConfig::text_detect_low/high`,
/// defaulting to `0x01..0x7F`) and not zero. Reverts (no-op) if the run
/// length is zero.
fn set_item_text<B: ByteSource>(analyser: &mut CodeAnalyser<B>, addr: u16) -> Inverse {
    let (low, high) = {
        let config = analyser.config();
        (config.text_detect_low, config.text_detect_high)
    };
    let mut len: u32 = 0;
    loop {
        let probe = addr.wrapping_add(len as u16);
        if len > 0 && probe == addr {
            break; // wrapped all the way around the address space
        }
        let byte = analyser.read_byte(probe);
        if byte == 0 || byte < low || byte >= high {
            break;
        }
        len += 1;
        if len >= u32::from(u16::MAX) {
            break;
        }
    }
    if len == 0 {
        return Inverse::NoOp;
    }
    let offset = offset_of(addr);
    let Some(page) = analyser.banks.read_page_mut(addr) else { return Inverse::NoOp };
    let previous = page.data_at(offset).clone();
    let data = page.data_at_mut(offset);
    data.data_type = DataType::Text;
    data.byte_size = len as u16;
    Inverse::Data { addr, previous }
}

fn set_item_code<B: ByteSource>(analyser: &mut CodeAnalyser<B>, addr: u16) -> Inverse {
    let offset = offset_of(addr);
    let is_primary_disabled =
        analyser.banks.read_page(addr).is_some_and(|p| p.is_code_primary(offset) && p.code_at(offset).is_some_and(|c| c.disabled));
    if is_primary_disabled {
        if let Some(page) = analyser.banks.read_page_mut(addr) {
            if let Some(code) = page.code_at_mut(offset) {
                code.disabled = false;
            }
        }
        return Inverse::ToggleCodeDisabled { addr };
    }

    let previous_code = analyser.banks.read_page(addr).and_then(|p| if p.is_code_primary(offset) { p.code_at(offset).cloned() } else { None });
    let previous_data = if previous_code.is_none() { analyser.banks.read_page(addr).map(|p| p.data_at(offset).clone()) } else { None };
    analyser.analyse_from_pc(addr);
    Inverse::Code { addr, previous_code, previous_data }
}

fn add_label<B: ByteSource>(analyser: &mut CodeAnalyser<B>, addr: u16, name: &str, kind: LabelKind) -> Inverse {
    let offset = offset_of(addr);
    let previous = analyser.banks.read_page(addr).and_then(|p| p.label_at(offset).cloned());
    let registered_name = analyser.add_label(addr, name, kind);
    Inverse::AddedLabel { addr, previous, registered_name }
}

fn remove_label<B: ByteSource>(analyser: &mut CodeAnalyser<B>, addr: u16) -> Inverse {
    let offset = offset_of(addr);
    let Some(page) = analyser.banks.read_page_mut(addr) else { return Inverse::NoOp };
    let Some(removed) = page.remove_label(offset) else { return Inverse::NoOp };
    analyser.labels.remove(&removed.name);
    Inverse::RemovedLabel { addr, removed }
}

fn rename<B: ByteSource>(analyser: &mut CodeAnalyser<B>, addr: u16, new_name: &str) -> Inverse {
    let offset = offset_of(addr);
    let Some(old_name) = analyser.banks.read_page(addr).and_then(|p| p.label_at(offset).map(|l| l.name.clone())) else {
        return Inverse::NoOp;
    };
    if old_name == new_name || !analyser.labels.rename(&old_name, new_name) {
        return Inverse::NoOp;
    }
    if let Some(page) = analyser.banks.read_page_mut(addr) {
        if let Some(label) = page.labels.get_mut(&offset) {
            label.name = new_name.to_string();
        }
    }
    Inverse::Renamed { addr, old_name }
}

fn set_comment<B: ByteSource>(analyser: &mut CodeAnalyser<B>, addr: u16, comment: &str) -> Inverse {
    let offset = offset_of(addr);
    let previous = analyser.banks.read_page(addr).and_then(|p| p.comments.get(&offset).map(|c| c.comment.clone())).unwrap_or_default();
    if let Some(page) = analyser.banks.read_page_mut(addr) {
        page.set_comment(offset, comment.to_string());
    }
    Inverse::Comment { addr, previous }
}

fn unapply<B: ByteSource>(analyser: &mut CodeAnalyser<B>, inverse: Inverse) {
    match inverse {
        Inverse::NoOp => {}
        Inverse::Data { addr, previous } => {
            let offset = offset_of(addr);
            if let Some(page) = analyser.banks.read_page_mut(addr) {
                *page.data_at_mut(offset) = previous;
            }
        }
        Inverse::ToggleCodeDisabled { addr } => {
            let offset = offset_of(addr);
            if let Some(page) = analyser.banks.read_page_mut(addr) {
                if let Some(code) = page.code_at_mut(offset) {
                    code.disabled = true;
                }
            }
        }
        Inverse::Code { addr, previous_code, previous_data } => {
            let offset = offset_of(addr);
            if let Some(page) = analyser.banks.read_page_mut(addr) {
                page.clear_code(offset);
                if let Some(code) = previous_code {
                    page.set_code(offset, code);
                } else if let Some(data) = previous_data {
                    *page.data_at_mut(offset) = data;
                }
            }
        }
        Inverse::AddedLabel { addr, previous, registered_name } => {
            analyser.labels.remove(&registered_name);
            let offset = offset_of(addr);
            if let Some(page) = analyser.banks.read_page_mut(addr) {
                match previous {
                    Some(label) => {
                        page.set_label(offset, label);
                    }
                    None => {
                        page.remove_label(offset);
                    }
                }
            }
        }
        Inverse::RemovedLabel { addr, removed } => {
            analyser.labels.reinsert(&removed.name);
            let offset = offset_of(addr);
            if let Some(page) = analyser.banks.read_page_mut(addr) {
                page.set_label(offset, removed);
            }
        }
        Inverse::Renamed { addr, old_name } => {
            let offset = offset_of(addr);
            let current_name = analyser.banks.read_page(addr).and_then(|p| p.label_at(offset).map(|l| l.name.clone()));
            if let Some(current_name) = current_name {
                analyser.labels.rename(&current_name, &old_name);
                if let Some(page) = analyser.banks.read_page_mut(addr) {
                    if let Some(label) = page.labels.get_mut(&offset) {
                        label.name = old_name;
                    }
                }
            }
        }
        Inverse::Comment { addr, previous } => {
            let offset = offset_of(addr);
            if let Some(page) = analyser.banks.read_page_mut(addr) {
                page.set_comment(offset, previous);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyserConfig;
    use crate::page::DataType;
    use crate::tests_support::ZeroSource;

    fn analyser() -> CodeAnalyser<ZeroSource> {
        CodeAnalyser::new(ZeroSource::default(), AnalyserConfig { insert_initial_labels: false, ..AnalyserConfig::default() })
    }

    #[test]
    fn set_item_data_cycles_byte_word_byte_and_undo_restores_size_one() {
        let mut state = analyser();
        let mut stack = CommandStack::new(8);
        let addr = 0x4000;
        assert_eq!(state.banks.read_page(addr).unwrap().data_at(0).byte_size, 1);

        stack.do_command(&mut state, Command::SetItemData { addr });
        assert_eq!(state.banks.read_page(addr).unwrap().data_at(0).data_type, DataType::Word);
        assert_eq!(state.banks.read_page(addr).unwrap().data_at(0).byte_size, 2);

        stack.do_command(&mut state, Command::SetItemData { addr });
        assert_eq!(state.banks.read_page(addr).unwrap().data_at(0).data_type, DataType::Byte);

        stack.do_command(&mut state, Command::SetItemData { addr });
        assert_eq!(state.banks.read_page(addr).unwrap().data_at(0).data_type, DataType::Word);

        stack.undo(&mut state);
        stack.undo(&mut state);
        stack.undo(&mut state);
        assert_eq!(state.banks.read_page(addr).unwrap().data_at(0).data_type, DataType::Byte);
        assert_eq!(state.banks.read_page(addr).unwrap().data_at(0).byte_size, 1);
    }

    #[test]
    fn set_item_text_reverts_when_run_length_is_zero() {
        let mut state = analyser();
        let mut stack = CommandStack::new(8);
        // ZeroSource reads all zero, so the text heuristic finds length 0.
        stack.do_command(&mut state, Command::SetItemText { addr: 0x4000 });
        assert_eq!(state.banks.read_page(0x4000).unwrap().data_at(0).data_type, DataType::Byte);
        assert_eq!(stack.len(), 1); // still recorded, even though it is a no-op inverse
        stack.undo(&mut state);
        assert_eq!(state.banks.read_page(0x4000).unwrap().data_at(0).data_type, DataType::Byte);
    }

    #[test]
    fn add_label_then_remove_then_undo_round_trips() {
        let mut state = analyser();
        let mut stack = CommandStack::new(8);
        stack.do_command(&mut state, Command::AddLabel { addr: 0x5000, name: "foo".to_string(), kind: LabelKind::Data });
        assert!(state.labels.is_taken("foo"));
        assert_eq!(state.banks.read_page(0x5000).unwrap().label_at(0).unwrap().name, "foo");

        stack.do_command(&mut state, Command::RemoveLabel { addr: 0x5000 });
        assert!(!state.labels.is_taken("foo"));
        assert!(state.banks.read_page(0x5000).unwrap().label_at(0).is_none());

        stack.undo(&mut state); // undoes RemoveLabel
        assert!(state.labels.is_taken("foo"));
        assert_eq!(state.banks.read_page(0x5000).unwrap().label_at(0).unwrap().name, "foo");

        stack.undo(&mut state); // undoes AddLabel
        assert!(!state.labels.is_taken("foo"));
        assert!(state.banks.read_page(0x5000).unwrap().label_at(0).is_none());
    }

    #[test]
    fn rename_collision_is_rejected_and_not_recorded_destructively() {
        let mut state = analyser();
        let mut stack = CommandStack::new(8);
        stack.do_command(&mut state, Command::AddLabel { addr: 0x5000, name: "a".to_string(), kind: LabelKind::Data });
        stack.do_command(&mut state, Command::AddLabel { addr: 0x6000, name: "b".to_string(), kind: LabelKind::Data });
        stack.do_command(&mut state, Command::Rename { addr: 0x5000, new_name: "b".to_string() });
        assert_eq!(state.banks.read_page(0x5000).unwrap().label_at(0).unwrap().name, "a");
        stack.undo(&mut state); // no-op rename inverse
        assert_eq!(state.banks.read_page(0x5000).unwrap().label_at(0).unwrap().name, "a");
    }

    #[test]
    fn set_comment_undo_restores_previous_text() {
        let mut state = analyser();
        let mut stack = CommandStack::new(8);
        stack.do_command(&mut state, Command::SetComment { addr: 0x4010, comment: "first".to_string() });
        stack.do_command(&mut state, Command::SetComment { addr: 0x4010, comment: "second".to_string() });
        assert_eq!(state.banks.read_page(0x4010).unwrap().comments.get(&0x10).unwrap().comment, "second");
        stack.undo(&mut state);
        assert_eq!(state.banks.read_page(0x4010).unwrap().comments.get(&0x10).unwrap().comment, "first");
        stack.undo(&mut state);
        assert!(state.banks.read_page(0x4010).unwrap().comments.get(&0x10).is_none());
    }

    #[test]
    fn undo_on_empty_stack_is_a_noop() {
        let mut state = analyser();
        let mut stack = CommandStack::new(8);
        stack.undo(&mut state); // must not panic
        assert!(stack.is_empty());
    }

    #[test]
    fn set_item_code_toggles_disabled_flag_without_full_reanalysis() {
        let mut state = analyser();
        let mut stack = CommandStack::new(8);
        state.analyse_from_pc(0x4000); // ZeroSource decodes as `nop` repeatedly
        state.banks.read_page_mut(0x4000).unwrap().code_at_mut(0).unwrap().disabled = true;

        stack.do_command(&mut state, Command::SetItemCode { addr: 0x4000 });
        assert!(!state.banks.read_page(0x4000).unwrap().code_at(0).unwrap().disabled);

        stack.undo(&mut state);
        assert!(state.banks.read_page(0x4000).unwrap().code_at(0).unwrap().disabled);
    }
}
