//! Linear text export: the flat, address-ordered view over the page
//! store used to render or save an assembler-like listing.

use crate::analyser::CodeAnalyser;
use crate::byte_source::ByteSource;
use crate::disassembler::OPERAND_PLACEHOLDER;
use crate::page::{CodeInfo, CommentBlock, DataInfo, DataType, LabelInfo};

/// Overlays the live operand onto a decoded instruction's placeholder
/// token: the exact-address label at `target`, if one
/// exists, otherwise prefixed hex. A `None` target (no jump/pointer
/// operand) leaves `text` untouched.
fn resolve_operand_text<B: ByteSource>(text: &str, target: Option<u16>, analyser: &CodeAnalyser<B>) -> String {
    let Some(target) = target else { return text.to_string() };
    if !text.contains(OPERAND_PLACEHOLDER) {
        return text.to_string();
    }
    let offset = target & 0x03FF;
    let operand = analyser
        .banks
        .read_page(target)
        .and_then(|p| p.label_at(offset))
        .map_or_else(|| format!("${target:04X}"), |l| l.name.clone());
    text.replace(OPERAND_PLACEHOLDER, &operand)
}

/// One renderable entry, tagged by kind. `CommentBlock` is the
/// standalone per-address comment; code and data carry their own
/// `comment` field separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Comment(CommentBlock),
    Label(LabelInfo),
    Code(CodeInfo),
    Data(DataInfo),
}

impl Item {
    #[must_use]
    pub fn addr(&self) -> u16 {
        match self {
            Self::Comment(c) => c.addr,
            Self::Label(l) => l.addr,
            Self::Code(c) => c.addr,
            Self::Data(d) => d.addr,
        }
    }

    /// Sort key within one address: a standalone comment precedes the
    /// label it annotates, which precedes the code/data occupying the
    /// slot.
    fn kind_order(&self) -> u8 {
        match self {
            Self::Comment(_) => 0,
            Self::Label(_) => 1,
            Self::Code(_) => 2,
            Self::Data(_) => 3,
        }
    }
}

/// An address-ordered sequence of [`Item`]s, merged from labels, code
/// entries (primary slots only — operand-tail slots are skipped), and
/// data entries.
#[derive(Debug, Clone, Default)]
pub struct ItemList {
    items: Vec<Item>,
}

impl ItemList {
    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Builds the item list covering `[start, end]` inclusive.
    pub fn build<B: ByteSource>(analyser: &CodeAnalyser<B>, start: u16, end: u16) -> Self {
        let mut items = Vec::new();
        let mut addr: u32 = u32::from(start);
        let end = u32::from(end);

        while addr <= end {
            let current = addr as u16;
            let offset = current & 0x03FF;
            let Some(page) = analyser.banks.read_page(current) else {
                addr += 1;
                continue;
            };

            if let Some(comment) = page.comments.get(&offset) {
                items.push(Item::Comment(comment.clone()));
            }
            if let Some(label) = page.label_at(offset) {
                items.push(Item::Label(label.clone()));
            }

            if let Some(code) = page.code_at(offset) {
                if page.is_code_primary(offset) {
                    items.push(Item::Code(code.clone()));
                }
                addr += u32::from(code.byte_size.max(1));
                continue;
            }

            items.push(Item::Data(page.data_at(offset).clone()));
            addr += 1;
        }

        items.sort_by_key(|item| (item.addr(), item.kind_order()));
        Self { items }
    }
}

/// Scans backwards from `addr` to the nearest labelled address and
/// renders `[name]` or `[name + offset]`. Returns an empty
/// string if no label exists at or below `addr`.
#[must_use]
pub fn generate_address_label_string<B: ByteSource>(analyser: &CodeAnalyser<B>, addr: u16) -> String {
    let mut probe = addr;
    let mut distance: u32 = 0;
    loop {
        let offset = probe & 0x03FF;
        if let Some(label) = analyser.banks.read_page(probe).and_then(|p| p.label_at(offset)) {
            return if distance == 0 { format!("[{}]", label.name) } else { format!("[{} + {distance}]", label.name) };
        }
        if probe == 0 {
            return String::new();
        }
        probe -= 1;
        distance += 1;
    }
}

fn render_data(data: &DataInfo, read_byte: &impl Fn(u16) -> u8) -> String {
    match data.data_type {
        DataType::Byte => format!("db {:02X}h", read_byte(data.addr)),
        DataType::Word => {
            let lo = u16::from(read_byte(data.addr));
            let hi = u16::from(read_byte(data.addr.wrapping_add(1)));
            format!("dw {:04X}h", lo | (hi << 8))
        }
        DataType::Text => {
            let mut text = String::new();
            for i in 0..data.byte_size {
                let ch = read_byte(data.addr.wrapping_add(i)) as char;
                if ch == '\n' {
                    text.push_str("<cr>");
                } else {
                    text.push(ch);
                }
            }
            format!("ascii '{text}'")
        }
        DataType::Bitmap | DataType::CharacterMap | DataType::Graphics | DataType::Blob | DataType::InstructionOperand => {
            format!("{} bytes", data.byte_size)
        }
    }
}

/// Renders the full assembler-like listing for `[start, end]` (spec
/// §4.10): labels as `name:`, code as `\t<mnemonic>` with a trailing
/// jump/pointer-target label comment, data as `\tdb`/`\tdw`/`\tascii`,
/// and each item's own `comment` field appended last.
#[must_use]
pub fn export_text<B: ByteSource>(analyser: &CodeAnalyser<B>, start: u16, end: u16) -> String {
    let list = ItemList::build(analyser, start, end);
    let mut out = String::new();

    for item in list.items() {
        match item {
            Item::Comment(c) => {
                out.push_str(&format!("; {}\n", c.comment));
            }
            Item::Label(l) => {
                out.push_str(&format!("{}:\n", l.name));
            }
            Item::Code(c) => {
                out.push('\t');
                let target = c.jump_addr.or(c.pointer_addr);
                out.push_str(&resolve_operand_text(&c.text, target, analyser));
                if let Some(target) = target {
                    let label_str = generate_address_label_string(analyser, target);
                    if !label_str.is_empty() {
                        out.push_str(&format!("\t;{label_str}"));
                    }
                }
                if !c.comment.is_empty() {
                    out.push_str(&format!("\t;{}", c.comment));
                }
                out.push('\n');
            }
            Item::Data(d) => {
                out.push('\t');
                out.push_str(&render_data(d, &|a| analyser.read_byte(a)));
                if !d.comment.is_empty() {
                    out.push_str(&format!("\t;{}", d.comment));
                }
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyserConfig;
    use crate::page::LabelKind;
    use crate::tests_support::FlatZ80;

    fn analyser_with(bytes: &[(u16, &[u8])]) -> CodeAnalyser<FlatZ80> {
        CodeAnalyser::new(FlatZ80::new(bytes), AnalyserConfig { insert_initial_labels: false, ..AnalyserConfig::default() })
    }

    #[test]
    fn call_then_ret_renders_label_and_two_code_lines() {
        let mut state = analyser_with(&[(0x8000, &[0xCD, 0x00, 0x90, 0xC9]), (0x9000, &[0xC9])]);
        state.analyse_from_pc(0x8000);
        let text = export_text(&state, 0x8000, 0x9000);
        assert!(text.contains("call"));
        assert!(text.contains("function_9000:"));
        assert!(text.contains(";[function_9000]"));
    }

    #[test]
    fn address_label_string_reports_offset_from_nearest_label() {
        let mut state = analyser_with(&[]);
        state.add_label(0x6000, "table", LabelKind::Data);
        assert_eq!(generate_address_label_string(&state, 0x6000), "[table]");
        assert_eq!(generate_address_label_string(&state, 0x6005), "[table + 5]");
    }

    #[test]
    fn byte_data_renders_as_db_hex() {
        let state = analyser_with(&[(0x4000, &[0x42])]);
        let text = export_text(&state, 0x4000, 0x4000);
        assert_eq!(text.trim(), "db 42h");
    }
}
