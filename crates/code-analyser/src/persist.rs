//! Page (de)serialisation: the binary page format and the
//! JSON export/import shape used for whole-address-space save files.
//!
//! Binary records are hand-rolled little-endian, cursor-based, in the
//! same style as the host's own block parsers: a `pos: &mut usize`
//! cursor walked forward by small `read_*` free functions, with a
//! `need` bounds check ahead of every read so a truncated buffer comes
//! back as [`AnalyserError::Truncated`] instead of panicking.

use serde_json::{json, Map, Value};

use crate::error::{AnalyserError, Result};
use crate::page::{AddressRef, CodeInfo, CommentBlock, DataInfo, DataType, LabelInfo, LabelKind, OperandKind, Page, PAGE_SIZE};
use crate::xref::ReferenceSet;
use crate::analyser::CodeAnalyser;
use crate::byte_source::ByteSource;

const MAGIC: u32 = 0x0000_C0DE;
const VERSION: u32 = 2;
const END_OF_SECTION: u16 = 0xFFFF;

fn need(data: &[u8], pos: usize, n: usize, context: &'static str) -> Result<()> {
    if pos + n > data.len() {
        return Err(AnalyserError::Truncated { context });
    }
    Ok(())
}

fn read_u16_le(data: &[u8], pos: &mut usize) -> Result<u16> {
    need(data, *pos, 2, "u16")?;
    let value = u16::from_le_bytes([data[*pos], data[*pos + 1]]);
    *pos += 2;
    Ok(value)
}

fn read_u32_le(data: &[u8], pos: &mut usize) -> Result<u32> {
    need(data, *pos, 4, "u32")?;
    let value = u32::from_le_bytes([data[*pos], data[*pos + 1], data[*pos + 2], data[*pos + 3]]);
    *pos += 4;
    Ok(value)
}

fn read_u8(data: &[u8], pos: &mut usize) -> Result<u8> {
    need(data, *pos, 1, "u8")?;
    let value = data[*pos];
    *pos += 1;
    Ok(value)
}

fn read_string(data: &[u8], pos: &mut usize) -> Result<String> {
    let len = read_u16_le(data, pos)? as usize;
    need(data, *pos, len, "string body")?;
    let bytes = &data[*pos..*pos + len];
    *pos += len;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn write_addr_list(out: &mut Vec<u8>, refs: &ReferenceSet) {
    let addrs: Vec<u16> = refs.addresses().map(|r| r.addr).collect();
    out.extend_from_slice(&(addrs.len() as u16).to_le_bytes());
    for addr in addrs {
        out.extend_from_slice(&addr.to_le_bytes());
    }
}

fn read_addr_list(data: &[u8], pos: &mut usize) -> Result<ReferenceSet> {
    let count = read_u16_le(data, pos)?;
    let mut set = ReferenceSet::new();
    for _ in 0..count {
        let addr = read_u16_le(data, pos)?;
        set.add(AddressRef::flat(addr));
    }
    Ok(set)
}

fn label_kind_to_u8(kind: LabelKind) -> u8 {
    match kind {
        LabelKind::Code => 0,
        LabelKind::Function => 1,
        LabelKind::Data => 2,
    }
}

fn label_kind_from_u8(tag: u8) -> LabelKind {
    match tag {
        1 => LabelKind::Function,
        2 => LabelKind::Data,
        _ => LabelKind::Code,
    }
}

fn operand_kind_to_u8(kind: OperandKind) -> u8 {
    match kind {
        OperandKind::Unknown => 0,
        OperandKind::Decimal => 1,
        OperandKind::Hex => 2,
        OperandKind::Binary => 3,
        OperandKind::Pointer => 4,
        OperandKind::JumpAddress => 5,
    }
}

fn operand_kind_from_u8(tag: u8) -> OperandKind {
    match tag {
        1 => OperandKind::Decimal,
        2 => OperandKind::Hex,
        3 => OperandKind::Binary,
        4 => OperandKind::Pointer,
        5 => OperandKind::JumpAddress,
        _ => OperandKind::Unknown,
    }
}

fn data_type_to_u8(t: DataType) -> u8 {
    match t {
        DataType::Byte => 0,
        DataType::Word => 1,
        DataType::Text => 2,
        DataType::Bitmap => 3,
        DataType::CharacterMap => 4,
        DataType::Graphics => 5,
        DataType::Blob => 6,
        DataType::InstructionOperand => 7,
    }
}

fn data_type_from_u8(tag: u8) -> DataType {
    match tag {
        1 => DataType::Word,
        2 => DataType::Text,
        3 => DataType::Bitmap,
        4 => DataType::CharacterMap,
        5 => DataType::Graphics,
        6 => DataType::Blob,
        7 => DataType::InstructionOperand,
        _ => DataType::Byte,
    }
}

/// Serialises one page to the binary format: a magic/version/base-address
/// header followed by `LABL`, `CODE` and `DATA` sections, each a run of
/// `0xFFFF`-terminated records. Within each record, the fields
/// SPEC_FULL.md §6 documents are written first and in its exact order;
/// a bank-owned `CodeInfo`/`DataInfo` carries a few attributes
/// the documented layout has no slot for (`operand_kind`,
/// `self_modifying`, `disabled`, `text`, `char_set_address`,
/// `empty_char_no`), and those are appended after - see SPEC_FULL.md §6
/// for why they have to round-trip even though the documented format
/// predates them.
#[must_use]
pub fn write_page(page: &Page) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&page.base_addr.to_le_bytes());

    out.extend_from_slice(b"LABL");
    let mut offsets: Vec<u16> = page.labels.keys().copied().collect();
    offsets.sort_unstable();
    for offset in offsets {
        let label = &page.labels[&offset];
        out.extend_from_slice(&offset.to_le_bytes());
        write_string(&mut out, &label.comment);
        out.extend_from_slice(&label.byte_size.to_le_bytes());
        out.push(label_kind_to_u8(label.kind));
        write_string(&mut out, &label.name);
        out.push(u8::from(label.global));
        write_addr_list(&mut out, &label.references);
    }
    out.extend_from_slice(&END_OF_SECTION.to_le_bytes());

    out.extend_from_slice(b"CODE");
    for code in page.primary_code_iter() {
        let offset = code.addr & 0x03FF;
        out.extend_from_slice(&offset.to_le_bytes());
        write_string(&mut out, &code.comment);
        out.extend_from_slice(&u16::from(code.byte_size).to_le_bytes());
        out.extend_from_slice(&code.jump_addr.unwrap_or(END_OF_SECTION).to_le_bytes());
        out.extend_from_slice(&code.pointer_addr.unwrap_or(END_OF_SECTION).to_le_bytes());
        out.extend_from_slice(&code.flags.to_le_bytes());
        out.push(operand_kind_to_u8(code.operand_kind));
        out.push(u8::from(code.self_modifying));
        out.push(u8::from(code.disabled));
        write_string(&mut out, &code.text);
    }
    out.extend_from_slice(&END_OF_SECTION.to_le_bytes());

    out.extend_from_slice(b"DATA");
    for offset in 0..PAGE_SIZE as u16 {
        let data = page.data_at(offset);
        out.extend_from_slice(&offset.to_le_bytes());
        write_string(&mut out, &data.comment);
        out.extend_from_slice(&data.byte_size.to_le_bytes());
        out.push(data_type_to_u8(data.data_type));
        write_addr_list(&mut out, &data.reads);
        write_addr_list(&mut out, &data.writes);
        match data.char_set_address {
            Some(addr) => {
                out.push(1);
                out.extend_from_slice(&addr.to_le_bytes());
            }
            None => out.push(0),
        }
        match data.empty_char_no {
            Some(n) => {
                out.push(1);
                out.push(n);
            }
            None => out.push(0),
        }
    }
    out.extend_from_slice(&END_OF_SECTION.to_le_bytes());

    out
}

/// Parses one page out of the binary format written by [`write_page`].
/// Reference counts collapse to multiplicity 1 per address on load: a
/// referencing address that was ticked several times
/// before saving comes back counted once.
pub fn read_page(bytes: &[u8]) -> Result<Page> {
    let mut pos = 0usize;
    let magic = read_u32_le(bytes, &mut pos)?;
    if magic != MAGIC {
        return Err(AnalyserError::BadPageFormat { expected_magic: MAGIC, found_magic: magic });
    }
    let version = read_u32_le(bytes, &mut pos)?;
    if version != VERSION {
        return Err(AnalyserError::UnsupportedVersion { found_version: version });
    }
    let base_addr = read_u16_le(bytes, &mut pos)?;
    let mut page = Page::new(base_addr);

    need(bytes, pos, 4, "LABL tag")?;
    pos += 4;
    loop {
        let offset = read_u16_le(bytes, &mut pos)?;
        if offset == END_OF_SECTION {
            break;
        }
        let comment = read_string(bytes, &mut pos)?;
        let byte_size = read_u16_le(bytes, &mut pos)?;
        let kind = label_kind_from_u8(read_u8(bytes, &mut pos)?);
        let name = read_string(bytes, &mut pos)?;
        let global = read_u8(bytes, &mut pos)? != 0;
        let references = read_addr_list(bytes, &mut pos)?;
        let addr = base_addr.wrapping_add(offset);
        page.set_label(offset, LabelInfo { addr, name, kind, global, references, byte_size, comment });
    }

    need(bytes, pos, 4, "CODE tag")?;
    pos += 4;
    loop {
        let offset = read_u16_le(bytes, &mut pos)?;
        if offset == END_OF_SECTION {
            break;
        }
        let comment = read_string(bytes, &mut pos)?;
        let byte_size = read_u16_le(bytes, &mut pos)? as u8;
        let jump_raw = read_u16_le(bytes, &mut pos)?;
        let pointer_raw = read_u16_le(bytes, &mut pos)?;
        let flags = read_u32_le(bytes, &mut pos)?;
        let operand_kind = operand_kind_from_u8(read_u8(bytes, &mut pos)?);
        let self_modifying = read_u8(bytes, &mut pos)? != 0;
        let disabled = read_u8(bytes, &mut pos)? != 0;
        let text = read_string(bytes, &mut pos)?;
        let addr = base_addr.wrapping_add(offset);
        let info = CodeInfo {
            addr,
            text,
            byte_size,
            jump_addr: (jump_raw != END_OF_SECTION).then_some(jump_raw),
            pointer_addr: (pointer_raw != END_OF_SECTION).then_some(pointer_raw),
            operand_kind,
            flags,
            self_modifying,
            disabled,
            comment,
        };
        page.set_code(offset, info);
    }

    need(bytes, pos, 4, "DATA tag")?;
    pos += 4;
    loop {
        let offset = read_u16_le(bytes, &mut pos)?;
        if offset == END_OF_SECTION {
            break;
        }
        let comment = read_string(bytes, &mut pos)?;
        let byte_size = read_u16_le(bytes, &mut pos)?;
        let data_type = data_type_from_u8(read_u8(bytes, &mut pos)?);
        let reads = read_addr_list(bytes, &mut pos)?;
        let writes = read_addr_list(bytes, &mut pos)?;
        let char_set_address = if read_u8(bytes, &mut pos)? != 0 { Some(read_u16_le(bytes, &mut pos)?) } else { None };
        let empty_char_no = if read_u8(bytes, &mut pos)? != 0 { Some(read_u8(bytes, &mut pos)?) } else { None };
        let addr = base_addr.wrapping_add(offset);
        *page.data_at_mut(offset) = DataInfo {
            addr,
            data_type,
            byte_size,
            reads,
            writes,
            last_frame_read: 0,
            last_frame_written: 0,
            last_writer: None,
            char_set_address,
            empty_char_no,
            comment,
        };
    }

    page.dirty = false;
    Ok(page)
}

fn address_ref_json(r: AddressRef) -> Value {
    json!({ "Bank": r.bank_id, "Addr": r.addr })
}

fn reference_set_json(refs: &ReferenceSet) -> Value {
    Value::Array(refs.addresses().map(address_ref_json).collect())
}

fn comment_block_json(c: &CommentBlock) -> Value {
    json!({ "Address": c.addr, "Comment": c.comment })
}

fn label_info_json(l: &LabelInfo) -> Value {
    json!({
        "Address": l.addr,
        "Name": l.name,
        "LabelType": label_kind_to_u8(l.kind),
        "Global": l.global,
        "ByteSize": l.byte_size,
        "References": reference_set_json(&l.references),
        "Comment": l.comment,
    })
}

fn code_info_json(c: &CodeInfo) -> Value {
    json!({
        "Address": c.addr,
        "Text": c.text,
        "ByteSize": c.byte_size,
        "JumpAddr": c.jump_addr,
        "PointerAddr": c.pointer_addr,
        "OperandType": operand_kind_to_u8(c.operand_kind),
        "Flags": c.flags,
        "SelfModifying": c.self_modifying,
        "Disabled": c.disabled,
        "Comment": c.comment,
    })
}

fn data_info_json(d: &DataInfo) -> Value {
    json!({
        "Address": d.addr,
        "DataType": data_type_to_u8(d.data_type),
        "ByteSize": d.byte_size,
        "Reads": reference_set_json(&d.reads),
        "Writes": reference_set_json(&d.writes),
        "CharSetAddress": d.char_set_address,
        "EmptyCharNo": d.empty_char_no,
        "Comment": d.comment,
    })
}

/// Exports the whole address space to the JSON shape described in spec
/// §6: one object per mapped page, holding only the decorations that
/// differ from their defaults, plus the process-wide watch list.
/// `CharacterSets`/`CharacterMaps` are always empty: that registry
/// belongs to the character-set renderer, which sits outside this
/// crate's scope and is reached only through [`ByteSource`].
#[must_use]
pub fn export_json<B: ByteSource>(analyser: &CodeAnalyser<B>) -> Value {
    let mut pages = Vec::new();
    for bank in analyser.banks.banks() {
        for (page_index, page) in bank.pages.iter().enumerate() {
            if !page.used && page.labels.is_empty() && page.comments.is_empty() {
                let has_code = page.primary_code_iter().next().is_some();
                let has_data = (0..PAGE_SIZE as u16).any(|o| !page.data_at(o).is_default());
                if !has_code && !has_data {
                    continue;
                }
            }

            let mut comments: Vec<&CommentBlock> = page.comments.values().collect();
            comments.sort_by_key(|c| c.addr);
            let mut labels: Vec<&LabelInfo> = page.labels.values().collect();
            labels.sort_by_key(|l| l.addr);
            let code: Vec<&CodeInfo> = page.primary_code_iter().collect();
            let data: Vec<&DataInfo> = (0..PAGE_SIZE as u16).map(|o| page.data_at(o)).filter(|d| !d.is_default()).collect();

            pages.push(json!({
                "PageId": page_index,
                "CommentBlocks": comments.into_iter().map(comment_block_json).collect::<Vec<_>>(),
                "LabelInfo": labels.into_iter().map(label_info_json).collect::<Vec<_>>(),
                "CodeInfo": code.into_iter().map(code_info_json).collect::<Vec<_>>(),
                "DataInfo": data.into_iter().map(data_info_json).collect::<Vec<_>>(),
            }));
        }
    }

    let watches: Vec<Value> = analyser.watches().iter().copied().map(address_ref_json).collect();

    json!({
        "Pages": pages,
        "Watches": watches,
        "CharacterSets": Value::Array(Vec::new()),
        "CharacterMaps": Value::Array(Vec::new()),
    })
}

fn field_u16(obj: &Map<String, Value>, key: &'static str) -> Result<u16> {
    obj.get(key)
        .and_then(Value::as_u64)
        .map(|v| v as u16)
        .ok_or(AnalyserError::Truncated { context: key })
}

fn field_str<'a>(obj: &'a Map<String, Value>, key: &'static str) -> Result<&'a str> {
    obj.get(key).and_then(Value::as_str).ok_or(AnalyserError::Truncated { context: key })
}

fn import_references(value: &Value) -> ReferenceSet {
    let mut set = ReferenceSet::new();
    if let Some(array) = value.as_array() {
        for entry in array {
            if let Some(obj) = entry.as_object() {
                let bank = obj.get("Bank").and_then(Value::as_i64).unwrap_or(-1) as i16;
                let addr = obj.get("Addr").and_then(Value::as_u64).unwrap_or(0) as u16;
                set.add(AddressRef::new(bank, addr));
            }
        }
    }
    set
}

/// Restores decorations written by [`export_json`] into `analyser`'s
/// currently mapped pages. Pages referencing a bank other than the one
/// mapped at their address are not distinguished: import writes into
/// whichever page is mapped at each address at the time of the call,
/// the common case for the single flat bank [`CodeAnalyser::new`]
/// creates.
pub fn import_json<B: ByteSource>(analyser: &mut CodeAnalyser<B>, value: &Value) -> Result<()> {
    let Some(pages) = value.get("Pages").and_then(Value::as_array) else {
        return Ok(());
    };

    for page_json in pages {
        let Some(obj) = page_json.as_object() else { continue };
        let page_id = obj.get("PageId").and_then(Value::as_u64).unwrap_or(0) as usize;
        let base_addr = (page_id * PAGE_SIZE) as u16;

        for comment in obj.get("CommentBlocks").and_then(Value::as_array).into_iter().flatten() {
            let Some(c) = comment.as_object() else { continue };
            let offset = field_u16(c, "Address")?;
            let text = field_str(c, "Comment")?.to_string();
            if let Some(page) = analyser.banks.read_page_mut(base_addr.wrapping_add(offset)) {
                page.set_comment(offset & 0x03FF, text);
            }
        }

        for label in obj.get("LabelInfo").and_then(Value::as_array).into_iter().flatten() {
            let Some(l) = label.as_object() else { continue };
            let offset = field_u16(l, "Address")?;
            let name = field_str(l, "Name")?.to_string();
            let kind = label_kind_from_u8(l.get("LabelType").and_then(Value::as_u64).unwrap_or(0) as u8);
            let global = l.get("Global").and_then(Value::as_bool).unwrap_or(false);
            let byte_size = l.get("ByteSize").and_then(Value::as_u64).unwrap_or(1) as u16;
            let references = l.get("References").map(import_references).unwrap_or_default();
            let comment = l.get("Comment").and_then(Value::as_str).unwrap_or("").to_string();
            let addr = base_addr.wrapping_add(offset);
            if let Some(page) = analyser.banks.read_page_mut(addr) {
                page.set_label(offset & 0x03FF, LabelInfo { addr, name, kind, global, references, byte_size, comment });
            }
        }

        for code in obj.get("CodeInfo").and_then(Value::as_array).into_iter().flatten() {
            let Some(c) = code.as_object() else { continue };
            let offset = field_u16(c, "Address")?;
            let text = field_str(c, "Text")?.to_string();
            let byte_size = c.get("ByteSize").and_then(Value::as_u64).unwrap_or(1) as u8;
            let jump_addr = c.get("JumpAddr").and_then(Value::as_u64).map(|v| v as u16);
            let pointer_addr = c.get("PointerAddr").and_then(Value::as_u64).map(|v| v as u16);
            let operand_kind = operand_kind_from_u8(c.get("OperandType").and_then(Value::as_u64).unwrap_or(0) as u8);
            let flags = c.get("Flags").and_then(Value::as_u64).unwrap_or(0) as u32;
            let self_modifying = c.get("SelfModifying").and_then(Value::as_bool).unwrap_or(false);
            let disabled = c.get("Disabled").and_then(Value::as_bool).unwrap_or(false);
            let comment = c.get("Comment").and_then(Value::as_str).unwrap_or("").to_string();
            let addr = base_addr.wrapping_add(offset);
            let info = CodeInfo { addr, text, byte_size, jump_addr, pointer_addr, operand_kind, flags, self_modifying, disabled, comment };
            if let Some(page) = analyser.banks.read_page_mut(addr) {
                page.set_code(offset & 0x03FF, info);
            }
        }

        for data in obj.get("DataInfo").and_then(Value::as_array).into_iter().flatten() {
            let Some(d) = data.as_object() else { continue };
            let offset = field_u16(d, "Address")?;
            let data_type = data_type_from_u8(d.get("DataType").and_then(Value::as_u64).unwrap_or(0) as u8);
            let byte_size = d.get("ByteSize").and_then(Value::as_u64).unwrap_or(1) as u16;
            let reads = d.get("Reads").map(import_references).unwrap_or_default();
            let writes = d.get("Writes").map(import_references).unwrap_or_default();
            let char_set_address = d.get("CharSetAddress").and_then(Value::as_u64).map(|v| v as u16);
            let empty_char_no = d.get("EmptyCharNo").and_then(Value::as_u64).map(|v| v as u8);
            let comment = d.get("Comment").and_then(Value::as_str).unwrap_or("").to_string();
            let addr = base_addr.wrapping_add(offset);
            if let Some(page) = analyser.banks.read_page_mut(addr) {
                *page.data_at_mut(offset & 0x03FF) = DataInfo {
                    addr,
                    data_type,
                    byte_size,
                    reads,
                    writes,
                    last_frame_read: 0,
                    last_frame_written: 0,
                    last_writer: None,
                    char_set_address,
                    empty_char_no,
                    comment,
                };
            }
        }
    }

    if let Some(watches) = value.get("Watches").and_then(Value::as_array) {
        for watch in watches {
            if let Some(obj) = watch.as_object() {
                let bank = obj.get("Bank").and_then(Value::as_i64).unwrap_or(-1) as i16;
                let addr = obj.get("Addr").and_then(Value::as_u64).unwrap_or(0) as u16;
                analyser.add_watch(AddressRef::new(bank, addr));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyserConfig;
    use crate::tests_support::FlatZ80;

    #[test]
    fn page_round_trips_through_binary_format() {
        let mut page = Page::new(0x4000);
        page.set_label(0, LabelInfo::new(0x4000, "start".to_string(), LabelKind::Code));
        page.set_code(0, CodeInfo::new(0x4000, "nop".to_string(), 1));
        let mut word = DataInfo::default_byte(0x4002);
        word.data_type = DataType::Word;
        word.byte_size = 2;
        *page.data_at_mut(2) = word;

        let bytes = write_page(&page);
        let restored = read_page(&bytes).unwrap();

        assert_eq!(restored.base_addr, 0x4000);
        assert_eq!(restored.label_at(0).unwrap().name, "start");
        assert_eq!(restored.code_at(0).unwrap().text, "nop");
        assert_eq!(restored.data_at(2).data_type, DataType::Word);
        assert_eq!(restored.data_at(2).byte_size, 2);
    }

    #[test]
    fn read_page_rejects_bad_magic() {
        let bytes = vec![0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 0];
        let err = read_page(&bytes).unwrap_err();
        assert!(matches!(err, AnalyserError::BadPageFormat { .. }));
    }

    #[test]
    fn read_page_rejects_truncated_buffer() {
        let err = read_page(&[]).unwrap_err();
        assert!(matches!(err, AnalyserError::Truncated { .. }));
    }

    #[test]
    fn json_export_then_import_round_trips_a_label_and_a_watch() {
        let mut analyser = CodeAnalyser::new(FlatZ80::new(&[(0x8000, &[0x00])]), AnalyserConfig { insert_initial_labels: false, ..AnalyserConfig::default() });
        analyser.add_label(0x8000, "entry", LabelKind::Function);
        analyser.add_watch(AddressRef::flat(0x8000));

        let exported = export_json(&analyser);

        let mut fresh = CodeAnalyser::new(FlatZ80::new(&[]), AnalyserConfig { insert_initial_labels: false, ..AnalyserConfig::default() });
        import_json(&mut fresh, &exported).unwrap();

        let page = fresh.banks.read_page(0x8000).unwrap();
        assert_eq!(page.label_at(0).unwrap().name, "entry");
        assert_eq!(fresh.watches(), &[AddressRef::flat(0x8000)]);
    }
}
