//! Bilingual string export and translation import.
//!
//! Every exported string becomes two lines keyed by the literal's source
//! address: a `◇`-marked read-only original and a `◆`-marked editable
//! copy, followed by a blank separator. Import reads only the `◆` lines
//! back; the key is the address the relinking rebuild substitutes at.

use std::collections::HashMap;
use std::fmt::Write as _;

use encoding_rs::{SHIFT_JIS, UTF_16LE};

use super::{Disassembler, EValue, HxbError, InstKind};

const SOURCE_MARK: char = '\u{25C7}'; // ◇
const EDIT_MARK: char = '\u{25C6}'; // ◆

fn push_entry(out: &mut String, address: u32, text: &str) {
    let _ = writeln!(out, "{SOURCE_MARK}{address:08X}{SOURCE_MARK}{text}");
    let _ = writeln!(out, "{EDIT_MARK}{address:08X}{EDIT_MARK}{text}");
    out.push('\n');
}

/// Export the strings passed to the dialogue script-calls: selector 0x36
/// takes the text as its first argument, selector 0x32 as its second
/// (behind a 0x0C mode argument).
pub(super) fn export_script_strings(data: &[u8]) -> Result<String, HxbError> {
    let mut out = String::new();
    {
        let mut hook = |id: &EValue, args: &[EValue]| {
            let Some(index) = id.as_int() else { return };

            if index == 0x36 && args.len() > 1 {
                if let Some(s) = args[0].as_str() {
                    if !s.is_empty() {
                        push_entry(&mut out, args[0].address, s);
                    }
                }
            }

            if index == 0x32 && args.len() > 2 && args[0].as_int() == Some(0x0C) {
                if let Some(s) = args[1].as_str() {
                    if !s.is_empty() {
                        push_entry(&mut out, args[1].address, s);
                    }
                }
            }
        };

        let mut disasm = Disassembler::new(data).with_call_script_hook(&mut hook);
        disasm.execute()?;
    }
    Ok(out)
}

/// Export every string literal in the script, keyed by its address.
pub(super) fn export_all_strings(data: &[u8]) -> Result<String, HxbError> {
    let mut disasm = Disassembler::new(data);
    disasm.execute()?;
    let unicode = disasm.is_unicode();

    let mut out = String::new();
    for inst in &disasm.assembly().insts {
        if inst.kind != InstKind::ExprLoadImmStr {
            continue;
        }

        // Strip the opcode byte and the terminator.
        let start = inst.address as usize + 1;
        let end = inst.address as usize + inst.length as usize - if unicode { 2 } else { 1 };
        let bytes = &data[start..end];

        let (s, _, _) = if unicode {
            UTF_16LE.decode(bytes)
        } else {
            SHIFT_JIS.decode(bytes)
        };

        if s.is_empty() {
            continue;
        }

        push_entry(&mut out, inst.address, &s);
    }

    Ok(out)
}

/// Parse the `◆`-marked lines of a bilingual export into the address →
/// replacement map. Any marked line that does not split into a hex key and
/// a non-empty text fails the whole import, as does a repeated key.
pub(super) fn parse_translations(text: &str) -> Result<HashMap<u32, String>, HxbError> {
    let mut translations = HashMap::new();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;

        let Some(rest) = line.strip_prefix(EDIT_MARK) else {
            continue;
        };

        let (key, translated) = rest
            .split_once(EDIT_MARK)
            .ok_or(HxbError::BadImportLine { line: line_no })?;

        if translated.is_empty() {
            return Err(HxbError::BadImportLine { line: line_no });
        }

        let address = u32::from_str_radix(key, 16)
            .map_err(|_| HxbError::BadImportLine { line: line_no })?;

        if translations.insert(address, translated.to_string()).is_some() {
            return Err(HxbError::DuplicateImport {
                address,
                line: line_no,
            });
        }
    }

    Ok(translations)
}
