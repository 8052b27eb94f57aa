//! Relinking rebuild.
//!
//! Two passes over a decoded stream. The first re-emits every instruction
//! in address order, substituting translated string literals and recording
//! where each instruction landed. The second rewrites every 3-byte address
//! operand to the new location of its original target, which keeps jumps
//! and calls intact when literals change size. Finally the header's 24-bit
//! size field is patched to the new total.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder};

use super::{Assembly, HxbError, InstKind, HEADER_LEN, OP_IMM_STR};

/// Rebuild the image, substituting `translations` (original literal
/// address → replacement text). Replacement literals are always emitted in
/// the unicode form. Returns the new image; `assembly` keeps the recorded
/// new addresses.
pub(super) fn relink(
    data: &[u8],
    assembly: &mut Assembly,
    translations: &HashMap<u32, String>,
) -> Result<Vec<u8>, HxbError> {
    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(&data[..HEADER_LEN]);

    for inst in &mut assembly.insts {
        inst.new_address = out.len() as u32;

        match translations.get(&inst.address) {
            Some(replacement) if inst.kind == InstKind::ExprLoadImmStr => {
                out.push(OP_IMM_STR);
                for unit in replacement.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
                out.extend_from_slice(&[0, 0]);
            }
            _ => {
                let start = inst.address as usize;
                out.extend_from_slice(&data[start..start + inst.length as usize]);
            }
        }
    }

    let new_by_addr: HashMap<u32, u32> = assembly
        .insts
        .iter()
        .map(|inst| (inst.address, inst.new_address))
        .collect();

    for inst in &assembly.insts {
        if inst.kind != InstKind::Addr {
            continue;
        }

        let target = BigEndian::read_u24(&data[inst.address as usize..][..3]);
        let new_target = *new_by_addr
            .get(&target)
            .ok_or(HxbError::DanglingJump { target })?;

        BigEndian::write_u24(&mut out[inst.new_address as usize..][..3], new_target);
    }

    if out.len() > 0x00FF_FFFF {
        return Err(HxbError::TooLarge(out.len()));
    }
    let total_len = out.len() as u32;
    BigEndian::write_u24(&mut out[8..11], total_len);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::{Disassembler, Script};
    use super::*;
    use crate::test_util::{make_script, plain_image, utf16z};

    fn decode(image: &[u8]) -> Assembly {
        let mut disasm = Disassembler::new(image);
        disasm.execute().unwrap();
        disasm.into_assembly()
    }

    /// expr "Hi"; jmp end; end. The jump target sits after the literal.
    fn jumping_body() -> Vec<u8> {
        let mut body = vec![0x00, 0x82];
        body.extend_from_slice(&utf16z("Hi"));
        body.push(0xFF); // end of expression, at 24
        body.extend_from_slice(&[0x29, 0x00, 0x00, 0x1D]); // jmp 29
        body.push(0xFF); // end, at 29
        body
    }

    #[test]
    fn empty_translation_map_reproduces_the_image() {
        let image = plain_image(&jumping_body());
        let mut assembly = decode(&image);

        let out = relink(&image, &mut assembly, &HashMap::new()).unwrap();

        assert_eq!(out, image);
        for inst in &assembly.insts {
            assert_eq!(inst.new_address, inst.address);
        }
    }

    #[test]
    fn growing_literal_relocates_the_jump() {
        let image = plain_image(&jumping_body());
        let mut assembly = decode(&image);

        let mut translations = HashMap::new();
        translations.insert(17u32, "Bonjour".to_string());

        let out = relink(&image, &mut assembly, &translations).unwrap();

        // "Bonjour" is 10 bytes longer than "Hi"; everything after the
        // literal shifts by that much.
        assert_eq!(out.len(), image.len() + 10);

        // The literal is re-emitted with the plain immediate-string opcode.
        assert_eq!(out[17], 0x80);
        assert_eq!(out[18..34], utf16z("Bonjour")[..]);

        // The jump operand now points at the shifted end instruction.
        assert_eq!(out[34], 0xFF);
        assert_eq!(out[35], 0x29);
        assert_eq!(BigEndian::read_u24(&out[36..39]), 39);
        assert_eq!(out[39], 0xFF);

        // Header size field covers the new total.
        assert_eq!(BigEndian::read_u24(&out[8..11]), out.len() as u32);
    }

    #[test]
    fn rebuilt_image_decodes_cleanly() {
        let image = plain_image(&jumping_body());
        let mut assembly = decode(&image);

        let mut translations = HashMap::new();
        translations.insert(17u32, "Bonjour".to_string());

        let out = relink(&image, &mut assembly, &translations).unwrap();
        let reassembly = decode(&out);
        assert_eq!(reassembly.bytes_len(), out.len() - HEADER_LEN);
    }

    #[test]
    fn jump_into_split_instruction_fails() {
        // The jump lands inside its own address operand.
        let body = [0x29, 0x00, 0x00, 0x12, 0xFF];
        let image = plain_image(&body);
        let mut assembly = decode(&image);

        let err = relink(&image, &mut assembly, &HashMap::new()).unwrap_err();
        assert!(matches!(err, HxbError::DanglingJump { target: 0x12 }));
    }

    #[test]
    fn import_through_the_script_handle() {
        let raw = make_script(&jumping_body());
        let mut script = Script::from_bytes(&raw).unwrap();

        let exported = script.export_all_strings().unwrap();
        assert!(exported.contains("\u{25C6}00000011\u{25C6}Hi"));

        let translated = exported.replace("\u{25C6}00000011\u{25C6}Hi", "\u{25C6}00000011\u{25C6}Bonjour");
        script.import_strings(&translated).unwrap();

        let reexported = script.export_all_strings().unwrap();
        assert!(reexported.contains("\u{25C6}00000011\u{25C6}Bonjour"));

        // A save/load round trip of the re-encrypted image still decodes.
        let reloaded = Script::from_bytes(&script.to_bytes().unwrap()).unwrap();
        assert_eq!(reloaded.bytes(), script.bytes());
    }

    #[test]
    fn failed_import_leaves_the_image_untouched() {
        let raw = make_script(&jumping_body());
        let mut script = Script::from_bytes(&raw).unwrap();
        let before = script.bytes().to_vec();

        let err = script.import_strings("\u{25C6}0011 broken").unwrap_err();
        assert!(matches!(err, HxbError::BadImportLine { line: 1 }));
        assert_eq!(script.bytes(), &before[..]);
    }
}
