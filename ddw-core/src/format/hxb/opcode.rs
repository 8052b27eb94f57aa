//! Top-level opcode descriptors.
//!
//! The engine defines 126 function opcodes (0x00..=0x7D) plus the stream
//! terminator 0xFF. Each descriptor lists the exact operand sequence the
//! decoder must consume after the opcode byte; eight codes are one-byte
//! no-ops. These signatures are fixed knowledge of the on-disk format and
//! are kept as plain data.

use lazy_static::lazy_static;

/// One operand-reading primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Nested expression, terminated by 0xFF.
    Expr,
    /// Length-prefixed run of expressions: a nonzero byte announces one more
    /// expression, a zero byte ends the list.
    ExprList,
    /// 3-byte big-endian absolute jump/call target.
    Addr,
    /// 1 data byte.
    Byte,
    /// 2 data bytes, big-endian.
    Word,
    /// Switch table: a big-endian word count followed by that many `Addr`s.
    AddrTable,
}

#[derive(Debug, Clone, Copy)]
pub enum OpcodeKind {
    Func(&'static [Operand]),
    Nop,
    End,
}

#[derive(Debug, Clone, Copy)]
pub struct OpcodeDesc {
    pub name: Option<&'static str>,
    pub kind: OpcodeKind,
}

/// `call_script`: the opcode whose decoded selector/arguments are surfaced
/// through the disassembler hook.
pub const CALL_SCRIPT: u8 = 0x03;

pub fn lookup(code: u8) -> Option<&'static OpcodeDesc> {
    TABLE[code as usize].as_ref()
}

lazy_static! {
    static ref TABLE: [Option<OpcodeDesc>; 256] = build_table();
}

use self::Operand::{Addr, AddrTable, Byte, Expr, ExprList};

const E1: &[Operand] = &[Expr];
const E2: &[Operand] = &[Expr, Expr];
const E3: &[Operand] = &[Expr, Expr, Expr];
const E4: &[Operand] = &[Expr, Expr, Expr, Expr];
const E5: &[Operand] = &[Expr, Expr, Expr, Expr, Expr];
const E6: &[Operand] = &[Expr, Expr, Expr, Expr, Expr, Expr];
const E7: &[Operand] = &[Expr, Expr, Expr, Expr, Expr, Expr, Expr];
const E8: &[Operand] = &[Expr, Expr, Expr, Expr, Expr, Expr, Expr, Expr];

fn func(name: &'static str, operands: &'static [Operand]) -> Option<OpcodeDesc> {
    Some(OpcodeDesc {
        name: Some(name),
        kind: OpcodeKind::Func(operands),
    })
}

fn anon(operands: &'static [Operand]) -> Option<OpcodeDesc> {
    Some(OpcodeDesc {
        name: None,
        kind: OpcodeKind::Func(operands),
    })
}

fn nop() -> Option<OpcodeDesc> {
    Some(OpcodeDesc {
        name: Some("nop"),
        kind: OpcodeKind::Nop,
    })
}

fn build_table() -> [Option<OpcodeDesc>; 256] {
    let mut t: [Option<OpcodeDesc>; 256] = [None; 256];

    t[0x00] = func("expr", E1);
    t[0x01] = func("create_buffer", E2);
    t[0x02] = func("call", &[ExprList, Addr]);
    t[0x03] = func("call_script", &[Expr, ExprList]);
    t[0x04] = anon(E2);
    t[0x05] = anon(E1);
    t[0x06] = func("call_script_file", &[Expr, Expr, Expr, ExprList]);
    t[0x07] = anon(E1);
    t[0x08] = func("set_clipboard_text", E1);
    t[0x09] = func("get_sound_status", E1);
    t[0x0A] = func("get_video_status", &[]);
    t[0x0B] = func("set_imm_window_open", E1);
    t[0x0C] = anon(E2);
    t[0x0D] = func("copy_buffer", E3);
    t[0x0E] = anon(&[
        Expr, Expr, Expr, Expr, Expr, Expr, Expr, Expr, Expr, Expr, Expr,
    ]);
    t[0x0F] = anon(E4);
    t[0x10] = func("create_font", &[Expr, Expr, Expr, Expr, Expr, Expr, Expr, Expr, Expr]);
    t[0x11] = anon(E5);
    t[0x12] = anon(E5);
    t[0x13] = func("dlg_action", E2);
    t[0x14] = anon(E3);
    t[0x15] = anon(E8);
    t[0x16] = anon(&[
        Expr, Expr, Expr, Expr, Expr, Expr, Expr, Expr, Expr, Expr, Expr, Expr,
    ]);
    t[0x17] = anon(E8);
    t[0x18] = anon(E3);
    t[0x19] = func("end_script", E1);
    t[0x1A] = func("get_font_list", E1);
    t[0x1B] = func("free_object", E1);
    t[0x1C] = func("buf_read_byte", E2);
    t[0x1D] = anon(E1);
    t[0x1E] = anon(&[]);
    t[0x1F] = anon(E2);
    t[0x20] = anon(&[]);
    t[0x21] = anon(&[]);
    t[0x22] = func("get_local_time", &[]);
    t[0x23] = func("get_os_info", E1);
    t[0x24] = func("get_special_folder", E1);
    t[0x25] = func("get_time", E1);
    t[0x26] = func("jmp_if_true", &[Expr, Addr]);
    t[0x27] = func("jmp_if_false", &[Expr, Addr]);
    t[0x28] = func("jmp_boolean", &[Expr, Addr, Addr]);
    t[0x29] = func("jmp", &[Addr]);
    t[0x2A] = func("jmp_switch", &[Expr, AddrTable]);
    t[0x2B] = func("load_file", E1);
    t[0x2C] = func("load_object", E4);
    t[0x2D] = func("load_sound", E4);
    t[0x2E] = anon(E3);
    t[0x2F] = func("set_window_pos", E3);
    t[0x30] = nop();
    t[0x31] = func("play_sound", E5);
    t[0x32] = func("play_movie", E6);
    t[0x33] = anon(E1);
    t[0x34] = anon(E1);
    t[0x35] = anon(E2);
    t[0x36] = anon(&[Expr, Byte, Expr]);
    t[0x37] = func("reg_query_value", E1);
    t[0x38] = anon(E2);
    t[0x39] = anon(&[]);
    t[0x3A] = anon(E3);
    t[0x3B] = anon(E3);
    t[0x3C] = func("ret", E1);
    t[0x3D] = anon(E1);
    t[0x3E] = func("dump_object", &[Expr, Expr, ExprList]);
    t[0x3F] = func("get_input_state", &[]);
    t[0x40] = func("set_full_screen", E1);
    t[0x41] = func("get_drive_path", E2);
    t[0x42] = func("reg_set_path", E2);
    t[0x43] = anon(E2);
    t[0x44] = func("buf_write_byte", E3);
    t[0x45] = func("copy_string", E3);
    t[0x46] = anon(E2);
    t[0x47] = func("imm_set_composition_window_pos", E2);
    t[0x48] = anon(E4);
    t[0x49] = func("set_cursor_pos", E2);
    t[0x4A] = anon(E2);
    t[0x4B] = func("snd_set_volume", E3);
    t[0x4C] = func("clear_global", E3);
    t[0x4D] = func("shell_execute", E3);
    t[0x4E] = func("show_window", E2);
    t[0x4F] = func("sleep", E1);
    t[0x50] = func("stop_sound", E3);
    t[0x51] = func("stop_movie", &[]);
    t[0x52] = func("glb_strcat", E2);
    t[0x53] = func("strcmp", E2);
    t[0x54] = func("set_glb_string", E2);
    t[0x55] = func("str_find_ch", E4);
    t[0x56] = func("eval_str_expr", E2);
    t[0x57] = func("strlen", E1);
    t[0x58] = anon(E2);
    t[0x59] = anon(E4);
    t[0x5A] = func("get_text_width", E2);
    t[0x5B] = anon(E6);
    t[0x5C] = anon(E1);
    t[0x5D] = anon(&[]);
    t[0x5E] = func("reg_write", &[Expr, Byte, Expr]);
    t[0x5F] = anon(E3);
    t[0x60] = anon(E5);
    t[0x61] = func("load_dll", E2);
    t[0x62] = func("set_game_title", E1);
    t[0x63] = nop();
    t[0x64] = func("delete_file", E2);
    t[0x65] = anon(E2);
    t[0x66] = func("load_image", E4);
    t[0x67] = nop();
    t[0x68] = nop();
    t[0x69] = nop();
    t[0x6A] = anon(&[ExprList]);
    t[0x6B] = nop();
    t[0x6C] = anon(E2);
    t[0x6D] = func("create_edit_window", E7);
    t[0x6E] = func("snd_set_volume", E2);
    t[0x6F] = nop();
    t[0x70] = nop();
    t[0x71] = anon(&[Expr, Expr, Expr, Byte, Expr]);
    t[0x72] = func("show_dialog", E1);
    t[0x73] = func("show_menu", &[Expr, Expr, ExprList]);
    t[0x74] = func("convert_str_case", E2);
    t[0x75] = anon(E3);
    t[0x76] = anon(E7);
    t[0x77] = anon(E3);
    t[0x78] = anon(E2);
    t[0x79] = anon(E2);
    t[0x7A] = anon(E3);
    t[0x7B] = func("copy_file", E2);
    t[0x7C] = anon(E4);
    t[0x7D] = anon(&[]);
    t[0xFF] = Some(OpcodeDesc {
        name: Some("end"),
        kind: OpcodeKind::End,
    });

    t
}
