//! Instruction decoder.
//!
//! Walks the decrypted image from offset 16, driven by the opcode
//! descriptor table, and records one [`Instruct`] per consumed field so
//! that every body byte is accounted for exactly once. Expression operands
//! are decoded by a nested sub-grammar with its own terminator (0xFF) and
//! escape-coded immediate widths.
//!
//! The decoder never interprets the program: operators are recognized by
//! shape only, and the evaluation stack they refer to is never
//! materialized.

use std::io::{self, Write as _};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use encoding_rs::{SHIFT_JIS, UTF_16LE};

use super::opcode::{self, Operand, OpcodeKind};
use super::{HxbError, HEADER_LEN};

/// Classification of one decoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstKind {
    Data,
    Func,
    Addr,
    Nop,
    End,
    ExprLoadNum,
    ExprLoadNum2,
    ExprLoadImmNum,
    ExprLoadStr,
    ExprLoadStr2,
    ExprLoadImmStr,
    ExprMathNeg,
    ExprMathEz,
    ExprMathRand,
    ExprMathSin,
    ExprMathCos,
    ExprMathAtan2,
    ExprMathSqrt,
    ExprCmpEq,
    ExprCmpNe,
    ExprCmpLt,
    ExprCmpLe,
    ExprCmpBt,
    ExprCmpBe,
    ExprAdd,
    ExprSub,
    ExprMul,
    ExprDiv,
    ExprMod,
    ExprAnd,
    ExprOr,
    ExprLand,
    ExprLor,
    ExprMov,
    ExprStoreMov,
    ExprStoreAdd,
    ExprStoreSub,
    ExprStoreMul,
    ExprStoreDiv,
    ExprStoreMod,
    ExprStoreAnd,
    ExprStoreOr,
    ExprEnd,
}

/// One decoded field: where it started, how many bytes it covers, what it
/// is. `new_address` is filled in by the relinking rebuild.
#[derive(Debug, Clone)]
pub struct Instruct {
    pub address: u32,
    pub new_address: u32,
    pub length: u32,
    pub kind: InstKind,
}

/// The complete decode result, in address order.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub insts: Vec<Instruct>,
}

impl Assembly {
    fn add(&mut self, address: u32, length: u32, kind: InstKind) {
        self.insts.push(Instruct {
            address,
            new_address: 0,
            length,
            kind,
        });
    }

    /// Total bytes covered by the recorded instructions.
    pub fn bytes_len(&self) -> usize {
        self.insts.iter().map(|i| i.length as usize).sum()
    }
}

/// A value produced by one expression operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Int(i32),
    Str(String),
}

/// An expression result together with the address it was decoded at.
#[derive(Debug, Clone, PartialEq)]
pub struct EValue {
    pub address: u32,
    pub value: Value,
}

impl EValue {
    pub fn as_int(&self) -> Option<i32> {
        match self.value {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

pub struct Disassembler<'a> {
    data: &'a [u8],
    pos: usize,
    unicode: bool,
    assembly: Assembly,
    text_out: Option<&'a mut dyn io::Write>,
    on_call_script: Option<&'a mut dyn FnMut(&EValue, &[EValue])>,
}

impl<'a> Disassembler<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            unicode: false,
            assembly: Assembly::default(),
            text_out: None,
            on_call_script: None,
        }
    }

    /// Attach a listing sink. Purely diagnostic: the recorded instruction
    /// stream is the same with or without it.
    pub fn with_listing(mut self, w: &'a mut dyn io::Write) -> Self {
        self.text_out = Some(w);
        self
    }

    /// Attach a hook invoked for every `call_script` instruction with the
    /// decoded selector and argument values.
    pub fn with_call_script_hook(mut self, hook: &'a mut dyn FnMut(&EValue, &[EValue])) -> Self {
        self.on_call_script = Some(hook);
        self
    }

    pub fn is_unicode(&self) -> bool {
        self.unicode
    }

    pub fn assembly(&self) -> &Assembly {
        &self.assembly
    }

    pub fn into_assembly(self) -> Assembly {
        self.assembly
    }

    /// Decode the whole stream. Afterwards every body byte is covered by
    /// exactly one instruction; anything else is a fatal decode error.
    pub fn execute(&mut self) -> Result<(), HxbError> {
        if self.data.len() < HEADER_LEN {
            return Err(HxbError::TooSmall(self.data.len()));
        }

        self.unicode = self.data[2] == b'W' && self.data[3] == b'u';
        let debug = self.data[11] != 0;

        if !self.unicode || debug {
            return Err(HxbError::UnsupportedVariant {
                unicode: self.unicode,
                debug,
            });
        }

        self.pos = HEADER_LEN;

        while self.pos < self.data.len() {
            let address = self.pos as u32;
            let code = self.read_u8()?;

            if self.text_out.is_some() {
                match opcode::lookup(code).and_then(|d| d.name) {
                    Some(name) => self.text(address, ">", name)?,
                    None => {
                        let name = format!("func_{code:04x}");
                        self.text(address, ">", &name)?;
                    }
                }
            }

            let desc = opcode::lookup(code).ok_or(HxbError::UnknownOpcode {
                opcode: code,
                address,
            })?;

            match desc.kind {
                OpcodeKind::Nop => self.assembly.add(address, 1, InstKind::Nop),
                OpcodeKind::End => {
                    self.assembly.add(address, 1, InstKind::End);
                    break;
                }
                OpcodeKind::Func(operands) => {
                    self.assembly.add(address, 1, InstKind::Func);

                    let mut values = Vec::new();
                    for operand in operands {
                        match operand {
                            Operand::Expr => values.push(self.expr()?),
                            Operand::ExprList => values.append(&mut self.expr_list()?),
                            Operand::Addr => {
                                self.read_addr()?;
                            }
                            Operand::Byte => {
                                self.read_data_byte()?;
                            }
                            Operand::Word => {
                                self.read_data_word()?;
                            }
                            Operand::AddrTable => {
                                let count = self.read_data_word()?;
                                for _ in 0..count {
                                    self.read_addr()?;
                                }
                            }
                        }
                    }

                    if code == opcode::CALL_SCRIPT {
                        if let Some(hook) = self.on_call_script.as_mut() {
                            if let Some((id, args)) = values.split_first() {
                                hook(id, args);
                            }
                        }
                    }
                }
            }
        }

        if self.pos != self.data.len() {
            return Err(HxbError::LengthMismatch {
                decoded: self.pos,
                expected: self.data.len(),
            });
        }

        let body_len = self.data.len() - HEADER_LEN;
        if self.assembly.bytes_len() != body_len {
            return Err(HxbError::LengthMismatch {
                decoded: self.assembly.bytes_len(),
                expected: body_len,
            });
        }

        Ok(())
    }

    /// Decode one expression operand: a run of expression instructions up
    /// to the 0xFF terminator. The returned value is the last immediate
    /// decoded (nil when the expression ends on an operator or load).
    fn expr(&mut self) -> Result<EValue, HxbError> {
        let mut result_address = 0u32;
        let mut result = Value::Nil;
        let mut lines: Vec<(u32, String)> = Vec::new();
        let listing = self.text_out.is_some();

        while self.pos < self.data.len() {
            let address = self.pos as u32;
            let code = self.read_u8()?;

            if code == 0xFF {
                self.assembly.add(address, 1, InstKind::ExprEnd);
                break;
            }

            let hi = code & 0xF0;
            let lo = code & 0x0F;

            result_address = address;
            result = Value::Nil;

            if code < 0x40 {
                if hi == 0 {
                    // Immediate number, width selected by the low nibble.
                    let value: i32 = if lo >= 0x08 {
                        if lo == 0x0D {
                            self.assembly.add(address, 2, InstKind::ExprLoadImmNum);
                            i32::from(self.read_u8()?)
                        } else if lo == 0x0E {
                            self.assembly.add(address, 3, InstKind::ExprLoadImmNum);
                            i32::from(self.read_i16()?)
                        } else if lo == 0x0F {
                            self.assembly.add(address, 5, InstKind::ExprLoadImmNum);
                            self.read_i32()?
                        } else {
                            self.assembly.add(address, 1, InstKind::ExprLoadImmNum);
                            7 - i32::from(lo)
                        }
                    } else {
                        self.assembly.add(address, 1, InstKind::ExprLoadImmNum);
                        i32::from(lo)
                    };

                    result = Value::Int(value);
                    if listing {
                        lines.push((address, format!("lnum {value:X}h")));
                    }
                } else {
                    // Numeric variable load; the high nibble selects the
                    // address space, the low nibble carries or escapes the
                    // index.
                    let index: i32 = if lo == 0x0E {
                        self.assembly.add(address, 2, InstKind::ExprLoadNum);
                        i32::from(self.read_u8()?)
                    } else if lo == 0x0F {
                        self.assembly.add(address, 3, InstKind::ExprLoadNum);
                        i32::from(self.read_i16()?)
                    } else {
                        self.assembly.add(address, 1, InstKind::ExprLoadNum);
                        i32::from(lo)
                    };

                    if listing {
                        let source = number_variable_source(hi)?;
                        lines.push((address, format!("lnum {source}[{index}]")));
                    }
                }
            } else if hi >= 0x80 {
                if hi == 0x80 {
                    // Immediate string literal, terminated per the stream's
                    // encoding variant.
                    let s = if self.unicode {
                        self.read_unicode_cstr()?
                    } else {
                        self.read_ansi_cstr()?
                    };
                    let length = self.pos as u32 - address;
                    self.assembly.add(address, length, InstKind::ExprLoadImmStr);

                    if listing {
                        lines.push((address, format!("lstr \"{s}\"")));
                    }
                    result = Value::Str(s);
                } else if matches!(hi, 0x90 | 0xA0 | 0xB0) {
                    // String variable load, same index scheme as the
                    // numeric one. The escaped forms record as numeric
                    // loads; the lengths are what round-tripping needs.
                    let index: i32 = if lo == 0x0E {
                        self.assembly.add(address, 2, InstKind::ExprLoadNum);
                        i32::from(self.read_u8()?)
                    } else if lo == 0x0F {
                        self.assembly.add(address, 3, InstKind::ExprLoadNum);
                        i32::from(self.read_i16()?)
                    } else {
                        self.assembly.add(address, 1, InstKind::ExprLoadStr);
                        i32::from(lo)
                    };

                    if listing {
                        let source = string_variable_source(hi)?;
                        lines.push((address, format!("lstr {source}[{index}]")));
                    }
                } else {
                    return Err(HxbError::UnknownExpr {
                        opcode: code,
                        address,
                    });
                }
            } else if hi == 0x70 {
                if lo >= 0x08 {
                    // Variable load indexed by the value on top of the
                    // evaluation stack.
                    if lo > 0x0B {
                        self.assembly.add(address, 1, InstKind::ExprLoadStr2);
                        if listing {
                            let source = string_variable_source(lo - 0x0B)?;
                            lines.push((address, format!("lstr {source}[$R]")));
                        }
                    } else {
                        self.assembly.add(address, 1, InstKind::ExprLoadNum2);
                        if listing {
                            let source = number_variable_source(lo)?;
                            lines.push((address, format!("lnum {source}[$R]")));
                        }
                    }
                } else {
                    let (kind, name) = match lo {
                        0 => (InstKind::ExprMathNeg, "neg"),
                        1 => (InstKind::ExprMathEz, "ez"),
                        2 => (InstKind::ExprMathRand, "rand"),
                        3 => (InstKind::ExprMathSin, "sin"),
                        4 => (InstKind::ExprMathCos, "cos"),
                        5 => (InstKind::ExprMathAtan2, "atan2"),
                        6 => (InstKind::ExprMathSqrt, "sqrt"),
                        _ => {
                            return Err(HxbError::UnknownExpr {
                                opcode: code,
                                address,
                            })
                        }
                    };
                    self.assembly.add(address, 1, kind);
                    if listing {
                        lines.push((address, name.to_string()));
                    }
                }
            } else if hi == 0x50 {
                let (kind, name) = match lo {
                    0x00 => (InstKind::ExprCmpEq, "eq"),
                    0x01 => (InstKind::ExprCmpNe, "ne"),
                    0x02 => (InstKind::ExprCmpLt, "lt"),
                    0x03 => (InstKind::ExprCmpLe, "le"),
                    0x04 => (InstKind::ExprCmpBt, "bt"),
                    0x05 => (InstKind::ExprCmpBe, "be"),
                    _ => {
                        return Err(HxbError::UnknownExpr {
                            opcode: code,
                            address,
                        })
                    }
                };
                self.assembly.add(address, 1, kind);
                if listing {
                    lines.push((address, name.to_string()));
                }
            } else if hi == 0x60 {
                let (kind, name) = match lo {
                    0x00 => (InstKind::ExprAdd, "add"),
                    0x01 => (InstKind::ExprSub, "sub"),
                    0x08 => (InstKind::ExprMul, "mul"),
                    0x09 => (InstKind::ExprDiv, "div"),
                    0x0A => (InstKind::ExprMod, "mod"),
                    0x0B => (InstKind::ExprAnd, "and"),
                    0x0C => (InstKind::ExprOr, "or"),
                    0x0D => (InstKind::ExprLand, "land"),
                    0x0E => (InstKind::ExprLor, "lor"),
                    _ => (InstKind::ExprMov, "mov"),
                };
                self.assembly.add(address, 1, kind);
                if listing {
                    lines.push((address, name.to_string()));
                }
            } else if code & 0x40 != 0 {
                // In-place store operator (compound assignment).
                let (kind, name) = match lo {
                    0 => (InstKind::ExprStoreMov, "$mov"),
                    1 => (InstKind::ExprStoreAdd, "$add"),
                    2 => (InstKind::ExprStoreSub, "$sub"),
                    3 => (InstKind::ExprStoreMul, "$mul"),
                    4 => (InstKind::ExprStoreDiv, "$div"),
                    5 => (InstKind::ExprStoreMod, "$mod"),
                    6 => (InstKind::ExprStoreAnd, "$and"),
                    7 => (InstKind::ExprStoreOr, "$or"),
                    _ => {
                        return Err(HxbError::UnknownExpr {
                            opcode: code,
                            address,
                        })
                    }
                };
                self.assembly.add(address, 1, kind);
                if listing {
                    lines.push((address, name.to_string()));
                }
            } else {
                return Err(HxbError::UnknownExpr {
                    opcode: code,
                    address,
                });
            }
        }

        match lines.len() {
            0 => {}
            1 => self.text(lines[0].0, " ", &lines[0].1)?,
            n => {
                for (i, (address, line)) in lines.iter().enumerate() {
                    let arrow = if i == 0 {
                        "\u{250C}"
                    } else if i == n - 1 {
                        "\u{2514}"
                    } else {
                        "\u{251C}"
                    };
                    self.text(*address, arrow, line)?;
                }
            }
        }

        Ok(EValue {
            address: result_address,
            value: result,
        })
    }

    fn expr_list(&mut self) -> Result<Vec<EValue>, HxbError> {
        let mut result = Vec::with_capacity(16);

        while self.pos < self.data.len() {
            if self.read_data_byte()? == 0 {
                break;
            }
            result.push(self.expr()?);
        }

        Ok(result)
    }

    fn read_u8(&mut self) -> Result<u8, HxbError> {
        match self.data.get(self.pos) {
            Some(&b) => {
                self.pos += 1;
                Ok(b)
            }
            None => Err(HxbError::UnexpectedEof {
                address: self.pos as u32,
            }),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], HxbError> {
        if self.pos + n > self.data.len() {
            return Err(HxbError::UnexpectedEof {
                address: self.pos as u32,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, HxbError> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    fn read_i16(&mut self) -> Result<i16, HxbError> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    fn read_i32(&mut self) -> Result<i32, HxbError> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    fn read_data_byte(&mut self) -> Result<u8, HxbError> {
        self.assembly.add(self.pos as u32, 1, InstKind::Data);
        self.read_u8()
    }

    fn read_data_word(&mut self) -> Result<u16, HxbError> {
        self.assembly.add(self.pos as u32, 2, InstKind::Data);
        self.read_u16()
    }

    fn read_addr(&mut self) -> Result<u32, HxbError> {
        let address = self.pos as u32;
        self.assembly.add(address, 3, InstKind::Addr);
        let target = BigEndian::read_u24(self.take(3)?);

        if self.text_out.is_some() {
            let line = format!("addr {target:08X}");
            self.text(address, "#", &line)?;
        }

        Ok(target)
    }

    /// UTF-16LE code units up to and including the 16-bit terminator.
    fn read_unicode_cstr(&mut self) -> Result<String, HxbError> {
        let start = self.pos;
        loop {
            let unit = LittleEndian::read_u16(self.take(2)?);
            if unit == 0 {
                break;
            }
        }

        let bytes = &self.data[start..self.pos - 2];
        let (s, _, had_errors) = UTF_16LE.decode(bytes);
        if had_errors {
            log::warn!("lossy string literal decode at 0x{:08X}", start);
        }
        Ok(s.into_owned())
    }

    /// Shift-JIS bytes up to and including the byte terminator.
    fn read_ansi_cstr(&mut self) -> Result<String, HxbError> {
        let start = self.pos;
        while self.read_u8()? != 0 {}

        let bytes = &self.data[start..self.pos - 1];
        let (s, _, had_errors) = SHIFT_JIS.decode(bytes);
        if had_errors {
            log::warn!("lossy string literal decode at 0x{:08X}", start);
        }
        Ok(s.into_owned())
    }

    fn text(&mut self, address: u32, arrow: &str, text: &str) -> Result<(), HxbError> {
        if let Some(w) = self.text_out.as_mut() {
            writeln!(w, "{address:08X} {arrow} {text}")?;
        }
        Ok(())
    }
}

fn number_variable_source(id: u8) -> Result<&'static str, HxbError> {
    match id {
        0x08 | 0x10 => Ok("S:"),
        0x09 | 0x20 => Ok("P:"),
        0x0A | 0x30 => Ok("G:"),
        _ => Err(HxbError::BadNumSource(id)),
    }
}

fn string_variable_source(id: u8) -> Result<&'static str, HxbError> {
    match id {
        0x01 | 0x90 => Ok("S:"),
        0x02 | 0xA0 => Ok("P:"),
        0x03 | 0xB0 => Ok("G:"),
        _ => Err(HxbError::BadStrSource(id)),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_util::{plain_image, utf16z};

    fn decode(body: &[u8]) -> Result<Assembly, HxbError> {
        let image = plain_image(body);
        let mut disasm = Disassembler::new(&image);
        disasm.execute()?;
        Ok(disasm.into_assembly())
    }

    fn kinds(body: &[u8]) -> Vec<InstKind> {
        decode(body).unwrap().insts.iter().map(|i| i.kind).collect()
    }

    /// Decode a `call_script` body and capture what the hook sees.
    fn call_script_values(body: &[u8]) -> (EValue, Vec<EValue>) {
        let image = plain_image(body);
        let mut captured = None;
        {
            let mut hook = |id: &EValue, args: &[EValue]| {
                captured = Some((id.clone(), args.to_vec()));
            };
            let mut disasm = Disassembler::new(&image).with_call_script_hook(&mut hook);
            disasm.execute().unwrap();
        }
        captured.expect("call_script hook not invoked")
    }

    #[test]
    fn nibble_number_literals() {
        for (byte, expected) in [
            (0x00u8, 0),
            (0x03, 3),
            (0x07, 7),
            (0x08, -1),
            (0x0A, -3),
            (0x0C, -5),
        ] {
            let body = [0x03, byte, 0xFF, 0x00, 0xFF];
            let (id, args) = call_script_values(&body);
            assert_eq!(id.value, Value::Int(expected), "byte 0x{byte:02X}");
            assert!(args.is_empty());
        }
    }

    #[test]
    fn escaped_number_literals() {
        // 0x0D: unsigned byte follows
        let (id, _) = call_script_values(&[0x03, 0x0D, 0xFE, 0xFF, 0x00, 0xFF]);
        assert_eq!(id.value, Value::Int(254));

        // 0x0E: signed big-endian word follows
        let (id, _) = call_script_values(&[0x03, 0x0E, 0xFF, 0x38, 0xFF, 0x00, 0xFF]);
        assert_eq!(id.value, Value::Int(-200));

        // 0x0F: signed big-endian dword follows
        let (id, _) =
            call_script_values(&[0x03, 0x0F, 0xFF, 0xFF, 0xFE, 0x00, 0xFF, 0x00, 0xFF]);
        assert_eq!(id.value, Value::Int(-512));
    }

    #[test]
    fn string_literal_value_and_address() {
        let mut body = vec![0x03, 0x80];
        body.extend_from_slice(&utf16z("Hi"));
        body.extend_from_slice(&[0xFF, 0x00, 0xFF]);

        let (id, _) = call_script_values(&body);
        assert_eq!(id.value, Value::Str("Hi".to_string()));
        assert_eq!(id.address, HEADER_LEN as u32 + 1);
    }

    #[test]
    fn expression_list_arguments() {
        // call_script 0x36("Yo", 1)
        let mut body = vec![0x03, 0x0D, 0x36, 0xFF, 0x01, 0x80];
        body.extend_from_slice(&utf16z("Yo"));
        body.extend_from_slice(&[0xFF, 0x01, 0x01, 0xFF, 0x00, 0xFF]);

        let (id, args) = call_script_values(&body);
        assert_eq!(id.value, Value::Int(0x36));
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].value, Value::Str("Yo".to_string()));
        assert_eq!(args[1].value, Value::Int(1));
    }

    #[test]
    fn decode_accounts_for_every_byte() {
        let mut body = vec![0x00, 0x01, 0x02, 0x60, 0xFF];
        body.extend_from_slice(&[0x29, 0x00, 0x00, 0x16]);
        body.push(0xFF);

        let assembly = decode(&body).unwrap();
        assert_eq!(assembly.bytes_len(), body.len());

        let mut cursor = HEADER_LEN as u32;
        for inst in &assembly.insts {
            assert_eq!(inst.address, cursor);
            cursor += inst.length;
        }
        assert_eq!(cursor as usize, HEADER_LEN + body.len());
    }

    #[test]
    fn operator_expression_kinds() {
        let kinds = kinds(&[0x00, 0x01, 0x02, 0x60, 0xFF, 0xFF]);
        assert_eq!(
            kinds,
            [
                InstKind::Func,
                InstKind::ExprLoadImmNum,
                InstKind::ExprLoadImmNum,
                InstKind::ExprAdd,
                InstKind::ExprEnd,
                InstKind::End
            ]
        );
    }

    #[test]
    fn switch_jump_table() {
        let body = [
            0x2A, 0x00, 0xFF, // case index expression
            0x00, 0x02, // table size
            0x00, 0x00, 0x10, 0x00, 0x00, 0x10, // two targets
            0xFF,
        ];
        assert_eq!(
            kinds(&body),
            [
                InstKind::Func,
                InstKind::ExprLoadImmNum,
                InstKind::ExprEnd,
                InstKind::Data,
                InstKind::Addr,
                InstKind::Addr,
                InstKind::End
            ]
        );
    }

    #[test]
    fn nop_opcodes() {
        let body = [0x30, 0x63, 0x67, 0x68, 0x69, 0x6B, 0x6F, 0x70, 0xFF];
        let kinds = kinds(&body);
        assert_eq!(kinds.len(), 9);
        assert!(kinds[..8].iter().all(|&k| k == InstKind::Nop));
        assert_eq!(kinds[8], InstKind::End);
    }

    #[test]
    fn variable_loads_and_stores() {
        // S:[3] += G:[0x1234]
        let body = [0x00, 0x13, 0x3F, 0x12, 0x34, 0x41, 0xFF, 0xFF];
        assert_eq!(
            kinds(&body),
            [
                InstKind::Func,
                InstKind::ExprLoadNum,
                InstKind::ExprLoadNum,
                InstKind::ExprStoreAdd,
                InstKind::ExprEnd,
                InstKind::End
            ]
        );
    }

    #[test]
    fn stack_indexed_loads() {
        let body = [0x00, 0x78, 0x7C, 0xFF, 0xFF];
        assert_eq!(
            kinds(&body),
            [
                InstKind::Func,
                InstKind::ExprLoadNum2,
                InstKind::ExprLoadStr2,
                InstKind::ExprEnd,
                InstKind::End
            ]
        );
    }

    #[test]
    fn unknown_function_opcode() {
        let err = decode(&[0x7E, 0xFF]).unwrap_err();
        assert!(matches!(
            err,
            HxbError::UnknownOpcode {
                opcode: 0x7E,
                address: 16
            }
        ));
    }

    #[test]
    fn unknown_expression_byte() {
        let err = decode(&[0x00, 0xC3, 0xFF, 0xFF]).unwrap_err();
        assert!(matches!(
            err,
            HxbError::UnknownExpr {
                opcode: 0xC3,
                address: 17
            }
        ));
    }

    #[test]
    fn invalid_store_selector() {
        let err = decode(&[0x00, 0x48, 0xFF, 0xFF]).unwrap_err();
        assert!(matches!(err, HxbError::UnknownExpr { opcode: 0x48, .. }));
    }

    #[test]
    fn invalid_math_selector() {
        let err = decode(&[0x00, 0x77, 0xFF, 0xFF]).unwrap_err();
        assert!(matches!(err, HxbError::UnknownExpr { opcode: 0x77, .. }));
    }

    #[test]
    fn trailing_bytes_after_end() {
        let err = decode(&[0xFF, 0x30]).unwrap_err();
        assert!(matches!(
            err,
            HxbError::LengthMismatch {
                decoded: 17,
                expected: 18
            }
        ));
    }

    #[test]
    fn truncated_immediate() {
        let err = decode(&[0x00, 0x0F, 0x01]).unwrap_err();
        assert!(matches!(err, HxbError::UnexpectedEof { .. }));
    }

    #[test]
    fn rejects_non_unicode_variant() {
        let mut image = plain_image(&[0xFF]);
        image[3] = 0;
        let mut disasm = Disassembler::new(&image);
        assert!(matches!(
            disasm.execute(),
            Err(HxbError::UnsupportedVariant {
                unicode: false,
                debug: false
            })
        ));
    }

    #[test]
    fn rejects_debug_variant() {
        let mut image = plain_image(&[0xFF]);
        image[11] = 1;
        let mut disasm = Disassembler::new(&image);
        assert!(matches!(
            disasm.execute(),
            Err(HxbError::UnsupportedVariant {
                unicode: true,
                debug: true
            })
        ));
    }

    #[test]
    fn listing_format() {
        let body = [0x29, 0x00, 0x00, 0x14, 0xFF];
        let image = plain_image(&body);
        let mut buf = Vec::new();
        {
            let mut disasm = Disassembler::new(&image).with_listing(&mut buf);
            disasm.execute().unwrap();
        }
        let listing = String::from_utf8(buf).unwrap();
        assert_eq!(
            listing,
            "00000010 > jmp\n00000011 # addr 00000014\n00000014 > end\n"
        );
    }

    #[test]
    fn listing_expression_tree() {
        let body = [0x00, 0x01, 0x02, 0x60, 0xFF, 0x00, 0x05, 0xFF, 0xFF];
        let image = plain_image(&body);
        let mut buf = Vec::new();
        {
            let mut disasm = Disassembler::new(&image).with_listing(&mut buf);
            disasm.execute().unwrap();
        }
        let listing = String::from_utf8(buf).unwrap();
        assert_eq!(
            listing,
            concat!(
                "00000010 > expr\n",
                "00000011 \u{250C} lnum 1h\n",
                "00000012 \u{251C} lnum 2h\n",
                "00000013 \u{2514} add\n",
                "00000015 > expr\n",
                "00000016   lnum 5h\n",
                "00000018 > end\n"
            )
        );
    }
}
