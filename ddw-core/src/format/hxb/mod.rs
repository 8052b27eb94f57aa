//! HXB script container.
//!
//! An `.hxb` file is a 16-byte header followed by an XOR-encrypted bytecode
//! body. The header carries an 8-byte magic, a 24-bit big-endian total-size
//! field at offset 8, the encoding variant at bytes 2..4 (`"Wu"` marks the
//! unicode variant) and a debug flag at byte 11. Only the unicode,
//! non-debug variant is supported.
//!
//! [`Script`] owns the decrypted image and exposes the operations built on
//! top of it: disassembly listing, bilingual string export and the
//! translation-substituting rebuild that relinks every jump target.

pub(crate) mod crypt;
mod disasm;
pub mod opcode;
mod rebuild;
mod text;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub use disasm::{Assembly, Disassembler, EValue, InstKind, Instruct, Value};

/// `"DDWuHXB\0"` as a little-endian u64.
pub const MAGIC: u64 = 0x0042_5848_7557_4444;

pub const HEADER_LEN: usize = 16;

/// Expression opcode emitted for every substituted string literal.
pub(crate) const OP_IMM_STR: u8 = 0x80;

#[derive(thiserror::Error, Debug)]
pub enum HxbError {
    #[error("not enough bytes for a script header: {0}")]
    TooSmall(usize),

    #[error("wrong magic number")]
    BadMagic,

    #[error("declared size {declared} does not match data length {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    #[error("unsupported script variant (unicode={unicode}, debug={debug})")]
    UnsupportedVariant { unicode: bool, debug: bool },

    #[error("unknown function instruction 0x{opcode:02X} at 0x{address:08X}")]
    UnknownOpcode { opcode: u8, address: u32 },

    #[error("unknown expression instruction 0x{opcode:02X} at 0x{address:08X}")]
    UnknownExpr { opcode: u8, address: u32 },

    #[error("unexpected end of stream at 0x{address:08X}")]
    UnexpectedEof { address: u32 },

    #[error("decode did not cover the stream exactly: {decoded} != {expected}")]
    LengthMismatch { decoded: usize, expected: usize },

    #[error("bad number variable source 0x{0:02X}")]
    BadNumSource(u8),

    #[error("bad string variable source 0x{0:02X}")]
    BadStrSource(u8),

    #[error("bad translation entry at line {line}")]
    BadImportLine { line: usize },

    #[error("duplicate translation entry for 0x{address:08X} at line {line}")]
    DuplicateImport { address: u32, line: usize },

    #[error("jump target 0x{target:08X} is not an instruction start")]
    DanglingJump { target: u32 },

    #[error("rebuilt script does not fit a 24-bit size field: {0} bytes")]
    TooLarge(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One loaded script file, held in decrypted form.
#[derive(Debug, Clone)]
pub struct Script {
    data: Vec<u8>,
}

impl Script {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        Ok(Self {
            data: crypt::decrypt(&raw)?,
        })
    }

    /// Build a script from the raw (encrypted) file image.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, HxbError> {
        Ok(Self {
            data: crypt::decrypt(raw)?,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let raw = self.to_bytes()?;
        fs::write(path, raw).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Re-encrypt the current image. The XOR transform is its own inverse,
    /// so this is the same operation as decryption.
    pub fn to_bytes(&self) -> Result<Vec<u8>, HxbError> {
        crypt::decrypt(&self.data)
    }

    /// The decrypted image, header included.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Decode the whole script and return a human-readable listing.
    pub fn disassembly_listing(&self) -> Result<String, HxbError> {
        let mut buf = Vec::new();
        {
            let mut disasm = Disassembler::new(&self.data).with_listing(&mut buf);
            disasm.execute()?;
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Export the dialogue strings passed to the script-call instruction.
    pub fn export_strings(&self) -> Result<String, HxbError> {
        text::export_script_strings(&self.data)
    }

    /// Export every string literal in the script.
    pub fn export_all_strings(&self) -> Result<String, HxbError> {
        text::export_all_strings(&self.data)
    }

    /// Substitute translations from a bilingual text export and relink the
    /// script. On success the in-memory image is replaced; on any error it
    /// is left untouched.
    pub fn import_strings(&mut self, translation_text: &str) -> Result<(), HxbError> {
        let translations = text::parse_translations(translation_text)?;

        let mut disasm = Disassembler::new(&self.data);
        disasm.execute()?;
        let mut assembly = disasm.into_assembly();

        self.data = rebuild::relink(&self.data, &mut assembly, &translations)?;
        Ok(())
    }
}
