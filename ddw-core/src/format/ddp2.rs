//! DDP2 archives: a flat index of anonymous entries.
//!
//! Layout (all fields little-endian): `"DDP2"`, entry count, index size,
//! five reserved dwords, then 16-byte entries of (offset, size,
//! compressed_size, flags). Entries with a nonzero compressed size are
//! DDLZ-compressed.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use super::{ddlz, sniff};

pub const MAGIC: u32 = 0x3250_4444; // "DDP2"

const HEADER_LEN: usize = 32;
const ENTRY_LEN: usize = 16;

#[derive(Debug, Clone, Copy)]
struct Entry {
    offset: u32,
    size: u32,
    compressed_size: u32,
    #[allow(dead_code)]
    flags: u32,
}

fn read_u32_le(data: &[u8], off: &mut usize) -> Result<u32> {
    if *off + 4 > data.len() {
        bail!("unexpected EOF while reading u32 at {}", off);
    }
    let v = u32::from_le_bytes([data[*off], data[*off + 1], data[*off + 2], data[*off + 3]]);
    *off += 4;
    Ok(v)
}

pub fn valid(path: impl AsRef<Path>) -> Result<bool> {
    let mut magic = [0u8; 4];
    let mut file = fs::File::open(path.as_ref())?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(u32::from_le_bytes(magic) == MAGIC),
        Err(_) => Ok(false),
    }
}

fn parse_index(data: &[u8]) -> Result<Vec<Entry>> {
    let mut off = 0usize;

    if read_u32_le(data, &mut off)? != MAGIC {
        bail!("not a valid DDP2 file");
    }

    let count = read_u32_le(data, &mut off)? as usize;

    // index size plus five reserved dwords
    off += 6 * 4;

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(Entry {
            offset: read_u32_le(data, &mut off)?,
            size: read_u32_le(data, &mut off)?,
            compressed_size: read_u32_le(data, &mut off)?,
            flags: read_u32_le(data, &mut off)?,
        });
    }

    Ok(entries)
}

pub(crate) fn read_entry_payload(
    data: &[u8],
    offset: u32,
    size: u32,
    compressed_size: u32,
) -> Result<Vec<u8>> {
    let offset = offset as usize;

    if compressed_size != 0 {
        let compressed_size = compressed_size as usize;
        if offset + compressed_size > data.len() {
            bail!("entry data out of range");
        }
        return ddlz::decompress(&data[offset..offset + compressed_size], size as usize);
    }

    let size = size as usize;
    if offset + size > data.len() {
        bail!("entry data out of range");
    }
    Ok(data[offset..offset + size].to_vec())
}

pub fn extract(path: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let data = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let entries = parse_index(&data)?;

    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)?;

    for (i, entry) in entries.iter().enumerate() {
        log::info!("extract {:08}", i);

        let payload = read_entry_payload(&data, entry.offset, entry.size, entry.compressed_size)?;
        let name = sniff::auto_file_name(&payload, format!("{i:08}"));
        fs::write(output_dir.join(name), payload)?;
    }

    Ok(())
}

fn package_files(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for item in fs::read_dir(root.as_ref())? {
        let item = item?;
        if !item.file_type()?.is_file() || item.metadata()?.len() == 0 {
            continue;
        }
        files.push(item.path());
    }

    // entry order is the file-stem order
    files.sort_by_key(|p| {
        p.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    Ok(files)
}

/// Pack every non-empty file of `root` into a new archive. Entries are
/// stored uncompressed.
pub fn create(path: impl AsRef<Path>, root: impl AsRef<Path>) -> Result<()> {
    let files = package_files(root)?;
    if files.is_empty() {
        return Ok(());
    }

    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&(files.len() as u32).to_le_bytes());
    out.extend_from_slice(&((HEADER_LEN + files.len() * ENTRY_LEN) as u32).to_le_bytes());
    out.extend_from_slice(&[0u8; 5 * 4]);

    let index_pos = out.len();
    out.resize(out.len() + files.len() * ENTRY_LEN, 0);

    for (i, file) in files.iter().enumerate() {
        log::info!("add {:08} {}", i, file.display());

        let data = fs::read(file).with_context(|| format!("read {}", file.display()))?;

        let slot = index_pos + i * ENTRY_LEN;
        let offset = out.len() as u32;
        out[slot..slot + 4].copy_from_slice(&offset.to_le_bytes());
        out[slot + 4..slot + 8].copy_from_slice(&(data.len() as u32).to_le_bytes());

        out.extend_from_slice(&data);
    }

    let path = path.as_ref();
    fs::write(path, out).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn temp_root(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ddw-ddp2-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn create_then_extract_round_trips() {
        let root = temp_root("roundtrip");
        let input = root.join("input");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("0000.bin"), b"first entry").unwrap();
        fs::write(input.join("0001.bin"), b"second entry").unwrap();
        fs::write(input.join("empty.bin"), b"").unwrap();

        let archive = root.join("package.dat");
        create(&archive, &input).unwrap();
        assert!(valid(&archive).unwrap());

        let output = root.join("output");
        extract(&archive, &output).unwrap();

        assert_eq!(fs::read(output.join("00000000")).unwrap(), b"first entry");
        assert_eq!(fs::read(output.join("00000001")).unwrap(), b"second entry");
        assert!(!output.join("00000002").exists());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn rejects_wrong_magic() {
        assert!(parse_index(b"DDP3\0\0\0\0").is_err());
    }
}
