//! DDP3 archives: named entries in a hash-bucketed index.
//!
//! Layout (all fields little-endian): `"DDP3"`, bucket count, header size,
//! five reserved dwords, then the bucket index of (hash, offset) pairs.
//! Each bucket body is a run of size-prefixed entries (u8 total size,
//! (offset, size, compressed_size, flags) dwords and a UTF-16LE
//! null-terminated name) closed by a zero byte. The engine locates an
//! entry by hashing its name into a bucket and scanning that bucket only.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use super::ddp2::read_entry_payload;
use super::sniff;

pub const MAGIC: u32 = 0x3350_4444; // "DDP3"

const HEADER_LEN: usize = 32;

/// Longest entry name that still fits the u8 entry-size prefix.
const MAX_NAME_LEN: usize = 118;

#[derive(Debug, Clone)]
struct Entry {
    offset: u32,
    size: u32,
    compressed_size: u32,
    #[allow(dead_code)]
    flags: u32,
    name: String,
}

#[derive(Debug, Clone)]
struct PackEntry {
    path: PathBuf,
    name: String,
    /// UTF-16 code units of `name`, cached for sizing and hashing.
    name_units: Vec<u16>,
}

fn read_u32_le(data: &[u8], off: &mut usize) -> Result<u32> {
    if *off + 4 > data.len() {
        bail!("unexpected EOF while reading u32 at {}", off);
    }
    let v = u32::from_le_bytes([data[*off], data[*off + 1], data[*off + 2], data[*off + 3]]);
    *off += 4;
    Ok(v)
}

fn read_u16_le(data: &[u8], off: &mut usize) -> Result<u16> {
    if *off + 2 > data.len() {
        bail!("unexpected EOF while reading u16 at {}", off);
    }
    let v = u16::from_le_bytes([data[*off], data[*off + 1]]);
    *off += 2;
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

/// The name hash the engine buckets by: XOR of the UTF-16 code units, each
/// scaled by a seed that starts at 1 and steps by 0x1F3, folded by 11 bits.
fn bucket_hash(units: &[u16]) -> u32 {
    let mut hash = 0u32;
    let mut seed = 1u32;

    for &unit in units {
        hash ^= seed.wrapping_mul(u32::from(unit));
        seed = seed.wrapping_add(0x1F3);
    }

    hash ^ (hash >> 11)
}

fn parse_entries(data: &[u8]) -> Result<Vec<Entry>> {
    let mut off = 0usize;

    if read_u32_le(data, &mut off)? != MAGIC {
        bail!("not a valid DDP3 file");
    }

    let bucket_count = read_u32_le(data, &mut off)? as usize;

    // header size plus five reserved dwords
    off += 6 * 4;

    let mut bucket_offsets = Vec::with_capacity(bucket_count);
    for _ in 0..bucket_count {
        let _hash = read_u32_le(data, &mut off)?;
        bucket_offsets.push(read_u32_le(data, &mut off)?);
    }

    let mut entries = Vec::new();

    for bucket_offset in bucket_offsets {
        let mut pos = bucket_offset as usize;

        while pos < data.len() {
            let start = pos;

            let declared = data[pos] as usize;
            pos += 1;
            if declared == 0 {
                break;
            }

            let offset = read_u32_le(data, &mut pos)?;
            let size = read_u32_le(data, &mut pos)?;
            let compressed_size = read_u32_le(data, &mut pos)?;
            let flags = read_u32_le(data, &mut pos)?;

            let mut units = Vec::new();
            loop {
                let unit = read_u16_le(data, &mut pos)?;
                if unit == 0 {
                    break;
                }
                units.push(unit);
            }

            if pos - start != declared {
                bail!("bad entry format at 0x{:X}", start);
            }

            entries.push(Entry {
                offset,
                size,
                compressed_size,
                flags,
                name: String::from_utf16_lossy(&units),
            });
        }
    }

    Ok(entries)
}

pub fn extract(path: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let data = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let entries = parse_entries(&data)?;

    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)?;

    for entry in &entries {
        // Offsets disambiguate duplicate names across buckets.
        let name = format!("{}@{:x}", entry.name, entry.offset);
        log::info!("extract {}", name);

        let payload = read_entry_payload(&data, entry.offset, entry.size, entry.compressed_size)?;
        let name = sniff::auto_file_name(&payload, name);
        fs::write(output_dir.join(name), payload)?;
    }

    Ok(())
}

fn package_entries(root: impl AsRef<Path>) -> Result<Vec<PackEntry>> {
    let mut entries = Vec::new();

    for item in fs::read_dir(root.as_ref())? {
        let item = item?;
        if !item.file_type()?.is_file() || item.metadata()?.len() == 0 {
            continue;
        }

        let path = item.path();
        let mut name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        // Drop the @offset suffix an extraction appended.
        if let Some(at) = name.rfind('@') {
            name.truncate(at);
        }

        let name_units: Vec<u16> = name.encode_utf16().collect();
        if name_units.len() > MAX_NAME_LEN {
            continue;
        }

        entries.push(PackEntry {
            path,
            name,
            name_units,
        });
    }

    Ok(entries)
}

/// Pack every non-empty file of `root` into a new archive. Entries are
/// stored uncompressed.
pub fn create(path: impl AsRef<Path>, root: impl AsRef<Path>) -> Result<()> {
    let entries = package_entries(root)?;

    let bucket_count = (entries.len() / 5).clamp(32, 512);

    let mut buckets: Vec<Vec<PackEntry>> = vec![Vec::new(); bucket_count];
    for entry in entries {
        let index = bucket_hash(&entry.name_units) as usize % bucket_count;
        buckets[index].push(entry);
    }

    // The whole index layout is known up front: place everything before
    // touching any payload.
    let entry_len = |e: &PackEntry| 1 + 16 + (e.name_units.len() + 1) * 2;

    let mut header_size = HEADER_LEN + bucket_count * 8;
    let mut bucket_offsets = Vec::with_capacity(bucket_count);
    for bucket in &buckets {
        bucket_offsets.push(header_size as u32);
        header_size += bucket.iter().map(&entry_len).sum::<usize>() + 1;
    }

    let mut payload_offset = header_size;
    let mut bucket_payloads: Vec<Vec<(usize, Vec<u8>)>> = Vec::with_capacity(bucket_count);
    for bucket in &buckets {
        let mut payloads = Vec::with_capacity(bucket.len());
        for entry in bucket {
            log::info!("add {}", entry.name);

            let data =
                fs::read(&entry.path).with_context(|| format!("read {}", entry.path.display()))?;
            let offset = payload_offset;
            payload_offset += data.len();
            payloads.push((offset, data));
        }
        bucket_payloads.push(payloads);
    }

    let mut out = Vec::with_capacity(payload_offset);
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&(bucket_count as u32).to_le_bytes());
    out.extend_from_slice(&(header_size as u32).to_le_bytes());
    out.extend_from_slice(&[0u8; 5 * 4]);

    for offset in &bucket_offsets {
        out.extend_from_slice(&0x2B2B_2B2Bu32.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
    }

    for (bucket, payloads) in buckets.iter().zip(&bucket_payloads) {
        for (entry, (offset, data)) in bucket.iter().zip(payloads) {
            out.push(entry_len(entry) as u8);
            out.extend_from_slice(&(*offset as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            for unit in &entry.name_units {
                out.extend_from_slice(&unit.to_le_bytes());
            }
            out.extend_from_slice(&[0, 0]);
        }
        out.push(0);
    }

    for payloads in &bucket_payloads {
        for (_, data) in payloads {
            out.extend_from_slice(data);
        }
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
        let dir = std::env::temp_dir().join(format!("ddw-ddp3-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn create_then_extract_round_trips_names_and_data() {
        let root = temp_root("roundtrip");
        let input = root.join("input");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("hello.bin"), b"hello payload").unwrap();
        fs::write(input.join("world.bin"), b"world payload").unwrap();

        let archive = root.join("package.dat");
        create(&archive, &input).unwrap();
        assert!(valid(&archive).unwrap());

        let output = root.join("output");
        extract(&archive, &output).unwrap();

        let mut extracted: Vec<(String, Vec<u8>)> = fs::read_dir(&output)
            .unwrap()
            .map(|item| {
                let item = item.unwrap();
                let name = item.file_name().to_string_lossy().into_owned();
                let stem = name.split('@').next().unwrap().to_string();
                (stem, fs::read(item.path()).unwrap())
            })
            .collect();
        extracted.sort();

        assert_eq!(
            extracted,
            vec![
                ("hello".to_string(), b"hello payload".to_vec()),
                ("world".to_string(), b"world payload".to_vec()),
            ]
        );

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn entry_size_mismatch_fails() {
        let root = temp_root("mismatch");
        let input = root.join("input");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("hello.bin"), b"payload").unwrap();

        let archive = root.join("package.dat");
        create(&archive, &input).unwrap();

        // Corrupt the size prefix of the first occupied bucket entry.
        let mut data = fs::read(&archive).unwrap();
        let mut off = 4usize;
        let bucket_count = read_u32_le(&data, &mut off).unwrap() as usize;
        off = HEADER_LEN;
        let mut entry_pos = None;
        for _ in 0..bucket_count {
            off += 4;
            let bucket_offset = read_u32_le(&data, &mut off).unwrap() as usize;
            if data[bucket_offset] != 0 {
                entry_pos = Some(bucket_offset);
                break;
            }
        }
        let entry_pos = entry_pos.expect("one bucket holds the entry");
        data[entry_pos] += 1;
        fs::write(&archive, data).unwrap();

        assert!(extract(&archive, root.join("output")).is_err());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn hash_distributes_by_utf16_units() {
        let a: Vec<u16> = "hello".encode_utf16().collect();
        let b: Vec<u16> = "hellp".encode_utf16().collect();
        assert_ne!(bucket_hash(&a), bucket_hash(&b));
        assert_eq!(bucket_hash(&a), bucket_hash(&a));
    }
}
