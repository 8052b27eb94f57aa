//! Integrity check and XOR transform for the script body.
//!
//! The 4-byte key is derived from the declared total size, so a file whose
//! size field survives a round trip decrypts back to itself: the transform
//! is its own inverse.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::{HxbError, HEADER_LEN, MAGIC};

fn derive_key(size: u32) -> [u8; 4] {
    let size = size as i32;
    let key = size
        .wrapping_add(0x0006_F349)
        .wrapping_mul(size.wrapping_mul(0x20) ^ 0xA5)
        ^ 0x34A9_B129;
    key.to_le_bytes()
}

/// Validate the header and XOR the body. Applying this to an encrypted
/// image decrypts it; applying it to a decrypted image encrypts it again.
pub(crate) fn decrypt(data: &[u8]) -> Result<Vec<u8>, HxbError> {
    if data.len() < HEADER_LEN {
        return Err(HxbError::TooSmall(data.len()));
    }

    if LittleEndian::read_u64(&data[..8]) != MAGIC {
        return Err(HxbError::BadMagic);
    }

    let declared = BigEndian::read_u24(&data[8..11]) as usize;
    if declared != data.len() {
        return Err(HxbError::SizeMismatch {
            declared,
            actual: data.len(),
        });
    }

    let key = derive_key(declared as u32);

    let mut out = data.to_vec();
    for (i, b) in out[HEADER_LEN..].iter_mut().enumerate() {
        *b ^= key[i & 3];
    }

    Ok(out)
}
