//! Helpers for building synthetic script images in tests.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::format::hxb::{self, HEADER_LEN, MAGIC};

/// A decrypted script image wrapping the given instruction body: valid
/// magic, matching size field, unicode variant, debug flag clear.
pub(crate) fn plain_image(body: &[u8]) -> Vec<u8> {
    let mut image = vec![0u8; HEADER_LEN];
    LittleEndian::write_u64(&mut image[..8], MAGIC);
    BigEndian::write_u24(&mut image[8..11], (HEADER_LEN + body.len()) as u32);
    image.extend_from_slice(body);
    image
}

/// The encrypted (on-disk) form of [`plain_image`]. The XOR transform is
/// its own inverse, so encrypting is one more application of it.
pub(crate) fn make_script(body: &[u8]) -> Vec<u8> {
    hxb::crypt::decrypt(&plain_image(body)).expect("synthetic image must validate")
}

/// UTF-16LE code units plus the 16-bit terminator.
pub(crate) fn utf16z(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() * 2 + 2);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.extend_from_slice(&[0, 0]);
    out
}
