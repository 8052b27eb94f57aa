//! DDLZ decompression.
//!
//! A flag-byte LZ stream. Flags below 0x1D are short literal runs
//! (`flag + 1` bytes), 0x1D/0x1E/0x1F announce extended literal runs, and
//! flags from 0x20 up are back-references into the output window with
//! three packed encodings. Back-reference copies run byte by byte and may
//! overlap their own output. The caller supplies the exact decompressed
//! size; producing anything else is a format error.
//!
//! The matching compressor was never part of the format's tooling; archive
//! writers store entries uncompressed.

use anyhow::{bail, Result};

fn next(input: &[u8], pos: &mut usize) -> Result<usize> {
    let Some(&b) = input.get(*pos) else {
        bail!("unexpected end of compressed data at {}", pos);
    };
    *pos += 1;
    Ok(b as usize)
}

pub fn decompress(input: &[u8], size: usize) -> Result<Vec<u8>> {
    let mut output = vec![0u8; size];

    let mut remaining = size as i64;
    let mut in_p = 0usize;
    let mut out_p = 0usize;

    while remaining > 0 {
        let flag = next(input, &mut in_p)?;
        let count;

        if flag >= 0x20 {
            let offset;
            let length;

            if flag & 0x80 == 0 {
                if flag & 0x60 == 0x20 {
                    offset = (flag >> 2) & 7;
                    length = flag & 3;
                } else if flag & 0x60 == 0x40 {
                    offset = next(input, &mut in_p)?;
                    length = (flag & 0x1F) + 4;
                } else {
                    let flag1 = next(input, &mut in_p)?;
                    let flag2 = next(input, &mut in_p)?;

                    offset = flag1 | ((flag & 0x1F) << 8);

                    if flag2 == 0xFE {
                        length = (next(input, &mut in_p)? << 8 | next(input, &mut in_p)?) + 0x102;
                    } else if flag2 == 0xFF {
                        length = next(input, &mut in_p)? << 24
                            | next(input, &mut in_p)? << 16
                            | next(input, &mut in_p)? << 8
                            | next(input, &mut in_p)?;
                    } else {
                        length = flag2 + 4;
                    }
                }
            } else {
                length = (flag >> 5) & 3;
                offset = next(input, &mut in_p)? | ((flag & 0x1F) << 8);
            }

            count = length + 3;

            if offset + 1 > out_p {
                bail!("back-reference before the start of the output");
            }
            if out_p + count > size {
                bail!("decompressed data overruns the declared size");
            }

            let mut from = out_p - offset - 1;
            for _ in 0..count {
                output[out_p] = output[from];
                out_p += 1;
                from += 1;
            }
        } else {
            if flag >= 0x1D {
                if flag == 0x1D {
                    count = next(input, &mut in_p)? + 0x1E;
                } else if flag == 0x1E {
                    count = (next(input, &mut in_p)? << 8 | next(input, &mut in_p)?) + 0x11E;
                } else {
                    count = next(input, &mut in_p)? << 24
                        | next(input, &mut in_p)? << 16
                        | next(input, &mut in_p)? << 8
                        | next(input, &mut in_p)?;
                }
            } else {
                count = flag + 1;
            }

            if in_p + count > input.len() {
                bail!("unexpected end of compressed data at {}", in_p);
            }
            if out_p + count > size {
                bail!("decompressed data overruns the declared size");
            }

            output[out_p..out_p + count].copy_from_slice(&input[in_p..in_p + count]);
            out_p += count;
            in_p += count;
        }

        remaining -= count as i64;
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn short_literal_run() {
        let out = decompress(&[0x02, b'a', b'b', b'c'], 3).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn extended_literal_run() {
        let mut input = vec![0x1D, 0x00];
        input.extend_from_slice(&[b'x'; 0x1E]);
        let out = decompress(&input, 0x1E).unwrap();
        assert_eq!(out, vec![b'x'; 0x1E]);
    }

    #[test]
    fn overlapping_back_reference() {
        // "abc", then copy 4 bytes starting at the last output byte:
        // a classic run-extension that reads its own output.
        let out = decompress(&[0x02, b'a', b'b', b'c', 0x21], 7).unwrap();
        assert_eq!(out, b"abccccc");
    }

    #[test]
    fn back_reference_with_byte_offset() {
        // 5 literals, then flag 0x40-form: offset byte 4, length 0+4, +3.
        let out = decompress(&[0x04, b'a', b'b', b'c', b'd', b'e', 0x40, 0x04], 12).unwrap();
        assert_eq!(out, b"abcdeabcdeab");
    }

    #[test]
    fn truncated_literal_fails() {
        assert!(decompress(&[0x05, b'a'], 6).is_err());
    }

    #[test]
    fn back_reference_past_start_fails() {
        assert!(decompress(&[0x21], 4).is_err());
    }

    #[test]
    fn overrun_fails() {
        assert!(decompress(&[0x04, b'a', b'b', b'c', b'd', b'e'], 3).is_err());
    }
}
