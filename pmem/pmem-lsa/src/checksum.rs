//! Fletcher-64 over little-endian 32-bit words.
//!
//! Both index blocks and v1.2 labels embed their own checksum. While computing
//! it, the two words of the embedded checksum field count as zero; `hi` still
//! absorbs `lo` once per skipped word.

/// Fletcher-64 of `bytes`.
///
/// Trailing bytes that do not form a whole 32-bit word are ignored; every
/// structure checksummed here has a length that is a multiple of four.
#[must_use]
pub fn fletcher64(bytes: &[u8]) -> u64 {
    fold(bytes, usize::MAX)
}

/// Fletcher-64 of `bytes` with the 8-byte field at `checksum_offset` read as zero.
#[must_use]
pub fn fletcher64_excluding(bytes: &[u8], checksum_offset: usize) -> u64 {
    fold(bytes, checksum_offset)
}

fn fold(bytes: &[u8], hole: usize) -> u64 {
    debug_assert!(bytes.len().is_multiple_of(4));

    let mut lo: u32 = 0;
    let mut hi: u32 = 0;
    for (i, word) in bytes.chunks_exact(4).enumerate() {
        let offset = i * 4;
        let in_hole = hole != usize::MAX && offset >= hole && offset < hole + 8;
        if !in_hole {
            lo = lo.wrapping_add(u32::from_le_bytes([word[0], word[1], word[2], word[3]]));
        }
        hi = hi.wrapping_add(lo);
    }
    (u64::from(hi) << 32) | u64::from(lo)
}
