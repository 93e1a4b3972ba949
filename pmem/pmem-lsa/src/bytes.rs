//! Little-endian field access at fixed offsets.
//!
//! Callers check the buffer length once before using these.

#[inline]
pub fn le16(x: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([x[off], x[off + 1]])
}

#[inline]
pub fn le32(x: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([x[off], x[off + 1], x[off + 2], x[off + 3]])
}

#[inline]
pub fn le64(x: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&x[off..off + 8]);
    u64::from_le_bytes(b)
}

#[inline]
pub fn array<const N: usize>(x: &[u8], off: usize) -> [u8; N] {
    let mut b = [0u8; N];
    b.copy_from_slice(&x[off..off + N]);
    b
}

#[inline]
pub fn put16(x: &mut [u8], off: usize, v: u16) {
    x[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

#[inline]
pub fn put32(x: &mut [u8], off: usize, v: u32) {
    x[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

#[inline]
pub fn put64(x: &mut [u8], off: usize, v: u64) {
    x[off..off + 8].copy_from_slice(&v.to_le_bytes());
}
