use crate::LsaError;
use crate::layout::free_bitmap_len;
use alloc::vec;
use alloc::vec::Vec;

/// Slot occupancy of one index block.
///
/// A set bit marks a FREE slot. Slot `n` lives in byte `n / 8`, bit `n % 8`.
/// Padding bits past `nslot` are ignored when reading and written as zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeBitmap {
    bits: Vec<u8>,
    nslot: u32,
}

impl FreeBitmap {
    /// A bitmap with every slot free.
    #[must_use]
    pub fn all_free(nslot: u32) -> Self {
        let mut bits = vec![0xFF; free_bitmap_len(nslot)];
        let tail = nslot % 8;
        if tail != 0
            && let Some(last) = bits.last_mut()
        {
            *last = (1u8 << tail) - 1;
        }
        Self { bits, nslot }
    }

    /// Take over the on-media bitmap bytes of an index block.
    ///
    /// # Errors
    /// [`LsaError::InvalidParameter`] if `raw` is shorter than `nslot` requires.
    pub fn from_bytes(raw: &[u8], nslot: u32) -> Result<Self, LsaError> {
        let len = free_bitmap_len(nslot);
        let bits = raw
            .get(..len)
            .ok_or(LsaError::InvalidParameter("free bitmap shorter than slot count"))?
            .to_vec();
        Ok(Self { bits, nslot })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    #[must_use]
    pub const fn nslot(&self) -> u32 {
        self.nslot
    }

    #[inline]
    const fn locate(slot: u32) -> (usize, u8) {
        ((slot / 8) as usize, 1 << (slot % 8))
    }

    /// Whether `slot` is free. Slots past the end are never free.
    #[must_use]
    pub fn is_free(&self, slot: u32) -> bool {
        if slot >= self.nslot {
            return false;
        }
        let (byte, mask) = Self::locate(slot);
        self.bits[byte] & mask != 0
    }

    fn check(&self, slot: u32) -> Result<(usize, u8), LsaError> {
        if slot >= self.nslot {
            return Err(LsaError::InvalidParameter("label slot out of range"));
        }
        Ok(Self::locate(slot))
    }

    /// # Errors
    /// [`LsaError::InvalidParameter`] if `slot` is past the end.
    pub fn mark_used(&mut self, slot: u32) -> Result<(), LsaError> {
        let (byte, mask) = self.check(slot)?;
        self.bits[byte] &= !mask;
        Ok(())
    }

    /// # Errors
    /// [`LsaError::InvalidParameter`] if `slot` is past the end.
    pub fn mark_free(&mut self, slot: u32) -> Result<(), LsaError> {
        let (byte, mask) = self.check(slot)?;
        self.bits[byte] |= mask;
        Ok(())
    }

    #[must_use]
    pub fn free_count(&self) -> u32 {
        (0..self.nslot).map(|s| u32::from(self.is_free(s))).sum()
    }

    #[must_use]
    pub fn first_free(&self) -> Option<u32> {
        (0..self.nslot).find(|&s| self.is_free(s))
    }

    /// Used slots in ascending order.
    pub fn used_slots(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.nslot).filter(|&s| !self.is_free(s))
    }
}
