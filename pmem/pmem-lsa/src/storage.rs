//! Transport to a module's label storage partition.

use crate::StorageError;
use alloc::vec;
use alloc::vec::Vec;

/// Transfer size supported by a module's mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Payload {
    /// 128-byte transfers.
    Small,
    /// The whole partition in one transfer.
    #[default]
    Large,
}

impl Payload {
    pub const SMALL_CHUNK: usize = 128;

    /// Largest transfer for a partition of `partition_size` bytes.
    #[must_use]
    pub fn chunk_len(self, partition_size: u64) -> usize {
        match self {
            Self::Small => Self::SMALL_CHUNK,
            Self::Large => usize::try_from(partition_size).unwrap_or(usize::MAX).max(1),
        }
    }
}

/// Byte-addressed access to one label storage partition.
pub trait LabelStorage {
    /// Size of the partition in bytes.
    fn partition_size(&self) -> u64;

    fn payload(&self) -> Payload {
        Payload::Large
    }

    /// Fill `buf` from partition offset `offset`.
    ///
    /// # Errors
    /// Any transport failure.
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Store `data` at partition offset `offset`.
    ///
    /// # Errors
    /// Any transport failure.
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), StorageError>;
}

impl<S: LabelStorage + ?Sized> LabelStorage for &mut S {
    fn partition_size(&self) -> u64 {
        (**self).partition_size()
    }

    fn payload(&self) -> Payload {
        (**self).payload()
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        (**self).read(offset, buf)
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), StorageError> {
        (**self).write(offset, data)
    }
}

fn check_bounds<S: LabelStorage + ?Sized>(
    storage: &S,
    offset: u64,
    len: usize,
) -> Result<(), StorageError> {
    let end = u64::try_from(len)
        .ok()
        .and_then(|len| offset.checked_add(len));
    match end {
        Some(end) if end <= storage.partition_size() => Ok(()),
        _ => Err(StorageError::OutOfBounds { offset, len }),
    }
}

/// Read `buf.len()` bytes in transfers no larger than the storage payload.
///
/// # Errors
/// [`StorageError::OutOfBounds`] before any transfer if the span leaves the
/// partition; otherwise the first transport failure.
pub fn read_chunked<S: LabelStorage + ?Sized>(
    storage: &mut S,
    offset: u64,
    buf: &mut [u8],
) -> Result<(), StorageError> {
    check_bounds(storage, offset, buf.len())?;
    let chunk = storage.payload().chunk_len(storage.partition_size());
    let mut at = offset;
    for part in buf.chunks_mut(chunk) {
        storage.read(at, part)?;
        at += part.len() as u64;
    }
    Ok(())
}

/// Write `data` in transfers no larger than the storage payload.
///
/// # Errors
/// [`StorageError::OutOfBounds`] before any transfer if the span leaves the
/// partition; otherwise the first transport failure.
pub fn write_chunked<S: LabelStorage + ?Sized>(
    storage: &mut S,
    offset: u64,
    data: &[u8],
) -> Result<(), StorageError> {
    check_bounds(storage, offset, data.len())?;
    let chunk = storage.payload().chunk_len(storage.partition_size());
    let mut at = offset;
    for part in data.chunks(chunk) {
        storage.write(at, part)?;
        at += part.len() as u64;
    }
    Ok(())
}

/// Label storage held in memory.
///
/// Counts transfers and can be told to fail every write after a number of
/// successful ones, which models power loss in the middle of an update.
#[derive(Debug, Clone)]
pub struct MemStorage {
    data: Vec<u8>,
    payload: Payload,
    reads: usize,
    writes: usize,
    fail_after: Option<usize>,
}

impl MemStorage {
    /// A zero-filled partition of `size` bytes.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
            payload: Payload::Large,
            reads: 0,
            writes: 0,
            fail_after: None,
        }
    }

    #[must_use]
    pub const fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Fail every write once `writes` more writes have succeeded.
    pub const fn fail_after_writes(&mut self, writes: usize) {
        self.fail_after = Some(self.writes + writes);
    }

    pub const fn clear_fault(&mut self) {
        self.fail_after = None;
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Number of read transfers served so far.
    #[must_use]
    pub const fn reads(&self) -> usize {
        self.reads
    }

    /// Number of write transfers accepted so far.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.writes
    }

    fn span(&self, offset: u64, len: usize) -> Result<core::ops::Range<usize>, StorageError> {
        let start = usize::try_from(offset).map_err(|_| StorageError::OutOfBounds { offset, len })?;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(StorageError::OutOfBounds { offset, len })?;
        Ok(start..end)
    }
}

impl LabelStorage for MemStorage {
    fn partition_size(&self) -> u64 {
        self.data.len() as u64
    }

    fn payload(&self) -> Payload {
        self.payload
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        let span = self.span(offset, buf.len())?;
        buf.copy_from_slice(&self.data[span]);
        self.reads += 1;
        Ok(())
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_after.is_some_and(|limit| self.writes >= limit) {
            return Err(StorageError::Device);
        }
        let span = self.span(offset, data.len())?;
        self.data[span].copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_payload_splits_transfers() {
        let mut mem = MemStorage::new(1024).with_payload(Payload::Small);
        write_chunked(&mut mem, 100, &[7u8; 300]).unwrap();
        assert_eq!(mem.writes(), 3);

        let mut buf = [0u8; 300];
        read_chunked(&mut mem, 100, &mut buf).unwrap();
        assert_eq!(mem.reads(), 3);
        assert!(buf.iter().all(|&b| b == 7));
    }

    #[test]
    fn large_payload_uses_one_transfer() {
        let mut mem = MemStorage::new(1024);
        write_chunked(&mut mem, 0, &[1u8; 1024]).unwrap();
        assert_eq!(mem.writes(), 1);
    }

    #[test]
    fn out_of_bounds_is_rejected_up_front() {
        let mut mem = MemStorage::new(256);
        assert_eq!(
            write_chunked(&mut mem, 200, &[0u8; 100]),
            Err(StorageError::OutOfBounds { offset: 200, len: 100 })
        );
        assert_eq!(mem.writes(), 0);
    }

    #[test]
    fn injected_fault_stops_writes() {
        let mut mem = MemStorage::new(256);
        mem.fail_after_writes(1);
        assert!(mem.write(0, &[1]).is_ok());
        assert_eq!(mem.write(1, &[1]), Err(StorageError::Device));
        mem.clear_fault();
        assert!(mem.write(1, &[1]).is_ok());
        assert_eq!(&mem.bytes()[..2], &[1, 1]);
    }
}
