use crate::bitmap::FreeBitmap;
use crate::error::{CorruptionKind, IndexDefect};
use crate::index::IndexBlock;
use crate::label::NamespaceLabel;
use crate::layout::{
    Geometry, INDEX_COUNT, INDEX_HEADER_LEN, LabelVersion, MIN_INDEX_SIZE, index_size,
    label_len_for_code,
};
use crate::select::{IndexSlot, select_current};
use crate::storage::{LabelStorage, Payload, read_chunked, write_chunked};
use crate::LsaError;
use alloc::vec;
use alloc::vec::Vec;

/// Decoded labels of the used slots, addressed by slot number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelArea {
    slots: Vec<Option<NamespaceLabel>>,
}

impl LabelArea {
    fn empty(nslot: u32) -> Self {
        Self {
            slots: vec![None; nslot as usize],
        }
    }

    #[must_use]
    pub fn get(&self, slot: u32) -> Option<&NamespaceLabel> {
        self.slots.get(slot as usize).and_then(Option::as_ref)
    }

    fn set(&mut self, slot: u32, label: Option<NamespaceLabel>) -> Result<(), LsaError> {
        let entry = self
            .slots
            .get_mut(slot as usize)
            .ok_or(LsaError::InvalidParameter("label slot out of range"))?;
        *entry = label;
        Ok(())
    }

    /// `(slot, label)` pairs in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &NamespaceLabel)> + '_ {
        self.slots
            .iter()
            .zip(0u32..)
            .filter_map(|(label, slot)| label.as_ref().map(|l| (slot, l)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|l| l.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Changes staged against the next index block.
///
/// Label slots are only taken from slots free in both the current and the next
/// block, so writing them never touches a label the current block still uses.
#[derive(Debug, Clone)]
pub struct Update {
    target: IndexSlot,
    next: IndexBlock,
    live: FreeBitmap,
    version: LabelVersion,
    written: Vec<NamespaceLabel>,
    freed: Vec<u32>,
}

impl Update {
    /// Put `label` into the lowest usable free slot and return that slot.
    ///
    /// The label's `slot` field is set and v1.2 labels are resealed.
    ///
    /// # Errors
    /// [`LsaError::OutOfResources`] if no slot is left.
    pub fn place(&mut self, mut label: NamespaceLabel) -> Result<u32, LsaError> {
        let slot = (0..self.next.nslot)
            .find(|&s| self.next.free.is_free(s) && self.live.is_free(s))
            .ok_or(LsaError::OutOfResources {
                needed: 1,
                available: 0,
            })?;
        self.next.free.mark_used(slot)?;
        label.slot = slot;
        if self.version.has_checksum() {
            label.seal();
        }
        self.written.push(label);
        Ok(slot)
    }

    /// Release `slot` in the next index block.
    ///
    /// # Errors
    /// [`LsaError::InvalidParameter`] if `slot` is out of range.
    pub fn release(&mut self, slot: u32) -> Result<(), LsaError> {
        self.next.free.mark_free(slot)?;
        self.freed.push(slot);
        Ok(())
    }

    #[must_use]
    pub const fn version(&self) -> LabelVersion {
        self.version
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.freed.is_empty()
    }
}

/// A decoded label storage area.
///
/// Holds the current index block and the labels of its used slots. Mutations go
/// through an [`Update`] and [`Lsa::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lsa {
    geometry: Geometry,
    current_slot: IndexSlot,
    current: IndexBlock,
    labels: LabelArea,
}

impl Lsa {
    /// Read and validate the label storage area.
    ///
    /// # Errors
    /// - [`LsaError::NotFound`] if the index region is blank.
    /// - [`LsaError::VolumeCorrupted`] if the sizing is inconsistent or neither
    ///   index block validates.
    /// - [`LsaError::Transport`] on storage failures.
    pub fn read<S: LabelStorage + ?Sized>(storage: &mut S) -> Result<Self, LsaError> {
        let partition = storage.partition_size();
        let mut header = [0u8; INDEX_HEADER_LEN];
        read_chunked(storage, 0, &mut header)?;
        let (my_size, nslot, code) =
            IndexBlock::peek_sizing(&header).ok_or(LsaError::NotFound)?;

        if my_size == 0 {
            return Err(Self::classify_blank(storage, nslot)?);
        }

        let expected = index_size(nslot);
        if my_size != expected {
            log::warn!("index size {my_size} does not match {expected} computed for {nslot} slots");
            return Err(CorruptionKind::IndexSize {
                expected,
                found: my_size,
            }
            .into());
        }
        let label_len = label_len_for_code(code).ok_or(CorruptionKind::LabelSizeCode(code))?;
        let needed = (label_len as u64)
            .checked_mul(u64::from(nslot))
            .and_then(|labels| labels.checked_add(INDEX_COUNT as u64 * my_size));
        if needed.is_none_or(|n| n > partition) {
            log::warn!("index blocks and {nslot} labels do not fit into {partition} bytes");
            return Err(CorruptionKind::ExceedsPartition.into());
        }

        // Sizing checks above bound my_size by the partition size.
        let block_len = usize::try_from(my_size).map_err(|_| CorruptionKind::ExceedsPartition)?;
        let mut raw = vec![0u8; INDEX_COUNT * block_len];
        read_chunked(storage, 0, &mut raw)?;

        let mut blocks = [IndexSlot::A, IndexSlot::B].map(|slot| {
            let at = slot.index() * block_len;
            IndexBlock::validate(&raw[at..at + block_len], slot)
                .and_then(|block| {
                    if block.my_size == my_size {
                        Ok(block)
                    } else {
                        Err(IndexDefect::Size {
                            expected: my_size,
                            found: block.my_size,
                        })
                    }
                })
                .inspect_err(|defect| log::debug!("index block {slot:?} rejected: {defect}"))
                .ok()
        });

        let current_slot = select_current(
            blocks[0].as_ref().map(|b| b.sequence),
            blocks[1].as_ref().map(|b| b.sequence),
        )
        .inspect_err(|_| log::warn!("neither index block is valid"))?;
        let current = blocks[current_slot.index()]
            .take()
            .ok_or(CorruptionKind::NoValidIndex)?;

        // validate() only accepts known minor versions.
        let version = current.version().ok_or(CorruptionKind::NoValidIndex)?;
        let geometry = Geometry {
            version,
            index_size: my_size,
            nslot: current.nslot,
        };
        if geometry.total_len() > partition {
            return Err(CorruptionKind::ExceedsPartition.into());
        }
        log::debug!(
            "current index {current_slot:?}: sequence {}, {} slots, {} free, v1.{}",
            current.sequence,
            current.nslot,
            current.free.free_count(),
            version.minor()
        );

        let labels = Self::read_labels(storage, &geometry, &current)?;
        Ok(Self {
            geometry,
            current_slot,
            current,
            labels,
        })
    }

    fn classify_blank<S: LabelStorage + ?Sized>(
        storage: &mut S,
        nslot: u32,
    ) -> Result<LsaError, LsaError> {
        let len = (INDEX_COUNT as u64 * MIN_INDEX_SIZE).min(storage.partition_size());
        let mut raw = vec![0u8; usize::try_from(len).unwrap_or(0)];
        read_chunked(storage, 0, &mut raw)?;
        if raw.iter().all(|&b| b == 0) {
            log::debug!("label storage area is blank");
            Ok(LsaError::NotFound)
        } else {
            Ok(CorruptionKind::IndexSize {
                expected: index_size(nslot),
                found: 0,
            }
            .into())
        }
    }

    fn read_labels<S: LabelStorage + ?Sized>(
        storage: &mut S,
        geometry: &Geometry,
        current: &IndexBlock,
    ) -> Result<LabelArea, LsaError> {
        let mut area = LabelArea::empty(geometry.nslot);
        let label_len = geometry.label_len();
        let version = geometry.version;

        match storage.payload() {
            Payload::Large => {
                let mut raw = vec![0u8; geometry.nslot as usize * label_len];
                read_chunked(storage, geometry.labels_offset(), &mut raw)?;
                for slot in current.free.used_slots() {
                    let at = slot as usize * label_len;
                    let label = NamespaceLabel::decode(&raw[at..at + label_len], version)?;
                    area.set(slot, Some(label))?;
                }
            }
            Payload::Small => {
                let mut raw = vec![0u8; label_len];
                for slot in current.free.used_slots() {
                    read_chunked(storage, geometry.slot_offset(slot), &mut raw)?;
                    area.set(slot, Some(NamespaceLabel::decode(&raw, version)?))?;
                }
            }
        }
        Ok(area)
    }

    /// Write an empty label storage area of `version` over the whole partition.
    ///
    /// Index A gets sequence 1 and index B sequence 2, so B is current.
    ///
    /// # Errors
    /// - [`LsaError::InvalidParameter`] if the partition cannot hold a label area.
    /// - [`LsaError::Transport`] on storage failures.
    pub fn initialize<S: LabelStorage + ?Sized>(
        storage: &mut S,
        version: LabelVersion,
    ) -> Result<Self, LsaError> {
        let geometry = Geometry::for_partition(storage.partition_size(), version)
            .ok_or(LsaError::InvalidParameter("partition too small for a label area"))?;

        let mut a = IndexBlock::fresh(&geometry, IndexSlot::A, 1);
        let mut b = IndexBlock::fresh(&geometry, IndexSlot::B, 2);
        let total = usize::try_from(geometry.total_len())
            .map_err(|_| LsaError::InvalidParameter("label area exceeds address space"))?;
        let block = usize::try_from(geometry.index_size)
            .map_err(|_| LsaError::InvalidParameter("index size exceeds address space"))?;

        let mut image = vec![0u8; total];
        image[..block].copy_from_slice(&a.encode()?);
        image[block..2 * block].copy_from_slice(&b.encode()?);
        write_chunked(storage, 0, &image)?;

        log::info!(
            "initialized label storage area: v1.{}, {} slots, index size {}",
            version.minor(),
            geometry.nslot,
            geometry.index_size
        );
        Ok(Self {
            geometry,
            current_slot: IndexSlot::B,
            current: b,
            labels: LabelArea::empty(geometry.nslot),
        })
    }

    /// Overwrite the whole partition with zeros.
    ///
    /// # Errors
    /// [`LsaError::Transport`] on storage failures.
    pub fn zero<S: LabelStorage + ?Sized>(storage: &mut S) -> Result<(), LsaError> {
        let len = usize::try_from(storage.partition_size())
            .map_err(|_| LsaError::InvalidParameter("partition exceeds address space"))?;
        write_chunked(storage, 0, &vec![0u8; len])?;
        log::info!("zeroed label storage partition of {len} bytes");
        Ok(())
    }

    /// Replace a corrupted area by an empty one; any other outcome is passed through.
    ///
    /// # Errors
    /// Whatever [`Lsa::read`] reports other than corruption, or the
    /// [`Lsa::initialize`] failure.
    pub fn restore_if_corrupt<S: LabelStorage + ?Sized>(
        storage: &mut S,
        version: LabelVersion,
    ) -> Result<Self, LsaError> {
        match Self::read(storage) {
            Err(LsaError::VolumeCorrupted { which }) => {
                log::warn!("label storage area corrupted ({which}), writing a fresh one");
                Self::initialize(storage, version)
            }
            other => other,
        }
    }

    /// Read the area, initializing it with `version` first if it is blank.
    ///
    /// A freshly written area is read back to verify it.
    ///
    /// # Errors
    /// As [`Lsa::read`] and [`Lsa::initialize`], except for [`LsaError::NotFound`].
    pub fn read_or_initialize<S: LabelStorage + ?Sized>(
        storage: &mut S,
        version: LabelVersion,
    ) -> Result<Self, LsaError> {
        match Self::read(storage) {
            Err(LsaError::NotFound) => {
                Self::initialize(storage, version)?;
                Self::read(storage)
            }
            other => other,
        }
    }

    #[must_use]
    pub const fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[must_use]
    pub const fn version(&self) -> LabelVersion {
        self.geometry.version
    }

    #[must_use]
    pub const fn current_slot(&self) -> IndexSlot {
        self.current_slot
    }

    #[must_use]
    pub const fn current_index(&self) -> &IndexBlock {
        &self.current
    }

    #[must_use]
    pub const fn labels(&self) -> &LabelArea {
        &self.labels
    }

    #[must_use]
    pub fn label(&self, slot: u32) -> Option<&NamespaceLabel> {
        self.labels.get(slot)
    }

    #[must_use]
    pub fn free_slot_count(&self) -> u32 {
        self.current.free.free_count()
    }

    #[must_use]
    pub fn first_free_slot(&self) -> Option<u32> {
        self.current.free.first_free()
    }

    pub fn used_slots(&self) -> impl Iterator<Item = u32> + '_ {
        self.current.free.used_slots()
    }

    /// Start staging changes against the non-current index block.
    #[must_use]
    pub fn begin(&self) -> Update {
        let target = self.current_slot.other();
        Update {
            target,
            next: self.current.successor(target),
            live: self.current.free.clone(),
            version: self.geometry.version,
            written: Vec::new(),
            freed: Vec::new(),
        }
    }

    /// Write `update` back and make its index block current.
    ///
    /// Newly used slots are written first, then the index block, then freed
    /// slots are zeroed. A failure before the index block is written leaves the
    /// previous state on media. Failing to zero freed slots is only logged.
    ///
    /// # Errors
    /// [`LsaError::Transport`] if a label slot or the index block cannot be written.
    pub fn commit<S: LabelStorage + ?Sized>(
        &mut self,
        storage: &mut S,
        mut update: Update,
    ) -> Result<(), LsaError> {
        let version = self.geometry.version;

        for label in &update.written {
            write_chunked(
                storage,
                self.geometry.slot_offset(label.slot),
                &label.encode(version),
            )?;
        }

        let index = update.next.encode()?;
        write_chunked(
            storage,
            self.geometry.index_offset(update.target.index()),
            &index,
        )?;

        let blank = vec![0u8; self.geometry.label_len()];
        for &slot in &update.freed {
            if !update.next.free.is_free(slot) {
                continue;
            }
            if let Err(e) = write_chunked(storage, self.geometry.slot_offset(slot), &blank) {
                log::warn!("could not clear released label slot {slot}: {e}");
            }
        }

        for &slot in &update.freed {
            self.labels.set(slot, None)?;
        }
        for label in update.written.drain(..) {
            self.labels.set(label.slot, Some(label))?;
        }
        log::debug!(
            "committed index {:?} with sequence {}",
            update.target,
            update.next.sequence
        );
        self.current_slot = update.target;
        self.current = update.next;
        Ok(())
    }
}
