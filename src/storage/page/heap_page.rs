//! Bitmap-slotted heap page format.
//!
//! ```text
//! +----------------------------+--------+--------+-----+------------------+
//! | bitmap: ceil(slots/8) bytes| slot 0 | slot 1 | ... | slot (slots - 1) |
//! +----------------------------+--------+--------+-----+------------------+
//! ```
//!
//! Every slot is exactly `tuple_width` bytes. Bit `i` of the bitmap, counted
//! low-to-high within byte `i / 8`, is set iff slot `i` holds a live tuple.
//! Any bytes after the last slot are padding and stay zero.

use crate::access::{RecordId, Schema, Tuple};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;

/// Slot geometry of a heap page, derived once from the page size and the
/// schema's byte width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapPageLayout {
    page_size: usize,
    tuple_width: usize,
    slot_count: usize,
    header_size: usize,
}

impl HeapPageLayout {
    pub fn new(page_size: usize, tuple_width: usize) -> StorageResult<Self> {
        if tuple_width == 0 {
            return Err(StorageError::invalid("schema has zero byte width"));
        }

        // Each tuple costs its bytes plus one bitmap bit.
        let slot_count = (page_size * 8) / (tuple_width * 8 + 1);
        if slot_count == 0 {
            return Err(StorageError::invalid(format!(
                "page size {} cannot hold a single {}-byte tuple",
                page_size, tuple_width
            )));
        }
        if slot_count > u16::MAX as usize {
            return Err(StorageError::invalid(format!(
                "page size {} yields {} slots, more than a slot index can address",
                page_size, slot_count
            )));
        }

        Ok(Self {
            page_size,
            tuple_width,
            slot_count,
            header_size: slot_count.div_ceil(8),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn tuple_width(&self) -> usize {
        self.tuple_width
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    fn slot_range(&self, slot: u16) -> std::ops::Range<usize> {
        let start = self.header_size + slot as usize * self.tuple_width;
        start..start + self.tuple_width
    }
}

/// A view of page bytes interpreted as a heap page.
///
/// `B` is `&[u8]` for read-only access or `&mut [u8]` when slots are being
/// filled or cleared.
pub struct HeapPage<'a, B> {
    page_id: PageId,
    layout: &'a HeapPageLayout,
    schema: &'a Schema,
    data: B,
}

impl<'a, B: AsRef<[u8]>> HeapPage<'a, B> {
    pub fn new(page_id: PageId, layout: &'a HeapPageLayout, schema: &'a Schema, data: B) -> Self {
        debug_assert_eq!(data.as_ref().len(), layout.page_size);
        Self {
            page_id,
            layout,
            schema,
            data,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn slot_count(&self) -> usize {
        self.layout.slot_count
    }

    pub fn is_slot_used(&self, slot: u16) -> bool {
        let slot = slot as usize;
        slot < self.layout.slot_count && self.data.as_ref()[slot / 8] & (1 << (slot % 8)) != 0
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.layout.slot_count as u16)
            .filter(|&slot| !self.is_slot_used(slot))
            .count()
    }

    /// Lowest-numbered free slot, if any.
    pub fn first_free_slot(&self) -> Option<u16> {
        (0..self.layout.slot_count as u16).find(|&slot| !self.is_slot_used(slot))
    }

    /// Indices of live slots in ascending order.
    pub fn used_slots(&self) -> impl Iterator<Item = u16> + '_ {
        let bitmap = &self.data.as_ref()[..self.layout.header_size];
        (0..self.layout.slot_count as u16)
            .filter(move |&slot| bitmap[slot as usize / 8] & (1 << (slot % 8)) != 0)
    }

    /// Decodes the tuple stored in `slot`, tagged with its record id.
    pub fn tuple(&self, slot: u16) -> StorageResult<Tuple> {
        if !self.is_slot_used(slot) {
            return Err(StorageError::TupleNotFound {
                page_id: self.page_id,
                slot,
            });
        }
        let bytes = &self.data.as_ref()[self.layout.slot_range(slot)];
        let values = self.schema.decode(bytes)?;
        Ok(Tuple::new(values).with_record_id(RecordId::new(self.page_id, slot)))
    }

    /// All live tuples in slot order.
    pub fn tuples(&self) -> StorageResult<Vec<Tuple>> {
        self.used_slots().map(|slot| self.tuple(slot)).collect()
    }
}

impl<'a, B: AsRef<[u8]> + AsMut<[u8]>> HeapPage<'a, B> {
    /// Writes `tuple` into the lowest free slot and returns that slot.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> StorageResult<u16> {
        let slot = self
            .first_free_slot()
            .ok_or(StorageError::InsertionFailed {
                page_id: self.page_id,
            })?;

        let range = self.layout.slot_range(slot);
        self.schema
            .encode(tuple.values(), &mut self.data.as_mut()[range])?;
        self.set_slot(slot, true);
        Ok(slot)
    }

    /// Marks `slot` free. The slot bytes are left as they are.
    pub fn clear_slot(&mut self, slot: u16) -> StorageResult<()> {
        if !self.is_slot_used(slot) {
            return Err(StorageError::TupleNotFound {
                page_id: self.page_id,
                slot,
            });
        }
        self.set_slot(slot, false);
        Ok(())
    }

    fn set_slot(&mut self, slot: u16, used: bool) {
        let slot = slot as usize;
        let byte = &mut self.data.as_mut()[slot / 8];
        if used {
            *byte |= 1 << (slot % 8);
        } else {
            *byte &= !(1 << (slot % 8));
        }
    }
}
