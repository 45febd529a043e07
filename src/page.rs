//! Fixed-size, slotted heap page (spec §3, §4.1, §6).
//!
//! Layout: `H` header bytes holding a bitmap of `num_slots` bits (bit `i`
//! lives in byte `i/8`, LSB-first within that byte), followed by
//! `num_slots * tuple_size` slot bytes, followed by zero padding out to
//! `page_size`. This generalizes `HeapPage`'s header/body split (the
//! original only ever parsed the header, never wrote one) into a page that
//! can insert, delete, serialize and roll itself back.

use log::debug;

use crate::{
    error::{DbError, DbResult},
    ids::{PageId, RecordId},
    transaction::TransactionId,
    tuple::Tuple,
    TupleDesc,
};

pub struct SlottedPage {
    pid: PageId,
    tuple_desc: TupleDesc,
    num_slots: usize,
    header_len: usize,
    header: Vec<u8>,
    /// Raw, fixed-width bytes for every slot, used or not. Unused slot
    /// bytes are unspecified content that must merely round-trip (spec
    /// §4.1): we zero them, but never rely on that elsewhere.
    slot_bytes: Vec<u8>,
    page_size: usize,

    dirty_by: Option<TransactionId>,
    before_image: Option<Vec<u8>>,
}

impl SlottedPage {
    /// Compute the slot count for a given page size and tuple size, per
    /// spec §6: `floor(page_size*8 / (tuple_size*8 + 1))`.
    pub fn num_slots_for(page_size: usize, tuple_size: usize) -> usize {
        (page_size * 8) / (tuple_size * 8 + 1)
    }

    pub fn header_len_for(num_slots: usize) -> usize {
        (num_slots + 7) / 8
    }

    /// Build a brand-new, all-empty page (used when a heap file grows).
    pub fn empty(pid: PageId, tuple_desc: TupleDesc, page_size: usize) -> Self {
        let tuple_size = tuple_desc.tuple_size();
        let num_slots = Self::num_slots_for(page_size, tuple_size);
        let header_len = Self::header_len_for(num_slots);
        Self {
            pid,
            tuple_desc,
            num_slots,
            header_len,
            header: vec![0u8; header_len],
            slot_bytes: vec![0u8; num_slots * tuple_size],
            page_size,
            dirty_by: None,
            before_image: None,
        }
    }

    /// Parse an existing page out of exactly `page_size` bytes.
    pub fn parse(pid: PageId, bytes: &[u8], tuple_desc: TupleDesc, page_size: usize) -> DbResult<Self> {
        if bytes.len() != page_size {
            return Err(DbError::io(format!(
                "expected {} bytes for page {:?}, got {}",
                page_size,
                pid,
                bytes.len()
            )));
        }

        let tuple_size = tuple_desc.tuple_size();
        let num_slots = Self::num_slots_for(page_size, tuple_size);
        let header_len = Self::header_len_for(num_slots);

        let header = bytes[0..header_len].to_vec();
        let slots_start = header_len;
        let slots_len = num_slots * tuple_size;
        let slot_bytes = bytes[slots_start..slots_start + slots_len].to_vec();

        Ok(Self {
            pid,
            tuple_desc,
            num_slots,
            header_len,
            header,
            slot_bytes,
            page_size,
            dirty_by: None,
            before_image: None,
        })
    }

    pub fn page_id(&self) -> PageId {
        self.pid
    }

    pub fn tuple_desc(&self) -> &TupleDesc {
        &self.tuple_desc
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        let byte = self.header[slot / 8];
        (byte & (1 << (slot % 8))) != 0
    }

    fn mark_slot_used(&mut self, slot: usize, used: bool) {
        let byte = &mut self.header[slot / 8];
        if used {
            *byte |= 1 << (slot % 8);
        } else {
            *byte &= !(1 << (slot % 8));
        }
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots).filter(|&i| !self.is_slot_used(i)).count()
    }

    fn tuple_size(&self) -> usize {
        self.tuple_desc.tuple_size()
    }

    fn slot_range(&self, slot: usize) -> std::ops::Range<usize> {
        let size = self.tuple_size();
        slot * size..(slot + 1) * size
    }

    /// Insert `tuple`, picking the lowest-numbered empty slot. Stamps
    /// `tuple.record_id` on success.
    pub fn insert_tuple(&mut self, mut tuple: Tuple) -> DbResult<Tuple> {
        if !tuple.matches_desc(&self.tuple_desc) {
            return Err(DbError::schema_mismatch(format!(
                "tuple {} does not match page schema {}",
                tuple, self.tuple_desc
            )));
        }

        let slot = (0..self.num_slots)
            .find(|&i| !self.is_slot_used(i))
            .ok_or_else(|| DbError::db_full(format!("page {:?} has no empty slot", self.pid)))?;

        let bytes = tuple.encode(&self.tuple_desc)?;
        let range = self.slot_range(slot);
        self.slot_bytes[range].copy_from_slice(&bytes);
        self.mark_slot_used(slot, true);

        let rid = RecordId::new(self.pid, slot);
        tuple.record_id = Some(rid);
        debug!("inserted tuple into {:?} slot {}", self.pid, slot);
        Ok(tuple)
    }

    /// Delete the tuple at `record_id`. Fails with `NotFound` if the slot
    /// is already empty or belongs to a different page.
    pub fn delete_tuple(&mut self, record_id: RecordId) -> DbResult<()> {
        if record_id.page_id != self.pid {
            return Err(DbError::not_found(format!(
                "record {:?} does not belong to page {:?}",
                record_id, self.pid
            )));
        }
        if !self.is_slot_used(record_id.slot_index) {
            return Err(DbError::not_found(format!(
                "slot {} on page {:?} is already empty",
                record_id.slot_index, self.pid
            )));
        }
        self.mark_slot_used(record_id.slot_index, false);
        Ok(())
    }

    /// Tuples in ascending slot order, skipping empty slots.
    pub fn iterate(&self) -> DbResult<Vec<Tuple>> {
        let mut tuples = Vec::new();
        for slot in 0..self.num_slots {
            if !self.is_slot_used(slot) {
                continue;
            }
            let range = self.slot_range(slot);
            let mut t = Tuple::decode(&self.tuple_desc, &self.slot_bytes[range])?;
            t.record_id = Some(RecordId::new(self.pid, slot));
            tuples.push(t);
        }
        Ok(tuples)
    }

    /// Produce exactly `page_size` bytes: header, slots, zero padding.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.page_size);
        bytes.extend_from_slice(&self.header);
        bytes.extend_from_slice(&self.slot_bytes);
        bytes.resize(self.page_size, 0);
        bytes
    }

    pub fn dirty_by(&self) -> Option<TransactionId> {
        self.dirty_by
    }

    /// Mark this page dirty on behalf of `tid`. The first clean-to-dirty
    /// transition captures a before-image of the current (clean) state.
    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        if tid.is_some() && self.dirty_by.is_none() {
            self.before_image = Some(self.serialize());
        }
        self.dirty_by = tid;
    }

    /// Replace this page's in-memory state with its before-image and clear
    /// the dirty mark. A no-op if the page was never dirtied.
    pub fn restore_before_image(&mut self) -> DbResult<()> {
        let Some(before) = self.before_image.take() else {
            self.dirty_by = None;
            return Ok(());
        };
        let restored = Self::parse(self.pid, &before, self.tuple_desc.clone(), self.page_size)?;
        self.header = restored.header;
        self.slot_bytes = restored.slot_bytes;
        self.dirty_by = None;
        Ok(())
    }

    /// Clear the recorded before-image; called once a transaction that
    /// dirtied this page has committed, since the in-memory state is now
    /// the new clean state.
    pub fn clear_before_image(&mut self) {
        self.before_image = None;
    }
}
