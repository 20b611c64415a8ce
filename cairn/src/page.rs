//! The slotted heap page.
//!
//! A page of P bytes holds `floor(P * 8 / (tuple_bits + 1))` slots: one
//! header bit per slot plus the fixed-size tuple body. Header bits are packed
//! MSB-first within each byte, bit i set iff slot i is occupied. Slot bodies
//! follow the header in increasing slot order.

use std::sync::Arc;

use crate::error::{DbError, DbResult};
use crate::transaction::TransactionId;
use crate::tuple::{RecordId, Tuple, TupleDesc};
use crate::{page_size, PageId};

#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    desc: Arc<TupleDesc>,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    dirtier: Option<TransactionId>,
    before_image: Vec<u8>,
}

/// Number of slots a page holds for tuples of the given schema.
pub fn slots_per_page(desc: &TupleDesc) -> usize {
    (page_size() * 8) / (desc.byte_size() * 8 + 1)
}

/// Bytes of occupancy bitmap needed for the given slot count.
pub fn header_len(num_slots: usize) -> usize {
    num_slots.div_ceil(8)
}

impl HeapPage {
    /// Parses a page from its on-disk bytes. The byte contents at this moment
    /// become the page's before image.
    pub fn new(pid: PageId, data: &[u8], desc: Arc<TupleDesc>) -> DbResult<Self> {
        if data.len() != page_size() {
            return Err(DbError::InvalidArgument(format!(
                "page data is {} bytes, expected {}",
                data.len(),
                page_size()
            )));
        }

        let num_slots = slots_per_page(&desc);
        let header_bytes = header_len(num_slots);
        let header = data[..header_bytes].to_vec();

        let tuple_size = desc.byte_size();
        let mut tuples = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if header[slot / 8] & (0x80 >> (slot % 8)) != 0 {
                let start = header_bytes + slot * tuple_size;
                let mut tuple = Tuple::from_bytes(desc.clone(), &data[start..start + tuple_size])?;
                tuple.set_record_id(Some(RecordId::new(pid, slot)));
                tuples.push(Some(tuple));
            } else {
                tuples.push(None);
            }
        }

        Ok(Self {
            pid,
            desc,
            header,
            tuples,
            dirtier: None,
            before_image: data.to_vec(),
        })
    }

    /// Byte contents of a freshly created page with every slot free.
    pub fn empty_page_data() -> Vec<u8> {
        vec![0u8; page_size()]
    }

    /// Re-serializes the page into its on-disk representation.
    pub fn page_data(&self) -> DbResult<Vec<u8>> {
        let mut data = Vec::with_capacity(page_size());
        data.extend_from_slice(&self.header);

        let tuple_size = self.desc.byte_size();
        for slot in &self.tuples {
            match slot {
                Some(tuple) => data.extend_from_slice(&tuple.serialize()?),
                None => data.extend(std::iter::repeat(0u8).take(tuple_size)),
            }
        }

        data.resize(page_size(), 0);
        Ok(data)
    }

    pub fn id(&self) -> PageId {
        self.pid
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn num_slots(&self) -> usize {
        self.tuples.len()
    }

    pub fn num_empty_slots(&self) -> usize {
        self.tuples.iter().filter(|slot| slot.is_none()).count()
    }

    pub fn slot_used(&self, slot: usize) -> bool {
        slot < self.tuples.len() && self.header[slot / 8] & (0x80 >> (slot % 8)) != 0
    }

    fn set_slot(&mut self, slot: usize, used: bool) {
        if used {
            self.header[slot / 8] |= 0x80 >> (slot % 8);
        } else {
            self.header[slot / 8] &= !(0x80 >> (slot % 8));
        }
    }

    /// Places the tuple in the lowest free slot and stamps its record id.
    pub fn insert_tuple(&mut self, mut tuple: Tuple) -> DbResult<()> {
        if tuple.desc().as_ref() != self.desc.as_ref() {
            return Err(DbError::Db(format!(
                "tuple schema does not match table schema on page {:?}",
                self.pid
            )));
        }
        let slot = self
            .tuples
            .iter()
            .position(|s| s.is_none())
            .ok_or_else(|| DbError::Db(format!("page {:?} has no empty slots", self.pid)))?;

        tuple.set_record_id(Some(RecordId::new(self.pid, slot)));
        self.set_slot(slot, true);
        self.tuples[slot] = Some(tuple);
        Ok(())
    }

    /// Clears the slot named by the tuple's record id.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> DbResult<()> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| DbError::Db("tuple has no record id".to_string()))?;
        if rid.page_id != self.pid {
            return Err(DbError::Db(format!(
                "tuple belongs to page {:?}, not {:?}",
                rid.page_id, self.pid
            )));
        }
        if !self.slot_used(rid.slot) {
            return Err(DbError::Db(format!(
                "slot {} on page {:?} is already empty",
                rid.slot, self.pid
            )));
        }
        self.set_slot(rid.slot, false);
        self.tuples[rid.slot] = None;
        Ok(())
    }

    /// Iterates the live tuples in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().filter_map(|slot| slot.as_ref())
    }

    /// The transaction that last mutated this page, if it has uncommitted
    /// changes. At most one dirtier at a time.
    pub fn dirtier(&self) -> Option<TransactionId> {
        self.dirtier
    }

    pub fn mark_dirty(&mut self, dirtier: Option<TransactionId>) {
        self.dirtier = dirtier;
    }

    /// Snapshot of the page bytes at load or last commit; what abort reverts
    /// to and what the WAL records as the before image.
    pub fn before_image_data(&self) -> &[u8] {
        &self.before_image
    }

    /// Freezes the current contents as the new before image. Called after a
    /// successful commit flush.
    pub fn set_before_image(&mut self) -> DbResult<()> {
        self.before_image = self.page_data()?;
        Ok(())
    }
}
