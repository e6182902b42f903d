//! Heap table implementation routed through the buffer pool's `Pager`.
//!
//! Mirrors `storage::HeapFile`'s page-format logic exactly (same header, slot
//! directory, and free-space bitmap), but reads and writes pages through a
//! `&mut dyn buffer::Pager` instead of a raw `File`, so every access
//! participates in the pool's CLOCK eviction and WAL-before-data ordering.

use bincode::serde::{decode_from_slice, encode_to_vec};
use common::{DbError, DbResult, PageId, RecordId, Row, TableId};
use storage::{bincode_config, FreeSpaceBitmap, HeapTable, Slot, MIN_USEFUL_FREE_BYTES};

pub struct PagedHeapTable<'a> {
    pager: &'a mut dyn buffer::Pager,
    table_id: TableId,
    free_space: FreeSpaceBitmap,
}

impl<'a> PagedHeapTable<'a> {
    pub fn new(pager: &'a mut dyn buffer::Pager, table_id: TableId) -> Self {
        Self {
            pager,
            table_id,
            free_space: FreeSpaceBitmap::default(),
        }
    }

    fn ensure_page_exists(&self, page_id: PageId) -> DbResult<()> {
        if page_id.0 >= self.pager.num_pages(self.table_id)? {
            return Err(DbError::Storage(format!("page {} not allocated", page_id.0)));
        }
        Ok(())
    }

    /// Find a page the bitmap believes has room for `bytes_len` bytes,
    /// verifying against the real header since the bitmap only tracks a
    /// coarse above/below-threshold bit rather than an exact byte count.
    fn find_page_with_space(&mut self, bytes_len: usize) -> DbResult<Option<PageId>> {
        let num_pages = self.pager.num_pages(self.table_id)?;
        let candidates: Vec<u64> = self.free_space.candidates(num_pages).collect();
        for page_id in candidates {
            let pid = PageId(page_id);
            let page = self.pager.fetch_page(self.table_id, pid)?;
            if page.can_fit(bytes_len)? {
                return Ok(Some(pid));
            }
            self.free_space.mark_full(page_id);
        }
        Ok(None)
    }
}

impl<'a> HeapTable for PagedHeapTable<'a> {
    fn insert(&mut self, row: &Row) -> DbResult<RecordId> {
        let bytes = encode_to_vec(row, bincode_config())
            .map_err(|e| DbError::Storage(format!("serialize row failed: {e}")))?;

        let mut pid = match self.find_page_with_space(bytes.len())? {
            Some(pid) => pid,
            None => self.pager.allocate_page(self.table_id)?,
        };
        if !self.pager.fetch_page(self.table_id, pid)?.can_fit(bytes.len())? {
            pid = self.pager.allocate_page(self.table_id)?;
        }

        let page = self.pager.fetch_page(self.table_id, pid)?;
        let slot = page.append_tuple(&bytes)?;
        let free = page.free_space()?;
        if free >= MIN_USEFUL_FREE_BYTES {
            self.free_space.mark_has_space(pid.0);
        } else {
            self.free_space.mark_full(pid.0);
        }

        let rid = RecordId { page_id: pid, slot };
        tracing::debug!(table = self.table_id.0, page = rid.page_id.0, slot = rid.slot, "paged heap: inserted row");
        Ok(rid)
    }

    fn get(&mut self, rid: RecordId) -> DbResult<Row> {
        self.ensure_page_exists(rid.page_id)?;
        let page = self.pager.fetch_page(self.table_id, rid.page_id)?;
        let header = page.header()?;
        if rid.slot >= header.num_slots {
            return Err(DbError::Storage(format!("invalid slot {}", rid.slot)));
        }
        let slot = page.read_slot(rid.slot)?;
        if slot.is_empty() {
            return Err(DbError::Storage("slot empty".into()));
        }
        let start = slot.offset as usize;
        let end = start + slot.len as usize;
        let (row, _): (Row, _) = decode_from_slice(&page.data[start..end], bincode_config())
            .map_err(|e| DbError::Storage(format!("deserialize row failed: {e}")))?;
        Ok(row.with_rid(rid))
    }

    fn update(&mut self, rid: RecordId, row: &Row) -> DbResult<()> {
        self.ensure_page_exists(rid.page_id)?;
        let bytes = encode_to_vec(row, bincode_config())
            .map_err(|e| DbError::Storage(format!("serialize row failed: {e}")))?;

        let page = self.pager.fetch_page(self.table_id, rid.page_id)?;
        let header = page.header()?;
        if rid.slot >= header.num_slots {
            return Err(DbError::Storage(format!("invalid slot {}", rid.slot)));
        }
        let slot = page.read_slot(rid.slot)?;
        if slot.is_empty() {
            return Err(DbError::Storage("slot already empty".into()));
        }

        // Fits in the existing slot: overwrite in place so the RecordId is stable.
        // Indexes (btree/hash/PrimaryKeyIndex) cache RIDs and have no way to learn
        // about a relocation.
        if bytes.len() <= slot.len as usize {
            let start = slot.offset as usize;
            let end = start + bytes.len();
            page.data[start..end].copy_from_slice(&bytes);
            let new_slot = Slot {
                offset: slot.offset,
                len: bytes.len() as u16,
            };
            page.write_slot(rid.slot, &new_slot)?;
            return Ok(());
        }

        // Row grew past its original slot; relocate since this page format has
        // no in-place compaction.
        // TODO: any index caching this RID sees stale data until it's rebuilt.
        tracing::debug!(table = self.table_id.0, page = rid.page_id.0, slot = rid.slot, "paged heap: row outgrew its slot, relocating");
        self.delete(rid)?;
        self.insert(row)?;
        Ok(())
    }

    fn delete(&mut self, rid: RecordId) -> DbResult<()> {
        self.ensure_page_exists(rid.page_id)?;
        let page = self.pager.fetch_page(self.table_id, rid.page_id)?;
        let header = page.header()?;
        if rid.slot >= header.num_slots {
            return Err(DbError::Storage(format!("invalid slot {}", rid.slot)));
        }
        let mut slot = page.read_slot(rid.slot)?;
        if slot.is_empty() {
            return Err(DbError::Storage("slot already empty".into()));
        }
        slot.len = 0;
        page.write_slot(rid.slot, &slot)?;
        tracing::debug!(table = self.table_id.0, page = rid.page_id.0, slot = rid.slot, "paged heap: deleted row");
        Ok(())
    }

    fn get_encoded(&mut self, rid: RecordId) -> DbResult<Vec<u8>> {
        self.ensure_page_exists(rid.page_id)?;
        let page = self.pager.fetch_page(self.table_id, rid.page_id)?;
        let header = page.header()?;
        if rid.slot >= header.num_slots {
            return Err(DbError::Storage(format!("invalid slot {}", rid.slot)));
        }
        let slot = page.read_slot(rid.slot)?;
        if slot.is_empty() {
            return Err(DbError::Storage("slot empty".into()));
        }
        let start = slot.offset as usize;
        let end = start + slot.len as usize;
        Ok(page.data[start..end].to_vec())
    }

    fn scan_all(&mut self) -> DbResult<Vec<Row>> {
        let mut rows = Vec::new();
        let num_pages = self.pager.num_pages(self.table_id)?;
        for page_id in 0..num_pages {
            let pid = PageId(page_id);
            let page = self.pager.fetch_page(self.table_id, pid)?;
            let header = page.header()?;
            for slot_idx in 0..header.num_slots {
                let slot = page.read_slot(slot_idx)?;
                if slot.is_empty() {
                    continue;
                }
                let start = slot.offset as usize;
                let end = start + slot.len as usize;
                let (row, _): (Row, _) = decode_from_slice(&page.data[start..end], bincode_config())
                    .map_err(|e| DbError::Storage(format!("deserialize row failed: {e}")))?;
                rows.push(row.with_rid(RecordId { page_id: pid, slot: slot_idx }));
            }
        }
        Ok(rows)
    }
}
