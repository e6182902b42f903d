use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::mem::size_of;
use std::path::Path;

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_into_slice, encode_to_vec};
use common::{DbError, DbResult, PageId, RecordId, Row};

pub const PAGE_SIZE: usize = 4096;
const HEADER_BYTES: usize = size_of::<PageHeader>();
const SLOT_BYTES: usize = size_of::<Slot>();

/// A page with fewer free bytes than this is considered full by the
/// free-space bitmap, even though a tiny row might still squeeze in.
pub const MIN_USEFUL_FREE_BYTES: usize = SLOT_BYTES + 32;

pub fn bincode_config() -> impl Config {
    config::legacy()
}

#[derive(Debug, Clone)]
pub struct Page {
    pub id: u64,
    pub data: Vec<u8>,
}

impl Page {
    pub fn new(id: u64) -> Self {
        let mut page = Self {
            id,
            data: vec![0u8; PAGE_SIZE],
        };
        page.write_header(&PageHeader::default())
            .expect("initialize page header");
        page
    }

    /// Decode this page's header.
    pub fn header(&self) -> DbResult<PageHeader> {
        let (header, read) = decode_from_slice(&self.data[..HEADER_BYTES], bincode_config())
            .map_err(|e| DbError::Storage(format!("read page header failed: {e}")))?;
        debug_assert_eq!(read, HEADER_BYTES);
        Ok(header)
    }

    /// Encode and write this page's header.
    pub fn write_header(&mut self, header: &PageHeader) -> DbResult<()> {
        let written = encode_into_slice(header, &mut self.data[..HEADER_BYTES], bincode_config())
            .map_err(|e| DbError::Storage(format!("write page header failed: {e}")))?;
        debug_assert_eq!(written, HEADER_BYTES);
        Ok(())
    }

    fn slot_offset(slot_idx: u16) -> usize {
        HEADER_BYTES + slot_idx as usize * SLOT_BYTES
    }

    /// Decode the slot directory entry at `slot_idx`.
    pub fn read_slot(&self, slot_idx: u16) -> DbResult<Slot> {
        let start = Self::slot_offset(slot_idx);
        let end = start + SLOT_BYTES;
        if end > PAGE_SIZE {
            return Err(DbError::Storage(format!("slot {slot_idx} out of bounds")));
        }
        let (slot, read) = decode_from_slice(&self.data[start..end], bincode_config())
            .map_err(|e| DbError::Storage(format!("read slot failed: {e}")))?;
        debug_assert_eq!(read, SLOT_BYTES);
        Ok(slot)
    }

    /// Encode and write the slot directory entry at `slot_idx`.
    pub fn write_slot(&mut self, slot_idx: u16, slot: &Slot) -> DbResult<()> {
        let start = Self::slot_offset(slot_idx);
        let end = start + SLOT_BYTES;
        if end > PAGE_SIZE {
            return Err(DbError::Storage(format!("slot {slot_idx} out of bounds")));
        }
        let written = encode_into_slice(slot, &mut self.data[start..end], bincode_config())
            .map_err(|e| DbError::Storage(format!("write slot failed: {e}")))?;
        debug_assert_eq!(written, SLOT_BYTES);
        Ok(())
    }

    /// Bytes left for tuple payloads after the header and slot directory.
    pub fn free_space(&self) -> DbResult<usize> {
        let header = self.header()?;
        let slots_start = HEADER_BYTES + header.num_slots as usize * SLOT_BYTES;
        let free_offset = usize::from(header.free_offset);
        Ok(free_offset.saturating_sub(slots_start))
    }

    /// Whether a new tuple of `payload_len` bytes (plus its slot entry) still fits.
    pub fn can_fit(&self, payload_len: usize) -> DbResult<bool> {
        let needed = payload_len + SLOT_BYTES;
        Ok(self.free_space()? >= needed)
    }

    /// Append a tuple's encoded bytes, allocating the next slot for it.
    pub fn append_tuple(&mut self, bytes: &[u8]) -> DbResult<u16> {
        if bytes.len() > u16::MAX as usize {
            return Err(DbError::Storage("row exceeds maximum tuple size".into()));
        }
        let mut header = self.header()?;
        if header.num_slots == u16::MAX {
            return Err(DbError::Storage("slot index overflow".into()));
        }
        if !self.can_fit(bytes.len())? {
            return Err(DbError::Storage("page full".into()));
        }
        let slot_idx = header.num_slots;
        let len = bytes.len() as u16;
        let new_free_offset = header.free_offset - len;
        self.data[new_free_offset as usize..header.free_offset as usize].copy_from_slice(bytes);

        let slot = Slot {
            offset: new_free_offset,
            len,
        };
        self.write_slot(slot_idx, &slot)?;

        header.num_slots += 1;
        header.free_offset = new_free_offset;
        self.write_header(&header)?;
        Ok(slot_idx)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PageHeader {
    pub num_slots: u16,
    pub free_offset: u16,
}

impl Default for PageHeader {
    fn default() -> Self {
        Self {
            num_slots: 0,
            free_offset: PAGE_SIZE as u16,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Slot {
    pub offset: u16,
    pub len: u16,
}

impl Slot {
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Tracks page occupancy as one bit per page: set means "no point looking
/// here, treat it as full"; clear means "has at least `MIN_USEFUL_FREE_BYTES`
/// free". Rebuilt from page headers on open rather than persisted to disk.
#[derive(Debug, Default)]
pub struct FreeSpaceBitmap {
    bytes: Vec<u8>,
}

impl FreeSpaceBitmap {
    pub fn mark_full(&mut self, page_id: u64) {
        let idx = page_id as usize;
        let byte = idx / 8;
        if byte >= self.bytes.len() {
            self.bytes.resize(byte + 1, 0);
        }
        self.bytes[byte] |= 1 << (idx % 8);
    }

    pub fn mark_has_space(&mut self, page_id: u64) {
        let idx = page_id as usize;
        let byte = idx / 8;
        if byte >= self.bytes.len() {
            self.bytes.resize(byte + 1, 0);
        }
        self.bytes[byte] &= !(1 << (idx % 8));
    }

    pub fn is_full(&self, page_id: u64) -> bool {
        let idx = page_id as usize;
        let byte = idx / 8;
        byte < self.bytes.len() && (self.bytes[byte] & (1 << (idx % 8))) != 0
    }

    /// Pages with a clear bit, in ascending order, for the insert path to try.
    pub fn candidates(&self, num_pages: u64) -> impl Iterator<Item = u64> + '_ {
        (0..num_pages).filter(move |&id| !self.is_full(id))
    }
}

pub trait HeapTable {
    fn insert(&mut self, row: &Row) -> DbResult<RecordId>;
    fn get(&mut self, rid: RecordId) -> DbResult<Row>;
    fn update(&mut self, rid: RecordId, row: &Row) -> DbResult<()>;
    fn delete(&mut self, rid: RecordId) -> DbResult<()>;
    /// Return every live row in the table along with its `RecordId`.
    ///
    /// Used to rebuild in-memory indexes (e.g. the primary key index) on
    /// first access rather than on every insert.
    fn scan_all(&mut self) -> DbResult<Vec<Row>>;
    /// Return a row's raw encoded bytes without decoding.
    ///
    /// For callers that do their own schema-aware reconstruction (e.g. a row
    /// materializer) instead of paying for `get`'s immediate bincode decode.
    fn get_encoded(&mut self, rid: RecordId) -> DbResult<Vec<u8>>;
}

#[derive(Debug)]
pub struct HeapFile {
    file: File,
    pub table_id: u64,
    free_space: FreeSpaceBitmap,
}

impl HeapFile {
    pub fn open(path: &Path, table_id: u64) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        // The bitmap starts all-clear ("every page has space") rather than
        // eagerly scanning every header on open: `find_page_with_space`
        // verifies each candidate against its real header anyway, so a
        // stale-optimistic bit costs one extra page read the first time it's
        // tried and is then corrected, instead of paying for a full-table
        // header scan up front on every open (this file is reopened per DML
        // call, so that cost would be paid far more often than it's useful).
        Ok(Self {
            file,
            table_id,
            free_space: FreeSpaceBitmap::default(),
        })
    }

    fn refresh_bitmap_entry(&mut self, page: &Page) -> DbResult<()> {
        if page.free_space()? >= MIN_USEFUL_FREE_BYTES {
            self.free_space.mark_has_space(page.id);
        } else {
            self.free_space.mark_full(page.id);
        }
        Ok(())
    }

    /// Find a page the bitmap believes has room for `needed` bytes, verifying
    /// against the real header since the bitmap only tracks a coarse
    /// above/below-threshold bit rather than an exact byte count.
    fn find_page_with_space(&mut self, needed: usize) -> DbResult<Option<Page>> {
        let num_pages = self.num_pages()?;
        let candidates: Vec<u64> = self.free_space.candidates(num_pages).collect();
        for page_id in candidates {
            let page = self.read_page(page_id)?;
            if page.free_space()? >= needed {
                return Ok(Some(page));
            }
            self.free_space.mark_full(page_id);
        }
        Ok(None)
    }

    fn file_len(&self) -> DbResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn num_pages(&self) -> DbResult<u64> {
        Ok(self.file_len()? / PAGE_SIZE as u64)
    }

    fn allocate_page(&self) -> DbResult<Page> {
        let id = self.num_pages()?;
        Ok(Page::new(id))
    }

    fn read_page(&mut self, page_id: u64) -> DbResult<Page> {
        let mut page = Page::new(page_id);
        if page_id >= self.num_pages()? {
            return Ok(page);
        }

        self.file
            .seek(SeekFrom::Start(page_id * PAGE_SIZE as u64))?;
        self.file.read_exact(&mut page.data)?;
        Ok(page)
    }

    fn write_page(&mut self, page: &Page) -> DbResult<()> {
        self.file
            .seek(SeekFrom::Start(page.id * PAGE_SIZE as u64))?;
        self.file.write_all(&page.data)?;
        self.file.flush()?;
        Ok(())
    }

    fn ensure_page_exists(&self, page_id: u64) -> DbResult<()> {
        if page_id >= self.num_pages()? {
            return Err(DbError::Storage(format!("page {page_id} not allocated")));
        }
        Ok(())
    }
}

impl HeapTable for HeapFile {
    fn insert(&mut self, row: &Row) -> DbResult<RecordId> {
        let bytes = encode_to_vec(row, bincode_config())
            .map_err(|e| DbError::Storage(format!("serialize row failed: {e}")))?;
        let needed = bytes.len() + SLOT_BYTES;

        let mut page = match self.find_page_with_space(needed)? {
            Some(page) => page,
            None => self.allocate_page()?,
        };

        if !page.can_fit(bytes.len())? {
            page = self.allocate_page()?;
        }

        let slot = page.append_tuple(&bytes)?;
        self.write_page(&page)?;
        self.refresh_bitmap_entry(&page)?;

        let rid = RecordId {
            page_id: PageId(page.id),
            slot,
        };
        tracing::debug!(table = self.table_id, page = rid.page_id.0, slot = rid.slot, "heap: inserted row");
        Ok(rid)
    }

    fn get(&mut self, rid: RecordId) -> DbResult<Row> {
        self.ensure_page_exists(rid.page_id.0)?;
        let page = self.read_page(rid.page_id.0)?;
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
        self.ensure_page_exists(rid.page_id.0)?;
        let mut page = self.read_page(rid.page_id.0)?;
        let header = page.header()?;
        if rid.slot >= header.num_slots {
            return Err(DbError::Storage(format!("invalid slot {}", rid.slot)));
        }
        let slot = page.read_slot(rid.slot)?;
        if slot.is_empty() {
            return Err(DbError::Storage("slot already empty".into()));
        }

        let bytes = encode_to_vec(row, bincode_config())
            .map_err(|e| DbError::Storage(format!("serialize row failed: {e}")))?;

        // Fits in the existing slot: overwrite in place so the RecordId is stable.
        // This matters because indexes (btree/hash/PrimaryKeyIndex) cache RIDs and
        // have no way to learn about a relocation.
        if bytes.len() <= slot.len as usize {
            let start = slot.offset as usize;
            let end = start + bytes.len();
            page.data[start..end].copy_from_slice(&bytes);
            let new_slot = Slot {
                offset: slot.offset,
                len: bytes.len() as u16,
            };
            page.write_slot(rid.slot, &new_slot)?;
            self.write_page(&page)?;
            return Ok(());
        }

        // Row grew past its original slot. Reclaiming the hole in place would need
        // page compaction, which this heap file doesn't implement; relocate instead.
        // TODO: any index caching this RID will see stale data until it's rebuilt.
        tracing::debug!(table = self.table_id, page = rid.page_id.0, slot = rid.slot, "heap: row outgrew its slot, relocating");
        self.delete(rid)?;
        self.insert(row)?;
        Ok(())
    }

    fn delete(&mut self, rid: RecordId) -> DbResult<()> {
        self.ensure_page_exists(rid.page_id.0)?;
        let mut page = self.read_page(rid.page_id.0)?;
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
        self.write_page(&page)?;
        tracing::debug!(table = self.table_id, page = rid.page_id.0, slot = rid.slot, "heap: deleted row");
        Ok(())
    }

    fn get_encoded(&mut self, rid: RecordId) -> DbResult<Vec<u8>> {
        self.ensure_page_exists(rid.page_id.0)?;
        let page = self.read_page(rid.page_id.0)?;
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
        let num_pages = self.num_pages()?;
        for page_id in 0..num_pages {
            let page = self.read_page(page_id)?;
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
                let rid = RecordId {
                    page_id: PageId(page_id),
                    slot: slot_idx,
                };
                rows.push(row.with_rid(rid));
            }
        }
        Ok(rows)
    }
}
