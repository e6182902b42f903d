//! Buffer pool manager for page-level caching and I/O.
//!
//! The buffer pool sits between the storage layer and the executor, providing:
//! - CLOCK-based in-memory page cache with bounded capacity
//! - Lazy loading and eviction with automatic dirty page flushing
//! - mmap-backed reads for mid-sized table files
//! - File-per-table storage with sequential page IDs
//!
//! # Example
//!
//! ```no_run
//! use buffer::{Pager, FilePager};
//! use common::{TableId, PageId};
//!
//! let mut pager = FilePager::new("/tmp/db", 100);
//! let table = TableId(1);
//!
//! // Allocate a new page
//! let page_id = pager.allocate_page(table).unwrap();
//!
//! // Fetch and modify
//! {
//!     let page = pager.fetch_page(table, page_id).unwrap();
//!     page.data[0] = 42;
//! }
//!
//! // Flush to disk
//! pager.flush().unwrap();
//! ```

#[cfg(test)]
mod tests_macro_demo;

use common::{DbError, DbResult, PageId, TableId};
use hashbrown::HashMap;
use memmap2::Mmap;
use std::{
    fs::{File, OpenOptions},
    io::{Seek, SeekFrom, Write},
    path::PathBuf,
};
use storage::{PAGE_SIZE, Page};

/// Files at least this large are read through an mmap view instead of a
/// positioned read, per the pager's `[10 MB, 50 MB]` mmap window.
const MMAP_MIN_BYTES: u64 = 10 * 1024 * 1024;
const MMAP_MAX_BYTES: u64 = 50 * 1024 * 1024;

/// Abstraction for fetching, allocating, and flushing pages.
///
/// Implementors manage the lifecycle of pages, including:
/// - Loading pages from persistent storage into memory
/// - Evicting pages when the cache is full
/// - Tracking dirty pages and flushing them to disk
pub trait Pager {
    /// Fetch a page from the buffer pool or load it from disk.
    ///
    /// Returns a mutable reference to the page in the cache. Sets the
    /// frame's reference bit (CLOCK "recently used" signal) and
    /// conservatively marks it dirty, since the trait gives no way to
    /// distinguish a read-only access from a write.
    fn fetch_page(&mut self, table: TableId, pid: PageId) -> DbResult<&mut Page>;

    /// Allocate a new page for the given table.
    ///
    /// Assigns the next sequential `PageId` and returns it.
    /// The new page is initialized with zeros and marked as dirty.
    fn allocate_page(&mut self, table: TableId) -> DbResult<PageId>;

    /// Pin a cached page, excluding it from CLOCK eviction until unpinned.
    ///
    /// No-op if the page isn't currently cached.
    fn pin(&mut self, table: TableId, pid: PageId);

    /// Unpin a previously pinned page, making it eligible for eviction again
    /// once its pin count returns to zero.
    fn unpin(&mut self, table: TableId, pid: PageId);

    /// Flush all dirty pages to disk.
    ///
    /// After flushing, all pages are marked as clean.
    fn flush(&mut self) -> DbResult<()>;

    /// Number of pages currently allocated for `table`, counting both pages
    /// already on disk and pages allocated this session but not yet flushed.
    fn num_pages(&self, table: TableId) -> DbResult<u64>;

    /// Record the LSN of the WAL record that last dirtied a cached page.
    ///
    /// No-op if the page isn't currently cached. Callers append a WAL record
    /// for a write, then call this with the LSN `wal.append` returned so the
    /// eviction sweep can tell whether that record has been fsynced yet.
    fn set_page_lsn(&mut self, table: TableId, pid: PageId, lsn: u64);

    /// Record the highest LSN known to be durable (fsynced) in the WAL.
    ///
    /// The eviction sweep refuses to write a dirty page whose last-write LSN
    /// is past this mark, enforcing write-ahead logging: a page's changes
    /// never reach disk before the WAL record describing them does.
    fn set_durable_lsn(&mut self, lsn: u64);
}

struct Frame {
    table: TableId,
    pid: PageId,
    page: Page,
    reference: bool,
    pin_count: u32,
    dirty: bool,
    /// LSN of the WAL record covering this frame's most recent write, or 0 if
    /// the page was only ever loaded/allocated and never stamped by a caller.
    lsn: u64,
}

/// File-backed buffer pool with CLOCK (second-chance) eviction.
///
/// Uses a file-per-table storage model with sequential page IDs. Each frame
/// carries a reference bit and a pin count; a circular hand sweeps the frame
/// vector, clearing reference bits it finds set and evicting the first
/// unpinned frame whose reference bit is already clear. Dirty frames are
/// flushed to disk before eviction.
pub struct FilePager {
    base_dir: PathBuf,
    max_pages: usize,
    frames: Vec<Option<Frame>>,
    index: HashMap<(TableId, PageId), usize>,
    clock_hand: usize,
    /// Highest LSN the caller has confirmed is fsynced to the WAL.
    durable_lsn: u64,
}

impl std::fmt::Debug for FilePager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePager")
            .field("base_dir", &self.base_dir)
            .field("max_pages", &self.max_pages)
            .field("resident_pages", &self.index.len())
            .finish()
    }
}

impl FilePager {
    /// Create a new file-backed pager.
    ///
    /// # Arguments
    ///
    /// * `base_dir` - Directory for table files (format: `table_{id}.tbl`)
    /// * `max_pages` - Maximum number of pages to cache in memory
    ///
    /// # Panics
    ///
    /// Panics if `max_pages` is 0.
    pub fn new(base_dir: impl Into<PathBuf>, max_pages: usize) -> Self {
        assert!(max_pages > 0, "max_pages must be > 0");
        let mut frames = Vec::with_capacity(max_pages);
        frames.resize_with(max_pages, || None);
        Self {
            base_dir: base_dir.into(),
            max_pages,
            frames,
            index: HashMap::new(),
            clock_hand: 0,
            durable_lsn: 0,
        }
    }

    /// Number of pages on disk for `table`, independent of what's cached.
    fn file_num_pages(&self, table: TableId) -> DbResult<u64> {
        let file = self.open_table_file(table)?;
        let len = file
            .metadata()
            .map_err(|e| DbError::Storage(format!("Failed to read file metadata: {}", e)))?
            .len();
        Ok(len / PAGE_SIZE as u64)
    }

    /// Get the file path for a table.
    fn table_path(&self, table: TableId) -> PathBuf {
        self.base_dir.join(format!("table_{}.tbl", table.0))
    }

    fn open_table_file(&self, table: TableId) -> DbResult<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.table_path(table))
            .map_err(|e| DbError::Storage(format!("Failed to open table file: {}", e)))
    }

    /// Load a page from disk, or create a new zero-initialized page if it doesn't exist.
    fn load_page(&self, table: TableId, pid: PageId) -> DbResult<Page> {
        let file = self.open_table_file(table)?;
        let len = file
            .metadata()
            .map_err(|e| DbError::Storage(format!("Failed to read file metadata: {}", e)))?
            .len();

        let offset = pid.0 * PAGE_SIZE as u64;
        if offset >= len {
            // Page doesn't exist yet, return zero-initialized page
            return Ok(Page::new(pid.0));
        }

        if (MMAP_MIN_BYTES..=MMAP_MAX_BYTES).contains(&len) {
            return self.load_page_mmap(&file, pid, offset, len);
        }

        self.load_page_positioned(file, pid, offset)
    }

    fn load_page_mmap(&self, file: &File, pid: PageId, offset: u64, len: u64) -> DbResult<Page> {
        // SAFETY: the mapped file is only ever mutated through this same
        // process's positioned writes, which are serialized behind the
        // pager's exclusive access (callers hold `&mut FilePager`).
        let mmap = unsafe { Mmap::map(file) }
            .map_err(|e| DbError::Storage(format!("Failed to mmap table file: {}", e)))?;
        let start = offset as usize;
        let end = (start + PAGE_SIZE).min(len as usize);
        if end - start < PAGE_SIZE {
            return Err(DbError::Storage(format!(
                "Partial page read via mmap: expected {} bytes, got {}",
                PAGE_SIZE,
                end - start
            )));
        }
        tracing::trace!(page = pid.0, "mmap page read");
        Ok(Page {
            id: pid.0,
            data: mmap[start..end].to_vec(),
        })
    }

    fn load_page_positioned(&self, mut file: File, pid: PageId, offset: u64) -> DbResult<Page> {
        use std::io::Read;

        file.seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::Storage(format!("Failed to seek to page: {}", e)))?;

        let mut buf = vec![0u8; PAGE_SIZE];
        let n = file
            .read(&mut buf)
            .map_err(|e| DbError::Storage(format!("Failed to read page: {}", e)))?;

        if n < PAGE_SIZE {
            return Err(DbError::Storage(format!(
                "Partial page read: expected {} bytes, got {}",
                PAGE_SIZE, n
            )));
        }

        Ok(Page { id: pid.0, data: buf })
    }

    /// Write a page to disk.
    fn write_page(&self, table: TableId, page: &Page) -> DbResult<()> {
        let mut file = self.open_table_file(table)?;

        let offset = page.id * PAGE_SIZE as u64;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::Storage(format!("Failed to seek to page: {}", e)))?;

        file.write_all(&page.data)
            .map_err(|e| DbError::Storage(format!("Failed to write page: {}", e)))?;

        Ok(())
    }

    /// Find a free frame slot, or run the CLOCK sweep to evict one.
    ///
    /// Returns `CacheFull` if every frame is pinned.
    fn find_or_evict_slot(&mut self) -> DbResult<usize> {
        if let Some(slot) = self.frames.iter().position(|f| f.is_none()) {
            return Ok(slot);
        }

        let len = self.frames.len();
        for _ in 0..(2 * len) {
            let slot = self.clock_hand;
            self.clock_hand = (self.clock_hand + 1) % len;

            let frame = self.frames[slot]
                .as_mut()
                .expect("frame vector is fully occupied at this point");

            if frame.pin_count > 0 {
                continue;
            }
            if frame.reference {
                frame.reference = false;
                continue;
            }
            // WAL-before-data: a dirty page whose last write isn't fsynced
            // yet can't be evicted, or the update could reach disk before
            // the WAL record describing it — treat it like a referenced
            // frame and give it another lap instead.
            if frame.dirty && frame.lsn > self.durable_lsn {
                continue;
            }

            let victim = self.frames[slot].take().unwrap();
            self.index.remove(&(victim.table, victim.pid));
            if victim.dirty {
                self.write_page(victim.table, &victim.page)?;
            }
            tracing::debug!(table = victim.table.0, page = victim.pid.0, "clock eviction");
            return Ok(slot);
        }

        Err(DbError::Storage(
            "buffer pool exhausted: every frame is pinned (CacheFull)".into(),
        ))
    }
}

impl Pager for FilePager {
    fn fetch_page(&mut self, table: TableId, pid: PageId) -> DbResult<&mut Page> {
        if let Some(&slot) = self.index.get(&(table, pid)) {
            let frame = self.frames[slot].as_mut().unwrap();
            frame.reference = true;
            frame.dirty = true;
            return Ok(&mut frame.page);
        }

        let page = self.load_page(table, pid)?;
        let slot = self.find_or_evict_slot()?;

        self.frames[slot] = Some(Frame {
            table,
            pid,
            page,
            reference: true,
            pin_count: 0,
            dirty: true,
            lsn: 0,
        });
        self.index.insert((table, pid), slot);

        Ok(&mut self.frames[slot].as_mut().unwrap().page)
    }

    fn allocate_page(&mut self, table: TableId) -> DbResult<PageId> {
        let file = self.open_table_file(table)?;
        let len = file
            .metadata()
            .map_err(|e| DbError::Storage(format!("Failed to read file metadata: {}", e)))?
            .len();

        let pid = PageId(len / PAGE_SIZE as u64);
        let page = Page::new(pid.0);

        // Extend the file immediately so subsequent size-based mmap decisions see it.
        self.write_page(table, &page)?;

        let slot = self.find_or_evict_slot()?;
        self.frames[slot] = Some(Frame {
            table,
            pid,
            page,
            reference: true,
            pin_count: 0,
            dirty: true,
            lsn: 0,
        });
        self.index.insert((table, pid), slot);

        tracing::debug!(table = table.0, page = pid.0, "allocated page");
        Ok(pid)
    }

    fn pin(&mut self, table: TableId, pid: PageId) {
        if let Some(&slot) = self.index.get(&(table, pid)) {
            self.frames[slot].as_mut().unwrap().pin_count += 1;
        }
    }

    fn unpin(&mut self, table: TableId, pid: PageId) {
        if let Some(&slot) = self.index.get(&(table, pid)) {
            let frame = self.frames[slot].as_mut().unwrap();
            frame.pin_count = frame.pin_count.saturating_sub(1);
        }
    }

    fn flush(&mut self) -> DbResult<()> {
        let dirty_slots: Vec<usize> = self
            .frames
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.as_ref().filter(|f| f.dirty).map(|_| i))
            .collect();

        for slot in dirty_slots {
            let frame = self.frames[slot].as_ref().unwrap();
            self.write_page(frame.table, &frame.page)?;
            self.frames[slot].as_mut().unwrap().dirty = false;
        }

        Ok(())
    }

    fn num_pages(&self, table: TableId) -> DbResult<u64> {
        self.file_num_pages(table)
    }

    fn set_page_lsn(&mut self, table: TableId, pid: PageId, lsn: u64) {
        if let Some(&slot) = self.index.get(&(table, pid)) {
            self.frames[slot].as_mut().unwrap().lsn = lsn;
        }
    }

    fn set_durable_lsn(&mut self, lsn: u64) {
        self.durable_lsn = lsn;
    }
}
