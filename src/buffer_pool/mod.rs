//! Buffer pool management for page caching.
//!
//! This module implements a buffer pool that caches disk pages in a fixed
//! set of in-memory frames. It provides:
//! - Page pinning and unpinning with reference counting
//! - LRU-K eviction for victim selection
//! - An extendible hash table mapping page ids to frames
//! - `PageHandle` for byte-level page access
//!
//! # Architecture
//!
//! A page table (page id → frame id) answers residency; a free list feeds
//! empty frames; the replacer picks victims among unpinned frames. Every
//! public operation runs under the pool-wide latch and may call into the
//! page table and replacer, each of which takes its own latch; the two are
//! never held together, so the lock graph is a tree.
//!
//! # Example
//!
//! ```ignore
//! let pool = BufferPoolManager::new(config, Box::new(disk), None)?;
//! let handle = pool.new_page()?;
//! let page_id = handle.page_id();
//! // Read/write page data via the handle, then release the pin:
//! pool.unpin_page(page_id, true);
//! ```

mod frame;
mod replacer;

pub use frame::{Frame, FrameId};
pub use replacer::LruKReplacer;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};

use crate::container::ExtendibleHashTable;
use crate::error::{QuarryError, Result};
use crate::page::{DiskManager, PageId};
use crate::wal::LogManager;
use crate::BufferPoolConfig;

/// Pool state guarded by the pool-wide latch.
struct PoolState {
    /// Frame ids with no page loaded, handed out FIFO.
    free_list: VecDeque<FrameId>,
    /// Next page id to allocate.
    next_page_id: u32,
    /// Disk manager for page I/O.
    disk: Box<dyn DiskManager>,
}

/// Buffer pool manager over a fixed set of page frames.
pub struct BufferPoolManager {
    /// Number of frames, fixed at construction.
    pool_size: usize,
    /// The frames themselves. Individual frame locks order data access;
    /// metadata transitions happen only under the pool latch.
    frames: Vec<RwLock<Frame>>,
    /// Maps resident page ids to frame ids.
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// Victim selection among unpinned frames.
    replacer: LruKReplacer,
    /// The pool-wide latch; held for the entire duration of every public
    /// operation.
    state: Mutex<PoolState>,
    /// Log manager handle, kept for the embedding engine; never invoked here.
    log_manager: Option<Arc<LogManager>>,
    /// Counter for cache hits (page found in the pool).
    cache_hits: AtomicU64,
    /// Counter for cache misses (page had to be loaded from disk).
    cache_misses: AtomicU64,
    /// Counter for pages evicted.
    evictions: AtomicU64,
}

impl BufferPoolManager {
    /// Creates a buffer pool from the given configuration and collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is 0.
    pub fn new(
        config: BufferPoolConfig,
        disk: Box<dyn DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Result<Self> {
        if config.pool_size == 0 {
            return Err(QuarryError::BufferPoolError(
                "pool_size must be greater than 0".into(),
            ));
        }
        if config.replacer_k == 0 {
            return Err(QuarryError::BufferPoolError(
                "replacer_k must be greater than 0".into(),
            ));
        }
        if config.bucket_size == 0 {
            return Err(QuarryError::BufferPoolError(
                "bucket_size must be greater than 0".into(),
            ));
        }

        let frames = (0..config.pool_size).map(|i| RwLock::new(Frame::new(i))).collect();

        Ok(Self {
            pool_size: config.pool_size,
            frames,
            page_table: ExtendibleHashTable::new(config.bucket_size),
            replacer: LruKReplacer::new(config.pool_size, config.replacer_k),
            state: Mutex::new(PoolState {
                free_list: (0..config.pool_size).collect(),
                next_page_id: 0,
                disk,
            }),
            log_manager,
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Returns the number of frames in the pool.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of pages currently cached.
    #[must_use]
    pub fn size(&self) -> usize {
        let state = self.state.lock();
        self.pool_size - state.free_list.len()
    }

    /// Returns the log manager handle, if one was supplied.
    #[must_use]
    pub fn log_manager(&self) -> Option<&Arc<LogManager>> {
        self.log_manager.as_ref()
    }

    /// Allocates a new zero-filled page, pinning it in a frame.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::PoolExhausted`] if every frame is pinned, or a
    /// storage error if a victim's dirty page fails to write back.
    pub fn new_page(&self) -> Result<PageHandle<'_>> {
        let mut state = self.state.lock();

        let Some(frame_id) = self.claim_frame(&mut state)? else {
            return Err(QuarryError::PoolExhausted);
        };

        let page_id = PageId::new(state.next_page_id);
        state.next_page_id += 1;

        {
            let mut frame = self.frames[frame_id].write();
            frame.page_id = Some(page_id);
            frame.pin_count = 1;
            frame.dirty = false;
        }
        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok(PageHandle {
            pool: self,
            frame_id,
            page_id,
        })
    }

    /// Pins the given page, loading it from disk on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::PoolExhausted`] if every frame is pinned, or a
    /// storage error from the disk manager. A failed read leaves the pool
    /// unchanged apart from returning the claimed frame to the free list.
    ///
    /// # Panics
    ///
    /// Panics if called with [`PageId::INVALID`].
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageHandle<'_>> {
        assert!(page_id.is_valid(), "fetch_page on the invalid page id");
        let mut state = self.state.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            self.frames[frame_id].write().pin();
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(PageHandle {
                pool: self,
                frame_id,
                page_id,
            });
        }

        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        let Some(frame_id) = self.claim_frame(&mut state)? else {
            return Err(QuarryError::PoolExhausted);
        };

        {
            let mut frame = self.frames[frame_id].write();
            if let Err(e) = state.disk.read_page(page_id, &mut frame.data) {
                // Nothing was published yet; the frame goes back to the
                // free list and the error propagates.
                frame.reset();
                state.free_list.push_back(frame_id);
                return Err(e);
            }
            frame.page_id = Some(page_id);
            frame.pin_count = 1;
            frame.dirty = false;
        }
        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok(PageHandle {
            pool: self,
            frame_id,
            page_id,
        })
    }

    /// Releases one pin on the page, folding `is_dirty` into its dirty flag.
    ///
    /// A true `is_dirty` is sticky; a false never clears it. Returns false if
    /// the page is not cached or its pin count is already 0.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _state = self.state.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };
        let mut frame = self.frames[frame_id].write();
        if frame.pin_count == 0 {
            return false;
        }
        frame.unpin();
        frame.dirty |= is_dirty;
        if frame.pin_count == 0 {
            drop(frame);
            self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Writes the page's bytes to disk regardless of the dirty flag, then
    /// clears the flag.
    ///
    /// Returns `Ok(false)` if the page is not cached.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write fails; the dirty flag is left
    /// untouched in that case.
    ///
    /// # Panics
    ///
    /// Panics if called with [`PageId::INVALID`].
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        assert!(page_id.is_valid(), "flush_page on the invalid page id");
        let mut state = self.state.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(false);
        };
        let mut frame = self.frames[frame_id].write();
        state.disk.write_page(page_id, &frame.data)?;
        frame.dirty = false;
        Ok(true)
    }

    /// Writes every cached page to disk, clearing each frame's dirty flag.
    ///
    /// # Errors
    ///
    /// Returns the first storage error encountered; earlier frames stay
    /// flushed.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut state = self.state.lock();

        for frame_lock in &self.frames {
            let mut frame = frame_lock.write();
            if let Some(page_id) = frame.page_id {
                state.disk.write_page(page_id, &frame.data)?;
                frame.dirty = false;
            }
        }
        debug!("flushed all cached pages");
        Ok(())
    }

    /// Deletes the page, freeing its frame and deallocating its id.
    ///
    /// Returns `Ok(true)` if the page was not cached (only the deallocation
    /// happens) or was deleted; `Ok(false)` if it is pinned, in which case
    /// nothing is deallocated and the caller retries after unpinning.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the write-back or deallocation.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            state.disk.deallocate_page(page_id)?;
            return Ok(true);
        };

        let mut frame = self.frames[frame_id].write();
        if frame.pin_count > 0 {
            return Ok(false);
        }
        if frame.dirty {
            state.disk.write_page(page_id, &frame.data)?;
            frame.dirty = false;
        }

        self.replacer.remove(frame_id);
        self.page_table.remove(&page_id);
        frame.reset();
        drop(frame);
        state.free_list.push_back(frame_id);
        state.disk.deallocate_page(page_id)?;
        debug!("deleted {page_id}, frame {frame_id} freed");
        Ok(true)
    }

    /// Claims a frame for a new resident page: the free list's head if any,
    /// otherwise a victim from the replacer (written back if dirty and
    /// unmapped from the page table).
    ///
    /// Returns `Ok(None)` when the free list is empty and nothing is
    /// evictable. Assumes the pool latch is held.
    fn claim_frame(&self, state: &mut PoolState) -> Result<Option<FrameId>> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.replacer.evict() else {
            return Ok(None);
        };

        let mut frame = self.frames[frame_id].write();
        if let Some(old_page_id) = frame.page_id {
            if frame.dirty {
                if let Err(e) = state.disk.write_page(old_page_id, &frame.data) {
                    // Keep the page cached and evictable; the replacer
                    // already dropped it, so re-arm it before bailing out.
                    drop(frame);
                    self.replacer.record_access(frame_id);
                    self.replacer.set_evictable(frame_id, true);
                    return Err(e);
                }
            }
            self.page_table.remove(&old_page_id);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!("evicted {old_page_id} from frame {frame_id}");
        }
        frame.reset();
        Ok(Some(frame_id))
    }

    /// Returns buffer pool statistics.
    #[must_use]
    pub fn stats(&self) -> BufferPoolStats {
        let state = self.state.lock();
        let mut dirty_pages = 0;
        let mut pinned_pages = 0;

        for frame_lock in &self.frames {
            let frame = frame_lock.read();
            if frame.page_id.is_some() {
                if frame.dirty {
                    dirty_pages += 1;
                }
                if frame.pin_count > 0 {
                    pinned_pages += 1;
                }
            }
        }

        BufferPoolStats {
            pool_size: self.pool_size,
            pages_cached: self.pool_size - state.free_list.len(),
            dirty_pages,
            pinned_pages,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Resets the cache statistics counters.
    pub fn reset_stats(&self) {
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

/// Handle to a pinned page.
///
/// The handle borrows the pool; the pin it represents must be released with
/// exactly one matching [`BufferPoolManager::unpin_page`] call. Dropping the
/// handle without unpinning leaks the pin (the frame can never be evicted),
/// which is a caller bug but not unsound.
pub struct PageHandle<'a> {
    pool: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
}

impl PageHandle<'_> {
    /// Returns the page id.
    #[must_use]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the frame holding the page.
    #[must_use]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the page's current pin count.
    #[must_use]
    pub fn pin_count(&self) -> u32 {
        self.pool.frames[self.frame_id].read().pin_count
    }

    /// Returns whether the page is marked dirty.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.pool.frames[self.frame_id].read().dirty
    }

    /// Returns a read-only view of the page data.
    ///
    /// The view holds the frame's read lock; drop it before calling pool
    /// operations that touch this page, or those operations will block on
    /// the frame lock.
    #[must_use]
    pub fn data(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.pool.frames[self.frame_id].read(), |frame| {
            &frame.data[..]
        })
    }

    /// Returns a mutable view of the page data.
    ///
    /// The view holds the frame's write lock, so concurrent handles to the
    /// same page cannot observe a half-written page; drop it before calling
    /// pool operations that touch this page. Mutation alone does not mark
    /// the page dirty: pass `is_dirty = true` to the matching `unpin_page`
    /// call.
    pub fn data_mut(&mut self) -> MappedRwLockWriteGuard<'_, [u8]> {
        RwLockWriteGuard::map(self.pool.frames[self.frame_id].write(), |frame| {
            &mut frame.data[..]
        })
    }
}

impl std::fmt::Debug for PageHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle")
            .field("page_id", &self.page_id)
            .field("frame_id", &self.frame_id)
            .finish()
    }
}

/// Statistics about the buffer pool state.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Number of frames in the pool.
    pub pool_size: usize,
    /// Current number of cached pages.
    pub pages_cached: usize,
    /// Number of dirty pages.
    pub dirty_pages: usize,
    /// Number of pinned pages.
    pub pinned_pages: usize,
    /// Number of cache hits (page found in the pool).
    pub cache_hits: u64,
    /// Number of cache misses (page had to be loaded from disk).
    pub cache_misses: u64,
    /// Number of pages evicted.
    pub evictions: u64,
}

impl BufferPoolStats {
    /// Calculates the cache hit rate as a fraction (0.0 to 1.0).
    ///
    /// Returns `None` if there have been no cache accesses.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            None
        } else {
            Some(self.cache_hits as f64 / total as f64)
        }
    }

    /// Returns the total number of cache accesses (hits + misses).
    #[must_use]
    pub fn total_accesses(&self) -> u64 {
        self.cache_hits + self.cache_misses
    }
}
