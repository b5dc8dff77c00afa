//! Column buffer pool
//!
//! Archetype columns store their rows in raw, type-erased buffers. Buffers are
//! sized in standard classes (powers of two between the configured minimum and
//! maximum); when a column grows, its old buffer goes back to the pool where a
//! column of the same layout can pick it up. Oversized buffers are freed.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::config::PoolConfig;

/// Pool shared by every archetype of one storage
pub type SharedBufferPool = Arc<Mutex<BufferPool>>;

/// Uninitialised storage for `capacity` items of one layout
pub struct RawBuffer {
    ptr: NonNull<u8>,
    capacity: usize,
    item: Layout,
}

// SAFETY: the buffer only ever holds `Component` values, which are Send + Sync.
unsafe impl Send for RawBuffer {}
unsafe impl Sync for RawBuffer {}

impl RawBuffer {
    /// Allocate room for `capacity` items. Zero-sized items never allocate.
    pub fn allocate(item: Layout, capacity: usize) -> Self {
        if item.size() == 0 {
            return Self {
                ptr: dangling(item),
                capacity: usize::MAX,
                item,
            };
        }
        if capacity == 0 {
            return Self {
                ptr: dangling(item),
                capacity: 0,
                item,
            };
        }

        let layout = array_layout(item, capacity);
        // SAFETY: layout has non-zero size
        let raw = unsafe { alloc(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| handle_alloc_error(layout));
        Self {
            ptr,
            capacity,
            item,
        }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Items that fit in the buffer
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn item_layout(&self) -> Layout {
        self.item
    }

    fn key(&self) -> (usize, usize, usize) {
        (self.item.size(), self.item.align(), self.capacity)
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        if self.item.size() != 0 && self.capacity != 0 {
            // SAFETY: allocated in `allocate` with this exact layout
            unsafe { dealloc(self.ptr.as_ptr(), array_layout(self.item, self.capacity)) };
        }
    }
}

fn dangling(item: Layout) -> NonNull<u8> {
    // Alignment is never zero
    NonNull::new(item.align() as *mut u8).unwrap_or(NonNull::dangling())
}

fn array_layout(item: Layout, capacity: usize) -> Layout {
    item.size()
        .checked_mul(capacity)
        .and_then(|size| Layout::from_size_align(size, item.align()).ok())
        .unwrap_or_else(|| panic!("column capacity overflow: {capacity} items of {item:?}"))
}

/// Pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Acquisitions served from a retained buffer
    pub hits: u64,
    /// Acquisitions that allocated
    pub misses: u64,
    /// Buffers handed back
    pub released: u64,
    /// Buffers currently retained
    pub retained: usize,
}

/// Recycles column buffers by (item layout, size class)
pub struct BufferPool {
    config: PoolConfig,
    free: AHashMap<(usize, usize, usize), Vec<RawBuffer>>,
    stats: PoolStats,
}

impl BufferPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            free: AHashMap::new(),
            stats: PoolStats::default(),
        }
    }

    /// Wrap a new pool for sharing between archetypes
    pub fn shared(config: PoolConfig) -> SharedBufferPool {
        Arc::new(Mutex::new(Self::new(config)))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Buffer holding at least `min_capacity` items
    pub fn acquire(&mut self, item: Layout, min_capacity: usize) -> RawBuffer {
        if item.size() == 0 {
            return RawBuffer::allocate(item, 0);
        }

        let class = self.config.size_class(min_capacity);
        if let Some(buffer) = self
            .free
            .get_mut(&(item.size(), item.align(), class))
            .and_then(Vec::pop)
        {
            self.stats.hits += 1;
            self.stats.retained -= 1;
            return buffer;
        }

        self.stats.misses += 1;
        RawBuffer::allocate(item, class)
    }

    /// Return a buffer. It must not hold live values.
    pub fn release(&mut self, buffer: RawBuffer) {
        self.stats.released += 1;
        if buffer.item.size() == 0 || !self.config.is_standard(buffer.capacity) {
            return;
        }

        let limit = self.config.max_retained_per_class;
        let list = self.free.entry(buffer.key()).or_default();
        if list.len() < limit {
            list.push(buffer);
            self.stats.retained += 1;
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Free every retained buffer
    pub fn clear(&mut self) {
        self.free.clear();
        self.stats.retained = 0;
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
