//! Extendible hash table.
//!
//! A concurrent key-value map that grows by directory doubling and local
//! bucket splitting. The directory holds `2^global_depth` slots, each
//! referring to a bucket; buckets carry a local depth telling how many hash
//! bits they actually discriminate, so several slots may share one bucket
//! while `local_depth < global_depth`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;

/// A bucket of up to `bucket_size` key-value pairs.
#[derive(Debug)]
struct Bucket<K, V> {
    /// Number of hash bits this bucket discriminates.
    local_depth: u32,
    /// Unordered key-value pairs; keys are unique.
    items: Vec<(K, V)>,
}

/// Table state guarded by the table-wide latch.
///
/// Buckets live in an arena; directory slots store arena indices. A split
/// reuses the full bucket's slot for the low half and appends the high half,
/// so every arena slot stays referenced by at least one directory slot.
#[derive(Debug)]
struct TableInner<K, V> {
    global_depth: u32,
    bucket_size: usize,
    directory: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

/// Latched extendible hash table.
///
/// Every public operation acquires the table latch for its entire duration;
/// the internal helpers on [`TableInner`] assume it is held.
#[derive(Debug)]
pub struct ExtendibleHashTable<K, V> {
    inner: Mutex<TableInner<K, V>>,
}

impl<K: Hash + Eq, V: Clone> ExtendibleHashTable<K, V> {
    /// Creates an empty table whose buckets hold up to `bucket_size` entries.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_size` is 0.
    #[must_use]
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket_size must be greater than 0");
        Self {
            inner: Mutex::new(TableInner {
                global_depth: 0,
                bucket_size,
                directory: vec![0],
                buckets: vec![Bucket {
                    local_depth: 0,
                    items: Vec::new(),
                }],
            }),
        }
    }

    /// Looks up the value for `key`.
    #[must_use]
    pub fn find(&self, key: &K) -> Option<V> {
        let inner = self.inner.lock();
        let bucket = &inner.buckets[inner.directory[inner.slot_of(key)]];
        bucket
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Inserts `key` → `value`, overwriting any existing value for the key.
    ///
    /// When the target bucket is full, it is split (doubling the directory
    /// first if the bucket already discriminates `global_depth` bits) and the
    /// insert retries; the redistribution of a different split may leave the
    /// key's bucket full again.
    pub fn insert(&self, key: K, value: V) {
        let inner = &mut *self.inner.lock();
        loop {
            let bucket_idx = inner.directory[inner.slot_of(&key)];
            let bucket = &mut inner.buckets[bucket_idx];

            if let Some(entry) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
                return;
            }
            if bucket.items.len() < inner.bucket_size {
                bucket.items.push((key, value));
                return;
            }

            inner.split(bucket_idx);
        }
    }

    /// Removes `key`, returning true iff it was present.
    pub fn remove(&self, key: &K) -> bool {
        let inner = &mut *self.inner.lock();
        let bucket_idx = inner.directory[inner.slot_of(key)];
        let bucket = &mut inner.buckets[bucket_idx];
        match bucket.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                bucket.items.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Returns the directory depth (the directory has `2^global_depth` slots).
    #[must_use]
    pub fn global_depth(&self) -> u32 {
        self.inner.lock().global_depth
    }

    /// Returns the local depth of the bucket at directory slot `dir_index`.
    ///
    /// # Panics
    ///
    /// Panics if `dir_index` is out of bounds.
    #[must_use]
    pub fn local_depth(&self, dir_index: usize) -> u32 {
        let inner = self.inner.lock();
        inner.buckets[inner.directory[dir_index]].local_depth
    }

    /// Returns the number of distinct buckets.
    #[must_use]
    pub fn num_buckets(&self) -> usize {
        self.inner.lock().buckets.len()
    }
}

impl<K: Hash + Eq, V> TableInner<K, V> {
    fn hash_of(key: &K) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    /// Directory slot for `key`: the low `global_depth` bits of its hash.
    fn slot_of(&self, key: &K) -> usize {
        let mask = (1u64 << self.global_depth) - 1;
        (Self::hash_of(key) & mask) as usize
    }

    /// Splits the full bucket at arena index `bucket_idx`.
    ///
    /// Doubles the directory first when the bucket's local depth equals the
    /// global depth (slot `i + 2^global_depth` starts out referring to the
    /// same bucket as slot `i`). Entries are redistributed from a snapshot on
    /// bit `local_depth` of their hash; one side may end up empty, which is
    /// fine — a later insert into the full side will split again.
    fn split(&mut self, bucket_idx: usize) {
        if self.buckets[bucket_idx].local_depth == self.global_depth {
            let current_len = self.directory.len();
            self.directory.extend_from_within(0..current_len);
            self.global_depth += 1;
        }

        let new_depth = self.buckets[bucket_idx].local_depth + 1;
        let split_bit = 1u64 << (new_depth - 1);

        let snapshot = std::mem::take(&mut self.buckets[bucket_idx].items);
        let mut low = Vec::new();
        let mut high = Vec::new();
        for (key, value) in snapshot {
            if Self::hash_of(&key) & split_bit != 0 {
                high.push((key, value));
            } else {
                low.push((key, value));
            }
        }

        self.buckets[bucket_idx].local_depth = new_depth;
        self.buckets[bucket_idx].items = low;

        let high_idx = self.buckets.len();
        self.buckets.push(Bucket {
            local_depth: new_depth,
            items: high,
        });

        // Repoint every slot that referred to the split bucket and has the
        // split bit set in its index.
        for (slot, bucket) in self.directory.iter_mut().enumerate() {
            if *bucket == bucket_idx && (slot as u64) & split_bit != 0 {
                *bucket = high_idx;
            }
        }
    }
}
