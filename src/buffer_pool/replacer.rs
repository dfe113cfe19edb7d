//! LRU-K replacement policy.
//!
//! The replacer evicts the frame whose backward K-distance is the largest:
//! the difference between the current timestamp and the timestamp of its
//! K-th most recent access. A frame with fewer than K recorded accesses has
//! an infinite backward K-distance; among several such frames, the one whose
//! earliest retained access is oldest goes first.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::buffer_pool::frame::FrameId;

/// Access bookkeeping for one frame.
#[derive(Debug)]
struct LruKNode {
    /// Up to K most recent access timestamps, oldest first.
    history: VecDeque<u64>,
    /// Whether the frame may be chosen as a victim.
    evictable: bool,
}

/// Replacer state guarded by the replacer-wide latch.
#[derive(Debug)]
struct ReplacerInner {
    node_store: HashMap<FrameId, LruKNode>,
    /// Logical clock; incremented on every recorded access.
    current_timestamp: u64,
    evictable_count: usize,
    capacity: usize,
    k: usize,
}

/// LRU-K replacer over at most `capacity` frames.
///
/// Every public operation acquires the internal latch for its entire
/// duration.
#[derive(Debug)]
pub struct LruKReplacer {
    inner: Mutex<ReplacerInner>,
}

impl LruKReplacer {
    /// Creates a replacer tracking up to `capacity` frames with parameter `k`.
    ///
    /// # Panics
    ///
    /// Panics if `k` is 0.
    #[must_use]
    pub fn new(capacity: usize, k: usize) -> Self {
        assert!(k > 0, "k must be greater than 0");
        Self {
            inner: Mutex::new(ReplacerInner {
                node_store: HashMap::with_capacity(capacity),
                current_timestamp: 0,
                evictable_count: 0,
                capacity,
                k,
            }),
        }
    }

    /// Records an access to `frame_id` at the current timestamp.
    ///
    /// A frame seen for the first time starts out non-evictable. Only the
    /// last K timestamps are retained.
    ///
    /// # Panics
    ///
    /// Panics if `frame_id` is outside the replacer's capacity.
    pub fn record_access(&self, frame_id: FrameId) {
        let inner = &mut *self.inner.lock();
        assert!(
            frame_id < inner.capacity,
            "frame id {frame_id} out of bounds"
        );

        let now = inner.current_timestamp;
        inner.current_timestamp += 1;

        let k = inner.k;
        let node = inner.node_store.entry(frame_id).or_insert_with(|| LruKNode {
            history: VecDeque::with_capacity(k),
            evictable: false,
        });
        if node.history.len() == k {
            node.history.pop_front();
        }
        node.history.push_back(now);
    }

    /// Marks `frame_id` as evictable or not.
    ///
    /// # Panics
    ///
    /// Panics if the frame has no recorded accesses.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let inner = &mut *self.inner.lock();
        let node = inner
            .node_store
            .get_mut(&frame_id)
            .unwrap_or_else(|| panic!("set_evictable on untracked frame {frame_id}"));

        if node.evictable != evictable {
            node.evictable = evictable;
            if evictable {
                inner.evictable_count += 1;
            } else {
                inner.evictable_count -= 1;
            }
        }
    }

    /// Evicts the evictable frame with the largest backward K-distance.
    ///
    /// Frames with fewer than K accesses count as infinitely distant; ties
    /// are broken by the earliest timestamp still in the history. The chosen
    /// frame's bookkeeping is dropped entirely. Returns `None` when nothing
    /// is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let inner = &mut *self.inner.lock();
        let now = inner.current_timestamp;

        // (frame, k-distance with None meaning infinite, earliest timestamp)
        let mut victim: Option<(FrameId, Option<u64>, u64)> = None;

        for (&frame_id, node) in &inner.node_store {
            if !node.evictable {
                continue;
            }
            let earliest = *node.history.front().expect("tracked frame has history");
            let k_distance = if node.history.len() < inner.k {
                None
            } else {
                Some(now - earliest)
            };

            let better = match victim {
                None => true,
                Some((_, best_distance, best_earliest)) => {
                    match (k_distance, best_distance) {
                        (None, Some(_)) => true,
                        (Some(_), None) => false,
                        (None, None) => earliest < best_earliest,
                        (Some(d), Some(best)) => {
                            d > best || (d == best && earliest < best_earliest)
                        }
                    }
                }
            };
            if better {
                victim = Some((frame_id, k_distance, earliest));
            }
        }

        let (frame_id, _, _) = victim?;
        inner.node_store.remove(&frame_id);
        inner.evictable_count -= 1;
        Some(frame_id)
    }

    /// Forcibly drops the frame's access history.
    ///
    /// A frame with no recorded accesses is left alone.
    ///
    /// # Panics
    ///
    /// Panics if the frame is tracked but not evictable.
    pub fn remove(&self, frame_id: FrameId) {
        let inner = &mut *self.inner.lock();
        let evictable = match inner.node_store.get(&frame_id) {
            None => return,
            Some(node) => node.evictable,
        };
        assert!(evictable, "remove on non-evictable frame {frame_id}");
        inner.node_store.remove(&frame_id);
        inner.evictable_count -= 1;
    }

    /// Returns the number of currently evictable frames.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.lock().evictable_count
    }
}
