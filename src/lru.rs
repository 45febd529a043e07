//! O(1) LRU ordering via an intrusive doubly-linked list plus a hash index
//! (spec §9 REDESIGN FLAGS), replacing the original buffer pool's
//! remove-and-reinsert-into-a-`HashMap` pattern (see `btree/buffer_pool.rs`,
//! `btree/page_cache.rs`), which scales touch/evict with cache size.
//!
//! Nodes live in a `Vec<Node<T>>` slab addressed by index; `prev`/`next` are
//! slab indices rather than pointers, so this stays entirely safe-Rust.

use std::collections::HashMap;

struct Node<T> {
    key: PageKey,
    /// `None` only for a freed slab slot awaiting reuse.
    value: Option<T>,
    prev: Option<usize>,
    next: Option<usize>,
}

type PageKey = crate::ids::PageId;

/// Fixed-capacity cache ordered from most- to least-recently-touched.
pub struct LruCache<T> {
    slab: Vec<Node<T>>,
    /// Freed slab slots, reused before the slab grows.
    free: Vec<usize>,
    index: HashMap<PageKey, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<T> LruCache<T> {
    pub fn new() -> Self {
        Self {
            slab: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &PageKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&mut self, key: &PageKey) -> Option<&T> {
        let idx = *self.index.get(key)?;
        self.touch(idx);
        self.slab[idx].value.as_ref()
    }

    pub fn get_mut(&mut self, key: &PageKey) -> Option<&mut T> {
        let idx = *self.index.get(key)?;
        self.touch(idx);
        self.slab[idx].value.as_mut()
    }

    /// Insert `value` as the most-recently-touched entry. Overwrites an
    /// existing entry for the same key in place.
    pub fn insert(&mut self, key: PageKey, value: T) {
        if let Some(&idx) = self.index.get(&key) {
            self.slab[idx].value = Some(value);
            self.touch(idx);
            return;
        }

        let idx = if let Some(free_idx) = self.free.pop() {
            self.slab[free_idx] = Node {
                key,
                value: Some(value),
                prev: None,
                next: None,
            };
            free_idx
        } else {
            self.slab.push(Node {
                key,
                value: Some(value),
                prev: None,
                next: None,
            });
            self.slab.len() - 1
        };
        self.index.insert(key, idx);
        self.push_front(idx);
    }

    pub fn remove(&mut self, key: &PageKey) -> Option<T> {
        let idx = self.index.remove(key)?;
        self.unlink(idx);
        self.free.push(idx);
        self.slab[idx].value.take()
    }

    /// Key of the least-recently-touched entry, if any.
    pub fn lru_key(&self) -> Option<PageKey> {
        self.tail.map(|idx| self.slab[idx].key)
    }

    /// Keys from least- to most-recently-touched, for callers that need to
    /// scan for an evictable entry under a predicate (e.g. "first clean
    /// page").
    pub fn keys_lru_order(&self) -> Vec<PageKey> {
        let mut keys = Vec::with_capacity(self.index.len());
        let mut cur = self.tail;
        while let Some(idx) = cur {
            keys.push(self.slab[idx].key);
            cur = self.slab[idx].prev;
        }
        keys
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.index.values().filter_map(move |&idx| self.slab[idx].value.as_ref())
    }

    fn touch(&mut self, idx: usize) {
        self.unlink(idx);
        self.push_front(idx);
    }

    fn push_front(&mut self, idx: usize) {
        self.slab[idx].prev = None;
        self.slab[idx].next = self.head;
        if let Some(head) = self.head {
            self.slab[head].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let prev = self.slab[idx].prev;
        let next = self.slab[idx].next;
        match prev {
            Some(p) => self.slab[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slab[n].prev = prev,
            None => self.tail = prev,
        }
        self.slab[idx].prev = None;
        self.slab[idx].next = None;
    }
}

impl<T> Default for LruCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: usize) -> PageKey {
        crate::ids::PageId::new(1, n)
    }

    #[test]
    fn touch_reorders_lru_key() {
        let mut cache = LruCache::new();
        cache.insert(key(1), "a");
        cache.insert(key(2), "b");
        cache.insert(key(3), "c");
        assert_eq!(cache.lru_key(), Some(key(1)));
        cache.get(&key(1));
        assert_eq!(cache.lru_key(), Some(key(2)));
    }

    #[test]
    fn remove_drops_entry_and_updates_lru() {
        let mut cache = LruCache::new();
        cache.insert(key(1), "a");
        cache.insert(key(2), "b");
        cache.remove(&key(1));
        assert!(!cache.contains(&key(1)));
        assert_eq!(cache.lru_key(), Some(key(2)));
    }

    #[test]
    fn keys_lru_order_lists_least_recent_first() {
        let mut cache = LruCache::new();
        cache.insert(key(1), "a");
        cache.insert(key(2), "b");
        cache.insert(key(3), "c");
        cache.get(&key(1));
        assert_eq!(cache.keys_lru_order(), vec![key(2), key(3), key(1)]);
    }
}
