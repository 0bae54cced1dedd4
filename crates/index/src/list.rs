//! Arena-backed circular doubly linked list with a single sentinel.
//!
//! Nodes live in a map keyed by their own pointer value; each node stores the
//! keys of its neighbours. The sentinel (key `0`) closes the circle: its `next`
//! is the smallest pointer and its `prev` the largest.
//!
//! Two ways to drop a prefix of old pointers:
//!
//! - [`SortedCircularIndex::shrink`] unlinks every node before the new head,
//!   one by one (cost grows with the number removed).
//! - [`SortedCircularIndex::lazy_shrink`] relinks the sentinel straight to the
//!   new head and recounts the survivors (cost grows with the number kept). The
//!   skipped nodes stay in the arena, stamped with a stale generation, and are
//!   reclaimed in bulk once they outnumber live nodes.

use std::collections::HashMap;

use lapse_core::{Pointer, SENTINEL};

/// Detached nodes tolerated before a compaction pass, on top of `size`.
const COMPACTION_SLACK: usize = 64;

/// True once `stored` entries kept for `live` ones are due for compaction.
///
/// Shared with callers that keep per-pointer side tables next to an index.
pub fn compaction_due(live: usize, stored: usize) -> bool {
    stored > live.saturating_mul(2) + COMPACTION_SLACK
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
struct Links {
    prev: Pointer,
    next: Pointer,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Node {
    links: Links,
    /// Generation the node was last linked in. Nodes from older generations
    /// were detached by a lazy shrink or clear and do not exist.
    generation: u64,
}

/// Ordered set of unique, non-zero pointers.
#[derive(Debug, Clone, Default)]
pub struct SortedCircularIndex {
    sentinel: Links,
    nodes: HashMap<Pointer, Node>,
    size: usize,
    generation: u64,
}

impl SortedCircularIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of linked pointers.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Smallest pointer.
    pub fn head(&self) -> Option<Pointer> {
        non_sentinel(self.sentinel.next)
    }

    /// Largest pointer.
    pub fn tail(&self) -> Option<Pointer> {
        non_sentinel(self.sentinel.prev)
    }

    pub fn exists(&self, pointer: Pointer) -> bool {
        pointer != SENTINEL
            && self
                .nodes
                .get(&pointer)
                .is_some_and(|node| node.generation == self.generation)
    }

    /// Successor of `pointer`, or `None` at the tail or if it is absent.
    pub fn next(&self, pointer: Pointer) -> Option<Pointer> {
        if !self.exists(pointer) {
            return None;
        }
        non_sentinel(self.links(pointer).next)
    }

    /// Predecessor of `pointer`, or `None` at the head or if it is absent.
    pub fn previous(&self, pointer: Pointer) -> Option<Pointer> {
        if !self.exists(pointer) {
            return None;
        }
        non_sentinel(self.links(pointer).prev)
    }

    /// Insert `pointer` at its sorted position. Returns `false` if it was
    /// already present or is the sentinel.
    ///
    /// The search starts from whichever endpoint is numerically closer.
    pub fn insert(&mut self, pointer: Pointer) -> bool {
        if pointer == SENTINEL || self.exists(pointer) {
            return false;
        }

        let (prev, next) = match (self.head(), self.tail()) {
            (Some(head), Some(tail)) => {
                if pointer < head {
                    (SENTINEL, head)
                } else if pointer > tail {
                    (tail, SENTINEL)
                } else if pointer - head <= tail - pointer {
                    let mut cursor = head;
                    while cursor < pointer {
                        cursor = self.links(cursor).next;
                    }
                    (self.links(cursor).prev, cursor)
                } else {
                    let mut cursor = tail;
                    while cursor > pointer {
                        cursor = self.links(cursor).prev;
                    }
                    (cursor, self.links(cursor).next)
                }
            }
            _ => (SENTINEL, SENTINEL),
        };

        self.nodes.insert(
            pointer,
            Node {
                links: Links { prev, next },
                generation: self.generation,
            },
        );
        self.set_next(prev, pointer);
        self.set_prev(next, pointer);
        self.size += 1;
        true
    }

    /// Unlink `pointer`. Returns `false` if it was absent.
    pub fn remove(&mut self, pointer: Pointer) -> bool {
        if !self.exists(pointer) {
            return false;
        }
        let Links { prev, next } = self.links(pointer);
        self.set_next(prev, next);
        self.set_prev(next, prev);
        self.nodes.remove(&pointer);
        self.size -= 1;
        true
    }

    /// Unlink every node before `pointer`, walking from the head. `pointer`
    /// becomes the new head. Returns the number of nodes removed (zero when
    /// `pointer` is absent).
    pub fn shrink(&mut self, pointer: Pointer) -> usize {
        if !self.exists(pointer) {
            return 0;
        }

        let mut removed = 0;
        let mut cursor = self.sentinel.next;
        while cursor != pointer {
            let next = self.links(cursor).next;
            self.nodes.remove(&cursor);
            cursor = next;
            removed += 1;
        }

        self.sentinel.next = pointer;
        self.set_prev(pointer, SENTINEL);
        self.size -= removed;
        removed
    }

    /// Make `pointer` the head without unlinking its predecessors, then
    /// recount the survivors. Returns the number of nodes detached (zero when
    /// `pointer` is absent).
    pub fn lazy_shrink(&mut self, pointer: Pointer) -> usize {
        if !self.exists(pointer) {
            return 0;
        }

        let before = self.size;
        self.sentinel.next = pointer;
        self.set_prev(pointer, SENTINEL);

        self.generation += 1;
        let generation = self.generation;
        let mut count = 0;
        let mut cursor = pointer;
        while cursor != SENTINEL {
            let Some(node) = self.nodes.get_mut(&cursor) else {
                break;
            };
            node.generation = generation;
            cursor = node.links.next;
            count += 1;
        }

        self.size = count;
        self.maybe_compact();
        before - count
    }

    /// Detach every node in constant time.
    pub fn clear(&mut self) {
        self.sentinel = Links::default();
        self.size = 0;
        self.generation += 1;
        self.maybe_compact();
    }

    /// First pointer `>= value`, searched from the nearer endpoint.
    pub fn lower_bound(&self, value: Pointer) -> Option<Pointer> {
        let (head, tail) = (self.head()?, self.tail()?);
        if value <= head {
            return Some(head);
        }
        if value > tail {
            return None;
        }

        if value - head <= tail - value {
            let mut cursor = head;
            while cursor < value {
                cursor = self.links(cursor).next;
            }
            Some(cursor)
        } else {
            let mut cursor = tail;
            loop {
                let prev = self.links(cursor).prev;
                if prev == SENTINEL || prev < value {
                    return Some(cursor);
                }
                cursor = prev;
            }
        }
    }

    /// All pointers, ascending.
    pub fn ascending(&self) -> Walk<'_> {
        Walk::forward(self, self.sentinel.next)
    }

    /// All pointers, descending.
    pub fn descending(&self) -> Walk<'_> {
        Walk::backward(self, self.sentinel.prev)
    }

    /// Lower half by count; gets the smaller share when `size` is odd.
    pub fn first_partition(&self) -> Vec<Pointer> {
        self.ascending().take(self.size / 2).collect()
    }

    /// Upper half by count; gets the larger share when `size` is odd.
    pub fn second_partition(&self) -> Vec<Pointer> {
        self.ascending().skip(self.size / 2).collect()
    }

    /// From `pointer` down to the head, inclusive.
    pub fn path_to_head(&self, pointer: Pointer) -> Vec<Pointer> {
        if !self.exists(pointer) {
            return Vec::new();
        }
        Walk::backward(self, pointer).collect()
    }

    /// From `pointer` up to the tail, inclusive.
    pub fn path_to_tail(&self, pointer: Pointer) -> Vec<Pointer> {
        self.walk_from(pointer).collect()
    }

    /// Every pointer, starting at `pointer` and wrapping past the tail back
    /// to the head.
    pub fn partition_from(&self, pointer: Pointer) -> Vec<Pointer> {
        if !self.exists(pointer) {
            return Vec::new();
        }
        let mut out: Vec<Pointer> = Walk::forward(self, pointer).collect();
        out.extend(self.ascending().take_while(|p| *p != pointer));
        out
    }

    /// Ascending walk starting at `pointer` (empty when absent).
    pub fn walk_from(&self, pointer: Pointer) -> Walk<'_> {
        if self.exists(pointer) {
            Walk::forward(self, pointer)
        } else {
            Walk::forward(self, SENTINEL)
        }
    }

    fn links(&self, pointer: Pointer) -> Links {
        if pointer == SENTINEL {
            return self.sentinel;
        }
        self.nodes
            .get(&pointer)
            .map(|node| node.links)
            .unwrap_or_default()
    }

    fn set_next(&mut self, pointer: Pointer, next: Pointer) {
        if pointer == SENTINEL {
            self.sentinel.next = next;
        } else if let Some(node) = self.nodes.get_mut(&pointer) {
            node.links.next = next;
        }
    }

    fn set_prev(&mut self, pointer: Pointer, prev: Pointer) {
        if pointer == SENTINEL {
            self.sentinel.prev = prev;
        } else if let Some(node) = self.nodes.get_mut(&pointer) {
            node.links.prev = prev;
        }
    }

    fn maybe_compact(&mut self) {
        if compaction_due(self.size, self.nodes.len()) {
            let generation = self.generation;
            self.nodes.retain(|_, node| node.generation == generation);
        }
    }
}

fn non_sentinel(pointer: Pointer) -> Option<Pointer> {
    (pointer != SENTINEL).then_some(pointer)
}

/// Iterator following the links in one direction until the sentinel.
#[derive(Debug, Clone)]
pub struct Walk<'a> {
    index: &'a SortedCircularIndex,
    cursor: Pointer,
    forward: bool,
}

impl<'a> Walk<'a> {
    fn forward(index: &'a SortedCircularIndex, start: Pointer) -> Self {
        Self {
            index,
            cursor: start,
            forward: true,
        }
    }

    fn backward(index: &'a SortedCircularIndex, start: Pointer) -> Self {
        Self {
            index,
            cursor: start,
            forward: false,
        }
    }
}

impl Iterator for Walk<'_> {
    type Item = Pointer;

    fn next(&mut self) -> Option<Pointer> {
        let current = non_sentinel(self.cursor)?;
        let links = self.index.links(current);
        self.cursor = if self.forward { links.next } else { links.prev };
        Some(current)
    }
}
