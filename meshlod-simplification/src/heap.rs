//! Indexed binary min-heap
//!
//! Items live in an arena owned by the heap and are addressed by the stable
//! id returned from [`IndexedHeap::push`]. Each item records its own heap
//! slot (see [`Heapable`]) so that arbitrary items can be removed or
//! re-keyed in `O(log n)`, not just the minimum.
//!
//! Items with equal keys are ordered by id, i.e. by creation order.

use std::cmp::Ordering;

/// An element that can be stored in an [`IndexedHeap`].
pub trait Heapable {
    /// Ordering key; smaller keys are popped first.
    fn heap_key(&self) -> f64;

    /// Current slot in the heap, `None` when the item is not queued.
    fn heap_slot(&self) -> Option<usize>;

    fn set_heap_slot(&mut self, slot: Option<usize>);
}

#[derive(Debug, Clone)]
pub struct IndexedHeap<T> {
    items: Vec<T>,
    order: Vec<usize>,
}

impl<T: Heapable> Default for IndexedHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Heapable> IndexedHeap<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            order: Vec::with_capacity(capacity),
        }
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of items ever created, queued or not
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Store a new item and queue it. Returns its id.
    pub fn push(&mut self, mut item: T) -> usize {
        let id = self.items.len();
        item.set_heap_slot(None);
        self.items.push(item);
        self.insert(id);
        id
    }

    /// Queue an existing item that is not currently in the heap.
    ///
    /// Returns `false` if the item was already queued.
    pub fn insert(&mut self, id: usize) -> bool {
        if self.items[id].heap_slot().is_some() {
            return false;
        }
        let slot = self.order.len();
        self.order.push(id);
        self.items[id].set_heap_slot(Some(slot));
        self.sift_up(slot);
        true
    }

    /// Id of the minimum item without dequeuing it
    pub fn peek(&self) -> Option<usize> {
        self.order.first().copied()
    }

    /// Dequeue the minimum item. The item stays addressable through its id.
    pub fn pop(&mut self) -> Option<usize> {
        let id = self.peek()?;
        self.remove_slot(0);
        Some(id)
    }

    /// Dequeue an arbitrary item. Returns `false` if it was not queued.
    pub fn remove(&mut self, id: usize) -> bool {
        match self.items[id].heap_slot() {
            Some(slot) => {
                self.remove_slot(slot);
                true
            }
            None => false,
        }
    }

    /// Restore heap order after the key of `id` changed.
    ///
    /// Items that are not queued are left alone.
    pub fn update(&mut self, id: usize) {
        if let Some(slot) = self.items[id].heap_slot() {
            let slot = self.sift_up(slot);
            self.sift_down(slot);
        }
    }

    pub fn contains(&self, id: usize) -> bool {
        self.items.get(id).is_some_and(|item| item.heap_slot().is_some())
    }

    pub fn get(&self, id: usize) -> Option<&T> {
        self.items.get(id)
    }

    /// Mutable access to an item. Call [`IndexedHeap::update`] after
    /// changing its key.
    pub fn get_mut(&mut self, id: usize) -> Option<&mut T> {
        self.items.get_mut(id)
    }

    /// Ids of the queued items in heap (not sorted) order
    pub fn queued(&self) -> &[usize] {
        &self.order
    }

    fn remove_slot(&mut self, slot: usize) {
        let last = self.order.len() - 1;
        self.swap_slots(slot, last);
        if let Some(id) = self.order.pop() {
            self.items[id].set_heap_slot(None);
        }
        if slot < self.order.len() {
            let slot = self.sift_up(slot);
            self.sift_down(slot);
        }
    }

    fn less(&self, a: usize, b: usize) -> bool {
        let ia = self.order[a];
        let ib = self.order[b];
        match self.items[ia].heap_key().total_cmp(&self.items[ib].heap_key()) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => ia < ib,
        }
    }

    fn swap_slots(&mut self, a: usize, b: usize) {
        self.order.swap(a, b);
        let (ia, ib) = (self.order[a], self.order[b]);
        self.items[ia].set_heap_slot(Some(a));
        self.items[ib].set_heap_slot(Some(b));
    }

    fn sift_up(&mut self, mut slot: usize) -> usize {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if !self.less(slot, parent) {
                break;
            }
            self.swap_slots(slot, parent);
            slot = parent;
        }
        slot
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.order.len();
        loop {
            let left = 2 * slot + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.less(right, left) {
                right
            } else {
                left
            };
            if !self.less(child, slot) {
                break;
            }
            self.swap_slots(slot, child);
            slot = child;
        }
    }
}
