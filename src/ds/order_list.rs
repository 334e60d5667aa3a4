//! Arena-backed doubly linked list used for eviction order.
//!
//! Nodes live in a slot vector and link to each other by [`OrderSlot`], so a
//! cache entry can keep a stable handle to its position and be moved or
//! unlinked in O(1) without pointer chasing.
//!
//! ```text
//!   slots (Vec<Option<Node<T>>>)
//!   ┌──────┬──────────────────────────────────────────┐
//!   │ slot │ Node { value, prev, next }               │
//!   ├──────┼──────────────────────────────────────────┤
//!   │  0   │ { value: "a", prev: None,    next: 2 }   │
//!   │  1   │ <free>                                   │
//!   │  2   │ { value: "c", prev: Some(0), next: None }│
//!   └──────┴──────────────────────────────────────────┘
//!
//!   head (oldest) ─► [0] ◄──► [2] ◄── tail (newest)
//! ```
//!
//! Freed slots are recycled through a free list, so handles are only valid
//! until the node they name is removed.

/// Stable handle to a node in an [`OrderList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderSlot(usize);

impl OrderSlot {
    /// Returns the raw slot index.
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<OrderSlot>,
    next: Option<OrderSlot>,
}

/// Ordered list from oldest (front) to newest (back).
#[derive(Debug)]
pub struct OrderList<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    head: Option<OrderSlot>,
    tail: Option<OrderSlot>,
    len: usize,
}

impl<T> OrderList<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if `slot` names a live node.
    pub fn contains(&self, slot: OrderSlot) -> bool {
        self.node(slot).is_some()
    }

    /// Returns the oldest value.
    pub fn front(&self) -> Option<&T> {
        self.head.and_then(|slot| self.get(slot))
    }

    /// Returns the newest value.
    pub fn back(&self) -> Option<&T> {
        self.tail.and_then(|slot| self.get(slot))
    }

    pub fn get(&self, slot: OrderSlot) -> Option<&T> {
        self.node(slot).map(|node| &node.value)
    }

    /// Appends `value` as the newest element.
    pub fn push_back(&mut self, value: T) -> OrderSlot {
        let node = Node {
            value,
            prev: self.tail,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                OrderSlot(index)
            },
            None => {
                self.slots.push(Some(node));
                OrderSlot(self.slots.len() - 1)
            },
        };
        match self.tail {
            Some(tail) => {
                if let Some(tail_node) = self.node_mut(tail) {
                    tail_node.next = Some(slot);
                }
            },
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.len += 1;
        slot
    }

    /// Unlinks `slot` and returns its value.
    pub fn remove(&mut self, slot: OrderSlot) -> Option<T> {
        self.unlink(slot)?;
        let node = self.slots.get_mut(slot.0)?.take()?;
        self.free.push(slot.0);
        self.len -= 1;
        Some(node.value)
    }

    /// Moves `slot` to the newest position; returns `false` if it is not live.
    pub fn move_to_back(&mut self, slot: OrderSlot) -> bool {
        if !self.contains(slot) {
            return false;
        }
        if self.tail == Some(slot) {
            return true;
        }
        self.unlink(slot);
        let old_tail = self.tail;
        if let Some(node) = self.node_mut(slot) {
            node.prev = old_tail;
            node.next = None;
        }
        match old_tail {
            Some(tail) => {
                if let Some(tail_node) = self.node_mut(tail) {
                    tail_node.next = Some(slot);
                }
            },
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        true
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Iterates values from oldest to newest.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn node(&self, slot: OrderSlot) -> Option<&Node<T>> {
        self.slots.get(slot.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, slot: OrderSlot) -> Option<&mut Node<T>> {
        self.slots.get_mut(slot.0).and_then(Option::as_mut)
    }

    fn unlink(&mut self, slot: OrderSlot) -> Option<()> {
        let (prev, next) = {
            let node = self.node(slot)?;
            (node.prev, node.next)
        };
        match prev {
            Some(prev) => {
                if let Some(prev_node) = self.node_mut(prev) {
                    prev_node.next = next;
                }
            },
            None => self.head = next,
        }
        match next {
            Some(next) => {
                if let Some(next_node) = self.node_mut(next) {
                    next_node.prev = prev;
                }
            },
            None => self.tail = prev,
        }
        Some(())
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        if self.head.is_none() || self.tail.is_none() {
            assert!(self.head.is_none());
            assert!(self.tail.is_none());
            assert_eq!(self.len, 0);
            return;
        }

        let mut count = 0usize;
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let node = self.node(slot).expect("linked slot is free");
            assert_eq!(node.prev, prev);
            if node.next.is_none() {
                assert_eq!(self.tail, Some(slot));
            }
            prev = Some(slot);
            cursor = node.next;
            count += 1;
            assert!(count <= self.len, "cycle in order list");
        }
        assert_eq!(count, self.len);
        assert_eq!(self.slots.len() - self.free.len(), self.len);
    }
}

impl<T> Default for OrderList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator from oldest to newest.
pub struct Iter<'a, T> {
    list: &'a OrderList<T>,
    cursor: Option<OrderSlot>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let node = self.list.node(slot)?;
        self.cursor = node.next;
        Some(&node.value)
    }
}
