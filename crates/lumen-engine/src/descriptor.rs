//! Bindless descriptor heap.
//!
//! A flat arena of shader-visible descriptor slots. Indices are handed out from
//! a bump cursor and recycled through a free list once the owning resource is
//! retired. The first `reserved` slots never enter circulation; they belong to
//! collaborators such as a UI overlay.

use crate::error::{EngineError, Result};

/// Position of a view in the bindless descriptor heap.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorIndex(pub u32);

impl DescriptorIndex {
    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }
}

#[derive(Debug)]
pub struct DescriptorHeap {
    capacity: u32,
    reserved: u32,
    cursor: u32,
    free: Vec<u32>,
    live: u32,
}

impl DescriptorHeap {
    pub fn new(capacity: u32, reserved: u32) -> Result<Self> {
        if reserved >= capacity {
            return Err(EngineError::InvalidDescriptor(format!(
                "descriptor heap of {capacity} slots cannot reserve {reserved}"
            )));
        }
        Ok(Self {
            capacity,
            reserved,
            cursor: reserved,
            free: Vec::new(),
            live: 0,
        })
    }

    pub fn allocate(&mut self) -> Result<DescriptorIndex> {
        let index = if let Some(i) = self.free.pop() {
            i
        } else if self.cursor < self.capacity {
            let i = self.cursor;
            self.cursor += 1;
            i
        } else {
            return Err(EngineError::DescriptorHeapExhausted {
                capacity: self.capacity,
            });
        };
        self.live += 1;
        Ok(DescriptorIndex(index))
    }

    /// Returns a slot to the free list. Reserved slots are ignored.
    pub fn free(&mut self, index: DescriptorIndex) {
        if index.0 < self.reserved || index.0 >= self.cursor {
            log::warn!("ignoring free of descriptor {} outside the live range", index.0);
            return;
        }
        debug_assert!(!self.free.contains(&index.0), "double free of descriptor {}", index.0);
        self.free.push(index.0);
        self.live -= 1;
    }

    /// One of the slots set aside at the front of the heap.
    pub fn reserved(&self, i: u32) -> Option<DescriptorIndex> {
        (i < self.reserved).then_some(DescriptorIndex(i))
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of allocated, not-yet-freed slots (reserved slots excluded).
    #[inline]
    pub fn live(&self) -> u32 {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_skips_reserved_slots() {
        let mut heap = DescriptorHeap::new(8, 2).unwrap();
        assert_eq!(heap.allocate().unwrap(), DescriptorIndex(2));
        assert_eq!(heap.allocate().unwrap(), DescriptorIndex(3));
        assert_eq!(heap.reserved(0), Some(DescriptorIndex(0)));
        assert_eq!(heap.reserved(1), Some(DescriptorIndex(1)));
        assert_eq!(heap.reserved(2), None);
    }

    #[test]
    fn freed_slots_are_recycled() {
        let mut heap = DescriptorHeap::new(8, 0).unwrap();
        let a = heap.allocate().unwrap();
        let _b = heap.allocate().unwrap();
        heap.free(a);
        assert_eq!(heap.live(), 1);
        assert_eq!(heap.allocate().unwrap(), a);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let mut heap = DescriptorHeap::new(3, 1).unwrap();
        heap.allocate().unwrap();
        heap.allocate().unwrap();
        assert!(matches!(
            heap.allocate(),
            Err(EngineError::DescriptorHeapExhausted { capacity: 3 })
        ));
    }

    #[test]
    fn freeing_a_reserved_slot_is_ignored() {
        let mut heap = DescriptorHeap::new(4, 2).unwrap();
        let r = heap.reserved(0).unwrap();
        heap.free(r);
        assert_eq!(heap.allocate().unwrap(), DescriptorIndex(2));
    }

    #[test]
    fn reserving_the_whole_heap_is_rejected() {
        assert!(DescriptorHeap::new(2, 2).is_err());
    }
}
