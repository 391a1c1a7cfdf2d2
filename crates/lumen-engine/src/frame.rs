//! Frame slots and per-frame values.

use crate::backend::Backend;
use crate::device::Device;

/// Lifecycle of one frame slot.
///
/// `Idle -> Recording -> Submitted -> Complete -> Recording -> ...`
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SlotPhase {
    Idle,
    Recording,
    Submitted,
    Complete,
}

/// One of the device's N frames in flight.
#[derive(Debug, Clone)]
pub struct FrameSlot {
    pub(crate) phase: SlotPhase,
    /// Completion marker of the last submission made from this slot; `0` if none.
    pub(crate) fence_value: u64,
}

impl FrameSlot {
    pub(crate) fn new() -> Self {
        Self {
            phase: SlotPhase::Idle,
            fence_value: 0,
        }
    }

    #[inline]
    pub fn phase(&self) -> SlotPhase {
        self.phase
    }

    #[inline]
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    pub(crate) fn begin(&mut self) {
        debug_assert_ne!(self.phase, SlotPhase::Submitted, "slot reused before completion");
        self.phase = SlotPhase::Recording;
    }

    pub(crate) fn submit(&mut self, fence: u64) {
        self.phase = SlotPhase::Submitted;
        self.fence_value = fence;
    }

    pub(crate) fn observe(&mut self, completed: u64) {
        if self.phase == SlotPhase::Submitted && self.fence_value <= completed {
            self.phase = SlotPhase::Complete;
        }
    }
}

/// One value per frame slot, for state the CPU rewrites every frame
/// (per-frame constant buffers and similar).
///
/// Indexing by the device's current frame index guarantees the value being
/// written is not read by GPU work still in flight.
#[derive(Debug, Clone)]
pub struct FrameLocal<T> {
    values: Vec<T>,
}

impl<T> FrameLocal<T> {
    pub fn new(frames_in_flight: usize, mut make: impl FnMut(usize) -> T) -> Self {
        Self {
            values: (0..frames_in_flight).map(&mut make).collect(),
        }
    }

    pub fn try_new<E>(
        frames_in_flight: usize,
        make: impl FnMut(usize) -> Result<T, E>,
    ) -> Result<Self, E> {
        Ok(Self {
            values: (0..frames_in_flight).map(make).collect::<Result<_, E>>()?,
        })
    }

    #[inline]
    pub fn get(&self, frame_index: usize) -> &T {
        &self.values[frame_index % self.values.len()]
    }

    #[inline]
    pub fn get_mut(&mut self, frame_index: usize) -> &mut T {
        let n = self.values.len();
        &mut self.values[frame_index % n]
    }

    pub fn current<B: Backend>(&self, device: &Device<B>) -> &T {
        self.get(device.frame_index())
    }

    pub fn current_mut<B: Backend>(&mut self, device: &Device<B>) -> &mut T {
        self.get_mut(device.frame_index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_completes_only_at_its_marker() {
        let mut slot = FrameSlot::new();
        slot.begin();
        slot.submit(4);
        slot.observe(3);
        assert_eq!(slot.phase(), SlotPhase::Submitted);
        slot.observe(4);
        assert_eq!(slot.phase(), SlotPhase::Complete);
    }

    #[test]
    fn frame_local_wraps_index() {
        let mut local = FrameLocal::new(2, |i| i * 10);
        assert_eq!(*local.get(0), 0);
        assert_eq!(*local.get(3), 10);
        *local.get_mut(1) = 7;
        assert_eq!(local.iter().copied().collect::<Vec<_>>(), vec![0, 7]);
    }

    #[test]
    fn frame_local_try_new_propagates_errors() {
        let r: Result<FrameLocal<u32>, &str> =
            FrameLocal::try_new(3, |i| if i == 2 { Err("boom") } else { Ok(i as u32) });
        assert_eq!(r.unwrap_err(), "boom");
    }
}
