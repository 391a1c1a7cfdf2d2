use crate::backend::Backend;
use crate::coords::Extent;
use crate::device::Device;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract implemented by higher layers.
///
/// Methods are generic over the backend so one app drives both the wgpu
/// window runtime and the `sim` timeline.
pub trait App {
    /// Called once after the device exists, before the first frame.
    fn init<B: Backend>(&mut self, device: &mut Device<B>) -> anyhow::Result<()>;

    /// Records one frame. The device is between `begin_frame` and
    /// `end_frame`; the context has been reset for this frame.
    fn on_frame<B: Backend>(&mut self, frame: &mut FrameCtx<'_, B>) -> anyhow::Result<AppControl>;

    /// Called after the back buffers were recreated at `size`.
    fn on_resize<B: Backend>(&mut self, device: &mut Device<B>, size: Extent) -> anyhow::Result<()> {
        let _ = (device, size);
        Ok(())
    }
}
