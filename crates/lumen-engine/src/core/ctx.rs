use crate::backend::Backend;
use crate::context::GraphicsContext;
use crate::device::Device;
use crate::error::EngineError;

use super::app::{App, AppControl};
use super::clock::FrameTime;

/// Per-frame context passed to [`App::on_frame`].
pub struct FrameCtx<'a, B: Backend> {
    pub device: &'a mut Device<B>,
    /// Reset for this frame; submitted by the caller after `on_frame` returns.
    pub gfx: &'a mut GraphicsContext,
    pub time: FrameTime,
}

/// Runs one full frame of `app`:
/// `begin_frame`, reset, `on_frame`, `submit_context_work`, `end_frame`,
/// `before_present`, `present`.
///
/// The frame is still submitted and presented when the app asks to exit.
/// When the swap chain has no image (`EngineError::FrameSkipped`) the app is
/// not called and the frame counts as `Continue`.
pub fn drive_frame<A, B>(
    app: &mut A,
    device: &mut Device<B>,
    gfx: &mut GraphicsContext,
    time: FrameTime,
    before_present: impl FnOnce(),
) -> anyhow::Result<AppControl>
where
    A: App,
    B: Backend,
{
    match device.begin_frame() {
        Ok(()) => {}
        Err(EngineError::FrameSkipped { reason }) => {
            log::debug!("frame skipped: {reason}");
            return Ok(AppControl::Continue);
        }
        Err(e) => return Err(e.into()),
    }
    gfx.reset(device)?;

    let control = {
        let mut frame = FrameCtx {
            device: &mut *device,
            gfx: &mut *gfx,
            time,
        };
        app.on_frame(&mut frame)?
    };

    device.submit_context_work(gfx)?;
    device.end_frame()?;
    before_present();
    device.present()?;
    Ok(control)
}
