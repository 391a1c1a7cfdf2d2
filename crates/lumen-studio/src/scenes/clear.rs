use lumen_engine::backend::Backend;
use lumen_engine::coords::Color;
use lumen_engine::core::FrameCtx;

/// Clears the back buffer to a slowly cycling color.
pub struct ClearScene {
    period: f32,
}

impl ClearScene {
    pub fn new() -> Self {
        Self { period: 6.0 }
    }

    fn color_at(&self, t: f32) -> Color {
        let phase = t / self.period * std::f32::consts::TAU;
        let channel = |offset: f32| 0.5 + 0.5 * (phase + offset).sin();
        Color::rgb(
            channel(0.0) * 0.4,
            channel(2.1) * 0.4,
            channel(4.2) * 0.4,
        )
    }

    pub fn record<B: Backend>(&mut self, frame: &mut FrameCtx<'_, B>) -> anyhow::Result<()> {
        let device = &*frame.device;
        let bb = super::acquire_target(device, frame.gfx)?;
        frame
            .gfx
            .clear_render_target(device, bb, self.color_at(frame.time.elapsed))?;
        super::release_target(device, frame.gfx, bb)
    }
}
