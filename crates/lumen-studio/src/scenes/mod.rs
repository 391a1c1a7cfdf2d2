mod clear;
mod mesh;
mod triangle;

pub use clear::ClearScene;
pub use mesh::MeshScene;
pub use triangle::TriangleScene;

use lumen_engine::backend::Backend;
use lumen_engine::context::GraphicsContext;
use lumen_engine::device::Device;
use lumen_engine::resource::{ResourceState, TextureHandle};

/// Moves the current back buffer into render-target state.
fn acquire_target<B: Backend>(device: &Device<B>, gfx: &mut GraphicsContext) -> anyhow::Result<TextureHandle> {
    let bb = device.current_back_buffer();
    gfx.add_barrier(device, bb, ResourceState::RenderTarget)?;
    gfx.flush_barriers();
    Ok(bb)
}

/// Hands the back buffer back for presentation.
fn release_target<B: Backend>(
    device: &Device<B>,
    gfx: &mut GraphicsContext,
    bb: TextureHandle,
) -> anyhow::Result<()> {
    gfx.add_barrier(device, bb, ResourceState::Present)?;
    gfx.flush_barriers();
    Ok(())
}
