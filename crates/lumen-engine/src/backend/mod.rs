//! The explicit graphics API seam.
//!
//! A backend owns the API objects behind engine handles and executes command
//! lists on the GPU timeline. The engine performs all bookkeeping (states,
//! readiness, frame slots, retirement) and hands the backend fully validated
//! work plus a completion marker to signal.
//!
//! - [`sim::SimBackend`] is a deterministic software timeline.
//! - `wgpu::WgpuBackend` (feature `backend_wgpu`) drives a real GPU.

pub mod sim;

#[cfg(feature = "backend_wgpu")]
pub mod wgpu;

use crate::command::CommandList;
use crate::coords::Extent;
use crate::error::Result;
use crate::pipeline::{PipelineHandle, PipelineStateObject, Shader, ShaderDesc, ShaderHandle};
use crate::resource::{BufferDesc, Format, ResourceId, ResourceState, TextureDesc};

/// An API object whose release was deferred until the GPU finished with it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BackendObject {
    Resource(ResourceId),
    Shader(ShaderHandle),
    Pipeline(PipelineHandle),
}

pub trait Backend {
    fn name(&self) -> &'static str;

    /// (Re)creates the swap chain for `back_buffers` at `size`.
    ///
    /// Returns the format actually in use, which may differ from `requested`.
    fn configure_swapchain(
        &mut self,
        back_buffers: &[ResourceId],
        size: Extent,
        requested: Format,
    ) -> Result<Format>;

    /// Makes `back_buffer` the target of the frame about to be recorded.
    fn acquire_back_buffer(&mut self, back_buffer: ResourceId) -> Result<()>;

    fn create_buffer(&mut self, id: ResourceId, desc: &BufferDesc, initial: ResourceState) -> Result<()>;

    fn create_texture(&mut self, id: ResourceId, desc: &TextureDesc, initial: ResourceState) -> Result<()>;

    /// CPU write into host-writable memory.
    fn write_mapped(&mut self, id: ResourceId, offset: u64, data: &[u8]) -> Result<()>;

    /// CPU view of host-writable memory.
    fn read_mapped(&self, id: ResourceId) -> Result<Vec<u8>>;

    fn compile_shader(&mut self, desc: &ShaderDesc) -> Result<Vec<u8>>;

    fn create_pipeline(
        &mut self,
        handle: PipelineHandle,
        pso: &PipelineStateObject,
        vertex: &Shader,
        pixel: &Shader,
    ) -> Result<()>;

    /// Executes `lists` in order, then signals `signal` on the GPU timeline.
    fn submit(&mut self, lists: &[CommandList], signal: u64) -> Result<()>;

    /// Highest completion marker the GPU has reached.
    fn completed_value(&mut self) -> u64;

    /// Blocks until the GPU reaches `value`.
    fn wait_for_value(&mut self, value: u64) -> Result<()>;

    fn present(&mut self, back_buffer: ResourceId) -> Result<()>;

    fn release(&mut self, object: BackendObject);
}
