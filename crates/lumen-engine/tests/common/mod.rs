#![allow(dead_code)]

use lumen_engine::backend::sim::{SimBackend, SimConfig};
use lumen_engine::backend::{Backend, BackendObject};
use lumen_engine::command::CommandList;
use lumen_engine::context::GraphicsContext;
use lumen_engine::coords::{Color, Extent};
use lumen_engine::device::{Device, DeviceConfig};
use lumen_engine::pipeline::{
    GraphicsPipelineDesc, PipelineHandle, PipelineInfo, PipelineStateObject, Shader, ShaderDesc,
    ShaderStage,
};
use lumen_engine::resource::{
    AccessPattern, BufferDesc, BufferHandle, Format, ResourceId, ResourceState, TextureDesc,
};
use lumen_engine::{EngineError, Result};
use lumen_engine::space::{PipelineResourceLayout, PipelineResourceSpace, ResourceSpaceBuilder, SpaceId};

pub fn config() -> DeviceConfig {
    DeviceConfig {
        frames_in_flight: 2,
        back_buffer_count: 3,
        descriptor_capacity: 64,
        reserved_descriptors: 2,
        screen_size: Extent::new(320, 240),
        ..Default::default()
    }
}

pub fn immediate() -> Device<SimBackend> {
    Device::new(config(), SimBackend::immediate()).unwrap()
}

pub fn deferred() -> Device<SimBackend> {
    Device::new(config(), SimBackend::deferred()).unwrap()
}

pub fn with_sim(config: DeviceConfig, sim: SimConfig) -> Device<SimBackend> {
    Device::new(config, SimBackend::new(sim)).unwrap()
}

pub fn flaky() -> Device<FlakyBackend> {
    Device::new(config(), FlakyBackend::default()).unwrap()
}

/// One frame that clears the back buffer and hands it back for presentation.
pub fn clear_frame<B: Backend>(device: &mut Device<B>, gfx: &mut GraphicsContext, color: Color) {
    device.begin_frame().unwrap();
    gfx.reset(device).unwrap();
    let bb = device.current_back_buffer();
    gfx.add_barrier(device, bb, ResourceState::RenderTarget).unwrap();
    gfx.flush_barriers();
    gfx.clear_render_target(device, bb, color).unwrap();
    gfx.add_barrier(device, bb, ResourceState::Present).unwrap();
    gfx.flush_barriers();
    device.submit_context_work(gfx).unwrap();
    device.end_frame().unwrap();
    device.present().unwrap();
}

/// Frame with no recorded work.
pub fn empty_frame(device: &mut Device<SimBackend>) {
    device.begin_frame().unwrap();
    device.end_frame().unwrap();
    device.present().unwrap();
}

pub struct Triangle {
    pub pipeline: PipelineHandle,
    pub vertices: BufferHandle,
    pub space: PipelineResourceSpace,
}

/// Triangle pipeline reading three host-written vertices through one SRV at
/// `SpaceId::PerObject`.
pub fn triangle(device: &mut Device<SimBackend>) -> Triangle {
    let vs = device
        .create_shader(&ShaderDesc::new("triangle.wgsl", "vs_main", ShaderStage::Vertex))
        .unwrap();
    let ps = device
        .create_shader(&ShaderDesc::new("triangle.wgsl", "fs_main", ShaderStage::Pixel))
        .unwrap();

    let vertices = device
        .create_buffer(&BufferDesc::structured(3, 32, AccessPattern::HostWritable, "triangle vertices"))
        .unwrap();
    let space = ResourceSpaceBuilder::new().set_srv(0, vertices).lock();
    let layout = PipelineResourceLayout::new().with_space(SpaceId::PerObject, space.layout());

    let mut desc = GraphicsPipelineDesc::new(vs, ps);
    desc.render_target_formats = vec![device.back_buffer_format()];
    desc.debug_name = "triangle".to_string();
    let pipeline = device.create_graphics_pipeline(&desc, &layout).unwrap();

    Triangle {
        pipeline,
        vertices,
        space,
    }
}

/// Records a full triangle frame into the back buffer.
pub fn triangle_frame(device: &mut Device<SimBackend>, gfx: &mut GraphicsContext, tri: &Triangle) {
    device.begin_frame().unwrap();
    gfx.reset(device).unwrap();
    let bb = device.current_back_buffer();

    gfx.add_barrier(device, bb, ResourceState::RenderTarget).unwrap();
    gfx.flush_barriers();
    gfx.clear_render_target(device, bb, Color::black()).unwrap();
    gfx.set_pipeline(
        device,
        &PipelineInfo {
            pipeline: Some(tri.pipeline),
            render_targets: vec![bb],
            depth_stencil_target: None,
        },
    )
    .unwrap();
    gfx.set_pipeline_resources(device, SpaceId::PerObject, &tri.space).unwrap();
    gfx.set_default_viewport_and_scissor(device.screen_size()).unwrap();
    gfx.draw(device, 3).unwrap();
    gfx.add_barrier(device, bb, ResourceState::Present).unwrap();
    gfx.flush_barriers();

    device.submit_context_work(gfx).unwrap();
    device.end_frame().unwrap();
    device.present().unwrap();
}

/// Immediate sim backend whose swap chain, submissions and acquisitions can
/// be made to fail.
#[derive(Default)]
pub struct FlakyBackend {
    pub sim: SimBackend,
    pub fail_configure: bool,
    pub fail_submit: bool,
    /// Number of upcoming acquisitions that find no swap chain image.
    pub skip_acquires: u32,
}

impl Backend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky-sim"
    }

    fn configure_swapchain(&mut self, back_buffers: &[ResourceId], size: Extent, requested: Format) -> Result<Format> {
        if self.fail_configure {
            return Err(EngineError::Backend {
                op: "configure",
                reason: "surface rejected the configuration".to_string(),
            });
        }
        self.sim.configure_swapchain(back_buffers, size, requested)
    }

    fn acquire_back_buffer(&mut self, back_buffer: ResourceId) -> Result<()> {
        if self.skip_acquires > 0 {
            self.skip_acquires -= 1;
            return Err(EngineError::FrameSkipped {
                reason: "timeout".to_string(),
            });
        }
        self.sim.acquire_back_buffer(back_buffer)
    }

    fn create_buffer(&mut self, id: ResourceId, desc: &BufferDesc, initial: ResourceState) -> Result<()> {
        self.sim.create_buffer(id, desc, initial)
    }

    fn create_texture(&mut self, id: ResourceId, desc: &TextureDesc, initial: ResourceState) -> Result<()> {
        self.sim.create_texture(id, desc, initial)
    }

    fn write_mapped(&mut self, id: ResourceId, offset: u64, data: &[u8]) -> Result<()> {
        self.sim.write_mapped(id, offset, data)
    }

    fn read_mapped(&self, id: ResourceId) -> Result<Vec<u8>> {
        self.sim.read_mapped(id)
    }

    fn compile_shader(&mut self, desc: &ShaderDesc) -> Result<Vec<u8>> {
        self.sim.compile_shader(desc)
    }

    fn create_pipeline(
        &mut self,
        handle: PipelineHandle,
        pso: &PipelineStateObject,
        vertex: &Shader,
        pixel: &Shader,
    ) -> Result<()> {
        self.sim.create_pipeline(handle, pso, vertex, pixel)
    }

    fn submit(&mut self, lists: &[CommandList], signal: u64) -> Result<()> {
        if self.fail_submit {
            return Err(EngineError::Backend {
                op: "submit",
                reason: "queue rejected the submission".to_string(),
            });
        }
        self.sim.submit(lists, signal)
    }

    fn completed_value(&mut self) -> u64 {
        self.sim.completed_value()
    }

    fn wait_for_value(&mut self, value: u64) -> Result<()> {
        self.sim.wait_for_value(value)
    }

    fn present(&mut self, back_buffer: ResourceId) -> Result<()> {
        self.sim.present(back_buffer)
    }

    fn release(&mut self, object: BackendObject) {
        self.sim.release(object)
    }
}
