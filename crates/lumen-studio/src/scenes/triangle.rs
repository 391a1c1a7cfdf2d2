use bytemuck::{Pod, Zeroable};
use glam::Quat;
use lumen_engine::backend::Backend;
use lumen_engine::coords::Color;
use lumen_engine::core::FrameCtx;
use lumen_engine::device::Device;
use lumen_engine::frame::FrameLocal;
use lumen_engine::pipeline::{
    GraphicsPipelineDesc, PipelineHandle, PipelineInfo, ShaderDesc, ShaderHandle, ShaderStage,
};
use lumen_engine::resource::{AccessPattern, BufferDesc, BufferHandle, Format};
use lumen_engine::space::{
    PipelineResourceLayout, PipelineResourceSpace, ResourceSpaceBuilder, SpaceId,
};

use crate::transform::Transform;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct ColorVertex {
    position: [f32; 4],
    color: [f32; 4],
}

const VERTICES: [ColorVertex; 3] = [
    ColorVertex {
        position: [0.0, 0.6, 0.0, 1.0],
        color: [1.0, 0.2, 0.2, 1.0],
    },
    ColorVertex {
        position: [-0.55, -0.45, 0.0, 1.0],
        color: [0.2, 1.0, 0.2, 1.0],
    },
    ColorVertex {
        position: [0.55, -0.45, 0.0, 1.0],
        color: [0.2, 0.2, 1.0, 1.0],
    },
];

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct ObjectConstants {
    world: [[f32; 4]; 4],
}

/// Spinning triangle. Vertices live in host-writable memory and are pulled
/// by the vertex shader through a structured buffer view.
pub struct TriangleScene {
    vs: ShaderHandle,
    ps: ShaderHandle,
    pipeline: PipelineHandle,
    format: Format,
    layout: PipelineResourceLayout,
    constants: FrameLocal<BufferHandle>,
    spaces: FrameLocal<PipelineResourceSpace>,
    transform: Transform,
}

impl TriangleScene {
    pub fn new<B: Backend>(device: &mut Device<B>) -> anyhow::Result<Self> {
        let vertices = device.create_buffer(&BufferDesc::structured(
            VERTICES.len() as u64,
            size_of::<ColorVertex>() as u32,
            AccessPattern::HostWritable,
            "triangle vertices",
        ))?;
        device.set_mapped_data(vertices, bytemuck::cast_slice(&VERTICES))?;

        let constants = FrameLocal::try_new(device.frames_in_flight(), |i| {
            device.create_buffer(&BufferDesc::constants(
                size_of::<ObjectConstants>() as u64,
                format!("triangle constants {i}"),
            ))
        })?;
        let spaces = FrameLocal::new(constants.len(), |i| {
            ResourceSpaceBuilder::new()
                .set_cbv(*constants.get(i))
                .set_srv(0, vertices)
                .lock()
        });
        let layout = PipelineResourceLayout::new().with_space(SpaceId::PerObject, spaces.get(0).layout());

        let vs = device.create_shader(&ShaderDesc::new("triangle.wgsl", "vs_main", ShaderStage::Vertex))?;
        let ps = device.create_shader(&ShaderDesc::new("triangle.wgsl", "fs_main", ShaderStage::Pixel))?;
        let format = device.back_buffer_format();
        let pipeline = build_pipeline(device, vs, ps, format, &layout)?;

        Ok(Self {
            vs,
            ps,
            pipeline,
            format,
            layout,
            constants,
            spaces,
            transform: Transform::default(),
        })
    }

    /// Rebuilds the pipeline if the swap chain came back in another format.
    pub fn resize<B: Backend>(&mut self, device: &mut Device<B>) -> anyhow::Result<()> {
        let format = device.back_buffer_format();
        if format == self.format {
            return Ok(());
        }
        log::info!("back buffer format changed to {format:?}; rebuilding triangle pipeline");
        device.destroy_pipeline(self.pipeline)?;
        self.pipeline = build_pipeline(device, self.vs, self.ps, format, &self.layout)?;
        self.format = format;
        Ok(())
    }

    pub fn record<B: Backend>(&mut self, frame: &mut FrameCtx<'_, B>) -> anyhow::Result<()> {
        self.transform.rotation = Quat::from_rotation_z(frame.time.elapsed);
        let constants = ObjectConstants {
            world: self.transform.matrix().to_cols_array_2d(),
        };
        let cb = *self.constants.current(frame.device);
        frame.device.set_mapped_data(cb, bytemuck::bytes_of(&constants))?;

        let device = &*frame.device;
        let gfx = &mut *frame.gfx;
        let bb = super::acquire_target(device, gfx)?;
        gfx.clear_render_target(device, bb, Color::rgb(0.02, 0.02, 0.03))?;
        gfx.set_pipeline(
            device,
            &PipelineInfo {
                pipeline: Some(self.pipeline),
                render_targets: vec![bb],
                depth_stencil_target: None,
            },
        )?;
        gfx.set_pipeline_resources(device, SpaceId::PerObject, self.spaces.current(device))?;
        gfx.set_default_viewport_and_scissor(device.screen_size())?;
        gfx.draw(device, VERTICES.len() as u32)?;
        super::release_target(device, gfx, bb)
    }
}

fn build_pipeline<B: Backend>(
    device: &mut Device<B>,
    vs: ShaderHandle,
    ps: ShaderHandle,
    format: Format,
    layout: &PipelineResourceLayout,
) -> anyhow::Result<PipelineHandle> {
    let mut desc = GraphicsPipelineDesc::new(vs, ps);
    desc.render_target_formats = vec![format];
    desc.debug_name = "triangle".to_string();
    Ok(device.create_graphics_pipeline(&desc, layout)?)
}
