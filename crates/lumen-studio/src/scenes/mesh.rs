use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use lumen_engine::backend::Backend;
use lumen_engine::coords::{Color, Extent};
use lumen_engine::core::FrameCtx;
use lumen_engine::device::Device;
use lumen_engine::frame::FrameLocal;
use lumen_engine::pipeline::{
    CullMode, GraphicsPipelineDesc, PipelineHandle, PipelineInfo, RasterState, ShaderDesc,
    ShaderStage,
};
use lumen_engine::resource::{
    AccessPattern, BufferDesc, BufferHandle, Format, TextureDesc, TextureHandle, TextureViews,
};
use lumen_engine::space::{
    PipelineResourceLayout, PipelineResourceSpace, ResourceSpaceBuilder, SpaceId,
};
use lumen_engine::upload::BufferUpload;

use crate::geometry::{self, MeshVertex};
use crate::transform::{Camera, Transform};

const DEPTH_FORMAT: Format = Format::Depth32Float;
const CHECKER_SIZE: u32 = 64;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Mat4Constants {
    matrix: [[f32; 4]; 4],
}

/// Textured cube with depth. Geometry and texture are device-local and
/// uploaded once; the draw is skipped until both uploads have landed.
pub struct MeshScene {
    pipeline: PipelineHandle,
    vertices: BufferHandle,
    vertex_count: u32,
    texture: TextureHandle,
    depth: TextureHandle,
    object_cb: FrameLocal<BufferHandle>,
    pass_cb: FrameLocal<BufferHandle>,
    object_spaces: FrameLocal<PipelineResourceSpace>,
    pass_spaces: FrameLocal<PipelineResourceSpace>,
    transform: Transform,
    camera: Camera,
    waiting_logged: bool,
}

impl MeshScene {
    pub fn new<B: Backend>(device: &mut Device<B>) -> anyhow::Result<Self> {
        let cube = geometry::cube();
        let vertices = device.create_buffer(&BufferDesc::structured(
            cube.len() as u64,
            size_of::<MeshVertex>() as u32,
            AccessPattern::GpuOnly,
            "cube vertices",
        ))?;
        device
            .upload_context_for_current_frame()
            .add_buffer_upload(BufferUpload {
                buffer: vertices,
                data: bytemuck::cast_slice(&cube).to_vec(),
            })?;

        let texture = device.create_texture_with_data(
            &TextureDesc::new(CHECKER_SIZE, CHECKER_SIZE, Format::Rgba8Unorm, TextureViews::SRV)
                .named("checker"),
            geometry::checker(CHECKER_SIZE, 8, [230, 230, 230, 255], [40, 90, 160, 255]),
        )?;
        let size = device.screen_size();
        let depth = create_depth(device, size)?;

        let frames = device.frames_in_flight();
        let object_cb = FrameLocal::try_new(frames, |i| {
            device.create_buffer(&BufferDesc::constants(
                size_of::<Mat4Constants>() as u64,
                format!("cube object constants {i}"),
            ))
        })?;
        let pass_cb = FrameLocal::try_new(frames, |i| {
            device.create_buffer(&BufferDesc::constants(
                size_of::<Mat4Constants>() as u64,
                format!("cube pass constants {i}"),
            ))
        })?;
        let object_spaces = FrameLocal::new(frames, |i| {
            ResourceSpaceBuilder::new()
                .set_cbv(*object_cb.get(i))
                .set_srv(0, vertices)
                .set_srv(1, texture)
                .lock()
        });
        let pass_spaces = FrameLocal::new(frames, |i| {
            ResourceSpaceBuilder::new().set_cbv(*pass_cb.get(i)).lock()
        });

        let layout = PipelineResourceLayout::new()
            .with_space(SpaceId::PerObject, object_spaces.get(0).layout())
            .with_space(SpaceId::PerPass, pass_spaces.get(0).layout());
        let vs = device.create_shader(&ShaderDesc::new("mesh.wgsl", "vs_main", ShaderStage::Vertex))?;
        let ps = device.create_shader(&ShaderDesc::new("mesh.wgsl", "fs_main", ShaderStage::Pixel))?;
        let mut desc = GraphicsPipelineDesc::new(vs, ps);
        desc.render_target_formats = vec![device.back_buffer_format()];
        desc.depth_format = Some(DEPTH_FORMAT);
        desc.raster = RasterState {
            cull: CullMode::Back,
            front_ccw: true,
        };
        desc.debug_name = "mesh".to_string();
        let pipeline = device.create_graphics_pipeline(&desc, &layout)?;

        Ok(Self {
            pipeline,
            vertices,
            vertex_count: cube.len() as u32,
            texture,
            depth,
            object_cb,
            pass_cb,
            object_spaces,
            pass_spaces,
            transform: Transform::default(),
            camera: Camera::default(),
            waiting_logged: false,
        })
    }

    pub fn resize<B: Backend>(&mut self, device: &mut Device<B>, size: Extent) -> anyhow::Result<()> {
        if size.is_empty() {
            return Ok(());
        }
        device.destroy_texture(self.depth)?;
        self.depth = create_depth(device, size)?;
        Ok(())
    }

    pub fn record<B: Backend>(&mut self, frame: &mut FrameCtx<'_, B>) -> anyhow::Result<()> {
        let t = frame.time.elapsed;
        self.transform.rotation = Quat::from_rotation_y(t * 0.8) * Quat::from_rotation_x(t * 0.3);
        let object = Mat4Constants {
            matrix: self.transform.matrix().to_cols_array_2d(),
        };
        let pass = Mat4Constants {
            matrix: self
                .camera
                .view_proj(frame.device.screen_size().aspect_ratio())
                .to_cols_array_2d(),
        };
        let object_cb = *self.object_cb.current(frame.device);
        let pass_cb = *self.pass_cb.current(frame.device);
        frame.device.set_mapped_data(object_cb, bytemuck::bytes_of(&object))?;
        frame.device.set_mapped_data(pass_cb, bytemuck::bytes_of(&pass))?;

        let device = &*frame.device;
        let gfx = &mut *frame.gfx;
        let bb = super::acquire_target(device, gfx)?;
        gfx.clear_render_target(device, bb, Color::rgb(0.05, 0.06, 0.08))?;
        gfx.clear_depth_stencil_target(device, self.depth, 1.0, 0)?;

        let ready = device.is_ready(self.vertices) && device.is_ready(self.texture);
        if ready {
            gfx.set_pipeline(
                device,
                &PipelineInfo {
                    pipeline: Some(self.pipeline),
                    render_targets: vec![bb],
                    depth_stencil_target: Some(self.depth),
                },
            )?;
            gfx.set_pipeline_resources(device, SpaceId::PerObject, self.object_spaces.current(device))?;
            gfx.set_pipeline_resources(device, SpaceId::PerPass, self.pass_spaces.current(device))?;
            gfx.set_default_viewport_and_scissor(device.screen_size())?;
            gfx.draw(device, self.vertex_count)?;
        } else if !self.waiting_logged {
            log::debug!("cube uploads still in flight; skipping draw");
            self.waiting_logged = true;
        }

        super::release_target(device, gfx, bb)
    }
}

fn create_depth<B: Backend>(device: &mut Device<B>, size: Extent) -> anyhow::Result<TextureHandle> {
    let desc = TextureDesc::new(size.width, size.height, DEPTH_FORMAT, TextureViews::DSV).named("scene depth");
    Ok(device.create_texture(&desc)?)
}
