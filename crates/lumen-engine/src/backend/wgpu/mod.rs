//! wgpu backend.
//!
//! Maps engine objects onto wgpu:
//! - buffers and textures are plain wgpu resources; host-writable buffers keep
//!   a CPU mirror and are written through the queue
//! - each resource space becomes a bind group at group index `SpaceId`, with
//!   one binding per slot in layout order
//! - barrier batches are validated by the engine and skipped here; wgpu
//!   tracks hazards itself
//! - clears and draws become render passes
//! - completion markers are signalled from `on_submitted_work_done`

mod config;
mod convert;
mod surface;

pub use config::WgpuConfig;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use super::{Backend, BackendObject};
use crate::command::{Command, CommandList};
use crate::coords::{Extent, ScissorRect, Viewport};
use crate::error::{EngineError, Result};
use crate::pipeline::{PipelineHandle, PipelineStateObject, Shader, ShaderDesc};
use crate::resource::{AccessPattern, BufferDesc, Format, ResourceId, ResourceState, TextureDesc};
use crate::space::{Binding, SlotKind, SpaceId, SpaceLayout};

struct GpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
    /// CPU copy of host-writable content.
    mirror: Option<Vec<u8>>,
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    extent: Extent,
}

struct GpuPipeline {
    pipeline: wgpu::RenderPipeline,
    group_layouts: Vec<wgpu::BindGroupLayout>,
    /// Empty bind groups for group indices no space is declared at.
    gap_groups: Vec<(u32, wgpu::BindGroup)>,
}

struct AcquiredFrame {
    id: ResourceId,
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BindGroupKey {
    pipeline: PipelineHandle,
    space: SpaceId,
    resources: Vec<ResourceId>,
}

/// Per-list binding state while encoding.
#[derive(Default)]
struct EncodeState {
    pipeline: Option<PipelineHandle>,
    targets: Vec<ResourceId>,
    depth: Option<ResourceId>,
    groups: [Option<BindGroupKey>; SpaceId::COUNT],
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
}

/// wgpu implementation of [`Backend`], bound to one window surface.
///
/// The surface borrows the window for `'w`; the window must outlive the backend.
pub struct WgpuBackend<'w> {
    config: WgpuConfig,
    surface: wgpu::Surface<'w>,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    surface_size: Extent,

    back_buffers: Vec<ResourceId>,
    frame: Option<AcquiredFrame>,

    buffers: HashMap<ResourceId, GpuBuffer>,
    textures: HashMap<ResourceId, GpuTexture>,
    pipelines: HashMap<PipelineHandle, GpuPipeline>,
    bind_groups: HashMap<BindGroupKey, wgpu::BindGroup>,

    submitted: u64,
    /// Submission index of every marker not yet observed as completed.
    submissions: VecDeque<(u64, wgpu::SubmissionIndex)>,
    completed: Arc<AtomicU64>,
}

impl<'w> WgpuBackend<'w> {
    /// Creates the adapter, device and surface for `window`.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu; the runtime
    /// blocks on it with `pollster`.
    pub async fn new<W>(window: &'w W, size: Extent, config: WgpuConfig) -> anyhow::Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Sync,
    {
        anyhow::ensure!(!size.is_empty(), "window has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("lumen device"),
                required_features: config.required_features,
                required_limits: config.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let caps = surface.get_capabilities(&adapter);
        let format = surface::choose_surface_format(&caps, wgpu::TextureFormat::Rgba8UnormSrgb, config.prefer_srgb)
            .context("no supported surface formats")?;

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: config.present_mode,
            alpha_mode: surface::choose_alpha_mode(&caps, config.alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        log::info!("wgpu adapter: {:?}", adapter.get_info().name);

        Ok(Self {
            config,
            surface,
            adapter,
            device,
            queue,
            surface_config,
            surface_size: size,
            back_buffers: Vec::new(),
            frame: None,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            pipelines: HashMap::new(),
            bind_groups: HashMap::new(),
            submitted: 0,
            submissions: VecDeque::new(),
            completed: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Underlying wgpu device, for collaborators that record their own work.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }

    fn poll(&self) {
        if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {e}");
        }
    }

    fn view(&self, id: ResourceId) -> Result<&wgpu::TextureView> {
        match &self.frame {
            Some(frame) if frame.id == id => Ok(&frame.view),
            _ => self
                .textures
                .get(&id)
                .map(|t| &t.view)
                .ok_or_else(|| EngineError::backend("encode", format!("no view for {id:?}"))),
        }
    }

    fn extent(&self, id: ResourceId) -> Extent {
        self.textures
            .get(&id)
            .map_or(self.surface_size, |t| t.extent)
    }

    fn group_layout_entries(layout: &SpaceLayout) -> Vec<wgpu::BindGroupLayoutEntry> {
        layout
            .slots()
            .iter()
            .enumerate()
            .map(|(binding, slot)| {
                let (visibility, ty) = match slot.kind {
                    SlotKind::Cbv => (
                        wgpu::ShaderStages::VERTEX_FRAGMENT,
                        wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                    ),
                    SlotKind::SrvBuffer => (
                        wgpu::ShaderStages::VERTEX_FRAGMENT,
                        wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                    ),
                    SlotKind::SrvTexture => (
                        wgpu::ShaderStages::VERTEX_FRAGMENT,
                        wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                    ),
                    SlotKind::UavBuffer => (
                        wgpu::ShaderStages::FRAGMENT,
                        wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                    ),
                };
                wgpu::BindGroupLayoutEntry {
                    binding: binding as u32,
                    visibility,
                    ty,
                    count: None,
                }
            })
            .collect()
    }

    fn shader_module(&self, shader: &Shader) -> Result<wgpu::ShaderModule> {
        let source = std::str::from_utf8(shader.bytecode())
            .map_err(|e| EngineError::backend("create shader module", e))?;
        Ok(self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&shader.desc().source_name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        }))
    }

    fn ensure_bind_group(&mut self, key: &BindGroupKey, bindings: &[Binding]) -> Result<()> {
        if self.bind_groups.contains_key(key) {
            return Ok(());
        }
        let layout = self
            .pipelines
            .get(&key.pipeline)
            .and_then(|p| p.group_layouts.get(key.space.index()))
            .ok_or_else(|| EngineError::backend("bind", format!("{:?} has no {:?}", key.pipeline, key.space)))?;

        let mut entries = Vec::with_capacity(bindings.len());
        for (i, binding) in bindings.iter().enumerate() {
            let resource = match binding {
                Binding::Buffer(b) => self
                    .buffers
                    .get(&b.id())
                    .map(|g| g.buffer.as_entire_binding()),
                Binding::Texture(t) => self
                    .textures
                    .get(&t.id())
                    .map(|g| wgpu::BindingResource::TextureView(&g.view)),
            }
            .ok_or_else(|| EngineError::backend("bind", format!("{:?} is not alive", binding.id())))?;
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32,
                resource,
            });
        }

        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lumen space"),
            layout,
            entries: &entries,
        });
        self.bind_groups.insert(key.clone(), group);
        Ok(())
    }

    // ── encoding ──────────────────────────────────────────────────────────

    fn encode(&mut self, list: &CommandList) -> Result<wgpu::CommandBuffer> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(list.label()),
            });
        let mut st = EncodeState::default();

        for command in list.commands() {
            match command {
                Command::Barriers(_) | Command::SetTopology(_) => {}

                Command::CopyToBuffer { dst, offset, data } => {
                    let buffer = self
                        .buffers
                        .get(&dst.id())
                        .ok_or_else(|| EngineError::backend("copy", format!("{:?} is not alive", dst.id())))?;
                    let padded = pad_to_copy_alignment(data);
                    if *offset + padded.len() as u64 > buffer.buffer.size() {
                        return Err(EngineError::backend("copy", "write past the end of the buffer"));
                    }
                    self.queue.write_buffer(&buffer.buffer, *offset, &padded);
                }

                Command::CopyToTexture {
                    dst,
                    data,
                    width,
                    height,
                    bytes_per_row,
                } => {
                    let texture = self
                        .textures
                        .get(&dst.id())
                        .ok_or_else(|| EngineError::backend("copy", format!("{:?} is not alive", dst.id())))?;
                    self.queue.write_texture(
                        wgpu::TexelCopyTextureInfo {
                            texture: &texture.texture,
                            mip_level: 0,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: wgpu::TextureAspect::All,
                        },
                        data,
                        wgpu::TexelCopyBufferLayout {
                            offset: 0,
                            bytes_per_row: Some(*bytes_per_row),
                            rows_per_image: Some(*height),
                        },
                        wgpu::Extent3d {
                            width: *width,
                            height: *height,
                            depth_or_array_layers: 1,
                        },
                    );
                }

                Command::ClearRenderTarget { target, color } => {
                    let view = self.view(target.id())?;
                    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("lumen clear"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(wgpu::Color {
                                    r: color.r as f64,
                                    g: color.g as f64,
                                    b: color.b as f64,
                                    a: color.a as f64,
                                }),
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        })],
                        depth_stencil_attachment: None,
                        timestamp_writes: None,
                        occlusion_query_set: None,
                        multiview_mask: None,
                    });
                }

                Command::ClearDepthStencil { target, depth, .. } => {
                    let view = self.view(target.id())?;
                    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("lumen depth clear"),
                        color_attachments: &[],
                        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                            view,
                            depth_ops: Some(wgpu::Operations {
                                load: wgpu::LoadOp::Clear(*depth),
                                store: wgpu::StoreOp::Store,
                            }),
                            stencil_ops: None,
                        }),
                        timestamp_writes: None,
                        occlusion_query_set: None,
                        multiview_mask: None,
                    });
                }

                Command::SetPipeline {
                    pipeline,
                    render_targets,
                    depth_stencil,
                } => {
                    st.pipeline = *pipeline;
                    st.targets = render_targets.iter().map(|t| t.id()).collect();
                    st.depth = depth_stencil.map(|d| d.id());
                    st.groups = Default::default();
                }

                Command::SetResources { space, bindings } => {
                    let Some(pipeline) = st.pipeline else {
                        return Err(EngineError::backend("bind", "no pipeline bound"));
                    };
                    let key = BindGroupKey {
                        pipeline,
                        space: *space,
                        resources: bindings.iter().map(|b| b.id()).collect(),
                    };
                    self.ensure_bind_group(&key, bindings)?;
                    st.groups[space.index()] = Some(key);
                }

                Command::SetViewport(v) => st.viewport = Some(*v),
                Command::SetScissor(s) => st.scissor = Some(*s),

                Command::Draw {
                    vertex_count,
                    instance_count,
                } => self.encode_draw(&mut encoder, &st, *vertex_count, *instance_count)?,
            }
        }

        Ok(encoder.finish())
    }

    fn encode_draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        st: &EncodeState,
        vertex_count: u32,
        instance_count: u32,
    ) -> Result<()> {
        let pipeline = st
            .pipeline
            .and_then(|p| self.pipelines.get(&p))
            .ok_or_else(|| EngineError::backend("draw", "no pipeline bound"))?;

        let views = st
            .targets
            .iter()
            .map(|&id| self.view(id))
            .collect::<Result<Vec<_>>>()?;
        let color_attachments: Vec<_> = views
            .into_iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();
        let depth_stencil_attachment = match st.depth {
            Some(id) => Some(wgpu::RenderPassDepthStencilAttachment {
                view: self.view(id)?,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            None => None,
        };

        let bounds = st
            .targets
            .first()
            .or(st.depth.as_ref())
            .map_or(self.surface_size, |&id| self.extent(id));
        let scissor = st
            .scissor
            .unwrap_or_else(|| ScissorRect::covering(bounds))
            .clamped_to(bounds);
        if scissor.is_empty() {
            return Ok(());
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("lumen draw"),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        pass.set_pipeline(&pipeline.pipeline);
        for (index, group) in &pipeline.gap_groups {
            pass.set_bind_group(*index, group, &[]);
        }
        for (index, key) in st.groups.iter().enumerate() {
            if let Some(group) = key.as_ref().and_then(|k| self.bind_groups.get(k)) {
                pass.set_bind_group(index as u32, group, &[]);
            }
        }
        if let Some(v) = st.viewport {
            pass.set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth);
        }
        pass.set_scissor_rect(scissor.x, scissor.y, scissor.width, scissor.height);
        pass.draw(0..vertex_count, 0..instance_count);
        Ok(())
    }
}

/// Earliest submission whose marker covers `value`.
fn submission_for<T: Clone>(submissions: &VecDeque<(u64, T)>, value: u64) -> Option<T> {
    submissions
        .iter()
        .find(|&&(marker, _)| marker >= value)
        .map(|(_, index)| index.clone())
}

/// `queue.write_buffer` sizes must be a multiple of four bytes.
fn pad_to_copy_alignment(data: &[u8]) -> std::borrow::Cow<'_, [u8]> {
    let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
    if data.len() % align == 0 {
        return data.into();
    }
    let mut padded = data.to_vec();
    padded.resize(data.len().next_multiple_of(align), 0);
    padded.into()
}

fn buffer_usage(desc: &BufferDesc) -> wgpu::BufferUsages {
    let mut usage = wgpu::BufferUsages::COPY_DST;
    if desc.views.cbv {
        usage |= wgpu::BufferUsages::UNIFORM;
    }
    if desc.views.srv || desc.views.uav {
        usage |= wgpu::BufferUsages::STORAGE;
    }
    if !desc.views.is_shader_visible() {
        usage |= wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::INDEX;
    }
    usage
}

impl Backend for WgpuBackend<'_> {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn configure_swapchain(
        &mut self,
        back_buffers: &[ResourceId],
        size: Extent,
        requested: Format,
    ) -> Result<Format> {
        let caps = self.surface.get_capabilities(&self.adapter);
        let chosen = surface::choose_surface_format(
            &caps,
            convert::texture_format(requested),
            self.config.prefer_srgb,
        )
        .and_then(|f| convert::engine_format(f).map(|e| (f, e)))
        .or_else(|| {
            caps.formats
                .iter()
                .find_map(|&f| convert::engine_format(f).map(|e| (f, e)))
        });
        let Some((wgpu_format, format)) = chosen else {
            return Err(EngineError::backend("configure swap chain", "no usable surface format"));
        };

        self.frame = None;
        self.surface_config.format = wgpu_format;
        surface::apply_size(&mut self.surface_config, size);
        self.surface.configure(&self.device, &self.surface_config);
        self.surface_size = size;
        self.back_buffers = back_buffers.to_vec();
        Ok(format)
    }

    fn acquire_back_buffer(&mut self, back_buffer: ResourceId) -> Result<()> {
        if !self.back_buffers.contains(&back_buffer) {
            return Err(EngineError::backend("acquire", format!("{back_buffer:?} is not a back buffer")));
        }
        // An unpresented frame from a skipped present is discarded here.
        self.frame = None;

        let texture = surface::acquire(&self.surface, &self.device, &self.surface_config)?;
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some(AcquiredFrame {
            id: back_buffer,
            texture,
            view,
        });
        Ok(())
    }

    fn create_buffer(&mut self, id: ResourceId, desc: &BufferDesc, _initial: ResourceState) -> Result<()> {
        let size = desc
            .allocation_size()
            .next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&desc.debug_name),
            size,
            usage: buffer_usage(desc),
            mapped_at_creation: false,
        });
        let mirror = (desc.access == AccessPattern::HostWritable).then(|| vec![0; size as usize]);
        self.buffers.insert(
            id,
            GpuBuffer {
                buffer,
                size: desc.size,
                mirror,
            },
        );
        Ok(())
    }

    fn create_texture(&mut self, id: ResourceId, desc: &TextureDesc, _initial: ResourceState) -> Result<()> {
        let mut usage = wgpu::TextureUsages::COPY_DST;
        if desc.views.srv {
            usage |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if desc.views.rtv || desc.views.dsv {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.debug_name),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: convert::texture_format(desc.format),
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                extent: Extent::new(desc.width, desc.height),
            },
        );
        Ok(())
    }

    fn write_mapped(&mut self, id: ResourceId, offset: u64, data: &[u8]) -> Result<()> {
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(EngineError::backend("map", "offset is not 4-byte aligned"));
        }
        let buffer = self
            .buffers
            .get_mut(&id)
            .ok_or_else(|| EngineError::backend("map", format!("{id:?} is not alive")))?;
        let Some(mirror) = buffer.mirror.as_mut() else {
            return Err(EngineError::backend("map", format!("{id:?} is not host-writable")));
        };

        let start = offset as usize;
        let end = start + data.len();
        if end > buffer.size as usize {
            return Err(EngineError::backend("map", format!("write past the end of {id:?}")));
        }
        mirror[start..end].copy_from_slice(data);

        let padded_end = end.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize);
        self.queue
            .write_buffer(&buffer.buffer, offset, &mirror[start..padded_end]);
        Ok(())
    }

    fn read_mapped(&self, id: ResourceId) -> Result<Vec<u8>> {
        self.buffers
            .get(&id)
            .and_then(|b| b.mirror.as_ref().map(|m| m[..b.size as usize].to_vec()))
            .ok_or_else(|| EngineError::backend("map", format!("{id:?} is not host-writable")))
    }

    fn compile_shader(&mut self, desc: &ShaderDesc) -> Result<Vec<u8>> {
        let path = self.config.shader_dir.join(&desc.source_name);
        std::fs::read(&path)
            .map_err(|e| EngineError::backend("load shader", format!("{}: {e}", path.display())))
    }

    fn create_pipeline(
        &mut self,
        handle: PipelineHandle,
        pso: &PipelineStateObject,
        vertex: &Shader,
        pixel: &Shader,
    ) -> Result<()> {
        let desc = pso.desc();
        let vs = self.shader_module(vertex)?;
        let ps = self.shader_module(pixel)?;

        let group_count = pso
            .layout()
            .declared()
            .map(|(id, _)| id.index() + 1)
            .max()
            .unwrap_or(0);

        let mut group_layouts = Vec::with_capacity(group_count);
        let mut gap_groups = Vec::new();
        for &space in &SpaceId::ALL[..group_count] {
            let entries = pso
                .layout()
                .space(space)
                .map(Self::group_layout_entries)
                .unwrap_or_default();
            let layout = self
                .device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("lumen space layout"),
                    entries: &entries,
                });
            if pso.layout().space(space).is_none() {
                let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("lumen empty space"),
                    layout: &layout,
                    entries: &[],
                });
                gap_groups.push((space.index() as u32, group));
            }
            group_layouts.push(layout);
        }

        let layout_refs: Vec<&wgpu::BindGroupLayout> = group_layouts.iter().collect();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&desc.debug_name),
                bind_group_layouts: &layout_refs,
                immediate_size: 0,
            });

        let targets: Vec<Option<wgpu::ColorTargetState>> = desc
            .render_target_formats
            .iter()
            .map(|&f| {
                Some(wgpu::ColorTargetState {
                    format: convert::texture_format(f),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let depth_stencil = desc.depth_format.map(|f| wgpu::DepthStencilState {
            format: convert::texture_format(f),
            depth_write_enabled: desc.depth.write,
            depth_compare: convert::compare(desc.depth.compare),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&desc.debug_name),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vs,
                    entry_point: Some(&vertex.desc().entry_point),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &ps,
                    entry_point: Some(&pixel.desc().entry_point),
                    compilation_options: Default::default(),
                    targets: &targets,
                }),
                primitive: wgpu::PrimitiveState {
                    topology: convert::topology(desc.topology),
                    strip_index_format: None,
                    front_face: if desc.raster.front_ccw {
                        wgpu::FrontFace::Ccw
                    } else {
                        wgpu::FrontFace::Cw
                    },
                    cull_mode: convert::cull_mode(desc.raster.cull),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        self.pipelines.insert(
            handle,
            GpuPipeline {
                pipeline,
                group_layouts,
                gap_groups,
            },
        );
        Ok(())
    }

    fn submit(&mut self, lists: &[CommandList], signal: u64) -> Result<()> {
        let mut command_buffers = Vec::with_capacity(lists.len());
        for list in lists {
            command_buffers.push(self.encode(list)?);
        }
        let index = self.queue.submit(command_buffers);

        let completed = Arc::clone(&self.completed);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(signal, Ordering::AcqRel);
        });
        self.submitted = signal;
        self.submissions.push_back((signal, index));
        Ok(())
    }

    fn completed_value(&mut self) -> u64 {
        self.poll();
        let completed = self.completed.load(Ordering::Acquire);
        while self.submissions.front().is_some_and(|&(marker, _)| marker <= completed) {
            self.submissions.pop_front();
        }
        completed
    }

    fn wait_for_value(&mut self, value: u64) -> Result<()> {
        if value > self.submitted {
            return Err(EngineError::backend("wait", format!("marker {value} was never submitted")));
        }
        if self.completed_value() >= value {
            return Ok(());
        }

        let submission_index = submission_for(&self.submissions, value);
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index,
                timeout: Some(self.config.fence_timeout),
            })
            .map_err(|e| EngineError::backend("wait", e))?;

        // Completion callbacks run inside the blocking poll.
        let completed = self.completed_value();
        if completed < value {
            return Err(EngineError::backend(
                "wait",
                format!("marker {value} not reached after {:?} (completed {completed})", self.config.fence_timeout),
            ));
        }
        Ok(())
    }

    fn present(&mut self, back_buffer: ResourceId) -> Result<()> {
        match self.frame.take() {
            Some(frame) if frame.id == back_buffer => {
                drop(frame.view);
                frame.texture.present();
                Ok(())
            }
            _ => Err(EngineError::backend("present", format!("{back_buffer:?} was not acquired"))),
        }
    }

    fn release(&mut self, object: BackendObject) {
        match object {
            BackendObject::Resource(id) => {
                self.buffers.remove(&id);
                self.textures.remove(&id);
                self.bind_groups.retain(|k, _| !k.resources.contains(&id));
            }
            BackendObject::Pipeline(handle) => {
                self.pipelines.remove(&handle);
                self.bind_groups.retain(|k, _| k.pipeline != handle);
            }
            BackendObject::Shader(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_targets_the_first_submission_covering_the_marker() {
        let submissions: VecDeque<(u64, u32)> = [(3, 30), (4, 40), (6, 60)].into_iter().collect();
        assert_eq!(submission_for(&submissions, 3), Some(30));
        // Marker 5 was never signalled on its own; 6 covers it.
        assert_eq!(submission_for(&submissions, 5), Some(60));
        assert_eq!(submission_for(&submissions, 7), None);
    }

    #[test]
    fn copies_are_padded_to_four_bytes() {
        assert_eq!(pad_to_copy_alignment(&[1, 2, 3, 4]).len(), 4);
        assert_eq!(&*pad_to_copy_alignment(&[1, 2, 3, 4, 5]), &[1, 2, 3, 4, 5, 0, 0, 0]);
    }
}
