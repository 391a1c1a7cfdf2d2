//! Shaders and pipeline state objects.

use crate::error::{EngineError, Result};
use crate::resource::{Format, TextureHandle};
use crate::space::PipelineResourceLayout;

slotmap::new_key_type! {
    pub struct ShaderHandle;
    pub struct PipelineHandle;
}

/// Maximum simultaneously bound color targets.
pub const MAX_RENDER_TARGETS: usize = 8;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

/// Identifies a shader by source file, entry point and stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderDesc {
    pub source_name: String,
    pub entry_point: String,
    pub stage: ShaderStage,
}

impl ShaderDesc {
    pub fn new(source_name: impl Into<String>, entry_point: impl Into<String>, stage: ShaderStage) -> Self {
        Self {
            source_name: source_name.into(),
            entry_point: entry_point.into(),
            stage,
        }
    }
}

/// A compiled shader: its description plus the backend's opaque blob.
#[derive(Debug, Clone)]
pub struct Shader {
    pub(crate) desc: ShaderDesc,
    pub(crate) bytecode: Vec<u8>,
}

impl Shader {
    #[inline]
    pub fn desc(&self) -> &ShaderDesc {
        &self.desc
    }

    #[inline]
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    Never,
    #[default]
    Less,
    LessEqual,
    Equal,
    Greater,
    GreaterEqual,
    Always,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub write: bool,
    pub compare: CompareFunction,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            write: true,
            compare: CompareFunction::Less,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct RasterState {
    pub cull: CullMode,
    /// Counter-clockwise winding is front-facing when set.
    pub front_ccw: bool,
}

/// Graphics pipeline creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsPipelineDesc {
    pub vertex_shader: ShaderHandle,
    pub pixel_shader: ShaderHandle,
    pub render_target_formats: Vec<Format>,
    pub depth_format: Option<Format>,
    pub depth: DepthState,
    pub raster: RasterState,
    pub topology: PrimitiveTopology,
    pub debug_name: String,
}

impl GraphicsPipelineDesc {
    pub fn new(vertex_shader: ShaderHandle, pixel_shader: ShaderHandle) -> Self {
        Self {
            vertex_shader,
            pixel_shader,
            render_target_formats: Vec::new(),
            depth_format: None,
            depth: DepthState::default(),
            raster: RasterState::default(),
            topology: PrimitiveTopology::TriangleList,
            debug_name: String::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |why: String| {
            Err(EngineError::InvalidDescriptor(format!(
                "pipeline '{}': {why}",
                self.debug_name
            )))
        };

        if self.render_target_formats.len() > MAX_RENDER_TARGETS {
            return invalid(format!(
                "{} render targets exceed the limit of {MAX_RENDER_TARGETS}",
                self.render_target_formats.len()
            ));
        }
        if let Some(f) = self.render_target_formats.iter().find(|f| f.is_depth()) {
            return invalid(format!("{f:?} is not a color format"));
        }
        match self.depth_format {
            Some(f) if !f.is_depth() => invalid(format!("{f:?} is not a depth format")),
            None if self.render_target_formats.is_empty() => {
                invalid("no color or depth targets".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Immutable pipeline: its description plus the resource layout it was built against.
#[derive(Debug, Clone)]
pub struct PipelineStateObject {
    pub(crate) desc: GraphicsPipelineDesc,
    pub(crate) layout: PipelineResourceLayout,
}

impl PipelineStateObject {
    #[inline]
    pub fn desc(&self) -> &GraphicsPipelineDesc {
        &self.desc
    }

    #[inline]
    pub fn layout(&self) -> &PipelineResourceLayout {
        &self.layout
    }
}

/// Pipeline plus the targets it renders to, as bound by `GraphicsContext::set_pipeline`.
///
/// `pipeline: None` binds targets only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineInfo {
    pub pipeline: Option<PipelineHandle>,
    pub render_targets: Vec<TextureHandle>,
    pub depth_stencil_target: Option<TextureHandle>,
}
