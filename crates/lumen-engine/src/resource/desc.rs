use crate::error::{EngineError, Result};

use super::{AccessPattern, ResourceState};

/// Constant buffer views must start on this alignment; allocations are padded to it.
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// Largest texture edge accepted by `TextureDesc::validate`.
pub const MAX_TEXTURE_DIMENSION: u32 = 16384;

/// Texel formats understood by the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Format {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    R32Float,
    Depth32Float,
}

impl Format {
    #[inline]
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Rgba8Unorm | Self::Rgba8UnormSrgb | Self::Bgra8Unorm | Self::Bgra8UnormSrgb => 4,
            Self::Rgba16Float => 8,
            Self::R32Float | Self::Depth32Float => 4,
        }
    }

    #[inline]
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth32Float)
    }

    #[inline]
    pub fn is_srgb(self) -> bool {
        matches!(self, Self::Rgba8UnormSrgb | Self::Bgra8UnormSrgb)
    }
}

/// Shader-visible views requested for a buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferViews {
    pub cbv: bool,
    pub srv: bool,
    pub uav: bool,
}

impl BufferViews {
    pub const NONE: Self = Self { cbv: false, srv: false, uav: false };
    pub const CBV: Self = Self { cbv: true, srv: false, uav: false };
    pub const SRV: Self = Self { cbv: false, srv: true, uav: false };
    pub const UAV: Self = Self { cbv: false, srv: false, uav: true };

    /// Whether the buffer needs a slot in the bindless descriptor heap.
    #[inline]
    pub fn is_shader_visible(self) -> bool {
        self.cbv || self.srv || self.uav
    }
}

/// Views requested for a texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct TextureViews {
    pub srv: bool,
    pub rtv: bool,
    pub dsv: bool,
}

impl TextureViews {
    pub const SRV: Self = Self { srv: true, rtv: false, dsv: false };
    pub const RTV: Self = Self { srv: false, rtv: true, dsv: false };
    pub const DSV: Self = Self { srv: false, rtv: false, dsv: true };
}

/// Buffer creation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BufferDesc {
    pub size: u64,
    /// Element stride for structured views; `0` for raw / constant data.
    pub stride: u32,
    pub access: AccessPattern,
    pub views: BufferViews,
    pub debug_name: String,
}

impl BufferDesc {
    /// Host-writable constant buffer of `size` bytes.
    pub fn constants(size: u64, debug_name: impl Into<String>) -> Self {
        Self {
            size,
            stride: 0,
            access: AccessPattern::HostWritable,
            views: BufferViews::CBV,
            debug_name: debug_name.into(),
        }
    }

    /// Read-only structured buffer (shader resource view) of `count` elements.
    pub fn structured(
        count: u64,
        stride: u32,
        access: AccessPattern,
        debug_name: impl Into<String>,
    ) -> Self {
        Self {
            size: count * stride as u64,
            stride,
            access,
            views: BufferViews::SRV,
            debug_name: debug_name.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(EngineError::InvalidDescriptor(format!(
                "buffer '{}' has zero size",
                self.debug_name
            )));
        }
        if self.access == AccessPattern::HostWritable && self.views.uav {
            return Err(EngineError::InvalidDescriptor(format!(
                "buffer '{}': host-writable memory cannot carry an unordered-access view",
                self.debug_name
            )));
        }
        if self.stride != 0 && self.size % self.stride as u64 != 0 {
            return Err(EngineError::InvalidDescriptor(format!(
                "buffer '{}': size {} is not a multiple of stride {}",
                self.debug_name, self.size, self.stride
            )));
        }
        Ok(())
    }

    /// Bytes actually allocated; constant buffers are padded to 256.
    pub fn allocation_size(&self) -> u64 {
        if self.views.cbv {
            self.size.div_ceil(CONSTANT_BUFFER_ALIGNMENT) * CONSTANT_BUFFER_ALIGNMENT
        } else {
            self.size
        }
    }
}

/// Texture creation parameters (2D, single mip).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub views: TextureViews,
    pub debug_name: String,
}

impl TextureDesc {
    pub fn new(width: u32, height: u32, format: Format, views: TextureViews) -> Self {
        Self {
            width,
            height,
            format,
            views,
            debug_name: String::new(),
        }
    }

    pub fn named(mut self, debug_name: impl Into<String>) -> Self {
        self.debug_name = debug_name.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |why: &str| {
            Err(EngineError::InvalidDescriptor(format!(
                "texture '{}': {why}",
                self.debug_name
            )))
        };

        if self.width == 0 || self.height == 0 {
            return invalid("zero extent");
        }
        if self.width > MAX_TEXTURE_DIMENSION || self.height > MAX_TEXTURE_DIMENSION {
            return invalid("extent exceeds the maximum texture dimension");
        }
        if !(self.views.srv || self.views.rtv || self.views.dsv) {
            return invalid("no views requested");
        }
        if self.views.rtv && self.views.dsv {
            return invalid("a texture cannot be both render target and depth target");
        }
        if self.views.dsv && !self.format.is_depth() {
            return invalid("depth-stencil view needs a depth format");
        }
        if self.views.rtv && self.format.is_depth() {
            return invalid("render target view needs a color format");
        }
        Ok(())
    }

    /// Size of tightly packed pixel data for this texture.
    #[inline]
    pub fn byte_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.bytes_per_pixel() as u64
    }

    #[inline]
    pub fn bytes_per_row(&self) -> u32 {
        self.width * self.format.bytes_per_pixel()
    }

    /// Textures written by the GPU itself start ready; sampled ones wait for an upload.
    #[inline]
    pub fn is_gpu_produced(&self) -> bool {
        self.views.rtv || self.views.dsv
    }

    pub(crate) fn initial_state(&self) -> ResourceState {
        if self.views.rtv {
            ResourceState::RenderTarget
        } else if self.views.dsv {
            ResourceState::DepthWrite
        } else {
            ResourceState::Common
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── buffers ───────────────────────────────────────────────────────────

    #[test]
    fn constant_buffers_are_padded() {
        let desc = BufferDesc::constants(64, "cb");
        assert_eq!(desc.allocation_size(), 256);
        let desc = BufferDesc::constants(300, "cb");
        assert_eq!(desc.allocation_size(), 512);
    }

    #[test]
    fn structured_buffers_are_not_padded() {
        let desc = BufferDesc::structured(3, 20, AccessPattern::GpuOnly, "vb");
        assert_eq!(desc.size, 60);
        assert_eq!(desc.allocation_size(), 60);
    }

    #[test]
    fn zero_sized_buffer_is_rejected() {
        let desc = BufferDesc::constants(0, "empty");
        assert!(matches!(desc.validate(), Err(EngineError::InvalidDescriptor(_))));
    }

    #[test]
    fn host_writable_uav_is_rejected() {
        let desc = BufferDesc {
            size: 16,
            access: AccessPattern::HostWritable,
            views: BufferViews::UAV,
            ..Default::default()
        };
        assert!(desc.validate().is_err());
    }

    #[test]
    fn stride_must_divide_size() {
        let desc = BufferDesc {
            size: 10,
            stride: 4,
            views: BufferViews::SRV,
            ..Default::default()
        };
        assert!(desc.validate().is_err());
    }

    // ── textures ──────────────────────────────────────────────────────────

    #[test]
    fn depth_view_requires_depth_format() {
        let desc = TextureDesc::new(4, 4, Format::Rgba8Unorm, TextureViews::DSV);
        assert!(desc.validate().is_err());
        let desc = TextureDesc::new(4, 4, Format::Depth32Float, TextureViews::DSV);
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn initial_states_follow_views() {
        let rt = TextureDesc::new(4, 4, Format::Rgba8Unorm, TextureViews::RTV);
        let ds = TextureDesc::new(4, 4, Format::Depth32Float, TextureViews::DSV);
        let sampled = TextureDesc::new(4, 4, Format::Rgba8Unorm, TextureViews::SRV);
        assert_eq!(rt.initial_state(), ResourceState::RenderTarget);
        assert_eq!(ds.initial_state(), ResourceState::DepthWrite);
        assert_eq!(sampled.initial_state(), ResourceState::Common);
    }

    #[test]
    fn texture_byte_size() {
        let desc = TextureDesc::new(8, 2, Format::Rgba16Float, TextureViews::SRV);
        assert_eq!(desc.byte_size(), 128);
        assert_eq!(desc.bytes_per_row(), 64);
    }
}
