use std::path::PathBuf;
use std::time::Duration;

/// Initialization parameters for the wgpu backend.
///
/// Keep this structure minimal. Add configuration flags only when a concrete
/// platform or backend requirement exists.
#[derive(Debug, Clone)]
pub struct WgpuConfig {
    /// Prefer an sRGB surface format when available.
    pub prefer_srgb: bool,

    /// Present mode (swap behavior). FIFO is supported everywhere.
    pub present_mode: wgpu::PresentMode,

    /// Optional alpha mode preference; an unsupported request falls back to a supported mode.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    pub power_preference: wgpu::PowerPreference,

    /// Required wgpu features. Favor an empty set for portability.
    pub required_features: wgpu::Features,

    pub required_limits: wgpu::Limits,

    /// Directory WGSL sources are loaded from by `ShaderDesc::source_name`.
    pub shader_dir: PathBuf,

    /// Upper bound for one wait on a completion marker.
    pub fence_timeout: Duration,
}

impl Default for WgpuConfig {
    fn default() -> Self {
        Self {
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            shader_dir: PathBuf::from("shaders"),
            fence_timeout: Duration::from_secs(5),
        }
    }
}
