use crate::coords::Extent;
use crate::error::{EngineError, Result};

/// Response to a failed surface acquisition.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum SurfaceErrorAction {
    /// Surface must be reconfigured before acquiring again.
    Reconfigure,
    /// Transient (timeout, occluded window); drop this frame and try the next one.
    SkipFrame,
    /// Fatal error (commonly OOM).
    Fatal,
}

pub(crate) fn action_for(err: &wgpu::SurfaceError) -> SurfaceErrorAction {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceErrorAction::Reconfigure,
        wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
        wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
    }
}

pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    requested: wgpu::TextureFormat,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    if caps.formats.is_empty() {
        return None;
    }
    if caps.formats.contains(&requested) {
        return Some(requested);
    }

    if prefer_srgb {
        let preferred = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        for f in preferred {
            if caps.formats.contains(&f) {
                return Some(f);
            }
        }
    }

    Some(caps.formats[0])
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

pub(crate) fn apply_size(config: &mut wgpu::SurfaceConfiguration, size: Extent) {
    config.width = size.width.max(1);
    config.height = size.height.max(1);
}

/// Acquires the next surface texture.
///
/// A lost or outdated surface is reconfigured once and acquisition retried.
/// Transient failures come back as `EngineError::FrameSkipped`.
pub(crate) fn acquire(
    surface: &wgpu::Surface,
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
) -> Result<wgpu::SurfaceTexture> {
    let mut reconfigured = false;
    loop {
        let err = match surface.get_current_texture() {
            Ok(t) => return Ok(t),
            Err(err) => err,
        };
        match action_for(&err) {
            SurfaceErrorAction::Reconfigure if !reconfigured => {
                log::debug!("surface {err}; reconfiguring");
                surface.configure(device, config);
                reconfigured = true;
            }
            SurfaceErrorAction::Fatal => {
                return Err(EngineError::OutOfMemory {
                    what: "swap chain".to_string(),
                    bytes: 0,
                });
            }
            SurfaceErrorAction::Reconfigure | SurfaceErrorAction::SkipFrame => {
                log::warn!("surface acquisition failed ({err}); skipping frame");
                return Err(EngineError::FrameSkipped {
                    reason: err.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(formats: &[wgpu::TextureFormat]) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats: formats.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn requested_format_wins_when_supported() {
        let c = caps(&[wgpu::TextureFormat::Bgra8UnormSrgb, wgpu::TextureFormat::Rgba8Unorm]);
        let f = choose_surface_format(&c, wgpu::TextureFormat::Rgba8Unorm, true);
        assert_eq!(f, Some(wgpu::TextureFormat::Rgba8Unorm));
    }

    #[test]
    fn falls_back_to_srgb_then_first() {
        let c = caps(&[wgpu::TextureFormat::Rgba16Float, wgpu::TextureFormat::Bgra8UnormSrgb]);
        assert_eq!(
            choose_surface_format(&c, wgpu::TextureFormat::Rgba8UnormSrgb, true),
            Some(wgpu::TextureFormat::Bgra8UnormSrgb)
        );
        assert_eq!(
            choose_surface_format(&c, wgpu::TextureFormat::Rgba8UnormSrgb, false),
            Some(wgpu::TextureFormat::Rgba16Float)
        );
        assert_eq!(choose_surface_format(&caps(&[]), wgpu::TextureFormat::Rgba8Unorm, true), None);
    }

    #[test]
    fn transient_surface_errors_skip_the_frame() {
        assert_eq!(action_for(&wgpu::SurfaceError::Timeout), SurfaceErrorAction::SkipFrame);
        assert_eq!(action_for(&wgpu::SurfaceError::Other), SurfaceErrorAction::SkipFrame);
        assert_eq!(action_for(&wgpu::SurfaceError::Outdated), SurfaceErrorAction::Reconfigure);
        assert_eq!(action_for(&wgpu::SurfaceError::Lost), SurfaceErrorAction::Reconfigure);
        assert_eq!(action_for(&wgpu::SurfaceError::OutOfMemory), SurfaceErrorAction::Fatal);
    }

    #[test]
    fn zero_sizes_are_clamped() {
        let mut config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: wgpu::TextureFormat::Rgba8Unorm,
            width: 8,
            height: 8,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: Vec::new(),
        };
        apply_size(&mut config, Extent::new(0, 600));
        assert_eq!((config.width, config.height), (1, 600));
    }
}
