use crate::pipeline::{CompareFunction, CullMode, PrimitiveTopology};
use crate::resource::Format;

pub(crate) fn texture_format(f: Format) -> wgpu::TextureFormat {
    match f {
        Format::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        Format::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        Format::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        Format::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        Format::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        Format::R32Float => wgpu::TextureFormat::R32Float,
        Format::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

/// Inverse of [`texture_format`] for formats a surface may report.
pub(crate) fn engine_format(f: wgpu::TextureFormat) -> Option<Format> {
    Some(match f {
        wgpu::TextureFormat::Rgba8Unorm => Format::Rgba8Unorm,
        wgpu::TextureFormat::Rgba8UnormSrgb => Format::Rgba8UnormSrgb,
        wgpu::TextureFormat::Bgra8Unorm => Format::Bgra8Unorm,
        wgpu::TextureFormat::Bgra8UnormSrgb => Format::Bgra8UnormSrgb,
        wgpu::TextureFormat::Rgba16Float => Format::Rgba16Float,
        _ => return None,
    })
}

pub(crate) fn topology(t: PrimitiveTopology) -> wgpu::PrimitiveTopology {
    match t {
        PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
        PrimitiveTopology::PointList => wgpu::PrimitiveTopology::PointList,
    }
}

pub(crate) fn cull_mode(c: CullMode) -> Option<wgpu::Face> {
    match c {
        CullMode::None => None,
        CullMode::Front => Some(wgpu::Face::Front),
        CullMode::Back => Some(wgpu::Face::Back),
    }
}

pub(crate) fn compare(c: CompareFunction) -> wgpu::CompareFunction {
    match c {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}
