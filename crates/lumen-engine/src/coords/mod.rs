//! Screen-space types shared by the device, the graphics context and backends.
//!
//! Conventions:
//! - sizes and scissor rects are in physical pixels
//! - origin top-left, +X right, +Y down
//! - viewport depth range is `[0, 1]` unless set otherwise

mod color;
mod extent;
mod rect;
mod viewport;

pub use color::Color;
pub use extent::Extent;
pub use rect::ScissorRect;
pub use viewport::Viewport;
