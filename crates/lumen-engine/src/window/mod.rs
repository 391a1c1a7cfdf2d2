//! Window runtime.
//!
//! Owns the winit event loop and window, creates the wgpu-backed device for it
//! and drives the app once per redraw.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig};
