//! Lumen engine crate.
//!
//! This crate owns the GPU frame cycle used by higher layers:
//! - GPU resources with bindless indices and upload readiness
//! - the per-frame upload queue
//! - explicit resource-state barriers, batched per flush
//! - lockable pipeline resource spaces and pipeline state objects
//! - the graphics context that records one frame of commands
//! - the device that rotates frame slots and retires released objects
//!
//! The GPU API itself sits behind [`backend::Backend`]. `backend::sim` is a
//! software timeline used for testing; `backend::wgpu` drives real hardware.

pub mod backend;
pub mod command;
pub mod context;
pub mod coords;
pub mod core;
pub mod descriptor;
pub mod device;
pub mod frame;
pub mod logging;
pub mod pipeline;
pub mod resource;
pub mod space;
pub mod upload;

mod barrier;
mod error;

#[cfg(feature = "backend_wgpu")]
pub mod window;

pub use barrier::ResourceBarrier;
pub use error::{EngineError, Result};
