use crate::coords::Extent;
use crate::error::{EngineError, Result};
use crate::resource::Format;

/// Construction parameters for [`super::Device`].
///
/// Everything the frame scheduler needs is fixed here; none of it changes
/// after construction except the screen size (through `Device::resize`).
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Number of frame slots. Frame K's GPU work completes before frame K + N records.
    pub frames_in_flight: usize,

    pub back_buffer_count: usize,

    /// Total bindless descriptor slots, reserved ones included.
    pub descriptor_capacity: u32,

    /// Slots at the front of the descriptor heap set aside for collaborators
    /// (a UI overlay uses two: font atlas and one user texture).
    pub reserved_descriptors: u32,

    /// Requested back buffer format. The backend may substitute a supported one.
    pub back_buffer_format: Format,

    pub screen_size: Extent,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            back_buffer_count: 3,
            descriptor_capacity: 4096,
            reserved_descriptors: 2,
            back_buffer_format: Format::Rgba8UnormSrgb,
            screen_size: Extent::new(1280, 720),
        }
    }
}

impl DeviceConfig {
    pub const MAX_FRAMES_IN_FLIGHT: usize = 8;
    pub const MAX_BACK_BUFFERS: usize = 8;

    pub fn validate(&self) -> Result<()> {
        if !(1..=Self::MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(EngineError::InvalidDescriptor(format!(
                "frames_in_flight must be in 1..={}, got {}",
                Self::MAX_FRAMES_IN_FLIGHT,
                self.frames_in_flight
            )));
        }
        if !(1..=Self::MAX_BACK_BUFFERS).contains(&self.back_buffer_count) {
            return Err(EngineError::InvalidDescriptor(format!(
                "back_buffer_count must be in 1..={}, got {}",
                Self::MAX_BACK_BUFFERS,
                self.back_buffer_count
            )));
        }
        if self.back_buffer_format.is_depth() {
            return Err(EngineError::InvalidDescriptor(
                "back buffer format must be a color format".to_string(),
            ));
        }
        if self.screen_size.is_empty() {
            return Err(EngineError::InvalidDescriptor(
                "screen size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(DeviceConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        let config = DeviceConfig {
            frames_in_flight: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn depth_back_buffer_is_rejected() {
        let config = DeviceConfig {
            back_buffer_format: Format::Depth32Float,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
