//! Audio backend configuration
//!
//! Device selection, sample-rate preference, and buffer sizing for the
//! hardware-backed engine. Serializable so applications can round-trip it
//! through their settings files.

use serde::{Deserialize, Serialize};

/// Maximum buffer size the engine pre-allocates scratch for (frames)
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default buffer size when no preference is specified (frames)
///
/// 512 frames is a safe default that works on most systems.
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Default sample rate requested from the device (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Preferred buffer size for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the system choose
    #[default]
    Default,
    /// Request a specific size in frames (may be adjusted by the device)
    Fixed(u32),
    /// Use a small known-good buffer for responsive output
    LowLatency,
}

impl BufferSize {
    /// Resolve to a concrete frame count
    pub fn as_frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => (*frames).clamp(64, MAX_BUFFER_SIZE as u32),
            BufferSize::LowLatency => 256,
        }
    }

    /// Latency in milliseconds at the given sample rate
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        (self.as_frames() as f32 / sample_rate as f32) * 1000.0
    }
}

/// Configuration for the hardware audio backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Output device name (None = system default)
    pub device: Option<String>,

    /// Preferred sample rate (None = device default, typically 44100 or 48000)
    pub sample_rate: Option<u32>,

    /// Preferred buffer size
    pub buffer_size: BufferSize,
}

impl AudioConfig {
    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device = Some(name.into());
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    pub fn with_low_latency(mut self) -> Self {
        self.buffer_size = BufferSize::LowLatency;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_resolution() {
        assert_eq!(BufferSize::Default.as_frames(), DEFAULT_BUFFER_SIZE);
        assert_eq!(BufferSize::Fixed(1024).as_frames(), 1024);
        assert_eq!(BufferSize::Fixed(1).as_frames(), 64);
        assert_eq!(BufferSize::LowLatency.as_frames(), 256);
    }

    #[test]
    fn test_latency_calculation() {
        let ms = BufferSize::Fixed(480).latency_ms(48000);
        assert!((ms - 10.0).abs() < 0.001);
    }
}
