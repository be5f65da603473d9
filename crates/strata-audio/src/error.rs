//! Audio engine error types

use thiserror::Error;

/// Errors that can occur during audio operations
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio output devices available
    #[error("No audio output devices found")]
    NoDevices,

    /// Requested device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build the output stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start the output stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Device offers no sample format the engine can mix in
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Resampler construction was handed an unusable rate
    #[error("Invalid sample rate: {0}")]
    InvalidRate(f64),

    /// Resampler construction or reconfiguration failed
    #[error("Resampler error: {0}")]
    ResamplerError(String),

    /// The voice was unbound from its engine
    #[error("Voice is no longer bound to an engine")]
    VoiceUnbound,

    /// MIDI subsystem initialization failed
    #[error("Failed to initialize MIDI: {0}")]
    MidiInit(String),

    /// No MIDI port matched the requested device identifier
    #[error("No MIDI port found matching: {0}")]
    MidiPortNotFound(String),

    /// MIDI endpoint connection failed
    #[error("MIDI connection error: {0}")]
    MidiConnect(String),

    /// MIDI send failed
    #[error("MIDI send error: {0}")]
    MidiSend(String),

    /// Virtual MIDI endpoints are not available on this platform
    #[error("Virtual MIDI endpoints are not supported on this platform")]
    MidiVirtualUnsupported,
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
