//! Strata audio voice engine
//!
//! A real-time mixing core: many client-supplied voices are pulled through
//! per-voice resamplers, routed through slewed send matrices into submixes,
//! and composed into one hardware output buffer per period.
//!
//! Two scheduling modes exist, chosen by the backend:
//!
//! - [`CpalVoiceEngine`]: the hardware callback drives the pump, either
//!   directly or in lock-step with the client thread (retrace mode).
//! - [`NullVoiceEngine`]: the client polls [`AudioVoiceEngine::pump_and_mix_voices`]
//!   and the pump runs synchronously with no device behind it.
//!
//! The engine also owns the process's MIDI client; endpoints are created
//! through the same [`AudioVoiceEngine`] surface.

mod config;
mod cpal_backend;
mod engine;
mod error;
mod format;
mod matrix;
mod midi;
mod mix_info;
mod null_backend;
mod resampler;
mod retrace;
mod sample;
mod submix;
mod voice;

pub use config::{AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE};
pub use cpal_backend::CpalVoiceEngine;
pub use engine::AudioVoiceEngine;
pub use error::{AudioError, AudioResult};
pub use matrix::{AudioMatrixMono, AudioMatrixStereo};
pub use midi::{MidiIn, MidiInOut, MidiOut, MidiReceiver};
pub use mix_info::{
    AudioChannel, ChannelMap, ChannelSet, MixInfo, SampleFormat, MAX_CHANNELS,
};
pub use null_backend::NullVoiceEngine;
pub use sample::MixSample;
pub use submix::{Submix, SubmixEffect, SubmixId, MAIN_SUBMIX};
pub use voice::{Voice, VoiceCallback, VoiceControl, VoiceId};
