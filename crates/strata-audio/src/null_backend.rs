//! Pull-driven (null) engine backend
//!
//! No hardware behind it: the client polls `pump_and_mix_voices` and the
//! pump runs synchronously on the caller, writing the main mix into an
//! inspectable buffer. Used by tests and headless tools, and the reference
//! for pump semantics on the hardware backends.

use std::sync::{Arc, Mutex};

use crate::engine::{AudioVoiceEngine, EngineShared};
use crate::error::AudioResult;
use crate::midi::{MidiClient, MidiIn, MidiInOut, MidiOut, MidiReceiver};
use crate::mix_info::{ChannelSet, MixInfo, SampleFormat};
use crate::submix::Submix;
use crate::voice::{Voice, VoiceCallback};

enum NullOutput {
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
}

/// Engine backend with a client-driven pump and no output device
pub struct NullVoiceEngine {
    shared: Arc<EngineShared>,
    midi: MidiClient,
    output: Mutex<NullOutput>,
}

impl NullVoiceEngine {
    /// Build an engine mixing at `sample_rate` into `period_frames`-frame
    /// periods of the given channel set and sample format
    pub fn new(
        sample_rate: f64,
        channels: ChannelSet,
        format: SampleFormat,
        period_frames: usize,
    ) -> Self {
        let mix_info = MixInfo::new(channels, sample_rate, format, period_frames);
        let shared = EngineShared::new(mix_info);
        let output = match format {
            SampleFormat::Int16 => NullOutput::I16(Vec::new()),
            SampleFormat::Int32 => NullOutput::I32(Vec::new()),
            SampleFormat::Float32 => NullOutput::F32(Vec::new()),
        };
        Self {
            midi: MidiClient::new(None),
            shared,
            output: Mutex::new(output),
        }
    }

    /// Pump an arbitrary number of frames instead of one period
    pub fn pump_frames(&self, frames: usize) {
        let channels = self.shared.mix_info.channel_count();
        let samples = frames * channels;
        let mut output = self.output.lock().unwrap();
        match &mut *output {
            NullOutput::I16(buf) => {
                buf.resize(samples, 0);
                self.shared.pump_into::<i16>(frames, buf);
            }
            NullOutput::I32(buf) => {
                buf.resize(samples, 0);
                self.shared.pump_into::<i32>(frames, buf);
            }
            NullOutput::F32(buf) => {
                buf.resize(samples, 0.0);
                self.shared.pump_into::<f32>(frames, buf);
            }
        }
    }

    /// The most recent period's output, for Float32 engines
    pub fn last_period_f32(&self) -> Vec<f32> {
        match &*self.output.lock().unwrap() {
            NullOutput::F32(buf) => buf.clone(),
            _ => Vec::new(),
        }
    }

    /// The most recent period's output, for Int16 engines
    pub fn last_period_i16(&self) -> Vec<i16> {
        match &*self.output.lock().unwrap() {
            NullOutput::I16(buf) => buf.clone(),
            _ => Vec::new(),
        }
    }

    /// The most recent period's output, for Int32 engines
    pub fn last_period_i32(&self) -> Vec<i32> {
        match &*self.output.lock().unwrap() {
            NullOutput::I32(buf) => buf.clone(),
            _ => Vec::new(),
        }
    }

    /// Lengths of the active-format (pre, post) scratch vectors
    pub fn scratch_lens(&self) -> (usize, usize) {
        match self.shared.mix_info.sample_format {
            SampleFormat::Int16 => self.shared.scratch_lens::<i16>(),
            SampleFormat::Int32 => self.shared.scratch_lens::<i32>(),
            SampleFormat::Float32 => self.shared.scratch_lens::<f32>(),
        }
    }
}

impl AudioVoiceEngine for NullVoiceEngine {
    fn mix_info(&self) -> &MixInfo {
        &self.shared.mix_info
    }

    fn new_mono_voice(
        &self,
        sample_rate: f64,
        callback: Arc<dyn VoiceCallback>,
        dynamic_pitch: bool,
    ) -> Voice {
        self.shared.new_voice(1, sample_rate, dynamic_pitch, callback)
    }

    fn new_stereo_voice(
        &self,
        sample_rate: f64,
        callback: Arc<dyn VoiceCallback>,
        dynamic_pitch: bool,
    ) -> Voice {
        self.shared.new_voice(2, sample_rate, dynamic_pitch, callback)
    }

    fn new_submix(&self) -> Submix {
        self.shared.new_submix()
    }

    fn pump_and_mix_voices(&self) {
        self.pump_frames(self.shared.mix_info.period_frames);
    }

    fn enumerate_midi_devices(&self) -> Vec<(String, String)> {
        self.midi.enumerate_devices()
    }

    fn new_virtual_midi_in(&self, receiver: MidiReceiver) -> AudioResult<MidiIn> {
        self.midi.new_virtual_in(receiver)
    }

    fn new_virtual_midi_out(&self) -> AudioResult<MidiOut> {
        self.midi.new_virtual_out()
    }

    fn new_virtual_midi_in_out(&self, receiver: MidiReceiver) -> AudioResult<MidiInOut> {
        self.midi.new_virtual_in_out(receiver)
    }

    fn new_real_midi_in(&self, device_id: &str, receiver: MidiReceiver) -> AudioResult<MidiIn> {
        self.midi.new_real_in(device_id, receiver)
    }

    fn new_real_midi_out(&self, device_id: &str) -> AudioResult<MidiOut> {
        self.midi.new_real_out(device_id)
    }

    fn new_real_midi_in_out(
        &self,
        device_id: &str,
        receiver: MidiReceiver,
    ) -> AudioResult<MidiInOut> {
        self.midi.new_real_in_out(device_id, receiver)
    }

    fn use_midi_lock(&self) -> bool {
        self.midi.uses_lock()
    }
}
