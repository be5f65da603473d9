//! CPAL engine backend
//!
//! Callback-driven scheduling: the OS audio thread demands one period at a
//! time and the engine either pumps directly inside the callback
//! (low-latency default) or, once the client enters retrace mode, hands
//! each period to the client thread through the rendezvous in
//! [`crate::retrace`].
//!
//! The engine mixes in Float32; cpal handles device-side conversion.

use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat as CpalSampleFormat, StreamConfig};

use crate::config::AudioConfig;
use crate::engine::{AudioVoiceEngine, EngineShared};
use crate::error::{AudioError, AudioResult};
use crate::midi::{MidiClient, MidiIn, MidiInOut, MidiOut, MidiReceiver};
use crate::mix_info::{ChannelSet, MixInfo, SampleFormat};
use crate::retrace::Retrace;
use crate::submix::Submix;
use crate::voice::{Voice, VoiceCallback};

/// Hardware-backed voice engine
///
/// A successful construction guarantees a running stream; the callback
/// keeps the device fed even when no client thread participates.
pub struct CpalVoiceEngine {
    shared: Arc<EngineShared>,
    retrace: Arc<Retrace>,
    midi: MidiClient,
    _stream: cpal::Stream,
}

impl CpalVoiceEngine {
    pub fn new(config: &AudioConfig) -> AudioResult<Self> {
        let host = cpal::default_host();
        let device = match &config.device {
            Some(name) => find_device_by_name(&host, name)?,
            None => host
                .default_output_device()
                .ok_or(AudioError::NoDevices)?,
        };

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using audio device: {}", device_name);

        let supported = pick_output_config(&device, config)?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let period_frames = config.buffer_size.as_frames() as usize;

        let stream_config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: CpalBufferSize::Fixed(period_frames as u32),
        };

        log::info!(
            "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
            channels,
            sample_rate,
            period_frames,
            (period_frames as f32 / sample_rate as f32) * 1000.0
        );

        let mix_info = MixInfo::new(
            ChannelSet::from_channel_count(channels),
            sample_rate as f64,
            SampleFormat::Float32,
            period_frames,
        );
        let shared = EngineShared::new(mix_info);
        let retrace = Arc::new(Retrace::new());

        let cb_shared = shared.clone();
        let cb_retrace = retrace.clone();
        let cb_rate = sample_rate as f64;
        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    let deadline = Duration::from_secs_f64(frames as f64 / cb_rate);
                    cb_retrace.callback_period(data, frames, channels, deadline, |out| {
                        cb_shared.pump_into::<f32>(frames, out);
                    });
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

        log::info!("Audio stream started");

        Ok(Self {
            midi: MidiClient::new(Some(shared.clone())),
            shared,
            retrace,
            _stream: stream,
        })
    }

    /// Enter retrace mode: the client thread takes over the pump
    ///
    /// After this, call [`AudioVoiceEngine::pump_and_mix_voices`] once per
    /// period from the client loop; each call serves exactly one callback.
    pub fn start_retrace(&self) {
        self.retrace.start();
    }

    /// Leave retrace mode; the callback resumes pumping directly
    pub fn retrace_break(&self) {
        self.retrace.stop();
    }
}

impl Drop for CpalVoiceEngine {
    fn drop(&mut self) {
        // Release both rendezvous sides before the stream teardown blocks
        // on the callback returning.
        self.retrace.shutdown();
    }
}

impl AudioVoiceEngine for CpalVoiceEngine {
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
        if self.retrace.is_active() {
            let shared = self.shared.clone();
            self.retrace.client_serve_once(|out, frames, _channels| {
                shared.pump_into::<f32>(frames, out);
            });
        }
        // Outside retrace mode the callback pumps by itself.
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

/// Find an output device by case-insensitive name substring
fn find_device_by_name(host: &cpal::Host, name: &str) -> AudioResult<cpal::Device> {
    let pattern = name.to_lowercase();
    let devices = host
        .output_devices()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?;
    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name.to_lowercase().contains(&pattern) {
                return Ok(device);
            }
        }
    }
    Err(AudioError::DeviceNotFound(name.to_string()))
}

/// Pick the best supported output configuration
///
/// Prefers f32 with at least two channels at the requested sample rate,
/// falling back to whatever the device offers.
fn pick_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported output configurations".to_string(),
        ));
    }

    let target_rate = config
        .sample_rate
        .unwrap_or(crate::config::DEFAULT_SAMPLE_RATE);

    let best = supported
        .iter()
        .filter(|c| c.sample_format() == CpalSampleFormat::F32)
        .filter(|c| c.channels() >= 2)
        .find(|c| target_rate >= c.min_sample_rate().0 && target_rate <= c.max_sample_rate().0)
        .or_else(|| {
            supported
                .iter()
                .find(|c| c.sample_format() == CpalSampleFormat::F32 && c.channels() >= 2)
        })
        .or_else(|| supported.first())
        .ok_or_else(|| {
            AudioError::ConfigError("No suitable output configuration found".to_string())
        })?;

    if best.sample_format() != CpalSampleFormat::F32 {
        return Err(AudioError::UnsupportedFormat(format!(
            "{:?}",
            best.sample_format()
        )));
    }

    let rate = if target_rate >= best.min_sample_rate().0 && target_rate <= best.max_sample_rate().0
    {
        cpal::SampleRate(target_rate)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            target_rate,
            fallback.0
        );
        fallback
    };

    Ok(best.clone().with_sample_rate(rate))
}
