//! Audio voices
//!
//! A voice is one independent source of audio pulled through a resampler
//! into one or more submixes. The client implements [`VoiceCallback`] to
//! supply int16 samples on demand; the engine pulls, routes, and matrix-
//! mixes them during each pump. Parameter changes requested from other
//! threads are latched and applied exactly once at the start of the next
//! pump, sample-rate reset first, pitch ratio second.

use std::sync::{Arc, Mutex, Weak};

use crate::engine::{EngineScratch, EngineShared, SubmixTable};
use crate::format::EngineFormat;
use crate::matrix::{AudioMatrixMono, AudioMatrixStereo};
use crate::mix_info::{MixInfo, MAX_CHANNELS};
use crate::resampler::VoiceResampler;
use crate::submix::{Submix, SubmixId, MAIN_SUBMIX};

/// Engine-unique voice identity, handed to every callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(pub u64);

/// Client-implemented audio source
///
/// `supply_audio` must fill the requested number of int16 frames (mono) or
/// interleaved frame pairs (stereo) into the scratch slice and report how
/// many frames it produced. The route overloads may transform the resampled
/// block per destination bus; the defaults pass it through unchanged.
#[allow(clippy::too_many_arguments)]
pub trait VoiceCallback: Send + Sync {
    /// Optional parameter updates before the voice is pulled
    fn pre_supply_audio(&self, _voice: VoiceId, _ctl: &mut VoiceControl<'_>, _dt: f64) {}

    /// Produce up to `frames` frames of int16 audio into `scratch`
    fn supply_audio(&self, voice: VoiceId, frames: usize, scratch: &mut [i16]) -> usize;

    fn route_audio_i16(
        &self,
        _voice: VoiceId,
        frames: usize,
        channels: usize,
        _dt: f64,
        _bus: u32,
        input: &[i16],
        output: &mut [i16],
    ) {
        output[..frames * channels].copy_from_slice(&input[..frames * channels]);
    }

    fn route_audio_i32(
        &self,
        _voice: VoiceId,
        frames: usize,
        channels: usize,
        _dt: f64,
        _bus: u32,
        input: &[i32],
        output: &mut [i32],
    ) {
        output[..frames * channels].copy_from_slice(&input[..frames * channels]);
    }

    fn route_audio_f32(
        &self,
        _voice: VoiceId,
        frames: usize,
        channels: usize,
        _dt: f64,
        _bus: u32,
        input: &[f32],
        output: &mut [f32],
    ) {
        output[..frames * channels].copy_from_slice(&input[..frames * channels]);
    }
}

/// Deferred parameter values latched for the next pump
#[derive(Debug, Default)]
pub(crate) struct PendingParams {
    pub reset_rate: Option<f64>,
    pub pitch: Option<(f64, bool)>,
}

/// In-callback view of a voice's deferred setters
///
/// Handed to `pre_supply_audio` so receivers can adjust parameters without
/// re-entering the voice lock they are already inside.
pub struct VoiceControl<'a> {
    pending: &'a mut PendingParams,
}

impl VoiceControl<'_> {
    /// Request a pitch-ratio change, applied at this pump's top
    pub fn set_pitch_ratio(&mut self, ratio: f64, slew: bool) {
        self.pending.pitch = Some((ratio, slew));
    }

    /// Request a resampler rebuild at a new input rate
    pub fn reset_sample_rate(&mut self, sample_rate: f64) {
        self.pending.reset_rate = Some(sample_rate);
    }
}

/// Send map variants matching the voice's channel arity
pub(crate) enum Sends {
    Mono(Vec<(SubmixId, AudioMatrixMono)>),
    Stereo(Vec<(SubmixId, AudioMatrixStereo)>),
}

impl Sends {
    fn clear(&mut self) {
        match self {
            Sends::Mono(list) => list.clear(),
            Sends::Stereo(list) => list.clear(),
        }
    }

    pub(crate) fn remove_submix(&mut self, id: SubmixId) {
        match self {
            Sends::Mono(list) => list.retain(|(sid, _)| *sid != id),
            Sends::Stereo(list) => list.retain(|(sid, _)| *sid != id),
        }
    }
}

/// Engine-side state of one voice
pub(crate) struct VoiceCore {
    pub id: VoiceId,
    channels: usize,
    callback: Arc<dyn VoiceCallback>,
    /// None after a failed resampler build; the voice pumps silence
    resampler: Option<VoiceResampler>,
    rate_out: f64,
    dynamic_rate: bool,
    pub running: bool,
    silent_out: bool,
    pitch_ratio: f64,
    pending: PendingParams,
    pub sends: Sends,
}

impl VoiceCore {
    pub fn new(
        id: VoiceId,
        channels: usize,
        sample_rate: f64,
        rate_out: f64,
        dynamic_rate: bool,
        callback: Arc<dyn VoiceCallback>,
    ) -> Self {
        let resampler = match VoiceResampler::new(sample_rate, rate_out, channels, dynamic_rate) {
            Ok(rs) => Some(rs),
            Err(e) => {
                log::error!("Unable to create voice resampler: {}", e);
                None
            }
        };
        let sends = if channels == 1 {
            Sends::Mono(Vec::new())
        } else {
            Sends::Stereo(Vec::new())
        };
        Self {
            id,
            channels,
            callback,
            resampler,
            rate_out,
            dynamic_rate,
            running: false,
            silent_out: false,
            pitch_ratio: 1.0,
            pending: PendingParams::default(),
            sends,
        }
    }

    pub fn output_delay(&self) -> usize {
        self.resampler.as_ref().map_or(0, VoiceResampler::output_delay)
    }

    pub fn set_silent_out(&mut self, silent: bool) {
        self.silent_out = silent;
    }

    pub fn request_pitch_ratio(&mut self, ratio: f64, slew: bool) {
        self.pending.pitch = Some((ratio, slew));
    }

    pub fn request_sample_rate(&mut self, rate: f64) {
        self.pending.reset_rate = Some(rate);
    }

    /// Apply latched parameter changes: sample-rate reset first, then ratio
    fn mid_update(&mut self, five_ms_frames: usize) {
        if let Some(rate) = self.pending.reset_rate.take() {
            self.reset_sample_rate_now(rate);
        }
        if let Some((ratio, slew)) = self.pending.pitch.take() {
            self.pitch_ratio = ratio;
            if let Some(rs) = &mut self.resampler {
                let slew_frames = if slew { five_ms_frames } else { 0 };
                if let Err(e) = rs.set_io_ratio(ratio, slew_frames) {
                    log::error!("Unable to set resampler rate: {}", e);
                }
            }
        }
    }

    /// Rebuild the resampler at a new input rate
    ///
    /// The current pitch ratio is re-applied against the new rates; a ratio
    /// computed against the old output rate must be re-requested.
    fn reset_sample_rate_now(&mut self, sample_rate: f64) {
        match VoiceResampler::new(sample_rate, self.rate_out, self.channels, self.dynamic_rate) {
            Ok(mut rs) => {
                if let Err(e) = rs.set_io_ratio(self.pitch_ratio, 0) {
                    log::error!("Unable to set resampler rate: {}", e);
                }
                self.resampler = Some(rs);
            }
            Err(e) => {
                log::error!("Unable to create voice resampler: {}", e);
                self.resampler = None;
            }
        }
    }

    pub fn set_mono_levels(&mut self, submix: SubmixId, coefs: [f32; MAX_CHANNELS], slew_frames: usize) {
        match &mut self.sends {
            Sends::Mono(list) => {
                let mtx = find_or_insert(list, submix, AudioMatrixMono::zeroed);
                mtx.set_coefficients(coefs, slew_frames);
            }
            // A stereo voice duplicates mono coefficients across both columns.
            Sends::Stereo(list) => {
                let mut expanded = [[0.0f32; 2]; MAX_CHANNELS];
                for c in 0..MAX_CHANNELS {
                    expanded[c] = [coefs[c], coefs[c]];
                }
                let mtx = find_or_insert(list, submix, AudioMatrixStereo::zeroed);
                mtx.set_coefficients(expanded, slew_frames);
            }
        }
    }

    pub fn set_stereo_levels(
        &mut self,
        submix: SubmixId,
        coefs: [[f32; 2]; MAX_CHANNELS],
        slew_frames: usize,
    ) {
        match &mut self.sends {
            // A mono voice takes the left column.
            Sends::Mono(list) => {
                let mut collapsed = [0.0f32; MAX_CHANNELS];
                for c in 0..MAX_CHANNELS {
                    collapsed[c] = coefs[c][0];
                }
                let mtx = find_or_insert(list, submix, AudioMatrixMono::zeroed);
                mtx.set_coefficients(collapsed, slew_frames);
            }
            Sends::Stereo(list) => {
                let mtx = find_or_insert(list, submix, AudioMatrixStereo::zeroed);
                mtx.set_coefficients(coefs, slew_frames);
            }
        }
    }

    pub fn reset_channel_levels(&mut self) {
        self.sends.clear();
    }

    /// Pull one period from this voice and mix it into its send targets
    ///
    /// Returns the number of frames the resampler produced.
    pub fn pump_and_mix<S: EngineFormat>(
        &mut self,
        info: &MixInfo,
        frames: usize,
        scratch: &mut EngineScratch,
        submixes: &mut SubmixTable,
    ) -> usize {
        let chan_count = info.channel_count();
        let dt = frames as f64 / info.sample_rate;

        let callback = self.callback.clone();
        callback.pre_supply_audio(
            self.id,
            &mut VoiceControl {
                pending: &mut self.pending,
            },
            dt,
        );
        self.mid_update(info.five_ms_frames());

        let Some(rs) = &mut self.resampler else {
            return 0;
        };

        let voice_ch = self.channels;
        let samples = frames * voice_ch;
        let (scratch_in, pre, post) = S::scratch_triple(scratch);
        if pre.len() < samples {
            pre.resize(samples, S::default());
        }
        if post.len() < samples {
            post.resize(samples, S::default());
        }

        let id = self.id;
        let silent = self.silent_out;
        let supply_cb = callback.clone();
        let done = rs.pull(&mut pre[..samples], frames, scratch_in, |buf, n| {
            if silent {
                buf.fill(0);
                n
            } else {
                supply_cb.supply_audio(id, n, buf)
            }
        });
        if done == 0 {
            return 0;
        }

        let done_samples = done * voice_ch;
        let merge_samples = done * chan_count;

        match &mut self.sends {
            Sends::Mono(list) if !list.is_empty() => {
                for (sid, mtx) in list.iter_mut() {
                    let Some(smx) = submixes.get_mut(*sid) else {
                        continue;
                    };
                    S::route(
                        &*callback,
                        id,
                        done,
                        1,
                        dt,
                        smx.bus_id,
                        &pre[..done_samples],
                        &mut post[..done_samples],
                    );
                    mtx.mix_mono_sample_data(
                        chan_count,
                        &post[..done],
                        S::merge(smx, merge_samples),
                        done,
                    );
                }
            }
            Sends::Mono(_) => {
                let smx = submixes.main_mut();
                S::route(
                    &*callback,
                    id,
                    done,
                    1,
                    dt,
                    smx.bus_id,
                    &pre[..done_samples],
                    &mut post[..done_samples],
                );
                AudioMatrixMono::identity().mix_mono_sample_data(
                    chan_count,
                    &post[..done],
                    S::merge(smx, merge_samples),
                    done,
                );
            }
            Sends::Stereo(list) if !list.is_empty() => {
                for (sid, mtx) in list.iter_mut() {
                    let Some(smx) = submixes.get_mut(*sid) else {
                        continue;
                    };
                    S::route(
                        &*callback,
                        id,
                        done,
                        2,
                        dt,
                        smx.bus_id,
                        &pre[..done_samples],
                        &mut post[..done_samples],
                    );
                    mtx.mix_stereo_sample_data(
                        chan_count,
                        &post[..done_samples],
                        S::merge(smx, merge_samples),
                        done,
                    );
                }
            }
            Sends::Stereo(_) => {
                let smx = submixes.main_mut();
                S::route(
                    &*callback,
                    id,
                    done,
                    2,
                    dt,
                    smx.bus_id,
                    &pre[..done_samples],
                    &mut post[..done_samples],
                );
                AudioMatrixStereo::identity().mix_stereo_sample_data(
                    chan_count,
                    &post[..done_samples],
                    S::merge(smx, merge_samples),
                    done,
                );
            }
        }

        done
    }
}

fn find_or_insert<M>(
    list: &mut Vec<(SubmixId, M)>,
    id: SubmixId,
    make: impl FnOnce() -> M,
) -> &mut M {
    if let Some(pos) = list.iter().position(|(sid, _)| *sid == id) {
        &mut list[pos].1
    } else {
        list.push((id, make()));
        &mut list.last_mut().unwrap().1
    }
}

/// Client handle to a voice
///
/// Dropping the handle unbinds the voice from the engine; the next pump no
/// longer visits it.
pub struct Voice {
    pub(crate) core: Arc<Mutex<VoiceCore>>,
    pub(crate) engine: Weak<EngineShared>,
    pub(crate) slot: usize,
    pub(crate) id: VoiceId,
}

impl Voice {
    pub fn id(&self) -> VoiceId {
        self.id
    }

    /// Begin producing audio at the next pump
    pub fn start(&self) {
        self.core.lock().unwrap().running = true;
    }

    /// Stop producing audio; the voice stays bound
    pub fn stop(&self) {
        self.core.lock().unwrap().running = false;
    }

    /// Deferred: rebuild the resampler at a new input rate
    pub fn reset_sample_rate(&self, sample_rate: f64) {
        self.core.lock().unwrap().request_sample_rate(sample_rate);
    }

    /// Deferred: change the pitch ratio, optionally slewed over 5ms
    pub fn set_pitch_ratio(&self, ratio: f64, slew: bool) {
        self.core.lock().unwrap().request_pitch_ratio(ratio, slew);
    }

    /// Substitute silence for the client callback without stopping the pull
    pub fn set_silent_out(&self, silent: bool) {
        self.core.lock().unwrap().set_silent_out(silent);
    }

    /// Warm-up transient length of the voice's resampler, in output frames
    pub fn output_delay(&self) -> usize {
        self.core.lock().unwrap().output_delay()
    }

    /// Set the mono send matrix toward a submix (None = main)
    pub fn set_mono_channel_levels(
        &self,
        submix: Option<&Submix>,
        coefs: [f32; MAX_CHANNELS],
        slew: bool,
    ) {
        let target = submix.map_or(MAIN_SUBMIX, Submix::id);
        let slew_frames = self.slew_frames(slew);
        self.core
            .lock()
            .unwrap()
            .set_mono_levels(target, coefs, slew_frames);
    }

    /// Set the stereo send matrix toward a submix (None = main)
    pub fn set_stereo_channel_levels(
        &self,
        submix: Option<&Submix>,
        coefs: [[f32; 2]; MAX_CHANNELS],
        slew: bool,
    ) {
        let target = submix.map_or(MAIN_SUBMIX, Submix::id);
        let slew_frames = self.slew_frames(slew);
        self.core
            .lock()
            .unwrap()
            .set_stereo_levels(target, coefs, slew_frames);
    }

    /// Drop all explicit sends, falling back to the default matrix into main
    pub fn reset_channel_levels(&self) {
        if let Some(shared) = self.engine.upgrade() {
            shared.inner.lock().unwrap().submixes_dirty = true;
        }
        self.core.lock().unwrap().reset_channel_levels();
    }

    fn slew_frames(&self, slew: bool) -> usize {
        if !slew {
            return 0;
        }
        self.engine
            .upgrade()
            .map_or(0, |shared| shared.mix_info.five_ms_frames())
    }
}

impl Drop for Voice {
    fn drop(&mut self) {
        if let Some(shared) = self.engine.upgrade() {
            shared.unbind_voice(self.slot);
        }
    }
}
