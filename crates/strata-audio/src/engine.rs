//! Voice engine core
//!
//! The engine owns the live voice set, the submix graph, and the per-format
//! scratch vectors shared by every voice during a pump. Backends wrap this
//! core with a scheduling mode: the cpal backend pumps from (or in lock-step
//! with) the hardware callback, the null backend pumps synchronously on the
//! caller.
//!
//! Exactly one thread runs a pump at a time; the engine mutex serializes
//! pumps against voice/submix creation and teardown from other threads.

use std::sync::{Arc, Mutex};

use crate::error::AudioResult;
use crate::format::EngineFormat;
use crate::midi::{MidiIn, MidiInOut, MidiOut, MidiReceiver};
use crate::mix_info::MixInfo;
use crate::submix::{Submix, SubmixCore, SubmixId, MAIN_SUBMIX};
use crate::voice::{Voice, VoiceCallback, VoiceCore, VoiceId};

/// Per-format scratch vectors shared by all voices
///
/// Grown monotonically as period demands rise, never shrunk during
/// operation. Safe to share because the pump is single-threaded.
#[derive(Default)]
pub(crate) struct EngineScratch {
    pub in16: Vec<i16>,
    pub pre16: Vec<i16>,
    pub post16: Vec<i16>,
    pub pre32: Vec<i32>,
    pub post32: Vec<i32>,
    pub pre_f32: Vec<f32>,
    pub post_f32: Vec<f32>,
}

/// The main submix plus every client-created bus
pub(crate) struct SubmixTable {
    pub main: SubmixCore,
    pub entries: Vec<(SubmixId, SubmixCore)>,
}

impl SubmixTable {
    fn new() -> Self {
        Self {
            main: SubmixCore::new(MAIN_SUBMIX.0),
            entries: Vec::new(),
        }
    }

    pub fn get_mut(&mut self, id: SubmixId) -> Option<&mut SubmixCore> {
        if id == MAIN_SUBMIX {
            return Some(&mut self.main);
        }
        self.entries
            .iter_mut()
            .find(|(sid, _)| *sid == id)
            .map(|(_, core)| core)
    }

    pub fn main_mut(&mut self) -> &mut SubmixCore {
        &mut self.main
    }

    /// Compose every bus into the main merge buffer, applying effect chains
    /// and the per-channel main levels, then clear the bus buffers
    pub fn compose_into_main<S: EngineFormat>(&mut self, frames: usize, channels: usize) {
        let samples = frames * channels;
        let SubmixTable { main, entries } = self;

        for (_, core) in entries.iter_mut() {
            S::apply_effects(core, frames, channels);
            let (sub_vec, levels) = S::merge_with_levels(core);
            if sub_vec.len() < samples {
                sub_vec.resize(samples, S::default());
            }
            let main_buf = S::merge(main, samples);
            for f in 0..frames {
                for c in 0..channels {
                    let i = f * channels + c;
                    main_buf[i] = S::from_f32(
                        main_buf[i].to_f32() + sub_vec[i].to_f32() * levels.gain(c),
                    );
                }
                levels.advance();
            }
            sub_vec[..samples].fill(S::default());
        }

        S::apply_effects(main, frames, channels);
    }
}

pub(crate) struct EngineInner {
    /// Slot-stable voice list; freed slots are recycled so unbind is O(1)
    pub voices: Vec<Option<Arc<Mutex<VoiceCore>>>>,
    free_slots: Vec<usize>,
    pub submixes: SubmixTable,
    pub scratch: EngineScratch,
    /// Set by any thread on submix-graph edits, cleared at pump start
    pub submixes_dirty: bool,
    next_voice_id: u64,
    next_bus_id: u32,
}

/// Backend-shared engine state
pub(crate) struct EngineShared {
    pub mix_info: MixInfo,
    pub inner: Mutex<EngineInner>,
}

impl EngineShared {
    pub fn new(mix_info: MixInfo) -> Arc<Self> {
        Arc::new(Self {
            mix_info,
            inner: Mutex::new(EngineInner {
                voices: Vec::new(),
                free_slots: Vec::new(),
                submixes: SubmixTable::new(),
                scratch: EngineScratch::default(),
                submixes_dirty: false,
                next_voice_id: 0,
                next_bus_id: 1,
            }),
        })
    }

    /// Allocate and bind a new voice
    ///
    /// A failed resampler build is logged and leaves the voice permanently
    /// silent rather than failing the allocation.
    pub fn new_voice(
        self: &Arc<Self>,
        channels: usize,
        sample_rate: f64,
        dynamic_rate: bool,
        callback: Arc<dyn VoiceCallback>,
    ) -> Voice {
        let mut inner = self.inner.lock().unwrap();
        let id = VoiceId(inner.next_voice_id);
        inner.next_voice_id += 1;

        let core = Arc::new(Mutex::new(VoiceCore::new(
            id,
            channels,
            sample_rate,
            self.mix_info.sample_rate,
            dynamic_rate,
            callback,
        )));

        let slot = match inner.free_slots.pop() {
            Some(slot) => {
                inner.voices[slot] = Some(core.clone());
                slot
            }
            None => {
                inner.voices.push(Some(core.clone()));
                inner.voices.len() - 1
            }
        };

        Voice {
            core,
            engine: Arc::downgrade(self),
            slot,
            id,
        }
    }

    /// Allocate a new bus
    pub fn new_submix(self: &Arc<Self>) -> Submix {
        let mut inner = self.inner.lock().unwrap();
        let id = SubmixId(inner.next_bus_id);
        inner.next_bus_id += 1;
        let core = SubmixCore::new(id.0);
        inner.submixes.entries.push((id, core));
        inner.submixes_dirty = true;
        Submix {
            engine: Arc::downgrade(self),
            id,
        }
    }

    pub fn unbind_voice(&self, slot: usize) {
        let mut inner = self.inner.lock().unwrap();
        if inner.voices.get(slot).map_or(false, Option::is_some) {
            inner.voices[slot] = None;
            inner.free_slots.push(slot);
        }
    }

    /// Remove a bus and strip every voice send targeting it
    pub fn remove_submix(&self, id: SubmixId) {
        if id == MAIN_SUBMIX {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.submixes.entries.retain(|(sid, _)| *sid != id);
        inner.submixes_dirty = true;
        let voices: Vec<_> = inner.voices.iter().flatten().cloned().collect();
        for voice in voices {
            voice.lock().unwrap().sends.remove_submix(id);
        }
    }

    /// Run one pump: pull every running voice, compose submixes, and write
    /// `frames` interleaved frames of the main mix into `out`
    pub fn pump_into<S: EngineFormat>(&self, frames: usize, out: &mut [S]) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        if inner.submixes_dirty {
            log::trace!("Submix graph changed since last pump");
            inner.submixes_dirty = false;
        }

        let channels = self.mix_info.channel_count();
        let samples = frames * channels;

        let EngineInner {
            voices,
            submixes,
            scratch,
            ..
        } = inner;

        for slot in voices.iter() {
            let Some(voice) = slot else {
                continue;
            };
            let mut core = voice.lock().unwrap();
            if !core.running {
                continue;
            }
            core.pump_and_mix::<S>(&self.mix_info, frames, scratch, submixes);
        }

        submixes.compose_into_main::<S>(frames, channels);

        let main_buf = S::merge(submixes.main_mut(), samples);
        out[..samples].copy_from_slice(main_buf);
        main_buf.fill(S::default());
    }

    /// Current length of the active-format scratch vectors (pre, post)
    pub fn scratch_lens<S: EngineFormat>(&self) -> (usize, usize) {
        let mut inner = self.inner.lock().unwrap();
        let (_, pre, post) = S::scratch_triple(&mut inner.scratch);
        (pre.len(), post.len())
    }
}

/// The backend-agnostic engine surface
///
/// One engine exists per output device. Voices and submixes are allocated
/// through it; MIDI endpoints share its client. `pump_and_mix_voices` is
/// the client-side pump entry: synchronous on pull-driven backends, a
/// one-period rendezvous on callback-driven backends in retrace mode.
pub trait AudioVoiceEngine {
    fn mix_info(&self) -> &MixInfo;

    /// Allocate a mono voice sourcing int16 at `sample_rate`
    fn new_mono_voice(
        &self,
        sample_rate: f64,
        callback: Arc<dyn VoiceCallback>,
        dynamic_pitch: bool,
    ) -> Voice;

    /// Allocate a stereo voice sourcing interleaved int16 at `sample_rate`
    fn new_stereo_voice(
        &self,
        sample_rate: f64,
        callback: Arc<dyn VoiceCallback>,
        dynamic_pitch: bool,
    ) -> Voice;

    /// Allocate a new submix bus
    fn new_submix(&self) -> Submix;

    /// Drive one pump from the client thread
    fn pump_and_mix_voices(&self);

    /// List `(id, name)` pairs for attachable MIDI devices
    fn enumerate_midi_devices(&self) -> Vec<(String, String)>;

    fn new_virtual_midi_in(&self, receiver: MidiReceiver) -> AudioResult<MidiIn>;
    fn new_virtual_midi_out(&self) -> AudioResult<MidiOut>;
    fn new_virtual_midi_in_out(&self, receiver: MidiReceiver) -> AudioResult<MidiInOut>;
    fn new_real_midi_in(&self, device_id: &str, receiver: MidiReceiver) -> AudioResult<MidiIn>;
    fn new_real_midi_out(&self, device_id: &str) -> AudioResult<MidiOut>;
    fn new_real_midi_in_out(&self, device_id: &str, receiver: MidiReceiver)
        -> AudioResult<MidiInOut>;

    /// Whether MIDI receivers are delivered under the engine lock
    fn use_midi_lock(&self) -> bool;
}
